//! Signed-request verification for `/heartbeat`, `/pull`, `/result`.
//!
//! The signature covers `method + path + timestampMs + nonce + bodySha256 +
//! peerId` (the agent id). Rejections:
//!
//! - clock skew beyond `SECURITY_MAX_SKEW_MS` → `replay_attempt`
//! - nonce reuse within `SECURITY_NONCE_TTL_MS` → `replay_attempt`
//! - anything else wrong with the five headers → `signature_invalid`
//!
//! The nonce is burned only after the signature verifies, so a third party
//! cannot exhaust an agent's nonces with forged requests.

use crate::domain::error::ApiError;
use crate::state::AppState;
use axum::http::HeaderMap;
use shared_crypto::{sha256_hex, Ed25519PublicKey, Ed25519Signature};
use shared_types::security::{
    canonical_request_string, headers as sig_headers, SignedRequestHeaders, SECURITY_MAX_SKEW_MS,
};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::validation(format!("missing header {name}")))
}

/// Parse the five signature headers.
pub fn parse_signed_headers(headers: &HeaderMap) -> Result<SignedRequestHeaders, ApiError> {
    Ok(SignedRequestHeaders {
        agent_id: header(headers, sig_headers::AGENT_ID)?.to_string(),
        timestamp_ms: header(headers, sig_headers::TIMESTAMP_MS)?
            .parse()
            .map_err(|_| ApiError::validation("x-timestamp-ms must be an integer"))?,
        nonce: header(headers, sig_headers::NONCE)?.to_string(),
        body_sha256: header(headers, sig_headers::BODY_SHA256)?.to_string(),
        signature: header(headers, sig_headers::SIGNATURE)?.to_string(),
    })
}

/// Verify a signed agent request end to end.
///
/// `claimed_agent_id` is the id inside the request body; it must match the
/// signing identity or the request is rejected with `agent_id_mismatch`.
pub fn verify_signed_request(
    state: &AppState,
    method: &str,
    path: &str,
    headers: &HeaderMap,
    body: &[u8],
    claimed_agent_id: &str,
) -> Result<(), ApiError> {
    let signed = parse_signed_headers(headers)?;

    if signed.agent_id != claimed_agent_id {
        return Err(ApiError::agent_id_mismatch());
    }

    let now_ms = state.now_ms();
    let skew = now_ms.abs_diff(signed.timestamp_ms);
    if skew > SECURITY_MAX_SKEW_MS {
        return Err(ApiError::replay_attempt(format!(
            "timestamp skew {skew}ms exceeds the {SECURITY_MAX_SKEW_MS}ms window"
        )));
    }

    if sha256_hex(body) != signed.body_sha256 {
        return Err(ApiError::signature_invalid());
    }

    let agent = state
        .registry
        .directory()
        .get(&signed.agent_id)
        .ok_or_else(|| ApiError::agent_not_found(&signed.agent_id))?;
    let pem = agent
        .public_key_pem
        .as_deref()
        .ok_or_else(ApiError::signature_invalid)?;
    let key = Ed25519PublicKey::from_pem(pem).map_err(|_| ApiError::signature_invalid())?;

    let message = canonical_request_string(
        method,
        path,
        signed.timestamp_ms,
        &signed.nonce,
        &signed.body_sha256,
        &signed.agent_id,
    );
    let signature =
        Ed25519Signature::from_hex(&signed.signature).map_err(|_| ApiError::signature_invalid())?;
    key.verify(message.as_bytes(), &signature)
        .map_err(|_| ApiError::signature_invalid())?;

    if state.nonces.seen(&signed.agent_id, &signed.nonce, now_ms) {
        return Err(ApiError::replay_attempt("nonce already used"));
    }
    Ok(())
}
