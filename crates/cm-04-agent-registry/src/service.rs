//! # Registry Service
//!
//! Registration, liveness, and pull gating in one place. The gateway calls
//! into this service and translates its errors into HTTP statuses.

use crate::domain::{
    AgentDirectory, BlacklistChain, NewBlacklistEvent, PowerPolicyConfig, RegistryError,
};
use crate::domain::power;
use crate::ports::outbound::{PortalValidator, PortalVerdict};
use dashmap::DashMap;
use shared_crypto::Ed25519KeyPair;
use shared_types::{
    AgentMode, AgentRecord, BlacklistRecord, PowerDecision, PowerTelemetry, SandboxMode, Subtask,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// `/register` request body, after schema validation.
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub agent_id: String,
    pub os: String,
    pub version: String,
    pub mode: AgentMode,
    pub registration_token: String,
    pub owner_email: String,
    pub sandbox_mode: SandboxMode,
    pub max_concurrent_tasks: u32,
    pub local_model_provider: String,
    pub model_catalog: Vec<String>,
    pub active_model: Option<String>,
    pub public_key_pem: Option<String>,
    pub x25519_public_key: Option<String>,
}

/// Successful registration.
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub record: AgentRecord,
    /// True when this approval was newly granted (vs. cached re-register).
    pub newly_approved: bool,
}

/// Agent registry service.
pub struct RegistryService {
    directory: AgentDirectory,
    blacklist: BlacklistChain,
    portal: Arc<dyn PortalValidator>,
    power_config: PowerPolicyConfig,
    /// Approvals that survived a portal round-trip, for outage re-registers.
    approved_cache: DashMap<String, String>,
    last_pull: DashMap<String, u64>,
}

impl RegistryService {
    /// Build the service.
    pub fn new(
        coordinator_id: &str,
        keypair: Arc<Ed25519KeyPair>,
        portal: Arc<dyn PortalValidator>,
        power_config: PowerPolicyConfig,
    ) -> Self {
        Self {
            directory: AgentDirectory::new(),
            blacklist: BlacklistChain::new(coordinator_id, keypair),
            portal,
            power_config,
            approved_cache: DashMap::new(),
            last_pull: DashMap::new(),
        }
    }

    /// The agent directory.
    pub fn directory(&self) -> &AgentDirectory {
        &self.directory
    }

    /// The blacklist chain.
    pub fn blacklist(&self) -> &BlacklistChain {
        &self.blacklist
    }

    /// Register an agent, enforcing the portal policy.
    ///
    /// Loopback registrations bypass portal validation entirely. When the
    /// portal is unreachable, agents with a cached approval may re-register;
    /// unknown agents are refused.
    pub async fn register(
        &self,
        input: RegisterInput,
        is_loopback: bool,
        now_ms: u64,
    ) -> Result<RegisterOutcome, RegistryError> {
        if self.blacklist.is_blacklisted(&input.agent_id, now_ms) {
            return Err(RegistryError::AgentBlacklisted);
        }

        let cached = self.approved_cache.get(&input.agent_id).map(|e| e.clone());
        let (owner_email, newly_approved) = if is_loopback || self.portal.disabled() {
            (input.owner_email.clone(), cached.is_none())
        } else {
            match self
                .portal
                .validate_node(&input.agent_id, &input.registration_token)
                .await
            {
                Ok(PortalVerdict::Approved { owner_email }) => {
                    let email = if owner_email.is_empty() {
                        input.owner_email.clone()
                    } else {
                        owner_email
                    };
                    (email, cached.is_none())
                }
                Ok(PortalVerdict::Rejected) => return Err(RegistryError::NodeNotActivated),
                Err(()) => match cached {
                    Some(email) => {
                        warn!(agent_id = %input.agent_id, "portal unreachable, honoring cached approval");
                        (email, false)
                    }
                    None => return Err(RegistryError::NodeNotActivated),
                },
            }
        };

        self.approved_cache
            .insert(input.agent_id.clone(), owner_email.clone());

        let record = AgentRecord {
            agent_id: input.agent_id,
            os: input.os,
            version: input.version,
            mode: input.mode,
            local_model_provider: input.local_model_provider,
            model_catalog: input.model_catalog,
            active_model: input.active_model,
            sandbox_mode: input.sandbox_mode,
            public_key_pem: input.public_key_pem,
            x25519_public_key: input.x25519_public_key,
            max_concurrent_tasks: input.max_concurrent_tasks.max(1),
            power: None,
            owner_email,
            last_seen_ms: now_ms,
            connected_peers: Vec::new(),
        };
        self.directory.install(record.clone());
        debug!(agent_id = %record.agent_id, newly_approved, "agent registered");

        Ok(RegisterOutcome {
            record,
            newly_approved,
        })
    }

    /// Heartbeat: blacklist gate, then liveness stamp.
    pub fn heartbeat(
        &self,
        agent_id: &str,
        power: Option<PowerTelemetry>,
        active_model: Option<String>,
        now_ms: u64,
    ) -> Result<(), RegistryError> {
        if self.blacklist.is_blacklisted(agent_id, now_ms) {
            return Err(RegistryError::AgentBlacklisted);
        }
        if self.directory.heartbeat(agent_id, power, active_model, now_ms) {
            Ok(())
        } else {
            Err(RegistryError::AgentNotFound(agent_id.to_string()))
        }
    }

    /// Pull gating: blacklist, then the power policy.
    pub fn pull_decision(&self, agent_id: &str, now_ms: u64) -> Result<PowerDecision, RegistryError> {
        if self.blacklist.is_blacklisted(agent_id, now_ms) {
            return Err(RegistryError::AgentBlacklisted);
        }
        let agent = self
            .directory
            .get(agent_id)
            .ok_or_else(|| RegistryError::AgentNotFound(agent_id.to_string()))?;
        let last_pull = self.last_pull.get(agent_id).map(|v| *v);
        Ok(power::evaluate(
            &self.power_config,
            agent.power.as_ref(),
            last_pull,
            now_ms,
        ))
    }

    /// Record a successful pull for the on-battery cadence.
    pub fn record_pull(&self, agent_id: &str, now_ms: u64) {
        self.last_pull.insert(agent_id.to_string(), now_ms);
    }

    /// Sandbox gate: a tenant-bound subtask needs an isolating agent.
    pub fn sandbox_satisfied(subtask: &Subtask, agent: &AgentRecord) -> bool {
        subtask.tenant_id.is_none() || agent.sandbox_mode != SandboxMode::None
    }

    /// Raise a local blacklist event.
    pub fn blacklist_agent(
        &self,
        event: NewBlacklistEvent,
        now_ms: u64,
    ) -> Result<BlacklistRecord, RegistryError> {
        self.blacklist.append_local(event, now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::outbound::DisabledPortal;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakyPortal {
        reachable: AtomicBool,
    }

    #[async_trait]
    impl PortalValidator for FlakyPortal {
        async fn validate_node(
            &self,
            _agent_id: &str,
            _registration_token: &str,
        ) -> Result<PortalVerdict, ()> {
            if self.reachable.load(Ordering::SeqCst) {
                Ok(PortalVerdict::Approved {
                    owner_email: "portal@example.org".into(),
                })
            } else {
                Err(())
            }
        }
    }

    fn input(agent_id: &str) -> RegisterInput {
        RegisterInput {
            agent_id: agent_id.into(),
            os: "linux".into(),
            version: "1.0.0".into(),
            mode: AgentMode::SwarmOnly,
            registration_token: "tok-abc".into(),
            owner_email: "claimed@example.org".into(),
            sandbox_mode: SandboxMode::None,
            max_concurrent_tasks: 1,
            local_model_provider: "ollama".into(),
            model_catalog: vec![],
            active_model: None,
            public_key_pem: None,
            x25519_public_key: None,
        }
    }

    fn service_with(portal: Arc<dyn PortalValidator>) -> RegistryService {
        RegistryService::new(
            "coord-a",
            Arc::new(Ed25519KeyPair::generate()),
            portal,
            PowerPolicyConfig::default(),
        )
    }

    #[tokio::test]
    async fn disabled_portal_registers_with_claimed_owner() {
        let svc = service_with(Arc::new(DisabledPortal));
        let outcome = svc.register(input("worker-1"), false, 1_000).await.unwrap();
        assert!(outcome.newly_approved);
        assert_eq!(outcome.record.owner_email, "claimed@example.org");
        assert_eq!(outcome.record.max_concurrent_tasks, 1);
    }

    #[tokio::test]
    async fn portal_outage_honors_cached_approval_only() {
        let portal = Arc::new(FlakyPortal {
            reachable: AtomicBool::new(true),
        });
        let svc = service_with(portal.clone());

        svc.register(input("worker-1"), false, 1_000).await.unwrap();
        portal.reachable.store(false, Ordering::SeqCst);

        // Known agent re-registers on the cache.
        let again = svc.register(input("worker-1"), false, 2_000).await.unwrap();
        assert!(!again.newly_approved);
        assert_eq!(again.record.owner_email, "portal@example.org");

        // Unknown agent is refused.
        assert_eq!(
            svc.register(input("worker-2"), false, 2_000).await.unwrap_err(),
            RegistryError::NodeNotActivated
        );
    }

    #[tokio::test]
    async fn loopback_bypasses_portal() {
        let portal = Arc::new(FlakyPortal {
            reachable: AtomicBool::new(false),
        });
        let svc = service_with(portal);
        assert!(svc.register(input("worker-1"), true, 1_000).await.is_ok());
    }

    #[tokio::test]
    async fn blacklisted_agent_cannot_register_heartbeat_or_pull() {
        let svc = service_with(Arc::new(DisabledPortal));
        svc.register(input("worker-1"), false, 1_000).await.unwrap();
        svc.blacklist_agent(
            NewBlacklistEvent {
                agent_id: "worker-1".into(),
                reason_code: shared_types::BlacklistReasonCode::OperatorAction,
                reason: "abuse".into(),
                evidence_hash_sha256: "ab".repeat(32),
                reporter_id: "operator".into(),
                reporter_signature: None,
                reporter_public_key_pem: None,
                expires_at_ms: None,
            },
            2_000,
        )
        .unwrap();

        assert_eq!(
            svc.heartbeat("worker-1", None, None, 3_000).unwrap_err(),
            RegistryError::AgentBlacklisted
        );
        assert_eq!(
            svc.pull_decision("worker-1", 3_000).unwrap_err(),
            RegistryError::AgentBlacklisted
        );
        assert_eq!(
            svc.register(input("worker-1"), false, 3_000).await.unwrap_err(),
            RegistryError::AgentBlacklisted
        );
    }

    #[test]
    fn sandbox_gate() {
        let mut agent = AgentRecord {
            agent_id: "w".into(),
            os: "linux".into(),
            version: "1".into(),
            mode: AgentMode::SwarmOnly,
            local_model_provider: "ollama".into(),
            model_catalog: vec![],
            active_model: None,
            sandbox_mode: SandboxMode::None,
            public_key_pem: None,
            x25519_public_key: None,
            max_concurrent_tasks: 1,
            power: None,
            owner_email: String::new(),
            last_seen_ms: 0,
            connected_peers: vec![],
        };
        let mut subtask = Subtask {
            id: "S1".into(),
            task_id: "T1".into(),
            kind: shared_types::SubtaskKind::SingleStep,
            language: "python".into(),
            input: String::new(),
            timeout_ms: 1,
            snapshot_ref: String::new(),
            project_meta: serde_json::Value::Null,
            depends_on: vec![],
            requested_model: None,
            tenant_id: Some("tenant-9".into()),
            priority: 0,
        };

        assert!(!RegistryService::sandbox_satisfied(&subtask, &agent));
        agent.sandbox_mode = SandboxMode::Docker;
        assert!(RegistryService::sandbox_satisfied(&subtask, &agent));
        agent.sandbox_mode = SandboxMode::None;
        subtask.tenant_id = None;
        assert!(RegistryService::sandbox_satisfied(&subtask, &agent));
    }
}
