//! # CodeMesh Test Suite
//!
//! Cross-crate integration flows (driving the gateway handlers directly
//! against in-process coordinator stacks) and property tests for the chain,
//! queue, and security invariants.

#[cfg(test)]
pub mod harness;

#[cfg(test)]
mod integration {
    mod flows;
    mod gossip;
    mod properties;
}
