//! Outbound (driven) ports for the agent registry.

use async_trait::async_trait;

/// Portal's answer for a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalVerdict {
    /// Enrollment token checks out; the portal names the owning account.
    Approved { owner_email: String },
    /// The portal explicitly refused the node.
    Rejected,
}

/// The portal service's `validateNode` endpoint.
///
/// `Err(())` means the portal could not be reached, which is handled
/// differently from an explicit rejection (cached approvals still register).
#[async_trait]
pub trait PortalValidator: Send + Sync {
    /// Validate an enrollment token for an agent.
    async fn validate_node(
        &self,
        agent_id: &str,
        registration_token: &str,
    ) -> Result<PortalVerdict, ()>;

    /// True when no portal is configured; validation is then skipped.
    fn disabled(&self) -> bool {
        false
    }
}

/// Stub portal for tests: always approves with a fixed owner.
pub struct ApproveAllPortal;

#[async_trait]
impl PortalValidator for ApproveAllPortal {
    async fn validate_node(
        &self,
        _agent_id: &str,
        _registration_token: &str,
    ) -> Result<PortalVerdict, ()> {
        Ok(PortalVerdict::Approved {
            owner_email: "owner@example.org".into(),
        })
    }
}

/// Stub portal for tests: configured off.
pub struct DisabledPortal;

#[async_trait]
impl PortalValidator for DisabledPortal {
    async fn validate_node(
        &self,
        _agent_id: &str,
        _registration_token: &str,
    ) -> Result<PortalVerdict, ()> {
        Ok(PortalVerdict::Approved {
            owner_email: String::new(),
        })
    }

    fn disabled(&self) -> bool {
        true
    }
}
