//! Promotion policy
//!
//! Every state-changing call carries an explicit [`ActorCapabilities`]. Any
//! target may be set directly; there is no enforced staging order.

use crate::error::PermissionError;
use crate::model::Target;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What the calling actor may do
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorCapabilities {
    /// Group the actor belongs to
    pub group: Option<String>,
    /// QA capability for that group
    pub qa: bool,
    /// Global administrator override
    pub admin: bool,
}

impl ActorCapabilities {
    /// Vendor member without QA rights
    pub fn member(group: impl Into<String>) -> Self {
        Self {
            group: Some(group.into()),
            qa: false,
            admin: false,
        }
    }

    /// Vendor member with QA rights
    pub fn qa(group: impl Into<String>) -> Self {
        Self {
            group: Some(group.into()),
            qa: true,
            admin: false,
        }
    }

    /// Administrator
    pub fn admin() -> Self {
        Self {
            group: None,
            qa: false,
            admin: true,
        }
    }

    /// Whether the actor may act on packages of `group`
    pub fn has_group_access(&self, group: &str) -> bool {
        self.admin || self.group.as_deref() == Some(group)
    }

    /// Whether the actor holds QA capability for `group`
    pub fn has_qa_for(&self, group: &str) -> bool {
        self.admin || (self.qa && self.group.as_deref() == Some(group))
    }
}

/// Authorization rules for uploads, transitions and deletion
#[derive(Debug, Clone, Copy, Default)]
pub struct PromotionPolicy;

impl PromotionPolicy {
    /// Create the policy
    pub fn new() -> Self {
        Self
    }

    fn require_group(self, actor: &ActorCapabilities, group: &str) -> Result<(), PermissionError> {
        if actor.has_group_access(group) {
            Ok(())
        } else {
            warn!(group, actor_group = ?actor.group, "Group access denied");
            Err(PermissionError::NoGroupAccess {
                group: group.to_string(),
            })
        }
    }

    fn require_qa(self, actor: &ActorCapabilities, group: &str, action: String) -> Result<(), PermissionError> {
        if actor.has_qa_for(group) {
            Ok(())
        } else {
            warn!(group, action = %action, "QA capability required");
            Err(PermissionError::QaRequired { action })
        }
    }

    /// Reading a package
    pub fn authorize_view(self, actor: &ActorCapabilities, group: &str) -> Result<(), PermissionError> {
        self.require_group(actor, group)
    }

    /// Uploading into `target` on behalf of `group`
    pub fn authorize_upload(
        self,
        actor: &ActorCapabilities,
        group: &str,
        target: Target,
    ) -> Result<(), PermissionError> {
        if target.requires_qa_on_upload() {
            self.require_qa(actor, group, format!("upload to {target}"))?;
        }
        self.require_group(actor, group)
    }

    /// Moving a package of `group` to `to`
    pub fn authorize_transition(
        self,
        actor: &ActorCapabilities,
        group: &str,
        to: Target,
    ) -> Result<(), PermissionError> {
        self.require_group(actor, group)?;
        self.require_qa(actor, group, format!("move firmware to {to}"))
    }

    /// Deleting a package of `group` currently in `target`
    pub fn authorize_delete(
        self,
        actor: &ActorCapabilities,
        group: &str,
        target: Target,
    ) -> Result<(), PermissionError> {
        self.require_group(actor, group)?;
        if target == Target::Stable {
            self.require_qa(actor, group, "delete stable firmware".to_string())?;
        }
        Ok(())
    }

    /// Administrative maintenance
    pub fn authorize_admin(self, actor: &ActorCapabilities, operation: &str) -> Result<(), PermissionError> {
        if actor.admin {
            Ok(())
        } else {
            warn!(operation, "Administrator capability required");
            Err(PermissionError::AdminRequired {
                operation: operation.to_string(),
            })
        }
    }
}
