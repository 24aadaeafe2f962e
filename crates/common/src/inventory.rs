//! # Inventory and Self-Reported Identity Types
//!
//! [`InventoryRecord`] is the cloud provider's view of a machine;
//! [`SelfReportedIdentity`] is what the machine says about itself once
//! admitted. Admission succeeds only when the two agree.

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════════════════════
// INVENTORY RECORD
// ════════════════════════════════════════════════════════════════════════════════

/// Authoritative cloud inventory entry for a provisioned server.
///
/// Unknown provider fields are ignored. Missing `id`/`name` deserialize to
/// empty strings so a partial entry is filtered out by the matching rule
/// instead of failing the whole listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    #[serde(rename = "id", default)]
    pub record_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
}

impl InventoryRecord {
    /// Matching rule: exact name, and exact project when a scope is given.
    pub fn matches(&self, identifier: &str, project_scope: Option<&str>) -> bool {
        if self.name != identifier {
            return false;
        }
        match project_scope {
            Some(scope) => self.project_id.as_deref() == Some(scope),
            None => true,
        }
    }

    pub fn has_record_id(&self) -> bool {
        !self.record_id.trim().is_empty()
    }
}

/// Picks the first record satisfying [`InventoryRecord::matches`].
///
/// A blank scope is treated as unscoped.
pub fn select_record<'a, I>(
    records: I,
    identifier: &str,
    project_scope: Option<&str>,
) -> Option<InventoryRecord>
where
    I: IntoIterator<Item = &'a InventoryRecord>,
{
    let scope = project_scope.filter(|s| !s.trim().is_empty());
    records
        .into_iter()
        .find(|record| record.matches(identifier, scope))
        .cloned()
}

// ════════════════════════════════════════════════════════════════════════════════
// SELF-REPORTED IDENTITY
// ════════════════════════════════════════════════════════════════════════════════

/// Identity attributes reported by the node itself after admission.
///
/// Fields are optional because a freshly admitted node may not have
/// populated them yet; an absent field never matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfReportedIdentity {
    pub reported_id: Option<String>,
    pub reported_instance_id: Option<String>,
}

impl SelfReportedIdentity {
    /// Both attributes present and equal to the expected values.
    pub fn confirms(&self, identifier: &str, expected_instance_id: &str) -> bool {
        self.reported_id.as_deref() == Some(identifier)
            && self.reported_instance_id.as_deref() == Some(expected_instance_id)
    }
}
