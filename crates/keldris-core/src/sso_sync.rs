//! SSO group sync (component C5).
//!
//! Reconciles an OIDC login's group claims against an org's
//! [`SsoGroupMapping`] table: memberships are created, removed, and
//! re-roled to match. When a user's existing role disagrees with what SSO
//! says it should be, SSO wins. Groups with no configured mapping are
//! reported but not fatal. A failure reconciling one membership is logged
//! and skipped rather than aborting the whole sync.

use uuid::Uuid;

use crate::models::{OrgMembership, OrgRole, SsoGroupMapping};

/// Narrow store interface for the membership side of SSO sync.
#[async_trait::async_trait]
pub trait MembershipStore: Send + Sync {
    async fn memberships_for_user_in_org(&self, user_id: Uuid, org_id: Uuid) -> Result<Vec<OrgMembership>, String>;
    async fn upsert_membership(&self, user_id: Uuid, org_id: Uuid, role: OrgRole) -> Result<(), String>;
    async fn remove_membership(&self, id: Uuid) -> Result<(), String>;
}

/// The outcome of reconciling one login's groups against one org.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Groups present in the claim with no configured [`SsoGroupMapping`].
    pub unmapped_groups: Vec<String>,
    /// Memberships created because a mapped group had no prior membership.
    pub created: Vec<OrgRole>,
    /// Memberships whose role SSO corrected to match the mapping.
    pub role_corrected: Vec<(OrgRole, OrgRole)>,
    /// Memberships removed because the user no longer belongs to a group
    /// that grants them.
    pub removed: usize,
    /// Memberships the store failed to reconcile; logged, not fatal.
    pub failed: usize,
}

/// Reconcile `user_id`'s membership in `org_id` against `claimed_groups`,
/// using `mappings` (the org's full `oidc_group_name -> role` table) to
/// resolve groups into roles.
///
/// When multiple claimed groups map to different roles, the highest-ranked
/// role wins (ordering per [`OrgRole`]'s `Ord` impl), mirroring the "most
/// privileged membership wins" resolution used elsewhere for overlapping
/// grants.
pub async fn reconcile(
    store: &dyn MembershipStore,
    user_id: Uuid,
    org_id: Uuid,
    claimed_groups: &[String],
    mappings: &[SsoGroupMapping],
) -> SyncReport {
    let mut report = SyncReport::default();

    let mut target_role: Option<OrgRole> = None;
    for group in claimed_groups {
        match mappings.iter().find(|m| m.oidc_group_name == *group) {
            Some(mapping) => {
                target_role = Some(match target_role {
                    Some(current) if current >= mapping.role => current,
                    _ => mapping.role,
                });
            }
            None => report.unmapped_groups.push(group.clone()),
        }
    }

    let existing = match store.memberships_for_user_in_org(user_id, org_id).await {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, %user_id, %org_id, "failed to load existing memberships during sso sync");
            report.failed += 1;
            return report;
        }
    };

    match (target_role, existing.first()) {
        (Some(role), None) => {
            if let Err(e) = store.upsert_membership(user_id, org_id, role).await {
                tracing::warn!(error = %e, %user_id, %org_id, "failed to create membership during sso sync");
                report.failed += 1;
            } else {
                report.created.push(role);
            }
        }
        (Some(role), Some(current)) if current.role != role => {
            if let Err(e) = store.upsert_membership(user_id, org_id, role).await {
                tracing::warn!(error = %e, %user_id, %org_id, "failed to correct membership role during sso sync");
                report.failed += 1;
            } else {
                report.role_corrected.push((current.role, role));
            }
        }
        (None, Some(current)) => {
            if let Err(e) = store.remove_membership(current.id).await {
                tracing::warn!(error = %e, %user_id, %org_id, "failed to remove membership during sso sync");
                report.failed += 1;
            } else {
                report.removed += 1;
            }
        }
        _ => {}
    }

    report
}
