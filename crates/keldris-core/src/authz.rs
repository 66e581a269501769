//! Role-based authorization (component C2).
//!
//! Permissions are string identifiers grouped by resource. A static table
//! maps each [`OrgRole`] to its permission set. Superusers short-circuit
//! every check to `true`.

use std::collections::HashSet;
use std::sync::LazyLock;

use uuid::Uuid;

use crate::models::OrgRole;

/// All permissions recognized by the system, grouped by resource.
pub mod perm {
    pub const ORG_READ: &str = "org:read";
    pub const ORG_UPDATE: &str = "org:update";
    pub const ORG_DELETE: &str = "org:delete";

    pub const MEMBER_READ: &str = "member:read";
    pub const MEMBER_INVITE: &str = "member:invite";
    pub const MEMBER_REMOVE: &str = "member:remove";

    pub const AGENT_READ: &str = "agent:read";
    pub const AGENT_CREATE: &str = "agent:create";
    pub const AGENT_UPDATE: &str = "agent:update";
    pub const AGENT_DELETE: &str = "agent:delete";

    pub const REPO_READ: &str = "repo:read";
    pub const REPO_CREATE: &str = "repo:create";
    pub const REPO_UPDATE: &str = "repo:update";
    pub const REPO_DELETE: &str = "repo:delete";

    pub const SCHEDULE_READ: &str = "schedule:read";
    pub const SCHEDULE_CREATE: &str = "schedule:create";
    pub const SCHEDULE_UPDATE: &str = "schedule:update";
    pub const SCHEDULE_DELETE: &str = "schedule:delete";
    pub const SCHEDULE_RUN: &str = "schedule:run";

    pub const BACKUP_READ: &str = "backup:read";
    pub const BACKUP_CREATE: &str = "backup:create";
}

fn readonly_perms() -> HashSet<&'static str> {
    HashSet::from([
        perm::ORG_READ,
        perm::MEMBER_READ,
        perm::AGENT_READ,
        perm::REPO_READ,
        perm::SCHEDULE_READ,
        perm::BACKUP_READ,
    ])
}

fn member_perms() -> HashSet<&'static str> {
    let mut set = HashSet::from([perm::ORG_READ, perm::MEMBER_READ, perm::BACKUP_READ, perm::BACKUP_CREATE]);
    set.extend([
        perm::AGENT_READ, perm::AGENT_CREATE, perm::AGENT_UPDATE, perm::AGENT_DELETE,
        perm::REPO_READ, perm::REPO_CREATE, perm::REPO_UPDATE, perm::REPO_DELETE,
        perm::SCHEDULE_READ, perm::SCHEDULE_CREATE, perm::SCHEDULE_UPDATE, perm::SCHEDULE_DELETE, perm::SCHEDULE_RUN,
    ]);
    set
}

fn all_perms() -> HashSet<&'static str> {
    HashSet::from([
        perm::ORG_READ, perm::ORG_UPDATE, perm::ORG_DELETE,
        perm::MEMBER_READ, perm::MEMBER_INVITE, perm::MEMBER_REMOVE,
        perm::AGENT_READ, perm::AGENT_CREATE, perm::AGENT_UPDATE, perm::AGENT_DELETE,
        perm::REPO_READ, perm::REPO_CREATE, perm::REPO_UPDATE, perm::REPO_DELETE,
        perm::SCHEDULE_READ, perm::SCHEDULE_CREATE, perm::SCHEDULE_UPDATE, perm::SCHEDULE_DELETE, perm::SCHEDULE_RUN,
        perm::BACKUP_READ, perm::BACKUP_CREATE,
    ])
}

fn admin_perms() -> HashSet<&'static str> {
    let mut set = all_perms();
    set.remove(perm::ORG_DELETE);
    set
}

static PERMISSION_TABLE: LazyLock<[(OrgRole, HashSet<&'static str>); 4]> = LazyLock::new(|| {
    [
        (OrgRole::Owner, all_perms()),
        (OrgRole::Admin, admin_perms()),
        (OrgRole::Member, member_perms()),
        (OrgRole::Readonly, readonly_perms()),
    ]
});

fn permissions_for(role: OrgRole) -> &'static HashSet<&'static str> {
    PERMISSION_TABLE
        .iter()
        .find(|(r, _)| *r == role)
        .map(|(_, perms)| perms)
        .unwrap_or_else(|| unreachable!("permission table covers every OrgRole variant"))
}

/// The minimal identity shape needed for a permission check: is this user a
/// superuser, and what is their role in the org being acted on (if any)?
pub trait PermissionSubject {
    fn is_superuser(&self) -> bool;
    fn membership_role(&self, org_id: Uuid) -> Option<OrgRole>;
}

/// `hasPermission(user, org, perm)`: superusers bypass the table entirely;
/// everyone else needs an org membership whose role grants `permission`.
#[must_use]
pub fn has_permission(subject: &dyn PermissionSubject, org_id: Uuid, permission: &str) -> bool {
    if subject.is_superuser() {
        return true;
    }
    match subject.membership_role(org_id) {
        Some(role) => permissions_for(role).contains(permission),
        None => false,
    }
}

/// `canManageMember(actor, target, org)`: no self-management; owner manages
/// all; admin manages only members and readonly.
#[must_use]
pub fn can_manage_member(actor_role: OrgRole, actor_user_id: Uuid, target_user_id: Uuid, target_role: OrgRole) -> bool {
    if actor_user_id == target_user_id {
        return false;
    }
    match actor_role {
        OrgRole::Owner => true,
        OrgRole::Admin => matches!(target_role, OrgRole::Member | OrgRole::Readonly),
        OrgRole::Member | OrgRole::Readonly => false,
    }
}

/// `canAssignRole(actor, org, role)`: only owners assign owner/admin; owner
/// or admin assigns member/readonly.
#[must_use]
pub fn can_assign_role(actor_role: OrgRole, role_to_assign: OrgRole) -> bool {
    match role_to_assign {
        OrgRole::Owner | OrgRole::Admin => actor_role == OrgRole::Owner,
        OrgRole::Member | OrgRole::Readonly => matches!(actor_role, OrgRole::Owner | OrgRole::Admin),
    }
}
