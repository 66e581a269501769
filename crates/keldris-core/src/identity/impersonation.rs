//! Superuser impersonation (component C1).
//!
//! A superuser may switch the effective identity in their session to a
//! target user. All subsequent audit records must reference the original
//! user via `acted_on_behalf_of`, never the impersonated identity.

use uuid::Uuid;

use crate::error::IdentityError;
use crate::models::{ImpersonationState, SessionState};

/// Begin impersonating `target_user_id`. `impersonation_log_id` is the id
/// of the audit-log record written for this action by the caller.
///
/// # Errors
///
/// Returns `IdentityError::Denied`-shaped errors are the caller's
/// responsibility (permission checks happen in `authz`); this function only
/// rejects a session that is not a superuser's.
pub fn begin(
    session: &mut SessionState,
    target_user_id: Uuid,
    target_email: String,
    target_name: String,
    target_org_id: Uuid,
    target_org_role: crate::models::OrgRole,
    impersonation_log_id: Uuid,
) -> Result<(), IdentityError> {
    if !session.is_superuser {
        return Err(IdentityError::InvalidCredentials);
    }
    if session.impersonation.is_some() {
        return Err(IdentityError::InvalidCredentials);
    }

    let original_user_id = session.user_id;

    session.impersonation = Some(ImpersonationState { original_user_id, impersonation_log_id });
    session.impersonating = Some(target_user_id);
    session.user_id = target_user_id;
    session.email = target_email;
    session.name = target_name;
    session.current_org_id = target_org_id;
    session.current_org_role = target_org_role;

    Ok(())
}

/// End impersonation, restoring the original identity and clearing the
/// impersonation fields. `restore` supplies the original user's profile
/// fields (fetched by the caller from `original_user_id`).
///
/// # Errors
///
/// Returns `IdentityError::InvalidCredentials` if the session is not
/// currently impersonating anyone.
pub fn end(
    session: &mut SessionState,
    restore_email: String,
    restore_name: String,
    restore_org_id: Uuid,
    restore_org_role: crate::models::OrgRole,
) -> Result<Uuid, IdentityError> {
    let state = session.impersonation.take().ok_or(IdentityError::InvalidCredentials)?;

    session.user_id = state.original_user_id;
    session.email = restore_email;
    session.name = restore_name;
    session.current_org_id = restore_org_id;
    session.current_org_role = restore_org_role;
    session.impersonating = None;

    Ok(state.original_user_id)
}

/// The user id audit records should reference for `acted_on_behalf_of`:
/// the original superuser when impersonating, `None` otherwise.
#[must_use]
pub fn audit_actor(session: &SessionState) -> Option<Uuid> {
    session.impersonation.as_ref().map(|s| s.original_user_id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::OrgRole;
    use chrono::Utc;

    fn base_session(is_superuser: bool) -> SessionState {
        SessionState {
            user_id: Uuid::new_v4(),
            oidc_subject: None,
            email: "root@keldris.io".to_owned(),
            name: "Root".to_owned(),
            current_org_id: Uuid::new_v4(),
            current_org_role: OrgRole::Owner,
            authenticated_at: Utc::now(),
            last_activity: Utc::now(),
            is_superuser,
            impersonating: None,
            impersonation: None,
        }
    }

    #[test]
    fn non_superuser_cannot_impersonate() {
        let mut session = base_session(false);
        let err = begin(
            &mut session,
            Uuid::new_v4(),
            "target@org.io".to_owned(),
            "Target".to_owned(),
            Uuid::new_v4(),
            OrgRole::Member,
            Uuid::new_v4(),
        )
        .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }

    #[test]
    fn begin_then_end_restores_original_identity() {
        let mut session = base_session(true);
        let original_id = session.user_id;
        let original_email = session.email.clone();
        let original_org = session.current_org_id;

        let target_id = Uuid::new_v4();
        begin(
            &mut session,
            target_id,
            "target@org.io".to_owned(),
            "Target".to_owned(),
            Uuid::new_v4(),
            OrgRole::Member,
            Uuid::new_v4(),
        )
        .unwrap();

        assert_eq!(session.user_id, target_id);
        assert_eq!(audit_actor(&session), Some(original_id));

        let restored = end(&mut session, original_email.clone(), "Root".to_owned(), original_org, OrgRole::Owner)
            .unwrap();

        assert_eq!(restored, original_id);
        assert_eq!(session.user_id, original_id);
        assert_eq!(session.email, original_email);
        assert!(session.impersonation.is_none());
        assert!(session.impersonating.is_none());
        assert_eq!(audit_actor(&session), None);
    }

    #[test]
    fn ending_without_active_impersonation_fails() {
        let mut session = base_session(true);
        let err = end(&mut session, "x".to_owned(), "y".to_owned(), Uuid::new_v4(), OrgRole::Owner).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }
}
