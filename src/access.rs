//! Authorization decisions over `(principal, resource owner)` pairs.
//!
//! These functions only decide; they never touch the store. Callers resolve existence and
//! visibility first so that absent or hidden resources report NOT_FOUND rather than
//! FORBIDDEN.

use uuid::Uuid;

use crate::{auth::AuthUser, error::ApiError};

/// can_mutate
///
/// Ownership predicate behind every write on a post or account. Admins may mutate any
/// resource; everyone else only the ones whose `owner_id` is their own id.
pub fn can_mutate(principal: &AuthUser, owner_id: Uuid) -> bool {
    principal.is_admin() || principal.id == owner_id
}

/// can_set_featured
///
/// Curation is an admin privilege. Non-admin `featured` values are dropped silently by
/// the callers rather than rejected.
pub fn can_set_featured(principal: &AuthUser) -> bool {
    principal.is_admin()
}

/// require_admin
///
/// RBAC gate for the admin routes. The auth layer has already resolved the principal, so
/// a failure here is always 403, never 401.
pub fn require_admin(principal: &AuthUser) -> Result<(), ApiError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Access denied. Admin privileges required.".to_string(),
        ))
    }
}

/// require_mutate
///
/// Owner-or-admin gate for updates and deletes.
///
/// *Contract*: `action` completes the sentence "Not authorized to ...", e.g.
/// `"update this post"`. Run it only after `visibility::ensure_visible`, otherwise a
/// hidden post would leak its existence through the 403.
pub fn require_mutate(principal: &AuthUser, owner_id: Uuid, action: &str) -> Result<(), ApiError> {
    if can_mutate(principal, owner_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!("Not authorized to {action}")))
    }
}

/// guard_self_deactivation
///
/// No principal may deactivate its own account, admins included. Evaluated before the
/// role check, so a non-admin targeting itself also receives 400 rather than 403.
pub fn guard_self_deactivation(principal: &AuthUser, target_id: Uuid) -> Result<(), ApiError> {
    if principal.id == target_id {
        return Err(ApiError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }
    Ok(())
}
