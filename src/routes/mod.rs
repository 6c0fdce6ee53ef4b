/// Router Module Index
///
/// Routes are split by access tier. The tier decides which layer wraps the router in
/// `create_router`; ownership and role checks still happen inside the handlers.

/// Routes open to anonymous callers. Credentials, when present, are resolved optionally.
pub mod public;

/// Routes behind the `AuthUser` route layer.
pub mod authenticated;

/// Routes behind the `AuthUser` route layer whose handlers also require the admin role.
pub mod admin;
