/// Router Module Index
///
/// Routes are split by the access level they require, and the access check is applied
/// as a layer on each group in `create_router`, so an endpoint cannot be exposed
/// without the check of its group.

/// Routes open to anonymous clients: signup and login.
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware.
pub mod authenticated;

/// Account management, restricted to administrators and scoped to their tenant.
pub mod admin;

/// Post routes. Reads are public with optional identity; writes require an administrator.
pub mod posts;
