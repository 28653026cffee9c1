/// Router Module Index
///
/// Routes are grouped by who may reach them. The grouping decides which
/// layers wrap a route; which role may perform an action is decided by the
/// policy inside each handler.

/// Unauthenticated routes: health check and the OpenAPI document.
pub mod public;

/// Resource routes. Every request must resolve to an `AuthUser`.
pub mod authenticated;

/// Manager-only routes (role assignment and the manager area).
pub mod manager;
