/// Router Module Index
///
/// Organizes the routing logic into access-segregated modules. Access control is applied
/// at the module level (via Axum layers and extractors), so a handler cannot be exposed
/// without the guard its module declares.

/// Routes accessible to everyone (anonymous, read-only) plus login.
/// Visibility filtering (published only) happens in the listing query.
pub mod public;

/// Routes that need a valid session but no particular role.
pub mod authenticated;

/// Routes restricted to the `admin` and `organizer` roles.
/// Mutations on one event additionally pass the ownership check in the handler.
pub mod organizer;
