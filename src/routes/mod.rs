/// Router Module Index
///
/// The API is split into two fixed route sets. Which set a path belongs to is decided once, when
/// the router is built, and never per request.

/// Routes reachable without a credential.
pub mod public;

/// Routes guarded by the authorization gate (credential + allowed role).
pub mod admin;
