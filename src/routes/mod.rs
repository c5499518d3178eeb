/// Router Module Index
///
/// Organizes the route table into the three groups the pipeline composer wraps
/// differently. Which group a route lives in decides which middleware it gets, so a
/// route can never be exposed without its session, CSRF, and identity stages by accident.

/// Static assets and the liveness probe. No session.
pub mod public;

/// Session-aware routes open to anonymous users (signup, login).
pub mod dynamic;

/// Routes behind the access gate. Anonymous requests are redirected to login.
pub mod protected;
