//! Access decision: required roles against the principal's roles.

use std::collections::HashSet;

use super::{Principal, ROLE_LOGIN};

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    /// No principal; the caller must log in.
    Unauthenticated,
    /// Logged in, but holding none of the required roles.
    Denied,
}

/// Decide whether `principal` may proceed given the required role set.
///
/// Any single required role suffices. `ROLE_LOGIN` is satisfied by every
/// authenticated principal.
pub fn decide(principal: Option<&Principal>, required: &HashSet<String>) -> AccessDecision {
    let Some(principal) = principal else {
        return AccessDecision::Unauthenticated;
    };

    if required.contains(ROLE_LOGIN) || required.iter().any(|r| principal.has_role(r)) {
        AccessDecision::Granted
    } else {
        AccessDecision::Denied
    }
}
