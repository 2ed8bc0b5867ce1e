//! Request authorization.
//!
//! - [`PathMatcher`] tests Ant-style URL patterns against request paths.
//! - [`AuthorizationResolver`] maps a path to the roles it requires, using
//!   the rules held in the user store.
//! - [`decide`] compares those roles with the logged-in [`Principal`].

mod decision;
mod path_matcher;
mod resolver;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub use decision::{AccessDecision, decide};
pub use path_matcher::PathMatcher;
pub use resolver::{AuthorizationResolver, ROLE_LOGIN, SecurityMetadataSource};

/// An authenticated user and the roles they hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub roles: HashSet<String>,
}

impl Principal {
    pub fn new(username: impl Into<String>, roles: impl IntoIterator<Item = String>) -> Self {
        Self {
            username: username.into(),
            roles: roles.into_iter().collect(),
        }
    }

    /// Check if the principal holds a role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
