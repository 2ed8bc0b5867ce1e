//! Navigation menus scoped to a user's grants.
//!
//! Menus form a two-level forest: roots and their direct children. Which
//! part of it a user sees depends on the menus granted to their roles.

mod aggregator;

pub use aggregator::{
    HIGHEST_AUTHORITY_PATTERN, MenuAggregator, MenuError, MenuTreeNode, UserMenuInfo,
};
