//! Database models.

pub mod menu;
pub mod role;
pub mod user;

pub use menu::MenuNode;
pub use role::Role;
pub use user::User;
