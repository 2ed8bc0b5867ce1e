//! HTTP middleware components.

pub mod authorize;

pub use authorize::authorize_request;
