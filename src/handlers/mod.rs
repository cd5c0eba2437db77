//! HTTP handlers. Every path is owned by the resource dispatcher.

pub mod resource;
pub use resource::*;
