//! Service descriptors.
//!
//! ## Contents
//! - [`Service`], [`ServiceRef`] the capability set the supervisor drives
//! - [`ServiceFn`], [`ServiceBuilder`] closure-backed implementation

mod service;
mod service_fn;

pub use service::{Service, ServiceRef};
pub use service_fn::{ServiceBuilder, ServiceFn};
