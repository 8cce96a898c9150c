//! Deterministic building blocks for manifest generation.
//!
//! Manifests are generated from contributions of many independent producers
//! and regenerated on every build. This crate contains the parts of that
//! process which have to decide something, and which have to decide it the
//! same way every time:
//!
//! - [`env`] consolidates environment variable declarations from the
//!   configuration (see [`config`]) and from extensions into one
//!   conflict-free set.
//! - [`stable`] derives numbers, like node ports, from string keys.
//! - [`order`] establishes the order generated resources are emitted in.
pub mod config;
pub mod env;
pub mod logging;
pub mod order;
pub mod stable;
pub mod validation;

// External re-exports
pub use k8s_openapi;
