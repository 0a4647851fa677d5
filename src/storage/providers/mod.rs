//! Object storage implementations
//!
//! Concrete implementations of the ObjectStorage trait.

pub mod backblaze;

pub use backblaze::{BackblazeConfig, BackblazeStorage};
