//! Domain models for Rollout.
//!
//! Canonical definitions for the core entities:
//! - `Application` / `ManifestTarget`: what to rewrite for a built image
//! - `Release`: in-flight edits for one manifest target
//! - `ImageTag` / `RegistryEvent`: the build that triggered a rollout

pub mod application;
pub mod error;
pub mod event;
pub mod release;

// Re-export main types and errors
pub use application::{Application, Filters, ManifestTarget};
pub use error::{Result, RolloutError};
pub use event::{ImageTag, RegistryAction, RegistryEvent};
pub use release::{GitAuthor, Release};
