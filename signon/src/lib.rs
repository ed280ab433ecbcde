//! Session coordination for a hosted identity backend.
//!
//! The [`SessionCoordinator`] bridges UI-initiated actions (register,
//! login, logout, profile-image upload) to a remote identity/storage
//! provider reached through the [`IdentityBackend`] trait, and owns the
//! single current [`SessionState`]. State changes flow exclusively
//! through the backend's session-change subscription, so every consumer
//! observes the same value without polling.
//!
//! Two backends ship with the crate: [`CloudBackend`], an HTTP client
//! for the hosted REST services, and [`MemoryBackend`], an in-process
//! implementation for tests and local development.

pub mod backend;
pub mod cloud;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod memory;
pub mod upload;

pub use backend::{IdentityBackend, SessionEvents};
pub use cloud::CloudBackend;
pub use config::{CloudConfig, ConfigError};
pub use coordinator::{NewAccount, SessionCoordinator};
pub use error::{AuthError, AuthResult};
pub use identity::{Identity, ProfileChanges, SessionState};
pub use memory::MemoryBackend;
pub use upload::ImageSource;
