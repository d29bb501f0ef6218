//! memr-core - Core library for memr
//!
//! This crate contains the entity models, the local store, the rank key
//! generator, and the sync coordinator shared by every memr client.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod rank;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Collection, EntityId, EntityKind, Note, Project, Task};
