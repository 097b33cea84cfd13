// src/config/mod.rs

//! DEM registry configuration.
//!
//! - [`model`] defines the registry: known DEM aliases and their source
//!   URLs, with built-in defaults.
//! - [`loader`] reads an optional TOML file to merge user-supplied aliases
//!   over the defaults.

pub mod loader;
pub mod model;

pub use loader::load_registry;
pub use model::{DemRegistry, RegistryFile};
