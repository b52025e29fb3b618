//! Swerve - Installable Script Runtime Bootstrap
//!
//! # Guarantees
//! 1. A bootstrap key is issued only to clients without the installed cookie
//! 2. Keys are 32 fresh bytes and never retained by the server
//! 3. Config is frozen once the server is built
//! 4. Known hashes use the browser integrity syntax
//! 5. Every other request reaches the wrapped application untouched

pub mod assets;
pub mod bootstrap;
pub mod config;
pub mod hashing;
pub mod server;

pub use assets::Assets;
pub use bootstrap::{BootstrapIssuer, BootstrapOutcome, KeyError, KeyObject, KeySource, OsKeySource};
pub use config::{Config, ConfigBuilder, ConfigError, ConfigOption, Import};
pub use hashing::{hash_contents, hash_dir, sri_hash, HashVariant};
pub use server::Swerve;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const CLIENT_PATH: &str = "/swerve.client.js";
pub const BOOTSTRAP_PATH: &str = "/swerve.bootstrap.js";
pub const CORE_PATH: &str = "/swerve.core.js";
pub const CONFIG_PATH: &str = "/swerve.config.json";

/// Cookie the client sets once installed. Read for presence only.
pub const INSTALLED_COOKIE: &str = "swerve.installed";
