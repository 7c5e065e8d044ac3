//! # gamedock
//!
//! Host for hot-reloadable game plugins: rhai scripts driving a live
//! rapier2d rigid-body world, reloaded when their source changes on disk,
//! with an asynchronous AI code-patch pipeline.
//!
//! This crate provides:
//! - **Plugin Discovery** - Scan a root directory for `game.rhai` packages
//! - **True Reload** - Every load compiles the entry file fresh against a new world
//! - **Failure Isolation** - A broken plugin never crashes the host loop
//! - **Hot Reload** - Debounced file watching raises an edge-triggered reload
//! - **Patch Pipeline** - Background full-file rewrites from a code generator
//! - **Host Loop** - The fixed-tick state machine tying it all together
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gamedock::{GeminiClient, HostConfig, HostLoop};
//!
//! let generator = Arc::new(GeminiClient::from_env()?);
//! let mut host = HostLoop::new(
//!     HostConfig::new().with_plugin_root("plugins"),
//!     generator,
//! )?;
//! host.run(&mut my_presenter);
//! ```
//!
//! ## Feature Flags
//!
//! - `http` (default): the reqwest-backed [`GeminiClient`] code generator

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod error;
mod host;
mod loader;
mod patch;
mod physics;
mod plugin;
mod registry;
mod script;
mod watcher;

#[cfg(feature = "http")]
mod codegen;

pub use error::{Error, Result};
pub use host::{Frame, HostConfig, HostEvent, HostLoop, Presenter};
pub use loader::{LoaderConfig, PluginLoader};
pub use patch::{extract_code_block, looks_like_error, CodeGenerator, PatchPipeline, PatchRequest};
pub use physics::PhysicsWorld;
pub use plugin::{GameRuntime, PluginDescriptor, PluginInstance, PluginStatus};
pub use registry::{PluginRegistry, ENTRY_FILE};
pub use script::{BodyId, DrawCommand, GameScript, SurfaceApi, WorldApi, WorldCommand};
pub use watcher::{Debounce, ReloadSignal, ReloadWatcher, WatchConfig};

#[cfg(feature = "http")]
pub use codegen::GeminiClient;

/// Crate version for compatibility checks.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
