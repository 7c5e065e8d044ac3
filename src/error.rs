//! Error types for the plugin host.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while hosting plugins.
#[derive(Error, Debug)]
pub enum Error {
    /// No plugin with the given name was discovered.
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// The plugin script failed to compile.
    #[error("compilation error in {plugin}: {message}")]
    Compilation {
        /// Plugin name.
        plugin: String,
        /// Compiler diagnostic.
        message: String,
    },

    /// The plugin script does not define a required hook.
    #[error("plugin {plugin} is missing required hook `{hook}`")]
    MissingHook {
        /// Plugin name.
        plugin: String,
        /// Hook name (`setup`, `update`, or `draw`).
        hook: &'static str,
    },

    /// The plugin's `setup` hook raised an error.
    #[error("setup failed for {plugin}: {message}")]
    SetupFailed {
        /// Plugin name.
        plugin: String,
        /// Error text captured from the script engine.
        message: String,
    },

    /// A per-tick hook (`update` or `draw`) raised an error.
    #[error("{hook} failed: {message}")]
    HookFailed {
        /// Hook name.
        hook: &'static str,
        /// Error text captured from the script engine.
        message: String,
    },

    /// The instance is not in a state that permits the operation.
    #[error("invalid plugin state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state.
        expected: String,
        /// Actual state.
        actual: String,
    },

    /// No plugin is currently selected.
    #[error("no plugin selected")]
    NoSelection,

    /// Filesystem watch error.
    #[error("watch error: {0}")]
    Watch(String),

    /// A patch request is already outstanding for this plugin.
    #[error("patch already in flight for plugin: {0}")]
    PatchInFlight(String),

    /// The code-generation collaborator failed or was unreachable.
    #[error("code generation failed: {0}")]
    CodeGen(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a plugin not found error.
    pub fn plugin_not_found(name: impl Into<String>) -> Self {
        Self::PluginNotFound(name.into())
    }

    /// Create a compilation error.
    pub fn compilation(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compilation {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create a setup failure error.
    pub fn setup_failed(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create a hook failure error.
    pub fn hook_failed(hook: &'static str, message: impl Into<String>) -> Self {
        Self::HookFailed {
            hook,
            message: message.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a code generation error.
    pub fn codegen(message: impl Into<String>) -> Self {
        Self::CodeGen(message.into())
    }

    /// Returns true if this error transitions the instance to Failed.
    ///
    /// Only load-time failures do; per-tick hook failures leave the
    /// instance Active with a stale world.
    pub fn fails_load(&self) -> bool {
        matches!(
            self,
            Self::Compilation { .. } | Self::MissingHook { .. } | Self::SetupFailed { .. }
        )
    }

    /// Returns true if this error is swallowed at the per-tick boundary.
    pub fn is_tick_local(&self) -> bool {
        matches!(self, Self::HookFailed { .. })
    }
}
