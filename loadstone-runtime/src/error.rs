//! Runtime Error Handling
//!
//! Error types for the mod lifecycle using `thiserror`. Every fallible
//! lifecycle operation reports one of these kinds; JSON parse failures are
//! converted into [`ModError::Parse`] rather than surfacing as a panic or a
//! raw `serde_json` error.
//!
//! # Error Categories
//! - **Precondition errors**: unresolved dependencies, unsupported operations
//! - **Package errors**: missing binary entry, extraction or load failure
//! - **Binary modification errors**: patch and hook failures
//! - **Persistence errors**: file system and JSON parse failures

use thiserror::Error;

/// Result alias used throughout the runtime.
pub type ModResult<T> = Result<T, ModError>;

/// Mod lifecycle error kinds.
#[derive(Error, Debug, Clone)]
pub enum ModError {
    /// A declared dependency is missing, wrong-versioned, or not loaded.
    ///
    /// Returned before any side effect: a mod with unresolved dependencies
    /// never begins loading.
    #[error("mod '{id}' has unresolved dependencies")]
    Dependency { id: String },

    /// The mod declared that it does not support the requested operation.
    #[error("mod '{id}' does not support {operation}")]
    UnsupportedOperation { id: String, operation: &'static str },

    /// The package archive is missing the expected binary entry, or
    /// extraction/loading of the binary failed.
    #[error("extraction error: {message}")]
    Extraction { message: String },

    /// A patch could not be applied or restored at a specific address.
    #[error("patch at 0x{address:08X} failed: {message}")]
    Patch { address: u32, message: String },

    /// A hook could not be installed or enabled.
    #[error("hook error: {message}")]
    Hook { message: String },

    /// Dependency declarations form a cycle through this mod.
    #[error("cyclic dependency involving mod '{id}'")]
    CyclicDependency { id: String },

    /// Package deletion or directory creation failed.
    #[error("file system error: {message}\nSuggestion: {suggestion}")]
    FileSystem { message: String, suggestion: String },

    /// Persisted settings or saved data was malformed JSON.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The registry has no mod under the requested id.
    #[error("no mod with id '{id}' is installed")]
    UnknownMod { id: String },
}

impl ModError {
    /// Unresolved-dependency error for a mod.
    pub fn dependency(id: impl Into<String>) -> Self {
        Self::Dependency { id: id.into() }
    }

    /// Unsupported-operation error for a mod.
    pub fn unsupported(id: impl Into<String>, operation: &'static str) -> Self {
        Self::UnsupportedOperation {
            id: id.into(),
            operation,
        }
    }

    /// Extraction error with context.
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    /// Patch apply failure at an address.
    pub fn patch_apply(address: u32) -> Self {
        Self::Patch {
            address,
            message: "unable to apply patch".to_string(),
        }
    }

    /// Patch restore failure at an address.
    pub fn patch_restore(address: u32) -> Self {
        Self::Patch {
            address,
            message: "unable to restore patch".to_string(),
        }
    }

    /// Hook installation/enable failure.
    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook {
            message: message.into(),
        }
    }

    /// File system failure with an actionable suggestion.
    pub fn filesystem(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::FileSystem {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// JSON parse failure.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Lookup failure for an id the registry does not know.
    pub fn unknown_mod(id: impl Into<String>) -> Self {
        Self::UnknownMod { id: id.into() }
    }
}

impl From<serde_json::Error> for ModError {
    #[cold] // Error paths are cold
    fn from(err: serde_json::Error) -> Self {
        ModError::Parse {
            message: err.to_string(),
        }
    }
}
