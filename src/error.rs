//! Error types for HDX metadata operations.

use thiserror::Error;

/// Result type alias for HDX operations.
pub type Result<T> = std::result::Result<T, HdxError>;

/// Message reported by the transport when a remote action fails.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct RemoteError(pub String);

/// Errors that can occur while reading, reconciling or writing HDX objects.
#[derive(Error, Debug)]
pub enum HdxError {
    /// A required field is absent (or empty) at validation time.
    #[error("Field {field} is missing in {object_type}!")]
    MissingField {
        /// Name of the missing field.
        field: String,
        /// Kind of object being validated (dataset, resource, galleryitem).
        object_type: String,
    },

    /// The caller bypassed the sub-collection ownership rules or passed a
    /// value of the wrong kind.
    #[error("{0}")]
    Structural(String),

    /// The remote action failed for a given identifier.
    #[error("Failed when trying to {action} {identifier}!")]
    Transport {
        /// Action that was attempted (read, create, update, delete, ...).
        action: String,
        /// Identifier of the object the action was applied to.
        identifier: String,
        /// Underlying transport failure.
        #[source]
        cause: RemoteError,
    },

    /// An update was attempted on an object that does not exist remotely.
    #[error("No existing {object_type} to {operation}!")]
    NoExistingObject {
        /// Kind of object.
        object_type: String,
        /// Operation that needed the existing object.
        operation: String,
    },

    /// Deep merge met two values that cannot be combined.
    #[error("Cannot merge {from} into {into} at key {key}")]
    IncompatibleMerge {
        /// Key at which the merge failed, `<root>` for the top level.
        key: String,
        /// Rendering of the value being merged into.
        into: String,
        /// Rendering of the value being merged from.
        from: String,
    },

    /// Settings could not be assembled.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A spreadsheet could not be read while hashing it.
    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    /// IO operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl HdxError {
    pub(crate) fn missing_field(field: &str, object_type: &str) -> Self {
        HdxError::MissingField {
            field: field.to_string(),
            object_type: object_type.to_string(),
        }
    }

    pub(crate) fn transport(action: &str, identifier: &str, cause: impl Into<String>) -> Self {
        HdxError::Transport {
            action: action.to_string(),
            identifier: identifier.to_string(),
            cause: RemoteError(cause.into()),
        }
    }
}
