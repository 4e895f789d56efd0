//! The seam between HDX objects and the remote action API.
//!
//! Every remote interaction of the crate goes through [`Transport::call`]. The
//! HTTP implementation lives in [`crate::client::BaseClient`]; tests inject an
//! in-memory catalog instead.

use std::path::PathBuf;

use serde_json::Value;

/// Files to attach to an action call, as `(form field, local path)` pairs.
pub type FilesToUpload = Vec<(String, PathBuf)>;

/// Outcome of a remote action call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    /// The action succeeded and returned this result payload.
    Ok(Value),
    /// The addressed object does not exist remotely.
    NotFound(String),
    /// Any other failure, carrying the remote or transport message.
    Error(String),
}

impl CallResult {
    /// Returns true if the call succeeded
    pub fn is_ok(&self) -> bool {
        matches!(self, CallResult::Ok(_))
    }

    /// Returns true if the remote reported the object as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, CallResult::NotFound(_))
    }
}

/// A synchronous channel able to invoke named remote actions.
pub trait Transport: Send + Sync {
    /// Invokes `action` with `payload`, attaching `files` when non-empty.
    ///
    /// # Arguments
    ///
    /// * `action` - The remote action name, e.g. `package_show`.
    /// * `payload` - The JSON payload of the action.
    /// * `files` - Files to send alongside the payload.
    ///
    /// # Returns
    ///
    /// The three-way [`CallResult`].
    fn call(&self, action: &str, payload: &Value, files: &FilesToUpload) -> CallResult;
}
