//! Behaviour shared by every HDX object.
//!
//! An object holds its metadata as an ordered JSON map (`data`) plus the
//! previous snapshot (`old_data`). Reading an object from HDX moves the current
//! map into `old_data` and replaces it with what the server returned; saving
//! does the same with the result of the write. Updates of existing objects
//! merge the two snapshots before writing, which is how the metadata a caller
//! set up survives being reloaded from the server.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::configuration::{Configuration, ObjectSettings};
use crate::error::{HdxError, Result};
use crate::transport::{CallResult, FilesToUpload};
use crate::utilities::dictandlist::{merge_metadata, Metadata};

/// State common to all HDX objects.
#[derive(Debug, Clone)]
pub struct HdxObjectCore {
    configuration: Arc<Configuration>,
    data: Metadata,
    old_data: Option<Metadata>,
}

impl HdxObjectCore {
    pub fn new(configuration: Arc<Configuration>, data: Metadata) -> Self {
        HdxObjectCore {
            configuration,
            data,
            old_data: None,
        }
    }

    pub(crate) fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    pub(crate) fn data_mut(&mut self) -> &mut Metadata {
        &mut self.data
    }

    pub(crate) fn data_insert(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    pub(crate) fn old_data_mut(&mut self) -> Option<&mut Metadata> {
        self.old_data.as_mut()
    }
}

/// Returns true if a value counts as not filled in.
///
/// Booleans are never empty, so a required flag may legitimately be `false`.
pub(crate) fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Converts a JSON value into metadata, rejecting anything but an object.
pub(crate) fn into_metadata(value: Value, what: &str) -> Result<Metadata> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(HdxError::Structural(format!(
            "Expected {} to be an object but got {}",
            what, other
        ))),
    }
}

/// An HDX object backed by a remote action API.
///
/// Implementors name their object type and action table and give access to
/// their [`HdxObjectCore`]; everything else has a default implementation.
pub trait HdxObject: Sized {
    /// Object type as used in settings and messages.
    const OBJECT_TYPE: &'static str;

    /// Pairs of `(operation, remote action)`, e.g. `("show", "package_show")`.
    fn actions() -> &'static [(&'static str, &'static str)];

    fn core(&self) -> &HdxObjectCore;

    fn core_mut(&mut self) -> &mut HdxObjectCore;

    /// Builds the object around an existing core.
    fn from_core(core: HdxObjectCore) -> Self;

    /// Creates an object with initial metadata.
    fn new(configuration: Arc<Configuration>, data: Metadata) -> Self {
        Self::from_core(HdxObjectCore::new(configuration, data))
    }

    /// Called after `data` was replaced by the result of a remote read or write.
    fn on_data_replaced(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called after static metadata was merged into `data`.
    fn separate_sub_objects(&mut self) -> Result<()> {
        Ok(())
    }

    /// Looks up the remote action of an operation.
    fn action(operation: &str) -> Result<&'static str> {
        Self::actions()
            .iter()
            .find(|(name, _)| *name == operation)
            .map(|(_, action)| *action)
            .ok_or_else(|| {
                HdxError::Structural(format!(
                    "Action {} is not defined for {}!",
                    operation,
                    Self::OBJECT_TYPE
                ))
            })
    }

    fn configuration(&self) -> &Arc<Configuration> {
        &self.core().configuration
    }

    /// Settings block of this object type.
    fn object_settings(&self) -> ObjectSettings {
        self.configuration()
            .settings()
            .object_settings(Self::OBJECT_TYPE)
            .cloned()
            .unwrap_or_default()
    }

    fn data(&self) -> &Metadata {
        &self.core().data
    }

    fn old_data(&self) -> Option<&Metadata> {
        self.core().old_data.as_ref()
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.data().get(key)
    }

    /// Returns a field if it holds a string.
    fn get_str(&self, key: &str) -> Option<&str> {
        self.data().get(key).and_then(Value::as_str)
    }

    fn contains(&self, key: &str) -> bool {
        self.data().contains_key(key)
    }

    /// Sets a field.
    fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.core_mut().data.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Removes a field keeping the order of the remaining ones.
    fn remove(&mut self, key: &str) -> Option<Value> {
        self.core_mut().data.shift_remove(key)
    }

    /// Checks that all required fields of this object type are filled in.
    ///
    /// # Arguments
    ///
    /// * `ignore_fields` - Required fields to skip for this check.
    ///
    /// # Returns
    ///
    /// `HdxError::MissingField` for the first absent or empty field.
    fn check_required_fields(&self, ignore_fields: &[&str]) -> Result<()> {
        for field in &self.object_settings().required_fields {
            if ignore_fields.contains(&field.as_str()) {
                continue;
            }
            match self.data().get(field) {
                Some(value) if !is_empty_value(value) => {}
                _ => return Err(HdxError::missing_field(field, Self::OBJECT_TYPE)),
            }
        }
        Ok(())
    }

    /// Checks that there is metadata and that it carries `id_field`.
    ///
    /// # Returns
    ///
    /// The value of `id_field`.
    fn check_existing_object(&self, id_field: &str) -> Result<String> {
        if self.data().is_empty() {
            return Err(HdxError::Structural(format!(
                "No data in {}!",
                Self::OBJECT_TYPE
            )));
        }
        match self.data().get(id_field) {
            Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
            Some(value) if !is_empty_value(value) => Ok(value.to_string()),
            _ => Err(HdxError::Structural(format!(
                "No {} field (mandatory) in {}!",
                id_field,
                Self::OBJECT_TYPE
            ))),
        }
    }

    /// Invokes a remote action through the configured transport.
    fn call_remote(&self, action: &str, payload: &Value, files: &FilesToUpload) -> CallResult {
        debug!(
            object_type = Self::OBJECT_TYPE,
            action,
            files = files.len(),
            "Remote call"
        );
        self.configuration().remote().call(action, payload, files)
    }

    /// Reads an object from HDX.
    ///
    /// # Arguments
    ///
    /// * `value` - Identifier value to look up.
    /// * `field` - Field the identifier is sent as, usually `id`.
    /// * `extra` - Additional payload fields.
    /// * `operation` - Operation to use instead of `show`.
    ///
    /// # Returns
    ///
    /// `Some(result)` if found, `None` if HDX reported it as missing.
    fn read_from_remote(
        &self,
        value: &str,
        field: &str,
        extra: Option<Metadata>,
        operation: Option<&str>,
    ) -> Result<Option<Value>> {
        let action = Self::action(operation.unwrap_or("show"))?;
        let mut payload = extra.unwrap_or_default();
        payload.insert(field.to_string(), Value::String(value.to_string()));

        match self.call_remote(action, &Value::Object(payload), &Vec::new()) {
            CallResult::Ok(result) => Ok(Some(result)),
            CallResult::NotFound(message) => {
                debug!(
                    object_type = Self::OBJECT_TYPE,
                    %message,
                    "Not found: {}={}",
                    field,
                    value
                );
                Ok(None)
            }
            CallResult::Error(message) => Err(HdxError::transport(
                "read",
                &format!("{}={}", field, value),
                message,
            )),
        }
    }

    /// Loads the object from HDX into `data`, moving the current map to `old_data`.
    ///
    /// # Returns
    ///
    /// `true` if loaded, `false` if HDX has no such object.
    fn load_from_remote(&mut self, value: &str, field: &str) -> Result<bool> {
        let result = match self.read_from_remote(value, field, None, None)? {
            Some(result) => into_metadata(result, "read result")?,
            None => return Ok(false),
        };

        let core = self.core_mut();
        core.old_data = Some(std::mem::replace(&mut core.data, result));
        self.on_data_replaced()?;
        Ok(true)
    }

    /// Sends `payload` with the action of `operation` and returns the result.
    fn write_to_remote(
        &self,
        operation: &str,
        payload: &Value,
        identifier: &str,
        files: &FilesToUpload,
    ) -> Result<Value> {
        let action = Self::action(operation)?;
        match self.call_remote(action, payload, files) {
            CallResult::Ok(result) => Ok(result),
            CallResult::NotFound(message) | CallResult::Error(message) => {
                Err(HdxError::transport(operation, identifier, message))
            }
        }
    }

    /// Writes the current metadata with `operation` and takes over the result.
    ///
    /// On success `old_data` holds what was sent and `data` what HDX returned.
    ///
    /// # Arguments
    ///
    /// * `operation` - `create` or `update`.
    /// * `id_field` - Field used to name the object in error messages.
    /// * `files` - Files to upload alongside the metadata.
    /// * `force_active` - Whether to set `state` to `active` before writing.
    fn save_to_remote(
        &mut self,
        operation: &str,
        id_field: &str,
        files: FilesToUpload,
        force_active: bool,
    ) -> Result<()> {
        if force_active {
            self.core_mut()
                .data
                .insert("state".to_string(), Value::String("active".to_string()));
        }

        let identifier = self.get_str(id_field).unwrap_or("<unknown>").to_string();
        let payload = Value::Object(self.data().clone());
        let result = self.write_to_remote(operation, &payload, &identifier, &files)?;

        let core = self.core_mut();
        match result {
            Value::Object(result) => {
                core.old_data = Some(std::mem::replace(&mut core.data, result));
            }
            _ => core.old_data = Some(core.data.clone()),
        }
        self.on_data_replaced()
    }

    /// Merges `old_data` into `data`, re-validates and writes with `update`.
    fn merge_remote_update(
        &mut self,
        id_field: &str,
        ignore_fields: &[&str],
        files: FilesToUpload,
        force_active: bool,
    ) -> Result<()> {
        let old_data = self.core().old_data.clone().unwrap_or_default();
        merge_metadata(&mut self.core_mut().data, old_data)?;

        let settings = self.object_settings();
        let mut ignore: Vec<&str> = ignore_fields.to_vec();
        if let Some(field) = settings.ignore_on_update.as_deref() {
            ignore.push(field);
        }
        self.check_required_fields(&ignore)?;

        self.save_to_remote("update", id_field, files, force_active)
    }

    /// Updates an object that must already exist in HDX.
    fn update_in_remote(&mut self, id_field: &str, files: FilesToUpload) -> Result<()> {
        let identifier = self.check_existing_object(id_field)?;
        if !self.load_from_remote(&identifier, id_field)? {
            return Err(HdxError::NoExistingObject {
                object_type: Self::OBJECT_TYPE.to_string(),
                operation: "update".to_string(),
            });
        }
        self.merge_remote_update(id_field, &[], files, false)
    }

    /// Updates the object if it exists in HDX, otherwise creates it.
    fn create_in_remote(
        &mut self,
        id_field: &str,
        name_field: &str,
        files: FilesToUpload,
    ) -> Result<()> {
        self.check_required_fields(&[])?;

        if let Some(identifier) = self.get_str(id_field).map(str::to_string) {
            if self.load_from_remote(&identifier, id_field)? {
                tracing::warn!(
                    object_type = Self::OBJECT_TYPE,
                    "{} exists. Updating {}",
                    Self::OBJECT_TYPE,
                    identifier
                );
                return self.merge_remote_update(id_field, &[], files, false);
            }
        }

        self.save_to_remote("create", name_field, files, false)
    }

    /// Deletes the object from HDX.
    fn delete_in_remote(&mut self, id_field: &str) -> Result<()> {
        let identifier = self.check_existing_object(id_field)?;
        let mut payload = Metadata::new();
        payload.insert(id_field.to_string(), Value::String(identifier.clone()));

        self.write_to_remote("delete", &Value::Object(payload), &identifier, &Vec::new())?;
        Ok(())
    }

    /// Reads an object from HDX by identifier.
    ///
    /// # Returns
    ///
    /// The object if found, `None` if HDX has no such object.
    fn read_from_hdx(configuration: Arc<Configuration>, identifier: &str) -> Result<Option<Self>> {
        let mut object = Self::new(configuration, Metadata::new());
        if object.load_from_remote(identifier, "id")? {
            Ok(Some(object))
        } else {
            Ok(None)
        }
    }

    /// Runs the `search` action and returns the raw results.
    ///
    /// Both `{"count": n, "results": [...]}` and bare list results are accepted.
    fn search_remote(configuration: &Arc<Configuration>, payload: Metadata) -> Result<Vec<Value>> {
        let action = Self::action("search")?;
        let description = Value::Object(payload.clone()).to_string();

        match configuration
            .remote()
            .call(action, &Value::Object(payload), &Vec::new())
        {
            CallResult::Ok(Value::Object(mut result)) => match result.shift_remove("results") {
                Some(Value::Array(results)) => Ok(results),
                _ => Ok(Vec::new()),
            },
            CallResult::Ok(Value::Array(results)) => Ok(results),
            CallResult::Ok(_) => Ok(Vec::new()),
            CallResult::NotFound(message) | CallResult::Error(message) => {
                Err(HdxError::transport("search", &description, message))
            }
        }
    }

    /// Merges static metadata from a YAML file into `data`.
    ///
    /// A missing `.yaml` file is retried with the `.yml` extension.
    fn update_from_yaml(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let mut path = PathBuf::from(path.as_ref());
        if !path.is_file() && path.extension().map(|e| e == "yaml").unwrap_or(false) {
            path.set_extension("yml");
        }

        let content = fs::read_to_string(&path)?;
        let value: Value = serde_yaml::from_str(&content)?;
        self.merge_static(into_metadata(value, "static metadata")?)
    }

    /// Merges static metadata from a JSON file into `data`.
    fn update_from_json(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let content = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;
        self.merge_static(into_metadata(value, "static metadata")?)
    }

    #[doc(hidden)]
    fn merge_static(&mut self, metadata: Metadata) -> Result<()> {
        merge_metadata(&mut self.core_mut().data, metadata)?;
        self.separate_sub_objects()
    }
}
