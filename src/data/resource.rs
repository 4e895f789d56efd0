//! HDX resources.
//!
//! A resource either points at an external URL or carries a local file that is
//! uploaded to the HDX filestore. While an upload is pending the resource's
//! `url` is replaced by a placeholder and the previous URL is kept aside so it
//! can be put back if the upload turns out to be unnecessary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::configuration::Configuration;
use crate::data::dataset::Dataset;
use crate::data::filestore_helper::{now_utc_notz, TEMPORARY_URL};
use crate::data::hdxobject::{HdxObject, HdxObjectCore};
use crate::data::resource_matcher::MatchKey;
use crate::error::{HdxError, Result};
use crate::transport::FilesToUpload;
use crate::utilities::dictandlist::Metadata;

static ACTIONS: &[(&str, &str)] = &[
    ("show", "resource_show"),
    ("update", "resource_update"),
    ("create", "resource_create"),
    ("patch", "resource_patch"),
    ("delete", "resource_delete"),
    ("search", "resource_search"),
];

/// Form field files are uploaded under.
pub const UPLOAD_FIELD: &str = "upload";

/// An HDX resource.
#[derive(Debug, Clone)]
pub struct Resource {
    core: HdxObjectCore,
    file_to_upload: Option<PathBuf>,
    data_updated: bool,
    url_backup: Option<String>,
}

impl HdxObject for Resource {
    const OBJECT_TYPE: &'static str = "resource";

    fn actions() -> &'static [(&'static str, &'static str)] {
        ACTIONS
    }

    fn core(&self) -> &HdxObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HdxObjectCore {
        &mut self.core
    }

    fn from_core(core: HdxObjectCore) -> Self {
        Resource {
            core,
            file_to_upload: None,
            data_updated: false,
            url_backup: None,
        }
    }
}

impl MatchKey for Resource {
    fn match_id(&self) -> Option<&str> {
        self.get_str("id")
    }

    fn match_name(&self) -> Option<&str> {
        self.get_str("name")
    }

    fn match_grouping(&self) -> Option<&str> {
        self.get_str("grouping")
    }

    fn match_format(&self) -> Option<&str> {
        self.get_str("format")
    }
}

impl Resource {
    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    pub fn format(&self) -> Option<&str> {
        self.get_str("format")
    }

    pub fn url(&self) -> Option<&str> {
        self.get_str("url")
    }

    pub fn url_type(&self) -> Option<&str> {
        self.get_str("url_type")
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.get_str("resource_type")
    }

    pub fn grouping(&self) -> Option<&str> {
        self.get_str("grouping")
    }

    pub fn package_id(&self) -> Option<&str> {
        self.get_str("package_id")
    }

    pub fn size(&self) -> Option<u64> {
        self.get("size").and_then(Value::as_u64)
    }

    pub fn hash(&self) -> Option<&str> {
        self.get_str("hash")
    }

    /// The local file that will be or has been uploaded.
    pub fn get_file_to_upload(&self) -> Option<&Path> {
        self.file_to_upload.as_deref()
    }

    /// Sets a local file to upload, removing any existing url.
    ///
    /// The removed url is kept and restored by the filestore reconciliation
    /// when the file turns out to be unchanged.
    ///
    /// # Arguments
    ///
    /// * `file_to_upload` - Local path of the file.
    /// * `guess_format_from_suffix` - Whether to set the format from the file suffix.
    ///
    /// # Returns
    ///
    /// The guessed format, if one was set.
    pub fn set_file_to_upload(
        &mut self,
        file_to_upload: impl Into<PathBuf>,
        guess_format_from_suffix: bool,
    ) -> Option<String> {
        if let Some(Value::String(url)) = self.remove("url") {
            if url != TEMPORARY_URL {
                self.url_backup = Some(url);
            }
        }

        let file_to_upload = file_to_upload.into();
        let guessed = if guess_format_from_suffix {
            file_to_upload
                .extension()
                .and_then(|suffix| suffix.to_str())
                .map(|suffix| self.mapped_format(suffix))
        } else {
            None
        };

        if let Some(format) = &guessed {
            self.core_mut()
                .data_insert("format", Value::String(format.clone()));
        }

        self.file_to_upload = Some(file_to_upload);
        guessed
    }

    /// The url stashed by [`Resource::set_file_to_upload`].
    pub fn url_backup(&self) -> Option<&str> {
        self.url_backup.as_deref()
    }

    /// Puts the stashed url back, if there is one.
    pub(crate) fn restore_url_backup(&mut self) {
        if let Some(url) = self.url_backup.take() {
            self.core_mut().data_insert("url", Value::String(url));
        }
    }

    /// Marks the data behind an external url as updated.
    ///
    /// The next update sets `last_modified` to now.
    pub fn mark_data_updated(&mut self) {
        self.data_updated = true;
    }

    pub fn is_marked_data_updated(&self) -> bool {
        self.data_updated
    }

    pub(crate) fn clear_data_updated(&mut self) {
        self.data_updated = false;
    }

    /// Maps a free text format to its canonical name.
    fn mapped_format(&self, format: &str) -> String {
        let format = format.trim().to_lowercase();
        let format = format.trim_start_matches('.').to_string();
        match self.configuration().formats().get() {
            Some(mappings) => mappings.get(&format).cloned().unwrap_or(format),
            None => format,
        }
    }

    /// Lowercases the format, strips a leading dot and applies format mappings.
    pub fn clean_format(&mut self) -> Option<String> {
        let format = self.format()?.to_string();
        let cleaned = self.mapped_format(&format);
        self.core_mut()
            .data_insert("format", Value::String(cleaned.clone()));
        Some(cleaned)
    }

    /// Checks that either a url or a file to upload is given, but not both,
    /// and fills in `resource_type` and `url_type` accordingly.
    pub fn check_url_filetoupload(&mut self) -> Result<()> {
        match &self.file_to_upload {
            None => {
                if !self.contains("url") {
                    return Err(HdxError::Structural(
                        "Either a url or a file to upload must be supplied!".to_string(),
                    ));
                }
                self.set_default("resource_type", "api");
                self.set_default("url_type", "api");
            }
            Some(_) => {
                if let Some(url) = self.url() {
                    if url != TEMPORARY_URL {
                        return Err(HdxError::Structural(
                            "Either a url or a file to upload must be supplied not both!"
                                .to_string(),
                        ));
                    }
                }
                self.set_default("resource_type", "file.upload");
                self.set_default("url_type", "upload");
                self.remove("tracking_summary");
            }
        }
        self.clean_format();
        Ok(())
    }

    fn set_default(&mut self, key: &str, value: &str) {
        if !self.contains(key) {
            self.core_mut()
                .data_insert(key, Value::String(value.to_string()));
        }
    }

    /// Files parameter of a write.
    pub(crate) fn files(&self) -> FilesToUpload {
        match &self.file_to_upload {
            Some(path) => vec![(UPLOAD_FIELD.to_string(), path.clone())],
            None => Vec::new(),
        }
    }

    fn merge_resource_update(&mut self) -> Result<()> {
        if self.data_updated && self.file_to_upload.is_none() {
            if let Some(old_data) = self.core_mut().old_data_mut() {
                old_data.insert("last_modified".to_string(), Value::String(now_utc_notz()));
            }
            self.data_updated = false;
        }
        let files = self.files();
        self.merge_remote_update("id", &[], files, true)
    }

    /// Updates the resource, which must exist in HDX.
    pub fn update_in_hdx(&mut self) -> Result<()> {
        let id = self.check_existing_object("id")?;
        if self.file_to_upload.is_some() {
            self.remove("url");
        }
        if !self.load_from_remote(&id, "id")? {
            return Err(HdxError::NoExistingObject {
                object_type: Self::OBJECT_TYPE.to_string(),
                operation: "update".to_string(),
            });
        }
        self.merge_resource_update()
    }

    /// Updates the resource if it exists in HDX, otherwise creates it.
    pub fn create_in_hdx(&mut self) -> Result<()> {
        self.check_url_filetoupload()?;
        self.check_required_fields(&[])?;

        if let Some(id) = self.id().map(str::to_string) {
            if self.load_from_remote(&id, "id")? {
                warn!("resource exists. Updating {}", id);
                if self.file_to_upload.is_some() {
                    if let Some(old_data) = self.core_mut().old_data_mut() {
                        old_data.shift_remove("url");
                    }
                }
                return self.merge_resource_update();
            }
        }

        let files = self.files();
        self.save_to_remote("create", "name", files, true)
    }

    /// Deletes the resource from HDX.
    pub fn delete_from_hdx(&mut self) -> Result<()> {
        self.delete_in_remote("id")
    }

    /// Returns the dataset containing this resource.
    pub fn get_dataset(&self) -> Result<Option<Dataset>> {
        let package_id = self
            .package_id()
            .ok_or_else(|| HdxError::Structural("Resource has no package id!".to_string()))?;
        Dataset::read_from_hdx(self.configuration().clone(), package_id)
    }

    /// Searches resources. Dataset metadata is not searched.
    ///
    /// # Arguments
    ///
    /// * `configuration` - The configuration to use.
    /// * `query` - A `field:term` query, e.g. `name:ACLED`.
    /// * `options` - Extra payload such as `order_by`, `offset` or `limit`.
    pub fn search_in_hdx(
        configuration: Arc<Configuration>,
        query: &str,
        options: Option<Metadata>,
    ) -> Result<Vec<Resource>> {
        let mut payload = options.unwrap_or_default();
        payload.insert("query".to_string(), Value::String(query.to_string()));

        Self::search_remote(&configuration, payload)?
            .into_iter()
            .map(|result| {
                crate::data::hdxobject::into_metadata(result, "resource")
                    .map(|data| Resource::new(configuration.clone(), data))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::test_utils::{configuration, metadata};

    use super::*;

    #[test]
    fn test_set_file_to_upload_stashes_url() {
        // Arrange
        let (config, _) = configuration();
        let mut resource = Resource::new(
            config,
            metadata(json!({"name": "r", "url": "http://example.org/old.csv"})),
        );

        // Act
        let guessed = resource.set_file_to_upload("data/new.CSV", true);

        // Assert
        assert_eq!(guessed.as_deref(), Some("csv"));
        assert!(resource.url().is_none());
        assert_eq!(resource.url_backup(), Some("http://example.org/old.csv"));
        assert_eq!(resource.get_file_to_upload(), Some(Path::new("data/new.CSV")));

        resource.restore_url_backup();
        assert_eq!(resource.url(), Some("http://example.org/old.csv"));
        assert!(resource.url_backup().is_none());
    }

    #[test]
    fn test_check_url_filetoupload_requires_one() {
        let (config, _) = configuration();
        let mut resource = Resource::new(config, metadata(json!({"name": "r"})));

        let result = resource.check_url_filetoupload();

        assert_eq!(
            result.unwrap_err().to_string(),
            "Either a url or a file to upload must be supplied!"
        );
    }

    #[test]
    fn test_check_url_filetoupload_rejects_both() {
        let (config, _) = configuration();
        let mut resource = Resource::new(config, metadata(json!({"name": "r"})));
        resource.set_file_to_upload("a.csv", false);
        resource.set("url", "http://example.org/a.csv").unwrap();

        let result = resource.check_url_filetoupload();

        assert_eq!(
            result.unwrap_err().to_string(),
            "Either a url or a file to upload must be supplied not both!"
        );
    }

    #[test]
    fn test_check_url_filetoupload_sets_types() {
        // Arrange
        let (config, _) = configuration();
        let mut api = Resource::new(
            config.clone(),
            metadata(json!({"name": "a", "url": "http://x", "format": ".CSV"})),
        );
        let mut upload = Resource::new(
            config,
            metadata(json!({"name": "u", "format": "Comma Separated Values", "tracking_summary": {}})),
        );
        upload.set_file_to_upload("u.csv", false);

        // Act
        api.check_url_filetoupload().unwrap();
        upload.check_url_filetoupload().unwrap();

        // Assert
        assert_eq!(api.url_type(), Some("api"));
        assert_eq!(api.resource_type(), Some("api"));
        assert_eq!(api.format(), Some("csv"));
        assert_eq!(upload.url_type(), Some("upload"));
        assert_eq!(upload.resource_type(), Some("file.upload"));
        assert_eq!(upload.format(), Some("csv"));
        assert!(!upload.contains("tracking_summary"));
    }

    #[test]
    fn test_create_in_hdx_uploads_file() {
        // Arrange
        let (config, fake) = configuration();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        let mut resource = Resource::new(
            config,
            metadata(json!({"package_id": "p1", "name": "data", "format": "csv"})),
        );
        resource.set_file_to_upload(&path, false);

        // Act
        resource.create_in_hdx().unwrap();

        // Assert
        assert!(resource.id().is_some());
        assert_eq!(resource.url_type(), Some("upload"));
        assert!(resource.url().unwrap().ends_with("/download/data.csv"));
        let calls = fake.calls();
        assert_eq!(calls.last().unwrap().action, "resource_create");
        assert_eq!(calls.last().unwrap().files.len(), 1);
    }

    #[test]
    fn test_update_in_hdx_sets_last_modified_when_marked() {
        // Arrange
        let (config, fake) = configuration();
        fake.insert_resource(json!({
            "id": "r1", "package_id": "p1", "name": "api", "format": "json",
            "url": "http://example.org/api", "url_type": "api"
        }));
        let mut resource = Resource::new(
            config,
            metadata(json!({"id": "r1", "description": "new"})),
        );
        resource.mark_data_updated();

        // Act
        resource.update_in_hdx().unwrap();

        // Assert
        assert!(!resource.is_marked_data_updated());
        assert_eq!(resource.get_str("description"), Some("new"));
        assert_eq!(resource.url(), Some("http://example.org/api"));
        let last_modified = resource.get_str("last_modified").unwrap();
        assert_eq!(last_modified.len(), 26);
        assert!(!last_modified.ends_with('Z'));
    }

    #[test]
    fn test_update_in_hdx_missing_resource() {
        let (config, _) = configuration();
        let mut resource = Resource::new(config, metadata(json!({"id": "nope", "name": "x"})));

        let result = resource.update_in_hdx();

        assert_eq!(
            result.unwrap_err().to_string(),
            "No existing resource to update!"
        );
    }

    #[test]
    fn test_search_in_hdx() {
        let (config, fake) = configuration();
        fake.insert_resource(json!({"id": "r1", "package_id": "p1", "name": "ACLED data", "format": "csv"}));
        fake.insert_resource(json!({"id": "r2", "package_id": "p1", "name": "Other", "format": "csv"}));

        let resources = Resource::search_in_hdx(config, "name:ACLED", None).unwrap();

        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].id(), Some("r1"));
    }

    #[test]
    fn test_get_dataset_requires_package_id() {
        let (config, _) = configuration();
        let resource = Resource::new(config, metadata(json!({"name": "x"})));

        assert!(matches!(resource.get_dataset(), Err(HdxError::Structural(_))));
    }
}
