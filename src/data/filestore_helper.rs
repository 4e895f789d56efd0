//! Decides which resources of a dataset need their file uploaded.
//!
//! Files are hashed before the dataset is saved. New resources always queue
//! their file; updated resources only do so when size or hash differ from what
//! HDX already holds. Queued files are uploaded one by one after the dataset
//! itself has been written.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use tracing::debug;

use crate::data::hdxobject::HdxObject;
use crate::data::resource::Resource;
use crate::error::Result;
use crate::utilities::dictandlist::Metadata;
use crate::utilities::size_hash::get_size_and_hash;

/// Placeholder url of a resource whose file is still to be uploaded.
pub const TEMPORARY_URL: &str = "updated_by_file_upload_step";

/// Current UTC time without a timezone suffix, with microseconds.
pub fn now_utc_notz() -> String {
    chrono::Utc::now()
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Outcome of reconciling one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilestoreStatus {
    /// No file to upload; `last_modified` set to now.
    CreatedNoFile = 0,
    /// No file to upload and the data was not marked as updated.
    NoChangeNoFile = 1,
    /// File queued for upload.
    FileQueued = 2,
    /// File unchanged; not uploaded.
    UnchangedSameHash = 3,
    /// File unchanged; not uploaded and the given `last_modified` dropped.
    UnchangedSameHashNoTimestamp = 4,
}

impl FilestoreStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Collects the files to upload while a dataset's resources are reconciled.
#[derive(Debug, Default)]
pub struct FilestoreReconciler {
    filestore_resources: BTreeMap<usize, PathBuf>,
    force_update: bool,
}

impl FilestoreReconciler {
    /// # Arguments
    ///
    /// * `force_update` - Queue files even when size and hash are unchanged.
    pub fn new(force_update: bool) -> Self {
        FilestoreReconciler {
            filestore_resources: BTreeMap::new(),
            force_update,
        }
    }

    /// Files queued so far, keyed by resource index.
    pub fn filestore_resources(&self) -> &BTreeMap<usize, PathBuf> {
        &self.filestore_resources
    }

    pub fn into_filestore_resources(self) -> BTreeMap<usize, PathBuf> {
        self.filestore_resources
    }

    fn queue(&mut self, resource: &mut Resource, index: usize) -> Result<bool> {
        let file_to_upload = match resource.get_file_to_upload() {
            Some(path) => path.to_path_buf(),
            None => return Ok(false),
        };
        let file_format = resource.format().unwrap_or_default().to_lowercase();
        let (size, hash) = get_size_and_hash(&file_to_upload, &file_format)?;

        let data = resource.core_mut().data_mut();
        data.insert("url".to_string(), Value::String(TEMPORARY_URL.to_string()));
        data.insert("size".to_string(), Value::from(size));
        data.insert("hash".to_string(), Value::String(hash));

        debug!(index, file = %file_to_upload.display(), "Queued file for upload");
        self.filestore_resources.insert(index, file_to_upload);
        Ok(true)
    }

    /// Reconciles a resource that does not exist in HDX yet.
    ///
    /// # Arguments
    ///
    /// * `resource` - The new resource.
    /// * `index` - Position of the resource in the dataset.
    pub fn check_new_resource(
        &mut self,
        resource: &mut Resource,
        index: usize,
    ) -> Result<FilestoreStatus> {
        if self.queue(resource, index)? {
            Ok(FilestoreStatus::FileQueued)
        } else {
            Ok(FilestoreStatus::CreatedNoFile)
        }
    }

    /// Reconciles a resource merged into one read from HDX.
    ///
    /// # Arguments
    ///
    /// * `original` - The resource as read from HDX.
    /// * `resource` - The merged resource that will be written.
    /// * `index` - Position of the resource in the dataset.
    pub fn check_updated_resource(
        &mut self,
        original: &Metadata,
        resource: &mut Resource,
        index: usize,
    ) -> Result<FilestoreStatus> {
        if let Some(file_to_upload) = resource.get_file_to_upload().map(PathBuf::from) {
            let file_format = resource.format().unwrap_or_default().to_lowercase();
            let (size, hash) = get_size_and_hash(&file_to_upload, &file_format)?;

            let unchanged = original.get("size").and_then(Value::as_u64) == Some(size)
                && original.get("hash").and_then(Value::as_str) == Some(hash.as_str());

            if unchanged && !self.force_update {
                resource.restore_url_backup();
                return Ok(match resource.remove("last_modified") {
                    Some(_) => FilestoreStatus::UnchangedSameHashNoTimestamp,
                    None => FilestoreStatus::UnchangedSameHash,
                });
            }

            let data = resource.core_mut().data_mut();
            data.insert("url_type".to_string(), Value::from("upload"));
            data.insert("resource_type".to_string(), Value::from("file.upload"));
            data.shift_remove("tracking_summary");
            self.queue(resource, index)?;
            return Ok(FilestoreStatus::FileQueued);
        }

        if resource.url().is_some() && resource.url_type() != Some("upload") {
            let data = resource.core_mut().data_mut();
            data.insert("resource_type".to_string(), Value::from("api"));
            data.insert("url_type".to_string(), Value::from("api"));
        }

        if resource.is_marked_data_updated() {
            resource
                .core_mut()
                .data_insert("last_modified", Value::String(now_utc_notz()));
            resource.clear_data_updated();
            return Ok(FilestoreStatus::CreatedNoFile);
        }

        Ok(FilestoreStatus::NoChangeNoFile)
    }
}
