//! HDX datasets and the reconciliation of their resources and gallery.
//!
//! A caller describes the desired state of a dataset, including its resources
//! and gallery items, and calls [`Dataset::create_in_hdx`] or
//! [`Dataset::update_in_hdx`]. The dataset on HDX is loaded first. If it does
//! not exist it is created, otherwise the caller's metadata is merged into what
//! HDX holds:
//!
//! 1. top level fields are merged, the caller's values winning;
//! 2. the server's resources are paired with the caller's, matched pairs are
//!    merged, unknown caller resources are appended and, on request, server
//!    resources the caller did not mention are dropped;
//! 3. files are hashed and only queued for upload when they differ from what
//!    HDX already has;
//! 4. the dataset is saved, then queued files are uploaded resource by
//!    resource, then resources are reordered and gallery items saved.
//!
//! Resources and gallery items are never set through [`HdxObject::set`]; they
//! live in typed lists next to the metadata and are only put back into it for
//! the save.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::configuration::Configuration;
use crate::data::filestore_helper::{now_utc_notz, FilestoreReconciler};
use crate::data::galleryitem::GalleryItem;
use crate::data::hdxobject::{into_metadata, HdxObject, HdxObjectCore};
use crate::data::resource::Resource;
use crate::data::resource_matcher::{match_lists, match_single};
use crate::data::search::SearchQuery;
use crate::error::{HdxError, Result};
use crate::logging::object_span;
use crate::utilities::dictandlist::{merge_metadata, Metadata};

static ACTIONS: &[(&str, &str)] = &[
    ("show", "package_show"),
    ("update", "package_update"),
    ("create", "package_create"),
    ("delete", "hdx_dataset_purge"),
    ("search", "package_search"),
    ("reorder", "package_resource_reorder"),
];

/// Options of [`Dataset::create_in_hdx`] and [`Dataset::update_in_hdx`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOptions {
    /// Reconcile the caller's resources with the server's.
    pub update_resources: bool,
    /// Reconcile the caller's gallery with the server's.
    pub update_gallery: bool,
    /// Pair resources by id, name and format. When false, pair by position.
    pub match_resources_by_metadata: bool,
    /// Drop server resources the caller did not mention.
    pub remove_additional_resources: bool,
    /// Reorder resources on HDX to the caller's order.
    pub match_resource_order: bool,
    /// Top level keys removed before saving.
    pub keys_to_delete: Vec<String>,
    /// Required fields not checked. Prefix resource fields with `resource:`.
    pub ignore_fields: Vec<String>,
    /// Skip all required field checks.
    pub ignore_check: bool,
    /// Allow creating a dataset without resources.
    pub allow_no_resources: bool,
    /// Upload files even when size and hash are unchanged.
    pub force_update: bool,
    /// Identifies the script in `updated_by_script`. Defaults to the user agent.
    pub updated_by_script: Option<String>,
    /// UUID tying together datasets updated in one batch.
    pub batch: Option<String>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        UpdateOptions {
            update_resources: true,
            update_gallery: true,
            match_resources_by_metadata: true,
            remove_additional_resources: false,
            match_resource_order: false,
            keys_to_delete: Vec::new(),
            ignore_fields: Vec::new(),
            ignore_check: false,
            allow_no_resources: false,
            force_update: false,
            updated_by_script: None,
            batch: None,
        }
    }
}

impl UpdateOptions {
    fn validate(&self) -> Result<()> {
        if let Some(batch) = &self.batch {
            if Uuid::parse_str(batch).is_err() {
                return Err(HdxError::Structural(format!(
                    "{} is not a valid UUID!",
                    batch
                )));
            }
        }
        Ok(())
    }

    /// Ignored fields that apply to the dataset itself.
    fn dataset_ignore_fields(&self) -> Vec<&str> {
        self.ignore_fields
            .iter()
            .filter(|field| !field.starts_with("resource:"))
            .map(String::as_str)
            .collect()
    }

    /// Ignored fields that apply to resources. `package_id` is always ignored.
    fn resource_ignore_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self
            .ignore_fields
            .iter()
            .filter_map(|field| field.strip_prefix("resource:"))
            .map(str::trim)
            .collect();
        if !fields.contains(&"package_id") {
            fields.push("package_id");
        }
        fields
    }
}

/// A resource to add to a dataset.
#[derive(Debug, Clone)]
pub enum ResourceInput {
    Resource(Resource),
    Metadata(Metadata),
}

impl From<Resource> for ResourceInput {
    fn from(resource: Resource) -> Self {
        ResourceInput::Resource(resource)
    }
}

impl From<Metadata> for ResourceInput {
    fn from(metadata: Metadata) -> Self {
        ResourceInput::Metadata(metadata)
    }
}

/// An HDX dataset with its resources and gallery.
#[derive(Debug, Clone)]
pub struct Dataset {
    core: HdxObjectCore,
    resources: Vec<Resource>,
    old_resources: Vec<Resource>,
    gallery: Vec<GalleryItem>,
    old_gallery: Vec<GalleryItem>,
    include_gallery: bool,
}

fn take_objects(data: &mut Metadata, key: &str) -> Result<Vec<Metadata>> {
    match data.shift_remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| into_metadata(item, key))
            .collect(),
        Some(other) => Err(HdxError::Structural(format!(
            "Expected {} to be a list but got {}",
            key, other
        ))),
    }
}

/// Like [`take_objects`] but skips entries that are not objects.
fn keep_objects(data: &mut Metadata, key: &str) -> Vec<Metadata> {
    let items = match data.shift_remove(key) {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => {
            warn!("Ignoring {} of dataset that is not a list: {}", key, other);
            return Vec::new();
        }
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            other => {
                warn!("Ignoring entry of {} that is not an object: {}", key, other);
                None
            }
        })
        .collect()
}

/// Merges items into `list` by `key_field`, appending the ones not found.
fn merge_into_list<T: HdxObject>(
    list: &mut Vec<T>,
    items: Vec<Metadata>,
    key_field: &str,
    configuration: &Arc<Configuration>,
) -> Result<()> {
    for item in items {
        let key = item.get(key_field).cloned();
        let existing = list
            .iter_mut()
            .find(|object| key.is_some() && object.get(key_field) == key.as_ref());
        match existing {
            Some(object) => merge_metadata(object.core_mut().data_mut(), item)?,
            None => list.push(T::new(configuration.clone(), item)),
        }
    }
    Ok(())
}

fn resource_order_key(resource: &Resource) -> (Option<String>, Option<String>) {
    (
        resource.name().map(str::to_string),
        resource.format().map(str::to_lowercase),
    )
}

impl HdxObject for Dataset {
    const OBJECT_TYPE: &'static str = "dataset";

    fn actions() -> &'static [(&'static str, &'static str)] {
        ACTIONS
    }

    fn core(&self) -> &HdxObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HdxObjectCore {
        &mut self.core
    }

    fn from_core(mut core: HdxObjectCore) -> Self {
        let resources = keep_objects(core.data_mut(), "resources");
        let gallery = keep_objects(core.data_mut(), "gallery");
        Dataset::assemble(core, resources, gallery)
    }

    fn on_data_replaced(&mut self) -> Result<()> {
        let configuration = self.configuration().clone();
        let resources = take_objects(self.core_mut().data_mut(), "resources")?
            .into_iter()
            .map(|data| Resource::new(configuration.clone(), data))
            .collect();
        self.old_resources = std::mem::replace(&mut self.resources, resources);
        Ok(())
    }

    fn separate_sub_objects(&mut self) -> Result<()> {
        let configuration = self.configuration().clone();
        let resources = take_objects(self.core_mut().data_mut(), "resources")?;
        merge_into_list(&mut self.resources, resources, "name", &configuration)?;
        let gallery = take_objects(self.core_mut().data_mut(), "gallery")?;
        merge_into_list(&mut self.gallery, gallery, "title", &configuration)
    }

    /// Sets a field. `resources` and `gallery` are rejected.
    fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        match key {
            "resources" => Err(HdxError::Structural(
                "Add resources using add_update_resource or add_update_resources!".to_string(),
            )),
            "gallery" => Err(HdxError::Structural(
                "Add gallery item using add_update_gallery_item or add_update_gallery!"
                    .to_string(),
            )),
            _ => {
                self.core_mut().data_insert(key, value.into());
                Ok(())
            }
        }
    }

    /// Reads a dataset by id or name, including its gallery.
    fn read_from_hdx(configuration: Arc<Configuration>, identifier: &str) -> Result<Option<Self>> {
        let mut dataset = Dataset::new(configuration, Metadata::new());
        if dataset.load_dataset(identifier)? {
            Ok(Some(dataset))
        } else {
            Ok(None)
        }
    }
}

impl Dataset {
    fn assemble(core: HdxObjectCore, resources: Vec<Metadata>, gallery: Vec<Metadata>) -> Self {
        let configuration = core.configuration().clone();
        Dataset {
            core,
            resources: resources
                .into_iter()
                .map(|data| Resource::new(configuration.clone(), data))
                .collect(),
            old_resources: Vec::new(),
            gallery: gallery
                .into_iter()
                .map(|data| GalleryItem::new(configuration.clone(), data))
                .collect(),
            old_gallery: Vec::new(),
            include_gallery: true,
        }
    }

    /// Creates a dataset, failing if `resources` or `gallery` are not lists of
    /// objects. [`HdxObject::new`] skips such entries instead.
    pub fn from_metadata(configuration: Arc<Configuration>, mut data: Metadata) -> Result<Self> {
        let resources = take_objects(&mut data, "resources")?;
        let gallery = take_objects(&mut data, "gallery")?;
        Ok(Dataset::assemble(
            HdxObjectCore::new(configuration, data),
            resources,
            gallery,
        ))
    }

    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    pub fn title(&self) -> Option<&str> {
        self.get_str("title")
    }

    /// Whether the gallery is read and written along with the dataset.
    pub fn set_include_gallery(&mut self, include_gallery: bool) {
        self.include_gallery = include_gallery;
    }

    pub fn get_resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Mutable access to the resources, e.g. to set a file to upload.
    pub fn get_resources_mut(&mut self) -> &mut [Resource] {
        &mut self.resources
    }

    pub fn get_resource(&self, index: usize) -> Option<&Resource> {
        self.resources.get(index)
    }

    pub fn number_of_resources(&self) -> usize {
        self.resources.len()
    }

    pub fn get_gallery(&self) -> &[GalleryItem] {
        &self.gallery
    }

    /// Public page of the dataset on HDX.
    pub fn get_hdx_url(&self) -> Option<String> {
        self.name().map(|name| self.configuration().dataset_url(name))
    }

    /// The metadata with resources and gallery put back in.
    pub fn to_value(&self) -> Value {
        let mut data = self.data().clone();
        data.insert(
            "resources".to_string(),
            self.resources
                .iter()
                .map(|resource| Value::Object(resource.data().clone()))
                .collect(),
        );
        if self.include_gallery {
            data.insert(
                "gallery".to_string(),
                self.gallery
                    .iter()
                    .map(|item| Value::Object(item.data().clone()))
                    .collect(),
            );
        }
        Value::Object(data)
    }

    /// Loads the dataset by id or name, moving the current state aside.
    ///
    /// # Returns
    ///
    /// `true` if the dataset exists on HDX.
    pub fn load_dataset(&mut self, identifier: &str) -> Result<bool> {
        if !self.load_from_remote(identifier, "id")? {
            return Ok(false);
        }

        if self.include_gallery {
            let dataset_id = self.id().unwrap_or(identifier).to_string();
            let gallery = GalleryItem::list_for_dataset(self.configuration().clone(), &dataset_id)?;
            self.old_gallery = std::mem::replace(&mut self.gallery, gallery);
        }
        Ok(true)
    }

    /// Checks the required fields of the dataset, its resources and gallery.
    ///
    /// # Arguments
    ///
    /// * `ignore_fields` - Fields to skip. Prefix resource fields with `resource:`.
    /// * `allow_no_resources` - Whether a dataset without resources is valid.
    pub fn check_all_required_fields(
        &self,
        ignore_fields: &[String],
        allow_no_resources: bool,
    ) -> Result<()> {
        let options = UpdateOptions {
            ignore_fields: ignore_fields.to_vec(),
            ..Default::default()
        };
        self.check_required_fields(&options.dataset_ignore_fields())?;

        if self.resources.is_empty() && !allow_no_resources {
            return Err(HdxError::Structural(
                "There are no resources! Please add at least one resource!".to_string(),
            ));
        }
        let resource_ignore_fields = options.resource_ignore_fields();
        for resource in &self.resources {
            resource.check_required_fields(&resource_ignore_fields)?;
        }
        for item in &self.gallery {
            item.check_required_fields(&["dataset_id"])?;
        }
        Ok(())
    }

    fn to_resource(&self, input: ResourceInput) -> Resource {
        match input {
            ResourceInput::Resource(resource) => resource,
            ResourceInput::Metadata(data) => Resource::new(self.configuration().clone(), data),
        }
    }

    fn check_no_dataset_id(resource: &Resource, ignore_datasetid: bool) -> Result<()> {
        if resource.contains("package_id") && !ignore_datasetid {
            return Err(HdxError::Structural(format!(
                "Resource {} being added already has a dataset id!",
                resource.name().unwrap_or_default()
            )));
        }
        Ok(())
    }

    fn merge_into_resource(&mut self, index: usize, resource: Resource) -> Result<()> {
        let existing = &mut self.resources[index];
        merge_metadata(existing.core_mut().data_mut(), resource.data().clone())?;
        if let Some(path) = resource.get_file_to_upload() {
            existing.set_file_to_upload(path.to_path_buf(), false);
        }
        if resource.is_marked_data_updated() {
            existing.mark_data_updated();
        }
        Ok(())
    }

    /// Adds a resource or merges it into the matching one.
    ///
    /// # Arguments
    ///
    /// * `resource` - A [`Resource`] or its metadata.
    /// * `ignore_datasetid` - Accept a resource that already has a `package_id`.
    pub fn add_update_resource(
        &mut self,
        resource: impl Into<ResourceInput>,
        ignore_datasetid: bool,
    ) -> Result<()> {
        let mut resource = self.to_resource(resource.into());
        Self::check_no_dataset_id(&resource, ignore_datasetid)?;
        resource.check_url_filetoupload()?;

        match match_single(&self.resources, &resource) {
            Some(index) => self.merge_into_resource(index, resource),
            None => {
                self.resources.push(resource);
                Ok(())
            }
        }
    }

    /// Adds resources or merges them into the matching ones.
    pub fn add_update_resources(
        &mut self,
        resources: Vec<ResourceInput>,
        ignore_datasetid: bool,
    ) -> Result<()> {
        let mut resources: Vec<Resource> = resources
            .into_iter()
            .map(|input| self.to_resource(input))
            .collect();
        for resource in &resources {
            Self::check_no_dataset_id(resource, ignore_datasetid)?;
        }
        for resource in &mut resources {
            resource.check_url_filetoupload()?;
        }

        let result = match_lists(&self.resources, &resources);
        let mut resources: Vec<Option<Resource>> = resources.into_iter().map(Some).collect();
        for (index, new_index) in result.pairs() {
            if let Some(resource) = resources[new_index].take() {
                self.merge_into_resource(index, resource)?;
            }
        }
        for new_index in result.new_unmatched {
            if let Some(resource) = resources[new_index].take() {
                self.resources.push(resource);
            }
        }
        Ok(())
    }

    /// Removes a resource by id or name.
    ///
    /// # Arguments
    ///
    /// * `identifier` - Id of the resource, or its name.
    /// * `delete_remote` - Also delete the resource from HDX.
    ///
    /// # Returns
    ///
    /// `true` if a resource was removed.
    pub fn delete_resource(&mut self, identifier: &str, delete_remote: bool) -> Result<bool> {
        let index = self
            .resources
            .iter()
            .position(|r| r.id() == Some(identifier))
            .or_else(|| self.resources.iter().position(|r| r.name() == Some(identifier)));

        let index = match index {
            Some(index) => index,
            None => return Ok(false),
        };
        if delete_remote && self.resources[index].id().is_some() {
            self.resources[index].delete_from_hdx()?;
        }
        self.resources.remove(index);
        Ok(true)
    }

    /// Reorders the resources on HDX and locally.
    ///
    /// Resources not named in `resource_ids` keep their relative order after
    /// the named ones.
    pub fn reorder_resources(&mut self, resource_ids: &[String]) -> Result<()> {
        let dataset_id = self.id().map(str::to_string).ok_or_else(|| {
            HdxError::Structural(
                "Dataset has no id! It must be read, created or updated first.".to_string(),
            )
        })?;

        let payload = json!({"id": dataset_id, "order": resource_ids});
        let result = self.write_to_remote("reorder", &payload, &dataset_id, &Vec::new())?;
        let ordered_ids: Vec<&str> = result
            .get("order")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut remaining: Vec<Option<Resource>> = std::mem::take(&mut self.resources)
            .into_iter()
            .map(Some)
            .collect();
        let mut reordered = Vec::with_capacity(remaining.len());
        for id in ordered_ids {
            let position = remaining.iter().position(|slot| {
                slot.as_ref()
                    .map_or(false, |resource| resource.id() == Some(id))
            });
            if let Some(resource) = position.and_then(|index| remaining[index].take()) {
                reordered.push(resource);
            }
        }
        reordered.extend(remaining.into_iter().flatten());
        self.resources = reordered;
        Ok(())
    }

    /// Adds a gallery item or merges it into the one with the same title.
    pub fn add_update_gallery_item(&mut self, item: GalleryItem) -> Result<()> {
        if item.contains("dataset_id") {
            return Err(HdxError::Structural(format!(
                "Gallery item {} being added already has a dataset id!",
                item.title().unwrap_or_default()
            )));
        }
        let configuration = self.configuration().clone();
        merge_into_list(&mut self.gallery, vec![item.data().clone()], "title", &configuration)
    }

    pub fn add_update_gallery(&mut self, items: Vec<GalleryItem>) -> Result<()> {
        for item in items {
            self.add_update_gallery_item(item)?;
        }
        Ok(())
    }

    /// Deletes a gallery item from HDX and the dataset.
    ///
    /// # Returns
    ///
    /// `true` if an item with this id was found.
    pub fn delete_gallery_item(&mut self, id: &str) -> Result<bool> {
        match self.gallery.iter().position(|item| item.id() == Some(id)) {
            Some(index) => {
                self.gallery[index].delete_from_hdx()?;
                self.gallery.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Updates the dataset if it exists in HDX, otherwise creates it.
    pub fn create_in_hdx(&mut self, options: &UpdateOptions) -> Result<()> {
        let _span = object_span(
            Self::OBJECT_TYPE,
            "create",
            self.name().unwrap_or_default(),
        )
        .entered();

        options.validate()?;
        if !options.ignore_check {
            self.check_all_required_fields(&options.ignore_fields, options.allow_no_resources)?;
        }

        let mut loaded = false;
        if let Some(id) = self.id().map(str::to_string) {
            loaded = self.load_dataset(&id)?;
            if !loaded {
                warn!("Failed to load dataset with id {}", id);
            }
        }
        if !loaded {
            let name = self.check_existing_object("name")?;
            loaded = self.load_dataset(&name)?;
        }

        if loaded {
            self.merge_update(options)?;
            info!("Updated {}", self.get_hdx_url().unwrap_or_default());
        } else {
            self.create_fresh(options)?;
            info!("Created {}", self.get_hdx_url().unwrap_or_default());
        }
        Ok(())
    }

    /// Updates the dataset, which must exist in HDX.
    pub fn update_in_hdx(&mut self, options: &UpdateOptions) -> Result<()> {
        let _span = object_span(
            Self::OBJECT_TYPE,
            "update",
            self.name().unwrap_or_default(),
        )
        .entered();

        options.validate()?;

        let mut loaded = false;
        if self.contains("id") {
            let id = self.check_existing_object("id")?;
            loaded = self.load_dataset(&id)?;
            if !loaded {
                warn!("Failed to load dataset with id {}", id);
            }
        }
        if !loaded {
            let name = self.check_existing_object("name")?;
            if !self.load_dataset(&name)? {
                return Err(HdxError::NoExistingObject {
                    object_type: Self::OBJECT_TYPE.to_string(),
                    operation: "update".to_string(),
                });
            }
        }

        self.merge_update(options)?;
        info!("Updated {}", self.get_hdx_url().unwrap_or_default());
        Ok(())
    }

    fn create_fresh(&mut self, options: &UpdateOptions) -> Result<()> {
        let mut reconciler = FilestoreReconciler::new(options.force_update);
        for (index, resource) in self.resources.iter_mut().enumerate() {
            reconciler.check_new_resource(resource, index)?;
        }
        for key in &options.keys_to_delete {
            self.remove(key);
        }

        self.save_dataset("create", "name", options)?;
        self.upload_files(reconciler.into_filestore_resources())?;

        if self.include_gallery {
            let dataset_id = self.check_existing_object("id")?;
            for item in self.gallery.iter_mut() {
                item.core_mut()
                    .data_insert("dataset_id", Value::String(dataset_id.clone()));
                item.check_required_fields(&[])?;
                item.create_in_hdx()?;
            }
        }
        Ok(())
    }

    fn merge_update(&mut self, options: &UpdateOptions) -> Result<()> {
        let old_data = self.old_data().cloned().unwrap_or_default();
        let data = self.core_mut().data_mut();
        merge_metadata(data, old_data)?;
        data.shift_remove("resources");
        data.shift_remove("gallery");
        for key in &options.keys_to_delete {
            data.shift_remove(key);
        }

        let updated_resources = std::mem::take(&mut self.old_resources);
        let updated_gallery = std::mem::take(&mut self.old_gallery);
        let new_order: Option<Vec<_>> = options
            .match_resource_order
            .then(|| updated_resources.iter().map(resource_order_key).collect());

        let mut reconciler = FilestoreReconciler::new(options.force_update);
        let mut to_delete = Vec::new();

        if options.update_resources && !updated_resources.is_empty() {
            if options.match_resources_by_metadata {
                let result = match_lists(&self.resources, &updated_resources);
                let mut updated: Vec<Option<Resource>> =
                    updated_resources.into_iter().map(Some).collect();

                for (index, new_index) in result.pairs() {
                    if let Some(resource) = updated[new_index].take() {
                        self.merge_matched_resource(index, resource, &mut reconciler, options)?;
                    }
                }
                for new_index in &result.new_unmatched {
                    if let Some(resource) = updated[*new_index].take() {
                        self.add_new_resource(resource, &mut reconciler, options)?;
                    }
                }
                if options.remove_additional_resources {
                    to_delete = result.old_unmatched;
                }
            } else {
                let existing = self.resources.len();
                let number_updated = updated_resources.len();
                for (index, resource) in updated_resources.into_iter().enumerate() {
                    if index < existing {
                        if self.resources[index].name() != resource.name() {
                            warn!(
                                "Changing resource name to: {}",
                                resource.name().unwrap_or_default()
                            );
                        }
                        self.merge_matched_resource(index, resource, &mut reconciler, options)?;
                    } else {
                        self.add_new_resource(resource, &mut reconciler, options)?;
                    }
                }
                if options.remove_additional_resources {
                    to_delete = (number_updated..existing).collect();
                }
            }
        }

        if !options.ignore_check {
            self.check_required_fields(&options.dataset_ignore_fields())?;
            if self.include_gallery && options.update_gallery {
                self.check_new_gallery_items(&updated_gallery)?;
            }
        }

        let filestore = self.remove_additional_resources(to_delete, reconciler);
        self.save_dataset("update", "id", options)?;
        self.upload_files(filestore)?;

        if let Some(order) = new_order {
            self.match_order(&order)?;
        }
        if self.include_gallery && options.update_gallery && !updated_gallery.is_empty() {
            self.update_gallery_items(updated_gallery)?;
        }
        Ok(())
    }

    fn merge_matched_resource(
        &mut self,
        index: usize,
        updated: Resource,
        reconciler: &mut FilestoreReconciler,
        options: &UpdateOptions,
    ) -> Result<()> {
        let original = self.resources[index].data().clone();
        info!(
            "Resource exists. Updating {}",
            self.resources[index].name().unwrap_or_default()
        );
        self.merge_into_resource(index, updated)?;

        let resource = &mut self.resources[index];
        if !options.ignore_check {
            resource.check_required_fields(&options.resource_ignore_fields())?;
        }
        reconciler.check_updated_resource(&original, resource, index)?;
        Ok(())
    }

    fn add_new_resource(
        &mut self,
        mut resource: Resource,
        reconciler: &mut FilestoreReconciler,
        options: &UpdateOptions,
    ) -> Result<()> {
        if !options.ignore_check {
            resource.check_required_fields(&options.resource_ignore_fields())?;
        }
        reconciler.check_new_resource(&mut resource, self.resources.len())?;
        self.resources.push(resource);
        Ok(())
    }

    /// Drops resources by index and shifts the queued files accordingly.
    fn remove_additional_resources(
        &mut self,
        mut indices: Vec<usize>,
        reconciler: FilestoreReconciler,
    ) -> BTreeMap<usize, PathBuf> {
        let mut filestore = reconciler.into_filestore_resources();
        indices.sort_unstable_by(|a, b| b.cmp(a));

        for index in indices {
            if index >= self.resources.len() {
                continue;
            }
            let removed = self.resources.remove(index);
            warn!(
                "Removing additional resource {}!",
                removed.name().unwrap_or_default()
            );
            filestore = filestore
                .into_iter()
                .map(|(i, path)| if i > index { (i - 1, path) } else { (i, path) })
                .collect();
        }
        filestore
    }

    fn stamp(&mut self, options: &UpdateOptions) {
        let script = options
            .updated_by_script
            .clone()
            .unwrap_or_else(|| self.configuration().user_agent());
        let core = self.core_mut();
        core.data_insert(
            "updated_by_script",
            Value::String(format!("{} ({})", script, now_utc_notz())),
        );
        if let Some(batch) = &options.batch {
            core.data_insert("batch", Value::String(batch.clone()));
            core.data_insert("batch_mode", Value::from("DONT_GROUP"));
        }
    }

    /// Writes the dataset together with its resources.
    fn save_dataset(
        &mut self,
        operation: &str,
        id_field: &str,
        options: &UpdateOptions,
    ) -> Result<()> {
        let resources: Vec<Value> = self
            .resources
            .iter()
            .map(|resource| Value::Object(resource.data().clone()))
            .collect();
        self.core_mut()
            .data_insert("resources", Value::Array(resources));
        self.stamp(options);
        self.save_to_remote(operation, id_field, Vec::new(), true)
    }

    /// Uploads queued files to the resources HDX returned from the save.
    ///
    /// The resources as sent are in `old_resources`, so a queued index is
    /// matched against the saved list to find its counterpart.
    fn upload_files(&mut self, filestore: BTreeMap<usize, PathBuf>) -> Result<()> {
        for (index, path) in filestore {
            let target = {
                let sent = self.old_resources.get(index).ok_or_else(|| {
                    HdxError::Structural(format!("No resource at index {} was saved!", index))
                })?;
                match_single(&self.resources, sent).ok_or_else(|| {
                    HdxError::Structural(format!(
                        "Resource {} was not found after saving the dataset!",
                        sent.name().unwrap_or_default()
                    ))
                })?
            };

            let resource = &mut self.resources[target];
            resource.set_file_to_upload(path, false);
            resource.update_in_hdx()?;
        }
        Ok(())
    }

    fn match_order(&mut self, order: &[(Option<String>, Option<String>)]) -> Result<()> {
        let existing: Vec<_> = self.resources.iter().map(resource_order_key).collect();
        if existing == order {
            return Ok(());
        }

        let mut sorted: Vec<&Resource> = self.resources.iter().collect();
        sorted.sort_by_key(|resource| {
            let key = resource_order_key(resource);
            order
                .iter()
                .position(|wanted| *wanted == key)
                .unwrap_or(usize::MAX)
        });
        let ids: Vec<String> = sorted
            .iter()
            .filter_map(|resource| resource.id().map(str::to_string))
            .collect();
        self.reorder_resources(&ids)
    }

    /// Checks the items an update would create, i.e. those without a title
    /// match in the loaded gallery.
    fn check_new_gallery_items(&self, updated_gallery: &[GalleryItem]) -> Result<()> {
        for updated in updated_gallery {
            let title = updated.title();
            let exists = title.is_some() && self.gallery.iter().any(|item| item.title() == title);
            if !exists {
                updated.check_required_fields(&["dataset_id"])?;
            }
        }
        Ok(())
    }

    fn update_gallery_items(&mut self, updated_gallery: Vec<GalleryItem>) -> Result<()> {
        let dataset_id = self.check_existing_object("id")?;
        let mut new_items = Vec::new();

        for updated in updated_gallery {
            let title = updated.title().map(str::to_string);
            let existing = self
                .gallery
                .iter_mut()
                .find(|item| title.is_some() && item.title().map(str::to_string) == title);
            match existing {
                Some(item) => {
                    info!(
                        "Gallery item exists. Updating {}",
                        title.as_deref().unwrap_or_default()
                    );
                    merge_metadata(item.core_mut().data_mut(), updated.data().clone())?;
                    item.update_in_hdx()?;
                }
                None => new_items.push(updated),
            }
        }

        for mut item in new_items {
            item.core_mut()
                .data_insert("dataset_id", Value::String(dataset_id.clone()));
            item.create_in_hdx()?;
            self.gallery.push(item);
        }
        Ok(())
    }

    /// Deletes the dataset from HDX.
    pub fn delete_from_hdx(&mut self) -> Result<()> {
        self.delete_in_remote("id")
    }

    /// Searches datasets, fetching as many pages as needed.
    pub fn search_in_hdx(
        configuration: Arc<Configuration>,
        query: &SearchQuery,
    ) -> Result<Vec<Dataset>> {
        let mut datasets = Vec::new();

        for page in 0.. {
            let (payload, rows) = match query.to_payload(page) {
                Some(page) => page,
                None => break,
            };
            let results = Self::search_remote(&configuration, payload)?;
            let returned = results.len() as u64;
            for result in results {
                let data = into_metadata(result, "dataset")?;
                datasets.push(Dataset::from_metadata(configuration.clone(), data)?);
            }
            if returned < rows {
                break;
            }
        }
        Ok(datasets)
    }

    /// All resources of the given datasets.
    pub fn get_all_resources(datasets: &[Dataset]) -> Vec<Resource> {
        datasets
            .iter()
            .flat_map(|dataset| dataset.resources.iter().cloned())
            .collect()
    }
}
