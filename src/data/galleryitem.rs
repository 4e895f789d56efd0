//! Gallery items (CKAN "related" items) attached to a dataset.

use std::sync::Arc;

use serde_json::Value;

use crate::configuration::Configuration;
use crate::data::hdxobject::{into_metadata, HdxObject, HdxObjectCore};
use crate::error::Result;
use crate::utilities::dictandlist::Metadata;

static ACTIONS: &[(&str, &str)] = &[
    ("show", "related_show"),
    ("update", "related_update"),
    ("create", "related_create"),
    ("delete", "related_delete"),
    ("list", "related_list"),
];

/// A gallery item such as a visualization or paper.
#[derive(Debug, Clone)]
pub struct GalleryItem {
    core: HdxObjectCore,
}

impl HdxObject for GalleryItem {
    const OBJECT_TYPE: &'static str = "galleryitem";

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
        GalleryItem { core }
    }
}

impl GalleryItem {
    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }

    pub fn title(&self) -> Option<&str> {
        self.get_str("title")
    }

    pub fn dataset_id(&self) -> Option<&str> {
        self.get_str("dataset_id")
    }

    /// Updates the gallery item, which must exist in HDX.
    pub fn update_in_hdx(&mut self) -> Result<()> {
        self.update_in_remote("id", Vec::new())
    }

    /// Updates the gallery item if it exists in HDX, otherwise creates it.
    pub fn create_in_hdx(&mut self) -> Result<()> {
        self.create_in_remote("id", "title", Vec::new())
    }

    pub fn delete_from_hdx(&mut self) -> Result<()> {
        self.delete_in_remote("id")
    }

    /// Lists the gallery of a dataset.
    ///
    /// # Arguments
    ///
    /// * `configuration` - The configuration to use.
    /// * `dataset_id` - Id of the dataset.
    pub fn list_for_dataset(
        configuration: Arc<Configuration>,
        dataset_id: &str,
    ) -> Result<Vec<GalleryItem>> {
        let probe = GalleryItem::new(configuration.clone(), Metadata::new());
        let mut extra = Metadata::new();
        extra.insert("type".to_string(), Value::from("dataset"));

        let items = match probe.read_from_remote(dataset_id, "id", Some(extra), Some("list"))? {
            Some(Value::Array(items)) => items,
            _ => return Ok(Vec::new()),
        };

        items
            .into_iter()
            .map(|item| {
                into_metadata(item, "gallery item")
                    .map(|data| GalleryItem::new(configuration.clone(), data))
            })
            .collect()
    }
}
