//! Dataset commands of the HDX CLI
//!
//! The `create` and `update` commands read the desired state of a dataset from
//! a JSON/YAML file. Resources are listed under `resources`; a resource may
//! name a local `file_to_upload` instead of a `url`. Gallery items go under
//! `gallery`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use structopt::StructOpt;

use crate::configuration::Configuration;
use crate::data::dataset::{Dataset, UpdateOptions};
use crate::data::galleryitem::GalleryItem;
use crate::data::hdxobject::{into_metadata, HdxObject};
use crate::data::resource::Resource;
use crate::data::search::SearchQuery;
use crate::error::{HdxError, Result};
use crate::identifier::Identifier;
use crate::utilities::dictandlist::Metadata;

use super::base::{evaluate_and_print_response, parse_file, Matcher};

/// Key of a resource naming the local file to upload.
const FILE_TO_UPLOAD: &str = "file_to_upload";

/// Options shared by `create` and `update`
#[derive(StructOpt, Debug, Clone, Default)]
pub struct UpdateFlags {
    #[structopt(long, help = "Pair resources by position instead of id, name and format")]
    match_by_position: bool,

    #[structopt(long, help = "Remove resources on HDX that are not in the file")]
    remove_additional_resources: bool,

    #[structopt(long, help = "Reorder resources on HDX to the order in the file")]
    match_resource_order: bool,

    #[structopt(long, help = "Upload files even when they are unchanged")]
    force_update: bool,

    #[structopt(long, help = "Skip required field checks")]
    ignore_check: bool,

    #[structopt(long, help = "Allow a dataset without resources")]
    allow_no_resources: bool,

    #[structopt(long, help = "Skip the gallery of the dataset")]
    no_gallery: bool,

    #[structopt(long, help = "Name of the script recorded in updated_by_script")]
    script: Option<String>,

    #[structopt(long, help = "UUID grouping the datasets of one batch")]
    batch: Option<String>,
}

impl From<&UpdateFlags> for UpdateOptions {
    fn from(flags: &UpdateFlags) -> Self {
        UpdateOptions {
            match_resources_by_metadata: !flags.match_by_position,
            remove_additional_resources: flags.remove_additional_resources,
            match_resource_order: flags.match_resource_order,
            force_update: flags.force_update,
            ignore_check: flags.ignore_check,
            allow_no_resources: flags.allow_no_resources,
            updated_by_script: flags.script.clone(),
            batch: flags.batch.clone(),
            ..Default::default()
        }
    }
}

/// Subcommands for managing datasets on HDX
#[derive(StructOpt, Debug)]
#[structopt(about = "Handle datasets on HDX")]
pub enum DatasetSubCommand {
    /// Retrieve a dataset with its resources and gallery
    #[structopt(about = "Retrieve a dataset")]
    Show {
        #[structopt(help = "Id or name of the dataset to retrieve")]
        id: Identifier,

        #[structopt(long, help = "Skip the gallery of the dataset")]
        no_gallery: bool,
    },

    /// Create a dataset, or update it if it already exists
    #[structopt(about = "Create or update a dataset")]
    Create {
        #[structopt(
            long,
            short,
            help = "Path to the JSON/YAML file containing the dataset body"
        )]
        body: PathBuf,

        #[structopt(flatten)]
        flags: UpdateFlags,
    },

    /// Update an existing dataset
    #[structopt(about = "Update a dataset")]
    Update {
        #[structopt(
            long,
            short,
            help = "Path to the JSON/YAML file containing the dataset body"
        )]
        body: PathBuf,

        #[structopt(flatten)]
        flags: UpdateFlags,
    },

    /// Delete a dataset from HDX
    #[structopt(about = "Deletes a dataset")]
    Delete {
        #[structopt(help = "Id or name of the dataset to delete")]
        id: Identifier,
    },

    /// Search datasets
    Search(SearchQuery),
}

impl Matcher for DatasetSubCommand {
    fn process(self, configuration: &Arc<Configuration>) -> i32 {
        match self {
            DatasetSubCommand::Show { id, no_gallery } => {
                evaluate_and_print_response(show(configuration, &id, !no_gallery))
            }
            DatasetSubCommand::Create { body, flags } => {
                let result = dataset_from_file(configuration, &body, &flags).and_then(|mut dataset| {
                    dataset.create_in_hdx(&UpdateOptions::from(&flags))?;
                    Ok(dataset.to_value())
                });
                evaluate_and_print_response(result)
            }
            DatasetSubCommand::Update { body, flags } => {
                let result = dataset_from_file(configuration, &body, &flags).and_then(|mut dataset| {
                    dataset.update_in_hdx(&UpdateOptions::from(&flags))?;
                    Ok(dataset.to_value())
                });
                evaluate_and_print_response(result)
            }
            DatasetSubCommand::Delete { id } => evaluate_and_print_response(delete(configuration, &id)),
            DatasetSubCommand::Search(query) => {
                let result = Dataset::search_in_hdx(configuration.clone(), &query).map(|datasets| {
                    datasets.iter().map(Dataset::to_value).collect::<Vec<Value>>()
                });
                evaluate_and_print_response(result)
            }
        }
    }
}

fn read_existing(
    configuration: &Arc<Configuration>,
    id: &Identifier,
    include_gallery: bool,
    operation: &str,
) -> Result<Dataset> {
    let mut dataset = Dataset::new(configuration.clone(), Metadata::new());
    dataset.set_include_gallery(include_gallery);
    if dataset.load_dataset(id.as_str())? {
        Ok(dataset)
    } else {
        Err(HdxError::NoExistingObject {
            object_type: Dataset::OBJECT_TYPE.to_string(),
            operation: operation.to_string(),
        })
    }
}

fn show(configuration: &Arc<Configuration>, id: &Identifier, include_gallery: bool) -> Result<Value> {
    Ok(read_existing(configuration, id, include_gallery, "show")?.to_value())
}

fn delete(configuration: &Arc<Configuration>, id: &Identifier) -> Result<Value> {
    let mut dataset = read_existing(configuration, id, false, "delete")?;
    dataset.delete_from_hdx()?;
    Ok(serde_json::json!({"deleted": dataset.id()}))
}

fn take_list(data: &mut Metadata, key: &str) -> Result<Vec<Metadata>> {
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

/// Builds a dataset from a metadata file.
///
/// Relative `file_to_upload` paths are resolved against the file's directory.
pub fn dataset_from_file(
    configuration: &Arc<Configuration>,
    path: &Path,
    flags: &UpdateFlags,
) -> Result<Dataset> {
    let mut data: Metadata = parse_file(path)?;
    let resources = take_list(&mut data, "resources")?;
    let gallery = take_list(&mut data, "gallery")?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut dataset = Dataset::new(configuration.clone(), data);
    dataset.set_include_gallery(!flags.no_gallery);

    for data in resources {
        let mut resource = Resource::new(configuration.clone(), data);
        if let Some(Value::String(file)) = resource.remove(FILE_TO_UPLOAD) {
            let guess_format = !resource.contains("format");
            resource.set_file_to_upload(base_dir.join(file), guess_format);
        }
        dataset.add_update_resource(resource, false)?;
    }
    for data in gallery {
        dataset.add_update_gallery_item(GalleryItem::new(configuration.clone(), data))?;
    }
    Ok(dataset)
}
