//! Resource commands of the HDX CLI

use std::sync::Arc;

use serde_json::{json, Value};
use structopt::StructOpt;

use crate::configuration::Configuration;
use crate::data::hdxobject::HdxObject;
use crate::data::resource::Resource;
use crate::error::{HdxError, Result};

use super::base::{evaluate_and_print_response, Matcher};

/// Subcommands for managing resources on HDX
#[derive(StructOpt, Debug)]
#[structopt(about = "Handle resources on HDX")]
pub enum ResourceSubCommand {
    /// Retrieve a resource's metadata
    #[structopt(about = "Retrieve a resource")]
    Show {
        #[structopt(help = "Id of the resource to retrieve")]
        id: String,
    },

    /// Delete a resource from its dataset
    #[structopt(about = "Deletes a resource")]
    Delete {
        #[structopt(help = "Id of the resource to delete")]
        id: String,
    },

    /// Search resources by a `field:term` query
    #[structopt(about = "Search resources")]
    Search {
        #[structopt(help = "Query such as name:ACLED")]
        query: String,
    },
}

impl Matcher for ResourceSubCommand {
    fn process(self, configuration: &Arc<Configuration>) -> i32 {
        match self {
            ResourceSubCommand::Show { id } => {
                let result = read_existing(configuration, &id, "show")
                    .map(|resource| Value::Object(resource.data().clone()));
                evaluate_and_print_response(result)
            }
            ResourceSubCommand::Delete { id } => {
                let result = read_existing(configuration, &id, "delete").and_then(|mut resource| {
                    resource.delete_from_hdx()?;
                    Ok(json!({"deleted": id}))
                });
                evaluate_and_print_response(result)
            }
            ResourceSubCommand::Search { query } => {
                let result = Resource::search_in_hdx(configuration.clone(), &query, None).map(|resources| {
                    resources
                        .iter()
                        .map(|resource| Value::Object(resource.data().clone()))
                        .collect::<Vec<Value>>()
                });
                evaluate_and_print_response(result)
            }
        }
    }
}

fn read_existing(configuration: &Arc<Configuration>, id: &str, operation: &str) -> Result<Resource> {
    Resource::read_from_hdx(configuration.clone(), id)?.ok_or_else(|| HdxError::NoExistingObject {
        object_type: Resource::OBJECT_TYPE.to_string(),
        operation: operation.to_string(),
    })
}
