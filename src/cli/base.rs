//! Base functionality for the HDX CLI
//!
//! This module provides the utilities shared by all subcommands:
//! - Printing results and errors with a matching exit code
//! - File parsing for JSON/YAML metadata
//! - The trait every subcommand implements

use std::fs;
use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::configuration::Configuration;
use crate::error::{HdxError, Result};
use crate::response::Response;

/// Prints the outcome of a command and returns its exit code
///
/// # Arguments
/// * `result` - The value to print on success, or the error that occurred
///
/// # Type Parameters
/// * `T` - The type of data contained in a successful result
pub fn evaluate_and_print_response<T: Serialize>(result: Result<T>) -> i32 {
    match result {
        Ok(result) => Response::from_result(result).print_result(),
        Err(err) => {
            match &err {
                HdxError::Transport { cause, .. } => {
                    println!("\n{} {} {}\n", "Error:".red().bold(), err, cause.0.as_str().dimmed())
                }
                _ => println!("\n{} {}\n", "Error:".red().bold(), err),
            }
            exit_code(&err)
        }
    }
}

/// Maps an error to the exit code reported by the CLI
pub fn exit_code(err: &HdxError) -> i32 {
    match err {
        HdxError::Transport { .. } => exitcode::UNAVAILABLE,
        HdxError::Configuration(_) => exitcode::CONFIG,
        HdxError::Io(_) => exitcode::IOERR,
        _ => exitcode::DATAERR,
    }
}

/// Parses a JSON or YAML file into the specified type
///
/// # Arguments
/// * `path` - Path to the file to parse
///
/// # Returns
/// * `Ok(T)` - Successfully parsed file contents
/// * `Err` - File reading or parsing error
pub fn parse_file<P, T>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let content = fs::read_to_string(path)?;

    if let Ok(content) = serde_json::from_str(&content) {
        Ok(content)
    } else if let Ok(content) = serde_yaml::from_str(&content) {
        Ok(content)
    } else {
        Err(HdxError::Structural(
            "Failed to parse the file as either JSON or YAML".to_string(),
        ))
    }
}

/// Trait for processing CLI subcommands
///
/// Implementors define how to handle their specific subcommand variant
/// using the shared configuration.
pub trait Matcher {
    /// Process this subcommand and return the exit code
    ///
    /// # Arguments
    /// * `configuration` - The configuration all HDX objects are created with
    fn process(self, configuration: &Arc<Configuration>) -> i32;
}
