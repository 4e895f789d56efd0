//! A Rust library for reading and writing metadata on the Humanitarian Data
//! Exchange (HDX), a CKAN based data portal.
//!
//! Datasets, resources and gallery items are plain JSON metadata with typed
//! operations on top. Creating or updating a dataset reconciles the caller's
//! desired state with what HDX holds: resources are matched, merged and
//! reordered, and local files are only uploaded when their content changed.

#![warn(unused_crate_dependencies)]

/// Settings and the configuration shared by all HDX objects
pub mod configuration;

/// Lazily filled lookup caches
pub mod cache;

/// HTTP client for the HDX action API
pub mod client;

/// Error types
pub mod error;

/// Types for handling HDX identifiers
pub mod identifier;

/// Logging setup and spans
pub mod logging;

/// Types for making requests to the action API
pub mod request;

/// Types for handling responses from the action API
pub mod response;

/// The seam between HDX objects and the remote API
pub mod transport;

/// Generic helpers
pub mod utilities {
    /// Deep merging of JSON metadata
    pub mod dictandlist;
    /// File size and content hashing
    pub mod size_hash;
}

/// HDX objects and the reconciliation of their state
pub mod data {
    /// Datasets and the merge engine
    pub mod dataset;
    /// Upload decisions for resource files
    pub mod filestore_helper;
    /// Gallery items
    pub mod galleryitem;
    /// Behaviour shared by all HDX objects
    pub mod hdxobject;
    /// Resources
    pub mod resource;
    /// Pairing of resources between lists
    pub mod resource_matcher;
    /// Dataset search queries
    pub mod search;
}

/// Commonly used types and functions
pub mod prelude {
    pub use super::configuration::{Configuration, Settings};
    pub use super::data::dataset::{Dataset, ResourceInput, UpdateOptions};
    pub use super::data::galleryitem::GalleryItem;
    pub use super::data::hdxobject::HdxObject;
    pub use super::data::resource::Resource;
    pub use super::data::search::SearchQuery;
    pub use super::error::{HdxError, Result};
    pub use super::identifier::Identifier;
    pub use super::utilities::dictandlist::Metadata;
}

/// Command-line interface functionality
pub mod cli {
    /// Base CLI functionality
    pub mod base;
    /// Dataset commands
    pub mod dataset;
    /// Resource commands
    pub mod resource;
}

/// Test utilities
#[cfg(test)]
mod test_utils;
