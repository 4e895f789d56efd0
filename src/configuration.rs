//! Settings and the shared configuration handed to every HDX object.
//!
//! Built-in settings are embedded from `config/hdx_base_configuration.yml`.
//! User supplied JSON or YAML files are deep-merged over them, so a file only
//! needs to carry the keys it wants to change.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::LookupCache;
use crate::client::BaseClient;
use crate::error::{HdxError, Result};
use crate::transport::Transport;
use crate::utilities::dictandlist::merge_two;

static BASE_CONFIGURATION: &str = include_str!("../config/hdx_base_configuration.yml");

/// Prefix put in front of every user agent sent to HDX.
pub const USER_AGENT_PREFIX: &str = concat!("HDXRustLibrary/", env!("CARGO_PKG_VERSION"));

/// Per object type settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObjectSettings {
    /// Fields that must be present and non-empty before a create or update.
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// Field linking the object to its parent dataset.
    #[serde(default)]
    pub dataset_id: Option<String>,

    /// Required field skipped when updating an existing object.
    #[serde(default)]
    pub ignore_on_update: Option<String>,
}

/// All settings of the library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Base URL of the HDX site, e.g. `https://data.humdata.org`.
    pub hdx_site: String,

    /// API key sent with every call.
    #[serde(default)]
    pub hdx_key: Option<String>,

    /// User agent, prefixed with [`USER_AGENT_PREFIX`] when sent.
    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default)]
    pub dataset: ObjectSettings,

    #[serde(default)]
    pub resource: ObjectSettings,

    #[serde(default)]
    pub galleryitem: ObjectSettings,

    /// Mapping of free text resource formats to their canonical names.
    #[serde(default)]
    pub resource_formats: HashMap<String, String>,
}

impl Settings {
    /// Returns the built-in settings.
    pub fn base() -> Result<Self> {
        Ok(serde_yaml::from_str(BASE_CONFIGURATION)?)
    }

    /// Loads settings from a JSON or YAML file merged over the built-in ones.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the JSON or YAML file.
    ///
    /// # Returns
    ///
    /// The merged settings or an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let overrides = parse_json_or_yaml(&content).ok_or_else(|| {
            HdxError::Configuration(format!(
                "Failed to parse {} as either JSON or YAML",
                path.as_ref().display()
            ))
        })?;

        Self::merged_with(overrides)
    }

    /// Built-in settings overridden by `HDX_SITE`, `HDX_KEY` and `HDX_USER_AGENT`.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::base()?;

        if let Ok(site) = std::env::var("HDX_SITE") {
            settings.hdx_site = site;
        }
        if let Ok(key) = std::env::var("HDX_KEY") {
            settings.hdx_key = Some(key);
        }
        if let Ok(user_agent) = std::env::var("HDX_USER_AGENT") {
            settings.user_agent = Some(user_agent);
        }

        Ok(settings)
    }

    /// Deep-merges `overrides` over the built-in settings.
    pub fn merged_with(overrides: Value) -> Result<Self> {
        let base: Value = serde_yaml::from_str(BASE_CONFIGURATION)?;
        let merged = merge_two(base, overrides, false)?;
        Ok(serde_json::from_value(merged)?)
    }

    /// Returns the settings block of an object type.
    pub fn object_settings(&self, object_type: &str) -> Option<&ObjectSettings> {
        match object_type {
            "dataset" => Some(&self.dataset),
            "resource" => Some(&self.resource),
            "galleryitem" => Some(&self.galleryitem),
            _ => None,
        }
    }
}

fn parse_json_or_yaml(content: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(content) {
        Some(value)
    } else if let Ok(value) = serde_yaml::from_str::<Value>(content) {
        Some(value)
    } else {
        None
    }
}

/// Settings plus the transport and caches shared by HDX objects.
pub struct Configuration {
    settings: Settings,
    remote: Arc<dyn Transport>,
    formats: LookupCache<HashMap<String, String>>,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Configuration {
    /// Creates a configuration talking to the HDX site over HTTP.
    pub fn create(settings: Settings) -> Result<Arc<Self>> {
        let client = BaseClient::new(
            &settings.hdx_site,
            settings.hdx_key.as_ref(),
            &user_agent(&settings),
        )?;

        Ok(Self::with_transport(settings, Arc::new(client)))
    }

    /// Creates a configuration using an arbitrary transport.
    pub fn with_transport(settings: Settings, remote: Arc<dyn Transport>) -> Arc<Self> {
        let formats = LookupCache::new();
        formats.set(settings.resource_formats.clone());

        Arc::new(Configuration {
            settings,
            remote,
            formats,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The transport all remote calls go through.
    pub fn remote(&self) -> &dyn Transport {
        self.remote.as_ref()
    }

    /// Cache of canonical resource format names.
    pub fn formats(&self) -> &LookupCache<HashMap<String, String>> {
        &self.formats
    }

    pub fn user_agent(&self) -> String {
        user_agent(&self.settings)
    }

    pub fn hdx_site_url(&self) -> &str {
        self.settings.hdx_site.trim_end_matches('/')
    }

    /// Returns the public page of a dataset.
    pub fn dataset_url(&self, name: &str) -> String {
        format!("{}/dataset/{}", self.hdx_site_url(), name)
    }
}

fn user_agent(settings: &Settings) -> String {
    match &settings.user_agent {
        Some(user_agent) => format!("{}-{}", USER_AGENT_PREFIX, user_agent),
        None => USER_AGENT_PREFIX.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use crate::test_utils::FakeCkan;

    use super::*;

    #[test]
    fn test_base_settings() {
        let settings = Settings::base().expect("Failed to read base settings");

        assert_eq!(settings.dataset.required_fields, vec!["name", "title"]);
        assert_eq!(settings.resource.dataset_id.as_deref(), Some("package_id"));
        assert_eq!(
            settings.galleryitem.ignore_on_update.as_deref(),
            Some("dataset_id")
        );
    }

    #[test]
    fn test_settings_from_yaml_file_merges_over_base() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "hdx_site: http://localhost:5000\nuser_agent: test\ndataset:\n  required_fields: [name]"
        )
        .unwrap();

        // Act
        let settings = Settings::from_file(file.path()).expect("Failed to read settings");

        // Assert
        assert_eq!(settings.hdx_site, "http://localhost:5000");
        assert_eq!(settings.dataset.required_fields, vec!["name"]);
        assert_eq!(settings.resource.required_fields.len(), 3);
    }

    #[test]
    fn test_settings_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"hdx_key": "secret"}}"#).unwrap();

        let settings = Settings::from_file(file.path()).expect("Failed to read settings");

        assert_eq!(settings.hdx_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_settings_from_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not: [valid").unwrap();

        let result = Settings::from_file(file.path());

        assert!(matches!(result, Err(HdxError::Configuration(_))));
    }

    #[test]
    fn test_configuration_user_agent_and_urls() {
        let settings = Settings::merged_with(json!({
            "hdx_site": "https://stage.example.org/",
            "user_agent": "myscript"
        }))
        .unwrap();
        let configuration = Configuration::with_transport(settings, Arc::new(FakeCkan::new()));

        assert_eq!(
            configuration.user_agent(),
            format!("HDXRustLibrary/{}-myscript", env!("CARGO_PKG_VERSION"))
        );
        assert_eq!(
            configuration.dataset_url("ds1"),
            "https://stage.example.org/dataset/ds1"
        );
        assert_eq!(
            configuration.formats().get().unwrap()["comma separated values"],
            "csv"
        );
    }
}
