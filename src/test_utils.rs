//! In-memory stand-in for a CKAN action API.
//!
//! Models packages, resources and related items closely enough for the
//! reconciliation flows: ids are assigned on create, `package_create` and
//! `package_update` replace the resource list of a package, uploads give a
//! resource a download url. Every call is recorded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};

use crate::configuration::{Configuration, Settings};
use crate::transport::{CallResult, FilesToUpload, Transport};
use crate::utilities::dictandlist::Metadata;

const SITE: &str = "https://data.humdata.org";

/// A call received by [`FakeCkan`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub action: String,
    pub payload: Value,
    pub files: FilesToUpload,
}

#[derive(Debug, Default)]
struct Package {
    data: Metadata,
    resource_ids: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    packages: Vec<Package>,
    resources: HashMap<String, Metadata>,
    related: Vec<Metadata>,
    failures: HashMap<String, String>,
    calls: Vec<RecordedCall>,
    counter: u128,
}

/// Cloneable handle to an in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct FakeCkan {
    state: Arc<Mutex<State>>,
}

/// Builds metadata from a JSON object literal.
pub fn metadata(value: Value) -> Metadata {
    match value {
        Value::Object(map) => map,
        other => panic!("Expected a JSON object, got {other}"),
    }
}

/// A configuration backed by a fresh [`FakeCkan`].
pub fn configuration() -> (Arc<Configuration>, FakeCkan) {
    let fake = FakeCkan::new();
    let settings = Settings::base().expect("Failed to read base settings");
    let configuration = Configuration::with_transport(settings, Arc::new(fake.clone()));
    (configuration, fake)
}

fn not_found() -> CallResult {
    CallResult::NotFound("Not Found Error: Not found".to_string())
}

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

impl FakeCkan {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("FakeCkan state poisoned")
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Names of the actions called so far, in order.
    pub fn actions(&self) -> Vec<String> {
        self.lock().calls.iter().map(|c| c.action.clone()).collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Makes every later call of `action` fail with `message`.
    pub fn fail_action(&self, action: &str, message: &str) {
        self.lock()
            .failures
            .insert(action.to_string(), message.to_string());
    }

    /// Stores a package (with its resources) as if it had been created earlier.
    pub fn insert_package(&self, package: Value) {
        let mut state = self.lock();
        let result = state.save_package(metadata(package), None);
        assert!(result.is_ok(), "Failed to insert package: {result:?}");
    }

    pub fn insert_resource(&self, resource: Value) {
        let mut state = self.lock();
        state.save_resource(metadata(resource), None);
    }

    pub fn insert_related(&self, item: Value) {
        let mut state = self.lock();
        let mut item = metadata(item);
        if !item.contains_key("id") {
            let id = state.next_id();
            item.insert("id".to_string(), Value::String(id));
        }
        state.related.push(item);
    }

    /// The package as `package_show` would return it.
    pub fn package(&self, id_or_name: &str) -> Option<Value> {
        let state = self.lock();
        state
            .find_package(id_or_name)
            .map(|index| state.render_package(index))
    }

    /// Names of the resources of a package, in order.
    pub fn resource_names(&self, id_or_name: &str) -> Vec<String> {
        self.package(id_or_name)
            .and_then(|package| package.get("resources").cloned())
            .and_then(|resources| resources.as_array().cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(|r| r.get("name").and_then(Value::as_str).map(str::to_string))
            .collect()
    }
}

impl State {
    fn next_id(&mut self) -> String {
        self.counter += 1;
        uuid::Uuid::from_u128(self.counter).to_string()
    }

    fn find_package(&self, id_or_name: &str) -> Option<usize> {
        self.packages.iter().position(|p| {
            p.data.get("id").and_then(Value::as_str) == Some(id_or_name)
                || p.data.get("name").and_then(Value::as_str) == Some(id_or_name)
        })
    }

    fn render_package(&self, index: usize) -> Value {
        let package = &self.packages[index];
        let resources: Vec<Value> = package
            .resource_ids
            .iter()
            .filter_map(|id| self.resources.get(id).cloned().map(Value::Object))
            .collect();

        let mut data = package.data.clone();
        data.insert("num_resources".to_string(), Value::from(resources.len()));
        data.insert("resources".to_string(), Value::Array(resources));
        Value::Object(data)
    }

    fn save_resource(&mut self, mut resource: Metadata, file: Option<&str>) -> Metadata {
        let id = match resource.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.next_id(),
        };
        resource.insert("id".to_string(), Value::String(id.clone()));

        if let Some(file_name) = file {
            let package_id = resource
                .get("package_id")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            resource.insert(
                "url".to_string(),
                Value::String(format!(
                    "{}/dataset/{}/resource/{}/download/{}",
                    SITE, package_id, id, file_name
                )),
            );
            resource.insert("url_type".to_string(), Value::from("upload"));
        }

        if let Some(package_id) = resource.get("package_id").and_then(Value::as_str) {
            if let Some(index) = self.find_package(package_id) {
                if !self.packages[index].resource_ids.contains(&id) {
                    self.packages[index].resource_ids.push(id.clone());
                }
            }
        }

        self.resources.insert(id, resource.clone());
        resource
    }

    fn save_package(&mut self, mut data: Metadata, existing: Option<usize>) -> Result<Value, String> {
        let resources = match data.shift_remove("resources") {
            Some(Value::Array(resources)) => resources,
            _ => Vec::new(),
        };
        data.shift_remove("num_resources");

        let index = match existing {
            Some(index) => index,
            None => {
                if let Some(name) = data.get("name").and_then(Value::as_str) {
                    if self.find_package(name).is_some() {
                        return Err("Validation Error: That URL is already in use.".to_string());
                    }
                }
                self.packages.push(Package::default());
                self.packages.len() - 1
            }
        };

        let id = match data.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => self.next_id(),
        };
        data.insert("id".to_string(), Value::String(id.clone()));

        let old_ids = std::mem::take(&mut self.packages[index].resource_ids);
        self.packages[index].data = data;

        let mut resource_ids = Vec::new();
        for resource in resources {
            let mut resource = match resource {
                Value::Object(resource) => resource,
                _ => return Err("Validation Error: resource is not an object".to_string()),
            };
            resource.insert("package_id".to_string(), Value::String(id.clone()));
            let saved = self.save_resource(resource, None);
            if let Some(resource_id) = saved.get("id").and_then(Value::as_str) {
                resource_ids.push(resource_id.to_string());
            }
        }
        for old_id in old_ids {
            if !resource_ids.contains(&old_id) {
                self.resources.remove(&old_id);
            }
        }
        self.packages[index].resource_ids = resource_ids;

        Ok(self.render_package(index))
    }

    fn handle(&mut self, action: &str, payload: &Value, files: &FilesToUpload) -> CallResult {
        if let Some(message) = self.failures.get(action) {
            return CallResult::Error(message.clone());
        }
        let body = match payload {
            Value::Object(body) => body.clone(),
            _ => Metadata::new(),
        };
        let file_name = files.first().and_then(|(_, path)| {
            path.file_name()
                .map(|name| name.to_string_lossy().to_string())
        });

        match action {
            "package_show" => match str_field(payload, "id").and_then(|id| self.find_package(id)) {
                Some(index) => CallResult::Ok(self.render_package(index)),
                None => not_found(),
            },
            "package_create" => match self.save_package(body, None) {
                Ok(result) => CallResult::Ok(result),
                Err(message) => CallResult::Error(message),
            },
            "package_update" => {
                let index = str_field(payload, "id")
                    .or_else(|| str_field(payload, "name"))
                    .and_then(|id| self.find_package(id));
                match index {
                    Some(index) => match self.save_package(body, Some(index)) {
                        Ok(result) => CallResult::Ok(result),
                        Err(message) => CallResult::Error(message),
                    },
                    None => not_found(),
                }
            }
            "package_search" => self.search_packages(payload),
            "package_resource_reorder" => {
                let index = match str_field(payload, "id").and_then(|id| self.find_package(id)) {
                    Some(index) => index,
                    None => return not_found(),
                };
                let order: Vec<String> = payload
                    .get("order")
                    .and_then(Value::as_array)
                    .map(|ids| {
                        ids.iter()
                            .filter_map(|id| id.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                let package = &mut self.packages[index];
                let mut reordered: Vec<String> = order
                    .iter()
                    .filter(|id| package.resource_ids.contains(id))
                    .cloned()
                    .collect();
                for id in &package.resource_ids {
                    if !reordered.contains(id) {
                        reordered.push(id.clone());
                    }
                }
                package.resource_ids = reordered.clone();
                CallResult::Ok(json!({"id": payload["id"], "order": reordered}))
            }
            "hdx_dataset_purge" => {
                match str_field(payload, "id").and_then(|id| self.find_package(id)) {
                    Some(index) => {
                        let package = self.packages.remove(index);
                        for id in package.resource_ids {
                            self.resources.remove(&id);
                        }
                        CallResult::Ok(Value::Null)
                    }
                    None => not_found(),
                }
            }
            "resource_show" => match str_field(payload, "id").and_then(|id| self.resources.get(id)) {
                Some(resource) => CallResult::Ok(Value::Object(resource.clone())),
                None => not_found(),
            },
            "resource_create" => {
                let mut body = body;
                body.shift_remove("id");
                CallResult::Ok(Value::Object(self.save_resource(body, file_name.as_deref())))
            }
            "resource_update" => {
                match str_field(payload, "id").filter(|id| self.resources.contains_key(*id)) {
                    Some(_) => {
                        CallResult::Ok(Value::Object(self.save_resource(body, file_name.as_deref())))
                    }
                    None => not_found(),
                }
            }
            "resource_delete" => {
                let id = str_field(payload, "id").unwrap_or_default().to_string();
                if self.resources.remove(&id).is_none() {
                    return not_found();
                }
                for package in &mut self.packages {
                    package.resource_ids.retain(|r| r != &id);
                }
                CallResult::Ok(Value::Null)
            }
            "resource_search" => self.search_resources(payload),
            "related_show" => match self.find_related(payload) {
                Some(index) => CallResult::Ok(Value::Object(self.related[index].clone())),
                None => not_found(),
            },
            "related_create" => {
                let mut item = body;
                let id = self.next_id();
                item.insert("id".to_string(), Value::String(id));
                self.related.push(item.clone());
                CallResult::Ok(Value::Object(item))
            }
            "related_update" => match self.find_related(payload) {
                Some(index) => {
                    self.related[index] = body.clone();
                    CallResult::Ok(Value::Object(body))
                }
                None => not_found(),
            },
            "related_delete" => match self.find_related(payload) {
                Some(index) => {
                    self.related.remove(index);
                    CallResult::Ok(Value::Null)
                }
                None => not_found(),
            },
            "related_list" => {
                let dataset_id = str_field(payload, "id");
                let items: Vec<Value> = self
                    .related
                    .iter()
                    .filter(|item| item.get("dataset_id").and_then(Value::as_str) == dataset_id)
                    .cloned()
                    .map(Value::Object)
                    .collect();
                CallResult::Ok(Value::Array(items))
            }
            other => CallResult::Error(format!("Unknown action {}", other)),
        }
    }

    fn find_related(&self, payload: &Value) -> Option<usize> {
        let id = str_field(payload, "id")?;
        self.related
            .iter()
            .position(|item| item.get("id").and_then(Value::as_str) == Some(id))
    }

    fn search_packages(&self, payload: &Value) -> CallResult {
        let q = str_field(payload, "q").unwrap_or("*:*").to_lowercase();
        let rows = payload.get("rows").and_then(Value::as_u64).unwrap_or(1000) as usize;
        let start = payload.get("start").and_then(Value::as_u64).unwrap_or(0) as usize;

        let matching: Vec<Value> = (0..self.packages.len())
            .map(|index| self.render_package(index))
            .filter(|package| {
                q == "*:*"
                    || ["name", "title"].iter().any(|field| {
                        package
                            .get(*field)
                            .and_then(Value::as_str)
                            .map(|value| value.to_lowercase().contains(&q))
                            .unwrap_or(false)
                    })
            })
            .collect();

        let count = matching.len();
        let results: Vec<Value> = matching.into_iter().skip(start).take(rows).collect();
        CallResult::Ok(json!({"count": count, "results": results}))
    }

    fn search_resources(&self, payload: &Value) -> CallResult {
        let query = str_field(payload, "query").unwrap_or_default();
        let (field, term) = query.split_once(':').unwrap_or(("name", query));
        let term = term.to_lowercase();

        let mut results: Vec<Value> = self
            .resources
            .values()
            .filter(|resource| {
                resource
                    .get(field)
                    .and_then(Value::as_str)
                    .map(|value| value.to_lowercase().contains(&term))
                    .unwrap_or(false)
            })
            .cloned()
            .map(Value::Object)
            .collect();
        results.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));

        CallResult::Ok(json!({"count": results.len(), "results": results}))
    }
}

impl Transport for FakeCkan {
    fn call(&self, action: &str, payload: &Value, files: &FilesToUpload) -> CallResult {
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            action: action.to_string(),
            payload: payload.clone(),
            files: files.clone(),
        });
        state.handle(action, payload, files)
    }
}
