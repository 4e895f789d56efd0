use std::collections::HashMap;
use std::error::Error;
use std::path::PathBuf;

use reqwest::blocking::{multipart, RequestBuilder};
use serde_json::Value;

use crate::transport::FilesToUpload;

pub enum RequestType {
    /// A JSON request with a JSON body and the content type set to application/json.
    JSON { body: String },

    /// A multipart request with text parts and files.
    Multipart {
        bodies: Option<HashMap<String, String>>,
        files: Option<HashMap<String, PathBuf>>,
    },
}

impl RequestType {
    /// Chooses the request type for an action payload.
    ///
    /// Payloads without files are sent as JSON. With files, every payload key
    /// becomes a text part (JSON-encoded unless it is a string, `null` values
    /// are left out) and every file a file part.
    ///
    /// # Arguments
    /// * `payload` - The action payload.
    /// * `files` - Files to attach.
    ///
    /// # Returns
    /// A `Result` containing the request type or a serialization error.
    pub fn from_payload(
        payload: &Value,
        files: &FilesToUpload,
    ) -> Result<Self, serde_json::Error> {
        if files.is_empty() {
            return Ok(RequestType::JSON {
                body: serde_json::to_string(payload)?,
            });
        }

        let mut bodies = HashMap::new();
        if let Value::Object(map) = payload {
            for (key, value) in map {
                match value {
                    Value::Null => continue,
                    Value::String(text) => bodies.insert(key.clone(), text.clone()),
                    other => bodies.insert(key.clone(), serde_json::to_string(other)?),
                };
            }
        }

        Ok(RequestType::Multipart {
            bodies: Some(bodies),
            files: Some(files.iter().cloned().collect()),
        })
    }

    /// Convert the request type to a request builder.
    ///
    /// # Arguments
    /// * `self` - The request type.
    /// * `request` - The request builder.
    ///
    /// # Returns
    /// A `Result` containing the modified request builder or an error.
    pub fn to_request(self, request: RequestBuilder) -> Result<RequestBuilder, Box<dyn Error>> {
        match self {
            RequestType::JSON { body } => Self::build_json_request(&body, request),
            RequestType::Multipart { bodies, files } => {
                Self::build_form_request(bodies, files, request)
            }
        }
    }

    /// Build a JSON request.
    fn build_json_request(
        body: &str,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, Box<dyn Error>> {
        Ok(request
            .header("Content-Type", "application/json")
            .body(body.to_owned()))
    }

    /// Build a multipart form request.
    ///
    /// # Arguments
    /// * `bodies` - Optional map of text parts.
    /// * `files` - Optional map of files to be uploaded.
    /// * `request` - The request builder.
    ///
    /// # Returns
    /// A `Result` containing the modified request builder or an error.
    fn build_form_request(
        bodies: Option<HashMap<String, String>>,
        files: Option<HashMap<String, PathBuf>>,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, Box<dyn Error>> {
        let mut form = multipart::Form::new();

        if let Some(bodies) = bodies {
            for (key, value) in bodies {
                form = form.text(key, value);
            }
        }

        if let Some(files) = files {
            for (key, path) in files {
                form = form.file(key, path)?;
            }
        }

        Ok(request.multipart(form))
    }
}
