use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::StatusCode;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::error::{HdxError, Result};
use crate::request::RequestType;
use crate::response::Response;
use crate::transport::{CallResult, FilesToUpload, Transport};

#[derive(Debug, Clone)]
pub struct BaseClient {
    base_url: Url,
    api_key: Option<String>,
    client: Client,
}

impl BaseClient {
    /// Returns true if calls are authorized with an API key
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

// This is the base client used to call the HDX action API.
// It wraps a reqwest::blocking::Client whose connection pool is shared by
// every object created from the same configuration.
impl BaseClient {
    pub fn new(base_url: &str, api_key: Option<&String>, user_agent: &str) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;
        let default_headers = Self::default_headers(api_key, user_agent)?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300)) // uploads can be large
            .connect_timeout(std::time::Duration::from_secs(60))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .default_headers(default_headers)
            .build()
            .map_err(|err| HdxError::Configuration(err.to_string()))?;

        Ok(BaseClient {
            base_url,
            api_key: api_key.map(|s| s.to_owned()),
            client,
        })
    }

    fn default_headers(api_key: Option<&String>, user_agent: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        if let Some(api_key) = api_key {
            let value = HeaderValue::from_str(api_key)
                .map_err(|_| HdxError::Configuration("Invalid API key".to_string()))?;
            headers.insert("Authorization", value);
        }

        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|_| HdxError::Configuration(format!("Invalid user agent: {}", user_agent)))?;

        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert("User-Agent", user_agent);

        Ok(headers)
    }

    /// Get the base URL of the client
    ///
    /// # Returns
    ///
    /// A reference to the base URL of the client
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Posts an action request.
    ///
    /// # Arguments
    ///
    /// * `action` - Name of the action, e.g. `package_show`.
    /// * `context` - JSON or multipart body of the request.
    pub fn post_action(
        &self,
        action: &str,
        context: RequestType,
    ) -> std::result::Result<reqwest::blocking::Response, String> {
        let url = self
            .base_url
            .join(&format!("api/3/action/{}", action))
            .map_err(|err| err.to_string())?;

        debug!(%url, action, "Calling remote action");

        let request = context
            .to_request(self.client.post(url))
            .map_err(|err| err.to_string())?;

        request.send().map_err(|err| err.to_string())
    }
}

impl Transport for BaseClient {
    fn call(&self, action: &str, payload: &Value, files: &FilesToUpload) -> CallResult {
        let context = match RequestType::from_payload(payload, files) {
            Ok(context) => context,
            Err(err) => return CallResult::Error(err.to_string()),
        };

        evaluate_response(self.post_action(action, context))
    }
}

/// Evaluates a raw HTTP response into the three-way call result.
///
/// A `Not Found Error` in the envelope or a 404 status is reported as
/// `NotFound`; any other unsuccessful outcome as `Error`.
pub(crate) fn evaluate_response(
    response: std::result::Result<reqwest::blocking::Response, String>,
) -> CallResult {
    let response = match response {
        Ok(response) => response,
        Err(err) => return CallResult::Error(err),
    };

    let status = response.status();
    let raw_content = match response.text() {
        Ok(raw_content) => raw_content,
        Err(err) => return CallResult::Error(err.to_string()),
    };

    match serde_json::from_str::<Response<Value>>(&raw_content) {
        Ok(envelope) if envelope.success => CallResult::Ok(envelope.result.unwrap_or(Value::Null)),
        Ok(envelope) => {
            let message = envelope
                .error
                .as_ref()
                .map(|error| error.to_string())
                .unwrap_or_else(|| format!("{} {}", status, raw_content));

            if envelope.is_not_found() || status == StatusCode::NOT_FOUND {
                CallResult::NotFound(message)
            } else {
                CallResult::Error(message)
            }
        }
        Err(_) if status == StatusCode::NOT_FOUND => CallResult::NotFound(raw_content),
        Err(err) => CallResult::Error(format!("{} - {}: {}", status, err, raw_content)),
    }
}

fn normalize_base_url(base_url: &str) -> Result<Url> {
    let with_slash = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{}/", base_url)
    };

    Url::parse(&with_slash)
        .map_err(|err| HdxError::Configuration(format!("Invalid HDX site {}: {}", base_url, err)))
}
