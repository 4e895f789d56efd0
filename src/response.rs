use std::fmt;

use atty::Stream;
use colored::Colorize;
use colored_json::prelude::*;
use serde_json::Value;

/// Represents the status of a response from the HDX action API.
///
/// The action API signals the outcome with a `success` flag; this enum is the
/// typed view of that flag.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Status {
    /// Indicates a successful response
    OK,
    /// Indicates an error response
    ERROR,
}

impl Status {
    /// Returns the string representation of the status
    pub fn as_str(&self) -> &str {
        match self {
            Status::OK => "OK",
            Status::ERROR => "ERROR",
        }
    }

    /// Returns true if the status is OK
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::OK)
    }

    /// Returns true if the status is ERROR
    pub fn is_err(&self) -> bool {
        matches!(self, Status::ERROR)
    }
}

/// The envelope every action of the HDX (CKAN) API answers with.
///
/// ```json
/// {"help": "...", "success": true, "result": {...}}
/// {"help": "...", "success": false, "error": {"__type": "Not Found Error", "message": "..."}}
/// ```
#[derive(Debug, serde::Deserialize, serde::Serialize)]
pub struct Response<T> {
    /// Whether the action succeeded
    pub success: bool,

    /// Result payload of a successful action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,

    /// Error details of a failed action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionError>,

    /// Link to the action documentation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl<T> Response<T> {
    /// Creates a successful response wrapping `result`
    pub fn from_result(result: T) -> Self {
        Response {
            success: true,
            result: Some(result),
            error: None,
            help: None,
        }
    }

    /// Creates a failed response with a plain message
    pub fn from_message(message: impl Into<String>) -> Self {
        Response {
            success: false,
            result: None,
            error: Some(ActionError {
                error_type: None,
                message: Some(message.into()),
                details: serde_json::Map::new(),
            }),
            help: None,
        }
    }

    pub fn status(&self) -> Status {
        if self.success {
            Status::OK
        } else {
            Status::ERROR
        }
    }

    /// Returns true if the remote reported the addressed object as missing
    pub fn is_not_found(&self) -> bool {
        self.error
            .as_ref()
            .and_then(|error| error.error_type.as_deref())
            .map(|error_type| error_type == NOT_FOUND_ERROR)
            .unwrap_or(false)
    }
}

impl<T> Response<T>
where
    T: serde::Serialize,
{
    /// Prints the response result to stdout and returns the matching exit code
    pub fn print_result(&self) -> i32 {
        match self.status() {
            Status::OK => match serde_json::to_string_pretty(&self.result) {
                Ok(json) => {
                    self.redirect_stream(&json);
                    exitcode::OK
                }
                Err(err) => {
                    println!("\n{} {}\n", "Error:".red().bold(), err);
                    exitcode::SOFTWARE
                }
            },
            Status::ERROR => {
                let message = self
                    .error
                    .as_ref()
                    .map(|error| error.to_string())
                    .unwrap_or_else(|| "Unknown error".to_string());
                println!("\n{} {}\n", "Error:".red().bold(), message);
                exitcode::DATAERR
            }
        }
    }

    /// Redirects output to appropriate stream based on context
    ///
    /// If users are redirecting the output to a file, we don't want to print
    /// the success message but only the JSON response to ensure that the output
    /// is clean and can be used in other scripts
    fn redirect_stream(&self, json_str: &str) {
        if atty::is(Stream::Stdout) {
            println!("{}", success_message());
            match json_str.to_colored_json_auto() {
                Ok(colored) => println!("{}\n", colored),
                Err(_) => println!("{}\n", json_str),
            }
        } else {
            println!("{}", json_str);
        }
    }
}

/// Error type the action API uses for missing objects
pub const NOT_FOUND_ERROR: &str = "Not Found Error";

/// Returns a formatted success message string
fn success_message() -> String {
    format!(
        "{} {} - Received the following response: \n",
        "└── ".bold(),
        "🎉 Success!".green().bold()
    )
}

/// Error block of a failed action.
///
/// Validation errors carry per-field messages instead of a `message`; these
/// are kept in `details`.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct ActionError {
    #[serde(rename = "__type", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(flatten)]
    pub details: serde_json::Map<String, Value>,
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let prefix = self.error_type.as_deref().unwrap_or("Error");
        match &self.message {
            Some(message) => write!(f, "{}: {}", prefix, message),
            None => write!(f, "{}: {}", prefix, Value::Object(self.details.clone())),
        }
    }
}
