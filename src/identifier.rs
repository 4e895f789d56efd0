use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// HDX objects can be addressed by their UUID or by their name (URL slug for
// datasets, display name for resources). Parsing decides which one a string
// is, so callers can pass either without saying which.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Identifier {
    Id(String),
    Name(String),
}

impl Identifier {
    /// Returns true if the identifier is a UUID
    pub fn is_id(&self) -> bool {
        matches!(self, Identifier::Id(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Name(name) => name,
        }
    }
}

impl FromStr for Identifier {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err("Identifier must not be empty".to_string());
        }

        match Uuid::parse_str(s) {
            Ok(_) => Ok(Identifier::Id(s.to_owned())),
            Err(_) => Ok(Identifier::Name(s.to_owned())),
        }
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        match Uuid::parse_str(value) {
            Ok(_) => Identifier::Id(value.to_owned()),
            Err(_) => Identifier::Name(value.to_owned()),
        }
    }
}
