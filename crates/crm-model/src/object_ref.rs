use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque, stable tenant identifier. The set of `ObjectRef`s
/// enumerated in a run is the working set threaded through every
/// downstream component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRef(String);

impl ObjectRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ObjectRef {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for ObjectRef {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl AsRef<str> for ObjectRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
