use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub name: String,
    pub value: String,
}

impl CustomField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Serializes an ordered list of fields to a compact JSON array.
#[derive(Debug, Clone, Default)]
pub struct JsonEncoder {
    data: Vec<CustomField>,
}

impl JsonEncoder {
    pub fn new(data: Vec<CustomField>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[CustomField] {
        &self.data
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.data)?)
    }
}
