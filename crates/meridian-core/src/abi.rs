use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::name::AccountName;
use crate::serialize;

/// A type alias declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub new_type_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// A named field within a struct definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// A struct layout, optionally extending a base struct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    #[serde(default)]
    pub base: String,
    pub fields: Vec<FieldDef>,
}

/// Maps an action name to the struct describing its payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDef {
    pub name: AccountName,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Describes a table exposed by an account's code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: AccountName,
    pub index_type: String,
    #[serde(default)]
    pub key_names: Vec<String>,
    #[serde(default)]
    pub key_types: Vec<String>,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// An application binary interface: how an account's code structures and
/// serializes its data. Stored packed inside the account record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AbiDefinition {
    pub version: String,
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub structs: Vec<StructDef>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
    #[serde(default)]
    pub tables: Vec<TableDef>,
}

impl AbiDefinition {
    /// Parse a human-authored JSON ABI
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        serialize::from_json(json)
    }

    /// Render as pretty JSON for inspection
    pub fn to_json(&self) -> Result<String, CoreError> {
        serialize::to_json_pretty(self)
    }
}
