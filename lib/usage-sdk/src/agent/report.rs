//! Wire format of the usage reports accepted by the usage-ingestion endpoint.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub size: usize,
    /// Operation text, name and fields per operation key, first seen wins.
    pub map: HashMap<String, OperationMapRecord>,
    /// One entry per recorded execution, in arrival order.
    pub operations: Vec<RequestOperation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMapRecord {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOperation {
    pub operation_map_key: String,
    /// Milliseconds since the unix epoch.
    pub timestamp: u64,
    pub execution: Execution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub ok: bool,
    /// Nanoseconds.
    pub duration: u64,
    pub errors_total: usize,
    #[serde(default)]
    pub errors: Vec<ExecutionError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ClientInfo {
    /// Empty strings are treated as absent. Returns `None` when neither is set.
    pub fn new(name: Option<String>, version: Option<String>) -> Option<Self> {
        let name = non_empty_string(name);
        let version = non_empty_string(version);

        if name.is_none() && version.is_none() {
            return None;
        }

        Some(Self { name, version })
    }
}

pub(crate) fn non_empty_string(value: Option<String>) -> Option<String> {
    value.filter(|str| !str.is_empty())
}
