//! Wire types shared by the backend client and the document assembler.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compound {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Regulatory region a template is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "CN")]
    Cn,
    #[serde(rename = "EU")]
    Eu,
    #[serde(rename = "US")]
    Us,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Cn => "CN",
            Region::Eu => "EU",
            Region::Us => "US",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CN" => Ok(Region::Cn),
            "EU" => Ok(Region::Eu),
            "US" => Ok(Region::Us),
            other => Err(format!("unknown region: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub compound_id: String,
    pub region: Region,
    #[serde(default)]
    pub template_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_mapping: Option<HashMap<String, String>>,
}

/// One manufactured lot and its analytical results.
///
/// `test_results` may omit any parameter key; the renderer decides between a
/// blank cell and a `TBD` placeholder from the parameter definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub batch_number: String,
    #[serde(default)]
    pub manufacture_date: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub test_results: HashMap<String, String>,
}

impl BatchRecord {
    /// Non-empty result for `key`, if any.
    pub fn result(&self, key: &str) -> Option<&str> {
        self.test_results
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub compound_id: String,
    pub template_id: String,
    #[serde(default)]
    pub force_reprocess: bool,
}

/// Payload of the check-cache endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedBatches {
    #[serde(default)]
    pub batch_data: Vec<BatchRecord>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    #[serde(default, alias = "batch_data")]
    pub batch_data: Vec<BatchRecord>,
    #[serde(default, alias = "processed_files")]
    pub processed_files: Vec<String>,
    #[serde(default, alias = "failed_files")]
    pub failed_files: Vec<FailedFile>,
    #[serde(default)]
    pub total_files: usize,
    #[serde(default)]
    pub status: ProcessingStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: String,
}

/// State of a backend processing task, tagged by its `state` field. States
/// the client has no use for (`STARTED`, `RETRY`, ...) decode as `Unknown`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Progress {
        #[serde(default)]
        current: u64,
        #[serde(default)]
        total: u64,
        #[serde(default)]
        status: String,
    },
    Success {
        #[serde(default)]
        result: ProcessingResult,
    },
    Failure {
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Identity derived from the access token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}
