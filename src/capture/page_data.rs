use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Serialized document returned by the extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageContent {
    Text(String),
    /// Compressed archives arrive as an array of byte values
    Binary(Vec<u8>),
}

impl PageContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }
}

/// A console call observed in the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

/// Status and headers of the primary document, plus its redirect chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpInfo {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Every URL that answered with a redirect, in order
    pub redirects: Vec<String>,
}

/// Result of a capture
///
/// Keys the extractor returns that are not modelled here are kept in
/// `extra` so they survive into the JSON envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<PageContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub console_messages: Vec<ConsoleMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_info: Option<HttpInfo>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PageData {
    /// Parses the reassembled result string
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
