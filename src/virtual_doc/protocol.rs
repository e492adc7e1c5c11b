//! Custom messages exchanged with the language server for virtual documents
//! and the other client extensions.

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::Url;

/// URI scheme under which virtual documents are served
pub const VIRTUAL_SCHEME: &str = "vls-virtual";

/// Key used when a `$/showVirtualFile` notification carries no uri
pub const DEFAULT_VIRTUAL_URI: &str = "vls-virtual:/Virtual File";

/// Fragment selecting the source map view of a virtual document
pub const SOURCE_MAP_FRAGMENT: &str = "sourcemap";

pub const OPEN_WEBSITE: &str = "$/openWebsite";
pub const SHOW_VIRTUAL_FILE: &str = "$/showVirtualFile";
pub const QUERY_VIRTUAL_FILE_INFO: &str = "$/queryVirtualFileInfo";
pub const DOCTOR: &str = "$/doctor";

/// Params of `$/openWebsite`: a bare URL or a one-element array
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OpenWebsiteParams {
    Url(String),
    Positional(Vec<String>),
}

impl OpenWebsiteParams {
    pub fn url(&self) -> Option<&str> {
        match self {
            OpenWebsiteParams::Url(url) => Some(url),
            OpenWebsiteParams::Positional(args) => args.first().map(String::as_str),
        }
    }
}

/// Params of `$/showVirtualFile`
///
/// Positional forms come first: a struct would also accept an array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ShowVirtualFileParams {
    PositionalWithUri(String, String, String),
    Positional(String, String),
    Named(VirtualFileContents),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualFileContents {
    #[serde(default)]
    pub uri: Option<String>,
    pub virtual_file_source: String,
    #[serde(default)]
    pub pretty_source_map: String,
}

impl ShowVirtualFileParams {
    /// Splits into `(uri, content, source_map)`, defaulting the uri.
    pub fn into_parts(self) -> (String, String, String) {
        match self {
            ShowVirtualFileParams::Named(contents) => (
                contents
                    .uri
                    .unwrap_or_else(|| DEFAULT_VIRTUAL_URI.to_string()),
                contents.virtual_file_source,
                contents.pretty_source_map,
            ),
            ShowVirtualFileParams::PositionalWithUri(content, source_map, uri) => {
                (uri, content, source_map)
            }
            ShowVirtualFileParams::Positional(content, source_map) => {
                (DEFAULT_VIRTUAL_URI.to_string(), content, source_map)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryVirtualFileInfoParams {
    pub source_uri: String,
}

/// Reply to `$/queryVirtualFileInfo`; `null` means the source has no
/// virtual representation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualFileInfo {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub virtual_file_source: Option<String>,
    #[serde(default)]
    pub pretty_source_map: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorParams {
    pub file_name: String,
}

/// Virtual uri derived from a source document uri: `vls-virtual:<source path>`.
pub fn virtual_uri_for(source_uri: &str) -> String {
    let path = Url::parse(source_uri)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| source_uri.to_string());
    format!("{}:{}", VIRTUAL_SCHEME, path)
}
