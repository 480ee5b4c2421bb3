//! Wire types for the slice of the GitHub contents API the store uses.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct ContentsFile {
    pub sha: String,
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PutContents<'a> {
    pub message: &'a str,
    pub content: String,
    pub branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PutContentsResponse {
    pub content: BlobRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlobRef {
    pub sha: String,
}
