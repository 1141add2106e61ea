//! Branch, tag and stash models

use serde::{Deserialize, Serialize};

/// Git signature (tagger)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp: i64,
}

impl From<git2::Signature<'_>> for Signature {
    fn from(sig: git2::Signature) -> Self {
        Self {
            name: sig.name().unwrap_or("").to_string(),
            email: sig.email().unwrap_or("").to_string(),
            timestamp: sig.when().seconds(),
        }
    }
}

/// Tag information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub name: String,
    pub target_oid: String,
    pub message: Option<String>,
    pub tagger: Option<Signature>,
    pub is_annotated: bool,
}

/// Stash entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stash {
    pub index: usize,
    pub message: String,
    pub oid: String,
}

/// Upstream configuration of a local branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingBranch {
    /// The local branch name
    pub local_branch: String,
    /// The remote name (e.g., "origin")
    pub remote: Option<String>,
    /// The branch name on the remote (e.g., "main")
    pub remote_branch: String,
    /// The full upstream reference (e.g., "refs/remotes/origin/main")
    pub upstream_ref: String,
}
