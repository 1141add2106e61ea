//! Credential models

use std::fmt;

use serde::{Deserialize, Serialize};

/// Username and secret handed to the git engine for one operation
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub username: String,
    pub secret: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// What the git engine is asking credentials for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    pub url: String,
    /// Username embedded in the URL, if any
    pub username: Option<String>,
}

impl CredentialRequest {
    pub fn new(url: impl Into<String>, username: Option<&str>) -> Self {
        Self {
            url: url.into(),
            username: username.map(|s| s.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let cred = Credential::new("octocat", "hunter2");
        let printed = format!("{:?}", cred);
        assert!(printed.contains("octocat"));
        assert!(!printed.contains("hunter2"));
    }
}
