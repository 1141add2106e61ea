//! Per-operation credential provider
//!
//! Credentials are asked for on the background thread running the git
//! engine, while the prompt itself runs on the async side. The two are
//! joined by a oneshot channel: the background thread blocks on the
//! receiver, the prompt future sends the answer.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::models::{Credential, CredentialRequest};
use crate::services::cancellation::CancellationToken;

/// Asks the user for credentials
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    /// `None` when the user cancels
    async fn prompt(&self, request: CredentialRequest) -> Option<Credential>;
}

#[derive(Default)]
struct ProviderState {
    /// host -> credential the user gave during this operation
    cached: HashMap<String, Credential>,
    /// hosts whose cached credential has been handed to the engine
    handed_out: HashSet<String>,
    prompts: u32,
    remote_url: Option<String>,
    prompt_canceled: bool,
}

/// Credential source for a single operation
pub struct CredentialProvider {
    prompt: Arc<dyn CredentialPrompt>,
    runtime: Handle,
    token: CancellationToken,
    max_prompts: u32,
    state: Mutex<ProviderState>,
}

impl CredentialProvider {
    pub fn new(
        prompt: Arc<dyn CredentialPrompt>,
        runtime: Handle,
        token: CancellationToken,
        max_prompts: u32,
    ) -> Self {
        Self {
            prompt,
            runtime,
            token,
            max_prompts,
            state: Mutex::new(ProviderState::default()),
        }
    }

    /// Record the URL the operation is about to talk to
    pub fn set_remote_url(&self, url: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.remote_url = Some(url.to_string());
        }
    }

    pub fn remote_url(&self) -> Option<String> {
        self.state.lock().ok()?.remote_url.clone()
    }

    /// True once the user dismissed a prompt, or a prompt was abandoned
    /// because the operation was cancelled
    pub fn prompt_canceled(&self) -> bool {
        self.state.lock().map(|s| s.prompt_canceled).unwrap_or(false)
    }

    /// Resolve credentials for the engine. Blocks the calling thread while
    /// the user is being asked, so it must not be called from async code.
    pub fn get_password(&self, request: &CredentialRequest) -> Option<Credential> {
        let url = if request.url.is_empty() {
            self.remote_url().unwrap_or_default()
        } else {
            request.url.clone()
        };
        let key = extract_host(&url).unwrap_or_else(|| url.clone());

        {
            let mut state = self.state.lock().ok()?;

            if let Some(credential) = state.cached.get(&key).cloned() {
                if state.handed_out.insert(key.clone()) {
                    tracing::debug!("Using cached credentials for host: {}", key);
                    return Some(credential);
                }
                // Asked again for the same host: the engine rejected it
                tracing::debug!("Cached credentials rejected for host: {}", key);
                state.cached.remove(&key);
                state.handed_out.remove(&key);
            }

            if state.prompts >= self.max_prompts {
                tracing::warn!(
                    "Giving up on credentials for {} after {} prompts",
                    key,
                    state.prompts
                );
                return None;
            }

            if self.token.is_cancelled() {
                state.prompt_canceled = true;
                return None;
            }

            state.prompts += 1;
        }

        let prompt_request = CredentialRequest {
            url,
            username: request.username.clone(),
        };
        let answer = self.ask_user(prompt_request);

        let mut state = self.state.lock().ok()?;
        match answer {
            Some(credential) => {
                state.cached.insert(key.clone(), credential.clone());
                state.handed_out.insert(key);
                Some(credential)
            }
            None => {
                tracing::debug!("Credential prompt canceled for host: {}", key);
                state.prompt_canceled = true;
                None
            }
        }
    }

    fn ask_user(&self, request: CredentialRequest) -> Option<Credential> {
        let (tx, rx) = oneshot::channel();
        let prompt = Arc::clone(&self.prompt);
        let token = self.token.clone();

        self.runtime.spawn(async move {
            let answer = tokio::select! {
                answer = prompt.prompt(request) => answer,
                _ = token.cancelled() => None,
            };
            let _ = tx.send(answer);
        });

        rx.blocking_recv().ok().flatten()
    }
}

/// Extract host from a git URL
pub fn extract_host(url: &str) -> Option<String> {
    // Handle SSH URLs like git@github.com:user/repo.git
    if url.contains('@') && url.contains(':') && !url.contains("://") {
        let parts: Vec<&str> = url.split('@').collect();
        if parts.len() >= 2 {
            let host_part: Vec<&str> = parts[1].split(':').collect();
            return Some(host_part[0].to_string());
        }
    }

    if let Ok(parsed) = url::Url::parse(url) {
        return parsed.host_str().map(|s| s.to_string());
    }

    None
}
