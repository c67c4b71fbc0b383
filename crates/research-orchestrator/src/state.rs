//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::service::{Composer, PollCoordinator, Submitter};
use crate::upstream::{ChatBackend, HttpTaskApi, OpenAiChatClient, TaskApi, UpstreamError};

/// Shared application state.
///
/// Holds only immutable service handles; nothing here changes between requests.
pub struct AppState {
    pub composer: Composer,
    pub submitter: Submitter,
    pub coordinator: PollCoordinator,
}

impl AppState {
    /// Build state with reqwest-backed upstream clients.
    pub fn new(config: &Config) -> Result<Arc<Self>, UpstreamError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("research-orchestrator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let chat = Arc::new(OpenAiChatClient::new(
            http.clone(),
            &config.chat.base_url,
            config.chat.api_key.clone(),
            config.chat.temperature,
        ));
        let task_api = Arc::new(HttpTaskApi::new(
            http,
            &config.task_api.base_url,
            config.task_api.api_key.clone(),
        ));

        Ok(Self::with_backends(config, chat, task_api))
    }

    /// Build state over arbitrary upstream implementations.
    pub fn with_backends(
        config: &Config,
        chat: Arc<dyn ChatBackend>,
        task_api: Arc<dyn TaskApi>,
    ) -> Arc<Self> {
        Arc::new(Self {
            composer: Composer::new(
                chat,
                config.chat.models.clone(),
                Duration::from_secs(config.chat.attempt_timeout_secs),
            ),
            submitter: Submitter::new(
                task_api.clone(),
                Duration::from_secs(config.task_api.submit_timeout_secs),
            ),
            coordinator: PollCoordinator::new(task_api, config.poll.clone()),
        })
    }
}
