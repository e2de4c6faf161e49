//! HTTP client for the quest-generation collaborator.
//!
//! Thin wrapper over the `POST {base_url}/quests/generate` endpoint: apply
//! the configured timeout, treat any non-success status as a failure, decode
//! the JSON body into [`Quest`] values, and restore the step-order invariant
//! on each quest before handing it to the engine.

use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;
use tokio::time::timeout;

use super::{GenerateQuestsRequest, QuestService, RemoteError};
use crate::config::ApiConfig;
use crate::model::Quest;

pub struct QuestApiClient {
    config: ApiConfig,
    client: reqwest::Client,
}

impl QuestApiClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn generate_url(&self) -> String {
        format!("{}/quests/generate", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl QuestService for QuestApiClient {
    async fn generate(&self, request: GenerateQuestsRequest) -> Result<Vec<Quest>, RemoteError> {
        let url = self.generate_url();
        debug!(
            "requesting quests: radius_km={} min_radius_km={} categories={:?}",
            request.radius_km,
            request.preferences.min_radius_km,
            request.categories
        );

        let send = self.client.post(&url).json(&request).send();
        let timeout_duration = Duration::from_secs(self.config.timeout_seconds as u64);

        let response = timeout(timeout_duration, send)
            .await
            .map_err(|_| RemoteError::Timeout(self.config.timeout_seconds))?
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!("quest generation returned status {}", status);
            return Err(RemoteError::Status(status.as_u16()));
        }

        let mut quests: Vec<Quest> = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        for quest in &mut quests {
            quest.normalize_steps();
        }
        debug!("quest generation returned {} quest(s)", quests.len());
        Ok(quests)
    }
}
