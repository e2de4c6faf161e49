//! Test utilities & fixtures.
//! Scripted collaborator fakes plus quest builders shared by the
//! integration tests. Tests that mutate storage get their own temp dir.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use sidequest::model::{Coordinate, Quest, QuestStep, StepKind};
use sidequest::remote::{GenerateQuestsRequest, QuestService, RemoteError};
use sidequest::storage::{DocumentStore, StoreError};

/// Hamilton-ish coordinates used across the suite.
#[allow(dead_code)]
pub const ORIGIN: Coordinate = Coordinate {
    lat: 43.26,
    lng: -79.92,
};

#[allow(dead_code)]
pub fn quest(id: &str, title: &str, cost: f64, minutes: u32) -> Quest {
    Quest {
        id: id.to_string(),
        title: title.to_string(),
        description: format!("{title} description"),
        category: "general".into(),
        difficulty: "low_energy".into(),
        estimated_time_minutes: minutes,
        estimated_cost: cost,
        steps: vec![QuestStep {
            order: 1,
            kind: StepKind::Place,
            item_id: None,
            name: "start".into(),
            description: None,
            estimated_time_minutes: None,
            location: Coordinate::new(43.2557, -79.8711),
        }],
        tags: vec!["local".into()],
        best_time: None,
        distance_km: None,
        created_at: Utc::now(),
    }
}

/// One scripted response: wait `delay`, then answer.
pub struct ScriptedResponse {
    pub delay: Duration,
    pub result: Result<Vec<Quest>, String>,
}

#[allow(dead_code)]
impl ScriptedResponse {
    pub fn quests(quests: Vec<Quest>) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(quests),
        }
    }

    pub fn slow(delay_ms: u64, quests: Vec<Quest>) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            result: Ok(quests),
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(message.to_string()),
        }
    }
}

/// Quest service that answers from a script and records every request it
/// saw. Runs dry to an empty collection.
pub struct ScriptedService {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<GenerateQuestsRequest>>,
}

#[allow(dead_code)]
impl ScriptedService {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<GenerateQuestsRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl QuestService for ScriptedService {
    async fn generate(&self, request: GenerateQuestsRequest) -> Result<Vec<Quest>, RemoteError> {
        self.requests.lock().unwrap().push(request);
        let scripted = self.responses.lock().unwrap().pop_front();
        match scripted {
            Some(response) => {
                if !response.delay.is_zero() {
                    tokio::time::sleep(response.delay).await;
                }
                response.result.map_err(RemoteError::Transport)
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Engine collaborators against a static location and a headless map.
#[allow(dead_code)]
pub fn deps(
    service: std::sync::Arc<dyn QuestService>,
    store: std::sync::Arc<dyn DocumentStore>,
    user: Option<&str>,
) -> sidequest::engine::EngineDeps {
    use sidequest::engine::location::{LocationProvider, StaticLocationSource};
    use sidequest::remote::HeadlessMapLibrary;
    sidequest::engine::EngineDeps {
        service,
        library: std::sync::Arc::new(HeadlessMapLibrary),
        store,
        location: LocationProvider::new(
            Box::new(StaticLocationSource::new(ORIGIN)),
            Coordinate::new(43.2557, -79.8711),
            Duration::from_millis(100),
        ),
        geocoder: None,
        user_id: user.map(str::to_string),
    }
}

/// Poll snapshots until `done` holds or the deadline passes; returns the
/// last view either way.
#[allow(dead_code)]
pub async fn wait_for_view<F>(
    handle: &sidequest::engine::EngineHandle,
    timeout_ms: u64,
    done: F,
) -> sidequest::engine::DiscoveryView
where
    F: Fn(&sidequest::engine::DiscoveryView) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        let view = handle.snapshot().await.expect("engine alive");
        if done(&view) || tokio::time::Instant::now() >= deadline {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Document store whose writes always fail, for rollback coverage.
#[derive(Default)]
pub struct RejectingStore;

#[async_trait]
impl DocumentStore for RejectingStore {
    async fn put(
        &self,
        _collection: &str,
        _key: &str,
        _value: serde_json::Value,
    ) -> Result<(), StoreError> {
        Err(StoreError::Rejected("write refused".into()))
    }

    async fn delete(&self, _collection: &str, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Rejected("delete refused".into()))
    }

    async fn query_by_field(
        &self,
        _collection: &str,
        _field: &str,
        _value: &str,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        Ok(Vec::new())
    }
}
