//! Quest query orchestration.
//!
//! Owns the quest collection and the fetch lifecycle around it. Every
//! outgoing fetch is stamped with a monotonically increasing epoch; a
//! response is applied only if its epoch is still the latest at resolution
//! time, otherwise it is discarded with zero state mutation. That discard
//! rule, not request cancellation, is what keeps a fast-moving radius
//! slider from letting an older, wider-radius response overwrite a newer
//! one.
//!
//! Failures on the latest epoch surface as an error message while the
//! last-good collection stays visible; there is no automatic retry.

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::EngineEvent;
use crate::metrics;
use crate::model::{haversine_km, Coordinate, Quest, QueryParameters};
use crate::remote::{GenerateQuestsRequest, QuestService};
use crate::storage::QuestCache;

/// What [`QueryOrchestrator::resolve`] did with a response.
#[derive(Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Latest-epoch success: the collection was replaced.
    Applied { count: usize },
    /// A newer fetch superseded this response; nothing changed.
    Stale,
    /// Latest-epoch failure: error state set, last-good data retained.
    Failed,
}

pub struct QueryOrchestrator {
    service: Arc<dyn QuestService>,
    latest_epoch: u64,
    /// Origin of the latest fetch, used to attach missing distances.
    origin: Option<Coordinate>,
    /// Parameters of the latest issued fetch, for refetch suppression.
    last_params: Option<QueryParameters>,
    quests: Vec<Quest>,
    loading: bool,
    error: Option<String>,
}

impl QueryOrchestrator {
    pub fn new(service: Arc<dyn QuestService>) -> Self {
        Self {
            service,
            latest_epoch: 0,
            origin: None,
            last_params: None,
            quests: Vec::new(),
            loading: false,
            error: None,
        }
    }

    pub fn quests(&self) -> &[Quest] {
        &self.quests
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn latest_epoch(&self) -> u64 {
        self.latest_epoch
    }

    /// Start tracking a new fetch: assign its epoch and flip to loading.
    ///
    /// Split out from [`submit`](Self::submit) so the state machine can be
    /// driven without a live service in tests.
    pub fn begin(&mut self, params: &QueryParameters) -> u64 {
        self.latest_epoch += 1;
        self.loading = true;
        self.origin = Some(params.location);
        self.last_params = Some(params.clone());
        metrics::inc_fetch_issued();
        debug!(
            "fetch epoch {} issued: radius=[{},{}] categories={}",
            self.latest_epoch,
            params.min_radius_km(),
            params.max_radius_km(),
            params.categories.len()
        );
        self.latest_epoch
    }

    /// Issue a fetch for `params`, reporting completion through `events`.
    ///
    /// Returns `None` without fetching when `params` is structurally equal
    /// to the last issued fetch; a settled value that did not actually
    /// change needs no round trip.
    pub fn submit(
        &mut self,
        params: QueryParameters,
        events: &mpsc::UnboundedSender<EngineEvent>,
    ) -> Option<u64> {
        if self.last_params.as_ref() == Some(&params) {
            debug!("settled parameters unchanged; fetch suppressed");
            return None;
        }
        Some(self.dispatch(params, events))
    }

    /// Re-issue the last fetch regardless of parameter equality (the user's
    /// "try again" action after a failure).
    pub fn retry(&mut self, events: &mpsc::UnboundedSender<EngineEvent>) -> Option<u64> {
        let params = self.last_params.clone()?;
        Some(self.dispatch(params, events))
    }

    fn dispatch(
        &mut self,
        params: QueryParameters,
        events: &mpsc::UnboundedSender<EngineEvent>,
    ) -> u64 {
        let epoch = self.begin(&params);
        let request = GenerateQuestsRequest::from(&params);
        let service = Arc::clone(&self.service);
        let tx = events.clone();
        tokio::spawn(async move {
            let result = service
                .generate(request)
                .await
                .map_err(|e| e.to_string());
            // Receiver gone means the session is over; nothing to do.
            let _ = tx.send(EngineEvent::FetchResolved { epoch, result });
        });
        epoch
    }

    /// Apply a completed fetch, enforcing the epoch-discard rule. On
    /// success the new collection is written through to `cache` for offline
    /// re-entry by id.
    pub fn resolve(
        &mut self,
        epoch: u64,
        result: Result<Vec<Quest>, String>,
        cache: &mut QuestCache,
    ) -> FetchOutcome {
        if epoch != self.latest_epoch {
            // A newer fetch owns the state now; this response never existed
            // as far as the UI is concerned.
            metrics::inc_fetch_stale_discarded();
            debug!(
                "discarding stale fetch epoch {} (latest is {})",
                epoch, self.latest_epoch
            );
            return FetchOutcome::Stale;
        }

        match result {
            Ok(mut quests) => {
                if let Some(origin) = self.origin {
                    attach_missing_distances(&mut quests, origin);
                }
                info!("fetch epoch {} applied: {} quest(s)", epoch, quests.len());
                cache.replace(&quests);
                let count = quests.len();
                self.quests = quests;
                self.loading = false;
                self.error = None;
                metrics::inc_fetch_applied();
                FetchOutcome::Applied { count }
            }
            Err(message) => {
                warn!("fetch epoch {} failed: {}", epoch, message);
                self.loading = false;
                self.error = Some(format!("Could not load quests: {message}"));
                metrics::inc_fetch_failed();
                FetchOutcome::Failed
            }
        }
    }
}

/// Attach a haversine distance from the fetch origin to each quest the
/// server returned without one, anchored at the quest's first step.
fn attach_missing_distances(quests: &mut [Quest], origin: Coordinate) {
    for quest in quests.iter_mut() {
        if quest.distance_km.is_none() {
            if let Some(anchor) = quest.anchor() {
                quest.distance_km = Some(haversine_km(origin, anchor));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuestStep, StepKind};
    use crate::remote::RemoteError;
    use async_trait::async_trait;
    use chrono::Utc;

    struct NeverResolves;

    #[async_trait]
    impl QuestService for NeverResolves {
        async fn generate(
            &self,
            _request: GenerateQuestsRequest,
        ) -> Result<Vec<Quest>, RemoteError> {
            std::future::pending().await
        }
    }

    fn orchestrator() -> QueryOrchestrator {
        QueryOrchestrator::new(Arc::new(NeverResolves))
    }

    fn params(max_km: f64) -> QueryParameters {
        QueryParameters::new(Coordinate::new(43.26, -79.92), [0.0, max_km])
    }

    fn quest(id: &str, distance: Option<f64>) -> Quest {
        Quest {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            category: "general".into(),
            difficulty: "low_energy".into(),
            estimated_time_minutes: 60,
            estimated_cost: 0.0,
            steps: vec![QuestStep {
                order: 1,
                kind: StepKind::Place,
                item_id: None,
                name: "start".into(),
                description: None,
                estimated_time_minutes: None,
                location: Coordinate::new(43.2557, -79.8711),
            }],
            tags: vec![],
            best_time: None,
            distance_km: distance,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn stale_epoch_is_discarded_without_mutation() {
        let mut orch = orchestrator();
        let mut cache = QuestCache::default();
        let first = orch.begin(&params(10.0));
        let second = orch.begin(&params(25.0));
        assert!(second > first);

        // The slow first response arrives after the second was issued.
        let outcome = orch.resolve(first, Ok(vec![quest("old", None)]), &mut cache);
        assert_eq!(outcome, FetchOutcome::Stale);
        assert!(orch.quests().is_empty());
        assert!(orch.loading(), "still waiting on the live epoch");
        assert!(cache.is_empty());

        let outcome = orch.resolve(second, Ok(vec![quest("new", None)]), &mut cache);
        assert_eq!(outcome, FetchOutcome::Applied { count: 1 });
        assert_eq!(orch.quests()[0].id, "new");
        assert!(cache.get("new").is_some());
    }

    #[test]
    fn failure_keeps_last_good_collection() {
        let mut orch = orchestrator();
        let mut cache = QuestCache::default();
        let e1 = orch.begin(&params(10.0));
        orch.resolve(e1, Ok(vec![quest("keep", Some(1.0))]), &mut cache);

        let e2 = orch.begin(&params(25.0));
        let outcome = orch.resolve(e2, Err("boom".into()), &mut cache);
        assert_eq!(outcome, FetchOutcome::Failed);
        assert_eq!(orch.quests().len(), 1, "last-good data retained");
        assert_eq!(orch.quests()[0].id, "keep");
        assert!(orch.error().expect("error set").contains("boom"));
        assert!(!orch.loading());
    }

    #[test]
    fn missing_distance_attached_from_origin() {
        let mut orch = orchestrator();
        let mut cache = QuestCache::default();
        let e = orch.begin(&params(10.0));
        orch.resolve(
            e,
            Ok(vec![quest("a", None), quest("b", Some(4.2))]),
            &mut cache,
        );
        let a = &orch.quests()[0];
        let b = &orch.quests()[1];
        assert!(a.distance_km.expect("attached") > 0.0);
        assert!(a.distance_km.unwrap() < 10.0, "nearby anchor");
        assert_eq!(b.distance_km, Some(4.2), "server value untouched");
    }

    #[tokio::test]
    async fn equal_settled_parameters_suppress_refetch() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut orch = orchestrator();
        let first = orch.submit(params(10.0), &tx);
        assert!(first.is_some());
        let second = orch.submit(params(10.0), &tx);
        assert!(second.is_none(), "structurally equal parameters");
        let third = orch.submit(params(25.0), &tx);
        assert!(third.is_some());
    }

    #[tokio::test]
    async fn retry_reissues_even_with_equal_parameters() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut orch = orchestrator();
        assert!(orch.retry(&tx).is_none(), "nothing fetched yet");
        orch.submit(params(10.0), &tx);
        let epoch = orch.retry(&tx).expect("retry issued");
        assert_eq!(epoch, 2);
    }
}
