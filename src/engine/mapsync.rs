//! Map synchronization.
//!
//! Owns the marker table that mirrors the visible quest list onto a loaded
//! [`MapCanvas`]. The surface loads lazily: render requests issued before
//! the canvas arrives are coalesced into one pending snapshot (last writer
//! wins) and flushed exactly once when loading completes. A failed load
//! leaves the session in list-only mode; quest data keeps flowing and no
//! marker call is ever made against a surface that does not exist.
//!
//! Reconciliation is keyed by quest id: markers for absent quests are
//! detached, missing quests get fresh markers, and survivors are restyled
//! in place, never recreated, so their handles stay stable and an open
//! info panel survives a reorder. Markers are labeled with their 1-based
//! position in the visible list; a quest that moved position is renumbered
//! through the same restyle call.

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::EngineEvent;
use crate::metrics;
use crate::model::{Coordinate, Quest};
use crate::remote::{InfoPanelContent, MapCanvas, MapError, MapLibrary, MarkerId};

/// Lifecycle of the rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    Uninitialized,
    Initializing,
    Ready,
}

/// What a render call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileStats {
    pub created: usize,
    pub detached: usize,
    pub restyled: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Markers were reconciled against the live canvas.
    Applied(ReconcileStats),
    /// No canvas yet; the snapshot was stashed for the one-shot flush.
    Deferred,
}

struct MarkerEntry {
    marker: MarkerId,
    label: u32,
    selected: bool,
}

pub struct MapSyncController {
    library: Arc<dyn MapLibrary>,
    state: MapState,
    load_failed: bool,
    canvas: Option<Box<dyn MapCanvas>>,
    markers: HashMap<String, MarkerEntry>,
    /// Latest pre-ready render request, replaced on every deferral.
    pending: Option<(Vec<Quest>, Option<String>)>,
}

impl MapSyncController {
    pub fn new(library: Arc<dyn MapLibrary>) -> Self {
        Self {
            library,
            state: MapState::Uninitialized,
            load_failed: false,
            canvas: None,
            markers: HashMap::new(),
            pending: None,
        }
    }

    pub fn state(&self) -> MapState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == MapState::Ready
    }

    /// True once a load attempt has failed; the session is list-only.
    pub fn load_failed(&self) -> bool {
        self.load_failed
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    /// Kick off the surface load. Safe to call once; repeat calls while a
    /// load is pending or complete are ignored.
    pub fn begin_initialize(
        &mut self,
        center: Coordinate,
        zoom: u8,
        events: &mpsc::UnboundedSender<EngineEvent>,
    ) {
        if self.state != MapState::Uninitialized {
            return;
        }
        self.state = MapState::Initializing;
        let library = Arc::clone(&self.library);
        let tx = events.clone();
        tokio::spawn(async move {
            let result = library.load(center, zoom).await.map_err(|e| e.to_string());
            let _ = tx.send(EngineEvent::MapLoaded { result });
        });
    }

    /// Settle the load attempt. On success the coalesced pending snapshot,
    /// if any, is flushed exactly once. On failure the controller stays in
    /// [`MapState::Initializing`] with `load_failed` set; the pending
    /// snapshot is dropped since there will never be a surface to draw it.
    pub fn on_loaded(
        &mut self,
        result: Result<Box<dyn MapCanvas>, String>,
    ) -> Result<Option<ReconcileStats>, MapError> {
        match result {
            Ok(canvas) => {
                self.canvas = Some(canvas);
                self.state = MapState::Ready;
                debug!("map surface ready");
                if let Some((quests, selected)) = self.pending.take() {
                    let stats = self.reconcile(&quests, selected.as_deref())?;
                    return Ok(Some(stats));
                }
                Ok(None)
            }
            Err(message) => {
                warn!("map surface failed to load: {message}; continuing list-only");
                self.load_failed = true;
                self.pending = None;
                Ok(None)
            }
        }
    }

    /// Mirror the visible list onto the map, or stash it if the surface is
    /// not ready yet.
    pub fn render(
        &mut self,
        visible: &[Quest],
        selected: Option<&str>,
    ) -> Result<RenderOutcome, MapError> {
        if self.state != MapState::Ready {
            if !self.load_failed {
                self.pending = Some((visible.to_vec(), selected.map(str::to_string)));
            }
            return Ok(RenderOutcome::Deferred);
        }
        let stats = self.reconcile(visible, selected)?;
        Ok(RenderOutcome::Applied(stats))
    }

    /// Translate a canvas marker back to its quest id.
    pub fn quest_for_marker(&self, marker: MarkerId) -> Option<&str> {
        self.markers
            .iter()
            .find(|(_, entry)| entry.marker == marker)
            .map(|(id, _)| id.as_str())
    }

    /// Open the info panel on the quest's marker, if both exist.
    pub fn open_panel(&mut self, quest: &Quest) -> Result<(), MapError> {
        let (Some(canvas), Some(entry)) = (self.canvas.as_mut(), self.markers.get(&quest.id))
        else {
            return Ok(());
        };
        canvas.open_info_panel(entry.marker, InfoPanelContent::from(quest))
    }

    fn reconcile(
        &mut self,
        visible: &[Quest],
        selected: Option<&str>,
    ) -> Result<ReconcileStats, MapError> {
        let Some(canvas) = self.canvas.as_mut() else {
            return Ok(ReconcileStats::default());
        };
        let mut stats = ReconcileStats::default();

        // Pass 1: detach markers whose quest left the visible list.
        let mut desired: HashMap<&str, (u32, bool, &Quest)> = HashMap::new();
        for (index, quest) in visible.iter().enumerate() {
            let label = (index + 1) as u32;
            let is_selected = selected == Some(quest.id.as_str());
            desired.insert(quest.id.as_str(), (label, is_selected, quest));
        }

        let mut stale: Vec<String> = Vec::new();
        for id in self.markers.keys() {
            if !desired.contains_key(id.as_str()) {
                stale.push(id.clone());
            }
        }
        for id in stale {
            if let Some(entry) = self.markers.remove(&id) {
                canvas.detach_marker(entry.marker)?;
                stats.detached += 1;
            }
        }

        // Pass 2: create missing markers; restyle survivors in place when
        // their label or selection drifted. Recreation would flicker and
        // close an open info panel, so a survivor keeps its handle.
        for (id, (label, is_selected, quest)) in desired {
            match self.markers.get_mut(id) {
                Some(entry) => {
                    if entry.label != label || entry.selected != is_selected {
                        canvas.restyle_marker(entry.marker, label, is_selected)?;
                        entry.label = label;
                        entry.selected = is_selected;
                        stats.restyled += 1;
                    }
                }
                None => {
                    let Some(anchor) = quest.anchor() else {
                        continue;
                    };
                    let marker = canvas.create_marker(anchor, label, is_selected)?;
                    self.markers.insert(
                        id.to_string(),
                        MarkerEntry {
                            marker,
                            label,
                            selected: is_selected,
                        },
                    );
                    stats.created += 1;
                }
            }
        }

        metrics::inc_markers_created(stats.created as u64);
        metrics::inc_markers_detached(stats.detached as u64);
        metrics::inc_markers_restyled(stats.restyled as u64);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuestStep, StepKind};
    use crate::remote::HeadlessMapLibrary;
    use async_trait::async_trait;
    use chrono::Utc;

    struct FailingLibrary;

    #[async_trait]
    impl MapLibrary for FailingLibrary {
        async fn load(
            &self,
            _center: Coordinate,
            _zoom: u8,
        ) -> Result<Box<dyn MapCanvas>, MapError> {
            Err(MapError::LoadFailed("script blocked".into()))
        }
    }

    fn quest(id: &str, lat: f64) -> Quest {
        Quest {
            id: id.to_string(),
            title: format!("Quest {id}"),
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
                location: Coordinate::new(lat, -79.92),
            }],
            tags: vec![],
            best_time: None,
            distance_km: None,
            created_at: Utc::now(),
        }
    }

    async fn ready_controller() -> MapSyncController {
        let library = Arc::new(HeadlessMapLibrary);
        let mut controller = MapSyncController::new(library.clone());
        controller.state = MapState::Initializing;
        let canvas = library
            .load(Coordinate::new(43.26, -79.92), 13)
            .await
            .expect("load");
        controller.on_loaded(Ok(canvas)).expect("ready");
        controller
    }

    #[tokio::test]
    async fn pre_ready_renders_coalesce_and_flush_once() {
        let library = Arc::new(HeadlessMapLibrary);
        let mut controller = MapSyncController::new(library.clone());

        let early = vec![quest("a", 43.1)];
        let late = vec![quest("a", 43.1), quest("b", 43.2)];
        assert_eq!(
            controller.render(&early, None).expect("render"),
            RenderOutcome::Deferred
        );
        assert_eq!(
            controller.render(&late, Some("b")).expect("render"),
            RenderOutcome::Deferred
        );
        assert_eq!(controller.marker_count(), 0, "nothing drawn yet");

        let canvas = library
            .load(Coordinate::new(43.26, -79.92), 13)
            .await
            .expect("load");
        let flushed = controller.on_loaded(Ok(canvas)).expect("ready");
        let stats = flushed.expect("one flush");
        assert_eq!(stats.created, 2, "only the last snapshot was drawn");
        assert_eq!(controller.marker_count(), 2);
    }

    #[tokio::test]
    async fn load_failure_degrades_to_list_only() {
        let mut controller = MapSyncController::new(Arc::new(FailingLibrary));
        controller.state = MapState::Initializing;
        controller
            .render(&[quest("a", 43.1)], None)
            .expect("deferral");

        let flushed = controller
            .on_loaded(Err("script blocked".into()))
            .expect("degrade");
        assert!(flushed.is_none());
        assert!(controller.load_failed());
        assert!(!controller.is_ready());
        assert_eq!(controller.state(), MapState::Initializing);

        // Later renders stay quiet instead of erroring.
        let outcome = controller
            .render(&[quest("b", 43.2)], None)
            .expect("render");
        assert_eq!(outcome, RenderOutcome::Deferred);
        assert_eq!(controller.marker_count(), 0);
    }

    #[tokio::test]
    async fn reconcile_detaches_absent_and_creates_missing() {
        let mut controller = ready_controller().await;
        let first = vec![quest("a", 43.1), quest("b", 43.2)];
        controller.render(&first, None).expect("render");
        assert_eq!(controller.marker_count(), 2);

        // "a" leaves, "c" arrives in position 2; "b" moves to position 1.
        let second = vec![quest("b", 43.2), quest("c", 43.3)];
        let RenderOutcome::Applied(stats) = controller.render(&second, None).expect("render")
        else {
            panic!("expected live reconcile");
        };
        assert_eq!(controller.marker_count(), 2);
        assert_eq!(stats.detached, 1, "only the absent quest is detached");
        assert_eq!(stats.created, 1);
        assert_eq!(stats.restyled, 1, "survivor renumbered in place");
    }

    #[tokio::test]
    async fn reorder_restyles_in_place_without_rebuilding() {
        let mut controller = ready_controller().await;
        let quests = vec![quest("a", 43.1), quest("b", 43.2)];
        controller.render(&quests, None).expect("render");
        controller.open_panel(&quests[0]).expect("panel");

        let handle_a = controller.markers.get("a").expect("entry").marker;
        let handle_b = controller.markers.get("b").expect("entry").marker;

        // A sort flip reorders everything; no marker may be rebuilt.
        let flipped = vec![quests[1].clone(), quests[0].clone()];
        let RenderOutcome::Applied(stats) = controller.render(&flipped, None).expect("render")
        else {
            panic!("expected live reconcile");
        };
        assert_eq!(stats.detached, 0);
        assert_eq!(stats.created, 0);
        assert_eq!(stats.restyled, 2, "both quests renumbered");
        assert_eq!(controller.markers.get("a").expect("entry").marker, handle_a);
        assert_eq!(controller.markers.get("b").expect("entry").marker, handle_b);
        assert_eq!(controller.markers.get("a").expect("entry").label, 2);
        assert_eq!(controller.markers.get("b").expect("entry").label, 1);
    }

    #[tokio::test]
    async fn selection_change_restyles_without_rebuilding() {
        let mut controller = ready_controller().await;
        let quests = vec![quest("a", 43.1), quest("b", 43.2)];
        controller.render(&quests, None).expect("render");

        let RenderOutcome::Applied(stats) =
            controller.render(&quests, Some("b")).expect("render")
        else {
            panic!("expected live reconcile");
        };
        assert_eq!(stats.created, 0);
        assert_eq!(stats.detached, 0);
        assert_eq!(stats.restyled, 1);

        // Moving the selection restyles both the old and new quest.
        let RenderOutcome::Applied(stats) =
            controller.render(&quests, Some("a")).expect("render")
        else {
            panic!("expected live reconcile");
        };
        assert_eq!(stats.restyled, 2);
    }

    #[tokio::test]
    async fn marker_lookup_round_trips_through_click() {
        let mut controller = ready_controller().await;
        let quests = vec![quest("a", 43.1)];
        controller.render(&quests, None).expect("render");

        let entry_marker = controller.markers.get("a").expect("entry").marker;
        assert_eq!(controller.quest_for_marker(entry_marker), Some("a"));
        controller.open_panel(&quests[0]).expect("panel");
    }
}
