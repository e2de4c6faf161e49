//! Discovery engine
//!
//! This module centralizes every state transition of a discovery session
//! behind one event loop. UI-facing entry points (search box, radius
//! slider, sort selector, marker clicks, favorite hearts) become events on
//! an unbounded channel; the loop applies each event synchronously to the
//! session state, re-runs the pure filter/sort pipeline, and mirrors the
//! result onto the map before picking up the next event. Asynchronous work
//! (quest fetches, favorite writes, the map surface load) is spawned off
//! and re-enters the loop as its own resolution event, so there is never a
//! partially applied update visible from outside.
//!
//! Components:
//! * [`location`] - one-shot coordinate acquisition with fallback.
//! * [`debounce`] - quiet-window coalescing for the radius slider.
//! * [`query`] - epoch-stamped fetch orchestration.
//! * [`filter`] - the pure filter/sort pipeline.
//! * [`mapsync`] - marker reconciliation against the map surface.
//! * [`favorites`] - optimistic favorite toggling with rollback.
//! * [`preferences`] - persisted per-user discovery settings.
//!
//! Public API kept minimal ([`EngineHandle`]) to evolve internals safely.

pub mod debounce;
pub mod favorites;
pub mod filter;
pub mod location;
pub mod mapsync;
pub mod preferences;
pub mod query;

use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::config::DiscoveryConfig;
use crate::model::{Coordinate, FilterState, Quest, QueryParameters, SortKey};
use crate::remote::{Geocoder, MapCanvas, MapLibrary, MarkerId, QuestService};
use crate::storage::{DocumentStore, QuestCache};

use debounce::{start_debouncer, Debouncer};
use favorites::FavoriteStore;
use location::{LocationFix, LocationProvider};
use mapsync::MapSyncController;
use preferences::{PreferenceStore, SavedPreferences};
use query::{FetchOutcome, QueryOrchestrator};

/// Everything that can happen to a discovery session.
pub enum EngineEvent {
    /// Startup coordinate resolved (possibly to the fallback).
    LocationResolved(LocationFix),
    /// Search box edit; filters instantly, no fetch.
    SearchTextChanged(String),
    /// Category chip toggled; filters instantly and stages a fetch hint.
    CategoryToggled(String),
    /// Raw radius slider movement; debounced before it can fetch.
    RadiusChanged([f64; 2]),
    /// A radius value survived the quiet window.
    RadiusSettled([f64; 2]),
    /// Reverse geocoding named the session's anchor area.
    AreaResolved(String),
    SortChanged(SortKey),
    /// A spawned fetch finished (any epoch).
    FetchResolved {
        epoch: u64,
        result: Result<Vec<Quest>, String>,
    },
    /// User-initiated refetch after a failure.
    RetryFetch,
    /// The map surface load finished.
    MapLoaded {
        result: Result<Box<dyn MapCanvas>, String>,
    },
    MarkerClicked(MarkerId),
    /// List-side selection (detail row tapped); `None` clears.
    QuestSelected(Option<String>),
    /// Hover highlight: moves the selection without opening a panel.
    QuestHovered(Option<String>),
    /// Favorite heart tapped for a quest id.
    FavoriteToggled(String),
    /// A spawned favorite write finished.
    FavoriteResolved {
        item_id: String,
        result: Result<(), String>,
    },
    Snapshot(oneshot::Sender<DiscoveryView>),
    Shutdown(oneshot::Sender<()>),
}

/// Point-in-time view of the session, for the CLI and for tests.
#[derive(Debug, Clone)]
pub struct DiscoveryView {
    /// Visible quests in display order (post filter/sort).
    pub quests: Vec<Quest>,
    /// Size of the unfiltered fetched collection.
    pub fetched_count: usize,
    pub loading: bool,
    pub fetch_error: Option<String>,
    pub location: Option<Coordinate>,
    pub location_warning: Option<String>,
    /// Human-readable name of the anchor area, when geocoding is enabled.
    pub area_name: Option<String>,
    pub selected: Option<String>,
    pub favorite_ids: Vec<String>,
    /// Transient user-facing notice (favorite rejection, rollback).
    pub notice: Option<String>,
    pub map_ready: bool,
    pub map_failed: bool,
    pub marker_count: usize,
}

/// Handle to a running discovery session.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineHandle {
    pub fn search(&self, text: impl Into<String>) {
        let _ = self.tx.send(EngineEvent::SearchTextChanged(text.into()));
    }

    pub fn toggle_category(&self, category: impl Into<String>) {
        let _ = self.tx.send(EngineEvent::CategoryToggled(category.into()));
    }

    pub fn set_radius(&self, range_km: [f64; 2]) {
        let _ = self.tx.send(EngineEvent::RadiusChanged(range_km));
    }

    pub fn set_sort(&self, key: SortKey) {
        let _ = self.tx.send(EngineEvent::SortChanged(key));
    }

    pub fn select(&self, quest_id: Option<String>) {
        let _ = self.tx.send(EngineEvent::QuestSelected(quest_id));
    }

    /// Highlight a quest without opening its info panel.
    pub fn hover(&self, quest_id: Option<String>) {
        let _ = self.tx.send(EngineEvent::QuestHovered(quest_id));
    }

    /// Re-anchor the session at a user-chosen coordinate (location search).
    /// Runs the same path as the startup fix: map load if still pending,
    /// area lookup, and a fresh fetch.
    pub fn set_location(&self, position: Coordinate) {
        let _ = self.tx.send(EngineEvent::LocationResolved(LocationFix {
            position,
            warning: None,
        }));
    }

    pub fn click_marker(&self, marker: MarkerId) {
        let _ = self.tx.send(EngineEvent::MarkerClicked(marker));
    }

    pub fn toggle_favorite(&self, quest_id: impl Into<String>) {
        let _ = self.tx.send(EngineEvent::FavoriteToggled(quest_id.into()));
    }

    pub fn retry_fetch(&self) {
        let _ = self.tx.send(EngineEvent::RetryFetch);
    }

    pub async fn snapshot(&self) -> Option<DiscoveryView> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(EngineEvent::Snapshot(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(EngineEvent::Shutdown(tx));
        let _ = rx.await;
    }
}

/// External collaborators a session runs against. Swapped for fakes in the
/// integration tests.
pub struct EngineDeps {
    pub service: Arc<dyn QuestService>,
    pub library: Arc<dyn MapLibrary>,
    pub store: Arc<dyn DocumentStore>,
    pub location: LocationProvider,
    /// Optional reverse geocoder for the "near ..." heading.
    pub geocoder: Option<Arc<dyn Geocoder>>,
    /// Signed-in user, or `None` for a guest session.
    pub user_id: Option<String>,
}

struct DiscoveryEngine {
    tx: mpsc::UnboundedSender<EngineEvent>,
    discovery: DiscoveryConfig,
    query: QueryOrchestrator,
    favorites: FavoriteStore,
    prefs: PreferenceStore,
    map: MapSyncController,
    radius_debounce: Debouncer<[f64; 2]>,
    filter: FilterState,
    /// Fetch-hint inputs staged for the next settled fetch.
    radius_range_km: [f64; 2],
    geocoder: Option<Arc<dyn Geocoder>>,
    location: Option<Coordinate>,
    location_warning: Option<String>,
    area_name: Option<String>,
    selected: Option<String>,
    notice: Option<String>,
    visible: Vec<Quest>,
    cache: QuestCache,
}

impl DiscoveryEngine {
    fn new(
        discovery: DiscoveryConfig,
        deps: &EngineDeps,
        tx: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        let debounce_tx = tx.clone();
        let radius_debounce = start_debouncer(
            Duration::from_millis(discovery.radius_debounce_ms),
            move |range| {
                let _ = debounce_tx.send(EngineEvent::RadiusSettled(range));
            },
        );
        let mut filter = FilterState::default();
        filter
            .selected_categories
            .extend(discovery.categories.iter().cloned());
        Self {
            tx,
            radius_range_km: [discovery.min_radius_km, discovery.max_radius_km],
            discovery,
            query: QueryOrchestrator::new(Arc::clone(&deps.service)),
            favorites: FavoriteStore::new(Arc::clone(&deps.store), deps.user_id.clone()),
            prefs: PreferenceStore::new(Arc::clone(&deps.store), deps.user_id.clone()),
            map: MapSyncController::new(Arc::clone(&deps.library)),
            radius_debounce,
            filter,
            geocoder: deps.geocoder.clone(),
            location: None,
            location_warning: None,
            area_name: None,
            selected: None,
            notice: None,
            visible: Vec::new(),
            cache: QuestCache::default(),
        }
    }

    fn current_params(&self) -> Option<QueryParameters> {
        let location = self.location?;
        let mut params = QueryParameters::new(location, self.radius_range_km);
        params.categories = self.filter.selected_categories.clone();
        Some(params)
    }

    fn submit_current(&mut self) {
        if let Some(params) = self.current_params() {
            self.query.submit(params, &self.tx);
        }
    }

    /// Re-run the pipeline and mirror the result onto the map. Called after
    /// every state change so list and markers never diverge.
    fn refresh(&mut self) {
        self.visible = filter::apply(self.query.quests(), &self.filter);
        if self
            .selected
            .as_ref()
            .is_some_and(|id| !self.visible.iter().any(|q| &q.id == id))
        {
            self.selected = None;
        }
        if let Err(e) = self.map.render(&self.visible, self.selected.as_deref()) {
            warn!("marker reconciliation failed: {e}");
        }
    }

    fn view(&self) -> DiscoveryView {
        DiscoveryView {
            quests: self.visible.clone(),
            fetched_count: self.query.quests().len(),
            loading: self.query.loading(),
            fetch_error: self.query.error().map(str::to_string),
            location: self.location,
            location_warning: self.location_warning.clone(),
            area_name: self.area_name.clone(),
            selected: self.selected.clone(),
            favorite_ids: self
                .favorites
                .records()
                .iter()
                .map(|r| r.item_id.clone())
                .collect(),
            notice: self.notice.clone(),
            map_ready: self.map.is_ready(),
            map_failed: self.map.load_failed(),
            marker_count: self.map.marker_count(),
        }
    }

    /// Apply one event. Returns `false` on shutdown.
    fn handle(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::LocationResolved(fix) => {
                info!("session anchored at {},{}", fix.position.lat, fix.position.lng);
                self.location = Some(fix.position);
                self.location_warning = fix.warning;
                self.map
                    .begin_initialize(fix.position, self.discovery.map_zoom, &self.tx);
                if let Some(geocoder) = self.geocoder.clone() {
                    let tx = self.tx.clone();
                    let position = fix.position;
                    tokio::spawn(async move {
                        match geocoder.reverse(position).await {
                            Ok(address) => {
                                let _ = tx.send(EngineEvent::AreaResolved(address));
                            }
                            // Cosmetic lookup; a miss just leaves the heading blank.
                            Err(e) => debug!("reverse geocode failed: {e}"),
                        }
                    });
                }
                self.submit_current();
            }
            EngineEvent::AreaResolved(address) => {
                debug!("area: {}", crate::logutil::text_preview(&address, 80));
                self.area_name = Some(address);
            }
            EngineEvent::SearchTextChanged(text) => {
                debug!("search text: '{}'", crate::logutil::search_preview(&text));
                self.filter.search_text = text;
                self.refresh();
            }
            EngineEvent::CategoryToggled(category) => {
                // Instant client-side filter plus a staged fetch hint; the
                // hint rides the same quiet window as the radius slider.
                if !self.filter.selected_categories.remove(&category) {
                    self.filter.selected_categories.insert(category);
                }
                self.refresh();
                self.radius_debounce.schedule(self.radius_range_km);
            }
            EngineEvent::RadiusChanged(range_km) => {
                self.radius_debounce.schedule(range_km);
            }
            EngineEvent::RadiusSettled(range_km) => {
                self.radius_range_km = range_km;
                self.submit_current();
                self.save_preferences();
            }
            EngineEvent::SortChanged(key) => {
                self.filter.sort_key = key;
                self.refresh();
                self.save_preferences();
            }
            EngineEvent::FetchResolved { epoch, result } => {
                let outcome = self.query.resolve(epoch, result, &mut self.cache);
                if outcome != FetchOutcome::Stale {
                    self.refresh();
                }
            }
            EngineEvent::RetryFetch => {
                self.query.retry(&self.tx);
            }
            EngineEvent::MapLoaded { result } => match self.map.on_loaded(result) {
                Ok(Some(stats)) => {
                    debug!(
                        "flushed deferred render: {} marker(s) created",
                        stats.created
                    );
                }
                Ok(None) => {}
                Err(e) => warn!("deferred render failed: {e}"),
            },
            EngineEvent::MarkerClicked(marker) => {
                let quest_id = self.map.quest_for_marker(marker).map(str::to_string);
                if let Some(id) = quest_id {
                    self.select_quest(Some(id));
                }
            }
            EngineEvent::QuestSelected(quest_id) => {
                self.select_quest(quest_id);
            }
            EngineEvent::QuestHovered(quest_id) => {
                self.selected = quest_id;
                self.refresh();
            }
            EngineEvent::FavoriteToggled(quest_id) => {
                // The current fetch may not contain a favorite hydrated from
                // an earlier session; its stored snapshot still identifies it.
                let quest = self
                    .cache
                    .get(&quest_id)
                    .or_else(|| self.favorites.quest_snapshot(&quest_id))
                    .cloned();
                let Some(quest) = quest else {
                    warn!("favorite toggle for unknown quest {quest_id}");
                    return true;
                };
                match self.favorites.toggle(&quest, &self.tx) {
                    Ok(()) => self.notice = None,
                    Err(e) => self.notice = Some(e.to_string()),
                }
            }
            EngineEvent::FavoriteResolved { item_id, result } => {
                let failed = result.is_err();
                self.favorites.resolve(&item_id, result);
                if failed {
                    self.notice = Some("Could not save favorite; change undone".to_string());
                }
            }
            EngineEvent::Snapshot(resp) => {
                let _ = resp.send(self.view());
            }
            EngineEvent::Shutdown(done) => {
                let _ = done.send(());
                return false;
            }
        }
        true
    }

    /// Start from the user's last saved settings. Applied before the first
    /// fetch, so the startup request already carries them.
    fn apply_saved(&mut self, saved: SavedPreferences) {
        self.radius_range_km = saved.radius_range_km;
        self.filter.selected_categories = saved.categories.into_iter().collect();
        self.filter.sort_key = saved.sort_key;
    }

    fn save_preferences(&self) {
        self.prefs.save(
            self.radius_range_km,
            &self.filter.selected_categories,
            self.filter.sort_key,
        );
    }

    fn select_quest(&mut self, quest_id: Option<String>) {
        self.selected = quest_id;
        self.refresh();
        if let Some(id) = self.selected.clone() {
            if let Some(quest) = self.visible.iter().find(|q| q.id == id).cloned() {
                if let Err(e) = self.map.open_panel(&quest) {
                    warn!("info panel failed for {id}: {e}");
                }
            }
        }
    }
}

/// Spawn a discovery session and return its handle.
///
/// Startup runs inside the loop task: acquire the coordinate (never fails,
/// worst case is fallback plus warning), hydrate favorites, then let the
/// [`EngineEvent::LocationResolved`] event kick off the map load and the
/// first fetch.
pub fn start_engine(discovery: DiscoveryConfig, deps: EngineDeps) -> EngineHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<EngineEvent>();
    let handle = EngineHandle { tx: tx.clone() };

    tokio::spawn(async move {
        let mut engine = DiscoveryEngine::new(discovery, &deps, tx.clone());

        if let Err(e) = engine.favorites.hydrate().await {
            warn!("favorite hydration failed: {e}");
        }
        match engine.prefs.hydrate().await {
            Ok(Some(saved)) => engine.apply_saved(saved),
            Ok(None) => {}
            Err(e) => warn!("preference hydration failed: {e}"),
        }
        let fix = deps.location.acquire().await;
        let _ = tx.send(EngineEvent::LocationResolved(fix));

        while let Some(event) = rx.recv().await {
            if !engine.handle(event) {
                break;
            }
        }
        debug!("discovery engine loop terminated");
    });

    handle
}
