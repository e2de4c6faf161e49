//! Mapping collaborator boundary.
//!
//! The engine never talks to a concrete map SDK. It sees two seams:
//!
//! - [`MapLibrary`] - the asynchronous, on-demand load of a rendering
//!   surface anchored at a coordinate (this is the call that can fail and
//!   leave the session in degraded list-only mode);
//! - [`MapCanvas`] - the loaded surface's synchronous marker and info-panel
//!   primitives (create/detach/restyle, set-content/open).
//!
//! [`HeadlessMapLibrary`] is the built-in canvas used by the CLI and the
//! test suite: it renders nothing but faithfully tracks marker lifecycles,
//! including idempotent detach.

use async_trait::async_trait;
use log::{debug, trace};
use std::collections::HashMap;
use thiserror::Error;

use crate::model::{Coordinate, Quest};

/// Opaque handle to a rendered marker, stable for the marker's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerId(pub u64);

/// Summary fields shown in the info panel for a selected quest.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoPanelContent {
    pub title: String,
    pub description: String,
    pub estimated_time_minutes: u32,
    pub estimated_cost: f64,
    pub tags: Vec<String>,
}

impl From<&Quest> for InfoPanelContent {
    fn from(quest: &Quest) -> Self {
        Self {
            title: quest.title.clone(),
            description: quest.description.clone(),
            estimated_time_minutes: quest.estimated_time_minutes,
            estimated_cost: quest.estimated_cost,
            tags: quest.tags.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("map library failed to load: {0}")]
    LoadFailed(String),

    #[error("marker operation failed: {0}")]
    Marker(String),
}

/// A loaded rendering surface. All operations are synchronous; asynchrony
/// ends at [`MapLibrary::load`].
pub trait MapCanvas: Send {
    /// Create a marker at `position` labeled with its 1-based list number.
    fn create_marker(
        &mut self,
        position: Coordinate,
        label: u32,
        selected: bool,
    ) -> Result<MarkerId, MapError>;

    /// Update the label and selected styling of an existing marker in
    /// place. The marker's identity never changes; an open info panel
    /// anchored at it stays open.
    fn restyle_marker(&mut self, marker: MarkerId, label: u32, selected: bool)
        -> Result<(), MapError>;

    /// Explicitly detach a marker. Detaching an already-detached marker is a
    /// no-op, not an error.
    fn detach_marker(&mut self, marker: MarkerId) -> Result<(), MapError>;

    /// Populate and open the info panel anchored at `marker`.
    fn open_info_panel(&mut self, marker: MarkerId, content: InfoPanelContent)
        -> Result<(), MapError>;
}

/// Asynchronous, on-demand loader for a [`MapCanvas`].
#[async_trait]
pub trait MapLibrary: Send + Sync {
    async fn load(&self, center: Coordinate, zoom: u8) -> Result<Box<dyn MapCanvas>, MapError>;
}

#[derive(Debug, Clone)]
struct HeadlessMarker {
    #[allow(dead_code)] // retained for debug dumps
    position: Coordinate,
    #[allow(dead_code)]
    label: u32,
    selected: bool,
}

/// Render-free canvas that tracks marker state for CLI and test use.
#[derive(Default)]
pub struct HeadlessCanvas {
    next_id: u64,
    markers: HashMap<MarkerId, HeadlessMarker>,
    open_panel: Option<(MarkerId, InfoPanelContent)>,
}

impl HeadlessCanvas {
    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn open_panel(&self) -> Option<&(MarkerId, InfoPanelContent)> {
        self.open_panel.as_ref()
    }

    /// Number of markers currently styled as selected.
    pub fn selected_count(&self) -> usize {
        self.markers.values().filter(|m| m.selected).count()
    }
}

impl MapCanvas for HeadlessCanvas {
    fn create_marker(
        &mut self,
        position: Coordinate,
        label: u32,
        selected: bool,
    ) -> Result<MarkerId, MapError> {
        self.next_id += 1;
        let id = MarkerId(self.next_id);
        trace!("create marker #{} at {},{}", label, position.lat, position.lng);
        self.markers.insert(
            id,
            HeadlessMarker {
                position,
                label,
                selected,
            },
        );
        Ok(id)
    }

    fn restyle_marker(
        &mut self,
        marker: MarkerId,
        label: u32,
        selected: bool,
    ) -> Result<(), MapError> {
        match self.markers.get_mut(&marker) {
            Some(m) => {
                m.label = label;
                m.selected = selected;
                Ok(())
            }
            None => Err(MapError::Marker(format!("restyle of unknown marker {marker:?}"))),
        }
    }

    fn detach_marker(&mut self, marker: MarkerId) -> Result<(), MapError> {
        // Idempotent: a second detach finds nothing and succeeds.
        if self.markers.remove(&marker).is_some() {
            trace!("detached marker {marker:?}");
        }
        if self
            .open_panel
            .as_ref()
            .is_some_and(|(open, _)| *open == marker)
        {
            self.open_panel = None;
        }
        Ok(())
    }

    fn open_info_panel(
        &mut self,
        marker: MarkerId,
        content: InfoPanelContent,
    ) -> Result<(), MapError> {
        if !self.markers.contains_key(&marker) {
            return Err(MapError::Marker(format!("panel on unknown marker {marker:?}")));
        }
        self.open_panel = Some((marker, content));
        Ok(())
    }
}

/// Loader for [`HeadlessCanvas`]. Always succeeds.
#[derive(Default)]
pub struct HeadlessMapLibrary;

#[async_trait]
impl MapLibrary for HeadlessMapLibrary {
    async fn load(&self, center: Coordinate, zoom: u8) -> Result<Box<dyn MapCanvas>, MapError> {
        debug!("headless map surface at {},{} zoom {}", center.lat, center.lng, zoom);
        Ok(Box::<HeadlessCanvas>::default())
    }
}
