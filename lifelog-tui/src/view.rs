//! Per-lane view state.
//!
//! Every load is tagged with the generation it was issued for. A completion
//! is applied only while its generation is still the lane's current one, so
//! out-of-order responses from rapid panning or typing are dropped.

use crate::range::Range;
use crate::records::{LaneData, LaneShape};

/// The view parameters a load was issued for
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRequest {
    pub group: String,
    pub range: Range,
    pub search: String,
    pub generation: u64,
}

/// What applying a completed load did to the lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Superseded by a newer request; discarded
    Stale,
    /// Shape changed (or first load): the widget must be rebuilt
    Rebuilt,
    /// Same shape: items replaced in place
    Updated,
}

#[derive(Debug, Clone)]
pub struct LaneState {
    group: String,
    generation: u64,
    loading: bool,
    data: Option<LaneData>,
    /// The request whose data is currently shown
    shown: Option<ViewRequest>,
    /// Largest sample value in the shown data; graph y-scale
    pub y_max: f64,
}

impl LaneState {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            generation: 0,
            loading: false,
            data: None,
            shown: None,
            y_max: 0.0,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn data(&self) -> Option<&LaneData> {
        self.data.as_ref()
    }

    pub fn shape(&self) -> Option<LaneShape> {
        self.data.as_ref().map(LaneData::shape)
    }

    pub fn shown(&self) -> Option<&ViewRequest> {
        self.shown.as_ref()
    }

    /// Start a new load, superseding any in flight
    pub fn request(&mut self, range: Range, search: &str) -> ViewRequest {
        self.generation += 1;
        self.loading = true;
        ViewRequest {
            group: self.group.clone(),
            range,
            search: search.to_string(),
            generation: self.generation,
        }
    }

    pub fn is_current(&self, request: &ViewRequest) -> bool {
        request.group == self.group && request.generation == self.generation
    }

    /// Apply a completed load if it is still current
    pub fn apply(&mut self, request: ViewRequest, data: LaneData) -> Applied {
        if !self.is_current(&request) {
            return Applied::Stale;
        }

        let applied = if self.shape() == Some(data.shape()) {
            Applied::Updated
        } else {
            Applied::Rebuilt
        };
        self.y_max = data
            .records()
            .iter()
            .filter_map(|r| r.value())
            .fold(0.0, f64::max);

        self.data = Some(data);
        self.shown = Some(request);
        self.loading = false;
        applied
    }

    /// Stop showing the spinner for `request` if it is still current
    pub fn fail(&mut self, request: &ViewRequest) -> bool {
        if !self.is_current(request) {
            return false;
        }
        self.loading = false;
        true
    }
}
