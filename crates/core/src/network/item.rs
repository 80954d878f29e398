//! Track items: the nodes of the track network.
//!
//! A [`TrackItem`] is linked to at most two neighbours, `previous` and `next`,
//! both stored as ids and resolved through the owning
//! [`Network`](super::Network). Train head and tail offsets are stored in the
//! item's canonical orientation, measured in metres from the `previous` side.
//! Callers always pass the item a train came from, and the item mirrors the
//! offset when that item is not its `previous` neighbour.

#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    context::SimulationContext,
    error::RecordError,
    geometry::{Point, Rect},
    route::RouteId,
};

/// Unique identifier of a track item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TiId(pub i64);

impl fmt::Display for TiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-variant data of a track item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    /// Fixed-size item without additional data.
    Plain,
    /// Resizable section of plain line.
    Line,
    /// Resizable connection that is not drawn.
    InvisibleLink,
    /// Resizable section of line alongside a platform.
    Platform {
        /// Code of the place the platform belongs to.
        place_code: Option<String>,
        /// Track number inside the place.
        track_code: Option<String>,
    },
    /// Signal protecting the following items.
    Signal(SignalState),
    /// Dead end of the network.
    End,
}

/// Data carried by signals.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalState {
    /// Name of the signal type (aspect rules live outside this crate).
    pub signal_type: String,
    /// Whether the signal faces the `next` to `previous` direction.
    pub reverse: bool,
    /// Delay in seconds before the signal switches.
    pub timer_sw: Option<f64>,
    /// Delay in seconds before a waiting train is cancelled.
    pub timer_wc: Option<f64>,
    /// Most recently activated route beginning at this signal.
    pub next_active_route: Option<RouteId>,
}

impl ItemKind {
    /// Type tag written to scenery records.
    pub fn tag(&self) -> &'static str {
        match self {
            ItemKind::Plain => "0",
            ItemKind::Line => "L",
            ItemKind::InvisibleLink => "LI",
            ItemKind::Platform { .. } => "LP",
            ItemKind::Signal(_) => "S",
            ItemKind::End => "E",
        }
    }

    /// Human readable type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            ItemKind::Plain => "TrackItem",
            ItemKind::Line => "LineItem",
            ItemKind::InvisibleLink => "InvisibleLinkItem",
            ItemKind::Platform { .. } => "PlatformItem",
            ItemKind::Signal(_) => "SignalItem",
            ItemKind::End => "EndItem",
        }
    }

    /// Whether the end point can be edited independently of the origin.
    pub fn is_resizable(&self) -> bool {
        matches!(
            self,
            ItemKind::Line | ItemKind::InvisibleLink | ItemKind::Platform { .. }
        )
    }
}

/// A node of the track network.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackItem {
    id: TiId,
    name: String,
    kind: ItemKind,
    origin: Point,
    end: Point,
    real_length: f64,
    max_speed: f64,
    previous: Option<TiId>,
    next: Option<TiId>,
    conflict: Option<TiId>,
    active_route: Option<RouteId>,
    active_route_previous: Option<TiId>,
    train_head: Option<f64>,
    train_tail: Option<f64>,
}

impl TrackItem {
    /// Create a fixed-size item of `kind` at `origin`, one metre long.
    pub fn new(id: TiId, name: impl Into<String>, kind: ItemKind, origin: Point) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            origin,
            end: origin + Point::new(10.0, 0.0),
            real_length: 1.0,
            max_speed: 0.0,
            previous: None,
            next: None,
            conflict: None,
            active_route: None,
            active_route_previous: None,
            train_head: None,
            train_tail: None,
        }
    }

    /// Create a resizable item spanning `origin` to `end`, `real_length`
    /// metres long.
    pub fn resizable(
        id: TiId,
        name: impl Into<String>,
        kind: ItemKind,
        origin: Point,
        end: Point,
        real_length: f64,
    ) -> Result<Self, RecordError> {
        if !(real_length.is_finite() && real_length > 0.0) {
            return Err(RecordError::NonPositiveLength {
                item: id,
                value: real_length,
            });
        }
        let mut item = Self::new(id, name, kind, origin);
        item.end = end;
        item.real_length = real_length;
        Ok(item)
    }

    /// Set the raw speed limit at construction time.
    pub fn with_max_speed(mut self, max_speed: f64) -> Result<Self, RecordError> {
        validate_speed(self.id, max_speed)?;
        self.max_speed = max_speed;
        Ok(self)
    }

    pub fn id(&self) -> TiId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    /// Signal data, if this item is a signal.
    pub fn signal(&self) -> Option<&SignalState> {
        match &self.kind {
            ItemKind::Signal(state) => Some(state),
            _ => None,
        }
    }

    pub(crate) fn signal_mut(&mut self) -> Option<&mut SignalState> {
        match &mut self.kind {
            ItemKind::Signal(state) => Some(state),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    pub fn end(&self) -> Point {
        self.end
    }

    /// Length in metres used for every occupancy computation.
    pub fn real_length(&self) -> f64 {
        self.real_length
    }

    /// Stored speed limit, `0` meaning "simulation default".
    pub fn raw_max_speed(&self) -> f64 {
        self.max_speed
    }

    /// Speed limit in m/s. The `0` sentinel resolves to the context default
    /// while the simulation is running.
    pub fn max_speed(&self, ctx: &SimulationContext) -> f64 {
        if !ctx.is_editing() && self.max_speed == 0.0 {
            ctx.default_max_speed
        } else {
            self.max_speed
        }
    }

    pub fn previous_item(&self) -> Option<TiId> {
        self.previous
    }

    pub fn next_item(&self) -> Option<TiId> {
        self.next
    }

    pub fn set_previous_item(&mut self, item: Option<TiId>) {
        self.previous = item;
    }

    pub fn set_next_item(&mut self, item: Option<TiId>) {
        self.next = item;
    }

    pub fn conflict_item(&self) -> Option<TiId> {
        self.conflict
    }

    pub fn set_conflict_item(&mut self, item: Option<TiId>) {
        self.conflict = item;
    }

    pub fn active_route(&self) -> Option<RouteId> {
        self.active_route
    }

    /// Neighbour the active route entered this item from.
    pub fn active_route_previous_item(&self) -> Option<TiId> {
        self.active_route_previous
    }

    /// True while a route is reserved through this item.
    pub fn highlighted(&self) -> bool {
        self.active_route.is_some()
    }

    /// Returns the neighbour on the far side from `preceding`, or `None` when
    /// `preceding` is not a neighbour of this item.
    pub fn following_item(&self, preceding: Option<TiId>) -> Option<TiId> {
        if preceding == self.previous {
            self.next
        } else if preceding == self.next {
            self.previous
        } else {
            None
        }
    }

    /// Reserve this item for `route`, entered from `previous`.
    pub fn set_active_route(&mut self, route: RouteId, previous: Option<TiId>) {
        self.active_route = Some(route);
        self.active_route_previous = previous;
    }

    pub fn reset_active_route(&mut self) {
        self.active_route = None;
        self.active_route_previous = None;
    }

    /// Offset of the train head in canonical orientation.
    pub fn train_head(&self) -> Option<f64> {
        self.train_head
    }

    /// Offset of the train tail in canonical orientation.
    pub fn train_tail(&self) -> Option<f64> {
        self.train_tail
    }

    /// Record the train head `pos` metres into the item, measured from the
    /// side of `from`. `None` removes the head from this item.
    pub fn set_train_head(&mut self, pos: Option<f64>, from: Option<TiId>) {
        self.train_head = pos.map(|pos| self.canonical(pos, from));
    }

    /// Same as [`set_train_head`](Self::set_train_head) for the tail.
    pub fn set_train_tail(&mut self, pos: Option<f64>, from: Option<TiId>) {
        self.train_tail = pos.map(|pos| self.canonical(pos, from));
    }

    pub fn train_present(&self) -> bool {
        self.train_head.is_some() || self.train_tail.is_some()
    }

    /// Distance from the side of `from` to the closest end of the train on
    /// this item, or `None` when no train end is here.
    pub fn distance_to_train_end(&self, from: Option<TiId>) -> Option<f64> {
        [self.train_head, self.train_tail]
            .into_iter()
            .flatten()
            .map(|pos| self.canonical(pos, from))
            .reduce(f64::min)
    }

    // Mirroring is its own inverse, so this converts both ways.
    fn canonical(&self, pos: f64, from: Option<TiId>) -> f64 {
        if from == self.previous {
            pos
        } else {
            self.real_length - pos
        }
    }

    /// Bounding rectangle relative to the origin.
    pub fn bounding_rect(&self, ctx: &SimulationContext) -> Rect {
        if !self.kind.is_resizable() {
            return Rect::new(0.0, 0.0, 1.0, 1.0);
        }
        let size = self.end - self.origin;
        if ctx.is_editing() {
            Rect::new(-5.0, -5.0, size.x + 10.0, size.y + 10.0)
        } else {
            Rect::new(0.0, 0.0, size.x, size.y)
        }
    }

    // Editor mutators. Each returns whether the change was applied.

    pub fn set_name(&mut self, ctx: &SimulationContext, name: impl Into<String>) -> bool {
        if !self.editable(ctx, "name") {
            return false;
        }
        self.name = name.into();
        true
    }

    /// Move the origin, snapped to the editor grid.
    pub fn set_origin(&mut self, ctx: &SimulationContext, pos: Point) -> bool {
        if !self.editable(ctx, "origin") {
            return false;
        }
        let snapped = pos.snapped(ctx.grid);
        if !self.kind.is_resizable() {
            self.end = self.end + (snapped - self.origin);
        }
        self.origin = snapped;
        true
    }

    /// Move the end point of a resizable item, snapped to the editor grid.
    pub fn set_end(&mut self, ctx: &SimulationContext, pos: Point) -> bool {
        if !self.kind.is_resizable() || !self.editable(ctx, "end") {
            return false;
        }
        self.end = pos.snapped(ctx.grid);
        true
    }

    /// Translate a resizable item without resizing it. `pos` is the grabbed
    /// corner of the 10x10 connection handle around the origin.
    pub fn set_real_origin(&mut self, ctx: &SimulationContext, pos: Point) -> bool {
        if !self.kind.is_resizable() || !self.editable(ctx, "real origin") {
            return false;
        }
        let target = (pos + Point::new(5.0, 5.0)).snapped(ctx.grid);
        let vector = target - self.origin;
        self.origin += vector;
        self.end += vector;
        true
    }

    pub fn origin_str(&self) -> String {
        self.origin.to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.to_string()
    }

    /// Parse `(x, y)` and move the origin. Outside the editor the string is
    /// ignored without being parsed.
    pub fn set_origin_str(
        &mut self,
        ctx: &SimulationContext,
        value: &str,
    ) -> Result<bool, RecordError> {
        if !ctx.is_editing() {
            return Ok(false);
        }
        let pos = value.parse::<Point>()?;
        Ok(self.set_origin(ctx, pos))
    }

    pub fn set_end_str(
        &mut self,
        ctx: &SimulationContext,
        value: &str,
    ) -> Result<bool, RecordError> {
        if !ctx.is_editing() {
            return Ok(false);
        }
        let pos = value.parse::<Point>()?;
        Ok(self.set_end(ctx, pos))
    }

    /// Set the raw speed limit from its text form; an empty string stands
    /// for `0`.
    pub fn set_max_speed(
        &mut self,
        ctx: &SimulationContext,
        value: &str,
    ) -> Result<bool, RecordError> {
        if !self.editable(ctx, "max speed") {
            return Ok(false);
        }
        let speed = parse_speed(self.id, value)?;
        self.max_speed = speed;
        Ok(true)
    }

    /// Set the conflict item from its text form; an empty string clears it.
    /// The id is not resolved here, see
    /// [`Network::set_conflict_item`](super::Network::set_conflict_item).
    pub fn set_conflict_str(
        &mut self,
        ctx: &SimulationContext,
        value: &str,
    ) -> Result<bool, RecordError> {
        if !self.editable(ctx, "conflict item") {
            return Ok(false);
        }
        let value = value.trim();
        if value.is_empty() {
            self.conflict = None;
        } else {
            let id = value.parse::<i64>().map_err(|_| RecordError::InvalidId {
                item: self.id,
                field: "conflicttiid",
                value: value.to_string(),
            })?;
            self.conflict = Some(TiId(id));
        }
        Ok(true)
    }

    fn editable(&self, ctx: &SimulationContext, what: &str) -> bool {
        if ctx.is_editing() {
            true
        } else {
            debug!("ignoring {} change on item {} outside the editor", what, self.id);
            false
        }
    }
}

pub(crate) fn validate_speed(item: TiId, value: f64) -> Result<f64, RecordError> {
    if !value.is_finite() {
        return Err(RecordError::NonFinite {
            item,
            field: "maxspeed",
            value,
        });
    }
    if value < 0.0 {
        return Err(RecordError::NegativeSpeed { item, value });
    }
    Ok(value)
}

pub(crate) fn parse_speed(item: TiId, value: &str) -> Result<f64, RecordError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0.0);
    }
    let speed = value.parse::<f64>().map_err(|_| RecordError::InvalidSpeed {
        item,
        value: value.to_string(),
    })?;
    validate_speed(item, speed)
}
