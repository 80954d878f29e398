#![allow(missing_docs)]

//! Typed errors raised by the network, route and train operations.

use thiserror::Error;

use crate::{network::TiId, occupancy::TrainId, route::RouteId};

/// Failure to turn a persisted record into a track item, or to assemble a
/// network out of such items.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("malformed point '{0}', expected '(x, y)'")]
    MalformedPoint(String),
    #[error("item {item}: field '{field}' must be a finite number, got {value}")]
    NonFinite {
        item: TiId,
        field: &'static str,
        value: f64,
    },
    #[error("item {item}: maximum speed must not be negative, got {value}")]
    NegativeSpeed { item: TiId, value: f64 },
    #[error("item {item}: maximum speed '{value}' is not a number")]
    InvalidSpeed { item: TiId, value: String },
    #[error("item {item}: real length must be positive, got {value}")]
    NonPositiveLength { item: TiId, value: f64 },
    #[error("item {item}: timer '{field}' must not be negative, got {value}")]
    NegativeTimer {
        item: TiId,
        field: &'static str,
        value: f64,
    },
    #[error("item {item}: '{field}' is not a valid item id: '{value}'")]
    InvalidId {
        item: TiId,
        field: &'static str,
        value: String,
    },
    #[error("item {item}: unknown type tag '{tag}'")]
    UnknownType { item: TiId, tag: String },
    #[error("item {item}: resizable item requires both 'xf' and 'yf'")]
    MissingEnd { item: TiId },
    #[error("duplicate track item id {0}")]
    DuplicateId(TiId),
    #[error("item {item}: '{field}' refers to unknown item {target}")]
    DanglingLink {
        item: TiId,
        field: &'static str,
        target: TiId,
    },
    #[error("item {item} links to {neighbour} but {neighbour} does not link back")]
    AsymmetricLink { item: TiId, neighbour: TiId },
}

/// Failure to register, activate or deactivate a route.
#[derive(Debug, Error, PartialEq)]
pub enum RouteError {
    #[error("unknown route {0}")]
    UnknownRoute(RouteId),
    #[error("route {0} is already registered")]
    DuplicateRoute(RouteId),
    #[error("route {route} refers to unknown item {item}")]
    UnknownItem { route: RouteId, item: TiId },
    #[error("route {0} has an empty path")]
    EmptyPath(RouteId),
    #[error("route {route}: items {from} and {to} are not linked")]
    DisconnectedPath {
        route: RouteId,
        from: TiId,
        to: TiId,
    },
    #[error("route {route}: begin item {item} is not a signal")]
    NotASignal { route: RouteId, item: TiId },
    #[error("route {route}: item {item} is already reserved by route {holder}")]
    Conflict {
        route: RouteId,
        item: TiId,
        holder: RouteId,
    },
    #[error(
        "route {route}: conflict item {conflict_item} of item {item} is reserved by route {holder}"
    )]
    ConflictItem {
        route: RouteId,
        item: TiId,
        conflict_item: TiId,
        holder: RouteId,
    },
    #[error("route {route}: conflict item {conflict_item} of item {item} is occupied by a train")]
    ConflictOccupied {
        route: RouteId,
        item: TiId,
        conflict_item: TiId,
    },
}

/// Failure to place, move or remove a train.
#[derive(Debug, Error, PartialEq)]
pub enum TrainError {
    #[error("unknown train {0}")]
    UnknownTrain(TrainId),
    #[error("train {0} is already placed")]
    DuplicateTrain(TrainId),
    #[error("train {train}: length must be positive, got {length}")]
    InvalidLength { train: TrainId, length: f64 },
    #[error("train {train}: cannot move by {distance} metres")]
    InvalidDistance { train: TrainId, distance: f64 },
    #[error("train {train}: {previous} is not a neighbour of item {item}")]
    NotANeighbour {
        train: TrainId,
        item: TiId,
        previous: TiId,
    },
    #[error("train {train}: item {item} is linked on both sides, an entry side is required")]
    MissingEntrySide { train: TrainId, item: TiId },
    #[error("train {train}: offset {offset} is outside item {item}")]
    InvalidOffset {
        train: TrainId,
        item: TiId,
        offset: f64,
    },
    #[error("train {train} refers to unknown item {item}")]
    UnknownItem { train: TrainId, item: TiId },
}
