#![warn(clippy::all, missing_docs)]

//! Core of the railway interlocking simulator.
//!
//! This crate hosts the track network, routes and their activation, train
//! occupancy and the automatic release of route items behind trains, along
//! with configuration handling and scenery persistence used by the command
//! line runner and any future frontends.

pub mod config;
pub mod context;
pub mod error;
pub mod geometry;
pub mod network;
pub mod occupancy;
pub mod route;
pub mod scenery;
pub mod simulation;

pub use config::AppConfig;
pub use context::{Mode, SimulationContext};
pub use error::{RecordError, RouteError, TrainError};
pub use network::{ItemKind, Network, TiId, TrackItem};
pub use occupancy::{Position, Train, TrainId};
pub use route::{Route, RouteId};
pub use scenery::SceneryFile;
pub use simulation::{Movement, SharedSimulation, Simulation};
