//! Scenery files: a whole simulation as one JSON document.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    context::SimulationContext,
    network::{ItemRecord, Network},
    occupancy::Train,
    route::Route,
    simulation::Simulation,
};

/// A route as stored in a scenery file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    /// The route itself.
    #[serde(flatten)]
    pub route: Route,
    /// Whether the route was set when the file was written.
    #[serde(default)]
    pub active: bool,
}

/// Serialized representation of a scenery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneryFile {
    /// Human readable title.
    pub title: String,
    /// When the file was written.
    pub saved_at: DateTime<Utc>,
    /// Track items, one flat record each.
    pub items: Vec<ItemRecord>,
    /// Registered routes.
    #[serde(default)]
    pub routes: Vec<RouteRecord>,
    /// Trains on the network.
    #[serde(default)]
    pub trains: Vec<Train>,
}

impl SceneryFile {
    /// Capture the current state of `simulation`.
    pub fn from_simulation(title: impl Into<String>, simulation: &Simulation) -> Self {
        let routes = simulation
            .routes()
            .iter()
            .map(|route| RouteRecord {
                route: route.clone(),
                active: simulation.is_route_active(route.id),
            })
            .collect();
        Self {
            title: title.into(),
            saved_at: Utc::now(),
            items: simulation.network().save_records(),
            routes,
            trains: simulation.trains().copied().collect(),
        }
    }

    /// Rebuild a simulation. Routes marked active are set again before
    /// trains are placed.
    pub fn into_simulation(self, context: SimulationContext) -> Result<Simulation> {
        let network = Network::from_records(&self.items)
            .with_context(|| format!("invalid track items in {:?}", self.title))?;
        let mut simulation = Simulation::new(network, context);

        let mut active = Vec::new();
        for record in self.routes {
            let id = record.route.id;
            simulation
                .add_route(record.route)
                .with_context(|| format!("invalid route {id}"))?;
            if record.active {
                active.push(id);
            }
        }
        for id in active {
            simulation
                .activate_route(id)
                .with_context(|| format!("failed to restore route {id}"))?;
        }
        for train in self.trains {
            let id = train.id;
            simulation
                .place_train(train)
                .with_context(|| format!("failed to place train {id}"))?;
        }
        Ok(simulation)
    }

    /// Read and parse a scenery file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let scenery = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(scenery)
    }

    /// Write the scenery as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let serialised = serde_json::to_vec_pretty(self)?;
        fs::write(path, serialised)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(
            "saved scenery {:?} with {} items to {}",
            self.title,
            self.items.len(),
            path.display()
        );
        Ok(())
    }
}

/// Load a scenery file straight into a simulation.
pub fn load_simulation(path: impl AsRef<Path>, context: SimulationContext) -> Result<Simulation> {
    let path = path.as_ref();
    let scenery = SceneryFile::load(path)?;
    let simulation = scenery
        .into_simulation(context)
        .with_context(|| format!("failed to load scenery {}", path.display()))?;
    info!(
        "loaded scenery {} with {} items",
        path.display(),
        simulation.network().len()
    );
    Ok(simulation)
}
