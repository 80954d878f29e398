//! Simulation mode and the settings that depend on it.

use serde::{Deserialize, Serialize};

/// Whether the scenery is being edited or the simulation is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Scenery editor: geometry, names and limits may be changed.
    Editor,
    /// Running simulation: the layout is frozen.
    #[default]
    Game,
}

/// Settings threaded into every operation whose behaviour depends on the mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationContext {
    /// Current mode.
    pub mode: Mode,
    /// Editor snapping step for positions.
    pub grid: f64,
    /// Speed limit in m/s used where an item carries the `0` sentinel.
    pub default_max_speed: f64,
}

impl SimulationContext {
    /// Context for a running simulation.
    pub fn game(default_max_speed: f64) -> Self {
        Self {
            mode: Mode::Game,
            default_max_speed,
            ..Self::default()
        }
    }

    /// Context for the scenery editor.
    pub fn editor(grid: f64) -> Self {
        Self {
            mode: Mode::Editor,
            grid,
            ..Self::default()
        }
    }

    /// True when layout mutators are allowed to take effect.
    pub fn is_editing(&self) -> bool {
        self.mode == Mode::Editor
    }
}

impl Default for SimulationContext {
    fn default() -> Self {
        Self {
            mode: Mode::Game,
            grid: 5.0,
            default_max_speed: 18.0,
        }
    }
}
