//! Score calculation for a single player's match result.
//!
//! Pure arithmetic: placement points from a configurable table plus a flat
//! value per kill. Tournaments may override the table through their stored
//! scoring system; the default matches the reference point spread used by
//! battle-royale events.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Placement-to-points table and per-kill point value for one tournament.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringSystem {
    pub placement_points: BTreeMap<i32, f64>,
    pub kill_points: f64,
}

impl Default for ScoringSystem {
    fn default() -> Self {
        let mut placement_points = BTreeMap::new();
        placement_points.insert(1, 10.0);
        placement_points.insert(2, 6.0);
        placement_points.insert(3, 5.0);
        placement_points.insert(4, 4.0);
        placement_points.insert(5, 3.0);
        for p in 6..=10 {
            placement_points.insert(p, 2.0);
        }
        for p in 11..=15 {
            placement_points.insert(p, 1.0);
        }
        Self {
            placement_points,
            kill_points: 1.0,
        }
    }
}

impl ScoringSystem {
    /// Placement points for a single finish. Placements beyond the table's
    /// covered range earn nothing from placement; deep finishes score on
    /// kills alone.
    pub fn points_for_placement(&self, placement: i32) -> f64 {
        self.placement_points.get(&placement).copied().unwrap_or(0.0)
    }

    /// Total points for one performance.
    ///
    /// Upstream should never produce a non-positive placement or negative
    /// kills, but bad vendor data must not silently score.
    pub fn score(&self, placement: i32, kills: i32) -> Result<f64> {
        if placement < 1 {
            return Err(EngineError::InvalidInput(format!(
                "placement must be >= 1, got {placement}"
            )));
        }
        if kills < 0 {
            return Err(EngineError::InvalidInput(format!(
                "kills must be >= 0, got {kills}"
            )));
        }
        Ok(self.points_for_placement(placement) + f64::from(kills) * self.kill_points)
    }
}
