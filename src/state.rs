//! # Path and state types
//!
//! A [`State`] is a single vehicle configuration: a rear-axle position, a heading, and, when the
//! state lies on a known curve, the arclength along that curve and the curvature there. A
//! [`Path`] is an ordered sequence of states.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single vehicle state.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct State {
    /// Rear-axle x position, in meters.
    pub x_m: f64,

    /// Rear-axle y position, in meters.
    pub y_m: f64,

    /// Heading (angle to the +ve x axis), in radians, wrapped to `(-pi, pi]`.
    pub heading_rad: f64,

    /// Arclength along the curve this state sits on, in meters. Only meaningful for states
    /// placed on a known curve.
    pub s_m: f64,

    /// Curvature of the curve at this state, in 1/meters.
    pub curv_m: f64,
}

/// A path defining the desired trajectory of the vehicle.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Path {
    pub states: Vec<State>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State {
    /// Create a new state with the given pose. Arclength and curvature are zeroed.
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Self {
            x_m,
            y_m,
            heading_rad,
            s_m: 0.0,
            curv_m: 0.0,
        }
    }

    /// The position of this state as a vector.
    pub fn position_m(&self) -> Vector2<f64> {
        Vector2::new(self.x_m, self.y_m)
    }
}

impl Path {
    /// Create a new empty path.
    pub fn new_empty() -> Self {
        Self { states: Vec::new() }
    }

    /// Get the number of states in the path.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Return the length of the path in meters, as the sum of the segment lengths.
    ///
    /// If the path has fewer than two states then `None` is returned.
    pub fn length_m(&self) -> Option<f64> {
        if self.states.len() < 2 {
            return None;
        }

        let mut length_m = 0.0;

        for pair in self.states.windows(2) {
            length_m += (pair[1].position_m() - pair[0].position_m()).norm();
        }

        Some(length_m)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
