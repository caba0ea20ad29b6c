//! # Vehicle footprint model
//!
//! The vehicle body is over-approximated by four covering disks of a common inflated radius,
//! centred at signed longitudinal offsets from the geometric centre. For a body of length `L`
//! and width `W` the disk centres sit at `{-3L/8, -L/8, +L/8, +3L/8}` and the radius is
//! `sqrt((L/8)^2 + (W/2)^2)` plus the safety margin, which makes the union of the disks cover
//! the whole rectangle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::params::Params;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The four-disk covering model of the vehicle, fixed for the lifetime of the optimiser.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VehicleFootprint {
    /// Signed longitudinal offsets of the disk centres from the geometric centre, in meters,
    /// ordered rear to front.
    offsets_m: [f64; 4],

    /// Common inflated disk radius, in meters.
    radius_m: f64,

    /// Distance from the rear axle to the geometric centre, in meters.
    rear_to_center_m: f64,

    /// Wheelbase, in meters.
    wheelbase_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VehicleFootprint {
    /// Build the covering-disk model from the vehicle geometry parameters.
    pub fn from_params(params: &Params) -> Self {
        let length_m = params.car_length_m;
        let radius_m = ((length_m / 8.0).powi(2) + (params.car_width_m / 2.0).powi(2)).sqrt()
            + params.safety_margin_m;

        Self {
            offsets_m: [
                -3.0 / 8.0 * length_m,
                -1.0 / 8.0 * length_m,
                1.0 / 8.0 * length_m,
                3.0 / 8.0 * length_m,
            ],
            radius_m,
            rear_to_center_m: params.rear_axle_to_center_m,
            wheelbase_m: params.wheelbase_m,
        }
    }

    /// The disk centres as `(longitudinal offset, radius)` pairs, ordered rear to front.
    pub fn disks(&self) -> [(f64, f64); 4] {
        [
            (self.offsets_m[0], self.radius_m),
            (self.offsets_m[1], self.radius_m),
            (self.offsets_m[2], self.radius_m),
            (self.offsets_m[3], self.radius_m),
        ]
    }

    /// The common inflated disk radius, in meters.
    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// Distance from the rear axle to the geometric centre, in meters.
    pub fn rear_to_center_m(&self) -> f64 {
        self.rear_to_center_m
    }

    /// Wheelbase, in meters.
    pub fn wheelbase_m(&self) -> f64 {
        self.wheelbase_m
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
