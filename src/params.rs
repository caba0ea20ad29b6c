//! # Optimiser parameters
//!
//! All tuning constants of the planning pipeline live here, with their defaults. Parameters can
//! also be loaded from a TOML file (see [`Params::load`]); missing fields fall back to the
//! defaults, so a parameter file only needs to name the values it overrides.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use std::fs::read_to_string;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the path optimiser.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {
    // --------------------------------------------------------------------------------
    // Vehicle geometry
    // --------------------------------------------------------------------------------
    /// Width of the vehicle body, in meters.
    pub car_width_m: f64,

    /// Length of the vehicle body, in meters.
    pub car_length_m: f64,

    /// Safety margin added to the covering-disk radius, in meters.
    pub safety_margin_m: f64,

    /// Distance from the rear axle to the geometric centre of the body, in meters.
    pub rear_axle_to_center_m: f64,

    /// Wheelbase, in meters.
    pub wheelbase_m: f64,

    // --------------------------------------------------------------------------------
    // Kinematic limits
    // --------------------------------------------------------------------------------
    /// Steering angle limit, in radians.
    pub max_steer_rad: f64,

    /// Sanity bound on the initial heading deviation from the reference, in radians. Above this
    /// the linearised model is untrustworthy and planning is refused.
    pub max_heading_dev_rad: f64,

    /// Heading deviation below which the discretiser uses uniform far spacing throughout, in
    /// radians.
    pub uniform_spacing_heading_rad: f64,

    // --------------------------------------------------------------------------------
    // Clearance probe
    // --------------------------------------------------------------------------------
    /// Step of the lateral clearance sweep, in meters.
    pub clearance_step_m: f64,

    /// Cap on the lateral clearance sweep, in meters.
    pub clearance_cap_m: f64,

    /// Corridor width below which no safety shrink is applied, in meters.
    pub shrink_slack_m: f64,

    /// Fraction of the spare corridor width removed by the safety shrink.
    pub shrink_ratio: f64,

    /// Cap on the safety shrink margin, in meters.
    pub shrink_cap_m: f64,

    /// Arclength before which the safety shrink is never applied, in meters. Margins near the
    /// vehicle could make the start itself infeasible.
    pub safety_margin_min_s_m: f64,

    // --------------------------------------------------------------------------------
    // Discretiser
    // --------------------------------------------------------------------------------
    /// Sample spacing near the start of the reference, in meters.
    pub spacing_near_m: f64,

    /// Sample spacing away from the start when the output will be densified, in meters.
    pub spacing_far_m: f64,

    /// Arclength up to which the near spacing is used, in meters.
    pub near_region_m: f64,

    /// The final reference point is appended only if the gap to the last sample exceeds this,
    /// in meters.
    pub tail_gap_m: f64,

    /// Fraction of the reference length beyond which a degenerate disk corridor truncates the
    /// sample list rather than poisoning the QP.
    pub terminal_degenerate_fraction: f64,

    /// Minimum number of samples required to form a viable QP.
    pub min_sample_count: usize,

    // --------------------------------------------------------------------------------
    // QP weights and terminal condition
    // --------------------------------------------------------------------------------
    /// Objective weight on the lateral offset.
    pub offset_weight: f64,

    /// Objective weight on the steering angle.
    pub steer_weight: f64,

    /// Objective weight on the steering rate (difference of successive steering angles).
    pub steer_rate_weight: f64,

    /// Half-width of the terminal lateral offset band, in meters.
    pub terminal_offset_tol_m: f64,

    /// Constrain the terminal heading to the end pose heading. The discretiser clears this when
    /// it truncates the sample list.
    pub use_end_heading: bool,

    /// Iteration cap of the QP solver.
    pub max_solver_iterations: u32,

    // --------------------------------------------------------------------------------
    // Output and lateral sampling
    // --------------------------------------------------------------------------------
    /// Spacing of the densified output path, in meters.
    pub output_spacing_m: f64,

    /// Interval between sampled terminal lateral offsets, in meters.
    pub lateral_interval_m: f64,

    /// Cap on the total lateral span swept by terminal offset sampling, in meters.
    pub lateral_span_m: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, thiserror::Error)]
pub enum ParamLoadError {
    #[error("Could not read the parameter file: {0}")]
    FileLoadError(#[from] std::io::Error),

    #[error("Could not parse the parameter file: {0}")]
    DeserialiseError(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            car_width_m: 2.0,
            car_length_m: 4.9,
            safety_margin_m: 0.1,
            rear_axle_to_center_m: 1.45,
            wheelbase_m: 2.85,
            max_steer_rad: 30f64.to_radians(),
            max_heading_dev_rad: 75f64.to_radians(),
            uniform_spacing_heading_rad: 20f64.to_radians(),
            clearance_step_m: 0.2,
            clearance_cap_m: 5.0,
            shrink_slack_m: 0.6,
            shrink_ratio: 0.2,
            shrink_cap_m: 0.5,
            safety_margin_min_s_m: 10.0,
            spacing_near_m: 0.3,
            spacing_far_m: 1.0,
            near_region_m: 2.0,
            tail_gap_m: 1.0,
            terminal_degenerate_fraction: 0.75,
            min_sample_count: 3,
            offset_weight: 0.05,
            steer_weight: 10.0,
            steer_rate_weight: 100.0,
            terminal_offset_tol_m: 0.1,
            use_end_heading: true,
            max_solver_iterations: 250,
            output_spacing_m: 0.3,
            lateral_interval_m: 0.3,
            lateral_span_m: 6.0,
        }
    }
}

impl Params {
    /// Load parameters from a TOML file. Fields absent from the file take their defaults.
    pub fn load(param_file_path: &str) -> Result<Self, ParamLoadError> {
        let params_str = read_to_string(param_file_path)?;
        Ok(toml::from_str(&params_str)?)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let params = Params::default();
        assert_relative_eq!(params.max_steer_rad, 30f64.to_radians());
        assert_relative_eq!(params.clearance_step_m, 0.2);
        assert_eq!(params.max_solver_iterations, 250);
        assert!(params.use_end_heading);
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let params: Params = toml::from_str("car_width_m = 1.8\nuse_end_heading = false").unwrap();
        assert_relative_eq!(params.car_width_m, 1.8);
        assert!(!params.use_end_heading);
        // Untouched fields keep their defaults
        assert_relative_eq!(params.car_length_m, 4.9);
    }
}
