//! End-to-end planning scenarios over synthetic distance fields.

use approx::assert_relative_eq;
use nalgebra::Vector2;

use path_opt::{
    CollisionChecker, DiskCollisionChecker, DiskCorridor, DistanceMap, Params, PathOptError,
    PathOptimizer, State, VehicleFootprint,
};

// ------------------------------------------------------------------------------------------------
// TEST DOUBLES
// ------------------------------------------------------------------------------------------------

/// Obstacle-free world.
struct FreeMap;

impl DistanceMap for FreeMap {
    fn clearance_m_at(&self, _position_m: Vector2<f64>) -> f64 {
        100.0
    }
}

/// A single circular obstacle.
struct DiskObstacleMap {
    center_m: Vector2<f64>,
    radius_m: f64,
}

impl DistanceMap for DiskObstacleMap {
    fn clearance_m_at(&self, position_m: Vector2<f64>) -> f64 {
        (position_m - self.center_m).norm() - self.radius_m
    }
}

/// Everything at x >= wall_x is inside an obstacle.
struct WallMap {
    wall_x_m: f64,
}

impl DistanceMap for WallMap {
    fn clearance_m_at(&self, position_m: Vector2<f64>) -> f64 {
        self.wall_x_m - position_m.x
    }
}

/// Walls at y = +/- half_width.
struct CorridorMap {
    half_width_m: f64,
}

impl DistanceMap for CorridorMap {
    fn clearance_m_at(&self, position_m: Vector2<f64>) -> f64 {
        self.half_width_m - position_m.y.abs()
    }
}

fn straight_waypoints(length_m: usize) -> Vec<State> {
    (0..=length_m)
        .map(|i| State::new(i as f64, 0.0, 0.0))
        .collect()
}

fn footprint() -> VehicleFootprint {
    VehicleFootprint::from_params(&Params::default())
}

// ------------------------------------------------------------------------------------------------
// SCENARIOS
// ------------------------------------------------------------------------------------------------

#[test]
fn straight_corridor_tracks_the_reference() {
    let map = FreeMap;
    let checker = DiskCollisionChecker::new(&map, footprint());
    let mut optimizer = PathOptimizer::new(
        straight_waypoints(20),
        State::new(0.0, 0.0, 0.0),
        State::new(20.0, 0.0, 0.0),
        &map,
        &checker,
        true,
    );

    let path = optimizer.solve().unwrap();

    assert!(!path.is_empty());
    let length_m = path.length_m().unwrap();
    assert!(length_m > 18.0 && length_m < 20.5, "length {}", length_m);

    for state in &path.states {
        assert!(state.y_m.abs() < 0.05, "offset {} at {}", state.y_m, state.x_m);
        assert!(state.heading_rad.abs() < 0.02);
        assert!(checker.is_state_free(state));
    }

    // Arclength strictly increasing along the output
    for pair in path.states.windows(2) {
        assert!(pair[1].s_m > pair[0].s_m);
    }
}

#[test]
fn repeated_solve_is_deterministic() {
    let map = FreeMap;
    let checker = DiskCollisionChecker::new(&map, footprint());
    let mut optimizer = PathOptimizer::new(
        straight_waypoints(20),
        State::new(0.0, 0.3, 0.0),
        State::new(20.0, 0.0, 0.0),
        &map,
        &checker,
        true,
    );

    let first = optimizer.solve().unwrap();
    let second = optimizer.solve().unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.states.iter().zip(second.states.iter()) {
        assert_eq!(a.x_m.to_bits(), b.x_m.to_bits());
        assert_eq!(a.y_m.to_bits(), b.y_m.to_bits());
        assert_eq!(a.heading_rad.to_bits(), b.heading_rad.to_bits());
    }
}

#[test]
fn s_curve_avoids_the_obstacle_to_the_right() {
    let map = DiskObstacleMap {
        center_m: Vector2::new(10.0, 1.0),
        radius_m: 1.0,
    };
    let checker = DiskCollisionChecker::new(&map, footprint());
    let mut optimizer = PathOptimizer::new(
        straight_waypoints(20),
        State::new(0.0, 0.0, 0.0),
        State::new(20.0, 0.0, 0.0),
        &map,
        &checker,
        true,
    );

    let path = optimizer.solve().unwrap();
    assert!(!path.is_empty());

    let mut swerved = false;
    for state in &path.states {
        assert!(checker.is_state_free(state));
        if state.x_m > 9.0 && state.x_m < 11.0 {
            assert!(state.y_m < 0.0, "expected rightward offset at x {}", state.x_m);
            swerved = true;
        }
    }
    assert!(swerved);
}

#[test]
fn large_initial_heading_error_is_refused() {
    let map = FreeMap;
    let checker = DiskCollisionChecker::new(&map, footprint());
    let mut optimizer = PathOptimizer::new(
        straight_waypoints(20),
        State::new(0.0, 0.0, 80f64.to_radians()),
        State::new(20.0, 0.0, 0.0),
        &map,
        &checker,
        true,
    );

    assert!(matches!(
        optimizer.solve(),
        Err(PathOptError::InitialHeadingTooLarge(_))
    ));
}

#[test]
fn blocked_terminal_truncates_and_releases_the_end_heading() {
    let map = WallMap { wall_x_m: 36.0 };
    let checker = DiskCollisionChecker::new(&map, footprint());
    let mut optimizer = PathOptimizer::new(
        straight_waypoints(40),
        State::new(0.0, 0.0, 0.0),
        State::new(40.0, 0.0, 0.0),
        &map,
        &checker,
        true,
    );

    let path = optimizer.solve().unwrap();

    let samples = optimizer.samples().unwrap();
    assert!(!samples.use_end_heading);
    let last_s = samples.samples.last().unwrap().s_m;
    assert!(last_s > 30.0 && last_s < 36.0, "truncated at {}", last_s);

    let length_m = path.length_m().unwrap();
    assert!(length_m > 29.0 && length_m < 33.0, "length {}", length_m);
    for state in &path.states {
        assert!(checker.is_state_free(state));
    }
}

#[test]
fn lateral_sampling_produces_a_path_set() {
    let map = CorridorMap { half_width_m: 3.4 };
    let checker = DiskCollisionChecker::new(&map, footprint());
    let mut optimizer = PathOptimizer::new(
        straight_waypoints(20),
        State::new(0.0, 0.0, 0.0),
        State::new(20.0, 0.0, 0.0),
        &map,
        &checker,
        true,
    );

    let paths = optimizer.sample_paths(&[15.0], &[0.0]).unwrap();

    // The 4 m terminal corridor admits at most ceil(4 / 0.3) + 1 candidate offsets
    assert!(!paths.is_empty());
    assert!(paths.len() <= 15, "{} paths", paths.len());

    for path in &paths {
        assert!(!path.is_empty());
        for state in &path.states {
            assert!(checker.is_state_free(state));
            assert!(state.y_m.abs() < 2.2);
        }
    }

    // The zero offset is attempted last, so the set closes with the path that returns to the
    // reference.
    let last = paths.last().unwrap().states.last().unwrap();
    assert!(last.y_m.abs() < 0.15, "terminal offset {}", last.y_m);

    // Distinct terminal offsets were actually explored
    let terminal_spread = paths
        .iter()
        .map(|p| p.states.last().unwrap().y_m)
        .fold((f64::MAX, f64::MIN), |(lo, hi), y| (lo.min(y), hi.max(y)));
    assert!(terminal_spread.1 - terminal_spread.0 > 1.0);
}

#[test]
fn dynamic_resolve_is_idempotent_on_identical_clearances() {
    let map = FreeMap;
    let checker = DiskCollisionChecker::new(&map, footprint());

    let waypoints: Vec<State> = (0..=20)
        .map(|i| State {
            x_m: i as f64,
            y_m: 0.0,
            heading_rad: 0.0,
            s_m: i as f64,
            curv_m: 0.0,
        })
        .collect();

    let mut optimizer = PathOptimizer::new(
        waypoints,
        State::new(0.0, 0.0, 0.0),
        State::new(20.0, 0.0, 0.0),
        &map,
        &checker,
        false,
    );

    let s_list: Vec<f64> = (0..=15).map(|i| i as f64).collect();
    let wide = [DiskCorridor {
        left_m: 3.0,
        right_m: -3.0,
    }; 4];
    let clearances = vec![wide; s_list.len()];

    let first = optimizer.optimize_dynamic(&s_list, &clearances).unwrap();
    let second = optimizer.optimize_dynamic(&s_list, &clearances).unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.states.iter().zip(second.states.iter()) {
        assert_relative_eq!(a.x_m, b.x_m, epsilon = 1e-6);
        assert_relative_eq!(a.y_m, b.y_m, epsilon = 1e-6);
    }

    // The reference is straight and the corridors are wide: the plan hugs the reference.
    for state in &first.states {
        assert!(state.y_m.abs() < 0.05);
    }
}

#[test]
fn dynamic_resolve_reacts_to_tightened_corridors() {
    let map = FreeMap;
    let checker = DiskCollisionChecker::new(&map, footprint());

    let waypoints: Vec<State> = (0..=20)
        .map(|i| State {
            x_m: i as f64,
            y_m: 0.0,
            heading_rad: 0.0,
            s_m: i as f64,
            curv_m: 0.0,
        })
        .collect();

    let mut optimizer = PathOptimizer::new(
        waypoints,
        State::new(0.0, 0.0, 0.0),
        State::new(20.0, 0.0, 0.0),
        &map,
        &checker,
        false,
    );

    let s_list: Vec<f64> = (0..=15).map(|i| i as f64).collect();
    let wide = [DiskCorridor {
        left_m: 3.0,
        right_m: -3.0,
    }; 4];
    let mut clearances = vec![wide; s_list.len()];
    optimizer.optimize_dynamic(&s_list, &clearances).unwrap();

    // Force the middle of the corridor to the left
    for clearance in clearances.iter_mut().take(10).skip(6) {
        *clearance = [DiskCorridor {
            left_m: 3.0,
            right_m: 0.5,
        }; 4];
    }
    let shifted = optimizer.optimize_dynamic(&s_list, &clearances).unwrap();

    let mid = &shifted.states[8];
    assert!(mid.y_m > 0.4, "expected leftward shift, got {}", mid.y_m);
}

// ------------------------------------------------------------------------------------------------
// QP SOLUTION PROPERTIES
// ------------------------------------------------------------------------------------------------

mod qp_properties {
    use super::*;
    use path_opt::discretize::Discretizer;
    use path_opt::qp::problem::{col_psi, col_q, col_steer, QpBuilder, TerminalCondition};
    use path_opt::qp::{OsqpDriver, QpSolver};
    use path_opt::smoother::{CubicSplineSmoother, ReferenceSmoother};

    #[test]
    fn solution_respects_pins_bounds_and_corridors() {
        let map = CorridorMap { half_width_m: 3.4 };
        let params = Params::default();
        let footprint = VehicleFootprint::from_params(&params);

        let smoothed = CubicSplineSmoother
            .smooth(&straight_waypoints(20), &State::new(0.0, 0.5, 0.0))
            .unwrap();
        let discretizer = Discretizer::new(&map, &footprint, &params);
        let start = State::new(0.0, 0.5, 10f64.to_radians());
        let (list, deviation) = discretizer
            .discretize(&smoothed, &start, true, true)
            .unwrap();

        let terminal = TerminalCondition {
            offset_m: 0.0,
            end_heading_rad: Some(0.0),
        };
        let problem =
            QpBuilder::new(&list.samples, &footprint, &params).build(&deviation, &terminal);

        let mut solver = OsqpDriver::default();
        solver.init(&problem, params.max_solver_iterations).unwrap();
        let z = solver.solve().unwrap();

        let n = list.len();
        let tol = 5e-3;

        // Initial state pinned to the measured deviation
        assert_relative_eq!(z[col_psi(0)], deviation.epsi_rad, epsilon = tol);
        assert_relative_eq!(z[col_q(0)], deviation.cte_m, epsilon = tol);

        // Steering bounds
        for i in 0..n - 1 {
            assert!(z[col_steer(n, i)].abs() <= params.max_steer_rad + tol);
        }

        // Corridor satisfaction for every disk at every sample
        for (i, sample) in list.samples.iter().enumerate() {
            for (k, corridor) in sample.corridor.iter().enumerate() {
                let lateral = z[col_q(i)] + footprint.disks()[k].0 * z[col_psi(i)];
                assert!(
                    lateral <= corridor.left_m + tol && lateral >= corridor.right_m - tol,
                    "disk {} at sample {} out of corridor",
                    k,
                    i
                );
            }
        }

        // Terminal pins
        assert!(z[col_q(n - 1)].abs() <= params.terminal_offset_tol_m + tol);
        assert_relative_eq!(z[col_psi(n - 1)], 0.0, epsilon = tol);
    }
}
