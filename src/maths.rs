//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

use crate::state::State;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// Generic equivalent of `f64::rem_euclid`, which num is missing.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float,
{
    let r = lhs % rhs;
    if r < T::from(0.0).unwrap() {
        r + rhs.abs()
    } else {
        r
    }
}

/// Wrap an angle into `(-pi, pi]`.
pub fn wrap_angle<T>(angle: T) -> T
where
    T: Float,
{
    let pi = T::from(std::f64::consts::PI).unwrap();
    let tau = T::from(std::f64::consts::TAU).unwrap();

    let wrapped = rem_euclid(angle, tau);

    if wrapped > pi {
        wrapped - tau
    } else {
        wrapped
    }
}

/// Return the euclidean distance between the positions of two states.
pub fn distance(a: &State, b: &State) -> f64 {
    ((a.x_m - b.x_m).powi(2) + (a.y_m - b.y_m).powi(2)).sqrt()
}

/// Transform `point` into the 2D frame rooted at `frame`'s position and rotated by its heading.
///
/// The returned state's heading is the heading of `point` relative to the frame, wrapped into
/// `(-pi, pi]`. Arclength and curvature are not meaningful in the local frame and are zeroed.
pub fn global_to_local(frame: &State, point: &State) -> State {
    let dx = point.x_m - frame.x_m;
    let dy = point.y_m - frame.y_m;
    let (sin_h, cos_h) = frame.heading_rad.sin_cos();

    State {
        x_m: dx * cos_h + dy * sin_h,
        y_m: -dx * sin_h + dy * cos_h,
        heading_rad: wrap_angle(point.heading_rad - frame.heading_rad),
        s_m: 0.0,
        curv_m: 0.0,
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_wrap_angle() {
        assert_relative_eq!(wrap_angle(0.0), 0.0);
        assert_relative_eq!(wrap_angle(PI), PI);
        assert_relative_eq!(wrap_angle(-PI), PI);
        assert_relative_eq!(wrap_angle(3.0 * FRAC_PI_2), -FRAC_PI_2);
        assert_relative_eq!(wrap_angle(-3.0 * FRAC_PI_2), FRAC_PI_2);
        assert_relative_eq!(wrap_angle(5.0 * PI), PI);
        assert_relative_eq!(wrap_angle(0.1 - 2.0 * PI), 0.1, max_relative = 1e-12);
    }

    #[test]
    fn test_global_to_local() {
        let frame = State::new(1.0, 1.0, FRAC_PI_2);
        let point = State::new(1.0, 2.0, PI);

        let local = global_to_local(&frame, &point);

        assert_relative_eq!(local.x_m, 1.0, epsilon = 1e-12);
        assert_relative_eq!(local.y_m, 0.0, epsilon = 1e-12);
        assert_relative_eq!(local.heading_rad, FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_distance() {
        let a = State::new(0.0, 0.0, 0.0);
        let b = State::new(3.0, 4.0, 0.0);
        assert_relative_eq!(distance(&a, &b), 5.0);
    }
}
