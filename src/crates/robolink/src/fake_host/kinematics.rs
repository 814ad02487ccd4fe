//! Closed-form model of the fake six-axis robot.
//!
//! The first three joints are prismatic (mm along x, y, z of the base), the
//! last three rotate about z, y and x. Every pose inside the linear limits
//! has exactly two solutions.

use crate::joints::Joints;
use crate::pose::Pose;

/// Travel of each linear axis in both directions.
pub(crate) const LINEAR_LIMIT_MM: f64 = 2000.0;
pub(crate) const ROTARY_LIMIT_DEG: f64 = 180.0;
pub(crate) const AXES: usize = 6;

/// Limits for an `n`-axis mechanism: linear axes first, then rotary.
pub(crate) fn limits(n: usize) -> (Joints, Joints) {
    let upper: Vec<f64> = (0..n)
        .map(|i| if i < 3 { LINEAR_LIMIT_MM } else { ROTARY_LIMIT_DEG })
        .collect();
    let lower = upper.iter().map(|v| -v).collect();
    (Joints::new(lower), Joints::new(upper))
}

/// Flange pose relative to the base. Missing axes count as zero.
pub(crate) fn forward(joints: &[f64]) -> Pose {
    let j = |i: usize| joints.get(i).copied().unwrap_or(0.0);
    Pose::transl(j(0), j(1), j(2))
        * Pose::rot_z_deg(j(3))
        * Pose::rot_y_deg(j(4))
        * Pose::rot_x_deg(j(5))
}

/// Both solutions for a flange pose, primary first; empty when the
/// position is out of reach.
pub(crate) fn inverse_all(pose: &Pose) -> Vec<Joints> {
    let [x, y, z, r, p, w] = pose.to_xyzrpw_deg();
    if [x, y, z].iter().any(|v| v.abs() > LINEAR_LIMIT_MM) {
        return Vec::new();
    }
    vec![
        Joints::from([x, y, z, w, p, r]),
        Joints::from([
            x,
            y,
            z,
            wrap_deg(w + 180.0),
            wrap_deg(180.0 - p),
            wrap_deg(r + 180.0),
        ]),
    ]
}

/// Rear, lower-arm, flip and turn flags of a joint vector.
pub(crate) fn configuration(joints: &[f64]) -> Joints {
    let j = |i: usize| joints.get(i).copied().unwrap_or(0.0);
    let flag = |set: bool| if set { 1.0 } else { 0.0 };
    Joints::from([
        flag(j(0) < 0.0),
        flag(j(2) < 0.0),
        flag(j(4).abs() > 90.0),
        0.0,
    ])
}

pub(crate) fn within(joints: &[f64], lower: &[f64], upper: &[f64]) -> bool {
    joints
        .iter()
        .zip(lower.iter().zip(upper))
        .all(|(j, (lo, hi))| *j >= lo - 1e-9 && *j <= hi + 1e-9)
}

/// Into `(-180, 180]`.
fn wrap_deg(angle: f64) -> f64 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_solutions_reach_the_pose() {
        let joints = [100.0, -250.0, 400.0, 30.0, -20.0, 45.0];
        let pose = forward(&joints);
        let solutions = inverse_all(&pose);
        assert_eq!(solutions.len(), 2);
        for solution in &solutions {
            assert!(forward(solution).approx_eq(&pose, 1e-9));
        }
        assert!(solutions[0].approx_eq(&Joints::from(joints), 1e-9));
    }

    #[test]
    fn out_of_reach_has_no_solution() {
        assert!(inverse_all(&Pose::transl(2500.0, 0.0, 0.0)).is_empty());
    }

    #[test]
    fn wrap_keeps_half_open_range() {
        assert_eq!(wrap_deg(180.0), 180.0);
        assert_eq!(wrap_deg(-180.0), 180.0);
        assert_eq!(wrap_deg(190.0), -170.0);
    }
}
