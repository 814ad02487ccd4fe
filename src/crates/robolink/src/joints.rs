use std::fmt;
use std::ops::{Deref, DerefMut};

/// Joint values of a robot or mechanism, one per actuated axis.
///
/// Rotary axes are in degrees and linear axes in millimeters, the host's
/// convention. The length is whatever the mechanism reports.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Joints(Vec<f64>);

impl Joints {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// `n` joints at zero.
    pub fn zeros(n: usize) -> Self {
        Self(vec![0.0; n])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.0
    }

    /// Element-wise equality within `tolerance` (inclusive).
    ///
    /// Vectors of different length are never equal.
    pub fn approx_eq(&self, other: &Joints, tolerance: f64) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(&other.0)
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    /// Largest absolute per-joint difference, `None` on a length mismatch.
    pub fn max_abs_diff(&self, other: &Joints) -> Option<f64> {
        if self.0.len() != other.0.len() {
            return None;
        }
        Some(
            self.0
                .iter()
                .zip(&other.0)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max),
        )
    }

    /// Convert degree values to radians, for controllers that expect them.
    pub fn to_radians(&self) -> Vec<f64> {
        self.0.iter().map(|deg| deg.to_radians()).collect()
    }

    pub fn from_radians(values: &[f64]) -> Self {
        Self(values.iter().map(|rad| rad.to_degrees()).collect())
    }
}

impl Deref for Joints {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl DerefMut for Joints {
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.0
    }
}

impl From<Vec<f64>> for Joints {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl From<&[f64]> for Joints {
    fn from(values: &[f64]) -> Self {
        Self(values.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Joints {
    fn from(values: [f64; N]) -> Self {
        Self(values.to_vec())
    }
}

impl fmt::Display for Joints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<String> = self.0.iter().map(|v| format!("{v:.3}")).collect();
        write!(f, "[{}]", cells.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_is_inclusive_and_symmetric() {
        let a = Joints::from([0.0, 10.0, 20.0]);
        let b = Joints::from([0.5, 10.0, 19.5]);
        assert!(a.approx_eq(&b, 0.5));
        assert!(b.approx_eq(&a, 0.5));
        assert!(!a.approx_eq(&b, 0.25));
        assert!(a.approx_eq(&a, 0.0));
    }

    #[test]
    fn length_mismatch_is_never_equal() {
        let a = Joints::zeros(6);
        let b = Joints::zeros(7);
        assert!(!a.approx_eq(&b, 1e6));
        assert_eq!(a.max_abs_diff(&b), None);
    }

    #[test]
    fn radians_round_trip() {
        let a = Joints::from([90.0, -45.0]);
        let back = Joints::from_radians(&a.to_radians());
        assert!(a.approx_eq(&back, 1e-12));
        assert_eq!(a.max_abs_diff(&Joints::from([89.0, -45.0])), Some(1.0));
    }
}
