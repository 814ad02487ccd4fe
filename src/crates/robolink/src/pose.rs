//! Homogeneous 4x4 transforms and the controller-specific angle
//! conventions used to read and write them.
//!
//! Poses compose left to right: in `a * b` the left operand is the base
//! frame and `b` is expressed in it. Translations are in millimeters.

use std::fmt;
use std::ops::Mul;

use glam::{DMat3, DMat4, DQuat, DVec3, DVec4};

use crate::error::{LinkError, LinkResult};
use crate::matrix::Matrix;

/// Tolerance applied when checking that a matrix is a rigid transform.
pub const POSE_TOLERANCE: f64 = 1e-6;

/// Below this `cos(beta)` an Euler decomposition is treated as gimbal-locked.
const GIMBAL_EPSILON: f64 = 1e-12;

/// Six-value `[x, y, z, a, b, c]` conventions, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EulerConvention {
    /// `transl(x,y,z) * rotz(w) * roty(p) * rotx(r)`, returned as
    /// `[x, y, z, r, p, w]`. Used by the host itself, Fanuc (WPR) and
    /// Motoman (Rx, Ry, Rz).
    Xyzrpw,
    /// KUKA `A, B, C`: `transl * rotz(A) * roty(B) * rotx(C)`, returned as
    /// `[x, y, z, A, B, C]`. Also Nachi.
    KukaAbc,
    /// Stäubli and Mecademic: `transl * rotx(rx) * roty(ry) * rotz(rz)`.
    StaubliTxyzRxyz,
    /// Comau and Adept: `transl * rotz(a) * roty(b) * rotz(c)`.
    ComauZyz,
}

impl EulerConvention {
    pub const ALL: [EulerConvention; 4] = [
        EulerConvention::Xyzrpw,
        EulerConvention::KukaAbc,
        EulerConvention::StaubliTxyzRxyz,
        EulerConvention::ComauZyz,
    ];
}

#[derive(Clone, Copy, PartialEq)]
pub struct Pose(DMat4);

impl Pose {
    pub const IDENTITY: Pose = Pose(DMat4::IDENTITY);

    pub fn identity() -> Self {
        Self::IDENTITY
    }

    /// Pure translation, millimeters.
    pub fn transl(x: f64, y: f64, z: f64) -> Self {
        Self(DMat4::from_translation(DVec3::new(x, y, z)))
    }

    pub fn rot_x_rad(angle: f64) -> Self {
        Self(DMat4::from_rotation_x(angle))
    }

    pub fn rot_y_rad(angle: f64) -> Self {
        Self(DMat4::from_rotation_y(angle))
    }

    pub fn rot_z_rad(angle: f64) -> Self {
        Self(DMat4::from_rotation_z(angle))
    }

    pub fn rot_x_deg(angle: f64) -> Self {
        Self::rot_x_rad(angle.to_radians())
    }

    pub fn rot_y_deg(angle: f64) -> Self {
        Self::rot_y_rad(angle.to_radians())
    }

    pub fn rot_z_deg(angle: f64) -> Self {
        Self::rot_z_rad(angle.to_radians())
    }

    /// Build from row-major values, rejecting anything that is not a rigid
    /// homogeneous transform.
    pub fn from_rows(rows: [[f64; 4]; 4]) -> LinkResult<Self> {
        let pose = Self::from_rows_unchecked(rows);
        if !pose.is_homogeneous(POSE_TOLERANCE) {
            return Err(LinkError::type_error(
                "matrix is not a rigid homogeneous transform",
            ));
        }
        Ok(pose)
    }

    /// Build from a generic matrix; it must be a 4x4 rigid transform.
    pub fn from_matrix(matrix: &Matrix) -> LinkResult<Self> {
        if matrix.shape() != (4, 4) {
            let (rows, cols) = matrix.shape();
            return Err(LinkError::type_error(format!(
                "pose must be 4x4, got {rows}x{cols}"
            )));
        }
        let pose = Self::from_column_major_unchecked(matrix.as_column_major());
        if !pose.is_homogeneous(POSE_TOLERANCE) {
            return Err(LinkError::type_error(
                "matrix is not a rigid homogeneous transform",
            ));
        }
        Ok(pose)
    }

    pub(crate) fn from_rows_unchecked(rows: [[f64; 4]; 4]) -> Self {
        let col = |j: usize| DVec4::new(rows[0][j], rows[1][j], rows[2][j], rows[3][j]);
        Self(DMat4::from_cols(col(0), col(1), col(2), col(3)))
    }

    /// Wire order; the caller guarantees 16 values.
    pub(crate) fn from_column_major_unchecked(values: &[f64]) -> Self {
        let mut array = [0.0; 16];
        array.copy_from_slice(&values[..16]);
        Self(DMat4::from_cols_array(&array))
    }

    pub(crate) fn to_column_major(self) -> [f64; 16] {
        self.0.to_cols_array()
    }

    pub fn to_matrix(&self) -> Matrix {
        Matrix::from_column_major(4, 4, self.0.to_cols_array().to_vec())
            .unwrap_or_default()
    }

    pub fn to_rows(&self) -> [[f64; 4]; 4] {
        let mut rows = [[0.0; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = self.get(i, j);
            }
        }
        rows
    }

    /// Element at `(row, col)`. Panics when either index is above 3.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.0.col(col)[row]
    }

    pub fn as_dmat4(&self) -> &DMat4 {
        &self.0
    }

    pub fn position(&self) -> [f64; 3] {
        let w = self.0.w_axis;
        [w.x, w.y, w.z]
    }

    /// Same rotation, translation replaced.
    pub fn with_position(mut self, position: [f64; 3]) -> Self {
        self.0.w_axis = DVec4::new(position[0], position[1], position[2], 1.0);
        self
    }

    fn rotation(&self) -> DMat3 {
        DMat3::from_mat4(self.0)
    }

    fn from_parts(rotation: DMat3, translation: DVec3) -> Self {
        Self(DMat4::from_cols(
            rotation.x_axis.extend(0.0),
            rotation.y_axis.extend(0.0),
            rotation.z_axis.extend(0.0),
            translation.extend(1.0),
        ))
    }

    /// Analytic inverse: transpose the rotation, `t' = -Rᵀ t`.
    pub fn invert(&self) -> Self {
        let rt = self.rotation().transpose();
        let t = self.0.w_axis.truncate();
        Self::from_parts(rt, -(rt * t))
    }

    pub fn transform_point(&self, point: [f64; 3]) -> [f64; 3] {
        self.0
            .transform_point3(DVec3::from_array(point))
            .to_array()
    }

    /// Element-wise comparison.
    pub fn approx_eq(&self, other: &Pose, tolerance: f64) -> bool {
        self.0.abs_diff_eq(other.0, tolerance)
    }

    /// Rotation block orthonormal with determinant +1 and last row `0 0 0 1`.
    pub fn is_homogeneous(&self, tolerance: f64) -> bool {
        let last_row = [self.get(3, 0), self.get(3, 1), self.get(3, 2), self.get(3, 3)];
        if last_row
            .iter()
            .zip([0.0, 0.0, 0.0, 1.0])
            .any(|(value, expected)| (value - expected).abs() > tolerance)
        {
            return false;
        }
        let r = self.rotation();
        let gram = r.transpose() * r;
        gram.abs_diff_eq(DMat3::IDENTITY, tolerance) && r.determinant() > 0.0
    }

    fn r(&self, row: usize, col: usize) -> f64 {
        self.get(row, col)
    }

    /// Position plus three angles in degrees for `convention`.
    pub fn to_euler_deg(&self, convention: EulerConvention) -> [f64; 6] {
        let [x, y, z] = self.position();
        let [a, b, c] = match convention {
            EulerConvention::Xyzrpw => {
                let (w, p, r) = self.decompose_zyx();
                [r, p, w]
            }
            EulerConvention::KukaAbc => {
                let (w, p, r) = self.decompose_zyx();
                [w, p, r]
            }
            EulerConvention::StaubliTxyzRxyz => {
                let (rx, ry, rz) = self.decompose_xyz();
                [rx, ry, rz]
            }
            EulerConvention::ComauZyz => {
                let (a, b, c) = self.decompose_zyz();
                [a, b, c]
            }
        };
        [x, y, z, a.to_degrees(), b.to_degrees(), c.to_degrees()]
    }

    /// Inverse of [`Pose::to_euler_deg`].
    pub fn from_euler_deg(convention: EulerConvention, values: [f64; 6]) -> Self {
        let [x, y, z, a, b, c] = values;
        let base = Self::transl(x, y, z);
        match convention {
            EulerConvention::Xyzrpw => {
                base * Self::rot_z_deg(c) * Self::rot_y_deg(b) * Self::rot_x_deg(a)
            }
            EulerConvention::KukaAbc => {
                base * Self::rot_z_deg(a) * Self::rot_y_deg(b) * Self::rot_x_deg(c)
            }
            EulerConvention::StaubliTxyzRxyz => {
                base * Self::rot_x_deg(a) * Self::rot_y_deg(b) * Self::rot_z_deg(c)
            }
            EulerConvention::ComauZyz => {
                base * Self::rot_z_deg(a) * Self::rot_y_deg(b) * Self::rot_z_deg(c)
            }
        }
    }

    /// Shorthand for the host's native `[x, y, z, r, p, w]`.
    pub fn to_xyzrpw_deg(&self) -> [f64; 6] {
        self.to_euler_deg(EulerConvention::Xyzrpw)
    }

    pub fn from_xyzrpw_deg(values: [f64; 6]) -> Self {
        Self::from_euler_deg(EulerConvention::Xyzrpw, values)
    }

    /// ABB `[x, y, z, q1, q2, q3, q4]` with `q1` the scalar part, kept
    /// non-negative.
    pub fn to_abb_quaternion(&self) -> [f64; 7] {
        let [x, y, z] = self.position();
        let mut q = DQuat::from_mat3(&self.rotation()).normalize();
        if q.w < 0.0 {
            q = -q;
        }
        [x, y, z, q.w, q.x, q.y, q.z]
    }

    pub fn from_abb_quaternion(values: [f64; 7]) -> Self {
        let [x, y, z, q1, q2, q3, q4] = values;
        let q = DQuat::from_xyzw(q2, q3, q4, q1).normalize();
        Self::from_parts(DMat3::from_quat(q), DVec3::new(x, y, z))
    }

    /// Universal Robots `[x, y, z, rx, ry, rz]`: millimeters and a rotation
    /// vector in radians.
    pub fn to_ur_rotvec_mm_rad(&self) -> [f64; 6] {
        let [x, y, z] = self.position();
        let v = DQuat::from_mat3(&self.rotation()).normalize().to_scaled_axis();
        [x, y, z, v.x, v.y, v.z]
    }

    pub fn from_ur_rotvec_mm_rad(values: [f64; 6]) -> Self {
        let [x, y, z, rx, ry, rz] = values;
        let q = DQuat::from_scaled_axis(DVec3::new(rx, ry, rz));
        Self::from_parts(DMat3::from_quat(q), DVec3::new(x, y, z))
    }

    /// `R = Rz(w) Ry(p) Rx(r)`, returns `(w, p, r)` in radians.
    fn decompose_zyx(&self) -> (f64, f64, f64) {
        let cos_p = (self.r(0, 0).powi(2) + self.r(1, 0).powi(2)).sqrt();
        let p = (-self.r(2, 0)).atan2(cos_p);
        if cos_p > GIMBAL_EPSILON {
            let w = self.r(1, 0).atan2(self.r(0, 0));
            let r = self.r(2, 1).atan2(self.r(2, 2));
            (w, p, r)
        } else if p > 0.0 {
            (0.0, p, self.r(0, 1).atan2(self.r(1, 1)))
        } else {
            (0.0, p, (-self.r(0, 1)).atan2(self.r(1, 1)))
        }
    }

    /// `R = Rx(a) Ry(b) Rz(c)`, returns `(a, b, c)` in radians.
    fn decompose_xyz(&self) -> (f64, f64, f64) {
        let cos_b = (self.r(0, 0).powi(2) + self.r(0, 1).powi(2)).sqrt();
        let b = self.r(0, 2).atan2(cos_b);
        if cos_b > GIMBAL_EPSILON {
            let a = (-self.r(1, 2)).atan2(self.r(2, 2));
            let c = (-self.r(0, 1)).atan2(self.r(0, 0));
            (a, b, c)
        } else if b > 0.0 {
            (self.r(1, 0).atan2(self.r(1, 1)), b, 0.0)
        } else {
            ((-self.r(1, 0)).atan2(self.r(1, 1)), b, 0.0)
        }
    }

    /// `R = Rz(a) Ry(b) Rz(c)`, returns `(a, b, c)` in radians with `b` in `[0, pi]`.
    fn decompose_zyz(&self) -> (f64, f64, f64) {
        let sin_b = (self.r(0, 2).powi(2) + self.r(1, 2).powi(2)).sqrt();
        let b = sin_b.atan2(self.r(2, 2));
        if sin_b > GIMBAL_EPSILON {
            let a = self.r(1, 2).atan2(self.r(0, 2));
            let c = self.r(2, 1).atan2(-self.r(2, 0));
            (a, b, c)
        } else if self.r(2, 2) > 0.0 {
            (0.0, b, self.r(1, 0).atan2(self.r(0, 0)))
        } else {
            (0.0, b, self.r(1, 0).atan2(self.r(1, 1)))
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Pose {
    type Output = Pose;

    fn mul(self, rhs: Pose) -> Pose {
        Pose(self.0 * rhs.0)
    }
}

impl Mul<&Pose> for &Pose {
    type Output = Pose;

    fn mul(self, rhs: &Pose) -> Pose {
        Pose(self.0 * rhs.0)
    }
}

impl fmt::Debug for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z, r, p, w] = self.to_xyzrpw_deg();
        write!(
            f,
            "Pose(xyzrpw: [{x:.3}, {y:.3}, {z:.3}, {r:.3}, {p:.3}, {w:.3}])"
        )
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.to_rows() {
            writeln!(
                f,
                "[{:.3}, {:.3}, {:.3}, {:.3}]",
                row[0], row[1], row[2], row[3]
            )?;
        }
        Ok(())
    }
}

impl TryFrom<&Matrix> for Pose {
    type Error = LinkError;

    fn try_from(matrix: &Matrix) -> LinkResult<Self> {
        Pose::from_matrix(matrix)
    }
}
