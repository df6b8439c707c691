//! 4x4 homogeneous transforms.
use core::ops::Mul;

use crate::robot::state::Point3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub m: [[f32; 4]; 4],
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        let mut t = Self::IDENTITY;
        t.m[0][3] = x;
        t.m[1][3] = y;
        t.m[2][3] = z;
        t
    }

    pub fn rotation_x(angle: f32) -> Self {
        let (s, c) = (libm::sinf(angle), libm::cosf(angle));
        let mut t = Self::IDENTITY;
        t.m[1][1] = c;
        t.m[1][2] = -s;
        t.m[2][1] = s;
        t.m[2][2] = c;
        t
    }

    pub fn rotation_y(angle: f32) -> Self {
        let (s, c) = (libm::sinf(angle), libm::cosf(angle));
        let mut t = Self::IDENTITY;
        t.m[0][0] = c;
        t.m[0][2] = s;
        t.m[2][0] = -s;
        t.m[2][2] = c;
        t
    }

    pub fn rotation_z(angle: f32) -> Self {
        let (s, c) = (libm::sinf(angle), libm::cosf(angle));
        let mut t = Self::IDENTITY;
        t.m[0][0] = c;
        t.m[0][1] = -s;
        t.m[1][0] = s;
        t.m[1][1] = c;
        t
    }

    /// Intrinsic x, then y, then z rotation.
    pub fn rotation_xyz(x: f32, y: f32, z: f32) -> Self {
        Self::rotation_x(x) * Self::rotation_y(y) * Self::rotation_z(z)
    }

    pub fn with_translation(mut self, p: Point3) -> Self {
        self.m[0][3] = p.x;
        self.m[1][3] = p.y;
        self.m[2][3] = p.z;
        self
    }

    pub fn translation_part(&self) -> Point3 {
        Point3::new(self.m[0][3], self.m[1][3], self.m[2][3])
    }

    /// Inverse of a rigid transform: transposed rotation, rotated negative translation.
    pub fn inverse(&self) -> Self {
        let mut inv = Self::IDENTITY;
        for r in 0..3 {
            for c in 0..3 {
                inv.m[r][c] = self.m[c][r];
            }
        }
        for r in 0..3 {
            inv.m[r][3] = -(0..3).map(|k| inv.m[r][k] * self.m[k][3]).sum::<f32>();
        }
        inv
    }

    pub fn apply(&self, p: Point3) -> Point3 {
        let v = [p.x, p.y, p.z, 1.0];
        let row = |r: usize| (0..4).map(|k| self.m[r][k] * v[k]).sum::<f32>();
        Point3::new(row(0), row(1), row(2))
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        let mut out = [[0.0; 4]; 4];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.m[r][k] * rhs.m[k][c]).sum();
            }
        }
        Transform { m: out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn inverse_undoes_rigid_transform() {
        let t = Transform::translation(0.1, -0.2, 0.3) * Transform::rotation_xyz(0.2, -0.4, 0.9);
        let p = Point3::new(0.05, 0.07, -0.02);
        let back = t.inverse().apply(t.apply(p));
        assert_abs_diff_eq!(back.x, p.x, epsilon = 1e-6);
        assert_abs_diff_eq!(back.y, p.y, epsilon = 1e-6);
        assert_abs_diff_eq!(back.z, p.z, epsilon = 1e-6);
    }

    #[test]
    fn quarter_turn_about_y_maps_z_to_x() {
        let p = Transform::rotation_y(core::f32::consts::FRAC_PI_2).apply(Point3::new(0.0, 0.0, 1.0));
        assert_abs_diff_eq!(p.x, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(p.z, 0.0, epsilon = 1e-6);
    }
}
