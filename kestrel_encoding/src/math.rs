// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transform math shared by the encoder and both backends.
//!
//! Matrices act on column vectors. The rotation, world, camera and projection
//! matrices below are written out row by row in their docs; use [`to_row_major`] to
//! get that layout for upload.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

/// Translation, rotation (radians, applied as `Rx·Ry·Rz`) and scale of an object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }
}

/// Which point of a rectangle its position refers to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Origin {
    Center = 0,
    BottomCenter = 1,
    #[default]
    BottomLeft = 2,
    TopLeft = 3,
}

impl Origin {
    /// Corners of a `size` rectangle anchored at `position`.
    pub fn min_max(self, position: Vec2, size: Vec2) -> (Vec2, Vec2) {
        let half = size / 2.0;
        match self {
            Self::Center => (position - half, position + half),
            Self::BottomCenter => (
                Vec2::new(position.x - half.x, position.y),
                Vec2::new(position.x + half.x, position.y + size.y),
            ),
            Self::BottomLeft => (position, position + size),
            Self::TopLeft => (
                Vec2::new(position.x, position.y - size.y),
                Vec2::new(position.x + size.x, position.y),
            ),
        }
    }

    pub(crate) fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Center,
            1 => Self::BottomCenter,
            2 => Self::BottomLeft,
            3 => Self::TopLeft,
            _ => return None,
        })
    }
}

/// `Rx·Ry·Rz` with
///
/// ```text
/// Rx = [1 0 0; 0 c -s; 0 s c]
/// Ry = [c 0 s; 0 1 0; -s 0 c]
/// Rz = [c -s 0; s c 0; 0 0 1]
/// ```
pub fn rotation_matrix(rotation: Vec3) -> Mat3 {
    Mat3::from_rotation_x(rotation.x)
        * Mat3::from_rotation_y(rotation.y)
        * Mat3::from_rotation_z(rotation.z)
}

/// `[R·S | T]`, where `R` is [`rotation_matrix`] and `S` the scale.
pub fn world_matrix(transform: &Transform) -> Mat4 {
    let linear = rotation_matrix(transform.rotation) * Mat3::from_diagonal(transform.scale);
    Mat4::from_cols(
        linear.x_axis.extend(0.0),
        linear.y_axis.extend(0.0),
        linear.z_axis.extend(0.0),
        transform.translation.extend(1.0),
    )
}

/// Model matrix for the unit quad `(0, 0)..(1, 1)` stretched over `local_min..local_max`.
pub fn rect_model_matrix(local_min: Vec2, local_max: Vec2, transform: &Transform) -> Mat4 {
    world_matrix(transform)
        * Mat4::from_translation(local_min.extend(0.0))
        * Mat4::from_scale((local_max - local_min).extend(1.0))
}

/// Maps `0..1` overlay coordinates to normalized device coordinates:
///
/// ```text
/// [2 0 0 -1]
/// [0 2 0 -1]
/// [0 0 1  0]
/// [0 0 0  1]
/// ```
pub const OVERLAY_TO_NDC: Mat4 = Mat4::from_cols(
    Vec4::new(2.0, 0.0, 0.0, 0.0),
    Vec4::new(0.0, 2.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, 1.0, 0.0),
    Vec4::new(-1.0, -1.0, 0.0, 1.0),
);

/// A camera placed in the world. Looks down its local `+z` axis.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    /// Radians, applied as in [`rotation_matrix`].
    pub rotation: Vec3,
}

impl Camera {
    pub fn new(position: Vec3, rotation: Vec3) -> Self {
        Self { position, rotation }
    }

    /// Moves the camera by a relative translation and rotation.
    pub fn update(&mut self, translation: Vec3, rotation: Vec3) {
        self.position += translation;
        self.rotation += rotation;
    }

    /// World to camera space. The rows are the camera's x, y and z axes, followed by a
    /// translation of `-(rows · position)`.
    pub fn view_matrix(&self) -> Mat4 {
        let rows = rotation_matrix(self.rotation).transpose();
        let translation = -(rows * self.position);
        Mat4::from_cols(
            rows.x_axis.extend(0.0),
            rows.y_axis.extend(0.0),
            rows.z_axis.extend(0.0),
            translation.extend(1.0),
        )
    }
}

/// Perspective projection settings. The field of view is in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub fov_degrees: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_degrees: 60.0,
            aspect_ratio: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Projection {
    /// ```text
    /// [x 0 0 0]
    /// [0 y 0 0]
    /// [0 0 a b]
    /// [0 0 1 0]
    /// ```
    ///
    /// with `x = 1/(tan(fov/2)·aspect)`, `y = 1/tan(fov/2)`, `a = (-f-n)/(n-f)` and
    /// `b = 2fn/(n-f)`. Depth lands in `-1..1`.
    pub fn matrix(&self) -> Mat4 {
        let tan_half_fov = (self.fov_degrees.to_radians() / 2.0).tan();
        let x_scale = 1.0 / (tan_half_fov * self.aspect_ratio);
        let y_scale = 1.0 / tan_half_fov;
        let (n, f) = (self.near, self.far);
        let a = (-f - n) / (n - f);
        let b = (2.0 * f * n) / (n - f);
        Mat4::from_cols(
            Vec4::new(x_scale, 0.0, 0.0, 0.0),
            Vec4::new(0.0, y_scale, 0.0, 0.0),
            Vec4::new(0.0, 0.0, a, 1.0),
            Vec4::new(0.0, 0.0, b, 0.0),
        )
    }
}

/// Inverts `m`.
///
/// # Panics
///
/// If `m` is singular. Such a matrix means the producer built a degenerate transform.
pub fn invert(m: Mat4) -> Mat4 {
    let det = m.determinant();
    assert!(
        det != 0.0 && det.is_finite(),
        "un-invertible transform (determinant {det})"
    );
    m.inverse()
}

/// The matrix as four rows.
pub fn to_row_major(m: Mat4) -> [[f32; 4]; 4] {
    m.transpose().to_cols_array_2d()
}
