// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use glam::{Mat4, UVec2, Vec2, Vec4};

use crate::math::{Camera, Projection};
use crate::record::MeshId;

/// How the render target is cleared before a frame's records are drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearParams {
    /// Straight alpha RGBA in `0.0..=1.0`.
    pub color: Vec4,
    /// Whether the depth buffer is cleared too.
    pub clear_depth: bool,
}

impl Default for ClearParams {
    fn default() -> Self {
        Self {
            color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            clear_depth: true,
        }
    }
}

/// Per-frame rendering state shared between the producer and the backends.
///
/// Alongside the camera and screen parameters this holds the id counters, so that
/// every command buffer writing through it draws from the same id space.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderInfo {
    pub clear: ClearParams,
    pub camera: Camera,
    pub projection: Projection,
    /// Screen size when rendering started. Overlay coordinates are relative to it.
    pub initial_size: UVec2,
    pub screen_size: UVec2,
    /// Scale of world units on screen, for the software path.
    pub pixels_per_meter: f32,
    pub rect_mesh: MeshId,
    pub cube_mesh: MeshId,
    pub text_mesh: MeshId,
    /// Number of meshes handed out so far. The last assigned [`MeshId`] equals it.
    pub renderables_loaded: u32,
    /// Number of textures handed out so far.
    pub textures_loaded: u32,
}

impl RenderInfo {
    pub fn new(screen_size: UVec2, pixels_per_meter_ratio: f32) -> Self {
        Self {
            clear: ClearParams::default(),
            camera: Camera::default(),
            projection: Projection {
                aspect_ratio: aspect_ratio(screen_size),
                ..Projection::default()
            },
            initial_size: screen_size,
            screen_size,
            pixels_per_meter: screen_size.y as f32 * pixels_per_meter_ratio,
            rect_mesh: MeshId::NONE,
            cube_mesh: MeshId::NONE,
            text_mesh: MeshId::NONE,
            renderables_loaded: 0,
            textures_loaded: 0,
        }
    }

    /// Records a new screen size. The initial size is kept.
    pub fn resize(&mut self, screen_size: UVec2) {
        self.screen_size = screen_size;
    }

    /// `projection · view`, the transform from world space to clip space.
    pub fn view_projection(&self) -> Mat4 {
        self.projection.matrix() * self.camera.view_matrix()
    }

    /// Ratio of the current screen size to the initial one.
    pub fn overlay_scale(&self) -> Vec2 {
        self.screen_size.as_vec2() / self.initial_size.max(UVec2::ONE).as_vec2()
    }
}

fn aspect_ratio(size: UVec2) -> f32 {
    if size.y == 0 {
        Projection::default().aspect_ratio
    } else {
        size.x as f32 / size.y as f32
    }
}

#[cfg(test)]
mod tests {
    use super::RenderInfo;
    use glam::{UVec2, Vec2};

    #[test]
    fn derives_screen_parameters() {
        let info = RenderInfo::new(UVec2::new(1280, 720), 0.1);
        assert_eq!(info.pixels_per_meter, 72.0);
        assert!((info.projection.aspect_ratio - 16.0 / 9.0).abs() < 1e-6);
        assert_eq!(info.initial_size, info.screen_size);
    }

    #[test]
    fn overlay_scale_tracks_resizes() {
        let mut info = RenderInfo::new(UVec2::new(200, 100), 0.1);
        info.resize(UVec2::new(400, 50));
        assert_eq!(info.overlay_scale(), Vec2::new(2.0, 0.5));
        assert_eq!(info.initial_size, UVec2::new(200, 100));
    }
}
