// SPDX-License-Identifier: CEPL-1.0
pub use glam;

use glam::{Mat4, Vec3};

/// Look-at camera producing Vulkan-convention matrices (right handed,
/// depth in `[0, 1]`, clip-space Y pointing down).
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(2.0, 1.5, 4.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: 60f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 256.0,
        }
    }
}

impl Camera {
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        // GL-style clip space has +Y up; Vulkan's has +Y down
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Rotates the eye around `target` by `radians` about the up axis.
    pub fn orbit(&mut self, radians: f32) {
        let offset = self.position - self.target;
        let rot = glam::Quat::from_axis_angle(self.up.normalize(), radians);
        self.position = self.target + rot * offset;
    }
}

/// Model matrix from translation, rotation about Y and uniform scale.
pub fn model_matrix(translation: Vec3, rotation_y: f32, scale: f32) -> Mat4 {
    Mat4::from_translation(translation)
        * Mat4::from_rotation_y(rotation_y)
        * Mat4::from_scale(Vec3::splat(scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_flips_y_for_vulkan() {
        let cam = Camera::default();
        let gl = Mat4::perspective_rh(cam.fov_y, cam.aspect, cam.near, cam.far);
        let vk = cam.projection();
        assert_eq!(vk.y_axis.y, -gl.y_axis.y);
        assert_eq!(vk.x_axis.x, gl.x_axis.x);
    }

    #[test]
    fn orbit_keeps_distance_to_target() {
        let mut cam = Camera::default();
        let before = cam.position.distance(cam.target);
        cam.orbit(1.3);
        let after = cam.position.distance(cam.target);
        assert!((before - after).abs() < 1e-4);
    }

    #[test]
    fn zero_viewport_keeps_aspect() {
        let mut cam = Camera::default();
        let aspect = cam.aspect;
        cam.set_viewport(0, 600);
        assert_eq!(cam.aspect, aspect);
        cam.set_viewport(1280, 800);
        assert!((cam.aspect - 1.6).abs() < 1e-6);
    }
}
