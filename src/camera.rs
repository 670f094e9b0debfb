use glam::{Mat4, Vec3};

use crate::config::CameraConfig;

/// Camera parameters consumed by the renderer's uniform buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

/// Host perspective camera looking at a target point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default())
    }
}

impl Camera {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            position: config.position,
            target: config.target,
            up: Vec3::Y,
            fov: config.fov,
            near: 0.1,
            far: 1000.0,
        }
    }

    pub fn view(&self) -> Mat4 {
        let forward = self.target - self.position;
        let target = if forward.length_squared() > f32::EPSILON {
            self.target
        } else {
            self.position - Vec3::Z
        };
        Mat4::look_at_rh(self.position, target, self.up)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(
            self.fov.clamp(1.0, 179.0).to_radians(),
            aspect.max(0.01),
            self.near,
            self.far,
        )
    }

    pub fn params(&self, aspect: f32) -> CameraParams {
        CameraParams {
            view_proj: self.projection(aspect) * self.view(),
            position: self.position,
        }
    }
}

/// Width over height, falling back to square for degenerate sizes.
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn default_camera_matches_viewer_pose() {
        let camera = Camera::default();
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 3.0));
        assert_eq!(camera.fov, 60.0);
    }

    #[test]
    fn target_projects_to_screen_center() {
        let camera = Camera::default();
        let clip = camera.params(16.0 / 9.0).view_proj * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5);
        assert!(ndc.y.abs() < 1e-5);
    }

    #[test]
    fn degenerate_aspect() {
        assert_eq!(aspect_ratio(100, 0), 1.0);
        assert_eq!(aspect_ratio(200, 100), 2.0);
    }
}
