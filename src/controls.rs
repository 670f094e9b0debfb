use glam::{EulerRot, Quat, Vec3};

use crate::camera::Camera;
use crate::input::InputState;

const PITCH_LIMIT: f32 = 1.55;

/// Orbit (left drag) and zoom (wheel) around a focus point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitControls {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    /// Radians per pixel of drag.
    pub rotate_speed: f32,
    /// Fraction of the distance covered per wheel line.
    pub zoom_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl OrbitControls {
    /// Starts orbiting from the camera's current pose.
    pub fn from_camera(camera: &Camera) -> Self {
        let offset = camera.position - camera.target;
        let distance = offset.length().max(f32::EPSILON);
        Self {
            target: camera.target,
            distance,
            yaw: offset.x.atan2(offset.z),
            pitch: (-offset.y / distance).clamp(-1.0, 1.0).asin(),
            rotate_speed: 0.0035,
            zoom_speed: 0.1,
            min_distance: 0.25,
            max_distance: 500.0,
        }
    }

    /// Consumes the input accumulated since the last frame and moves the
    /// camera. Returns `true` when the camera moved.
    pub fn update(&mut self, input: &InputState, camera: &mut Camera) -> bool {
        let drag = input.take_drag();
        let scroll = input.take_scroll();
        if drag.length_squared() <= f32::EPSILON && scroll.abs() <= f32::EPSILON {
            return false;
        }
        self.yaw -= drag.x * self.rotate_speed;
        self.pitch = (self.pitch + drag.y * self.rotate_speed).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.distance = (self.distance * (1.0 - self.zoom_speed).powf(scroll))
            .clamp(self.min_distance, self.max_distance);
        self.apply(camera);
        true
    }

    /// Places `camera` on the orbit.
    pub fn apply(&self, camera: &mut Camera) {
        let rotation = Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0);
        camera.target = self.target;
        camera.position = self.target + rotation * Vec3::Z * self.distance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MouseButton;
    use glam::Vec2;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn round_trips_camera_pose() {
        let mut camera = Camera::default();
        camera.position = Vec3::new(2.0, 1.0, -3.0);
        let controls = OrbitControls::from_camera(&camera);
        let mut placed = camera;
        controls.apply(&mut placed);
        assert!(close(placed.position, camera.position));
    }

    #[test]
    fn wheel_zooms_within_limits() {
        let mut camera = Camera::default();
        let mut controls = OrbitControls::from_camera(&camera);
        let input = InputState::new();

        input.add_scroll(1.0);
        assert!(controls.update(&input, &mut camera));
        assert!((controls.distance - 2.7).abs() < 1e-4);
        assert!(close(camera.position, Vec3::new(0.0, 0.0, 2.7)));

        input.add_scroll(-200.0);
        controls.update(&input, &mut camera);
        assert_eq!(controls.distance, controls.max_distance);
    }

    #[test]
    fn drag_orbits_around_target() {
        let mut camera = Camera::default();
        let mut controls = OrbitControls::from_camera(&camera);
        let input = InputState::new();
        assert!(!controls.update(&input, &mut camera));

        input.set_mouse_button_down(MouseButton::LEFT);
        input.set_mouse_position(Vec2::new(100.0, 0.0));
        input.set_mouse_position(Vec2::new(200.0, 10_000.0));
        assert!(controls.update(&input, &mut camera));
        assert_eq!(controls.pitch, PITCH_LIMIT);
        assert!(((camera.position - camera.target).length() - 3.0).abs() < 1e-4);
    }
}
