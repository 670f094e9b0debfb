use std::collections::HashSet;

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const RIGHT: Self = Self(1);
    pub const MIDDLE: Self = Self(2);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Parses `Mouse`, `Mouse1`, `mouse3`... (one-based).
    pub fn from_name(name: &str) -> Option<Self> {
        let prefix = name.get(..5)?;
        if !prefix.eq_ignore_ascii_case("mouse") {
            return None;
        }
        let suffix = &name[5..];
        if suffix.is_empty() {
            return Some(Self::LEFT);
        }
        let index = suffix.parse::<u8>().ok()?;
        Some(Self::new(index.saturating_sub(1)))
    }
}

/// Pointer snapshot shared between the host event loop and the viewer.
///
/// The host writes events as they arrive; the viewer consumes the
/// accumulated drag and scroll once per frame.
#[derive(Debug, Default)]
pub struct InputState {
    mouse_buttons: RwLock<HashSet<MouseButton>>,
    mouse_position: RwLock<Vec2>,
    drag: RwLock<Vec2>,
    scroll: RwLock<f32>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mouse_button_down(&self, button: MouseButton) {
        self.mouse_buttons.write().insert(button);
    }

    pub fn set_mouse_button_up(&self, button: MouseButton) {
        self.mouse_buttons.write().remove(&button);
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons.read().contains(&button)
    }

    /// Moves the pointer. Motion with the left button held accumulates as
    /// drag.
    pub fn set_mouse_position(&self, position: Vec2) {
        let previous = std::mem::replace(&mut *self.mouse_position.write(), position);
        if self.is_mouse_button_down(MouseButton::LEFT) {
            *self.drag.write() += position - previous;
        }
    }

    pub fn mouse_position(&self) -> Vec2 {
        *self.mouse_position.read()
    }

    /// Adds wheel motion in lines; positive is away from the user.
    pub fn add_scroll(&self, delta: f32) {
        if delta.is_finite() {
            *self.scroll.write() += delta;
        }
    }

    /// Returns and clears the drag accumulated since the last call.
    pub fn take_drag(&self) -> Vec2 {
        std::mem::take(&mut *self.drag.write())
    }

    /// Returns and clears the scroll accumulated since the last call.
    pub fn take_scroll(&self) -> f32 {
        std::mem::take(&mut *self.scroll.write())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_names_are_supported() {
        assert_eq!(MouseButton::from_name("Mouse"), Some(MouseButton::LEFT));
        assert_eq!(MouseButton::from_name("Mouse1"), Some(MouseButton::LEFT));
        assert_eq!(MouseButton::from_name("mouse3"), Some(MouseButton::MIDDLE));
        assert_eq!(MouseButton::from_name("Space"), None);
        assert_eq!(MouseButton::from_name("m"), None);
    }

    #[test]
    fn drag_only_accumulates_while_pressed() {
        let input = InputState::new();
        input.set_mouse_position(Vec2::new(10.0, 10.0));
        assert_eq!(input.take_drag(), Vec2::ZERO);

        input.set_mouse_button_down(MouseButton::LEFT);
        input.set_mouse_position(Vec2::new(15.0, 12.0));
        input.set_mouse_position(Vec2::new(20.0, 10.0));
        input.set_mouse_button_up(MouseButton::LEFT);
        input.set_mouse_position(Vec2::new(90.0, 90.0));

        assert_eq!(input.take_drag(), Vec2::new(10.0, 0.0));
        assert_eq!(input.take_drag(), Vec2::ZERO);
    }

    #[test]
    fn scroll_is_consumed_once() {
        let input = InputState::new();
        input.add_scroll(1.5);
        input.add_scroll(-0.5);
        input.add_scroll(f32::NAN);
        assert_eq!(input.take_scroll(), 1.0);
        assert_eq!(input.take_scroll(), 0.0);
    }
}
