//! Keyboard shortcuts: space plays/pauses, arrows step phases and speed, R restarts.

use bevy::prelude::*;

use super::Walkthrough;

pub(crate) fn keyboard_input(keys: Res<ButtonInput<KeyCode>>, mut walkthrough: ResMut<Walkthrough>) {
    if keys.just_pressed(KeyCode::Space) {
        walkthrough.toggle();
    }
    if keys.just_pressed(KeyCode::ArrowRight) {
        walkthrough.next();
    }
    if keys.just_pressed(KeyCode::ArrowLeft) {
        walkthrough.prev();
    }
    if keys.just_pressed(KeyCode::KeyR) {
        walkthrough.restart();
    }
    if keys.just_pressed(KeyCode::ArrowUp) {
        walkthrough.step_speed(true);
    }
    if keys.just_pressed(KeyCode::ArrowDown) {
        walkthrough.step_speed(false);
    }
}
