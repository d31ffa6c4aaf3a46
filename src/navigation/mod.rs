//! Input to navigation intent
//!
//! Translates raw pointer, touch, wheel and key input into page turns and
//! pull-to-refresh feedback. The controller only decides; the session applies
//! the action to the renderer when it is ready.

use serde::{Deserialize, Serialize};

use crate::render::LayoutMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Touch,
    Pointer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Click or tap at `x` pixels from the left edge of the viewport
    Click { x: f32 },
    /// Completed swipe; negative `dx` is a swipe to the left
    Swipe { dx: f32, dy: f32 },
    /// Positive `delta_y` scrolls down
    Wheel { delta_y: f32 },
    Key(NavKey),
    /// Finger dragged down by `distance` pixels
    PullMove { distance: f32, at_scroll_top: bool },
    PullEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    Advance,
    Retreat,
    ShowRefreshHint,
    HideRefreshHint,
    Reload,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavOutcome {
    pub action: NavAction,
    /// Suppress the platform's default handling of the event
    pub prevent_default: bool,
}

impl NavOutcome {
    fn act(action: NavAction) -> Self {
        Self {
            action,
            prevent_default: false,
        }
    }

    fn none() -> Self {
        Self::act(NavAction::None)
    }
}

/// Gesture thresholds in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationThresholds {
    pub swipe_min_distance: f32,
    pub wheel_min_delta: f32,
    pub pull_hint_distance: f32,
    pub pull_reload_distance: f32,
}

impl Default for NavigationThresholds {
    fn default() -> Self {
        Self {
            swipe_min_distance: 50.0,
            wheel_min_delta: 30.0,
            pull_hint_distance: 60.0,
            pull_reload_distance: 120.0,
        }
    }
}

#[derive(Debug, Default)]
struct PullState {
    distance: f32,
    hint_shown: bool,
}

#[derive(Debug)]
pub struct NavigationController {
    device: DeviceClass,
    thresholds: NavigationThresholds,
    viewport_width: f32,
    pull: PullState,
}

impl NavigationController {
    pub fn new(device: DeviceClass, thresholds: NavigationThresholds, viewport_width: f32) -> Self {
        Self {
            device,
            thresholds,
            viewport_width,
            pull: PullState::default(),
        }
    }

    pub fn device(&self) -> DeviceClass {
        self.device
    }

    pub fn set_viewport_width(&mut self, width: f32) {
        self.viewport_width = width;
    }

    pub fn handle(&mut self, event: InputEvent, mode: LayoutMode) -> NavOutcome {
        let paginated = mode == LayoutMode::Paginated;
        let touch = self.device == DeviceClass::Touch;

        match event {
            InputEvent::Click { x } => {
                if !paginated {
                    return NavOutcome::none();
                }
                let third = self.viewport_width / 3.0;
                if x < third {
                    NavOutcome::act(NavAction::Retreat)
                } else if x > self.viewport_width - third {
                    NavOutcome::act(NavAction::Advance)
                } else {
                    NavOutcome::none()
                }
            }
            InputEvent::Swipe { dx, dy } => {
                if !touch || !paginated {
                    return NavOutcome::none();
                }
                if dx.abs() < self.thresholds.swipe_min_distance || dx.abs() <= dy.abs() {
                    return NavOutcome::none();
                }
                if dx < 0.0 {
                    NavOutcome::act(NavAction::Advance)
                } else {
                    NavOutcome::act(NavAction::Retreat)
                }
            }
            InputEvent::Wheel { delta_y } => {
                if touch || !paginated {
                    return NavOutcome::none();
                }
                let action = if delta_y.abs() < self.thresholds.wheel_min_delta {
                    NavAction::None
                } else if delta_y > 0.0 {
                    NavAction::Advance
                } else {
                    NavAction::Retreat
                };
                // The page itself never scrolls in paginated mode
                NavOutcome {
                    action,
                    prevent_default: true,
                }
            }
            InputEvent::Key(key) => {
                if !paginated {
                    return NavOutcome::none();
                }
                match key {
                    NavKey::Left | NavKey::Up => NavOutcome::act(NavAction::Retreat),
                    NavKey::Right | NavKey::Down => NavOutcome::act(NavAction::Advance),
                }
            }
            InputEvent::PullMove {
                distance,
                at_scroll_top,
            } => self.pull_move(distance, touch && at_scroll_top),
            InputEvent::PullEnd => self.pull_end(),
        }
    }

    fn pull_move(&mut self, distance: f32, allowed: bool) -> NavOutcome {
        if !allowed {
            let was_shown = self.pull.hint_shown;
            self.pull = PullState::default();
            return if was_shown {
                NavOutcome::act(NavAction::HideRefreshHint)
            } else {
                NavOutcome::none()
            };
        }

        self.pull.distance = distance.max(0.0);
        let past_hint = self.pull.distance >= self.thresholds.pull_hint_distance;
        match (past_hint, self.pull.hint_shown) {
            (true, false) => {
                self.pull.hint_shown = true;
                NavOutcome::act(NavAction::ShowRefreshHint)
            }
            (false, true) => {
                self.pull.hint_shown = false;
                NavOutcome::act(NavAction::HideRefreshHint)
            }
            _ => NavOutcome::none(),
        }
    }

    fn pull_end(&mut self) -> NavOutcome {
        let pull = std::mem::take(&mut self.pull);
        if pull.distance >= self.thresholds.pull_reload_distance {
            tracing::debug!("Pull released at {}px, reloading", pull.distance);
            NavOutcome::act(NavAction::Reload)
        } else if pull.hint_shown {
            NavOutcome::act(NavAction::HideRefreshHint)
        } else {
            NavOutcome::none()
        }
    }
}
