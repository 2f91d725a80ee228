//! Phase scripts: an ordered list of named time windows built once when a phase is entered,
//! then evaluated as a pure function of elapsed time every frame.

use crate::camera::{CameraState, Easing};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowState {
    /// Progress through the window, 0 before it starts and 1 once it has run its duration.
    pub t: f32,
    pub active: bool,
}

impl WindowState {
    pub const IDLE: WindowState = WindowState {
        t: 0.0,
        active: false,
    };

    pub fn started(&self) -> bool {
        self.t > 0.0
    }

    pub fn done(&self) -> bool {
        self.t >= 1.0
    }

    pub fn eased(&self, easing: Easing) -> f32 {
        easing.apply(self.t)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WindowSpec {
    pub name: &'static str,
    pub start: f32,
    pub duration: f32,
    /// Extra time the window stays active at t = 1 before the next one starts.
    pub hold: f32,
}

impl WindowSpec {
    pub fn end(&self) -> f32 {
        self.start + self.duration
    }

    pub fn evaluate(&self, time: f32) -> WindowState {
        if time < self.start {
            return WindowState::IDLE;
        }
        let t = if self.duration <= 0.0 {
            1.0
        } else {
            ((time - self.start) / self.duration).clamp(0.0, 1.0)
        };
        WindowState {
            t,
            active: time <= self.end() + self.hold,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Cleanup {
    trigger: usize,
    targets: Vec<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct CameraMove {
    window: usize,
    to: CameraState,
    easing: Easing,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Commentary {
    pub start: f32,
    pub text: &'static str,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PhaseScript {
    windows: Vec<WindowSpec>,
    cleanups: Vec<Cleanup>,
    breakpoints: Vec<f32>,
    commentary: Vec<Commentary>,
    initial_camera: CameraState,
    moves: Vec<CameraMove>,
    length: f32,
}

impl PhaseScript {
    pub fn builder(initial_camera: CameraState) -> ScriptBuilder {
        ScriptBuilder {
            script: PhaseScript {
                windows: Vec::new(),
                cleanups: Vec::new(),
                breakpoints: Vec::new(),
                commentary: Vec::new(),
                initial_camera,
                moves: Vec::new(),
                length: 0.0,
            },
            cursor: 0.0,
        }
    }

    pub fn empty() -> Self {
        PhaseScript::builder(CameraState::default()).build()
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn windows(&self) -> &[WindowSpec] {
        &self.windows
    }

    pub fn window_names(&self) -> Vec<&'static str> {
        self.windows.iter().map(|w| w.name).collect()
    }

    pub fn breakpoints(&self) -> &[f32] {
        &self.breakpoints
    }

    pub fn initial_camera(&self) -> CameraState {
        self.initial_camera
    }

    /// First breakpoint crossed when moving forward from `from` to `to`.
    pub fn next_breakpoint(&self, from: f32, to: f32) -> Option<f32> {
        self.breakpoints
            .iter()
            .copied()
            .find(|&b| from < b && b <= to)
    }

    /// Latest commentary segment that has started by `time`.
    pub fn commentary_at(&self, time: f32) -> Option<&'static str> {
        self.commentary
            .iter()
            .rev()
            .find(|c| c.start <= time)
            .map(|c| c.text)
    }

    pub fn commentary(&self) -> &[Commentary] {
        &self.commentary
    }

    pub fn evaluate(&self, time: f32) -> Windows<'_> {
        let mut states: Vec<WindowState> =
            self.windows.iter().map(|w| w.evaluate(time)).collect();
        for cleanup in &self.cleanups {
            if states[cleanup.trigger].started() {
                for &target in &cleanup.targets {
                    states[target] = WindowState::IDLE;
                }
            }
        }
        Windows {
            script: self,
            states,
            time,
        }
    }

    /// Camera after applying every started move in order, each easing from the previous
    /// move's destination.
    pub fn camera(&self, windows: &Windows<'_>) -> CameraState {
        let mut camera = self.initial_camera;
        let mut from = self.initial_camera;
        for m in &self.moves {
            let state = windows.states[m.window];
            if state.started() {
                camera = from.lerp(&m.to, state.eased(m.easing));
            }
            from = m.to;
        }
        camera
    }
}

/// Window states for one instant of a phase.
#[derive(Clone, Debug)]
pub struct Windows<'a> {
    script: &'a PhaseScript,
    states: Vec<WindowState>,
    time: f32,
}

impl Windows<'_> {
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn get(&self, name: &str) -> WindowState {
        match self.script.windows.iter().position(|w| w.name == name) {
            Some(i) => self.states[i],
            None => {
                debug_assert!(false, "unknown window {name:?}");
                WindowState::IDLE
            }
        }
    }

    pub fn states(&self) -> &[WindowState] {
        &self.states
    }
}

pub struct ScriptBuilder {
    script: PhaseScript,
    cursor: f32,
}

impl ScriptBuilder {
    /// Time at which the next window will start.
    pub fn cursor(&self) -> f32 {
        self.cursor
    }

    /// Starts a new narrative segment at the cursor.
    pub fn commentary(&mut self, text: &'static str) -> &mut Self {
        self.script.commentary.push(Commentary {
            start: self.cursor,
            text,
        });
        self
    }

    pub fn window(&mut self, name: &'static str, duration: f32) -> &mut Self {
        self.push(name, duration, 0.0, 0.0)
    }

    pub fn window_held(&mut self, name: &'static str, duration: f32, hold: f32) -> &mut Self {
        self.push(name, duration, hold, 0.0)
    }

    /// Starts `overlap` seconds before the previous window finishes.
    pub fn window_overlapping(
        &mut self,
        name: &'static str,
        duration: f32,
        overlap: f32,
    ) -> &mut Self {
        self.push(name, duration, 0.0, overlap)
    }

    fn push(&mut self, name: &'static str, duration: f32, hold: f32, overlap: f32) -> &mut Self {
        debug_assert!(
            self.script.windows.iter().all(|w| w.name != name),
            "window {name:?} registered twice"
        );
        let floor = self.script.windows.last().map_or(0.0, |w| w.start);
        let start = (self.cursor - overlap.max(0.0)).max(floor);
        let spec = WindowSpec {
            name,
            start,
            duration: duration.max(0.0),
            hold: hold.max(0.0),
        };
        self.cursor = self.cursor.max(spec.end() + spec.hold);
        self.script.length = self.cursor;
        self.script.windows.push(spec);
        self
    }

    /// Stops forward playback at the cursor.
    pub fn break_after(&mut self) -> &mut Self {
        let at = self.cursor;
        if self.script.breakpoints.last() != Some(&at) && at > 0.0 {
            self.script.breakpoints.push(at);
        }
        self
    }

    /// Once `trigger` starts, every window in `targets` reads as idle.
    pub fn cleanup(&mut self, trigger: &str, targets: &[&str]) -> &mut Self {
        let index = |name: &str| {
            let found = self.script.windows.iter().position(|w| w.name == name);
            debug_assert!(found.is_some(), "unknown window {name:?}");
            found
        };
        let Some(trigger) = index(trigger) else {
            return self;
        };
        let targets = targets.iter().filter_map(|t| index(t)).collect();
        self.script.cleanups.push(Cleanup { trigger, targets });
        self
    }

    pub fn camera_move(&mut self, window: &str, to: CameraState, easing: Easing) -> &mut Self {
        let found = self.script.windows.iter().position(|w| w.name == window);
        debug_assert!(found.is_some(), "unknown window {window:?}");
        if let Some(window) = found {
            self.script.moves.push(CameraMove { window, to, easing });
        }
        self
    }

    pub fn build(&mut self) -> PhaseScript {
        let mut script = self.script.clone();
        script.length = self.cursor;
        script
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::Vec3;

    fn script() -> PhaseScript {
        let mut b = PhaseScript::builder(CameraState::default());
        b.commentary("first")
            .window("a", 1.0)
            .window_held("b", 2.0, 1.0)
            .break_after()
            .commentary("second")
            .window("c", 0.0)
            .window_overlapping("d", 1.0, 0.5)
            .cleanup("c", &["a"]);
        b.build()
    }

    #[test]
    fn windows_start_after_previous_ones() {
        let s = script();
        let starts: Vec<f32> = s.windows().iter().map(|w| w.start).collect();
        assert_eq!(starts, vec![0.0, 1.0, 4.0, 4.0]);
        assert_eq!(s.length(), 5.0);
        assert_eq!(s.breakpoints(), &[4.0]);
    }

    #[test]
    fn hold_keeps_window_active_at_one() {
        let s = script();
        let w = s.evaluate(3.5);
        assert_eq!(w.get("b"), WindowState { t: 1.0, active: true });
        assert!(!w.get("c").started());
        let later = s.evaluate(4.2);
        assert!(!later.get("b").active);
    }

    #[test]
    fn zero_duration_window_fires_at_start() {
        let s = script();
        assert_eq!(s.evaluate(3.99).get("c").t, 0.0);
        assert_eq!(s.evaluate(4.0).get("c").t, 1.0);
    }

    #[test]
    fn cleanup_resets_targets() {
        let s = script();
        assert_eq!(s.evaluate(3.0).get("a").t, 1.0);
        assert_eq!(s.evaluate(4.5).get("a"), WindowState::IDLE);
    }

    #[test]
    fn commentary_follows_segments() {
        let s = script();
        assert_eq!(s.commentary_at(0.0), Some("first"));
        assert_eq!(s.commentary_at(3.9), Some("first"));
        assert_eq!(s.commentary_at(4.0), Some("second"));
    }

    #[test]
    fn camera_moves_chain_from_previous_destination() {
        let start = CameraState::default();
        let mid = CameraState::new(Vec3::new(10.0, 0.0, 0.0), 30.0, 10.0, 2.0);
        let end = CameraState::new(Vec3::new(10.0, -10.0, 0.0), 60.0, 10.0, 1.0);
        let mut b = PhaseScript::builder(start);
        b.window("m1", 1.0)
            .window("m2", 1.0)
            .camera_move("m1", mid, Easing::Linear)
            .camera_move("m2", end, Easing::Linear);
        let s = b.build();

        assert_eq!(s.camera(&s.evaluate(0.0)), start);
        assert_eq!(s.camera(&s.evaluate(1.0)), mid);
        assert_eq!(s.camera(&s.evaluate(1.5)), mid.lerp(&end, 0.5));
        assert_eq!(s.camera(&s.evaluate(9.0)), end);
    }

    #[test]
    fn next_breakpoint_is_exclusive_of_start() {
        let s = script();
        assert_eq!(s.next_breakpoint(3.0, 4.5), Some(4.0));
        assert_eq!(s.next_breakpoint(4.0, 4.5), None);
    }
}
