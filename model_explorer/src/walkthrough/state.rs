use bevy::prelude::Resource;

use super::phase::{phase_groups, Phase, PhaseGroup};
use super::timeline::PhaseScript;
use crate::data::WalkthroughSnapshot;

/// Playback speed multipliers offered by the UI.
pub const SPEEDS: [f32; 5] = [0.25, 0.5, 1.0, 2.0, 4.0];

/// What one call to [`Walkthrough::advance`] did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Advance {
    Paused,
    Playing,
    /// Stopped on a breakpoint at the given time.
    Breakpoint(f32),
    /// Reached the end of the phase.
    Finished,
}

/// Walkthrough position: which phase, how far into it, and how fast time moves.
#[derive(Resource, Clone, Debug, PartialEq)]
pub struct Walkthrough {
    phase: Phase,
    time: f32,
    length: f32,
    speed: f32,
    running: bool,
    pub autoplay: bool,
    groups: Vec<PhaseGroup>,
    /// Bumped on every transition so observers can rebuild per-phase state.
    epoch: u64,
}

impl Default for Walkthrough {
    fn default() -> Self {
        Self::new(Phase::Intro)
    }
}

impl Walkthrough {
    pub fn new(start: Phase) -> Self {
        Self {
            phase: start,
            time: 0.0,
            length: 0.0,
            speed: 1.0,
            running: false,
            autoplay: false,
            groups: phase_groups(),
            epoch: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn phase_length(&self) -> f32 {
        self.length
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn groups(&self) -> &[PhaseGroup] {
        &self.groups
    }

    /// Called once the new phase's script is known.
    pub fn set_phase_length(&mut self, length: f32) {
        self.length = length.max(0.0);
        self.time = self.time.min(self.length);
    }

    pub fn jump_to(&mut self, phase: Phase) {
        self.phase = phase;
        self.time = 0.0;
        self.running = self.autoplay;
        self.epoch += 1;
    }

    /// Returns false when already on the last phase.
    pub fn next(&mut self) -> bool {
        match Phase::from_index(self.phase.index() + 1) {
            Some(p) => {
                self.jump_to(p);
                true
            }
            None => {
                self.running = false;
                false
            }
        }
    }

    pub fn prev(&mut self) -> bool {
        match self.phase.index().checked_sub(1).and_then(Phase::from_index) {
            Some(p) => {
                self.jump_to(p);
                true
            }
            None => false,
        }
    }

    pub fn restart(&mut self) {
        self.jump_to(self.phase);
    }

    /// Play/pause. Playing from the end of a phase moves on to the next one.
    pub fn toggle(&mut self) {
        if self.running {
            self.running = false;
        } else if self.length > 0.0 && self.time >= self.length {
            if self.next() {
                self.running = true;
            }
        } else {
            self.running = true;
        }
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed.max(0.0);
    }

    /// Steps through [`SPEEDS`]; `up` picks the next faster entry.
    pub fn step_speed(&mut self, up: bool) {
        let current = SPEEDS
            .iter()
            .position(|&s| s >= self.speed)
            .unwrap_or(SPEEDS.len() - 1);
        let next = if up {
            (current + 1).min(SPEEDS.len() - 1)
        } else {
            current.saturating_sub(1)
        };
        self.speed = SPEEDS[next];
    }

    /// Moves time forward by `dt * speed`, stopping on breakpoints and at the end of the phase.
    pub fn advance(&mut self, dt: f32, script: &PhaseScript) -> Advance {
        if !self.running {
            return Advance::Paused;
        }
        let length = script.length();
        let to = (self.time + dt.max(0.0) * self.speed).min(length);
        if let Some(at) = script.next_breakpoint(self.time, to) {
            self.time = at;
            self.running = false;
            return Advance::Breakpoint(at);
        }
        self.time = to;
        if self.time >= length {
            self.running = false;
            return Advance::Finished;
        }
        Advance::Playing
    }

    /// Sets elapsed time directly; everything downstream is re-derived from it.
    pub fn scrub(&mut self, time: f32) {
        self.time = time.clamp(0.0, self.length);
    }

    /// Whole-walkthrough progress in [0, 1].
    pub fn progress(&self) -> f32 {
        let frac = if self.length > 0.0 {
            self.time / self.length
        } else {
            0.0
        };
        (self.phase.index() as f32 + frac) / Phase::ALL.len() as f32
    }

    pub fn snapshot(&self) -> WalkthroughSnapshot {
        WalkthroughSnapshot {
            phase: self.phase,
            time: self.time,
            phase_length: self.length,
            running: self.running,
            speed: self.speed,
            progress: self.progress(),
        }
    }
}
