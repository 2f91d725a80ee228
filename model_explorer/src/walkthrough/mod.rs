//! Phase-based walkthrough: a state machine over [`Phase`] whose every frame is a pure
//! function of the current phase and the time elapsed in it.

pub mod engine;
mod input;
pub mod overlay;
mod phase;
mod phases;
mod state;
mod systems;
pub mod timeline;

pub use engine::{PhaseFrame, PhaseHandler, PhaseRegistry, WalkthroughEngine};
pub use overlay::{FrameOverlay, SpanHighlight};
pub use phase::{phase_groups, Phase, PhaseGroup, PhaseGroupId};
pub use state::{Advance, Walkthrough, SPEEDS};
pub use systems::{walkthrough_plugin, CurrentFrame, FrameSet, WalkthroughChanged};
pub use timeline::{PhaseScript, ScriptBuilder, WindowSpec, WindowState, Windows};
