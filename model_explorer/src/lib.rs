//! Transformer walkthrough: a small GPT laid out as 3D blocks of cells, explained phase by
//! phase with scripted camera moves, cell highlights and particles flowing along dependencies.
//!
//! Library root: layout, walkthrough engine, rendering, UI and the SDK builder.

pub mod camera;
pub mod config;
pub mod data;
pub mod error;
pub mod layout;
pub mod particles;
pub mod render;
pub mod scene;
mod ui;
pub mod walkthrough;

pub mod prelude;
pub mod sdk;

pub use error::ConfigError;
pub use sdk::ModelExplorerBuilder;
