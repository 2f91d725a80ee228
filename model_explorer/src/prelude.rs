//! Minimal prelude for SDK consumers.

pub use crate::config::{explorer_config, ExplorerConfig};
pub use crate::data::{ChromeFeed, ModelWeights, WalkthroughSnapshot};
pub use crate::error::ConfigError;
pub use crate::layout::{build_layout, ModelLayout, ModelShape};
pub use crate::sdk::ModelExplorerBuilder;
pub use crate::walkthrough::{Phase, Walkthrough, WalkthroughChanged};
