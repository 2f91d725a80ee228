mod channel;
mod weights;

pub use channel::{ChromeFeed, WalkthroughSnapshot};
pub use weights::{ModelWeights, EXAMPLE_TOKENS};
