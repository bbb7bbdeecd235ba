//! Upstream usage API access

pub mod claude;
mod traits;

pub use claude::ClaudeUsageApi;
pub use traits::*;
