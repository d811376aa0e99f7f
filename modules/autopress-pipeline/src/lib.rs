pub mod adapters;
pub mod assets;
pub mod audit;
pub mod embedder;
pub mod evidence;
#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;
pub mod memory;
pub mod pipeline;
pub mod plan;
pub mod store;
pub mod synthesis;

pub use pipeline::{Pipeline, RunOutcome, RunStats};
