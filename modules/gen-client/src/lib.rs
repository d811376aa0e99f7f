pub mod error;
pub mod executor;
pub mod keys;
pub mod parse;
pub mod provider;
pub mod resilience;
pub mod types;

pub use error::GenError;
pub use executor::{Executor, RetryPolicy};
pub use keys::KeyPool;
pub use provider::{GenProvider, HttpProvider};
pub use resilience::ResilienceContext;
pub use types::{Capability, RequestSpec};
