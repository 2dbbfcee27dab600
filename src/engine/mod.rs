pub mod retry;
pub mod state_engine;

pub use retry::{RetryEvent, RetryScheduler};
pub use state_engine::{classify_sweep, ResolutionState, StateEngine};
