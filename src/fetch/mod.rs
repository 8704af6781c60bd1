//! Fetch scheduling - debounced row and batch requests
//!
//! # Module Structure
//!
//! - `ring`: BatchWindow - bounded FIFO of in-flight batches
//! - `debounce`: Debouncer - wait / max-wait cadence
//! - `scheduler`: FetchScheduler - request planning and de-duplication

pub mod debounce;
pub mod ring;
pub mod scheduler;

pub use debounce::Debouncer;
pub use ring::BatchWindow;
pub use scheduler::{FetchCommand, FetchContext, FetchScheduler, SchedulerConfig};
