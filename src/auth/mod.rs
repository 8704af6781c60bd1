//! Short-lived credential handling.
//!
//! - `token`: Token decoding and TokenClass
//! - `manager`: TokenManager - lifecycle state machine and renewal coalescing
//! - `store`: TokenStore - durable cache of token values

pub mod manager;
pub mod store;
pub mod token;

pub use manager::{Acquire, RenewCall, TokenManager, TokenState};
pub use store::{JsonFileTokenStore, MemoryTokenStore, StoreError, TokenStore};
pub use token::{Token, TokenClass};
