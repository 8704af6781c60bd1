//! photoscroll
//!
//! Virtual-scrolling layout and fetch engine for very large media collections.
//!
//! Items are grouped into fixed-capacity rows, laid out with justified line
//! breaking, and fetched lazily as the viewport approaches them. Row heights
//! start nominal and are corrected in O(log n) once measured, keeping the
//! visible content in place.
//!
//! # Module Structure
//!
//! - `model`: identifiers, geometry, wire formats, and errors
//! - `view_state`: justification, offset ledger, row cache, viewport reconciliation
//! - `fetch`: debounced row and batch scheduling
//! - `auth`: token lifecycle and renewal coalescing
//! - `worker`: request protocol, remote service, and the background job loop
//! - `engine`: one isolation context tying all of the above together
//! - `config`, `logging`: ambient setup for the simulator binary

pub mod auth;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod logging;
pub mod model;
pub mod view_state;
pub mod worker;
