//! View-state layer - layout, measurement, and viewport management
//!
//! Everything here is pure and synchronous: callers pass in rows, widths, and
//! instants, and get back layouts, offsets, and windows.
//!
//! # Module Structure
//!
//! - `types`: Core newtypes (ContainerWidth, AspectRatio, ViewportDimensions)
//! - `justify`: Justified row layout with minimum-badness line breaking
//! - `layout_params`: LayoutKey - invalidation key for measurements
//! - `offset_ledger`: OffsetLedger - O(log n) row offsets via Fenwick tree
//! - `row_cache`: RowCache - realized rows for the current key
//! - `scroll`: ScrollBounds and ScrollClamp - clamping and touch lock
//! - `viewport`: ViewportReconciler - visible window and scroll correction

pub mod justify;
pub mod layout_params;
pub mod offset_ledger;
pub mod row_cache;
pub mod scroll;
pub mod types;
pub mod viewport;
