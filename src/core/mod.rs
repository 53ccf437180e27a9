//! Core library modules for butterfly-cells
//!
//! This module contains the internal implementation details of the butterfly-cells library.

pub mod cell_id;
pub mod converter;
pub mod covering;
pub mod error;
pub mod intersect;
pub mod stream;

// Re-export main types for internal use
pub use cell_id::{CellId, CellOrder, LevelOrder, PreOrder, RectId, RECT_ID_DEPTH};
pub use converter::{Bounds, CellIdConverter};
pub use covering::Covering;
pub use stream::{StreamOptions, StreamSimplifier};
