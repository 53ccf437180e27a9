//! # Butterfly-cells Library
//!
//! Quadtree cell indexing for map features.
//!
//! Features are indexed by the quadtree cells that cover their geometry. This
//! library provides the cell identifiers and their stable pre-order integer
//! keys, coverings of triangles, segments and points, covering simplification,
//! and a bounded-memory simplifier for sorted `(key, value)` index streams.
//!
//! ## Quick Start
//!
//! ```rust
//! use butterfly_cells::{Covering, RectId, CellIdConverter};
//! use geo::Coord;
//!
//! let converter = CellIdConverter::<19>::default();
//! let a = converter.to_cell_space(Coord { x: 4.30, y: 50.80 });
//! let b = converter.to_cell_space(Coord { x: 4.45, y: 50.80 });
//! let c = converter.to_cell_space(Coord { x: 4.30, y: 50.90 });
//!
//! let mut covering = Covering::<19>::from_triangle(a, b, c, 12);
//! covering.simplify(0);
//! let keys = covering.to_int64_vec(19);
//! assert!(!keys.is_empty());
//!
//! let cell: RectId = "0123".parse().unwrap();
//! assert_eq!(RectId::from_int64(cell.to_int64(19), 19), cell);
//! ```

mod core;

// Re-export public API
pub use crate::core::cell_id::{perfect_shuffle, perfect_unshuffle, tree_size_for_depth};
pub use crate::core::error::{Error, Result};
pub use crate::core::intersect::{
    cover_object, intersect_cell_with_line, intersect_cell_with_triangle, subdivide,
    CellObjectIntersection,
};
pub use crate::core::stream::{optimize, try_optimize};
pub use crate::core::{
    Bounds, CellId, CellIdConverter, CellOrder, Covering, LevelOrder, PreOrder, RectId,
    StreamOptions, StreamSimplifier, RECT_ID_DEPTH,
};
