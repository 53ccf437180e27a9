//! Normalized cell coverings
//!
//! A [`Covering`] keeps one sorted, duplicate-free vector of cells per level.
//! Every constructor and every mutation leaves it normalized:
//!
//! 1. each level is sorted by [`LevelOrder`] with no duplicates;
//! 2. no cell is an ancestor of another cell in the covering;
//! 3. no level holds all four children of a parent whose pre-order key is at
//!    or above the `min_id` floor passed to the operation.
//!
//! The floor protects key ranges already published to map-data files: cells
//! whose parent key falls below it are never merged into that parent.

use std::cmp::Ordering;

use geo::Coord;
use log::debug;

use crate::core::cell_id::{CellId, CellOrder, LevelOrder};
use crate::core::intersect::{
    cover_object, intersect_cell_with_line, intersect_cell_with_triangle, subdivide,
    CellObjectIntersection,
};

/// Set of quadtree cells covering some geometry, grouped by level
#[derive(Clone, PartialEq, Eq)]
pub struct Covering<const DEPTH: u32> {
    levels: Vec<Vec<CellId<DEPTH>>>,
    size: usize,
}

impl<const DEPTH: u32> Default for Covering<DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const DEPTH: u32> std::fmt::Debug for Covering<DEPTH> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<const DEPTH: u32> Covering<DEPTH> {
    /// Empty covering
    pub fn new() -> Self {
        Self {
            levels: vec![Vec::new(); DEPTH as usize],
            size: 0,
        }
    }

    /// Covering made of a single cell
    pub fn from_cell(cell: CellId<DEPTH>) -> Self {
        let mut covering = Self::new();
        covering.levels[cell.level() as usize].push(cell);
        covering.size = 1;
        covering
    }

    /// Normalize an arbitrary list of cells
    ///
    /// Duplicates and cells already covered by an ancestor in the list are
    /// dropped; complete sibling quadruples are merged into their parent
    /// unless the parent key is below `min_id`.
    pub fn from_cells(cells: &[CellId<DEPTH>], min_id: i64) -> Self {
        let mut covering = Self::new();
        for cell in cells {
            covering.levels[cell.level() as usize].push(*cell);
        }
        covering.sort_and_dedup();
        covering.normalize(min_id);
        covering
    }

    /// Cells up to `level` covering the triangle `(a, b, c)` given in cell space
    pub fn from_triangle(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>, level: u32) -> Self {
        let mut cells = Vec::new();
        subdivide(&|cell: &CellId<DEPTH>| intersect_cell_with_triangle(cell, a, b, c), level, &mut cells);
        Self::from_cells(&cells, 0)
    }

    /// Union of the triangle coverings of a triangulated polygon
    pub fn from_triangles<I>(triangles: I, level: u32) -> Self
    where
        I: IntoIterator<Item = [Coord<f64>; 3]>,
    {
        let mut covering = Self::new();
        for [a, b, c] in triangles {
            covering.append(&Self::from_triangle(a, b, c, level));
        }
        covering
    }

    /// Cells up to `level` covering the segment `(a, b)` given in cell space
    pub fn from_segment(a: Coord<f64>, b: Coord<f64>, level: u32) -> Self {
        let mut cells = Vec::new();
        subdivide(&|cell: &CellId<DEPTH>| intersect_cell_with_line(cell, a, b), level, &mut cells);
        Self::from_cells(&cells, 0)
    }

    /// The cell at `level` containing a point given in cell space
    ///
    /// Points outside the square are clamped onto its edge.
    pub fn from_point(p: Coord<f64>, level: u32) -> Self {
        let max = f64::from(CellId::<DEPTH>::MAX_COORD);
        let x = p.x.clamp(0.0, max) as u32;
        let y = p.y.clamp(0.0, max) as u32;
        Self::from_cell(CellId::from_xy(x, y, level))
    }

    /// Area-penalized covering of any object that can classify cells
    ///
    /// See [`cover_object`] for how `cell_penalty_area` trades cell count for
    /// precision.
    pub fn from_object<F>(intersect: F, cell_penalty_area: u64, cell_depth: u32) -> Self
    where
        F: Fn(&CellId<DEPTH>) -> CellObjectIntersection,
    {
        let mut cells = Vec::new();
        cover_object(&intersect, cell_penalty_area, cell_depth, &mut cells);
        Self::from_cells(&cells, 0)
    }

    /// Total number of cells across all levels
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Sorted cells stored at `level`
    pub fn level_cells(&self, level: u32) -> &[CellId<DEPTH>] {
        &self.levels[level as usize]
    }

    /// All cells in level order
    pub fn iter(&self) -> impl Iterator<Item = &CellId<DEPTH>> + '_ {
        self.levels.iter().flatten()
    }

    /// Whether `cell` lies inside some cell of the covering
    pub fn covers(&self, cell: &CellId<DEPTH>) -> bool {
        (0..=cell.level()).any(|level| {
            let ancestor = cell.ancestor_at_level(level);
            self.levels[level as usize]
                .binary_search_by(|c| LevelOrder::compare(c, &ancestor))
                .is_ok()
        })
    }

    /// Union with `other`
    ///
    /// The whole structure is renormalized: merged levels can introduce new
    /// ancestor pairs and new sibling quadruples spanning old and new cells.
    pub fn append(&mut self, other: &Covering<DEPTH>) {
        for (level, cells) in other.levels.iter().enumerate() {
            merge_into(&mut self.levels[level], cells);
        }
        self.normalize(0);
    }

    /// Trade precision for fewer cells
    ///
    /// From the deepest level up to level 2, siblings that share a parent
    /// (two or more of them) are replaced by that parent, unless the parent
    /// key is below `min_id`. Stops once more than half of the initial cells
    /// were eliminated.
    pub fn simplify(&mut self, min_id: i64) {
        let initial_size = self.size;
        let mut simplified = 0usize;

        for level in (2..DEPTH).rev() {
            let level_size = self.levels[level as usize].len();
            if level_size < 2 {
                continue;
            }
            self.simplify_level(level, min_id);
            simplified += level_size - self.levels[level as usize].len();
            if simplified > initial_size / 2 {
                debug!("Simplify stopped at level {level}: {simplified} of {initial_size} cells merged");
                break;
            }
        }

        self.normalize(min_id);
        debug!("Simplified covering from {initial_size} to {} cells", self.size);
    }

    /// Flatten to cells, grouped by level
    pub fn to_cell_vec(&self) -> Vec<CellId<DEPTH>> {
        self.iter().copied().collect()
    }

    /// Flatten to pre-order keys at `depth`, grouped by level
    ///
    /// The keys are NOT globally sorted: callers needing one increasing
    /// sequence must sort the result.
    pub fn to_int64_vec(&self, depth: u32) -> Vec<i64> {
        self.iter().map(|cell| cell.to_int64(depth)).collect()
    }

    fn sort_and_dedup(&mut self) {
        for cells in &mut self.levels {
            cells.sort_unstable_by(|a, b| LevelOrder::compare(a, b));
            cells.dedup();
        }
    }

    fn normalize(&mut self, min_id: i64) {
        self.remove_duplicate_children();
        self.remove_full_squares(min_id);
        self.size = self.calculate_size();
        self.debug_check_invariants(min_id);
    }

    fn calculate_size(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Replace every parent with two or more children present at `level`
    fn simplify_level(&mut self, level: u32, min_id: i64) {
        let cells = std::mem::take(&mut self.levels[level as usize]);
        let mut parents = Vec::new();
        let mut children = Vec::with_capacity(cells.len());

        // Siblings are adjacent in level order
        for siblings in cells.chunk_by(|a, b| a.parent() == b.parent()) {
            let parent = siblings[0].parent();
            if siblings.len() > 1 && parent.to_int64(DEPTH) >= min_id {
                parents.push(parent);
            } else {
                children.extend_from_slice(siblings);
            }
        }

        self.levels[level as usize] = children;
        merge_into(&mut self.levels[level as usize - 1], &parents);
    }

    /// Drop every cell that has an ancestor in the covering
    fn remove_duplicate_children(&mut self) {
        let depth = self.levels.len();
        for parent_level in 0..depth.saturating_sub(1) {
            if self.levels[parent_level].is_empty() {
                continue;
            }
            let (upper, lower) = self.levels.split_at_mut(parent_level + 1);
            let parents = &upper[parent_level];
            for children in lower.iter_mut() {
                subtract_descendants(children, parents, parent_level as u32);
            }
        }
    }

    /// Merge complete sibling quadruples into their parent, deepest level first
    fn remove_full_squares(&mut self, min_id: i64) {
        for level in (0..self.levels.len()).rev() {
            let cells = std::mem::take(&mut self.levels[level]);
            let mut kept = Vec::with_capacity(cells.len());
            let mut parents = Vec::new();

            let mut i = 0;
            while i < cells.len() {
                if i + 3 < cells.len() {
                    let parent = cells[i].parent();
                    if cells[i + 1..i + 4].iter().all(|c| c.parent() == parent)
                        && parent.to_int64(DEPTH) >= min_id
                    {
                        parents.push(parent);
                        i += 4;
                        continue;
                    }
                }
                kept.push(cells[i]);
                i += 1;
            }

            self.levels[level] = kept;
            if level > 0 {
                merge_into(&mut self.levels[level - 1], &parents);
            } else {
                debug_assert!(parents.is_empty());
            }
        }
    }

    fn debug_check_invariants(&self, min_id: i64) {
        if !cfg!(debug_assertions) {
            return;
        }
        assert_eq!(self.size, self.calculate_size(), "covering size out of sync");
        for (level, cells) in self.levels.iter().enumerate() {
            for pair in cells.windows(2) {
                assert_eq!(
                    LevelOrder::compare(&pair[0], &pair[1]),
                    Ordering::Less,
                    "level {level} not sorted and unique"
                );
            }
            for cell in cells {
                assert_eq!(cell.level() as usize, level, "{cell:?} stored at level {level}");
                for ancestor_level in 0..cell.level() {
                    let ancestor = cell.ancestor_at_level(ancestor_level);
                    assert!(
                        self.levels[ancestor_level as usize]
                            .binary_search_by(|c| LevelOrder::compare(c, &ancestor))
                            .is_err(),
                        "{cell:?} is covered twice"
                    );
                }
            }
            for square in cells.windows(4) {
                let parent = square[0].parent();
                assert!(
                    !(square.iter().all(|c| c.parent() == parent) && parent.to_int64(DEPTH) >= min_id),
                    "full square left under {parent:?}"
                );
            }
        }
    }
}

/// Sorted set union of `b` into `a`
fn merge_into<const DEPTH: u32>(a: &mut Vec<CellId<DEPTH>>, b: &[CellId<DEPTH>]) {
    if b.is_empty() {
        return;
    }
    let left = std::mem::take(a);
    let mut merged = Vec::with_capacity(left.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < b.len() {
        match LevelOrder::compare(&left[i], &b[j]) {
            Ordering::Less => {
                merged.push(left[i]);
                i += 1;
            }
            Ordering::Greater => {
                merged.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                merged.push(left[i]);
                i += 1;
                j += 1;
            }
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&b[j..]);
    *a = merged;
}

/// Remove from `children` every cell whose ancestor at `parent_level` is in
/// `parents`
///
/// Both slices are sorted, and projecting sorted cells onto a shallower level
/// keeps them sorted, so one merge pass suffices. Unlike a plain set
/// difference, one parent removes any number of children.
fn subtract_descendants<const DEPTH: u32>(
    children: &mut Vec<CellId<DEPTH>>,
    parents: &[CellId<DEPTH>],
    parent_level: u32,
) {
    let mut p = 0;
    children.retain(|child| {
        let ancestor = child.ancestor_at_level(parent_level);
        while p < parents.len() && LevelOrder::compare(&parents[p], &ancestor) == Ordering::Less {
            p += 1;
        }
        !(p < parents.len() && parents[p] == ancestor)
    });
}
