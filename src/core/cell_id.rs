//! Quadtree cell identifiers
//!
//! A [`CellId`] names one node of a fixed-depth quadtree laid over the integer
//! square `[0, 2^DEPTH) x [0, 2^DEPTH)`. Each level below the root picks one of
//! four quadrants and appends two bits to the id, so a cell at `level` carries
//! `2 * level` significant bits.
//!
//! Quadrant numbering interleaves coordinate bits (x in the low bit, y in the
//! high bit):
//!
//! ```text
//!  y
//!  ^  +---+---+
//!  |  | 2 | 3 |
//!  |  +---+---+
//!  |  | 0 | 1 |
//!  |  +---+---+
//!  +-----------> x
//! ```
//!
//! ## Storage keys
//!
//! [`CellId::to_int64`] numbers the cells of a full tree of a given depth in
//! pre-order (a parent before its children, children in quadrant order),
//! starting at 1 for the root. These keys are written to map-data files and
//! must never change.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::core::error::{Error, Result};

/// Depth of the cell tree used by the feature index
pub const RECT_ID_DEPTH: u32 = 19;

/// Cell id used by the feature index
pub type RectId = CellId<RECT_ID_DEPTH>;

/// Spread the 32 bits of `v` over the even bits of a `u64`
fn spread_bits(v: u32) -> u64 {
    let mut v = u64::from(v);
    v = (v | (v << 16)) & 0x0000_FFFF_0000_FFFF;
    v = (v | (v << 8)) & 0x00FF_00FF_00FF_00FF;
    v = (v | (v << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    v = (v | (v << 2)) & 0x3333_3333_3333_3333;
    (v | (v << 1)) & 0x5555_5555_5555_5555
}

/// Gather the even bits of `v` into a `u32`
fn compact_bits(v: u64) -> u32 {
    let mut v = v & 0x5555_5555_5555_5555;
    v = (v | (v >> 1)) & 0x3333_3333_3333_3333;
    v = (v | (v >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    v = (v | (v >> 4)) & 0x00FF_00FF_00FF_00FF;
    v = (v | (v >> 8)) & 0x0000_FFFF_0000_FFFF;
    v = (v | (v >> 16)) & 0x0000_0000_FFFF_FFFF;
    v as u32
}

/// Interleave `x` (even bits) and `y` (odd bits) into one Morton code
pub fn perfect_shuffle(x: u32, y: u32) -> u64 {
    spread_bits(x) | (spread_bits(y) << 1)
}

/// Inverse of [`perfect_shuffle`]
pub fn perfect_unshuffle(bits: u64) -> (u32, u32) {
    (compact_bits(bits), compact_bits(bits >> 1))
}

/// Number of nodes in a full quadtree with `depth` levels: `(4^depth - 1) / 3`
pub const fn tree_size_for_depth(depth: u32) -> i64 {
    (((1u64 << (2 * depth)) - 1) / 3) as i64
}

/// One node of a quadtree with `DEPTH` levels
///
/// Level 0 is the root covering the whole square; the deepest level is
/// `DEPTH - 1`. Cell ids are plain values: copy them freely.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId<const DEPTH: u32> {
    bits: u64,
    level: u32,
}

impl<const DEPTH: u32> CellId<DEPTH> {
    /// Number of levels in the tree
    pub const DEPTH_LEVELS: u32 = DEPTH;

    /// Side of the coordinate square
    pub const MAX_COORD: u32 = 1 << DEPTH;

    const SUPPORTED_DEPTH: () = assert!(DEPTH >= 1 && DEPTH <= 31, "cell tree depth must be in 1..=31");

    fn new(bits: u64, level: u32) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::SUPPORTED_DEPTH;
        let cell = Self { bits, level };
        assert!(cell.is_valid(), "invalid cell: bits {bits} at level {level} (depth {DEPTH})");
        cell
    }

    /// The whole coordinate square
    pub fn root() -> Self {
        Self::new(0, 0)
    }

    /// Build a cell from raw quadrant bits; panics unless `bits < 4^level`
    pub fn from_bits_and_level(bits: u64, level: u32) -> Self {
        Self::new(bits, level)
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn is_valid(&self) -> bool {
        self.level < DEPTH && self.bits < (1u64 << (2 * self.level))
    }

    pub fn is_root(&self) -> bool {
        self.level == 0
    }

    /// Cell one level up
    pub fn parent(&self) -> Self {
        assert!(self.level > 0, "root cell has no parent");
        Self::new(self.bits >> 2, self.level - 1)
    }

    /// Ancestor at `level`, or the cell itself when `level == self.level()`
    pub fn ancestor_at_level(&self, level: u32) -> Self {
        assert!(level <= self.level, "ancestor level {level} below cell level {}", self.level);
        Self::new(self.bits >> (2 * (self.level - level)), level)
    }

    /// Quadrant `index` (0..4) of this cell
    pub fn child(&self, index: u8) -> Self {
        assert!(index < 4, "child index {index} out of range");
        assert!(self.level + 1 < DEPTH, "cell at level {} has no children", self.level);
        Self::new((self.bits << 2) | u64::from(index), self.level + 1)
    }

    /// Quadrant index used when this cell was created from its parent
    pub fn which_child_of_parent(&self) -> u8 {
        assert!(self.level > 0, "root cell is nobody's child");
        (self.bits & 3) as u8
    }

    /// True when `other` is this cell or one of its descendants
    pub fn contains(&self, other: &Self) -> bool {
        other.level >= self.level && other.ancestor_at_level(self.level) == *self
    }

    /// Half the side of this cell's square
    pub fn radius(&self) -> u32 {
        1 << (DEPTH - 1 - self.level)
    }

    /// Integer center of this cell's square
    pub fn xy(&self) -> (u32, u32) {
        let offset = self.radius();
        let shift = DEPTH - self.level;
        let (x, y) = perfect_unshuffle(self.bits);
        ((x << shift) + offset, (y << shift) + offset)
    }

    /// Cell at `level` containing the integer point `(x, y)`
    ///
    /// Coordinates equal to [`Self::MAX_COORD`] sit on the far edge of the
    /// square and are clamped into the last cell.
    pub fn from_xy(x: u32, y: u32, level: u32) -> Self {
        assert!(level < DEPTH, "level {level} outside 0..{DEPTH}");
        assert!(
            x <= Self::MAX_COORD && y <= Self::MAX_COORD,
            "({x}, {y}) outside the cell square"
        );
        let x = x.min(Self::MAX_COORD - 1);
        let y = y.min(Self::MAX_COORD - 1);
        let shift = DEPTH - level;
        Self::new(perfect_shuffle(x >> shift, y >> shift), level)
    }

    /// Validating variant of [`Self::from_xy`]
    pub fn try_from_xy(x: u32, y: u32, level: u32) -> Result<Self> {
        if level >= DEPTH {
            return Err(Error::InvalidLevel { level, max: DEPTH });
        }
        if x > Self::MAX_COORD || y > Self::MAX_COORD {
            return Err(Error::CoordinateOutOfRange {
                x,
                y,
                max: Self::MAX_COORD,
            });
        }
        Ok(Self::from_xy(x, y, level))
    }

    /// Whether `s` is a well-formed digit string for this depth
    pub fn is_cell_id(s: &str) -> bool {
        s.len() < DEPTH as usize && s.bytes().all(|b| (b'0'..=b'3').contains(&b))
    }

    /// Nodes in the subtree under this cell, counted down to `depth` levels
    pub fn sub_tree_size(&self, depth: u32) -> i64 {
        assert!(
            self.level < depth && depth <= DEPTH,
            "sub tree depth {depth} invalid for level {}",
            self.level
        );
        tree_size_for_depth(depth - self.level)
    }

    /// Pre-order key of this cell in a full tree of `depth` levels
    ///
    /// Cells at or below `depth` are clamped to their ancestor at `depth - 1`.
    /// The result lies in `[1, tree_size_for_depth(depth)]`.
    pub fn to_int64(&self, depth: u32) -> i64 {
        assert!(depth > 0 && depth <= DEPTH, "key depth {depth} outside 1..={DEPTH}");
        if self.level >= depth {
            return self.ancestor_at_level(depth - 1).to_int64(depth);
        }

        // Every ancestor (and the cell itself) contributes its own bits plus one
        let mut key = 0u64;
        let mut bits = self.bits;
        for _ in 0..=self.level {
            key += bits + 1;
            bits >>= 2;
        }

        // Skip the subtrees of the preceding siblings on every level below
        let mut bits = self.bits;
        for _ in self.level + 1..depth {
            bits <<= 2;
            key += bits;
        }

        debug_assert!(key > 0 && key as i64 <= tree_size_for_depth(depth));
        key as i64
    }

    /// Inverse of [`Self::to_int64`]; panics on keys outside the tree
    pub fn from_int64(key: i64, depth: u32) -> Self {
        assert!(depth > 0 && depth <= DEPTH, "key depth {depth} outside 1..={DEPTH}");
        assert!(
            key > 0 && key <= tree_size_for_depth(depth),
            "key {key} outside the tree of depth {depth}"
        );
        Self::decode_int64(key, depth)
    }

    /// Validating variant of [`Self::from_int64`] for keys read from storage
    pub fn try_from_int64(key: i64, depth: u32) -> Result<Self> {
        if depth == 0 || depth > DEPTH {
            return Err(Error::InvalidDepth { depth, max: DEPTH });
        }
        if key <= 0 || key > tree_size_for_depth(depth) {
            return Err(Error::KeyOutOfRange { key, depth });
        }
        Ok(Self::decode_int64(key, depth))
    }

    fn decode_int64(key: i64, depth: u32) -> Self {
        let mut remaining = (key - 1) as u64;
        let mut bits = 0u64;
        let mut level = 0u32;
        while remaining > 0 {
            level += 1;
            remaining -= 1;
            let sub_tree = tree_size_for_depth(depth - level) as u64;
            let quadrant = remaining / sub_tree;
            debug_assert!(quadrant < 4);
            bits = (bits << 2) | quadrant;
            remaining -= quadrant * sub_tree;
        }
        Self::new(bits, level)
    }
}

impl<const DEPTH: u32> Default for CellId<DEPTH> {
    fn default() -> Self {
        Self::root()
    }
}

impl<const DEPTH: u32> fmt::Display for CellId<DEPTH> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in (0..self.level).rev() {
            let digit = ((self.bits >> (2 * i)) & 3) as u8;
            write!(f, "{}", char::from(b'0' + digit))?;
        }
        Ok(())
    }
}

impl<const DEPTH: u32> fmt::Debug for CellId<DEPTH> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellId(\"{self}\")")
    }
}

impl<const DEPTH: u32> FromStr for CellId<DEPTH> {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if !Self::is_cell_id(s) {
            return Err(Error::InvalidCellString(s.to_string()));
        }
        let bits = s
            .bytes()
            .fold(0u64, |bits, digit| (bits << 2) | u64::from(digit - b'0'));
        Ok(Self::new(bits, s.len() as u32))
    }
}

/// A total order over cells of one tree
///
/// Two orders exist and they disagree on purpose, so each one gets its own
/// strategy type instead of an `Ord` impl on [`CellId`].
pub trait CellOrder {
    fn compare<const DEPTH: u32>(a: &CellId<DEPTH>, b: &CellId<DEPTH>) -> Ordering;
}

/// Level first, then bits; the grouping order of a covering
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelOrder;

impl CellOrder for LevelOrder {
    fn compare<const DEPTH: u32>(a: &CellId<DEPTH>, b: &CellId<DEPTH>) -> Ordering {
        a.level.cmp(&b.level).then(a.bits.cmp(&b.bits))
    }
}

/// Pre-order (Z-order) over all levels at once
///
/// Equivalent to lexicographic order of the digit strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreOrder;

impl CellOrder for PreOrder {
    fn compare<const DEPTH: u32>(a: &CellId<DEPTH>, b: &CellId<DEPTH>) -> Ordering {
        let ordering = a.to_int64(DEPTH).cmp(&b.to_int64(DEPTH));
        debug_assert_eq!(ordering, a.to_string().cmp(&b.to_string()), "{a:?} vs {b:?}");
        ordering
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Cell = CellId<5>;

    fn cell(s: &str) -> Cell {
        s.parse().unwrap()
    }

    /// Every cell of the depth-5 tree, in pre-order
    fn all_cells() -> Vec<Cell> {
        let mut cells = Vec::new();
        let mut stack = vec![Cell::root()];
        while let Some(c) = stack.pop() {
            cells.push(c);
            if c.level() + 1 < Cell::DEPTH_LEVELS {
                for i in (0..4).rev() {
                    stack.push(c.child(i));
                }
            }
        }
        cells
    }

    #[test]
    fn test_root() {
        let root = Cell::root();
        assert_eq!(root.level(), 0);
        assert_eq!(root.bits(), 0);
        assert_eq!(root.to_string(), "");
        assert_eq!(cell(""), root);
        assert!(root.is_root());
    }

    #[test]
    fn test_string_round_trip() {
        for c in all_cells() {
            let s = c.to_string();
            assert_eq!(s.len() as u32, c.level());
            assert_eq!(cell(&s), c);
        }
        assert_eq!(Cell::from_bits_and_level(0b0110, 2).to_string(), "12");
    }

    #[test]
    fn test_is_cell_id() {
        assert!(Cell::is_cell_id(""));
        assert!(Cell::is_cell_id("0123"));
        assert!(!Cell::is_cell_id("01230"));
        assert!(!Cell::is_cell_id("014"));
        assert!(!Cell::is_cell_id("0a"));
        assert!(matches!(
            "0124".parse::<Cell>(),
            Err(Error::InvalidCellString(_))
        ));
    }

    #[test]
    fn test_parent_child() {
        for c in all_cells() {
            if c.level() + 1 < Cell::DEPTH_LEVELS {
                for i in 0..4 {
                    let child = c.child(i);
                    assert_eq!(child.parent(), c);
                    assert_ne!(child.parent(), child);
                    assert_eq!(child.which_child_of_parent(), i);
                    assert_eq!(c.child(child.which_child_of_parent()), child);
                }
            }
        }
        assert_eq!(cell("0123").parent(), cell("012"));
        assert_eq!(cell("0123").ancestor_at_level(1), cell("0"));
        assert_eq!(cell("0123").ancestor_at_level(4), cell("0123"));
        assert_eq!(cell("3").child(2), cell("32"));
    }

    #[test]
    #[should_panic(expected = "root cell has no parent")]
    fn test_root_parent_panics() {
        Cell::root().parent();
    }

    #[test]
    #[should_panic(expected = "has no children")]
    fn test_deepest_child_panics() {
        cell("0000").child(0);
    }

    #[test]
    #[should_panic(expected = "invalid cell")]
    fn test_invalid_bits_panics() {
        Cell::from_bits_and_level(16, 2);
    }

    #[test]
    fn test_contains() {
        assert!(cell("01").contains(&cell("01")));
        assert!(cell("01").contains(&cell("0132")));
        assert!(Cell::root().contains(&cell("3333")));
        assert!(!cell("01").contains(&cell("0")));
        assert!(!cell("01").contains(&cell("0213")));
    }

    #[test]
    fn test_xy_and_radius() {
        type Small = CellId<3>;
        let root = Small::root();
        assert_eq!(root.xy(), (4, 4));
        assert_eq!(root.radius(), 4);

        let quadrants: Vec<_> = (0..4).map(|i| root.child(i).xy()).collect();
        assert_eq!(quadrants, vec![(2, 2), (6, 2), (2, 6), (6, 6)]);
        assert_eq!(root.child(0).radius(), 2);
        assert_eq!(root.child(3).child(3).xy(), (7, 7));
        assert_eq!(root.child(3).child(3).radius(), 1);
    }

    #[test]
    fn test_from_xy_contains_point() {
        let max = Cell::MAX_COORD;
        for level in 0..Cell::DEPTH_LEVELS {
            for x in 0..max {
                for y in (0..max).step_by(3) {
                    let c = Cell::from_xy(x, y, level);
                    assert_eq!(c.level(), level);
                    let (cx, cy) = c.xy();
                    let r = c.radius();
                    assert!(cx - r <= x && x < cx + r, "x={x} level={level}");
                    assert!(cy - r <= y && y < cy + r, "y={y} level={level}");
                }
            }
        }
    }

    #[test]
    fn test_from_xy_inverts_xy() {
        for c in all_cells() {
            let (x, y) = c.xy();
            assert_eq!(Cell::from_xy(x, y, c.level()), c);
        }
    }

    #[test]
    fn test_from_xy_clamps_far_edge() {
        let max = Cell::MAX_COORD;
        assert_eq!(Cell::from_xy(max, max, 4), cell("3333"));
        assert_eq!(Cell::from_xy(max, 0, 1), cell("1"));
        assert!(matches!(
            Cell::try_from_xy(max + 1, 0, 1),
            Err(Error::CoordinateOutOfRange { .. })
        ));
        assert!(matches!(
            Cell::try_from_xy(0, 0, 5),
            Err(Error::InvalidLevel { level: 5, max: 5 })
        ));
    }

    #[test]
    fn test_perfect_shuffle() {
        assert_eq!(perfect_shuffle(0b11, 0b00), 0b0101);
        assert_eq!(perfect_shuffle(0b00, 0b11), 0b1010);
        assert_eq!(perfect_shuffle(u32::MAX, u32::MAX), u64::MAX);
        for (x, y) in [(0, 0), (1, 2), (12345, 67890), (u32::MAX, 7)] {
            assert_eq!(perfect_unshuffle(perfect_shuffle(x, y)), (x, y));
        }
    }

    #[test]
    fn test_tree_size() {
        assert_eq!(tree_size_for_depth(1), 1);
        assert_eq!(tree_size_for_depth(2), 5);
        assert_eq!(tree_size_for_depth(3), 21);
        assert_eq!(tree_size_for_depth(19), 91_625_968_981);
        assert_eq!(Cell::root().sub_tree_size(5), 341);
        assert_eq!(cell("01").sub_tree_size(5), 21);
    }

    #[test]
    fn test_int64_known_values() {
        type Small = CellId<3>;
        let key = |s: &str| s.parse::<Small>().unwrap().to_int64(3);
        assert_eq!(key(""), 1);
        assert_eq!(key("0"), 2);
        assert_eq!(key("00"), 3);
        assert_eq!(key("03"), 6);
        assert_eq!(key("1"), 7);
        assert_eq!(key("10"), 8);
        assert_eq!(key("33"), 21);
    }

    #[test]
    fn test_int64_is_pre_order_position() {
        let cells = all_cells();
        for (position, c) in cells.iter().enumerate() {
            assert_eq!(c.to_int64(5), position as i64 + 1);
        }
    }

    #[test]
    fn test_int64_round_trip_all_depths() {
        for c in all_cells() {
            for depth in 1..=Cell::DEPTH_LEVELS {
                let key = c.to_int64(depth);
                assert!(key >= 1 && key <= tree_size_for_depth(depth));
                let decoded = Cell::from_int64(key, depth);
                if c.level() < depth {
                    assert_eq!(decoded, c);
                } else {
                    assert_eq!(decoded, c.ancestor_at_level(depth - 1));
                }
            }
        }
    }

    #[test]
    fn test_try_from_int64_rejects_bad_keys() {
        assert!(matches!(
            Cell::try_from_int64(0, 5),
            Err(Error::KeyOutOfRange { key: 0, depth: 5 })
        ));
        assert!(matches!(
            Cell::try_from_int64(342, 5),
            Err(Error::KeyOutOfRange { .. })
        ));
        assert!(matches!(
            Cell::try_from_int64(1, 6),
            Err(Error::InvalidDepth { depth: 6, max: 5 })
        ));
        assert_eq!(Cell::try_from_int64(341, 5).unwrap(), cell("3333"));
    }

    #[test]
    fn test_orders_disagree() {
        let shallow = cell("3");
        let deep = cell("0000");
        assert_eq!(LevelOrder::compare(&shallow, &deep), Ordering::Less);
        assert_eq!(PreOrder::compare(&shallow, &deep), Ordering::Greater);
    }

    #[test]
    fn test_pre_order_matches_string_order() {
        let mut by_key = all_cells();
        by_key.sort_by(|a, b| PreOrder::compare(a, b));
        let mut by_string = all_cells();
        by_string.sort_by_key(|c| c.to_string());
        assert_eq!(by_key, by_string);
    }

    #[test]
    fn test_rect_id_depth() {
        let deepest = RectId::from_xy(RectId::MAX_COORD - 1, RectId::MAX_COORD - 1, 18);
        assert_eq!(deepest.to_int64(RECT_ID_DEPTH), tree_size_for_depth(19));
    }
}
