//! Cell-versus-geometry classification and recursive subdivision
//!
//! Geometry arrives in cell space (the `[0, 2^DEPTH]` square, see
//! [`crate::CellIdConverter`] for world coordinates). Segment crossing and
//! strict point-in-triangle tests come from `geo`.

use geo::algorithm::line_intersection::line_intersection;
use geo::{Contains, Coord, Line, Triangle};

use crate::core::cell_id::CellId;

/// How a cell relates to a piece of geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellObjectIntersection {
    /// Disjoint: prune
    NoIntersection,
    /// Some cell edge crosses or touches some object edge
    Intersect,
    /// The cell lies strictly inside the object
    CellInsideObject,
    /// The object's first vertex lies within the cell bounds
    ObjectInsideCell,
}

/// Corners of the cell square, counter-clockwise from the bottom-left one
fn cell_corners<const DEPTH: u32>(cell: &CellId<DEPTH>) -> [Coord<f64>; 4] {
    let (x, y) = cell.xy();
    let (x, y, r) = (f64::from(x), f64::from(y), f64::from(cell.radius()));
    [
        Coord { x: x - r, y: y - r },
        Coord { x: x - r, y: y + r },
        Coord { x: x + r, y: y + r },
        Coord { x: x + r, y: y - r },
    ]
}

fn cell_edges(corners: &[Coord<f64>; 4]) -> [Line<f64>; 4] {
    [
        Line::new(corners[0], corners[3]),
        Line::new(corners[1], corners[0]),
        Line::new(corners[2], corners[1]),
        Line::new(corners[3], corners[2]),
    ]
}

/// Closed segment test: touching endpoints and collinear overlap count
fn segments_intersect(a: Line<f64>, b: Line<f64>) -> bool {
    line_intersection(a, b).is_some()
}

/// Whether `p` lies within the closed bounds of the cell square
fn point_in_cell<const DEPTH: u32>(cell: &CellId<DEPTH>, p: Coord<f64>) -> bool {
    let (x, y) = cell.xy();
    let (x, y, r) = (f64::from(x), f64::from(y), f64::from(cell.radius()));
    x - r <= p.x && p.x <= x + r && y - r <= p.y && p.y <= y + r
}

/// Classify `cell` against the triangle `(a, b, c)`
///
/// Checks run in a fixed order: any of the 12 edge pairs crossing, then the
/// first vertex falling into the cell, then the first cell corner lying
/// strictly inside the triangle.
pub fn intersect_cell_with_triangle<const DEPTH: u32>(
    cell: &CellId<DEPTH>,
    a: Coord<f64>,
    b: Coord<f64>,
    c: Coord<f64>,
) -> CellObjectIntersection {
    let corners = cell_corners(cell);
    let sides = [Line::new(a, b), Line::new(b, c), Line::new(c, a)];
    let crosses = cell_edges(&corners)
        .iter()
        .any(|edge| sides.iter().any(|side| segments_intersect(*side, *edge)));
    if crosses {
        return CellObjectIntersection::Intersect;
    }
    if point_in_cell(cell, a) {
        return CellObjectIntersection::ObjectInsideCell;
    }
    if Triangle::new(a, b, c).contains(&corners[0]) {
        return CellObjectIntersection::CellInsideObject;
    }
    CellObjectIntersection::NoIntersection
}

/// Classify `cell` against the segment `(a, b)`
pub fn intersect_cell_with_line<const DEPTH: u32>(
    cell: &CellId<DEPTH>,
    a: Coord<f64>,
    b: Coord<f64>,
) -> CellObjectIntersection {
    let corners = cell_corners(cell);
    let segment = Line::new(a, b);
    if cell_edges(&corners)
        .iter()
        .any(|edge| segments_intersect(segment, *edge))
    {
        return CellObjectIntersection::Intersect;
    }
    if point_in_cell(cell, a) {
        return CellObjectIntersection::ObjectInsideCell;
    }
    CellObjectIntersection::NoIntersection
}

/// Depth-first subdivision from the root down to `max_level`
///
/// Emits a cell when it lies inside the object or sits at `max_level`, prunes
/// it when disjoint, and otherwise descends into its four children. Cells come
/// out in pre-order.
pub fn subdivide<const DEPTH: u32, F>(classify: &F, max_level: u32, out: &mut Vec<CellId<DEPTH>>)
where
    F: Fn(&CellId<DEPTH>) -> CellObjectIntersection,
{
    assert!(max_level < DEPTH, "max level {max_level} outside 0..{DEPTH}");
    subdivide_cell(classify, max_level, CellId::root(), out);
}

fn subdivide_cell<const DEPTH: u32, F>(
    classify: &F,
    max_level: u32,
    cell: CellId<DEPTH>,
    out: &mut Vec<CellId<DEPTH>>,
) where
    F: Fn(&CellId<DEPTH>) -> CellObjectIntersection,
{
    let intersection = classify(&cell);
    if intersection == CellObjectIntersection::NoIntersection {
        return;
    }
    if cell.level() == max_level || intersection == CellObjectIntersection::CellInsideObject {
        out.push(cell);
        return;
    }
    for child in 0..4 {
        subdivide_cell(classify, max_level, cell.child(child), out);
    }
}

/// Area of a cell square in units of the deepest cells of a `cell_depth` tree
fn cell_area(level: u32, cell_depth: u32) -> u64 {
    let side = 1u64 << (cell_depth - 1 - level);
    side * side
}

/// Area-penalized covering of an arbitrary object
///
/// Like [`subdivide`], but a cell whose area is at most `cell_penalty_area`
/// is emitted whole, and after recursing a parent replaces its emitted
/// descendants whenever their total area plus the penalty reaches the
/// parent's own area. The result trades precision for fewer cells.
pub fn cover_object<const DEPTH: u32, F>(
    intersect: &F,
    cell_penalty_area: u64,
    cell_depth: u32,
    out: &mut Vec<CellId<DEPTH>>,
) where
    F: Fn(&CellId<DEPTH>) -> CellObjectIntersection,
{
    assert!(
        cell_depth > 0 && cell_depth <= DEPTH,
        "cell depth {cell_depth} outside 1..={DEPTH}"
    );
    cover_object_cell(intersect, cell_penalty_area, cell_depth, CellId::root(), out);
}

fn cover_object_cell<const DEPTH: u32, F>(
    intersect: &F,
    cell_penalty_area: u64,
    cell_depth: u32,
    cell: CellId<DEPTH>,
    out: &mut Vec<CellId<DEPTH>>,
) where
    F: Fn(&CellId<DEPTH>) -> CellObjectIntersection,
{
    let area = cell_area(cell.level(), cell_depth);
    let intersection = intersect(&cell);

    if intersection == CellObjectIntersection::NoIntersection {
        return;
    }
    if intersection == CellObjectIntersection::CellInsideObject || cell_penalty_area >= area {
        out.push(cell);
        return;
    }
    if cell.level() == cell_depth - 1 {
        out.push(cell);
        return;
    }

    let mut subdivision = Vec::new();
    for child in 0..4 {
        cover_object_cell(intersect, cell_penalty_area, cell_depth, cell.child(child), &mut subdivision);
    }

    let subdivision_area: u64 = subdivision
        .iter()
        .map(|c| cell_area(c.level(), cell_depth))
        .sum();

    if subdivision.is_empty() || subdivision_area + cell_penalty_area >= area {
        out.push(cell);
    } else {
        out.extend(subdivision);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Cell = CellId<3>;

    fn cell(s: &str) -> Cell {
        s.parse().unwrap()
    }

    fn pt(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn test_triangle_containing_cell() {
        let result =
            intersect_cell_with_triangle(&Cell::root(), pt(-1.0, -1.0), pt(20.0, -1.0), pt(-1.0, 20.0));
        assert_eq!(result, CellObjectIntersection::CellInsideObject);
    }

    #[test]
    fn test_triangle_inside_cell() {
        let result = intersect_cell_with_triangle(&Cell::root(), pt(1.2, 1.2), pt(1.5, 1.2), pt(1.2, 1.5));
        assert_eq!(result, CellObjectIntersection::ObjectInsideCell);
    }

    #[test]
    fn test_triangle_crossing_cell() {
        let result = intersect_cell_with_triangle(&Cell::root(), pt(-2.0, 4.0), pt(4.0, 4.0), pt(4.0, -2.0));
        assert_eq!(result, CellObjectIntersection::Intersect);
    }

    #[test]
    fn test_triangle_disjoint() {
        let result = intersect_cell_with_triangle(&Cell::root(), pt(20.0, 20.0), pt(21.0, 20.0), pt(20.0, 21.0));
        assert_eq!(result, CellObjectIntersection::NoIntersection);

        // Small triangle in the bottom-left quadrant misses the top-right one
        let result = intersect_cell_with_triangle(&cell("3"), pt(1.2, 1.2), pt(1.5, 1.2), pt(1.2, 1.5));
        assert_eq!(result, CellObjectIntersection::NoIntersection);
    }

    #[test]
    fn test_line_classification() {
        let a = pt(1.0, 1.0);
        let b = pt(7.0, 7.0);
        assert_eq!(
            intersect_cell_with_line(&Cell::root(), a, b),
            CellObjectIntersection::ObjectInsideCell
        );
        assert_eq!(
            intersect_cell_with_line(&cell("3"), a, b),
            CellObjectIntersection::Intersect
        );
        // Touching a corner counts as crossing
        assert_eq!(
            intersect_cell_with_line(&cell("1"), a, b),
            CellObjectIntersection::Intersect
        );
        assert_eq!(
            intersect_cell_with_line(&cell("11"), a, b),
            CellObjectIntersection::NoIntersection
        );
    }

    #[test]
    fn test_subdivide_whole_square() {
        let mut out = Vec::new();
        let classify =
            |c: &Cell| intersect_cell_with_triangle(c, pt(-1.0, -1.0), pt(20.0, -1.0), pt(-1.0, 20.0));
        subdivide(&classify, 2, &mut out);
        assert_eq!(out, vec![Cell::root()]);
    }

    #[test]
    fn test_subdivide_small_triangle() {
        let mut out = Vec::new();
        let classify = |c: &Cell| intersect_cell_with_triangle(c, pt(1.2, 1.2), pt(1.5, 1.2), pt(1.2, 1.5));
        subdivide(&classify, 2, &mut out);
        assert_eq!(out, vec![cell("00")]);
    }

    #[test]
    fn test_subdivide_emits_pre_order() {
        let mut out = Vec::new();
        let classify = |c: &Cell| intersect_cell_with_line(c, pt(0.5, 0.5), pt(7.5, 0.5));
        subdivide(&classify, 1, &mut out);
        assert_eq!(out, vec![cell("0"), cell("1")]);
    }

    #[test]
    fn test_cover_object_penalty_keeps_root() {
        let mut out = Vec::new();
        let classify = |c: &Cell| intersect_cell_with_line(c, pt(0.5, 0.5), pt(7.5, 0.5));
        cover_object(&classify, 16, 3, &mut out);
        assert_eq!(out, vec![Cell::root()]);
    }

    #[test]
    fn test_cover_object_without_penalty() {
        let mut out = Vec::new();
        let classify = |c: &Cell| intersect_cell_with_line(c, pt(0.5, 0.5), pt(7.5, 0.5));
        cover_object(&classify, 0, 3, &mut out);
        assert_eq!(out, vec![cell("00"), cell("01"), cell("10"), cell("11")]);
    }
}
