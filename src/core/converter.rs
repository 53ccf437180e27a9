//! World coordinates to cell space
//!
//! Map geometry lives in a world rectangle ([`Bounds::MERCATOR`] by default)
//! while cells index the integer square `[0, 2^DEPTH]`. The converter scales
//! between the two so world geometry can feed the covering builders.

use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

use crate::core::cell_id::CellId;

/// World rectangle mapped onto the cell square
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Mercator plane used by map data
    pub const MERCATOR: Bounds = Bounds {
        min_x: -180.0,
        min_y: -180.0,
        max_x: 180.0,
        max_y: 180.0,
    };

    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        assert!(min_x < max_x && min_y < max_y, "empty bounds");
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::MERCATOR
    }
}

/// Scales world points into the cell square of a `DEPTH` tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellIdConverter<const DEPTH: u32> {
    bounds: Bounds,
}

impl<const DEPTH: u32> Default for CellIdConverter<DEPTH> {
    fn default() -> Self {
        Self::new(Bounds::MERCATOR)
    }
}

impl<const DEPTH: u32> CellIdConverter<DEPTH> {
    const SIDE: f64 = CellId::<DEPTH>::MAX_COORD as f64;

    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn x_to_cell_x(&self, x: f64) -> f64 {
        (x - self.bounds.min_x) * Self::SIDE / self.bounds.width()
    }

    pub fn y_to_cell_y(&self, y: f64) -> f64 {
        (y - self.bounds.min_y) * Self::SIDE / self.bounds.height()
    }

    pub fn cell_x_to_x(&self, x: f64) -> f64 {
        x * self.bounds.width() / Self::SIDE + self.bounds.min_x
    }

    pub fn cell_y_to_y(&self, y: f64) -> f64 {
        y * self.bounds.height() / Self::SIDE + self.bounds.min_y
    }

    /// World point in cell space, not clamped
    pub fn to_cell_space(&self, p: Coord<f64>) -> Coord<f64> {
        Coord {
            x: self.x_to_cell_x(p.x),
            y: self.y_to_cell_y(p.y),
        }
    }

    /// Deepest cell containing `p`; points outside the bounds are clamped
    pub fn to_cell_id(&self, p: Coord<f64>) -> CellId<DEPTH> {
        self.to_cell_id_at_level(p, DEPTH - 1)
    }

    pub fn to_cell_id_at_level(&self, p: Coord<f64>, level: u32) -> CellId<DEPTH> {
        let clamp = |v: f64| v.clamp(0.0, Self::SIDE) as u32;
        let x = clamp(self.x_to_cell_x(p.x));
        let y = clamp(self.y_to_cell_y(p.y));
        CellId::from_xy(x, y, level)
    }

    /// World rectangle covered by `cell`
    pub fn cell_bounds(&self, cell: &CellId<DEPTH>) -> Rect<f64> {
        let (x, y) = cell.xy();
        let r = f64::from(cell.radius());
        let (x, y) = (f64::from(x), f64::from(y));
        Rect::new(
            Coord {
                x: self.cell_x_to_x(x - r),
                y: self.cell_y_to_y(y - r),
            },
            Coord {
                x: self.cell_x_to_x(x + r),
                y: self.cell_y_to_y(y + r),
            },
        )
    }

    pub fn cell_center(&self, cell: &CellId<DEPTH>) -> Coord<f64> {
        let (x, y) = cell.xy();
        Coord {
            x: self.cell_x_to_x(f64::from(x)),
            y: self.cell_y_to_y(f64::from(y)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell_id::RectId;

    type Cell = CellId<3>;

    #[test]
    fn test_mercator_scaling() {
        let converter = CellIdConverter::<3>::default();
        assert_eq!(converter.x_to_cell_x(-180.0), 0.0);
        assert_eq!(converter.x_to_cell_x(180.0), 8.0);
        assert_eq!(converter.y_to_cell_y(0.0), 4.0);
        assert_eq!(converter.cell_x_to_x(2.0), -90.0);
        assert_eq!(converter.cell_y_to_y(6.0), 90.0);
    }

    #[test]
    fn test_to_cell_id() {
        let converter = CellIdConverter::<3>::default();
        assert_eq!(converter.to_cell_id(Coord { x: -170.0, y: -170.0 }), "00".parse::<Cell>().unwrap());
        assert_eq!(converter.to_cell_id(Coord { x: 170.0, y: 170.0 }), "33".parse::<Cell>().unwrap());
        assert_eq!(
            converter.to_cell_id_at_level(Coord { x: 10.0, y: -10.0 }, 1),
            "1".parse::<Cell>().unwrap()
        );
        // Far outside the bounds clamps to the edge cells
        assert_eq!(converter.to_cell_id(Coord { x: 500.0, y: -500.0 }), "11".parse::<Cell>().unwrap());
    }

    #[test]
    fn test_cell_bounds_and_center() {
        let converter = CellIdConverter::<3>::default();
        let cell: Cell = "3".parse().unwrap();
        let rect = converter.cell_bounds(&cell);
        assert_eq!(rect.min(), Coord { x: 0.0, y: 0.0 });
        assert_eq!(rect.max(), Coord { x: 180.0, y: 180.0 });
        assert_eq!(converter.cell_center(&cell), Coord { x: 90.0, y: 90.0 });
        assert_eq!(converter.cell_center(&Cell::root()), Coord { x: 0.0, y: 0.0 });
    }

    #[test]
    fn test_point_round_trips_into_its_cell() {
        let converter = CellIdConverter::<19>::default();
        let p = Coord { x: 4.35, y: 50.85 };
        let cell: RectId = converter.to_cell_id(p);
        let rect = converter.cell_bounds(&cell);
        assert!(rect.min().x <= p.x && p.x <= rect.max().x);
        assert!(rect.min().y <= p.y && p.y <= rect.max().y);
    }

    #[test]
    fn test_custom_bounds() {
        let converter = CellIdConverter::<3>::new(Bounds::new(0.0, 0.0, 80.0, 40.0));
        assert_eq!(converter.to_cell_space(Coord { x: 40.0, y: 10.0 }), Coord { x: 4.0, y: 2.0 });
        assert_eq!(converter.bounds().width(), 80.0);
    }
}
