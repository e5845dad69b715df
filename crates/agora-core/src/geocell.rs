//! Square-grid reference implementation of [`ProximityAdapter`].
//!
//! Cells are `size × size` degree squares addressed as `"{row}:{col}"`,
//! counted from the south-west corner (-90, -180). Columns wrap at the
//! antimeridian. Adjacency is the 8-neighbourhood plus the cell itself.

use serde::{Deserialize, Serialize};

use crate::error::MalformedInput;
use crate::traits::ProximityAdapter;
use crate::types::{CellId, Coordinate};

/// Default cell edge in degrees (roughly 1 km at the equator).
pub const DEFAULT_CELL_SIZE_DEG: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridProximity {
    cell_size_deg: f64,
}

impl Default for GridProximity {
    fn default() -> Self {
        Self { cell_size_deg: DEFAULT_CELL_SIZE_DEG }
    }
}

impl GridProximity {
    pub fn new(cell_size_deg: f64) -> Result<Self, MalformedInput> {
        if !cell_size_deg.is_finite() || cell_size_deg <= 0.0 || cell_size_deg > 180.0 {
            return Err(MalformedInput::InvalidPolicy(format!(
                "cell size must lie in (0, 180] degrees, got {cell_size_deg}"
            )));
        }
        Ok(Self { cell_size_deg })
    }

    pub fn cell_size_deg(&self) -> f64 {
        self.cell_size_deg
    }

    fn columns(&self) -> i64 {
        (360.0 / self.cell_size_deg).ceil() as i64
    }

    /// Cell id for explicit grid indices.
    pub fn cell(row: i64, col: i64) -> CellId {
        CellId::new(format!("{row}:{col}"))
    }

    /// Parse a cell id back into `(row, col)`.
    pub fn parse(cell: &CellId) -> Option<(i64, i64)> {
        let (row, col) = cell.as_str().split_once(':')?;
        Some((row.parse().ok()?, col.parse().ok()?))
    }
}

impl ProximityAdapter for GridProximity {
    fn cell_of(&self, coordinate: &Coordinate) -> CellId {
        let lat = coordinate.lat.clamp(-90.0, 90.0);
        let lon = (coordinate.lon + 180.0).rem_euclid(360.0);
        let row = ((lat + 90.0) / self.cell_size_deg).floor() as i64;
        let col = (lon / self.cell_size_deg).floor() as i64 % self.columns();
        Self::cell(row, col)
    }

    fn are_adjacent(&self, a: &CellId, b: &CellId) -> bool {
        if a == b {
            return true;
        }
        let (Some((ra, ca)), Some((rb, cb))) = (Self::parse(a), Self::parse(b)) else {
            return false;
        };
        // Ids come from callers; compare without overflowing on extreme indices.
        let cols = self.columns();
        let dc = ca.rem_euclid(cols).abs_diff(cb.rem_euclid(cols));
        let col_close = dc <= 1 || dc == cols.unsigned_abs() - 1;
        ra.abs_diff(rb) <= 1 && col_close
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid() -> GridProximity {
        GridProximity::new(1.0).unwrap()
    }

    #[test]
    fn origin_cell() {
        assert_eq!(grid().cell_of(&Coordinate::new(0.5, 0.5)), GridProximity::cell(90, 180));
    }

    #[test]
    fn nearby_points_share_a_cell() {
        let g = grid();
        let a = g.cell_of(&Coordinate::new(52.1, 4.2));
        let b = g.cell_of(&Coordinate::new(52.9, 4.8));
        assert!(g.same_cell(&a, &b));
    }

    #[test]
    fn diagonal_neighbours_are_adjacent() {
        let g = grid();
        assert!(g.are_adjacent(&GridProximity::cell(10, 10), &GridProximity::cell(11, 11)));
        assert!(!g.are_adjacent(&GridProximity::cell(10, 10), &GridProximity::cell(12, 10)));
    }

    #[test]
    fn columns_wrap_at_antimeridian() {
        let g = grid();
        let east = g.cell_of(&Coordinate::new(0.0, 179.5));
        let west = g.cell_of(&Coordinate::new(0.0, -179.5));
        assert!(g.are_adjacent(&east, &west));
    }

    #[test]
    fn foreign_ids_only_match_themselves() {
        let g = grid();
        let foreign = CellId::new("u33db");
        assert!(g.are_adjacent(&foreign, &foreign));
        assert!(!g.are_adjacent(&foreign, &GridProximity::cell(0, 0)));
    }

    #[test]
    fn extreme_indices_do_not_overflow() {
        let g = grid();
        let max = GridProximity::cell(i64::MAX, 0);
        let min = GridProximity::cell(i64::MIN, i64::MIN);
        assert!(!g.are_adjacent(&max, &GridProximity::cell(-1, 0)));
        assert!(!g.are_adjacent(&max, &min));
        assert!(g.are_adjacent(&max, &GridProximity::cell(i64::MAX - 1, 1)));
        // i64::MIN wraps to column 352 on a 360-column grid.
        assert!(g.are_adjacent(&GridProximity::cell(0, i64::MIN), &GridProximity::cell(0, 353)));
    }

    #[test]
    fn invalid_cell_size_rejected() {
        assert!(GridProximity::new(0.0).is_err());
        assert!(GridProximity::new(f64::NAN).is_err());
        assert!(GridProximity::new(200.0).is_err());
    }

    proptest! {
        #[test]
        fn adjacency_symmetric(
            ra in any::<i64>(), ca in any::<i64>(), rb in any::<i64>(), cb in any::<i64>(),
        ) {
            let g = grid();
            let a = GridProximity::cell(ra, ca);
            let b = GridProximity::cell(rb, cb);
            prop_assert_eq!(g.are_adjacent(&a, &b), g.are_adjacent(&b, &a));
        }

        #[test]
        fn cell_of_deterministic(lat in -90.0f64..90.0, lon in -180.0f64..180.0) {
            let g = GridProximity::default();
            let c = Coordinate::new(lat, lon);
            prop_assert_eq!(g.cell_of(&c), g.cell_of(&c));
        }
    }
}
