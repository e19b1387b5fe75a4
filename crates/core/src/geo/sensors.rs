//! Placement of geographic sensors on the simulation grid
//!
//! Offsets from the reference origin use an equirectangular approximation
//! with a flat 111 km per degree on both axes. That is adequate across the
//! ~1 km domains this model covers.
//!
//! The grid's rows follow image orientation (south is +y), so the northward
//! offset is negated before the row lookup, the same flip applied to the
//! north wind component.

use crate::dispersion::grid::SimulationGrid;
use crate::error::{ensure_finite, PlumeResult};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Meters per degree of latitude or longitude
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// A grid cell as `(row, col)` indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    /// Row index (image orientation)
    pub row: usize,
    /// Column index
    pub col: usize,
}

/// Projects `(lat, lon)` onto a grid centred on a reference origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorLocator {
    /// Reference latitude (degrees)
    pub lat0: f64,
    /// Reference longitude (degrees)
    pub lon0: f64,
}

impl SensorLocator {
    /// Create a locator for the given origin
    ///
    /// # Errors
    ///
    /// Rejects non-finite coordinates.
    pub fn new(lat0: f64, lon0: f64) -> PlumeResult<Self> {
        ensure_finite("reference latitude", lat0)?;
        ensure_finite("reference longitude", lon0)?;
        Ok(Self { lat0, lon0 })
    }

    /// Planar offsets `(dx east, dy north)` in meters from the origin
    #[inline]
    pub fn offsets(&self, lat: f64, lon: f64) -> (f64, f64) {
        (
            (lon - self.lon0) * METERS_PER_DEGREE,
            (lat - self.lat0) * METERS_PER_DEGREE,
        )
    }

    /// Nearest grid cell to a sensor; sensors outside the grid snap to its edge
    pub fn locate(&self, lat: f64, lon: f64, grid: &SimulationGrid) -> GridCell {
        let (dx, dy) = self.offsets(lat, lon);
        GridCell {
            row: grid.nearest_index(-dy),
            col: grid.nearest_index(dx),
        }
    }

    /// Locate many sensors, logging when several share one cell
    ///
    /// Collisions are allowed; the colliding sensors simply share a predicted mean.
    pub fn locate_all<I>(&self, points: I, grid: &SimulationGrid) -> Vec<GridCell>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let cells: Vec<GridCell> = points
            .into_iter()
            .map(|(lat, lon)| self.locate(lat, lon, grid))
            .collect();

        let mut occupancy: FxHashMap<GridCell, usize> = FxHashMap::default();
        for cell in &cells {
            *occupancy.entry(*cell).or_insert(0) += 1;
        }
        let shared = occupancy.values().filter(|&&n| n > 1).count();
        if shared > 0 {
            tracing::warn!(
                "{} grid cells hold more than one of {} sensors",
                shared,
                cells.len()
            );
        }
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispersion::grid::GridSpec;

    fn grid() -> SimulationGrid {
        SimulationGrid::new(GridSpec::default(), 0.0).unwrap()
    }

    #[test]
    fn test_origin_maps_to_centre() {
        let locator = SensorLocator::new(26.2, 78.1).unwrap();
        let cell = locator.locate(26.2, 78.1, &grid());
        // 1000 points: the two centre points sit at ±0.5 m
        assert!(cell.row == 499 || cell.row == 500);
        assert!(cell.col == 499 || cell.col == 500);
    }

    #[test]
    fn test_east_and_north_offsets() {
        let g = grid();
        let locator = SensorLocator::new(0.0, 0.0).unwrap();
        // 0.001° ≈ 111 m
        let east = locator.locate(0.0, 0.001, &g);
        assert!((g.axis()[east.col] - 111.0).abs() < 1.0);
        let north = locator.locate(0.001, 0.0, &g);
        assert!((g.axis()[north.row] + 111.0).abs() < 1.0, "north is up the image");
    }

    #[test]
    fn test_far_sensors_snap_to_edge() {
        let g = grid();
        let locator = SensorLocator::new(0.0, 0.0).unwrap();
        let cell = locator.locate(-1.0, 1.0, &g);
        assert_eq!(cell.row, g.len() - 1);
        assert_eq!(cell.col, g.len() - 1);
    }

    #[test]
    fn test_collisions_are_kept() {
        let g = grid();
        let locator = SensorLocator::new(0.0, 0.0).unwrap();
        let cells = locator.locate_all([(0.0, 0.0), (0.000_001, 0.0), (0.002, 0.0)], &g);
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[0], cells[1]);
        assert_ne!(cells[0], cells[2]);
    }
}
