//! Web-Mercator tile-pixel projection and overlay geometry
//!
//! Matches the slippy-map convention used by `OpenStreetMap` tile servers so
//! that a concentration grid can be overlaid on a stitched basemap:
//!
//! ```text
//! r     = 2^zoom · 256
//! px    = (lon + 180) / 360 · r
//! py    = (1 - ln(tan φ + sec φ) / π) / 2 · r
//! φ     = atan(sinh(π - 2π · py / r))
//! ```

use crate::error::{ensure_finite, PlumeError, PlumeResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Edge length of one map tile in pixels
pub const TILE_SIZE: u32 = 256;

/// Highest zoom level accepted
pub const MAX_ZOOM: u8 = 22;

/// Latitude limit of the square Web-Mercator world (degrees)
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

#[inline]
fn world_size(zoom: u8) -> f64 {
    2.0_f64.powi(i32::from(zoom)) * f64::from(TILE_SIZE)
}

/// Project `(lon, lat)` in degrees to global pixel coordinates at `zoom`
pub fn point_to_pixels(lon: f64, lat: f64, zoom: u8) -> (f64, f64) {
    let r = world_size(zoom);
    let lat_rad = lat.to_radians();
    let x = (lon + 180.0) / 360.0 * r;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * r;
    (x, y)
}

/// Inverse of [`point_to_pixels`], returning `(lon, lat)` in degrees
pub fn pixels_to_point(x: f64, y: f64, zoom: u8) -> (f64, f64) {
    let r = world_size(zoom);
    let lon = x / r * 360.0 - 180.0;
    let n = PI - 2.0 * PI * y / r;
    let lat = n.sinh().atan().to_degrees();
    (lon, lat)
}

/// Geographic bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    /// Western edge
    pub min_lon: f64,
    /// Eastern edge
    pub max_lon: f64,
    /// Southern edge
    pub min_lat: f64,
    /// Northern edge
    pub max_lat: f64,
}

impl GeoBounds {
    /// True when `(lon, lat)` lies inside the box (edges included)
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        (self.min_lon..=self.max_lon).contains(&lon) && (self.min_lat..=self.max_lat).contains(&lat)
    }
}

/// Placement of a simulation grid on a 3×3 block of map tiles
///
/// The block is centred on the tile holding the origin. The grid is drawn
/// with its centre on the origin pixel, one grid cell per map pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    /// Zoom level
    pub zoom: u8,
    /// Origin longitude (degrees)
    pub lon: f64,
    /// Origin latitude (degrees)
    pub lat: f64,
    /// Column of the centre tile
    pub center_tile_x: i64,
    /// Row of the centre tile
    pub center_tile_y: i64,
    /// Geographic extent of the 3×3 block
    pub bounds: GeoBounds,
    /// Pixel column inside the stitched image where the grid's left edge lands
    pub overlay_x: i64,
    /// Pixel row inside the stitched image where the grid's top edge lands
    pub overlay_y: i64,
}

impl MapView {
    /// Compute the view for an origin and a grid of `(rows, cols)`
    ///
    /// # Errors
    ///
    /// Returns [`PlumeError::InvalidParameter`] for a zoom above [`MAX_ZOOM`],
    /// a non-finite coordinate, or a latitude outside the Mercator range.
    pub fn new(lat: f64, lon: f64, zoom: u8, grid_shape: (usize, usize)) -> PlumeResult<Self> {
        validate_origin(lat, lon, zoom)?;
        let tile = f64::from(TILE_SIZE);
        let (px, py) = point_to_pixels(lon, lat, zoom);
        let center_tile_x = (px / tile).floor() as i64;
        let center_tile_y = (py / tile).floor() as i64;

        let tile_i = i64::from(TILE_SIZE);
        let top_left = ((center_tile_x - 1) * tile_i, (center_tile_y - 1) * tile_i);
        let bottom_right = (top_left.0 + 3 * tile_i, top_left.1 + 3 * tile_i);
        let (min_lon, max_lat) = pixels_to_point(top_left.0 as f64, top_left.1 as f64, zoom);
        let (max_lon, min_lat) =
            pixels_to_point(bottom_right.0 as f64, bottom_right.1 as f64, zoom);

        let (rows, cols) = grid_shape;
        let overlay_x = tile_i + px.rem_euclid(tile) as i64 - (cols / 2) as i64;
        let overlay_y = tile_i + py.rem_euclid(tile) as i64 - (rows / 2) as i64;

        Ok(Self {
            zoom,
            lon,
            lat,
            center_tile_x,
            center_tile_y,
            bounds: GeoBounds {
                min_lon,
                max_lon,
                min_lat,
                max_lat,
            },
            overlay_x,
            overlay_y,
        })
    }

    /// Tile coordinates of the 3×3 block with their `(dx, dy)` offsets from the centre
    pub fn tiles(&self) -> impl Iterator<Item = ((i64, i64), (i64, i64))> + '_ {
        (-1..=1).flat_map(move |dx| {
            (-1..=1).map(move |dy| {
                ((dx, dy), (self.center_tile_x + dx, self.center_tile_y + dy))
            })
        })
    }
}

/// Check an origin and zoom level
///
/// # Errors
///
/// See [`MapView::new`].
pub fn validate_origin(lat: f64, lon: f64, zoom: u8) -> PlumeResult<()> {
    ensure_finite("latitude", lat)?;
    ensure_finite("longitude", lon)?;
    if lat.abs() >= MAX_LATITUDE {
        return Err(PlumeError::invalid(
            "latitude",
            lat,
            "outside the Web-Mercator range",
        ));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(PlumeError::invalid("longitude", lon, "must be within ±180°"));
    }
    if zoom > MAX_ZOOM {
        return Err(PlumeError::invalid("zoom", f64::from(zoom), "must be <= 22"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_origin_of_world() {
        let (x, y) = point_to_pixels(0.0, 0.0, 1);
        assert_relative_eq!(x, 256.0);
        assert_relative_eq!(y, 256.0, epsilon = 1e-9);
        let (lon, lat) = pixels_to_point(0.0, 0.0, 0);
        assert_relative_eq!(lon, -180.0);
        assert_relative_eq!(lat, MAX_LATITUDE, epsilon = 1e-9);
    }

    #[test]
    fn test_view_bounds_contain_origin() {
        let view = MapView::new(26.208938, 78.183051, 16, (1000, 1000)).unwrap();
        assert!(view.bounds.contains(78.183051, 26.208938));
        assert!(view.bounds.min_lon < view.bounds.max_lon);
        assert!(view.bounds.min_lat < view.bounds.max_lat);
        assert_eq!(view.tiles().count(), 9);
        // Grid centre lands on the origin pixel inside the stitched image
        let (px, _) = point_to_pixels(78.183051, 26.208938, 16);
        let origin_col = i64::from(TILE_SIZE) + (px % 256.0) as i64;
        assert_eq!(view.overlay_x + 500, origin_col);
    }

    #[test]
    fn test_invalid_origin_rejected() {
        assert!(MapView::new(89.0, 0.0, 10, (10, 10)).is_err());
        assert!(MapView::new(10.0, 0.0, 30, (10, 10)).is_err());
        assert!(MapView::new(f64::NAN, 0.0, 10, (10, 10)).is_err());
        assert!(MapView::new(10.0, 200.0, 10, (10, 10)).is_err());
    }
}
