//! Geographic transforms: map projection, sensor placement, basemap seam

pub mod basemap;
pub mod mercator;
pub mod sensors;

pub use basemap::{stitch_basemap, Basemap, OfflineTiles, TileImage, TileProvider};
pub use mercator::{
    pixels_to_point, point_to_pixels, validate_origin, GeoBounds, MapView, MAX_LATITUDE,
    MAX_ZOOM, TILE_SIZE,
};
pub use sensors::{GridCell, SensorLocator, METERS_PER_DEGREE};
