//! Basemap stitching behind a tile-provider seam
//!
//! The core never talks to a tile server. Callers supply a [`TileProvider`];
//! tiles are fetched one after another and any failure is replaced by an
//! opaque white placeholder, so map problems never reach the physics.

use crate::error::{PlumeError, PlumeResult};
use crate::geo::mercator::{MapView, TILE_SIZE};
use tracing::warn;

/// Square RGBA image, row-major, 4 bytes per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileImage {
    /// Edge length in pixels
    pub size: u32,
    /// Pixel data
    pub rgba: Vec<u8>,
}

impl TileImage {
    /// Opaque white tile of [`TILE_SIZE`]
    pub fn placeholder() -> Self {
        let n = (TILE_SIZE * TILE_SIZE * 4) as usize;
        Self {
            size: TILE_SIZE,
            rgba: vec![255; n],
        }
    }
}

/// Source of map tiles keyed by tile coordinates and zoom
pub trait TileProvider {
    /// Fetch one [`TILE_SIZE`] RGBA tile
    ///
    /// # Errors
    ///
    /// Implementations report failures as [`PlumeError::TileFetch`].
    fn fetch_tile(&self, x: i64, y: i64, zoom: u8) -> PlumeResult<TileImage>;
}

/// A stitched 3×3 tile block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Basemap {
    /// Edge length in pixels (`3 · TILE_SIZE`)
    pub size: u32,
    /// Pixel data
    pub rgba: Vec<u8>,
    /// Tiles that were replaced by placeholders
    pub placeholders: usize,
}

/// Fetch and stitch the 3×3 block around `view`'s origin
pub fn stitch_basemap<P: TileProvider + ?Sized>(provider: &P, view: &MapView) -> Basemap {
    let tile = TILE_SIZE as usize;
    let size = 3 * tile;
    let mut rgba = vec![0_u8; size * size * 4];
    let mut placeholders = 0;

    for ((dx, dy), (tx, ty)) in view.tiles() {
        let image = match provider.fetch_tile(tx, ty, view.zoom) {
            Ok(img) if img.size == TILE_SIZE && img.rgba.len() == tile * tile * 4 => img,
            Ok(img) => {
                warn!(
                    "Tile ({tx}, {ty}) has size {} instead of {TILE_SIZE}, using placeholder",
                    img.size
                );
                placeholders += 1;
                TileImage::placeholder()
            }
            Err(e) => {
                warn!("Tile fetch error at ({tx}, {ty}): {e}");
                placeholders += 1;
                TileImage::placeholder()
            }
        };

        let x0 = (dx + 1) as usize * tile;
        let y0 = (dy + 1) as usize * tile;
        for row in 0..tile {
            let src = &image.rgba[row * tile * 4..(row + 1) * tile * 4];
            let dst_start = ((y0 + row) * size + x0) * 4;
            rgba[dst_start..dst_start + tile * 4].copy_from_slice(src);
        }
    }

    Basemap {
        size: size as u32,
        rgba,
        placeholders,
    }
}

/// Provider that always fails; yields an all-placeholder basemap
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineTiles;

impl TileProvider for OfflineTiles {
    fn fetch_tile(&self, x: i64, y: i64, zoom: u8) -> PlumeResult<TileImage> {
        Err(PlumeError::TileFetch {
            x,
            y,
            zoom,
            message: "offline".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Checkerboard;

    impl TileProvider for Checkerboard {
        fn fetch_tile(&self, x: i64, y: i64, zoom: u8) -> PlumeResult<TileImage> {
            if (x + y) % 2 == 0 {
                let n = (TILE_SIZE * TILE_SIZE * 4) as usize;
                Ok(TileImage {
                    size: TILE_SIZE,
                    rgba: vec![7; n],
                })
            } else {
                Err(PlumeError::TileFetch {
                    x,
                    y,
                    zoom,
                    message: "404".into(),
                })
            }
        }
    }

    #[test]
    fn test_failures_become_placeholders() {
        let view = MapView::new(26.208938, 78.183051, 16, (100, 100)).unwrap();
        let map = stitch_basemap(&Checkerboard, &view);
        assert_eq!(map.size, 3 * TILE_SIZE);
        assert_eq!(map.rgba.len(), (map.size * map.size * 4) as usize);
        assert!(map.placeholders == 4 || map.placeholders == 5);
        assert!(map.rgba.iter().all(|&b| b == 7 || b == 255));
    }

    #[test]
    fn test_offline_provider_is_all_white() {
        let view = MapView::new(0.5, 0.5, 3, (10, 10)).unwrap();
        let map = stitch_basemap(&OfflineTiles, &view);
        assert_eq!(map.placeholders, 9);
        assert!(map.rgba.iter().all(|&b| b == 255));
    }
}
