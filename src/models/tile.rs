use ndarray::{concatenate, s, Array3, Axis};

use crate::error::{DatasetError, Result};
use crate::models::PixelOffset;

/// Terrain raster for one station, laid out `[rows, cols, channels]`
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub station: String,
    pub data: Array3<f32>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Tile {
    pub fn new(station: String, data: Array3<f32>, x: Vec<f64>, y: Vec<f64>) -> Self {
        Self { station, data, x, y }
    }

    /// Build a single-channel tile from a row-major grid
    pub fn from_grid(
        station: String,
        rows: usize,
        cols: usize,
        values: Vec<f32>,
        x: Vec<f64>,
        y: Vec<f64>,
    ) -> Result<Self> {
        let data = Array3::from_shape_vec((rows, cols, 1), values)?;
        Ok(Self::new(station, data, x, y))
    }

    pub fn rows(&self) -> usize {
        self.data.dim().0
    }

    pub fn cols(&self) -> usize {
        self.data.dim().1
    }

    pub fn channels(&self) -> usize {
        self.data.dim().2
    }

    fn check_fits(&self, size: usize) -> Result<()> {
        if self.rows() < size || self.cols() < size {
            return Err(DatasetError::TileShape {
                station: self.station.clone(),
                rows: self.rows(),
                cols: self.cols(),
                crop: size,
            });
        }
        Ok(())
    }

    /// Top-left corner of a `size` window centered on the native center shifted by
    /// `offset`, clamped so the window stays inside the tile
    fn window_origin(&self, offset: PixelOffset, size: usize) -> (usize, usize) {
        let clamp = |extent: usize, shift: i32| -> usize {
            let start = (extent / 2) as i64 + shift as i64 - (size / 2) as i64;
            start.clamp(0, (extent - size) as i64) as usize
        };
        (clamp(self.rows(), offset.dy), clamp(self.cols(), offset.dx))
    }

    /// Centered `size`x`size` crop, coordinate vectors cropped alongside
    pub fn center_crop(&self, size: usize) -> Result<Tile> {
        self.check_fits(size)?;
        let (top, left) = self.window_origin(PixelOffset::default(), size);

        let data = self
            .data
            .slice(s![top..top + size, left..left + size, ..])
            .to_owned();
        let x = crop_axis(&self.x, left, size);
        let y = crop_axis(&self.y, top, size);

        Ok(Tile::new(self.station.clone(), data, x, y))
    }

    /// Crop re-centered by a per-observation offset (`dx` along columns, `dy` along rows).
    /// A window that would cross the tile edge is clamped back inside it, so the result is
    /// always `size`x`size` and equals the shifted centered crop only away from the edges.
    pub fn crop_at(&self, offset: PixelOffset, size: usize) -> Result<Array3<f32>> {
        self.check_fits(size)?;
        let (top, left) = self.window_origin(offset, size);
        Ok(self
            .data
            .slice(s![top..top + size, left..left + size, ..])
            .to_owned())
    }

    /// Stack tiles of the same station along the channel axis, in the given order
    pub fn concat_channels(tiles: &[&Tile]) -> Result<Tile> {
        let first = tiles
            .first()
            .ok_or_else(|| DatasetError::MissingData("No tiles to concatenate".to_string()))?;
        let views: Vec<_> = tiles.iter().map(|t| t.data.view()).collect();
        let data = concatenate(Axis(2), &views)?;
        Ok(Tile::new(
            first.station.clone(),
            data,
            first.x.clone(),
            first.y.clone(),
        ))
    }
}

fn crop_axis(values: &[f64], start: usize, size: usize) -> Vec<f64> {
    values.iter().skip(start).take(size).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tile whose pixel value encodes its position: row * 1000 + col
    fn indexed_tile(rows: usize, cols: usize) -> Tile {
        let values = (0..rows * cols)
            .map(|i| ((i / cols) * 1000 + i % cols) as f32)
            .collect();
        let x = (0..cols).map(|c| c as f64 * 30.0).collect();
        let y = (0..rows).map(|r| r as f64 * 30.0).collect();
        Tile::from_grid("A".to_string(), rows, cols, values, x, y).unwrap()
    }

    #[test]
    fn test_center_crop_matches_native_center() {
        let tile = indexed_tile(280, 280);
        let crop = tile.center_crop(140).unwrap();

        assert_eq!(crop.data.dim(), (140, 140, 1));
        assert_eq!(crop.data[[0, 0, 0]], (70 * 1000 + 70) as f32);
        assert_eq!(crop.data[[139, 139, 0]], (209 * 1000 + 209) as f32);
        assert_eq!(crop.x.len(), 140);
        assert_eq!(crop.x[0], 70.0 * 30.0);
    }

    #[test]
    fn test_crop_at_shifts_by_offset() {
        let tile = indexed_tile(280, 280);
        let centered = tile.crop_at(PixelOffset::new(0, 0), 140).unwrap();
        let shifted = tile.crop_at(PixelOffset::new(12, -7), 140).unwrap();

        for r in 0..140 {
            for c in 0..140 {
                let expected = (70 - 7 + r) * 1000 + (70 + 12 + c);
                assert_eq!(shifted[[r, c, 0]], expected as f32);
            }
        }
        assert_eq!(centered[[0, 0, 0]], (70 * 1000 + 70) as f32);
    }

    #[test]
    fn test_crop_at_clamps_at_tile_boundaries() {
        let tile = indexed_tile(280, 280);
        let crop = tile.crop_at(PixelOffset::new(500, -500), 140).unwrap();

        assert_eq!(crop.dim(), (140, 140, 1));
        // Window pushed to the top-right corner
        assert_eq!(crop[[0, 0, 0]], 140.0);
        assert_eq!(crop[[139, 139, 0]], (139 * 1000 + 279) as f32);
    }

    #[test]
    fn test_crop_larger_than_tile_fails() {
        let tile = indexed_tile(100, 100);
        assert!(matches!(
            tile.center_crop(140),
            Err(DatasetError::TileShape { .. })
        ));
    }

    #[test]
    fn test_concat_channels_in_order() {
        let a = indexed_tile(4, 4);
        let mut b = indexed_tile(4, 4);
        b.data.mapv_inplace(|v| -v);

        let stacked = Tile::concat_channels(&[&a, &b]).unwrap();
        assert_eq!(stacked.channels(), 2);
        assert_eq!(stacked.data[[1, 2, 0]], 1002.0);
        assert_eq!(stacked.data[[1, 2, 1]], -1002.0);
    }
}
