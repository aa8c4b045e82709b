/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use euclid::default::Rect;

use crate::{IcetTilesError, IcetTilesResult};

/// A rectangle of the global display plane with an assigned display
/// process. spec.md §3 "Tile".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub rect: Rect<i32>,
    pub display_rank: i32,
}

/// The append-only tile list for one frame plus the values derived from
/// it. spec.md §4.5.
#[derive(Debug, Clone, Default)]
pub struct TileSet {
    tiles: Vec<Tile>,
}

impl TileSet {
    pub fn new() -> Self {
        TileSet { tiles: Vec::new() }
    }

    pub fn reset_tiles(&mut self) {
        self.tiles.clear();
    }

    /// Rejects a tile whose width or height is zero or negative, matching
    /// `original_source/src/ice-t/tiles.c`'s `icetAddTile`.
    pub fn add_tile(&mut self, rect: Rect<i32>, display_rank: i32) -> IcetTilesResult<()> {
        if rect.size.width <= 0 || rect.size.height <= 0 {
            return Err(IcetTilesError::InvalidTileBounds);
        }
        self.tiles.push(Tile { rect, display_rank });
        Ok(())
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// The bounding rectangle of every tile.
    pub fn global_viewport(&self) -> Rect<i32> {
        self.tiles
            .iter()
            .fold(Rect::zero(), |acc, t| acc.union(&t.rect))
    }

    pub fn tile_max_width(&self) -> i32 {
        self.tiles.iter().map(|t| t.rect.size.width).max().unwrap_or(0)
    }

    pub fn tile_max_height(&self) -> i32 {
        self.tiles.iter().map(|t| t.rect.size.height).max().unwrap_or(0)
    }

    pub fn tile_max_pixels(&self) -> i64 {
        self.tiles
            .iter()
            .map(|t| t.rect.size.width as i64 * t.rect.size.height as i64)
            .max()
            .unwrap_or(0)
    }

    /// Indices of the tiles this rank is responsible for displaying.
    pub fn displayed_tiles(&self, rank: i32) -> Vec<usize> {
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, t)| t.display_rank == rank)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_viewport_bounds_all_tiles() {
        let mut tiles = TileSet::new();
        tiles.add_tile(Rect::new((0, 0).into(), (256, 256).into()), 0).unwrap();
        tiles.add_tile(Rect::new((256, 0).into(), (256, 256).into()), 1).unwrap();
        assert_eq!(tiles.global_viewport(), Rect::new((0, 0).into(), (512, 256).into()));
        assert_eq!(tiles.tile_max_pixels(), 256 * 256);
    }

    #[test]
    fn displayed_tiles_filters_by_rank() {
        let mut tiles = TileSet::new();
        tiles.add_tile(Rect::new((0, 0).into(), (1, 1).into()), 0).unwrap();
        tiles.add_tile(Rect::new((1, 0).into(), (1, 1).into()), 1).unwrap();
        assert_eq!(tiles.displayed_tiles(1), vec![1]);
    }

    #[test]
    fn add_tile_rejects_degenerate_rects() {
        let mut tiles = TileSet::new();
        assert_eq!(
            tiles.add_tile(Rect::new((0, 0).into(), (0, 10).into()), 0),
            Err(IcetTilesError::InvalidTileBounds)
        );
        assert_eq!(
            tiles.add_tile(Rect::new((0, 0).into(), (10, -1).into()), 0),
            Err(IcetTilesError::InvalidTileBounds)
        );
    }
}
