/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use icet_comm::{Communicator, Datatype};
use icet_projection::ContainedBounds;

use crate::tile::TileSet;
use crate::{IcetTilesError, IcetTilesResult};

/// Per-frame values derived from every process's contained bounds:
/// which tiles this process touches, the same mask for every process,
/// and the resulting per-tile and total contributor counts. spec.md
/// §4.5, §4.6 step 3.
#[derive(Debug, Clone)]
pub struct FrameContributions {
    pub contained_tiles_mask: Vec<bool>,
    pub all_contained_tiles_masks: Vec<Vec<bool>>,
    pub tile_contrib_counts: Vec<u32>,
    pub total_image_count: u32,
}

impl FrameContributions {
    /// The tiles this process actually contributes to.
    pub fn contributed_tiles(&self) -> Vec<usize> {
        self.contained_tiles_mask
            .iter()
            .enumerate()
            .filter(|(_, &active)| active)
            .map(|(i, _)| i)
            .collect()
    }
}

fn pack_mask(mask: &[bool]) -> Vec<u8> {
    mask.iter().map(|&b| b as u8).collect()
}

fn unpack_mask(bytes: &[u8]) -> Vec<bool> {
    bytes.iter().map(|&b| b != 0).collect()
}

/// Computes this process's contained-tiles mask from `bounds`, then
/// allgathers it across the communicator's group to build the full
/// per-process/per-tile table and the derived counts.
pub fn gather_contributions(
    comm: &dyn Communicator,
    tiles: &TileSet,
    bounds: &ContainedBounds,
) -> IcetTilesResult<FrameContributions> {
    let mask: Vec<bool> = tiles.tiles().iter().map(|t| bounds.contains_tile(t.rect)).collect();
    let packed = pack_mask(&mask);
    let gathered = comm
        .allgather(&packed, Datatype::Byte)
        .map_err(|_| IcetTilesError::Transport)?;

    let num_tiles = tiles.len();
    let size = comm.size() as usize;
    if gathered.len() != num_tiles * size {
        return Err(IcetTilesError::Transport);
    }
    let all_contained_tiles_masks: Vec<Vec<bool>> = gathered
        .chunks(num_tiles)
        .map(unpack_mask)
        .collect();

    let mut tile_contrib_counts = vec![0u32; num_tiles];
    for per_process in &all_contained_tiles_masks {
        for (t, &active) in per_process.iter().enumerate() {
            if active {
                tile_contrib_counts[t] += 1;
            }
        }
    }
    let total_image_count = tile_contrib_counts.iter().sum();

    Ok(FrameContributions {
        contained_tiles_mask: mask,
        all_contained_tiles_masks,
        tile_contrib_counts,
        total_image_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use euclid::default::Rect;
    use icet_comm::LocalGroup;

    #[test]
    fn contrib_counts_sum_across_ranks() {
        let mut tiles = TileSet::new();
        tiles.add_tile(Rect::new((0, 0).into(), (10, 10).into()), 0).unwrap();
        let group = LocalGroup::new(3);
        let handles: Vec<_> = group
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                let tiles = tiles.clone();
                std::thread::spawn(move || {
                    let bounds = ContainedBounds {
                        viewport: Rect::new((0, 0).into(), (10, 10).into()),
                        znear: -1.0,
                        zfar: 1.0,
                    };
                    let _ = rank;
                    gather_contributions(&comm, &tiles, &bounds).unwrap()
                })
            })
            .collect();
        for h in handles {
            let contributions = h.join().unwrap();
            assert_eq!(contributions.tile_contrib_counts, vec![3]);
            assert_eq!(contributions.total_image_count, 3);
        }
    }
}
