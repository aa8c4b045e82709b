/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use icet_codec::{compress, compress_range, composite_into_dense, composite_into_dense_range, decompress};
use icet_comm::Communicator;
use icet_image::{CompositeMode, DenseImage, ImageFormat, PackedBackground};
use icet_tiles::{FrameContributions, Tile, TileSet};

use crate::single_image::{composite_single_image, SingleImageStrategy};
use crate::transport::{recv_sparse, send_sparse};
use crate::{IcetStrategiesError, IcetStrategiesResult};

const DIRECT_TAG_BASE: i32 = 0x5000;
const REDUCE_FOLD_TAG_BASE: i32 = 0x5200;
const SPLIT_STRIP_TAG_BASE: i32 = 0x5400;
const SPLIT_GATHER_TAG_BASE: i32 = 0x5600;
const VTREE_TAG_BASE: i32 = 0x5800;
const TILE_TAG_SPAN: i32 = 4096;

/// Component C7: decides *which* processes cooperate on *which* tile and
/// in what role, then drives the per-tile reduction (directly, or via a
/// C8 single-image strategy). spec.md §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiTileStrategy {
    /// Every contributor sends straight to its tile's display; the
    /// display composites arrivals. Best for small per-tile contributor
    /// counts.
    Direct,
    /// Run a single-image strategy per tile, one tile at a time. Suited
    /// to a single large tile or a few large tiles.
    Sequential,
    /// Delegate contributors to per-tile groups sized proportionally to
    /// each tile's contributor count, then single-image-reduce within
    /// the group. The general-purpose default.
    Reduce,
    /// Split each tile into horizontal strips owned by a group sized
    /// proportionally to the tile's contributor count. Does not support
    /// ordered composite.
    Split,
    /// Iteratively halve the set of processes still holding an
    /// un-merged partial image for a tile, converging on the tile's
    /// display. Does not support ordered composite.
    Vtree,
}

/// Drives `strategy` across every tile this process is involved in
/// (contributes to, or displays), invoking `render(tile_index)` to
/// produce this process's local contribution for a tile exactly when
/// that pixel data is needed. Returns one entry per tile this process
/// displays. spec.md §4.6 step 5, §4.7.
#[allow(clippy::too_many_arguments)]
pub fn composite_multi_tile(
    comm: &dyn Communicator,
    tiles: &TileSet,
    contributions: &FrameContributions,
    strategy: MultiTileStrategy,
    single_image_strategy: SingleImageStrategy,
    mode: CompositeMode,
    format: ImageFormat,
    background: &PackedBackground,
    composite_order: Option<&[i32]>,
    render: &mut dyn FnMut(usize) -> DenseImage,
) -> IcetStrategiesResult<Vec<(usize, DenseImage)>> {
    match strategy {
        MultiTileStrategy::Direct => direct(comm, tiles, contributions, mode, format, background, composite_order, render),
        MultiTileStrategy::Sequential => sequential(
            comm,
            tiles,
            contributions,
            single_image_strategy,
            mode,
            format,
            background,
            composite_order,
            render,
        ),
        MultiTileStrategy::Reduce => reduce(
            comm,
            tiles,
            contributions,
            single_image_strategy,
            mode,
            format,
            background,
            composite_order,
            render,
        ),
        MultiTileStrategy::Split => split(comm, tiles, contributions, mode, format, background, render),
        MultiTileStrategy::Vtree => vtree(comm, tiles, contributions, mode, format, background, render),
    }
}

/// The ranks that must participate in reducing `tile_idx`'s image: every
/// contributing rank plus the tile's display rank (added as an identity
/// member if it doesn't already contribute — compositing an all-background
/// image is a no-op per spec.md §8 Testable Property 3, so this lets every
/// strategy below treat "display doesn't contribute" uniformly instead of
/// special-casing it). Sorted by `composite_order` when ordered composite
/// is active, else by rank.
fn tile_group(
    contributions: &FrameContributions,
    tile_idx: usize,
    display_rank: i32,
    composite_order: Option<&[i32]>,
) -> Vec<i32> {
    let mut ranks: Vec<i32> = contributions
        .all_contained_tiles_masks
        .iter()
        .enumerate()
        .filter(|(_, mask)| mask[tile_idx])
        .map(|(r, _)| r as i32)
        .collect();
    if !ranks.contains(&display_rank) {
        ranks.push(display_rank);
    }
    sort_by_order(&mut ranks, composite_order);
    ranks
}

fn sort_by_order(ranks: &mut [i32], composite_order: Option<&[i32]>) {
    match composite_order {
        Some(order) => ranks.sort_by_key(|r| order.iter().position(|x| x == r).unwrap_or(usize::MAX)),
        None => ranks.sort(),
    }
}

/// This process's contribution to `tile_idx`: the rendered image if it's
/// a contributor, otherwise a background-cleared placeholder of the
/// right size (the identity element, see [`tile_group`]).
fn local_image_for_tile(
    contributing: bool,
    tile: &Tile,
    format: ImageFormat,
    background: &PackedBackground,
    render: &mut dyn FnMut(usize) -> DenseImage,
    tile_idx: usize,
) -> DenseImage {
    if contributing {
        render(tile_idx)
    } else {
        let mut image = DenseImage::new(format, tile.rect.size.width, tile.rect.size.height);
        image.clear(background);
        image
    }
}

fn partition_sizes(count: usize, parts: usize) -> Vec<usize> {
    if parts == 0 {
        return Vec::new();
    }
    let base = count / parts;
    let remainder = count % parts;
    (0..parts).map(|i| base + usize::from(i < remainder)).collect()
}

/// Splits `ranks` into `k` contiguous, near-equal blocks.
fn contiguous_chunks(ranks: &[i32], k: usize) -> Vec<Vec<i32>> {
    let sizes = partition_sizes(ranks.len(), k);
    let mut out = Vec::with_capacity(k);
    let mut pos = 0;
    for size in sizes {
        out.push(ranks[pos..pos + size].to_vec());
        pos += size;
    }
    out
}

/// spec.md §4.7 "reduce"/"split": `processes_for_tile[t] ≈ num_proc ·
/// contrib_count[t] / total_image_count`, at least one per non-empty
/// tile, never more than the tile's own contributor count.
fn delegate_group_size(num_proc: i32, contrib_count: u32, total_image_count: u32) -> usize {
    if contrib_count == 0 {
        return 0;
    }
    if total_image_count == 0 {
        return 1;
    }
    let ideal = (num_proc as u64 * contrib_count as u64) / total_image_count as u64;
    (ideal as usize).clamp(1, contrib_count as usize)
}

/// **direct**: every contributor compresses and sends straight to its
/// tile's display; the display decompresses and composites arrivals in
/// composite order. spec.md §4.7 "direct".
#[allow(clippy::too_many_arguments)]
fn direct(
    comm: &dyn Communicator,
    tiles: &TileSet,
    contributions: &FrameContributions,
    mode: CompositeMode,
    format: ImageFormat,
    background: &PackedBackground,
    composite_order: Option<&[i32]>,
    render: &mut dyn FnMut(usize) -> DenseImage,
) -> IcetStrategiesResult<Vec<(usize, DenseImage)>> {
    let my_rank = comm.rank();
    let mut results = Vec::new();

    for (t, tile) in tiles.tiles().iter().enumerate() {
        let group = tile_group(contributions, t, tile.display_rank, composite_order);
        if !group.contains(&my_rank) {
            continue;
        }
        let contributing = contributions.contained_tiles_mask[t];
        let tag_base = DIRECT_TAG_BASE + t as i32 * TILE_TAG_SPAN;

        if tile.display_rank != my_rank {
            let my_pos = group.iter().position(|&r| r == my_rank).expect("checked above");
            let image = local_image_for_tile(contributing, tile, format, background, render, t);
            let compressed = compress(&image, mode, background.far_depth)?;
            send_sparse(comm, tile.display_rank, tag_base + my_pos as i32, &compressed)?;
            continue;
        }

        let mut acc = DenseImage::new(format, tile.rect.size.width, tile.rect.size.height);
        acc.clear(background);
        for (i, &rank) in group.iter().enumerate() {
            let sparse = if rank == my_rank {
                let image = local_image_for_tile(contributing, tile, format, background, render, t);
                compress(&image, mode, background.far_depth)?
            } else {
                recv_sparse(comm, rank, tag_base + i as i32)?
            };
            composite_into_dense(&sparse, &mut acc, 0, 0, mode, true)?;
        }
        results.push((t, acc));
    }
    Ok(results)
}

/// **sequential**: tiles are reduced one at a time, each via a C8
/// single-image strategy over its [`tile_group`]. spec.md §4.7
/// "sequential".
#[allow(clippy::too_many_arguments)]
fn sequential(
    comm: &dyn Communicator,
    tiles: &TileSet,
    contributions: &FrameContributions,
    single_image_strategy: SingleImageStrategy,
    mode: CompositeMode,
    format: ImageFormat,
    background: &PackedBackground,
    composite_order: Option<&[i32]>,
    render: &mut dyn FnMut(usize) -> DenseImage,
) -> IcetStrategiesResult<Vec<(usize, DenseImage)>> {
    let my_rank = comm.rank();
    let mut results = Vec::new();

    for (t, tile) in tiles.tiles().iter().enumerate() {
        let group = tile_group(contributions, t, tile.display_rank, composite_order);
        if !group.contains(&my_rank) {
            continue;
        }
        let contributing = contributions.contained_tiles_mask[t];
        let image = local_image_for_tile(contributing, tile, format, background, render, t);
        if let Some(result) =
            composite_single_image(comm, single_image_strategy, &group, tile.display_rank, image, mode, background)?
        {
            results.push((t, result));
        }
    }
    Ok(results)
}

/// **reduce**: phase 1 partitions each tile's contributors into
/// contiguous (in composite order) chunks sized proportionally to the
/// tile's share of the frame's total image count; phase 2 folds each
/// chunk onto its first member locally, then single-image-reduces the
/// chunk representatives (plus the display) to the display. spec.md
/// §4.7 "reduce".
#[allow(clippy::too_many_arguments)]
fn reduce(
    comm: &dyn Communicator,
    tiles: &TileSet,
    contributions: &FrameContributions,
    single_image_strategy: SingleImageStrategy,
    mode: CompositeMode,
    format: ImageFormat,
    background: &PackedBackground,
    composite_order: Option<&[i32]>,
    render: &mut dyn FnMut(usize) -> DenseImage,
) -> IcetStrategiesResult<Vec<(usize, DenseImage)>> {
    let my_rank = comm.rank();
    let num_proc = comm.size();
    let mut results = Vec::new();

    for (t, tile) in tiles.tiles().iter().enumerate() {
        let contrib_count = contributions.tile_contrib_counts[t];
        let mut full_contrib_ranks: Vec<i32> = contributions
            .all_contained_tiles_masks
            .iter()
            .enumerate()
            .filter(|(_, mask)| mask[t])
            .map(|(r, _)| r as i32)
            .collect();
        sort_by_order(&mut full_contrib_ranks, composite_order);

        let k = delegate_group_size(num_proc, contrib_count, contributions.total_image_count);
        let chunks = if full_contrib_ranks.is_empty() {
            Vec::new()
        } else {
            contiguous_chunks(&full_contrib_ranks, k)
        };

        let mut final_group: Vec<i32> = chunks.iter().filter_map(|c| c.first().copied()).collect();
        if !final_group.contains(&tile.display_rank) {
            final_group.push(tile.display_rank);
        }
        sort_by_order(&mut final_group, composite_order);

        let my_chunk = chunks.iter().position(|c| c.contains(&my_rank));
        if my_chunk.is_none() && !final_group.contains(&my_rank) {
            continue;
        }

        let fold_tag_base = REDUCE_FOLD_TAG_BASE + t as i32 * TILE_TAG_SPAN;
        let mut folded: Option<DenseImage> = None;
        if let Some(chunk_idx) = my_chunk {
            let chunk = &chunks[chunk_idx];
            let home = chunk[0];
            let contributing = contributions.contained_tiles_mask[t];
            let my_image = local_image_for_tile(contributing, tile, format, background, render, t);
            if my_rank == home {
                let mut acc = my_image;
                for (i, &member) in chunk.iter().enumerate().skip(1) {
                    let incoming = recv_sparse(comm, member, fold_tag_base + i as i32)?;
                    composite_into_dense(&incoming, &mut acc, 0, 0, mode, true)?;
                }
                folded = Some(acc);
            } else {
                let idx = chunk.iter().position(|r| *r == my_rank).expect("checked above");
                let compressed = compress(&my_image, mode, background.far_depth)?;
                send_sparse(comm, home, fold_tag_base + idx as i32, &compressed)?;
            }
        }

        if final_group.contains(&my_rank) {
            let image = folded.unwrap_or_else(|| {
                let mut image = DenseImage::new(format, tile.rect.size.width, tile.rect.size.height);
                image.clear(background);
                image
            });
            if let Some(result) =
                composite_single_image(comm, single_image_strategy, &final_group, tile.display_rank, image, mode, background)?
            {
                results.push((t, result));
            }
        }
    }
    Ok(results)
}

/// **split**: a group sized like `reduce`'s owns horizontal strips of
/// the tile; every contributor renders the tile once and sends each
/// strip's range to its owner, owners fold incoming strips, then send
/// their strip to the display, which concatenates them. Does not
/// support ordered composite (spec.md §4.7 "split").
fn split(
    comm: &dyn Communicator,
    tiles: &TileSet,
    contributions: &FrameContributions,
    mode: CompositeMode,
    format: ImageFormat,
    background: &PackedBackground,
    render: &mut dyn FnMut(usize) -> DenseImage,
) -> IcetStrategiesResult<Vec<(usize, DenseImage)>> {
    let my_rank = comm.rank();
    let num_proc = comm.size();
    let mut results = Vec::new();

    for (t, tile) in tiles.tiles().iter().enumerate() {
        let contrib_count = contributions.tile_contrib_counts[t];
        let mut full_contrib_ranks: Vec<i32> = contributions
            .all_contained_tiles_masks
            .iter()
            .enumerate()
            .filter(|(_, mask)| mask[t])
            .map(|(r, _)| r as i32)
            .collect();
        full_contrib_ranks.sort();

        let width = tile.rect.size.width;
        let height = tile.rect.size.height;

        if full_contrib_ranks.is_empty() {
            if my_rank == tile.display_rank {
                let mut image = DenseImage::new(format, width, height);
                image.clear(background);
                results.push((t, image));
            }
            continue;
        }

        let k = delegate_group_size(num_proc, contrib_count, contributions.total_image_count).max(1);
        let owners: Vec<i32> = full_contrib_ranks.iter().take(k).copied().collect();
        let strip_heights = partition_sizes(height as usize, owners.len());
        let mut strip_offsets = vec![0usize];
        for h in &strip_heights {
            strip_offsets.push(strip_offsets.last().unwrap() + h);
        }

        let am_contributor = full_contrib_ranks.contains(&my_rank);
        let am_owner = owners.contains(&my_rank);
        let am_display = my_rank == tile.display_rank;
        if !am_contributor && !am_owner && !am_display {
            continue;
        }

        let mut my_rendered: Option<DenseImage> = None;
        let mut owner_partials: Vec<(usize, DenseImage)> = Vec::new();

        for (oi, &owner) in owners.iter().enumerate() {
            let strip_height = strip_heights[oi];
            let strip_start = strip_offsets[oi];
            let strip_tag = SPLIT_STRIP_TAG_BASE + t as i32 * TILE_TAG_SPAN + oi as i32;

            if my_rank == owner {
                let mut partial = DenseImage::new(format, width, strip_height as i32);
                partial.clear(background);
                for &contributor in &full_contrib_ranks {
                    if contributor == my_rank {
                        let image = my_rendered.get_or_insert_with(|| render(t));
                        let start = strip_start * width as usize;
                        let count = strip_height * width as usize;
                        let fragment = compress_range(image, mode, background.far_depth, start, count)?;
                        composite_into_dense_range(&fragment, &mut partial, 0, mode, true)?;
                    } else {
                        let incoming = recv_sparse(comm, contributor, strip_tag)?;
                        composite_into_dense_range(&incoming, &mut partial, 0, mode, true)?;
                    }
                }
                if am_display {
                    owner_partials.push((oi, partial));
                } else {
                    let compressed = compress(&partial, mode, background.far_depth)?;
                    let gather_tag = SPLIT_GATHER_TAG_BASE + t as i32 * TILE_TAG_SPAN + oi as i32;
                    send_sparse(comm, tile.display_rank, gather_tag, &compressed)?;
                }
            } else if am_contributor {
                let image = my_rendered.get_or_insert_with(|| render(t));
                let start = strip_start * width as usize;
                let count = strip_height * width as usize;
                let fragment = compress_range(image, mode, background.far_depth, start, count)?;
                send_sparse(comm, owner, strip_tag, &fragment)?;
            }
        }

        if am_display {
            let mut final_image = DenseImage::new(format, width, height);
            for (oi, partial) in &owner_partials {
                DenseImage::copy_pixels(
                    partial,
                    0,
                    &mut final_image,
                    strip_offsets[*oi] * width as usize,
                    strip_heights[*oi] * width as usize,
                )
                .map_err(|_| IcetStrategiesError::Codec)?;
            }
            for (oi, &owner) in owners.iter().enumerate() {
                if owner == my_rank {
                    continue;
                }
                let gather_tag = SPLIT_GATHER_TAG_BASE + t as i32 * TILE_TAG_SPAN + oi as i32;
                let incoming = recv_sparse(comm, owner, gather_tag)?;
                let decompressed = decompress(&incoming, background)?;
                DenseImage::copy_pixels(
                    &decompressed,
                    0,
                    &mut final_image,
                    strip_offsets[oi] * width as usize,
                    strip_heights[oi] * width as usize,
                )
                .map_err(|_| IcetStrategiesError::Codec)?;
            }
            results.push((t, final_image));
        }
    }
    Ok(results)
}

/// **vtree**: every tile's [`tile_group`] starts as a set of "holders",
/// each holding an un-merged partial image (its own render, or the
/// background identity). Each round halves the holder set, the half not
/// containing the display sending its members' images to positional
/// partners in the surviving half, which composite them in; this
/// repeats until only the display remains. A fixed halving schedule
/// rather than the original's dynamic sender/receiver search (which
/// additionally lets a node forward a "foreign" tile image it received
/// incidentally) — see DESIGN.md. Does not support ordered composite,
/// matching spec.md §4.7 "vtree".
fn vtree(
    comm: &dyn Communicator,
    tiles: &TileSet,
    contributions: &FrameContributions,
    mode: CompositeMode,
    format: ImageFormat,
    background: &PackedBackground,
    render: &mut dyn FnMut(usize) -> DenseImage,
) -> IcetStrategiesResult<Vec<(usize, DenseImage)>> {
    let my_rank = comm.rank();
    let mut results = Vec::new();

    for (t, tile) in tiles.tiles().iter().enumerate() {
        let mut holders = tile_group(contributions, t, tile.display_rank, None);
        if !holders.contains(&my_rank) {
            continue;
        }
        let contributing = contributions.contained_tiles_mask[t];
        let mut my_image = Some(local_image_for_tile(contributing, tile, format, background, render, t));

        let mut round = 0i32;
        while holders.len() > 1 {
            let dest_pos = holders
                .iter()
                .position(|&r| r == tile.display_rank)
                .expect("display is always a holder");
            let mid = holders.len() / 2;
            let (survive, retire) = if dest_pos < mid {
                (holders[..mid].to_vec(), holders[mid..].to_vec())
            } else {
                (holders[mid..].to_vec(), holders[..mid].to_vec())
            };

            let tag = VTREE_TAG_BASE + t as i32 * TILE_TAG_SPAN + round * 64;
            for (i, &sender) in retire.iter().enumerate() {
                let partner = survive[i % survive.len()];
                if my_rank == sender {
                    let image = my_image.take().expect("retiring holder always holds an image");
                    let compressed = compress(&image, mode, background.far_depth)?;
                    send_sparse(comm, partner, tag + i as i32, &compressed)?;
                } else if my_rank == partner {
                    let incoming = recv_sparse(comm, sender, tag + i as i32)?;
                    let mut acc = my_image.take().expect("surviving holder always holds an image");
                    composite_into_dense(&incoming, &mut acc, 0, 0, mode, true)?;
                    my_image = Some(acc);
                }
            }
            holders = survive;
            round += 1;
        }

        if my_rank == tile.display_rank {
            results.push((t, my_image.expect("display is always the sole surviving holder")));
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delegate_group_size_respects_bounds() {
        assert_eq!(delegate_group_size(8, 4, 8), 4);
        assert_eq!(delegate_group_size(8, 1, 8), 1);
        assert_eq!(delegate_group_size(1, 4, 4), 1);
        assert_eq!(delegate_group_size(8, 0, 8), 0);
    }

    #[test]
    fn contiguous_chunks_partition_without_overlap() {
        let ranks = [0, 1, 2, 3, 4];
        let chunks = contiguous_chunks(&ranks, 2);
        assert_eq!(chunks.len(), 2);
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, ranks.len());
        assert_eq!(chunks[0][0], 0);
    }
}
