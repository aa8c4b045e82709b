/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use icet_codec::{compress, compress_range, composite_into_dense, composite_into_dense_range, decompress};
use icet_comm::Communicator;
use icet_image::{CompositeMode, DenseImage, PackedBackground};

use crate::transport::{exchange_sparse, recv_sparse, send_sparse};
use crate::{IcetStrategiesError, IcetStrategiesResult};

const BINARY_TREE_TAG_BASE: i32 = 0x4200;
const BSWAP_TAG_BASE: i32 = 0x4300;
const BSWAP_GATHER_TAG_BASE: i32 = 0x4380;
const RADIX_TAG_BASE: i32 = 0x4400;

/// Component C8: reduces one process's contributions over a tile down
/// to a single image at `image_dest`. `group` lists the contributing
/// ranks in composite order: for ordered composite, `group[i]`'s pixels
/// sit "under" `group[j]`'s wherever `i < j`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleImageStrategy {
    /// Binary-swap for `|group| >= 8`, binary-tree otherwise.
    Automatic,
    BinaryTree,
    BinarySwap,
    RadixK { magic_k: u32 },
}

/// Runs `strategy` over `group`, reducing each member's local `image`
/// into a single image held by `image_dest`. Every member of `group`
/// must call this with the same `strategy`/`group`/`image_dest`/`mode`;
/// only `image_dest` gets `Some` back. spec.md §4.8.
pub fn composite_single_image(
    comm: &dyn Communicator,
    strategy: SingleImageStrategy,
    group: &[i32],
    image_dest: i32,
    image: DenseImage,
    mode: CompositeMode,
    background: &PackedBackground,
) -> IcetStrategiesResult<Option<DenseImage>> {
    if group.is_empty() {
        if comm.rank() == image_dest {
            let mut cleared = image;
            cleared.clear(background);
            return Ok(Some(cleared));
        }
        return Ok(None);
    }
    if !group.contains(&image_dest) {
        return Err(IcetStrategiesError::InvalidGroup);
    }

    let effective = match strategy {
        SingleImageStrategy::Automatic => {
            if group.len() >= 8 {
                SingleImageStrategy::BinarySwap
            } else {
                SingleImageStrategy::BinaryTree
            }
        }
        other => other,
    };

    match effective {
        SingleImageStrategy::Automatic => unreachable!("resolved above"),
        SingleImageStrategy::BinaryTree => binary_tree_reduce(comm, group, image_dest, image, mode, background, 0),
        SingleImageStrategy::BinarySwap => binary_swap_reduce(comm, group, image_dest, image, mode, background),
        SingleImageStrategy::RadixK { magic_k } => radix_k_reduce(comm, group, image_dest, image, mode, background, magic_k),
    }
}

/// Recursively splits `group` at its midpoint; the half not containing
/// `dest` reduces internally and sends its (compressed) result to a
/// representative of the half that does. spec.md §4.8 "binary-tree".
fn binary_tree_reduce(
    comm: &dyn Communicator,
    group: &[i32],
    dest: i32,
    image: DenseImage,
    mode: CompositeMode,
    background: &PackedBackground,
    depth: u32,
) -> IcetStrategiesResult<Option<DenseImage>> {
    if group.len() == 1 {
        return Ok(Some(image));
    }
    let mid = group.len() / 2;
    let home_is_left = group[..mid].contains(&dest);
    let (home, away) = if home_is_left {
        (&group[..mid], &group[mid..])
    } else {
        (&group[mid..], &group[..mid])
    };
    let away_rep = away[0];
    let my_rank = comm.rank();
    let tag = BINARY_TREE_TAG_BASE + depth as i32;

    if home.contains(&my_rank) {
        let result = binary_tree_reduce(comm, home, dest, image, mode, background, depth + 1)?;
        if my_rank == dest {
            let mut mine = result.expect("dest always reduces to a local image");
            let incoming = recv_sparse(comm, away_rep, tag)?;
            // `away` sits on the opposite side of `dest` in composite order
            // from `home`: over it when `home` is the lower half, under it
            // otherwise.
            composite_into_dense(&incoming, &mut mine, 0, 0, mode, home_is_left)?;
            Ok(Some(mine))
        } else {
            Ok(None)
        }
    } else {
        let result = binary_tree_reduce(comm, away, away_rep, image, mode, background, depth + 1)?;
        if my_rank == away_rep {
            let mine = result.expect("away representative always reduces to a local image");
            let compressed = compress(&mine, mode, background.far_depth)?;
            send_sparse(comm, dest, tag, &compressed)?;
        }
        Ok(None)
    }
}

/// Splits `count` into `parts` pieces that sum back to `count`, handing
/// the remainder out one pixel at a time starting from piece 0.
/// spec.md §4.8 bswap "partition sizes account for non-even divisions".
fn partition_sizes(count: usize, parts: usize) -> Vec<usize> {
    let base = count / parts;
    let remainder = count % parts;
    (0..parts).map(|i| base + if i < remainder { 1 } else { 0 }).collect()
}

/// For a bswap/radix-k group of `group_len` positions reducing a range
/// of `total_count` pixels starting at `base_offset`, computes each
/// position's final (offset, count) after the full recursive split,
/// without performing any communication. The communication recursion
/// and the final gather step both derive their partitioning from this
/// function so they necessarily agree.
fn bswap_final_ranges(group_len: usize, base_offset: usize, total_count: usize) -> Vec<(usize, usize)> {
    if group_len <= 1 {
        return vec![(base_offset, total_count); group_len.max(1)][..group_len].to_vec();
    }
    let mid = group_len / 2;
    let sizes = partition_sizes(total_count, 2);
    let left_count = sizes[0];
    let right_count = sizes[1];
    let mut left = bswap_final_ranges(mid, base_offset, left_count);
    let right = bswap_final_ranges(group_len - mid, base_offset + left_count, right_count);
    left.extend(right);
    left
}

/// Binary-swap reduction: every round halves both the process group and
/// the pixel range each side owns, exchanging the complementary halves
/// with a positional partner in the other half. Non-power-of-two group
/// sizes are handled by always giving the (never shorter) upper half one
/// partner per lower-half member; an unmatched upper-half member simply
/// carries its slice forward uncomposited for that round — a
/// simplification against the spec's literal prefix/remainder recursion,
/// recorded in DESIGN.md. spec.md §4.8 "binary-swap".
fn binary_swap_reduce(
    comm: &dyn Communicator,
    group: &[i32],
    dest: i32,
    image: DenseImage,
    mode: CompositeMode,
    background: &PackedBackground,
) -> IcetStrategiesResult<Option<DenseImage>> {
    let total = image.num_pixels();
    let (final_offset, final_count, piece) = bswap_round(comm, group, image, 0, total, mode, background, 0)?;

    let my_rank = comm.rank();
    if my_rank == dest {
        let mut result = DenseImage::new(piece.format(), piece.width(), piece.height());
        DenseImage::copy_pixels(&piece, 0, &mut result, final_offset, final_count)
            .map_err(|_| IcetStrategiesError::Codec)?;
        let ranges = bswap_final_ranges(group.len(), 0, total);
        for (idx, &rank) in group.iter().enumerate() {
            if rank == dest {
                continue;
            }
            let (offset, count) = ranges[idx];
            let tag = BSWAP_GATHER_TAG_BASE + idx as i32;
            let incoming = recv_sparse(comm, rank, tag)?;
            let fragment = decompress(&incoming, background)?;
            DenseImage::copy_pixels(&fragment, 0, &mut result, offset, count)
                .map_err(|_| IcetStrategiesError::Codec)?;
        }
        Ok(Some(result))
    } else {
        let idx = group.iter().position(|r| *r == my_rank).ok_or(IcetStrategiesError::InvalidGroup)?;
        let compressed = compress_range(&piece, mode, background.far_depth, final_offset, final_count)?;
        let tag = BSWAP_GATHER_TAG_BASE + idx as i32;
        send_sparse(comm, dest, tag, &compressed)?;
        Ok(None)
    }
}

fn bswap_round(
    comm: &dyn Communicator,
    group: &[i32],
    mut image: DenseImage,
    offset: usize,
    count: usize,
    mode: CompositeMode,
    background: &PackedBackground,
    depth: u32,
) -> IcetStrategiesResult<(usize, usize, DenseImage)> {
    if group.len() <= 1 {
        return Ok((offset, count, image));
    }
    let mid = group.len() / 2;
    let left = &group[..mid];
    let right = &group[mid..];
    let sizes = partition_sizes(count, 2);
    let left_count = sizes[0];
    let right_count = sizes[1];
    let my_rank = comm.rank();
    let tag = BSWAP_TAG_BASE + depth as i32;

    if let Some(idx) = left.iter().position(|r| *r == my_rank) {
        // right is never shorter than left, so a positional partner
        // always exists.
        let partner = right[idx];
        let outgoing = compress_range(&image, mode, background.far_depth, offset + left_count, right_count)?;
        let incoming = exchange_sparse(comm, partner, tag, &outgoing)?;
        // `right` sits over `left` in composite order.
        composite_into_dense_range(&incoming, &mut image, offset, mode, true)?;
        bswap_round(comm, left, image, offset, left_count, mode, background, depth + 1)
    } else if let Some(idx) = right.iter().position(|r| *r == my_rank) {
        if idx < left.len() {
            let partner = left[idx];
            let outgoing = compress_range(&image, mode, background.far_depth, offset, left_count)?;
            let incoming = exchange_sparse(comm, partner, tag, &outgoing)?;
            composite_into_dense_range(&incoming, &mut image, offset + left_count, mode, false)?;
        }
        bswap_round(comm, right, image, offset + left_count, right_count, mode, background, depth + 1)
    } else {
        Err(IcetStrategiesError::InvalidGroup)
    }
}

/// Factors `n` into a sequence of factors each `>= 2` multiplying back
/// to `n`, preferring divisors close to `magic_k` and falling back to
/// any available divisor, then to `n` itself for large primes. spec.md
/// §4.8 "radix-k", tested by S6.
pub fn factor_sequence(mut n: u32, magic_k: u32) -> Vec<u32> {
    let mut factors = Vec::new();
    while n > 1 {
        let mut chosen = None;
        let mut k = magic_k.min(n);
        while k >= 2 {
            if n % k == 0 {
                chosen = Some(k);
                break;
            }
            k -= 1;
        }
        let factor = chosen.unwrap_or(n);
        factors.push(factor);
        n /= factor;
    }
    factors
}

/// Generalizes bswap to an arbitrary per-round radix: each round splits
/// `group` into `k` contiguous blocks, and every process exchanges its
/// complementary pieces with its `k - 1` positional partners in the
/// other blocks (an all-to-all within the round's k-group), then
/// recurses inside its own block with the remaining factors. spec.md
/// §4.8 "radix-k".
fn radix_k_reduce(
    comm: &dyn Communicator,
    group: &[i32],
    dest: i32,
    image: DenseImage,
    mode: CompositeMode,
    background: &PackedBackground,
    magic_k: u32,
) -> IcetStrategiesResult<Option<DenseImage>> {
    let factors = factor_sequence(group.len() as u32, magic_k);
    let total = image.num_pixels();
    let (final_offset, final_count, piece) =
        radix_round(comm, group, image, 0, total, mode, background, &factors, 0, 0)?;

    let my_rank = comm.rank();
    if my_rank == dest {
        let mut result = DenseImage::new(piece.format(), piece.width(), piece.height());
        DenseImage::copy_pixels(&piece, 0, &mut result, final_offset, final_count)
            .map_err(|_| IcetStrategiesError::Codec)?;
        let ranges = radix_final_ranges(group.len(), &factors, 0, 0, total);
        for (idx, &rank) in group.iter().enumerate() {
            if rank == dest {
                continue;
            }
            let (offset, count) = ranges[idx];
            let tag = RADIX_TAG_BASE + 900 + idx as i32;
            let incoming = recv_sparse(comm, rank, tag)?;
            let fragment = decompress(&incoming, background)?;
            DenseImage::copy_pixels(&fragment, 0, &mut result, offset, count)
                .map_err(|_| IcetStrategiesError::Codec)?;
        }
        Ok(Some(result))
    } else {
        let idx = group.iter().position(|r| *r == my_rank).ok_or(IcetStrategiesError::InvalidGroup)?;
        let compressed = compress_range(&piece, mode, background.far_depth, final_offset, final_count)?;
        let tag = RADIX_TAG_BASE + 900 + idx as i32;
        send_sparse(comm, dest, tag, &compressed)?;
        Ok(None)
    }
}

#[allow(clippy::too_many_arguments)]
fn radix_round(
    comm: &dyn Communicator,
    group: &[i32],
    mut image: DenseImage,
    offset: usize,
    count: usize,
    mode: CompositeMode,
    background: &PackedBackground,
    factors: &[u32],
    factor_idx: usize,
    depth: u32,
) -> IcetStrategiesResult<(usize, usize, DenseImage)> {
    if factor_idx >= factors.len() || group.len() <= 1 {
        return Ok((offset, count, image));
    }
    let k = factors[factor_idx] as usize;
    let chunk_size = group.len() / k;
    let my_rank = comm.rank();
    let idx = group.iter().position(|r| *r == my_rank).ok_or(IcetStrategiesError::InvalidGroup)?;
    let my_chunk = idx / chunk_size;
    let pos_in_chunk = idx % chunk_size;

    let piece_sizes = partition_sizes(count, k);
    let mut piece_offsets = vec![offset];
    for size in &piece_sizes {
        piece_offsets.push(piece_offsets.last().unwrap() + size);
    }

    for other_chunk in 0..k {
        if other_chunk == my_chunk {
            continue;
        }
        let partner = group[other_chunk * chunk_size + pos_in_chunk];
        let tag = RADIX_TAG_BASE + depth as i32 * 1024 + (my_chunk.min(other_chunk) as i32) * 32 + my_chunk.max(other_chunk) as i32;
        let outgoing = compress_range(
            &image,
            mode,
            background.far_depth,
            piece_offsets[other_chunk],
            piece_sizes[other_chunk],
        )?;
        let incoming = exchange_sparse(comm, partner, tag, &outgoing)?;
        // Chunks are ordered the same way `group` is: a higher chunk
        // index sits over a lower one in composite order.
        composite_into_dense_range(&incoming, &mut image, piece_offsets[my_chunk], mode, other_chunk > my_chunk)?;
    }

    let next_group = &group[my_chunk * chunk_size..(my_chunk + 1) * chunk_size];
    radix_round(
        comm,
        next_group,
        image,
        piece_offsets[my_chunk],
        piece_sizes[my_chunk],
        mode,
        background,
        factors,
        factor_idx + 1,
        depth + 1,
    )
}

#[allow(clippy::too_many_arguments)]
fn radix_final_ranges(
    group_len: usize,
    factors: &[u32],
    factor_idx: usize,
    base_offset: usize,
    total_count: usize,
) -> Vec<(usize, usize)> {
    if factor_idx >= factors.len() || group_len <= 1 {
        return vec![(base_offset, total_count); group_len];
    }
    let k = factors[factor_idx] as usize;
    let chunk_size = group_len / k;
    let piece_sizes = partition_sizes(total_count, k);
    let mut piece_offsets = vec![base_offset];
    for size in &piece_sizes {
        piece_offsets.push(piece_offsets.last().unwrap() + size);
    }
    let mut ranges = Vec::with_capacity(group_len);
    for chunk in 0..k {
        ranges.extend(radix_final_ranges(
            chunk_size,
            factors,
            factor_idx + 1,
            piece_offsets[chunk],
            piece_sizes[chunk],
        ));
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_sequence_multiplies_back_to_group_size() {
        for n in 2u32..64 {
            for &magic_k in &[2u32, 4, 8] {
                let factors = factor_sequence(n, magic_k);
                let product: u32 = factors.iter().product();
                assert_eq!(product, n, "n={n} magic_k={magic_k}");
                assert!(factors.iter().all(|&f| f >= 2));
                let max_factors = (n as f64).log2().floor() as usize;
                assert!(factors.len() <= max_factors.max(1), "n={n} magic_k={magic_k} factors={factors:?}");
            }
        }
    }

    #[test]
    fn partition_sizes_sums_to_total() {
        assert_eq!(partition_sizes(10, 3), vec![4, 3, 3]);
        assert_eq!(partition_sizes(9, 3), vec![3, 3, 3]);
        assert_eq!(partition_sizes(0, 4), vec![0, 0, 0, 0]);
    }

    #[test]
    fn bswap_final_ranges_partition_the_whole_image() {
        let ranges = bswap_final_ranges(5, 0, 100);
        assert_eq!(ranges.len(), 5);
        let mut covered = vec![false; 100];
        for (offset, count) in ranges {
            for i in offset..offset + count {
                assert!(!covered[i], "pixel {i} covered twice");
                covered[i] = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
    }
}
