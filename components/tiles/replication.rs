/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use euclid::default::Rect;

/// How a data-replication group divides the rendering load for a
/// frame. spec.md §4.7 "Data replication", grounded on
/// `original_source/src/ice-t/state.c`'s bucket-bisection helpers
/// (`buckets.c`).
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationPlan {
    /// `group_size >= num_tiles`: tile `i` is rendered solely by group
    /// member `assignment[i]`.
    PerTile(Vec<usize>),
    /// `group_size < num_tiles`: every member renders all tiles, but
    /// only within its own sub-rectangle of the contained viewport.
    Bisected(Vec<Rect<i32>>),
}

pub fn plan_replication(group_size: usize, num_tiles: usize, viewport: Rect<i32>) -> ReplicationPlan {
    if group_size == 0 {
        return ReplicationPlan::Bisected(vec![]);
    }
    if num_tiles > 0 && group_size >= num_tiles {
        ReplicationPlan::PerTile((0..num_tiles).map(|t| t % group_size).collect())
    } else {
        ReplicationPlan::Bisected(bisect_viewport(viewport, group_size))
    }
}

/// Recursively bisects `viewport` along its longer axis into `parts`
/// near-equal sub-rectangles.
pub fn bisect_viewport(viewport: Rect<i32>, parts: usize) -> Vec<Rect<i32>> {
    if parts <= 1 {
        return vec![viewport];
    }
    let left_n = parts / 2;
    let right_n = parts - left_n;
    let (a, b) = split_longer_axis(viewport, left_n, right_n);
    let mut out = bisect_viewport(a, left_n);
    out.extend(bisect_viewport(b, right_n));
    out
}

fn split_longer_axis(viewport: Rect<i32>, left_n: usize, right_n: usize) -> (Rect<i32>, Rect<i32>) {
    let total = (left_n + right_n) as i64;
    if viewport.size.width >= viewport.size.height {
        let left_w = (viewport.size.width as i64 * left_n as i64 / total) as i32;
        let a = Rect::new(viewport.origin, (left_w, viewport.size.height).into());
        let b = Rect::new(
            (viewport.origin.x + left_w, viewport.origin.y).into(),
            (viewport.size.width - left_w, viewport.size.height).into(),
        );
        (a, b)
    } else {
        let left_h = (viewport.size.height as i64 * left_n as i64 / total) as i32;
        let a = Rect::new(viewport.origin, (viewport.size.width, left_h).into());
        let b = Rect::new(
            (viewport.origin.x, viewport.origin.y + left_h).into(),
            (viewport.size.width, viewport.size.height - left_h).into(),
        );
        (a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bisection_covers_the_viewport_without_overlap() {
        let viewport = Rect::new((0, 0).into(), (100, 50).into());
        let parts = bisect_viewport(viewport, 3);
        assert_eq!(parts.len(), 3);
        let total_area: i64 = parts
            .iter()
            .map(|r| r.size.width as i64 * r.size.height as i64)
            .sum();
        assert_eq!(total_area, 100 * 50);
    }

    #[test]
    fn plan_assigns_per_tile_when_group_covers_all_tiles() {
        let viewport = Rect::new((0, 0).into(), (10, 10).into());
        let plan = plan_replication(4, 3, viewport);
        assert_eq!(plan, ReplicationPlan::PerTile(vec![0, 1, 2]));
    }
}
