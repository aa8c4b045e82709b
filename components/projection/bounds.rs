/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use euclid::default::Rect;

use crate::matrix::Matrix4;

/// The result of projecting a set of bounding vertices through the
/// current view: a screen-space rectangle plus a clip-space depth
/// range. spec.md §4.4.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainedBounds {
    pub viewport: Rect<i32>,
    pub znear: f32,
    pub zfar: f32,
}

impl ContainedBounds {
    /// Whether this result could contribute to anything: an empty
    /// screen rectangle means no bounds were ever accumulated.
    pub fn is_empty(&self) -> bool {
        self.viewport.is_empty()
    }

    /// spec.md §4.4: "a tile is contained iff the contained viewport
    /// intersects its rectangle and znear ≤ 1 ∧ zfar ≥ −1".
    pub fn contains_tile(&self, tile: Rect<i32>) -> bool {
        !self.is_empty() && self.viewport.intersects(&tile) && self.znear <= 1.0 && self.zfar >= -1.0
    }
}

/// Projects `vertices` (object-space, `[x, y, z]`) through `modelview`
/// then `projection`, and reports the tightest screen rectangle and
/// clip-space depth range within `global_viewport`. spec.md §4.4.
///
/// Vertices with `w ≤ 0` sit behind or on the eye plane; a perspective
/// divide on them would be meaningless, so per spec they're treated as
/// covering the entire screen in x/y and extending the depth range to
/// both infinities, ensuring geometry that straddles the near plane
/// never under-reports its footprint.
pub fn project_bounds(
    projection: &Matrix4,
    modelview: &Matrix4,
    vertices: &[[f32; 3]],
    global_viewport: Rect<i32>,
) -> ContainedBounds {
    if vertices.is_empty() {
        return ContainedBounds {
            viewport: global_viewport,
            znear: -1.0,
            zfar: 1.0,
        };
    }

    let combined = projection.mul(modelview);
    let gvp_x = global_viewport.origin.x as f32;
    let gvp_y = global_viewport.origin.y as f32;
    let gvp_w = global_viewport.size.width as f32;
    let gvp_h = global_viewport.size.height as f32;

    let mut x_min = f32::INFINITY;
    let mut x_max = f32::NEG_INFINITY;
    let mut y_min = f32::INFINITY;
    let mut y_max = f32::NEG_INFINITY;
    let mut z_min = f32::INFINITY;
    let mut z_max = f32::NEG_INFINITY;

    for v in vertices {
        let clip = combined.transform_homogeneous([v[0], v[1], v[2], 1.0]);
        let w = clip[3];
        if w <= 0.0 {
            x_min = gvp_x;
            x_max = gvp_x + gvp_w;
            y_min = gvp_y;
            y_max = gvp_y + gvp_h;
            z_min = f32::NEG_INFINITY;
            z_max = f32::INFINITY;
            continue;
        }
        let screen_x = 0.5 * (clip[0] / w + 1.0) * gvp_w + gvp_x;
        let screen_y = 0.5 * (clip[1] / w + 1.0) * gvp_h + gvp_y;
        let z = clip[2] / w;
        x_min = x_min.min(screen_x);
        x_max = x_max.max(screen_x);
        y_min = y_min.min(screen_y);
        y_max = y_max.max(screen_y);
        z_min = z_min.min(z);
        z_max = z_max.max(z);
    }

    let raw = Rect::new(
        (x_min.floor() as i32, y_min.floor() as i32).into(),
        ((x_max - x_min).ceil() as i32, (y_max - y_min).ceil() as i32).into(),
    );
    let viewport = raw.intersection(&global_viewport).unwrap_or(Rect::zero());

    ContainedBounds {
        viewport,
        znear: z_min,
        zfar: z_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_bounds_contains_everything() {
        let global = Rect::new((0, 0).into(), (800, 600).into());
        let result = project_bounds(&Matrix4::identity(), &Matrix4::identity(), &[], global);
        assert_eq!(result.viewport, global);
    }

    #[test]
    fn straddling_eye_plane_covers_the_full_viewport() {
        let global = Rect::new((0, 0).into(), (512, 512).into());
        let projection = Matrix4::frustum(-1.0, 1.0, -1.0, 1.0, 1.0, 2.0);
        let modelview = Matrix4::translation(0.0, 0.0, -1.5).mul(&Matrix4::scale(10.0, 10.0, 10.0));
        let vertices = [
            [-1.0, -1.0, -0.001],
            [1.0, -1.0, -0.001],
            [1.0, 1.0, -0.001],
            [-1.0, 1.0, -0.001],
            [-1.0, -1.0, 0.001],
            [1.0, -1.0, 0.001],
            [1.0, 1.0, 0.001],
            [-1.0, 1.0, 0.001],
        ];
        let result = project_bounds(&projection, &modelview, &vertices, global);
        assert_eq!(result.viewport, global);
    }

    #[test]
    fn contains_tile_requires_depth_range_overlap() {
        let global = Rect::new((0, 0).into(), (100, 100).into());
        let bounds = ContainedBounds {
            viewport: global,
            znear: 2.0,
            zfar: 3.0,
        };
        assert!(!bounds.contains_tile(global));
    }
}
