/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

//! The per-frame protocol of spec.md §4.6, component C6. Ties together
//! C1 (allgather), C4 (bounds projection), C5 (contribution counting and
//! replication bisection), and C7 (the multi-tile strategy dispatch)
//! around one user-supplied draw callback.

use euclid::default::{Point2D, Rect};
use icet_image::{CompositeMode, DenseImage, PackedBackground};
use icet_projection::{project_bounds, Matrix4};
use icet_strategies::composite_multi_tile;
use icet_tiles::{gather_contributions, plan_replication, ReplicationPlan, Tile};

use crate::context::{Context, DrawCallback};
use crate::error::{IcetError, IcetResult};
use crate::timing::Stopwatch;

/// How this rank's rendering of one tile is restricted by a configured
/// data-replication group, resolved once per frame (not per tile).
/// spec.md §4.7 "Data replication".
enum ReplicationDecision {
    /// Group covers every tile: only the member at `assignment[tile]`
    /// actually renders it; everyone else treats it as if blank, which
    /// is harmless since a background-only contribution composites as
    /// the identity (spec.md Testable Property 3) — it only inflates
    /// `tile_contrib_counts` for tiles this rank doesn't really render,
    /// a deliberate simplification recorded in DESIGN.md.
    PerTile { my_pos: usize, assignment: Vec<usize> },
    /// Group is smaller than the tile count: every member renders every
    /// tile it touches, but only within its own sub-rectangle.
    Bisected(Rect<i32>),
}

/// Runs one frame: projects `bounds_vertices` through `projection` and
/// `modelview`, determines per-tile contributions, dispatches to the
/// configured multi-tile strategy, and returns the image for whichever
/// tile (if any) this process displays. spec.md §4.6.
pub fn draw_frame(
    ctx: &mut Context,
    projection: &Matrix4,
    modelview: &Matrix4,
    bounds_vertices: &[[f32; 3]],
) -> IcetResult<DenseImage> {
    if ctx.in_frame {
        return Err(ctx.record_error(
            IcetError::InvalidOperation,
            "draw_frame called recursively on the same context",
        ));
    }
    if ctx.draw_callback.is_none() {
        return Err(ctx.record_error(
            IcetError::InvalidOperation,
            "draw_frame called with no draw callback configured",
        ));
    }
    if ctx.state.tiles.is_empty() {
        return Err(ctx.record_error(
            IcetError::InvalidOperation,
            "draw_frame called with no tiles configured",
        ));
    }

    ctx.in_frame = true;
    ctx.state.timing.reset();
    let mut callback = ctx.draw_callback.take().expect("checked above");
    let result = run_frame(ctx, callback.as_mut(), projection, modelview, bounds_vertices);
    ctx.draw_callback = Some(callback);
    ctx.in_frame = false;
    result
}

fn run_frame(
    ctx: &mut Context,
    callback: &mut DrawCallback,
    projection: &Matrix4,
    modelview: &Matrix4,
    bounds_vertices: &[[f32; 3]],
) -> IcetResult<DenseImage> {
    let frame_clock = Stopwatch::start();

    let original_background = ctx.state.background;
    let use_bg_correction = ctx.state.composite_order.is_some()
        && ctx.state.blend_background_correction
        && ctx.state.composite_mode == CompositeMode::Blend;
    let background = if use_bg_correction {
        PackedBackground::transparent_black()
    } else {
        original_background
    };

    let global_viewport = ctx.state.tiles.global_viewport();
    let bounds = project_bounds(projection, modelview, bounds_vertices, global_viewport);
    ctx.state.contained_viewport = Some(bounds);

    let contributions = gather_contributions(ctx.comm.as_ref(), &ctx.state.tiles, &bounds)
        .map_err(|e| ctx.record_error(e.into(), "allgather of contribution masks failed"))?;
    ctx.state.tile_contrib_counts = contributions.tile_contrib_counts.clone();
    ctx.state.total_image_count = contributions.total_image_count;

    let my_rank = ctx.comm.rank();
    let replication = resolve_replication(ctx, my_rank, bounds.viewport);

    let format = ctx.state.format;
    let mode = ctx.state.composite_mode;
    let tiles = ctx.state.tiles.clone();
    let strategy = ctx.state.strategy;
    let single_image_strategy = ctx.state.single_image_strategy;
    let composite_order = ctx.state.composite_order.clone();

    let mut render = |tile_idx: usize| -> DenseImage {
        render_tile(
            callback,
            &tiles.tiles()[tile_idx],
            tile_idx,
            projection,
            modelview,
            &background,
            format,
            &replication,
        )
    };

    let results = composite_multi_tile(
        ctx.comm.as_ref(),
        &tiles,
        &contributions,
        strategy,
        single_image_strategy,
        mode,
        format,
        &background,
        composite_order.as_deref(),
        &mut render,
    )
    .map_err(|e| ctx.record_error(e.into(), "multi-tile strategy failed"))?;

    let mut output = None;
    for (tile_idx, mut image) in results {
        if tiles.tiles()[tile_idx].display_rank == my_rank {
            if use_bg_correction {
                premultiply_under(&mut image, &original_background);
            }
            output = Some(image);
        }
    }

    frame_clock.stop_into(&mut ctx.state.timing.total_draw);

    Ok(output.unwrap_or_else(|| DenseImage::new(format, 0, 0)))
}

fn resolve_replication(ctx: &Context, my_rank: i32, viewport: Rect<i32>) -> Option<ReplicationDecision> {
    let group = ctx.state.replication_group.as_ref()?;
    let my_pos = group.iter().position(|&r| r == my_rank)?;
    match plan_replication(group.len(), ctx.state.tiles.len(), viewport) {
        ReplicationPlan::PerTile(assignment) => {
            Some(ReplicationDecision::PerTile { my_pos, assignment })
        }
        ReplicationPlan::Bisected(rects) => {
            rects.get(my_pos).copied().map(ReplicationDecision::Bisected)
        }
    }
}

fn background_image(format: icet_image::ImageFormat, width: i32, height: i32, background: &PackedBackground) -> DenseImage {
    let mut image = DenseImage::new(format, width, height);
    image.clear(background);
    image
}

/// Produces this process's local contribution for `tile`, invoking the
/// draw callback only over the sub-rectangle data replication assigns to
/// it (if any), and embedding the result into a full tile-sized image
/// via [`DenseImage::copy_region`] so strategies never have to reason
/// about partial tiles.
#[allow(clippy::too_many_arguments)]
fn render_tile(
    callback: &mut DrawCallback,
    tile: &Tile,
    tile_idx: usize,
    projection: &Matrix4,
    modelview: &Matrix4,
    background: &PackedBackground,
    format: icet_image::ImageFormat,
    replication: &Option<ReplicationDecision>,
) -> DenseImage {
    let viewport_rect = match replication {
        Some(ReplicationDecision::PerTile { my_pos, assignment }) => {
            if assignment[tile_idx] != *my_pos {
                return background_image(format, tile.rect.size.width, tile.rect.size.height, background);
            }
            tile.rect
        }
        Some(ReplicationDecision::Bisected(sub_rect)) => match sub_rect.intersection(&tile.rect) {
            Some(r) if !r.is_empty() => r,
            _ => {
                return background_image(format, tile.rect.size.width, tile.rect.size.height, background)
            }
        },
        None => tile.rect,
    };

    let rendered = callback(projection, modelview, background, viewport_rect);
    if viewport_rect == tile.rect {
        return rendered;
    }

    let mut full = background_image(format, tile.rect.size.width, tile.rect.size.height, background);
    let local_src = Rect::new(Point2D::zero(), viewport_rect.size);
    let dst_origin = viewport_rect.origin - tile.rect.origin.to_vector();
    let dst_rect = Rect::new(dst_origin, viewport_rect.size);
    let _ = DenseImage::copy_region(&rendered, local_src, &mut full, dst_rect, background);
    full
}

/// Re-applies `real_background` under the composited result, undoing the
/// transparent-black substitution of spec.md §4.6 step 2. Equivalent to
/// compositing the (already premultiplied) result `over` an opaque
/// background, the same per-channel formula `icet-codec::composite`
/// uses for ordinary fragment compositing.
fn premultiply_under(image: &mut DenseImage, real_background: &PackedBackground) {
    match image.format().color {
        icet_image::ColorFormat::RgbaUByte => {
            let bg = real_background.rgba_ubyte;
            for px in image.color_plane_mut().chunks_mut(4) {
                let sa = px[3] as u32;
                for c in 0..4 {
                    px[c] = ((bg[c] as u32 * (255 - sa)) / 255 + px[c] as u32).min(255) as u8;
                }
            }
        }
        icet_image::ColorFormat::RgbaFloat => {
            let bg = real_background.rgba_float;
            for px in image.color_plane_mut().chunks_mut(16) {
                let sa = f32::from_ne_bytes(px[12..16].try_into().unwrap());
                for c in 0..4 {
                    let s = f32::from_ne_bytes(px[c * 4..c * 4 + 4].try_into().unwrap());
                    let value = bg[c] * (1.0 - sa) + s;
                    px[c * 4..c * 4 + 4].copy_from_slice(&value.to_ne_bytes());
                }
            }
        }
        icet_image::ColorFormat::None => {}
    }
}
