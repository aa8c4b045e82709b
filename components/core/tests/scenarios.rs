/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

//! End-to-end scenarios from spec.md §8, driven through the public
//! `icet_core` facade over an in-process `LocalGroup`. Several of these
//! properties also have narrower unit tests closer to the crate that
//! owns the behavior (codec run-length transitions in `icet-codec`,
//! eye-plane straddling in `icet-projection`, radix-k factorization in
//! `icet-strategies`); these scenarios additionally exercise them
//! through a full `draw_frame` call so a regression in how the pieces
//! are wired together (not just in one piece) would show up here too.

use euclid::default::Rect;

use icet_core::{
    draw_frame, ColorFormat, CompositeMode, Context, DenseImage, DepthFormat, DrawCallback,
    ImageFormat, LocalGroup, Matrix4, MultiTileStrategy, PackedBackground, SingleImageStrategy,
};

fn solid_callback(format: ImageFormat, color: [u8; 4]) -> Box<DrawCallback> {
    Box::new(move |_proj, _mv, _bg, viewport| {
        let mut image = DenseImage::new(format, viewport.size.width, viewport.size.height);
        for px in image.color_plane_mut().chunks_mut(4) {
            px.copy_from_slice(&color);
        }
        image
    })
}

/// S1: two ranks, one tile. Rank 0's bounds project entirely off the
/// global viewport (so it never contributes); rank 1's bounds cover the
/// whole screen and it renders solid white. The displaying rank (0)
/// must see exactly rank 1's contribution; the non-displaying rank gets
/// back an empty image. spec.md §8 "Two-process cover".
#[test]
fn s1_two_process_cover() {
    let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::None);
    let comms = LocalGroup::new(2);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            std::thread::spawn(move || {
                let rank = comm.rank();
                let mut ctx = Context::new(Box::new(comm), format);
                ctx.state.tiles.add_tile(Rect::new((0, 0).into(), (64, 64).into()), 0).unwrap();
                ctx.state.composite_mode = CompositeMode::Blend;
                ctx.set_draw_callback(solid_callback(format, [255, 255, 255, 255]));

                let projection = Matrix4::identity();
                let modelview = Matrix4::identity();
                let bounds_vertices: Vec<[f32; 3]> = if rank == 0 {
                    // A single point far outside the unit cube projects to
                    // a degenerate (zero-area) screen rectangle that falls
                    // entirely outside the global viewport.
                    vec![[100.0, 100.0, 0.0]]
                } else {
                    vec![
                        [-1.0, -1.0, 0.0],
                        [1.0, -1.0, 0.0],
                        [1.0, 1.0, 0.0],
                        [-1.0, 1.0, 0.0],
                    ]
                };

                let image = draw_frame(&mut ctx, &projection, &modelview, &bounds_vertices).unwrap();
                if rank == 0 {
                    assert_eq!((image.width(), image.height()), (64, 64));
                    assert!(image.color_plane().chunks(4).all(|px| px == &[255u8, 255, 255, 255]));
                } else {
                    assert_eq!((image.width(), image.height()), (0, 0));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

/// S2: four ranks each own a disjoint quarter of a tile's pixels (by a
/// mod-4 checkerboard), at distinct depths, so Z-buffer compositing
/// must pick exactly one contributor per pixel with no blending. This
/// forces the sparse codec through several active/inactive run
/// transitions per scanline. spec.md §8 "Codec stress".
#[test]
fn s2_codec_stress_checkerboard() {
    const TILE: i32 = 8;
    let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::Float);
    let colors: [[u8; 4]; 4] = [
        [255, 0, 0, 255],
        [0, 255, 0, 255],
        [0, 0, 255, 255],
        [255, 255, 0, 255],
    ];

    let comms = LocalGroup::new(4);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            std::thread::spawn(move || {
                let rank = comm.rank();
                let mut ctx = Context::new(Box::new(comm), format);
                ctx.state.tiles.add_tile(Rect::new((0, 0).into(), (TILE, TILE).into()), 0).unwrap();
                ctx.state.composite_mode = CompositeMode::ZBuffer;

                let color = colors[rank as usize];
                ctx.set_draw_callback(Box::new(move |_proj, _mv, _bg, viewport| {
                    let mut image = DenseImage::new(format, viewport.size.width, viewport.size.height);
                    for y in 0..viewport.size.height {
                        for x in 0..viewport.size.width {
                            let gx = viewport.origin.x + x;
                            let gy = viewport.origin.y + y;
                            let active = (gx + gy).rem_euclid(4) == rank;
                            let idx = (y * viewport.size.width + x) as usize;
                            let depth: f32 = if active { 0.1 * rank as f32 } else { 1.0 };
                            image.depth_plane_mut()[idx * 4..idx * 4 + 4]
                                .copy_from_slice(&depth.to_ne_bytes());
                            let px = if active { color } else { [0, 0, 0, 0] };
                            image.color_plane_mut()[idx * 4..idx * 4 + 4].copy_from_slice(&px);
                        }
                    }
                    image
                }));

                let projection = Matrix4::identity();
                let modelview = Matrix4::identity();
                let image = draw_frame(&mut ctx, &projection, &modelview, &[]).unwrap();

                if rank == 0 {
                    assert_eq!((image.width(), image.height()), (TILE, TILE));
                    for y in 0..TILE {
                        for x in 0..TILE {
                            let owner = ((x + y).rem_euclid(4)) as usize;
                            let idx = (y * TILE + x) as usize;
                            let px = &image.color_plane()[idx * 4..idx * 4 + 4];
                            assert_eq!(px, &colors[owner], "pixel ({x},{y}) should belong to rank {owner}");
                        }
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

/// S4: every `MultiTileStrategy` must agree on the final image for the
/// same input, as long as composite order doesn't matter (Z-buffer, no
/// composite order configured — split/vtree don't honor one anyway).
/// Three ranks render the same two tiles at distinct depths so the
/// nearest rank always wins regardless of how contributors are grouped
/// or reduced. spec.md §8 "Strategy agreement".
#[test]
fn s4_multi_tile_strategies_agree() {
    const TILE: i32 = 16;
    let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::Float);

    fn run(strategy: MultiTileStrategy) -> (DenseImage, DenseImage) {
        let comms = LocalGroup::new(3);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                std::thread::spawn(move || {
                    let rank = comm.rank();
                    let mut ctx = Context::new(Box::new(comm), format);
                    ctx.state.tiles.add_tile(Rect::new((0, 0).into(), (TILE, TILE).into()), 0).unwrap();
                    ctx.state.tiles.add_tile(Rect::new((TILE, 0).into(), (TILE, TILE).into()), 1).unwrap();
                    ctx.state.composite_mode = CompositeMode::ZBuffer;
                    ctx.state.strategy = strategy;
                    ctx.state.single_image_strategy = SingleImageStrategy::Automatic;

                    let depth = 0.1 * rank as f32;
                    let color = [(rank * 80) as u8, 0, 255 - (rank * 80) as u8, 255];
                    ctx.set_draw_callback(Box::new(move |_proj, _mv, _bg, viewport| {
                        let mut image = DenseImage::new(format, viewport.size.width, viewport.size.height);
                        for px in image.color_plane_mut().chunks_mut(4) {
                            px.copy_from_slice(&color);
                        }
                        for d in image.depth_plane_mut().chunks_mut(4) {
                            d.copy_from_slice(&depth.to_ne_bytes());
                        }
                        image
                    }));

                    let projection = Matrix4::identity();
                    let modelview = Matrix4::identity();
                    let image = draw_frame(&mut ctx, &projection, &modelview, &[]).unwrap();
                    (rank, image)
                })
            })
            .collect();

        let mut tile0 = None;
        let mut tile1 = None;
        for h in handles {
            let (rank, image) = h.join().unwrap();
            match rank {
                0 => tile0 = Some(image),
                1 => tile1 = Some(image),
                _ => {}
            }
        }
        (tile0.unwrap(), tile1.unwrap())
    }

    let strategies = [
        MultiTileStrategy::Direct,
        MultiTileStrategy::Sequential,
        MultiTileStrategy::Reduce,
        MultiTileStrategy::Split,
        MultiTileStrategy::Vtree,
    ];
    let (expected0, expected1) = run(strategies[0]);
    for &strategy in &strategies[1..] {
        let (tile0, tile1) = run(strategy);
        assert_eq!(tile0, expected0, "{strategy:?} disagreed with {:?} on tile 0", strategies[0]);
        assert_eq!(tile1, expected1, "{strategy:?} disagreed with {:?} on tile 1", strategies[0]);
    }
    // Rank 0 has the nearest depth everywhere, so it must win both tiles.
    assert!(expected0.color_plane().chunks(4).all(|px| px == &[0u8, 0, 255, 255]));
    assert!(expected1.color_plane().chunks(4).all(|px| px == &[0u8, 0, 255, 255]));
}

/// S5: a tile nobody's bounds touch displays as plain background, not
/// an uninitialized or zeroed buffer. spec.md §8 "Blank tiles".
#[test]
fn s5_blank_tile_shows_background() {
    const TILE: i32 = 16;
    let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::None);
    let background = [0.2f32, 0.4, 0.6, 1.0];

    let comms = LocalGroup::new(2);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            std::thread::spawn(move || {
                let rank = comm.rank();
                let mut ctx = Context::new(Box::new(comm), format);
                ctx.state.tiles.add_tile(Rect::new((0, 0).into(), (TILE, TILE).into()), 0).unwrap();
                ctx.state.tiles.add_tile(Rect::new((TILE, 0).into(), (TILE, TILE).into()), 1).unwrap();
                ctx.state.composite_mode = CompositeMode::Blend;
                ctx.state.background = PackedBackground::new(background);
                ctx.set_draw_callback(solid_callback(format, [255, 255, 255, 255]));

                let projection = Matrix4::identity();
                let modelview = Matrix4::identity();
                // Both ranks' geometry sits entirely within tile 0's half
                // of the global viewport (screen x in [0, TILE)); tile 1
                // never gets a contributor.
                let bounds_vertices = [
                    [-1.0, -1.0, 0.0],
                    [0.0, -1.0, 0.0],
                    [0.0, 1.0, 0.0],
                    [-1.0, 1.0, 0.0],
                ];

                let image = draw_frame(&mut ctx, &projection, &modelview, &bounds_vertices).unwrap();
                if rank == 1 {
                    assert_eq!((image.width(), image.height()), (TILE, TILE));
                    let expected = PackedBackground::new(background).rgba_ubyte;
                    assert!(image.color_plane().chunks(4).all(|px| px == &expected));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

/// S6: radix-k factorization is unit-tested directly in `icet-strategies`
/// (`single_image.rs`); this exercises the same code path end to end
/// through `draw_frame` with an explicit `RadixK` magic number over a
/// rank count that doesn't divide evenly, confirming the factorization
/// still reduces correctly when reached via the full frame driver.
#[test]
fn s6_radix_k_through_frame_driver() {
    const TILE: i32 = 8;
    let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::Float);
    const RANKS: i32 = 5;

    let comms = LocalGroup::new(RANKS);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            std::thread::spawn(move || {
                let rank = comm.rank();
                let mut ctx = Context::new(Box::new(comm), format);
                ctx.state.tiles.add_tile(Rect::new((0, 0).into(), (TILE, TILE).into()), 0).unwrap();
                ctx.state.composite_mode = CompositeMode::ZBuffer;
                ctx.state.strategy = MultiTileStrategy::Sequential;
                ctx.state.single_image_strategy = SingleImageStrategy::RadixK { magic_k: 3 };

                let depth = 0.1 * rank as f32;
                let color = [(rank * 50) as u8, 0, 0, 255];
                ctx.set_draw_callback(Box::new(move |_proj, _mv, _bg, viewport| {
                    let mut image = DenseImage::new(format, viewport.size.width, viewport.size.height);
                    for px in image.color_plane_mut().chunks_mut(4) {
                        px.copy_from_slice(&color);
                    }
                    for d in image.depth_plane_mut().chunks_mut(4) {
                        d.copy_from_slice(&depth.to_ne_bytes());
                    }
                    image
                }));

                let projection = Matrix4::identity();
                let modelview = Matrix4::identity();
                let image = draw_frame(&mut ctx, &projection, &modelview, &[]).unwrap();
                if rank == 0 {
                    assert_eq!((image.width(), image.height()), (TILE, TILE));
                    assert!(image.color_plane().chunks(4).all(|px| px == &[0u8, 0, 0, 255]));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}
