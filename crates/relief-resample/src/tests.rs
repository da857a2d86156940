use super::*;
use relief_geom::Transform;
use relief_terrain::{HeightMip, TileCoord, TileHeightfield};

/// 8x8-texel (7-quad) tile with a deterministic height ramp so mips differ
/// from mip 0 at most positions.
fn ramp_tile(base: TileCoord) -> Tile {
    let ssq = 7usize;
    let size = ssq + 1;
    let mut texels = Vec::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let h = 30000 + (x * 97 + y * 61) as u16 * 8;
            texels.push(HeightTexel {
                height: h,
                normal_x: 120 + (x % 3) as u8,
                normal_y: 130 + (y % 5) as u8,
            });
        }
    }
    let mip0 = HeightMip::new(size, texels, None);
    // mip chain down to Tile::max_lod for ssq = 7
    Tile::new(
        base,
        1,
        ssq,
        Transform::IDENTITY,
        TileHeightfield::with_mip_chain(mip0, 2),
    )
}

struct GridWorld {
    tiles: std::collections::HashMap<TileCoord, Tile>,
}

impl GridWorld {
    fn new(tiles: impl IntoIterator<Item = Tile>) -> Self {
        Self {
            tiles: tiles.into_iter().map(|t| (t.base, t)).collect(),
        }
    }
}

impl NeighborProvider for GridWorld {
    fn tile_at(&self, coord: TileCoord) -> Option<&Tile> {
        self.tiles.get(&coord)
    }
}

#[test]
fn effective_lod_uniform_grid_is_flat() {
    let grid = [[1.0f32; 3]; 3];
    for &(fx, fy) in &[(0.0, 0.0), (-0.5, 0.5), (0.49, -0.32), (0.5, 0.5)] {
        assert_eq!(effective_lod(&grid, fx, fy, 1, 2), 1.0);
    }
}

#[test]
fn effective_lod_picks_quadrant_by_sign() {
    let mut grid = [[0.0f32; 3]; 3];
    grid[1][2] = 2.0; // east
    grid[1][0] = 1.0; // west
    // Full blend at the east edge
    assert_eq!(effective_lod(&grid, 0.5, 0.0, 0, 2), 2.0);
    // Full blend at the west edge
    assert_eq!(effective_lod(&grid, -0.5, 0.0, 0, 2), 1.0);
    // Halfway toward east, 0 north/south contribution
    assert_eq!(effective_lod(&grid, 0.25, 0.0, 0, 2), 1.0);
    // Center is the tile's own value
    assert_eq!(effective_lod(&grid, 0.0, 0.0, 0, 2), 0.0);
    // Clamped below by the target LOD
    assert_eq!(effective_lod(&grid, -0.5, 0.0, 2, 2), 2.0);
}

#[test]
fn neighbor_lod_grid_extrapolates_holes() {
    let mut east = ramp_tile(TileCoord::new(1, 0));
    east.lighting_lod_override = Some(2);
    let center = ramp_tile(TileCoord::new(0, 0));
    let world = GridWorld::new([center, east]);
    let tile = world.tile_at(TileCoord::new(0, 0)).unwrap();

    let grid = neighbor_lod_grid(tile, 0, &world);
    assert_eq!(grid[1][1], 0.0);
    assert_eq!(grid[1][2], 2.0);
    // North hole falls back to the center value
    assert_eq!(grid[0][1], 0.0);
    // NE corner hole falls back to the north edge slot, then east
    assert_eq!(grid[0][2], 2.0);
    // SW corner hole has no present edge slots; center value
    assert_eq!(grid[2][0], 0.0);
}

#[test]
fn matched_lods_direct_sample_without_blending() {
    // All eight neighbors bake at the tile's target LOD: output must be
    // bit-identical to direct mip sampling and never touch the cache.
    let target = 1usize;
    let mut tiles = Vec::new();
    for dy in -1i32..=1 {
        for dx in -1i32..=1 {
            let mut t = ramp_tile(TileCoord::new(dx, dy));
            t.lighting_lod_override = Some(target);
            tiles.push(t);
        }
    }
    let world = GridWorld::new(tiles);
    let tile = world.tile_at(TileCoord::new(0, 0)).unwrap();
    let cache = SampleCache::new();

    let expand = 2usize;
    let buf = resample_tile(tile, target, expand, &world, &cache);
    assert!(cache.is_empty());

    let quads = tile.quads_at_lod(target);
    assert_eq!(buf.size, quads + 2 * expand + 1);
    let mip = tile.heightfield.mip(target);
    for j in 0..=quads {
        for k in 0..=quads {
            assert_eq!(
                buf.texel(expand + k, expand + j),
                mip.texel(k as i32, j as i32),
                "interior texel ({k},{j}) must match the mip exactly"
            );
        }
    }
}

#[test]
fn world_edge_replicates_tile_border() {
    let world = GridWorld::new([ramp_tile(TileCoord::new(0, 0))]);
    let tile = world.tile_at(TileCoord::new(0, 0)).unwrap();
    let cache = SampleCache::new();
    let expand = 3usize;
    let buf = resample_tile(tile, 0, expand, &world, &cache);

    for y in 0..buf.size {
        // Everything west of the tile replicates the west edge column
        for x in 0..expand {
            assert_eq!(buf.texel(x, y), buf.texel(expand, y));
        }
        // And east of it, the east edge column
        for x in buf.size - expand..buf.size {
            assert_eq!(buf.texel(x, y), buf.texel(buf.size - expand - 1, y));
        }
    }
}

#[test]
fn coarse_neighbor_blends_toward_its_edge() {
    let mut east = ramp_tile(TileCoord::new(1, 0));
    east.lighting_lod_override = Some(2);
    let center = ramp_tile(TileCoord::new(0, 0));
    let world = GridWorld::new([center, east]);
    let tile = world.tile_at(TileCoord::new(0, 0)).unwrap();
    let cache = SampleCache::new();

    let expand = 1usize;
    let buf = resample_tile(tile, 0, expand, &world, &cache);
    assert!(!cache.is_empty());

    // West edge of the interior: the effective LOD stays at the target, so
    // the value matches plain mip-0 data.
    let mip0 = tile.heightfield.mip(0);
    let mid = expand + tile.size_quads / 2;
    assert_eq!(buf.texel(expand, mid), mip0.texel(0, (mid - expand) as i32));

    // East edge: fully blended to the neighbor's LOD 2.
    let (bx, by) = tile.base_quad();
    let wq_x = (bx + tile.size_quads as i32) as f32;
    let wq_y = (by + (mid - expand) as i32) as f32;
    let expected = sample_world(tile, &world, wq_x, wq_y, 2).encode().0;
    assert_eq!(buf.texel(expand + tile.size_quads, mid), expected);
}

#[test]
fn cache_shares_border_texels_between_tiles() {
    let mut a = ramp_tile(TileCoord::new(0, 0));
    let mut b = ramp_tile(TileCoord::new(1, 0));
    // Coarse geometry forces the upscaling path on both tiles
    a.forced_lod = Some(1);
    b.forced_lod = Some(1);
    let world = GridWorld::new([a, b]);
    let cache = SampleCache::new();
    let expand = 1usize;

    let ta = world.tile_at(TileCoord::new(0, 0)).unwrap();
    let tb = world.tile_at(TileCoord::new(1, 0)).unwrap();
    let buf_a = resample_tile(ta, 0, expand, &world, &cache);
    let after_a = cache.len();
    let buf_b = resample_tile(tb, 0, expand, &world, &cache);
    let after_b = cache.len();

    // The shared seam columns were memoized, not recomputed
    assert_eq!(after_a, buf_a.size * buf_a.size);
    assert!(after_b < after_a + buf_b.size * buf_b.size);

    // Identical world texels decode identically from either tile's buffer
    let quads = ta.quads_at_lod(0);
    for y in 0..buf_a.size {
        assert_eq!(
            buf_a.texel(expand + quads, y),
            buf_b.texel(expand, y),
            "seam column must agree between tiles (row {y})"
        );
    }
}

#[test]
fn xy_offsets_survive_direct_resampling() {
    let mut tile = ramp_tile(TileCoord::new(0, 0));
    let size = tile.size_quads + 1;
    let offsets: Vec<relief_terrain::XyOffsetTexel> = (0..size * size)
        .map(|i| relief_terrain::XyOffsetTexel {
            x: 32768 + (i % size) as u16 * 16,
            y: 32768 + (i / size) as u16 * 16,
        })
        .collect();
    let mip0 = HeightMip::new(size, tile.heightfield.mip(0).texels.clone(), Some(offsets));
    tile.heightfield = TileHeightfield::with_mip_chain(mip0, 2);
    assert!(tile.has_xy_offsets());

    let world = GridWorld::new([tile]);
    let tile = world.tile_at(TileCoord::new(0, 0)).unwrap();
    let cache = SampleCache::new();
    let expand = 1usize;
    let buf = resample_tile(tile, 0, expand, &world, &cache);

    let plane = buf.offsets.as_ref().expect("offset plane carried through");
    assert_eq!(plane.len(), buf.size * buf.size);
    let mip = tile.heightfield.mip(0);
    for j in 0..=tile.size_quads {
        for k in 0..=tile.size_quads {
            assert_eq!(buf.offset(expand + k, expand + j), mip.offset(k as i32, j as i32));
        }
    }
}

#[test]
fn degenerate_target_lod_clamps_to_max() {
    let world = GridWorld::new([ramp_tile(TileCoord::new(0, 0))]);
    let tile = world.tile_at(TileCoord::new(0, 0)).unwrap();
    let cache = SampleCache::new();
    let buf = resample_tile(tile, 99, 1, &world, &cache);
    assert_eq!(buf.lod, tile.max_lod());
    assert_eq!(buf.size, tile.quads_at_lod(tile.max_lod()) + 3);
}
