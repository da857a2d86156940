//! Cross-tile LOD-aware heightfield resampling for lighting builds.
#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use relief_terrain::{HeightTexel, NeighborProvider, Tile, XyOffsetTexel};

#[cfg(test)]
mod tests;

/// One resampled texel in raw quantized units (heights and offsets as u16
/// steps, normal components as byte steps). Blending happens in this space,
/// matching the stored representation, and is re-encoded on write.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct RawSample {
    height: f32,
    normal_x: f32,
    normal_y: f32,
    offset_x: f32,
    offset_y: f32,
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

impl RawSample {
    #[inline]
    fn from_texels(t: HeightTexel, o: XyOffsetTexel) -> Self {
        Self {
            height: t.height as f32,
            normal_x: t.normal_x as f32,
            normal_y: t.normal_y as f32,
            offset_x: o.x as f32,
            offset_y: o.y as f32,
        }
    }

    #[inline]
    fn lerp_with(self, rhs: RawSample, t: f32) -> RawSample {
        RawSample {
            height: lerp(self.height, rhs.height, t),
            normal_x: lerp(self.normal_x, rhs.normal_x, t),
            normal_y: lerp(self.normal_y, rhs.normal_y, t),
            offset_x: lerp(self.offset_x, rhs.offset_x, t),
            offset_y: lerp(self.offset_y, rhs.offset_y, t),
        }
    }

    #[inline]
    fn encode(self) -> (HeightTexel, XyOffsetTexel) {
        (
            HeightTexel {
                height: self.height.round().clamp(0.0, 65535.0) as u16,
                normal_x: self.normal_x.round().clamp(0.0, 255.0) as u8,
                normal_y: self.normal_y.round().clamp(0.0, 255.0) as u8,
            },
            XyOffsetTexel {
                x: self.offset_x.round().clamp(0.0, 65535.0) as u16,
                y: self.offset_y.round().clamp(0.0, 65535.0) as u16,
            },
        )
    }
}

/// Build-run-scoped memoization of upscaled texels, keyed by absolute world
/// texel coordinate (base-quad units) and bake LOD. Neighboring tiles reach
/// the same border texels through the same keys; first writer wins and
/// later readers reuse the cached value. No eviction: the cache lives for
/// exactly one build run and is cleared (or dropped) before the next.
pub struct SampleCache {
    texels: Mutex<HashMap<(i32, i32, u8), (HeightTexel, XyOffsetTexel)>>,
}

impl SampleCache {
    pub fn new() -> Self {
        Self {
            texels: Mutex::new(HashMap::new()),
        }
    }

    pub fn clear(&self) {
        self.texels.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.texels.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_or_insert_with(
        &self,
        key: (i32, i32, u8),
        compute: impl FnOnce() -> (HeightTexel, XyOffsetTexel),
    ) -> (HeightTexel, XyOffsetTexel) {
        if let Some(v) = self.texels.lock().unwrap().get(&key) {
            return *v;
        }
        // Compute outside the lock; a racing writer for the same key
        // produces the same value, so entry() keeps the first.
        let v = compute();
        *self.texels.lock().unwrap().entry(key).or_insert(v)
    }
}

impl Default for SampleCache {
    fn default() -> Self {
        Self::new()
    }
}

/// A tile's heightfield resampled to one bake LOD, covering the tile
/// interior plus `expand` border texels on each side pulled from (or
/// replicated toward) its neighbors. Created per lighting-build request and
/// discarded once the mesh adapter has consumed it.
#[derive(Clone, Debug)]
pub struct ResampledTileBuffer {
    /// Texels per side: `quads_at_lod + 2 * expand + 1`.
    pub size: usize,
    pub expand: usize,
    pub lod: usize,
    pub texels: Vec<HeightTexel>,
    pub offsets: Option<Vec<XyOffsetTexel>>,
}

impl ResampledTileBuffer {
    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.size + x
    }

    #[inline]
    pub fn texel(&self, x: usize, y: usize) -> HeightTexel {
        self.texels[self.idx(x, y)]
    }

    #[inline]
    pub fn offset(&self, x: usize, y: usize) -> XyOffsetTexel {
        match &self.offsets {
            Some(o) => o[y * self.size + x],
            None => XyOffsetTexel::ZERO,
        }
    }
}

/// 3x3 grid of lighting LODs around a tile, `grid[1][1]` being the tile
/// itself. Holes (absent neighbors) are extrapolated: edge slots fall back
/// to the center value, corner slots to their adjacent edge slots first.
fn neighbor_lod_grid(tile: &Tile, target: usize, provider: &dyn NeighborProvider) -> [[f32; 3]; 3] {
    let center = tile.geometric_lod().max(target) as f32;
    let mut slots = [[None::<f32>; 3]; 3];
    slots[1][1] = Some(center);
    for dy in -1i32..=1 {
        for dx in -1i32..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            if let Some(nb) = provider.neighbor(tile.base, dx, dy) {
                slots[(dy + 1) as usize][(dx + 1) as usize] = Some(nb.lighting_lod() as f32);
            }
        }
    }
    let mut grid = [[0.0f32; 3]; 3];
    for y in 0..3 {
        for x in 0..3 {
            grid[y][x] = match slots[y][x] {
                Some(l) => l,
                None if x != 1 && y != 1 => {
                    // Corner hole: prefer the edge slots it touches
                    slots[y][1].or(slots[1][x]).unwrap_or(center)
                }
                None => center,
            };
        }
    }
    grid
}

/// Continuous "effective LOD" at a normalized tile position in
/// `[-0.5, 0.5]^2`: two nested lerps toward the quadrant picked by the sign
/// of each coordinate, clamped to `[target, max_lod]`.
fn effective_lod(grid: &[[f32; 3]; 3], fx: f32, fy: f32, target: usize, max_lod: usize) -> f32 {
    let ix = if fx >= 0.0 { 2 } else { 0 };
    let iy = if fy >= 0.0 { 2 } else { 0 };
    let tx = (fx.abs() * 2.0).min(1.0);
    let ty = (fy.abs() * 2.0).min(1.0);
    let near = lerp(grid[1][1], grid[1][ix], tx);
    let far = lerp(grid[iy][1], grid[iy][ix], tx);
    lerp(near, far, ty).clamp(target as f32, max_lod as f32)
}

/// Fetches one bilinear sample from whichever tile owns the world base-quad
/// position `(wqx, wqy)`, at the given mip. Positions outside every loaded
/// tile replicate the nearest available edge.
fn sample_world(
    center: &Tile,
    provider: &dyn NeighborProvider,
    wqx: f32,
    wqy: f32,
    mip: usize,
) -> RawSample {
    let (bx, by) = center.base_quad();
    let sq = center.size_quads as f32;
    let mut rx = wqx - bx as f32;
    let mut ry = wqy - by as f32;
    let ox = if rx < 0.0 {
        -1
    } else if rx > sq {
        1
    } else {
        0
    };
    let oy = if ry < 0.0 {
        -1
    } else if ry > sq {
        1
    } else {
        0
    };

    let mut tile = center;
    if ox != 0 || oy != 0 {
        // Prefer the exact (possibly diagonal) neighbor, then the axis
        // neighbors with the other axis clamped, then the tile itself.
        let candidates = [(ox, oy), (ox, 0), (0, oy)];
        let mut found = None;
        for (dx, dy) in candidates {
            if dx == 0 && dy == 0 {
                continue;
            }
            if let Some(nb) = provider.neighbor(center.base, dx, dy) {
                found = Some((nb, dx, dy));
                break;
            }
        }
        if let Some((nb, dx, dy)) = found {
            tile = nb;
            rx -= dx as f32 * sq;
            ry -= dy as f32 * sq;
        }
        // Whatever axis the chosen tile does not cover replicates its edge
        rx = rx.clamp(0.0, sq);
        ry = ry.clamp(0.0, sq);
    }

    let mip = mip.min(tile.heightfield.mip_count() - 1);
    let m = tile.heightfield.mip(mip);
    // Base-quad position -> mip texel coordinate. A mip spans the whole
    // tile with (m.size - 1) quads, so the mapping is a pure rescale.
    let mip_quads = (m.size - 1).max(1) as f32;
    // Snap near-integer coordinates so lattice-aligned fetches stay exact
    // despite the rescale round trip (real fractional samples sit at least
    // 1/quads from an integer, far above the snap window).
    let snap = |c: f32| {
        let r = c.round();
        if (c - r).abs() < 1e-3 { r } else { c }
    };
    let u = snap(rx * mip_quads / sq);
    let v = snap(ry * mip_quads / sq);
    let x0 = u.floor();
    let y0 = v.floor();
    let fx = u - x0;
    let fy = v - y0;
    let x0 = x0 as i32;
    let y0 = y0 as i32;

    let fetch = |x: i32, y: i32| RawSample::from_texels(m.texel(x, y), m.offset(x, y));
    let s00 = fetch(x0, y0);
    let s10 = fetch(x0 + 1, y0);
    let s01 = fetch(x0, y0 + 1);
    let s11 = fetch(x0 + 1, y0 + 1);
    s00.lerp_with(s10, fx).lerp_with(s01.lerp_with(s11, fx), fy)
}

/// Resamples `tile`'s heightfield at the requested bake LOD into a padded
/// buffer, blending in coarser neighbor detail ("LOD upscaling") when any
/// neighbor bakes at a coarser LOD than requested. Missing neighbors are
/// holes: their LOD is extrapolated and their texels edge-replicated.
pub fn resample_tile(
    tile: &Tile,
    lod: usize,
    expand: usize,
    provider: &dyn NeighborProvider,
    cache: &SampleCache,
) -> ResampledTileBuffer {
    debug_assert!(expand < tile.size_quads);
    let target = lod.min(tile.max_lod());
    let quads = tile.quads_at_lod(target);
    let size = quads + 2 * expand + 1;
    let (bx, by) = tile.base_quad();
    // Vertex spacing of the LOD lattice in base-quad units; exactly 1 at
    // LOD 0, fractional above (a mip spans the whole tile span).
    let spacing = tile.size_quads as f32 / quads as f32;

    let grid = neighbor_lod_grid(tile, target, provider);
    let needs_upscaling = tile.geometric_lod() > target
        || grid.iter().flatten().any(|&l| l > target as f32);
    log::debug!(
        "resample tile ({},{}) lod={} size={} upscaling={}",
        tile.base.tx,
        tile.base.ty,
        target,
        size,
        needs_upscaling
    );

    let mut texels = Vec::with_capacity(size * size);
    let mut offsets = tile
        .has_xy_offsets()
        .then(|| Vec::with_capacity(size * size));
    let max_mip = tile.heightfield.mip_count() - 1;

    for dy in 0..size {
        for dx in 0..size {
            // Lattice index relative to the tile origin, and the absolute
            // world position in base-quad units
            let lx = dx as i32 - expand as i32;
            let ly = dy as i32 - expand as i32;
            let wx = bx as f32 + lx as f32 * spacing;
            let wy = by as f32 + ly as f32 * spacing;

            let (texel, offset) = if !needs_upscaling {
                sample_world(tile, provider, wx, wy, target).encode()
            } else {
                // Keyed on the world LOD lattice so neighboring tiles baking
                // at the same LOD share border texels
                let key = (
                    tile.base.tx * quads as i32 + lx,
                    tile.base.ty * quads as i32 + ly,
                    target as u8,
                );
                cache.get_or_insert_with(key, || {
                    let fx = (lx as f32 * spacing / tile.size_quads as f32 - 0.5).clamp(-0.5, 0.5);
                    let fy = (ly as f32 * spacing / tile.size_quads as f32 - 0.5).clamp(-0.5, 0.5);
                    let l = effective_lod(&grid, fx, fy, target, tile.max_lod());
                    let l0 = l.floor() as usize;
                    let alpha = l - l0 as f32;
                    let s0 = sample_world(tile, provider, wx, wy, l0);
                    let s = if alpha > 0.0 && l0 < max_mip {
                        let s1 = sample_world(tile, provider, wx, wy, l0 + 1);
                        s0.lerp_with(s1, alpha)
                    } else {
                        s0
                    };
                    s.encode()
                })
            };
            texels.push(texel);
            if let Some(o) = offsets.as_mut() {
                o.push(offset);
            }
        }
    }

    ResampledTileBuffer {
        size,
        expand,
        lod: target,
        texels,
        offsets,
    }
}
