//! Built-in reference light solver: directional N.L with ray-marched
//! shadow tests. It stands in for the external GI solver so the driver can
//! exercise the whole bake pipeline.

use std::collections::HashMap;

use relief_geom::Vec3;
use relief_lightmap::shadow::{ShadowMapData, ShadowSample};
use relief_lightmap::{LightId, QuantizedLightmapData, RawLightmapSample};
use relief_mesh::{LightingMesh, LineTrace};
use relief_terrain::Tile;

pub struct DirectionalLight {
    pub id: LightId,
    /// Direction the light travels (toward the surface), unit length.
    pub direction: Vec3,
    pub intensity: f32,
    pub cast_shadows: bool,
}

pub struct SolverOutput {
    pub lightmap: QuantizedLightmapData,
    pub shadow_maps: HashMap<LightId, ShadowMapData>,
}

const SHADOW_RAY_LENGTH: f32 = 1.0e4;
const SHADOW_RAY_BIAS: f32 = 0.5;
const SHADOW_PENUMBRA: f32 = 0.05;

/// Evaluates every lattice texel of the mesh against the light set.
/// Channel 0 carries the directional sum, channel 1 the flat sky term.
/// Lights that never reach the tile are left out of the recorded light-ID
/// set, which is what downstream irrelevance bookkeeping keys on.
pub fn solve_tile(
    mesh: &LightingMesh,
    lights: &[DirectionalLight],
    sky_intensity: f32,
    tracer: &impl LineTrace,
) -> SolverOutput {
    let nv = mesh.num_vertices_per_side();
    let size = nv as u32;
    let mut raw = Vec::with_capacity(nv * nv);
    let mut contributed = vec![false; lights.len()];
    let mut shadow_grids: Vec<Vec<ShadowSample>> =
        lights.iter().map(|_| Vec::with_capacity(nv * nv)).collect();

    for gy in 0..nv {
        for gx in 0..nv {
            let v = mesh.vertex_at(gx, gy);
            let n = v.world_tangent_z;
            let mut sample = RawLightmapSample {
                coverage: 255,
                ..Default::default()
            };
            for (li, light) in lights.iter().enumerate() {
                let toward = -light.direction;
                let mut lambert = n.dot(toward).max(0.0) * light.intensity;
                if lambert > 0.0 && light.cast_shadows {
                    let start = v.world_position + n * SHADOW_RAY_BIAS;
                    let end = start + toward * SHADOW_RAY_LENGTH;
                    if mesh.intersect(start, end, tracer).is_some() {
                        lambert = 0.0;
                    }
                }
                if lambert > 0.0 {
                    contributed[li] = true;
                    for k in 0..4 {
                        sample.coefficients[0][k] += lambert;
                    }
                }
                shadow_grids[li].push(ShadowSample {
                    distance: if lambert > 0.0 { 1.0 } else { 0.0 },
                    penumbra_size: SHADOW_PENUMBRA,
                    is_mapped: light.cast_shadows,
                });
            }
            if sky_intensity > 0.0 {
                for k in 0..4 {
                    sample.coefficients[1][k] = sky_intensity * n.z.max(0.0);
                }
            }
            raw.push(sample);
        }
    }

    let light_ids: Vec<LightId> = lights
        .iter()
        .zip(&contributed)
        .filter(|(_, c)| **c)
        .map(|(l, _)| l.id)
        .collect();
    let lightmap = QuantizedLightmapData::from_raw(size, size, &raw, light_ids);

    let mut shadow_maps = HashMap::new();
    for ((light, grid), c) in lights.iter().zip(shadow_grids).zip(&contributed) {
        if light.cast_shadows && *c {
            shadow_maps.insert(
                light.id,
                ShadowMapData::from_samples(light.id, size, size, &grid),
            );
        }
    }

    SolverOutput {
        lightmap,
        shadow_maps,
    }
}

/// Fixed-step heightfield march used as the collision seam for shadow
/// rays. Works against the tile's own mip-0 data and assumes the
/// axis-aligned scale/translation placement the driver generates.
pub struct TileTracer<'a> {
    tile: &'a Tile,
}

impl<'a> TileTracer<'a> {
    pub fn new(tile: &'a Tile) -> Self {
        Self { tile }
    }

    /// World-space surface height and normal under `(wx, wy)`, or `None`
    /// outside the tile footprint.
    fn surface_at(&self, wx: f32, wy: f32) -> Option<(f32, Vec3)> {
        let t = &self.tile.transform;
        let (sx, sy, sz) = (t.basis[0].x, t.basis[1].y, t.basis[2].z);
        if sx.abs() < f32::EPSILON || sy.abs() < f32::EPSILON {
            return None;
        }
        let lx = (wx - t.origin.x) / sx;
        let ly = (wy - t.origin.y) / sy;
        let sq = self.tile.size_quads as f32;
        if !(0.0..=sq).contains(&lx) || !(0.0..=sq).contains(&ly) {
            return None;
        }
        let mip = self.tile.heightfield.mip(0);
        let x0 = lx.floor();
        let y0 = ly.floor();
        let fx = lx - x0;
        let fy = ly - y0;
        let (x0, y0) = (x0 as i32, y0 as i32);
        let h = |x: i32, y: i32| mip.texel(x, y).local_height();
        let h0 = h(x0, y0) + (h(x0 + 1, y0) - h(x0, y0)) * fx;
        let h1 = h(x0, y0 + 1) + (h(x0 + 1, y0 + 1) - h(x0, y0 + 1)) * fx;
        let local_z = h0 + (h1 - h0) * fy;
        let normal = t.rotate_vector(mip.texel(x0, y0).normal());
        Some((local_z * sz + t.origin.z, normal))
    }
}

const TRACE_STEPS: usize = 64;

impl LineTrace for TileTracer<'_> {
    fn line_trace(&self, start: Vec3, end: Vec3) -> Option<(Vec3, Vec3)> {
        let delta = (end - start) / TRACE_STEPS as f32;
        let mut prev_above = match self.surface_at(start.x, start.y) {
            Some((h, _)) => start.z >= h,
            None => true,
        };
        let mut p = start;
        for _ in 0..TRACE_STEPS {
            p += delta;
            if let Some((h, normal)) = self.surface_at(p.x, p.y) {
                let above = p.z >= h;
                if above != prev_above {
                    return Some((Vec3::new(p.x, p.y, h), normal));
                }
                prev_above = above;
            }
        }
        None
    }
}
