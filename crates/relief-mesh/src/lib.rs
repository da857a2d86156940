//! Triangle-mesh adapter exposing a resampled tile heightfield to a
//! static-lighting solver.
#![forbid(unsafe_code)]

use relief_geom::{Aabb, Vec3};
use relief_resample::ResampledTileBuffer;
use relief_terrain::Tile;


/// Fully resolved bake vertex: world position, world-space tangent frame,
/// and two texture coordinate sets (0 = raw grid UV, 1 = lightmap UV).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaticLightingVertex {
    pub world_position: Vec3,
    pub world_tangent_x: Vec3,
    pub world_tangent_y: Vec3,
    pub world_tangent_z: Vec3,
    pub tex_coord: [[f32; 2]; 2],
}

/// Collision seam for shadow rays. Implemented by whatever owns the tile's
/// collision geometry; returns the hit position and surface normal.
pub trait LineTrace {
    fn line_trace(&self, start: Vec3, end: Vec3) -> Option<(Vec3, Vec3)>;
}

/// Logical triangle mesh over a `ResampledTileBuffer`. Nothing is
/// materialized: triangle indices are grid arithmetic and vertices resolve
/// lazily from the buffer texels.
pub struct LightingMesh<'a> {
    tile: &'a Tile,
    buffer: &'a ResampledTileBuffer,
    num_vertices: usize,
    /// Lattice spacing in local base-quad units at the buffer's LOD.
    spacing: f32,
    lightmap_ratio: f32,
    mirrored: bool,
}

impl<'a> LightingMesh<'a> {
    pub fn new(tile: &'a Tile, buffer: &'a ResampledTileBuffer, lightmap_ratio: f32) -> Self {
        let num_vertices = buffer.size;
        let quads = num_vertices - 1 - 2 * buffer.expand;
        log::trace!(
            "lighting mesh for tile ({},{}): {num_vertices}x{num_vertices} verts",
            tile.base.tx,
            tile.base.ty
        );
        Self {
            tile,
            buffer,
            num_vertices,
            spacing: tile.size_quads as f32 / quads as f32,
            lightmap_ratio,
            mirrored: tile.transform.is_mirrored(),
        }
    }

    #[inline]
    pub fn num_vertices_per_side(&self) -> usize {
        self.num_vertices
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.num_vertices * self.num_vertices
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        2 * (self.num_vertices - 1) * (self.num_vertices - 1)
    }

    /// Grid vertex indices of one triangle. Winding is swapped under a
    /// mirrored transform so front faces survive the reflection.
    pub fn triangle_indices(&self, triangle: usize) -> [usize; 3] {
        let nv = self.num_vertices;
        let quad = triangle / 2;
        let qx = quad % (nv - 1);
        let qy = quad / (nv - 1);
        let at = |x: usize, y: usize| y * nv + x;
        let [i0, i1, i2] = if triangle % 2 == 0 {
            [at(qx, qy), at(qx + 1, qy + 1), at(qx + 1, qy)]
        } else {
            [at(qx, qy), at(qx, qy + 1), at(qx + 1, qy + 1)]
        };
        if self.mirrored {
            [i0, i2, i1]
        } else {
            [i0, i1, i2]
        }
    }

    /// Resolves one grid vertex to a fully formed bake vertex.
    pub fn vertex(&self, index: usize) -> StaticLightingVertex {
        self.vertex_at(index % self.num_vertices, index / self.num_vertices)
    }

    pub fn vertex_at(&self, gx: usize, gy: usize) -> StaticLightingVertex {
        let texel = self.buffer.texel(gx, gy);
        let offset = self.buffer.offset(gx, gy);
        let (ox, oy) = offset.local();

        let lx = (gx as f32 - self.buffer.expand as f32) * self.spacing + ox;
        let ly = (gy as f32 - self.buffer.expand as f32) * self.spacing + oy;
        let lz = texel.local_height();

        // Tangents take only the rotation part of the placement; scale and
        // shear must not bend the frame.
        let n = texel.normal();
        let transform = &self.tile.transform;
        let world_tangent_x = transform.rotate_vector(Vec3::new(-n.z, 0.0, n.x));
        let world_tangent_y = transform.rotate_vector(Vec3::new(0.0, n.z, -n.y));
        let world_tangent_z = transform.rotate_vector(n);

        let nvf = self.num_vertices as f32;
        let uv0 = [gx as f32 / nvf, gy as f32 / nvf];
        let uv1 = [
            gx as f32 * (self.lightmap_ratio / nvf),
            gy as f32 * (self.lightmap_ratio / nvf),
        ];

        StaticLightingVertex {
            world_position: transform.transform_position(Vec3::new(lx, ly, lz)),
            world_tangent_x,
            world_tangent_y,
            world_tangent_z,
            tex_coord: [uv0, uv1],
        }
    }

    /// World-space bounds over the padded vertex grid.
    pub fn bounds(&self) -> Aabb {
        let mut bb = Aabb::empty();
        for gy in 0..self.num_vertices {
            for gx in 0..self.num_vertices {
                bb.add_point(self.vertex_at(gx, gy).world_position);
            }
        }
        bb
    }

    /// Shadow-ray test against the tile's source geometry. A miss is a
    /// plain `None`, never an error.
    pub fn intersect(
        &self,
        start: Vec3,
        end: Vec3,
        tracer: &impl LineTrace,
    ) -> Option<StaticLightingVertex> {
        let (position, normal) = tracer.line_trace(start, end)?;
        let n = normal.normalized();
        let seed = if n.x.abs() < 0.99 {
            Vec3::new(1.0, 0.0, 0.0)
        } else {
            Vec3::new(0.0, 1.0, 0.0)
        };
        let tangent_x = seed.cross(n).normalized();
        let tangent_y = n.cross(tangent_x);
        Some(StaticLightingVertex {
            world_position: position,
            world_tangent_x: tangent_x,
            world_tangent_y: tangent_y,
            world_tangent_z: n,
            tex_coord: [[0.0; 2]; 2],
        })
    }
}
