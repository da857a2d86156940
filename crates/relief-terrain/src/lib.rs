//! Terrain tile model: heightfield mips, texel codec, and LOD selection.
#![forbid(unsafe_code)]

use relief_geom::{Transform, Vec3};

/// Quantized height midpoint: a stored height of `HEIGHT_MID` decodes to
/// local Z = 0.
pub const HEIGHT_MID: f32 = 32768.0;
/// Local Z units per quantized height step.
pub const HEIGHT_SCALE: f32 = 1.0 / 128.0;
/// Quantized XY-offset midpoint.
pub const XY_OFFSET_MID: f32 = 32768.0;
/// Local XY units per quantized offset step.
pub const XY_OFFSET_SCALE: f32 = 1.0 / 256.0;

/// Decodes a stored height word to a local-space Z value.
#[inline]
pub fn decode_height(h: u16) -> f32 {
    (h as f32 - HEIGHT_MID) * HEIGHT_SCALE
}

/// Decodes one quantized XY-offset component.
#[inline]
pub fn decode_xy_offset(v: u16) -> f32 {
    (v as f32 - XY_OFFSET_MID) * XY_OFFSET_SCALE
}

/// Decodes one quantized normal component from a byte.
#[inline]
pub fn decode_normal_byte(b: u8) -> f32 {
    2.0 / 255.0 * b as f32 - 1.0
}

/// Encodes a normal component in [-1, 1] back to a byte.
#[inline]
pub fn encode_normal_byte(n: f32) -> u8 {
    ((n.clamp(-1.0, 1.0) + 1.0) * 127.5).round() as u8
}

/// Position of a tile in the world tile grid (tile units, not texels).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub tx: i32,
    pub ty: i32,
}

impl TileCoord {
    #[inline]
    pub const fn new(tx: i32, ty: i32) -> Self {
        Self { tx, ty }
    }

    #[inline]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            tx: self.tx + dx,
            ty: self.ty + dy,
        }
    }
}

/// One heightfield texel: quantized height plus the XY components of the
/// surface normal. The Z component is reconstructed at decode time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeightTexel {
    pub height: u16,
    pub normal_x: u8,
    pub normal_y: u8,
}

impl HeightTexel {
    /// Flat texel at the given quantized height (normal straight up).
    #[inline]
    pub const fn flat(height: u16) -> Self {
        Self {
            height,
            normal_x: 128,
            normal_y: 128,
        }
    }

    #[inline]
    pub fn local_height(&self) -> f32 {
        decode_height(self.height)
    }

    /// Decoded surface normal. The radicand is clamped to zero so corrupt
    /// normal bytes (x*x + y*y > 1) degrade to a horizon-flat normal
    /// instead of producing NaN.
    #[inline]
    pub fn normal(&self) -> Vec3 {
        let x = decode_normal_byte(self.normal_x);
        let y = decode_normal_byte(self.normal_y);
        let z = (1.0 - (x * x + y * y)).max(0.0).sqrt();
        Vec3::new(x, y, z)
    }
}

/// Optional per-texel XY displacement, quantized around `XY_OFFSET_MID`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct XyOffsetTexel {
    pub x: u16,
    pub y: u16,
}

impl XyOffsetTexel {
    pub const ZERO: XyOffsetTexel = XyOffsetTexel { x: 32768, y: 32768 };

    #[inline]
    pub fn local(&self) -> (f32, f32) {
        (decode_xy_offset(self.x), decode_xy_offset(self.y))
    }
}

/// One mip level of a tile heightfield: a square `size x size` texel grid,
/// with an optional parallel XY-offset plane.
#[derive(Clone, Debug)]
pub struct HeightMip {
    pub size: usize,
    pub texels: Vec<HeightTexel>,
    pub offsets: Option<Vec<XyOffsetTexel>>,
}

impl HeightMip {
    pub fn new(size: usize, texels: Vec<HeightTexel>, offsets: Option<Vec<XyOffsetTexel>>) -> Self {
        let mut t = texels;
        if t.len() != size * size {
            t.resize(size * size, HeightTexel::flat(32768));
        }
        let offsets = offsets.map(|mut o| {
            if o.len() != size * size {
                o.resize(size * size, XyOffsetTexel::ZERO);
            }
            o
        });
        Self {
            size,
            texels: t,
            offsets,
        }
    }

    #[inline]
    fn idx_clamped(&self, x: i32, y: i32) -> usize {
        let cx = x.clamp(0, self.size as i32 - 1) as usize;
        let cy = y.clamp(0, self.size as i32 - 1) as usize;
        cy * self.size + cx
    }

    /// Texel fetch with edge replication outside the grid.
    #[inline]
    pub fn texel(&self, x: i32, y: i32) -> HeightTexel {
        self.texels[self.idx_clamped(x, y)]
    }

    /// Offset fetch with edge replication; zero offset when the plane is absent.
    #[inline]
    pub fn offset(&self, x: i32, y: i32) -> XyOffsetTexel {
        match &self.offsets {
            Some(o) => o[self.idx_clamped(x, y)],
            None => XyOffsetTexel::ZERO,
        }
    }
}

/// A tile's full heightfield mip chain. Mip 0 has `size_quads + 1` texels
/// per side; each following mip halves the quad count.
#[derive(Clone, Debug)]
pub struct TileHeightfield {
    pub mips: Vec<HeightMip>,
}

impl TileHeightfield {
    pub fn new(mips: Vec<HeightMip>) -> Self {
        Self { mips }
    }

    /// Builds the mip chain down to `max_lod` from a mip-0 plane by 2x
    /// decimation (every other texel, matching the vertex grid halving).
    pub fn with_mip_chain(mip0: HeightMip, max_lod: usize) -> Self {
        let mut mips = vec![mip0];
        for lod in 1..=max_lod {
            let prev = &mips[lod - 1];
            let size = (prev.size - 1) / 2 + 1;
            let mut texels = Vec::with_capacity(size * size);
            let mut offsets = prev.offsets.as_ref().map(|_| Vec::with_capacity(size * size));
            for y in 0..size {
                for x in 0..size {
                    texels.push(prev.texel(x as i32 * 2, y as i32 * 2));
                    if let Some(o) = offsets.as_mut() {
                        o.push(prev.offset(x as i32 * 2, y as i32 * 2));
                    }
                }
            }
            mips.push(HeightMip::new(size, texels, offsets));
        }
        Self { mips }
    }

    #[inline]
    pub fn mip(&self, lod: usize) -> &HeightMip {
        let last = self.mips.len() - 1;
        &self.mips[lod.min(last)]
    }

    #[inline]
    pub fn mip_count(&self) -> usize {
        self.mips.len()
    }
}

/// One terrain component's heightfield region and placement.
///
/// Invariant: `size_quads == subsection_count * subsection_size_quads`.
#[derive(Clone, Debug)]
pub struct Tile {
    pub base: TileCoord,
    pub size_quads: usize,
    pub subsection_count: usize,
    pub subsection_size_quads: usize,
    /// Geometry forced to a fixed LOD, overriding the bias.
    pub forced_lod: Option<usize>,
    pub lod_bias: i32,
    /// Explicit lighting LOD override; `None` derives from the geometric LOD.
    pub lighting_lod_override: Option<usize>,
    pub transform: Transform,
    pub heightfield: TileHeightfield,
}

impl Tile {
    pub fn new(
        base: TileCoord,
        subsection_count: usize,
        subsection_size_quads: usize,
        transform: Transform,
        heightfield: TileHeightfield,
    ) -> Self {
        Self {
            base,
            size_quads: subsection_count * subsection_size_quads,
            subsection_count,
            subsection_size_quads,
            forced_lod: None,
            lod_bias: 0,
            lighting_lod_override: None,
            transform,
            heightfield,
        }
    }

    /// Highest usable LOD index: `log2(subsection_size_quads + 1) - 1`.
    #[inline]
    pub fn max_lod(&self) -> usize {
        let verts = self.subsection_size_quads + 1;
        (verts.ilog2() as usize).saturating_sub(1)
    }

    /// LOD the geometry renders at, from the forced LOD or the bias.
    #[inline]
    pub fn geometric_lod(&self) -> usize {
        match self.forced_lod {
            Some(f) => f.min(self.max_lod()),
            None => (self.lod_bias.max(0) as usize).min(self.max_lod()),
        }
    }

    /// LOD the lighting bake samples at, clamped to `[0, max_lod]`.
    #[inline]
    pub fn lighting_lod(&self) -> usize {
        match self.lighting_lod_override {
            Some(l) => l.min(self.max_lod()),
            None => self.geometric_lod(),
        }
    }

    #[inline]
    pub fn quads_at_lod(&self, lod: usize) -> usize {
        self.size_quads >> lod
    }

    /// World base-quad coordinate of this tile's origin vertex.
    #[inline]
    pub fn base_quad(&self) -> (i32, i32) {
        (
            self.base.tx * self.size_quads as i32,
            self.base.ty * self.size_quads as i32,
        )
    }

    #[inline]
    pub fn has_xy_offsets(&self) -> bool {
        self.heightfield.mips[0].offsets.is_some()
    }
}

/// Capability interface over whatever spatial index owns tile placement.
/// A `None` neighbor is a hole in the world, never an error.
pub trait NeighborProvider {
    fn tile_at(&self, coord: TileCoord) -> Option<&Tile>;

    #[inline]
    fn neighbor(&self, of: TileCoord, dx: i32, dy: i32) -> Option<&Tile> {
        self.tile_at(of.offset(dx, dy))
    }
}
