//! Bake configuration loaded from TOML.

use serde::Deserialize;
use std::error::Error;
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BakeConfig {
    pub world: WorldConfig,
    pub lighting: LightingConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Tiles per side of the square bake region.
    pub tiles_per_side: usize,
    pub subsection_count: usize,
    pub subsection_size_quads: usize,
    pub seed: i32,
    pub height_frequency: f32,
    /// Peak height amplitude in quantized height steps.
    pub height_amplitude: f32,
    /// Local-to-world scale applied to every tile.
    pub scale: [f32; 3],
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tiles_per_side: 4,
            subsection_count: 1,
            subsection_size_quads: 63,
            seed: 1337,
            height_frequency: 0.008,
            height_amplitude: 4096.0,
            scale: [100.0, 100.0, 100.0],
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    /// Border texels resampled around each tile for seam-free lighting.
    pub expand_quads: usize,
    /// Ratio of lightmap texels to lattice vertices (UV set 1).
    pub lightmap_ratio: f32,
    /// Flat ambient sky contribution baked into the second channel.
    pub sky_intensity: f32,
    /// When set, every other tile (checkerboard) bakes at this coarser
    /// lighting LOD, exercising cross-tile upscaling.
    pub coarse_checker_lod: Option<usize>,
    pub lights: Vec<LightConfig>,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            expand_quads: 8,
            lightmap_ratio: 1.0,
            sky_intensity: 0.1,
            coarse_checker_lod: Some(2),
            lights: vec![LightConfig::default()],
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub id: u64,
    /// Direction the light travels, normalized at load.
    pub direction: [f32; 3],
    pub intensity: f32,
    pub cast_shadows: bool,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            id: 1,
            direction: [-0.3, -0.2, -0.9],
            intensity: 1.0,
            cast_shadows: true,
        }
    }
}

impl BakeConfig {
    pub fn load(path: &Path) -> Result<BakeConfig, Box<dyn Error>> {
        let text = fs::read_to_string(path)?;
        let cfg: BakeConfig = toml::from_str(&text)?;
        Ok(cfg)
    }
}
