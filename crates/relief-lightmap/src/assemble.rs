//! Per-tile decision of which bake outputs to keep, and the registry that
//! stores them.

use std::collections::HashMap;

use crate::shadow::ShadowMapData;
use crate::{LightId, QuantizedLightmapData, TileKey};

/// Everything persisted for one tile after a bake.
#[derive(Debug, Default)]
pub struct TileBuildData {
    pub lightmap: Option<QuantizedLightmapData>,
    pub shadow_maps: HashMap<LightId, ShadowMapData>,
    /// Lights that were considered for this tile but provably contributed
    /// nothing; runtime rendering skips dynamic-shadow work for them.
    pub irrelevant_lights: Vec<LightId>,
}

/// Build-data store keyed by stable tile identifier. Re-baking a tile
/// overwrites its previous record; entries are never merged.
#[derive(Debug, Default)]
pub struct BuildDataRegistry {
    entries: HashMap<TileKey, TileBuildData>,
}

impl BuildDataRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: TileKey, data: TileBuildData) {
        self.entries.insert(key, data);
    }

    pub fn get(&self, key: TileKey) -> Option<&TileBuildData> {
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TileKey, &TileBuildData)> {
        self.entries.iter()
    }
}

/// Decides what one tile's bake persists and records it under `key`,
/// replacing any previous build data for that tile.
///
/// A lightmap is kept iff the quantized data has any nonzero payload, sky
/// shadowing is baked, any shadow map exists, or any considered light
/// actually contributed. The shadow-map coupling is deliberate: runtime
/// shaders assume a lightmap whenever a shadow map exists, even if every
/// lighting value is zero.
pub fn assemble_tile_build_data(
    registry: &mut BuildDataRegistry,
    key: TileKey,
    quantized: Option<QuantizedLightmapData>,
    shadow_maps: HashMap<LightId, ShadowMapData>,
    considered_lights: &[LightId],
) {
    let mut irrelevant_lights = Vec::new();
    let mut contributing = 0usize;
    for &light in considered_lights {
        let in_lightmap = quantized
            .as_ref()
            .is_some_and(|q| q.light_ids.contains(&light));
        if in_lightmap || shadow_maps.contains_key(&light) {
            contributing += 1;
        } else if !irrelevant_lights.contains(&light) {
            irrelevant_lights.push(light);
        }
    }

    let needs_lightmap = quantized
        .as_ref()
        .is_some_and(|q| q.has_non_zero_data() || q.has_sky_shadowing)
        || !shadow_maps.is_empty()
        || contributing > 0;
    let lightmap = if needs_lightmap { quantized } else { None };

    log::debug!(
        "tile {key:?}: lightmap={} shadow_maps={} irrelevant={}",
        lightmap.is_some(),
        shadow_maps.len(),
        irrelevant_lights.len()
    );

    registry.insert(
        key,
        TileBuildData {
            lightmap,
            shadow_maps,
            irrelevant_lights,
        },
    );
}
