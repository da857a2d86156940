//! Offline terrain lighting bake driver.

mod config;
mod solver;


use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use fastnoise_lite::{FastNoiseLite, NoiseType};
use rayon::prelude::*;

use relief_geom::{Transform, Vec3};
use relief_lightmap::{BuildDataRegistry, LightId, TileKey, assemble_tile_build_data};
use relief_mesh::LightingMesh;
use relief_resample::{SampleCache, resample_tile};
use relief_terrain::{
    HEIGHT_SCALE, HeightMip, HeightTexel, NeighborProvider, Tile, TileCoord, TileHeightfield,
    encode_normal_byte,
};

use config::{BakeConfig, WorldConfig};
use solver::{DirectionalLight, TileTracer, solve_tile};

#[derive(Parser, Debug)]
#[command(name = "reliefbake", about = "Offline terrain lightmap bake")]
struct Args {
    /// Bake configuration (TOML); built-in defaults when absent
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the number of tiles per side
    #[arg(long)]
    tiles: Option<usize>,
    /// Force every tile to bake at this lighting LOD
    #[arg(long)]
    lod: Option<usize>,
}

struct BakeWorld {
    tiles: hashbrown::HashMap<TileCoord, Tile>,
}

impl NeighborProvider for BakeWorld {
    fn tile_at(&self, coord: TileCoord) -> Option<&Tile> {
        self.tiles.get(&coord)
    }
}

/// Stable per-tile registry key derived from the tile's grid position;
/// unchanged across rebuilds unless the tile actually moves.
fn tile_key(coord: TileCoord) -> TileKey {
    TileKey(((coord.tx as u32 as u64) << 32) | coord.ty as u32 as u64)
}

/// Builds one tile's mip-0 heightfield from world-anchored noise so edge
/// vertices agree exactly between neighboring tiles.
fn generate_tile(cfg: &WorldConfig, noise: &FastNoiseLite, coord: TileCoord) -> Tile {
    let size_quads = cfg.subsection_count * cfg.subsection_size_quads;
    let size = size_quads + 1;
    let base_x = coord.tx * size_quads as i32;
    let base_y = coord.ty * size_quads as i32;

    let height_at = |wx: i32, wy: i32| -> f32 {
        32768.0 + cfg.height_amplitude * noise.get_noise_2d(wx as f32, wy as f32)
    };

    let mut texels = Vec::with_capacity(size * size);
    for y in 0..size as i32 {
        for x in 0..size as i32 {
            let (wx, wy) = (base_x + x, base_y + y);
            let h = height_at(wx, wy);
            // Central differences in local units give the surface normal
            let dhdx = (height_at(wx + 1, wy) - height_at(wx - 1, wy)) * 0.5 * HEIGHT_SCALE;
            let dhdy = (height_at(wx, wy + 1) - height_at(wx, wy - 1)) * 0.5 * HEIGHT_SCALE;
            let n = Vec3::new(-dhdx, -dhdy, 1.0).normalized();
            texels.push(HeightTexel {
                height: h.round().clamp(0.0, 65535.0) as u16,
                normal_x: encode_normal_byte(n.x),
                normal_y: encode_normal_byte(n.y),
            });
        }
    }

    let transform = Transform::from_scale_translation(
        Vec3::new(cfg.scale[0], cfg.scale[1], cfg.scale[2]),
        Vec3::new(
            base_x as f32 * cfg.scale[0],
            base_y as f32 * cfg.scale[1],
            0.0,
        ),
    );
    let mip0 = HeightMip::new(size, texels, None);
    let max_lod = ((cfg.subsection_size_quads + 1).ilog2() as usize).saturating_sub(1);
    Tile::new(
        coord,
        cfg.subsection_count,
        cfg.subsection_size_quads,
        transform,
        TileHeightfield::with_mip_chain(mip0, max_lod),
    )
}

fn generate_world(cfg: &BakeConfig, forced_lod: Option<usize>) -> BakeWorld {
    let mut noise = FastNoiseLite::with_seed(cfg.world.seed);
    noise.set_noise_type(Some(NoiseType::OpenSimplex2));
    noise.set_frequency(Some(cfg.world.height_frequency));

    let n = cfg.world.tiles_per_side as i32;
    let mut tiles = hashbrown::HashMap::new();
    for ty in 0..n {
        for tx in 0..n {
            let coord = TileCoord::new(tx, ty);
            let mut tile = generate_tile(&cfg.world, &noise, coord);
            tile.lighting_lod_override = forced_lod.or_else(|| {
                // Checkerboard of coarser tiles keeps the upscaling path hot
                cfg.lighting
                    .coarse_checker_lod
                    .filter(|_| (tx + ty) % 2 == 1)
            });
            tiles.insert(coord, tile);
        }
    }
    BakeWorld { tiles }
}

struct BakeSummary {
    tiles: usize,
    lightmaps: usize,
    shadow_maps: usize,
    irrelevant_lights: usize,
    encoded_texels: usize,
    cached_texels: usize,
}

fn run_bake(cfg: &BakeConfig, forced_lod: Option<usize>) -> BakeSummary {
    let world = generate_world(cfg, forced_lod);
    let lights: Vec<DirectionalLight> = cfg
        .lighting
        .lights
        .iter()
        .map(|l| DirectionalLight {
            id: LightId(l.id),
            direction: Vec3::new(l.direction[0], l.direction[1], l.direction[2]).normalized(),
            intensity: l.intensity,
            cast_shadows: l.cast_shadows,
        })
        .collect();
    let considered: Vec<LightId> = lights.iter().map(|l| l.id).collect();

    // One cache and one registry per build run; the cache is shared across
    // the tile fan-out and must go away before the next run.
    let cache = SampleCache::new();
    let registry = Mutex::new(BuildDataRegistry::new());

    let coords: Vec<TileCoord> = world.tiles.keys().copied().collect();
    coords.par_iter().for_each(|&coord| {
        let tile = world.tile_at(coord).expect("tile was generated");
        let buffer = resample_tile(
            tile,
            tile.lighting_lod(),
            cfg.lighting.expand_quads,
            &world,
            &cache,
        );
        let mesh = LightingMesh::new(tile, &buffer, cfg.lighting.lightmap_ratio);
        let tracer = TileTracer::new(tile);
        let out = solve_tile(&mesh, &lights, cfg.lighting.sky_intensity, &tracer);

        let mut registry = registry.lock().unwrap();
        assemble_tile_build_data(
            &mut registry,
            tile_key(coord),
            Some(out.lightmap),
            out.shadow_maps,
            &considered,
        );
    });

    let registry = registry.into_inner().unwrap();
    let mut summary = BakeSummary {
        tiles: coords.len(),
        lightmaps: 0,
        shadow_maps: 0,
        irrelevant_lights: 0,
        encoded_texels: 0,
        cached_texels: cache.len(),
    };
    for (_, data) in registry.iter() {
        summary.shadow_maps += data.shadow_maps.len();
        summary.irrelevant_lights += data.irrelevant_lights.len();
        if let Some(lightmap) = &data.lightmap {
            summary.lightmaps += 1;
            // Hand the encoder only the cropped mapped region
            if let Some((rect, _cropped)) = lightmap.cropped() {
                summary.encoded_texels += (rect.width() * rect.height()) as usize;
            }
        }
    }
    summary
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => match BakeConfig::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::error!("failed to load {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => BakeConfig::default(),
    };
    if let Some(tiles) = args.tiles {
        cfg.world.tiles_per_side = tiles;
    }

    let summary = run_bake(&cfg, args.lod);
    log::info!(
        "baked {} tiles: {} lightmaps, {} shadow maps, {} irrelevant light entries, {} texels to encode, {} border texels memoized",
        summary.tiles,
        summary.lightmaps,
        summary.shadow_maps,
        summary.irrelevant_lights,
        summary.encoded_texels,
        summary.cached_texels
    );
}
