//! World persistence in Anvil region files (.mca).
//!
//! Saves and loads `World` data to/from `world/region/r.X.Z.mca` files. Each
//! chunk stores its solid and fluid layers as paletted, bit-packed sections
//! (palette entries are registry codes) plus its metadata map. Host-level
//! state (calendar, rain settings) lives next to the regions in `level.json`.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Seek};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use finite_engine::world::block::{BlockId, StoreLayer};
use finite_engine::world::chunk::{Chunk, ChunkSection, SECTION_VOLUME};
use finite_engine::world::position::ChunkPos;
use finite_engine::world::registry::BlockRegistry;
use finite_engine::world::World;

/// Format version written into every saved chunk.
const DATA_VERSION: i32 = 1;

/// Chunks per region file along each axis.
const REGION_CHUNKS: i32 = 32;

// ── Chunk NBT structs (serde) ────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug)]
struct ChunkNbt {
    #[serde(rename = "DataVersion")]
    data_version: i32,
    #[serde(rename = "xPos")]
    x_pos: i32,
    #[serde(rename = "zPos")]
    z_pos: i32,
    #[serde(rename = "yPos")]
    y_pos: i32,
    sections: Vec<SectionNbt>,
    #[serde(rename = "fluid_sections", default)]
    fluid_sections: Vec<SectionNbt>,
    #[serde(rename = "ModData", default)]
    moddata: HashMap<String, f64>,
    #[serde(rename = "Status")]
    status: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct SectionNbt {
    #[serde(rename = "Y")]
    y: i8,
    block_states: BlockStatesNbt,
}

#[derive(Serialize, Deserialize, Debug)]
struct BlockStatesNbt {
    palette: Vec<PaletteEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Vec<i64>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct PaletteEntry {
    #[serde(rename = "Name")]
    name: String,
}

// ── Bit-packing helpers ──────────────────────────────────────────────────────

/// Pack palette indices into a `Vec<i64>`.
///
/// `bits_per_entry` = max(4, ceil(log2(palette_len))).
/// Entries are packed sequentially into i64s with no entry spanning two longs.
fn pack_indices(indices: &[u16], palette_len: usize) -> Option<Vec<i64>> {
    if palette_len <= 1 {
        return None; // single-block section, no data array needed
    }

    let bits = bits_per_entry(palette_len);
    let entries_per_long = 64 / bits;
    let num_longs = indices.len().div_ceil(entries_per_long);
    let mask = (1u64 << bits) - 1;

    let mut longs = vec![0i64; num_longs];
    for (i, &idx) in indices.iter().enumerate() {
        let long_idx = i / entries_per_long;
        let bit_offset = (i % entries_per_long) * bits;
        longs[long_idx] |= ((idx as u64 & mask) << bit_offset) as i64;
    }
    Some(longs)
}

/// Unpack `count` palette indices from packed longs. Missing longs read as 0.
fn unpack_indices(data: &[i64], palette_len: usize, count: usize) -> Vec<u16> {
    let bits = bits_per_entry(palette_len);
    let entries_per_long = 64 / bits;
    let mask = (1u64 << bits) - 1;

    let mut indices = vec![0u16; count];
    for (i, idx) in indices.iter_mut().enumerate() {
        let long_idx = i / entries_per_long;
        let bit_offset = (i % entries_per_long) * bits;
        if let Some(&long) = data.get(long_idx) {
            *idx = ((long as u64 >> bit_offset) & mask) as u16;
        }
    }
    indices
}

/// Calculate bits per palette entry (minimum 4).
fn bits_per_entry(palette_len: usize) -> usize {
    let raw = if palette_len <= 1 {
        0
    } else {
        (usize::BITS - (palette_len - 1).leading_zeros()) as usize
    };
    raw.max(4)
}

// ── Save ─────────────────────────────────────────────────────────────────────

/// Save only dirty (modified) chunks to Anvil region files under `<dir>/region/`.
///
/// Existing region files are opened and updated in-place; new region files are
/// created as needed. Returns the number of chunks written.
pub fn save_world(world: &World, dir: &Path) -> Result<usize> {
    let dirty = world.take_dirty_chunks();
    if dirty.is_empty() {
        tracing::info!("World save: nothing to save (no dirty chunks)");
        return Ok(0);
    }

    let start = Instant::now();
    let region_dir = dir.join("region");
    fs::create_dir_all(&region_dir)?;

    let registry = world.registry();
    let mut region_chunks: HashMap<(i32, i32), Vec<(ChunkPos, Vec<u8>)>> = HashMap::new();

    for pos in &dirty {
        let Some(chunk_ref) = world.get_chunk(pos) else {
            continue; // Chunk was unloaded between dirty-mark and save.
        };
        let nbt = chunk_to_nbt(*pos, &chunk_ref, registry);
        drop(chunk_ref); // Release DashMap ref before serialization.
        let nbt_bytes = fastnbt::to_bytes(&nbt)
            .with_context(|| format!("serializing chunk ({}, {})", pos.x, pos.z))?;

        let rx = pos.x.div_euclid(REGION_CHUNKS);
        let rz = pos.z.div_euclid(REGION_CHUNKS);
        region_chunks
            .entry((rx, rz))
            .or_default()
            .push((*pos, nbt_bytes));
    }

    let mut total_chunks = 0usize;

    for ((rx, rz), chunks) in &region_chunks {
        let path = region_dir.join(format!("r.{}.{}.mca", rx, rz));

        let mut region = if path.exists() {
            let file_bytes = fs::read(&path)
                .with_context(|| format!("reading region r.{}.{}", rx, rz))?;
            fastanvil::Region::from_stream(Cursor::new(file_bytes))
                .with_context(|| format!("parsing region r.{}.{}", rx, rz))?
        } else {
            fastanvil::Region::new(Cursor::new(Vec::new()))
                .with_context(|| format!("creating region r.{}.{}", rx, rz))?
        };

        for (pos, nbt_bytes) in chunks {
            let local_x = pos.x.rem_euclid(REGION_CHUNKS) as usize;
            let local_z = pos.z.rem_euclid(REGION_CHUNKS) as usize;
            region
                .write_chunk(local_x, local_z, nbt_bytes)
                .with_context(|| format!("writing chunk ({}, {})", pos.x, pos.z))?;
            total_chunks += 1;
        }

        // Flush: recover the cursor and write to disk.
        let mut cursor = region.into_inner()?;
        let len = cursor.stream_position()?;
        let data = cursor.into_inner();
        fs::write(&path, &data[..len as usize])?;
    }

    tracing::info!(
        "World saved: {} dirty chunks across {} regions ({:.2?})",
        total_chunks,
        region_chunks.len(),
        start.elapsed(),
    );
    Ok(total_chunks)
}

fn chunk_to_nbt(pos: ChunkPos, chunk: &Chunk, registry: &BlockRegistry) -> ChunkNbt {
    let layer_to_nbt = |layer| {
        let mut sections: Vec<SectionNbt> = chunk
            .sections(layer)
            .map(|(&idx, section)| section_to_nbt(idx, section, registry))
            .collect();
        sections.sort_by_key(|s| s.y);
        sections
    };
    let sections = layer_to_nbt(StoreLayer::Solid);
    let fluid_sections = layer_to_nbt(StoreLayer::Fluid);

    // yPos = lowest section index in this chunk.
    let y_pos = sections
        .iter()
        .chain(&fluid_sections)
        .map(|s| s.y as i32)
        .min()
        .unwrap_or(0);

    ChunkNbt {
        data_version: DATA_VERSION,
        x_pos: pos.x,
        z_pos: pos.z,
        y_pos,
        sections,
        fluid_sections,
        moddata: chunk
            .moddata_entries()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        status: "full".into(),
    }
}

/// Section blocks are stored y-major (`y * 32 * 32 + z * 32 + x`), the same
/// order as the engine's `ChunkSection`, so no remapping is needed.
fn section_to_nbt(section_idx: i32, section: &ChunkSection, registry: &BlockRegistry) -> SectionNbt {
    let mut palette_map: HashMap<BlockId, u16> = HashMap::new();
    let mut palette: Vec<PaletteEntry> = Vec::new();

    let indices: Vec<u16> = section
        .blocks()
        .iter()
        .map(|&block| {
            *palette_map.entry(block).or_insert_with(|| {
                palette.push(PaletteEntry {
                    name: registry.code(block).to_string(),
                });
                (palette.len() - 1) as u16
            })
        })
        .collect();

    let data = pack_indices(&indices, palette.len());

    SectionNbt {
        y: section_idx as i8,
        block_states: BlockStatesNbt { palette, data },
    }
}

// ── Load ─────────────────────────────────────────────────────────────────────

/// Load a world from Anvil region files under `<dir>/region/`.
///
/// Returns `None` if the region directory does not exist or holds no chunks.
/// Loaded chunks are not marked dirty.
pub fn load_world(dir: &Path, registry: Arc<BlockRegistry>, map_height: i64) -> Result<Option<World>> {
    let world = World::with_height(registry, map_height);
    let loaded = load_into(&world, dir)?;
    Ok((loaded > 0).then_some(world))
}

/// Load every saved chunk under `<dir>/region/` into `world`, replacing any
/// chunk already present at the same position. Returns the number of chunks
/// loaded (0 when there is no region directory).
pub fn load_into(world: &World, dir: &Path) -> Result<usize> {
    let region_dir = dir.join("region");
    if !region_dir.is_dir() {
        return Ok(0);
    }

    let start = Instant::now();
    let registry = Arc::clone(world.registry());
    let mut total_chunks = 0usize;
    let mut region_count = 0usize;

    for entry in fs::read_dir(&region_dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".mca") {
            continue;
        }

        // Region coordinates from the filename: r.X.Z.mca
        let parts: Vec<&str> = name.trim_end_matches(".mca").split('.').collect();
        if parts.len() != 3 || parts[0] != "r" {
            tracing::warn!("Skipping unexpected file in region dir: {}", name);
            continue;
        }

        let file = fs::File::open(&path)
            .with_context(|| format!("opening region file {}", path.display()))?;
        let mut region = fastanvil::Region::from_stream(file)
            .with_context(|| format!("parsing region file {}", path.display()))?;

        for x in 0..REGION_CHUNKS as usize {
            for z in 0..REGION_CHUNKS as usize {
                let Some(nbt_bytes) = region
                    .read_chunk(x, z)
                    .with_context(|| format!("reading chunk ({}, {}) from {}", x, z, name))?
                else {
                    continue;
                };

                let chunk_nbt: ChunkNbt = fastnbt::from_bytes(&nbt_bytes)
                    .with_context(|| format!("deserializing chunk ({}, {}) from {}", x, z, name))?;

                let chunk_pos = ChunkPos::new(chunk_nbt.x_pos, chunk_nbt.z_pos);
                world.insert_chunk(chunk_pos, nbt_to_chunk(&chunk_nbt, &registry));
                total_chunks += 1;
            }
        }
        region_count += 1;
    }

    if total_chunks > 0 {
        tracing::info!(
            "World loaded: {} chunks from {} regions ({:.2?})",
            total_chunks,
            region_count,
            start.elapsed(),
        );
    }
    Ok(total_chunks)
}

fn nbt_to_chunk(nbt: &ChunkNbt, registry: &BlockRegistry) -> Chunk {
    let mut chunk = Chunk::new();

    for (layer, sections) in [
        (StoreLayer::Solid, &nbt.sections),
        (StoreLayer::Fluid, &nbt.fluid_sections),
    ] {
        for section_nbt in sections {
            if let Some(section) = nbt_to_section(section_nbt, registry) {
                chunk.insert_section(layer, section_nbt.y as i32, section);
            }
        }
    }

    for (key, value) in &nbt.moddata {
        chunk.set_moddata(key, *value);
    }

    chunk
}

fn nbt_to_section(nbt: &SectionNbt, registry: &BlockRegistry) -> Option<ChunkSection> {
    let palette = &nbt.block_states.palette;
    if palette.is_empty() {
        return None;
    }

    let resolved: Vec<BlockId> = palette
        .iter()
        .map(|entry| match registry.lookup(&entry.name) {
            Some(id) => id,
            None => {
                tracing::warn!("Unknown block in save file: {}, defaulting to air", entry.name);
                BlockId::AIR
            }
        })
        .collect();

    let blocks = match &nbt.block_states.data {
        Some(data) if palette.len() > 1 => unpack_indices(data, palette.len(), SECTION_VOLUME)
            .into_iter()
            .map(|idx| resolved.get(idx as usize).copied().unwrap_or(BlockId::AIR))
            .collect(),
        _ => vec![resolved[0]; SECTION_VOLUME],
    };

    ChunkSection::from_blocks(blocks).filter(|section| !section.is_empty())
}

// ── Level metadata ───────────────────────────────────────────────────────────

/// Host state saved alongside the regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelMeta {
    /// Calendar hours at save time.
    pub total_hours: f64,
    /// Weather region width in blocks.
    pub region_size: i32,
    pub rain_enabled: bool,
}

pub fn save_level_meta(dir: &Path, meta: &LevelMeta) -> Result<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join("level.json");
    let json = serde_json::to_string_pretty(meta)?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))
}

/// Read `<dir>/level.json`, `None` if it does not exist.
pub fn load_level_meta(dir: &Path) -> Result<Option<LevelMeta>> {
    let path = dir.join("level.json");
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let meta = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(meta))
}

// ── Tests ────────────────────────────────────────────────────────────────────
