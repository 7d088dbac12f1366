//! On-disk terrain format: a JSON metadata document plus one compressed
//! texel blob per atlas.
//!
//! Only base mip levels are stored; mips, channel usage tables, and
//! collision fields are derived again on load.

use std::fs;
use std::path::Path;

use log::info;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};

use crate::atlas::{AtlasId, AtlasKind, AtlasTexture, Texel};
use crate::core::types::Result;
use crate::core::Error;
use crate::terrain::component::Component;
use crate::terrain::layer::LayerInfo;
use crate::terrain::{Terrain, TerrainDescriptor};

const FORMAT_VERSION: u32 = 1;
const METADATA_FILE: &str = "terrain.json";

#[derive(Serialize, Deserialize)]
struct TerrainDoc {
    version: u32,
    descriptor: TerrainDescriptor,
    layers: Vec<LayerInfo>,
    collision_mip: u8,
    atlases: Vec<AtlasDoc>,
    components: Vec<Component>,
}

#[derive(Serialize, Deserialize)]
struct AtlasDoc {
    id: AtlasId,
    kind: AtlasKind,
    size_x: usize,
    size_y: usize,
    blob: String,
}

impl Terrain {
    /// Write the terrain into a directory, overwriting existing files.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        let mut atlases = Vec::new();
        for id in self.atlases.ids() {
            let tex = self.atlases.texture(id);
            let (size_x, size_y) = tex.size();
            let blob = format!("atlas_{}.bin", id.0);
            let compressed = compress_prepend_size(bytemuck::cast_slice(tex.base_data()));
            fs::write(dir.join(&blob), compressed)?;
            atlases.push(AtlasDoc { id, kind: self.atlases.kind(id), size_x, size_y, blob });
        }

        let doc = TerrainDoc {
            version: FORMAT_VERSION,
            descriptor: self.descriptor(),
            layers: self.layers.clone(),
            collision_mip: self.collision_mip,
            atlases,
            components: self
                .component_ids()
                .into_iter()
                .map(|id| self.component(id).clone())
                .collect(),
        };
        let file = fs::File::create(dir.join(METADATA_FILE))?;
        serde_json::to_writer_pretty(file, &doc)?;
        info!(
            "saved terrain to {}: {} components, {} atlases",
            dir.display(),
            doc.components.len(),
            doc.atlases.len()
        );
        Ok(())
    }

    /// Read a terrain back from a directory written by [`save`](Self::save).
    pub fn load(dir: &Path) -> Result<Terrain> {
        let file = fs::File::open(dir.join(METADATA_FILE))?;
        let doc: TerrainDoc = serde_json::from_reader(file)?;
        if doc.version != FORMAT_VERSION {
            return Err(Error::Persist(format!(
                "unsupported format version {}",
                doc.version
            )));
        }

        let mut terrain = Terrain::new(&doc.descriptor)?;
        terrain.layers = doc.layers;
        terrain.collision_mip = doc.collision_mip;

        // atlas ids are reassigned on insert, so remap component references
        let mut id_map = std::collections::HashMap::new();
        let mut docs = doc.atlases;
        docs.sort_by_key(|a| a.id);
        for a in docs {
            let bytes = decompress_size_prepended(&fs::read(dir.join(&a.blob))?)
                .map_err(|e| Error::Persist(format!("blob '{}': {}", a.blob, e)))?;
            if bytes.len() % std::mem::size_of::<Texel>() != 0 {
                return Err(Error::Persist(format!(
                    "blob '{}' is not a whole number of texels",
                    a.blob
                )));
            }
            let mut tex = AtlasTexture::new(a.size_x, a.size_y);
            tex.set_base_data(bytemuck::cast_slice(&bytes).to_vec())?;
            let new_id = terrain.atlases.insert(tex, a.kind);
            id_map.insert(a.id, new_id);
        }

        let remap = |id: AtlasId| -> Result<AtlasId> {
            id_map
                .get(&id)
                .copied()
                .ok_or_else(|| Error::Persist(format!("component references missing atlas {:?}", id)))
        };
        let csq = doc.descriptor.component_size_quads;
        for mut comp in doc.components {
            comp.height_atlas = remap(comp.height_atlas)?;
            for a in &mut comp.weight_atlases {
                *a = remap(*a)?;
            }
            let (cx, cy) = comp.grid_pos(csq);
            let id = terrain.insert_component(comp);
            terrain.register_component_pos(cx, cy, id);
        }

        terrain.rebuild_channel_usage()?;
        for id in terrain.component_ids() {
            terrain.regenerate_component_height_mips(id);
            terrain.regenerate_component_weight_mips(id);
            terrain.rebuild_collision(id);
        }
        info!(
            "loaded terrain from {}: {} components",
            dir.display(),
            terrain.component_count()
        );
        Ok(terrain)
    }
}
