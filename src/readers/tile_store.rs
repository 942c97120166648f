use crate::error::{DatasetError, Result};
use crate::models::{TerrainKind, Tile};
use crate::readers::tile_reader::TileSource;
use crate::utils::constants::DEFAULT_CROP_SIZE;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Loads, crops and caches station tiles.
///
/// Raw tiles are cached per kind so repeated loads for the same stations hit the backing
/// store once per run.
pub struct TileStore {
    source: Arc<dyn TileSource>,
    crop_size: usize,
    cache: BTreeMap<TerrainKind, HashMap<String, Arc<Tile>>>,
}

impl TileStore {
    pub fn new(source: Arc<dyn TileSource>) -> Self {
        Self {
            source,
            crop_size: DEFAULT_CROP_SIZE,
            cache: BTreeMap::new(),
        }
    }

    pub fn with_crop_size(mut self, crop_size: usize) -> Self {
        self.crop_size = crop_size;
        self
    }

    pub fn crop_size(&self) -> usize {
        self.crop_size
    }

    /// Centered `crop_size` crops, channels concatenated in the order of `kinds`
    pub fn load(&mut self, kinds: &[TerrainKind], names: &[String]) -> Result<HashMap<String, Arc<Tile>>> {
        let raw = self.raw_tiles(kinds, names)?;
        let crop_size = self.crop_size;

        raw.into_par_iter()
            .map(|(name, layers)| {
                let cropped = layers
                    .iter()
                    .map(|t| t.center_crop(crop_size))
                    .collect::<Result<Vec<_>>>()?;
                let tile = stack(&cropped.iter().collect::<Vec<_>>())?;
                Ok((name, Arc::new(tile)))
            })
            .collect()
    }

    /// Uncropped tiles, for crops re-centered per observation
    pub fn load_large(&mut self, kinds: &[TerrainKind], names: &[String]) -> Result<HashMap<String, Arc<Tile>>> {
        let raw = self.raw_tiles(kinds, names)?;

        raw.into_par_iter()
            .map(|(name, layers)| {
                let tile = match layers.as_slice() {
                    [single] => Arc::clone(single),
                    _ => Arc::new(stack(&layers.iter().map(|t| t.as_ref()).collect::<Vec<_>>())?),
                };
                Ok((name, tile))
            })
            .collect()
    }

    pub fn cached(&self, kind: TerrainKind) -> usize {
        self.cache.get(&kind).map(|c| c.len()).unwrap_or(0)
    }

    /// Per station, one raw tile per kind in the requested order
    fn raw_tiles(&mut self, kinds: &[TerrainKind], names: &[String]) -> Result<HashMap<String, Vec<Arc<Tile>>>> {
        if kinds.is_empty() {
            return Err(DatasetError::Config("No terrain kind requested".to_string()));
        }

        for &kind in kinds {
            self.fill_cache(kind, names)?;
        }

        let mut tiles = HashMap::with_capacity(names.len());
        for name in names {
            let layers = kinds
                .iter()
                .map(|kind| {
                    self.cache
                        .get(kind)
                        .and_then(|c| c.get(name))
                        .cloned()
                        .ok_or_else(|| DatasetError::MissingTile {
                            station: name.clone(),
                            kind: *kind,
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            tiles.insert(name.clone(), layers);
        }
        Ok(tiles)
    }

    fn fill_cache(&mut self, kind: TerrainKind, names: &[String]) -> Result<()> {
        let cache = self.cache.entry(kind).or_default();
        let mut missing: Vec<String> = names
            .iter()
            .filter(|n| !cache.contains_key(*n))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();

        if missing.is_empty() {
            return Ok(());
        }

        debug!("Loading {} {} tiles", missing.len(), kind);
        let loaded = self.source.load(kind, &missing)?;
        cache.extend(loaded.into_iter().map(|(name, tile)| (name, Arc::new(tile))));
        Ok(())
    }
}

fn stack(layers: &[&Tile]) -> Result<Tile> {
    match layers {
        [single] => Ok((*single).clone()),
        _ => Tile::concat_channels(layers),
    }
}
