//! Bulk prefetch of quadtree-partitioned layers.
//!
//! Quadtree index queries can only be rooted at every fifth level and cover
//! the four levels below their root. A prefetch therefore first maps every
//! requested key and level to the index roots covering it, queries each
//! distinct root once, then downloads every distinct tile it found with
//! bounded concurrency. Failures are reported per requested key; one failed
//! tile does not stop the others.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use geocat_model::{IndexedTile, MAX_LEVEL, QUADTREE_DEPTH, TileKey};
use tokio::{sync::Semaphore, task::JoinSet};

use crate::cancellation::CancellationContext;
use crate::error::{Error, Result};
use crate::keys;
use crate::metadata::{ReadableLayer, Repository};
use crate::policy::FetchOption;
use crate::types::{PrefetchRequest, PrefetchTileResult};

/// Most index queries a single prefetch may issue.
pub const MAX_PREFETCH_ROOTS: usize = 1024;

/// Distance between levels index queries can be rooted at.
const INDEX_STRIDE: u32 = QUADTREE_DEPTH + 1;

/// The index queries a prefetch needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PrefetchPlan {
    /// Distinct query roots.
    pub roots: BTreeSet<TileKey>,
    /// Roots each requested key depends on, in request order.
    pub key_roots: Vec<(TileKey, Vec<TileKey>)>,
}

/// Level the index query covering `level` is rooted at.
fn root_level(level: u32) -> u32 {
    level - level % INDEX_STRIDE
}

/// Depth of the index query rooted at `root`.
fn query_depth(root: TileKey) -> u32 {
    QUADTREE_DEPTH.min(MAX_LEVEL - root.level())
}

/// Map a request to the index queries covering it.
pub(crate) fn plan(request: &PrefetchRequest) -> Result<PrefetchPlan> {
    if request.tile_keys.is_empty() {
        return Err(Error::invalid_argument("prefetch needs at least one tile key"));
    }
    if request.min_level > request.max_level {
        return Err(Error::invalid_argument(format!(
            "prefetch min level {} is above max level {}",
            request.min_level, request.max_level
        )));
    }
    if request.max_level > MAX_LEVEL {
        return Err(Error::invalid_argument(format!(
            "prefetch max level {} is above {MAX_LEVEL}",
            request.max_level
        )));
    }

    let too_many = || {
        Error::invalid_argument(format!(
            "prefetch would need more than {MAX_PREFETCH_ROOTS} index queries"
        ))
    };

    let mut roots = BTreeSet::new();
    let mut key_roots = Vec::with_capacity(request.tile_keys.len());
    for &key in &request.tile_keys {
        let mut covering = BTreeSet::new();
        for level in request.min_level..=request.max_level {
            let level = root_level(level);
            if level <= key.level() {
                covering.extend(key.ancestor_at(level));
            } else {
                let count = 1usize
                    .checked_shl(2 * (level - key.level()))
                    .unwrap_or(usize::MAX);
                if count > MAX_PREFETCH_ROOTS {
                    return Err(too_many());
                }
                covering.extend(key.descendants_at_depth(level - key.level()));
            }
        }
        roots.extend(covering.iter().copied());
        if roots.len() > MAX_PREFETCH_ROOTS {
            return Err(too_many());
        }
        key_roots.push((key, covering.into_iter().collect()));
    }

    Ok(PrefetchPlan { roots, key_roots })
}

/// Whether `tile` belongs to the prefetch of `key`.
fn selects(request: &PrefetchRequest, key: TileKey, tile: &IndexedTile) -> bool {
    (request.min_level..=request.max_level).contains(&tile.tile.level())
        && tile.tile.is_related_to(&key)
}

fn record(slot: &mut Option<Error>, error: &Error) {
    if slot.is_none() {
        *slot = Some(error.clone());
    }
}

/// Run a prefetch.
///
/// Versioned layers are prefetched at the pinned or latest version and
/// skip tiles already cached; volatile layers always download.
pub(crate) async fn prefetch(
    repository: Arc<Repository>,
    request: PrefetchRequest,
    concurrency: usize,
    context: CancellationContext,
) -> Result<Vec<PrefetchTileResult>> {
    let plan = plan(&request)?;
    let layer = repository
        .readable_layer(&request.layer_id, FetchOption::CacheWithoutUpdate, &context)
        .await?;
    let (version, option) = match layer {
        ReadableLayer::Versioned => {
            let version = repository
                .version_or_latest(request.version, FetchOption::OnlineOnly, &context)
                .await?;
            (Some(version), FetchOption::CacheWithoutUpdate)
        }
        ReadableLayer::Volatile => (None, FetchOption::OnlineOnly),
    };

    tracing::debug!(
        layer_id = request.layer_id,
        keys = request.tile_keys.len(),
        roots = plan.roots.len(),
        "prefetching"
    );

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let layer_id: Arc<str> = Arc::from(request.layer_id.as_str());

    let mut queries = JoinSet::new();
    for root in plan.roots.iter().copied() {
        let repository = Arc::clone(&repository);
        let semaphore = Arc::clone(&semaphore);
        let layer_id = Arc::clone(&layer_id);
        let context = context.child();
        queries.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => repository
                    .quadtree(&layer_id, root, version, query_depth(root), option, &context)
                    .await
                    .and_then(|index| Ok(index.tiles(root)?)),
                Err(_) => Err(Error::Cancelled),
            };
            (root, result)
        });
    }

    let mut indexes: HashMap<TileKey, Result<Vec<IndexedTile>>> = HashMap::new();
    while let Some(joined) = queries.join_next().await {
        match joined {
            Ok((root, result)) => {
                if let Err(e) = &result {
                    tracing::warn!(root = %root, error = %e, "prefetch index query failed");
                }
                indexes.insert(root, result);
            }
            Err(e) => tracing::warn!(error = %e, "prefetch index task failed"),
        }
    }

    let mut leaves: BTreeMap<TileKey, IndexedTile> = BTreeMap::new();
    for (key, roots) in &plan.key_roots {
        for root in roots {
            if let Some(Ok(tiles)) = indexes.get(root) {
                for tile in tiles.iter().filter(|tile| selects(&request, *key, tile)) {
                    leaves.entry(tile.tile).or_insert_with(|| tile.clone());
                }
            }
        }
    }

    let mut downloads = JoinSet::new();
    for leaf in leaves.into_values() {
        let repository = Arc::clone(&repository);
        let semaphore = Arc::clone(&semaphore);
        let layer_id = Arc::clone(&layer_id);
        let context = context.child();
        downloads.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => {
                    download(&repository, &layer_id, &leaf, layer, option, &context).await
                }
                Err(_) => Err(Error::Cancelled),
            };
            (leaf.tile, result)
        });
    }

    let mut downloaded: HashMap<TileKey, Result<()>> = HashMap::new();
    while let Some(joined) = downloads.join_next().await {
        match joined {
            Ok((tile, result)) => {
                downloaded.insert(tile, result);
            }
            Err(e) => tracing::warn!(error = %e, "prefetch download task failed"),
        }
    }

    let results = plan
        .key_roots
        .iter()
        .map(|(key, roots)| {
            let mut prefetched = BTreeSet::new();
            let mut error = None;
            for root in roots {
                match indexes.get(root) {
                    Some(Ok(tiles)) => {
                        for tile in tiles.iter().filter(|tile| selects(&request, *key, tile)) {
                            match downloaded.get(&tile.tile) {
                                Some(Ok(())) => {
                                    prefetched.insert(tile.tile);
                                }
                                Some(Err(e)) => record(&mut error, e),
                                None => record(&mut error, &Error::Cancelled),
                            }
                        }
                    }
                    Some(Err(e)) => record(&mut error, e),
                    None => record(&mut error, &Error::Cancelled),
                }
            }
            PrefetchTileResult {
                tile_key: *key,
                prefetched: prefetched.into_iter().collect(),
                error,
            }
        })
        .collect();

    Ok(results)
}

/// Put one tile's payload in the cache.
async fn download(
    repository: &Repository,
    layer_id: &str,
    leaf: &IndexedTile,
    layer: ReadableLayer,
    option: FetchOption,
    context: &CancellationContext,
) -> Result<()> {
    if option.reads_cache() {
        let key = keys::data(repository.hrn(), layer_id, &leaf.data_handle);
        if repository.cache().contains(&key).unwrap_or(false) {
            tracing::debug!(tile = %leaf.tile, "already cached");
            return Ok(());
        }
    }
    repository
        .blob(layer_id, &leaf.data_handle, layer, FetchOption::OnlineOnly, context)
        .await
        .map(drop)
}
