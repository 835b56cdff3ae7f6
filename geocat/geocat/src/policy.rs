//! Cache policy.
//!
//! Every read names a [`FetchOption`] deciding whether the cache is read,
//! whether the network is used and whether the result is written back.

use std::{future::Future, time::Duration};

use geocat_model::{Catalog, LayerVersions, Partitions, QuadTreeIndex, VersionResponse};

use crate::cache::{Cache, CacheScope};
use crate::error::{Error, Result};

/// Where a read may be served from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FetchOption {
    /// Always fetch from the network, never read the cache. The result is
    /// still written to the cache.
    OnlineOnly,
    /// Serve from the cache only. A miss is [`Error::NotFound`] and no
    /// request is sent.
    CacheOnly,
    /// Serve from the cache and refresh the entry in the background.
    CacheWithUpdate,
    /// Serve from the cache, fetching from the network on a miss.
    #[default]
    CacheWithoutUpdate,
}

impl FetchOption {
    /// Whether the cache is consulted before the network.
    #[must_use]
    pub fn reads_cache(self) -> bool {
        !matches!(self, Self::OnlineOnly)
    }

    /// Whether a cache miss falls through to the network in the foreground.
    #[must_use]
    pub fn fetches_on_miss(self) -> bool {
        matches!(self, Self::OnlineOnly | Self::CacheWithoutUpdate)
    }

    /// Whether a background refresh accompanies the foreground read.
    #[must_use]
    pub fn refreshes_in_background(self) -> bool {
        matches!(self, Self::CacheWithUpdate)
    }

    /// Option for prerequisite lookups that rarely change, such as the
    /// catalog configuration used to find a layer's type.
    #[must_use]
    pub(crate) fn for_configuration(self) -> Self {
        match self {
            Self::OnlineOnly => Self::CacheWithoutUpdate,
            other => other,
        }
    }
}

/// Values that can be stored in the cache.
pub trait Cached: Sized {
    /// Serialize for storage.
    fn encode(&self) -> Result<Vec<u8>>;
    /// Deserialize from storage.
    fn decode(bytes: &[u8]) -> Result<Self>;
}

impl Cached for Vec<u8> {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.clone())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

macro_rules! cached_as_json {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Cached for $ty {
                fn encode(&self) -> Result<Vec<u8>> {
                    serde_json::to_vec(self).map_err(|e| Error::Cache {
                        operation: "encode",
                        message: e.to_string(),
                    })
                }

                fn decode(bytes: &[u8]) -> Result<Self> {
                    serde_json::from_slice(bytes).map_err(|e| Error::Cache {
                        operation: "decode",
                        message: e.to_string(),
                    })
                }
            }
        )*
    };
}

cached_as_json!(Catalog, VersionResponse, LayerVersions, Partitions, QuadTreeIndex);

/// Where a value lives in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CacheSlot {
    pub key: String,
    pub scope: CacheScope,
    pub expiry: Option<Duration>,
}

impl CacheSlot {
    /// A slot for data that may change between reads.
    pub(crate) fn mutable(key: String) -> Self {
        Self {
            key,
            scope: CacheScope::Mutable,
            expiry: None,
        }
    }

    /// A slot for data that never changes once published.
    pub(crate) fn protected(key: String) -> Self {
        Self {
            key,
            scope: CacheScope::Protected,
            expiry: None,
        }
    }

    /// Protected when `versioned`, mutable otherwise.
    pub(crate) fn for_layer(key: String, versioned: bool) -> Self {
        if versioned {
            Self::protected(key)
        } else {
            Self::mutable(key)
        }
    }
}

/// Read a value from the cache. Unreadable entries count as misses.
pub(crate) fn read<T: Cached>(cache: &dyn Cache, key: &str) -> Option<T> {
    match cache.get(key) {
        Ok(Some(bytes)) => match T::decode(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding unreadable cache entry");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(key, error = %e, "cache read failed");
            None
        }
    }
}

/// Write a value to the cache, replacing any previous entry.
pub(crate) fn write<T: Cached>(cache: &dyn Cache, slot: &CacheSlot, value: &T) {
    let stored = value
        .encode()
        .and_then(|bytes| cache.put(&slot.key, bytes, slot.scope, slot.expiry));
    if let Err(e) = stored {
        tracing::warn!(key = slot.key, error = %e, "cache write failed");
    }
}

/// Serve a read according to `option`.
///
/// `fetch` runs only when the option allows the network and the cache did
/// not answer. A successful fetch is written to `slot`.
pub(crate) async fn fetch_with_policy<T, F, Fut>(
    cache: &dyn Cache,
    slot: &CacheSlot,
    option: FetchOption,
    fetch: F,
) -> Result<T>
where
    T: Cached,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if option.reads_cache() {
        if let Some(value) = read(cache, &slot.key) {
            tracing::debug!(key = slot.key, "cache hit");
            return Ok(value);
        }
        tracing::debug!(key = slot.key, "cache miss");
    }

    if !option.fetches_on_miss() {
        return Err(Error::not_found(format!("{} is not cached", slot.key)));
    }

    let value = fetch().await?;
    write(cache, slot, &value);
    Ok(value)
}
