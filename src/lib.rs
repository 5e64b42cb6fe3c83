//! Read-only access to RS2/JS5 game caches.
//!
//! A cache directory holds a sector-chained data file (`main_file_cache.dat2`,
//! or `main_file_cache.dat` for legacy caches) and one index file per archive
//! (`main_file_cache.idx0` … `idx255`). [`Cache`] resolves an
//! `(archive, group, file)` triple to the bytes of that file.
//!
//! ```no_run
//! use rs2reader::Cache;
//!
//! let cache = Cache::open("data/cache")?;
//! let buf = cache.read(2, 10, 0, None)?;
//! # Ok::<(), rs2reader::CacheError>(())
//! ```

use archive::cache_archive::CacheArchive;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use store::Store;

pub mod archive;
pub mod byte_reader;
pub mod cache;
pub mod djb2;
pub mod ffi;
pub mod group;
pub mod js5_compression;
pub mod js5_index;
pub mod options;
pub mod store;
pub mod xtea;

pub use cache::{CacheError, ErrorKind};
pub use options::CacheOptions;
pub use xtea::XteaKey;

pub struct Cache {
    /// Store, `None` once the cache has been closed
    store: RwLock<Option<Box<dyn Store>>>,

    /// Archives whose reference index has been loaded
    archives: RwLock<HashMap<u8, Arc<CacheArchive>>>,

    options: CacheOptions,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
