/// Engine-wide tuning and sharding configuration.
///
/// `page_size`/`cache_size_bytes` are passed through to the backing store
/// as SQLite pragmas; `subcount`/`submin`/`submax` configure the shard
/// router (`Routing`, in the `bfx-indexer` crate's `router` module).
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub page_size: u32,
    pub cache_size_bytes: i64,
    pub subcount: u32,
    pub submin: u32,
    pub submax: u32,
}

/// Default cache budget for a read-only engine (16 MiB, per the design).
pub const DEFAULT_READONLY_CACHE_BYTES: i64 = 16 * 1024 * 1024;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            cache_size_bytes: 0,
            subcount: 0,
            submin: 0,
            submax: 0,
        }
    }
}

impl EngineConfig {
    /// A config with sharding enabled across `subcount` shards, restricted
    /// to the inclusive `[submin, submax]` slice this process owns.
    pub fn with_sharding(mut self, subcount: u32, submin: u32, submax: u32) -> Self {
        self.subcount = subcount;
        self.submin = submin;
        self.submax = submax;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_cache_size_bytes(mut self, bytes: i64) -> Self {
        self.cache_size_bytes = bytes;
        self
    }

    /// Config for a read-only engine: same sharding, default 16 MiB cache.
    pub fn read_only(mut self) -> Self {
        self.cache_size_bytes = DEFAULT_READONLY_CACHE_BYTES;
        self
    }
}
