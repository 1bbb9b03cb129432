use std::path::PathBuf;

use clap::Parser;
use spyglass_utils::cache::CachePath;

#[derive(Clone, Debug, Default, Parser)]
pub struct CacheOpts {
    /// The root directory for the cache. If not provided, the default is `~/.spyglass/cache`.
    #[clap(long, env = "SPYGLASS_CACHE_ROOT", conflicts_with = "no_cache")]
    pub cache_root: Option<PathBuf>,

    /// Do not use the cache.
    #[clap(long, conflicts_with = "cache_root")]
    pub no_cache: bool,
}

impl CacheOpts {
    pub fn cache_path(&self) -> Option<CachePath> {
        if self.no_cache {
            None
        } else {
            Some(CachePath::new(self.cache_root.clone()))
        }
    }
}
