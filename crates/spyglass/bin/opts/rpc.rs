use alloy_provider::{Provider, RootProvider};
use alloy_transport_http::{Client, Http};
use clap::Parser;
use eyre::{OptionExt, Result, WrapErr};
use spyglass_utils::rpc::CachedProvider;

use super::CacheOpts;

pub type NodeProvider = CachedProvider<RootProvider<Http<Client>>, Http<Client>>;

#[derive(Clone, Debug, Default, Parser)]
pub struct RpcOpts {
    /// The RPC endpoint.
    #[arg(short = 'r', long = "rpc-url", env = "ETH_RPC_URL")]
    pub url: Option<String>,
}

impl RpcOpts {
    /// Returns the RPC endpoint.
    pub fn url(&self) -> Result<&str> {
        self.url.as_deref().ok_or_eyre("no RPC endpoint given, use --rpc-url or set ETH_RPC_URL")
    }

    /// Create a RPC provider, caching on disk unless disabled or unsupported by the chain.
    pub async fn provider(&self, cache: &CacheOpts) -> Result<NodeProvider> {
        let url = self.url()?;
        let provider =
            RootProvider::new_http(url.parse().wrap_err_with(|| format!("invalid RPC URL {url}"))?);
        let provider = CachedProvider::new(provider);

        let Some(cache_path) = cache.cache_path() else {
            return Ok(provider);
        };
        let chain_id = provider.get_chain_id().await?;
        match provider.clone().with_cache(chain_id, cache_path) {
            Ok(cached) => Ok(cached),
            Err(err) => {
                warn!("caching disabled: {err}");
                Ok(provider)
            }
        }
    }
}
