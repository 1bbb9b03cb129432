use std::{
    borrow::Cow,
    collections::BTreeMap,
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

use alloy_chains::{Chain, NamedChain};
use alloy_primitives::{Address, Bytes, TxHash, U256, U64};
use alloy_provider::Provider;
use alloy_rpc_types::{BlockId, BlockNumberOrTag, Transaction, TransactionReceipt};
use alloy_transport::Transport;
use eyre::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::cache::{Cache, CachePath};

/// Parameters of a message call, as sent to `eth_createAccessList`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub gas: U64,
    pub gas_price: U256,
    pub value: U256,
    pub data: Bytes,
}

/// A code substitution for one account during a simulated call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CodeOverride {
    pub code: Bytes,
}

/// Per-address code overrides, serialized in the `eth_call` state override format.
pub type StateOverrides = BTreeMap<Address, CodeOverride>;

/// The node capabilities the trace builder relies on.
#[async_trait::async_trait]
pub trait NodeClient: Send + Sync {
    /// Fetches the deployed code of `address` at `block`.
    async fn code_at(&self, address: Address, block: BlockId) -> Result<Bytes>;

    /// Fetches the addresses a call is expected to touch.
    async fn access_list(&self, request: &CallRequest, block: BlockId) -> Result<Vec<Address>>;

    /// Executes a read-only call to `to` with `input`, substituting account code as given.
    async fn call(
        &self,
        to: Address,
        input: Bytes,
        overrides: &StateOverrides,
        block: BlockId,
    ) -> Result<Bytes>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessListItem {
    address: Address,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessListResult {
    access_list: Vec<AccessListItem>,
}

#[derive(Clone, Debug, Serialize)]
struct CallParams {
    to: Address,
    data: Bytes,
}

/// A provider wrapper that caches immutable chain data on disk.
#[derive(Debug, Clone)]
pub struct CachedProvider<P, T> {
    provider: P,

    // Cache for the provider
    code_cache: Option<(Chain, CachePath)>,
    receipt_cache: Cache<Option<TransactionReceipt>>,
    tx_cache: Cache<Option<Transaction>>,

    _transport: PhantomData<fn() -> T>,
}

impl<P, T> Deref for CachedProvider<P, T> {
    type Target = P;

    fn deref(&self) -> &Self::Target {
        &self.provider
    }
}

impl<P, T> DerefMut for CachedProvider<P, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.provider
    }
}

impl<P, T> CachedProvider<P, T>
where
    P: Provider<T>,
    T: Transport + Clone,
{
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            code_cache: None,
            receipt_cache: Cache::default(),
            tx_cache: Cache::default(),
            _transport: PhantomData,
        }
    }

    pub fn with_cache(mut self, chain: impl Into<Chain>, cache_path: CachePath) -> Result<Self> {
        let chain = chain.into();

        let named_chain: NamedChain = chain.id().try_into().map_err(|_| {
            eyre::eyre!("The provider does not support caching for unnamed chain: {}", chain.id())
        })?;
        if named_chain == NamedChain::Dev || named_chain == NamedChain::AnvilHardhat {
            bail!("The provider does not support caching for dev chain: {}", chain.id());
        }

        self.receipt_cache = Cache::new(cache_path.receipt_cache_dir(chain), None)?;
        self.tx_cache = Cache::new(cache_path.tx_cache_dir(chain), None)?;
        self.code_cache = Some((chain, cache_path));

        Ok(self)
    }

    /// Fetches a transaction by hash.
    pub async fn transaction(&self, hash: TxHash) -> Result<Option<Transaction>> {
        if let Some(tx) = self.tx_cache.load_cache(hash.to_string()) {
            return Ok(tx);
        }

        let tx = self.provider.get_transaction_by_hash(hash).await?;
        // pending transactions may still change
        if tx.as_ref().is_some_and(|tx| tx.block_number.is_some()) {
            self.tx_cache.save_cache(hash.to_string(), &tx)?;
        }
        Ok(tx)
    }

    /// Fetches a transaction receipt by hash.
    pub async fn receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>> {
        if let Some(receipt) = self.receipt_cache.load_cache(hash.to_string()) {
            return Ok(receipt);
        }

        let receipt = self.provider.get_transaction_receipt(hash).await?;
        if receipt.is_some() {
            self.receipt_cache.save_cache(hash.to_string(), &receipt)?;
        }
        Ok(receipt)
    }

    // Only code at a numbered block is immutable.
    fn code_cache_at(&self, block: BlockId) -> Result<Option<Cache<Bytes>>> {
        let (chain, cache_path) = match &self.code_cache {
            Some(inner) => inner,
            None => return Ok(None),
        };
        match block {
            BlockId::Number(BlockNumberOrTag::Number(n)) => {
                Ok(Some(Cache::new(cache_path.code_cache_dir(*chain, n), None)?))
            }
            _ => Ok(None),
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl<P, T> NodeClient for CachedProvider<P, T>
where
    P: Provider<T>,
    T: Transport + Clone,
{
    async fn code_at(&self, address: Address, block: BlockId) -> Result<Bytes> {
        let cache = self.code_cache_at(block)?;
        if let Some(code) = cache.as_ref().and_then(|c| c.load_cache(address.to_string())) {
            return Ok(code);
        }

        trace!(%address, ?block, "eth_getCode");
        let code: Bytes =
            self.provider.raw_request(Cow::Borrowed("eth_getCode"), (address, block)).await?;
        if let Some(cache) = cache {
            cache.save_cache(address.to_string(), &code)?;
        }
        Ok(code)
    }

    async fn access_list(&self, request: &CallRequest, block: BlockId) -> Result<Vec<Address>> {
        trace!(to = %request.to, ?block, "eth_createAccessList");
        let result: AccessListResult = self
            .provider
            .raw_request(Cow::Borrowed("eth_createAccessList"), (request.clone(), block))
            .await?;
        Ok(result.access_list.into_iter().map(|item| item.address).collect())
    }

    async fn call(
        &self,
        to: Address,
        input: Bytes,
        overrides: &StateOverrides,
        block: BlockId,
    ) -> Result<Bytes> {
        trace!(%to, ?block, overrides = overrides.len(), "eth_call");
        let params = (CallParams { to, data: input }, block, overrides.clone());
        let output: Bytes = self.provider.raw_request(Cow::Borrowed("eth_call"), params).await?;
        Ok(output)
    }
}
