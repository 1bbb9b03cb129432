pub mod disasm;
pub mod patch;
pub mod run;

use std::str::FromStr;

use alloy_primitives::{Address, Bytes};
use alloy_rpc_types::{BlockId, BlockNumberOrTag};
use clap::Parser;
use eyre::{ensure, eyre, Result};
use spyglass_utils::rpc::NodeClient;

use crate::opts::{CacheOpts, RpcOpts};

/// Parses a block number in decimal or hex, or a tag such as `latest`.
pub fn parse_block(s: &str) -> Result<BlockNumberOrTag> {
    if let Ok(number) = s.parse::<u64>() {
        return Ok(BlockNumberOrTag::Number(number));
    }
    BlockNumberOrTag::from_str(s).map_err(|e| eyre!("invalid block {s}: {e}"))
}

/// Where a command takes its bytecode from.
#[derive(Clone, Debug, Parser)]
pub struct CodeArgs {
    /// Hex-encoded deployed bytecode.
    #[arg(required_unless_present = "address", conflicts_with = "address")]
    pub code: Option<Bytes>,

    /// Fetch the code deployed at this address instead.
    #[arg(long, short)]
    pub address: Option<Address>,

    /// Block to fetch the code at.
    #[arg(long, short, value_parser = parse_block, default_value = "latest")]
    pub block: BlockNumberOrTag,

    #[command(flatten)]
    pub rpc: RpcOpts,

    #[command(flatten)]
    pub cache: CacheOpts,
}

impl CodeArgs {
    pub async fn load(&self) -> Result<Bytes> {
        if let Some(code) = &self.code {
            return Ok(code.clone());
        }
        let address = self.address.ok_or_else(|| eyre!("no bytecode or address given"))?;
        let provider = self.rpc.provider(&self.cache).await?;
        let code = provider.code_at(address, BlockId::Number(self.block)).await?;
        ensure!(!code.is_empty(), "no code deployed at {address}");
        Ok(code)
    }
}
