use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_rpc_types::{BlockId, BlockNumberOrTag};
use clap::Parser;
use eyre::{OptionExt, Result};
use spyglass_backend::trace::{
    Tracer, TxRequest, DEFAULT_MAX_ROUNDS, HOOKS_ADDRESS, RUNNER_ADDRESS,
};
use yansi::Paint;

use super::parse_block;
use crate::opts::{ArtifactsOpts, CacheOpts, NodeProvider, RpcOpts};

const GWEI: u64 = 1_000_000_000;
const DEFAULT_GAS: u64 = 1_000_000;

/// CLI arguments for `spyglass run`.
#[derive(Clone, Debug, Parser)]
pub struct RunArgs {
    /// Replay the on-chain transaction with this hash.
    #[arg(long, conflicts_with_all = ["from", "to", "data"])]
    pub tx: Option<TxHash>,

    /// The sender. Defaults to the zero address.
    #[arg(long)]
    pub from: Option<Address>,

    /// The receiving contract. Defaults to the zero address.
    #[arg(long)]
    pub to: Option<Address>,

    /// Value sent with the transaction, in wei.
    #[arg(long)]
    pub value: Option<U256>,

    /// Calldata, hex-encoded.
    #[arg(long)]
    pub data: Option<Bytes>,

    /// Gas limit used when asking the node for an access list.
    #[arg(long)]
    pub gas: Option<u64>,

    /// Gas price in gwei.
    #[arg(long)]
    pub gas_price: Option<u64>,

    /// Block to simulate on, as a number or a tag.
    ///
    /// Defaults to `latest`, or to the block before a replayed transaction.
    #[arg(long, short, value_parser = parse_block)]
    pub block: Option<BlockNumberOrTag>,

    /// Do not print the transaction summary.
    #[arg(long, short)]
    pub quiet: bool,

    /// Only hook LOG0..LOG4.
    #[arg(long = "logs-only", short = 'L')]
    pub logs_only: bool,

    /// Give up if new contracts keep showing up after this many simulations.
    #[arg(long, default_value_t = DEFAULT_MAX_ROUNDS)]
    pub max_rounds: usize,

    /// Account the runner contract is installed at.
    #[arg(long, default_value_t = RUNNER_ADDRESS)]
    pub runner_address: Address,

    /// Account the hooks contract is installed at.
    #[arg(long, default_value_t = HOOKS_ADDRESS)]
    pub hooks_address: Address,

    #[command(flatten)]
    pub rpc: RpcOpts,

    #[command(flatten)]
    pub cache: CacheOpts,

    #[command(flatten)]
    pub artifacts: ArtifactsOpts,
}

impl RunArgs {
    pub async fn run(self) -> Result<()> {
        let artifacts = self.artifacts.load()?;
        let provider = self.rpc.provider(&self.cache).await?;
        let request = self.request(&provider).await?;

        if !self.quiet {
            eprintln!(
                "{} {} -> {} at {:?}",
                "Tracing".green().bold(),
                request.from,
                request.to,
                request.block
            );
            eprintln!("  value: {} wei, gas price: {} wei", request.value, request.gas_price);
            eprintln!("  data: {}", request.data);
        }

        let tracer = Tracer::builder()
            .max_rounds(self.max_rounds)
            .logs_only(self.logs_only)
            .runner_address(self.runner_address)
            .hooks_address(self.hooks_address)
            .build(provider, artifacts)?;
        let trace = tracer.trace(&request).await?;

        println!("{}", serde_json::to_string_pretty(&trace)?);
        Ok(())
    }

    async fn request(&self, provider: &NodeProvider) -> Result<TxRequest> {
        let gas_price = self.gas_price.map(|gwei| U256::from(gwei) * U256::from(GWEI));

        let Some(hash) = self.tx else {
            return Ok(TxRequest {
                from: self.from.unwrap_or_default(),
                to: self.to.unwrap_or_default(),
                value: self.value.unwrap_or_default(),
                data: self.data.clone().unwrap_or_default(),
                gas: self.gas.unwrap_or(DEFAULT_GAS),
                gas_price: gas_price.unwrap_or_default(),
                block: BlockId::Number(self.block.unwrap_or(BlockNumberOrTag::Latest)),
            });
        };

        let tx = provider.transaction(hash).await?.ok_or_eyre("transaction not found")?;
        let receipt = provider.receipt(hash).await?.ok_or_eyre("transaction receipt not found")?;
        let number = receipt.block_number.ok_or_eyre("transaction may still be pending")?;
        let to = tx.to.ok_or_eyre("contract creations cannot be traced")?;
        let block = self.block.unwrap_or(BlockNumberOrTag::Number(number.saturating_sub(1)));

        Ok(TxRequest {
            from: tx.from,
            to,
            value: self.value.unwrap_or(tx.value),
            data: tx.input.clone(),
            gas: self.gas.unwrap_or_else(|| u64::try_from(tx.gas).unwrap_or(u64::MAX)),
            gas_price: gas_price.unwrap_or_else(|| {
                U256::from(tx.gas_price.or(tx.max_fee_per_gas).unwrap_or_default())
            }),
            block: BlockId::Number(block),
        })
    }
}
