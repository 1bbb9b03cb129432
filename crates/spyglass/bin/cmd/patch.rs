use alloy_primitives::Address;
use clap::Parser;
use eyre::Result;
use spyglass_backend::{
    patch::{OriginalCode, PatchOptions, Patcher},
    trace::HOOKS_ADDRESS,
};

use super::CodeArgs;
use crate::opts::ArtifactsOpts;

/// CLI arguments for `spyglass patch`.
#[derive(Clone, Debug, Parser)]
pub struct PatchArgs {
    /// Account the hooks are delegate-called on.
    #[arg(long, default_value_t = HOOKS_ADDRESS)]
    pub hooks_address: Address,

    /// Value ORIGIN reports in the patched code.
    #[arg(long, default_value_t = Address::ZERO)]
    pub origin: Address,

    /// Only hook LOG0..LOG4.
    #[arg(long = "logs-only", short = 'L')]
    pub logs_only: bool,

    #[command(flatten)]
    pub code: CodeArgs,

    #[command(flatten)]
    pub artifacts: ArtifactsOpts,
}

impl PatchArgs {
    pub async fn run(self) -> Result<()> {
        let artifacts = self.artifacts.load()?;
        let code = self.code.load().await?;

        let mut patcher = Patcher::new(PatchOptions {
            hooks_address: self.hooks_address,
            origin: self.origin,
            logs_only: self.logs_only,
            selectors: artifacts.selectors,
            ..Default::default()
        })?;
        if let Some(address) = self.code.address {
            patcher.insert_original(address, OriginalCode::of(&code));
        }

        let image = patcher.patch(&code)?;
        debug!(original = code.len(), patched = image.len(), "patched");
        println!("{image}");
        Ok(())
    }
}
