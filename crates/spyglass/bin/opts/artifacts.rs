use std::path::PathBuf;

use clap::Parser;
use eyre::{Result, WrapErr};
use spyglass_backend::trace::HookArtifacts;

#[derive(Clone, Debug, Parser)]
pub struct ArtifactsOpts {
    /// Forge output directory holding the compiled `Runner.sol` contracts.
    #[arg(long = "artifacts", env = "SPYGLASS_ARTIFACTS", default_value = "out", value_name = "DIR")]
    pub dir: PathBuf,
}

impl ArtifactsOpts {
    pub fn load(&self) -> Result<HookArtifacts> {
        HookArtifacts::load(&self.dir).wrap_err_with(|| {
            format!("failed to load hook artifacts from {}, run `forge build` first", self.dir.display())
        })
    }
}
