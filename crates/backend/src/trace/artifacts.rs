use std::{collections::BTreeMap, fs, path::Path};

use alloy_primitives::{Bytes, Selector};
use eyre::{eyre, OptionExt, Result, WrapErr};
use serde::Deserialize;

use crate::patch::HookSelectors;

/// Name of the source file the runner contracts are compiled from.
pub const RUNNER_SOURCE: &str = "Runner.sol";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForgeArtifact {
    deployed_bytecode: DeployedBytecode,
    #[serde(default)]
    method_identifiers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct DeployedBytecode {
    object: Bytes,
}

impl ForgeArtifact {
    fn load(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(RUNNER_SOURCE).join(format!("{name}.json"));
        let content =
            fs::read_to_string(&path).wrap_err_with(|| format!("cannot read {}", path.display()))?;
        serde_json::from_str(&content).wrap_err_with(|| format!("malformed artifact {}", path.display()))
    }

    /// Finds the selector of the function called `name`, whatever its parameters.
    fn selector(&self, name: &str) -> Result<Selector> {
        let (_, id) = self
            .method_identifiers
            .iter()
            .find(|(signature, _)| signature.split('(').next() == Some(name))
            .ok_or_eyre(format!("cannot find a selector for {name}"))?;
        let bytes = hex::decode(id).map_err(|e| eyre!("bad selector {id} for {name}: {e}"))?;
        Selector::try_from(bytes.as_slice()).map_err(|_| eyre!("bad selector {id} for {name}"))
    }
}

/// Deployed code of the runner, origin and hooks contracts, plus the hook selectors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HookArtifacts {
    pub runner: Bytes,
    pub origin: Bytes,
    pub hooks: Bytes,
    pub selectors: HookSelectors,
}

impl HookArtifacts {
    /// Loads forge artifacts from `<dir>/Runner.sol/{Runner,Origin,SpyHooks}.json`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        trace!(dir = %dir.display(), "loading hook artifacts");

        let runner = ForgeArtifact::load(dir, "Runner")?;
        let origin = ForgeArtifact::load(dir, "Origin")?;
        let hooks = ForgeArtifact::load(dir, "SpyHooks")?;
        let selectors = HookSelectors {
            sstore: hooks.selector("handleSpySstore")?,
            log: hooks.selector("handleSpyLog")?,
            call: hooks.selector("handleSpyCall")?,
        };

        Ok(Self {
            runner: runner.deployed_bytecode.object,
            origin: origin.deployed_bytecode.object,
            hooks: hooks.deployed_bytecode.object,
            selectors,
        })
    }
}
