use crate::cmd::{disasm::DisasmArgs, patch::PatchArgs, run::RunArgs};
use clap::{Parser, Subcommand};

/// Spyglass: trace EVM transactions through instrumented bytecode.
#[derive(Parser, Debug)]
#[command(name = "spyglass", version, next_display_order = None)]
pub struct SpyglassArgs {
    #[command(subcommand)]
    pub cmd: SpyglassSubcommand,
}

#[derive(Subcommand, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum SpyglassSubcommand {
    /// Trace a transaction, either replayed from the chain or given explicitly.
    #[command(visible_alias = "r")]
    Run(RunArgs),

    /// Print the instrumented image of a contract.
    #[command(visible_alias = "p")]
    Patch(PatchArgs),

    /// Print the instructions decoded from a contract.
    #[command(visible_alias = "d")]
    Disasm(DisasmArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        SpyglassArgs::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let args = SpyglassArgs::try_parse_from([
            "spyglass",
            "run",
            "--rpc-url",
            "http://localhost:8545",
            "--to",
            "0x1000000000000000000000000000000000000001",
            "--gas-price",
            "3",
            "--block",
            "19000000",
            "-L",
            "--hooks-address",
            "0x8000000000000000000000000000000000000002",
        ])
        .unwrap();
        let SpyglassSubcommand::Run(run) = args.cmd else { panic!("expected run") };
        assert!(run.logs_only);
        assert_eq!(run.gas_price, Some(3));
        assert_eq!(run.artifacts.dir.to_str(), Some("out"));
        assert_eq!(run.runner_address, spyglass_backend::trace::RUNNER_ADDRESS);
        assert_eq!(
            run.hooks_address,
            "0x8000000000000000000000000000000000000002".parse::<alloy_primitives::Address>().unwrap()
        );
    }

    #[test]
    fn test_replay_conflicts_with_explicit_tx() {
        let res = SpyglassArgs::try_parse_from([
            "spyglass",
            "run",
            "--tx",
            "0x0000000000000000000000000000000000000000000000000000000000000001",
            "--to",
            "0x1000000000000000000000000000000000000001",
        ]);
        assert!(res.is_err());
    }
}
