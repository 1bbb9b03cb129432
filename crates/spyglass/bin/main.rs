#[macro_use]
extern crate tracing;

mod args;
mod cmd;
mod opts;
mod utils;

use args::{SpyglassArgs, SpyglassSubcommand};
use clap::Parser;
use eyre::Result;

fn main() -> Result<()> {
    utils::install_error_handler();
    utils::subscriber();
    utils::enable_paint();

    let opts = SpyglassArgs::parse();

    match opts.cmd {
        SpyglassSubcommand::Run(cmd) => utils::block_on(cmd.run()),
        SpyglassSubcommand::Patch(cmd) => utils::block_on(cmd.run()),
        SpyglassSubcommand::Disasm(cmd) => utils::block_on(cmd.run()),
    }
}
