use clap::Parser;
use eyre::Result;
use spyglass_backend::asm::{disassemble, to_asm};

use super::CodeArgs;

/// CLI arguments for `spyglass disasm`.
#[derive(Clone, Debug, Parser)]
pub struct DisasmArgs {
    /// Print an assembler listing that `spyglass` can assemble again, without offsets.
    #[arg(long)]
    pub asm: bool,

    #[command(flatten)]
    pub code: CodeArgs,
}

impl DisasmArgs {
    pub async fn run(self) -> Result<()> {
        let code = self.code.load().await?;
        let instructions = disassemble(&code);

        if self.asm {
            println!("{}", to_asm(&instructions));
            return Ok(());
        }

        println!("{:5}  {:<72}\n", "PC", "Instruction");
        for inst in &instructions {
            let pc = inst.original_offset.unwrap_or_default();
            println!("{pc:05}  {inst}");
        }
        let decoded = instructions.iter().map(|inst| inst.size()).sum::<usize>();
        if decoded < code.len() {
            println!("\n{} trailing bytes not decoded", code.len() - decoded);
        }
        Ok(())
    }
}
