//! Instruction model, assembler and disassembler.

mod assembler;
mod disassembler;
mod env;
mod instruction;
mod opcode;

pub use assembler::assemble;
pub use disassembler::disassemble;
pub use env::{
    AsmEnv, EnvKey, EnvShape, EnvValue, FAKE_RETURNDATA_MEM_LOC, HOOK_CALL_FAILED_ERROR,
    PREAMBLE_SIZE, SCRATCH_MEM_LOC,
};
pub use instruction::{duplicate, to_asm, Instruction, Label, Payload, ScopeId};
pub use opcode::Opcode;
