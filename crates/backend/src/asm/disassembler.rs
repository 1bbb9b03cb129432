use alloy_primitives::Bytes;

use super::{Instruction, Opcode, Payload, ScopeId};

/// Decodes deployed bytecode into instructions.
///
/// Bytes are grouped into scopes. A scope opens at offset 0 and at every JUMPDEST that follows a
/// closed scope, and closes after a terminator (STOP, RETURN, REVERT, INVALID, SELFDESTRUCT,
/// JUMP). A non-JUMPDEST byte outside of any scope is unreachable, so everything from there on is
/// treated as data and decoding stops. A PUSH whose payload runs past the end of the input also
/// stops decoding, discarding the open scope.
pub fn disassemble(code: &[u8]) -> Vec<Instruction> {
    let mut out = Vec::new();
    let mut block: Vec<Instruction> = Vec::new();
    let mut scope = Some(ScopeId::fresh());
    let mut pc = 0;

    while pc < code.len() {
        let opcode = Opcode::from_byte(code[pc]);

        let current = match scope {
            Some(current) => current,
            None if opcode == Opcode::JumpDest => {
                let fresh = ScopeId::fresh();
                scope = Some(fresh);
                fresh
            }
            None => {
                trace!(pc, "stopping disassembly at unreachable byte");
                return out;
            }
        };

        let width = opcode.payload_width();
        let end = pc + 1 + width;
        if end > code.len() {
            trace!(pc, "truncated push at end of code");
            return out;
        }

        let mut inst = Instruction::new(opcode).with_scope(current);
        if width > 0 {
            inst.payload = Some(Payload::Bytes(Bytes::copy_from_slice(&code[pc + 1..end])));
        }
        inst.original_offset = Some(pc);
        block.push(inst);

        if opcode.is_terminator() {
            out.append(&mut block);
            scope = None;
        }
        pc = end;
    }

    out.append(&mut block);
    out
}
