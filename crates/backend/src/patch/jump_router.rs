use alloy_primitives::U256;

use crate::asm::{Instruction, Label, Opcode, ScopeId};

pub(crate) const JUMP_ROUTER: &str = "jump-router";

/// Label given to the relocated JUMPDEST originally at `offset`.
pub(crate) fn jump_label(offset: usize) -> Label {
    Label::global(format!("__jump__{offset}__"))
}

/// Builds the router that maps original jump destinations onto their relocated JUMPDESTs.
///
/// Entered with `[dest]`. Each entry pops `dest` before jumping, so the target sees the same
/// stack the original JUMP would leave. An unknown destination hits INVALID.
pub(crate) fn jump_router(runtime: &[Instruction]) -> Vec<Instruction> {
    let scope = ScopeId::fresh();
    let mut code = vec![Instruction::new(Opcode::JumpDest).with_label(Label::global(JUMP_ROUTER))];

    let dests = runtime
        .iter()
        .filter(|inst| inst.opcode == Opcode::JumpDest)
        .filter_map(|inst| inst.original_offset);
    for dest in dests {
        let next = Label::local(format!("next-{dest}"));
        code.extend([
            Instruction::new(Opcode::Dup1),
            Instruction::push(Opcode::Push3, U256::from(dest)),
            Instruction::new(Opcode::Eq),
            Instruction::new(Opcode::IsZero),
            Instruction::push_label(Opcode::Push3, next.clone()),
            Instruction::new(Opcode::Jumpi),
            Instruction::new(Opcode::Pop),
            Instruction::push_label(Opcode::Push3, jump_label(dest)),
            Instruction::new(Opcode::Jump),
            Instruction::new(Opcode::JumpDest).with_label(next),
        ]);
    }
    code.push(Instruction::new(Opcode::Invalid));

    code.into_iter().map(|inst| inst.with_scope(scope)).collect()
}
