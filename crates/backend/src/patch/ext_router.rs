use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, U256};

use super::OriginalCode;
use crate::asm::{Instruction, Label, Opcode, ScopeId, PREAMBLE_SIZE};

pub(crate) const EXTCODESIZE_ROUTER: &str = "extcodesize-router";
pub(crate) const EXTCODEHASH_ROUTER: &str = "extcodehash-router";
pub(crate) const EXTCODECOPY_ROUTER: &str = "extcodecopy-router";

/// Builds the EXTCODESIZE, EXTCODEHASH and EXTCODECOPY routers, in that order.
///
/// Patched accounts must keep reporting their original code, so each router answers from
/// `originals` for known addresses and falls back to the real opcode otherwise.
pub(crate) fn ext_routers(originals: &BTreeMap<Address, OriginalCode>) -> [Vec<Instruction>; 3] {
    [extcodesize_router(originals), extcodehash_router(originals), extcodecopy_router(originals)]
}

fn entry(label: &str) -> Vec<Instruction> {
    vec![
        Instruction::new(Opcode::JumpDest).with_label(Label::global(label)),
        Instruction::push_bytes(Opcode::Push20, Bytes::copy_from_slice(&[0xff; 20])),
        Instruction::new(Opcode::And),
    ]
}

// [addr, ...] -> falls through to :skip-i unless addr matches, leaving [addr, ...] either way
fn match_address(code: &mut Vec<Instruction>, address: &Address, skip: &Label) {
    code.extend([
        Instruction::new(Opcode::Dup1),
        Instruction::push_bytes(Opcode::Push20, Bytes::copy_from_slice(address.as_slice())),
        Instruction::new(Opcode::Eq),
        Instruction::new(Opcode::IsZero),
        Instruction::push_label(Opcode::Push3, skip.clone()),
        Instruction::new(Opcode::Jumpi),
    ]);
}

fn scoped(code: Vec<Instruction>) -> Vec<Instruction> {
    let scope = ScopeId::fresh();
    code.into_iter().map(|inst| inst.with_scope(scope)).collect()
}

// [addr, ret] -> [size]
fn extcodesize_router(originals: &BTreeMap<Address, OriginalCode>) -> Vec<Instruction> {
    let mut code = entry(EXTCODESIZE_ROUTER);
    for (i, (address, original)) in originals.iter().enumerate() {
        let skip = Label::local(format!("skip-{i}"));
        match_address(&mut code, address, &skip);
        code.extend([
            Instruction::new(Opcode::Pop),
            Instruction::push(Opcode::Push3, U256::from(original.size)),
            Instruction::new(Opcode::Swap1),
            Instruction::new(Opcode::Jump),
            Instruction::new(Opcode::JumpDest).with_label(skip),
        ]);
    }
    code.extend([
        Instruction::new(Opcode::ExtCodeSize),
        Instruction::new(Opcode::Swap1),
        Instruction::new(Opcode::Jump),
    ]);
    scoped(code)
}

// [addr, ret] -> [hash]
fn extcodehash_router(originals: &BTreeMap<Address, OriginalCode>) -> Vec<Instruction> {
    let mut code = entry(EXTCODEHASH_ROUTER);
    for (i, (address, original)) in originals.iter().enumerate() {
        let skip = Label::local(format!("skip-{i}"));
        match_address(&mut code, address, &skip);
        code.extend([
            Instruction::new(Opcode::Pop),
            Instruction::push_bytes(Opcode::Push32, Bytes::copy_from_slice(original.hash.as_slice())),
            Instruction::new(Opcode::Swap1),
            Instruction::new(Opcode::Jump),
            Instruction::new(Opcode::JumpDest).with_label(skip),
        ]);
    }
    code.extend([
        Instruction::new(Opcode::ExtCodeHash),
        Instruction::new(Opcode::Swap1),
        Instruction::new(Opcode::Jump),
    ]);
    scoped(code)
}

// [addr, dst, src, size, ret] -> []
fn extcodecopy_router(originals: &BTreeMap<Address, OriginalCode>) -> Vec<Instruction> {
    let copy = Label::local("copy");
    let done = Label::local("done");
    let use_size = Label::local("use-size");
    let have_n = Label::local("have-n");

    let mut code = entry(EXTCODECOPY_ROUTER);
    for (i, (address, original)) in originals.iter().enumerate() {
        let skip = Label::local(format!("skip-{i}"));
        match_address(&mut code, address, &skip);
        code.extend([
            Instruction::push(Opcode::Push3, U256::from(original.size)),
            Instruction::push_label(Opcode::Push3, copy.clone()),
            Instruction::new(Opcode::Jump),
            Instruction::new(Opcode::JumpDest).with_label(skip),
        ]);
    }
    code.extend([Instruction::new(Opcode::ExtCodeCopy), Instruction::new(Opcode::Jump)]);

    code.extend([
        // [len, addr, dst, src, size, ret]
        Instruction::new(Opcode::JumpDest).with_label(copy),
        // zero-fill dst..dst+size from past the end of calldata
        Instruction::new(Opcode::Dup5),
        Instruction::new(Opcode::CallDataSize),
        Instruction::new(Opcode::Dup5),
        Instruction::new(Opcode::CallDataCopy),
        // src >= len: nothing to copy
        Instruction::new(Opcode::Dup4),
        Instruction::new(Opcode::Dup2),
        Instruction::new(Opcode::Gt),
        Instruction::new(Opcode::IsZero),
        Instruction::push_label(Opcode::Push3, done.clone()),
        Instruction::new(Opcode::Jumpi),
        // [len - src, len, ...]
        Instruction::new(Opcode::Dup4),
        Instruction::new(Opcode::Dup2),
        Instruction::new(Opcode::Sub),
        // [size, len - src, len, ...]
        Instruction::new(Opcode::Dup6),
        Instruction::new(Opcode::Dup2),
        Instruction::new(Opcode::Dup2),
        Instruction::new(Opcode::Lt),
        Instruction::push_label(Opcode::Push3, use_size.clone()),
        Instruction::new(Opcode::Jumpi),
        Instruction::new(Opcode::Pop),
        Instruction::push_label(Opcode::Push3, have_n.clone()),
        Instruction::new(Opcode::Jump),
        Instruction::new(Opcode::JumpDest).with_label(use_size),
        Instruction::new(Opcode::Swap1),
        Instruction::new(Opcode::Pop),
        // [n, len, addr, dst, src, size, ret]
        Instruction::new(Opcode::JumpDest).with_label(have_n),
        Instruction::new(Opcode::Dup5),
        Instruction::push(Opcode::Push1, U256::from(PREAMBLE_SIZE)),
        Instruction::new(Opcode::Add),
        Instruction::new(Opcode::Dup5),
        Instruction::new(Opcode::Dup5),
        Instruction::new(Opcode::ExtCodeCopy),
        // [len, addr, dst, src, size, ret]
        Instruction::new(Opcode::JumpDest).with_label(done),
        Instruction::new(Opcode::Pop),
        Instruction::new(Opcode::Pop),
        Instruction::new(Opcode::Pop),
        Instruction::new(Opcode::Pop),
        Instruction::new(Opcode::Pop),
        Instruction::new(Opcode::Jump),
    ]);
    scoped(code)
}
