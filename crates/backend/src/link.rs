//! Layout, label resolution and byte emission for instruction streams.

use eyre::{bail, OptionExt, Result};
use rustc_hash::FxHashMap;

use crate::asm::{Instruction, Label, Opcode, Payload, ScopeId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Namespace {
    Global,
    Scope(ScopeId),
}

impl Namespace {
    /// Local labels outside any scope are rejected, so unrelated unscoped streams cannot see
    /// each other's locals.
    fn of(label: &Label, scope: Option<ScopeId>) -> Result<Self> {
        if label.is_global() {
            return Ok(Self::Global);
        }
        scope.map(Self::Scope).ok_or_eyre(format!("local label {label} is used outside a scope"))
    }
}

/// Assigns consecutive offsets starting at `start` and returns the offset just past the last
/// instruction.
pub fn commit(code: &mut [Instruction], start: usize) -> usize {
    let mut offset = start;
    for inst in code.iter_mut() {
        inst.offset = Some(offset);
        offset += inst.size();
    }
    offset
}

/// Returns the number of bytes `code` occupies once serialized.
pub fn code_size(code: &[Instruction]) -> usize {
    code.iter().map(Instruction::size).sum()
}

/// Resolves every label reference across `groups` into the offset of its declaration.
///
/// Global labels are visible from every group; local labels only to instructions of the same
/// scope. All groups must be committed first.
pub fn link(groups: &mut [&mut [Instruction]]) -> Result<()> {
    let mut table: FxHashMap<(Namespace, String), usize> = FxHashMap::default();

    for inst in groups.iter().flat_map(|group| group.iter()) {
        let Some(label) = &inst.label else { continue };
        let offset = inst.offset.ok_or_eyre(format!("label {label} is not committed"))?;
        let key = (Namespace::of(label, inst.scope)?, label.name().to_string());
        if table.insert(key, offset).is_some() {
            bail!("duplicate label {label}");
        }
    }
    trace!(labels = table.len(), "collected labels");

    for inst in groups.iter_mut().flat_map(|group| group.iter_mut()) {
        let Some(Payload::Label(label)) = &inst.payload else { continue };
        let key = (Namespace::of(label, inst.scope)?, label.name().to_string());
        let offset = table.get(&key).ok_or_eyre(format!("unresolved label {label}"))?;
        inst.payload = Some(Payload::Int(alloy_primitives::U256::from(*offset)));
    }
    Ok(())
}

/// Writes committed, linked instructions into `buf`, which holds the bytes starting at offset
/// `base`.
pub fn serialize(buf: &mut [u8], code: &[Instruction], base: usize) -> Result<()> {
    for inst in code {
        let offset = inst.offset.ok_or_eyre(format!("{inst} has no offset"))?;
        let start = offset.checked_sub(base).ok_or_eyre(format!("{inst} lies before {base}"))?;
        let end = start + inst.size();
        if end > buf.len() {
            bail!("{inst} at {offset} overflows the output buffer");
        }

        match inst.opcode {
            Opcode::Data => {
                let Some(Payload::Bytes(bytes)) = &inst.payload else {
                    bail!("data blob at {offset} has no bytes");
                };
                buf[start..end].copy_from_slice(bytes);
            }
            opcode => {
                buf[start] = opcode.byte().ok_or_eyre(format!("{opcode} has no encoding"))?;
                let width = opcode.payload_width();
                if width > 0 {
                    let payload = inst
                        .payload
                        .as_ref()
                        .ok_or_eyre(format!("{opcode} at {offset} has no payload"))?;
                    buf[start + 1..end].copy_from_slice(&payload.encode(width)?);
                }
            }
        }
    }
    Ok(())
}

/// Commits, links and serializes a single stream starting at offset 0.
pub fn assemble_bytes(code: &mut [Instruction]) -> Result<Vec<u8>> {
    let size = commit(code, 0);
    link(&mut [&mut *code])?;
    let mut buf = vec![0u8; size];
    serialize(&mut buf, code, 0)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{assemble, disassemble, AsmEnv};
    use alloy_primitives::U256;

    #[test]
    fn test_simple_program() {
        let mut code = assemble("PUSH1 1\nPUSH1 2\nADD\nSTOP", &AsmEnv::default()).unwrap();
        assert_eq!(code_size(&code), 6);
        assert_eq!(assemble_bytes(&mut code).unwrap(), vec![0x60, 0x01, 0x60, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_commit_is_deterministic() {
        let mut code = assemble("PUSH3 0x00\nJUMPDEST\nDATA 0xaabb\nSTOP", &AsmEnv::default())
            .unwrap();
        let end = commit(&mut code, 10);
        let offsets: Vec<_> = code.iter().map(|inst| inst.offset.unwrap()).collect();
        assert_eq!(offsets, vec![10, 14, 15, 17]);
        assert_eq!(end, 18);

        assert_eq!(commit(&mut code, 10), end);
        assert_eq!(code.iter().map(|inst| inst.offset.unwrap()).collect::<Vec<_>>(), offsets);
    }

    #[test]
    fn test_local_labels_are_scoped() {
        let env = AsmEnv::default();
        let src = "PUSH3 :skip\nJUMP\n:skip\nJUMPDEST\nSTOP";
        let mut a = assemble(src, &env).unwrap();
        let mut b = assemble(src, &env).unwrap();
        let end = commit(&mut a, 0);
        commit(&mut b, end);
        link(&mut [&mut a[..], &mut b[..]]).unwrap();

        assert_eq!(a[0].payload, Some(Payload::Int(U256::from(5))));
        assert_eq!(b[0].payload, Some(Payload::Int(U256::from(end + 5))));
    }

    #[test]
    fn test_global_labels_cross_groups() {
        let env = AsmEnv::default();
        let mut a = assemble("PUSH3 ::target\nJUMP", &env).unwrap();
        let mut b = assemble("STOP\n::target\nJUMPDEST", &env).unwrap();
        let end = commit(&mut a, 0);
        commit(&mut b, end);
        link(&mut [&mut a[..], &mut b[..]]).unwrap();
        assert_eq!(a[0].payload, Some(Payload::Int(U256::from(end + 1))));
    }

    #[test]
    fn test_link_errors() {
        let env = AsmEnv::default();

        let mut dup = assemble("::x\nJUMPDEST\n::x\nJUMPDEST", &env).unwrap();
        commit(&mut dup, 0);
        assert!(link(&mut [&mut dup[..]]).is_err());

        let mut local_elsewhere = assemble("PUSH3 :x\nJUMP", &env).unwrap();
        let mut other = assemble(":x\nJUMPDEST", &env).unwrap();
        let end = commit(&mut local_elsewhere, 0);
        commit(&mut other, end);
        assert!(link(&mut [&mut local_elsewhere[..], &mut other[..]]).is_err());

        let mut uncommitted = assemble(":x\nJUMPDEST", &env).unwrap();
        assert!(link(&mut [&mut uncommitted[..]]).is_err());
    }

    #[test]
    fn test_unscoped_local_labels_rejected() {
        let mut jumpdest =
            vec![Instruction::new(Opcode::JumpDest).with_label(Label::local("x"))];
        let mut push = vec![Instruction::push_label(Opcode::Push3, Label::local("x"))];
        let end = commit(&mut jumpdest, 0);
        commit(&mut push, end);
        let err = link(&mut [&mut jumpdest[..], &mut push[..]]).unwrap_err();
        assert!(err.to_string().contains("outside a scope"));

        let scope = crate::asm::ScopeId::fresh();
        let mut declared =
            vec![Instruction::new(Opcode::JumpDest).with_label(Label::local("y")).with_scope(scope)];
        let mut unscoped_ref = vec![Instruction::push_label(Opcode::Push3, Label::local("y"))];
        let end = commit(&mut declared, 0);
        commit(&mut unscoped_ref, end);
        assert!(link(&mut [&mut declared[..], &mut unscoped_ref[..]]).is_err());

        let mut global = vec![
            Instruction::push_label(Opcode::Push3, Label::global("z")),
            Instruction::new(Opcode::JumpDest).with_label(Label::global("z")),
        ];
        commit(&mut global, 0);
        link(&mut [&mut global[..]]).unwrap();
        assert_eq!(global[0].payload, Some(Payload::Int(U256::from(4))));
    }

    #[test]
    fn test_serialize_errors() {
        let env = AsmEnv::default();
        let mut buf = [0u8; 8];

        let code = assemble("STOP", &env).unwrap();
        assert!(serialize(&mut buf, &code, 0).is_err());

        let mut wide = assemble("PUSH1 0x0100", &env).unwrap();
        commit(&mut wide, 0);
        assert!(serialize(&mut buf, &wide, 0).is_err());

        let mut unresolved = assemble("PUSH3 :nowhere", &env).unwrap();
        commit(&mut unresolved, 0);
        assert!(serialize(&mut buf, &unresolved, 0).is_err());

        let mut long = assemble("PUSH32 0x01", &env).unwrap();
        commit(&mut long, 0);
        assert!(serialize(&mut buf, &long, 0).is_err());

        let mut no_payload = vec![Instruction::new(Opcode::Push2)];
        commit(&mut no_payload, 0);
        assert!(serialize(&mut buf, &no_payload, 0).is_err());
    }

    #[test]
    fn test_disassemble_roundtrip() {
        let bytes = vec![0x60, 0x03, 0x56, 0x5b, 0x61, 0x12, 0x34, 0x50, 0x00];
        let mut code = disassemble(&bytes);
        assert_eq!(code.iter().map(|inst| inst.original_offset.unwrap()).collect::<Vec<_>>(), [
            0, 2, 3, 4, 7, 8
        ]);
        assert_eq!(assemble_bytes(&mut code).unwrap(), bytes);
    }

    #[test]
    fn test_serialize_with_base() {
        let env = AsmEnv::default();
        let mut code = assemble("PUSH1 7\nSTOP", &env).unwrap();
        commit(&mut code, 100);
        let mut buf = [0u8; 3];
        serialize(&mut buf, &code, 100).unwrap();
        assert_eq!(buf, [0x60, 0x07, 0x00]);
    }
}
