use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use alloy_primitives::{Bytes, U256};
use eyre::{bail, Result};
use itertools::Itertools;

use super::Opcode;

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

/// Identifier of the lexical scope an instruction belongs to.
///
/// Scope ids are opaque equality keys; local labels are only visible to instructions sharing
/// the same id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Allocates a scope id that has never been handed out before.
    pub fn fresh() -> Self {
        Self(NEXT_SCOPE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// A symbolic jump target.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    /// `::name`, visible from every scope of a linked program.
    Global(String),
    /// `:name`, visible only within its own scope.
    Local(String),
}

impl Label {
    pub fn global(name: impl Into<String>) -> Self {
        Self::Global(name.into())
    }

    pub fn local(name: impl Into<String>) -> Self {
        Self::Local(name.into())
    }

    /// Parses `::name` or `:name`.
    pub fn parse(text: &str) -> Option<Self> {
        let (global, name) = match text.strip_prefix("::") {
            Some(name) => (true, name),
            None => (false, text.strip_prefix(':')?),
        };
        if !is_label_name(name) {
            return None;
        }
        Some(if global { Self::global(name) } else { Self::local(name) })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Global(name) | Self::Local(name) => name,
        }
    }

    pub const fn is_global(&self) -> bool {
        matches!(self, Self::Global(_))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global(name) => write!(f, "::{name}"),
            Self::Local(name) => write!(f, ":{name}"),
        }
    }
}

/// Returns true if `name` is usable as a label name: word characters and dashes.
pub(crate) fn is_label_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// The immediate operand of a PUSH, or the bytes of a data blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Already-resolved bytes, left-zero-padded to the opcode width on output.
    Bytes(Bytes),
    /// A literal integer, encoded big-endian.
    Int(U256),
    /// A reference to a label, replaced by an [`Payload::Int`] during linking.
    Label(Label),
}

impl Payload {
    /// Encodes a resolved payload into exactly `width` bytes.
    pub fn encode(&self, width: usize) -> Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => {
                if bytes.len() > width {
                    bail!("payload 0x{} does not fit in {width} bytes", hex::encode(bytes));
                }
                let mut out = vec![0u8; width];
                out[width - bytes.len()..].copy_from_slice(bytes);
                Ok(out)
            }
            Self::Int(value) => {
                if value.byte_len() > width {
                    bail!("payload {value:#x} does not fit in {width} bytes");
                }
                Ok(value.to_be_bytes::<32>()[32 - width..].to_vec())
            }
            Self::Label(label) => bail!("unresolved label {label}"),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            Self::Int(value) => write!(f, "{value:#x}"),
            Self::Label(label) => write!(f, "{label}"),
        }
    }
}

/// The unit of the intermediate representation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub payload: Option<Payload>,
    /// Label declared at this instruction's offset.
    pub label: Option<Label>,
    /// Offset in the source program, for disassembled input.
    pub original_offset: Option<usize>,
    /// Offset in the destination program, assigned by [`crate::link::commit`].
    pub offset: Option<usize>,
    pub scope: Option<ScopeId>,
}

impl Instruction {
    /// Creates a bare instruction.
    pub const fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            payload: None,
            label: None,
            original_offset: None,
            offset: None,
            scope: None,
        }
    }

    /// Creates a PUSH with an integer payload.
    pub fn push(opcode: Opcode, value: U256) -> Self {
        Self::new(opcode).with_payload(Payload::Int(value))
    }

    /// Creates a PUSH with a byte payload.
    pub fn push_bytes(opcode: Opcode, bytes: impl Into<Bytes>) -> Self {
        Self::new(opcode).with_payload(Payload::Bytes(bytes.into()))
    }

    /// Creates a PUSH referring to `label`.
    pub fn push_label(opcode: Opcode, label: Label) -> Self {
        Self::new(opcode).with_payload(Payload::Label(label))
    }

    /// Creates a raw data blob.
    pub fn data(bytes: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Data).with_payload(Payload::Bytes(bytes.into()))
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Returns the number of bytes this instruction occupies once serialized.
    pub fn size(&self) -> usize {
        match (self.opcode, &self.payload) {
            (Opcode::Data, Some(Payload::Bytes(bytes))) => bytes.len(),
            (opcode, _) => opcode.size(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        if let Some(payload) = &self.payload {
            write!(f, " {payload}")?;
        }
        Ok(())
    }
}

/// Deep-copies a fragment, stamping every instruction with one fresh scope id.
pub fn duplicate(code: &[Instruction]) -> Vec<Instruction> {
    let scope = ScopeId::fresh();
    code.iter().map(|inst| inst.clone().with_scope(scope)).collect()
}

/// Renders instructions as assembler text, one per line, with label declarations.
///
/// Undefined bytes are written as `DATA` so the listing assembles back to the same bytes.
pub fn to_asm(code: &[Instruction]) -> String {
    code.iter()
        .map(|inst| {
            let line = match inst.opcode {
                Opcode::Unknown(byte) => format!("DATA {byte:#04x}"),
                _ => inst.to_string(),
            };
            match &inst.label {
                Some(label) => format!("{label}\n{line}"),
                None => line,
            }
        })
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parse() {
        assert_eq!(Label::parse("::runtime"), Some(Label::global("runtime")));
        assert_eq!(Label::parse(":skip-1"), Some(Label::local("skip-1")));
        assert_eq!(Label::parse("skip"), None);
        assert_eq!(Label::parse("::"), None);
        assert_eq!(Label::parse(":a b"), None);
        assert_eq!(Label::global("__jump__7__").to_string(), "::__jump__7__");
    }

    #[test]
    fn test_payload_encode() {
        let one = Payload::Int(U256::from(1));
        assert_eq!(one.encode(3).unwrap(), vec![0, 0, 1]);
        assert!(Payload::Int(U256::from(0x1_0000)).encode(2).is_err());

        let bytes = Payload::Bytes(Bytes::from_static(&[0xab, 0xcd]));
        assert_eq!(bytes.encode(4).unwrap(), vec![0, 0, 0xab, 0xcd]);
        assert!(bytes.encode(1).is_err());

        assert!(Payload::Label(Label::local("x")).encode(3).is_err());
    }

    #[test]
    fn test_duplicate_stamps_fresh_scope() {
        let scope = ScopeId::fresh();
        let code = vec![
            Instruction::new(Opcode::JumpDest).with_label(Label::local("a")).with_scope(scope),
            Instruction::push_label(Opcode::Push3, Label::local("a")).with_scope(scope),
        ];
        let first = duplicate(&code);
        let second = duplicate(&code);

        assert_ne!(first[0].scope, Some(scope));
        assert_eq!(first[0].scope, first[1].scope);
        assert_ne!(first[0].scope, second[0].scope);
        assert_eq!(code[0].scope, Some(scope));
    }

    #[test]
    fn test_size() {
        assert_eq!(Instruction::push(Opcode::Push2, U256::from(7u64)).size(), 3);
        assert_eq!(Instruction::data(vec![1u8, 2, 3]).size(), 3);
        assert_eq!(Instruction::new(Opcode::Stop).size(), 1);
    }
}
