//! Bytecode patch engine.
//!
//! A patched image keeps the original code verbatim right after a small preamble, so
//! CODECOPY-based data reads keep working, and appends an instrumented copy of the program
//! that the preamble jumps into:
//!
//! ```text
//! | preamble | original code | 32 zero bytes | runtime | libraries | jump router | ext routers |
//! ```
//!
//! Jumps are routed through a table mapping original offsets to relocated JUMPDESTs. State
//! changes, logs and calls are reported to a hooks contract through delegate-calls.

mod ext_router;
mod fragments;
mod jump_router;

use std::collections::BTreeMap;

use alloy_primitives::{keccak256, Address, Bytes, Selector, B256, U256};
use eyre::{ensure, Result};

pub use fragments::{Fragment, Fragments};

use crate::{
    asm::{disassemble, duplicate, AsmEnv, EnvKey, EnvValue, Instruction, Label, Opcode},
    link::{code_size, commit, link, serialize},
};
use ext_router::ext_routers;
use jump_router::{jump_label, jump_router};

pub use crate::asm::PREAMBLE_SIZE;

/// Size of the zero padding between the original code and the runtime. A truncated PUSH at
/// the end of the original code can swallow at most this many bytes.
pub const CODE_PADDING: usize = 32;

/// Selectors of the hooks contract's entry points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HookSelectors {
    pub sstore: Selector,
    pub log: Selector,
    pub call: Selector,
}

/// What an account's code looked like before patching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OriginalCode {
    pub size: usize,
    pub hash: B256,
}

impl OriginalCode {
    pub fn of(code: &[u8]) -> Self {
        Self { size: code.len(), hash: keccak256(code) }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PatchOptions {
    /// Account the hook fragments delegate-call into.
    pub hooks_address: Address,
    /// Value ORIGIN is replaced with.
    pub origin: Address,
    /// Only hook LOG0..LOG4.
    pub logs_only: bool,
    pub selectors: HookSelectors,
    /// Original size and hash of every account that gets patched, for the ext routers.
    pub originals: BTreeMap<Address, OriginalCode>,
}

/// Produces patched images. Fragments are assembled once and reused for every image.
#[derive(Clone, Debug)]
pub struct Patcher {
    options: PatchOptions,
    fragments: Fragments,
}

impl Patcher {
    pub fn new(options: PatchOptions) -> Result<Self> {
        let env = AsmEnv::with_defaults()
            .bind(EnvKey::HooksContractAddress, EnvValue::Address(options.hooks_address))?
            .bind(EnvKey::HandleSpySstoreSelector, EnvValue::Selector(options.selectors.sstore))?
            .bind(EnvKey::HandleSpyLogSelector, EnvValue::Selector(options.selectors.log))?
            .bind(EnvKey::HandleSpyCallSelector, EnvValue::Selector(options.selectors.call))?;
        let fragments = Fragments::assemble(&env)?;
        Ok(Self { options, fragments })
    }

    /// Records the original code of an account. Images patched afterwards report it through
    /// EXTCODESIZE, EXTCODEHASH and EXTCODECOPY.
    pub fn insert_original(&mut self, address: Address, original: OriginalCode) {
        self.options.originals.insert(address, original);
    }

    /// Patches deployed bytecode. Empty code stays empty.
    pub fn patch(&self, code: &[u8]) -> Result<Bytes> {
        if code.is_empty() {
            return Ok(Bytes::new());
        }

        let preamble = self.fragments.get(Fragment::Preamble)?.to_vec();
        ensure!(
            code_size(&preamble) == PREAMBLE_SIZE,
            "preamble must be {PREAMBLE_SIZE} bytes, got {}",
            code_size(&preamble)
        );

        let runtime = self.runtime(code)?;
        let router = jump_router(&runtime);

        let mut sections = vec![
            preamble,
            vec![Instruction::data(code.to_vec())],
            vec![Instruction::data(vec![0u8; CODE_PADDING])],
            runtime,
        ];
        for fragment in Fragment::LIBRARY {
            sections.push(self.fragments.get(fragment)?.to_vec());
        }
        sections.push(router);
        sections.extend(ext_routers(&self.options.originals));

        let mut size = 0;
        for section in sections.iter_mut() {
            size = commit(section, size);
        }
        let mut groups: Vec<&mut [Instruction]> =
            sections.iter_mut().map(Vec::as_mut_slice).collect();
        link(&mut groups)?;

        let mut image = vec![0u8; size];
        for section in &sections {
            serialize(&mut image, section, 0)?;
        }
        debug!(original = code.len(), patched = image.len(), "patched bytecode");
        Ok(image.into())
    }

    fn runtime(&self, code: &[u8]) -> Result<Vec<Instruction>> {
        let hooks = !self.options.logs_only;
        let mut runtime =
            vec![Instruction::new(Opcode::JumpDest).with_label(Label::global("runtime"))];

        for inst in disassemble(code) {
            let offset = inst.original_offset.unwrap_or_default();
            match inst.opcode {
                Opcode::Pc => runtime.push(Instruction::push(Opcode::Push3, U256::from(offset))),
                Opcode::CodeSize => {
                    runtime.push(Instruction::push(Opcode::Push3, U256::from(code.len())))
                }
                Opcode::Origin => runtime.push(Instruction::push_bytes(
                    Opcode::Push20,
                    Bytes::copy_from_slice(self.options.origin.as_slice()),
                )),
                Opcode::JumpDest => runtime.push(inst.with_label(jump_label(offset))),
                Opcode::Jump => self.splice(&mut runtime, Fragment::JumpPatch)?,
                Opcode::Jumpi => self.splice(&mut runtime, Fragment::JumpiPatch)?,
                Opcode::CodeCopy => self.splice(&mut runtime, Fragment::CodecopyPatch)?,
                Opcode::ExtCodeSize => self.splice(&mut runtime, Fragment::ExtcodesizePatch)?,
                Opcode::ExtCodeHash => self.splice(&mut runtime, Fragment::ExtcodehashPatch)?,
                Opcode::ExtCodeCopy => self.splice(&mut runtime, Fragment::ExtcodecopyPatch)?,
                Opcode::Log0 | Opcode::Log1 | Opcode::Log2 | Opcode::Log3 | Opcode::Log4 => {
                    let topics = inst.opcode.log_topics().unwrap_or_default();
                    runtime.push(Instruction::push(Opcode::Push1, U256::from(topics)));
                    self.splice(&mut runtime, Fragment::LogPatch)?;
                    runtime.push(inst);
                }
                Opcode::Sstore if hooks => {
                    self.splice(&mut runtime, Fragment::SstorePatch)?;
                    runtime.push(inst);
                }
                Opcode::Call if hooks => self.splice(&mut runtime, Fragment::CallPatch)?,
                Opcode::CallCode if hooks => self.splice(&mut runtime, Fragment::CallcodePatch)?,
                Opcode::DelegateCall if hooks => {
                    self.splice(&mut runtime, Fragment::DelegatecallPatch)?
                }
                Opcode::StaticCall if hooks => {
                    self.splice(&mut runtime, Fragment::StaticcallPatch)?
                }
                Opcode::ReturnDataSize if hooks => {
                    self.splice(&mut runtime, Fragment::ReturndatasizePatch)?
                }
                Opcode::ReturnDataCopy if hooks => {
                    self.splice(&mut runtime, Fragment::ReturndatacopyPatch)?
                }
                _ => runtime.push(inst),
            }
        }

        // falling off the end of the original code must not run into the libraries
        runtime.push(Instruction::new(Opcode::Stop));
        Ok(runtime)
    }

    fn splice(&self, runtime: &mut Vec<Instruction>, fragment: Fragment) -> Result<()> {
        runtime.extend(duplicate(self.fragments.get(fragment)?));
        Ok(())
    }
}

/// Patches a single account's code.
pub fn patch_bytecode(code: &[u8], options: &PatchOptions) -> Result<Bytes> {
    Patcher::new(options.clone())?.patch(code)
}
