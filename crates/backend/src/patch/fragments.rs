use std::collections::BTreeMap;

use eyre::{OptionExt, Result, WrapErr};
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::asm::{assemble, AsmEnv, Instruction};

/// Assembler templates the patcher splices into an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Fragment {
    Preamble,
    JumpPatch,
    JumpiPatch,
    CodecopyPatch,
    SstorePatch,
    LogPatch,
    CallPatch,
    CallcodePatch,
    DelegatecallPatch,
    StaticcallPatch,
    ReturndatasizePatch,
    ReturndatacopyPatch,
    ExtcodesizePatch,
    ExtcodehashPatch,
    ExtcodecopyPatch,
    // Library fragments, laid out once per image.
    CheckedDelegatecall,
    SstoreHook,
    LogHook,
    CallHook,
    Returndatacopy,
}

impl Fragment {
    /// Library fragments in layout order.
    pub const LIBRARY: [Self; 5] = [
        Self::CheckedDelegatecall,
        Self::SstoreHook,
        Self::LogHook,
        Self::CallHook,
        Self::Returndatacopy,
    ];

    pub const fn source(self) -> &'static str {
        match self {
            Self::Preamble => include_str!("fragments/preamble.evm"),
            Self::JumpPatch => include_str!("fragments/jump-patch.evm"),
            Self::JumpiPatch => include_str!("fragments/jumpi-patch.evm"),
            Self::CodecopyPatch => include_str!("fragments/codecopy-patch.evm"),
            Self::SstorePatch => include_str!("fragments/sstore-patch.evm"),
            Self::LogPatch => include_str!("fragments/log-patch.evm"),
            Self::CallPatch => include_str!("fragments/call-patch.evm"),
            Self::CallcodePatch => include_str!("fragments/callcode-patch.evm"),
            Self::DelegatecallPatch => include_str!("fragments/delegatecall-patch.evm"),
            Self::StaticcallPatch => include_str!("fragments/staticcall-patch.evm"),
            Self::ReturndatasizePatch => include_str!("fragments/returndatasize-patch.evm"),
            Self::ReturndatacopyPatch => include_str!("fragments/returndatacopy-patch.evm"),
            Self::ExtcodesizePatch => include_str!("fragments/extcodesize-patch.evm"),
            Self::ExtcodehashPatch => include_str!("fragments/extcodehash-patch.evm"),
            Self::ExtcodecopyPatch => include_str!("fragments/extcodecopy-patch.evm"),
            Self::CheckedDelegatecall => include_str!("fragments/checked-delegatecall.evm"),
            Self::SstoreHook => include_str!("fragments/sstore-hook.evm"),
            Self::LogHook => include_str!("fragments/log-hook.evm"),
            Self::CallHook => include_str!("fragments/call-hook.evm"),
            Self::Returndatacopy => include_str!("fragments/returndatacopy.evm"),
        }
    }
}

/// Every fragment, assembled against one environment.
#[derive(Clone, Debug)]
pub struct Fragments {
    inner: BTreeMap<Fragment, Vec<Instruction>>,
}

impl Fragments {
    pub fn assemble(env: &AsmEnv) -> Result<Self> {
        let inner = Fragment::iter()
            .map(|fragment| {
                let code = assemble(fragment.source(), env)
                    .wrap_err_with(|| format!("failed to assemble fragment {fragment}"))?;
                Ok((fragment, code))
            })
            .collect::<Result<_>>()?;
        Ok(Self { inner })
    }

    pub fn get(&self, fragment: Fragment) -> Result<&[Instruction]> {
        self.inner
            .get(&fragment)
            .map(Vec::as_slice)
            .ok_or_eyre(format!("fragment {fragment} is not assembled"))
    }
}
