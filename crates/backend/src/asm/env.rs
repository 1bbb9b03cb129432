use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, FixedBytes, B256, U256};
use eyre::{bail, eyre, Result};
use strum::{Display, EnumString};

use super::Payload;

/// Memory offset of the scratch area hook fragments encode calldata into.
pub const SCRATCH_MEM_LOC: u64 = 0x8000;

/// Memory offset where the real return data of the last call is kept.
pub const FAKE_RETURNDATA_MEM_LOC: u64 = 0xa000;

/// Size of the preamble placed ahead of the relocated original code.
pub const PREAMBLE_SIZE: usize = 5;

/// Revert reason used when a hook delegate-call fails.
pub const HOOK_CALL_FAILED_ERROR: &str = "hook call failed";

/// Names that assembler text may refer to as `$NAME`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvKey {
    HooksContractAddress,
    ScratchMemLoc,
    FakeReturndataMemLoc,
    HandleSpySstoreSelector,
    HandleSpyLogSelector,
    HandleSpyCallSelector,
    PreambleSize,
    HookCallFailedError,
}

/// The shape of value a key must be bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvShape {
    Address,
    Selector,
    Integer,
    Word,
}

impl EnvKey {
    pub const fn shape(self) -> EnvShape {
        match self {
            Self::HooksContractAddress => EnvShape::Address,
            Self::ScratchMemLoc | Self::FakeReturndataMemLoc | Self::PreambleSize => {
                EnvShape::Integer
            }
            Self::HandleSpySstoreSelector |
            Self::HandleSpyLogSelector |
            Self::HandleSpyCallSelector => EnvShape::Selector,
            Self::HookCallFailedError => EnvShape::Word,
        }
    }
}

/// A value bound to an [`EnvKey`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvValue {
    Address(Address),
    Selector(FixedBytes<4>),
    Integer(U256),
    Word(B256),
}

impl EnvValue {
    pub const fn shape(&self) -> EnvShape {
        match self {
            Self::Address(_) => EnvShape::Address,
            Self::Selector(_) => EnvShape::Selector,
            Self::Integer(_) => EnvShape::Integer,
            Self::Word(_) => EnvShape::Word,
        }
    }

    /// Converts the value into the payload of the PUSH it is substituted into.
    pub fn to_payload(&self) -> Payload {
        match self {
            Self::Address(address) => Payload::Bytes(Bytes::copy_from_slice(address.as_slice())),
            Self::Selector(selector) => Payload::Bytes(Bytes::copy_from_slice(selector.as_slice())),
            Self::Integer(value) => Payload::Int(*value),
            Self::Word(word) => Payload::Bytes(Bytes::copy_from_slice(word.as_slice())),
        }
    }
}

/// The substitution environment used while assembling fragment templates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AsmEnv {
    values: BTreeMap<EnvKey, EnvValue>,
}

impl AsmEnv {
    /// An environment with the memory layout constants and the failure reason bound.
    pub fn with_defaults() -> Self {
        let mut env = Self::default();
        env.values.insert(EnvKey::ScratchMemLoc, EnvValue::Integer(U256::from(SCRATCH_MEM_LOC)));
        env.values.insert(
            EnvKey::FakeReturndataMemLoc,
            EnvValue::Integer(U256::from(FAKE_RETURNDATA_MEM_LOC)),
        );
        env.values.insert(EnvKey::PreambleSize, EnvValue::Integer(U256::from(PREAMBLE_SIZE)));
        env.values.insert(EnvKey::HookCallFailedError, EnvValue::Word(error_word()));
        env
    }

    /// Binds `key`, rejecting a value of the wrong shape.
    pub fn set(&mut self, key: EnvKey, value: EnvValue) -> Result<()> {
        if key.shape() != value.shape() {
            bail!("{key} expects a value of shape {:?}, got {:?}", key.shape(), value.shape());
        }
        self.values.insert(key, value);
        Ok(())
    }

    /// Chained form of [`AsmEnv::set`].
    pub fn bind(mut self, key: EnvKey, value: EnvValue) -> Result<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    pub fn get(&self, key: EnvKey) -> Option<&EnvValue> {
        self.values.get(&key)
    }

    /// Looks up `$NAME` as written in assembler text.
    pub fn lookup(&self, name: &str) -> Result<Payload> {
        let key: EnvKey = name.parse().map_err(|_| eyre!("unknown environment key ${name}"))?;
        self.get(key).map(EnvValue::to_payload).ok_or_else(|| eyre!("${name} is undefined"))
    }
}

fn error_word() -> B256 {
    B256::right_padding_from(HOOK_CALL_FAILED_ERROR.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, fixed_bytes};

    #[test]
    fn test_key_names() {
        assert_eq!(EnvKey::HooksContractAddress.to_string(), "HOOKS_CONTRACT_ADDRESS");
        assert_eq!(
            "FAKE_RETURNDATA_MEM_LOC".parse::<EnvKey>().unwrap(),
            EnvKey::FakeReturndataMemLoc
        );
        assert!("hooks_contract_address".parse::<EnvKey>().is_err());
    }

    #[test]
    fn test_shape_mismatch() {
        let mut env = AsmEnv::default();
        assert!(env.set(EnvKey::HooksContractAddress, EnvValue::Integer(U256::from(1))).is_err());
        assert!(env
            .set(EnvKey::HandleSpyLogSelector, EnvValue::Selector(fixed_bytes!("deadbeef")))
            .is_ok());
    }

    #[test]
    fn test_lookup() {
        let env = AsmEnv::with_defaults()
            .bind(
                EnvKey::HooksContractAddress,
                EnvValue::Address(address!("9000000000000000000000000000000000000002")),
            )
            .unwrap();

        assert_eq!(env.lookup("SCRATCH_MEM_LOC").unwrap(), Payload::Int(U256::from(0x8000)));
        match env.lookup("HOOKS_CONTRACT_ADDRESS").unwrap() {
            Payload::Bytes(bytes) => assert_eq!(bytes.len(), 20),
            other => panic!("unexpected payload {other:?}"),
        }
        match env.lookup("HOOK_CALL_FAILED_ERROR").unwrap() {
            Payload::Bytes(bytes) => {
                assert_eq!(bytes.len(), 32);
                assert!(bytes.starts_with(b"hook call failed"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(env.lookup("HANDLE_SPY_CALL_SELECTOR").is_err());
        assert!(env.lookup("NOT_A_KEY").is_err());
        assert!(env.lookup("HANDLE_SPY_SSTORE_SELECTOR").is_err());
        assert!(env.lookup("HANDLE_SPY_LOG_SELECTOR").is_err());
    }
}
