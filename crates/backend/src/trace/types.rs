use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rpc_types::{BlockId, BlockNumberOrTag};
use eyre::{eyre, Result};
use serde::Serialize;
use strum::{Display, EnumString, FromRepr};

use super::abi::{RunResult, SpyCall, SpyLog, SpyStore};

/// The transaction to trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    /// Gas limit used when asking the node for an access list.
    pub gas: u64,
    pub gas_price: U256,
    pub block: BlockId,
}

impl Default for TxRequest {
    fn default() -> Self {
        Self {
            from: Address::ZERO,
            to: Address::ZERO,
            value: U256::ZERO,
            data: Bytes::new(),
            gas: 1_000_000,
            gas_price: U256::ZERO,
            block: BlockId::Number(BlockNumberOrTag::Latest),
        }
    }
}

/// Kind of message call, as reported by the call hook.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, FromRepr, Serialize,
)]
#[repr(u8)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallType {
    Call = 0,
    Static = 1,
    Delegate = 2,
    Code = 4,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    /// Account whose code made the call.
    pub context: Address,
    pub to: Address,
    pub call_type: CallType,
    pub value: U256,
    pub gas: U256,
    pub input: Bytes,
    pub output: Bytes,
    pub success: bool,
}

impl TryFrom<SpyCall> for CallRecord {
    type Error = eyre::Report;

    fn try_from(call: SpyCall) -> Result<Self> {
        let call_type = CallType::from_repr(call.callType)
            .ok_or_else(|| eyre!("unknown call type {}", call.callType))?;
        Ok(Self {
            context: call.context,
            to: call.to,
            call_type,
            value: call.value,
            gas: call.gas,
            input: call.input,
            output: call.output,
            success: call.success,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub context: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

impl From<SpyLog> for LogRecord {
    fn from(log: SpyLog) -> Self {
        let count = usize::from(log.numTopics).min(log.topics.len());
        Self { context: log.context, topics: log.topics[..count].to_vec(), data: log.data }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRecord {
    pub context: Address,
    pub slot: B256,
    pub value: B256,
}

impl From<SpyStore> for StoreRecord {
    fn from(store: SpyStore) -> Self {
        Self { context: store.context, slot: store.slot, value: store.value }
    }
}

/// Everything observed while simulating a transaction against patched code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    /// Simulations it took to reach a fixed point.
    pub rounds: usize,
    pub success: bool,
    pub output: Bytes,
    pub gas_used: U256,
    pub calls: Vec<CallRecord>,
    pub logs: Vec<LogRecord>,
    pub stores: Vec<StoreRecord>,
}

impl Trace {
    pub fn from_result(result: RunResult, rounds: usize) -> Result<Self> {
        Ok(Self {
            rounds,
            success: result.success,
            output: result.output,
            gas_used: result.gasUsed,
            calls: result.calls.into_iter().map(CallRecord::try_from).collect::<Result<_>>()?,
            logs: result.logs.into_iter().map(LogRecord::from).collect(),
            stores: result.stores.into_iter().map(StoreRecord::from).collect(),
        })
    }
}
