//! ABI of the runner and the spy hooks.

use alloy_sol_types::sol;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct TxParams {
        address txOrigin;
        address txTo;
        uint256 txValue;
        bytes txData;
        uint256 txGas;
        uint256 txGasPrice;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SpyCall {
        address context;
        address to;
        uint8 callType;
        uint256 value;
        uint256 gas;
        bytes input;
        bytes output;
        bool success;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SpyLog {
        address context;
        uint8 numTopics;
        bytes32[4] topics;
        bytes data;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SpyStore {
        address context;
        bytes32 slot;
        bytes32 value;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct RunResult {
        bool success;
        bytes output;
        uint256 gasUsed;
        SpyCall[] calls;
        SpyLog[] logs;
        SpyStore[] stores;
    }

    function run(TxParams params) returns (RunResult result);

    function handleSpySstore(bytes32 slot, bytes32 value);

    function handleSpyLog(
        uint256 numTopics,
        bytes32 topic0,
        bytes32 topic1,
        bytes32 topic2,
        bytes32 topic3,
        bytes data
    );

    function handleSpyCall(
        uint8 callType,
        address to,
        uint256 value,
        uint256 gas,
        bool success,
        bytes input,
        bytes output
    );
}
