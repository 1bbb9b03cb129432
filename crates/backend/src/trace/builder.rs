use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::{address, keccak256, Address, Bytes, B256, U256, U64};
use alloy_rpc_types::BlockId;
use alloy_sol_types::SolCall;
use eyre::{bail, ensure, Result, WrapErr};
use futures::future::try_join_all;
use spyglass_utils::rpc::{CallRequest, CodeOverride, NodeClient, StateOverrides};

use super::{
    abi::{runCall, RunResult, TxParams},
    artifacts::HookArtifacts,
    types::{CallType, Trace, TxRequest},
};
use crate::patch::{OriginalCode, PatchOptions, Patcher};

/// Where the runner contract is placed during simulation.
pub const RUNNER_ADDRESS: Address = address!("9000000000000000000000000000000000000001");
/// Where the hooks contract is placed during simulation.
pub const HOOKS_ADDRESS: Address = address!("9000000000000000000000000000000000000002");
/// Gas the runner forwards to the traced transaction.
pub const TX_GAS: u64 = 100_000_000;
pub const DEFAULT_MAX_ROUNDS: usize = 32;

/// Builder of a [`Tracer`].
#[derive(Debug, Default)]
pub struct TracerBuilder {
    max_rounds: Option<usize>,
    logs_only: bool,
    runner_address: Option<Address>,
    hooks_address: Option<Address>,
}

impl TracerBuilder {
    /// Set the maximum number of simulations.
    /// If not set, [`DEFAULT_MAX_ROUNDS`] is used.
    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    /// Only hook LOG0..LOG4.
    pub fn logs_only(mut self, logs_only: bool) -> Self {
        self.logs_only = logs_only;
        self
    }

    /// Set the address of the runner contract.
    /// If not set, [`RUNNER_ADDRESS`] is used.
    pub fn runner_address(mut self, address: Address) -> Self {
        self.runner_address = Some(address);
        self
    }

    /// Set the address of the hooks contract.
    /// If not set, [`HOOKS_ADDRESS`] is used.
    pub fn hooks_address(mut self, address: Address) -> Self {
        self.hooks_address = Some(address);
        self
    }

    pub fn build<C: NodeClient>(self, client: C, artifacts: HookArtifacts) -> Result<Tracer<C>> {
        debug!("building tracer with {:?}", self);

        let max_rounds = self.max_rounds.unwrap_or(DEFAULT_MAX_ROUNDS);
        ensure!(max_rounds > 0, "max rounds must be positive");

        Ok(Tracer {
            client,
            artifacts,
            max_rounds,
            logs_only: self.logs_only,
            runner_address: self.runner_address.unwrap_or(RUNNER_ADDRESS),
            hooks_address: self.hooks_address.unwrap_or(HOOKS_ADDRESS),
        })
    }
}

/// Traces transactions by simulating them against patched code until no new contract shows
/// up in the trace.
#[derive(Debug)]
pub struct Tracer<C> {
    client: C,
    artifacts: HookArtifacts,
    max_rounds: usize,
    logs_only: bool,
    runner_address: Address,
    hooks_address: Address,
}

impl Tracer<()> {
    pub fn builder() -> TracerBuilder {
        TracerBuilder::default()
    }
}

#[derive(Debug)]
struct PatchedAccount {
    original: Bytes,
    original_hash: B256,
    patched: Bytes,
    patched_hash: B256,
}

/// Accounts seen so far while tracing one transaction.
#[derive(Debug, Default)]
struct Discovered {
    accounts: BTreeMap<Address, PatchedAccount>,
    empty: BTreeSet<Address>,
}

impl Discovered {
    fn is_known(&self, address: &Address) -> bool {
        self.accounts.contains_key(address) || self.empty.contains(address)
    }
}

impl<C: NodeClient> Tracer<C> {
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Traces `tx`. Every round patches the contracts found so far, simulates the
    /// transaction, and queues the successful non-static call targets it has not seen yet.
    pub async fn trace(&self, tx: &TxRequest) -> Result<Trace> {
        let synthetic = [self.runner_address, self.hooks_address, tx.from];
        let mut patcher = Patcher::new(PatchOptions {
            hooks_address: self.hooks_address,
            origin: tx.from,
            logs_only: self.logs_only,
            selectors: self.artifacts.selectors,
            originals: synthetic
                .iter()
                .map(|address| (*address, OriginalCode::of(&[])))
                .collect(),
        })?;

        let mut queue = BTreeSet::from([tx.to]);
        queue.extend(self.access_list(tx).await);
        queue.retain(|address| !synthetic.contains(address));

        let mut seen = Discovered::default();
        let params = TxParams {
            txOrigin: tx.from,
            txTo: tx.to,
            txValue: tx.value,
            txData: tx.data.clone(),
            txGas: U256::from(TX_GAS),
            txGasPrice: tx.gas_price,
        };
        let input = Bytes::from(runCall { params }.abi_encode());

        let mut rounds = 0;
        loop {
            rounds += 1;
            if rounds > self.max_rounds {
                bail!("trace did not converge within {} rounds", self.max_rounds);
            }
            debug!(round = rounds, new = queue.len(), "tracing round");

            self.fetch(&mut patcher, &mut seen, &queue, tx.block).await?;
            let result = self.simulate(&seen, &synthetic, input.clone(), tx.block).await?;
            ensure!(result.success, "transaction reverted with 0x{}", hex::encode(&result.output));

            queue = result
                .calls
                .iter()
                .filter(|call| {
                    call.success &&
                        call.callType != CallType::Static as u8 &&
                        !seen.is_known(&call.to) &&
                        !synthetic.contains(&call.to)
                })
                .map(|call| call.to)
                .collect();
            if queue.is_empty() {
                info!(rounds, contracts = seen.accounts.len(), "trace converged");
                return Trace::from_result(result, rounds);
            }
        }
    }

    async fn access_list(&self, tx: &TxRequest) -> Vec<Address> {
        let request = CallRequest {
            from: tx.from,
            to: tx.to,
            gas: U64::from(tx.gas),
            gas_price: tx.gas_price,
            value: tx.value,
            data: tx.data.clone(),
        };
        match self.client.access_list(&request, tx.block).await {
            Ok(addresses) => addresses,
            Err(err) => {
                warn!("failed to create an access list, starting from the target only: {err}");
                Vec::new()
            }
        }
    }

    // Every image embeds the original size and hash of all patched accounts, so new code
    // means re-patching everything.
    async fn fetch(
        &self,
        patcher: &mut Patcher,
        seen: &mut Discovered,
        queue: &BTreeSet<Address>,
        block: BlockId,
    ) -> Result<()> {
        let fresh: Vec<_> = queue.iter().filter(|address| !seen.is_known(address)).collect();
        let codes = try_join_all(fresh.iter().map(|address| self.client.code_at(**address, block)))
            .await?;

        let mut grew = false;
        for (address, code) in fresh.into_iter().zip(codes) {
            if code.is_empty() {
                trace!(%address, "no code");
                seen.empty.insert(*address);
            } else {
                let original = OriginalCode::of(&code);
                trace!(%address, size = original.size, hash = %original.hash, "fetched code");
                patcher.insert_original(*address, original);
                seen.accounts.insert(*address, PatchedAccount {
                    original: code,
                    original_hash: original.hash,
                    patched: Bytes::new(),
                    patched_hash: B256::ZERO,
                });
                grew = true;
            }
        }

        if grew {
            for (address, account) in seen.accounts.iter_mut() {
                account.patched = patcher
                    .patch(&account.original)
                    .wrap_err_with(|| format!("failed to patch {address}"))?;
                account.patched_hash = keccak256(&account.patched);
                trace!(
                    %address,
                    original = %account.original_hash,
                    patched = %account.patched_hash,
                    "patched code"
                );
            }
        }
        Ok(())
    }

    async fn simulate(
        &self,
        seen: &Discovered,
        synthetic: &[Address; 3],
        input: Bytes,
        block: BlockId,
    ) -> Result<RunResult> {
        let [runner, hooks, origin] = *synthetic;
        let mut overrides: StateOverrides = seen
            .accounts
            .iter()
            .map(|(address, account)| (*address, CodeOverride { code: account.patched.clone() }))
            .collect();
        overrides.insert(origin, CodeOverride { code: self.artifacts.origin.clone() });
        overrides.insert(runner, CodeOverride { code: self.artifacts.runner.clone() });
        overrides.insert(hooks, CodeOverride { code: self.artifacts.hooks.clone() });

        let output = self.client.call(runner, input, &overrides, block).await?;
        let decoded = runCall::abi_decode_returns(&output, false)
            .wrap_err("malformed runner output")?;
        Ok(decoded.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{patch::HookSelectors, trace::abi::SpyCall};
    use alloy_primitives::Selector;
    use alloy_rpc_types::BlockNumberOrTag;
    use eyre::eyre;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    const FROM: Address = address!("00000000000000000000000000000000000000aa");
    const EOA: Address = address!("00000000000000000000000000000000000000ee");

    fn contract(n: u8) -> Address {
        Address::with_last_byte(n)
    }

    /// An edge `from -> to` is reported only once `from` runs patched code.
    #[derive(Clone, Copy)]
    struct Edge {
        from: Address,
        to: Address,
        call_type: CallType,
        success: bool,
    }

    impl Edge {
        fn call(from: Address, to: Address) -> Self {
            Self { from, to, call_type: CallType::Call, success: true }
        }
    }

    #[derive(Default)]
    struct MockNode {
        codes: BTreeMap<Address, Bytes>,
        edges: Vec<Edge>,
        access_list: Option<Vec<Address>>,
        reverts: bool,
        runner: Option<Address>,
        hooks: Option<Address>,
        code_requests: Mutex<Vec<Address>>,
        calls: AtomicUsize,
    }

    impl MockNode {
        fn with_code(mut self, addresses: &[Address]) -> Self {
            for address in addresses {
                self.codes.insert(*address, Bytes::from_static(&[0x60, 0x01, 0x56, 0x5b, 0x00]));
            }
            self
        }

        fn with_edges(mut self, edges: &[Edge]) -> Self {
            self.edges.extend_from_slice(edges);
            self
        }
    }

    #[async_trait::async_trait]
    impl NodeClient for MockNode {
        async fn code_at(&self, address: Address, _block: BlockId) -> Result<Bytes> {
            self.code_requests.lock().unwrap().push(address);
            Ok(self.codes.get(&address).cloned().unwrap_or_default())
        }

        async fn access_list(&self, _request: &CallRequest, _block: BlockId) -> Result<Vec<Address>> {
            self.access_list.clone().ok_or_else(|| eyre!("eth_createAccessList unsupported"))
        }

        async fn call(
            &self,
            to: Address,
            input: Bytes,
            overrides: &StateOverrides,
            _block: BlockId,
        ) -> Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(to, self.runner.unwrap_or(RUNNER_ADDRESS));
            let params = runCall::abi_decode(&input, false)?.params;
            assert_eq!(params.txGas, U256::from(TX_GAS));
            assert!(overrides.contains_key(&self.hooks.unwrap_or(HOOKS_ADDRESS)));
            assert!(overrides.contains_key(&params.txOrigin));

            let calls = self
                .edges
                .iter()
                .filter(|edge| overrides.contains_key(&edge.from))
                .map(|edge| SpyCall {
                    context: edge.from,
                    to: edge.to,
                    callType: edge.call_type as u8,
                    value: U256::ZERO,
                    gas: U256::from(10_000u64),
                    input: Bytes::new(),
                    output: Bytes::new(),
                    success: edge.success,
                })
                .collect();
            let result = RunResult {
                success: !self.reverts,
                output: Bytes::new(),
                gasUsed: U256::from(21_000u64),
                calls,
                logs: vec![],
                stores: vec![],
            };
            Ok(Bytes::from(runCall::abi_encode_returns(&(result,))))
        }
    }

    fn artifacts() -> HookArtifacts {
        HookArtifacts {
            runner: Bytes::from_static(&[0x00]),
            origin: Bytes::from_static(&[0x00]),
            hooks: Bytes::from_static(&[0x00]),
            selectors: HookSelectors {
                sstore: Selector::repeat_byte(0x01),
                log: Selector::repeat_byte(0x02),
                call: Selector::repeat_byte(0x03),
            },
        }
    }

    fn tx(to: Address) -> TxRequest {
        TxRequest {
            from: FROM,
            to,
            block: BlockId::Number(BlockNumberOrTag::Number(100)),
            ..Default::default()
        }
    }

    fn tracer(node: MockNode) -> Tracer<MockNode> {
        Tracer::builder().build(node, artifacts()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_chain_converges() {
        let (a, b, c) = (contract(1), contract(2), contract(3));
        let node = MockNode::default()
            .with_code(&[a, b, c])
            .with_edges(&[Edge::call(a, b), Edge::call(b, c)]);
        let tracer = tracer(node);

        let trace = tracer.trace(&tx(a)).await.unwrap();
        assert_eq!(trace.rounds, 3);
        let hops: Vec<_> = trace.calls.iter().map(|call| (call.context, call.to)).collect();
        assert_eq!(hops, vec![(a, b), (b, c)]);
        assert_eq!(tracer.client().calls.load(Ordering::SeqCst), 3);
        assert_eq!(*tracer.client().code_requests.lock().unwrap(), vec![a, b, c]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_access_list_seeds_discovery() {
        let (a, b, c) = (contract(1), contract(2), contract(3));
        let mut node = MockNode::default()
            .with_code(&[a, b, c])
            .with_edges(&[Edge::call(a, b), Edge::call(b, c)]);
        node.access_list = Some(vec![b, FROM]);

        let trace = tracer(node).trace(&tx(a)).await.unwrap();
        assert_eq!(trace.rounds, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_no_convergence() {
        let addresses: Vec<_> = (1..=4).map(contract).collect();
        let edges: Vec<_> = addresses.windows(2).map(|w| Edge::call(w[0], w[1])).collect();
        let node = MockNode::default().with_code(&addresses).with_edges(&edges);

        let tracer = Tracer::builder().max_rounds(2).build(node, artifacts()).unwrap();
        let err = tracer.trace(&tx(addresses[0])).await.unwrap_err();
        assert!(err.to_string().contains("did not converge"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_top_level_failure() {
        let mut node = MockNode::default().with_code(&[contract(1)]);
        node.reverts = true;

        let err = tracer(node).trace(&tx(contract(1))).await.unwrap_err();
        assert!(err.to_string().contains("reverted"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_static_and_failed_calls_ignored() {
        let (a, b, c) = (contract(1), contract(2), contract(3));
        let node = MockNode::default().with_code(&[a, b, c]).with_edges(&[
            Edge { call_type: CallType::Static, ..Edge::call(a, b) },
            Edge { success: false, ..Edge::call(a, c) },
        ]);
        let tracer = tracer(node);

        let trace = tracer.trace(&tx(a)).await.unwrap();
        assert_eq!(trace.rounds, 1);
        assert_eq!(trace.calls[0].call_type, CallType::Static);
        assert_eq!(*tracer.client().code_requests.lock().unwrap(), vec![a]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_code_fetched_once() {
        let a = contract(1);
        let node = MockNode::default().with_code(&[a]).with_edges(&[Edge::call(a, EOA)]);
        let tracer = tracer(node);

        let trace = tracer.trace(&tx(a)).await.unwrap();
        assert_eq!(trace.rounds, 2);
        assert_eq!(*tracer.client().code_requests.lock().unwrap(), vec![a, EOA]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delegate_calls_discovered() {
        let (a, b) = (contract(1), contract(2));
        let node = MockNode::default()
            .with_code(&[a, b])
            .with_edges(&[Edge { call_type: CallType::Delegate, ..Edge::call(a, b) }]);

        let trace = tracer(node).trace(&tx(a)).await.unwrap();
        assert_eq!(trace.rounds, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_custom_synthetic_addresses() {
        let a = contract(1);
        let runner = address!("8000000000000000000000000000000000000001");
        let hooks = address!("8000000000000000000000000000000000000002");
        let mut node = MockNode::default()
            .with_code(&[a])
            .with_edges(&[Edge::call(a, hooks), Edge::call(a, HOOKS_ADDRESS)]);
        node.runner = Some(runner);
        node.hooks = Some(hooks);

        let tracer = Tracer::builder()
            .runner_address(runner)
            .hooks_address(hooks)
            .build(node, artifacts())
            .unwrap();
        let trace = tracer.trace(&tx(a)).await.unwrap();

        // the custom hooks account is synthetic, the default one is an ordinary EOA now
        assert_eq!(trace.rounds, 2);
        assert_eq!(*tracer.client().code_requests.lock().unwrap(), vec![a, HOOKS_ADDRESS]);
    }

    #[test]
    fn test_zero_rounds_rejected() {
        assert!(Tracer::builder().max_rounds(0).build(MockNode::default(), artifacts()).is_err());
    }
}
