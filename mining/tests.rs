//! Crate-level test doubles and end-to-end cycle tests
//!
//! The scenario tests drive the session's response handler directly
//! over an in-memory engine sink, with a scriptable chain view and a
//! recording signer standing in for the network.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use primitive_types::{H160, H256, U256};
use rpc_core::abi;
use rpc_core::model::{BlockRef, RpcError, UnsignedTransaction};
use rpc_core::{ChainRpc, SignerError, TransactionSigner};

use crate::config::MinerConfig;
use crate::difficulty::DifficultyController;
use crate::events::{EventObserver, MinerEvent};
use crate::gas::{GasConfig, GasPricePolicy};
use crate::hashrate::HashrateEstimator;
use crate::heights::{PowHeightCache, TargetKey};
use crate::looper::ShutdownSignal;
use crate::orchestrator::{MinerError, MiningOrchestrator, Session, SessionState};
use crate::queue::MiningRequestQueue;
use crate::retry::RetryPolicy;
use crate::tips::TipSelector;

const WEI_PER_GWEI: u64 = 1_000_000_000;

struct MockRpcState {
    gas_price: U256,
    gas_price_fails: bool,
    head: BlockRef,
    start_time: U256,
    pow_height: u64,
    tx_count: U256,
    broadcast_fails: bool,
    sent: Vec<Vec<u8>>,
    pow_height_queries: usize,
}

/// Scriptable [`ChainRpc`] double. All knobs take `&self` so a mock
/// can be shared behind an `Arc` while the test keeps tweaking it.
pub struct MockRpc {
    state: Mutex<MockRpcState>,
}

impl MockRpc {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockRpcState {
                gas_price: U256::from(10u64) * U256::from(WEI_PER_GWEI),
                gas_price_fails: false,
                head: BlockRef {
                    number: 100,
                    hash: H256::repeat_byte(0xaa),
                },
                start_time: U256::zero(),
                pow_height: 0,
                tx_count: U256::zero(),
                broadcast_fails: false,
                sent: Vec::new(),
                pow_height_queries: 0,
            }),
        }
    }

    pub fn set_gas_price(&self, wei: U256) {
        self.state.lock().unwrap().gas_price = wei;
    }

    pub fn fail_gas_price(&self) {
        self.state.lock().unwrap().gas_price_fails = true;
    }

    pub fn set_head(&self, number: u64, hash: H256) {
        self.state.lock().unwrap().head = BlockRef { number, hash };
    }

    pub fn set_pow_height(&self, height: u64) {
        self.state.lock().unwrap().pow_height = height;
    }

    pub fn fail_broadcast(&self) {
        self.state.lock().unwrap().broadcast_fails = true;
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn pow_height_queries(&self) -> usize {
        self.state.lock().unwrap().pow_height_queries
    }
}

impl ChainRpc for MockRpc {
    fn latest_block(&self) -> Result<BlockRef, RpcError> {
        Ok(self.state.lock().unwrap().head)
    }

    fn block_by_number(&self, number: u64) -> Result<BlockRef, RpcError> {
        let head = self.state.lock().unwrap().head;
        if number == head.number {
            Ok(head)
        } else {
            Ok(BlockRef {
                number,
                hash: H256::from_low_u64_be(number),
            })
        }
    }

    fn gas_price(&self) -> Result<U256, RpcError> {
        let state = self.state.lock().unwrap();
        if state.gas_price_fails {
            Err(RpcError::Response("gas price unavailable".to_string()))
        } else {
            Ok(state.gas_price)
        }
    }

    fn transaction_count(&self, _address: H160) -> Result<U256, RpcError> {
        Ok(self.state.lock().unwrap().tx_count)
    }

    fn call(&self, _to: H160, data: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        let mut state = self.state.lock().unwrap();
        let word = if data.starts_with(&abi::selector("start_time()")) {
            state.start_time
        } else if data.starts_with(&abi::selector(
            "get_pow_height(address,address[2],uint256[2])",
        )) {
            state.pow_height_queries += 1;
            U256::from(state.pow_height)
        } else {
            return Err(RpcError::Response("unexpected call".to_string()));
        };
        let mut ret = [0u8; 32];
        word.to_big_endian(&mut ret);
        Ok(ret.to_vec())
    }

    fn send_raw_transaction(&self, raw: &[u8]) -> Result<H256, RpcError> {
        let mut state = self.state.lock().unwrap();
        if state.broadcast_fails {
            return Err(RpcError::Response("broadcast rejected".to_string()));
        }
        state.sent.push(raw.to_vec());
        Ok(H256::from(abi::keccak256(raw)))
    }

    fn chain_id(&self) -> Result<u64, RpcError> {
        Ok(1)
    }
}

/// Signer double that records every transaction it is asked to sign.
#[derive(Default)]
pub struct MockSigner {
    pub signed: Mutex<Vec<UnsignedTransaction>>,
}

impl TransactionSigner for MockSigner {
    fn sign(&self, tx: &UnsignedTransaction) -> Result<Vec<u8>, SignerError> {
        self.signed.lock().unwrap().push(tx.clone());
        Ok(tx.data.clone())
    }
}

/// Write half of an in-memory engine pipe.
#[derive(Clone, Default)]
struct VecSink(Arc<Mutex<Vec<u8>>>);

impl Write for VecSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn test_config(tip_count: u8) -> MinerConfig {
    MinerConfig {
        miner: H160::repeat_byte(0x11),
        submitter: H160::repeat_byte(0x22),
        contract: H160::repeat_byte(0x33),
        tip_candidates: (1..=tip_count).map(H160::repeat_byte).collect(),
        ..MinerConfig::default()
    }
}

struct Harness {
    session: Session,
    rpc: Arc<MockRpc>,
    sink: Arc<Mutex<Vec<u8>>>,
    events: Arc<Mutex<Vec<MinerEvent>>>,
}

fn harness(config: MinerConfig) -> Harness {
    let rpc = Arc::new(MockRpc::new());
    let events: Arc<Mutex<Vec<MinerEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&events);
    let observer: EventObserver = Arc::new(move |event| recorded.lock().unwrap().push(event));
    let sink: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

    let estimator = HashrateEstimator::seeded(config.initial_hashrate);
    let controller = DifficultyController::new(config.proof_period_secs, config.cores);
    let budget = controller.recalculate(estimator.rate());
    let state = SessionState {
        estimator,
        controller,
        budget,
        tips: TipSelector::new(config.miner, &config.tip_candidates),
        heights: PowHeightCache::new(),
        block: BlockRef {
            number: 100,
            hash: H256::repeat_byte(0xaa),
        },
        queue: MiningRequestQueue::new(Box::new(VecSink(Arc::clone(&sink)))),
        last_report: Instant::now(),
        last_report_hashes: 0,
    };
    let session = Session {
        config: config.clone(),
        rpc: Arc::clone(&rpc) as Arc<dyn ChainRpc>,
        signer: Arc::new(MockSigner::default()),
        observer,
        shutdown: Arc::new(ShutdownSignal::new()),
        retry: RetryPolicy {
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        },
        oracle: None,
        policy: GasPricePolicy::new(config.gas.clone()),
        state: Mutex::new(state),
    };
    Harness {
        session,
        rpc,
        sink,
        events,
    }
}

impl Harness {
    fn issue_first(&self) {
        let mut st = self.session.state.lock().unwrap();
        self.session.issue_request(&mut st).unwrap();
    }

    /// Issued request lines, split into whitespace fields.
    fn lines(&self) -> Vec<Vec<String>> {
        let raw = String::from_utf8(self.sink.lock().unwrap().clone()).unwrap();
        raw.split(";\n")
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.split_whitespace().map(str::to_string).collect())
            .collect()
    }

    fn events(&self) -> Vec<MinerEvent> {
        self.events.lock().unwrap().clone()
    }
}

// Request line field indices.
const F_TIP: usize = 1;
const F_HEIGHT: usize = 6;

#[test]
fn exhaustion_reissues_same_target_and_height() {
    let h = harness(test_config(3));
    h.issue_first();
    h.session.handle_line("F:1;");

    let lines = h.lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0][F_TIP], lines[1][F_TIP]);
    assert_eq!(lines[0][F_HEIGHT], lines[1][F_HEIGHT]);
    assert_eq!(h.session.state.lock().unwrap().queue.len(), 1);
    assert!(h.rpc.sent().is_empty());
}

#[test]
fn nonce_submits_proof_rotates_tip_and_bumps_height() {
    let h = harness(test_config(6));
    h.issue_first();
    h.session.handle_line("N:1a2b;00ff;");

    // one raw transaction reached the chain
    assert_eq!(h.rpc.sent().len(), 1);
    let proof = h
        .events()
        .into_iter()
        .find_map(|e| match e {
            MinerEvent::Proof {
                pow_height, tip, ..
            } => Some((pow_height, tip)),
            _ => None,
        })
        .expect("proof event");
    assert_eq!(proof.0, 1);

    // rotation moved to the next subset member
    let lines = h.lines();
    assert_eq!(lines.len(), 2);
    assert_ne!(lines[0][F_TIP], lines[1][F_TIP]);

    // the submitted key's counter advanced locally
    let st = h.session.state.lock().unwrap();
    let key = TargetKey::new(
        h.session.config.submitter,
        h.session.config.miner,
        proof.1,
        h.session.config.tip_split_bps,
    );
    assert_eq!(st.heights.next_height(&key), 2);
}

#[test]
fn proof_transaction_targets_contract_with_mine_calldata() {
    let h = harness(test_config(3));
    h.issue_first();
    h.session.handle_line("N:1a2b;");

    let sent = h.rpc.sent();
    assert_eq!(sent.len(), 1);
    // MockSigner passes the calldata through as the raw transaction
    let mine_selector = abi::selector(
        "mine(address[2],uint256[2],uint256,uint256,uint256,uint256,uint256)",
    );
    assert!(sent[0].starts_with(&mine_selector));
    assert_eq!(sent[0].len(), 4 + 9 * 32);
    // last word is the nonce
    let nonce_word = &sent[0][4 + 8 * 32..];
    assert_eq!(U256::from_big_endian(nonce_word), U256::from(0x1a2b));
}

#[test]
fn gas_limit_violation_withholds_proof_and_keeps_target() {
    let h = harness(test_config(3));
    h.rpc
        .set_gas_price(U256::from(5_000u64) * U256::from(WEI_PER_GWEI));
    h.issue_first();
    h.session.handle_line("N:1a2b;");

    // nothing broadcast, error reported, same target/height reissued
    assert!(h.rpc.sent().is_empty());
    assert!(h.events().iter().any(|e| matches!(
        e,
        MinerEvent::Error { message, .. } if message.contains("gas price limit")
    )));
    let lines = h.lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0][F_TIP], lines[1][F_TIP]);
    assert_eq!(lines[0][F_HEIGHT], lines[1][F_HEIGHT]);
}

#[test]
fn failed_broadcast_marks_stale_and_refreshes_before_reuse() {
    // single candidate: rotation is a no-op, so the same key is reused
    // immediately and must be re-read from chain first
    let h = harness(test_config(1));
    h.rpc.fail_broadcast();
    h.rpc.set_pow_height(41);
    h.issue_first();
    assert_eq!(h.rpc.pow_height_queries(), 0);

    h.session.handle_line("N:1a2b;");

    assert!(h.events().iter().any(|e| matches!(
        e,
        MinerEvent::Warning { message, .. } if message.contains("submission failed")
    )));
    // the reissued request cites the authoritative chain height + 1
    assert_eq!(h.rpc.pow_height_queries(), 1);
    let lines = h.lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1][F_HEIGHT], "42");
}

#[test]
fn progress_reports_update_the_hashrate_estimate() {
    let h = harness(test_config(3));
    h.issue_first();
    h.session.handle_line("H:1 500000;");
    h.session.handle_line("H:2 1000000;");

    let reported: Vec<f64> = h
        .events()
        .into_iter()
        .filter_map(|e| match e {
            MinerEvent::Hashrate(rate) => Some(rate),
            _ => None,
        })
        .collect();
    assert_eq!(reported.len(), 2);
    assert!(reported.iter().all(|r| *r > 0.0));
    // progress is not terminal: the request stays outstanding
    assert_eq!(h.session.state.lock().unwrap().queue.len(), 1);
}

#[test]
fn malformed_engine_line_reports_and_continues() {
    let h = harness(test_config(3));
    h.issue_first();
    h.session.handle_line("garbage");

    assert!(h.events().iter().any(|e| matches!(
        e,
        MinerEvent::Error { message, .. } if message.contains("unrecognized")
    )));
    // the outstanding request is untouched
    assert_eq!(h.session.state.lock().unwrap().queue.len(), 1);
    assert_eq!(h.lines().len(), 1);
}

#[test]
fn stray_terminal_response_is_a_warning_not_a_fault() {
    let h = harness(test_config(3));
    h.session.handle_line("F:1;");
    assert!(h.events().iter().any(|e| matches!(
        e,
        MinerEvent::Warning { message, .. } if message.contains("no outstanding request")
    )));
    assert!(h.lines().is_empty());
}

#[test]
fn sync_chain_anchors_behind_head_and_refreshes_heights() {
    let h = harness(test_config(3));
    h.rpc.set_head(200, H256::repeat_byte(0xbb));
    h.rpc.set_pow_height(7);
    h.session.sync_chain().unwrap();

    let st = h.session.state.lock().unwrap();
    assert_eq!(st.block.number, 200 - h.session.config.confirmation_lag);
    for tip in st.tips.subset() {
        let key = TargetKey::new(
            h.session.config.submitter,
            h.session.config.miner,
            *tip,
            h.session.config.tip_split_bps,
        );
        assert_eq!(st.heights.get(&key), Some(7));
        assert_eq!(st.heights.next_height(&key), 8);
    }
}

#[test]
fn request_difficulty_tracks_the_estimate() {
    let h = harness(test_config(3));
    h.issue_first();
    let before = h.lines()[0].clone();
    // a much faster engine tightens the difficulty on the next issue
    {
        let mut st = h.session.state.lock().unwrap();
        st.estimator = HashrateEstimator::seeded(1e9);
    }
    h.session.handle_line("F:1;");
    let after = h.lines()[1].clone();
    let d_before = U256::from_str_radix(before[4].trim_start_matches("0x"), 16).unwrap();
    let d_after = U256::from_str_radix(after[4].trim_start_matches("0x"), 16).unwrap();
    assert!(d_after < d_before);
}

#[test]
fn orchestrator_rejects_invalid_config_and_redundant_stop() {
    let rpc: Arc<dyn ChainRpc> = Arc::new(MockRpc::new());
    let signer: Arc<dyn TransactionSigner> = Arc::new(MockSigner::default());
    let mut miner = MiningOrchestrator::new(
        MinerConfig::default(),
        rpc,
        signer,
        crate::events::log_observer(),
    );
    assert!(matches!(miner.start(), Err(MinerError::Config(_))));
    assert!(matches!(miner.stop(), Err(MinerError::NotRunning)));
}

#[test]
fn gas_config_default_cap_matches_ceiling() {
    let config = GasConfig::default();
    assert_eq!(
        config.cap_wei,
        U256::from(config.ceiling_gwei) * U256::from(WEI_PER_GWEI)
    );
}
