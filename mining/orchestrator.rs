//! Top-level mining state machine
//!
//! Owns every other component and ties the cycle together: chain
//! synchronization through the retry policy, work issuance through the
//! request queue, response handling from the compute engine, proof
//! submission through the signing collaborator, and the background
//! sync loop. All mutable mining state has a single owner
//! ([`SessionState`] behind one mutex); the response handler and the
//! periodic sync loop both synchronize onto it, so no two mutations
//! interleave.

use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use primitive_types::{H160, U128, U256};
use rand::Rng;
use rpc_core::abi;
use rpc_core::model::{BlockRef, RpcError, UnsignedTransaction};
use rpc_core::{ChainRpc, FeeOracle, SignerError, TransactionSigner};
use thiserror::Error;

use crate::config::MinerConfig;
use crate::difficulty::{DifficultyController, WorkBudget};
use crate::engine::Engine;
use crate::events::{EventObserver, MinerEvent};
use crate::gas::{GasPriceError, GasPricePolicy, GasQuote};
use crate::hashrate::HashrateEstimator;
use crate::heights::{PowHeightCache, TargetKey};
use crate::looper::{Looper, LooperError, ShutdownSignal};
use crate::queue::{parse_response, EngineResponse, MiningRequest, MiningRequestQueue};
use crate::retry::RetryPolicy;
use crate::tips::TipSelector;

#[derive(Error, Debug)]
pub enum MinerError {
    #[error("miner is already running")]
    AlreadyRunning,

    #[error("miner is not running")]
    NotRunning,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("compute engine failure: {0}")]
    Engine(String),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("gas price error: {0}")]
    Gas(#[from] GasPriceError),

    #[error("looper error: {0}")]
    Looper(#[from] LooperError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("interrupted by shutdown")]
    Interrupted,
}

/// Orchestrator lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MinerState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl MinerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => MinerState::Starting,
            2 => MinerState::Running,
            3 => MinerState::Stopping,
            _ => MinerState::Stopped,
        }
    }
}

/// Shared handles the control surface and the session thread both
/// need.
struct Inner {
    state: AtomicU8,
    shutdown: Arc<ShutdownSignal>,
    engine: Mutex<Option<Engine>>,
    looper: Mutex<Looper>,
}

/// Drives the full mining cycle against a chain view, a signer and a
/// compute-engine subprocess.
pub struct MiningOrchestrator {
    config: MinerConfig,
    rpc: Arc<dyn ChainRpc>,
    signer: Arc<dyn TransactionSigner>,
    observer: EventObserver,
    inner: Arc<Inner>,
    handle: Option<JoinHandle<()>>,
}

impl MiningOrchestrator {
    pub fn new(
        config: MinerConfig,
        rpc: Arc<dyn ChainRpc>,
        signer: Arc<dyn TransactionSigner>,
        observer: EventObserver,
    ) -> Self {
        let sync_interval = config.sync_interval;
        Self {
            config,
            rpc,
            signer,
            observer,
            inner: Arc::new(Inner {
                state: AtomicU8::new(MinerState::Stopped as u8),
                shutdown: Arc::new(ShutdownSignal::new()),
                engine: Mutex::new(None),
                looper: Mutex::new(Looper::new(sync_interval)),
            }),
            handle: None,
        }
    }

    pub fn state(&self) -> MinerState {
        MinerState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// Begin mining. Rejected unless currently stopped.
    pub fn start(&mut self) -> Result<(), MinerError> {
        self.config.validate().map_err(MinerError::Config)?;
        self.inner
            .state
            .compare_exchange(
                MinerState::Stopped as u8,
                MinerState::Starting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| MinerError::AlreadyRunning)?;
        self.inner.shutdown.reset();

        let config = self.config.clone();
        let rpc = Arc::clone(&self.rpc);
        let signer = Arc::clone(&self.signer);
        let observer = Arc::clone(&self.observer);
        let inner = Arc::clone(&self.inner);

        self.handle = Some(thread::spawn(move || {
            let result = session_main(&config, rpc, signer, observer.clone(), &inner);

            // Supervisory boundary: whatever happened above, the
            // compute engine must not be left running headless.
            if let Some(mut engine) = inner
                .engine
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take()
            {
                engine.shutdown();
            }
            {
                let mut looper = inner.looper.lock().unwrap_or_else(|e| e.into_inner());
                if looper.is_running() {
                    let _ = looper.stop();
                    looper.join();
                }
            }
            match result {
                Ok(()) | Err(MinerError::Interrupted) => {}
                Err(e) => observer(MinerEvent::Error {
                    message: "mining session ended".to_string(),
                    cause: Some(e.to_string()),
                }),
            }
            // If a stop() is in flight it finishes the transition.
            for from in [MinerState::Starting, MinerState::Running] {
                let _ = inner.state.compare_exchange(
                    from as u8,
                    MinerState::Stopped as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
            }
        }));
        Ok(())
    }

    /// Stop mining: interrupt the engine, halt the sync loop, join the
    /// session. Rejected unless starting or running.
    pub fn stop(&mut self) -> Result<(), MinerError> {
        let mut transitioned = false;
        for from in [MinerState::Starting, MinerState::Running] {
            if self
                .inner
                .state
                .compare_exchange(
                    from as u8,
                    MinerState::Stopping as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                transitioned = true;
                break;
            }
        }
        if !transitioned {
            return Err(MinerError::NotRunning);
        }

        log::info!("stopping miner");
        self.inner.shutdown.trigger();
        if let Some(engine) = self
            .inner
            .engine
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
        {
            engine.interrupt();
        }
        {
            let mut looper = self.inner.looper.lock().unwrap_or_else(|e| e.into_inner());
            if looper.is_running() {
                let _ = looper.stop();
                looper.join();
            }
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        if let Some(mut engine) = self
            .inner
            .engine
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            engine.shutdown();
        }
        self.inner
            .state
            .store(MinerState::Stopped as u8, Ordering::SeqCst);
        log::info!("miner stopped");
        Ok(())
    }

    /// Block until the session thread exits (engine death or stop()
    /// from another control path).
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MiningOrchestrator {
    fn drop(&mut self) {
        let _ = self.stop();
        self.join();
    }
}

/// Mutable mining state with a single logical owner.
pub(crate) struct SessionState {
    pub(crate) estimator: HashrateEstimator,
    pub(crate) controller: DifficultyController,
    pub(crate) budget: WorkBudget,
    pub(crate) tips: TipSelector,
    pub(crate) heights: PowHeightCache,
    pub(crate) block: BlockRef,
    pub(crate) queue: MiningRequestQueue,
    pub(crate) last_report: Instant,
    pub(crate) last_report_hashes: u64,
}

/// One mining run: everything between start() and stop().
pub(crate) struct Session {
    pub(crate) config: MinerConfig,
    pub(crate) rpc: Arc<dyn ChainRpc>,
    pub(crate) signer: Arc<dyn TransactionSigner>,
    pub(crate) observer: EventObserver,
    pub(crate) shutdown: Arc<ShutdownSignal>,
    pub(crate) retry: RetryPolicy,
    pub(crate) oracle: Option<FeeOracle>,
    pub(crate) policy: GasPricePolicy,
    pub(crate) state: Mutex<SessionState>,
}

fn session_main(
    config: &MinerConfig,
    rpc: Arc<dyn ChainRpc>,
    signer: Arc<dyn TransactionSigner>,
    observer: EventObserver,
    inner: &Arc<Inner>,
) -> Result<(), MinerError> {
    let shutdown = Arc::clone(&inner.shutdown);
    let retry = RetryPolicy::default();

    // Contract-defined mining start time; scheduled, not busy-waited.
    let start_time = retry
        .retry("read contract start time", || shutdown.is_triggered(), || {
            let ret = rpc.call(config.contract, abi::start_time_call())?;
            abi::decode_uint(&ret)
        })
        .ok_or(MinerError::Interrupted)?;
    let now = unix_now();
    let start_secs = start_time.min(U256::from(u64::MAX)).low_u64();
    if start_secs > now {
        log::info!("mining starts in {} seconds", start_secs - now);
        if shutdown.wait_timeout(Duration::from_secs(start_secs - now)) {
            return Err(MinerError::Interrupted);
        }
    }

    // Initial chain sync.
    let block = retry
        .retry("synchronize chain state", || shutdown.is_triggered(), || {
            confirmed_block(&*rpc, config)
        })
        .ok_or(MinerError::Interrupted)?;
    let tips = TipSelector::new(config.miner, &config.tip_candidates);
    let mut heights = PowHeightCache::new();
    for tip in tips.subset().to_vec() {
        let key = TargetKey::new(config.submitter, config.miner, tip, config.tip_split_bps);
        retry
            .retry("fetch pow height", || shutdown.is_triggered(), || {
                heights.refresh(&key, &*rpc, config.contract)
            })
            .ok_or(MinerError::Interrupted)?;
    }

    // Compute engine; persists across requests.
    let (engine, stdin, stdout) = Engine::spawn(&config.engine_path)?;
    *inner.engine.lock().unwrap_or_else(|e| e.into_inner()) = Some(engine);

    let estimator = HashrateEstimator::seeded(config.initial_hashrate);
    let controller = DifficultyController::new(config.proof_period_secs, config.cores);
    let budget = controller.recalculate(estimator.rate());
    let oracle = config
        .fee_oracle_url
        .as_ref()
        .and_then(|url| FeeOracle::new(url, &config.fee_oracle_tier).ok());

    let session = Arc::new(Session {
        config: config.clone(),
        rpc,
        signer,
        observer,
        shutdown: Arc::clone(&shutdown),
        retry,
        oracle,
        policy: GasPricePolicy::new(config.gas.clone()),
        state: Mutex::new(SessionState {
            estimator,
            controller,
            budget,
            tips,
            heights,
            block,
            queue: MiningRequestQueue::new(stdin),
            last_report: Instant::now(),
            last_report_hashes: 0,
        }),
    });

    // Background chain sync on a jittered interval.
    {
        let mut looper = inner.looper.lock().unwrap_or_else(|e| e.into_inner());
        let sync_session = Arc::clone(&session);
        let sync_observer = Arc::clone(&session.observer);
        looper.start(
            move || sync_session.sync_chain(),
            move |e: MinerError| {
                sync_observer(MinerEvent::Error {
                    message: "periodic chain sync failed".to_string(),
                    cause: Some(e.to_string()),
                })
            },
        )?;
    }

    {
        let mut st = session.state.lock().unwrap_or_else(|e| e.into_inner());
        session.issue_request(&mut st)?;
    }
    inner
        .state
        .compare_exchange(
            MinerState::Starting as u8,
            MinerState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .map_err(|_| MinerError::Interrupted)?;
    log::info!("mining started (pow height cycle live)");

    // Responses are processed strictly in emission order, one at a
    // time.
    let reader = BufReader::new(stdout);
    for line in reader.lines() {
        if shutdown.is_triggered() {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        session.handle_line(&line);
    }

    if shutdown.is_triggered() {
        Ok(())
    } else {
        Err(MinerError::Engine(
            "compute engine closed its output stream".to_string(),
        ))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Mining anchor: a block a few confirmations behind head.
fn confirmed_block(rpc: &dyn ChainRpc, config: &MinerConfig) -> Result<BlockRef, RpcError> {
    let head = rpc.latest_block()?;
    let number = head.number.saturating_sub(config.confirmation_lag);
    if number == head.number {
        Ok(head)
    } else {
        rpc.block_by_number(number)
    }
}

impl Session {
    fn emit(&self, event: MinerEvent) {
        (self.observer)(event);
    }

    /// Process one engine output line. Protocol violations and
    /// processing failures are reported and the cycle continues.
    pub(crate) fn handle_line(&self, line: &str) {
        let response = match parse_response(line) {
            Ok(r) => r,
            Err(e) => {
                self.emit(MinerEvent::Error {
                    message: "unrecognized compute engine output".to_string(),
                    cause: Some(e),
                });
                return;
            }
        };
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let result = match response {
            EngineResponse::Progress { hashes } => self.handle_progress(&mut st, hashes),
            EngineResponse::Exhausted => self.handle_exhausted(&mut st),
            EngineResponse::Nonce(nonce) => self.handle_nonce(&mut st, nonce),
        };
        match result {
            Ok(()) | Err(MinerError::Interrupted) => {}
            Err(e) => self.emit(MinerEvent::Error {
                message: "failed to process engine response".to_string(),
                cause: Some(e.to_string()),
            }),
        }
    }

    fn handle_progress(&self, st: &mut SessionState, hashes: u64) -> Result<(), MinerError> {
        if st.queue.peek_head().is_none() {
            self.emit(MinerEvent::Warning {
                message: "progress report with no outstanding request".to_string(),
                cause: None,
            });
            return Ok(());
        }
        let delta_hashes = hashes.saturating_sub(st.last_report_hashes);
        let delta_ms = st.last_report.elapsed().as_millis() as u64;
        st.last_report_hashes = hashes;
        st.last_report = Instant::now();
        let rate = st.estimator.update(delta_hashes, delta_ms);
        self.emit(MinerEvent::Hashrate(rate));
        Ok(())
    }

    fn handle_exhausted(&self, st: &mut SessionState) -> Result<(), MinerError> {
        let Some(request) = st.queue.pop_head() else {
            self.emit(MinerEvent::Warning {
                message: "terminal response with no outstanding request".to_string(),
                cause: None,
            });
            return Ok(());
        };
        log::debug!(
            "hash budget exhausted without proof (height {}, block {})",
            request.pow_height,
            request.block.number
        );
        st.budget = st.controller.recalculate(st.estimator.rate());
        self.issue_request(st)
    }

    fn handle_nonce(&self, st: &mut SessionState, nonce: U256) -> Result<(), MinerError> {
        let Some(request) = st.queue.pop_head() else {
            self.emit(MinerEvent::Warning {
                message: "nonce response with no outstanding request".to_string(),
                cause: None,
            });
            return Ok(());
        };
        match self.submit_proof(&request, nonce) {
            Ok((tx_hash, quote)) => {
                self.emit(MinerEvent::Proof {
                    tx_hash,
                    tip: request.key.tip,
                    pow_height: request.pow_height,
                    gas_price_gwei: quote.gwei,
                });
                // Optimistic advance; the key is refreshed from chain
                // before its next use anyway.
                st.heights.bump(&request.key);
                st.tips.rotate();
            }
            Err(MinerError::Gas(GasPriceError::LimitExceeded { gwei, ceiling_gwei })) => {
                // Blocking policy: the proof is withheld and the same
                // target/height is reissued.
                self.emit(MinerEvent::Error {
                    message: "gas price limit violated, proof not submitted".to_string(),
                    cause: Some(format!("{gwei} gwei > {ceiling_gwei} gwei")),
                });
            }
            Err(MinerError::Interrupted) => return Err(MinerError::Interrupted),
            Err(e) => {
                self.emit(MinerEvent::Warning {
                    message: "proof submission failed".to_string(),
                    cause: Some(e.to_string()),
                });
                // The key must be re-read from chain before its next
                // use; rotation moves on in the meantime.
                st.heights.mark_stale(&request.key);
                st.tips.rotate();
            }
        }
        st.budget = st.controller.recalculate(st.estimator.rate());
        self.issue_request(st)
    }

    fn submit_proof(
        &self,
        request: &MiningRequest,
        nonce: U256,
    ) -> Result<(primitive_types::H256, GasQuote), MinerError> {
        let quote = self.policy.quote(&*self.rpc, self.oracle.as_ref())?;
        let account_nonce = self.rpc.transaction_count(self.config.submitter)?;
        let data = abi::mine_call(
            request.key.recipients(),
            request.key.splits(),
            request.block.number,
            request.block.hash,
            request.difficulty,
            request.pow_height,
            nonce,
        );
        let tx = UnsignedTransaction {
            nonce: account_nonce,
            gas_price: quote.wei,
            gas_limit: U256::from(self.config.gas_limit),
            to: self.config.contract,
            value: U256::zero(),
            data,
            chain_id: self.config.chain_id,
        };
        let raw = self.signer.sign(&tx)?;
        let tx_hash = self.rpc.send_raw_transaction(&raw)?;
        Ok((tx_hash, quote))
    }

    /// Issue the next request for the currently active target.
    pub(crate) fn issue_request(&self, st: &mut SessionState) -> Result<(), MinerError> {
        let Some(tip) = st.tips.active() else {
            return Err(MinerError::Config("no active tip target".to_string()));
        };
        let key = TargetKey::new(
            self.config.submitter,
            self.config.miner,
            tip,
            self.config.tip_split_bps,
        );
        if st.heights.is_stale(&key) {
            let contract = self.config.contract;
            let rpc = Arc::clone(&self.rpc);
            let heights = &mut st.heights;
            self.retry
                .retry(
                    "resynchronize pow height",
                    || self.shutdown.is_triggered(),
                    || heights.refresh(&key, &*rpc, contract),
                )
                .ok_or(MinerError::Interrupted)?;
        }
        let request = MiningRequest {
            key,
            block: st.block,
            difficulty: st.budget.difficulty,
            pow_height: st.heights.next_height(&key),
            thread_iterations: st.budget.thread_iterations,
            hash_limit: st.budget.hash_limit,
            nonce_offset: random_nonce_offset(),
        };
        log::debug!(
            "issuing work: tip {:?}, height {}, block {}, hash limit {}",
            tip,
            request.pow_height,
            request.block.number,
            request.hash_limit
        );
        st.queue.send(request)?;
        st.last_report = Instant::now();
        st.last_report_hashes = 0;
        Ok(())
    }

    /// Periodic refresh of the mining anchor and the active subset's
    /// pow heights; runs on the looper thread.
    pub(crate) fn sync_chain(&self) -> Result<(), MinerError> {
        let block = confirmed_block(&*self.rpc, &self.config)?;
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if st.block != block {
            log::debug!("mining anchor moved to block {}", block.number);
        }
        st.block = block;
        let tips: Vec<H160> = st.tips.subset().to_vec();
        for tip in tips {
            let key = TargetKey::new(
                self.config.submitter,
                self.config.miner,
                tip,
                self.config.tip_split_bps,
            );
            st.heights.refresh(&key, &*self.rpc, self.config.contract)?;
        }
        Ok(())
    }
}

/// Random 128-bit starting point so concurrent miners do not scan
/// identical nonce ranges.
fn random_nonce_offset() -> U128 {
    let value: u128 = rand::thread_rng().gen();
    U128::from_big_endian(&value.to_be_bytes())
}
