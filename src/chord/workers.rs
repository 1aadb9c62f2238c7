use crate::chord::node::ChordNode;
use crate::chord::peer::PeerHandle;
use crate::chord::routing::Predecessor;
use crate::chord::MaintenanceConfig;
use crate::error::{ChordError, NetworkError};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::Instrument;

/// Consecutive failure counter with a ceiling.
#[derive(Debug, Clone, Copy)]
pub struct RetryCounter {
    failures: u32,
    ceiling: u32,
}

impl RetryCounter {
    pub fn new(ceiling: u32) -> Self {
        Self {
            failures: 0,
            ceiling: ceiling.max(1),
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Counts a failure. Returns true, and starts over, once the ceiling is reached.
    pub fn record_failure(&mut self) -> bool {
        self.failures += 1;
        if self.failures >= self.ceiling {
            self.failures = 0;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

/// One periodic maintenance routine.
#[async_trait]
pub trait MaintenanceTask: Send {
    fn name(&self) -> &'static str;

    async fn tick(&mut self, node: &ChordNode) -> Result<(), ChordError>;
}

/// Tells the successor that we believe we are its predecessor.
#[derive(Debug, Default)]
pub struct Notifier;

#[async_trait]
impl MaintenanceTask for Notifier {
    fn name(&self) -> &'static str {
        "notify"
    }

    async fn tick(&mut self, node: &ChordNode) -> Result<(), ChordError> {
        let successor = node.routing().successor().await;
        if node.routing().is_local(&successor) {
            return Ok(());
        }
        debug!("{} notifying {}", node.node(), successor.node());
        if let Err(e) = successor.update_predecessor(node.address()).await {
            warn!(
                "{} failed to notify successor {}: {}",
                node.node(),
                successor.node(),
                e
            );
            return Err(e.into());
        }
        Ok(())
    }
}

/// Adopts a closer successor when one has joined in between, and fails over
/// when the successor stays unreachable.
#[derive(Debug)]
pub struct Stabilizer {
    failures: RetryCounter,
}

impl Stabilizer {
    pub fn new(max_retries: u32) -> Self {
        Self {
            failures: RetryCounter::new(max_retries),
        }
    }

    async fn fail_over(&self, node: &ChordNode, dead: &PeerHandle) {
        let routing = node.routing();
        let replacement = routing
            .fingers()
            .await
            .into_iter()
            .skip(1)
            .find(|f| f.address() != dead.address() && !routing.is_local(f))
            .unwrap_or_else(|| routing.local().clone());

        let replaced = routing.replace_peer(dead.address(), &replacement).await;
        error!(
            "Successor {} of {} unreachable, failing over to {} ({} fingers rewritten)",
            dead.node(),
            node.node(),
            replacement.node(),
            replaced
        );
    }
}

#[async_trait]
impl MaintenanceTask for Stabilizer {
    fn name(&self) -> &'static str {
        "stabilize"
    }

    async fn tick(&mut self, node: &ChordNode) -> Result<(), ChordError> {
        let routing = node.routing();
        let successor = routing.successor().await;

        let candidate_address = match node.successor_predecessor(&successor).await {
            Ok(address) => address,
            Err(NetworkError::NotFound(_)) => {
                self.failures.reset();
                return Ok(());
            }
            Err(e) => {
                warn!(
                    "Stabilize at {} could not reach successor {} ({} consecutive): {}",
                    node.node(),
                    successor.node(),
                    self.failures.failures() + 1,
                    e
                );
                if self.failures.record_failure() {
                    self.fail_over(node, &successor).await;
                }
                return Err(e.into());
            }
        };
        self.failures.reset();

        let candidate = node.resolve_peer(&candidate_address).await;
        if routing.is_local(&candidate)
            || !node
                .ring()
                .is_strictly_between(candidate.id(), node.id(), successor.id())
        {
            return Ok(());
        }

        if let Err(e) = candidate.connect().await {
            warn!(
                "Keeping successor {}: closer node {} unreachable: {}",
                successor.node(),
                candidate.node(),
                e
            );
            return Ok(());
        }

        info!("{} adopts successor {}", node.node(), candidate.node());
        routing.set_successor(candidate).await;
        Ok(())
    }
}

/// Refreshes one finger per tick, cycling through the table.
#[derive(Debug)]
pub struct FingerFixer {
    next: usize,
    retries: RetryCounter,
}

impl FingerFixer {
    pub fn new(max_retries: u32) -> Self {
        Self {
            next: 0,
            retries: RetryCounter::new(max_retries),
        }
    }

    /// Index of the finger the next tick refreshes.
    pub fn next_index(&self) -> usize {
        self.next
    }

    fn advance(&mut self, finger_count: usize) {
        self.retries.reset();
        self.next = (self.next + 1) % finger_count;
    }
}

#[async_trait]
impl MaintenanceTask for FingerFixer {
    fn name(&self) -> &'static str {
        "fix_fingers"
    }

    async fn tick(&mut self, node: &ChordNode) -> Result<(), ChordError> {
        let routing = node.routing();
        let count = routing.finger_count();
        let index = self.next % count;
        let start = node.ring().finger_start(node.id(), index);

        if index > 0 {
            if let Some(prev) = routing.finger(index - 1).await {
                if !routing.is_local(&prev) && node.ring().is_between(start, node.id(), prev.id()) {
                    routing.set_finger(index, prev).await;
                    self.advance(count);
                    return Ok(());
                }
            }
        }

        match node.find_successor(start).await {
            Ok(address) => {
                let peer = node.resolve_peer(&address).await;
                routing.set_finger(index, peer).await;
                self.advance(count);
                Ok(())
            }
            Err(e) => {
                if self.retries.record_failure() {
                    warn!(
                        "Giving up on finger {} of {} for now: {}",
                        index,
                        node.node(),
                        e
                    );
                    self.next = (self.next + 1) % count;
                }
                Err(e)
            }
        }
    }
}

/// Forgets a predecessor that stopped answering liveness checks.
#[derive(Debug)]
pub struct PredecessorChecker {
    failures: RetryCounter,
    watching: Option<String>,
}

impl PredecessorChecker {
    pub fn new(max_retries: u32) -> Self {
        Self {
            failures: RetryCounter::new(max_retries),
            watching: None,
        }
    }
}

#[async_trait]
impl MaintenanceTask for PredecessorChecker {
    fn name(&self) -> &'static str {
        "check_predecessor"
    }

    async fn tick(&mut self, node: &ChordNode) -> Result<(), ChordError> {
        let pred = match node.routing().predecessor().await {
            Predecessor::Known(pred) => pred,
            Predecessor::Unknown => {
                self.watching = None;
                self.failures.reset();
                return Ok(());
            }
        };

        // A new predecessor starts with a clean record
        if self.watching.as_deref() != Some(pred.address()) {
            self.watching = Some(pred.address().to_string());
            self.failures.reset();
        }

        match pred.live_check().await {
            Ok(()) => {
                self.failures.reset();
                Ok(())
            }
            Err(e) => {
                warn!("Predecessor {} failed liveness check: {}", pred.node(), e);
                if self.failures.record_failure()
                    && node.routing().clear_predecessor_if(pred.address()).await
                {
                    error!("Predecessor {} of {} considered dead", pred.node(), node.node());
                    self.watching = None;
                }
                Err(e.into())
            }
        }
    }
}

fn initial_offset(period: Duration) -> Duration {
    let millis = period.as_millis().clamp(1, u64::MAX as u128) as u64;
    Duration::from_millis(rand::rng().random_range(0..millis))
}

/// Drives `task` every `period` until `shutdown` flips to true or its sender is dropped.
pub async fn run_task<T: MaintenanceTask>(
    mut task: T,
    node: Arc<ChordNode>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    if *shutdown.borrow() {
        return;
    }

    let mut ticker = interval_at(Instant::now() + initial_offset(period), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Starting {} worker", task.name());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = task.tick(&node).await {
                    debug!("{} tick failed: {}", task.name(), e);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("{} worker stopped", task.name());
}

fn spawn_task<T: MaintenanceTask + 'static>(
    task: T,
    node: &Arc<ChordNode>,
    period: Duration,
    shutdown: &watch::Receiver<bool>,
) -> JoinHandle<()> {
    let span = tracing::info_span!("maintenance", task = task.name(), node = %node.address());
    tokio::spawn(run_task(task, node.clone(), period, shutdown.clone()).instrument(span))
}

/// Spawns Notify, Stabilize, FixFingers and CheckPredecessor for `node`.
pub fn spawn_maintenance(
    node: &Arc<ChordNode>,
    config: MaintenanceConfig,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_task(Notifier, node, config.period, shutdown),
        spawn_task(Stabilizer::new(config.max_retries), node, config.period, shutdown),
        spawn_task(FingerFixer::new(config.max_retries), node, config.period, shutdown),
        spawn_task(
            PredecessorChecker::new(config.max_retries),
            node,
            config.period,
            shutdown,
        ),
    ]
}
