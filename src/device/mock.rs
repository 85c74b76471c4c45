//! Mock Device Implementations
//!
//! Simulated control points for testing sequences without a control system.
//! All mocks are async-safe (tokio locks, no blocking).
//!
//! # Available Mocks
//!
//! - `MockPv` - scalar PV with write log, scripted readbacks and fault injection
//! - `MockWaveform` - array PV with a write counter
//! - `MockActuator` - actuator with a scripted status sequence
//! - `MockGovernor` - governor that records its transitions

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::device::{Actuator, ActuatorStatus, Governor, ProcessVariable, Waveform};

// =============================================================================
// MockPv - Simulated Process Variable
// =============================================================================

/// Mock scalar PV
///
/// - `put` records the value and makes it the new readback
/// - scripted readbacks are returned one per `get`; the last one sticks
/// - `fail_puts` / `fail_next_puts` reject writes, for partial-failure tests
///
/// # Example
///
/// ```rust,ignore
/// let status = MockPv::with_readbacks("cover:status", vec![1.0, 1.0, 0.0]);
/// assert_eq!(status.get().await?, 1.0);
/// ```
pub struct MockPv {
    name: String,
    value: RwLock<f64>,
    scripted: RwLock<VecDeque<f64>>,
    writes: RwLock<Vec<f64>>,
    reads: AtomicUsize,
    fail_puts: AtomicBool,
    failures_left: AtomicUsize,
}

impl MockPv {
    /// PV holding `initial`.
    pub fn new(name: impl Into<String>, initial: f64) -> Self {
        Self {
            name: name.into(),
            value: RwLock::new(initial),
            scripted: RwLock::new(VecDeque::new()),
            writes: RwLock::new(Vec::new()),
            reads: AtomicUsize::new(0),
            fail_puts: AtomicBool::new(false),
            failures_left: AtomicUsize::new(0),
        }
    }

    /// PV that returns `readbacks` in order, then repeats the last one.
    pub fn with_readbacks(name: impl Into<String>, readbacks: Vec<f64>) -> Self {
        let initial = readbacks.last().copied().unwrap_or(0.0);
        let mut pv = Self::new(name, initial);
        pv.scripted = RwLock::new(readbacks.into());
        pv
    }

    /// Set the readback without logging a write (simulates the device side).
    pub async fn set(&self, value: f64) {
        *self.value.write().await = value;
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Reject only the next `count` writes.
    pub fn fail_next_puts(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Every value written so far.
    pub async fn writes(&self) -> Vec<f64> {
        self.writes.read().await.clone()
    }

    /// Number of `get` calls.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessVariable for MockPv {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self) -> Result<f64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.scripted.write().await.pop_front() {
            *self.value.write().await = next;
        }
        Ok(*self.value.read().await)
    }

    async fn put(&self, value: f64, _wait: bool) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            bail!("MockPv '{}': put rejected", self.name);
        }
        let one_shot = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if one_shot.is_ok() {
            bail!("MockPv '{}': put rejected", self.name);
        }
        self.writes.write().await.push(value);
        *self.value.write().await = value;
        Ok(())
    }
}

// =============================================================================
// MockWaveform - Simulated Array PV
// =============================================================================

/// Mock array PV; `put` replaces the stored array.
pub struct MockWaveform {
    name: String,
    values: RwLock<Vec<f64>>,
    puts: AtomicUsize,
    fail_puts: AtomicBool,
}

impl MockWaveform {
    /// Waveform holding `initial`.
    pub fn new(name: impl Into<String>, initial: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values: RwLock::new(initial),
            puts: AtomicUsize::new(0),
            fail_puts: AtomicBool::new(false),
        }
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Current contents without counting as a device read.
    pub async fn values(&self) -> Vec<f64> {
        self.values.read().await.clone()
    }

    /// Number of successful `put` calls.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Waveform for MockWaveform {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self) -> Result<Vec<f64>> {
        Ok(self.values.read().await.clone())
    }

    async fn put(&self, values: &[f64]) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            bail!("MockWaveform '{}': put rejected", self.name);
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        *self.values.write().await = values.to_vec();
        Ok(())
    }
}

// =============================================================================
// MockActuator - Simulated Actuator
// =============================================================================

/// Mock actuator with a scripted status sequence
///
/// Each `status()` call consumes one scripted status; the last one sticks.
pub struct MockActuator {
    id: String,
    statuses: RwLock<VecDeque<ActuatorStatus>>,
    current: RwLock<ActuatorStatus>,
    sent: RwLock<Vec<f64>>,
    polls: AtomicUsize,
}

impl MockActuator {
    /// Actuator that reports `statuses` in order.
    pub fn new(id: impl Into<String>, statuses: Vec<ActuatorStatus>) -> Self {
        let current = statuses.last().copied().unwrap_or(ActuatorStatus::Pending);
        Self {
            id: id.into(),
            statuses: RwLock::new(statuses.into()),
            current: RwLock::new(current),
            sent: RwLock::new(Vec::new()),
            polls: AtomicUsize::new(0),
        }
    }

    /// Actuator that never leaves `Pending`.
    pub fn stuck(id: impl Into<String>) -> Self {
        Self::new(id, vec![ActuatorStatus::Pending])
    }

    /// Every requested state sent so far.
    pub async fn sent(&self) -> Vec<f64> {
        self.sent.read().await.clone()
    }

    /// Number of `status` calls.
    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Actuator for MockActuator {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, requested_state: f64) -> Result<()> {
        self.sent.write().await.push(requested_state);
        Ok(())
    }

    async fn status(&self) -> Result<ActuatorStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.statuses.write().await.pop_front() {
            *self.current.write().await = next;
        }
        Ok(*self.current.read().await)
    }
}

// =============================================================================
// MockGovernor - Simulated Governor
// =============================================================================

/// Mock governor that records every requested transition.
pub struct MockGovernor {
    state: RwLock<String>,
    transitions: RwLock<Vec<String>>,
}

impl MockGovernor {
    /// Governor starting in `state`.
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(state.into()),
            transitions: RwLock::new(Vec::new()),
        }
    }

    /// States requested so far, in order.
    pub async fn transitions(&self) -> Vec<String> {
        self.transitions.read().await.clone()
    }

    /// Current state.
    pub async fn state(&self) -> String {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl Governor for MockGovernor {
    async fn is_in(&self, state: &str) -> Result<bool> {
        Ok(*self.state.read().await == state)
    }

    async fn set_state(&self, state: &str) -> Result<()> {
        self.transitions.write().await.push(state.to_string());
        *self.state.write().await = state.to_string();
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
