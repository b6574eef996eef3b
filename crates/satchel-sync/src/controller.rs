//! Sync lifecycle controller.
//!
//! The orchestrator: watches entitlement and the hydration gate, subscribes
//! to application lifecycle transitions once armed, and drives push/pull
//! episodes through the transport, emitting to the sync log throughout.
//!
//! # State machine
//!
//! `Idle → AwaitingHydration` on start while entitled;
//! `AwaitingHydration → Armed` when hydration completes (the lifecycle
//! listener is acquired here, not before);
//! `Armed → Syncing` on an entered-foreground transition or a manual
//! trigger, with at most one episode in flight — triggers arriving during an
//! episode are coalesced, never queued;
//! `Syncing → Armed` on completion, success or recovered failure;
//! `Armed | AwaitingHydration → Detached` on entitlement revocation or
//! explicit detach, releasing the listener;
//! `Detached → AwaitingHydration` on re-entitlement.
//!
//! Transport failures inside an episode are caught here, logged at error
//! severity, and folded into [`SyncHealth`]; the next qualifying transition
//! is the retry trigger. Detaching does not cancel an episode already in
//! flight; its completion is simply not acted upon.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use satchel_core::effects::{AppState, LifecycleEvents, LifecycleHandle};
use satchel_core::{Dynamic, LogLevel, SyncHealth};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::hydration::HydrationGate;
use crate::log::SyncLog;
use crate::transport::SnapshotTransport;

/// Controller states. See the module docs for the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Created, not yet started or not yet entitled
    Idle,
    /// Entitled, waiting for every store to hydrate
    AwaitingHydration,
    /// Hydrated and listening for lifecycle transitions
    Armed,
    /// A sync episode is in flight
    Syncing,
    /// Listener released; waiting for re-entitlement
    Detached,
}

/// Controller tuning knobs.
#[derive(Debug, Clone)]
pub struct SyncControllerConfig {
    /// How often the hydration gate is polled while awaiting hydration
    pub hydration_poll_interval: Duration,
    /// How often entitlement is re-checked outside lifecycle events
    pub entitlement_poll_interval: Duration,
}

impl Default for SyncControllerConfig {
    fn default() -> Self {
        Self {
            hydration_poll_interval: Duration::from_millis(50),
            entitlement_poll_interval: Duration::from_millis(200),
        }
    }
}

enum Trigger {
    Manual,
    Detach,
}

struct ControllerShared {
    config: SyncControllerConfig,
    state: RwLock<ControllerState>,
    health: RwLock<SyncHealth>,
    transport: Arc<SnapshotTransport>,
    gate: HydrationGate,
    entitled: Dynamic<bool>,
    lifecycle: Arc<dyn LifecycleEvents>,
    log: SyncLog,
}

impl ControllerShared {
    fn state(&self) -> ControllerState {
        *self.state.read()
    }

    fn transition(&self, to: ControllerState, note: &str) {
        *self.state.write() = to;
        self.log.add(note.to_owned(), LogLevel::Verbose);
    }
}

/// Orchestrates sync episodes across the application lifecycle.
pub struct SyncLifecycleController {
    shared: Arc<ControllerShared>,
    triggers: mpsc::UnboundedSender<Trigger>,
    trigger_source: Mutex<Option<mpsc::UnboundedReceiver<Trigger>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncLifecycleController {
    /// Create a controller with default configuration.
    pub fn new(
        transport: Arc<SnapshotTransport>,
        gate: HydrationGate,
        entitled: Dynamic<bool>,
        lifecycle: Arc<dyn LifecycleEvents>,
        log: SyncLog,
    ) -> Self {
        Self::builder(transport, gate, entitled, lifecycle, log).build()
    }

    /// Create a builder for configuration overrides.
    pub fn builder(
        transport: Arc<SnapshotTransport>,
        gate: HydrationGate,
        entitled: Dynamic<bool>,
        lifecycle: Arc<dyn LifecycleEvents>,
        log: SyncLog,
    ) -> SyncLifecycleControllerBuilder {
        SyncLifecycleControllerBuilder {
            transport,
            gate,
            entitled,
            lifecycle,
            log,
            config: SyncControllerConfig::default(),
        }
    }

    /// Start the controller's run loop. Returns false if already started.
    pub fn start(&self) -> bool {
        let Some(triggers) = self.trigger_source.lock().take() else {
            return false;
        };
        let shared = Arc::clone(&self.shared);
        *self.task.lock() = Some(tokio::spawn(run(shared, triggers)));
        true
    }

    /// Current state.
    pub fn state(&self) -> ControllerState {
        self.shared.state()
    }

    /// Current sync health.
    pub fn health(&self) -> SyncHealth {
        self.shared.health.read().clone()
    }

    /// Request an immediate sync episode.
    ///
    /// Honored only while `Armed`; a request during an in-flight episode is
    /// coalesced into it, and requests in any other state are ignored.
    pub fn sync_now(&self) {
        match self.shared.state() {
            ControllerState::Armed => {
                let _ = self.triggers.send(Trigger::Manual);
            }
            ControllerState::Syncing => {
                self.shared
                    .log
                    .add("manual sync coalesced: episode already in flight", LogLevel::Verbose);
            }
            other => {
                self.shared.log.add(
                    format!("manual sync ignored in state {other:?}"),
                    LogLevel::Verbose,
                );
            }
        }
    }

    /// Detach the controller: release the lifecycle listener and stop
    /// reacting to transitions until re-entitlement.
    pub fn detach(&self) {
        let _ = self.triggers.send(Trigger::Detach);
    }

    /// Tear the controller down entirely, aborting the run loop.
    ///
    /// An episode already in flight is not cancelled; its outcome is simply
    /// not acted upon.
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.shared
            .log
            .add("sync controller shut down", LogLevel::Verbose);
    }
}

impl Drop for SyncLifecycleController {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

/// Builder for [`SyncLifecycleController`].
pub struct SyncLifecycleControllerBuilder {
    transport: Arc<SnapshotTransport>,
    gate: HydrationGate,
    entitled: Dynamic<bool>,
    lifecycle: Arc<dyn LifecycleEvents>,
    log: SyncLog,
    config: SyncControllerConfig,
}

impl SyncLifecycleControllerBuilder {
    /// Replace the whole configuration.
    pub fn with_config(mut self, config: SyncControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the hydration poll interval.
    pub fn with_hydration_poll_interval(mut self, interval: Duration) -> Self {
        self.config.hydration_poll_interval = interval;
        self
    }

    /// Set the entitlement poll interval.
    pub fn with_entitlement_poll_interval(mut self, interval: Duration) -> Self {
        self.config.entitlement_poll_interval = interval;
        self
    }

    /// Build the controller.
    pub fn build(self) -> SyncLifecycleController {
        let (sender, receiver) = mpsc::unbounded_channel();
        SyncLifecycleController {
            shared: Arc::new(ControllerShared {
                config: self.config,
                state: RwLock::new(ControllerState::Idle),
                health: RwLock::new(SyncHealth::default()),
                transport: self.transport,
                gate: self.gate,
                entitled: self.entitled,
                lifecycle: self.lifecycle,
                log: self.log,
            }),
            triggers: sender,
            trigger_source: Mutex::new(Some(receiver)),
            task: Mutex::new(None),
        }
    }
}

enum ArmedAction {
    Episode(&'static str),
    Detach,
    PublisherClosed,
    EntitlementCheck,
    Nothing,
}

async fn run(shared: Arc<ControllerShared>, mut triggers: mpsc::UnboundedReceiver<Trigger>) {
    let mut listener: Option<LifecycleHandle> = None;
    let mut publisher_closed = false;
    // Leaving Detached requires a re-entitlement edge: an explicit detach
    // while still entitled stays detached until entitlement is revoked and
    // granted again.
    let mut reentitle_ready = false;
    loop {
        match shared.state() {
            ControllerState::Idle => {
                if shared.entitled.get() {
                    shared.transition(
                        ControllerState::AwaitingHydration,
                        "sync entitled, awaiting store hydration",
                    );
                } else if drain_detach(&mut triggers) {
                    shared.transition(ControllerState::Detached, "detached before entitlement");
                    reentitle_ready = !shared.entitled.get();
                } else {
                    tokio::time::sleep(shared.config.entitlement_poll_interval).await;
                }
            }

            ControllerState::AwaitingHydration => {
                if !shared.entitled.get() || drain_detach(&mut triggers) {
                    shared.transition(ControllerState::Detached, "sync detached before arming");
                    reentitle_ready = !shared.entitled.get();
                } else if shared.gate.is_complete() {
                    listener = Some(shared.lifecycle.subscribe());
                    publisher_closed = false;
                    shared.transition(
                        ControllerState::Armed,
                        "hydration complete, lifecycle listener attached",
                    );
                } else {
                    tokio::time::sleep(shared.config.hydration_poll_interval).await;
                }
            }

            ControllerState::Armed => {
                if listener.is_none() {
                    listener = Some(shared.lifecycle.subscribe());
                    publisher_closed = false;
                }
                // The select only decides what to do; acting happens after
                // the listener borrow ends.
                let action = if publisher_closed {
                    tokio::select! {
                        trigger = triggers.recv() => match trigger {
                            Some(Trigger::Manual) => ArmedAction::Episode("manual trigger"),
                            Some(Trigger::Detach) | None => ArmedAction::Detach,
                        },
                        _ = tokio::time::sleep(shared.config.entitlement_poll_interval) => {
                            ArmedAction::EntitlementCheck
                        }
                    }
                } else {
                    let Some(active) = listener.as_mut() else {
                        continue;
                    };
                    tokio::select! {
                        event = active.next() => match event {
                            Some(AppState::Foreground) => {
                                ArmedAction::Episode("entered foreground")
                            }
                            // Background/inactive transitions do not qualify.
                            Some(_) => ArmedAction::Nothing,
                            None => ArmedAction::PublisherClosed,
                        },
                        trigger = triggers.recv() => match trigger {
                            Some(Trigger::Manual) => ArmedAction::Episode("manual trigger"),
                            Some(Trigger::Detach) | None => ArmedAction::Detach,
                        },
                        _ = tokio::time::sleep(shared.config.entitlement_poll_interval) => {
                            ArmedAction::EntitlementCheck
                        }
                    }
                };
                match action {
                    ArmedAction::Episode(reason) => {
                        run_episode(&shared, reason).await;
                        if finish_episode(&shared, listener.as_mut(), &mut triggers) {
                            detach(&shared, &mut listener);
                            reentitle_ready = !shared.entitled.get();
                        }
                    }
                    ArmedAction::Detach => {
                        detach(&shared, &mut listener);
                        reentitle_ready = !shared.entitled.get();
                    }
                    ArmedAction::PublisherClosed => {
                        publisher_closed = true;
                        shared.log.add(
                            "lifecycle publisher closed; only manual triggers remain",
                            LogLevel::Warning,
                        );
                    }
                    ArmedAction::EntitlementCheck => {
                        if !shared.entitled.get() {
                            detach(&shared, &mut listener);
                            reentitle_ready = true;
                        }
                    }
                    ArmedAction::Nothing => {}
                }
            }

            // The run loop only observes Syncing transiently; episodes run
            // inline above.
            ControllerState::Syncing => {
                tokio::time::sleep(shared.config.hydration_poll_interval).await;
            }

            ControllerState::Detached => {
                if !shared.entitled.get() {
                    reentitle_ready = true;
                    let _ = drain_detach(&mut triggers);
                    tokio::time::sleep(shared.config.entitlement_poll_interval).await;
                } else if reentitle_ready {
                    reentitle_ready = false;
                    shared.transition(
                        ControllerState::AwaitingHydration,
                        "re-entitled, awaiting store hydration",
                    );
                } else {
                    let _ = drain_detach(&mut triggers);
                    tokio::time::sleep(shared.config.entitlement_poll_interval).await;
                }
            }
        }
    }
}

/// Drain pending triggers without blocking; report whether a detach request
/// was among them.
fn drain_detach(triggers: &mut mpsc::UnboundedReceiver<Trigger>) -> bool {
    let mut detach_requested = false;
    while let Ok(trigger) = triggers.try_recv() {
        if matches!(trigger, Trigger::Detach) {
            detach_requested = true;
        }
    }
    detach_requested
}

/// Run one push-then-pull episode under the single-flight guard.
async fn run_episode(shared: &Arc<ControllerShared>, reason: &str) {
    {
        let mut state = shared.state.write();
        if *state != ControllerState::Armed {
            return;
        }
        *state = ControllerState::Syncing;
    }
    shared
        .log
        .add(format!("sync started: {reason}"), LogLevel::Info);

    let outcome = sync_cycle(shared).await;
    match outcome {
        Ok(()) => {
            let mut health = shared.health.write();
            health.last_error = None;
            health.consecutive_failures = 0;
            drop(health);
            shared.log.add("sync completed", LogLevel::Info);
        }
        Err(err) => {
            let mut health = shared.health.write();
            health.last_error = Some(err.to_string());
            health.consecutive_failures += 1;
            if err.is_unrecoverable() {
                health.unrecoverable = true;
            }
            drop(health);
            shared
                .log
                .add(format!("sync failed: {err}"), LogLevel::Error);
        }
    }

    let mut state = shared.state.write();
    if *state == ControllerState::Syncing {
        *state = ControllerState::Armed;
    }
}

async fn sync_cycle(shared: &Arc<ControllerShared>) -> satchel_core::Result<()> {
    shared.transport.push_snapshot().await?;
    shared.health.write().last_push_at = Some(Utc::now());
    shared.transport.pull_latest().await?;
    shared.health.write().last_pull_at = Some(Utc::now());
    Ok(())
}

/// Discard triggers that arrived while an episode was in flight; they are
/// coalesced into the episode that just ran. Returns true when a detach
/// request was among them.
fn finish_episode(
    shared: &Arc<ControllerShared>,
    listener: Option<&mut LifecycleHandle>,
    triggers: &mut mpsc::UnboundedReceiver<Trigger>,
) -> bool {
    let mut coalesced = 0usize;
    if let Some(listener) = listener {
        while listener.try_next().is_some() {
            coalesced += 1;
        }
    }
    let mut detach_requested = false;
    while let Ok(trigger) = triggers.try_recv() {
        match trigger {
            Trigger::Manual => coalesced += 1,
            Trigger::Detach => detach_requested = true,
        }
    }
    if coalesced > 0 {
        shared.log.add(
            format!("coalesced {coalesced} trigger(s) that arrived during the episode"),
            LogLevel::Verbose,
        );
    }
    detach_requested
}

fn detach(shared: &Arc<ControllerShared>, listener: &mut Option<LifecycleHandle>) {
    // Dropping the handle releases the listener; nothing can leak across
    // repeated arm/detach cycles.
    listener.take();
    shared.transition(
        ControllerState::Detached,
        "sync detached, lifecycle listener removed",
    );
}
