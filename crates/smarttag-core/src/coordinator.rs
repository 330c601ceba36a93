// ── Poll coordinator ──
//
// One shared poll loop for every tracked student. Each cycle reads the
// enabled set once, fetches those students concurrently with bounded
// fan-out, folds every result into that student's record, and then
// publishes a single batch update. Per-student failures stay contained
// here; only rejected credentials escalate to the integration.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use futures_util::stream;
use serde::Serialize;
use smarttag_api::Credentials;
use strum::Display;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::CoreError;
use crate::model::{
    DiscoveredStudent, FailureKind, FetchError, PollResult, Student, StudentId, StudentRecord,
};
use crate::portal::{Portal, PortalError};
use crate::registry::Registry;
use crate::routes::{self, RouteWindow};
use crate::session::{SessionCell, SessionSlot};
use crate::store::{RecordStore, StateSnapshot};
use crate::stream::UpdateStream;

/// Rides pulled when estimating route windows.
const ROUTE_RIDE_COUNT: u32 = 50;

// ── IntegrationState ─────────────────────────────────────────────

/// Whole-integration state observable by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntegrationState {
    /// Constructed; manual refreshes allowed, no timer yet.
    Idle,
    /// Timer running.
    Running,
    /// Credentials were rejected. Polling is halted until
    /// [`Coordinator::reauthenticate`] succeeds.
    ReauthRequired,
    Stopped,
}

// ── CycleReport ──────────────────────────────────────────────────

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    /// Enabled students captured at the start of the cycle.
    pub polled: Vec<StudentId>,
    pub succeeded: Vec<StudentId>,
    pub failed: Vec<(StudentId, FetchError)>,
    /// Not fetched because the cycle halted on an auth failure.
    pub skipped: Vec<StudentId>,
    /// Fetched, but removed from the registry before the cycle ended.
    pub discarded: Vec<StudentId>,
    pub auth_failed: bool,
}

// ── Coordinator ──────────────────────────────────────────────────

/// Owns the poll cadence, the portal session, and per-student records.
///
/// Cheaply cloneable via `Arc<CoordinatorInner>`.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    portal: Arc<dyn Portal>,
    registry: Arc<Registry>,
    records: RecordStore,
    session: SessionCell,
    /// Replaced by `reauthenticate`.
    credentials: RwLock<Credentials>,
    state: watch::Sender<IntegrationState>,
    updates: watch::Sender<Arc<StateSnapshot>>,
    /// Completed cycle count. Holding the lock serializes cycles.
    cycle: Mutex<u64>,
    cancel: CancellationToken,
    /// Child token for the current run; replaced on restart.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    /// Create a coordinator. Does NOT poll -- call [`start()`](Self::start)
    /// or [`refresh()`](Self::refresh).
    pub fn new(config: CoordinatorConfig, portal: Arc<dyn Portal>) -> Result<Self, CoreError> {
        config.validate()?;

        let registry = Arc::new(Registry::from_students(config.students.clone()));
        let records = RecordStore::new();
        let initial = StateSnapshot {
            records: records.ordered(&registry.read()),
            ..StateSnapshot::default()
        };
        let (updates, _) = watch::channel(Arc::new(initial));
        let (state, _) = watch::channel(IntegrationState::Idle);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();
        let credentials = RwLock::new(config.credentials.clone());

        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                config,
                portal,
                registry,
                records,
                session: SessionCell::new(),
                credentials,
                state,
                updates,
                cycle: Mutex::new(0),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Authenticate, run a first cycle, and spawn the refresh timer.
    ///
    /// Calling this again replaces the running timer.
    pub async fn start(&self) -> Result<CycleReport, CoreError> {
        self.stop_timer().await;
        let child = self.inner.cancel.child_token();
        std::mem::replace(&mut *self.inner.cancel_child.lock().await, child.clone()).cancel();

        let credentials = self.credentials();
        if let Err(e) = self
            .inner
            .session
            .ensure(self.inner.portal.as_ref(), &credentials)
            .await
        {
            return Err(self.surface(e));
        }
        self.inner.state.send_replace(IntegrationState::Running);

        let report = self.refresh().await?;

        let interval = self.inner.config.refresh_interval;
        if !interval.is_zero() {
            let handle = tokio::spawn(refresh_task(self.clone(), interval, child));
            self.inner.task_handles.lock().await.push(handle);
        }

        info!(
            students = self.inner.registry.len(),
            interval_secs = interval.as_secs(),
            "coordinator started"
        );
        Ok(report)
    }

    /// Stop the timer and let any in-flight cycle drain.
    pub async fn shutdown(&self) {
        self.inner.cancel_child.lock().await.cancel();
        self.inner.state.send_replace(IntegrationState::Stopped);
        self.stop_timer().await;

        // A manual refresh may still hold the cycle lock.
        drop(self.inner.cycle.lock().await);
        self.inner.session.clear();
        info!("coordinator stopped");
    }

    /// Install new credentials after an auth failure.
    pub async fn reauthenticate(&self, credentials: Credentials) -> Result<(), CoreError> {
        if self.integration_state() == IntegrationState::Stopped {
            return Err(CoreError::CoordinatorStopped);
        }

        let session = self
            .inner
            .portal
            .authenticate(&credentials)
            .await
            .map_err(CoreError::from)?;

        *self
            .inner
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = credentials;
        self.inner.session.install(session).await;

        let timer_running = !self.inner.task_handles.lock().await.is_empty();
        self.inner.state.send_if_modified(|state| {
            if *state == IntegrationState::ReauthRequired {
                *state = if timer_running {
                    IntegrationState::Running
                } else {
                    IntegrationState::Idle
                };
                true
            } else {
                false
            }
        });
        info!("re-authenticated with the portal");
        Ok(())
    }

    // ── Polling ──────────────────────────────────────────────────

    /// Run one cycle now.
    ///
    /// Waits for any cycle already in progress. Per-student failures
    /// are reported in the [`CycleReport`]; an error is returned only
    /// when polling is halted.
    pub async fn refresh(&self) -> Result<CycleReport, CoreError> {
        self.check_pollable()?;
        let mut cycle = self.inner.cycle.lock().await;
        self.check_pollable()?;

        *cycle += 1;
        let n = *cycle;
        let polled = self.inner.registry.enabled_ids();
        debug!(cycle = n, students = polled.len(), "poll cycle starting");

        let results = self.poll_all(&polled).await;
        let report = self.commit(n, polled, results);

        debug!(
            cycle = n,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "poll cycle complete"
        );
        Ok(report)
    }

    async fn poll_all(&self, ids: &[StudentId]) -> Vec<(StudentId, Option<PollResult>)> {
        let halted = AtomicBool::new(false);
        let halted = &halted;

        let mut results: Vec<(usize, StudentId, Option<PollResult>)> =
            stream::iter(ids.iter().cloned().enumerate())
                .map(|(i, id)| async move {
                    if halted.load(Ordering::Acquire) {
                        return (i, id, None);
                    }
                    let result = self.fetch_one(&id).await;
                    if result.is_auth_failure() {
                        halted.store(true, Ordering::Release);
                    }
                    (i, id, Some(result))
                })
                .buffer_unordered(self.inner.config.max_concurrent_fetches)
                .collect()
                .await;

        results.sort_by_key(|(i, _, _)| *i);
        results
            .into_iter()
            .map(|(_, id, result)| (id, result))
            .collect()
    }

    async fn fetch_one(&self, id: &StudentId) -> PollResult {
        let timeout = self.inner.config.fetch_timeout;
        let fetch = self.with_session(|slot| async move {
            self.inner.portal.fetch_status(&slot.session, id).await
        });

        let result = match tokio::time::timeout(timeout, fetch).await {
            Ok(r) => r.map_err(PortalError::into_fetch_error),
            Err(_) => Err(FetchError::network(format!("timed out after {timeout:?}"))),
        };
        PollResult::from(result)
    }

    /// Fold a cycle's results into the store and publish once.
    fn commit(
        &self,
        cycle: u64,
        polled: Vec<StudentId>,
        results: Vec<(StudentId, Option<PollResult>)>,
    ) -> CycleReport {
        let threshold = self.inner.config.failure_threshold;
        let mut report = CycleReport {
            cycle,
            polled,
            ..CycleReport::default()
        };

        let records = {
            let students = self.inner.registry.read();
            self.inner.records.retain_registered(&students);

            for (id, result) in results {
                let Some(result) = result else {
                    report.skipped.push(id);
                    continue;
                };
                if !students.contains_key(&id) {
                    debug!(student = %id, "discarding result for removed student");
                    report.discarded.push(id);
                    continue;
                }

                match result.failure() {
                    None => report.succeeded.push(id.clone()),
                    Some(err) => {
                        log_failure(&id, err);
                        report.auth_failed |= err.kind == FailureKind::Auth;
                        report.failed.push((id.clone(), err.clone()));
                    }
                }

                self.inner.records.ensure(&id);
                if let Some(record) = self.inner.records.apply(&id, &result, threshold) {
                    if record.consecutive_failures == threshold
                        && result.failure().is_some_and(|e| e.kind == FailureKind::Network)
                    {
                        warn!(student = %id, threshold, "student unavailable after repeated failures");
                    }
                }
            }

            self.inner.records.ordered(&students)
        };

        if report.auth_failed {
            warn!(cycle, "portal rejected credentials; polling halted until re-authentication");
            self.inner.session.clear();
            self.inner.state.send_replace(IntegrationState::ReauthRequired);
        }

        self.inner.updates.send_modify(|snap| {
            *snap = Arc::new(StateSnapshot {
                cycle,
                completed_at: Some(Utc::now()),
                records,
            });
        });
        report
    }

    // ── Roster ───────────────────────────────────────────────────

    /// List the students linked to the account.
    pub async fn discover_students(&self) -> Result<Vec<DiscoveredStudent>, CoreError> {
        self.check_not_stopped()?;
        self.with_session(|slot| async move {
            self.inner.portal.list_students(&slot.session).await
        })
        .await
        .map_err(|e| self.surface(e))
    }

    /// Start tracking a student, or update it if already tracked.
    /// Returns `true` if the student is new. Takes effect next cycle.
    pub fn add_student(&self, student: Student) -> bool {
        let id = student.id.clone();
        let (is_new, records) = self.inner.registry.insert_then(student, |students| {
            self.inner.records.ensure(&id);
            self.inner.records.ordered(students)
        });
        self.publish_roster(records);

        if is_new {
            info!(student = %id, "student added");
        }
        is_new
    }

    /// Stop tracking a student. Its registry entry and record go
    /// together; a fetch still in flight for it is discarded.
    pub fn remove_student(&self, id: &StudentId) -> Result<Student, CoreError> {
        let (student, records) = self
            .inner
            .registry
            .remove_then(id, |students| {
                self.inner.records.remove(id);
                self.inner.records.ordered(students)
            })
            .ok_or_else(|| CoreError::not_found(id))?;
        self.publish_roster(records);

        info!(student = %id, "student removed");
        Ok(student)
    }

    /// Toggle polling for a student. Takes effect next cycle.
    pub fn set_enabled(&self, id: &StudentId, enabled: bool) -> Result<bool, CoreError> {
        self.inner.registry.set_enabled(id, enabled)
    }

    /// Estimate pickup and drop-off windows from recent rides.
    pub async fn routes(&self, id: &StudentId) -> Result<Vec<RouteWindow>, CoreError> {
        self.check_not_stopped()?;
        let rides = self
            .with_session(|slot| async move {
                self.inner
                    .portal
                    .list_rides(&slot.session, id, ROUTE_RIDE_COUNT)
                    .await
            })
            .await
            .map_err(|e| self.surface(e))?;
        Ok(routes::route_windows(&rides))
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Current record for a tracked student.
    pub fn record(&self, id: &StudentId) -> Option<Arc<StudentRecord>> {
        let students = self.inner.registry.read();
        if !students.contains_key(id) {
            return None;
        }
        self.inner.records.get(id)
    }

    /// Records for every tracked student, in registry order.
    pub fn records(&self) -> Vec<Arc<StudentRecord>> {
        self.inner.records.ordered(&self.inner.registry.read())
    }

    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        self.inner.updates.borrow().clone()
    }

    /// Batch updates, published once per cycle and on roster changes.
    pub fn subscribe(&self) -> UpdateStream {
        UpdateStream::new(self.inner.updates.subscribe())
    }

    pub fn integration_state(&self) -> IntegrationState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<IntegrationState> {
        self.inner.state.subscribe()
    }

    // ── Private helpers ──────────────────────────────────────────

    /// Cancel the current timer and wait for its in-flight cycle.
    async fn stop_timer(&self) {
        self.inner.cancel_child.lock().await.cancel();
        let handles: Vec<_> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn credentials(&self) -> Credentials {
        self.inner
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run `op` with the live session, renewing once if it went stale.
    async fn with_session<T, F, Fut>(&self, op: F) -> Result<T, PortalError>
    where
        F: Fn(Arc<SessionSlot>) -> Fut,
        Fut: Future<Output = Result<T, PortalError>>,
    {
        let credentials = self.credentials();
        let portal = self.inner.portal.as_ref();

        let slot = self.inner.session.ensure(portal, &credentials).await?;
        match op(Arc::clone(&slot)).await {
            Err(PortalError::SessionExpired) => {
                debug!(generation = slot.generation, "session rejected, renewing");
                let fresh = self.inner.session.renew(portal, &credentials, &slot).await?;
                op(fresh).await
            }
            other => other,
        }
    }

    /// Convert a portal error, flagging the integration on auth failure.
    fn surface(&self, err: PortalError) -> CoreError {
        if matches!(err, PortalError::Auth(_) | PortalError::SessionExpired) {
            self.inner.session.clear();
            self.inner.state.send_if_modified(|state| {
                let modified = *state != IntegrationState::Stopped
                    && *state != IntegrationState::ReauthRequired;
                if modified {
                    *state = IntegrationState::ReauthRequired;
                }
                modified
            });
        }
        err.into()
    }

    fn check_not_stopped(&self) -> Result<(), CoreError> {
        if self.integration_state() == IntegrationState::Stopped {
            return Err(CoreError::CoordinatorStopped);
        }
        Ok(())
    }

    fn check_pollable(&self) -> Result<(), CoreError> {
        match self.integration_state() {
            IntegrationState::Stopped => Err(CoreError::CoordinatorStopped),
            IntegrationState::ReauthRequired => Err(CoreError::AuthenticationFailed {
                message: "re-authentication required before polling can resume".into(),
            }),
            IntegrationState::Idle | IntegrationState::Running => Ok(()),
        }
    }

    fn publish_roster(&self, records: Vec<Arc<StudentRecord>>) {
        self.inner.updates.send_modify(|snap| {
            *snap = Arc::new(StateSnapshot {
                cycle: snap.cycle,
                completed_at: snap.completed_at,
                records,
            });
        });
    }
}

fn log_failure(id: &StudentId, err: &FetchError) {
    match err.kind {
        FailureKind::Auth => warn!(student = %id, error = %err.message, "credentials rejected"),
        FailureKind::Parse => warn!(student = %id, error = %err.message, "unreadable status"),
        FailureKind::Network => debug!(student = %id, error = %err.message, "transient fetch failure"),
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Periodically run a poll cycle.
async fn refresh_task(coordinator: Coordinator, interval: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = coordinator.refresh().await {
                    warn!(error = %e, "periodic refresh skipped");
                }
            }
        }
    }
}
