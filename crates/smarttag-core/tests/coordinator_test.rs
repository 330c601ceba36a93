#![allow(clippy::unwrap_used)]
// Behavior tests for `Coordinator` against a scripted in-memory portal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

use smarttag_core::{
    Availability, BusStatus, Coordinator, CoordinatorConfig, CoreError, Credentials,
    DiscoveredStudent, EntitySet, EntityUpdate, EntityValue, FailureKind, IntegrationState,
    Portal, PortalError, Ride, Session, Student, StudentId, spawn_entity_bridge,
};

// ── Fake portal ─────────────────────────────────────────────────────

#[derive(Clone)]
enum Behavior {
    Status(BusStatus),
    Network,
    Parse,
    Auth,
    /// Rejects the first session, accepts any renewed one.
    ExpiredUntilRenewed(BusStatus),
    AlwaysExpired,
    /// Signals `started`, then waits for `release`.
    Gated(BusStatus),
    /// Alternates between two internally consistent statuses.
    Alternating,
    /// Takes a moment, tracking how many fetches overlap.
    Slow(BusStatus),
    Hang,
}

#[derive(Default)]
struct FakePortal {
    behaviors: Mutex<HashMap<StudentId, Behavior>>,
    fetches: Mutex<Vec<StudentId>>,
    logins: AtomicU32,
    reject_logins: AtomicBool,
    flip: AtomicU32,
    in_flight: AtomicU32,
    peak_in_flight: AtomicU32,
    started: Notify,
    release: Notify,
}

impl FakePortal {
    fn set(&self, id: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(StudentId::from(id), behavior);
    }

    fn fetch_count(&self, id: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.as_str() == id)
            .count()
    }

    fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

#[async_trait]
impl Portal for FakePortal {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<Session, PortalError> {
        if self.reject_logins.load(Ordering::SeqCst) {
            return Err(PortalError::Auth("invalid email or password".into()));
        }
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Session::new(SecretString::from(format!("token-{n}")), None))
    }

    async fn fetch_status(
        &self,
        _session: &Session,
        student: &StudentId,
    ) -> Result<BusStatus, PortalError> {
        self.fetches.lock().unwrap().push(student.clone());
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(student)
            .cloned()
            .unwrap_or_else(|| Behavior::Status(BusStatus::no_rides(Utc::now())));

        match behavior {
            Behavior::Status(s) => Ok(s),
            Behavior::Network => Err(PortalError::Network("connection reset".into())),
            Behavior::Parse => Err(PortalError::Parse("missing field `busName`".into())),
            Behavior::Auth => Err(PortalError::Auth("access denied".into())),
            Behavior::ExpiredUntilRenewed(s) => {
                tokio::task::yield_now().await;
                if self.logins.load(Ordering::SeqCst) <= 1 {
                    Err(PortalError::SessionExpired)
                } else {
                    Ok(s)
                }
            }
            Behavior::AlwaysExpired => Err(PortalError::SessionExpired),
            Behavior::Gated(s) => {
                self.started.notify_one();
                self.release.notified().await;
                Ok(s)
            }
            Behavior::Alternating => {
                if self.flip.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                    Ok(status(true, "A", "Route A"))
                } else {
                    Ok(status(false, "B", "Route B"))
                }
            }
            Behavior::Slow(s) => {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(s)
            }
            Behavior::Hang => std::future::pending().await,
        }
    }

    async fn list_students(
        &self,
        _session: &Session,
    ) -> Result<Vec<DiscoveredStudent>, PortalError> {
        Ok(vec![DiscoveredStudent {
            id: "1001".into(),
            name: "Sam Rider".into(),
            grade: "4".into(),
            campus: "Elm".into(),
            external_id: "E-77".into(),
        }])
    }

    async fn list_rides(
        &self,
        _session: &Session,
        _student: &StudentId,
        _count: u32,
    ) -> Result<Vec<Ride>, PortalError> {
        let ride: Ride = serde_json::from_value(json!({
            "activityId": 1,
            "busName": "12",
            "friendlyRouteDisplay": "North",
            "routeId": 7,
            "embarkationDate": "09/02/2024 07:10:00",
            "disembarkationDate": "09/02/2024 07:30:00"
        }))
        .map_err(|e| PortalError::Parse(e.to_string()))?;
        Ok(vec![ride])
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn id(s: &str) -> StudentId {
    StudentId::from(s)
}

fn status(on_bus: bool, bus: &str, route: &str) -> BusStatus {
    BusStatus {
        on_bus,
        last_bus: Some(bus.into()),
        route: Some(route.into()),
        ..BusStatus::no_rides(Utc::now())
    }
}

fn credentials() -> Credentials {
    Credentials::new("parent@example.com", SecretString::from("hunter2".to_owned()))
}

fn config(students: &[(&str, bool)]) -> CoordinatorConfig {
    let mut config = CoordinatorConfig::new(credentials()).unwrap().with_students(
        students
            .iter()
            .map(|(sid, enabled)| Student::new(*sid, format!("Student {sid}")).with_enabled(*enabled))
            .collect(),
    );
    config.refresh_interval = Duration::ZERO;
    config
}

fn coordinator(fake: &Arc<FakePortal>, config: CoordinatorConfig) -> Coordinator {
    Coordinator::new(config, Arc::clone(fake) as Arc<dyn Portal>).unwrap()
}

// ── Polling eligibility ─────────────────────────────────────────────

#[tokio::test]
async fn test_disabled_students_are_never_fetched() {
    let fake = Arc::new(FakePortal::default());
    let coord = coordinator(&fake, config(&[("s1", true), ("s2", false), ("s3", true)]));

    for _ in 0..3 {
        coord.refresh().await.unwrap();
    }

    assert_eq!(fake.fetch_count("s1"), 3);
    assert_eq!(fake.fetch_count("s2"), 0);
    assert_eq!(fake.fetch_count("s3"), 3);
    assert_eq!(
        coord.record(&id("s2")).unwrap().availability,
        Availability::Pending
    );
}

#[tokio::test]
async fn test_network_failure_is_isolated() {
    let fake = Arc::new(FakePortal::default());
    fake.set("a", Behavior::Network);
    fake.set("b", Behavior::Status(status(true, "12", "North")));
    let coord = coordinator(&fake, config(&[("a", true), ("b", true)]));

    let report = coord.refresh().await.unwrap();

    assert_eq!(report.succeeded, vec![id("b")]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, id("a"));
    assert_eq!(report.failed[0].1.kind, FailureKind::Network);
    assert_eq!(
        coord.record(&id("b")).unwrap().availability,
        Availability::Available
    );
    assert_eq!(coord.integration_state(), IntegrationState::Idle);
}

// ── Availability state machine ──────────────────────────────────────

#[tokio::test]
async fn test_three_failures_make_student_unavailable_until_success() {
    let fake = Arc::new(FakePortal::default());
    fake.set("s1", Behavior::Status(status(false, "12", "North")));
    let coord = coordinator(&fake, config(&[("s1", true)]));

    coord.refresh().await.unwrap();
    assert_eq!(
        coord.record(&id("s1")).unwrap().availability,
        Availability::Available
    );

    fake.set("s1", Behavior::Network);
    coord.refresh().await.unwrap();
    coord.refresh().await.unwrap();
    let record = coord.record(&id("s1")).unwrap();
    assert_eq!(record.availability, Availability::Stale);
    assert_eq!(record.consecutive_failures, 2);

    coord.refresh().await.unwrap();
    let record = coord.record(&id("s1")).unwrap();
    assert_eq!(record.availability, Availability::Unavailable);
    // stale-but-present
    assert_eq!(
        record.snapshot.as_ref().unwrap().last_bus.as_deref(),
        Some("12")
    );

    fake.set("s1", Behavior::Status(status(true, "14", "North")));
    coord.refresh().await.unwrap();
    let record = coord.record(&id("s1")).unwrap();
    assert_eq!(record.availability, Availability::Available);
    assert_eq!(record.consecutive_failures, 0);
    assert!(record.snapshot.as_ref().unwrap().on_bus);
}

#[tokio::test]
async fn test_parse_error_marks_unavailable_immediately() {
    let fake = Arc::new(FakePortal::default());
    fake.set("s1", Behavior::Parse);
    let coord = coordinator(&fake, config(&[("s1", true)]));

    let report = coord.refresh().await.unwrap();

    assert_eq!(report.failed[0].1.kind, FailureKind::Parse);
    assert_eq!(
        coord.record(&id("s1")).unwrap().availability,
        Availability::Unavailable
    );
    assert_eq!(fake.fetch_count("s1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_timeout_counts_as_network_error() {
    let fake = Arc::new(FakePortal::default());
    fake.set("slow", Behavior::Hang);
    let coord = coordinator(&fake, config(&[("slow", true), ("fast", true)]));

    let report = coord.refresh().await.unwrap();

    assert_eq!(report.succeeded, vec![id("fast")]);
    assert_eq!(report.failed[0].0, id("slow"));
    assert_eq!(report.failed[0].1.kind, FailureKind::Network);
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_is_bounded() {
    let fake = Arc::new(FakePortal::default());
    let ids: Vec<String> = (1..=8).map(|n| format!("s{n}")).collect();
    for sid in &ids {
        fake.set(sid, Behavior::Slow(status(false, "12", "North")));
    }
    let roster: Vec<(&str, bool)> = ids.iter().map(|sid| (sid.as_str(), true)).collect();
    let mut cfg = config(&roster);
    cfg.max_concurrent_fetches = 3;
    let coord = coordinator(&fake, cfg);

    let report = coord.refresh().await.unwrap();

    assert_eq!(report.succeeded.len(), 8);
    assert_eq!(fake.peak_in_flight.load(Ordering::SeqCst), 3);
    assert_eq!(fake.in_flight.load(Ordering::SeqCst), 0);
}

// ── Cycle boundaries ────────────────────────────────────────────────

#[tokio::test]
async fn test_mid_cycle_disable_keeps_in_flight_result() {
    let fake = Arc::new(FakePortal::default());
    fake.set("s1", Behavior::Gated(status(true, "12", "North")));
    let coord = coordinator(&fake, config(&[("s1", true)]));

    let cycle = tokio::spawn({
        let coord = coord.clone();
        async move { coord.refresh().await }
    });
    fake.started.notified().await;
    assert!(coord.set_enabled(&id("s1"), false).unwrap());
    fake.release.notify_one();

    let report = cycle.await.unwrap().unwrap();
    assert_eq!(report.succeeded, vec![id("s1")]);
    let record = coord.record(&id("s1")).unwrap();
    assert_eq!(
        record.snapshot.as_ref().unwrap().last_bus.as_deref(),
        Some("12")
    );

    coord.refresh().await.unwrap();
    assert_eq!(fake.fetch_count("s1"), 1);
}

#[tokio::test]
async fn test_one_notification_per_cycle() {
    let fake = Arc::new(FakePortal::default());
    let coord = coordinator(&fake, config(&[("s1", true), ("s2", true), ("s3", true)]));
    let mut updates = coord.subscribe();

    coord.refresh().await.unwrap();

    let snap = updates.changed().await.unwrap();
    assert_eq!(snap.cycle, 1);
    assert_eq!(snap.records.len(), 3);
    assert!(
        snap.records
            .iter()
            .all(|r| r.availability == Availability::Available)
    );
    assert!(
        tokio::time::timeout(Duration::from_millis(20), updates.changed())
            .await
            .is_err(),
        "a cycle must publish exactly once"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_snapshot_replacement_is_atomic() {
    let fake = Arc::new(FakePortal::default());
    fake.set("s1", Behavior::Alternating);
    let coord = coordinator(&fake, config(&[("s1", true)]));
    coord.refresh().await.unwrap();

    let writer = tokio::spawn({
        let coord = coord.clone();
        async move {
            for _ in 0..200 {
                coord.refresh().await.unwrap();
            }
        }
    });

    let reader = tokio::spawn({
        let coord = coord.clone();
        async move {
            for _ in 0..2000 {
                let record = coord.record(&id("s1")).unwrap();
                let snap = record.snapshot.as_ref().unwrap();
                let bus = snap.last_bus.as_deref().unwrap();
                let route = snap.route.as_deref().unwrap();
                if snap.on_bus {
                    assert_eq!((bus, route), ("A", "Route A"));
                } else {
                    assert_eq!((bus, route), ("B", "Route B"));
                }
                tokio::task::yield_now().await;
            }
        }
    });

    writer.await.unwrap();
    reader.await.unwrap();
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_on_bus_scenario_renders_entities() {
    let fake = Arc::new(FakePortal::default());
    fake.set("S1", Behavior::Status(status(true, "12", "North")));
    let coord = coordinator(&fake, config(&[("S1", true)]));
    let mut entities = EntitySet::new(Arc::clone(coord.registry()));

    coord.refresh().await.unwrap();
    entities.reconcile(&coord.snapshot());

    let presence = entities.get("S1_presence").unwrap().render();
    assert_eq!(presence.value, EntityValue::Bool(true));
    assert!(presence.available);

    let last_bus = entities.get("S1_last_bus").unwrap().render();
    assert_eq!(last_bus.value, EntityValue::Text("12".into()));
    assert_eq!(last_bus.attributes.get("route"), Some(&json!("North")));

    let switch = entities.get("S1_polling").unwrap().render();
    assert_eq!(switch.value, EntityValue::Bool(true));
}

#[tokio::test]
async fn test_auth_error_on_fifth_cycle_halts_polling() {
    let fake = Arc::new(FakePortal::default());
    fake.set("s1", Behavior::Status(status(true, "12", "North")));
    fake.set("s2", Behavior::Status(status(false, "7", "South")));
    let mut cfg = config(&[("s1", true), ("s2", true)]);
    cfg.max_concurrent_fetches = 1;
    let coord = coordinator(&fake, cfg);

    for _ in 0..4 {
        let report = coord.refresh().await.unwrap();
        assert!(!report.auth_failed);
    }
    assert_eq!(fake.total_fetches(), 8);

    fake.set("s1", Behavior::Auth);
    fake.set("s2", Behavior::Auth);
    let report = coord.refresh().await.unwrap();
    assert_eq!(report.cycle, 5);
    assert!(report.auth_failed);
    assert_eq!(report.skipped, vec![id("s2")]);
    assert_eq!(coord.integration_state(), IntegrationState::ReauthRequired);

    // prior snapshots retained
    let s1 = coord.record(&id("s1")).unwrap();
    let s2 = coord.record(&id("s2")).unwrap();
    assert_eq!(s1.snapshot.as_ref().unwrap().last_bus.as_deref(), Some("12"));
    assert_eq!(s2.snapshot.as_ref().unwrap().last_bus.as_deref(), Some("7"));
    assert_eq!(s2.availability, Availability::Available);

    // no further fetches until credentials are refreshed
    let fetched = fake.total_fetches();
    assert!(matches!(
        coord.refresh().await,
        Err(CoreError::AuthenticationFailed { .. })
    ));
    assert_eq!(fake.total_fetches(), fetched);

    fake.set("s1", Behavior::Status(status(false, "12", "North")));
    fake.set("s2", Behavior::Status(status(false, "7", "South")));
    coord.reauthenticate(credentials()).await.unwrap();
    assert_eq!(coord.integration_state(), IntegrationState::Idle);

    let report = coord.refresh().await.unwrap();
    assert_eq!(report.succeeded.len(), 2);
}

#[tokio::test]
async fn test_rejected_reauthentication_keeps_polling_halted() {
    let fake = Arc::new(FakePortal::default());
    fake.set("s1", Behavior::Auth);
    let coord = coordinator(&fake, config(&[("s1", true)]));
    coord.refresh().await.unwrap();
    assert_eq!(coord.integration_state(), IntegrationState::ReauthRequired);

    fake.reject_logins.store(true, Ordering::SeqCst);
    let result = coord.reauthenticate(credentials()).await;

    assert!(matches!(result, Err(CoreError::AuthenticationFailed { .. })));
    assert_eq!(coord.integration_state(), IntegrationState::ReauthRequired);
}

#[tokio::test]
async fn test_removal_deletes_entry_record_and_entities() {
    let fake = Arc::new(FakePortal::default());
    let coord = coordinator(&fake, config(&[("s1", true), ("s2", true)]));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let bridge = spawn_entity_bridge(&coord, tx, cancel.clone());

    for _ in 0..6 {
        assert!(matches!(rx.recv().await, Some(EntityUpdate::Added(_))));
    }

    coord.refresh().await.unwrap();
    let removed = coord.remove_student(&id("s1")).unwrap();
    assert_eq!(removed.id, id("s1"));

    assert!(!coord.registry().contains(&id("s1")));
    assert!(coord.record(&id("s1")).is_none());
    assert_eq!(coord.records().len(), 1);
    assert!(coord.snapshot().record(&id("s1")).is_none());

    let report = coord.refresh().await.unwrap();
    assert_eq!(report.polled, vec![id("s2")]);
    assert_eq!(fake.fetch_count("s1"), 1);

    let mut removed_ids = Vec::new();
    while removed_ids.len() < 3 {
        if let Some(EntityUpdate::Removed { unique_id, .. }) = rx.recv().await {
            removed_ids.push(unique_id);
        }
    }
    removed_ids.sort();
    assert_eq!(removed_ids, ["s1_last_bus", "s1_polling", "s1_presence"]);

    assert!(matches!(
        coord.remove_student(&id("s1")),
        Err(CoreError::StudentNotFound { .. })
    ));

    cancel.cancel();
    bridge.await.unwrap();
}

#[tokio::test]
async fn test_result_for_student_removed_mid_cycle_is_discarded() {
    let fake = Arc::new(FakePortal::default());
    fake.set("s1", Behavior::Gated(status(true, "12", "North")));
    let coord = coordinator(&fake, config(&[("s1", true)]));

    let cycle = tokio::spawn({
        let coord = coord.clone();
        async move { coord.refresh().await }
    });
    fake.started.notified().await;
    coord.remove_student(&id("s1")).unwrap();
    fake.release.notify_one();

    let report = cycle.await.unwrap().unwrap();
    assert_eq!(report.discarded, vec![id("s1")]);
    assert!(coord.record(&id("s1")).is_none());
    assert!(coord.snapshot().records.is_empty());
}

#[tokio::test]
async fn test_removal_publishes_without_waiting_for_a_cycle() {
    let fake = Arc::new(FakePortal::default());
    let coord = coordinator(&fake, config(&[("s1", true), ("s2", true)]));
    coord.refresh().await.unwrap();
    let mut updates = coord.subscribe();
    let version = coord.registry().version();

    coord.remove_student(&id("s1")).unwrap();

    let snap = updates.changed().await.unwrap();
    assert_eq!(snap.cycle, 1);
    assert!(snap.record(&id("s1")).is_none());
    assert!(snap.record(&id("s2")).is_some());
    assert_eq!(coord.registry().version(), version + 1);
}

// ── Sessions ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stale_session_is_renewed_once() {
    let fake = Arc::new(FakePortal::default());
    for sid in ["s1", "s2", "s3", "s4"] {
        fake.set(sid, Behavior::ExpiredUntilRenewed(status(false, "12", "North")));
    }
    let coord = coordinator(
        &fake,
        config(&[("s1", true), ("s2", true), ("s3", true), ("s4", true)]),
    );

    let report = coord.refresh().await.unwrap();

    assert_eq!(report.succeeded.len(), 4);
    // initial login + a single renewal
    assert_eq!(fake.logins.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_session_rejected_after_renewal_is_auth_error() {
    let fake = Arc::new(FakePortal::default());
    fake.set("s1", Behavior::AlwaysExpired);
    let coord = coordinator(&fake, config(&[("s1", true)]));

    let report = coord.refresh().await.unwrap();

    assert!(report.auth_failed);
    assert_eq!(fake.fetch_count("s1"), 2);
    assert_eq!(coord.integration_state(), IntegrationState::ReauthRequired);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_timer_drives_cycles_until_shutdown() {
    let fake = Arc::new(FakePortal::default());
    let mut cfg = config(&[("s1", true)]);
    cfg.refresh_interval = Duration::from_secs(60);
    let coord = coordinator(&fake, cfg);

    let first = coord.start().await.unwrap();
    assert_eq!(first.cycle, 1);
    assert_eq!(coord.integration_state(), IntegrationState::Running);

    tokio::time::sleep(Duration::from_secs(125)).await;
    assert!(coord.snapshot().cycle >= 3);

    coord.shutdown().await;
    assert_eq!(coord.integration_state(), IntegrationState::Stopped);
    assert!(matches!(
        coord.refresh().await,
        Err(CoreError::CoordinatorStopped)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_second_start_replaces_timer() {
    let fake = Arc::new(FakePortal::default());
    let mut cfg = config(&[("s1", true)]);
    cfg.refresh_interval = Duration::from_secs(60);
    let coord = coordinator(&fake, cfg);

    coord.start().await.unwrap();
    coord.start().await.unwrap();
    assert_eq!(coord.snapshot().cycle, 2);

    // one timer left, so one tick per interval
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(coord.snapshot().cycle, 3);

    tokio::time::timeout(Duration::from_secs(3600), coord.shutdown())
        .await
        .expect("shutdown completes after a repeated start");
    assert_eq!(coord.integration_state(), IntegrationState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_in_flight_cycle() {
    let fake = Arc::new(FakePortal::default());
    fake.set("s1", Behavior::Status(status(false, "12", "North")));
    let mut cfg = config(&[("s1", true)]);
    cfg.refresh_interval = Duration::from_secs(60);
    cfg.fetch_timeout = Duration::from_secs(600);
    let coord = coordinator(&fake, cfg);
    coord.start().await.unwrap();

    fake.set("s1", Behavior::Gated(status(true, "14", "North")));
    tokio::time::sleep(Duration::from_secs(61)).await;
    fake.started.notified().await;

    let shutdown = tokio::spawn({
        let coord = coord.clone();
        async move { coord.shutdown().await }
    });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!shutdown.is_finished(), "shutdown returned with a fetch in flight");

    fake.release.notify_one();
    shutdown.await.unwrap();

    let snap = coord.snapshot();
    assert_eq!(snap.cycle, 2);
    let record = snap.record(&id("s1")).unwrap();
    assert_eq!(
        record.snapshot.as_ref().unwrap().last_bus.as_deref(),
        Some("14")
    );
    assert_eq!(coord.integration_state(), IntegrationState::Stopped);
}

#[tokio::test]
async fn test_start_with_rejected_credentials_requires_reauth() {
    let fake = Arc::new(FakePortal::default());
    fake.reject_logins.store(true, Ordering::SeqCst);
    let coord = coordinator(&fake, config(&[("s1", true)]));

    let result = coord.start().await;

    assert!(matches!(result, Err(CoreError::AuthenticationFailed { .. })));
    assert_eq!(coord.integration_state(), IntegrationState::ReauthRequired);
    assert_eq!(fake.total_fetches(), 0);
}

// ── Roster ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_discover_and_add_student() {
    let fake = Arc::new(FakePortal::default());
    let coord = coordinator(&fake, config(&[]));

    let found = coord.discover_students().await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].label(), "Sam Rider (4) #E-77");

    assert!(coord.add_student(found[0].clone().into_student()));
    assert!(!coord.add_student(found[0].clone().into_student()));
    assert_eq!(
        coord.record(&id("1001")).unwrap().availability,
        Availability::Pending
    );

    let report = coord.refresh().await.unwrap();
    assert_eq!(report.succeeded, vec![id("1001")]);
}

#[tokio::test]
async fn test_routes_summarize_recent_rides() {
    let fake = Arc::new(FakePortal::default());
    let coord = coordinator(&fake, config(&[("s1", true)]));

    let routes = coord.routes(&id("s1")).await.unwrap();

    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].name, "North");
    assert!((routes[0].ride_minutes - 20.0).abs() < f64::EPSILON);
}
