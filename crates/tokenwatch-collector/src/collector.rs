//! Collector: one query → derive → publish cycle.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use tokenwatch_metrics::{GaugeDesc, GaugeVec, PublishError, SnapshotStore};

use crate::derive::{self, Gauge};
use crate::error::CollectionError;
use crate::query::QUERIES;
use crate::scheduler::Job;
use crate::store::{Session, Store};

pub const TOKEN_COUNT: &str = "edumfa_token_count";
pub const USER_COUNT: &str = "edumfa_user_count";
pub const LAST_CYCLE_DURATION: &str = "tokenwatch_last_cycle_duration_seconds";
pub const LAST_CYCLE_TIMESTAMP: &str = "tokenwatch_last_cycle_timestamp_seconds";

pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_FAILURE: &str = "failure";

/// Gauge families published by the collector.
pub fn gauge_families() -> Vec<GaugeDesc> {
    vec![
        GaugeDesc::new(TOKEN_COUNT, "Number of tokens per token model.", "model"),
        GaugeDesc::new(USER_COUNT, "Number of token owners per enrollment state.", "state"),
        GaugeDesc::new(
            LAST_CYCLE_DURATION,
            "Duration of the last collection cycle per outcome.",
            "outcome",
        ),
        GaugeDesc::new(
            LAST_CYCLE_TIMESTAMP,
            "Unix time at which the last collection cycle per outcome ended.",
            "outcome",
        ),
    ]
}

/// Summary of a successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Number of gauge values written.
    pub published: usize,
}

/// Runs collection cycles against a [`Store`] and publishes the results.
pub struct Collector<S> {
    store: S,
    token_count: GaugeVec,
    user_count: GaugeVec,
    cycle_duration: GaugeVec,
    cycle_timestamp: GaugeVec,
    /// Held for the whole cycle; cycles never interleave.
    cycle_lock: Mutex<()>,
}

impl<S: Store> Collector<S> {
    /// Create a collector publishing into `metrics`.
    ///
    /// Fails if `metrics` was not built with [`gauge_families`].
    pub fn new(store: S, metrics: &Arc<SnapshotStore>) -> Result<Self, PublishError> {
        Ok(Self {
            store,
            token_count: metrics.gauge_vec(TOKEN_COUNT)?,
            user_count: metrics.gauge_vec(USER_COUNT)?,
            cycle_duration: metrics.gauge_vec(LAST_CYCLE_DURATION)?,
            cycle_timestamp: metrics.gauge_vec(LAST_CYCLE_TIMESTAMP)?,
            cycle_lock: Mutex::new(()),
        })
    }

    /// Run one cycle: open a session, run every query in order, publish
    /// each query's results before running the next one.
    ///
    /// The session is closed on every exit path.
    pub async fn collect(&self) -> Result<CycleReport, CollectionError> {
        let _guard = self.cycle_lock.lock().await;

        let mut session = self.store.open().await?;
        let result = self.run_queries(&mut session).await;
        session.close().await;
        result
    }

    async fn run_queries(&self, session: &mut S::Session) -> Result<CycleReport, CollectionError> {
        let mut published = 0;

        for query in &QUERIES {
            let rows = session.fetch(query).await?;
            let assignments =
                derive::derive(query.kind, &rows).map_err(|source| CollectionError::Decode {
                    query: query.name,
                    source,
                })?;

            for a in &assignments {
                let gauge = match a.gauge {
                    Gauge::TokenCount => &self.token_count,
                    Gauge::UserCount => &self.user_count,
                };
                gauge
                    .set(&a.label, a.value)
                    .await
                    .map_err(|source| CollectionError::Publish {
                        query: query.name,
                        source,
                    })?;
            }

            debug!(
                query = query.name,
                rows = rows.len(),
                published = assignments.len(),
                "query results published"
            );
            published += assignments.len();
        }

        Ok(CycleReport { published })
    }

    /// Run one cycle, log its outcome, and record the cycle self-metrics.
    ///
    /// Errors are returned for inspection but are already logged.
    pub async fn run_cycle(&self) -> Result<CycleReport, CollectionError> {
        debug!("collection cycle started");
        let started = Instant::now();
        let result = self.collect().await;
        let elapsed = started.elapsed();

        let outcome = match &result {
            Ok(report) => {
                debug!(
                    published = report.published,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "collection cycle finished"
                );
                OUTCOME_SUCCESS
            }
            Err(e) => {
                error!(
                    kind = e.kind(),
                    query = e.query().unwrap_or("-"),
                    error = %e,
                    "collection cycle failed"
                );
                OUTCOME_FAILURE
            }
        };

        if let Err(e) = self.record_cycle(outcome, elapsed.as_secs_f64()).await {
            warn!(error = %e, "recording cycle metrics failed");
        }

        result
    }

    async fn record_cycle(&self, outcome: &str, elapsed_secs: f64) -> Result<(), PublishError> {
        self.cycle_duration.set(outcome, elapsed_secs).await?;
        self.cycle_timestamp.set(outcome, epoch_secs()).await
    }
}

impl<S: Store> Job for Collector<S> {
    async fn run(&self) {
        let _ = self.run_cycle().await;
    }
}

fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use crate::query::Query;
    use crate::row::{RawRow, RawValue};
    use crate::test_support::LogBuffer;

    /// Scripted store: each query name maps to rows or a failure message.
    #[derive(Default)]
    struct FakeState {
        results: std::sync::Mutex<HashMap<&'static str, Result<Vec<RawRow>, String>>>,
        refuse_connections: AtomicBool,
        opened: AtomicUsize,
        closed: AtomicUsize,
        fetched: std::sync::Mutex<Vec<&'static str>>,
    }

    #[derive(Clone, Default)]
    struct FakeStore(Arc<FakeState>);

    impl FakeStore {
        fn set_rows(&self, query: &'static str, rows: Vec<RawRow>) {
            self.0.results.lock().unwrap().insert(query, Ok(rows));
        }

        fn fail(&self, query: &'static str, message: &str) {
            self.0
                .results
                .lock()
                .unwrap()
                .insert(query, Err(message.to_string()));
        }

        fn fetched(&self) -> Vec<&'static str> {
            self.0.fetched.lock().unwrap().clone()
        }
    }

    struct FakeSession(Arc<FakeState>);

    impl Store for FakeStore {
        type Session = FakeSession;

        async fn open(&self) -> Result<FakeSession, CollectionError> {
            if self.0.refuse_connections.load(Ordering::SeqCst) {
                return Err(CollectionError::Connection("connection refused".into()));
            }
            self.0.opened.fetch_add(1, Ordering::SeqCst);
            Ok(FakeSession(Arc::clone(&self.0)))
        }
    }

    impl Session for FakeSession {
        async fn fetch(&mut self, query: &Query) -> Result<Vec<RawRow>, CollectionError> {
            self.0.fetched.lock().unwrap().push(query.name);
            let result = self.0.results.lock().unwrap().get(query.name).cloned();
            match result {
                None => Ok(Vec::new()),
                Some(Ok(rows)) => Ok(rows),
                Some(Err(message)) => Err(CollectionError::Query {
                    query: query.name,
                    source: message.into(),
                }),
            }
        }

        async fn close(self) {
            self.0.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn token_row(token_type: &str, state: &str, key: &str, count: i64) -> RawRow {
        RawRow::new(vec![token_type.into(), state.into(), key.into(), count.into()])
    }

    fn count_row(count: i64) -> RawRow {
        RawRow::new(vec![RawValue::Int(count)])
    }

    fn setup() -> (FakeStore, Arc<SnapshotStore>, Collector<FakeStore>) {
        let fake = FakeStore::default();
        let metrics = Arc::new(SnapshotStore::new(gauge_families()));
        let collector = Collector::new(fake.clone(), &metrics).unwrap();
        (fake, metrics, collector)
    }

    fn seed(fake: &FakeStore) {
        fake.set_rows(
            "token_distribution",
            vec![
                token_row("otp", "", "", 3),
                token_row("otp", "verify", "", 2),
                token_row("hotp", "", "passkey", 5),
            ],
        );
        fake.set_rows("users_ok", vec![count_row(4)]);
        fake.set_rows("users_incomplete", vec![count_row(1)]);
    }

    #[tokio::test]
    async fn full_cycle_publishes_all_gauges() {
        let (fake, metrics, collector) = setup();
        seed(&fake);

        let report = collector.collect().await.unwrap();
        assert_eq!(report.published, 5);

        let snap = metrics.snapshot().await;
        assert_eq!(snap.get(TOKEN_COUNT, "otp"), Some(3.0));
        assert_eq!(snap.get(TOKEN_COUNT, "otp pending"), Some(2.0));
        assert_eq!(snap.get(TOKEN_COUNT, "passkey"), Some(5.0));
        assert_eq!(snap.get(USER_COUNT, "ok"), Some(4.0));
        assert_eq!(snap.get(USER_COUNT, "incomplete"), Some(1.0));
        assert_eq!(fake.fetched(), vec!["token_distribution", "users_ok", "users_incomplete"]);
    }

    #[tokio::test]
    async fn empty_user_queries_publish_zero() {
        let (_fake, metrics, collector) = setup();

        collector.collect().await.unwrap();

        let users = metrics.snapshot().await.values(USER_COUNT);
        assert_eq!(users.get("ok"), Some(&0.0));
        assert_eq!(users.get("incomplete"), Some(&0.0));
    }

    #[tokio::test]
    async fn repeated_cycles_are_idempotent() {
        let (fake, metrics, collector) = setup();
        seed(&fake);

        collector.collect().await.unwrap();
        let first = metrics.snapshot().await;
        collector.collect().await.unwrap();
        let second = metrics.snapshot().await;

        assert_eq!(first.samples, second.samples);
    }

    #[tokio::test]
    async fn query_failure_keeps_earlier_results_and_old_values() {
        let (fake, metrics, collector) = setup();
        seed(&fake);
        collector.collect().await.unwrap();

        // Next cycle: token counts change, then users_ok fails.
        fake.set_rows("token_distribution", vec![token_row("otp", "", "", 10)]);
        fake.set_rows("users_incomplete", vec![count_row(9)]);
        fake.fail("users_ok", "table tokenowner is locked");

        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, CollectionError::Query { query: "users_ok", .. }));
        assert_eq!(err.query(), Some("users_ok"));

        let snap = metrics.snapshot().await;
        // Published before the failure.
        assert_eq!(snap.get(TOKEN_COUNT, "otp"), Some(10.0));
        // Labels absent from the new rows keep their last value.
        assert_eq!(snap.get(TOKEN_COUNT, "passkey"), Some(5.0));
        // Queries after the failure never ran.
        assert_eq!(snap.get(USER_COUNT, "ok"), Some(4.0));
        assert_eq!(snap.get(USER_COUNT, "incomplete"), Some(1.0));
        assert_eq!(fake.0.closed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn decode_failure_publishes_nothing_from_that_query() {
        let (fake, metrics, collector) = setup();
        fake.set_rows(
            "token_distribution",
            vec![
                token_row("otp", "", "", 3),
                RawRow::new(vec!["broken".into(), RawValue::Int(1)]),
            ],
        );

        let err = collector.collect().await.unwrap_err();
        assert!(matches!(
            err,
            CollectionError::Decode {
                query: "token_distribution",
                ..
            }
        ));
        assert!(metrics.snapshot().await.values(TOKEN_COUNT).is_empty());
        assert_eq!(fake.fetched(), vec!["token_distribution"]);
        assert_eq!(fake.0.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connection_failure_leaves_snapshot_unchanged() {
        let (fake, metrics, collector) = setup();
        seed(&fake);
        collector.collect().await.unwrap();
        let before = metrics.snapshot().await;

        fake.0.refuse_connections.store(true, Ordering::SeqCst);
        seed(&fake);
        fake.set_rows("users_ok", vec![count_row(100)]);

        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, CollectionError::Connection(_)));
        assert_eq!(err.query(), None);
        assert_eq!(metrics.snapshot().await.samples, before.samples);
    }

    #[tokio::test]
    async fn every_opened_session_is_closed() {
        let (fake, _metrics, collector) = setup();
        seed(&fake);

        collector.collect().await.unwrap();
        fake.fail("token_distribution", "boom");
        collector.collect().await.unwrap_err();
        fake.set_rows("token_distribution", vec![RawRow::default()]);
        collector.collect().await.unwrap_err();

        assert_eq!(fake.0.opened.load(Ordering::SeqCst), 3);
        assert_eq!(fake.0.closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn run_cycle_records_outcome_metrics() {
        let (fake, metrics, collector) = setup();
        seed(&fake);
        collector.run_cycle().await.unwrap();

        fake.fail("users_incomplete", "gone");
        collector.run_cycle().await.unwrap_err();

        let snap = metrics.snapshot().await;
        let durations = snap.values(LAST_CYCLE_DURATION);
        assert!(durations.contains_key(OUTCOME_SUCCESS));
        assert!(durations.contains_key(OUTCOME_FAILURE));
        let stamps = snap.values(LAST_CYCLE_TIMESTAMP);
        assert!(stamps[OUTCOME_SUCCESS] > 0.0);
        assert!(stamps[OUTCOME_FAILURE] >= stamps[OUTCOME_SUCCESS]);
    }

    #[tokio::test]
    async fn collector_requires_registered_families() {
        let metrics = Arc::new(SnapshotStore::new(Vec::new()));
        assert!(Collector::new(FakeStore::default(), &metrics).is_err());
    }

    #[tokio::test]
    async fn run_cycle_logs_start_before_finish() {
        let (logs, _guard) = LogBuffer::capture();
        let (fake, _metrics, collector) = setup();
        seed(&fake);

        collector.run_cycle().await.unwrap();

        let out = logs.contents();
        let started = out.find("collection cycle started").expect("no start event");
        let finished = out.find("collection cycle finished").expect("no finish event");
        assert!(started < finished);
    }
}
