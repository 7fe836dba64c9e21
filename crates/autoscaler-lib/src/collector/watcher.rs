//! Per-container stats watcher
//!
//! Reads a container's stats feed record by record, diffs consecutive
//! snapshots into a CPU percentage and publishes the result to the store.
//! A watcher never retries: when its stream ends or breaks it removes its own
//! registration and exits, and the reconciliation loop decides whether the
//! container should be watched again.

use super::frame::{decode_snapshot, extract_payload};
use super::store::{MetricsStore, Registration};
use super::StatsSource;
use crate::error::WatchError;
use crate::models::{ContainerUsage, StatSnapshot};
use crate::observability::ScalerMetrics;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How a watcher finished
#[derive(Debug)]
pub enum WatchExit {
    /// Stopped by eviction
    Stopped,
    /// Stream could not be opened, broke, closed or carried a corrupt record
    Failed(WatchError),
}

/// Streams stats for one container into the metrics store
pub struct StatsWatcher {
    registration: Registration,
    store: Arc<MetricsStore>,
    /// Baseline for the next CPU delta; `None` until the first record arrives
    last: Option<StatSnapshot>,
}

impl StatsWatcher {
    pub fn new(registration: Registration, store: Arc<MetricsStore>) -> Self {
        Self {
            registration,
            store,
            last: None,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.registration.container_id
    }

    /// Open the stream and consume it until a terminal condition, then
    /// remove this watcher from the store.
    pub async fn run(mut self, source: Arc<dyn StatsSource>) -> WatchExit {
        let container_id = self.registration.container_id.clone();

        let opened = tokio::select! {
            biased;
            _ = self.registration.stop.stopped() => None,
            opened = source.open(&container_id) => Some(opened),
        };

        let outcome = match opened {
            None => Ok(()),
            Some(Ok(reader)) => self.consume(reader).await,
            Some(Err(e)) => Err(WatchError::Connect(e)),
        };

        self.store
            .evict_registration(&container_id, self.registration.generation);

        match outcome {
            Ok(()) => {
                debug!(container_id = %container_id, "Watcher stopped");
                WatchExit::Stopped
            }
            Err(e) => {
                warn!(
                    event = "watcher_terminated",
                    container_id = %container_id,
                    reason = e.kind(),
                    error = %e,
                    "Watcher terminated"
                );
                ScalerMetrics::new().inc_watcher_terminations(e.kind());
                WatchExit::Failed(e)
            }
        }
    }

    /// Read records until stopped (`Ok`) or the stream fails (`Err`).
    ///
    /// The stop signal is raced against every read, so a stalled feed does
    /// not delay eviction.
    pub async fn consume<R>(&mut self, mut reader: R) -> Result<(), WatchError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = Vec::new();

        loop {
            if self.registration.stop.is_stopped() {
                return Ok(());
            }

            line.clear();
            let read = tokio::select! {
                biased;
                _ = self.registration.stop.stopped() => return Ok(()),
                read = reader.read_until(b'\n', &mut line) => read?,
            };

            if read == 0 {
                return Err(WatchError::Closed);
            }

            if let Some(usage) = self.handle_line(&line)? {
                self.store.set_metrics(
                    &self.registration.container_id,
                    usage.cpu_percent,
                    usage.memory_bytes,
                );
            }
        }
    }

    /// Process one raw record line.
    ///
    /// Control lines are skipped without touching the baseline. The first
    /// decoded snapshot only primes the baseline; later ones yield usage.
    pub fn handle_line(
        &mut self,
        line: impl AsRef<[u8]>,
    ) -> Result<Option<ContainerUsage>, serde_json::Error> {
        let Some(payload) = extract_payload(&line) else {
            return Ok(None);
        };

        let snapshot = decode_snapshot(payload)?;
        let usage = self.last.as_ref().map(|previous| ContainerUsage {
            cpu_percent: snapshot.cpu_percent_since(previous),
            memory_bytes: snapshot.memory_usage(),
        });
        self.last = Some(snapshot);

        Ok(usage)
    }

    /// Whether a baseline snapshot has been recorded
    pub fn is_primed(&self) -> bool {
        self.last.is_some()
    }
}

/// Spawn a watcher task for a fresh registration
pub fn spawn_watcher(
    registration: Registration,
    store: Arc<MetricsStore>,
    source: Arc<dyn StatsSource>,
) -> JoinHandle<WatchExit> {
    let watcher = StatsWatcher::new(registration, store);
    tokio::spawn(watcher.run(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{stats_line, FakeStats};
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, BufReader};

    fn watcher(store: &Arc<MetricsStore>, id: &str) -> StatsWatcher {
        let registration = store.upsert_watcher(id).unwrap();
        StatsWatcher::new(registration, store.clone())
    }

    #[test]
    fn test_first_snapshot_only_primes() {
        let store = Arc::new(MetricsStore::new());
        let mut w = watcher(&store, "abc");

        let first = w.handle_line(&stats_line(1_000, 10_000, 512)).unwrap();
        assert!(first.is_none());
        assert!(w.is_primed());

        let second = w.handle_line(&stats_line(1_500, 12_000, 768)).unwrap();
        assert_eq!(
            second,
            Some(ContainerUsage {
                cpu_percent: 25.0,
                memory_bytes: 768.0
            })
        );
    }

    #[test]
    fn test_control_lines_do_not_touch_baseline() {
        let store = Arc::new(MetricsStore::new());
        let mut w = watcher(&store, "abc");

        assert!(w.handle_line("1f4\r\n").unwrap().is_none());
        assert!(w.handle_line(&"z".repeat(150)).unwrap().is_none());
        assert!(!w.is_primed());

        w.handle_line(&stats_line(0, 0, 1)).unwrap();
        assert!(w.handle_line("\r\n").unwrap().is_none());
        let usage = w.handle_line(&stats_line(50, 100, 1)).unwrap().unwrap();
        assert_eq!(usage.cpu_percent, 50.0);
    }

    #[test]
    fn test_zero_system_delta_is_non_finite() {
        let store = Arc::new(MetricsStore::new());
        let mut w = watcher(&store, "abc");

        w.handle_line(&stats_line(100, 1_000, 1)).unwrap();
        let usage = w.handle_line(&stats_line(200, 1_000, 1)).unwrap().unwrap();
        assert!(!usage.cpu_percent.is_finite());
    }

    #[tokio::test]
    async fn test_consume_publishes_and_reports_eof() {
        let store = Arc::new(MetricsStore::new());
        let mut w = watcher(&store, "abc");

        let feed = tokio_test::io::Builder::new()
            .read(b"1f4\r\n")
            .read(stats_line(1_000, 10_000, 100).as_bytes())
            .read(b"\r\n")
            .read(stats_line(3_000, 14_000, 200).as_bytes())
            .build();

        let result = w.consume(BufReader::new(feed)).await;
        assert!(matches!(result, Err(WatchError::Closed)));

        let usage = store.snapshot().usage("abc").unwrap();
        assert_eq!(usage.cpu_percent, 50.0);
        assert_eq!(usage.memory_bytes, 200.0);
    }

    #[tokio::test]
    async fn test_consume_skips_short_non_utf8_lines() {
        let store = Arc::new(MetricsStore::new());
        let mut w = watcher(&store, "abc");

        let feed = tokio_test::io::Builder::new()
            .read(stats_line(1_000, 10_000, 100).as_bytes())
            .read(b"\xff\xfe\r\n")
            .read(stats_line(3_000, 14_000, 200).as_bytes())
            .build();

        let result = w.consume(BufReader::new(feed)).await;
        assert!(matches!(result, Err(WatchError::Closed)));

        let usage = store.snapshot().usage("abc").unwrap();
        assert_eq!(usage.cpu_percent, 50.0);
        assert_eq!(usage.memory_bytes, 200.0);
    }

    #[tokio::test]
    async fn test_consume_decode_error_is_terminal() {
        let store = Arc::new(MetricsStore::new());
        let mut w = watcher(&store, "abc");
        let corrupt = format!("data: {{\"cpu_stats\": {}\n", "[".repeat(120));

        let feed = tokio_test::io::Builder::new()
            .read(stats_line(1_000, 10_000, 100).as_bytes())
            .read(corrupt.as_bytes())
            .build();

        let result = w.consume(BufReader::new(feed)).await;
        assert!(matches!(result, Err(WatchError::Decode(_))));
    }

    #[tokio::test]
    async fn test_consume_read_error_is_terminal() {
        let store = Arc::new(MetricsStore::new());
        let mut w = watcher(&store, "abc");

        let feed = tokio_test::io::Builder::new()
            .read(stats_line(1_000, 10_000, 100).as_bytes())
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();

        let result = w.consume(BufReader::new(feed)).await;
        assert!(matches!(result, Err(WatchError::Read(_))));
    }

    #[tokio::test]
    async fn test_eviction_interrupts_stalled_stream() {
        let store = Arc::new(MetricsStore::new());
        let mut w = watcher(&store, "abc");
        let (mut tx, rx) = tokio::io::duplex(4096);

        tx.write_all(stats_line(1_000, 10_000, 100).as_bytes())
            .await
            .unwrap();

        let evictor = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                store.evict("abc");
            })
        };

        let result = tokio::time::timeout(Duration::from_secs(1), w.consume(BufReader::new(rx)))
            .await
            .expect("eviction should stop the watcher");
        assert!(result.is_ok());
        evictor.await.unwrap();
        drop(tx);
    }

    #[tokio::test]
    async fn test_run_self_evicts_on_stream_end() {
        let store = Arc::new(MetricsStore::new());
        let source = Arc::new(FakeStats::new());
        source.set_feed(
            "abc",
            format!(
                "{}{}",
                stats_line(1_000, 10_000, 100),
                stats_line(2_000, 12_000, 100)
            ),
        );

        let registration = store.upsert_watcher("abc").unwrap();
        let exit = spawn_watcher(registration, store.clone(), source)
            .await
            .unwrap();

        assert!(matches!(exit, WatchExit::Failed(WatchError::Closed)));
        assert!(!store.contains("abc"));
        assert!(store.snapshot().usage("abc").is_none());
    }

    #[tokio::test]
    async fn test_run_connect_failure_self_evicts() {
        let store = Arc::new(MetricsStore::new());
        let source = Arc::new(FakeStats::new());

        let registration = store.upsert_watcher("missing").unwrap();
        let exit = StatsWatcher::new(registration, store.clone())
            .run(source)
            .await;

        assert!(matches!(exit, WatchExit::Failed(WatchError::Connect(_))));
        assert!(store.is_empty());
    }
}
