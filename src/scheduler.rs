//! Refresh scheduling
//!
//! Every watched map runs its own timer task. Maps sharing a remote source
//! must not refresh in lockstep, so every re-arm draws a random delay; a
//! tick that found the refresh lock taken backs off to a four times longer
//! window.

use crate::http::{fetch_http, FetchOutcome};
use crate::map::{Backend, Map};
use crate::poller::{poll_file, PollOutcome};
use crate::registry::EngineContext;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error};

/// Multiplier applied to the base delay after a lock collision
pub const LOCKED_BACKOFF: u32 = 4;

/// Longest delay ever armed, about thirty years
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Delay window `[b, 2b)` with `b = base`, or `b = 4 × base` when locked
///
/// Saturates at `Duration::MAX`.
pub fn jitter_window(base: Duration, locked: bool) -> (Duration, Duration) {
    let low = if locked {
        base.saturating_mul(LOCKED_BACKOFF)
    } else {
        base
    };
    (low, low.saturating_mul(2))
}

/// Draw the next delay from the jitter window with a given generator
pub fn jittered_delay_with<R: Rng + ?Sized>(rng: &mut R, base: Duration, locked: bool) -> Duration {
    let (low, high) = jitter_window(base, locked);
    let (low_secs, high_secs) = (low.as_secs_f64(), high.as_secs_f64());
    if low_secs >= high_secs {
        return low;
    }
    Duration::try_from_secs_f64(rng.gen_range(low_secs..high_secs)).unwrap_or(low)
}

/// Draw the next delay from the jitter window
pub fn jittered_delay(base: Duration, locked: bool) -> Duration {
    jittered_delay_with(&mut rand::thread_rng(), base, locked)
}

fn deadline_after(start: Instant, delay: Duration) -> Instant {
    start
        .checked_add(delay.min(FAR_FUTURE))
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Result of one refresh cycle of either kind
#[derive(Debug)]
pub enum RefreshOutcome {
    File(PollOutcome),
    Http(FetchOutcome),
    /// The blocking file task panicked or was cancelled
    Aborted,
}

impl RefreshOutcome {
    /// Whether the cycle was skipped because the refresh lock was held
    pub fn is_locked(&self) -> bool {
        match self {
            RefreshOutcome::File(outcome) => outcome.is_locked(),
            RefreshOutcome::Http(outcome) => outcome.is_locked(),
            RefreshOutcome::Aborted => false,
        }
    }
}

/// Run one refresh cycle for any kind of map
pub async fn refresh_map(map: &Arc<Map>, engine: &Arc<EngineContext>) -> RefreshOutcome {
    match map.backend() {
        Backend::File(_) => {
            let map = map.clone();
            let engine = engine.clone();
            let polled = tokio::task::spawn_blocking(move || match map.backend() {
                Backend::File(source) => Some(poll_file(&map, source, engine.verifier())),
                Backend::Http(_) => None,
            })
            .await;
            match polled {
                Ok(Some(outcome)) => RefreshOutcome::File(outcome),
                Ok(None) => RefreshOutcome::Aborted,
                Err(e) => {
                    error!("file refresh task failed: {}", e);
                    RefreshOutcome::Aborted
                }
            }
        }
        Backend::Http(source) => RefreshOutcome::Http(fetch_http(map, source, engine).await),
    }
}

/// Per-map timer loop
///
/// The next deadline is measured from the tick, so a slow cycle does not
/// push later ticks back; a cycle that found the refresh lock taken uses
/// the longer window. The loop ends when `shutdown` flips or its sender is
/// dropped.
pub async fn refresh_loop(
    map: Arc<Map>,
    engine: Arc<EngineContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let base = engine.config().map_timeout();
    let mut deadline = deadline_after(
        Instant::now(),
        jittered_delay(engine.config().initial_delay(), false),
    );

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(tag = %map.pool().tag(), "stop refreshing map");
                    break;
                }
                continue;
            }
            _ = tokio::time::sleep_until(deadline) => {}
        }

        let tick = Instant::now();
        let outcome = refresh_map(&map, &engine).await;

        let delay = jittered_delay(base, outcome.is_locked());
        deadline = deadline_after(tick, delay);
        debug!(tag = %map.pool().tag(), "next refresh of {} in {:.2?}", map.uri(), delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::list::{HostList, HostSet};
    use crate::map::{FileSource, MapLine, MapSlot};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_unlocked_window() {
        let mut rng = StdRng::seed_from_u64(7);
        let base = Duration::from_secs(60);
        for _ in 0..1000 {
            let delay = jittered_delay_with(&mut rng, base, false);
            assert!(delay >= base && delay < base * 2, "{:?}", delay);
        }
    }

    #[test]
    fn test_locked_window_is_longer() {
        let mut rng = StdRng::seed_from_u64(7);
        let base = Duration::from_secs(10);
        for _ in 0..1000 {
            let delay = jittered_delay_with(&mut rng, base, true);
            assert!(delay >= base * 4 && delay < base * 8, "{:?}", delay);
        }
    }

    #[test]
    fn test_zero_base() {
        assert_eq!(jittered_delay(Duration::ZERO, true), Duration::ZERO);
    }

    #[test]
    fn test_huge_base_saturates() {
        let base = Duration::from_secs(u64::MAX / 2);
        let (low, high) = jitter_window(base, true);
        assert_eq!(low, Duration::MAX);
        assert_eq!(high, Duration::MAX);
        assert_eq!(jittered_delay(base, true), Duration::MAX);

        let base = Duration::from_secs(10_000_000_000_000_000_000);
        let delay = jittered_delay(base, false);
        assert!(delay >= base);
    }

    #[test]
    fn test_deadline_is_capped() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, Duration::MAX), now + FAR_FUTURE);
        assert_eq!(
            deadline_after(now, Duration::from_secs(5)),
            now + Duration::from_secs(5)
        );
    }

    fn file_engine(map_timeout: f64, initial_delay: f64) -> Arc<EngineContext> {
        let config = EngineConfig {
            map_timeout,
            initial_delay,
            ..EngineConfig::default()
        };
        Arc::new(EngineContext::new(config).unwrap())
    }

    fn unseen_file_map(path: &Path) -> (Arc<Map>, MapSlot<HostSet>) {
        let slot = MapSlot::new();
        let line = MapLine::parse(path.to_str().unwrap()).unwrap();
        let backend = Backend::File(FileSource::new(path.to_path_buf(), None));
        let map = Map::new(3, line, None, backend, HostList, slot.clone());
        (Arc::new(map), slot)
    }

    #[tokio::test]
    async fn test_refresh_map_reports_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts");
        fs::write(&path, "example.com\n").unwrap();
        let (map, slot) = unseen_file_map(&path);
        let engine = file_engine(60.0, 1.0);

        let guard = map.lock().try_acquire().unwrap();
        assert!(refresh_map(&map, &engine).await.is_locked());
        assert!(slot.load().is_none());

        drop(guard);
        let outcome = refresh_map(&map, &engine).await;
        assert!(matches!(outcome, RefreshOutcome::File(PollOutcome::Reloaded)));
        assert!(slot.load().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_locked_tick_backs_off() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts");
        fs::write(&path, "example.com\n").unwrap();
        let (map, slot) = unseen_file_map(&path);
        let engine = file_engine(10.0, 1.0);
        let (tx, rx) = watch::channel(false);

        // First tick lands in [1s, 2s) and finds the lock taken
        let guard = map.lock().try_acquire().unwrap();
        let task = tokio::spawn(refresh_loop(map.clone(), engine, rx));
        tokio::time::sleep(Duration::from_secs(3)).await;
        drop(guard);
        assert!(slot.load().is_none());

        // An unlocked reschedule would have ticked before 22s
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(slot.load().is_none());

        // The locked one ticks between 41s and 82s
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(slot.load().unwrap().contains("example.com"));

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[test]
    fn test_window_bounds() {
        assert_eq!(
            jitter_window(Duration::from_secs(1), true),
            (Duration::from_secs(4), Duration::from_secs(8))
        );
    }
}
