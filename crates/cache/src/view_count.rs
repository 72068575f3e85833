use crate::error::Result;
use crate::job_runner::{JobHandle, JobRunner, PruneJob};
use chrono::Utc;
use common::CacheConfig;
use faststr::FastStr;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// viewer -> object -> epoch seconds of the last counted view
pub type ViewState = HashMap<FastStr, HashMap<FastStr, f64>>;

/// Wall-clock seconds anchored once and advanced by the monotonic clock, so
/// system clock jumps never reorder views.
#[derive(Debug, Clone, Copy)]
struct Clock {
    anchor:       Instant,
    anchor_epoch: f64,
}

impl Clock {
    fn new() -> Self {
        Self {
            anchor:       Instant::now(),
            anchor_epoch: Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }

    fn now_secs(&self) -> f64 {
        self.anchor_epoch + self.anchor.elapsed().as_secs_f64()
    }
}

struct ExpireViews {
    ttl:   f64,
    clock: Clock,
}

impl PruneJob<ViewState> for ExpireViews {
    fn name(&self) -> &'static str {
        "view-count-prune"
    }

    fn run(&self, state: &mut ViewState) -> Result<()> {
        let oldest_permitted = self.clock.now_secs() - self.ttl;
        let (entries, viewers) = prune_expired(state, oldest_permitted);
        debug!(
            entries,
            viewers,
            remaining = state.len(),
            "pruned expired views"
        );
        Ok(())
    }
}

/// Drops every view older than `oldest_permitted` and every viewer left
/// without views. Returns the number of removed entries and viewers.
fn prune_expired(state: &mut ViewState, oldest_permitted: f64) -> (usize, usize) {
    let viewers_before = state.len();
    let mut entries = 0;
    state.retain(|_, objects| {
        let before = objects.len();
        objects.retain(|_, ts| *ts >= oldest_permitted);
        entries += before - objects.len();
        !objects.is_empty()
    });
    (entries, viewers_before - state.len())
}

/// Deduplicates views so one viewer counts at most once per object per TTL
/// window. Clones share the same state.
#[derive(Clone)]
pub struct ViewCountCache {
    runner: JobRunner<ViewState>,
    ttl:    Duration,
    clock:  Clock,
}

impl ViewCountCache {
    pub fn new(ttl: Duration, prune_interval: Duration) -> Self {
        Self {
            runner: JobRunner::new(ViewState::new(), prune_interval),
            ttl,
            clock: Clock::new(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl, config.prune_interval)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Starts the background pruning job.
    pub fn start(&self) -> Result<JobHandle> {
        self.runner.start(self.pruner())
    }

    /// Records a view and reports whether it should be counted: `true` for the
    /// first view of `object_id` by `viewer_id`, or when the previous counted
    /// view is older than the TTL.
    pub async fn view(&self, viewer_id: impl Into<FastStr>, object_id: impl Into<FastStr>) -> bool {
        let viewer = viewer_id.into();
        let object = object_id.into();
        let ttl = self.ttl.as_secs_f64();
        let clock = self.clock;

        self.runner
            .access(move |state| {
                let bucket = state.entry(viewer).or_default();
                let now = clock.now_secs();
                let oldest_permitted = now - ttl;
                match bucket.get(&object) {
                    Some(ts) if *ts >= oldest_permitted => false,
                    _ => {
                        bucket.insert(object, now);
                        true
                    }
                }
            })
            .await
    }

    /// Epoch seconds of the last counted view, if still retained.
    pub async fn last_viewed(&self, viewer_id: &str, object_id: &str) -> Option<f64> {
        self.runner
            .access(|state| {
                state
                    .get(viewer_id)
                    .and_then(|objects| objects.get(object_id))
                    .copied()
            })
            .await
    }

    pub async fn viewer_count(&self) -> usize {
        self.runner.access(|state| state.len()).await
    }

    pub async fn entry_count(&self) -> usize {
        self.runner
            .access(|state| state.values().map(HashMap::len).sum())
            .await
    }

    /// Runs one pruning pass immediately.
    pub async fn prune_now(&self) -> Result<()> {
        self.runner.run_now(&self.pruner()).await
    }

    fn pruner(&self) -> ExpireViews {
        ExpireViews {
            ttl:   self.ttl.as_secs_f64(),
            clock: self.clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    const IP: &str = "1.2.3.4";
    const THREAD: &str = "thread-9";

    #[tokio::test(start_paused = true)]
    async fn counts_again_only_after_ttl() {
        let cache = ViewCountCache::new(Duration::from_secs(60), Duration::from_secs(600));

        assert!(cache.view(IP, THREAD).await);
        time::advance(Duration::from_secs(30)).await;
        assert!(!cache.view(IP, THREAD).await);
        time::advance(Duration::from_secs(31)).await;
        assert!(cache.view(IP, THREAD).await);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_view_leaves_timestamp_untouched() {
        let cache = ViewCountCache::new(Duration::from_secs(60), Duration::from_secs(600));

        assert!(cache.view(IP, THREAD).await);
        let first = cache.last_viewed(IP, THREAD).await.unwrap();
        time::advance(Duration::from_secs(59)).await;
        assert!(!cache.view(IP, THREAD).await);
        assert_eq!(cache.last_viewed(IP, THREAD).await, Some(first));

        // the window is measured from the counted view, not the latest one
        time::advance(Duration::from_secs(2)).await;
        assert!(cache.view(IP, THREAD).await);
        assert!(cache.last_viewed(IP, THREAD).await.unwrap() > first);
    }

    #[tokio::test]
    async fn viewers_and_objects_are_independent() {
        let cache = ViewCountCache::new(Duration::from_secs(60), Duration::from_secs(600));

        assert!(cache.view(IP, THREAD).await);
        assert!(cache.view(IP, "thread-10").await);
        assert!(cache.view("5.6.7.8", THREAD).await);
        assert!(!cache.view(IP, "thread-10").await);
        assert_eq!(cache.viewer_count().await, 2);
        assert_eq!(cache.entry_count().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn background_prune_drops_expired_views() {
        let cache = ViewCountCache::new(Duration::from_secs(5), Duration::from_secs(10));
        let mut handle = cache.start().unwrap();

        assert!(cache.view(IP, THREAD).await);
        time::sleep(Duration::from_secs(12)).await;

        assert_eq!(cache.last_viewed(IP, THREAD).await, None);
        assert_eq!(cache.viewer_count().await, 0);
        assert!(cache.view(IP, THREAD).await);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn prune_keeps_fresh_views_and_their_viewer() {
        let cache = ViewCountCache::new(Duration::from_secs(60), Duration::from_secs(600));

        assert!(cache.view(IP, "old").await);
        assert!(cache.view("5.6.7.8", "old").await);
        time::advance(Duration::from_secs(50)).await;
        assert!(cache.view(IP, "fresh").await);
        time::advance(Duration::from_secs(20)).await;

        cache.prune_now().await.unwrap();
        assert_eq!(cache.viewer_count().await, 1);
        assert_eq!(cache.entry_count().await, 1);
        assert!(cache.last_viewed(IP, "fresh").await.is_some());
        assert!(cache.last_viewed(IP, "old").await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_views_count_once() {
        let cache = ViewCountCache::new(Duration::from_secs(60), Duration::from_secs(600));
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move { cache.view(IP, THREAD).await }));
        }

        let mut counted = 0;
        for task in tasks {
            if task.await.unwrap() {
                counted += 1;
            }
        }
        assert_eq!(counted, 1);
    }

    #[test]
    fn prune_expired_counts_removals() {
        let mut state = ViewState::new();
        state.entry("a".into()).or_default().insert("x".into(), 10.0);
        state.entry("a".into()).or_default().insert("y".into(), 100.0);
        state.entry("b".into()).or_default().insert("x".into(), 20.0);

        assert_eq!(prune_expired(&mut state, 50.0), (2, 1));
        assert_eq!(state.len(), 1);
        assert_eq!(state["a"].len(), 1);
        // entries exactly at the cutoff survive
        assert_eq!(prune_expired(&mut state, 100.0), (0, 0));
    }
}
