#[cfg(test)]
mod tests {
    use super::super::coordinator::*;
    use super::super::store::PredictionCache;
    use async_trait::async_trait;
    use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
    use prediction_core::{
        format_timestamp, Bar, Direction, FetchError, HistoricalSeriesProvider, PredictionSet,
        PredictionStrategy, SymbolPrediction,
    };
    use prediction_engine::{ClassifierStrategy, ForestParams, HeuristicStrategy};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Clone)]
    enum Reply {
        Bars(Vec<f64>),
        Fail,
        Hang,
    }

    struct MockProvider {
        replies: HashMap<String, Reply>,
        calls: AtomicUsize,
    }

    impl MockProvider {
        fn new(replies: &[(&str, Reply)]) -> Arc<Self> {
            Arc::new(Self {
                replies: replies
                    .iter()
                    .map(|(s, r)| (s.to_string(), r.clone()))
                    .collect(),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        let start = Utc::now() - Duration::days(closes.len() as i64);
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 500_000,
            })
            .collect()
    }

    #[async_trait]
    impl HistoricalSeriesProvider for MockProvider {
        async fn fetch_daily_bars(
            &self,
            symbol: &str,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<Bar>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(symbol) {
                Some(Reply::Bars(closes)) => Ok(bars_from_closes(closes)),
                Some(Reply::Hang) => {
                    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                    Ok(Vec::new())
                }
                Some(Reply::Fail) | None => {
                    Err(FetchError::Network(format!("connection refused for {symbol}")))
                }
            }
        }
    }

    /// 20 closes averaging 100, last close 110
    fn up_series() -> Vec<f64> {
        let mut closes = vec![99.5; 18];
        closes.push(99.0);
        closes.push(110.0);
        closes
    }

    fn down_series() -> Vec<f64> {
        vec![120.0, 118.0, 115.0, 112.0, 104.0, 101.0, 96.0]
    }

    fn config(universe: &[&str]) -> RefreshConfig {
        RefreshConfig {
            universe: universe.iter().map(|s| s.to_string()).collect(),
            fetch_timeout: std::time::Duration::from_millis(100),
            ..RefreshConfig::default()
        }
    }

    fn coordinator_with(
        dir: &TempDir,
        provider: Arc<MockProvider>,
        strategy: Arc<dyn PredictionStrategy>,
        universe: &[&str],
    ) -> CacheRefreshCoordinator {
        CacheRefreshCoordinator::new(
            PredictionCache::new(dir.path().join("cache.json")),
            provider,
            strategy,
            config(universe),
        )
    }

    fn heuristic() -> Arc<dyn PredictionStrategy> {
        Arc::new(HeuristicStrategy::new())
    }

    fn assert_fallback_ranges(p: &SymbolPrediction) {
        assert!(matches!(p.direction, Direction::Up | Direction::Down));
        assert!((0.6..=0.95).contains(&p.confidence), "confidence {}", p.confidence);
        assert!((0.7..=0.9).contains(&p.accuracy), "accuracy {}", p.accuracy);
    }

    fn computed_set(updated_at: chrono::NaiveDateTime) -> PredictionSet {
        let mut set = PredictionSet::empty(updated_at);
        set.last_updated = Some(format_timestamp(updated_at));
        set.predictions.insert(
            "AAPL".to_string(),
            SymbolPrediction {
                direction: Direction::Up,
                confidence: 0.8,
                accuracy: 0.75,
            },
        );
        set
    }

    // ── staleness ─────────────────────────────────────────────────────

    #[test]
    fn test_never_computed_is_stale() {
        let now = Utc::now().naive_utc();
        let mut set = PredictionSet::empty(now);
        assert_eq!(staleness(&set, now, Duration::hours(6)), Some(StaleReason::NeverComputed));

        // Predictions without a timestamp still count as never computed
        set.predictions = computed_set(now).predictions;
        assert_eq!(staleness(&set, now, Duration::hours(6)), Some(StaleReason::NeverComputed));
    }

    #[test]
    fn test_empty_predictions_are_stale() {
        let now = Utc::now().naive_utc();
        let mut set = computed_set(now);
        set.predictions.clear();
        assert_eq!(staleness(&set, now, Duration::hours(6)), Some(StaleReason::NoPredictions));
    }

    #[test]
    fn test_unparseable_timestamp_is_stale() {
        let now = Utc::now().naive_utc();
        let mut set = computed_set(now);
        set.last_updated = Some("2024-03-01T09:30:00Z".to_string());
        assert!(matches!(
            staleness(&set, now, Duration::hours(6)),
            Some(StaleReason::UnparseableTimestamp(_))
        ));
    }

    #[test]
    fn test_seven_hours_old_is_stale() {
        let now = Utc::now().naive_utc();
        let set = computed_set(now - Duration::hours(7));
        assert!(matches!(
            staleness(&set, now, Duration::hours(6)),
            Some(StaleReason::Expired { .. })
        ));
    }

    #[test]
    fn test_one_hour_old_is_fresh() {
        let now = Utc::now().naive_utc();
        let set = computed_set(now - Duration::hours(1));
        assert_eq!(staleness(&set, now, Duration::hours(6)), None);
    }

    #[test]
    fn test_time_to_live_counts_down_to_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[]);
        let coordinator = coordinator_with(&dir, provider, heuristic(), &["AAPL"]);
        let now = Utc::now().naive_utc();

        let ttl = coordinator
            .time_to_live(&computed_set(now - Duration::hours(1)))
            .unwrap();
        assert!(ttl <= Duration::hours(5) && ttl > Duration::hours(5) - Duration::minutes(1));

        assert!(coordinator
            .time_to_live(&computed_set(now - Duration::hours(7)))
            .is_none());
        assert!(coordinator.time_to_live(&PredictionSet::empty(now)).is_none());
    }

    // ── refresh ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_last_close_above_mean_predicts_up() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[("AAPL", Reply::Bars(up_series()))]);
        let coordinator = coordinator_with(&dir, provider, heuristic(), &["AAPL"]);

        let set = coordinator.refresh_now().await;
        assert_eq!(set.predictions["AAPL"].direction, Direction::Up);
        assert_eq!(set.performance.total_predictions, 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[("AAPL", Reply::Fail)]);
        let coordinator = coordinator_with(&dir, provider.clone(), heuristic(), &["AAPL"]);

        let set = coordinator.refresh_now().await;
        assert_fallback_ranges(&set.predictions["AAPL"]);
        // One bounded retry before giving up
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_history_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[("AAPL", Reply::Bars(Vec::new()))]);
        let coordinator = coordinator_with(&dir, provider, heuristic(), &["AAPL"]);

        let set = coordinator.refresh_now().await;
        assert_fallback_ranges(&set.predictions["AAPL"]);
    }

    #[tokio::test]
    async fn test_fetch_timeout_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[("AAPL", Reply::Hang), ("MSFT", Reply::Bars(up_series()))]);
        let coordinator = coordinator_with(&dir, provider.clone(), heuristic(), &["AAPL", "MSFT"]);

        let set = coordinator.refresh_now().await;
        assert_fallback_ranges(&set.predictions["AAPL"]);
        assert_eq!(set.predictions["MSFT"].direction, Direction::Up);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_unbounded_retry_setting_still_fetches_once() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[("AAPL", Reply::Bars(up_series()))]);
        let coordinator = CacheRefreshCoordinator::new(
            PredictionCache::new(dir.path().join("cache.json")),
            provider.clone(),
            heuristic(),
            RefreshConfig {
                fetch_retries: u32::MAX,
                ..config(&["AAPL"])
            },
        );

        let set = coordinator.refresh_now().await;
        assert_eq!(set.predictions["AAPL"].direction, Direction::Up);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_classifier_data_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[("AAPL", Reply::Bars(up_series()))]);
        let strategy: Arc<dyn PredictionStrategy> =
            Arc::new(ClassifierStrategy::new(ForestParams::default()));
        let coordinator = coordinator_with(&dir, provider, strategy, &["AAPL"]);

        let set = coordinator.refresh_now().await;
        assert_fallback_ranges(&set.predictions["AAPL"]);
    }

    #[tokio::test]
    async fn test_every_symbol_gets_an_entry() {
        let dir = tempfile::tempdir().unwrap();
        let universe = ["AAPL", "MSFT", "NVDA", "GOOGL", "AMZN"];
        let provider = MockProvider::new(&[
            ("AAPL", Reply::Bars(up_series())),
            ("MSFT", Reply::Fail),
            ("NVDA", Reply::Bars(down_series())),
            ("GOOGL", Reply::Bars(Vec::new())),
        ]);
        let coordinator = coordinator_with(&dir, provider, heuristic(), &universe);

        let set = coordinator.refresh_now().await;
        assert_eq!(set.predictions.len(), universe.len());
        for symbol in universe {
            let p = &set.predictions[symbol];
            assert!(matches!(p.direction, Direction::Up | Direction::Down));
            assert!((0.0..=1.0).contains(&p.confidence));
            assert!((0.0..=1.0).contains(&p.accuracy));
        }
        assert_eq!(set.predictions["NVDA"].direction, Direction::Down);
        assert_eq!(set.performance.total_predictions, universe.len());
    }

    #[tokio::test]
    async fn test_performance_averages_computed_accuracy() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[
            ("AAPL", Reply::Bars(up_series())),
            ("NVDA", Reply::Bars(down_series())),
            ("MSFT", Reply::Fail),
        ]);
        let coordinator = coordinator_with(&dir, provider, heuristic(), &["AAPL", "NVDA", "MSFT"]);

        let set = coordinator.refresh_now().await;
        let expected =
            (set.predictions["AAPL"].accuracy + set.predictions["NVDA"].accuracy) / 2.0;
        assert!((set.performance.accuracy - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_all_fallback_is_still_a_complete_set() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[]);
        let coordinator = coordinator_with(&dir, provider, heuristic(), &["AAPL", "MSFT"]);

        let set = coordinator.refresh_now().await;
        assert_eq!(set.predictions.len(), 2);
        assert!(set.last_updated.is_some());
        assert!((0.7..=0.9).contains(&set.performance.accuracy));
    }

    #[tokio::test]
    async fn test_refresh_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[
            ("AAPL", Reply::Bars(up_series())),
            ("NVDA", Reply::Bars(down_series())),
        ]);
        let coordinator = coordinator_with(&dir, provider, heuristic(), &["AAPL", "NVDA"]);

        let first = coordinator.refresh_now().await;
        let second = coordinator.refresh_now().await;
        for symbol in ["AAPL", "NVDA"] {
            assert_eq!(first.predictions[symbol].direction, second.predictions[symbol].direction);
            assert_eq!(first.predictions[symbol].accuracy, second.predictions[symbol].accuracy);
        }
    }

    #[tokio::test]
    async fn test_prediction_date_is_weekday() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[("AAPL", Reply::Bars(up_series()))]);
        let coordinator = coordinator_with(&dir, provider, heuristic(), &["AAPL"]);

        let set = coordinator.refresh_now().await;
        assert!(!matches!(set.prediction_date.weekday(), Weekday::Sat | Weekday::Sun));
        assert!(set.last_updated_at().is_some());
    }

    // ── get / persistence ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_get_refreshes_empty_cache_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[("AAPL", Reply::Bars(up_series()))]);
        let coordinator = coordinator_with(&dir, provider.clone(), heuristic(), &["AAPL"]);

        let served = coordinator.get_predictions().await;
        assert_eq!(provider.calls(), 1);
        assert_eq!(coordinator.cache().read(), served);
    }

    #[tokio::test]
    async fn test_get_serves_fresh_cache_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[("AAPL", Reply::Bars(up_series()))]);
        let coordinator = coordinator_with(&dir, provider.clone(), heuristic(), &["AAPL"]);

        let fresh = computed_set(Utc::now().naive_utc() - Duration::hours(1));
        coordinator.cache().write(&fresh);

        assert_eq!(coordinator.get_predictions().await, fresh);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_get_refreshes_expired_cache() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[("AAPL", Reply::Bars(down_series()))]);
        let coordinator = coordinator_with(&dir, provider.clone(), heuristic(), &["AAPL"]);

        coordinator
            .cache()
            .write(&computed_set(Utc::now().naive_utc() - Duration::hours(7)));

        let set = coordinator.get_predictions().await;
        assert_eq!(provider.calls(), 1);
        assert_eq!(set.predictions["AAPL"].direction, Direction::Down);
    }

    #[tokio::test]
    async fn test_concurrent_stale_reads_refresh_once() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[
            ("AAPL", Reply::Bars(up_series())),
            ("MSFT", Reply::Bars(down_series())),
        ]);
        let coordinator = coordinator_with(&dir, provider.clone(), heuristic(), &["AAPL", "MSFT"]);

        let (a, b) = tokio::join!(coordinator.get_predictions(), coordinator.get_predictions());
        assert_eq!(provider.calls(), 2);
        assert_eq!(a.predictions, b.predictions);
    }

    #[tokio::test]
    async fn test_upsert_keeps_other_symbols_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[("AAPL", Reply::Bars(up_series()))]);
        let coordinator = coordinator_with(&dir, provider, heuristic(), &["AAPL"]);

        let before = coordinator.refresh_now().await;
        let added = SymbolPrediction {
            direction: Direction::Down,
            confidence: 0.66,
            accuracy: 0.81,
        };
        coordinator.upsert_symbol_prediction("TSLA", added.clone()).await;

        let reread = PredictionCache::new(dir.path().join("cache.json")).read();
        assert_eq!(reread.predictions["TSLA"], added);
        assert_eq!(reread.predictions["AAPL"], before.predictions["AAPL"]);
        assert_eq!(reread.last_updated, before.last_updated);
    }

    #[tokio::test]
    async fn test_performance_stats_do_not_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(&[("AAPL", Reply::Bars(up_series()))]);
        let coordinator = coordinator_with(&dir, provider.clone(), heuristic(), &["AAPL"]);

        let stats = coordinator.performance_stats();
        assert_eq!(stats.accuracy, DEFAULT_ACCURACY);
        assert_eq!(stats.total_predictions, 1);
        assert_eq!(provider.calls(), 0);

        let set = coordinator.refresh_now().await;
        assert_eq!(coordinator.performance_stats(), set.performance);
        assert_eq!(provider.calls(), 1);
    }
}
