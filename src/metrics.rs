//! Request metrics and statistics tracking for the scoring service.

use crate::types::result::{CompositeResult, Decision, RiskBand};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept before the oldest half is dropped.
const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector for the scoring service
pub struct ScoringMetrics {
    /// Successful score requests
    pub scored: AtomicU64,
    /// Successful explanation requests
    pub explained: AtomicU64,
    /// Requests that ended in an error reply
    pub failed: AtomicU64,
    by_band: RwLock<HashMap<RiskBand, u64>>,
    by_decision: RwLock<HashMap<Decision, u64>>,
    failures_by_kind: RwLock<HashMap<&'static str, u64>>,
    /// Score latencies (in microseconds)
    score_latencies: RwLock<Vec<u64>>,
    /// Explanation latencies (in microseconds)
    explain_latencies: RwLock<Vec<u64>>,
    /// Composite score distribution buckets
    composite_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

fn push_latency(samples: &RwLock<Vec<u64>>, latency: Duration) {
    if let Ok(mut times) = samples.write() {
        times.push(latency.as_micros() as u64);
        if times.len() > LATENCY_WINDOW {
            times.drain(0..LATENCY_WINDOW / 2);
        }
    }
}

impl ScoringMetrics {
    pub fn new() -> Self {
        Self {
            scored: AtomicU64::new(0),
            explained: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            by_band: RwLock::new(HashMap::new()),
            by_decision: RwLock::new(HashMap::new()),
            failures_by_kind: RwLock::new(HashMap::new()),
            score_latencies: RwLock::new(Vec::with_capacity(1000)),
            explain_latencies: RwLock::new(Vec::with_capacity(1000)),
            composite_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successful score
    pub fn record_score(&self, latency: Duration, result: &CompositeResult) {
        self.scored.fetch_add(1, Ordering::Relaxed);
        push_latency(&self.score_latencies, latency);

        if let Ok(mut by_band) = self.by_band.write() {
            *by_band.entry(result.risk_band).or_insert(0) += 1;
        }
        if let Ok(mut by_decision) = self.by_decision.write() {
            *by_decision.entry(result.decision).or_insert(0) += 1;
        }

        let bucket = (result.composite_score * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.composite_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a successful explanation
    pub fn record_explanation(&self, latency: Duration) {
        self.explained.fetch_add(1, Ordering::Relaxed);
        push_latency(&self.explain_latencies, latency);
    }

    /// Record a failed request by error kind
    pub fn record_failure(&self, kind: &'static str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind).or_insert(0) += 1;
        }
    }

    pub fn score_latency(&self) -> LatencyStats {
        LatencyStats::from_samples(&self.score_latencies)
    }

    pub fn explain_latency(&self) -> LatencyStats {
        LatencyStats::from_samples(&self.explain_latencies)
    }

    /// Completed requests (successful or not) per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let total = self.scored.load(Ordering::Relaxed)
            + self.explained.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed);
        if elapsed > 0.0 {
            total as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_band_counts(&self) -> HashMap<RiskBand, u64> {
        self.by_band.read().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn get_decision_counts(&self) -> HashMap<Decision, u64> {
        self.by_decision.read().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn get_failure_counts(&self) -> HashMap<&'static str, u64> {
        self.failures_by_kind.read().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn get_composite_distribution(&self) -> [u64; 10] {
        self.composite_buckets.read().map(|b| *b).unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let scored = self.scored.load(Ordering::Relaxed);
        let explained = self.explained.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let score_latency = self.score_latency();
        let explain_latency = self.explain_latency();
        let band_counts = self.get_band_counts();
        let decision_counts = self.get_decision_counts();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            CREDIT SCORING SERVICE - METRICS SUMMARY          ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Scored: {:>8}  Explained: {:>8}  Failed: {:>8}        ║",
            scored, explained, failed
        );
        info!("║ Throughput: {:>8.1} req/s                                  ║", self.get_throughput());
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Score latency (μs):   mean={:>6} p50={:>6} p95={:>6} p99={:>6} ║",
            score_latency.mean_us, score_latency.p50_us, score_latency.p95_us, score_latency.p99_us
        );
        info!(
            "║ Explain latency (μs): mean={:>6} p50={:>6} p95={:>6} p99={:>6} ║",
            explain_latency.mean_us,
            explain_latency.p50_us,
            explain_latency.p95_us,
            explain_latency.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Risk Bands:                                                  ║");
        for band in RiskBand::ALL {
            let count = band_counts.get(&band).copied().unwrap_or(0);
            let pct = if scored > 0 { (count as f64 / scored as f64) * 100.0 } else { 0.0 };
            info!("║   {:22}: {:>6} ({:>5.1}%)                   ║", band.label(), count, pct);
        }
        for decision in [Decision::AutoApprove, Decision::ManualReview] {
            let count = decision_counts.get(&decision).copied().unwrap_or(0);
            info!("║   {:22}: {:>6}                             ║", decision.as_str(), count);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Composite Score Distribution:                                ║");
        let distribution = self.get_composite_distribution();
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");

        let failures = self.get_failure_counts();
        if !failures.is_empty() {
            info!("Failures by kind:");
            for (kind, count) in &failures {
                info!("  {}: {}", kind, count);
            }
        }
    }
}

impl Default for ScoringMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl LatencyStats {
    fn from_samples(samples: &RwLock<Vec<u64>>) -> Self {
        let mut sorted = match samples.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return Self::default(),
        };
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        Self {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }
}

/// Periodic metrics summary reporter
pub struct MetricsReporter {
    metrics: Arc<ScoringMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ScoringMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
