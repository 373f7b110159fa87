//! Rolling network-speed history. Each completed download contributes one
//! bytes-per-second sample; hourly, daily, and weekly buckets feed the
//! scheduler's network factor and the "best download time" analysis.

use std::collections::VecDeque;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Default when no history exists: 1 Mbps expressed in bytes/s.
pub const DEFAULT_SPEED_BPS: f64 = 125_000.0;

const RECENT_CAP: usize = 24;
const SAMPLES_PER_BUCKET: usize = 50;
const HOURLY_CAP: usize = 24;
const DAILY_CAP: usize = 30;
const WEEKLY_CAP: usize = 12;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeedBucket {
    /// Ring of bytes/s readings.
    pub samples: VecDeque<f64>,
    pub average: f64,
    pub count: u64,
}

impl SpeedBucket {
    fn push(&mut self, bytes_per_sec: f64) {
        if self.samples.len() == SAMPLES_PER_BUCKET {
            self.samples.pop_front();
        }
        self.samples.push_back(bytes_per_sec);
        self.count += 1;
        self.average = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedAnalysis {
    /// Hour of day (0-23) with the best historical average, when any
    /// history exists.
    pub best_hour: Option<u32>,
    pub best_hour_average_bps: Option<f64>,
    pub best_hour_sample_count: u64,
    pub trend: Trend,
    pub recommendations: Vec<String>,
}

/// Keyed rolling history. Hourly buckets key on hour-of-day, daily on
/// ordinal date, weekly on ISO week; each tier is capped and evicts its
/// oldest key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeedEstimator {
    recent: VecDeque<f64>,
    hourly: Vec<(u32, SpeedBucket)>,
    daily: Vec<(String, SpeedBucket)>,
    weekly: Vec<(String, SpeedBucket)>,
}

impl SpeedEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed download.
    pub fn record(&mut self, bytes_received: u64, elapsed_secs: f64) {
        self.record_at(bytes_received, elapsed_secs, Utc::now());
    }

    /// Clock-injectable variant for tests and replay.
    pub fn record_at(&mut self, bytes_received: u64, elapsed_secs: f64, at: DateTime<Utc>) {
        if elapsed_secs <= 0.0 || bytes_received == 0 {
            return;
        }
        let bytes_per_sec = bytes_received as f64 / elapsed_secs;

        if self.recent.len() == RECENT_CAP {
            self.recent.pop_front();
        }
        self.recent.push_back(bytes_per_sec);

        bucket_push(&mut self.hourly, at.hour(), bytes_per_sec, HOURLY_CAP);
        bucket_push(
            &mut self.daily,
            at.format("%Y-%m-%d").to_string(),
            bytes_per_sec,
            DAILY_CAP,
        );
        bucket_push(
            &mut self.weekly,
            format!("{}-W{:02}", at.iso_week().year(), at.iso_week().week()),
            bytes_per_sec,
            WEEKLY_CAP,
        );
    }

    /// Average of the last five samples; 1 Mbps default with no data.
    pub fn current(&self) -> f64 {
        if self.recent.is_empty() {
            return DEFAULT_SPEED_BPS;
        }
        let tail: Vec<f64> = self.recent.iter().rev().take(5).copied().collect();
        tail.iter().sum::<f64>() / tail.len() as f64
    }

    /// Scheduler priority factor from the current estimate.
    pub fn network_factor(&self) -> f64 {
        let mbps = self.current() * 8.0 / 1_000_000.0;
        if mbps > 5.0 {
            1.2
        } else if mbps >= 1.0 {
            1.0
        } else {
            0.5
        }
    }

    pub fn analysis(&self) -> SpeedAnalysis {
        let best = self
            .hourly
            .iter()
            .max_by(|(_, a), (_, b)| {
                a.average
                    .partial_cmp(&b.average)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(hour, bucket)| (*hour, bucket.average, bucket.count));

        let trend = self.trend();

        let mut recommendations = Vec::new();
        if let Some((hour, avg, _)) = best {
            recommendations.push(format!(
                "Historically fastest around {hour:02}:00 ({:.1} Mbps average)",
                avg * 8.0 / 1_000_000.0
            ));
        }
        match trend {
            Trend::Down => recommendations
                .push("Throughput is trending down; defer large downloads if possible".to_string()),
            Trend::Up => recommendations
                .push("Throughput is trending up; a good window for large downloads".to_string()),
            Trend::Stable => {}
        }
        if self.recent.is_empty() {
            recommendations.push("No download history yet; using 1 Mbps default".to_string());
        }

        SpeedAnalysis {
            best_hour: best.map(|(h, _, _)| h),
            best_hour_average_bps: best.map(|(_, avg, _)| avg),
            best_hour_sample_count: best.map(|(_, _, n)| n).unwrap_or(0),
            trend,
            recommendations,
        }
    }

    /// Newest half of the recent window against the older half; a swing
    /// above 10% is a trend.
    fn trend(&self) -> Trend {
        if self.recent.len() < 4 {
            return Trend::Stable;
        }
        let half = self.recent.len() / 2;
        let older: f64 = self.recent.iter().take(half).sum::<f64>() / half as f64;
        let newer: f64 =
            self.recent.iter().skip(half).sum::<f64>() / (self.recent.len() - half) as f64;
        if older <= 0.0 {
            return Trend::Stable;
        }
        let delta = (newer - older) / older;
        if delta > 0.10 {
            Trend::Up
        } else if delta < -0.10 {
            Trend::Down
        } else {
            Trend::Stable
        }
    }
}

fn bucket_push<K: PartialEq>(
    buckets: &mut Vec<(K, SpeedBucket)>,
    key: K,
    bytes_per_sec: f64,
    cap: usize,
) {
    if let Some((_, bucket)) = buckets.iter_mut().find(|(k, _)| *k == key) {
        bucket.push(bytes_per_sec);
        return;
    }
    if buckets.len() == cap {
        buckets.remove(0);
    }
    let mut bucket = SpeedBucket::default();
    bucket.push(bytes_per_sec);
    buckets.push((key, bucket));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn current_defaults_to_one_mbps() {
        let estimator = SpeedEstimator::new();
        assert!((estimator.current() - DEFAULT_SPEED_BPS).abs() < f64::EPSILON);
    }

    #[test]
    fn current_averages_last_five() {
        let mut estimator = SpeedEstimator::new();
        for bps in [100.0, 200.0, 300.0, 400.0, 500.0, 600.0] {
            estimator.record(bps as u64, 1.0);
        }
        // Last five: 200..=600.
        assert!((estimator.current() - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_elapsed_and_zero_bytes_ignored() {
        let mut estimator = SpeedEstimator::new();
        estimator.record(1000, 0.0);
        estimator.record(0, 1.0);
        assert!((estimator.current() - DEFAULT_SPEED_BPS).abs() < f64::EPSILON);
    }

    #[test]
    fn network_factor_tiers() {
        let mut fast = SpeedEstimator::new();
        fast.record(10_000_000, 1.0); // 80 Mbps
        assert!((fast.network_factor() - 1.2).abs() < f64::EPSILON);

        let mut mid = SpeedEstimator::new();
        mid.record(375_000, 1.0); // 3 Mbps
        assert!((mid.network_factor() - 1.0).abs() < f64::EPSILON);

        let mut slow = SpeedEstimator::new();
        slow.record(50_000, 1.0); // 0.4 Mbps
        assert!((slow.network_factor() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn best_hour_tracks_bucket_averages() {
        let mut estimator = SpeedEstimator::new();
        let morning = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let night = Utc.with_ymd_and_hms(2024, 5, 1, 23, 0, 0).unwrap();
        estimator.record_at(100_000, 1.0, morning);
        estimator.record_at(2_000_000, 1.0, night);

        let analysis = estimator.analysis();
        assert_eq!(analysis.best_hour, Some(23));
        assert!(analysis.best_hour_average_bps.unwrap() > 1_000_000.0);
        assert_eq!(analysis.best_hour_sample_count, 1);
    }

    #[test]
    fn trend_detection() {
        let mut rising = SpeedEstimator::new();
        for bps in [100_000u64, 100_000, 100_000, 200_000, 220_000, 240_000] {
            rising.record(bps, 1.0);
        }
        assert_eq!(rising.analysis().trend, Trend::Up);

        let mut falling = SpeedEstimator::new();
        for bps in [240_000u64, 220_000, 200_000, 100_000, 90_000, 80_000] {
            falling.record(bps, 1.0);
        }
        assert_eq!(falling.analysis().trend, Trend::Down);

        let mut flat = SpeedEstimator::new();
        for _ in 0..6 {
            flat.record(150_000, 1.0);
        }
        assert_eq!(flat.analysis().trend, Trend::Stable);
    }

    #[test]
    fn hourly_buckets_capped_at_24() {
        let mut estimator = SpeedEstimator::new();
        for hour in 0..24 {
            let at = Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap();
            estimator.record_at(100_000, 1.0, at);
        }
        assert_eq!(estimator.hourly.len(), 24);
        // A 25th distinct key cannot exist for hour-of-day; re-recording
        // an existing hour reuses its bucket.
        let at = Utc.with_ymd_and_hms(2024, 5, 2, 3, 0, 0).unwrap();
        estimator.record_at(100_000, 1.0, at);
        assert_eq!(estimator.hourly.len(), 24);
    }

    #[test]
    fn serde_round_trip() {
        let mut estimator = SpeedEstimator::new();
        estimator.record(500_000, 2.0);
        let json = serde_json::to_string(&estimator).unwrap();
        let back: SpeedEstimator = serde_json::from_str(&json).unwrap();
        assert!((back.current() - estimator.current()).abs() < f64::EPSILON);
    }
}
