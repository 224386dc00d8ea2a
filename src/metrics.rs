//! Process-local gateway metrics.
//!
//! Plain atomic counters and gauges incremented by the core, rendered as
//! Prometheus-compatible text by the `/metrics` handler. No exporter
//! machinery; scraping the endpoint is the whole integration surface.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct GatewayMetrics {
    // Session lifecycle counters
    pub sessions_created_total: AtomicU64,
    pub sessions_completed_total: AtomicU64,
    pub sessions_failed_total: AtomicU64,
    pub sessions_cancelled_total: AtomicU64,

    // Streaming counters
    pub stream_chunks_total: AtomicU64,
    pub stream_bytes_total: AtomicU64,
    pub provider_failures_total: AtomicU64,

    // Gauges
    pub active_streams: AtomicU64,
    pub queue_depth: AtomicU64,
    pub queue_maxsize: AtomicU64,
    pub workers_busy: AtomicU64,
    pub workers_total: AtomicU64,

    // Overload counters
    pub queue_full_total: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    pub fn dec(gauge: &AtomicU64) {
        gauge.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn set(gauge: &AtomicU64, value: u64) {
        gauge.store(value, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Render the exposition text. Rate-limiter observables are computed
    /// by the caller so this module stays free of limiter internals.
    pub fn render(&self, rate_limit_max_bucket_usage: f64, rate_limit_window_remaining: f64) -> String {
        let mut out = String::with_capacity(2048);

        let counter = |out: &mut String, name: &str, help: &str, value: u64| {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        };
        let gauge_u64 = |out: &mut String, name: &str, help: &str, value: u64| {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}\n"
            ));
        };
        let gauge_f64 = |out: &mut String, name: &str, help: &str, value: f64| {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}\n"
            ));
        };

        out.push_str(concat!(
            "# HELP tts_sessions_total Total TTS sessions by status.\n",
            "# TYPE tts_sessions_total counter\n"
        ));
        for (status, value) in [
            ("created", &self.sessions_created_total),
            ("completed", &self.sessions_completed_total),
            ("failed", &self.sessions_failed_total),
            ("cancelled", &self.sessions_cancelled_total),
        ] {
            out.push_str(&format!(
                "tts_sessions_total{{status=\"{status}\"}} {}\n",
                Self::get(value)
            ));
        }

        counter(
            &mut out,
            "tts_stream_chunks_total",
            "Total number of audio chunks streamed.",
            Self::get(&self.stream_chunks_total),
        );
        counter(
            &mut out,
            "tts_stream_bytes_total",
            "Total number of audio bytes streamed.",
            Self::get(&self.stream_bytes_total),
        );
        counter(
            &mut out,
            "tts_provider_failures_total",
            "Total number of provider failures observed.",
            Self::get(&self.provider_failures_total),
        );
        gauge_u64(
            &mut out,
            "tts_active_streams",
            "Current number of active TTS streams.",
            Self::get(&self.active_streams),
        );
        gauge_u64(
            &mut out,
            "tts_session_queue_depth",
            "Current depth of the streaming session queue.",
            Self::get(&self.queue_depth),
        );
        gauge_u64(
            &mut out,
            "tts_session_queue_maxsize",
            "Capacity of the streaming session queue.",
            Self::get(&self.queue_maxsize),
        );
        gauge_u64(
            &mut out,
            "tts_session_workers_busy",
            "Streaming workers currently handling a session.",
            Self::get(&self.workers_busy),
        );
        gauge_u64(
            &mut out,
            "tts_session_workers_total",
            "Streaming workers started at boot.",
            Self::get(&self.workers_total),
        );
        counter(
            &mut out,
            "tts_session_queue_full_total",
            "Streaming requests rejected because the queue was full.",
            Self::get(&self.queue_full_total),
        );
        gauge_f64(
            &mut out,
            "tts_rate_limit_max_bucket_usage",
            "Highest admission bucket fill fraction across active origins.",
            rate_limit_max_bucket_usage,
        );
        gauge_f64(
            &mut out,
            "tts_rate_limit_window_remaining_seconds",
            "Smallest remaining admission window across active origins.",
            rate_limit_window_remaining,
        );

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = GatewayMetrics::new();
        GatewayMetrics::inc(&metrics.sessions_created_total);
        GatewayMetrics::inc(&metrics.sessions_created_total);
        GatewayMetrics::add(&metrics.stream_bytes_total, 640);

        assert_eq!(GatewayMetrics::get(&metrics.sessions_created_total), 2);
        assert_eq!(GatewayMetrics::get(&metrics.stream_bytes_total), 640);
    }

    #[test]
    fn test_render_exposes_all_series() {
        let metrics = GatewayMetrics::new();
        GatewayMetrics::set(&metrics.queue_maxsize, 100);
        GatewayMetrics::set(&metrics.workers_total, 8);
        GatewayMetrics::inc(&metrics.queue_full_total);

        let text = metrics.render(0.25, 42.0);
        assert!(text.contains("tts_sessions_total{status=\"created\"} 0"));
        assert!(text.contains("tts_session_queue_maxsize 100"));
        assert!(text.contains("tts_session_workers_total 8"));
        assert!(text.contains("tts_session_queue_full_total 1"));
        assert!(text.contains("tts_rate_limit_max_bucket_usage 0.25"));
        assert!(text.contains("tts_rate_limit_window_remaining_seconds 42"));
    }
}
