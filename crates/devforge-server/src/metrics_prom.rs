//! Prometheus text-exposition rendering for `/metrics/prom` (spec §6):
//! `response_time_seconds`, `error_rate`, `memory_usage_ratio`,
//! `health_score`, `request_rate`.

use devforge_analytics::LiveMetrics;
use prometheus::{Encoder, Gauge, Registry, TextEncoder};

pub fn render(metrics: &LiveMetrics) -> anyhow::Result<Vec<u8>> {
    let registry = Registry::new();

    let response_time = Gauge::new("response_time_seconds", "average response time in seconds")?;
    let error_rate = Gauge::new("error_rate", "rolling error rate in [0,1]")?;
    let memory_usage = Gauge::new("memory_usage_ratio", "memory usage as a fraction of the configured max")?;
    let health_score = Gauge::new("health_score", "composite health score in [0,100]")?;
    let request_rate = Gauge::new("request_rate", "requests observed in the last rolling window")?;

    response_time.set(metrics.avg_response_time_ms / 1000.0);
    error_rate.set(metrics.error_rate);
    memory_usage.set(metrics.memory_usage_fraction);
    health_score.set(metrics.health_score as f64);
    request_rate.set(metrics.request_rate_per_min);

    for gauge in [&response_time, &error_rate, &memory_usage, &health_score, &request_rate] {
        registry.register(Box::new(gauge.clone()))?;
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_five_documented_gauges() {
        let metrics = LiveMetrics::default();
        let text = String::from_utf8(render(&metrics).unwrap()).unwrap();
        for name in ["response_time_seconds", "error_rate", "memory_usage_ratio", "health_score", "request_rate"] {
            assert!(text.contains(name), "missing gauge {name} in:\n{text}");
        }
    }
}
