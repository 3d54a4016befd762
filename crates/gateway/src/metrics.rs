use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static REMOTE_CALLS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn register_collector<T>(collector: T) -> T
where
    T: prometheus::core::Collector + Clone + 'static,
{
    let _ = registry().register(Box::new(collector.clone()));
    collector
}

fn http_requests_total() -> &'static IntCounterVec {
    HTTP_REQUESTS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "nifi_gateway_http_requests_total",
                    "Gateway HTTP request count.",
                ),
                &["route", "method", "status"],
            )
            .expect("create nifi_gateway_http_requests_total"),
        )
    })
}

fn http_request_duration_seconds() -> &'static HistogramVec {
    HTTP_REQUEST_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "nifi_gateway_http_request_duration_seconds",
                    "Gateway HTTP request duration in seconds, including NiFi round trips.",
                )
                .buckets(vec![
                    0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
                ]),
                &["route", "method", "outcome"],
            )
            .expect("create nifi_gateway_http_request_duration_seconds"),
        )
    })
}

fn remote_calls_total() -> &'static IntCounterVec {
    REMOTE_CALLS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "nifi_gateway_remote_calls_total",
                    "Calls made to the NiFi REST API.",
                ),
                &["call", "outcome"],
            )
            .expect("create nifi_gateway_remote_calls_total"),
        )
    })
}

pub fn observe_http_request(route: &str, method: &str, status: u16, duration: Duration) {
    let status_str = status.to_string();
    http_requests_total()
        .with_label_values(&[route, method, status_str.as_str()])
        .inc();

    let outcome = if (200..400).contains(&status) {
        "success"
    } else {
        "error"
    };
    http_request_duration_seconds()
        .with_label_values(&[route, method, outcome])
        .observe(duration.as_secs_f64());
}

pub fn observe_remote_call(call: &str, outcome: &str) {
    remote_calls_total()
        .with_label_values(&[call, outcome])
        .inc();
}

pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let _ = http_requests_total();
    let _ = remote_calls_total();

    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_observed_remote_calls() {
        observe_remote_call("token", "success");
        observe_http_request("/state_processor", "PUT", 409, Duration::from_millis(12));

        let (body, content_type) = render().expect("metrics should render");
        let text = String::from_utf8(body).expect("metrics should be utf-8");

        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("nifi_gateway_remote_calls_total"));
        assert!(text.contains("call=\"token\""));
        assert!(text.contains("status=\"409\""));
    }
}
