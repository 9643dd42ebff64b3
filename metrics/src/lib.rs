use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, register_int_gauge, Counter,
    CounterVec, HistogramVec, IntGauge,
};
use std::time::Duration;

mod traits;

// Re-export
pub use traits::ToLabel;

lazy_static! {
    // HTTP metrics
    pub static ref HTTP_REQUEST_COUNT: Counter = register_counter!(
        "garimpo_http_request_count",
        "the number of HTTP requests"
    )
    .unwrap();

    // Queue metrics
    pub static ref TASK_ENQUEUED_COUNT: CounterVec = register_counter_vec!(
        "garimpo_task_enqueued_count",
        "the number of tasks admitted into the priority queues",
        &["source", "priority"]
    )
    .unwrap();
    pub static ref TASK_ADMISSION_REFUSED_COUNT: CounterVec = register_counter_vec!(
        "garimpo_task_admission_refused_count",
        "the number of enqueue attempts refused by an open circuit breaker",
        &["source"]
    )
    .unwrap();

    // Worker metrics
    pub static ref TASK_OUTCOME_COUNT: CounterVec = register_counter_vec!(
        "garimpo_task_outcome_count",
        "the number of finished probe invocations by outcome",
        &["source", "outcome"]
    )
    .unwrap();
    pub static ref PROBE_DURATION_MILLIS: HistogramVec = register_histogram_vec!(
        "garimpo_probe_duration_millis",
        "the duration of probe invocations",
        &["source", "outcome"]
    )
    .unwrap();
    pub static ref TASK_RETRY_SCHEDULED_COUNT: CounterVec = register_counter_vec!(
        "garimpo_task_retry_scheduled_count",
        "the number of tasks parked for a later attempt",
        &["source"]
    )
    .unwrap();

    // Circuit breaker metrics
    pub static ref CIRCUIT_BREAKER_OPENED_COUNT: CounterVec = register_counter_vec!(
        "garimpo_circuit_breaker_opened_count",
        "the number of times a source's circuit breaker opened",
        &["source"]
    )
    .unwrap();

    // Notification hub metrics
    pub static ref HUB_EVENT_COUNT: CounterVec = register_counter_vec!(
        "garimpo_hub_event_count",
        "the number of events published on the notification hub",
        &["event_type"]
    )
    .unwrap();
    pub static ref HUB_SUBSCRIBER_COUNT: IntGauge = register_int_gauge!(
        "garimpo_hub_subscriber_count",
        "the number of live subscriber channels"
    )
    .unwrap();
    pub static ref HUB_SUBSCRIBER_EVICTED_COUNT: Counter = register_counter!(
        "garimpo_hub_subscriber_evicted_count",
        "the number of subscribers dropped after a failed send"
    )
    .unwrap();
}

pub fn inc_http_request_count() {
    HTTP_REQUEST_COUNT.inc();
}

pub fn inc_task_enqueued_count(source: impl ToLabel, priority: impl ToLabel) {
    TASK_ENQUEUED_COUNT
        .with_label_values(&[source.to_label(), priority.to_label()])
        .inc();
}

pub fn inc_task_admission_refused_count(source: impl ToLabel) {
    TASK_ADMISSION_REFUSED_COUNT
        .with_label_values(&[source.to_label()])
        .inc();
}

pub fn inc_task_outcome_count(source: impl ToLabel, outcome: impl ToLabel) {
    TASK_OUTCOME_COUNT
        .with_label_values(&[source.to_label(), outcome.to_label()])
        .inc();
}

pub fn observe_probe_duration(source: impl ToLabel, outcome: impl ToLabel, duration: Duration) {
    PROBE_DURATION_MILLIS
        .with_label_values(&[source.to_label(), outcome.to_label()])
        .observe(duration.as_millis() as f64);
}

pub fn inc_task_retry_scheduled_count(source: impl ToLabel) {
    TASK_RETRY_SCHEDULED_COUNT
        .with_label_values(&[source.to_label()])
        .inc();
}

pub fn inc_circuit_breaker_opened_count(source: impl ToLabel) {
    CIRCUIT_BREAKER_OPENED_COUNT
        .with_label_values(&[source.to_label()])
        .inc();
}

pub fn inc_hub_event_count(event_type: impl ToLabel) {
    HUB_EVENT_COUNT
        .with_label_values(&[event_type.to_label()])
        .inc();
}

pub fn set_hub_subscriber_count(count: usize) {
    HUB_SUBSCRIBER_COUNT.set(count as i64);
}

pub fn inc_hub_subscriber_evicted_count() {
    HUB_SUBSCRIBER_EVICTED_COUNT.inc();
}
