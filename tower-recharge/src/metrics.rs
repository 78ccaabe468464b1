use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use opentelemetry::metrics::Histogram;

use crate::request::Method;

#[derive(Clone, Debug)]
pub(crate) struct DispatchMetrics {
    dispatched: Counter<u64>,
    queue_overflow: Counter<u64>,
    limiter_waits: Counter<u64>,
    cancelled: Counter<u64>,
    queue_wait: Histogram<f64>,
}

impl DispatchMetrics {
    pub(crate) fn new() -> Self {
        let meter = global::meter("recharge_dispatcher");
        Self {
            dispatched: meter.u64_counter("dispatched").build(),
            queue_overflow: meter.u64_counter("queue_overflow").build(),
            limiter_waits: meter.u64_counter("limiter_waits").build(),
            cancelled: meter.u64_counter("cancelled").build(),
            queue_wait: meter.f64_histogram("queue_wait_ms").with_unit("ms").build(),
        }
    }

    pub(crate) fn dispatched(&self, method: Method) {
        self.dispatched.add(1, &[attr(method)]);
    }

    pub(crate) fn overflowed(&self, method: Method) {
        self.queue_overflow.add(1, &[attr(method)]);
    }

    pub(crate) fn limiter_waited(&self, method: Method, waits: u32) {
        if waits > 0 {
            self.limiter_waits.add(u64::from(waits), &[attr(method)]);
        }
    }

    pub(crate) fn cancelled(&self, method: Method) {
        self.cancelled.add(1, &[attr(method)]);
    }

    pub(crate) fn queue_wait(&self, method: Method, waited: Duration) {
        self.queue_wait
            .record(waited.as_secs_f64() * 1000.0, &[attr(method)]);
    }
}

fn attr(method: Method) -> KeyValue {
    KeyValue::new("method", method.as_str())
}
