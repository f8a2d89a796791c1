use metrics::Gauge;

/// A span that increments a gauge upon being entered and decrements it on
/// exit. Used to keep `scheduler_executions_in_flight` in sync with
/// `CurrentlyExecuting` without a separate decrement call on every exit path.
pub(crate) struct MetricSpan {
    gauge: Gauge,
}

impl MetricSpan {
    pub fn enter(gauge: Gauge) -> Self {
        gauge.increment(1.0);

        Self { gauge }
    }
}

impl Drop for MetricSpan {
    fn drop(&mut self) {
        self.gauge.decrement(1.0);
    }
}

pub(crate) fn in_flight_gauge(scheduler_name: &str) -> Gauge {
    metrics::gauge!("scheduler_executions_in_flight", "scheduler_name" => scheduler_name.to_owned())
}

pub(crate) fn free_slots_gauge(scheduler_name: &str) -> Gauge {
    metrics::gauge!("scheduler_free_slots", "scheduler_name" => scheduler_name.to_owned())
}
