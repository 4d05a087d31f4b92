//! Metrics module
//!
//! Prometheus instrumentation for the agent. Cycle, event, and resource
//! counters are agent-wide; the per-record gauges in [`RecordGauges`] are
//! keyed by stable uuid and form the derived state that must be cleared
//! before a record is removed.

use once_cell::sync::Lazy;
use prometheus::{
    register_gauge_vec, register_int_counter_vec, register_int_gauge_vec, GaugeVec, IntCounterVec,
    IntGaugeVec,
};
use uuid::Uuid;

use crate::domain::events::Notification;
use crate::domain::model::ResourceKind;

static CYCLES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chassisd_cycles_total",
        "Discovery cycles run, by kind and outcome",
        &["kind", "outcome"]
    )
    .unwrap()
});

static LIFECYCLE_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chassisd_lifecycle_events_total",
        "Lifecycle events queued, by kind and notification",
        &["kind", "notification"]
    )
    .unwrap()
});

static RESOURCES: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "chassisd_resources",
        "Resource records currently in the store, by kind",
        &["kind"]
    )
    .unwrap()
});

static PSU_POWER_WATTS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "chassisd_psu_power_watts",
        "Instantaneous PSU output power",
        &["uuid"]
    )
    .unwrap()
});

static FAN_RPM: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!("chassisd_fan_rpm", "Measured fan speed", &["uuid"]).unwrap()
});

static DRIVE_TEMPERATURE_CELSIUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "chassisd_drive_temperature_celsius",
        "Drive temperature",
        &["uuid"]
    )
    .unwrap()
});

static DRIVE_PERCENTAGE_USED: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "chassisd_drive_percentage_used",
        "Drive lifetime used",
        &["uuid"]
    )
    .unwrap()
});

/// Count one finished (or failed) discovery cycle.
pub fn record_cycle(kind: ResourceKind, outcome: &str) {
    CYCLES_TOTAL.with_label_values(&[kind.as_str(), outcome]).inc();
}

/// Count one queued lifecycle event.
pub fn record_event(kind: ResourceKind, notification: Notification) {
    LIFECYCLE_EVENTS_TOTAL
        .with_label_values(&[kind.as_str(), notification.as_str()])
        .inc();
}

/// Publish the current record count for a kind.
pub fn set_resource_count(kind: ResourceKind, count: usize) {
    RESOURCES
        .with_label_values(&[kind.as_str()])
        .set(count as i64);
}

// =============================================================================
// Per-record Gauges
// =============================================================================

/// Handle for per-record hardware gauges, labelled by stable uuid.
///
/// Update hooks publish through this; the driver's Remove path calls
/// [`RecordGauges::discard`] before the record is deleted so no label set
/// outlives its record.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordGauges;

impl RecordGauges {
    pub fn new() -> Self {
        Self
    }

    pub fn set_psu_power(&self, uuid: Uuid, watts: Option<f64>) {
        match watts {
            Some(w) => PSU_POWER_WATTS
                .with_label_values(&[&uuid.to_string()])
                .set(w),
            None => {
                let _ = PSU_POWER_WATTS.remove_label_values(&[&uuid.to_string()]);
            }
        }
    }

    pub fn set_fan_rpm(&self, uuid: Uuid, rpm: Option<u32>) {
        match rpm {
            Some(r) => FAN_RPM
                .with_label_values(&[&uuid.to_string()])
                .set(i64::from(r)),
            None => {
                let _ = FAN_RPM.remove_label_values(&[&uuid.to_string()]);
            }
        }
    }

    pub fn set_drive_health(
        &self,
        uuid: Uuid,
        temperature_celsius: Option<i32>,
        percentage_used: Option<u8>,
    ) {
        let label = uuid.to_string();
        match temperature_celsius {
            Some(t) => DRIVE_TEMPERATURE_CELSIUS
                .with_label_values(&[&label])
                .set(i64::from(t)),
            None => {
                let _ = DRIVE_TEMPERATURE_CELSIUS.remove_label_values(&[&label]);
            }
        }
        match percentage_used {
            Some(p) => DRIVE_PERCENTAGE_USED
                .with_label_values(&[&label])
                .set(i64::from(p)),
            None => {
                let _ = DRIVE_PERCENTAGE_USED.remove_label_values(&[&label]);
            }
        }
    }

    /// Drop every gauge labelled with this record's uuid.
    pub fn discard(&self, kind: ResourceKind, uuid: Uuid) {
        let label = uuid.to_string();
        match kind {
            ResourceKind::Psu => {
                let _ = PSU_POWER_WATTS.remove_label_values(&[&label]);
            }
            ResourceKind::Fan => {
                let _ = FAN_RPM.remove_label_values(&[&label]);
            }
            ResourceKind::Drive => {
                let _ = DRIVE_TEMPERATURE_CELSIUS.remove_label_values(&[&label]);
                let _ = DRIVE_PERCENTAGE_USED.remove_label_values(&[&label]);
            }
            ResourceKind::Zone | ResourceKind::Manager | ResourceKind::Drawer => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_gauges_set_and_discard() {
        let gauges = RecordGauges::new();
        let uuid = Uuid::new_v4();

        gauges.set_psu_power(uuid, Some(50.0));
        let value = PSU_POWER_WATTS
            .with_label_values(&[&uuid.to_string()])
            .get();
        assert_eq!(value, 50.0);

        gauges.discard(ResourceKind::Psu, uuid);
        // Discarding an unknown uuid is harmless.
        gauges.discard(ResourceKind::Drive, Uuid::new_v4());
    }

    #[test]
    fn test_counters_do_not_panic() {
        record_cycle(ResourceKind::Zone, "ok");
        record_event(ResourceKind::Psu, Notification::Add);
        set_resource_count(ResourceKind::Fan, 3);
    }
}
