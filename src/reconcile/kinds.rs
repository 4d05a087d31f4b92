//! Kind Strategies
//!
//! Concrete hook implementations for every resource kind the agent manages.
//! Natural keys follow the hardware topology: zones key on their rack index,
//! managers are per-zone singletons, drawers key on (zone, slot), PSUs and
//! fans on (drawer, slot/index), drives on (drawer, bay address).

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::domain::model::{
    sanitize_label, DiscoveryObservation, DrawerState, DriveState, FanState, HealthStatus,
    KeyPart, ManagerState, Payload, Probe, PsuState, ResourceKind, ResourceRecord, StableKey,
    ZoneState,
};
use crate::error::{Error, Result};
use crate::store::Scope;

use super::registry::{HookContext, KindHooks};

/// Settings-store field consulted for drawer asset tags.
const ASSET_TAG_FIELD: &str = "asset_tag";

fn wrong_probe(kind: ResourceKind, expected: &'static str) -> Error {
    Error::PayloadMismatch { kind, expected }
}

fn require_parent(kind: ResourceKind, scope: Scope) -> Result<Uuid> {
    scope.ok_or(Error::IncompleteNaturalKey {
        kind,
        missing: "parent",
    })
}

/// Validate a firmware-reported string field, dropping it with a warning
/// when unusable. The rest of the record still commits.
fn clean_field(kind: ResourceKind, field: &'static str, raw: Option<&str>) -> Option<String> {
    raw.and_then(|value| match sanitize_label(value) {
        Some(clean) => Some(clean),
        None => {
            warn!(kind = %kind, field, "dropping malformed field reported by firmware");
            None
        }
    })
}

fn set_if_changed<T: PartialEq>(target: &mut T, value: T, changed: &mut bool) {
    if *target != value {
        *target = value;
        *changed = true;
    }
}

// =============================================================================
// Zone
// =============================================================================

/// Rack zones, the root scope of the topology.
#[derive(Debug)]
pub struct ZoneHooks;

#[async_trait]
impl KindHooks for ZoneHooks {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Zone
    }

    fn matches(&self, record: &ResourceRecord, obs: &DiscoveryObservation) -> bool {
        match (&obs.probe, record.payload.as_zone()) {
            (Probe::Zone(probe), Some(state)) => state.index == probe.index,
            _ => false,
        }
    }

    fn natural_key(&self, record: &ResourceRecord) -> Result<StableKey> {
        let state = record
            .payload
            .as_zone()
            .ok_or_else(|| wrong_probe(ResourceKind::Zone, "zone payload"))?;
        Ok(StableKey::new(
            ResourceKind::Zone,
            record.parent,
            vec![KeyPart::Index(state.index)],
        ))
    }

    async fn discover(
        &self,
        scope: Scope,
        obs: &DiscoveryObservation,
        _ctx: &HookContext,
    ) -> Result<ResourceRecord> {
        let Probe::Zone(probe) = &obs.probe else {
            return Err(wrong_probe(ResourceKind::Zone, "zone probe"));
        };
        Ok(ResourceRecord::new(
            scope,
            Payload::Zone(ZoneState {
                index: probe.index,
                label: None,
            }),
        ))
    }

    async fn update(
        &self,
        record: &mut ResourceRecord,
        obs: &DiscoveryObservation,
        _ctx: &HookContext,
    ) -> Result<bool> {
        let Probe::Zone(probe) = &obs.probe else {
            return Err(wrong_probe(ResourceKind::Zone, "zone probe"));
        };
        let mut changed = false;
        set_if_changed(&mut record.status, HealthStatus::Ok, &mut changed);

        let state = record
            .payload
            .as_zone_mut()
            .ok_or_else(|| wrong_probe(ResourceKind::Zone, "zone payload"))?;
        let label = clean_field(ResourceKind::Zone, "label", probe.label.as_deref());
        set_if_changed(&mut state.label, label, &mut changed);
        Ok(changed)
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Zone management controller; exactly one per zone.
#[derive(Debug)]
pub struct ManagerHooks;

#[async_trait]
impl KindHooks for ManagerHooks {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Manager
    }

    fn matches(&self, _record: &ResourceRecord, obs: &DiscoveryObservation) -> bool {
        // Singleton within the scope: any stored manager corresponds to the
        // observed one.
        matches!(obs.probe, Probe::Manager(_))
    }

    fn natural_key(&self, record: &ResourceRecord) -> Result<StableKey> {
        let parent = require_parent(ResourceKind::Manager, record.parent)?;
        Ok(StableKey::new(
            ResourceKind::Manager,
            Some(parent),
            vec![KeyPart::Singleton],
        ))
    }

    async fn discover(
        &self,
        scope: Scope,
        obs: &DiscoveryObservation,
        _ctx: &HookContext,
    ) -> Result<ResourceRecord> {
        let Probe::Manager(_) = &obs.probe else {
            return Err(wrong_probe(ResourceKind::Manager, "manager probe"));
        };
        Ok(ResourceRecord::new(
            scope,
            Payload::Manager(ManagerState {
                firmware: None,
                uptime_seconds: None,
            }),
        ))
    }

    async fn update(
        &self,
        record: &mut ResourceRecord,
        obs: &DiscoveryObservation,
        _ctx: &HookContext,
    ) -> Result<bool> {
        let Probe::Manager(probe) = &obs.probe else {
            return Err(wrong_probe(ResourceKind::Manager, "manager probe"));
        };
        let mut changed = false;
        let status = if probe.healthy {
            HealthStatus::Ok
        } else {
            HealthStatus::Critical
        };
        set_if_changed(&mut record.status, status, &mut changed);

        let state = record
            .payload
            .as_manager_mut()
            .ok_or_else(|| wrong_probe(ResourceKind::Manager, "manager payload"))?;
        let firmware = clean_field(ResourceKind::Manager, "firmware", probe.firmware.as_deref());
        set_if_changed(&mut state.firmware, firmware, &mut changed);
        set_if_changed(&mut state.uptime_seconds, probe.uptime_seconds, &mut changed);
        Ok(changed)
    }
}

// =============================================================================
// Drawer
// =============================================================================

/// Drawers, keyed on their physical slot within the parent zone.
#[derive(Debug)]
pub struct DrawerHooks;

#[async_trait]
impl KindHooks for DrawerHooks {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Drawer
    }

    fn matches(&self, record: &ResourceRecord, obs: &DiscoveryObservation) -> bool {
        match (&obs.probe, record.payload.as_drawer()) {
            (Probe::Drawer(probe), Some(state)) => state.slot == probe.slot,
            _ => false,
        }
    }

    fn natural_key(&self, record: &ResourceRecord) -> Result<StableKey> {
        let parent = require_parent(ResourceKind::Drawer, record.parent)?;
        let state = record
            .payload
            .as_drawer()
            .ok_or_else(|| wrong_probe(ResourceKind::Drawer, "drawer payload"))?;
        Ok(StableKey::new(
            ResourceKind::Drawer,
            Some(parent),
            vec![KeyPart::Slot(state.slot)],
        ))
    }

    async fn discover(
        &self,
        scope: Scope,
        obs: &DiscoveryObservation,
        _ctx: &HookContext,
    ) -> Result<ResourceRecord> {
        let Probe::Drawer(probe) = &obs.probe else {
            return Err(wrong_probe(ResourceKind::Drawer, "drawer probe"));
        };
        Ok(ResourceRecord::new(
            scope,
            Payload::Drawer(DrawerState {
                slot: probe.slot,
                model: None,
                serial: None,
                asset_tag: None,
                powered_on: false,
            }),
        ))
    }

    async fn update(
        &self,
        record: &mut ResourceRecord,
        obs: &DiscoveryObservation,
        ctx: &HookContext,
    ) -> Result<bool> {
        let Probe::Drawer(probe) = &obs.probe else {
            return Err(wrong_probe(ResourceKind::Drawer, "drawer probe"));
        };
        let mut changed = false;
        let status = if !probe.healthy {
            HealthStatus::Critical
        } else if !probe.powered_on {
            HealthStatus::Warning
        } else {
            HealthStatus::Ok
        };
        set_if_changed(&mut record.status, status, &mut changed);

        // User-set, keyed by stable uuid; a volatile id simply misses here
        // and the post-stabilization update pass picks the value up.
        let asset_tag = ctx.settings.get(record.uuid, ASSET_TAG_FIELD).await;

        let state = record
            .payload
            .as_drawer_mut()
            .ok_or_else(|| wrong_probe(ResourceKind::Drawer, "drawer payload"))?;
        let model = clean_field(ResourceKind::Drawer, "model", probe.model.as_deref());
        let serial = clean_field(ResourceKind::Drawer, "serial", probe.serial.as_deref());
        set_if_changed(&mut state.model, model, &mut changed);
        set_if_changed(&mut state.serial, serial, &mut changed);
        set_if_changed(&mut state.asset_tag, asset_tag, &mut changed);
        set_if_changed(&mut state.powered_on, probe.powered_on, &mut changed);
        Ok(changed)
    }
}

// =============================================================================
// Psu
// =============================================================================

/// Power supply units, keyed on their slot within the parent drawer.
#[derive(Debug)]
pub struct PsuHooks;

#[async_trait]
impl KindHooks for PsuHooks {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Psu
    }

    fn matches(&self, record: &ResourceRecord, obs: &DiscoveryObservation) -> bool {
        match (&obs.probe, record.payload.as_psu()) {
            (Probe::Psu(probe), Some(state)) => state.slot == probe.slot,
            _ => false,
        }
    }

    fn natural_key(&self, record: &ResourceRecord) -> Result<StableKey> {
        let parent = require_parent(ResourceKind::Psu, record.parent)?;
        let state = record
            .payload
            .as_psu()
            .ok_or_else(|| wrong_probe(ResourceKind::Psu, "psu payload"))?;
        Ok(StableKey::new(
            ResourceKind::Psu,
            Some(parent),
            vec![KeyPart::Slot(state.slot)],
        ))
    }

    async fn discover(
        &self,
        scope: Scope,
        obs: &DiscoveryObservation,
        _ctx: &HookContext,
    ) -> Result<ResourceRecord> {
        let Probe::Psu(probe) = &obs.probe else {
            return Err(wrong_probe(ResourceKind::Psu, "psu probe"));
        };
        Ok(ResourceRecord::new(
            scope,
            Payload::Psu(PsuState {
                slot: probe.slot,
                model: None,
                power_watts: None,
            }),
        ))
    }

    async fn update(
        &self,
        record: &mut ResourceRecord,
        obs: &DiscoveryObservation,
        ctx: &HookContext,
    ) -> Result<bool> {
        let Probe::Psu(probe) = &obs.probe else {
            return Err(wrong_probe(ResourceKind::Psu, "psu probe"));
        };
        let mut changed = false;
        let status = if probe.healthy {
            HealthStatus::Ok
        } else {
            HealthStatus::Critical
        };
        set_if_changed(&mut record.status, status, &mut changed);

        let state = record
            .payload
            .as_psu_mut()
            .ok_or_else(|| wrong_probe(ResourceKind::Psu, "psu payload"))?;
        let model = clean_field(ResourceKind::Psu, "model", probe.model.as_deref());
        set_if_changed(&mut state.model, model, &mut changed);
        set_if_changed(&mut state.power_watts, probe.power_watts, &mut changed);
        let watts = state.power_watts;

        ctx.gauges.set_psu_power(record.uuid, watts);
        Ok(changed)
    }
}

// =============================================================================
// Fan
// =============================================================================

/// Cooling fans, keyed on their index within the parent drawer.
#[derive(Debug)]
pub struct FanHooks;

#[async_trait]
impl KindHooks for FanHooks {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Fan
    }

    fn matches(&self, record: &ResourceRecord, obs: &DiscoveryObservation) -> bool {
        match (&obs.probe, &record.payload) {
            (Probe::Fan(probe), Payload::Fan(state)) => state.index == probe.index,
            _ => false,
        }
    }

    fn natural_key(&self, record: &ResourceRecord) -> Result<StableKey> {
        let parent = require_parent(ResourceKind::Fan, record.parent)?;
        let Payload::Fan(state) = &record.payload else {
            return Err(wrong_probe(ResourceKind::Fan, "fan payload"));
        };
        Ok(StableKey::new(
            ResourceKind::Fan,
            Some(parent),
            vec![KeyPart::Index(state.index)],
        ))
    }

    async fn discover(
        &self,
        scope: Scope,
        obs: &DiscoveryObservation,
        _ctx: &HookContext,
    ) -> Result<ResourceRecord> {
        let Probe::Fan(probe) = &obs.probe else {
            return Err(wrong_probe(ResourceKind::Fan, "fan probe"));
        };
        Ok(ResourceRecord::new(
            scope,
            Payload::Fan(FanState {
                index: probe.index,
                rpm: None,
                duty_percent: None,
            }),
        ))
    }

    async fn update(
        &self,
        record: &mut ResourceRecord,
        obs: &DiscoveryObservation,
        ctx: &HookContext,
    ) -> Result<bool> {
        let Probe::Fan(probe) = &obs.probe else {
            return Err(wrong_probe(ResourceKind::Fan, "fan probe"));
        };
        let mut changed = false;
        let status = if probe.healthy {
            HealthStatus::Ok
        } else {
            HealthStatus::Critical
        };
        set_if_changed(&mut record.status, status, &mut changed);

        let state = record
            .payload
            .as_fan_mut()
            .ok_or_else(|| wrong_probe(ResourceKind::Fan, "fan payload"))?;
        set_if_changed(&mut state.rpm, probe.rpm, &mut changed);
        set_if_changed(&mut state.duty_percent, probe.duty_percent, &mut changed);
        let rpm = state.rpm;

        ctx.gauges.set_fan_rpm(record.uuid, rpm);
        Ok(changed)
    }
}

// =============================================================================
// Drive
// =============================================================================

/// Disk drives, keyed on their bay address within the parent drawer.
#[derive(Debug)]
pub struct DriveHooks;

#[async_trait]
impl KindHooks for DriveHooks {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Drive
    }

    fn matches(&self, record: &ResourceRecord, obs: &DiscoveryObservation) -> bool {
        match (&obs.probe, record.payload.as_drive()) {
            (Probe::Drive(probe), Some(state)) => state.bay == probe.bay,
            _ => false,
        }
    }

    fn natural_key(&self, record: &ResourceRecord) -> Result<StableKey> {
        let parent = require_parent(ResourceKind::Drive, record.parent)?;
        let state = record
            .payload
            .as_drive()
            .ok_or_else(|| wrong_probe(ResourceKind::Drive, "drive payload"))?;
        if state.bay.is_empty() {
            return Err(Error::IncompleteNaturalKey {
                kind: ResourceKind::Drive,
                missing: "bay",
            });
        }
        Ok(StableKey::new(
            ResourceKind::Drive,
            Some(parent),
            vec![KeyPart::Address(state.bay.clone())],
        ))
    }

    async fn discover(
        &self,
        scope: Scope,
        obs: &DiscoveryObservation,
        _ctx: &HookContext,
    ) -> Result<ResourceRecord> {
        let Probe::Drive(probe) = &obs.probe else {
            return Err(wrong_probe(ResourceKind::Drive, "drive probe"));
        };
        Ok(ResourceRecord::new(
            scope,
            Payload::Drive(DriveState {
                bay: probe.bay.clone(),
                model: None,
                serial: None,
                capacity_bytes: probe.capacity_bytes,
                temperature_celsius: None,
                percentage_used: None,
            }),
        ))
    }

    async fn update(
        &self,
        record: &mut ResourceRecord,
        obs: &DiscoveryObservation,
        ctx: &HookContext,
    ) -> Result<bool> {
        let Probe::Drive(probe) = &obs.probe else {
            return Err(wrong_probe(ResourceKind::Drive, "drive probe"));
        };
        let mut changed = false;

        let state = record
            .payload
            .as_drive_mut()
            .ok_or_else(|| wrong_probe(ResourceKind::Drive, "drive payload"))?;
        let model = clean_field(ResourceKind::Drive, "model", probe.model.as_deref());
        let serial = clean_field(ResourceKind::Drive, "serial", probe.serial.as_deref());
        set_if_changed(&mut state.model, model, &mut changed);
        set_if_changed(&mut state.serial, serial, &mut changed);
        set_if_changed(&mut state.capacity_bytes, probe.capacity_bytes, &mut changed);
        set_if_changed(
            &mut state.temperature_celsius,
            probe.temperature_celsius,
            &mut changed,
        );
        set_if_changed(&mut state.percentage_used, probe.percentage_used, &mut changed);
        let worn = state.remaining_life_percent().is_some_and(|life| life <= 10);
        let (temperature, used) = (state.temperature_celsius, state.percentage_used);

        let status = if !probe.healthy {
            HealthStatus::Critical
        } else if worn {
            HealthStatus::Warning
        } else {
            HealthStatus::Ok
        };
        set_if_changed(&mut record.status, status, &mut changed);

        ctx.gauges.set_drive_health(record.uuid, temperature, used);
        Ok(changed)
    }
}

// =============================================================================
// Tests
// =============================================================================
