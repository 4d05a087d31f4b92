//! Resource Model
//!
//! Core data model for the reconciliation engine: resource kinds, persisted
//! records with touch-epoch bookkeeping, stable natural keys, and the
//! transient per-cycle observations produced by hardware polls.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Resource Kinds
// =============================================================================

/// Kind tag for a managed resource.
///
/// Each kind has its own store and its own hook strategy in the kind
/// registry. The parent chain is Zone -> Drawer -> {Psu, Fan, Drive}, with
/// Manager as a per-zone singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Rack zone, the root scope
    Zone,
    /// Zone management controller (singleton per zone)
    Manager,
    /// Compute/storage drawer in a zone slot
    Drawer,
    /// Power supply unit in a drawer slot
    Psu,
    /// Cooling fan in a drawer
    Fan,
    /// Disk drive in a drawer bay
    Drive,
}

impl ResourceKind {
    /// All kinds in parent-before-child discovery order.
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Zone,
        ResourceKind::Manager,
        ResourceKind::Drawer,
        ResourceKind::Psu,
        ResourceKind::Fan,
        ResourceKind::Drive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Zone => "zone",
            ResourceKind::Manager => "manager",
            ResourceKind::Drawer => "drawer",
            ResourceKind::Psu => "psu",
            ResourceKind::Fan => "fan",
            ResourceKind::Drive => "drive",
        }
    }

    /// The kind whose records form this kind's parent scopes, if any.
    pub fn parent_kind(&self) -> Option<ResourceKind> {
        match self {
            ResourceKind::Zone => None,
            ResourceKind::Manager | ResourceKind::Drawer => Some(ResourceKind::Zone),
            ResourceKind::Psu | ResourceKind::Fan | ResourceKind::Drive => {
                Some(ResourceKind::Drawer)
            }
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Health Status
// =============================================================================

/// Coarse health status of a record.
///
/// Compared separately from the full payload when classifying a store
/// mutation (StatusChanged vs Updated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Ok => write!(f, "ok"),
            HealthStatus::Warning => write!(f, "warning"),
            HealthStatus::Critical => write!(f, "critical"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Kind-specific Payloads
// =============================================================================

/// State of a rack zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneState {
    /// Zone index within the rack
    pub index: u32,
    /// Operator-visible label, if reported
    pub label: Option<String>,
}

/// State of a zone management controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerState {
    /// Firmware version string
    pub firmware: Option<String>,
    /// Controller uptime in seconds
    pub uptime_seconds: Option<u64>,
}

/// State of a drawer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawerState {
    /// Physical slot within the parent zone
    pub slot: u32,
    /// Device model name
    pub model: Option<String>,
    /// Serial number
    pub serial: Option<String>,
    /// User-assigned asset tag (settings store, not re-derived from hardware)
    pub asset_tag: Option<String>,
    /// Whether the drawer is powered on
    pub powered_on: bool,
}

/// State of a power supply unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsuState {
    /// Physical slot within the parent drawer
    pub slot: u32,
    /// Device model name
    pub model: Option<String>,
    /// Instantaneous output power draw
    pub power_watts: Option<f64>,
}

/// State of a cooling fan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanState {
    /// Fan index within the parent drawer
    pub index: u32,
    /// Measured rotation speed
    pub rpm: Option<u32>,
    /// Commanded duty cycle
    pub duty_percent: Option<u8>,
}

/// State of a disk drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveState {
    /// Bay address within the parent drawer (e.g. "bay-3")
    pub bay: String,
    /// Device model name
    pub model: Option<String>,
    /// Serial number
    pub serial: Option<String>,
    /// Total capacity in bytes
    pub capacity_bytes: u64,
    /// Temperature in Celsius
    pub temperature_celsius: Option<i32>,
    /// Percentage of device lifetime used
    pub percentage_used: Option<u8>,
}

impl DriveState {
    /// Estimated remaining life; drives the coarse wear status.
    pub fn remaining_life_percent(&self) -> Option<u8> {
        self.percentage_used.map(|used| 100u8.saturating_sub(used))
    }
}

/// Kind-specific payload of a resource record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Zone(ZoneState),
    Manager(ManagerState),
    Drawer(DrawerState),
    Psu(PsuState),
    Fan(FanState),
    Drive(DriveState),
}

impl Payload {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Payload::Zone(_) => ResourceKind::Zone,
            Payload::Manager(_) => ResourceKind::Manager,
            Payload::Drawer(_) => ResourceKind::Drawer,
            Payload::Psu(_) => ResourceKind::Psu,
            Payload::Fan(_) => ResourceKind::Fan,
            Payload::Drive(_) => ResourceKind::Drive,
        }
    }

    pub fn as_zone(&self) -> Option<&ZoneState> {
        match self {
            Payload::Zone(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_zone_mut(&mut self) -> Option<&mut ZoneState> {
        match self {
            Payload::Zone(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_manager_mut(&mut self) -> Option<&mut ManagerState> {
        match self {
            Payload::Manager(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_drawer(&self) -> Option<&DrawerState> {
        match self {
            Payload::Drawer(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_drawer_mut(&mut self) -> Option<&mut DrawerState> {
        match self {
            Payload::Drawer(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_psu(&self) -> Option<&PsuState> {
        match self {
            Payload::Psu(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_psu_mut(&mut self) -> Option<&mut PsuState> {
        match self {
            Payload::Psu(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_fan_mut(&mut self) -> Option<&mut FanState> {
        match self {
            Payload::Fan(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_drive(&self) -> Option<&DriveState> {
        match self {
            Payload::Drive(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_drive_mut(&mut self) -> Option<&mut DriveState> {
        match self {
            Payload::Drive(s) => Some(s),
            _ => None,
        }
    }
}

// =============================================================================
// Resource Records
// =============================================================================

/// A persisted resource record.
///
/// Created with a volatile v4 uuid, rekeyed to its stable id before first
/// exposure, then mutated in place across cycles until removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Kind tag
    pub kind: ResourceKind,
    /// Primary key; stable once assigned by the identity resolver
    pub uuid: Uuid,
    /// Stable uuid of the parent record, None for root-scope records
    pub parent: Option<Uuid>,
    /// Coarse health status
    pub status: HealthStatus,
    /// Kind-specific state
    pub payload: Payload,
    /// Freshness counter, bumped on every confirmed presence
    pub touch_epoch: u64,
}

impl ResourceRecord {
    /// Create a new in-memory record with a volatile id.
    pub fn new(parent: Option<Uuid>, payload: Payload) -> Self {
        Self {
            kind: payload.kind(),
            uuid: Uuid::new_v4(),
            parent,
            status: HealthStatus::Unknown,
            payload,
            touch_epoch: 0,
        }
    }

    /// Full-field comparison, ignoring the touch epoch.
    ///
    /// Used by the store to distinguish Updated from Unchanged; the coarse
    /// status is compared separately.
    pub fn same_content(&self, other: &ResourceRecord) -> bool {
        self.parent == other.parent && self.payload == other.payload
    }
}

// =============================================================================
// Stable Keys
// =============================================================================

/// One hardware-derived disambiguator of a natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    /// Physical slot number
    Slot(u32),
    /// Sequential index
    Index(u32),
    /// Bus or bay address
    Address(String),
    /// Fixed singleton within the parent scope
    Singleton,
}

impl std::fmt::Display for KeyPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPart::Slot(n) => write!(f, "slot={}", n),
            KeyPart::Index(n) => write!(f, "index={}", n),
            KeyPart::Address(a) => write!(f, "addr={}", a),
            KeyPart::Singleton => write!(f, "singleton"),
        }
    }
}

/// Natural key of a record: kind, parent scope, and hardware disambiguators.
///
/// Identical keys always digest to the identical stable uuid, independent of
/// process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StableKey {
    pub kind: ResourceKind,
    pub parent: Option<Uuid>,
    pub parts: Vec<KeyPart>,
}

impl StableKey {
    pub fn new(kind: ResourceKind, parent: Option<Uuid>, parts: Vec<KeyPart>) -> Self {
        Self { kind, parent, parts }
    }

    /// Canonical rendering digested by the identity resolver.
    ///
    /// The format is part of the stable-identity contract: changing it would
    /// re-identify every resource in the fleet.
    pub fn canonical(&self) -> String {
        let parent = self
            .parent
            .map(|p| p.to_string())
            .unwrap_or_else(|| "root".to_string());
        let mut out = format!("{}/{}", self.kind, parent);
        for part in &self.parts {
            out.push('/');
            out.push_str(&part.to_string());
        }
        out
    }
}

impl std::fmt::Display for StableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

// =============================================================================
// Discovery Observations
// =============================================================================

/// Raw snapshot of one zone as the hardware reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneProbe {
    pub index: u32,
    pub label: Option<String>,
}

/// Raw snapshot of a zone management controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerProbe {
    pub firmware: Option<String>,
    pub uptime_seconds: Option<u64>,
    pub healthy: bool,
}

/// Raw snapshot of a drawer.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawerProbe {
    pub slot: u32,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub powered_on: bool,
    pub healthy: bool,
}

/// Raw snapshot of a power supply unit.
#[derive(Debug, Clone, PartialEq)]
pub struct PsuProbe {
    pub slot: u32,
    pub model: Option<String>,
    pub power_watts: Option<f64>,
    pub healthy: bool,
}

/// Raw snapshot of a cooling fan.
#[derive(Debug, Clone, PartialEq)]
pub struct FanProbe {
    pub index: u32,
    pub rpm: Option<u32>,
    pub duty_percent: Option<u8>,
    pub healthy: bool,
}

/// Raw snapshot of a disk drive.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveProbe {
    pub bay: String,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub capacity_bytes: u64,
    pub temperature_celsius: Option<i32>,
    pub percentage_used: Option<u8>,
    pub healthy: bool,
}

/// Kind-specific probe data inside an observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    Zone(ZoneProbe),
    Manager(ManagerProbe),
    Drawer(DrawerProbe),
    Psu(PsuProbe),
    Fan(FanProbe),
    Drive(DriveProbe),
}

impl Probe {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Probe::Zone(_) => ResourceKind::Zone,
            Probe::Manager(_) => ResourceKind::Manager,
            Probe::Drawer(_) => ResourceKind::Drawer,
            Probe::Psu(_) => ResourceKind::Psu,
            Probe::Fan(_) => ResourceKind::Fan,
            Probe::Drive(_) => ResourceKind::Drive,
        }
    }
}

/// Transient, per-cycle snapshot of what the hardware reports right now.
///
/// Never persisted; the reconciliation driver consumes it and discards it.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryObservation {
    pub kind: ResourceKind,
    /// Whether the component is physically present
    pub present: bool,
    pub probe: Probe,
}

impl DiscoveryObservation {
    /// Observation of a present component.
    pub fn present(probe: Probe) -> Self {
        Self {
            kind: probe.kind(),
            present: true,
            probe,
        }
    }

    /// Observation of a known-empty slot or vanished component.
    pub fn absent(probe: Probe) -> Self {
        Self {
            kind: probe.kind(),
            present: false,
            probe,
        }
    }
}

// =============================================================================
// Field Validation
// =============================================================================

/// Sanitize a string field reported by firmware.
///
/// Firmware occasionally returns padding garbage or raw register bytes in
/// identity strings. Returns None when the value is unusable, in which case
/// the caller drops the field and commits the rest of the record.
pub fn sanitize_label(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed
        .chars()
        .all(|c| !c.is_control() && (c.is_ascii_graphic() || c == ' '))
    {
        return None;
    }
    Some(trimmed.to_string())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parent_chain() {
        assert_eq!(ResourceKind::Zone.parent_kind(), None);
        assert_eq!(ResourceKind::Manager.parent_kind(), Some(ResourceKind::Zone));
        assert_eq!(ResourceKind::Psu.parent_kind(), Some(ResourceKind::Drawer));
        assert_eq!(ResourceKind::Drive.parent_kind(), Some(ResourceKind::Drawer));
    }

    #[test]
    fn test_stable_key_canonical() {
        let parent = Uuid::parse_str("6ba7b810-9dad-11d1-80b4-00c04fd430c8").unwrap();
        let key = StableKey::new(
            ResourceKind::Psu,
            Some(parent),
            vec![KeyPart::Slot(2)],
        );
        assert_eq!(
            key.canonical(),
            "psu/6ba7b810-9dad-11d1-80b4-00c04fd430c8/slot=2"
        );

        let root = StableKey::new(ResourceKind::Zone, None, vec![KeyPart::Index(0)]);
        assert_eq!(root.canonical(), "zone/root/index=0");
    }

    #[test]
    fn test_stable_key_singleton() {
        let parent = Uuid::new_v4();
        let key = StableKey::new(ResourceKind::Manager, Some(parent), vec![KeyPart::Singleton]);
        assert!(key.canonical().ends_with("/singleton"));
    }

    #[test]
    fn test_same_content_ignores_epoch() {
        let payload = Payload::Psu(PsuState {
            slot: 1,
            model: None,
            power_watts: Some(40.0),
        });
        let mut a = ResourceRecord::new(None, payload.clone());
        let mut b = a.clone();
        b.touch_epoch = 99;
        assert!(a.same_content(&b));

        a.payload = Payload::Psu(PsuState {
            slot: 1,
            model: None,
            power_watts: Some(41.0),
        });
        assert!(!a.same_content(&b));
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("  PSU-850W  "), Some("PSU-850W".to_string()));
        assert_eq!(sanitize_label(""), None);
        assert_eq!(sanitize_label("   "), None);
        assert_eq!(sanitize_label("bad\u{0007}serial"), None);
        assert_eq!(sanitize_label("ok model 1.2"), Some("ok model 1.2".to_string()));
    }

    #[test]
    fn test_remaining_life_percent() {
        let mut drive = DriveState {
            bay: "bay-0".to_string(),
            model: None,
            serial: None,
            capacity_bytes: 1024 * 1024 * 1024 * 1024,
            temperature_celsius: Some(40),
            percentage_used: Some(10),
        };
        assert_eq!(drive.remaining_life_percent(), Some(90));

        // Firmware may report past 100% at end of life.
        drive.percentage_used = Some(130);
        assert_eq!(drive.remaining_life_percent(), Some(0));

        drive.percentage_used = None;
        assert_eq!(drive.remaining_life_percent(), None);
    }
}
