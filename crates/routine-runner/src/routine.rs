//! Routine identifiers and the units a run is made of.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single hardware diagnostic routine known to the execution service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineType {
    /// Battery charge rate test
    BatteryCharge,
    /// Battery discharge rate test
    BatteryDischarge,
    /// CPU cache test
    CpuCache,
    /// CPU stress test
    CpuStress,
    /// CPU floating point accuracy test
    CpuFloatingPoint,
    /// CPU prime search test
    CpuPrime,
    /// Memory test
    Memory,
    /// LAN connectivity check
    LanConnectivity,
    /// Wi-Fi signal strength check
    SignalStrength,
    /// Default gateway reachability check
    GatewayCanBePinged,
    /// Wi-Fi security check
    HasSecureWiFiConnection,
    /// DNS resolver presence check
    DnsResolverPresent,
    /// DNS latency check
    DnsLatency,
    /// DNS resolution check
    DnsResolution,
    /// Captive portal check
    CaptivePortal,
    /// HTTP firewall check
    HttpFirewall,
    /// HTTPS firewall check
    HttpsFirewall,
    /// HTTPS latency check
    HttpsLatency,
    /// Android container HTTP check
    ArcHttp,
    /// Android container ping check
    ArcPing,
    /// Android container DNS resolution check
    ArcDnsResolution,
}

impl RoutineType {
    /// Every routine, in declaration order
    pub const ALL: [Self; 21] = [
        Self::BatteryCharge,
        Self::BatteryDischarge,
        Self::CpuCache,
        Self::CpuStress,
        Self::CpuFloatingPoint,
        Self::CpuPrime,
        Self::Memory,
        Self::LanConnectivity,
        Self::SignalStrength,
        Self::GatewayCanBePinged,
        Self::HasSecureWiFiConnection,
        Self::DnsResolverPresent,
        Self::DnsLatency,
        Self::DnsResolution,
        Self::CaptivePortal,
        Self::HttpFirewall,
        Self::HttpsFirewall,
        Self::HttpsLatency,
        Self::ArcHttp,
        Self::ArcPing,
        Self::ArcDnsResolution,
    ];

    /// Category that determines the shape of this routine's result
    #[must_use]
    pub const fn category(self) -> RoutineCategory {
        match self {
            Self::BatteryCharge | Self::BatteryDischarge => RoutineCategory::Power,
            _ => RoutineCategory::Standard,
        }
    }

    /// Whether this routine reports a power result
    #[must_use]
    pub const fn is_power(self) -> bool {
        matches!(self.category(), RoutineCategory::Power)
    }

    /// Human-readable routine name
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::BatteryCharge => "Battery charge",
            Self::BatteryDischarge => "Battery discharge",
            Self::CpuCache => "CPU cache",
            Self::CpuStress => "CPU stress",
            Self::CpuFloatingPoint => "CPU floating point accuracy",
            Self::CpuPrime => "CPU prime search",
            Self::Memory => "Memory",
            Self::LanConnectivity => "LAN connectivity",
            Self::SignalStrength => "Signal strength",
            Self::GatewayCanBePinged => "Gateway can be pinged",
            Self::HasSecureWiFiConnection => "Secure Wi-Fi connection",
            Self::DnsResolverPresent => "DNS resolver present",
            Self::DnsLatency => "DNS latency",
            Self::DnsResolution => "DNS resolution",
            Self::CaptivePortal => "Captive portal",
            Self::HttpFirewall => "HTTP firewall",
            Self::HttpsFirewall => "HTTPS firewall",
            Self::HttpsLatency => "HTTPS latency",
            Self::ArcHttp => "ARC HTTP",
            Self::ArcPing => "ARC ping",
            Self::ArcDnsResolution => "ARC DNS resolution",
        }
    }
}

impl fmt::Display for RoutineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Result shape of a routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineCategory {
    /// Pass/fail outcome
    Standard,
    /// Pass/fail plus battery delta metrics
    Power,
}

/// A routine inside a group, with its blocking flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineProperties {
    /// Routine to run
    pub routine: RoutineType,
    /// Whether a failure aborts the remainder of the run
    pub blocking: bool,
}

impl RoutineProperties {
    /// Create group member properties
    #[must_use]
    pub const fn new(routine: RoutineType, blocking: bool) -> Self {
        Self { routine, blocking }
    }

    /// Create a blocking member
    #[must_use]
    pub const fn blocking(routine: RoutineType) -> Self {
        Self::new(routine, true)
    }

    /// Create a non-blocking member
    #[must_use]
    pub const fn non_blocking(routine: RoutineType) -> Self {
        Self::new(routine, false)
    }
}

/// A named, ordered set of routines displayed as one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineGroup {
    /// Group label
    pub label: String,
    /// Members in execution order
    pub routines: Vec<RoutineProperties>,
}

impl RoutineGroup {
    /// Create a new group
    #[must_use]
    pub fn new(routines: Vec<RoutineProperties>, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            routines,
        }
    }

    /// Number of members
    #[must_use]
    pub fn len(&self) -> usize {
        self.routines.len()
    }

    /// Whether the group has no members
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }
}

/// One entry of a run: a single routine or a routine group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineUnit {
    /// A standalone routine
    Single(RoutineType),
    /// A group of routines with an aggregate verdict
    Group(RoutineGroup),
}

impl RoutineUnit {
    /// Create a group unit
    #[must_use]
    pub fn group(routines: Vec<RoutineProperties>, label: impl Into<String>) -> Self {
        Self::Group(RoutineGroup::new(routines, label))
    }

    /// Routine ids of this unit, in execution order
    #[must_use]
    pub fn routines(&self) -> Vec<RoutineType> {
        match self {
            Self::Single(routine) => vec![*routine],
            Self::Group(group) => group.routines.iter().map(|p| p.routine).collect(),
        }
    }

    /// Number of routines this unit dispatches
    #[must_use]
    pub fn routine_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Group(group) => group.len(),
        }
    }

    /// Routine at `member`, if any
    #[must_use]
    pub fn routine_at(&self, member: usize) -> Option<RoutineType> {
        match self {
            Self::Single(routine) => (member == 0).then_some(*routine),
            Self::Group(group) => group.routines.get(member).map(|p| p.routine),
        }
    }

    /// Whether this is a single power routine
    #[must_use]
    pub const fn is_power_unit(&self) -> bool {
        matches!(self, Self::Single(routine) if routine.is_power())
    }

    /// Label for logs: the group label or the routine name
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Single(routine) => routine.display_name().to_string(),
            Self::Group(group) => group.label.clone(),
        }
    }
}

impl From<RoutineType> for RoutineUnit {
    fn from(routine: RoutineType) -> Self {
        Self::Single(routine)
    }
}

impl From<RoutineGroup> for RoutineUnit {
    fn from(group: RoutineGroup) -> Self {
        Self::Group(group)
    }
}
