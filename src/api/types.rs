//! Domain and wire types exchanged with the Lambda Cloud API.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::spec::family_of_type_name;

/// Placeholder some API revisions return instead of an address.
const PLACEHOLDER_IP: &str = "null";

/// Lifecycle status reported for an instance.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// The provider accepted the launch and is allocating hardware.
    Booking,
    /// The instance is running.
    Active,
    /// The instance is gone.
    Terminated,
    /// The provider gave up on the instance.
    Failed,
    /// Any status this tool does not model explicitly.
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    /// Whether the status can never lead to a usable instance.
    #[must_use]
    pub const fn is_terminal_failure(self) -> bool {
        matches!(self, Self::Terminated | Self::Failed)
    }

    /// Lowercase label matching the API representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Booking => "booking",
            Self::Active => "active",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instance as observed through the list endpoint.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(from = "InstanceWire")]
pub struct Instance {
    /// Provider-assigned unique identifier.
    pub id: String,
    /// Display name; not guaranteed unique.
    pub name: String,
    /// Public IPv4 address once assigned.
    pub ip: Option<String>,
    /// Current lifecycle status.
    pub status: InstanceStatus,
    /// Region the instance runs in.
    pub region: String,
    /// Provider instance type name (for example `gpu_1x_a100`).
    pub instance_type_name: String,
    /// Hourly price in US cents when the API reports it.
    pub price_cents_per_hour: Option<u64>,
}

impl Instance {
    /// Returns the IP when it is present and not a placeholder.
    #[must_use]
    pub fn usable_ip(&self) -> Option<&str> {
        self.ip
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty() && *ip != PLACEHOLDER_IP)
    }

    /// An instance is ready once it is active and reachable.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == InstanceStatus::Active && self.usable_ip().is_some()
    }

    /// GPU family token derived from the type name, e.g. `a100`.
    #[must_use]
    pub fn family(&self) -> Option<&str> {
        family_of_type_name(&self.instance_type_name)
    }
}

#[derive(Deserialize)]
struct InstanceWire {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    ip: Option<String>,
    status: InstanceStatus,
    #[serde(default)]
    region: Option<RegionWire>,
    #[serde(default)]
    instance_type: Option<InstanceTypeWire>,
    #[serde(default)]
    instance_type_name: Option<String>,
}

impl From<InstanceWire> for Instance {
    fn from(wire: InstanceWire) -> Self {
        let (type_name, price) = match wire.instance_type {
            Some(details) if !details.name.is_empty() => {
                (Some(details.name), details.price_cents_per_hour)
            }
            Some(details) => (None, details.price_cents_per_hour),
            None => (None, None),
        };
        Self {
            id: wire.id,
            name: wire.name.unwrap_or_default(),
            ip: wire.ip,
            status: wire.status,
            region: wire.region.map(|region| region.name).unwrap_or_default(),
            instance_type_name: type_name.or(wire.instance_type_name).unwrap_or_default(),
            price_cents_per_hour: price,
        }
    }
}

/// Catalog entry describing an instance type and where it can launch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceTypeEntry {
    /// Provider type name, e.g. `gpu_2x_h100_sxm5`.
    pub type_name: String,
    /// Human readable GPU description.
    pub gpu_description: String,
    /// Hourly price in US cents when reported.
    pub price_cents_per_hour: Option<u64>,
    /// Regions that currently have capacity, in API order.
    pub regions_with_capacity: Vec<String>,
}

impl InstanceTypeEntry {
    /// Whether `region` currently has capacity for this type.
    #[must_use]
    pub fn has_capacity_in(&self, region: &str) -> bool {
        self.regions_with_capacity.iter().any(|name| name == region)
    }
}

/// Provider-managed persistent filesystem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filesystem {
    /// Provider identifier, when returned.
    pub id: Option<String>,
    /// Filesystem name.
    pub name: String,
    /// Region hosting the filesystem.
    pub region: String,
}

/// Launch parameters submitted to the instance-operations endpoint.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Target region.
    pub region_name: String,
    /// Provider instance type name.
    pub instance_type_name: String,
    /// SSH keys registered with the provider to install on the instance.
    pub ssh_key_names: Vec<String>,
    /// Filesystems to attach.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_system_names: Vec<String>,
    /// Instance name.
    pub name: String,
}

#[derive(Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub(crate) data: T,
}

#[derive(Clone, Deserialize)]
pub(crate) struct RegionWire {
    pub(crate) name: String,
}

#[derive(Clone, Deserialize)]
pub(crate) struct InstanceTypeWire {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) gpu_description: String,
    #[serde(default)]
    pub(crate) price_cents_per_hour: Option<u64>,
}

#[derive(Deserialize)]
pub(crate) struct InstanceTypeAvailability {
    pub(crate) instance_type: InstanceTypeWire,
    #[serde(default)]
    pub(crate) regions_with_capacity_available: Vec<RegionWire>,
}

pub(crate) type InstanceTypeCatalog = BTreeMap<String, InstanceTypeAvailability>;

pub(crate) fn catalog_entries(catalog: InstanceTypeCatalog) -> Vec<InstanceTypeEntry> {
    catalog
        .into_iter()
        .map(|(key, availability)| {
            let name = if availability.instance_type.name.is_empty() {
                key
            } else {
                availability.instance_type.name
            };
            InstanceTypeEntry {
                type_name: name,
                gpu_description: availability.instance_type.gpu_description,
                price_cents_per_hour: availability.instance_type.price_cents_per_hour,
                regions_with_capacity: availability
                    .regions_with_capacity_available
                    .into_iter()
                    .map(|region| region.name)
                    .collect(),
            }
        })
        .collect()
}

#[derive(Deserialize)]
pub(crate) struct FilesystemWire {
    #[serde(default)]
    pub(crate) id: Option<String>,
    pub(crate) name: NameField,
    #[serde(default)]
    pub(crate) region: Option<RegionWire>,
}

/// The create endpoint has answered with both a bare name and a one-element
/// list.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum NameField {
    Single(String),
    List(Vec<String>),
}

impl NameField {
    pub(crate) fn into_name(self) -> String {
        match self {
            Self::Single(name) => name,
            Self::List(names) => names.into_iter().next().unwrap_or_default(),
        }
    }
}

impl FilesystemWire {
    pub(crate) fn into_filesystem(self, fallback_region: &str) -> Filesystem {
        Filesystem {
            id: self.id,
            name: self.name.into_name(),
            region: self
                .region
                .map_or_else(|| fallback_region.to_owned(), |region| region.name),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct CreateFilesystemRequest<'a> {
    pub(crate) region_name: &'a str,
    pub(crate) name: [&'a str; 1],
}

#[derive(Deserialize)]
pub(crate) struct LaunchResponse {
    #[serde(default)]
    pub(crate) instance_ids: Vec<String>,
}

#[derive(Serialize)]
pub(crate) struct InstanceIdsRequest<'a> {
    pub(crate) instance_ids: &'a [String],
}

/// Affected instances come back either as full objects or as bare IDs.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum InstanceRef {
    Object { id: String },
    Id(String),
}

impl InstanceRef {
    fn into_id(self) -> String {
        match self {
            Self::Object { id } | Self::Id(id) => id,
        }
    }
}

#[derive(Default, Deserialize)]
pub(crate) struct OperationData {
    #[serde(
        default,
        rename = "terminated_instances",
        alias = "restarted_instances"
    )]
    affected: Option<Vec<InstanceRef>>,
    #[serde(
        default,
        rename = "terminated_instance_ids",
        alias = "restarted_instance_ids"
    )]
    affected_ids: Option<Vec<String>>,
}

impl OperationData {
    pub(crate) fn into_ids(self) -> Vec<String> {
        match (self.affected, self.affected_ids) {
            (Some(refs), _) if !refs.is_empty() => {
                refs.into_iter().map(InstanceRef::into_id).collect()
            }
            (_, Some(ids)) => ids,
            _ => Vec::new(),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub(crate) error: ErrorBody,
}

#[derive(Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub(crate) code: Option<String>,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) suggestion: Option<String>,
}
