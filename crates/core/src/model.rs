use serde::{Deserialize, Serialize};

use crate::property::Property;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCategory {
    #[default]
    Unknown,
    /// smartctl could not auto-detect the device; a `-d` type must be given.
    NeedsExplicitType,
    AtaAny,
    AtaHdd,
    AtaSsd,
    Nvme,
    BasicScsi,
    CdDvd,
    UnsupportedRaid,
}

impl DeviceCategory {
    pub const ALL: [DeviceCategory; 9] = [
        DeviceCategory::Unknown,
        DeviceCategory::NeedsExplicitType,
        DeviceCategory::AtaAny,
        DeviceCategory::AtaHdd,
        DeviceCategory::AtaSsd,
        DeviceCategory::Nvme,
        DeviceCategory::BasicScsi,
        DeviceCategory::CdDvd,
        DeviceCategory::UnsupportedRaid,
    ];

    /// Name used by the text recognizer marker and in saved state.
    pub fn storable_name(self) -> &'static str {
        match self {
            DeviceCategory::Unknown => "unknown",
            DeviceCategory::NeedsExplicitType => "needs_explicit_type",
            DeviceCategory::AtaAny => "any_ata",
            DeviceCategory::AtaHdd => "ata_hdd",
            DeviceCategory::AtaSsd => "ata_ssd",
            DeviceCategory::Nvme => "nvme",
            DeviceCategory::BasicScsi => "basic_scsi",
            DeviceCategory::CdDvd => "cddvd",
            DeviceCategory::UnsupportedRaid => "unsupported_raid",
        }
    }

    pub fn from_storable_name(name: &str, fallback: DeviceCategory) -> DeviceCategory {
        Self::ALL
            .into_iter()
            .find(|category| category.storable_name() == name)
            .unwrap_or(fallback)
    }

    pub fn displayable_name(self) -> &'static str {
        match self {
            DeviceCategory::Unknown => "Unknown",
            DeviceCategory::NeedsExplicitType => "Needs explicit type",
            DeviceCategory::AtaAny => "(S)ATA",
            DeviceCategory::AtaHdd => "(S)ATA HDD",
            DeviceCategory::AtaSsd => "(S)ATA SSD",
            DeviceCategory::Nvme => "NVMe",
            DeviceCategory::BasicScsi => "SCSI / USB",
            DeviceCategory::CdDvd => "CD/DVD",
            DeviceCategory::UnsupportedRaid => "Unsupported RAID",
        }
    }

    pub fn is_ata(self) -> bool {
        matches!(
            self,
            DeviceCategory::AtaAny | DeviceCategory::AtaHdd | DeviceCategory::AtaSsd
        )
    }

    /// Whether the category is concrete enough to pick a full probe.
    pub fn is_resolved(self) -> bool {
        !matches!(
            self,
            DeviceCategory::Unknown | DeviceCategory::NeedsExplicitType
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    #[default]
    None,
    Basic,
    Full,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SmartStatus {
    Enabled,
    Disabled,
    Unsupported,
}

impl SmartStatus {
    pub fn displayable_name(self) -> &'static str {
        match self {
            SmartStatus::Enabled => "Enabled",
            SmartStatus::Disabled => "Disabled",
            SmartStatus::Unsupported => "Unsupported",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelfTestSupport {
    Unknown,
    Supported,
    Unsupported,
}

/// Automatic offline data collection ("scheduled test mode") state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AutoOfflineStatus {
    Enabled,
    Disabled,
    Unsupported,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Text,
    #[default]
    Json,
}

/// Recognizer variant. `Basic` understands every device type but only
/// extracts identity and health; the others expect full probe output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerKind {
    Basic,
    Ata,
    Nvme,
    Scsi,
}

/// Read-only view of a device for presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSnapshot {
    pub device: String,
    pub display_name: String,
    pub is_virtual: bool,
    pub type_argument: Option<String>,
    pub detected_type: DeviceCategory,
    pub parse_status: ParseStatus,
    pub test_is_active: bool,
    pub model_name: Option<String>,
    pub family_name: Option<String>,
    pub serial_number: Option<String>,
    pub size: Option<String>,
    pub smart_status: SmartStatus,
    pub smart_switch_supported: bool,
    pub self_test_support: SelfTestSupport,
    pub auto_offline_status: AutoOfflineStatus,
    #[serde(default)]
    pub health: Option<Property>,
    #[serde(default)]
    pub property_count: usize,
    #[serde(default)]
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::DeviceCategory;

    #[test]
    fn storable_names_round_trip_for_every_category() {
        for category in DeviceCategory::ALL {
            assert_eq!(
                DeviceCategory::from_storable_name(category.storable_name(), DeviceCategory::Unknown),
                category
            );
        }
    }

    #[test]
    fn unknown_storable_name_uses_fallback() {
        assert_eq!(
            DeviceCategory::from_storable_name("megaraid", DeviceCategory::BasicScsi),
            DeviceCategory::BasicScsi
        );
    }
}
