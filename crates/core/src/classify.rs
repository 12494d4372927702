use tracing::{debug, warn};

use crate::model::DeviceCategory;
use crate::property::PropertyRepository;

/// Set by the text recognizer when the output itself reveals the drive type.
pub const PARSER_DETECTED_TYPE_PATH: &str = "_text_only/custom/parser_detected_drive_type";

/// Narrows `existing` using whatever the repository reveals about the device.
///
/// The first decisive signal wins: the text recognizer's marker, then the
/// JSON `device/type` and `device/protocol` pair. Without a decision the
/// existing category is kept, except that `Unknown` and `NeedsExplicitType`
/// become `BasicScsi`, which drives the most conservative probe set.
pub fn refine_category(
    existing: DeviceCategory,
    repository: &PropertyRepository,
    device_path: &str,
) -> DeviceCategory {
    let refined = marker_category(repository)
        .or_else(|| structured_category(repository, device_path))
        .unwrap_or(match existing {
            DeviceCategory::Unknown | DeviceCategory::NeedsExplicitType => {
                DeviceCategory::BasicScsi
            }
            other => other,
        });

    debug!(
        "device {} classified as {}",
        device_path,
        refined.storable_name()
    );
    refined
}

fn marker_category(repository: &PropertyRepository) -> Option<DeviceCategory> {
    let marker = repository.lookup(PARSER_DETECTED_TYPE_PATH)?;
    let name = marker.value.as_str().unwrap_or_default();
    match DeviceCategory::from_storable_name(name, DeviceCategory::BasicScsi) {
        DeviceCategory::AtaAny => Some(ata_by_rotation(repository)),
        category => Some(category),
    }
}

fn structured_category(
    repository: &PropertyRepository,
    device_path: &str,
) -> Option<DeviceCategory> {
    let device_type = lowercase_string(repository, "device/type");
    let protocol = lowercase_string(repository, "device/protocol");
    if device_type.is_none() && protocol.is_none() {
        return None;
    }
    let device_type = device_type.unwrap_or_default();
    let protocol = protocol.unwrap_or_default();

    // NVMe behind a USB bridge reports a bridge type (e.g. "sntrealtek")
    // with protocol "nvme", so protocol is checked alongside the type.
    if device_type == "scsi" {
        return Some(scsi_or_optical(device_path));
    }
    if device_type == "sat" || protocol == "ata" {
        return Some(ata_by_rotation(repository));
    }
    if device_type == "nvme" || protocol == "nvme" {
        return Some(DeviceCategory::Nvme);
    }
    if protocol == "scsi" {
        return Some(scsi_or_optical(device_path));
    }

    warn!(
        "unsupported type {:?} (protocol {:?}) reported by smartctl for {}",
        device_type, protocol, device_path
    );
    None
}

fn scsi_or_optical(device_path: &str) -> DeviceCategory {
    if is_optical_device_name(device_path) {
        DeviceCategory::CdDvd
    } else {
        DeviceCategory::BasicScsi
    }
}

/// Rotation rate absent or zero means solid state.
fn ata_by_rotation(repository: &PropertyRepository) -> DeviceCategory {
    let rpm = repository
        .lookup("rotation_rate")
        .and_then(|property| property.value.as_integer())
        .unwrap_or(0);
    if rpm == 0 {
        DeviceCategory::AtaSsd
    } else {
        DeviceCategory::AtaHdd
    }
}

fn lowercase_string(repository: &PropertyRepository, path: &str) -> Option<String> {
    repository
        .lookup(path)
        .and_then(|property| property.value.as_str())
        .map(|value| value.trim().to_lowercase())
}

/// Linux names optical drives `sr0`, `scd0`, or links them as `cdrom`/`dvd`.
pub fn is_optical_device_name(device_path: &str) -> bool {
    let base = device_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(device_path)
        .to_lowercase();
    let numbered = |prefix: &str| {
        base.strip_prefix(prefix)
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
    };
    numbered("sr") || numbered("scd") || base.starts_with("cdrom") || base.starts_with("dvd")
}
