use crate::model::DeviceCategory;
use crate::property::{Property, PropertyRepository, PropertySection, PropertyValue};

/// Attaches display metadata to freshly recognized properties.
pub trait PropertyProcessor {
    fn process(&self, repository: PropertyRepository, category: DeviceCategory)
        -> PropertyRepository;
}

/// Assigns sections from the top-level path segment, display names,
/// readable renderings and short descriptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionAnnotator;

impl PropertyProcessor for SectionAnnotator {
    fn process(
        &self,
        mut repository: PropertyRepository,
        category: DeviceCategory,
    ) -> PropertyRepository {
        if category == DeviceCategory::Nvme {
            add_nvme_smart_support(&mut repository);
        }

        let short_capacity = repository
            .lookup("user_capacity/bytes")
            .and_then(|property| property.value.as_integer())
            .map(format_decimal_size);

        for property in repository.properties_mut() {
            property.section = section_for(&property.path);
            property.displayable_name = displayable_name(&property.path);
            if let Some(readable) = readable_value(&property.path, &property.value) {
                property.readable_value = readable;
            }
            property.description = description(&property.path).map(str::to_string);
        }

        if let Some(short) = short_capacity {
            let mut property = Property::new("user_capacity/bytes/_short", PropertyValue::Empty)
                .with_readable(short)
                .with_section(PropertySection::Internal);
            property.displayable_name = "Capacity".to_string();
            repository.add(property);
        }
        repository
    }
}

/// NVMe has no SMART on/off switch; health data implies SMART is on.
fn add_nvme_smart_support(repository: &mut PropertyRepository) {
    if repository.lookup("smart_support/available").is_some()
        || repository.lookup("smart_status/passed").is_none()
    {
        return;
    }
    for path in ["smart_support/available", "smart_support/enabled"] {
        repository.add(Property::new(path, PropertyValue::Bool(true)));
    }
}

fn section_for(path: &str) -> PropertySection {
    let top = path.split('/').next().unwrap_or(path);
    match top {
        "smart_status" => PropertySection::OverallHealth,
        "_text_only" | "smartctl" | "json_format_version" | "local_time" => {
            PropertySection::Internal
        }
        "ata_smart_self_test_log" | "nvme_self_test_log" => PropertySection::SelftestLog,
        top if top.starts_with("scsi_self_test_") => PropertySection::SelftestLog,
        "ata_smart_selective_self_test_log" => PropertySection::SelectiveSelftestLog,
        "ata_smart_attributes" | "nvme_smart_health_information_log" => {
            PropertySection::Attributes
        }
        "ata_smart_error_log" | "nvme_error_information_log" | "scsi_error_counter_log" => {
            PropertySection::ErrorLog
        }
        "ata_smart_data" | "ata_sct_capabilities" | "ata_log_directory" => {
            PropertySection::Capabilities
        }
        "temperature" | "ata_sct_status" | "ata_sct_temperature_history" => {
            PropertySection::TemperatureLog
        }
        "ata_device_statistics" => PropertySection::Statistics,
        "sata_phy_event_counters" => PropertySection::PhyLog,
        _ => PropertySection::Info,
    }
}

const DISPLAY_NAMES: &[(&str, &str)] = &[
    ("model_name", "Device Model"),
    ("model_family", "Model Family"),
    ("scsi_model_name", "Product"),
    ("scsi_vendor", "Vendor"),
    ("serial_number", "Serial Number"),
    ("firmware_version", "Firmware Version"),
    ("user_capacity/bytes", "Capacity"),
    ("rotation_rate", "Rotation Rate"),
    ("device/type", "Device Type"),
    ("device/protocol", "Protocol"),
    ("smart_support/available", "SMART Supported"),
    ("smart_support/enabled", "SMART Enabled"),
    ("smart_status/passed", "Overall Health Self-Assessment Test"),
];

fn displayable_name(path: &str) -> String {
    if let Some((_, name)) = DISPLAY_NAMES.iter().find(|(known, _)| *known == path) {
        return name.to_string();
    }
    let segment = path
        .rsplit('/')
        .find(|segment| !segment.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(path);
    let words = segment.trim_start_matches('_').replace('_', " ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn readable_value(path: &str, value: &PropertyValue) -> Option<String> {
    match (path, value) {
        ("smart_status/passed", PropertyValue::Bool(passed)) => {
            Some(if *passed { "PASSED" } else { "FAILED" }.to_string())
        }
        ("rotation_rate", PropertyValue::Integer(0)) => Some("Solid State Device".to_string()),
        ("rotation_rate", PropertyValue::Integer(rpm)) => Some(format!("{rpm} RPM")),
        ("user_capacity/bytes", PropertyValue::Integer(bytes)) => Some(format!(
            "{} bytes [{}]",
            group_thousands(*bytes),
            format_decimal_size(*bytes)
        )),
        _ => None,
    }
}

fn description(path: &str) -> Option<&'static str> {
    match path {
        "smart_status/passed" => Some(
            "Overall health self-assessment reported by the drive. \
             A failed result means the drive predicts its own failure.",
        ),
        "rotation_rate" => Some("Spindle speed. Solid state devices report no rotation."),
        "smart_support/available" => Some("Whether the device implements SMART."),
        "smart_support/enabled" => Some("Whether SMART is currently switched on."),
        _ => None,
    }
}

/// Decimal (SI) units, the way drive vendors and smartctl label capacity.
pub fn format_decimal_size(bytes: i64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes.max(0) as f64;
    let mut unit = 0;
    while size >= 1000.0 && unit < UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes.max(0))
    } else {
        format!("{size:.2} {}", UNITS[unit])
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if value < 0 {
        grouped.insert(0, '-');
    }
    grouped
}
