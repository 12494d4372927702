use once_cell::sync::Lazy;
use regex::Regex;

use crate::classify::PARSER_DETECTED_TYPE_PATH;
use crate::error::RecognizerError;
use crate::model::DeviceCategory;
use crate::property::{Property, PropertyRepository, PropertyValue};
use crate::recognize::Recognizer;

pub(crate) fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("valid smartctl text pattern")
}

static VERSION: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^smartctl\s+(\S+)"));
static CD_DVD: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)this device: CD/DVD"));
static NVME_INFO: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^(?:NVMe Version|PCI Vendor/Subsystem ID):"));
static ATA_INFO: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^S?ATA Version is:"));
static SCSI_PRODUCT: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^Product:[ \t]*(.*)$"));
static SCSI_VENDOR: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^Vendor:[ \t]*(.*)$"));

static SMART_UNAVAILABLE: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        pattern(r"(?mi)^SMART support is:[ \t]*Unavailable"),
        pattern(r"(?mi)Device does not support SMART"),
        pattern(r"(?mi)Device Read Identity Failed \(not an ATA/ATAPI device\)"),
    ]
});
static SMART_AVAILABLE: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^SMART support is:[ \t]*(?:Available|Ambiguous)"));
static SMART_ENABLED: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^SMART support is:[ \t]*Enabled"));
static SMART_DISABLED: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^SMART support is:[ \t]*Disabled"));

static MODEL: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^(?:Device Model|Model Number):[ \t]*(.*)$"));
static USB_DEVICE: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^Device:[ \t]*(.*)$"));
static FAMILY: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^Model Family:[ \t]*(.*)$"));
static SERIAL: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^Serial number:[ \t]*(.*)$"));
static CAPACITY: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?mi)^(?:User Capacity|Total NVM Capacity):[ \t]*([0-9,.' \u{a0}]+?)[ \t]*bytes")
});
static ROTATION: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^Rotation Rate:[ \t]*(.*)$"));
static ATA_HEALTH: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^SMART overall-health self-assessment test result:[ \t]*(\S+)"));
static SCSI_HEALTH: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^SMART Health Status:[ \t]*(\S+)"));
static OFFLINE_STATUS: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^Offline data collection status:\s*\((0x[0-9a-f]+)\)"));
static OFFLINE_CAPABILITIES: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^capabilities:\s*\((0x[0-9a-f]+)\)"));
static SELFTEST_LOG: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^SMART Self-test log structure revision number\s+(\d+)"));

/// Loose reader for the legacy text output. It only needs the information
/// section, accepts any device type, and leaves a drive-type marker for the
/// classifier when the output reveals one.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextBasicRecognizer;

impl Recognizer for TextBasicRecognizer {
    fn parse(&self, output: &str) -> Result<PropertyRepository, RecognizerError> {
        if output.trim().is_empty() {
            return Err(RecognizerError::new("Cannot read information from an empty string."));
        }
        let Some(version) = capture(&VERSION, output) else {
            return Err(RecognizerError::new("Cannot get smartctl version information."));
        };

        let mut repository = PropertyRepository::new();
        add_string(&mut repository, "smartctl/version_string", version);

        if let Some(category) = detected_type(output) {
            add_string(
                &mut repository,
                PARSER_DETECTED_TYPE_PATH,
                category.storable_name().to_string(),
            );
        }

        read_smart_support(output, &mut repository);

        if let Some(model) = capture(&MODEL, output).or_else(|| capture(&USB_DEVICE, output)) {
            add_string(&mut repository, "model_name", model);
        }
        if let Some(product) = capture(&SCSI_PRODUCT, output) {
            add_string(&mut repository, "scsi_model_name", product);
        }
        if let Some(vendor) = capture(&SCSI_VENDOR, output) {
            add_string(&mut repository, "scsi_vendor", vendor);
        }
        if let Some(family) = capture(&FAMILY, output) {
            add_string(&mut repository, "model_family", family);
        }
        if let Some(serial) = capture(&SERIAL, output) {
            add_string(&mut repository, "serial_number", serial);
        }
        if let Some(bytes) = capture(&CAPACITY, output).and_then(|raw| parse_digits(&raw)) {
            repository.add(Property::new(
                "user_capacity/bytes",
                PropertyValue::Integer(bytes),
            ));
        }
        if let Some(rpm) = capture(&ROTATION, output).and_then(|raw| parse_rotation(&raw)) {
            repository.add(Property::new("rotation_rate", PropertyValue::Integer(rpm)));
        }

        let health = capture(&ATA_HEALTH, output)
            .map(|result| result.eq_ignore_ascii_case("PASSED"))
            .or_else(|| {
                capture(&SCSI_HEALTH, output).map(|result| result.eq_ignore_ascii_case("OK"))
            });
        if let Some(passed) = health {
            repository.add(Property::new(
                "smart_status/passed",
                PropertyValue::Bool(passed),
            ));
        }

        if let Some(value) = capture(&OFFLINE_STATUS, output).and_then(|raw| parse_hex(&raw)) {
            repository.add(Property::new(
                "ata_smart_data/offline_data_collection/status/value",
                PropertyValue::Integer(value),
            ));
        }
        if let Some(value) =
            capture(&OFFLINE_CAPABILITIES, output).and_then(|raw| parse_hex(&raw))
        {
            repository.add(Property::new(
                "ata_smart_data/capabilities/values/0",
                PropertyValue::Integer(value),
            ));
        }
        if let Some(revision) = capture(&SELFTEST_LOG, output).and_then(|raw| parse_digits(&raw)) {
            repository.add(Property::new(
                "ata_smart_self_test_log/standard/revision",
                PropertyValue::Integer(revision),
            ));
        }

        Ok(repository)
    }
}

// Note: text output cannot tell SATA from SCSI when run with "-d ata".
fn detected_type(output: &str) -> Option<DeviceCategory> {
    if CD_DVD.is_match(output) {
        Some(DeviceCategory::CdDvd)
    } else if NVME_INFO.is_match(output) {
        Some(DeviceCategory::Nvme)
    } else if ATA_INFO.is_match(output) {
        Some(DeviceCategory::AtaAny)
    } else if SCSI_PRODUCT.is_match(output) {
        Some(DeviceCategory::BasicScsi)
    } else {
        None
    }
}

fn read_smart_support(output: &str, repository: &mut PropertyRepository) {
    let mut set = |path: &str, flag: bool| {
        repository.add(Property::new(path, PropertyValue::Bool(flag)));
    };

    if SMART_UNAVAILABLE.iter().any(|re| re.is_match(output)) {
        set("smart_support/available", false);
        set("smart_support/enabled", false);
    } else if SMART_AVAILABLE.is_match(output) {
        set("smart_support/available", true);
        if SMART_ENABLED.is_match(output) {
            set("smart_support/enabled", true);
        } else if SMART_DISABLED.is_match(output) {
            set("smart_support/enabled", false);
        }
    }
}

pub(crate) fn add_string(repository: &mut PropertyRepository, path: &str, value: String) {
    repository.add(Property::new(path, PropertyValue::String(value)));
}

/// First capture group, trimmed, with runs of spaces collapsed.
pub(crate) fn capture(re: &Regex, output: &str) -> Option<String> {
    let raw = re.captures(output)?.get(1)?.as_str();
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

pub(crate) fn parse_digits(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn parse_rotation(raw: &str) -> Option<i64> {
    if raw.to_lowercase().contains("solid state") {
        return Some(0);
    }
    let leading: String = raw.chars().take_while(char::is_ascii_digit).collect();
    leading.parse().ok()
}

pub(crate) fn parse_hex(raw: &str) -> Option<i64> {
    i64::from_str_radix(raw.trim_start_matches("0x").trim_start_matches("0X"), 16).ok()
}
