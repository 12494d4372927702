use once_cell::sync::Lazy;
use regex::Regex;

use crate::classify::PARSER_DETECTED_TYPE_PATH;
use crate::error::RecognizerError;
use crate::model::{DeviceCategory, RecognizerKind};
use crate::property::{Property, PropertyRepository, PropertyValue};
use crate::recognize::Recognizer;
use crate::text_output::{
    add_string, capture, parse_digits, parse_hex, pattern, TextBasicRecognizer,
};

static ATA_ATTRIBUTES_REVISION: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^SMART Attributes Data Structure revision number:\s*(\d+)"));
static ATA_ATTRIBUTES_HEADER: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^ID#\s+ATTRIBUTE_NAME\s+FLAGS?\b.*$"));
static ATA_ERROR_LOG_EXTENDED: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?mi)^SMART Extended Comprehensive Error Log Version:\s*(\d+)")
});
static ATA_ERROR_LOG_SUMMARY: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^SMART Error Log Version:\s*(\d+)"));
static ATA_ERROR_COUNT: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^(?:Device Error Count|ATA Error Count):\s*(\d+)"));
static NO_ERRORS_LOGGED: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^No Errors Logged"));
static ATA_SELFTEST_EXTENDED: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^SMART Extended Self-test Log Version:\s*(\d+)"));
static ATA_SELFTEST_ENTRY: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?m)^#\s*\d+\s+(\S.*?)\s{2,}(\S.*?)\s{2,}(\d+)%\s+(\d+)"));

static NVME_HEALTH_HEADER: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^SMART/Health Information \(NVMe Log 0x02[^)]*\).*$"));
static NVME_ERROR_LOG: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?mi)^Error Information \(NVMe Log 0x01, (\d+) of (\d+) entries\)")
});
static NVME_SELFTEST_STATUS: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^Self-test status:[ \t]*(.*)$"));
static NVME_SELFTEST_ENTRY: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?mi)^\s*\d+\s+(Short|Extended|Vendor specific)\s+(\S.*?)\s{2,}(\d+)")
});

static SCSI_TEMPERATURE: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^Current Drive Temperature:\s*(\d+)\s*C"));
static SCSI_TRIP_TEMPERATURE: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^Drive Trip Temperature:\s*(\d+)\s*C"));
static SCSI_START_STOP: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^Accumulated start-stop cycles:\s*(\d+)"));
static SCSI_LOAD_UNLOAD: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^Accumulated load-unload cycles:\s*(\d+)"));
static SCSI_GROWN_DEFECTS: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^Elements in grown defect list:\s*(\d+)"));
static SCSI_POWER_ON: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?mi)^\s*Accumulated power on time, hours:minutes\s+(\d+):(\d+)")
});
static SCSI_ERROR_COUNTER_HEADER: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^Error counter log:"));
static SCSI_ERROR_COUNTER_ROW: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^(read|write|verify):\s+(.*)$"));
static SCSI_SELFTEST_ENTRY: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?mi)^#\s*(\d+)\s+((?:Background|Foreground) (?:short|long)|Default)\s+(\S.*?)\s{2,}")
});

const NVME_HEALTH_KEYS: &[(&str, &str)] = &[
    ("Critical Warning", "critical_warning"),
    ("Temperature", "temperature"),
    ("Available Spare", "available_spare"),
    ("Available Spare Threshold", "available_spare_threshold"),
    ("Percentage Used", "percentage_used"),
    ("Data Units Read", "data_units_read"),
    ("Data Units Written", "data_units_written"),
    ("Host Read Commands", "host_reads"),
    ("Host Write Commands", "host_writes"),
    ("Controller Busy Time", "controller_busy_time"),
    ("Power Cycles", "power_cycles"),
    ("Power On Hours", "power_on_hours"),
    ("Unsafe Shutdowns", "unsafe_shutdowns"),
    ("Media and Data Integrity Errors", "media_errors"),
    ("Error Information Log Entries", "num_err_log_entries"),
    ("Warning Comp. Temperature Time", "warning_temp_time"),
    ("Critical Comp. Temperature Time", "critical_comp_time"),
];

const SCSI_ERROR_COUNTER_KEYS: [&str; 7] = [
    "errors_corrected_by_eccfast",
    "errors_corrected_by_eccdelayed",
    "errors_corrected_by_rereads_rewrites",
    "total_errors_corrected",
    "correction_algorithm_invocations",
    "gigabytes_processed",
    "total_uncorrected_errors",
];

/// Reader for the text output of an exhaustive run. Everything the basic
/// reader finds is kept; the logs of the requested protocol are added under
/// the same paths the JSON output uses.
#[derive(Debug, Clone, Copy)]
pub struct TextFullRecognizer {
    kind: RecognizerKind,
}

impl TextFullRecognizer {
    pub fn new(kind: RecognizerKind) -> Self {
        Self { kind }
    }

    fn expected_category(&self) -> Option<DeviceCategory> {
        match self.kind {
            RecognizerKind::Basic => None,
            RecognizerKind::Ata => Some(DeviceCategory::AtaAny),
            RecognizerKind::Nvme => Some(DeviceCategory::Nvme),
            RecognizerKind::Scsi => Some(DeviceCategory::BasicScsi),
        }
    }

    /// Top-level paths that only the logs of a full run produce.
    fn full_probe_sections(&self) -> &'static [&'static str] {
        match self.kind {
            RecognizerKind::Basic => &[],
            RecognizerKind::Ata => &[
                "ata_smart_attributes",
                "ata_smart_error_log",
                "ata_smart_self_test_log",
            ],
            RecognizerKind::Nvme => &[
                "nvme_smart_health_information_log",
                "nvme_error_information_log",
                "nvme_self_test_log",
            ],
            RecognizerKind::Scsi => &[
                "scsi_error_counter_log",
                "scsi_grown_defect_list",
                "scsi_self_test_",
                "scsi_start_stop_cycle_counter",
            ],
        }
    }

    // Text output has no protocol field, only the marker left by the basic reader.
    fn check_device_type(&self, repository: &PropertyRepository) -> Result<(), RecognizerError> {
        let Some(expected) = self.expected_category() else {
            return Ok(());
        };
        let marker = repository
            .lookup(PARSER_DETECTED_TYPE_PATH)
            .and_then(|property| property.value.as_str());
        match marker {
            Some(name) if name != expected.storable_name() => {
                let found = DeviceCategory::from_storable_name(name, DeviceCategory::Unknown);
                Err(RecognizerError::new(format!(
                    "Output describes a {} device, expected {}.",
                    found.displayable_name(),
                    expected.displayable_name()
                )))
            }
            _ => Ok(()),
        }
    }
}

impl Recognizer for TextFullRecognizer {
    fn parse(&self, output: &str) -> Result<PropertyRepository, RecognizerError> {
        let mut repository = TextBasicRecognizer.parse(output)?;
        self.check_device_type(&repository)?;

        match self.kind {
            RecognizerKind::Basic => return Ok(repository),
            RecognizerKind::Ata => read_ata_logs(output, &mut repository),
            RecognizerKind::Nvme => read_nvme_logs(output, &mut repository),
            RecognizerKind::Scsi => read_scsi_logs(output, &mut repository),
        }

        let sections = self.full_probe_sections();
        let is_full = repository
            .properties()
            .iter()
            .any(|property| sections.iter().any(|section| property.path.starts_with(*section)));
        if !is_full {
            return Err(RecognizerError::new(
                "Output does not contain the results of a full probe.",
            ));
        }
        Ok(repository)
    }
}

fn read_ata_logs(output: &str, repository: &mut PropertyRepository) {
    if let Some(revision) =
        capture(&ATA_ATTRIBUTES_REVISION, output).and_then(|raw| parse_digits(&raw))
    {
        add_integer(repository, "ata_smart_attributes/revision", revision);
    }
    read_ata_attributes(output, repository);

    let extended_errors = capture(&ATA_ERROR_LOG_EXTENDED, output);
    let error_log = if extended_errors.is_some() { "extended" } else { "summary" };
    let revision = extended_errors.or_else(|| capture(&ATA_ERROR_LOG_SUMMARY, output));
    if let Some(revision) = revision.and_then(|raw| parse_digits(&raw)) {
        add_integer(
            repository,
            &format!("ata_smart_error_log/{error_log}/revision"),
            revision,
        );
        let count = capture(&ATA_ERROR_COUNT, output)
            .and_then(|raw| parse_digits(&raw))
            .or_else(|| NO_ERRORS_LOGGED.is_match(output).then_some(0));
        if let Some(count) = count {
            add_integer(repository, &format!("ata_smart_error_log/{error_log}/count"), count);
        }
    }

    let extended_selftests = capture(&ATA_SELFTEST_EXTENDED, output);
    let selftest_log = if extended_selftests.is_some() { "extended" } else { "standard" };
    if let Some(revision) = extended_selftests.and_then(|raw| parse_digits(&raw)) {
        add_integer(repository, "ata_smart_self_test_log/extended/revision", revision);
    }
    for (index, entry) in ATA_SELFTEST_ENTRY.captures_iter(output).enumerate() {
        let prefix = format!("ata_smart_self_test_log/{selftest_log}/table/{index}");
        add_string(repository, &format!("{prefix}/type/string"), entry[1].to_string());
        add_string(repository, &format!("{prefix}/status/string"), entry[2].to_string());
        if let Some(remaining) = parse_digits(&entry[3]) {
            add_integer(repository, &format!("{prefix}/status/remaining_percent"), remaining);
        }
        if let Some(hours) = parse_digits(&entry[4]) {
            add_integer(repository, &format!("{prefix}/lifetime_hours"), hours);
        }
    }
}

/// Handles both the `--format=brief` layout and the older one with
/// TYPE/UPDATED/WHEN_FAILED columns before the raw value.
fn read_ata_attributes(output: &str, repository: &mut PropertyRepository) {
    let Some(header) = ATA_ATTRIBUTES_HEADER.find(output) else {
        return;
    };
    let skipped = if header.as_str().contains("WHEN_FAILED") { 3 } else { 1 };

    let rows = section_lines(output, header.end())
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let id = tokens.first()?.parse::<i64>().ok()?;
            (tokens.len() > 6 + skipped).then_some((id, tokens))
        })
        .enumerate();
    for (index, (id, tokens)) in rows {
        let prefix = format!("ata_smart_attributes/table/{index}");
        add_integer(repository, &format!("{prefix}/id"), id);
        add_string(repository, &format!("{prefix}/name"), tokens[1].to_string());
        add_string(repository, &format!("{prefix}/flags/string"), tokens[2].to_string());
        for (offset, field) in ["value", "worst", "thresh"].into_iter().enumerate() {
            if let Ok(number) = tokens[3 + offset].parse::<i64>() {
                add_integer(repository, &format!("{prefix}/{field}"), number);
            }
        }
        add_string(
            repository,
            &format!("{prefix}/raw/string"),
            tokens[6 + skipped..].join(" "),
        );
    }
}

fn read_nvme_logs(output: &str, repository: &mut PropertyRepository) {
    if let Some(header) = NVME_HEALTH_HEADER.find(output) {
        for line in section_lines(output, header.end()) {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.split_whitespace().collect::<Vec<_>>().join(" ");
            let Some((_, field)) = NVME_HEALTH_KEYS.iter().find(|(name, _)| *name == key) else {
                continue;
            };
            if let Some(number) = leading_number(value) {
                add_integer(
                    repository,
                    &format!("nvme_smart_health_information_log/{field}"),
                    number,
                );
            }
        }
    }

    if let Some(entries) = NVME_ERROR_LOG.captures(output) {
        if let (Some(read), Some(size)) = (parse_digits(&entries[1]), parse_digits(&entries[2])) {
            add_integer(repository, "nvme_error_information_log/read", read);
            add_integer(repository, "nvme_error_information_log/size", size);
        }
    }

    if let Some(status) = capture(&NVME_SELFTEST_STATUS, output) {
        add_string(
            repository,
            "nvme_self_test_log/current_self_test_operation/string",
            status,
        );
    }
    for (index, entry) in NVME_SELFTEST_ENTRY.captures_iter(output).enumerate() {
        let prefix = format!("nvme_self_test_log/table/{index}");
        add_string(repository, &format!("{prefix}/self_test_code/string"), entry[1].to_string());
        add_string(repository, &format!("{prefix}/self_test_result/string"), entry[2].to_string());
        if let Some(hours) = parse_digits(&entry[3]) {
            add_integer(repository, &format!("{prefix}/power_on_hours"), hours);
        }
    }
}

fn read_scsi_logs(output: &str, repository: &mut PropertyRepository) {
    let counters: [(&Regex, &str); 5] = [
        (&*SCSI_TEMPERATURE, "temperature/current"),
        (&*SCSI_TRIP_TEMPERATURE, "temperature/drive_trip"),
        (&*SCSI_START_STOP, "scsi_start_stop_cycle_counter/accumulated_start_stop_cycles"),
        (&*SCSI_LOAD_UNLOAD, "scsi_start_stop_cycle_counter/accumulated_load_unload_cycles"),
        (&*SCSI_GROWN_DEFECTS, "scsi_grown_defect_list"),
    ];
    for (re, path) in counters {
        if let Some(number) = capture(re, output).and_then(|raw| parse_digits(&raw)) {
            add_integer(repository, path, number);
        }
    }

    if let Some(time) = SCSI_POWER_ON.captures(output) {
        if let (Some(hours), Some(minutes)) = (parse_digits(&time[1]), parse_digits(&time[2])) {
            add_integer(repository, "power_on_time/hours", hours);
            add_integer(repository, "power_on_time/minutes", minutes);
        }
    }

    if SCSI_ERROR_COUNTER_HEADER.is_match(output) {
        for row in SCSI_ERROR_COUNTER_ROW.captures_iter(output) {
            let operation = row[1].to_lowercase();
            let values = row[2].split_whitespace();
            for (key, value) in SCSI_ERROR_COUNTER_KEYS.iter().zip(values) {
                let path = format!("scsi_error_counter_log/{operation}/{key}");
                if *key == "gigabytes_processed" {
                    add_string(repository, &path, value.to_string());
                } else if let Some(number) = parse_digits(value) {
                    add_integer(repository, &path, number);
                }
            }
        }
    }

    for entry in SCSI_SELFTEST_ENTRY.captures_iter(output) {
        let Some(number) = parse_digits(&entry[1]).filter(|number| *number > 0) else {
            continue;
        };
        let prefix = format!("scsi_self_test_{}", number - 1);
        add_string(repository, &format!("{prefix}/code/string"), entry[2].to_string());
        add_string(repository, &format!("{prefix}/result/string"), entry[3].to_string());
    }
}

/// Lines after the one containing `offset`, up to the next blank line.
fn section_lines(output: &str, offset: usize) -> impl Iterator<Item = &str> {
    output[offset..]
        .lines()
        .skip(1)
        .take_while(|line| !line.trim().is_empty())
}

/// "0x00", "100%", "34 Celsius" and "1,234,567 [632 GB]" style values.
fn leading_number(raw: &str) -> Option<i64> {
    let first = raw.split_whitespace().next()?;
    if first.starts_with("0x") || first.starts_with("0X") {
        parse_hex(first)
    } else {
        parse_digits(first)
    }
}

fn add_integer(repository: &mut PropertyRepository, path: &str, value: i64) {
    repository.add(Property::new(path, PropertyValue::Integer(value)));
}

#[cfg(test)]
mod tests {
    use super::TextFullRecognizer;
    use crate::model::RecognizerKind;
    use crate::recognize::Recognizer;

    const NVME_FULL: &str = "smartctl 7.4 2023-08-01 r5530 [x86_64-linux-6.8.0] (local build)
=== START OF INFORMATION SECTION ===
Model Number:                       Samsung SSD 980 PRO 1TB
Serial Number:                      S5GXNF0R123456
PCI Vendor/Subsystem ID:            0x144d
Total NVM Capacity:                 1,000,204,886,016 [1.00 TB]

=== START OF SMART DATA SECTION ===
SMART overall-health self-assessment test result: PASSED

SMART/Health Information (NVMe Log 0x02)
Critical Warning:                   0x00
Temperature:                        41 Celsius
Available Spare:                    100%
Available Spare Threshold:          10%
Percentage Used:                    2%
Data Units Read:                    31,541,238 [16.1 TB]
Power On Hours:                     5,127
Unsafe Shutdowns:                   61
Warning  Comp. Temperature Time:    0

Error Information (NVMe Log 0x01, 16 of 64 entries)
No Errors Logged

Self-test Log (NVMe Log 0x06)
Self-test status: No self-test in progress
Num  Test_Description  Status                       Power_on_Hours  Failing_LBA  NSID Seg SCT Code
 0   Short             Completed without error                5120            -     -   -   -    -
";

    const SCSI_FULL: &str = "smartctl 7.4 2023-08-01 r5530 [x86_64-linux-6.8.0] (local build)
=== START OF INFORMATION SECTION ===
Vendor:               SEAGATE
Product:              ST4000NM0023
Serial number:        Z1Z0ABCD

=== START OF READ SMART DATA SECTION ===
SMART Health Status: OK

Current Drive Temperature:     33 C
Drive Trip Temperature:        68 C

Accumulated power on time, hours:minutes 41234:17
Accumulated start-stop cycles:  92
Elements in grown defect list: 3

Error counter log:
           Errors Corrected by           Total   Correction     Gigabytes    Total
               ECC          rereads/    errors   algorithm      processed    uncorrected
           fast | delayed   rewrites  corrected  invocations   [10^9 bytes]  errors
read:   123456        7         0    123463         7      98765.432           0
write:         0        0         0         0          0      54321.000           0

SMART Self-test log
Num  Test              Status                 segment  LifeTime  LBA_first_err [SK ASC ASQ]
     Description                              number   (hours)
# 1  Background short  Completed                   -   41200                 - [-   -    -]
";

    #[test]
    fn nvme_logs_use_json_paths() {
        let repository = TextFullRecognizer::new(RecognizerKind::Nvme)
            .parse(NVME_FULL)
            .expect("parses");
        let integer = |path: &str| repository.lookup(path).and_then(|p| p.value.as_integer());

        assert_eq!(integer("nvme_smart_health_information_log/temperature"), Some(41));
        assert_eq!(integer("nvme_smart_health_information_log/data_units_read"), Some(31_541_238));
        assert_eq!(integer("nvme_smart_health_information_log/power_on_hours"), Some(5127));
        assert_eq!(integer("nvme_smart_health_information_log/warning_temp_time"), Some(0));
        assert_eq!(integer("nvme_error_information_log/size"), Some(64));
        assert_eq!(integer("nvme_self_test_log/table/0/power_on_hours"), Some(5120));
        assert_eq!(
            repository
                .lookup("nvme_self_test_log/table/0/self_test_result/string")
                .and_then(|p| p.value.as_str()),
            Some("Completed without error")
        );
        assert!(repository.lookup("model_name").is_some());
    }

    #[test]
    fn scsi_logs_use_json_paths() {
        let repository = TextFullRecognizer::new(RecognizerKind::Scsi)
            .parse(SCSI_FULL)
            .expect("parses");
        let integer = |path: &str| repository.lookup(path).and_then(|p| p.value.as_integer());

        assert_eq!(integer("temperature/current"), Some(33));
        assert_eq!(integer("power_on_time/hours"), Some(41234));
        assert_eq!(integer("scsi_grown_defect_list"), Some(3));
        assert_eq!(
            integer("scsi_error_counter_log/read/total_errors_corrected"),
            Some(123_463)
        );
        assert_eq!(
            repository
                .lookup("scsi_error_counter_log/write/gigabytes_processed")
                .and_then(|p| p.value.as_str()),
            Some("54321.000")
        );
        assert_eq!(
            repository
                .lookup("scsi_self_test_0/code/string")
                .and_then(|p| p.value.as_str()),
            Some("Background short")
        );
    }

    #[test]
    fn information_section_alone_is_rejected() {
        let info = "smartctl 7.4 2023-08-01 r5530 [x86_64-linux-6.8.0] (local build)
Device Model:     Samsung SSD 860 EVO 500GB
ATA Version is:   ACS-4 T13/BSR INCITS 529 revision 5
SMART support is: Available - device has SMART capability.
SMART support is: Enabled
";
        let err = TextFullRecognizer::new(RecognizerKind::Ata)
            .parse(info)
            .expect_err("no logs");
        assert!(err.message.contains("full probe"));
    }

    #[test]
    fn marker_of_another_protocol_is_rejected() {
        let err = TextFullRecognizer::new(RecognizerKind::Ata)
            .parse(NVME_FULL)
            .expect_err("nvme output");
        assert_eq!(err.message, "Output describes a NVMe device, expected (S)ATA.");
    }
}
