use serde_json::{Map, Value};

use crate::error::RecognizerError;
use crate::model::RecognizerKind;
use crate::property::{Property, PropertyRepository, PropertyValue};
use crate::recognize::Recognizer;

/// Subtrees that only duplicate information found elsewhere.
const SKIPPED_PATHS: &[&str] = &["smartctl/output", "smartctl/argv", "local_time/asctime"];

/// smartctl options that make a run exhaustive for every protocol.
const FULL_PROBE_OPTIONS: &[&str] = &["--xall", "-x", "--all", "-a", "--attributes", "-A"];

/// Reads `smartctl --json` documents by flattening them into `/`-joined
/// property paths; array elements get their index as a path segment.
#[derive(Debug, Clone, Copy)]
pub struct JsonRecognizer {
    kind: RecognizerKind,
}

impl JsonRecognizer {
    pub fn new(kind: RecognizerKind) -> Self {
        Self { kind }
    }

    fn check_protocol(&self, repository: &PropertyRepository) -> Result<(), RecognizerError> {
        let expected = match self.kind {
            RecognizerKind::Basic => return Ok(()),
            RecognizerKind::Ata => "ata",
            RecognizerKind::Nvme => "nvme",
            RecognizerKind::Scsi => "scsi",
        };
        let protocol = repository
            .lookup("device/protocol")
            .and_then(|property| property.value.as_str())
            .map(str::to_lowercase);
        match protocol {
            Some(protocol) if protocol == expected => Ok(()),
            Some(protocol) => Err(RecognizerError::new(format!(
                "Output describes a {} device, expected {}.",
                protocol,
                expected.to_uppercase()
            ))),
            None => Err(RecognizerError::new("Output does not report a device protocol.")),
        }
    }

    /// Top-level sections that a basic info/health run never emits.
    fn full_probe_sections(&self) -> &'static [&'static str] {
        match self.kind {
            RecognizerKind::Basic => &[],
            RecognizerKind::Ata => &[
                "ata_smart_attributes",
                "ata_smart_self_test_log",
                "ata_smart_error_log",
            ],
            RecognizerKind::Nvme => &["nvme_error_information_log", "nvme_self_test_log"],
            RecognizerKind::Scsi => &[
                "scsi_error_counter_log",
                "scsi_grown_defect_list",
                "scsi_self_test_0",
                "scsi_start_stop_cycle_counter",
                "scsi_background_scan",
            ],
        }
    }

    /// A specialized variant only accepts output of an exhaustive run.
    fn check_full_probe(&self, root: &Map<String, Value>) -> Result<(), RecognizerError> {
        if self.kind == RecognizerKind::Basic {
            return Ok(());
        }
        let has_section = self
            .full_probe_sections()
            .iter()
            .any(|key| root.contains_key(*key));
        let full_argv = root
            .get("smartctl")
            .and_then(|smartctl| smartctl.get("argv"))
            .and_then(Value::as_array)
            .is_some_and(|argv| {
                argv.iter()
                    .filter_map(Value::as_str)
                    .any(|arg| FULL_PROBE_OPTIONS.contains(&arg))
            });
        if has_section || full_argv {
            Ok(())
        } else {
            Err(RecognizerError::new(
                "Output does not contain the results of a full probe.",
            ))
        }
    }
}

impl Recognizer for JsonRecognizer {
    fn parse(&self, output: &str) -> Result<PropertyRepository, RecognizerError> {
        if output.trim().is_empty() {
            return Err(RecognizerError::new("Cannot read information from an empty string."));
        }
        let document: Value = serde_json::from_str(output)
            .map_err(|err| RecognizerError::new(format!("Invalid JSON data: {err}")))?;
        let Value::Object(root) = &document else {
            return Err(RecognizerError::new("JSON document is not an object."));
        };
        if !root.contains_key("smartctl") && !root.contains_key("json_format_version") {
            return Err(RecognizerError::new("Cannot get smartctl version information."));
        }

        let mut repository = PropertyRepository::new();
        flatten("", &document, &mut repository);
        self.check_protocol(&repository)?;
        self.check_full_probe(root)?;
        Ok(repository)
    }
}

fn flatten(path: &str, value: &Value, repository: &mut PropertyRepository) {
    if SKIPPED_PATHS.contains(&path) {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten(&join(path, key), child, repository);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten(&join(path, &index.to_string()), child, repository);
            }
        }
        Value::Bool(flag) => repository.add(Property::new(path, PropertyValue::Bool(*flag))),
        Value::Number(number) => {
            let value = match number.as_i64() {
                Some(integer) => PropertyValue::Integer(integer),
                None => PropertyValue::String(number.to_string()),
            };
            repository.add(Property::new(path, value));
        }
        Value::String(text) => {
            repository.add(Property::new(path, PropertyValue::String(text.clone())))
        }
        Value::Null => repository.add(Property::new(path, PropertyValue::Empty)),
    }
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}/{segment}")
    }
}
