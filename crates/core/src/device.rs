use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::DeviceOptionProvider;
use crate::error::DeviceError;
use crate::executor::{CommandExecutor, CommandOutcome};
use crate::model::{
    AutoOfflineStatus, DeviceCategory, DeviceSnapshot, ParseStatus, SelfTestSupport, SmartStatus,
};
use crate::notify::{ChangeNotifier, DeviceEvent, DeviceEventKind};
use crate::orchestrator::ParsePipeline;
use crate::property::{Property, PropertyRepository};
use crate::status;

static NEEDS_TYPE_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)specify device type with the -d option").expect("valid type hint regex")
});
static SMART_TOGGLED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^SMART (?:Enabled|Disabled)").expect("valid toggle regex"));
static AUTO_OFFLINE_TOGGLED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)Testing (?:Enabled|Disabled)").expect("valid auto-offline regex")
});
static MANDATORY_COMMAND_FAILED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^A mandatory SMART command failed").expect("valid failure regex")
});

const MODEL_CANDIDATES: &[&str] = &["model_name", "scsi_model_name"];
const FAMILY_CANDIDATES: &[&str] = &["model_family", "scsi_vendor"];
const SIZE_CANDIDATES: &[&str] = &["user_capacity/bytes/_short", "user_capacity/bytes"];

/// Values derived from one repository generation. Replaced wholesale
/// whenever the repository is.
#[derive(Debug, Default)]
struct DerivedCache {
    smart_supported: Option<bool>,
    smart_enabled: Option<bool>,
    model_name: Option<String>,
    family_name: Option<String>,
    serial_number: Option<String>,
    size: Option<String>,
    health: OnceCell<Option<Property>>,
    self_test: OnceCell<SelfTestSupport>,
    auto_offline: OnceCell<AutoOfflineStatus>,
}

/// A physical device addressed by path, or a virtual one backed by a saved
/// smartctl output file.
#[derive(Debug)]
pub struct StorageDevice {
    device: String,
    virtual_file: Option<PathBuf>,
    type_arg: Option<String>,
    extra_args: Vec<String>,
    drive_letters: BTreeMap<char, String>,
    is_manually_added: bool,
    pub(crate) basic_output: String,
    pub(crate) full_output: String,
    pub(crate) detected_type: DeviceCategory,
    parse_status: ParseStatus,
    repository: PropertyRepository,
    generation: u64,
    cache: DerivedCache,
    test_is_active: bool,
    notifier: ChangeNotifier,
}

impl StorageDevice {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            virtual_file: None,
            type_arg: None,
            extra_args: Vec::new(),
            drive_letters: BTreeMap::new(),
            is_manually_added: false,
            basic_output: String::new(),
            full_output: String::new(),
            detected_type: DeviceCategory::Unknown,
            parse_status: ParseStatus::None,
            repository: PropertyRepository::new(),
            generation: 0,
            cache: DerivedCache::default(),
            test_is_active: false,
            notifier: ChangeNotifier::default(),
        }
    }

    /// Device probed with an explicit `-d` type.
    pub fn with_type(device: impl Into<String>, type_arg: impl Into<String>) -> Self {
        let mut storage = Self::new(device);
        storage.set_type_argument(Some(type_arg.into()));
        storage
    }

    /// Virtual device holding previously saved smartctl output.
    pub fn new_virtual(file: impl Into<PathBuf>, output: impl Into<String>) -> Self {
        let mut storage = Self::new(String::new());
        storage.virtual_file = Some(file.into());
        storage.full_output = output.into();
        storage
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Last path component, e.g. `sda` for `/dev/sda`. Empty for virtual devices.
    pub fn device_base(&self) -> &str {
        if self.is_virtual() {
            return "";
        }
        self.device
            .rsplit_once('/')
            .map(|(_, base)| base)
            .unwrap_or(&self.device)
    }

    pub fn device_with_type(&self) -> String {
        if self.is_virtual() {
            let name = self.virtual_filename().unwrap_or_default();
            return if name.is_empty() {
                "Virtual ([empty])".to_string()
            } else {
                format!("Virtual ({name})")
            };
        }
        match &self.type_arg {
            Some(type_arg) => format!("{} ({})", self.device, type_arg),
            None => self.device.clone(),
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.virtual_file.is_some()
    }

    pub fn virtual_file(&self) -> Option<&Path> {
        self.virtual_file.as_deref()
    }

    pub fn virtual_filename(&self) -> Option<String> {
        self.virtual_file
            .as_ref()
            .and_then(|file| file.file_name())
            .map(|name| name.to_string_lossy().to_string())
    }

    pub fn type_argument(&self) -> Option<&str> {
        self.type_arg.as_deref()
    }

    pub fn set_type_argument(&mut self, type_arg: Option<String>) {
        self.type_arg = type_arg.filter(|value| !value.is_empty());
    }

    pub fn extra_arguments(&self) -> &[String] {
        &self.extra_args
    }

    pub fn set_extra_arguments(&mut self, args: Vec<String>) {
        self.extra_args = args;
    }

    pub fn drive_letters(&self) -> &BTreeMap<char, String> {
        &self.drive_letters
    }

    pub fn set_drive_letters(&mut self, letters: BTreeMap<char, String>) {
        self.drive_letters = letters;
    }

    /// `C: (System), D:` style listing.
    pub fn format_drive_letters(&self, with_volume_names: bool) -> String {
        self.drive_letters
            .iter()
            .map(|(letter, volume)| {
                let letter = format!("{}:", letter.to_ascii_uppercase());
                if with_volume_names && !volume.is_empty() {
                    format!("{letter} ({volume})")
                } else {
                    letter
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn is_manually_added(&self) -> bool {
        self.is_manually_added
    }

    pub fn set_is_manually_added(&mut self, value: bool) {
        self.is_manually_added = value;
    }

    pub fn basic_output(&self) -> &str {
        &self.basic_output
    }

    pub fn set_basic_output(&mut self, output: impl Into<String>) {
        self.basic_output = output.into();
    }

    pub fn full_output(&self) -> &str {
        &self.full_output
    }

    pub fn set_full_output(&mut self, output: impl Into<String>) {
        self.full_output = output.into();
    }

    pub fn clear_outputs(&mut self) {
        self.basic_output.clear();
        self.full_output.clear();
    }

    pub fn detected_type(&self) -> DeviceCategory {
        self.detected_type
    }

    pub fn set_detected_type(&mut self, category: DeviceCategory) {
        self.detected_type = category;
    }

    pub fn parse_status(&self) -> ParseStatus {
        self.parse_status
    }

    pub(crate) fn set_parse_status(&mut self, parse_status: ParseStatus) {
        if self.parse_status != parse_status {
            self.parse_status = parse_status;
            self.cache.self_test = OnceCell::new();
        }
    }

    pub fn property_repository(&self) -> &PropertyRepository {
        &self.repository
    }

    /// Increases every time the repository is replaced or cleared.
    pub fn repository_generation(&self) -> u64 {
        self.generation
    }

    /// Drops everything derived from earlier output. Outputs and the detected
    /// type are kept.
    pub fn clear_parse_results(&mut self) {
        self.parse_status = ParseStatus::None;
        self.repository.clear();
        self.generation += 1;
        self.cache = DerivedCache::default();
    }

    /// Replaces the repository, invalidating every cached value before the
    /// scalar fields are read back from the new generation.
    pub(crate) fn install_repository(&mut self, repository: PropertyRepository) {
        self.cache = DerivedCache::default();
        self.repository = repository;
        self.generation += 1;
        self.read_common_properties();
    }

    fn read_common_properties(&mut self) {
        let repository = &self.repository;
        let flag = |path: &str| repository.lookup(path).and_then(|p| p.value.as_bool());
        let text = |candidates: &[&str]| {
            repository
                .lookup_first(candidates)
                .and_then(|p| p.value.as_str())
                .map(str::to_string)
        };

        self.cache.smart_supported = flag("smart_support/available");
        self.cache.smart_enabled = flag("smart_support/enabled");
        self.cache.model_name = text(MODEL_CANDIDATES);
        self.cache.family_name = text(FAMILY_CANDIDATES);
        self.cache.serial_number = text(&["serial_number"]);
        self.cache.size = repository
            .lookup_first(SIZE_CANDIDATES)
            .map(|p| p.readable_value.clone())
            .filter(|readable| !readable.is_empty());
    }

    pub fn model_name(&self) -> Option<&str> {
        self.cache.model_name.as_deref()
    }

    pub fn family_name(&self) -> Option<&str> {
        self.cache.family_name.as_deref()
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.cache.serial_number.as_deref()
    }

    pub fn size(&self) -> Option<&str> {
        self.cache.size.as_deref()
    }

    pub fn smart_supported(&self) -> Option<bool> {
        self.cache.smart_supported
    }

    pub fn smart_enabled(&self) -> Option<bool> {
        self.cache.smart_enabled
    }

    pub fn smart_status(&self) -> SmartStatus {
        status::smart_status(self.cache.smart_enabled, self.cache.smart_supported)
    }

    pub fn smart_switch_supported(&self) -> bool {
        status::smart_switch_supported(self.is_virtual(), self.smart_status(), self.detected_type)
    }

    pub fn self_test_support(&self) -> SelfTestSupport {
        *self.cache.self_test.get_or_init(|| {
            status::self_test_support(self.parse_status, self.smart_status(), &self.repository)
        })
    }

    pub fn health_property(&self) -> Option<&Property> {
        self.cache
            .health
            .get_or_init(|| status::health_property(&self.repository))
            .as_ref()
    }

    pub fn auto_offline_status(&self) -> AutoOfflineStatus {
        *self.cache.auto_offline.get_or_init(|| {
            let status = status::auto_offline_status(self.smart_status(), &self.repository);
            debug!("auto offline status of {}: {:?}", self.device_with_type(), status);
            status
        })
    }

    pub fn test_is_active(&self) -> bool {
        self.test_is_active
    }

    /// Notifies listeners on every transition so that they stop offering
    /// operations that would disturb a running test.
    pub fn set_test_is_active(&mut self, active: bool) {
        if self.test_is_active == active {
            return;
        }
        self.test_is_active = active;
        self.emit(DeviceEventKind::TestActivityChanged { active });
    }

    pub fn subscribe(&mut self, listener: impl Fn(&DeviceEvent) + Send + 'static) {
        self.notifier.subscribe(listener);
    }

    pub(crate) fn emit(&mut self, kind: DeviceEventKind) {
        let name = self.device_with_type();
        self.notifier
            .emit(&name, kind, self.detected_type, self.parse_status);
    }

    /// `-d <type>` first, then manual extra arguments, then configured
    /// options; smartctl lets later `-d` options override earlier ones.
    pub fn device_options(&self, provider: &dyn DeviceOptionProvider) -> Vec<String> {
        if self.is_virtual() {
            warn!("cannot get device options of a virtual device");
            return Vec::new();
        }
        let mut args = Vec::new();
        if let Some(type_arg) = &self.type_arg {
            args.push("-d".to_string());
            args.push(type_arg.clone());
        }
        args.extend(self.extra_args.iter().cloned());
        args.extend(provider.device_options(&self.device, self.type_arg.as_deref()));
        args
    }

    /// Runs smartctl against this device. The captured stdout is returned
    /// even when the run fails.
    pub(crate) fn execute_device_smartctl(
        &mut self,
        command_options: &[String],
        pipeline: &ParsePipeline,
        executor: &dyn CommandExecutor,
        check_type: bool,
    ) -> (String, Result<(), DeviceError>) {
        if self.is_virtual() {
            warn!("cannot execute smartctl on a virtual device");
            return (String::new(), Err(DeviceError::CannotExecuteOnVirtual));
        }

        let mut options = self.device_options(pipeline.device_options.as_ref());
        options.extend(command_options.iter().cloned());
        let output = executor.run(&self.device, &options);

        let status = match output.outcome {
            CommandOutcome::Success => Ok(()),
            CommandOutcome::PermissionDenied(message) => {
                warn!("permission denied for {}: {}", self.device, message);
                Err(DeviceError::PermissionDenied(message))
            }
            CommandOutcome::ExecutionFailed(message) => {
                warn!("smartctl did not execute cleanly on {}: {}", self.device, message);
                // Some smartctl builds default to a USB type and stop without
                // identifying the device; they ask for an explicit -d type.
                if check_type
                    && self.detected_type == DeviceCategory::Unknown
                    && NEEDS_TYPE_HINT.is_match(&output.stdout)
                {
                    self.detected_type = DeviceCategory::NeedsExplicitType;
                }
                Err(DeviceError::ExecutionError(message))
            }
        };
        (output.stdout, status)
    }

    /// Switches SMART on (with attribute autosave) or off.
    pub fn set_smart_enabled(
        &mut self,
        enabled: bool,
        pipeline: &ParsePipeline,
        executor: &dyn CommandExecutor,
    ) -> Result<(), DeviceError> {
        if self.test_is_active {
            return Err(DeviceError::TestRunning);
        }
        let options: &[&str] = if enabled {
            &["--smart=on", "--saveauto=on"]
        } else {
            &["--smart=off"]
        };
        self.run_toggle(options, &SMART_TOGGLED, pipeline, executor)
    }

    /// Switches automatic offline data collection on or off.
    pub fn set_auto_offline_enabled(
        &mut self,
        enabled: bool,
        pipeline: &ParsePipeline,
        executor: &dyn CommandExecutor,
    ) -> Result<(), DeviceError> {
        if self.test_is_active {
            return Err(DeviceError::TestRunning);
        }
        let options: &[&str] = if enabled {
            &["--offlineauto=on"]
        } else {
            &["--offlineauto=off"]
        };
        self.run_toggle(options, &AUTO_OFFLINE_TOGGLED, pipeline, executor)
    }

    fn run_toggle(
        &mut self,
        options: &[&str],
        confirmation: &Regex,
        pipeline: &ParsePipeline,
        executor: &dyn CommandExecutor,
    ) -> Result<(), DeviceError> {
        let options = options.iter().map(|o| o.to_string()).collect::<Vec<_>>();
        let (output, status) = self.execute_device_smartctl(&options, pipeline, executor, false);
        status?;
        classify_acknowledgement(&output, confirmation)
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            device: self.device.clone(),
            display_name: self.device_with_type(),
            is_virtual: self.is_virtual(),
            type_argument: self.type_arg.clone(),
            detected_type: self.detected_type,
            parse_status: self.parse_status,
            test_is_active: self.test_is_active,
            model_name: self.cache.model_name.clone(),
            family_name: self.cache.family_name.clone(),
            serial_number: self.cache.serial_number.clone(),
            size: self.cache.size.clone(),
            smart_status: self.smart_status(),
            smart_switch_supported: self.smart_switch_supported(),
            self_test_support: self.self_test_support(),
            auto_offline_status: self.auto_offline_status(),
            health: self.health_property().cloned(),
            property_count: self.repository.len(),
            generation: self.generation,
        }
    }
}

/// Confirmations are searched per line because the same words appear inside
/// other sentences of the output.
fn classify_acknowledgement(output: &str, confirmation: &Regex) -> Result<(), DeviceError> {
    if confirmation.is_match(output) {
        return Ok(());
    }
    if MANDATORY_COMMAND_FAILED.is_match(output) {
        return Err(DeviceError::CommandFailed);
    }
    Err(DeviceError::CommandUnknownError)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{classify_acknowledgement, StorageDevice, AUTO_OFFLINE_TOGGLED, SMART_TOGGLED};
    use crate::config::ProbeConfig;
    use crate::error::DeviceError;
    use crate::model::{AutoOfflineStatus, DeviceCategory, ParseStatus, SelfTestSupport};
    use crate::property::{Property, PropertyRepository, PropertySection, PropertyValue};

    #[test]
    fn smart_acknowledgement_must_start_a_line() {
        let enabled = "=== START OF ENABLE/DISABLE COMMANDS SECTION ===\nSMART Enabled.\nSMART Attribute Autosave Enabled.";
        assert_eq!(classify_acknowledgement(enabled, &SMART_TOGGLED), Ok(()));

        let disabled = "=== START OF ENABLE/DISABLE COMMANDS SECTION ===\nsmart disabled. Use option -s with argument 'on' to enable it.";
        assert_eq!(classify_acknowledgement(disabled, &SMART_TOGGLED), Ok(()));

        let failed = "A mandatory SMART command failed: exiting. To continue, add one or more '-T permissive' options.";
        assert_eq!(
            classify_acknowledgement(failed, &SMART_TOGGLED),
            Err(DeviceError::CommandFailed)
        );

        let embedded = "The message SMART Enabled appears mid-line only.";
        assert_eq!(
            classify_acknowledgement(embedded, &SMART_TOGGLED),
            Err(DeviceError::CommandUnknownError)
        );
    }

    #[test]
    fn auto_offline_acknowledgement() {
        let enabled = "=== START OF ENABLE/DISABLE COMMANDS SECTION ===\nSMART Automatic Offline Testing Enabled every four hours.";
        assert_eq!(classify_acknowledgement(enabled, &AUTO_OFFLINE_TOGGLED), Ok(()));
        assert_eq!(
            classify_acknowledgement("", &AUTO_OFFLINE_TOGGLED),
            Err(DeviceError::CommandUnknownError)
        );
    }

    #[test]
    fn display_helpers() {
        let device = StorageDevice::with_type("/dev/sdb", "sat");
        assert_eq!(device.device_base(), "sdb");
        assert_eq!(device.device_with_type(), "/dev/sdb (sat)");

        let plain = StorageDevice::with_type("/dev/sdc", "");
        assert_eq!(plain.type_argument(), None);
        assert_eq!(plain.device_with_type(), "/dev/sdc");

        let virtual_device = StorageDevice::new_virtual("/tmp/saved/WDC-2024.json", "{}");
        assert!(virtual_device.is_virtual());
        assert_eq!(virtual_device.device_base(), "");
        assert_eq!(virtual_device.device_with_type(), "Virtual (WDC-2024.json)");

        let mut lettered = StorageDevice::new("\\\\.\\PhysicalDrive0");
        lettered.set_drive_letters(BTreeMap::from([
            ('c', "System".to_string()),
            ('d', String::new()),
        ]));
        assert_eq!(lettered.format_drive_letters(true), "C: (System), D:");
        assert_eq!(lettered.format_drive_letters(false), "C:, D:");
    }

    #[test]
    fn device_options_order() {
        let config: ProbeConfig = serde_json::from_str(
            r#"{ "device_options": [ { "device": "/dev/sdb", "options": ["-T", "permissive"] } ] }"#,
        )
        .expect("config");
        let mut device = StorageDevice::with_type("/dev/sdb", "sat,12");
        device.set_extra_arguments(vec!["--nocheck=standby".to_string()]);
        assert_eq!(
            device.device_options(&config),
            vec!["-d", "sat,12", "--nocheck=standby", "-T", "permissive"]
        );
        assert!(StorageDevice::new_virtual("x.txt", "")
            .device_options(&config)
            .is_empty());
    }

    #[test]
    fn replacing_repository_invalidates_memoized_values() {
        let mut device = StorageDevice::new("/dev/sda");
        let first: PropertyRepository = [
            Property::new("model_name", PropertyValue::String("First".into())),
            Property::new("smart_status/passed", PropertyValue::Bool(true))
                .with_section(PropertySection::OverallHealth),
            Property::new("ata_smart_self_test_log/standard/count", PropertyValue::Integer(0))
                .with_section(PropertySection::SelftestLog),
        ]
        .into_iter()
        .collect();
        device.install_repository(first);
        device.set_parse_status(ParseStatus::Full);
        let generation = device.repository_generation();

        assert_eq!(device.model_name(), Some("First"));
        assert!(device.health_property().is_some());
        assert_eq!(device.self_test_support(), SelfTestSupport::Supported);

        let second: PropertyRepository =
            [Property::new("scsi_model_name", PropertyValue::String("Second".into()))]
                .into_iter()
                .collect();
        device.install_repository(second);

        assert!(device.repository_generation() > generation);
        assert_eq!(device.model_name(), Some("Second"));
        assert!(device.health_property().is_none());
        assert_eq!(device.self_test_support(), SelfTestSupport::Unsupported);

        device.set_parse_status(ParseStatus::None);
        assert_eq!(device.self_test_support(), SelfTestSupport::Unknown);

        device.clear_parse_results();
        assert_eq!(device.model_name(), None);
        assert_eq!(device.detected_type(), DeviceCategory::Unknown);
    }

    #[test]
    fn auto_offline_status_is_computed_once_per_repository() {
        let mut device = StorageDevice::new("/dev/sda");
        let repository: PropertyRepository = [
            Property::new("smart_support/enabled", PropertyValue::Bool(true)),
            Property::new(
                "ata_smart_data/offline_data_collection/status/value",
                PropertyValue::Integer(0x82),
            ),
            Property::new("ata_smart_data/capabilities/values/0", PropertyValue::Integer(0x7b)),
        ]
        .into_iter()
        .collect();
        device.install_repository(repository);
        assert!(device.cache.auto_offline.get().is_none());

        assert_eq!(device.auto_offline_status(), AutoOfflineStatus::Enabled);
        assert_eq!(device.cache.auto_offline.get(), Some(&AutoOfflineStatus::Enabled));
        assert_eq!(device.auto_offline_status(), AutoOfflineStatus::Enabled);

        device.install_repository(PropertyRepository::new());
        assert!(device.cache.auto_offline.get().is_none());
        assert_eq!(device.auto_offline_status(), AutoOfflineStatus::Unsupported);
    }

    #[test]
    fn test_activity_transitions_notify_once() {
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let sink = std::sync::Arc::clone(&count);
        let mut device = StorageDevice::new("/dev/sda");
        device.subscribe(move |_| {
            sink.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        device.set_test_is_active(true);
        device.set_test_is_active(true);
        device.set_test_is_active(false);
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
