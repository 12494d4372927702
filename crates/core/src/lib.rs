pub mod classify;
pub mod config;
pub mod device;
pub mod error;
pub mod executor;
pub mod format;
pub mod json_output;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod postprocess;
pub mod property;
pub mod recognize;
pub mod selector;
pub mod status;
pub mod text_full;
pub mod text_output;

pub use classify::{is_optical_device_name, refine_category, PARSER_DETECTED_TYPE_PATH};
pub use config::{load_config, DeviceOptionProvider, DeviceOptionRule, FormatPreferences, ProbeConfig};
pub use device::StorageDevice;
pub use error::{DeviceError, RecognizerError};
pub use executor::{CommandExecutor, CommandOutcome, CommandOutput, SmartctlExecutor};
pub use format::{detect_output_format, detect_output_format_or};
pub use json_output::JsonRecognizer;
pub use model::{
    AutoOfflineStatus, DeviceCategory, DeviceSnapshot, OutputFormat, ParseStatus, RecognizerKind,
    SelfTestSupport, SmartStatus,
};
pub use notify::{ChangeNotifier, DeviceEvent, DeviceEventKind};
pub use orchestrator::ParsePipeline;
pub use postprocess::{format_decimal_size, PropertyProcessor, SectionAnnotator};
pub use property::{Property, PropertyRepository, PropertySection, PropertyValue};
pub use recognize::{BuiltinRecognizers, Recognizer, RecognizerFactory};
pub use selector::{basic_probe_options, default_recognizer_kind, full_probe_plan};
pub use text_full::TextFullRecognizer;
pub use text_output::TextBasicRecognizer;
