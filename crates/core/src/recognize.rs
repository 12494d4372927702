use crate::error::RecognizerError;
use crate::json_output::JsonRecognizer;
use crate::model::{OutputFormat, RecognizerKind};
use crate::property::PropertyRepository;
use crate::text_full::TextFullRecognizer;
use crate::text_output::TextBasicRecognizer;

/// Turns raw smartctl stdout into a flat property repository.
pub trait Recognizer {
    fn parse(&self, output: &str) -> Result<PropertyRepository, RecognizerError>;
}

pub trait RecognizerFactory {
    /// Returns `None` when no recognizer exists for the combination.
    fn create(&self, kind: RecognizerKind, format: OutputFormat) -> Option<Box<dyn Recognizer>>;
}

/// Recognizers shipped with the crate, for both output formats and every
/// variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRecognizers;

impl RecognizerFactory for BuiltinRecognizers {
    fn create(&self, kind: RecognizerKind, format: OutputFormat) -> Option<Box<dyn Recognizer>> {
        match (format, kind) {
            (OutputFormat::Json, kind) => Some(Box::new(JsonRecognizer::new(kind))),
            (OutputFormat::Text, RecognizerKind::Basic) => Some(Box::new(TextBasicRecognizer)),
            (OutputFormat::Text, kind) => Some(Box::new(TextFullRecognizer::new(kind))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BuiltinRecognizers, RecognizerFactory};
    use crate::model::{OutputFormat, RecognizerKind};

    #[test]
    fn every_variant_exists_in_both_formats() {
        let factory = BuiltinRecognizers;
        for kind in [
            RecognizerKind::Basic,
            RecognizerKind::Ata,
            RecognizerKind::Nvme,
            RecognizerKind::Scsi,
        ] {
            assert!(factory.create(kind, OutputFormat::Json).is_some());
            assert!(factory.create(kind, OutputFormat::Text).is_some());
        }
    }

    #[test]
    fn text_variants_differ_on_basic_output() {
        let output = "smartctl 7.4 2023-08-01 r5530 [x86_64-linux-6.8.0] (local build)
Device Model:     Samsung SSD 860 EVO 500GB
ATA Version is:   ACS-4 T13/BSR INCITS 529 revision 5
";
        let factory = BuiltinRecognizers;
        let basic = factory
            .create(RecognizerKind::Basic, OutputFormat::Text)
            .expect("basic text recognizer");
        let ata = factory
            .create(RecognizerKind::Ata, OutputFormat::Text)
            .expect("ata text recognizer");
        assert!(basic.parse(output).is_ok());
        assert!(ata.parse(output).is_err());
    }
}
