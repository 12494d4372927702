use std::fmt;

use tracing::{debug, info, warn};

use crate::classify::refine_category;
use crate::config::{DeviceOptionProvider, FormatPreferences, ProbeConfig};
use crate::device::StorageDevice;
use crate::error::DeviceError;
use crate::executor::CommandExecutor;
use crate::format::{detect_output_format, detect_output_format_or};
use crate::model::{DeviceCategory, OutputFormat, ParseStatus, RecognizerKind};
use crate::notify::DeviceEventKind;
use crate::postprocess::{PropertyProcessor, SectionAnnotator};
use crate::property::PropertyRepository;
use crate::recognize::{BuiltinRecognizers, Recognizer, RecognizerFactory};
use crate::selector::{basic_probe_options, default_recognizer_kind, full_probe_plan};

/// Retrying with `-d scsi` once is enough: a second failure means the device
/// really cannot be opened that way.
const MAX_TYPE_RETRIES: usize = 1;
const FALLBACK_TYPE_ARG: &str = "scsi";

/// Everything a device needs to turn smartctl output into properties.
pub struct ParsePipeline {
    pub recognizers: Box<dyn RecognizerFactory + Send + Sync>,
    pub processor: Box<dyn PropertyProcessor + Send + Sync>,
    pub device_options: Box<dyn DeviceOptionProvider + Send + Sync>,
    pub formats: FormatPreferences,
}

impl ParsePipeline {
    /// Built-in recognizers and annotator, options and formats from `config`.
    pub fn builtin(config: &ProbeConfig) -> Self {
        Self {
            recognizers: Box::new(BuiltinRecognizers),
            processor: Box::new(SectionAnnotator),
            device_options: Box::new(config.clone()),
            formats: config.formats.clone(),
        }
    }

    fn recognizer(
        &self,
        kind: RecognizerKind,
        format: OutputFormat,
    ) -> Result<Box<dyn Recognizer>, DeviceError> {
        self.recognizers.create(kind, format).ok_or_else(|| {
            DeviceError::ParseError(format!("Cannot create {kind:?} parser for {format:?} output."))
        })
    }

    fn recognize(
        &self,
        kind: RecognizerKind,
        format: OutputFormat,
        output: &str,
    ) -> Result<PropertyRepository, DeviceError> {
        self.recognizer(kind, format)?
            .parse(output)
            .map_err(|err| DeviceError::ParseError(err.message))
    }
}

impl fmt::Debug for ParsePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsePipeline")
            .field("formats", &self.formats)
            .finish_non_exhaustive()
    }
}

impl StorageDevice {
    /// Runs the info/health/capabilities probe and parses it.
    ///
    /// When smartctl asks for an explicit device type the probe is repeated
    /// once with `-d scsi`.
    pub fn fetch_basic_data_and_parse(
        &mut self,
        pipeline: &ParsePipeline,
        executor: &dyn CommandExecutor,
    ) -> Result<(), DeviceError> {
        if self.test_is_active() {
            return Err(DeviceError::TestRunning);
        }
        // Stored outputs are the only data a virtual device has.
        if self.is_virtual() {
            return Err(DeviceError::CannotExecuteOnVirtual);
        }

        let options = basic_probe_options(&pipeline.formats);
        let mut retries = 0;
        loop {
            self.clear_outputs();
            self.clear_parse_results();

            let (output, status) =
                self.execute_device_smartctl(&options, pipeline, executor, true);
            self.basic_output = output;

            let retryable = matches!(status, Ok(()) | Err(DeviceError::ExecutionError(_)));
            if retryable
                && retries < MAX_TYPE_RETRIES
                && self.detected_type == DeviceCategory::NeedsExplicitType
                && self.type_argument().is_none()
            {
                retries += 1;
                info!(
                    "{} needs an explicit device type, retrying with -d {}",
                    self.device(),
                    FALLBACK_TYPE_ARG
                );
                self.set_type_argument(Some(FALLBACK_TYPE_ARG.to_string()));
                self.detected_type = DeviceCategory::BasicScsi;
                continue;
            }

            status?;
            return self.parse_basic_output(pipeline);
        }
    }

    /// Parses whatever is currently stored as basic output.
    pub fn parse_basic_data(&mut self, pipeline: &ParsePipeline) -> Result<(), DeviceError> {
        if self.test_is_active() {
            return Err(DeviceError::TestRunning);
        }
        self.parse_basic_output(pipeline)
    }

    fn parse_basic_output(&mut self, pipeline: &ParsePipeline) -> Result<(), DeviceError> {
        self.clear_parse_results();

        let format = detect_output_format_or(&self.basic_output, OutputFormat::Text);
        let raw = pipeline.recognize(RecognizerKind::Basic, format, &self.basic_output)?;

        let category = refine_category(self.detected_type, &raw, self.device());
        self.detected_type = category;
        self.install_repository(pipeline.processor.process(raw, category));

        let status = if self.model_name().is_some() {
            ParseStatus::Basic
        } else {
            debug!("basic output of {} carries no model name", self.device_with_type());
            ParseStatus::None
        };
        self.set_parse_status(status);
        self.emit(DeviceEventKind::Updated);
        Ok(())
    }

    /// Runs the exhaustive probe for the detected category and parses it.
    ///
    /// On failure the previously installed repository stays in place.
    pub fn fetch_full_data_and_parse(
        &mut self,
        pipeline: &ParsePipeline,
        executor: &dyn CommandExecutor,
    ) -> Result<(), DeviceError> {
        if self.test_is_active() {
            return Err(DeviceError::TestRunning);
        }
        let Some((options, kind, format)) = full_probe_plan(self.detected_type, &pipeline.formats)
        else {
            warn!(
                "full probe of {} requested before the device type was detected",
                self.device_with_type()
            );
            return Err(DeviceError::TypeUnresolved);
        };
        if self.is_virtual() {
            return Err(DeviceError::CannotExecuteOnVirtual);
        }

        let (output, status) = self.execute_device_smartctl(&options, pipeline, executor, false);
        self.full_output = output;
        status?;
        self.parse_full_output(pipeline, kind, format)
    }

    fn parse_full_output(
        &mut self,
        pipeline: &ParsePipeline,
        kind: RecognizerKind,
        requested: OutputFormat,
    ) -> Result<(), DeviceError> {
        let format = detect_output_format(&self.full_output).unwrap_or_else(|| {
            warn!("cannot detect full output format, assuming {:?}", requested);
            requested
        });
        let raw = pipeline.recognize(kind, format, &self.full_output)?;

        let category = refine_category(self.detected_type, &raw, self.device());
        self.detected_type = category;
        self.install_repository(pipeline.processor.process(raw, category));
        self.set_parse_status(if kind == RecognizerKind::Basic {
            ParseStatus::Basic
        } else {
            ParseStatus::Full
        });
        self.emit(DeviceEventKind::Updated);
        Ok(())
    }

    /// Parses the stored output of a virtual device. The basic recognizer
    /// always runs first; the category-specific one is attempted afterwards
    /// and its failure only limits the result to `ParseStatus::Basic`.
    pub fn parse_any_data_for_virtual(&mut self, pipeline: &ParsePipeline) -> Result<(), DeviceError> {
        if self.test_is_active() {
            return Err(DeviceError::TestRunning);
        }
        self.clear_parse_results();

        // A saved file has no requested format to fall back to.
        let Some(format) = detect_output_format(&self.full_output) else {
            return Err(DeviceError::ParseError(
                "Cannot detect smartctl output format.".to_string(),
            ));
        };
        let raw = pipeline.recognize(RecognizerKind::Basic, format, &self.full_output)?;
        let category = refine_category(self.detected_type, &raw, self.device());
        self.detected_type = category;
        self.install_repository(pipeline.processor.process(raw, category));

        let mut status = ParseStatus::Basic;
        let kind = default_recognizer_kind(category);
        if kind != RecognizerKind::Basic {
            match pipeline.recognize(kind, format, &self.full_output) {
                Ok(raw) => {
                    self.install_repository(pipeline.processor.process(raw, category));
                    status = ParseStatus::Full;
                }
                Err(err) => debug!(
                    "keeping basic parse of {}: {}",
                    self.device_with_type(),
                    err
                ),
            }
        }

        self.set_parse_status(status);
        self.emit(DeviceEventKind::Updated);
        Ok(())
    }
}
