use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::model::OutputFormat;

static TEXT_VERSION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^smartctl\s+\d").expect("valid smartctl version regex"));

/// Inspects raw smartctl output and returns its format, or `None` when the
/// output carries neither the JSON envelope nor the text version banner.
pub fn detect_output_format(output: &str) -> Option<OutputFormat> {
    let trimmed = output.trim_start();
    if trimmed.starts_with('{')
        && (trimmed.contains("\"json_format_version\"") || trimmed.contains("\"smartctl\""))
    {
        return Some(OutputFormat::Json);
    }
    if TEXT_VERSION_LINE.is_match(output) {
        return Some(OutputFormat::Text);
    }
    None
}

/// Like [`detect_output_format`], but settles on `fallback` when detection is
/// inconclusive. Text is self-describing only through its banner, so callers
/// normally pass [`OutputFormat::Text`].
pub fn detect_output_format_or(output: &str, fallback: OutputFormat) -> OutputFormat {
    detect_output_format(output).unwrap_or_else(|| {
        warn!("cannot detect smartctl output format, assuming {:?}", fallback);
        fallback
    })
}

#[cfg(test)]
mod tests {
    use super::{detect_output_format, detect_output_format_or};
    use crate::model::OutputFormat;

    #[test]
    fn detects_json_envelope() {
        let output = "\n{\n  \"json_format_version\": [1, 0],\n  \"smartctl\": {}\n}";
        assert_eq!(detect_output_format(output), Some(OutputFormat::Json));
    }

    #[test]
    fn detects_text_banner_case_insensitively() {
        let output = "SMARTCTL 7.3 2022-02-28 r5338 [x86_64-linux-6.1.0] (local build)\n";
        assert_eq!(detect_output_format(output), Some(OutputFormat::Text));
    }

    #[test]
    fn brace_without_envelope_is_inconclusive() {
        assert_eq!(detect_output_format("{ \"foo\": 1 }"), None);
        assert_eq!(detect_output_format(""), None);
        assert_eq!(
            detect_output_format_or("garbage", OutputFormat::Text),
            OutputFormat::Text
        );
    }
}
