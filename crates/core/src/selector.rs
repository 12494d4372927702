use crate::config::FormatPreferences;
use crate::model::{DeviceCategory, OutputFormat, RecognizerKind};

/// Recognizer variant able to read the full probe output of `category`.
pub fn default_recognizer_kind(category: DeviceCategory) -> RecognizerKind {
    match category {
        DeviceCategory::AtaAny | DeviceCategory::AtaHdd | DeviceCategory::AtaSsd => {
            RecognizerKind::Ata
        }
        DeviceCategory::Nvme => RecognizerKind::Nvme,
        DeviceCategory::BasicScsi => RecognizerKind::Scsi,
        DeviceCategory::CdDvd
        | DeviceCategory::UnsupportedRaid
        | DeviceCategory::Unknown
        | DeviceCategory::NeedsExplicitType => RecognizerKind::Basic,
    }
}

/// Options for the capability/health/info probe.
pub fn basic_probe_options(formats: &FormatPreferences) -> Vec<String> {
    let mut options = to_options(&["--info", "--health", "--capabilities"]);
    push_format_flag(&mut options, formats.format_for(RecognizerKind::Basic));
    options
}

/// Options for the exhaustive probe, plus the recognizer that must read its
/// output. `None` while the category is unresolved.
pub fn full_probe_plan(
    category: DeviceCategory,
    formats: &FormatPreferences,
) -> Option<(Vec<String>, RecognizerKind, OutputFormat)> {
    // ATA lists the individual logs instead of --xall so that a smartctl
    // upgrade adding sections to --xall does not change what we parse.
    let mut options = match category {
        DeviceCategory::Unknown | DeviceCategory::NeedsExplicitType => return None,
        DeviceCategory::AtaAny | DeviceCategory::AtaHdd | DeviceCategory::AtaSsd => to_options(&[
            "--health",
            "--info",
            "--get=all",
            "--capabilities",
            "--attributes",
            "--format=brief",
            "--log=xerror,50,error",
            "--log=xselftest,50,selftest",
            "--log=selective",
            "--log=directory",
            "--log=scttemp",
            "--log=scterc",
            "--log=devstat",
            "--log=sataphy",
        ]),
        DeviceCategory::Nvme
        | DeviceCategory::BasicScsi
        | DeviceCategory::CdDvd
        | DeviceCategory::UnsupportedRaid => to_options(&["--xall"]),
    };

    let kind = default_recognizer_kind(category);
    let format = formats.format_for(kind);
    push_format_flag(&mut options, format);
    Some((options, kind, format))
}

fn push_format_flag(options: &mut Vec<String>, format: OutputFormat) {
    if format == OutputFormat::Json {
        // "o" keeps the original text output inside the JSON document.
        options.push("--json=o".to_string());
    }
}

fn to_options(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::{basic_probe_options, default_recognizer_kind, full_probe_plan};
    use crate::config::FormatPreferences;
    use crate::model::{DeviceCategory, OutputFormat, RecognizerKind};

    #[test]
    fn basic_probe_requests_json_by_default() {
        let options = basic_probe_options(&FormatPreferences::default());
        assert_eq!(
            options,
            vec!["--info", "--health", "--capabilities", "--json=o"]
        );
        let text = basic_probe_options(&FormatPreferences::text_only());
        assert!(!text.iter().any(|option| option.starts_with("--json")));
    }

    #[test]
    fn ata_family_enumerates_logs_explicitly() {
        for category in [
            DeviceCategory::AtaAny,
            DeviceCategory::AtaHdd,
            DeviceCategory::AtaSsd,
        ] {
            let (options, kind, format) =
                full_probe_plan(category, &FormatPreferences::default()).expect("resolved");
            assert_eq!(kind, RecognizerKind::Ata);
            assert_eq!(format, OutputFormat::Json);
            assert!(options.contains(&"--log=xselftest,50,selftest".to_string()));
            assert!(!options.contains(&"--xall".to_string()));
        }
    }

    #[test]
    fn nvme_and_scsi_family_use_xall() {
        for category in [
            DeviceCategory::Nvme,
            DeviceCategory::BasicScsi,
            DeviceCategory::CdDvd,
            DeviceCategory::UnsupportedRaid,
        ] {
            let (options, _, _) =
                full_probe_plan(category, &FormatPreferences::text_only()).expect("resolved");
            assert_eq!(options, vec!["--xall"]);
        }
        assert_eq!(
            default_recognizer_kind(DeviceCategory::CdDvd),
            RecognizerKind::Basic
        );
    }

    #[test]
    fn unresolved_category_has_no_plan() {
        let formats = FormatPreferences::default();
        assert!(full_probe_plan(DeviceCategory::Unknown, &formats).is_none());
        assert!(full_probe_plan(DeviceCategory::NeedsExplicitType, &formats).is_none());
    }
}
