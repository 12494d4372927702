use crate::model::{
    AutoOfflineStatus, DeviceCategory, ParseStatus, SelfTestSupport, SmartStatus,
};
use crate::property::{Property, PropertyRepository, PropertySection};

const OFFLINE_STATUS_PATH: &str = "ata_smart_data/offline_data_collection/status/value";
const OFFLINE_CAPABILITIES_PATH: &str = "ata_smart_data/capabilities/values/0";
const AUTO_OFFLINE_ENABLED_BIT: i64 = 0x80;
const AUTO_OFFLINE_SUPPORTED_BIT: i64 = 0x02;

pub fn smart_status(smart_enabled: Option<bool>, smart_supported: Option<bool>) -> SmartStatus {
    match (smart_enabled, smart_supported) {
        (Some(true), _) => SmartStatus::Enabled,
        (Some(false), Some(false)) => SmartStatus::Unsupported,
        // Support unknown: leave the user a chance to toggle it.
        (Some(false), _) => SmartStatus::Disabled,
        (None, Some(true)) => SmartStatus::Disabled,
        (None, _) => SmartStatus::Unsupported,
    }
}

/// NVMe has no software switch for SMART.
pub fn smart_switch_supported(
    is_virtual: bool,
    status: SmartStatus,
    category: DeviceCategory,
) -> bool {
    !is_virtual && status != SmartStatus::Unsupported && category != DeviceCategory::Nvme
}

pub fn self_test_support(
    parse_status: ParseStatus,
    status: SmartStatus,
    repository: &PropertyRepository,
) -> SelfTestSupport {
    match parse_status {
        ParseStatus::Full => {
            if repository.has_properties_for_section(PropertySection::SelftestLog) {
                SelfTestSupport::Supported
            } else {
                SelfTestSupport::Unsupported
            }
        }
        ParseStatus::Basic if status == SmartStatus::Enabled => SelfTestSupport::Unknown,
        ParseStatus::Basic => SelfTestSupport::Unsupported,
        ParseStatus::None => SelfTestSupport::Unknown,
    }
}

pub fn health_property(repository: &PropertyRepository) -> Option<Property> {
    repository
        .lookup_in_section("smart_status/passed", PropertySection::OverallHealth)
        .cloned()
}

/// SMART-disabled drives are known to report garbage here, so anything but
/// `Enabled` SMART yields `Unsupported`.
pub fn auto_offline_status(status: SmartStatus, repository: &PropertyRepository) -> AutoOfflineStatus {
    if status != SmartStatus::Enabled {
        return AutoOfflineStatus::Unsupported;
    }
    let integer = |path: &str| {
        repository
            .lookup(path)
            .and_then(|property| property.value.as_integer())
    };
    let supported = integer(OFFLINE_CAPABILITIES_PATH)
        .is_some_and(|capabilities| capabilities & AUTO_OFFLINE_SUPPORTED_BIT != 0);
    if !supported {
        return AutoOfflineStatus::Unsupported;
    }
    match integer(OFFLINE_STATUS_PATH) {
        Some(value) if value & AUTO_OFFLINE_ENABLED_BIT != 0 => AutoOfflineStatus::Enabled,
        Some(_) => AutoOfflineStatus::Disabled,
        None => AutoOfflineStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::{auto_offline_status, self_test_support, smart_status, smart_switch_supported};
    use crate::model::{
        AutoOfflineStatus, DeviceCategory, ParseStatus, SelfTestSupport, SmartStatus,
    };
    use crate::property::{Property, PropertyRepository, PropertySection, PropertyValue};

    #[test]
    fn smart_status_covers_every_combination() {
        let table = [
            (Some(true), Some(true), SmartStatus::Enabled),
            (Some(true), Some(false), SmartStatus::Enabled),
            (Some(true), None, SmartStatus::Enabled),
            (Some(false), Some(true), SmartStatus::Disabled),
            (Some(false), Some(false), SmartStatus::Unsupported),
            (Some(false), None, SmartStatus::Disabled),
            (None, Some(true), SmartStatus::Disabled),
            (None, Some(false), SmartStatus::Unsupported),
            (None, None, SmartStatus::Unsupported),
        ];
        for (enabled, supported, expected) in table {
            assert_eq!(
                smart_status(enabled, supported),
                expected,
                "enabled={enabled:?} supported={supported:?}"
            );
        }
    }

    #[test]
    fn switch_needs_real_non_nvme_device() {
        assert!(smart_switch_supported(false, SmartStatus::Disabled, DeviceCategory::AtaHdd));
        assert!(!smart_switch_supported(true, SmartStatus::Enabled, DeviceCategory::AtaHdd));
        assert!(!smart_switch_supported(false, SmartStatus::Unsupported, DeviceCategory::AtaHdd));
        assert!(!smart_switch_supported(false, SmartStatus::Enabled, DeviceCategory::Nvme));
    }

    #[test]
    fn self_test_support_depends_on_parse_depth() {
        let with_log: PropertyRepository = [Property::new(
            "ata_smart_self_test_log/standard/revision",
            PropertyValue::Integer(1),
        )
        .with_section(PropertySection::SelftestLog)]
        .into_iter()
        .collect();
        let empty = PropertyRepository::new();

        assert_eq!(
            self_test_support(ParseStatus::Full, SmartStatus::Enabled, &with_log),
            SelfTestSupport::Supported
        );
        assert_eq!(
            self_test_support(ParseStatus::Full, SmartStatus::Enabled, &empty),
            SelfTestSupport::Unsupported
        );
        assert_eq!(
            self_test_support(ParseStatus::Basic, SmartStatus::Enabled, &with_log),
            SelfTestSupport::Unknown
        );
        assert_eq!(
            self_test_support(ParseStatus::Basic, SmartStatus::Disabled, &with_log),
            SelfTestSupport::Unsupported
        );
        assert_eq!(
            self_test_support(ParseStatus::None, SmartStatus::Unsupported, &empty),
            SelfTestSupport::Unknown
        );
    }

    #[test]
    fn auto_offline_reads_capability_and_status_bits() {
        let repository = |capabilities: i64, status: Option<i64>| {
            let mut repository = PropertyRepository::new();
            repository.add(Property::new(
                "ata_smart_data/capabilities/values/0",
                PropertyValue::Integer(capabilities),
            ));
            if let Some(status) = status {
                repository.add(Property::new(
                    "ata_smart_data/offline_data_collection/status/value",
                    PropertyValue::Integer(status),
                ));
            }
            repository
        };

        assert_eq!(
            auto_offline_status(SmartStatus::Enabled, &repository(0x5b, Some(0x82))),
            AutoOfflineStatus::Enabled
        );
        assert_eq!(
            auto_offline_status(SmartStatus::Enabled, &repository(0x5b, Some(0x00))),
            AutoOfflineStatus::Disabled
        );
        assert_eq!(
            auto_offline_status(SmartStatus::Enabled, &repository(0x5b, None)),
            AutoOfflineStatus::Unknown
        );
        assert_eq!(
            auto_offline_status(SmartStatus::Enabled, &repository(0x51, Some(0x82))),
            AutoOfflineStatus::Unsupported
        );
        assert_eq!(
            auto_offline_status(SmartStatus::Disabled, &repository(0x5b, Some(0x82))),
            AutoOfflineStatus::Unsupported
        );
    }
}
