pub mod service;

pub use service::{
    device_snapshot, get_device_session, load_virtual_device, poll_device_events, refresh_device,
    register_device, register_device_with_executor, set_auto_offline_enabled, set_smart_enabled,
    set_test_active, DeviceRequest, DeviceSessionSnapshot, DeviceSessionStatus,
};
