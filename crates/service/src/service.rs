use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use smartlens_core::{
    load_config, CommandExecutor, DeviceEvent, DeviceSnapshot, ParsePipeline, ProbeConfig,
    SmartctlExecutor, StorageDevice,
};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeviceRequest {
    #[serde(default)]
    pub device_id: Option<String>,
    pub device: String,
    #[serde(default)]
    pub type_arg: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSessionStatus {
    Idle,
    Refreshing,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSessionSnapshot {
    pub device_id: String,
    pub device: String,
    pub status: DeviceSessionStatus,
    pub error: Option<String>,
    pub total_events: u64,
}

type SharedExecutor = Arc<dyn CommandExecutor + Send + Sync>;

#[derive(Clone)]
struct DeviceSession {
    device_name: String,
    status: DeviceSessionStatus,
    error: Option<String>,
    device: Arc<Mutex<StorageDevice>>,
    events: Arc<Mutex<Vec<DeviceEvent>>>,
    pipeline: Arc<ParsePipeline>,
    executor: SharedExecutor,
}

static SESSIONS: Lazy<Mutex<HashMap<String, DeviceSession>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Registers a physical device probed through the smartctl binary named in
/// the request's config.
pub fn register_device(request: DeviceRequest) -> Result<String> {
    let config = load_config(request.config_path.as_deref())?;
    let executor: SharedExecutor = Arc::new(SmartctlExecutor::from_config(&config));
    register_device_with_executor(request, &config, executor)
}

pub fn register_device_with_executor(
    request: DeviceRequest,
    config: &ProbeConfig,
    executor: SharedExecutor,
) -> Result<String> {
    if request.device.trim().is_empty() {
        return Err(anyhow!("device path must not be empty"));
    }
    let mut device = StorageDevice::new(request.device.clone());
    device.set_type_argument(request.type_arg.clone());
    device.set_extra_arguments(request.extra_args.clone());
    device.set_is_manually_added(request.type_arg.is_some() || !request.extra_args.is_empty());

    let device_id = request
        .device_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    insert_session(&device_id, device, config, executor, DeviceSessionStatus::Idle, None)?;
    info!("registered device {} as {}", request.device, device_id);
    Ok(device_id)
}

/// Registers a saved smartctl output file and parses it right away. Parse
/// failures are recorded on the session rather than returned.
pub fn load_virtual_device(path: impl AsRef<Path>, config_path: Option<&Path>) -> Result<String> {
    let path = path.as_ref();
    let config = load_config(config_path)?;
    let output = fs::read_to_string(path)
        .with_context(|| format!("failed to read smartctl output {}", path.display()))?;

    let mut device = StorageDevice::new_virtual(path, output);
    let pipeline = ParsePipeline::builtin(&config);
    let (status, error) = match device.parse_any_data_for_virtual(&pipeline) {
        Ok(()) => (DeviceSessionStatus::Ready, None),
        Err(err) => {
            warn!("cannot parse {}: {}", path.display(), err);
            (DeviceSessionStatus::Failed, Some(err.to_string()))
        }
    };

    let device_id = Uuid::new_v4().to_string();
    let executor: SharedExecutor = Arc::new(SmartctlExecutor::from_config(&config));
    insert_session(&device_id, device, &config, executor, status, error)?;
    Ok(device_id)
}

fn insert_session(
    device_id: &str,
    mut device: StorageDevice,
    config: &ProbeConfig,
    executor: SharedExecutor,
    status: DeviceSessionStatus,
    error: Option<String>,
) -> Result<()> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    device.subscribe(move |event| {
        if let Ok(mut events) = sink.lock() {
            events.push(event.clone());
        }
    });

    let session = DeviceSession {
        device_name: device.device_with_type(),
        status,
        error,
        device: Arc::new(Mutex::new(device)),
        events,
        pipeline: Arc::new(ParsePipeline::builtin(config)),
        executor,
    };
    lock_sessions()?.insert(device_id.to_string(), session);
    Ok(())
}

/// Re-reads the device on a background thread: the basic probe, then the
/// full probe when `full` is set. Virtual devices re-parse their stored
/// output instead.
pub fn refresh_device(device_id: &str, full: bool) -> Result<()> {
    let session = {
        let mut sessions = lock_sessions()?;
        let session = sessions
            .get_mut(device_id)
            .ok_or_else(|| anyhow!("device session not found: {device_id}"))?;
        session.status = DeviceSessionStatus::Refreshing;
        session.error = None;
        session.clone()
    };

    let thread_device_id = device_id.to_string();
    thread::spawn(move || {
        let result = lock_device(&session.device).and_then(|mut device| {
            let pipeline = session.pipeline.as_ref();
            if device.is_virtual() {
                device.parse_any_data_for_virtual(pipeline)?;
                return Ok(device.device_with_type());
            }
            device.fetch_basic_data_and_parse(pipeline, session.executor.as_ref())?;
            if full {
                device.fetch_full_data_and_parse(pipeline, session.executor.as_ref())?;
            }
            Ok(device.device_with_type())
        });

        if let Ok(mut sessions) = lock_sessions() {
            if let Some(stored) = sessions.get_mut(&thread_device_id) {
                match result {
                    Ok(name) => {
                        stored.device_name = name;
                        stored.status = DeviceSessionStatus::Ready;
                        stored.error = None;
                    }
                    Err(err) => {
                        warn!("refresh of {} failed: {}", stored.device_name, err);
                        stored.status = DeviceSessionStatus::Failed;
                        stored.error = Some(err.to_string());
                    }
                }
            }
        }
    });

    Ok(())
}

pub fn get_device_session(device_id: &str) -> Result<DeviceSessionSnapshot> {
    let session = session(device_id)?;
    let total_events = session
        .events
        .lock()
        .map_err(|_| anyhow!("device event log lock poisoned"))?
        .len() as u64;

    Ok(DeviceSessionSnapshot {
        device_id: device_id.to_string(),
        device: session.device_name,
        status: session.status,
        error: session.error,
        total_events,
    })
}

pub fn device_snapshot(device_id: &str) -> Result<DeviceSnapshot> {
    let session = session(device_id)?;
    let device = lock_device(&session.device)?;
    Ok(device.snapshot())
}

pub fn poll_device_events(device_id: &str, from_seq: u64) -> Result<Vec<DeviceEvent>> {
    let session = session(device_id)?;
    let events = session
        .events
        .lock()
        .map_err(|_| anyhow!("device event log lock poisoned"))?;

    Ok(events
        .iter()
        .filter(|event| event.seq > from_seq)
        .cloned()
        .collect())
}

/// Marks a self-test as running (or finished); probes and toggles are
/// refused while it runs.
pub fn set_test_active(device_id: &str, active: bool) -> Result<()> {
    let session = session(device_id)?;
    lock_device(&session.device)?.set_test_is_active(active);
    Ok(())
}

/// Toggles SMART and re-reads the basic data so that the new state shows up.
pub fn set_smart_enabled(device_id: &str, enabled: bool) -> Result<DeviceSnapshot> {
    let session = session(device_id)?;
    let mut device = lock_device(&session.device)?;
    let pipeline = session.pipeline.as_ref();
    let executor = session.executor.as_ref();

    device
        .set_smart_enabled(enabled, pipeline, executor)
        .with_context(|| format!("failed to switch SMART on {}", device.device_with_type()))?;
    device.fetch_basic_data_and_parse(pipeline, executor)?;
    Ok(device.snapshot())
}

pub fn set_auto_offline_enabled(device_id: &str, enabled: bool) -> Result<DeviceSnapshot> {
    let session = session(device_id)?;
    let mut device = lock_device(&session.device)?;
    let pipeline = session.pipeline.as_ref();
    let executor = session.executor.as_ref();

    device
        .set_auto_offline_enabled(enabled, pipeline, executor)
        .with_context(|| {
            format!(
                "failed to switch automatic offline collection on {}",
                device.device_with_type()
            )
        })?;
    device.fetch_basic_data_and_parse(pipeline, executor)?;
    Ok(device.snapshot())
}

fn session(device_id: &str) -> Result<DeviceSession> {
    lock_sessions()?
        .get(device_id)
        .cloned()
        .ok_or_else(|| anyhow!("device session not found: {device_id}"))
}

fn lock_device(device: &Mutex<StorageDevice>) -> Result<MutexGuard<'_, StorageDevice>> {
    device
        .lock()
        .map_err(|_| anyhow!("device lock poisoned"))
}

fn lock_sessions() -> Result<MutexGuard<'static, HashMap<String, DeviceSession>>> {
    SESSIONS
        .lock()
        .map_err(|_| anyhow!("device session registry lock poisoned"))
}
