#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use smartlens_core::{CommandExecutor, CommandOutput, DeviceEvent, StorageDevice};

pub fn fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop();
    path.pop();
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(&path).unwrap_or_else(|err| panic!("fixture {path:?}: {err}"))
}

/// Replays canned smartctl results in order and records every invocation.
#[derive(Default)]
pub struct ScriptedExecutor {
    responses: Mutex<VecDeque<CommandOutput>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedExecutor {
    pub fn new(responses: Vec<CommandOutput>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn run(&self, device: &str, options: &[String]) -> CommandOutput {
        self.calls
            .lock()
            .expect("calls lock")
            .push((device.to_string(), options.to_vec()));
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| CommandOutput::failed("", "no scripted response left"))
    }
}

pub fn record_events(device: &mut StorageDevice) -> Arc<Mutex<Vec<DeviceEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    device.subscribe(move |event| sink.lock().expect("events lock").push(event.clone()));
    events
}
