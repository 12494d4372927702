use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{DeviceCategory, ParseStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceEvent {
    pub seq: u64,
    pub device: String,
    pub kind: DeviceEventKind,
    pub detected_type: DeviceCategory,
    pub parse_status: ParseStatus,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum DeviceEventKind {
    /// Repository, category or parse status were replaced.
    Updated,
    TestActivityChanged { active: bool },
}

type Listener = Box<dyn Fn(&DeviceEvent) + Send>;

/// Synchronous listener list; events are delivered on the caller's thread.
#[derive(Default)]
pub struct ChangeNotifier {
    next_seq: u64,
    listeners: Vec<Listener>,
}

impl ChangeNotifier {
    pub fn subscribe(&mut self, listener: impl Fn(&DeviceEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn emit(
        &mut self,
        device: &str,
        kind: DeviceEventKind,
        detected_type: DeviceCategory,
        parse_status: ParseStatus,
    ) -> DeviceEvent {
        self.next_seq += 1;
        let event = DeviceEvent {
            seq: self.next_seq,
            device: device.to_string(),
            kind,
            detected_type,
            parse_status,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        for listener in &self.listeners {
            listener(&event);
        }
        event
    }

    pub fn emitted(&self) -> u64 {
        self.next_seq
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("next_seq", &self.next_seq)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{ChangeNotifier, DeviceEventKind};
    use crate::model::{DeviceCategory, ParseStatus};

    #[test]
    fn listeners_receive_sequenced_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut notifier = ChangeNotifier::default();
        let sink = Arc::clone(&seen);
        notifier.subscribe(move |event| sink.lock().expect("lock").push(event.clone()));

        notifier.emit(
            "/dev/sda",
            DeviceEventKind::Updated,
            DeviceCategory::AtaHdd,
            ParseStatus::Basic,
        );
        notifier.emit(
            "/dev/sda",
            DeviceEventKind::TestActivityChanged { active: true },
            DeviceCategory::AtaHdd,
            ParseStatus::Basic,
        );

        let seen = seen.lock().expect("lock");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].seq, 1);
        assert_eq!(seen[1].kind, DeviceEventKind::TestActivityChanged { active: true });
        assert_eq!(notifier.emitted(), 2);
    }
}
