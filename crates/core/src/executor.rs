use std::path::PathBuf;
use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::ProbeConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    PermissionDenied(String),
    ExecutionFailed(String),
}

/// Captured stdout is kept even on failure; the retry logic inspects it for
/// smartctl's "specify device type" hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub outcome: CommandOutcome,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            outcome: CommandOutcome::Success,
        }
    }

    pub fn failed(stdout: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            outcome: CommandOutcome::ExecutionFailed(message.into()),
        }
    }
}

pub trait CommandExecutor {
    fn run(&self, device: &str, options: &[String]) -> CommandOutput;
}

static PERMISSION_DENIED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)Smartctl open device.+Permission denied").expect("valid permission regex")
});

/// Runs the smartctl binary as a child process.
#[derive(Debug, Clone)]
pub struct SmartctlExecutor {
    binary: PathBuf,
    default_options: Vec<String>,
}

impl SmartctlExecutor {
    pub fn new(binary: impl Into<PathBuf>, default_options: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            default_options,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(
            config.smartctl_binary.clone(),
            config.default_options.clone(),
        )
    }
}

impl CommandExecutor for SmartctlExecutor {
    fn run(&self, device: &str, options: &[String]) -> CommandOutput {
        debug!(
            "executing {} {} {} {}",
            self.binary.display(),
            self.default_options.join(" "),
            options.join(" "),
            device
        );

        let output = match Command::new(&self.binary)
            .args(&self.default_options)
            .args(options)
            .arg(device)
            .output()
        {
            Ok(output) => output,
            Err(err) => {
                warn!("cannot execute {}: {}", self.binary.display(), err);
                return CommandOutput::failed(
                    String::new(),
                    format!("Cannot execute {}: {}", self.binary.display(), err),
                );
            }
        };

        let stdout = normalize_output(&String::from_utf8_lossy(&output.stdout));
        let status = output.status.code();
        interpret_exit(stdout, status)
    }
}

/// smartctl exit status is a bit mask: bits 0 and 1 mean the command line
/// did not parse or the device could not be opened. Higher bits report drive
/// conditions (failing health, logged errors) and still come with usable
/// output.
fn interpret_exit(stdout: String, status: Option<i32>) -> CommandOutput {
    let Some(code) = status else {
        return CommandOutput::failed(stdout, "smartctl was terminated by a signal.");
    };

    if PERMISSION_DENIED.is_match(&stdout) {
        return CommandOutput {
            stdout,
            outcome: CommandOutcome::PermissionDenied(
                "Permission denied while opening device.".to_string(),
            ),
        };
    }

    if code & 0b01 != 0 {
        return CommandOutput::failed(stdout, "Command line did not parse.");
    }
    if code & 0b10 != 0 {
        return CommandOutput::failed(
            stdout,
            "Device open failed, device did not return an IDENTIFY DEVICE structure, or device is in a low-power mode.",
        );
    }
    if code != 0 {
        debug!("smartctl exit status {:#04x} carries drive condition bits", code);
    }

    if stdout.is_empty() {
        return CommandOutput::failed(stdout, "Smartctl returned an empty output.");
    }
    CommandOutput::success(stdout)
}

fn normalize_output(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::{interpret_exit, normalize_output, CommandOutcome};

    #[test]
    fn condition_bits_do_not_fail_the_run() {
        let output = interpret_exit("smartctl 7.3\nSMART overall-health".into(), Some(0x08));
        assert_eq!(output.outcome, CommandOutcome::Success);
    }

    #[test]
    fn open_failure_keeps_stdout() {
        let stdout = "/dev/sdb: Unknown USB bridge\nPlease specify device type with the -d option.";
        let output = interpret_exit(stdout.into(), Some(0x01));
        assert!(matches!(output.outcome, CommandOutcome::ExecutionFailed(_)));
        assert!(output.stdout.contains("specify device type"));
    }

    #[test]
    fn permission_denied_is_distinguished() {
        let stdout = "Smartctl open device: /dev/sda failed: Permission denied";
        let output = interpret_exit(stdout.into(), Some(0x02));
        assert!(matches!(output.outcome, CommandOutcome::PermissionDenied(_)));
    }

    #[test]
    fn empty_output_is_an_error() {
        let output = interpret_exit(String::new(), Some(0));
        assert_eq!(
            output.outcome,
            CommandOutcome::ExecutionFailed("Smartctl returned an empty output.".into())
        );
    }

    #[test]
    fn normalizes_line_endings() {
        assert_eq!(normalize_output("a\r\nb\rc\n\n"), "a\nb\nc");
    }
}
