use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::BridgeError;
use crate::models::{DeviceSummary, ExecOutput};

use super::parse::parse_adb_devices;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Spawn a subprocess and wait for it under a deadline. This is the only
/// place the bridge spawns foreground subprocesses.
pub fn run_command_with_timeout(
    program: &str,
    args: &[&str],
    timeout: Duration,
    trace_id: &str,
) -> Result<ExecOutput, BridgeError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            BridgeError::adb_failed(format!("failed to spawn {program}: {err}"), trace_id)
        })?;

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(BridgeError::adb_timeout(
                        format!("{program} {} timed out after {timeout:?}", args.join(" ")),
                        trace_id,
                    ));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                return Err(BridgeError::adb_failed(
                    format!("failed to poll {program}: {err}"),
                    trace_id,
                ));
            }
        }
    }

    let output = child.wait_with_output().map_err(|err| {
        BridgeError::adb_failed(format!("failed to capture {program} output: {err}"), trace_id)
    })?;

    Ok(ExecOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
    })
}

/// Run the adb binary and treat a non-zero exit as an error.
pub fn exec_adb(
    program: &str,
    args: &[&str],
    timeout: Duration,
    trace_id: &str,
) -> Result<ExecOutput, BridgeError> {
    let output = run_command_with_timeout(program, args, timeout, trace_id)?;
    let exit_code = output.exit_code.unwrap_or_default();
    if exit_code != 0 {
        return Err(BridgeError::adb_failed(
            format!(
                "adb {} exited with {exit_code}: {}",
                args.first().copied().unwrap_or_default(),
                output.stderr.trim()
            ),
            trace_id,
        ));
    }
    Ok(output)
}

/// `adb -s <serial> shell <command>`, trailing newline trimmed.
pub fn exec_adb_shell(
    program: &str,
    serial: &str,
    command: &str,
    timeout: Duration,
    trace_id: &str,
) -> Result<String, BridgeError> {
    let args = ["-s", serial, "shell", command];
    let output = exec_adb(program, &args, timeout, trace_id)?;
    Ok(output
        .stdout
        .trim_end_matches(['\r', '\n'])
        .to_string())
}

pub fn list_devices(program: &str, trace_id: &str) -> Result<Vec<DeviceSummary>, BridgeError> {
    let output = exec_adb(
        program,
        &["devices", "-l"],
        Duration::from_secs(10),
        trace_id,
    )?;
    Ok(parse_adb_devices(&output.stdout))
}

/// Returns the requested serial unchanged, or the single attached device
/// when the caller did not name one.
pub fn resolve_serial(
    program: &str,
    requested: Option<&str>,
    trace_id: &str,
) -> Result<String, BridgeError> {
    if let Some(serial) = requested {
        let trimmed = serial.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    let output = exec_adb(program, &["devices"], Duration::from_secs(10), trace_id)?;
    let attached: Vec<String> = parse_adb_devices(&output.stdout)
        .into_iter()
        .filter(|summary| summary.state == "device")
        .map(|summary| summary.serial)
        .collect();
    match attached.len() {
        0 => Err(BridgeError::no_device_attached(trace_id)),
        1 => Ok(attached.into_iter().next().unwrap_or_default()),
        count => Err(BridgeError::ambiguous_device(count, trace_id)),
    }
}

pub fn get_device_property(
    program: &str,
    serial: &str,
    key: &str,
    trace_id: &str,
) -> Result<String, BridgeError> {
    let output = exec_adb_shell(
        program,
        serial,
        &format!("getprop {key}"),
        Duration::from_secs(10),
        trace_id,
    )?;
    Ok(output.trim().to_string())
}

/// `ro.build.version.sdk`, or 0 when it cannot be read; callers treat 0
/// as "assume the oldest fallback path".
pub fn device_sdk_level(program: &str, serial: &str, trace_id: &str) -> i32 {
    get_device_property(program, serial, "ro.build.version.sdk", trace_id)
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_command_captures_output_and_exit_code() {
        let output =
            run_command_with_timeout("sh", &["-c", "echo out; echo err >&2"], DEFAULT_COMMAND_TIMEOUT, "t")
                .expect("run sh");
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.exit_code, Some(0));
    }

    #[test]
    fn run_command_times_out() {
        let err = run_command_with_timeout("sh", &["-c", "sleep 5"], Duration::from_millis(100), "t")
            .expect_err("expected timeout");
        assert_eq!(err.code, "ERR_ADB_TIMEOUT");
    }

    #[test]
    fn run_command_reports_spawn_failure() {
        let err = run_command_with_timeout(
            "/this/binary/does/not/exist",
            &[],
            DEFAULT_COMMAND_TIMEOUT,
            "t",
        )
        .expect_err("expected spawn error");
        assert_eq!(err.code, "ERR_ADB_FAILED");
        assert!(err.error.contains("spawn"));
    }

    #[test]
    fn exec_adb_rejects_nonzero_exit() {
        let err = exec_adb("sh", &["-c", "exit 3"], DEFAULT_COMMAND_TIMEOUT, "t")
            .expect_err("expected failure");
        assert_eq!(err.code, "ERR_ADB_FAILED");
        assert!(err.error.contains('3'));
    }

    #[test]
    fn resolve_serial_prefers_requested() {
        let serial = resolve_serial("sh", Some(" ABC123 "), "t").expect("serial");
        assert_eq!(serial, "ABC123");
    }
}
