//! Device-side server lifecycle: locating the jar on the host, pushing
//! it, wiring the forward tunnel and spawning the `app_process` that runs
//! it.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adb::runner::exec_adb;
use crate::error::BridgeError;

pub const DEVICE_SERVER_PATH: &str = "/data/local/tmp/scrcpy-server.jar";
pub const SERVER_CLASS: &str = "com.genymobile.scrcpy.Server";

const PUSH_TIMEOUT: Duration = Duration::from_secs(30);
const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Optional knobs forwarded to the server invocation line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerOptions {
    pub max_size: Option<u32>,
    pub max_fps: Option<u32>,
    pub video_bit_rate: Option<u32>,
}

/// Find the server jar on the host: an explicitly configured path first,
/// then the places scrcpy installs ship it.
pub fn locate_server_jar(configured: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = configured {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            return candidate.is_file().then_some(candidate);
        }
    }

    let mut candidates: Vec<PathBuf> = vec![
        PathBuf::from("/usr/local/share/scrcpy/scrcpy-server"),
        PathBuf::from("/usr/share/scrcpy/scrcpy-server"),
        PathBuf::from("/opt/homebrew/share/scrcpy/scrcpy-server"),
    ];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local/share/scrcpy/scrcpy-server"));
        candidates.push(home.join("scrcpy-server.jar"));
    }
    candidates.into_iter().find(|candidate| candidate.is_file())
}

pub fn push_server(
    program: &str,
    serial: &str,
    jar: &Path,
    trace_id: &str,
) -> Result<(), BridgeError> {
    let jar = jar.to_string_lossy();
    exec_adb(
        program,
        &["-s", serial, "push", jar.as_ref(), DEVICE_SERVER_PATH],
        PUSH_TIMEOUT,
        trace_id,
    )?;
    Ok(())
}

/// Reserve an unused ephemeral port. A fixed port would collide as soon
/// as two devices run sessions concurrently.
pub fn pick_free_port(trace_id: &str) -> Result<u16, BridgeError> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .map_err(|err| BridgeError::system(format!("failed to reserve a port: {err}"), trace_id))?;
    let port = listener
        .local_addr()
        .map_err(|err| BridgeError::system(format!("failed to read reserved port: {err}"), trace_id))?
        .port();
    drop(listener);
    Ok(port)
}

pub fn install_forward(
    program: &str,
    serial: &str,
    port: u16,
    socket_name: &str,
    trace_id: &str,
) -> Result<(), BridgeError> {
    exec_adb(
        program,
        &[
            "-s",
            serial,
            "forward",
            &format!("tcp:{port}"),
            &format!("localabstract:{socket_name}"),
        ],
        FORWARD_TIMEOUT,
        trace_id,
    )?;
    Ok(())
}

pub fn remove_forward(
    program: &str,
    serial: &str,
    port: u16,
    trace_id: &str,
) -> Result<(), BridgeError> {
    exec_adb(
        program,
        &["-s", serial, "forward", "--remove", &format!("tcp:{port}")],
        FORWARD_TIMEOUT,
        trace_id,
    )?;
    Ok(())
}

/// The verbatim invocation line the server expects after `adb shell`.
/// The version argument is compared strictly by the server; a mismatch
/// makes it exit without a word on the tunnel.
pub fn build_server_command(version: &str, scid_hex: &str, options: &ServerOptions) -> String {
    let mut command = format!(
        "CLASSPATH={DEVICE_SERVER_PATH} app_process / {SERVER_CLASS} {version} scid={scid_hex} log_level=debug"
    );
    if let Some(max_size) = options.max_size {
        command.push_str(&format!(" max_size={max_size}"));
    }
    if let Some(max_fps) = options.max_fps {
        command.push_str(&format!(" max_fps={max_fps}"));
    }
    if let Some(bit_rate) = options.video_bit_rate {
        command.push_str(&format!(" video_bit_rate={bit_rate}"));
    }
    command.push_str(
        " tunnel_forward=true control=true audio=false video=true cleanup=true \
power_off_on_close=false clipboard_autosync=true downsize_on_error=true \
send_device_meta=true send_frame_meta=false send_dummy_byte=true \
send_codec_meta=true video_codec=h264",
    );
    command
}

/// Fire-and-forget: the host keeps no handle on the device-side server.
/// A detached thread reaps the local adb child so it does not linger as
/// a zombie; the device side is cleaned up by `kill_device_server`.
pub fn spawn_server(
    program: &str,
    serial: &str,
    command: &str,
    trace_id: &str,
) -> Result<(), BridgeError> {
    debug!(trace_id = %trace_id, serial = %serial, "spawning scrcpy server");
    let mut child = Command::new(program)
        .args(["-s", serial, "shell", command])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| {
            BridgeError::adb_failed(format!("failed to spawn scrcpy server: {err}"), trace_id)
        })?;
    thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}

/// Best effort; the server may already be gone.
pub fn kill_device_server(program: &str, serial: &str, trace_id: &str) {
    let result = exec_adb(
        program,
        &["-s", serial, "shell", "pkill -f scrcpy-server"],
        FORWARD_TIMEOUT,
        trace_id,
    );
    if let Err(err) = result {
        warn!(trace_id = %trace_id, serial = %serial, error = %err, "scrcpy server cleanup skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_command_is_verbatim() {
        let command = build_server_command("3.3.4", "0a1b2c3d", &ServerOptions::default());
        assert!(command.starts_with(
            "CLASSPATH=/data/local/tmp/scrcpy-server.jar app_process / \
com.genymobile.scrcpy.Server 3.3.4 scid=0a1b2c3d log_level=debug tunnel_forward=true"
        ));
        assert!(command.contains("control=true audio=false video=true"));
        assert!(command.contains("send_dummy_byte=true send_codec_meta=true video_codec=h264"));
        assert!(command.contains("power_off_on_close=false clipboard_autosync=true"));
        assert!(!command.contains("max_size"));
    }

    #[test]
    fn server_command_includes_requested_options() {
        let options = ServerOptions {
            max_size: Some(1080),
            max_fps: Some(30),
            video_bit_rate: Some(8_000_000),
        };
        let command = build_server_command("3.3.4", "00000001", &options);
        assert!(command.contains(
            "log_level=debug max_size=1080 max_fps=30 video_bit_rate=8000000 tunnel_forward=true"
        ));
    }

    #[test]
    fn free_ports_are_distinct_enough() {
        let first = pick_free_port("t").expect("port");
        assert_ne!(first, 0);
    }

    #[test]
    fn locate_rejects_missing_configured_jar() {
        assert!(locate_server_jar(Some("/does/not/exist/scrcpy-server")).is_none());
    }
}
