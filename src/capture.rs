//! Screenshot capture over adb: screencap on the device, pull, return as
//! a data URL.

use std::fs;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use uuid::Uuid;

use crate::adb::paths::sanitize_filename_component;
use crate::adb::runner::{exec_adb, exec_adb_shell};
use crate::error::BridgeError;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const REMOTE_SCREENSHOT_PATH: &str = "/data/local/tmp/droidbridge-screen.png";
const PULL_TIMEOUT: Duration = Duration::from_secs(60);

pub fn png_bytes_to_data_url(bytes: &[u8]) -> Result<String, String> {
    if bytes.len() < PNG_SIGNATURE.len() {
        return Err("screenshot data is empty".to_string());
    }
    if !bytes.starts_with(PNG_SIGNATURE) {
        return Err("screenshot data is not a PNG".to_string());
    }
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(bytes)))
}

/// `screencap -p` to a device temp file, pull it, clean up both sides.
pub fn capture_screenshot(
    program: &str,
    serial: &str,
    trace_id: &str,
) -> Result<String, BridgeError> {
    exec_adb_shell(
        program,
        serial,
        &format!("screencap -p {REMOTE_SCREENSHOT_PATH}"),
        Duration::from_secs(30),
        trace_id,
    )?;

    let local = std::env::temp_dir().join(format!(
        "droidbridge-{}-{}.png",
        sanitize_filename_component(serial),
        Uuid::new_v4()
    ));
    let local_str = local.to_string_lossy().to_string();
    let pull = exec_adb(
        program,
        &["-s", serial, "pull", REMOTE_SCREENSHOT_PATH, &local_str],
        PULL_TIMEOUT,
        trace_id,
    );
    let _ = exec_adb_shell(
        program,
        serial,
        &format!("rm -f {REMOTE_SCREENSHOT_PATH}"),
        Duration::from_secs(10),
        trace_id,
    );
    pull?;

    let bytes = fs::read(&local)
        .map_err(|err| BridgeError::system(format!("failed to read screenshot: {err}"), trace_id))?;
    let _ = fs::remove_file(&local);
    png_bytes_to_data_url(&bytes).map_err(|err| BridgeError::system(err, trace_id))
}

#[cfg(test)]
mod tests {
    use super::png_bytes_to_data_url;

    #[test]
    fn rejects_empty_and_non_png_data() {
        assert!(png_bytes_to_data_url(&[]).is_err());
        assert!(png_bytes_to_data_url(b"JFIF whatever").is_err());
    }

    #[test]
    fn encodes_png_prefix() {
        let url = png_bytes_to_data_url(b"\x89PNG\r\n\x1a\nfake").expect("encode");
        assert!(url.starts_with("data:image/png;base64,"));
    }
}
