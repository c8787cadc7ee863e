//! Per-operation transport arbitration.
//!
//! Every high-level operation has at most two rungs: the scrcpy control
//! channel when a session is ready and the operation has a codec, then
//! the `adb shell` fallback. Transport failures on the first rung are
//! logged and the fallback runs; validation failures surface immediately.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::warn;

use crate::adb::input::{escape_input_text, resolve_keycode, validate_package_name};
use crate::adb::parse::{
    decode_octal_escapes, extract_service_clipboard, parse_getprop_map, parse_ls_long,
    uninstall_succeeded,
};
use crate::adb::paths::{quote_device_path, validate_device_path};
use crate::adb::runner::{
    device_sdk_level, exec_adb, exec_adb_shell, list_devices, resolve_serial,
};
use crate::capture::capture_screenshot;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::models::{
    DeviceProperties, DeviceSummary, FileEntry, SessionInfo, Transport, UiNode,
};
use crate::scrcpy::protocol::{
    ControlMessage, ACTION_DOWN, ACTION_MOVE, ACTION_UP, COPY_KEY_NONE, DEFAULT_POINTER_ID,
};
use crate::scrcpy::server::ServerOptions;
use crate::scrcpy::session::{Session, SessionManager};
use crate::ui_xml::{filter_nodes, parse_ui_nodes, UiFilter};

const TAP_HOLD: Duration = Duration::from_millis(10);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);
const REMOTE_UI_DUMP_PATH: &str = "/data/local/tmp/droidbridge-ui.xml";

pub struct Bridge {
    config: BridgeConfig,
    sessions: Arc<SessionManager>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let sessions = SessionManager::new(config.clone());
        Self { config, sessions }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn resolve(&self, serial: Option<&str>, trace_id: &str) -> Result<String, BridgeError> {
        resolve_serial(&self.config.adb_path, serial, trace_id)
    }

    fn shell(
        &self,
        serial: &str,
        command: &str,
        trace_id: &str,
    ) -> Result<String, BridgeError> {
        exec_adb_shell(
            &self.config.adb_path,
            serial,
            command,
            self.config.command_timeout(),
            trace_id,
        )
    }

    /// Session to use for non-touch control messages.
    fn control_session(&self, serial: &str) -> Option<Arc<Session>> {
        self.sessions.get_ready(serial)
    }

    /// Session to use for touch-shaped operations. The device-side server
    /// drops touch events until its position mapper is primed, so this
    /// rung is opt-in.
    fn touch_session(&self, serial: &str) -> Option<Arc<Session>> {
        if self.config.prefer_scrcpy_touch {
            self.sessions.get_ready(serial)
        } else {
            None
        }
    }

    // ── Sessions ──────────────────────────────────────────────────────

    pub fn start_session(
        &self,
        serial: Option<&str>,
        options: &ServerOptions,
        trace_id: &str,
    ) -> Result<SessionInfo, BridgeError> {
        self.sessions.start_session(serial, options, trace_id)
    }

    pub fn stop_session(&self, serial: Option<&str>, trace_id: &str) -> Result<bool, BridgeError> {
        let serial = self.resolve(serial, trace_id)?;
        Ok(self.sessions.stop_session(&serial, trace_id))
    }

    // ── Devices ───────────────────────────────────────────────────────

    pub fn list_devices(&self, trace_id: &str) -> Result<Vec<DeviceSummary>, BridgeError> {
        list_devices(&self.config.adb_path, trace_id)
    }

    pub fn device_properties(
        &self,
        serial: Option<&str>,
        trace_id: &str,
    ) -> Result<DeviceProperties, BridgeError> {
        let serial = self.resolve(serial, trace_id)?;
        let output = self.shell(&serial, "getprop", trace_id)?;
        let map = parse_getprop_map(&output);
        Ok(DeviceProperties {
            serial,
            brand: map.get("ro.product.brand").cloned(),
            model: map.get("ro.product.model").cloned(),
            android_version: map.get("ro.build.version.release").cloned(),
            sdk_level: map
                .get("ro.build.version.sdk")
                .and_then(|value| value.parse().ok()),
        })
    }

    // ── Gestures ──────────────────────────────────────────────────────

    pub fn tap(
        &self,
        serial: Option<&str>,
        x: i32,
        y: i32,
        trace_id: &str,
    ) -> Result<Transport, BridgeError> {
        let serial = self.resolve(serial, trace_id)?;
        if let Some(session) = self.touch_session(&serial) {
            match self.scrcpy_tap(&session, x, y, trace_id) {
                Ok(()) => return Ok(Transport::Scrcpy),
                Err(err) => note_fallback("tap", err)?,
            }
        }
        self.shell(&serial, &tap_command(x, y), trace_id)?;
        Ok(Transport::Adb)
    }

    pub fn long_press(
        &self,
        serial: Option<&str>,
        x: i32,
        y: i32,
        duration_ms: u64,
        trace_id: &str,
    ) -> Result<Transport, BridgeError> {
        let serial = self.resolve(serial, trace_id)?;
        if let Some(session) = self.touch_session(&serial) {
            let attempt = self
                .scrcpy_touch(&session, ACTION_DOWN, x, y, 1.0, trace_id)
                .and_then(|()| {
                    thread::sleep(Duration::from_millis(duration_ms));
                    self.scrcpy_touch(&session, ACTION_UP, x, y, 0.0, trace_id)
                });
            match attempt {
                Ok(()) => return Ok(Transport::Scrcpy),
                Err(err) => note_fallback("long_press", err)?,
            }
        }
        self.shell(&serial, &long_press_command(x, y, duration_ms), trace_id)?;
        Ok(Transport::Adb)
    }

    pub fn swipe(
        &self,
        serial: Option<&str>,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u64,
        trace_id: &str,
    ) -> Result<Transport, BridgeError> {
        let serial = self.resolve(serial, trace_id)?;
        if let Some(session) = self.touch_session(&serial) {
            match self.scrcpy_swipe(&session, x1, y1, x2, y2, duration_ms, trace_id) {
                Ok(()) => return Ok(Transport::Scrcpy),
                Err(err) => note_fallback("swipe", err)?,
            }
        }
        self.shell(&serial, &swipe_command(x1, y1, x2, y2, duration_ms), trace_id)?;
        Ok(Transport::Adb)
    }

    pub fn drag_drop(
        &self,
        serial: Option<&str>,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u64,
        trace_id: &str,
    ) -> Result<Transport, BridgeError> {
        let serial = self.resolve(serial, trace_id)?;
        if let Some(session) = self.touch_session(&serial) {
            match self.scrcpy_swipe(&session, x1, y1, x2, y2, duration_ms, trace_id) {
                Ok(()) => return Ok(Transport::Scrcpy),
                Err(err) => note_fallback("drag_drop", err)?,
            }
        }
        let sdk = device_sdk_level(&self.config.adb_path, &serial, trace_id);
        self.shell(
            &serial,
            &drag_drop_command(sdk, x1, y1, x2, y2, duration_ms),
            trace_id,
        )?;
        Ok(Transport::Adb)
    }

    pub fn scroll(
        &self,
        serial: Option<&str>,
        x: i32,
        y: i32,
        dx: i32,
        dy: i32,
        trace_id: &str,
    ) -> Result<Transport, BridgeError> {
        let serial = self.resolve(serial, trace_id)?;
        if let Some(session) = self.control_session(&serial) {
            let message = ControlMessage::InjectScroll {
                x,
                y,
                width: session.metadata.width as u16,
                height: session.metadata.height as u16,
                hscroll: dx as f32 * 16.0,
                vscroll: dy as f32 * 16.0,
                buttons: 0,
            };
            match session.send_control(&message, trace_id) {
                Ok(()) => return Ok(Transport::Scrcpy),
                Err(err) => note_fallback("scroll", err)?,
            }
        }
        self.shell(&serial, &scroll_command(x, y, dx, dy), trace_id)?;
        Ok(Transport::Adb)
    }

    // ── Keys and text ─────────────────────────────────────────────────

    pub fn key_event(
        &self,
        serial: Option<&str>,
        key: &str,
        trace_id: &str,
    ) -> Result<(i32, Transport), BridgeError> {
        let keycode = resolve_keycode(key, trace_id)?;
        let serial = self.resolve(serial, trace_id)?;
        if let Some(session) = self.control_session(&serial) {
            let attempt = session
                .send_control(
                    &ControlMessage::InjectKeycode {
                        action: ACTION_DOWN,
                        keycode,
                        repeat: 0,
                        meta_state: 0,
                    },
                    trace_id,
                )
                .and_then(|()| {
                    thread::sleep(TAP_HOLD);
                    session.send_control(
                        &ControlMessage::InjectKeycode {
                            action: ACTION_UP,
                            keycode,
                            repeat: 0,
                            meta_state: 0,
                        },
                        trace_id,
                    )
                });
            match attempt {
                Ok(()) => return Ok((keycode, Transport::Scrcpy)),
                Err(err) => note_fallback("key_event", err)?,
            }
        }
        self.shell(&serial, &keyevent_command(keycode), trace_id)?;
        Ok((keycode, Transport::Adb))
    }

    /// The control channel accepts at most 300 UTF-8 bytes per message;
    /// chunking longer input is the caller's responsibility.
    pub fn input_text(
        &self,
        serial: Option<&str>,
        text: &str,
        trace_id: &str,
    ) -> Result<Transport, BridgeError> {
        let serial = self.resolve(serial, trace_id)?;
        if let Some(session) = self.control_session(&serial) {
            let message = ControlMessage::InjectText {
                text: text.to_string(),
            };
            match session.send_control(&message, trace_id) {
                Ok(()) => return Ok(Transport::Scrcpy),
                Err(err) => note_fallback("input_text", err)?,
            }
        }
        self.shell(&serial, &text_command(text), trace_id)?;
        Ok(Transport::Adb)
    }

    // ── Clipboard ─────────────────────────────────────────────────────

    pub fn clipboard_get(
        &self,
        serial: Option<&str>,
        trace_id: &str,
    ) -> Result<(String, Transport), BridgeError> {
        let serial = self.resolve(serial, trace_id)?;
        if let Some(session) = self.control_session(&serial) {
            match session.clipboard_get(COPY_KEY_NONE, trace_id) {
                Ok(text) => return Ok((text, Transport::Scrcpy)),
                Err(err) => note_fallback("clipboard_get", err)?,
            }
        }
        let sdk = device_sdk_level(&self.config.adb_path, &serial, trace_id);
        let text = if sdk >= 31 {
            self.shell(&serial, "cmd clipboard get", trace_id)?
        } else {
            let dump = self.shell(&serial, "service call clipboard 2", trace_id)?;
            let extracted = extract_service_clipboard(&dump).unwrap_or_default();
            decode_octal_escapes(&extracted)
        };
        Ok((text, Transport::Adb))
    }

    /// Returns the transport used and whether the paste request was
    /// honored; the adb fallback can only set, never paste.
    pub fn clipboard_set(
        &self,
        serial: Option<&str>,
        text: &str,
        paste: bool,
        trace_id: &str,
    ) -> Result<(Transport, bool), BridgeError> {
        let serial = self.resolve(serial, trace_id)?;
        if let Some(session) = self.control_session(&serial) {
            match session.clipboard_set(text, paste, trace_id) {
                Ok(_sequence) => return Ok((Transport::Scrcpy, paste)),
                Err(err) => note_fallback("clipboard_set", err)?,
            }
        }
        let sdk = device_sdk_level(&self.config.adb_path, &serial, trace_id);
        let encoded = STANDARD.encode(text.as_bytes());
        self.shell(&serial, &clipboard_set_command(sdk, &encoded), trace_id)?;
        Ok((Transport::Adb, false))
    }

    // ── Device state ──────────────────────────────────────────────────

    pub fn set_display_power(
        &self,
        serial: Option<&str>,
        on: bool,
        trace_id: &str,
    ) -> Result<Transport, BridgeError> {
        let serial = self.resolve(serial, trace_id)?;
        if let Some(session) = self.control_session(&serial) {
            match session.send_control(&ControlMessage::SetDisplayPower { on }, trace_id) {
                Ok(()) => return Ok(Transport::Scrcpy),
                Err(err) => note_fallback("set_display_power", err)?,
            }
        }
        self.shell(&serial, display_power_command(on), trace_id)?;
        Ok(Transport::Adb)
    }

    pub fn rotate_device(
        &self,
        serial: Option<&str>,
        trace_id: &str,
    ) -> Result<Transport, BridgeError> {
        let serial = self.resolve(serial, trace_id)?;
        if let Some(session) = self.control_session(&serial) {
            match session.send_control(&ControlMessage::RotateDevice, trace_id) {
                Ok(()) => return Ok(Transport::Scrcpy),
                Err(err) => note_fallback("rotate_device", err)?,
            }
        }
        self.shell(&serial, "settings put system accelerometer_rotation 0", trace_id)?;
        let current = self
            .shell(&serial, "settings get system user_rotation", trace_id)?
            .trim()
            .parse::<i64>()
            .unwrap_or(0);
        self.shell(
            &serial,
            &format!("settings put system user_rotation {}", (current + 1) % 4),
            trace_id,
        )?;
        Ok(Transport::Adb)
    }

    pub fn expand_notifications(
        &self,
        serial: Option<&str>,
        trace_id: &str,
    ) -> Result<Transport, BridgeError> {
        self.panel_op(
            serial,
            ControlMessage::ExpandNotificationPanel,
            "cmd statusbar expand-notifications",
            trace_id,
        )
    }

    pub fn expand_settings(
        &self,
        serial: Option<&str>,
        trace_id: &str,
    ) -> Result<Transport, BridgeError> {
        self.panel_op(
            serial,
            ControlMessage::ExpandSettingsPanel,
            "cmd statusbar expand-settings",
            trace_id,
        )
    }

    pub fn collapse_panels(
        &self,
        serial: Option<&str>,
        trace_id: &str,
    ) -> Result<Transport, BridgeError> {
        self.panel_op(
            serial,
            ControlMessage::CollapsePanels,
            "cmd statusbar collapse",
            trace_id,
        )
    }

    fn panel_op(
        &self,
        serial: Option<&str>,
        message: ControlMessage,
        fallback: &str,
        trace_id: &str,
    ) -> Result<Transport, BridgeError> {
        let serial = self.resolve(serial, trace_id)?;
        if let Some(session) = self.control_session(&serial) {
            match session.send_control(&message, trace_id) {
                Ok(()) => return Ok(Transport::Scrcpy),
                Err(err) => note_fallback("panel", err)?,
            }
        }
        self.shell(&serial, fallback, trace_id)?;
        Ok(Transport::Adb)
    }

    // ── Apps ──────────────────────────────────────────────────────────

    pub fn start_app(
        &self,
        serial: Option<&str>,
        package: &str,
        trace_id: &str,
    ) -> Result<Transport, BridgeError> {
        validate_package_name(package, trace_id)?;
        let serial = self.resolve(serial, trace_id)?;
        if let Some(session) = self.control_session(&serial) {
            let message = ControlMessage::StartApp {
                name: package.to_string(),
            };
            match session.send_control(&message, trace_id) {
                Ok(()) => return Ok(Transport::Scrcpy),
                Err(err) => note_fallback("start_app", err)?,
            }
        }
        self.shell(&serial, &format!("monkey -p {package} 1"), trace_id)?;
        Ok(Transport::Adb)
    }

    pub fn stop_app(
        &self,
        serial: Option<&str>,
        package: &str,
        trace_id: &str,
    ) -> Result<(), BridgeError> {
        validate_package_name(package, trace_id)?;
        let serial = self.resolve(serial, trace_id)?;
        self.shell(&serial, &format!("am force-stop {package}"), trace_id)?;
        Ok(())
    }

    pub fn uninstall_app(
        &self,
        serial: Option<&str>,
        package: &str,
        trace_id: &str,
    ) -> Result<bool, BridgeError> {
        validate_package_name(package, trace_id)?;
        let serial = self.resolve(serial, trace_id)?;
        let output = self.shell(&serial, &format!("pm uninstall {package}"), trace_id)?;
        Ok(uninstall_succeeded(&output))
    }

    // ── Files ─────────────────────────────────────────────────────────

    pub fn push_file(
        &self,
        serial: Option<&str>,
        local_path: &str,
        device_path: &str,
        trace_id: &str,
    ) -> Result<(), BridgeError> {
        validate_device_path(device_path, trace_id)?;
        let serial = self.resolve(serial, trace_id)?;
        exec_adb(
            &self.config.adb_path,
            &["-s", &serial, "push", local_path, device_path.trim()],
            TRANSFER_TIMEOUT,
            trace_id,
        )?;
        Ok(())
    }

    pub fn pull_file(
        &self,
        serial: Option<&str>,
        device_path: &str,
        local_path: &str,
        trace_id: &str,
    ) -> Result<(), BridgeError> {
        validate_device_path(device_path, trace_id)?;
        let serial = self.resolve(serial, trace_id)?;
        exec_adb(
            &self.config.adb_path,
            &["-s", &serial, "pull", device_path.trim(), local_path],
            TRANSFER_TIMEOUT,
            trace_id,
        )?;
        Ok(())
    }

    pub fn list_dir(
        &self,
        serial: Option<&str>,
        device_path: &str,
        trace_id: &str,
    ) -> Result<Vec<FileEntry>, BridgeError> {
        validate_device_path(device_path, trace_id)?;
        let serial = self.resolve(serial, trace_id)?;
        let output = self.shell(
            &serial,
            &format!("ls -la {}", quote_device_path(device_path)),
            trace_id,
        )?;
        Ok(parse_ls_long(&output))
    }

    // ── UI inspection ─────────────────────────────────────────────────

    pub fn ui_dump(
        &self,
        serial: Option<&str>,
        trace_id: &str,
    ) -> Result<(String, Vec<UiNode>), BridgeError> {
        let serial = self.resolve(serial, trace_id)?;
        let xml = self.shell(
            &serial,
            &format!(
                "uiautomator dump {REMOTE_UI_DUMP_PATH} >/dev/null 2>&1 && cat {REMOTE_UI_DUMP_PATH}"
            ),
            trace_id,
        )?;
        let nodes = parse_ui_nodes(&xml);
        Ok((xml, nodes))
    }

    pub fn find_elements(
        &self,
        serial: Option<&str>,
        filter: &UiFilter,
        trace_id: &str,
    ) -> Result<Vec<UiNode>, BridgeError> {
        let (_, nodes) = self.ui_dump(serial, trace_id)?;
        Ok(filter_nodes(&nodes, filter))
    }

    // ── Misc ──────────────────────────────────────────────────────────

    pub fn screenshot(&self, serial: Option<&str>, trace_id: &str) -> Result<String, BridgeError> {
        let serial = self.resolve(serial, trace_id)?;
        capture_screenshot(&self.config.adb_path, &serial, trace_id)
    }

    pub fn run_shell(
        &self,
        serial: Option<&str>,
        command: &str,
        trace_id: &str,
    ) -> Result<String, BridgeError> {
        if command.trim().is_empty() {
            return Err(BridgeError::validation("command is required", trace_id));
        }
        let serial = self.resolve(serial, trace_id)?;
        self.shell(&serial, command, trace_id)
    }

    // ── scrcpy gesture primitives ─────────────────────────────────────

    fn scrcpy_touch(
        &self,
        session: &Session,
        action: u8,
        x: i32,
        y: i32,
        pressure: f32,
        trace_id: &str,
    ) -> Result<(), BridgeError> {
        session.send_control(
            &ControlMessage::InjectTouch {
                action,
                pointer_id: DEFAULT_POINTER_ID,
                x,
                y,
                width: session.metadata.width as u16,
                height: session.metadata.height as u16,
                pressure,
                action_button: 0,
                buttons: 0,
            },
            trace_id,
        )
    }

    fn scrcpy_tap(
        &self,
        session: &Session,
        x: i32,
        y: i32,
        trace_id: &str,
    ) -> Result<(), BridgeError> {
        self.scrcpy_touch(session, ACTION_DOWN, x, y, 1.0, trace_id)?;
        thread::sleep(TAP_HOLD);
        self.scrcpy_touch(session, ACTION_UP, x, y, 0.0, trace_id)
    }

    /// DOWN, then `duration/16` linearly interpolated MOVE events paced
    /// across the duration, then UP at the endpoint.
    fn scrcpy_swipe(
        &self,
        session: &Session,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u64,
        trace_id: &str,
    ) -> Result<(), BridgeError> {
        self.scrcpy_touch(session, ACTION_DOWN, x1, y1, 1.0, trace_id)?;
        let steps = duration_ms / 16;
        if steps == 0 {
            thread::sleep(Duration::from_millis(duration_ms));
        } else {
            let pace = Duration::from_millis(duration_ms / steps);
            for step in 1..=steps {
                thread::sleep(pace);
                let progress = step as f64 / steps as f64;
                let x = x1 + (f64::from(x2 - x1) * progress).round() as i32;
                let y = y1 + (f64::from(y2 - y1) * progress).round() as i32;
                self.scrcpy_touch(session, ACTION_MOVE, x, y, 1.0, trace_id)?;
            }
        }
        self.scrcpy_touch(session, ACTION_UP, x2, y2, 0.0, trace_id)
    }
}

/// Decide whether a first-rung failure may fall through to adb.
/// Validation failures surface; everything else is logged and swallowed.
fn note_fallback(op: &str, err: BridgeError) -> Result<(), BridgeError> {
    if err.is_validation() {
        return Err(err);
    }
    warn!(
        trace_id = %err.trace_id,
        op = op,
        error = %err,
        "scrcpy transport failed; using adb fallback"
    );
    Ok(())
}

// ── adb fallback command lines ────────────────────────────────────────

fn tap_command(x: i32, y: i32) -> String {
    format!("input tap {x} {y}")
}

fn swipe_command(x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64) -> String {
    format!("input swipe {x1} {y1} {x2} {y2} {duration_ms}")
}

fn long_press_command(x: i32, y: i32, duration_ms: u64) -> String {
    format!("input swipe {x} {y} {x} {y} {duration_ms}")
}

/// `input draganddrop` exists from SDK 26 on; older devices get a plain
/// swipe.
fn drag_drop_command(sdk: i32, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64) -> String {
    if sdk >= 26 {
        format!("input draganddrop {x1} {y1} {x2} {y2} {duration_ms}")
    } else {
        swipe_command(x1, y1, x2, y2, duration_ms)
    }
}

fn scroll_command(x: i32, y: i32, dx: i32, dy: i32) -> String {
    format!(
        "input swipe {x} {y} {} {} 300",
        x + dx * 100,
        y + dy * 100
    )
}

fn text_command(text: &str) -> String {
    format!("input text \"{}\"", escape_input_text(text))
}

fn keyevent_command(keycode: i32) -> String {
    format!("input keyevent {keycode}")
}

fn display_power_command(on: bool) -> &'static str {
    // WAKEUP / SLEEP keycodes; `input keyevent 26` would toggle blindly.
    if on {
        "input keyevent 224"
    } else {
        "input keyevent 223"
    }
}

fn clipboard_set_command(sdk: i32, base64_text: &str) -> String {
    if sdk >= 29 {
        format!("echo {base64_text} | base64 -d | cmd clipboard set")
    } else {
        format!("echo {base64_text} | base64 -d | xargs -0 am broadcast -a clipper.set -e text")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gesture_fallback_commands() {
        assert_eq!(tap_command(540, 1200), "input tap 540 1200");
        assert_eq!(
            swipe_command(100, 200, 300, 400, 250),
            "input swipe 100 200 300 400 250"
        );
        assert_eq!(
            long_press_command(50, 60, 900),
            "input swipe 50 60 50 60 900"
        );
        assert_eq!(keyevent_command(4), "input keyevent 4");
    }

    #[test]
    fn drag_drop_command_depends_on_sdk() {
        assert_eq!(
            drag_drop_command(26, 1, 2, 3, 4, 500),
            "input draganddrop 1 2 3 4 500"
        );
        assert_eq!(
            drag_drop_command(25, 1, 2, 3, 4, 500),
            "input swipe 1 2 3 4 500"
        );
    }

    #[test]
    fn scroll_command_scales_by_one_hundred() {
        assert_eq!(scroll_command(500, 800, 0, -2), "input swipe 500 800 500 600 300");
        assert_eq!(scroll_command(500, 800, 3, 0), "input swipe 500 800 800 800 300");
    }

    #[test]
    fn text_command_escapes_and_quotes() {
        assert_eq!(text_command("hi there"), "input text \"hi%sthere\"");
        assert_eq!(text_command("a$b"), "input text \"a\\$b\"");
    }

    #[test]
    fn display_power_uses_wake_and_sleep_keys() {
        assert_eq!(display_power_command(true), "input keyevent 224");
        assert_eq!(display_power_command(false), "input keyevent 223");
    }

    #[test]
    fn clipboard_set_command_depends_on_sdk() {
        assert_eq!(
            clipboard_set_command(29, "aGk="),
            "echo aGk= | base64 -d | cmd clipboard set"
        );
        assert_eq!(
            clipboard_set_command(28, "aGk="),
            "echo aGk= | base64 -d | xargs -0 am broadcast -a clipper.set -e text"
        );
    }

    #[test]
    fn transport_failures_fall_back_but_validation_surfaces() {
        assert!(note_fallback("tap", BridgeError::transport_broken("gone", "t")).is_ok());
        assert!(note_fallback("tap", BridgeError::clipboard_timeout("t")).is_ok());
        let err = note_fallback("input_text", BridgeError::text_too_long(301, "t"))
            .expect_err("validation surfaces");
        assert_eq!(err.code, "ERR_TEXT_TOO_LONG");
    }
}
