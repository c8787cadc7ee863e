//! Named-operation surface: maps tool names with JSON parameters onto
//! the router and renders results as JSON. Failures never escape as
//! errors; they become `{"error": true, "message": …}` payloads.

use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::router::Bridge;
use crate::scrcpy::server::ServerOptions;
use crate::ui_xml::UiFilter;

pub struct ToolSurface {
    bridge: Bridge,
}

impl ToolSurface {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            bridge: Bridge::new(config),
        }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Run one named operation. The caller may pin a `trace_id`; one is
    /// generated otherwise.
    pub fn dispatch(&self, name: &str, params: &Value) -> Value {
        let trace_id = params
            .get("trace_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info!(trace_id = %trace_id, tool = name, "tool call");
        match self.call(name, params, &trace_id) {
            Ok(value) => value,
            Err(err) => {
                warn!(trace_id = %err.trace_id, tool = name, error = %err, "tool call failed");
                json!({
                    "error": true,
                    "message": err.error,
                    "code": err.code,
                    "trace_id": err.trace_id,
                })
            }
        }
    }

    fn call(&self, name: &str, params: &Value, trace_id: &str) -> Result<Value, BridgeError> {
        let serial = opt_str(params, "serial");
        let serial = serial.as_deref();
        match name {
            "list_devices" => {
                let devices = self.bridge.list_devices(trace_id)?;
                Ok(json!({ "devices": devices }))
            }
            "device_info" => {
                let properties = self.bridge.device_properties(serial, trace_id)?;
                Ok(serde_json::to_value(properties)
                    .map_err(|err| BridgeError::system(err.to_string(), trace_id))?)
            }
            "session_start" => {
                let options = ServerOptions {
                    max_size: opt_u32(params, "max_size", trace_id)?,
                    max_fps: opt_u32(params, "max_fps", trace_id)?,
                    video_bit_rate: opt_u32(params, "video_bit_rate", trace_id)?,
                };
                let session = self.bridge.start_session(serial, &options, trace_id)?;
                Ok(serde_json::to_value(session)
                    .map_err(|err| BridgeError::system(err.to_string(), trace_id))?)
            }
            "session_stop" => {
                let stopped = self.bridge.stop_session(serial, trace_id)?;
                Ok(json!({ "stopped": stopped }))
            }
            "tap" => {
                let x = require_coord(params, "x", trace_id)?;
                let y = require_coord(params, "y", trace_id)?;
                let transport = self.bridge.tap(serial, x, y, trace_id)?;
                Ok(json!({ "x": x, "y": y, "transport": transport.as_str() }))
            }
            "long_press" => {
                let x = require_coord(params, "x", trace_id)?;
                let y = require_coord(params, "y", trace_id)?;
                let duration_ms = opt_duration_ms(params, 1000, trace_id)?;
                let transport = self.bridge.long_press(serial, x, y, duration_ms, trace_id)?;
                Ok(json!({
                    "x": x,
                    "y": y,
                    "duration_ms": duration_ms,
                    "transport": transport.as_str(),
                }))
            }
            "swipe" | "drag_drop" => {
                let x1 = require_coord(params, "x1", trace_id)?;
                let y1 = require_coord(params, "y1", trace_id)?;
                let x2 = require_coord(params, "x2", trace_id)?;
                let y2 = require_coord(params, "y2", trace_id)?;
                let duration_ms = opt_duration_ms(params, 300, trace_id)?;
                let transport = if name == "swipe" {
                    self.bridge
                        .swipe(serial, x1, y1, x2, y2, duration_ms, trace_id)?
                } else {
                    self.bridge
                        .drag_drop(serial, x1, y1, x2, y2, duration_ms, trace_id)?
                };
                Ok(json!({
                    "from": [x1, y1],
                    "to": [x2, y2],
                    "duration_ms": duration_ms,
                    "transport": transport.as_str(),
                }))
            }
            "scroll" => {
                let x = require_coord(params, "x", trace_id)?;
                let y = require_coord(params, "y", trace_id)?;
                let dx = require_i32(params, "dx", trace_id)?;
                let dy = require_i32(params, "dy", trace_id)?;
                let transport = self.bridge.scroll(serial, x, y, dx, dy, trace_id)?;
                Ok(json!({
                    "x": x,
                    "y": y,
                    "dx": dx,
                    "dy": dy,
                    "transport": transport.as_str(),
                }))
            }
            "key_event" => {
                let key = require_str(params, "key", trace_id)?;
                let (keycode, transport) = self.bridge.key_event(serial, &key, trace_id)?;
                Ok(json!({
                    "key": key,
                    "keycode": keycode,
                    "transport": transport.as_str(),
                }))
            }
            "input_text" => {
                let text = require_str(params, "text", trace_id)?;
                let transport = self.bridge.input_text(serial, &text, trace_id)?;
                Ok(json!({
                    "length": text.chars().count(),
                    "transport": transport.as_str(),
                }))
            }
            "clipboard_get" => {
                let (text, transport) = self.bridge.clipboard_get(serial, trace_id)?;
                Ok(json!({ "text": text, "transport": transport.as_str() }))
            }
            "clipboard_set" => {
                let text = require_str(params, "text", trace_id)?;
                let paste = params
                    .get("paste")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let (transport, pasted) =
                    self.bridge.clipboard_set(serial, &text, paste, trace_id)?;
                let mut result = json!({
                    "transport": transport.as_str(),
                    "pasted": pasted,
                });
                if paste && !pasted {
                    result["note"] =
                        Value::String("paste is only performed over the scrcpy transport".into());
                }
                Ok(result)
            }
            "set_display_power" => {
                let on = params
                    .get("on")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| BridgeError::validation("'on' must be a boolean", trace_id))?;
                let transport = self.bridge.set_display_power(serial, on, trace_id)?;
                Ok(json!({ "on": on, "transport": transport.as_str() }))
            }
            "rotate_device" => {
                let transport = self.bridge.rotate_device(serial, trace_id)?;
                Ok(json!({ "transport": transport.as_str() }))
            }
            "expand_notifications" => {
                let transport = self.bridge.expand_notifications(serial, trace_id)?;
                Ok(json!({ "transport": transport.as_str() }))
            }
            "expand_settings" => {
                let transport = self.bridge.expand_settings(serial, trace_id)?;
                Ok(json!({ "transport": transport.as_str() }))
            }
            "collapse_panels" => {
                let transport = self.bridge.collapse_panels(serial, trace_id)?;
                Ok(json!({ "transport": transport.as_str() }))
            }
            "start_app" => {
                let package = require_str(params, "package", trace_id)?;
                let transport = self.bridge.start_app(serial, &package, trace_id)?;
                Ok(json!({ "package": package, "transport": transport.as_str() }))
            }
            "stop_app" => {
                let package = require_str(params, "package", trace_id)?;
                self.bridge.stop_app(serial, &package, trace_id)?;
                Ok(json!({ "package": package, "stopped": true }))
            }
            "uninstall_app" => {
                let package = require_str(params, "package", trace_id)?;
                let success = self.bridge.uninstall_app(serial, &package, trace_id)?;
                Ok(json!({ "package": package, "success": success }))
            }
            "screenshot" => {
                let data_url = self.bridge.screenshot(serial, trace_id)?;
                Ok(json!({ "data_url": data_url }))
            }
            "push_file" => {
                let local_path = require_str(params, "local_path", trace_id)?;
                let device_path = require_str(params, "device_path", trace_id)?;
                self.bridge
                    .push_file(serial, &local_path, &device_path, trace_id)?;
                Ok(json!({ "local_path": local_path, "device_path": device_path }))
            }
            "pull_file" => {
                let device_path = require_str(params, "device_path", trace_id)?;
                let local_path = require_str(params, "local_path", trace_id)?;
                self.bridge
                    .pull_file(serial, &device_path, &local_path, trace_id)?;
                Ok(json!({ "device_path": device_path, "local_path": local_path }))
            }
            "list_dir" => {
                let device_path = require_str(params, "device_path", trace_id)?;
                let entries = self.bridge.list_dir(serial, &device_path, trace_id)?;
                Ok(json!({ "device_path": device_path, "entries": entries }))
            }
            "ui_dump" => {
                let (xml, nodes) = self.bridge.ui_dump(serial, trace_id)?;
                Ok(json!({ "count": nodes.len(), "nodes": nodes, "xml": xml }))
            }
            "find_elements" => {
                let filter = UiFilter {
                    text: opt_str(params, "text"),
                    resource_id: opt_str(params, "resource_id"),
                    class_name: opt_str(params, "class_name"),
                    content_desc: opt_str(params, "content_desc"),
                };
                let nodes = self.bridge.find_elements(serial, &filter, trace_id)?;
                Ok(json!({ "count": nodes.len(), "nodes": nodes }))
            }
            "shell" => {
                let command = require_str(params, "command", trace_id)?;
                let output = self.bridge.run_shell(serial, &command, trace_id)?;
                Ok(json!({ "output": output }))
            }
            _ => Err(BridgeError::validation(
                format!("unknown tool: {name}"),
                trace_id,
            )),
        }
    }
}

fn opt_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn require_str(params: &Value, key: &str, trace_id: &str) -> Result<String, BridgeError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| BridgeError::validation(format!("'{key}' must be a string"), trace_id))
}

fn require_i32(params: &Value, key: &str, trace_id: &str) -> Result<i32, BridgeError> {
    let value = params
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| BridgeError::validation(format!("'{key}' must be an integer"), trace_id))?;
    i32::try_from(value)
        .map_err(|_| BridgeError::validation(format!("'{key}' is out of range"), trace_id))
}

/// Screen coordinates are integers and never negative.
fn require_coord(params: &Value, key: &str, trace_id: &str) -> Result<i32, BridgeError> {
    let value = require_i32(params, key, trace_id)?;
    if value < 0 {
        return Err(BridgeError::validation(
            format!("'{key}' must not be negative"),
            trace_id,
        ));
    }
    Ok(value)
}

fn opt_u32(params: &Value, key: &str, trace_id: &str) -> Result<Option<u32>, BridgeError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let parsed = value
                .as_u64()
                .and_then(|candidate| u32::try_from(candidate).ok())
                .ok_or_else(|| {
                    BridgeError::validation(
                        format!("'{key}' must be a non-negative integer"),
                        trace_id,
                    )
                })?;
            Ok(Some(parsed))
        }
    }
}

fn opt_duration_ms(params: &Value, default_ms: u64, trace_id: &str) -> Result<u64, BridgeError> {
    match params.get("duration_ms") {
        None | Some(Value::Null) => Ok(default_ms),
        Some(value) => value.as_u64().ok_or_else(|| {
            BridgeError::validation("'duration_ms' must be a non-negative integer", trace_id)
        }),
    }
}
