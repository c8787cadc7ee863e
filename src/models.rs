use serde::{Deserialize, Serialize};

/// Captured output of one finished subprocess.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSummary {
    pub serial: String,
    pub state: String,
    pub model: Option<String>,
    pub product: Option<String>,
    pub device: Option<String>,
    pub transport_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceProperties {
    pub serial: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub android_version: Option<String>,
    pub sdk_level: Option<i32>,
}

/// One line of toybox `ls -la` output, structured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub permissions: String,
    pub owner: String,
    pub group: String,
    pub size_bytes: u64,
    pub modified_at: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UiBounds {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// Flattened uiautomator node with its derived tap center.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UiNode {
    pub text: String,
    pub resource_id: String,
    pub class_name: String,
    pub content_desc: String,
    pub clickable: bool,
    pub bounds: UiBounds,
    pub center_x: i32,
    pub center_y: i32,
}

/// The 76-byte handshake frame the server writes on the video socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceMetadata {
    pub device_name: String,
    pub codec_id: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub serial: String,
    pub scid: String,
    pub server_version: String,
    pub local_port: u16,
    pub device_name: String,
    pub codec_id: u32,
    pub width: u32,
    pub height: u32,
}

/// Which transport actually carried an operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Scrcpy,
    Adb,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Scrcpy => "scrcpy",
            Transport::Adb => "adb",
        }
    }
}
