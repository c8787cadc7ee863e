//! Android device-automation bridge.
//!
//! Drives Android devices over two transports: one-shot `adb` subprocess
//! invocations and a long-lived binary control session against a scrcpy
//! server pushed onto the device. High-level operations (tap, swipe, text
//! input, key events, clipboard, app and file management, UI inspection)
//! pick the best transport per call and fall back to `adb shell` when the
//! control channel is unavailable.

pub mod adb;
pub mod capture;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod router;
pub mod scrcpy;
pub mod tools;
pub mod ui_xml;

pub use config::BridgeConfig;
pub use error::BridgeError;
pub use router::Bridge;
pub use tools::ToolSurface;
