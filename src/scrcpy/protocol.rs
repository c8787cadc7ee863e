//! Binary codec for the scrcpy control channel.
//!
//! Host-to-device control messages are tagged byte sequences: byte 0 is
//! the message type, the rest follows a fixed per-type layout. All
//! multi-byte integers are big-endian. The device-side server does strict
//! equality checks on these values, so they are spelled out here rather
//! than derived.

use thiserror::Error;

use crate::error::BridgeError;
use crate::models::DeviceMetadata;

pub const TYPE_INJECT_KEYCODE: u8 = 0;
pub const TYPE_INJECT_TEXT: u8 = 1;
pub const TYPE_INJECT_TOUCH_EVENT: u8 = 2;
pub const TYPE_INJECT_SCROLL_EVENT: u8 = 3;
pub const TYPE_EXPAND_NOTIFICATION_PANEL: u8 = 5;
pub const TYPE_EXPAND_SETTINGS_PANEL: u8 = 6;
pub const TYPE_COLLAPSE_PANELS: u8 = 7;
pub const TYPE_GET_CLIPBOARD: u8 = 8;
pub const TYPE_SET_CLIPBOARD: u8 = 9;
pub const TYPE_SET_DISPLAY_POWER: u8 = 10;
pub const TYPE_ROTATE_DEVICE: u8 = 11;
pub const TYPE_START_APP: u8 = 16;

/// Device-to-host message tags. Only the clipboard reply is consumed.
pub const DEVICE_MSG_TYPE_CLIPBOARD: u8 = 0;

/// `KeyEvent`/`MotionEvent` action codes.
pub const ACTION_DOWN: u8 = 0;
pub const ACTION_UP: u8 = 1;
pub const ACTION_MOVE: u8 = 2;

pub const COPY_KEY_NONE: u8 = 0;
pub const COPY_KEY_COPY: u8 = 1;
pub const COPY_KEY_CUT: u8 = 2;

pub const MAX_TEXT_BYTES: usize = 300;
pub const MAX_START_APP_BYTES: usize = 255;
pub const MAX_CLIPBOARD_BYTES: usize = 1 << 20;

/// Virtual finger identity used for injected touches.
pub const DEFAULT_POINTER_ID: u64 = 0xFFFF_FFFF_FFFF_FFFF;

pub const METADATA_FRAME_LEN: usize = 76;
pub const DEVICE_NAME_FIELD_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("text is {len} UTF-8 bytes; at most {MAX_TEXT_BYTES} allowed")]
    TextTooLong { len: usize },

    #[error("package name is {len} UTF-8 bytes; at most {MAX_START_APP_BYTES} allowed")]
    PackageNameTooLong { len: usize },

    #[error("clipboard reply declares {len} bytes; at most {MAX_CLIPBOARD_BYTES} allowed")]
    OversizeClipboardReply { len: usize },

    #[error("unknown device message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    #[error("frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
}

impl ProtocolError {
    pub fn into_bridge_error(self, trace_id: &str) -> BridgeError {
        match self {
            ProtocolError::TextTooLong { len } => BridgeError::text_too_long(len, trace_id),
            ProtocolError::PackageNameTooLong { len } => {
                BridgeError::package_name_too_long(len, trace_id)
            }
            ProtocolError::OversizeClipboardReply { len } => {
                BridgeError::oversize_clipboard_reply(len, trace_id)
            }
            other => BridgeError::transport_broken(other.to_string(), trace_id),
        }
    }
}

/// One host-to-device control message.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    InjectKeycode {
        action: u8,
        keycode: i32,
        repeat: i32,
        meta_state: i32,
    },
    InjectText {
        text: String,
    },
    InjectTouch {
        action: u8,
        pointer_id: u64,
        x: i32,
        y: i32,
        width: u16,
        height: u16,
        pressure: f32,
        action_button: u32,
        buttons: u32,
    },
    InjectScroll {
        x: i32,
        y: i32,
        width: u16,
        height: u16,
        hscroll: f32,
        vscroll: f32,
        buttons: u32,
    },
    ExpandNotificationPanel,
    ExpandSettingsPanel,
    CollapsePanels,
    GetClipboard {
        copy_key: u8,
    },
    SetClipboard {
        sequence: u64,
        paste: bool,
        text: String,
    },
    SetDisplayPower {
        on: bool,
    },
    RotateDevice,
    StartApp {
        name: String,
    },
}

/// Pressure is 16-bit fixed point over [0, 1]; 1.0 maps to 0xFFFF.
pub fn encode_pressure(value: f32) -> u16 {
    (value.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// Scroll axes are 16-bit signed fixed point over [-1, 1]; -1 maps to
/// -0x8000 and +1 to 0x7FFF.
pub fn encode_scroll_axis(value: f32) -> i16 {
    let clamped = value.clamp(-1.0, 1.0);
    if clamped >= 0.0 {
        (clamped * 32767.0).round() as i16
    } else {
        (clamped * 32768.0).round() as i16
    }
}

pub fn encode_control_message(message: &ControlMessage) -> Result<Vec<u8>, ProtocolError> {
    match message {
        ControlMessage::InjectKeycode {
            action,
            keycode,
            repeat,
            meta_state,
        } => {
            let mut buf = Vec::with_capacity(14);
            buf.push(TYPE_INJECT_KEYCODE);
            buf.push(*action);
            buf.extend_from_slice(&keycode.to_be_bytes());
            buf.extend_from_slice(&repeat.to_be_bytes());
            buf.extend_from_slice(&meta_state.to_be_bytes());
            Ok(buf)
        }
        ControlMessage::InjectText { text } => {
            let bytes = text.as_bytes();
            if bytes.len() > MAX_TEXT_BYTES {
                return Err(ProtocolError::TextTooLong { len: bytes.len() });
            }
            let mut buf = Vec::with_capacity(5 + bytes.len());
            buf.push(TYPE_INJECT_TEXT);
            buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            buf.extend_from_slice(bytes);
            Ok(buf)
        }
        ControlMessage::InjectTouch {
            action,
            pointer_id,
            x,
            y,
            width,
            height,
            pressure,
            action_button,
            buttons,
        } => {
            let mut buf = Vec::with_capacity(32);
            buf.push(TYPE_INJECT_TOUCH_EVENT);
            buf.push(*action);
            buf.extend_from_slice(&pointer_id.to_be_bytes());
            buf.extend_from_slice(&x.to_be_bytes());
            buf.extend_from_slice(&y.to_be_bytes());
            buf.extend_from_slice(&width.to_be_bytes());
            buf.extend_from_slice(&height.to_be_bytes());
            buf.extend_from_slice(&encode_pressure(*pressure).to_be_bytes());
            buf.extend_from_slice(&action_button.to_be_bytes());
            buf.extend_from_slice(&buttons.to_be_bytes());
            Ok(buf)
        }
        ControlMessage::InjectScroll {
            x,
            y,
            width,
            height,
            hscroll,
            vscroll,
            buttons,
        } => {
            let mut buf = Vec::with_capacity(21);
            buf.push(TYPE_INJECT_SCROLL_EVENT);
            buf.extend_from_slice(&x.to_be_bytes());
            buf.extend_from_slice(&y.to_be_bytes());
            buf.extend_from_slice(&width.to_be_bytes());
            buf.extend_from_slice(&height.to_be_bytes());
            buf.extend_from_slice(&encode_scroll_axis(*hscroll).to_be_bytes());
            buf.extend_from_slice(&encode_scroll_axis(*vscroll).to_be_bytes());
            buf.extend_from_slice(&buttons.to_be_bytes());
            Ok(buf)
        }
        ControlMessage::ExpandNotificationPanel => Ok(vec![TYPE_EXPAND_NOTIFICATION_PANEL]),
        ControlMessage::ExpandSettingsPanel => Ok(vec![TYPE_EXPAND_SETTINGS_PANEL]),
        ControlMessage::CollapsePanels => Ok(vec![TYPE_COLLAPSE_PANELS]),
        ControlMessage::GetClipboard { copy_key } => Ok(vec![TYPE_GET_CLIPBOARD, *copy_key]),
        ControlMessage::SetClipboard {
            sequence,
            paste,
            text,
        } => {
            let bytes = text.as_bytes();
            let mut buf = Vec::with_capacity(14 + bytes.len());
            buf.push(TYPE_SET_CLIPBOARD);
            buf.extend_from_slice(&sequence.to_be_bytes());
            buf.push(u8::from(*paste));
            buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            buf.extend_from_slice(bytes);
            Ok(buf)
        }
        ControlMessage::SetDisplayPower { on } => Ok(vec![TYPE_SET_DISPLAY_POWER, u8::from(*on)]),
        ControlMessage::RotateDevice => Ok(vec![TYPE_ROTATE_DEVICE]),
        ControlMessage::StartApp { name } => {
            let bytes = name.as_bytes();
            if bytes.len() > MAX_START_APP_BYTES {
                return Err(ProtocolError::PackageNameTooLong { len: bytes.len() });
            }
            let mut buf = Vec::with_capacity(2 + bytes.len());
            buf.push(TYPE_START_APP);
            buf.push(bytes.len() as u8);
            buf.extend_from_slice(bytes);
            Ok(buf)
        }
    }
}

/// One device-to-host message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    Clipboard { text: String },
}

/// Incremental decode from the front of `buf`. Returns `None` while the
/// frame is incomplete; on success the consumed byte count lets the
/// caller advance its cursor.
pub fn decode_device_message(
    buf: &[u8],
) -> Result<Option<(DeviceMessage, usize)>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }
    match buf[0] {
        DEVICE_MSG_TYPE_CLIPBOARD => {
            if buf.len() < 5 {
                return Ok(None);
            }
            let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
            if len > MAX_CLIPBOARD_BYTES {
                return Err(ProtocolError::OversizeClipboardReply { len });
            }
            if buf.len() < 5 + len {
                return Ok(None);
            }
            let text = String::from_utf8_lossy(&buf[5..5 + len]).to_string();
            Ok(Some((DeviceMessage::Clipboard { text }, 5 + len)))
        }
        other => Err(ProtocolError::UnknownMessageType(other)),
    }
}

/// Parse the 76-byte metadata frame: 64 bytes null-padded device name,
/// then codec id, width and height as u32. Bytes past the frame belong to
/// the video stream and are handed back for the downstream consumer.
pub fn parse_metadata_frame(buf: &[u8]) -> Result<(DeviceMetadata, Vec<u8>), ProtocolError> {
    if buf.len() < METADATA_FRAME_LEN {
        return Err(ProtocolError::Truncated {
            needed: METADATA_FRAME_LEN,
            available: buf.len(),
        });
    }
    let name_field = &buf[..DEVICE_NAME_FIELD_LEN];
    let name_end = name_field
        .iter()
        .position(|byte| *byte == 0)
        .unwrap_or(DEVICE_NAME_FIELD_LEN);
    let device_name = String::from_utf8_lossy(&name_field[..name_end]).to_string();
    let codec_id = u32::from_be_bytes([buf[64], buf[65], buf[66], buf[67]]);
    let width = u32::from_be_bytes([buf[68], buf[69], buf[70], buf[71]]);
    let height = u32::from_be_bytes([buf[72], buf[73], buf[74], buf[75]]);
    let overflow = buf[METADATA_FRAME_LEN..].to_vec();
    Ok((
        DeviceMetadata {
            device_name,
            codec_id,
            width,
            height,
        },
        overflow,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keycode_frame_is_byte_exact() {
        let bytes = encode_control_message(&ControlMessage::InjectKeycode {
            action: ACTION_DOWN,
            keycode: 66,
            repeat: 0,
            meta_state: 0,
        })
        .expect("encode");
        assert_eq!(bytes.len(), 14);
        assert_eq!(
            bytes,
            vec![0, 0, 0x00, 0x00, 0x00, 0x42, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn text_frame_is_byte_exact() {
        let bytes = encode_control_message(&ControlMessage::InjectText {
            text: "AB".to_string(),
        })
        .expect("encode");
        assert_eq!(bytes, vec![1, 0, 0, 0, 2, 0x41, 0x42]);
    }

    #[test]
    fn text_frame_counts_utf8_bytes() {
        let bytes = encode_control_message(&ControlMessage::InjectText {
            text: "é".to_string(),
        })
        .expect("encode");
        assert_eq!(bytes.len(), 7);
        assert_eq!(&bytes[1..5], &[0, 0, 0, 2]);
    }

    #[test]
    fn text_frame_enforces_size_bound() {
        let max = "a".repeat(300);
        let bytes = encode_control_message(&ControlMessage::InjectText { text: max })
            .expect("300 bytes fit");
        assert_eq!(bytes.len(), 305);

        let over = "a".repeat(301);
        let err = encode_control_message(&ControlMessage::InjectText { text: over })
            .expect_err("301 bytes rejected");
        assert_eq!(err, ProtocolError::TextTooLong { len: 301 });
    }

    fn touch(pressure: f32) -> ControlMessage {
        ControlMessage::InjectTouch {
            action: ACTION_DOWN,
            pointer_id: 0xFFFF_FFFF_FFFF_FFFF,
            x: 540,
            y: 1200,
            width: 1080,
            height: 2400,
            pressure,
            action_button: 0,
            buttons: 0,
        }
    }

    #[test]
    fn touch_frame_layout() {
        let bytes = encode_control_message(&touch(1.0)).expect("encode");
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[0], 2);
        assert_eq!(&bytes[2..10], &[0xFF; 8]);
        assert_eq!(&bytes[10..14], &540i32.to_be_bytes());
        assert_eq!(&bytes[14..18], &1200i32.to_be_bytes());
        assert_eq!(&bytes[22..24], &[0xFF, 0xFF]);
    }

    #[test]
    fn touch_pressure_clamps() {
        let zero = encode_control_message(&touch(0.0)).expect("encode");
        assert_eq!(&zero[22..24], &[0x00, 0x00]);
        let over = encode_control_message(&touch(2.0)).expect("encode");
        assert_eq!(&over[22..24], &[0xFF, 0xFF]);
    }

    #[test]
    fn scroll_axis_saturates() {
        let up = encode_control_message(&ControlMessage::InjectScroll {
            x: 100,
            y: 200,
            width: 1080,
            height: 2400,
            hscroll: 0.0,
            vscroll: 16.0,
            buttons: 0,
        })
        .expect("encode");
        assert_eq!(up.len(), 21);
        assert_eq!(&up[15..17], &[0x7F, 0xFF]);

        let down = encode_control_message(&ControlMessage::InjectScroll {
            x: 100,
            y: 200,
            width: 1080,
            height: 2400,
            hscroll: 0.0,
            vscroll: -16.0,
            buttons: 0,
        })
        .expect("encode");
        assert_eq!(&down[15..17], &[0x80, 0x00]);
    }

    #[test]
    fn display_power_frames() {
        let on = encode_control_message(&ControlMessage::SetDisplayPower { on: true })
            .expect("encode");
        assert_eq!(on, vec![0x0A, 0x01]);
        let off = encode_control_message(&ControlMessage::SetDisplayPower { on: false })
            .expect("encode");
        assert_eq!(off, vec![0x0A, 0x00]);
    }

    #[test]
    fn single_byte_frames() {
        for (message, tag) in [
            (ControlMessage::ExpandNotificationPanel, 5u8),
            (ControlMessage::ExpandSettingsPanel, 6),
            (ControlMessage::CollapsePanels, 7),
            (ControlMessage::RotateDevice, 11),
        ] {
            assert_eq!(encode_control_message(&message).expect("encode"), vec![tag]);
        }
    }

    #[test]
    fn clipboard_frames() {
        let get = encode_control_message(&ControlMessage::GetClipboard {
            copy_key: COPY_KEY_NONE,
        })
        .expect("encode");
        assert_eq!(get, vec![8, 0]);

        let set = encode_control_message(&ControlMessage::SetClipboard {
            sequence: 42,
            paste: true,
            text: String::new(),
        })
        .expect("encode");
        assert_eq!(set.len(), 14);
        assert_eq!(&set[1..9], &[0, 0, 0, 0, 0, 0, 0, 0x2A]);
        assert_eq!(set[9], 1);
        assert_eq!(&set[10..14], &[0, 0, 0, 0]);
    }

    #[test]
    fn start_app_frame_and_bound() {
        let bytes = encode_control_message(&ControlMessage::StartApp {
            name: "com.example.app".to_string(),
        })
        .expect("encode");
        assert_eq!(bytes[0], 0x10);
        assert_eq!(bytes[1], 0x0F);
        assert_eq!(&bytes[2..], b"com.example.app");

        let max = "a".repeat(255);
        assert!(encode_control_message(&ControlMessage::StartApp { name: max }).is_ok());
        let over = "a".repeat(256);
        let err = encode_control_message(&ControlMessage::StartApp { name: over })
            .expect_err("256 bytes rejected");
        assert_eq!(err, ProtocolError::PackageNameTooLong { len: 256 });
    }

    #[test]
    fn device_message_decodes_incrementally() {
        let mut frame = vec![0u8, 0, 0, 0, 5];
        frame.extend_from_slice(b"hello");

        assert_eq!(decode_device_message(&frame[..3]).expect("partial"), None);
        assert_eq!(decode_device_message(&frame[..7]).expect("partial"), None);

        let mut stream = frame.clone();
        stream.extend_from_slice(&[0, 0, 0, 0, 1, b'x']);
        let (message, consumed) = decode_device_message(&stream)
            .expect("decode")
            .expect("complete");
        assert_eq!(
            message,
            DeviceMessage::Clipboard {
                text: "hello".to_string()
            }
        );
        assert_eq!(consumed, 10);
        let (second, _) = decode_device_message(&stream[consumed..])
            .expect("decode")
            .expect("complete");
        assert_eq!(
            second,
            DeviceMessage::Clipboard {
                text: "x".to_string()
            }
        );
    }

    #[test]
    fn device_message_rejects_oversize_length() {
        let frame = [0u8, 0x00, 0x20, 0x00, 0x01];
        let err = decode_device_message(&frame).expect_err("oversize");
        assert_eq!(
            err,
            ProtocolError::OversizeClipboardReply { len: 0x0020_0001 }
        );
    }

    #[test]
    fn metadata_frame_carries_overflow() {
        let mut frame = Vec::new();
        let mut name = b"Pixel 7".to_vec();
        name.resize(64, 0);
        frame.extend_from_slice(&name);
        frame.extend_from_slice(&0x68323634u32.to_be_bytes());
        frame.extend_from_slice(&1080u32.to_be_bytes());
        frame.extend_from_slice(&2400u32.to_be_bytes());
        frame.extend_from_slice(&[0xDE, 0xAD, 0xBE]);

        let (metadata, overflow) = parse_metadata_frame(&frame).expect("parse");
        assert_eq!(metadata.device_name, "Pixel 7");
        assert_eq!(metadata.codec_id, 0x68323634);
        assert_eq!(metadata.width, 1080);
        assert_eq!(metadata.height, 2400);
        assert_eq!(overflow, vec![0xDE, 0xAD, 0xBE]);

        let err = parse_metadata_frame(&frame[..50]).expect_err("short frame");
        assert_eq!(
            err,
            ProtocolError::Truncated {
                needed: 76,
                available: 50
            }
        );
    }
}
