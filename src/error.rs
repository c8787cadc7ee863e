use serde::Serialize;
use std::fmt;

/// Failure surfaced by any bridge operation. Carries a stable machine
/// code alongside the human-readable message and the trace id of the
/// request that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl BridgeError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_VALIDATION", message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_SYSTEM", message, trace_id)
    }

    pub fn no_device_attached(trace_id: impl Into<String>) -> Self {
        Self::new(
            "ERR_NO_DEVICE_ATTACHED",
            "no device attached; connect a device or pass a serial",
            trace_id,
        )
    }

    pub fn ambiguous_device(count: usize, trace_id: impl Into<String>) -> Self {
        Self::new(
            "ERR_AMBIGUOUS_DEVICE",
            format!("{count} devices attached; pass a serial to pick one"),
            trace_id,
        )
    }

    pub fn adb_failed(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_ADB_FAILED", message, trace_id)
    }

    pub fn adb_timeout(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_ADB_TIMEOUT", message, trace_id)
    }

    pub fn server_not_found(trace_id: impl Into<String>) -> Self {
        Self::new(
            "ERR_SERVER_NOT_FOUND",
            "scrcpy server jar not found; set SCRCPY_SERVER_PATH",
            trace_id,
        )
    }

    pub fn dummy_byte_missing(trace_id: impl Into<String>) -> Self {
        Self::new(
            "ERR_DUMMY_BYTE_MISSING",
            "tunnel accepted but the server never sent its dummy byte",
            trace_id,
        )
    }

    pub fn metadata_timeout(trace_id: impl Into<String>) -> Self {
        Self::new(
            "ERR_METADATA_TIMEOUT",
            "device metadata frame not received in time",
            trace_id,
        )
    }

    pub fn transport_broken(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_TRANSPORT_BROKEN", message, trace_id)
    }

    pub fn clipboard_timeout(trace_id: impl Into<String>) -> Self {
        Self::new(
            "ERR_CLIPBOARD_TIMEOUT",
            "device did not answer the clipboard request in time",
            trace_id,
        )
    }

    pub fn text_too_long(len: usize, trace_id: impl Into<String>) -> Self {
        Self::new(
            "ERR_TEXT_TOO_LONG",
            format!("text is {len} UTF-8 bytes; the control channel accepts at most 300"),
            trace_id,
        )
    }

    pub fn package_name_too_long(len: usize, trace_id: impl Into<String>) -> Self {
        Self::new(
            "ERR_PACKAGE_NAME_TOO_LONG",
            format!("package name is {len} UTF-8 bytes; at most 255 allowed"),
            trace_id,
        )
    }

    pub fn unknown_keycode(name: impl fmt::Display, trace_id: impl Into<String>) -> Self {
        Self::new(
            "ERR_UNKNOWN_KEYCODE",
            format!("unknown key name: {name}"),
            trace_id,
        )
    }

    pub fn invalid_package_name(name: impl fmt::Display, trace_id: impl Into<String>) -> Self {
        Self::new(
            "ERR_INVALID_PACKAGE_NAME",
            format!("invalid package name: {name}"),
            trace_id,
        )
    }

    pub fn oversize_clipboard_reply(len: usize, trace_id: impl Into<String>) -> Self {
        Self::new(
            "ERR_OVERSIZE_CLIPBOARD_REPLY",
            format!("device sent a {len}-byte clipboard reply; at most 1 MiB allowed"),
            trace_id,
        )
    }

    /// Input-shaped failures never trigger the adb fallback; they go
    /// straight back to the caller.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.code.as_str(),
            "ERR_VALIDATION"
                | "ERR_TEXT_TOO_LONG"
                | "ERR_PACKAGE_NAME_TOO_LONG"
                | "ERR_UNKNOWN_KEYCODE"
                | "ERR_INVALID_PACKAGE_NAME"
        )
    }

    /// Re-stamp an error with the trace id of the request that observed it.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for BridgeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_kinds_skip_fallback() {
        assert!(BridgeError::text_too_long(301, "t").is_validation());
        assert!(BridgeError::unknown_keycode("NOPE", "t").is_validation());
        assert!(!BridgeError::transport_broken("gone", "t").is_validation());
        assert!(!BridgeError::clipboard_timeout("t").is_validation());
    }

    #[test]
    fn display_includes_code() {
        let err = BridgeError::dummy_byte_missing("trace-9");
        assert!(err.to_string().contains("ERR_DUMMY_BYTE_MISSING"));
        assert_eq!(err.trace_id, "trace-9");
    }
}
