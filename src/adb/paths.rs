use crate::error::BridgeError;

/// Device paths accepted by push/pull/ls operations: absolute, no `..`
/// traversal, and no characters that would need shell quoting tricks.
pub fn validate_device_path(path: &str, trace_id: &str) -> Result<(), BridgeError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::validation("device path is required", trace_id));
    }
    if !trimmed.starts_with('/') {
        return Err(BridgeError::validation(
            "device path must be absolute",
            trace_id,
        ));
    }
    if trimmed.contains('\0') || trimmed.contains('\'') || trimmed.contains('"') || trimmed.contains('\\') {
        return Err(BridgeError::validation(
            "device path contains unsupported characters",
            trace_id,
        ));
    }
    for segment in trimmed.split('/') {
        if segment == ".." {
            return Err(BridgeError::validation(
                "device path must not contain '..' segments",
                trace_id,
            ));
        }
    }
    Ok(())
}

/// Single-quote a validated device path for use inside one shell command.
pub fn quote_device_path(path: &str) -> String {
    format!("'{}'", path.trim())
}

/// Make a serial usable as a host filename fragment. Anything outside a
/// conservative character set collapses to `_`; a blank serial falls
/// back to a fixed stand-in.
pub fn sanitize_filename_component(value: &str) -> String {
    let sanitized: String = value
        .trim()
        .chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => ch,
            _ => '_',
        })
        .collect();
    if sanitized.is_empty() {
        "serial".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_and_traversal_paths() {
        assert!(validate_device_path("sdcard/file.txt", "t").is_err());
        assert!(validate_device_path("/sdcard/../etc/passwd", "t").is_err());
        assert!(validate_device_path("", "t").is_err());
        assert!(validate_device_path("/sdcard/o'brien.txt", "t").is_err());
        assert!(validate_device_path("/sdcard/Download/file.txt", "t").is_ok());
        assert!(validate_device_path("/sdcard/My Files/a.txt", "t").is_ok());
    }

    #[test]
    fn quoting_wraps_in_single_quotes() {
        assert_eq!(quote_device_path("/sdcard/My Files"), "'/sdcard/My Files'");
    }

    #[test]
    fn sanitizes_serials_for_filenames() {
        assert_eq!(sanitize_filename_component("RF8M33ABCDE"), "RF8M33ABCDE");
        assert_eq!(sanitize_filename_component("10.0.0.7:5555"), "10.0.0.7_5555");
        assert_eq!(sanitize_filename_component("usb/1-4.2"), "usb_1-4.2");
        assert_eq!(sanitize_filename_component("  "), "serial");
    }
}
