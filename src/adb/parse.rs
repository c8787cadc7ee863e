use std::collections::HashMap;

use regex::Regex;

use crate::models::{DeviceSummary, FileEntry};

pub fn parse_adb_devices(output: &str) -> Vec<DeviceSummary> {
    output.lines().filter_map(parse_device_line).collect()
}

/// One `adb devices -l` row: serial, state, then optional `key:value`
/// descriptors. Banner, daemon chatter and short rows yield nothing.
fn parse_device_line(line: &str) -> Option<DeviceSummary> {
    let trimmed = line.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('*')
        || trimmed.to_lowercase().starts_with("list of devices")
    {
        return None;
    }
    let (serial, rest) = trimmed.split_once(char::is_whitespace)?;
    let mut fields = rest.split_whitespace();
    let mut summary = DeviceSummary {
        serial: serial.to_string(),
        state: fields.next()?.to_string(),
        model: None,
        product: None,
        device: None,
        transport_id: None,
    };
    for field in fields {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        let slot = match key {
            "model" => &mut summary.model,
            "product" => &mut summary.product,
            "device" => &mut summary.device,
            "transport_id" => &mut summary.transport_id,
            _ => continue,
        };
        *slot = Some(value.to_string());
    }
    Some(summary)
}

/// `getprop` rows look like `[key]: [value]`; anything else is noise.
pub fn parse_getprop_map(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix('[')?;
            let (key, rest) = rest.split_once(']')?;
            let value = rest
                .trim_start_matches(':')
                .trim()
                .strip_prefix('[')?
                .strip_suffix(']')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// Toybox `ls -la` long listing. Empty lines, `total` summaries and any
/// line that does not match the fixed column layout are skipped.
///
/// The permission column is ten mode characters plus an optional SELinux
/// suffix (`.` label present, `+` ACL present). Symlink targets are
/// stripped from the name.
pub fn parse_ls_long(output: &str) -> Vec<FileEntry> {
    let line_re = Regex::new(
        r"^([dlbcsp-][rwxst-]{9}[.+]?)\s+\d+\s+(\S+)\s+(\S+)\s+(\d+)\s+(\d{4}-\d{2}-\d{2} \d{2}:\d{2})\s+(.+)$",
    )
    .expect("ls line regex");

    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.trim_start().starts_with("total "))
        .filter_map(|line| {
            let caps = line_re.captures(line.trim_end())?;
            let permissions = caps[1].to_string();
            let remainder = caps[6].trim();
            let name = remainder
                .split_once(" -> ")
                .map(|(name, _target)| name)
                .unwrap_or(remainder)
                .trim()
                .to_string();
            if name.is_empty() {
                return None;
            }
            Some(FileEntry {
                is_dir: permissions.starts_with('d'),
                name,
                owner: caps[2].to_string(),
                group: caps[3].to_string(),
                size_bytes: caps[4].parse().ok()?,
                modified_at: caps[5].to_string(),
                permissions,
            })
        })
        .collect()
}

/// `pm uninstall` output classifier: `Success` and silence both mean the
/// package is gone.
pub fn uninstall_succeeded(output: &str) -> bool {
    let trimmed = output.trim();
    if trimmed.contains("DELETE_FAILED") {
        return false;
    }
    !trimmed.starts_with("Failure")
}

/// Pull clipboard text out of a `service call clipboard 2` parcel dump.
/// Three strategies, in order: the text after a zero result code, the
/// first double-quoted run, then a hex run decoded as UTF-8.
pub fn extract_service_clipboard(output: &str) -> Option<String> {
    let result_re = Regex::new(r"(?i)result=0[^)]*\)\s*(.+)").ok()?;
    if let Some(caps) = result_re.captures(output) {
        return Some(caps[1].trim().to_string());
    }

    let quoted_re = Regex::new(r#""([^"]*)""#).ok()?;
    if let Some(caps) = quoted_re.captures(output) {
        return Some(caps[1].to_string());
    }

    let hex_re = Regex::new(r"0x([0-9a-fA-F]+)").ok()?;
    if let Some(caps) = hex_re.captures(output) {
        let digits = caps[1].as_bytes();
        let mut bytes = Vec::with_capacity(digits.len() / 2);
        for pair in digits.chunks_exact(2) {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            bytes.push((hi * 16 + lo) as u8);
        }
        return String::from_utf8(bytes).ok();
    }

    None
}

/// Decode `\ddd` octal escapes the service dump uses for non-ASCII and
/// whitespace code units. Unknown escapes pass through untouched.
pub fn decode_octal_escapes(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = String::with_capacity(input.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'\\' {
            let mut value: u32 = 0;
            let mut digits = 0;
            while digits < 3
                && index + 1 + digits < bytes.len()
                && (b'0'..=b'7').contains(&bytes[index + 1 + digits])
            {
                value = value * 8 + u32::from(bytes[index + 1 + digits] - b'0');
                digits += 1;
            }
            if digits > 0 {
                if let Some(ch) = char::from_u32(value) {
                    decoded.push(ch);
                    index += 1 + digits;
                    continue;
                }
            }
        }
        // Safe: we only land on char boundaries outside the escape arm.
        let ch = input[index..].chars().next().unwrap_or('\u{FFFD}');
        decoded.push(ch);
        index += ch.len_utf8();
    }
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;

    const LS_FIXTURE: &str = "\
total 64
drwxrwx--x  4 root sdcard_rw 4096 2024-03-10 09:00 .
drwxrwx--x  2 root sdcard_rw 4096 2024-03-01 08:00 ..
drwxrwx--x  2 root sdcard_rw 4096 2024-02-14 10:30 DCIM
drwxrwx--x. 6 root sdcard_rw 4096 2024-02-14 10:31 Android
-rw-rw----  1 root sdcard_rw 1024 2024-03-10 09:15 notes.txt
-rw-rw----+ 1 root sdcard_rw 2048 2024-03-09 18:22 report with spaces.pdf
lrwxrwxrwx  1 root root         8 2024-01-01 00:00 sdcard -> /sdcard
this line is garbage and must be skipped
";

    #[test]
    fn parses_devices_output() {
        let output = "\
* daemon started successfully
List of devices attached
0123456789ABCDEF device product:sdk_gphone64_arm64 model:Pixel_7 device:emu64a transport_id:1
emulator-5554 unauthorized transport_id:2
orphan
";
        let parsed = parse_adb_devices(output);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].serial, "0123456789ABCDEF");
        assert_eq!(parsed[0].model.as_deref(), Some("Pixel_7"));
        assert_eq!(parsed[0].transport_id.as_deref(), Some("1"));
        assert_eq!(parsed[1].state, "unauthorized");
        assert_eq!(parsed[1].model, None);
    }

    #[test]
    fn parses_getprop_map() {
        let output = "\
[ro.product.brand]: [google]
[ro.build.version.sdk]: [34]
[ro.broken.row]: no brackets
warning: not a property row
";
        let map = parse_getprop_map(output);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("ro.product.brand").map(String::as_str), Some("google"));
        assert_eq!(map.get("ro.build.version.sdk").map(String::as_str), Some("34"));
    }

    #[test]
    fn ls_fixture_parses_seven_entries() {
        let entries = parse_ls_long(LS_FIXTURE);
        assert_eq!(entries.len(), 7);
        let dirs: Vec<&str> = entries
            .iter()
            .filter(|entry| entry.is_dir)
            .map(|entry| entry.name.as_str())
            .collect();
        assert_eq!(dirs, vec![".", "..", "DCIM", "Android"]);
    }

    #[test]
    fn ls_fixture_reads_size_and_date() {
        let entries = parse_ls_long(LS_FIXTURE);
        let notes = entries
            .iter()
            .find(|entry| entry.name == "notes.txt")
            .expect("notes.txt");
        assert_eq!(notes.size_bytes, 1024);
        assert_eq!(notes.modified_at, "2024-03-10 09:15");
        assert!(!notes.is_dir);
    }

    #[test]
    fn ls_fixture_strips_symlink_target() {
        let entries = parse_ls_long(LS_FIXTURE);
        let link = entries
            .iter()
            .find(|entry| entry.permissions.starts_with('l'))
            .expect("symlink");
        assert_eq!(link.name, "sdcard");
        assert!(!link.name.contains("->"));
    }

    #[test]
    fn ls_fixture_accepts_selinux_suffixes() {
        let entries = parse_ls_long(LS_FIXTURE);
        assert!(entries.iter().any(|entry| entry.permissions.ends_with('.')));
        assert!(entries.iter().any(|entry| entry.permissions.ends_with('+')));
        let spaced = entries
            .iter()
            .find(|entry| entry.name == "report with spaces.pdf")
            .expect("name with spaces");
        assert_eq!(spaced.size_bytes, 2048);
    }

    #[test]
    fn uninstall_classifier_matches_known_outputs() {
        assert!(uninstall_succeeded("Success"));
        assert!(uninstall_succeeded(""));
        assert!(!uninstall_succeeded("Failure [not installed for 0]"));
        assert!(!uninstall_succeeded("Error: DELETE_FAILED_INTERNAL_ERROR"));
    }

    #[test]
    fn service_clipboard_reads_result_line() {
        let output = "Result: Parcel(result=0 fd=-1) hello world\n";
        assert_eq!(
            extract_service_clipboard(output).as_deref(),
            Some("hello world")
        );
    }

    #[test]
    fn service_clipboard_falls_back_to_quoted_run() {
        let output = "Parcel(\n 0x00: sometext \"copied text\" trailing)\n";
        assert_eq!(
            extract_service_clipboard(output).as_deref(),
            Some("copied text")
        );
    }

    #[test]
    fn service_clipboard_decodes_hex_run() {
        // "hi" = 0x6869
        let output = "Parcel raw 0x6869 end";
        assert_eq!(extract_service_clipboard(output).as_deref(), Some("hi"));
    }

    #[test]
    fn decodes_octal_escapes() {
        assert_eq!(decode_octal_escapes(r"Hello\040World"), "Hello World");
        assert_eq!(decode_octal_escapes(r"tab\011end"), "tab\tend");
        assert_eq!(decode_octal_escapes("plain"), "plain");
        assert_eq!(decode_octal_escapes(r"trailing\"), r"trailing\");
    }
}
