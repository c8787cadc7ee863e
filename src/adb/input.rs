use crate::error::BridgeError;

/// Key names accepted by the key-event operation. Values are Android
/// `KeyEvent` codes; the device-side server and `input keyevent` agree on
/// them.
const KEYCODES: &[(&str, i32)] = &[
    ("HOME", 3),
    ("BACK", 4),
    ("CALL", 5),
    ("ENDCALL", 6),
    ("DPAD_UP", 19),
    ("DPAD_DOWN", 20),
    ("DPAD_LEFT", 21),
    ("DPAD_RIGHT", 22),
    ("DPAD_CENTER", 23),
    ("VOLUME_UP", 24),
    ("VOLUME_DOWN", 25),
    ("POWER", 26),
    ("CAMERA", 27),
    ("TAB", 61),
    ("SPACE", 62),
    ("ENTER", 66),
    ("DEL", 67),
    ("MENU", 82),
    ("SEARCH", 84),
    ("MEDIA_PLAY_PAUSE", 85),
    ("MEDIA_NEXT", 87),
    ("MEDIA_PREVIOUS", 88),
    ("PAGE_UP", 92),
    ("PAGE_DOWN", 93),
    ("ESCAPE", 111),
    ("FORWARD_DEL", 112),
    ("MOVE_HOME", 122),
    ("MOVE_END", 123),
    ("VOLUME_MUTE", 164),
    ("APP_SWITCH", 187),
    ("SLEEP", 223),
    ("WAKEUP", 224),
];

/// Resolve a key name or decimal string to its keycode. An optional
/// `KEYCODE_` prefix is accepted.
pub fn resolve_keycode(name: &str, trace_id: &str) -> Result<i32, BridgeError> {
    let trimmed = name.trim();
    if let Ok(code) = trimmed.parse::<i32>() {
        return Ok(code);
    }
    let upper = trimmed.to_uppercase();
    let key = upper.strip_prefix("KEYCODE_").unwrap_or(&upper);
    KEYCODES
        .iter()
        .find(|(candidate, _)| *candidate == key)
        .map(|(_, code)| *code)
        .ok_or_else(|| BridgeError::unknown_keycode(name, trace_id))
}

/// Escape text for `input text`. The command goes through an unknown
/// device shell, so the substitution list is fixed: spaces become `%s`
/// and every metacharacter gets a backslash.
pub fn escape_input_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        match ch {
            ' ' => escaped.push_str("%s"),
            '\\' | '"' | '\'' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | ';' | '<' | '>'
            | '&' | '*' | '?' | '$' | '`' | '!' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Android package names: at least two dot-separated segments, each
/// starting with a letter, all characters shell-safe.
pub fn validate_package_name(name: &str, trace_id: &str) -> Result<(), BridgeError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::invalid_package_name(name, trace_id));
    }
    let segments: Vec<&str> = trimmed.split('.').collect();
    if segments.len() < 2 {
        return Err(BridgeError::invalid_package_name(name, trace_id));
    }
    for segment in segments {
        let mut chars = segment.chars();
        let Some(first) = chars.next() else {
            return Err(BridgeError::invalid_package_name(name, trace_id));
        };
        if !first.is_ascii_alphabetic() {
            return Err(BridgeError::invalid_package_name(name, trace_id));
        }
        if !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
            return Err(BridgeError::invalid_package_name(name, trace_id));
        }
    }
    Ok(())
}
