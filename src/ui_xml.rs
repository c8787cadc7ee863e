//! uiautomator dump parsing: every `<node …>` element becomes one flat
//! record with its derived tap center. Hierarchy is deliberately not
//! preserved; finders work on the flat list.

use regex::Regex;

use crate::models::{UiBounds, UiNode};

/// Criteria for find-element operations. Text and content description
/// match case-insensitive substrings; resource id and class name match
/// exactly. All present criteria must hold.
#[derive(Debug, Clone, Default)]
pub struct UiFilter {
    pub text: Option<String>,
    pub resource_id: Option<String>,
    pub class_name: Option<String>,
    pub content_desc: Option<String>,
}

/// Walk every `node` element in document order. Nodes whose `bounds`
/// attribute does not parse are dropped.
pub fn parse_ui_nodes(xml: &str) -> Vec<UiNode> {
    let bounds_re =
        Regex::new(r"^\[(\d+),(\d+)\]\[(\d+),(\d+)\]$").expect("bounds regex");

    let mut nodes = Vec::new();
    let bytes = xml.as_bytes();
    let mut index = 0usize;

    while index < bytes.len() {
        if bytes[index] != b'<' {
            index += 1;
            continue;
        }
        if index + 1 >= bytes.len() {
            break;
        }
        match bytes[index + 1] {
            b'/' | b'!' | b'?' => {
                index += 2;
                while index < bytes.len() && bytes[index] != b'>' {
                    index += 1;
                }
                index = (index + 1).min(bytes.len());
            }
            _ => {
                let name_start = index + 1;
                let mut cursor = name_start;
                while cursor < bytes.len() {
                    let ch = bytes[cursor];
                    if ch == b'/' || ch == b'>' || ch.is_ascii_whitespace() {
                        break;
                    }
                    cursor += 1;
                }
                let tag_name = &xml[name_start..cursor];
                let (attrs, next) = scan_attributes(xml, cursor);
                index = next;
                if tag_name == "node" {
                    if let Some(node) = build_node(&attrs, &bounds_re) {
                        nodes.push(node);
                    }
                }
            }
        }
    }
    nodes
}

/// Apply a filter to a parsed node list.
pub fn filter_nodes(nodes: &[UiNode], filter: &UiFilter) -> Vec<UiNode> {
    nodes
        .iter()
        .filter(|node| {
            if let Some(text) = &filter.text {
                if !node.text.to_lowercase().contains(&text.to_lowercase()) {
                    return false;
                }
            }
            if let Some(desc) = &filter.content_desc {
                if !node
                    .content_desc
                    .to_lowercase()
                    .contains(&desc.to_lowercase())
                {
                    return false;
                }
            }
            if let Some(id) = &filter.resource_id {
                if node.resource_id != *id {
                    return false;
                }
            }
            if let Some(class) = &filter.class_name {
                if node.class_name != *class {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect()
}

/// Scan `name="value"` pairs until the tag closes. Returns the collected
/// attributes and the byte index just past the `>`.
fn scan_attributes(xml: &str, mut cursor: usize) -> (Vec<(String, String)>, usize) {
    let bytes = xml.as_bytes();
    let mut attrs = Vec::new();
    while cursor < bytes.len() {
        while cursor < bytes.len() && bytes[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        if cursor >= bytes.len() {
            break;
        }
        match bytes[cursor] {
            b'>' => {
                cursor += 1;
                break;
            }
            b'/' => {
                cursor += 1;
                if cursor < bytes.len() && bytes[cursor] == b'>' {
                    cursor += 1;
                }
                break;
            }
            _ => {
                let name_start = cursor;
                while cursor < bytes.len()
                    && bytes[cursor] != b'='
                    && bytes[cursor] != b'>'
                    && !bytes[cursor].is_ascii_whitespace()
                {
                    cursor += 1;
                }
                let name_end = cursor;
                if cursor >= bytes.len() || bytes[cursor] != b'=' {
                    continue;
                }
                cursor += 1;
                if cursor >= bytes.len() {
                    break;
                }
                let quote = bytes[cursor];
                if quote != b'"' && quote != b'\'' {
                    continue;
                }
                cursor += 1;
                let value_start = cursor;
                while cursor < bytes.len() && bytes[cursor] != quote {
                    cursor += 1;
                }
                if cursor >= bytes.len() {
                    break;
                }
                let value = &xml[value_start..cursor];
                cursor += 1;
                attrs.push((
                    xml[name_start..name_end].to_string(),
                    xml_unescape(value),
                ));
            }
        }
    }
    (attrs, cursor)
}

fn build_node(attrs: &[(String, String)], bounds_re: &Regex) -> Option<UiNode> {
    let attr = |name: &str| -> String {
        attrs
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| value.clone())
            .unwrap_or_default()
    };

    let bounds_raw = attr("bounds");
    let caps = bounds_re.captures(&bounds_raw)?;
    let x1: i32 = caps[1].parse().ok()?;
    let y1: i32 = caps[2].parse().ok()?;
    let x2: i32 = caps[3].parse().ok()?;
    let y2: i32 = caps[4].parse().ok()?;

    Some(UiNode {
        text: attr("text"),
        resource_id: attr("resource-id"),
        class_name: attr("class"),
        content_desc: attr("content-desc"),
        clickable: attr("clickable") == "true",
        bounds: UiBounds { x1, y1, x2, y2 },
        center_x: (x1 + x2) / 2,
        center_y: (y1 + y2) / 2,
    })
}

fn xml_unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    let mut unescaped = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('&') {
        unescaped.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let Some(end) = rest.find(';') else {
            unescaped.push_str(rest);
            return unescaped;
        };
        let entity = &rest[1..end];
        match entity {
            "amp" => unescaped.push('&'),
            "lt" => unescaped.push('<'),
            "gt" => unescaped.push('>'),
            "quot" => unescaped.push('"'),
            "apos" => unescaped.push('\''),
            _ => {
                if let Some(code) = entity.strip_prefix('#') {
                    let parsed = if let Some(hex) = code.strip_prefix('x') {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        code.parse::<u32>().ok()
                    };
                    match parsed.and_then(char::from_u32) {
                        Some(ch) => unescaped.push(ch),
                        None => unescaped.push_str(&rest[..=end]),
                    }
                } else {
                    unescaped.push_str(&rest[..=end]);
                }
            }
        }
        rest = &rest[end + 1..];
    }
    unescaped.push_str(rest);
    unescaped
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_FIXTURE: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node index="0" text="" resource-id="" class="android.widget.FrameLayout" content-desc="" clickable="false" bounds="[0,0][1080,2400]">
    <node index="0" text="Username" resource-id="com.example.app:id/username" class="android.widget.EditText" content-desc="Username field" clickable="true" bounds="[60,800][1020,900]" />
    <node index="1" text="Login" resource-id="com.example.app:id/login" class="android.widget.Button" content-desc="Login button" clickable="true" bounds="[360,1140][720,1260]" />
    <node index="2" text="Forgot password?" resource-id="" class="android.widget.TextView" content-desc="" clickable="true" bounds="[300,1300][780,1360]" />
    <node index="3" text="" resource-id="" class="android.view.View" content-desc="" clickable="false" bounds="not-bounds" />
  </node>
</hierarchy>
"#;

    #[test]
    fn login_fixture_parses_four_nodes() {
        let nodes = parse_ui_nodes(LOGIN_FIXTURE);
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0].class_name, "android.widget.FrameLayout");
    }

    #[test]
    fn tap_centers_are_integer_midpoints() {
        let nodes = parse_ui_nodes(LOGIN_FIXTURE);
        let login = nodes
            .iter()
            .find(|node| node.text == "Login")
            .expect("login button");
        assert_eq!((login.center_x, login.center_y), (540, 1200));

        let username = nodes
            .iter()
            .find(|node| node.text == "Username")
            .expect("username field");
        assert_eq!((username.center_x, username.center_y), (540, 850));
        assert!(username.clickable);
    }

    #[test]
    fn filters_match_case_insensitive_text() {
        let nodes = parse_ui_nodes(LOGIN_FIXTURE);
        let filter = UiFilter {
            text: Some("login".to_string()),
            ..UiFilter::default()
        };
        let matches = filter_nodes(&nodes, &filter);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].resource_id, "com.example.app:id/login");
    }

    #[test]
    fn filters_match_class_exactly() {
        let nodes = parse_ui_nodes(LOGIN_FIXTURE);
        let filter = UiFilter {
            class_name: Some("android.widget.Button".to_string()),
            ..UiFilter::default()
        };
        assert_eq!(filter_nodes(&nodes, &filter).len(), 1);

        // Exact match: a prefix is not enough.
        let prefix = UiFilter {
            class_name: Some("android.widget".to_string()),
            ..UiFilter::default()
        };
        assert_eq!(filter_nodes(&nodes, &prefix).len(), 0);
    }

    #[test]
    fn filters_and_together() {
        let nodes = parse_ui_nodes(LOGIN_FIXTURE);
        let filter = UiFilter {
            text: Some("login".to_string()),
            class_name: Some("android.widget.EditText".to_string()),
            ..UiFilter::default()
        };
        assert_eq!(filter_nodes(&nodes, &filter).len(), 0);
    }

    #[test]
    fn unescapes_xml_entities() {
        let xml = r#"<node text="a &amp; b &quot;c&quot; &#65;" bounds="[0,0][10,10]" />"#;
        let nodes = parse_ui_nodes(xml);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].text, "a & b \"c\" A");
    }
}
