use log::debug;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;

/// Recognized request-body families for field extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFamily {
    Json,
    Form,
    Xml,
    Multipart,
}

impl BodyFamily {
    /// Classifies a `Content-Type` value; `None` means the body is not a
    /// format the extractor understands and buffering is skipped.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim()
            .to_ascii_lowercase();

        if essence == "application/json" || essence.ends_with("+json") {
            Some(Self::Json)
        } else if essence == "application/x-www-form-urlencoded" {
            Some(Self::Form)
        } else if essence == "application/xml"
            || essence == "text/xml"
            || essence.ends_with("+xml")
        {
            Some(Self::Xml)
        } else if essence == "multipart/form-data" {
            Some(Self::Multipart)
        } else {
            None
        }
    }
}

/// Extracts a field value from a buffered request body.
///
/// `content_type` is the full header value (the multipart boundary is read
/// from its parameters). Every failure mode, malformed payload, missing
/// field, unsupported type, yields `None`; extraction never errors out of
/// the request path.
pub fn extract_field(body: &[u8], content_type: &str, path: &str) -> Option<String> {
    if body.is_empty() || path.is_empty() {
        return None;
    }

    let value = match BodyFamily::from_content_type(content_type)? {
        BodyFamily::Json => extract_json(body, path),
        BodyFamily::Form => extract_form(body, path),
        BodyFamily::Xml => extract_xml(body, path),
        BodyFamily::Multipart => extract_multipart(body, content_type, path),
    };

    match value {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            debug!("body field {:?} not found", path);
            None
        }
    }
}

/// Dot-path lookup in a JSON document. Non-string leaves are stringified;
/// objects and arrays serialize back to JSON text.
fn extract_json(body: &[u8], path: &str) -> Option<String> {
    let root: Value = serde_json::from_slice(body).ok()?;

    let mut current = &root;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }

    match current {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => serde_json::to_string(other).ok(),
    }
}

/// Key lookup in a form-urlencoded body.
fn extract_form(body: &[u8], key: &str) -> Option<String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body).ok()?;
    pairs.into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Path lookup over XML elements, namespace-unaware, first match wins.
///
/// The path may be written `/order/customer/id`, `order/customer/id`, or
/// `order.customer.id`; it is matched as a suffix of the open-element
/// stack, so `id` alone finds the first `<id>` anywhere.
fn extract_xml(body: &[u8], path: &str) -> Option<String> {
    let segments: Vec<&str> = path
        .trim_start_matches('/')
        .split(['/', '.'])
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return None;
    }

    let mut reader = Reader::from_reader(body);
    reader.trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                stack.push(local_name(e.name().as_ref()));
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(ref t)) => {
                if stack_matches(&stack, &segments) {
                    if let Ok(text) = t.unescape() {
                        let text = text.trim().to_string();
                        if !text.is_empty() {
                            return Some(text);
                        }
                    }
                }
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

fn local_name(qname: &[u8]) -> String {
    let name = String::from_utf8_lossy(qname);
    name.rsplit(':').next().unwrap_or(&name).to_string()
}

fn stack_matches(stack: &[String], segments: &[&str]) -> bool {
    stack.len() >= segments.len()
        && stack[stack.len() - segments.len()..]
            .iter()
            .zip(segments)
            .all(|(a, b)| a == b)
}

/// Named text part of a multipart/form-data body. File parts (those with
/// a `filename` parameter) are not supported as identifier sources.
fn extract_multipart(body: &[u8], content_type: &str, name: &str) -> Option<String> {
    let boundary = content_type
        .split(';')
        .map(str::trim)
        .find_map(|p| p.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"'))?;

    let delimiter = format!("--{}", boundary);
    let text = std::str::from_utf8(body).ok()?;

    for part in text.split(&delimiter) {
        let part = part.trim_start_matches("\r\n");
        if part.is_empty() || part.starts_with("--") {
            continue;
        }

        let (headers, value) = part.split_once("\r\n\r\n")?;
        let disposition = headers
            .lines()
            .find(|l| l.to_ascii_lowercase().starts_with("content-disposition:"))?;

        if disposition.contains("filename=") {
            continue;
        }

        let part_name = disposition
            .split(';')
            .map(str::trim)
            .find_map(|p| p.strip_prefix("name="))
            .map(|n| n.trim_matches('"'));

        if part_name == Some(name) {
            return Some(value.trim_end_matches("\r\n").to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_content_type_families() {
        assert_eq!(
            BodyFamily::from_content_type("application/json; charset=utf-8"),
            Some(BodyFamily::Json)
        );
        assert_eq!(
            BodyFamily::from_content_type("application/problem+json"),
            Some(BodyFamily::Json)
        );
        assert_eq!(
            BodyFamily::from_content_type("application/x-www-form-urlencoded"),
            Some(BodyFamily::Form)
        );
        assert_eq!(
            BodyFamily::from_content_type("text/xml"),
            Some(BodyFamily::Xml)
        );
        assert_eq!(
            BodyFamily::from_content_type("multipart/form-data; boundary=x"),
            Some(BodyFamily::Multipart)
        );
        assert_eq!(BodyFamily::from_content_type("text/plain"), None);
    }

    #[test]
    fn json_dot_path_extraction() {
        let body = br#"{"user":{"id":"u9","age":42,"admin":false}}"#;
        assert_eq!(
            extract_field(body, "application/json", "user.id"),
            Some("u9".to_string())
        );
        assert_eq!(
            extract_field(body, "application/json", "user.age"),
            Some("42".to_string())
        );
        assert_eq!(
            extract_field(body, "application/json", "user.admin"),
            Some("false".to_string())
        );
        assert_eq!(
            extract_field(body, "application/json", "user"),
            Some(r#"{"id":"u9","age":42,"admin":false}"#.to_string())
        );
        assert_eq!(extract_field(body, "application/json", "user.missing"), None);
    }

    #[test]
    fn malformed_json_is_not_found() {
        assert_eq!(extract_field(b"{not json", "application/json", "a"), None);
        assert_eq!(extract_field(b"", "application/json", "a"), None);
    }

    #[test]
    fn form_key_lookup() {
        let body = b"api_key=k-123&other=x";
        assert_eq!(
            extract_field(body, "application/x-www-form-urlencoded", "api_key"),
            Some("k-123".to_string())
        );
        assert_eq!(
            extract_field(body, "application/x-www-form-urlencoded", "missing"),
            None
        );
    }

    #[test]
    fn xml_first_node_text() {
        let body = b"<order><customer><id>c-7</id></customer><id>other</id></order>";
        assert_eq!(
            extract_field(body, "application/xml", "/order/customer/id"),
            Some("c-7".to_string())
        );
        assert_eq!(
            extract_field(body, "application/xml", "id"),
            Some("c-7".to_string())
        );
        assert_eq!(extract_field(body, "application/xml", "/order/nope"), None);
    }

    #[test]
    fn multipart_named_text_part() {
        let body = b"--XBOUND\r\n\
            Content-Disposition: form-data; name=\"user_id\"\r\n\
            \r\n\
            u42\r\n\
            --XBOUND\r\n\
            Content-Disposition: form-data; name=\"upload\"; filename=\"a.bin\"\r\n\
            Content-Type: application/octet-stream\r\n\
            \r\n\
            BINARY\r\n\
            --XBOUND--\r\n";

        let ct = "multipart/form-data; boundary=XBOUND";
        assert_eq!(extract_field(body, ct, "user_id"), Some("u42".to_string()));
        // File parts are skipped even when named.
        assert_eq!(extract_field(body, ct, "upload"), None);
    }

    #[test]
    fn unrecognized_content_type_yields_nothing() {
        assert_eq!(extract_field(b"data", "text/plain", "field"), None);
    }
}
