use quick_xml::Reader;
use quick_xml::events::Event;

use crate::core::ArcaError;

/// Receives text and element-close events with the path of local element
/// names (namespace prefixes stripped) leading to them.
pub(crate) trait PathHandler {
    fn text(&mut self, path: &[String], text: &str);

    fn end(&mut self, _path: &[String], _name: &str) {}
}

/// Walk an XML document, reporting every text node and element close.
///
/// Malformed markup is reported as `MalformedResponse`.
pub(crate) fn walk<H: PathHandler>(xml: &str, handler: &mut H) -> Result<(), ArcaError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = std::str::from_utf8(e.local_name().as_ref())
                    .unwrap_or("")
                    .to_string();
                path.push(name);
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| ArcaError::MalformedResponse(format!("XML text error: {e}")))?;
                if !text.is_empty() {
                    handler.text(&path, &text);
                }
            }
            Ok(Event::CData(e)) => {
                let raw = e.into_inner();
                let text = String::from_utf8_lossy(&raw);
                let text = text.trim();
                if !text.is_empty() {
                    handler.text(&path, text);
                }
            }
            Ok(Event::End(_)) => {
                let ended = path.pop().unwrap_or_default();
                handler.end(&path, &ended);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ArcaError::MalformedResponse(format!(
                    "XML parse error at {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    Ok(())
}

/// Text of the first element whose local name is `name`.
pub(crate) fn first_text(xml: &str, name: &str) -> Result<Option<String>, ArcaError> {
    struct First<'a> {
        name: &'a str,
        found: Option<String>,
    }

    impl PathHandler for First<'_> {
        fn text(&mut self, path: &[String], text: &str) {
            if self.found.is_none() && path.last().is_some_and(|l| l == self.name) {
                self.found = Some(text.to_string());
            }
        }
    }

    let mut h = First { name, found: None };
    walk(xml, &mut h)?;
    Ok(h.found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_stripped() {
        let xml = r#"<soap:Envelope xmlns:soap="x"><soap:Body><a:Res xmlns:a="y"><a:Code>7</a:Code></a:Res></soap:Body></soap:Envelope>"#;
        assert_eq!(first_text(xml, "Code").unwrap().as_deref(), Some("7"));
    }

    #[test]
    fn escaped_payload_is_unescaped() {
        let xml = "<r><ret>&lt;inner&gt;ok&lt;/inner&gt;</ret></r>";
        assert_eq!(
            first_text(xml, "ret").unwrap().as_deref(),
            Some("<inner>ok</inner>")
        );
    }

    #[test]
    fn mismatched_tags_are_malformed() {
        let err = first_text("<a><b></a>", "b").unwrap_err();
        assert!(matches!(err, ArcaError::MalformedResponse(_)));
    }
}
