//! uid-message wire format
//!
//! Every document has the same envelope:
//!
//! ```xml
//! <uid-message>
//!   <version>1.0</version>
//!   <type>update</type>
//!   <payload><login>...</login></payload>
//! </uid-message>
//! ```
//!
//! Binding entries carry `name`, `ip` and `timeout` attributes. Tag entries
//! carry a single `user` or `ip` attribute and put the label in element text
//! (`<tag><member>LABEL</member></tag>`), never in an attribute.

use crate::error::{Error, Result};
use crate::types::{BindAction, Entry, TagAction, TagEntry, UidMessage};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Literal version marker carried by every document
pub const PROTOCOL_VERSION: &str = "1.0";

/// Content type of every request body
pub const CONTENT_TYPE: &str = "application/xml";

/// Message-type marker: `update` for data operations, `op` for the probe
pub fn message_type(message: &UidMessage) -> &'static str {
    match message {
        UidMessage::VersionProbe => "op",
        _ => "update",
    }
}

/// Encode a message into one uid-message document
///
/// Pure and infallible: performs no I/O and accepts any entries.
pub fn encode(message: &UidMessage) -> String {
    let mut doc = String::with_capacity(128 + message.len() * 64);
    doc.push_str("<uid-message><version>");
    doc.push_str(PROTOCOL_VERSION);
    doc.push_str("</version><type>");
    doc.push_str(message_type(message));
    doc.push_str("</type><payload>");

    let action = message.action_name();
    doc.push('<');
    doc.push_str(action);
    doc.push('>');

    match message {
        UidMessage::Bindings { entries, .. } => {
            for entry in entries {
                doc.push_str("<entry name=\"");
                doc.push_str(&escape(entry.name.as_str()));
                doc.push_str("\" ip=\"");
                doc.push_str(&entry.ip.to_string());
                doc.push_str("\" timeout=\"");
                doc.push_str(&entry.timeout.to_string());
                doc.push_str("\"/>");
            }
        }
        UidMessage::Tags { action, entries } => {
            let attribute = action.subject_attribute();
            for entry in entries {
                doc.push_str("<entry ");
                doc.push_str(attribute);
                doc.push_str("=\"");
                doc.push_str(&escape(entry.subject.as_str()));
                doc.push_str("\"><tag><member>");
                doc.push_str(&escape(entry.tag.as_str()));
                doc.push_str("</member></tag></entry>");
            }
        }
        UidMessage::VersionProbe => doc.push_str("<version/>"),
    }

    doc.push_str("</");
    doc.push_str(action);
    doc.push_str("></payload></uid-message>");
    doc
}

#[derive(Clone, Copy)]
enum PayloadKind {
    Bindings(BindAction),
    Tags(TagAction),
    Probe,
}

#[derive(Default)]
struct Decoder {
    path: Vec<String>,
    version: Option<String>,
    message_type: Option<String>,
    kind: Option<PayloadKind>,
    bindings: Vec<Entry>,
    tags: Vec<TagEntry>,
    subject: Option<String>,
    label: String,
}

impl Decoder {
    fn open(&mut self, element: &BytesStart<'_>) -> Result<String> {
        let name = element_name(element)?;
        let depth = self.path.len();
        let parent = self.path.last().map(String::as_str);

        match (depth, parent) {
            (0, _) if name != "uid-message" => {
                return Err(malformed(format!("unexpected root <{name}>")));
            }
            (2, Some("payload")) => {
                if self.kind.is_some() {
                    return Err(malformed("payload carries more than one action"));
                }
                self.kind = Some(payload_kind(&name)?);
            }
            (3, _) if name == "entry" => match self.kind {
                Some(PayloadKind::Bindings(_)) => {
                    let ip_text = required_attribute(element, "ip")?;
                    let timeout_text = required_attribute(element, "timeout")?;
                    let ip = ip_text
                        .parse()
                        .map_err(|_| malformed(format!("invalid ip attribute {ip_text:?}")))?;
                    let timeout = timeout_text.parse().map_err(|_| {
                        malformed(format!("invalid timeout attribute {timeout_text:?}"))
                    })?;
                    self.bindings.push(Entry {
                        name: required_attribute(element, "name")?,
                        ip,
                        timeout,
                    });
                }
                Some(PayloadKind::Tags(action)) => {
                    self.subject = Some(required_attribute(element, action.subject_attribute())?);
                    self.label.clear();
                }
                _ => return Err(malformed("entry outside a data action")),
            },
            _ => {}
        }
        Ok(name)
    }

    fn close(&mut self, name: &str) {
        if name == "entry" {
            if let Some(subject) = self.subject.take() {
                self.tags
                    .push(TagEntry::new(subject, std::mem::take(&mut self.label)));
            }
        }
    }

    fn text(&mut self, text: String) {
        match (self.path.len(), self.path.last().map(String::as_str)) {
            (2, Some("version")) => self.version = Some(text),
            (2, Some("type")) => self.message_type = Some(text),
            (_, Some("member")) if self.subject.is_some() => self.label.push_str(&text),
            _ => {}
        }
    }

    fn finish(self) -> Result<UidMessage> {
        match self.version.as_deref() {
            Some(PROTOCOL_VERSION) => {}
            other => return Err(malformed(format!("unsupported version {other:?}"))),
        }

        let message = match self.kind {
            Some(PayloadKind::Bindings(action)) => UidMessage::Bindings {
                action,
                entries: self.bindings,
            },
            Some(PayloadKind::Tags(action)) => UidMessage::Tags {
                action,
                entries: self.tags,
            },
            Some(PayloadKind::Probe) => UidMessage::VersionProbe,
            None => return Err(malformed("missing payload action")),
        };

        let expected = message_type(&message);
        if self.message_type.as_deref() != Some(expected) {
            return Err(malformed(format!(
                "message type {:?} does not match <{}>",
                self.message_type,
                message.action_name()
            )));
        }
        Ok(message)
    }
}

/// Decode a document produced by [`encode`]
pub fn decode(document: &str) -> Result<UidMessage> {
    let mut reader = Reader::from_str(document);
    reader.trim_text(true);
    let mut decoder = Decoder::default();

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(element) => {
                let name = decoder.open(&element)?;
                decoder.path.push(name);
            }
            Event::Empty(element) => {
                let name = decoder.open(&element)?;
                decoder.close(&name);
            }
            Event::End(_) => {
                if let Some(name) = decoder.path.pop() {
                    decoder.close(&name);
                }
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(malformed)?.into_owned();
                decoder.text(text);
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                decoder.text(text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    decoder.finish()
}

/// Extract the Agent's error text from a response body
///
/// Returns `Some` only when the body is well-formed XML whose root element has
/// `status="error"`. The message is the text of the first `<result>` element,
/// or the raw body when there is none. Unparseable bodies yield `None`.
pub fn agent_error(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut depth = 0usize;
    let mut root_is_error: Option<bool> = None;
    let mut result_depth: Option<usize> = None;
    let mut result_text: Option<String> = None;

    loop {
        match reader.read_event().ok()? {
            Event::Start(element) => {
                if root_is_error.is_none() {
                    root_is_error = Some(has_error_status(&element)?);
                } else if result_text.is_none() && element.name().as_ref() == b"result" {
                    result_depth = Some(depth);
                    result_text = Some(String::new());
                }
                depth += 1;
            }
            Event::Empty(element) => {
                if root_is_error.is_none() {
                    root_is_error = Some(has_error_status(&element)?);
                } else if result_text.is_none() && element.name().as_ref() == b"result" {
                    result_text = Some(String::new());
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if result_depth == Some(depth) {
                    result_depth = None;
                }
            }
            Event::Text(text) => {
                if let (Some(d), Some(buffer)) = (result_depth, result_text.as_mut()) {
                    if d + 1 == depth {
                        buffer.push_str(&text.unescape().ok()?);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    // Unclosed elements: the body was truncated
    if depth != 0 || root_is_error != Some(true) {
        return None;
    }
    match result_text {
        Some(text) if !text.is_empty() => Some(text),
        _ => Some(body.to_string()),
    }
}

fn has_error_status(element: &BytesStart<'_>) -> Option<bool> {
    let status = element.try_get_attribute("status").ok()?;
    Some(match status {
        Some(attr) => attr.unescape_value().ok()? == "error",
        None => false,
    })
}

fn payload_kind(name: &str) -> Result<PayloadKind> {
    if name == "show" {
        return Ok(PayloadKind::Probe);
    }
    if let Some(action) = BindAction::from_element(name) {
        return Ok(PayloadKind::Bindings(action));
    }
    if let Some(action) = TagAction::from_element(name) {
        return Ok(PayloadKind::Tags(action));
    }
    Err(malformed(format!("unknown action <{name}>")))
}

fn element_name(element: &BytesStart<'_>) -> Result<String> {
    std::str::from_utf8(element.name().as_ref())
        .map(str::to_owned)
        .map_err(malformed)
}

fn required_attribute(element: &BytesStart<'_>, key: &str) -> Result<String> {
    match element.try_get_attribute(key).map_err(malformed)? {
        Some(attr) => Ok(attr.unescape_value().map_err(malformed)?.into_owned()),
        None => Err(malformed(format!("entry is missing the {key} attribute"))),
    }
}

fn malformed(reason: impl std::fmt::Display) -> Error {
    Error::Protocol(format!("malformed uid-message: {reason}"))
}
