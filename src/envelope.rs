//! SOAP envelope codec
//!
//! Decoding is two-phase: the envelope is unwrapped generically and the body
//! content is handed back untouched, then the first element is located so the
//! dispatcher can pick a concrete input type before any typed decoding runs.

use std::str;

use quick_xml::{escape::escape, events::Event, Reader};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::wsdl::{SOAP_ENV_NS, XSD_NS, XSI_NS};
use crate::xsd::FieldDescriptor;

/// Root name used when handing rearranged input to the deserializer.
const DECODE_ROOT: &str = "In";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("envelope has no Body")]
    MissingBody,
}

/// Structured fault carried in-band in place of a response element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: String,
    pub message: String,
    pub detail: String,
}

impl Fault {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub fn server(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new("Server", message, detail)
    }

    pub fn client(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new("Client", message, detail)
    }

    pub fn to_xml(&self) -> String {
        format!(
            "<Fault><faultcode>{}</faultcode><faultstring>{}</faultstring><detail>{}</detail></Fault>",
            escape(self.code.as_str()),
            escape(self.message.as_str()),
            escape(self.detail.as_str()),
        )
    }
}

/// The first element found inside a body, with its full source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadElement<'a> {
    pub name: String,
    pub xml: &'a str,
}

/// Unwraps `Envelope` → `Body` and returns the body's inner content as is.
pub fn decode(raw: &[u8]) -> Result<&str, EnvelopeError> {
    let text = str::from_utf8(raw).map_err(|err| EnvelopeError::Malformed(err.to_string()))?;
    let mut reader = Reader::from_str(text);
    let mut inside_envelope = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|err| EnvelopeError::Malformed(err.to_string()))?;

        match event {
            Event::Start(element) if !inside_envelope => {
                if element.local_name().as_ref() != b"Envelope" {
                    return Err(EnvelopeError::Malformed(format!(
                        "unexpected root element {}",
                        String::from_utf8_lossy(element.name().as_ref())
                    )));
                }
                inside_envelope = true;
            }
            Event::Start(element) => {
                let span = reader
                    .read_to_end(element.name())
                    .map_err(|err| EnvelopeError::Malformed(err.to_string()))?;
                if element.local_name().as_ref() == b"Body" {
                    return Ok(&text[span.start as usize..span.end as usize]);
                }
            }
            Event::Empty(element) if inside_envelope && element.local_name().as_ref() == b"Body" => {
                return Ok("");
            }
            Event::Empty(_) if !inside_envelope => return Err(EnvelopeError::MissingBody),
            Event::End(_) | Event::Eof => return Err(EnvelopeError::MissingBody),
            Event::Text(content) if !inside_envelope => {
                if !content.iter().all(u8::is_ascii_whitespace) {
                    return Err(EnvelopeError::Malformed(
                        "text outside of the root element".to_string(),
                    ));
                }
            }
            _ => {}
        }
    }
}

/// Locates the first element of a body payload. Unparsable content yields
/// `None`, matching an empty body.
pub fn peek_first_element(payload: &str) -> Option<PayloadElement<'_>> {
    let mut reader = Reader::from_str(payload);

    loop {
        let offset = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                let name = local_name(element.local_name().as_ref())?;
                let end = match reader.read_to_end(element.name()) {
                    Ok(_) => reader.buffer_position() as usize,
                    Err(_) => payload.len(),
                };
                return Some(PayloadElement {
                    name,
                    xml: &payload[offset..end],
                });
            }
            Ok(Event::Empty(element)) => {
                let name = local_name(element.local_name().as_ref())?;
                let end = reader.buffer_position() as usize;
                return Some(PayloadElement {
                    name,
                    xml: &payload[offset..end],
                });
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

fn local_name(name: &[u8]) -> Option<String> {
    str::from_utf8(name).ok().map(str::to_string)
}

/// A direct child element with its full source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChildElement<'a> {
    name: &'a str,
    qname_len: usize,
    xml: &'a str,
    empty: bool,
}

impl ChildElement<'_> {
    /// Same element under another name. Attributes and content are kept.
    fn renamed(&self, name: &str) -> String {
        let head = &self.xml[1 + self.qname_len..];
        if self.empty {
            return format!("<{name}{head}");
        }
        let close = self.xml.rfind("</").unwrap_or(self.xml.len());
        format!("<{name}{}</{name}>", &self.xml[1 + self.qname_len..close])
    }
}

/// Splits the root element of `xml` into its direct child elements.
fn child_elements(xml: &str) -> Result<Vec<ChildElement<'_>>, String> {
    let mut reader = Reader::from_str(xml);

    loop {
        match reader.read_event().map_err(|err| err.to_string())? {
            Event::Start(_) => break,
            Event::Empty(_) => return Ok(Vec::new()),
            Event::Eof => return Err("no element found".to_string()),
            _ => {}
        }
    }

    let mut children = Vec::new();
    loop {
        let offset = reader.buffer_position() as usize;
        let (qname_len, empty) = match reader.read_event().map_err(|err| err.to_string())? {
            Event::Start(element) => {
                let qname_len = element.name().as_ref().len();
                reader
                    .read_to_end(element.name())
                    .map_err(|err| err.to_string())?;
                (qname_len, false)
            }
            Event::Empty(element) => (element.name().as_ref().len(), true),
            Event::End(_) => return Ok(children),
            Event::Eof => return Err("unexpected end of element".to_string()),
            _ => continue,
        };

        let end = reader.buffer_position() as usize;
        let qname = &xml[offset + 1..offset + 1 + qname_len];
        children.push(ChildElement {
            name: qname.rsplit(':').next().unwrap_or(qname),
            qname_len,
            xml: &xml[offset..end],
            empty,
        });
    }
}

/// Appends the children matching each field, in field order, under the
/// field's name on the other side. A missing required field is an error.
fn arrange(
    children: &[ChildElement<'_>],
    fields: &[FieldDescriptor],
    source: fn(&FieldDescriptor) -> &str,
    target: fn(&FieldDescriptor) -> &str,
    out: &mut String,
) -> Result<(), String> {
    for field in fields {
        let mut found = false;
        for child in children.iter().filter(|child| child.name == source(field)) {
            out.push_str(&child.renamed(target(field)));
            found = true;
        }
        if !found && field.required {
            return Err(format!("missing required field {}", source(field)));
        }
    }
    Ok(())
}

fn wire_name(field: &FieldDescriptor) -> &str {
    &field.name
}

fn declared_name(field: &FieldDescriptor) -> &str {
    &field.declared
}

/// Typed decode of a located element into a concrete input structure.
///
/// Children are matched by their wire name from `fields` and handed to the
/// deserializer under their declared names, in table order. Children no
/// field claims are dropped.
pub fn decode_payload<T: DeserializeOwned>(
    element: &PayloadElement<'_>,
    fields: &[FieldDescriptor],
) -> Result<T, String> {
    let children = child_elements(element.xml)?;

    let mut xml = format!("<{DECODE_ROOT}>");
    arrange(&children, fields, wire_name, declared_name, &mut xml)?;
    xml.push_str(&format!("</{DECODE_ROOT}>"));

    quick_xml::de::from_str(&xml).map_err(|err| err.to_string())
}

/// Marshals an output structure under `root`, carrying `namespace` as its
/// default namespace attribute.
///
/// Fields are written in table order under their wire names. Anything the
/// value serializes that the table does not declare is an error.
pub fn encode_payload<T: Serialize>(
    root: &str,
    namespace: &str,
    value: &T,
    fields: &[FieldDescriptor],
) -> Result<String, String> {
    let body = quick_xml::se::to_string_with_root(root, value).map_err(|err| err.to_string())?;
    let children = child_elements(&body)?;

    if let Some(extra) = children
        .iter()
        .find(|child| !fields.iter().any(|field| field.declared == child.name))
    {
        return Err(format!("field {} is not declared", extra.name));
    }

    let mut xml = format!("<{root} xmlns=\"{}\">", escape(namespace));
    arrange(&children, fields, declared_name, wire_name, &mut xml)?;
    xml.push_str(&format!("</{root}>"));
    Ok(xml)
}

pub fn encode(payload: &[u8]) -> Vec<u8> {
    let head = format!(
        "<soap:Envelope xmlns:soap=\"{SOAP_ENV_NS}\" xmlns:xsi=\"{XSI_NS}\" xmlns:xsd=\"{XSD_NS}\"><soap:Body>"
    );
    let tail = "</soap:Body></soap:Envelope>";

    let mut buffer = Vec::with_capacity(head.len() + payload.len() + tail.len());
    buffer.extend_from_slice(head.as_bytes());
    buffer.extend_from_slice(payload);
    buffer.extend_from_slice(tail.as_bytes());
    buffer
}

pub fn encode_fault(fault: &Fault) -> Vec<u8> {
    encode(fault.to_xml().as_bytes())
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::xsd::{resolve_field, FieldSchema};

    fn fields(schemas: &[FieldSchema]) -> Vec<FieldDescriptor> {
        schemas.iter().map(resolve_field).collect()
    }

    fn user_in_fields() -> Vec<FieldDescriptor> {
        fields(&[FieldSchema::of::<i64>("Id")])
    }

    fn user_out_fields() -> Vec<FieldDescriptor> {
        fields(&[
            FieldSchema::of::<i64>("Id"),
            FieldSchema::of::<String>("Name"),
        ])
    }

    const REQUEST: &str = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Header><Trace>abc</Trace></soap:Header>
  <soap:Body><User xmlns="people"><Id>100</Id></User></soap:Body>
</soap:Envelope>"#;

    #[derive(Debug, Deserialize, PartialEq)]
    struct UserIn {
        #[serde(rename = "Id")]
        id: i64,
    }

    #[derive(Debug, Serialize)]
    struct UserOut {
        #[serde(rename = "Id")]
        id: i64,
        #[serde(rename = "Name")]
        name: String,
    }

    #[test]
    fn decode_returns_body_content_uninterpreted() {
        let body = decode(REQUEST.as_bytes()).expect("envelope decodes");
        assert_eq!(body, r#"<User xmlns="people"><Id>100</Id></User>"#);
    }

    #[test]
    fn decode_rejects_missing_body() {
        let raw = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"></soap:Envelope>"#;
        assert_eq!(decode(raw.as_bytes()), Err(EnvelopeError::MissingBody));
    }

    #[test]
    fn decode_rejects_non_envelope_root() {
        let err = decode(b"<User><Id>1</Id></User>").expect_err("not an envelope");
        assert!(matches!(err, EnvelopeError::Malformed(_)));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode(b"not xml at all").is_err());
        assert!(decode(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn peek_finds_first_element_name() {
        let element = peek_first_element("  <!-- call --><ns:User xmlns:ns=\"people\"><Id>7</Id></ns:User>")
            .expect("element present");
        assert_eq!(element.name, "User");
        assert_eq!(element.xml, "<ns:User xmlns:ns=\"people\"><Id>7</Id></ns:User>");
    }

    #[test]
    fn peek_handles_empty_elements_and_empty_payloads() {
        let element = peek_first_element("<Ping/>").expect("element present");
        assert_eq!(element.name, "Ping");
        assert_eq!(element.xml, "<Ping/>");

        assert_eq!(peek_first_element(""), None);
        assert_eq!(peek_first_element("   just text   "), None);
    }

    #[test]
    fn typed_decode_uses_located_element() {
        let body = decode(REQUEST.as_bytes()).expect("envelope decodes");
        let element = peek_first_element(body).expect("element present");
        let input: UserIn = decode_payload(&element, &user_in_fields()).expect("input decodes");
        assert_eq!(input, UserIn { id: 100 });
    }

    #[test]
    fn typed_decode_maps_wire_names_to_declared_names() {
        let fields = fields(&[FieldSchema::of::<i64>("Id").tagged("userId,required")]);

        let element = peek_first_element("<User><ns:userId>5</ns:userId><Extra/></User>")
            .expect("element present");
        let input: UserIn = decode_payload(&element, &fields).expect("input decodes");
        assert_eq!(input, UserIn { id: 5 });

        let element = peek_first_element("<User><Id>5</Id></User>").expect("element present");
        let err = decode_payload::<UserIn>(&element, &fields).expect_err("declared name is not the wire name");
        assert_eq!(err, "missing required field userId");
    }

    #[test]
    fn typed_decode_reports_mismatched_content() {
        let element = peek_first_element("<User><Id>abc</Id></User>").expect("element present");
        assert!(decode_payload::<UserIn>(&element, &user_in_fields()).is_err());
    }

    #[test]
    fn encode_payload_names_root_and_namespace() {
        let out = UserOut {
            id: 1,
            name: "A & B".to_string(),
        };
        let xml = encode_payload("UserRespone", "people", &out, &user_out_fields())
            .expect("output encodes");
        assert_eq!(
            xml,
            "<UserRespone xmlns=\"people\"><Id>1</Id><Name>A &amp; B</Name></UserRespone>"
        );
    }

    #[test]
    fn encode_payload_follows_table_order_and_wire_names() {
        let out = UserOut {
            id: 9,
            name: "Afocus".to_string(),
        };
        let fields = fields(&[
            FieldSchema::of::<String>("Name").tagged("userName"),
            FieldSchema::of::<i64>("Id").tagged("userId"),
        ]);

        let xml = encode_payload("UserRespone", "people", &out, &fields).expect("output encodes");
        assert_eq!(
            xml,
            "<UserRespone xmlns=\"people\"><userName>Afocus</userName><userId>9</userId></UserRespone>"
        );
    }

    #[test]
    fn encode_payload_keeps_repeated_elements_together() {
        #[derive(Serialize)]
        struct ListOut {
            #[serde(rename = "Items")]
            items: Vec<i32>,
            #[serde(rename = "Total")]
            total: i32,
        }

        let fields = fields(&[
            FieldSchema::of::<i32>("Total"),
            FieldSchema::of::<Vec<i32>>("Items").tagged("item"),
        ]);
        let out = ListOut {
            items: vec![1, 2],
            total: 2,
        };

        let xml = encode_payload("ListRespone", "people", &out, &fields).expect("output encodes");
        assert_eq!(
            xml,
            "<ListRespone xmlns=\"people\"><Total>2</Total><item>1</item><item>2</item></ListRespone>"
        );
    }

    #[test]
    fn encode_payload_rejects_undeclared_and_missing_required_fields() {
        let out = UserOut {
            id: 1,
            name: "A".to_string(),
        };

        let err = encode_payload("UserRespone", "people", &out, &user_in_fields())
            .expect_err("Name is not declared");
        assert_eq!(err, "field Name is not declared");

        let mut fields = user_out_fields();
        fields.push(resolve_field(&FieldSchema::of::<i32>("Sex").tagged(",required")));
        let err = encode_payload("UserRespone", "people", &out, &fields)
            .expect_err("Sex is required");
        assert_eq!(err, "missing required field Sex");
    }

    #[test]
    fn encode_wraps_payload_in_envelope() {
        let envelope = encode(b"<Ping/>");
        let text = String::from_utf8(envelope).expect("utf8");
        assert!(text.starts_with("<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\""));
        assert!(text.contains("xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\""));
        assert!(text.contains("<soap:Body><Ping/></soap:Body>"));

        let body = decode(text.as_bytes()).expect("round trip");
        assert_eq!(body, "<Ping/>");
    }

    #[test]
    fn fault_xml_escapes_fields() {
        let fault = Fault::client("bad <input>", "expected i64");
        assert_eq!(
            fault.to_xml(),
            "<Fault><faultcode>Client</faultcode><faultstring>bad &lt;input&gt;</faultstring><detail>expected i64</detail></Fault>"
        );
    }
}
