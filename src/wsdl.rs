//! Protocol description document model
//!
//! The definitions tree mirrors the WSDL 1.1 wire form and is serialized with
//! `quick-xml`'s serde support. Operations are staged as fragments and
//! committed in one step so a rejected registration leaves the tree untouched.

use axum::body::Bytes;
use serde::Serialize;

use crate::errors::ServerError;
use crate::xsd::FieldDescriptor;

pub const WSDL_NS: &str = "http://schemas.xmlsoap.org/wsdl/";
pub const WSDL_SOAP_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap/";
pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_ENCODING_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";
pub const SOAP_HTTP_TRANSPORT: &str = "http://schemas.xmlsoap.org/soap/http";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

pub const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

pub const RPC_STYLE: &str = "rpc";
pub const ENCODED_USE: &str = "encoded";

/// Suffix of response messages and response elements.
///
/// Deployed clients match on this exact spelling, so it is kept as is.
pub const RESPONSE_SUFFIX: &str = "Respone";
pub const REQUEST_SUFFIX: &str = "Request";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename = "definitions")]
pub struct Definitions {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "@xmlns:SOAP-ENV")]
    pub soap_env: &'static str,
    #[serde(rename = "@targetNamespace")]
    pub target_namespace: String,
    #[serde(rename = "@xmlns:tns")]
    pub tns: String,
    #[serde(rename = "@xmlns:soap")]
    pub soap: &'static str,
    #[serde(rename = "@xmlns:xsd")]
    pub xsd: &'static str,
    #[serde(rename = "@xmlns:xsi")]
    pub xsi: &'static str,
    #[serde(rename = "@xmlns:wsdl")]
    pub wsdl: &'static str,
    pub types: Types,
    #[serde(rename = "message")]
    pub messages: Vec<Message>,
    #[serde(rename = "portType")]
    pub port_type: PortType,
    pub binding: Binding,
    pub service: Service,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Types {
    #[serde(rename = "xsd:schema")]
    pub schemas: Vec<SchemaImports>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaImports {
    #[serde(rename = "@targetNamespace")]
    pub target_namespace: String,
    #[serde(rename = "xsd:import")]
    pub imports: Vec<Import>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Import {
    #[serde(rename = "@namespace")]
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "part")]
    pub parts: Vec<Part>,
}

impl Message {
    pub fn from_fields(name: String, fields: &[FieldDescriptor]) -> Self {
        Self {
            name,
            parts: fields
                .iter()
                .map(|field| Part {
                    name: field.name.clone(),
                    type_token: field.type_token(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Part {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type")]
    pub type_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortType {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "operation")]
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    #[serde(rename = "@name")]
    pub name: String,
    pub input: MessageRef,
    pub output: MessageRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRef {
    #[serde(rename = "@message")]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Binding {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type")]
    pub port_type: String,
    #[serde(rename = "soap:binding")]
    pub soap_binding: SoapBinding,
    #[serde(rename = "operation")]
    pub operations: Vec<BindingOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoapBinding {
    #[serde(rename = "@style")]
    pub style: &'static str,
    #[serde(rename = "@transport")]
    pub transport: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingOperation {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "soap:operation")]
    pub soap_operation: SoapOperation,
    pub input: BodyUse,
    pub output: BodyUse,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoapOperation {
    #[serde(rename = "@soapAction")]
    pub soap_action: String,
    #[serde(rename = "@style")]
    pub style: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodyUse {
    #[serde(rename = "soap:body")]
    pub body: SoapBody,
}

impl BodyUse {
    fn encoded(namespace: &str) -> Self {
        Self {
            body: SoapBody {
                usage: ENCODED_USE,
                namespace: namespace.to_string(),
                encoding_style: SOAP_ENCODING_NS,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoapBody {
    #[serde(rename = "@use")]
    pub usage: &'static str,
    #[serde(rename = "@namespace")]
    pub namespace: String,
    #[serde(rename = "@encodingStyle")]
    pub encoding_style: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    #[serde(rename = "@name")]
    pub name: String,
    pub port: ServicePort,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServicePort {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@binding")]
    pub binding: String,
    #[serde(rename = "soap:address")]
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Address {
    #[serde(rename = "@location")]
    pub location: String,
}

/// Everything one operation contributes to the document.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationFragment {
    pub input: Message,
    pub output: Message,
    pub operation: Operation,
    pub binding: BindingOperation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolDocument {
    definitions: Definitions,
}

impl ProtocolDocument {
    pub fn new(service_name: &str, target_namespace: &str) -> Self {
        let port_type = format!("{service_name}PortType");
        let binding = format!("{service_name}Binding");

        let definitions = Definitions {
            xmlns: WSDL_NS,
            soap_env: SOAP_ENV_NS,
            target_namespace: target_namespace.to_string(),
            tns: target_namespace.to_string(),
            soap: WSDL_SOAP_NS,
            xsd: XSD_NS,
            xsi: XSI_NS,
            wsdl: WSDL_NS,
            types: Types {
                schemas: vec![SchemaImports {
                    target_namespace: target_namespace.to_string(),
                    imports: vec![
                        Import {
                            namespace: SOAP_ENCODING_NS.to_string(),
                        },
                        Import {
                            namespace: WSDL_NS.to_string(),
                        },
                    ],
                }],
            },
            messages: Vec::new(),
            port_type: PortType {
                name: port_type.clone(),
                operations: Vec::new(),
            },
            binding: Binding {
                name: binding.clone(),
                port_type: format!("tns:{port_type}"),
                soap_binding: SoapBinding {
                    style: RPC_STYLE,
                    transport: SOAP_HTTP_TRANSPORT,
                },
                operations: Vec::new(),
            },
            service: Service {
                name: service_name.to_string(),
                port: ServicePort {
                    name: format!("{service_name}Port"),
                    binding: format!("tns:{binding}"),
                    address: Address {
                        location: String::new(),
                    },
                },
            },
        };

        Self { definitions }
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    pub fn target_namespace(&self) -> &str {
        &self.definitions.target_namespace
    }

    pub fn messages(&self) -> &[Message] {
        &self.definitions.messages
    }

    pub fn operations(&self) -> &[Operation] {
        &self.definitions.port_type.operations
    }

    pub fn binding_operations(&self) -> &[BindingOperation] {
        &self.definitions.binding.operations
    }

    pub fn location(&self) -> &str {
        &self.definitions.service.port.address.location
    }

    /// Builds the fragments for one operation without touching the document.
    pub fn stage_operation(
        &self,
        name: &str,
        input: &[FieldDescriptor],
        output: &[FieldDescriptor],
    ) -> OperationFragment {
        let input_name = format!("{name}{REQUEST_SUFFIX}");
        let output_name = format!("{name}{RESPONSE_SUFFIX}");
        let namespace = self.target_namespace();

        OperationFragment {
            operation: Operation {
                name: name.to_string(),
                input: MessageRef {
                    message: format!("tns:{input_name}"),
                },
                output: MessageRef {
                    message: format!("tns:{output_name}"),
                },
            },
            binding: BindingOperation {
                name: name.to_string(),
                soap_operation: SoapOperation {
                    soap_action: format!("{namespace}/{name}"),
                    style: RPC_STYLE,
                },
                input: BodyUse::encoded(namespace),
                output: BodyUse::encoded(namespace),
            },
            input: Message::from_fields(input_name, input),
            output: Message::from_fields(output_name, output),
        }
    }

    pub fn commit(&mut self, fragment: OperationFragment) {
        let definitions = &mut self.definitions;
        definitions.messages.push(fragment.input);
        definitions.messages.push(fragment.output);
        definitions.port_type.operations.push(fragment.operation);
        definitions.binding.operations.push(fragment.binding);
    }

    /// Installs the service address and serializes the whole document.
    pub fn bind(&mut self, location: String) -> Result<Bytes, ServerError> {
        self.definitions.service.port.address.location = location;

        let body = quick_xml::se::to_string(&self.definitions)
            .map_err(|err| ServerError::Document(err.to_string()))?;

        let mut buffer = String::with_capacity(XML_HEADER.len() + body.len());
        buffer.push_str(XML_HEADER);
        buffer.push_str(&body);
        Ok(Bytes::from(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xsd::{resolve_field, FieldSchema, Schema};

    fn fields(schemas: &[FieldSchema]) -> Vec<FieldDescriptor> {
        schemas.iter().map(resolve_field).collect()
    }

    fn document() -> ProtocolDocument {
        ProtocolDocument::new("people", "http://10.0.0.5/people")
    }

    #[test]
    fn staging_does_not_modify_document() {
        let doc = document();
        let input = fields(&[FieldSchema::of::<i64>("Id")]);
        let fragment = doc.stage_operation("User", &input, &[]);

        assert_eq!(fragment.input.name, "UserRequest");
        assert_eq!(fragment.output.name, "UserRespone");
        assert!(doc.messages().is_empty());
        assert!(doc.operations().is_empty());
    }

    #[test]
    fn committed_fragment_reaches_every_section() {
        let mut doc = document();
        let input = fields(&[FieldSchema::of::<i64>("Id")]);
        let output = fields(&[
            FieldSchema::of::<String>("Name"),
            FieldSchema::of::<Vec<String>>("Tags"),
        ]);
        let fragment = doc.stage_operation("User", &input, &output);
        doc.commit(fragment);

        assert_eq!(doc.messages().len(), 2);
        assert_eq!(doc.messages()[1].parts[1].type_token, "tns:Tagslist");
        assert_eq!(doc.operations()[0].input.message, "tns:UserRequest");
        assert_eq!(doc.operations()[0].output.message, "tns:UserRespone");
        assert_eq!(
            doc.binding_operations()[0].soap_operation.soap_action,
            "http://10.0.0.5/people/User"
        );
        assert_eq!(doc.binding_operations()[0].soap_operation.style, "rpc");
        assert_eq!(doc.binding_operations()[0].input.body.usage, "encoded");
    }

    #[test]
    fn address_is_installed_at_bind() {
        let mut doc = document();
        assert_eq!(doc.location(), "");

        let bytes = doc
            .bind("http://10.0.0.5:8080/people".to_string())
            .expect("document serializes");
        assert_eq!(doc.location(), "http://10.0.0.5:8080/people");

        let text = std::str::from_utf8(&bytes).expect("utf8 document");
        assert!(text.starts_with(XML_HEADER));
        assert!(text.contains("<soap:address location=\"http://10.0.0.5:8080/people\"/>"));
    }

    #[test]
    fn serialized_document_lists_messages_and_operations() {
        let mut doc = document();
        let input = fields(&[FieldSchema::of::<i64>("Id")]);
        let output = fields(&[FieldSchema::of::<bool>("Active")]);
        let fragment = doc.stage_operation("User", &input, &output);
        doc.commit(fragment);

        let bytes = doc
            .bind("http://10.0.0.5:8080/people".to_string())
            .expect("document serializes");
        let text = std::str::from_utf8(&bytes).expect("utf8 document");

        assert!(text.contains("<definitions xmlns=\"http://schemas.xmlsoap.org/wsdl/\""));
        assert!(text.contains("<message name=\"UserRequest\"><part name=\"Id\" type=\"xsd:long\"/></message>"));
        assert!(text.contains("<part name=\"Active\" type=\"xsd:boolean\"/>"));
        assert!(text.contains("<portType name=\"peoplePortType\">"));
        assert!(text.contains("<soap:operation soapAction=\"http://10.0.0.5/people/User\" style=\"rpc\"/>"));
        assert!(text.contains("<xsd:import namespace=\"http://schemas.xmlsoap.org/soap/encoding/\"/>"));
        assert!(!text.contains("complexType"));
    }

    #[test]
    fn schema_trait_feeds_message_parts() {
        let input = fields(&[FieldSchema::new("Page", i32::kind())]);
        let message = Message::from_fields("ListRequest".to_string(), &input);
        assert_eq!(message.parts.len(), 1);
        assert_eq!(message.parts[0].type_token, "xsd:int");
    }
}
