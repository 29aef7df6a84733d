//! Request dispatch
//!
//! Every registered operation becomes an [`Invoke`] entry bundling its typed
//! decode, action and encode steps. The table is built during registration
//! and shared read-only by all requests afterwards. The field tables resolved
//! at registration drive both directions of the wire mapping.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::envelope::{self, Fault, PayloadElement};
use crate::registry::{Operation, RegisteredOperation};
use crate::wsdl::RESPONSE_SUFFIX;
use crate::xsd::FieldDescriptor;

pub type OperationTable = HashMap<String, Arc<RegisteredOperation>>;

/// Everything an invoker needs besides the request element.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub input: &'a [FieldDescriptor],
    pub output: &'a [FieldDescriptor],
    pub response_element: &'a str,
    pub namespace: &'a str,
}

pub trait Invoke: Send + Sync {
    /// Decodes `element`, runs the operation and encodes its output as
    /// `call.response_element`. Returns the response element or the fault to
    /// send back.
    fn invoke(
        &self,
        element: &PayloadElement<'_>,
        call: &CallContext<'_>,
    ) -> Result<String, Fault>;
}

/// Dispatch entry for a statically typed [`Operation`].
pub struct TypedInvoker<O> {
    operation: O,
}

impl<O: Operation> TypedInvoker<O> {
    pub fn new(operation: O) -> Self {
        Self { operation }
    }
}

impl<O: Operation> Invoke for TypedInvoker<O> {
    fn invoke(
        &self,
        element: &PayloadElement<'_>,
        call: &CallContext<'_>,
    ) -> Result<String, Fault> {
        let input: O::In = envelope::decode_payload(element, call.input)
            .map_err(|err| Fault::client("invalid parameters", err))?;

        // Handler faults go back verbatim.
        let output = self.operation.action(input)?;

        envelope::encode_payload(call.response_element, call.namespace, &output, call.output)
            .map_err(|err| Fault::server("response encoding failed", err))
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    namespace: Arc<str>,
    operations: Arc<OperationTable>,
}

impl Dispatcher {
    pub fn new(namespace: impl Into<Arc<str>>, operations: OperationTable) -> Self {
        Self {
            namespace: namespace.into(),
            operations: Arc::new(operations),
        }
    }

    /// Runs one request to completion and returns the envelope to send.
    pub fn dispatch(&self, body: &[u8]) -> Vec<u8> {
        match self.respond(body) {
            Ok(response) => envelope::encode(response.as_bytes()),
            Err(fault) => {
                warn!(
                    code = %fault.code,
                    message = %fault.message,
                    detail = %fault.detail,
                    "request answered with fault"
                );
                envelope::encode_fault(&fault)
            }
        }
    }

    fn respond(&self, body: &[u8]) -> Result<String, Fault> {
        let payload = envelope::decode(body)
            .map_err(|err| Fault::server("failed to read request body", err.to_string()))?;

        let element =
            envelope::peek_first_element(payload).ok_or_else(|| Fault::server("invalid data", ""))?;

        let Some(operation) = self.operations.get(&element.name) else {
            return Err(Fault::server(
                format!("unknown operation: {}", element.name),
                "",
            ));
        };

        debug!(operation = %element.name, "dispatching operation");
        let response_element = format!("{}{RESPONSE_SUFFIX}", element.name);
        operation.invoke(&element, &response_element, &self.namespace)
    }
}
