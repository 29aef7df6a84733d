//! Operation descriptors and the registry that validates them
//!
//! Registration resolves every In/Out field through the type mapper, stages
//! the resulting document fragments, and only commits them together with the
//! dispatch entry once every check has passed.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::dispatch::{CallContext, Invoke, OperationTable, TypedInvoker};
use crate::envelope::{Fault, PayloadElement};
use crate::errors::RegistrationError;
use crate::wsdl::ProtocolDocument;
use crate::xsd::{resolve_field, FieldDescriptor, FieldKind, FieldSchema, Schema};

pub const INPUT_FIELD: &str = "In";
pub const OUTPUT_FIELD: &str = "Out";

/// A named unit of work with a fixed input and output structure.
///
/// ```ignore
/// struct Echo;
///
/// impl Operation for Echo {
///     const NAME: &'static str = "Echo";
///     type In = EchoIn;
///     type Out = EchoOut;
///
///     fn action(&self, input: EchoIn) -> Result<EchoOut, Fault> {
///         Ok(EchoOut { text: input.text })
///     }
/// }
/// ```
pub trait Operation: Send + Sync + 'static {
    const NAME: &'static str;

    type In: Schema + DeserializeOwned;
    type Out: Schema + Serialize;

    fn action(&self, input: Self::In) -> Result<Self::Out, Fault>;
}

/// Declared shape of an operation plus the closure that serves it.
#[derive(Clone)]
pub struct ServiceDescriptor {
    name: String,
    shape: FieldKind,
    invoker: Arc<dyn Invoke>,
}

impl ServiceDescriptor {
    /// `shape` is the structure of the operation itself; it must carry `In`
    /// and `Out` fields that are structures in turn.
    pub fn new(name: impl Into<String>, shape: FieldKind, invoker: Arc<dyn Invoke>) -> Self {
        Self {
            name: name.into(),
            shape,
            invoker,
        }
    }

    pub fn from_operation<O: Operation>(operation: O) -> Self {
        let shape = FieldKind::Struct(vec![
            FieldSchema::of::<O::In>(INPUT_FIELD),
            FieldSchema::of::<O::Out>(OUTPUT_FIELD),
        ]);
        Self::new(O::NAME, shape, Arc::new(TypedInvoker::new(operation)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &FieldKind {
        &self.shape
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// A committed operation: its resolved field tables and its invoker.
#[derive(Clone)]
pub struct RegisteredOperation {
    pub name: String,
    pub input: Vec<FieldDescriptor>,
    pub output: Vec<FieldDescriptor>,
    invoker: Arc<dyn Invoke>,
}

impl RegisteredOperation {
    pub fn invoke(
        &self,
        element: &PayloadElement<'_>,
        response_element: &str,
        namespace: &str,
    ) -> Result<String, Fault> {
        self.invoker.invoke(
            element,
            &CallContext {
                input: &self.input,
                output: &self.output,
                response_element,
                namespace,
            },
        )
    }
}

impl std::fmt::Debug for RegisteredOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredOperation")
            .field("name", &self.name)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

pub struct Registry {
    document: ProtocolDocument,
    operations: HashMap<String, Arc<RegisteredOperation>>,
}

impl Registry {
    pub fn new(document: ProtocolDocument) -> Self {
        Self {
            document,
            operations: HashMap::new(),
        }
    }

    pub fn document(&self) -> &ProtocolDocument {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut ProtocolDocument {
        &mut self.document
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn register(&mut self, descriptor: ServiceDescriptor) -> Result<(), RegistrationError> {
        let name = descriptor.name.clone();

        let Some(fields) = descriptor.shape.fields() else {
            return Err(RegistrationError::NotAStruct { operation: name });
        };
        if !is_valid_operation_name(&name) {
            return Err(RegistrationError::InvalidOperationName { operation: name });
        }
        if self.operations.contains_key(&name) {
            return Err(RegistrationError::DuplicateOperation { operation: name });
        }

        let input = find_part(fields, INPUT_FIELD)
            .ok_or_else(|| RegistrationError::MissingInput {
                operation: name.clone(),
            })?;
        let output = find_part(fields, OUTPUT_FIELD)
            .ok_or_else(|| RegistrationError::MissingOutput {
                operation: name.clone(),
            })?;

        let input = resolve_message(&name, INPUT_FIELD, input)?;
        let output = resolve_message(&name, OUTPUT_FIELD, output)?;

        let fragment = self.document.stage_operation(&name, &input, &output);

        // Nothing below can fail: the document and the table change together.
        self.document.commit(fragment);
        debug!(
            operation = %name,
            input_parts = input.len(),
            output_parts = output.len(),
            "operation registered"
        );
        self.operations.insert(
            name.clone(),
            Arc::new(RegisteredOperation {
                name,
                input,
                output,
                invoker: descriptor.invoker,
            }),
        );

        Ok(())
    }

    /// Registers in order, stopping at the first failure. Earlier successful
    /// registrations are kept.
    pub fn register_many<I>(&mut self, descriptors: I) -> Result<(), RegistrationError>
    where
        I: IntoIterator<Item = ServiceDescriptor>,
    {
        for descriptor in descriptors {
            self.register(descriptor)?;
        }
        Ok(())
    }

    /// Snapshot of the dispatch table. Later registrations do not affect it.
    pub fn operation_table(&self) -> OperationTable {
        self.operations
            .iter()
            .map(|(name, operation)| (name.clone(), Arc::clone(operation)))
            .collect()
    }
}

fn find_part<'a>(fields: &'a [FieldSchema], name: &str) -> Option<&'a FieldSchema> {
    fields.iter().find(|field| field.name == name)
}

fn resolve_message(
    operation: &str,
    part: &'static str,
    field: &FieldSchema,
) -> Result<Vec<FieldDescriptor>, RegistrationError> {
    let fields = field
        .kind
        .fields()
        .ok_or_else(|| RegistrationError::MessageNotAStruct {
            operation: operation.to_string(),
            part,
        })?;
    let resolved: Vec<FieldDescriptor> = fields.iter().map(resolve_field).collect();

    // Both the wire name and the declared name must pick out one field.
    for (index, field) in resolved.iter().enumerate() {
        let clash = resolved[..index]
            .iter()
            .any(|earlier| earlier.name == field.name || earlier.declared == field.declared);
        if clash {
            return Err(RegistrationError::DuplicateField {
                operation: operation.to_string(),
                part,
                field: field.name.clone(),
            });
        }
    }

    Ok(resolved)
}

fn is_valid_operation_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
