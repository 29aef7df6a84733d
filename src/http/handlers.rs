//! Axum handlers for the service endpoint
//!
//! Faults travel in the response body, so every POST answers with 200 and
//! `text/xml` whether the operation succeeded or not.

use axum::{
    body::{Body, Bytes},
    extract::{RawQuery, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
};
use crate::envelope::{self, Fault};
use crate::ServiceState;

pub const GREETING: &str = "welcome";
pub const DOCUMENT_QUERY: &str = "wsdl";

pub async fn service_endpoint(
    State(state): State<ServiceState>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Body,
) -> Response {
    if method != Method::POST {
        return describe(&state, query.as_deref());
    }

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return fault_response(&Fault::server(
                "failed to read request body",
                err.to_string(),
            ))
        }
    };

    let dispatcher = state.dispatcher.clone();
    let task = state
        .limiter
        .run_blocking(move || dispatcher.dispatch(&body));

    match tokio::time::timeout(state.request_timeout, task).await {
        Ok(Ok(envelope)) => xml_response(Bytes::from(envelope)),
        Ok(Err(fault)) => fault_response(&fault),
        Err(_) => fault_response(&Fault::server(
            "request timed out",
            format!("no response within {:?}", state.request_timeout),
        )),
    }
}

fn describe(state: &ServiceState, query: Option<&str>) -> Response {
    match query {
        Some(query) if query.eq_ignore_ascii_case(DOCUMENT_QUERY) => {
            xml_response(state.document.load())
        }
        _ => GREETING.into_response(),
    }
}

pub fn fault_response(fault: &Fault) -> Response {
    xml_response(Bytes::from(envelope::encode_fault(fault)))
}

fn xml_response(body: Bytes) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/xml")], body).into_response()
}
