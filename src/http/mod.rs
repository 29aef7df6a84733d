//! HTTP transport for the service endpoint
//!
//! A single path, `/{serviceName}`, serves the protocol document on GET and
//! dispatches envelopes on POST.

pub mod handlers;
