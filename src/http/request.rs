//! Request ID assignment.
//!
//! # Responsibilities
//! - Give every request an `x-request-id` (UUID v4) unless it has one
//! - Echo the id on the response so clients can correlate log lines
//!
//! # Design Decisions
//! - Request ID added as the outermost layer, before tracing spans open

use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Layer that sets `x-request-id` on requests missing one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

/// Layer that copies the request's `x-request-id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}
