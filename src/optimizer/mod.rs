//! Round trip with the text-generation service.
//!
//! # Architecture
//!
//! - **Payload**: `build_request_payload()` turns a normalized project into
//!   the outbound JSON
//! - **Prompts**: system/user prompt text and the response schema
//! - **Client**: one HTTP POST per provider
//! - **Response**: `parse_response()` validates the reply or rejects it whole

pub mod client;
pub mod payload;
pub mod prompts;
pub mod response;
pub mod types;

pub use client::request_optimization;
pub use payload::{build_request_payload, normalize_language};
pub use response::parse_response;
pub use types::{
    CurrentSettings, IntentDetails, ObjectSettings, OptimizationResponse, PayloadFlags, Priority, Provider,
    RequestPayload, PAYLOAD_VERSION,
};
