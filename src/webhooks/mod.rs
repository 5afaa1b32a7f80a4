//! Webhook handling for GitHub events.
//!
//! This module provides:
//! - Signature verification for webhook payloads (HMAC-SHA256)
//! - Typed parsing of push events

pub mod events;
pub mod parser;
pub mod signature;

pub use events::{GitHubEvent, PushEvent};
pub use parser::{ParseError, parse_webhook};
pub use signature::{
    SignatureCheck, check_signature, compute_signature, format_signature_header,
    parse_signature_header, verify_signature,
};
