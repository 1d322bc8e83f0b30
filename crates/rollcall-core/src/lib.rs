//! rollcall-core — Scan-event pipeline building blocks.
//!
//! Turns decoded badge payloads into classified attendance events:
//! identity extraction, per-session duplicate suppression, QR region
//! decoding, and an isolation-forest model over historical scans.

pub mod anomaly;
pub mod decoder;
pub mod dedup;
pub mod identity;
pub mod report;
pub mod types;

pub use decoder::{CodeDecoder, CodeRegion, QrDecoder};
pub use dedup::SessionDeduplicator;
pub use identity::{extract_identity, IdentityClaim};
pub use types::{EnrollmentRecord, ScanEvent, ScanLogger, ScanStatus, Verifier};
