//! Hosting Back Office Common Types
//!
//! Typed records persisted in the document store and the result envelope
//! returned by the hosting control plane.

pub mod envelope;
pub mod records;

pub use envelope::{parse_metric_mb, AccountEntry, AccountListing, Envelope, EnvelopeMetadata};
pub use records::{
    Client, ClientStatus, Record, RecordError, Role, Service, ServiceStatus, User,
    SCHEMA_FIELD, SCHEMA_VERSION,
};
