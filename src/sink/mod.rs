//! The sink: recipient policy, envelope lifecycle and message storage

pub mod adapter;
pub mod envelope;
pub mod error;
pub mod policy;
pub mod storage;

pub use adapter::SinkServer;
pub use envelope::{EnvelopeState, SinkEnvelope};
pub use error::SinkError;
