//! SMTP protocol engine
//!
//! Parses commands, tracks per-connection state and drives a
//! [`MailHandler`] through the envelope callbacks.

pub mod address;
pub mod commands;
pub mod error;
pub mod handler;
pub mod response;
pub mod server;
pub mod session;

pub use address::MailAddress;
pub use error::{SmtpError, SmtpLimits};
pub use handler::{Connection, Envelope, MailHandler};
pub use response::SmtpResponse;
pub use server::SmtpServer;
pub use session::{SmtpSession, SmtpState};
