//! # mailsink
//!
//! A minimal SMTP sink for test and staging environments. It accepts mail
//! for one hostname and stores each message, untouched, in a directory per
//! recipient. Nothing is ever relayed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mailsink::{SinkConfig, SinkServer, SmtpServer};
//!
//! let config = SinkConfig::new("accepted.org")
//!     .unwrap()
//!     .with_dir("/var/spool/mailsink");
//! let hostname = config.hostname.clone();
//! let server = SmtpServer::new(&hostname, SinkServer::new(config));
//!
//! server.start("127.0.0.1:2525").unwrap();
//! ```
//!
//! ## Delivery policy
//!
//! - Recipients are collected as given, duplicates included.
//! - At `DATA`, the first recipient whose hostname equals the accepted
//!   hostname becomes the delivery target.
//! - Without such a recipient the client gets
//!   `554 5.5.1 Error: no valid recipients` and nothing is stored.
//!
//! ## Storage layout
//!
//! ```text
//! <dir>/<recipient>/<RFC 3339 UTC timestamp>_<sender>.eml
//! ```
//!
//! Files are written to a temporary name and moved into place, so a
//! half-written message is never visible. When a name is already taken
//! (same sender, same recipient, same second) a counter is added:
//! `…_<sender>.1.eml`. A failed write fails only that transaction and the
//! client is told to retry later (`451`). Bounces sent with the null
//! reverse-path `MAIL FROM:<>` are stored with an empty sender part
//! (`<timestamp>_.eml`).
//!
//! ## Supported SMTP commands
//!
//! `HELO`, `EHLO`, `MAIL FROM`, `RCPT TO`, `DATA`, `RSET`, `NOOP`, `QUIT`.
//!
//! ## Notes
//!
//! - SMTP authentication is not supported.
//! - SSL/TLS connection is not supported.
//! - Mail relay is not supported.

pub mod config;
pub mod logging;
pub mod sink;
pub mod smtp;

pub use config::{ConfigError, SinkConfig};
pub use sink::{EnvelopeState, SinkEnvelope, SinkError, SinkServer};
pub use smtp::{
    Connection, Envelope, MailAddress, MailHandler, SmtpError, SmtpLimits, SmtpResponse,
    SmtpServer, SmtpSession, SmtpState,
};
