//! Callbacks the server drives for every mail transaction
//!
//! A [`MailHandler`] is asked for a fresh [`Envelope`] when a client sends
//! `MAIL FROM`. The server then calls, in order:
//!
//! 1. [`Envelope::add_recipient`] once per `RCPT TO`
//! 2. [`Envelope::begin_data`] on `DATA`
//! 3. [`Envelope::write`] once per body line, dot-unstuffed, CRLF included
//! 4. [`Envelope::close`] after the terminating `.`
//!
//! Any error returned from these methods is reported to the client. An
//! [`SmtpError::Reply`] is sent verbatim.

use std::net::SocketAddr;

use crate::smtp::address::MailAddress;
use crate::smtp::error::SmtpError;

/// What the server knows about the client when a transaction starts
#[derive(Debug, Clone, Default)]
pub struct Connection {
    /// Remote socket address, if known
    pub peer: Option<SocketAddr>,
    /// Domain given in HELO/EHLO
    pub client_domain: Option<String>,
}

/// One in-progress mail transaction
pub trait Envelope: Send {
    fn add_recipient(&mut self, rcpt: MailAddress) -> Result<(), SmtpError>;

    fn begin_data(&mut self) -> Result<(), SmtpError>;

    fn write(&mut self, line: &[u8]) -> Result<(), SmtpError>;

    fn close(&mut self) -> Result<(), SmtpError>;
}

/// Creates an [`Envelope`] for every new transaction
pub trait MailHandler: Send + Sync {
    fn on_new_mail(
        &self,
        conn: &Connection,
        from: MailAddress,
    ) -> Result<Box<dyn Envelope>, SmtpError>;
}
