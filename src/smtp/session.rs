//! SMTP session state management

use std::fmt;
use std::net::SocketAddr;

use tracing::debug;

use crate::smtp::address::MailAddress;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::handler::{Connection, Envelope};

/// Represents the current state of an SMTP session
#[derive(Debug, Clone, PartialEq)]
pub enum SmtpState {
    /// Initial state - waiting for HELO
    Initial,
    /// HELO received - ready for MAIL command
    GreetingReceived,
    /// MAIL FROM received - ready for RCPT or DATA
    MailReceived,
    /// At least one RCPT TO received - ready for DATA or more RCPT commands
    RecipientsReceived,
    /// DATA accepted by the envelope - forwarding body lines
    DataMode,
}

/// Manages the state of a single SMTP connection and its current envelope
pub struct SmtpSession {
    /// Current state of the session
    pub state: SmtpState,
    /// Sender of the current transaction
    pub from: Option<MailAddress>,
    /// Number of RCPT TO commands accepted in the current transaction
    pub recipient_count: usize,
    /// Total size of body data forwarded so far
    pub data_size: usize,
    /// Client domain from HELO/EHLO command
    pub client_domain: Option<String>,
    /// Remote address of the client
    pub peer: Option<SocketAddr>,
    envelope: Option<Box<dyn Envelope>>,
    data_error: Option<SmtpError>,
}

impl SmtpSession {
    /// Create a new SMTP session
    pub fn new() -> Self {
        Self::with_peer(None)
    }

    /// Create a new SMTP session for a client at `peer`
    pub fn with_peer(peer: Option<SocketAddr>) -> Self {
        Self {
            state: SmtpState::Initial,
            from: None,
            recipient_count: 0,
            data_size: 0,
            client_domain: None,
            peer,
            envelope: None,
            data_error: None,
        }
    }

    /// Reset the session to post-HELO state, discarding any open envelope
    pub fn reset(&mut self) {
        if self.envelope.take().is_some() {
            debug!(peer = ?self.peer, "discarding open envelope");
        }
        self.state = SmtpState::GreetingReceived;
        self.from = None;
        self.recipient_count = 0;
        self.data_size = 0;
        self.data_error = None;
        // Keep client_domain as it's set by HELO
    }

    /// Connection details handed to the mail handler
    pub fn connection(&self) -> Connection {
        Connection {
            peer: self.peer,
            client_domain: self.client_domain.clone(),
        }
    }

    /// Begin a transaction with the envelope created for `from`
    pub fn start_transaction(&mut self, from: MailAddress, envelope: Box<dyn Envelope>) {
        self.reset();
        self.from = Some(from);
        self.envelope = Some(envelope);
        self.state = SmtpState::MailReceived;
    }

    /// Pass a recipient to the envelope
    pub fn add_recipient(&mut self, recipient: MailAddress) -> Result<(), SmtpError> {
        let envelope = self.envelope_mut()?;
        envelope.add_recipient(recipient)?;

        self.recipient_count += 1;
        self.state = SmtpState::RecipientsReceived;
        Ok(())
    }

    /// Ask the envelope to accept a body. A refusal ends the transaction.
    pub fn start_data_mode(&mut self) -> Result<(), SmtpError> {
        if !self.can_execute_command("DATA") {
            return Err(SmtpError::InvalidState(
                "DATA command requires MAIL first".to_string(),
            ));
        }

        let envelope = self.envelope_mut()?;
        if let Err(e) = envelope.begin_data() {
            self.reset();
            return Err(e);
        }

        self.data_size = 0;
        self.data_error = None;
        self.state = SmtpState::DataMode;
        Ok(())
    }

    /// Forward one dot-unstuffed body line, terminator included.
    ///
    /// Errors are held until the end of the body so the client is answered
    /// once, after the terminating dot.
    pub fn add_data_line(&mut self, line: &[u8]) {
        if self.data_error.is_some() {
            return;
        }

        if line.len() > SmtpLimits::TEXT_LINE_MAX_LENGTH {
            self.fail_data(SmtpError::LineTooLong {
                max: SmtpLimits::TEXT_LINE_MAX_LENGTH,
            });
            return;
        }

        if self.data_size + line.len() > SmtpLimits::MAX_DATA_SIZE {
            self.fail_data(SmtpError::TooMuchData {
                max: SmtpLimits::MAX_DATA_SIZE,
            });
            return;
        }

        let result = match self.envelope.as_mut() {
            Some(envelope) => envelope.write(line),
            None => Err(SmtpError::InvalidState(
                "Not in data collection mode".to_string(),
            )),
        };

        match result {
            Ok(()) => self.data_size += line.len(),
            Err(e) => self.fail_data(e),
        }
    }

    /// Hold `err` as the outcome of the current body. Later lines are
    /// drained without reaching the envelope; the first error wins.
    pub fn fail_data(&mut self, err: SmtpError) {
        if self.in_data_mode() && self.data_error.is_none() {
            debug!(peer = ?self.peer, error = %err, "body refused, draining");
            self.data_error = Some(err);
        }
    }

    /// Finish the body and close the envelope. The transaction ends either way.
    pub fn finish_data_collection(&mut self) -> Result<(), SmtpError> {
        if !self.in_data_mode() {
            return Err(SmtpError::InvalidState(
                "Not in data collection mode".to_string(),
            ));
        }

        let envelope = self.envelope.take();
        let data_error = self.data_error.take();
        self.reset();

        if let Some(e) = data_error {
            return Err(e);
        }

        match envelope {
            Some(mut envelope) => envelope.close(),
            None => Err(SmtpError::InvalidState("No open envelope".to_string())),
        }
    }

    /// Set the client domain from HELO command
    pub fn set_client_domain(&mut self, domain: String) -> Result<(), SmtpError> {
        if domain.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
            return Err(SmtpError::DomainTooLong {
                max: SmtpLimits::DOMAIN_MAX_LENGTH,
            });
        }

        self.reset(); // Clear any existing transaction
        self.client_domain = Some(domain);
        Ok(())
    }

    /// Whether body lines are currently being forwarded
    pub fn in_data_mode(&self) -> bool {
        self.state == SmtpState::DataMode
    }

    /// Check if the session is ready for a specific command
    pub fn can_execute_command(&self, command: &str) -> bool {
        match command.to_uppercase().as_str() {
            "EHLO" | "HELO" => true, // can be sent at any time
            "MAIL" => self.state == SmtpState::GreetingReceived,
            "RCPT" | "DATA" => {
                self.state == SmtpState::MailReceived || self.state == SmtpState::RecipientsReceived
            }
            "RSET" => self.state != SmtpState::Initial,
            "NOOP" => true,
            "QUIT" => true,
            _ => false,
        }
    }

    fn envelope_mut(&mut self) -> Result<&mut Box<dyn Envelope>, SmtpError> {
        self.envelope
            .as_mut()
            .ok_or_else(|| SmtpError::InvalidState("No open envelope".to_string()))
    }
}

impl Default for SmtpSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SmtpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSession")
            .field("state", &self.state)
            .field("from", &self.from)
            .field("recipient_count", &self.recipient_count)
            .field("data_size", &self.data_size)
            .field("client_domain", &self.client_domain)
            .field("peer", &self.peer)
            .field("envelope", &self.envelope.is_some())
            .finish_non_exhaustive()
    }
}
