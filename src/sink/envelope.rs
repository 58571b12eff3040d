//! Envelope state machine for one inbound message
//!
//! ```text
//! New -> Accumulating -> Receiving -> Closed
//!   \          \            \
//!    `----------`-> Rejected `-> Failed
//! ```
//!
//! Recipients are accumulated without checks. At `DATA` the recipient
//! policy picks the delivery target; only then are body bytes accepted.
//! The body stays in memory until `close`, which makes the single storage
//! attempt. `Rejected`, `Closed` and `Failed` are terminal.

use std::io;
use std::mem;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::SinkConfig;
use crate::sink::error::SinkError;
use crate::sink::{policy, storage};
use crate::smtp::{Envelope, MailAddress, SmtpError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    /// Sender known, no recipients yet
    New,
    /// At least one recipient added
    Accumulating,
    /// Validated; body bytes are being buffered
    Receiving,
    /// No recipient passed the policy
    Rejected,
    /// Message stored
    Closed,
    /// Storage failed
    Failed,
}

/// One message transaction, from `MAIL FROM` to the stored file
#[derive(Debug)]
pub struct SinkEnvelope {
    config: Arc<SinkConfig>,
    sender: MailAddress,
    recipients: Vec<MailAddress>,
    resolved_recipient: Option<String>,
    body: Vec<u8>,
    state: EnvelopeState,
}

impl SinkEnvelope {
    pub fn new(config: Arc<SinkConfig>, sender: MailAddress) -> Self {
        Self {
            config,
            sender,
            recipients: Vec::new(),
            resolved_recipient: None,
            body: Vec::new(),
            state: EnvelopeState::New,
        }
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    pub fn sender(&self) -> &MailAddress {
        &self.sender
    }

    pub fn recipients(&self) -> &[MailAddress] {
        &self.recipients
    }

    /// The recipient chosen by the policy, once validated
    pub fn resolved_recipient(&self) -> Option<&str> {
        self.resolved_recipient.as_deref()
    }

    /// Append a recipient. Never fails; ignored once DATA has begun.
    pub fn push_recipient(&mut self, rcpt: MailAddress) {
        match self.state {
            EnvelopeState::New | EnvelopeState::Accumulating => {
                debug!(from = %self.sender, rcpt = %rcpt, "recipient added");
                self.recipients.push(rcpt);
                self.state = EnvelopeState::Accumulating;
            }
            state => warn!(?state, rcpt = %rcpt, "recipient ignored after DATA"),
        }
    }

    /// Run the recipient policy. Must succeed before any body byte is accepted.
    pub fn validate(&mut self) -> Result<&str, SinkError> {
        if !matches!(self.state, EnvelopeState::New | EnvelopeState::Accumulating) {
            return Err(self.invalid("begin data"));
        }

        match policy::validate(&self.recipients, &self.config.accepted_host) {
            Ok(rcpt) => {
                debug!(from = %self.sender, rcpt = %rcpt, "recipient resolved");
                self.resolved_recipient = Some(rcpt.email().to_owned());
                self.state = EnvelopeState::Receiving;
                Ok(rcpt.email())
            }
            Err(e) => {
                info!(
                    from = %self.sender,
                    recipients = self.recipients.len(),
                    accepted_host = %self.config.accepted_host,
                    "message rejected: no valid recipients"
                );
                self.state = EnvelopeState::Rejected;
                Err(e)
            }
        }
    }

    /// Buffer raw body bytes, line terminators included
    pub fn append(&mut self, line: &[u8]) -> Result<(), SinkError> {
        if self.state != EnvelopeState::Receiving {
            return Err(self.invalid("accept body data"));
        }

        self.body.extend_from_slice(line);
        Ok(())
    }

    /// Store the buffered body, stamped with `now`.
    ///
    /// Returns the file written, or `None` when no directory is configured
    /// and the message went to stdout.
    pub fn commit(&mut self, now: DateTime<Utc>) -> Result<Option<PathBuf>, SinkError> {
        if self.state != EnvelopeState::Receiving {
            return Err(self.invalid("commit"));
        }

        let recipient = match self.resolved_recipient.as_deref() {
            Some(rcpt) => rcpt,
            None => return Err(self.invalid("commit")),
        };
        let body = mem::take(&mut self.body);

        let result = match &self.config.dir {
            Some(dir) => storage::commit(dir, recipient, self.sender.email(), now, &body).map(Some),
            None => storage::print(&mut io::stdout().lock(), &body).map(|()| None),
        };

        match result {
            Ok(path) => {
                info!(
                    from = %self.sender,
                    rcpt = recipient,
                    size = body.len(),
                    path = ?path,
                    "message stored"
                );
                self.state = EnvelopeState::Closed;
                Ok(path)
            }
            Err(e) => {
                error!(from = %self.sender, rcpt = recipient, error = %e, "failed to store message");
                self.state = EnvelopeState::Failed;
                Err(SinkError::Storage(e))
            }
        }
    }

    fn invalid(&self, action: &'static str) -> SinkError {
        SinkError::InvalidState {
            state: self.state,
            action,
        }
    }
}

impl Envelope for SinkEnvelope {
    fn add_recipient(&mut self, rcpt: MailAddress) -> Result<(), SmtpError> {
        self.push_recipient(rcpt);
        Ok(())
    }

    fn begin_data(&mut self) -> Result<(), SmtpError> {
        self.validate()?;
        Ok(())
    }

    fn write(&mut self, line: &[u8]) -> Result<(), SmtpError> {
        Ok(self.append(line)?)
    }

    fn close(&mut self) -> Result<(), SmtpError> {
        self.commit(Utc::now())?;
        Ok(())
    }
}
