//! Implementation of SMTP commands

use tracing::debug;

use crate::smtp::address::MailAddress;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::handler::MailHandler;
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::{SmtpSession, SmtpState};

/// Handles SMTP commands and returns appropriate responses
pub struct SmtpCommandHandler<'a> {
    hostname: &'a str,
    mail_handler: &'a dyn MailHandler,
}

impl<'a> SmtpCommandHandler<'a> {
    /// Create a new command handler
    pub fn new(hostname: &'a str, mail_handler: &'a dyn MailHandler) -> Self {
        Self {
            hostname,
            mail_handler,
        }
    }

    /// Process a command line and return a response
    pub fn process_command(
        &self,
        command_line: &str,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        // Check command line length
        if command_line.len() > SmtpLimits::COMMAND_LINE_MAX_LENGTH {
            return Err(SmtpError::LineTooLong {
                max: SmtpLimits::COMMAND_LINE_MAX_LENGTH,
            });
        }

        let parts: Vec<&str> = command_line.split_whitespace().collect();
        if parts.is_empty() {
            return Err(SmtpError::InvalidCommand);
        }

        let cmd = parts[0].to_uppercase();
        let args = command_line.trim_start()[parts[0].len()..].trim();

        match cmd.as_str() {
            "HELO" => self.handle_helo(parts, session, false),
            "EHLO" => self.handle_helo(parts, session, true),
            "MAIL" => self.handle_mail(args, session),
            "RCPT" => self.handle_rcpt(args, session),
            "DATA" => self.handle_data(parts, session),
            "RSET" => self.handle_rset(session),
            "NOOP" => self.handle_noop(),
            "QUIT" => self.handle_quit(),
            _ => Err(SmtpError::InvalidCommand),
        }
    }

    /// Handle HELO and EHLO commands
    fn handle_helo(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession,
        extended: bool,
    ) -> Result<SmtpResponse, SmtpError> {
        if parts.len() < 2 {
            return Err(SmtpError::InvalidSyntax(format!(
                "{} requires domain argument",
                parts[0].to_uppercase()
            )));
        }

        let client_domain = parts[1].to_string();
        session.set_client_domain(client_domain.clone())?;

        if extended {
            Ok(SmtpResponse::ehlo(self.hostname, &client_domain))
        } else {
            Ok(SmtpResponse::helo(self.hostname, &client_domain))
        }
    }

    /// Handle MAIL command
    fn handle_mail(&self, args: &str, session: &mut SmtpSession) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("MAIL") {
            return Err(SmtpError::InvalidState(match session.state {
                SmtpState::Initial => "MAIL command requires HELO first".to_string(),
                _ => "Sender already specified".to_string(),
            }));
        }

        let from = match self.parse_path(args, "FROM:")? {
            "" => MailAddress::null(),
            path => MailAddress::parse(path)?,
        };
        let envelope = self.mail_handler.on_new_mail(&session.connection(), from.clone())?;

        debug!(peer = ?session.peer, from = %from, "transaction started");
        session.start_transaction(from, envelope);

        Ok(SmtpResponse::ok())
    }

    /// Handle RCPT command
    fn handle_rcpt(&self, args: &str, session: &mut SmtpSession) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("RCPT") {
            return Err(SmtpError::InvalidState(
                "RCPT command requires MAIL first".to_string(),
            ));
        }

        let to = match self.parse_path(args, "TO:")? {
            "" => {
                return Err(SmtpError::InvalidSyntax(
                    "address cannot be empty".to_string(),
                ));
            }
            path => MailAddress::parse(path)?,
        };
        session.add_recipient(to)?;

        Ok(SmtpResponse::ok())
    }

    /// Handle DATA command
    fn handle_data(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("DATA") {
            return Err(SmtpError::InvalidState(
                "DATA command requires MAIL first".to_string(),
            ));
        }

        if parts.len() > 1 {
            return Err(SmtpError::InvalidSyntax(
                "DATA command takes no arguments".to_string(),
            ));
        }

        session.start_data_mode()?;

        Ok(SmtpResponse::data_start())
    }

    /// Handle RSET command
    fn handle_rset(&self, session: &mut SmtpSession) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("RSET") {
            return Err(SmtpError::InvalidState(
                "RSET command requires HELO first".to_string(),
            ));
        }

        session.reset();
        Ok(SmtpResponse::ok())
    }

    /// Handle NOOP command
    fn handle_noop(&self) -> Result<SmtpResponse, SmtpError> {
        Ok(SmtpResponse::ok())
    }

    /// Handle QUIT command
    fn handle_quit(&self) -> Result<SmtpResponse, SmtpError> {
        Ok(SmtpResponse::quit())
    }

    /// Extract the address from `FROM:<address>` or `TO:<address>`. ESMTP
    /// parameters after the closing bracket are ignored.
    fn parse_path<'s>(&self, args: &'s str, keyword: &str) -> Result<&'s str, SmtpError> {
        let keyword_matches = args
            .get(..keyword.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(keyword));
        if !keyword_matches {
            return Err(SmtpError::InvalidSyntax(format!(
                "expected '{keyword}<address>'"
            )));
        }

        let path = args[keyword.len()..].trim_start();
        let Some(inner) = path.strip_prefix('<') else {
            return Err(SmtpError::InvalidSyntax(
                "address must be enclosed in angle brackets".to_string(),
            ));
        };
        let Some(end) = inner.find('>') else {
            return Err(SmtpError::InvalidSyntax(
                "address must be enclosed in angle brackets".to_string(),
            ));
        };

        Ok(&inner[..end])
    }
}
