//! Mail addresses taken from MAIL FROM and RCPT TO

use std::fmt;

use crate::smtp::error::{SmtpError, SmtpLimits};

/// An address from the SMTP envelope, validated against the RFC 821 limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAddress {
    email: String,
    /// Position of the first `@`; `None` for the null reverse-path
    at: Option<usize>,
}

impl MailAddress {
    /// The null reverse-path `<>` used by bounces and delivery notifications
    pub fn null() -> Self {
        Self {
            email: String::new(),
            at: None,
        }
    }

    /// Parse a bare address (without angle brackets)
    pub fn parse(addr: &str) -> Result<Self, SmtpError> {
        if addr.len() > SmtpLimits::PATH_MAX_LENGTH {
            return Err(SmtpError::PathTooLong {
                max: SmtpLimits::PATH_MAX_LENGTH,
            });
        }

        let Some(at) = addr.find('@') else {
            return Err(SmtpError::InvalidSyntax(
                "Email address must contain @ symbol".to_string(),
            ));
        };

        let user_part = &addr[..at];
        let domain_part = &addr[at + 1..];

        if user_part.len() > SmtpLimits::USER_MAX_LENGTH {
            return Err(SmtpError::UserTooLong {
                max: SmtpLimits::USER_MAX_LENGTH,
            });
        }

        if domain_part.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
            return Err(SmtpError::DomainTooLong {
                max: SmtpLimits::DOMAIN_MAX_LENGTH,
            });
        }

        if user_part.is_empty() || domain_part.is_empty() {
            return Err(SmtpError::InvalidSyntax(
                "Invalid email address format".to_string(),
            ));
        }

        Ok(Self {
            email: addr.to_owned(),
            at: Some(at),
        })
    }

    /// The full address as the client sent it
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Everything after the first `@`, case preserved
    pub fn hostname(&self) -> &str {
        match self.at {
            Some(at) => &self.email[at + 1..],
            None => "",
        }
    }

    pub fn is_null(&self) -> bool {
        self.at.is_none()
    }
}

impl fmt::Display for MailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("<>");
        }
        f.write_str(&self.email)
    }
}
