//! Server adapter: one fresh envelope per transaction

use std::sync::Arc;

use tracing::info;

use crate::config::SinkConfig;
use crate::sink::envelope::SinkEnvelope;
use crate::smtp::{Connection, Envelope, MailAddress, MailHandler, SmtpError};

/// [`MailHandler`] that builds a [`SinkEnvelope`] for every `MAIL FROM`.
///
/// Holds nothing but the shared configuration. Construction never fails;
/// problems with the storage directory surface when a message is committed.
#[derive(Debug, Clone)]
pub struct SinkServer {
    config: Arc<SinkConfig>,
}

impl SinkServer {
    pub fn new(config: SinkConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }
}

impl MailHandler for SinkServer {
    fn on_new_mail(
        &self,
        conn: &Connection,
        from: MailAddress,
    ) -> Result<Box<dyn Envelope>, SmtpError> {
        info!(
            peer = ?conn.peer,
            helo = conn.client_domain.as_deref().unwrap_or(""),
            from = %from,
            "new mail"
        );
        Ok(Box::new(SinkEnvelope::new(Arc::clone(&self.config), from)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_transaction_gets_fresh_envelope() {
        let server = SinkServer::new(SinkConfig::new("accepted.org").unwrap());
        let conn = Connection::default();

        let mut first = server
            .on_new_mail(&conn, MailAddress::parse("a@x.com").unwrap())
            .unwrap();
        first
            .add_recipient(MailAddress::parse("b@accepted.org").unwrap())
            .unwrap();
        first.begin_data().unwrap();

        let mut second = server
            .on_new_mail(&conn, MailAddress::parse("a@x.com").unwrap())
            .unwrap();
        let err = second.begin_data().unwrap_err();
        assert_eq!(err.to_string(), "554 5.5.1 Error: no valid recipients");
    }

    #[test]
    fn test_config_is_shared_read_only() {
        let server = SinkServer::new(
            SinkConfig::new("accepted.org")
                .unwrap()
                .with_dir("/srv/mail"),
        );
        let clone = server.clone();
        assert_eq!(clone.config(), server.config());
        assert_eq!(server.config().accepted_host, "accepted.org");
    }
}
