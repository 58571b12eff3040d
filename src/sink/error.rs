//! Error types for the sink

use thiserror::Error;

use crate::sink::envelope::EnvelopeState;
use crate::smtp::SmtpError;

/// Reply code sent when no recipient passes the policy
pub const REJECT_CODE: &str = "554";

/// Reply text sent when no recipient passes the policy
pub const REJECT_MESSAGE: &str = "5.5.1 Error: no valid recipients";

#[derive(Error, Debug)]
pub enum SinkError {
    /// No recipient matched the accepted hostname. Permanent.
    #[error("no valid recipients")]
    Rejected,

    #[error("envelope is {state:?}, cannot {action}")]
    InvalidState {
        state: EnvelopeState,
        action: &'static str,
    },

    /// The message could not be written. The transaction fails, the server keeps running.
    #[error("failed to store message: {0}")]
    Storage(#[from] std::io::Error),
}

impl From<SinkError> for SmtpError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Rejected => SmtpError::reply(REJECT_CODE, REJECT_MESSAGE),
            SinkError::InvalidState { .. } => SmtpError::InvalidState(err.to_string()),
            SinkError::Storage(_) => {
                SmtpError::reply("451", "4.3.0 Error: local error in processing")
            }
        }
    }
}
