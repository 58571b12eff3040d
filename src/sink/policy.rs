//! Recipient policy: which recipient, if any, a message is delivered to

use crate::sink::error::SinkError;
use crate::smtp::MailAddress;

/// Pick the delivery target for a message.
///
/// Recipients are scanned in the order they were given and the first one
/// whose hostname equals `accepted_host` exactly (case-sensitive) wins.
/// Later matches and non-matching recipients are ignored. No match, or no
/// recipients at all, rejects the message.
pub fn validate<'a>(
    recipients: &'a [MailAddress],
    accepted_host: &str,
) -> Result<&'a MailAddress, SinkError> {
    recipients
        .iter()
        .find(|rcpt| rcpt.hostname() == accepted_host)
        .ok_or(SinkError::Rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(list: &[&str]) -> Vec<MailAddress> {
        list.iter().map(|a| MailAddress::parse(a).unwrap()).collect()
    }

    #[test]
    fn test_empty_recipients_rejected() {
        assert!(matches!(
            validate(&[], "accepted.org"),
            Err(SinkError::Rejected)
        ));
    }

    #[test]
    fn test_no_matching_hostname_rejected() {
        let rcpts = addrs(&["c@other.org", "d@sub.accepted.org"]);
        assert!(matches!(
            validate(&rcpts, "accepted.org"),
            Err(SinkError::Rejected)
        ));
    }

    #[test]
    fn test_single_match() {
        let rcpts = addrs(&["b@accepted.org"]);
        assert_eq!(validate(&rcpts, "accepted.org").unwrap().email(), "b@accepted.org");
    }

    #[test]
    fn test_skips_non_matching_first_entry() {
        let rcpts = addrs(&["c@other.org", "b@accepted.org"]);
        assert_eq!(validate(&rcpts, "accepted.org").unwrap().email(), "b@accepted.org");
    }

    #[test]
    fn test_first_match_wins() {
        let rcpts = addrs(&["first@accepted.org", "second@accepted.org", "first@accepted.org"]);
        assert_eq!(
            validate(&rcpts, "accepted.org").unwrap().email(),
            "first@accepted.org"
        );
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let rcpts = addrs(&["b@Accepted.org"]);
        assert!(validate(&rcpts, "accepted.org").is_err());
    }
}
