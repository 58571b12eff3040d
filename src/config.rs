//! Startup configuration
//!
//! Read once from the command line and shared read-only by every
//! connection afterwards.

use std::path::PathBuf;

use thiserror::Error;

/// Listen address used when `-addr` is not given
pub const DEFAULT_ADDR: &str = ":2525";

/// Name announced in the greeting when `-hostname` is not given
pub const DEFAULT_HOSTNAME: &str = "mailsink.local";

pub const USAGE: &str = "\
Usage: mailsink -host <accepted hostname> [-dir <directory>] [-addr <address>] [-hostname <name>]

  -addr      Address to listen on (default :2525)
  -dir       Directory to store messages in; messages go to stdout when unset
  -host      Only accept mail for recipients at this hostname (required)
  -hostname  Name announced in the SMTP greeting (default mailsink.local)";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing value for -{0}")]
    MissingValue(String),

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("an accepted hostname is required (-host)")]
    MissingAcceptedHost,

    #[error("help requested")]
    HelpRequested,
}

/// Process-wide sink configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    /// Address to listen on, as given (`:2525` means every interface)
    pub addr: String,
    /// Base directory for stored messages. `None` prints messages to stdout.
    pub dir: Option<PathBuf>,
    /// Recipients must be at exactly this hostname
    pub accepted_host: String,
    /// Name announced to clients
    pub hostname: String,
}

impl SinkConfig {
    /// Configuration with defaults for everything but the accepted hostname
    pub fn new(accepted_host: &str) -> Result<Self, ConfigError> {
        if accepted_host.is_empty() {
            return Err(ConfigError::MissingAcceptedHost);
        }

        Ok(Self {
            addr: DEFAULT_ADDR.to_owned(),
            dir: None,
            accepted_host: accepted_host.to_owned(),
            hostname: DEFAULT_HOSTNAME.to_owned(),
        })
    }

    /// Store messages under `dir`
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Parse command-line flags (program name already removed).
    ///
    /// Flags may be written `-flag value`, `--flag value` or `--flag=value`.
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut addr = None;
        let mut dir = None;
        let mut accepted_host = None;
        let mut hostname = None;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let flag = arg.trim_start_matches('-');
            if flag.len() == arg.len() {
                return Err(ConfigError::UnknownFlag(arg));
            }

            let (name, inline_value) = match flag.split_once('=') {
                Some((name, value)) => (name.to_owned(), Some(value.to_owned())),
                None => (flag.to_owned(), None),
            };

            if name == "h" || name == "help" {
                return Err(ConfigError::HelpRequested);
            }

            let slot = match name.as_str() {
                "addr" => &mut addr,
                "dir" => &mut dir,
                "host" => &mut accepted_host,
                "hostname" => &mut hostname,
                _ => return Err(ConfigError::UnknownFlag(arg)),
            };

            let value = match inline_value {
                Some(value) => value,
                None => args
                    .next()
                    .ok_or_else(|| ConfigError::MissingValue(name.clone()))?,
            };
            *slot = Some(value);
        }

        let mut config = Self::new(accepted_host.as_deref().unwrap_or_default())?;
        if let Some(addr) = addr {
            config.addr = addr;
        }
        if let Some(dir) = dir.filter(|d| !d.is_empty()) {
            config = config.with_dir(dir);
        }
        if let Some(hostname) = hostname {
            config.hostname = hostname;
        }

        Ok(config)
    }

    /// Address in a form `TcpListener::bind` accepts
    pub fn listen_addr(&self) -> String {
        if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        }
    }
}
