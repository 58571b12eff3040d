//! SMTP server implementation

use crate::smtp::commands::SmtpCommandHandler;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::handler::MailHandler;
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::SmtpSession;

use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

/// SMTP server that hands every transaction to a [`MailHandler`]
#[derive(Clone)]
pub struct SmtpServer {
    /// Server hostname
    hostname: String,
    handler: Arc<dyn MailHandler>,
}

impl SmtpServer {
    /// Create a new SMTP server
    pub fn new(hostname: &str, handler: impl MailHandler + 'static) -> Self {
        Self {
            hostname: hostname.to_owned(),
            handler: Arc::new(handler),
        }
    }

    /// Start the server on the specified address (blocking)
    pub fn start(&self, addr: impl ToSocketAddrs) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(addr)?;
        self.start_with_listener(listener)
    }

    /// Start the server with an existing listener (blocking).
    /// Every connection is served on its own thread.
    pub fn start_with_listener(&self, listener: TcpListener) -> Result<(), SmtpError> {
        info!(
            addr = %listener.local_addr().map_err(SmtpError::Io)?,
            hostname = %self.hostname,
            "SMTP server listening"
        );

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let server = self.clone();
                    thread::spawn(move || {
                        let peer = stream.peer_addr().ok();
                        if let Err(e) = server.handle_client(stream) {
                            warn!(peer = ?peer, error = %e, "error handling client");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "error accepting connection");
                }
            }
        }

        Ok(())
    }

    /// Handle a client connection
    fn handle_client(&self, mut stream: TcpStream) -> Result<(), SmtpError> {
        let peer = stream.peer_addr().ok();
        let mut session = SmtpSession::with_peer(peer);
        let command_handler = SmtpCommandHandler::new(&self.hostname, self.handler.as_ref());
        let mut reader = BufReader::new(stream.try_clone()?);

        info!(peer = ?peer, "connection accepted");

        // Send greeting
        self.send_response(&mut stream, &SmtpResponse::greeting(&self.hostname))?;

        let mut line_buffer = Vec::new();
        loop {
            line_buffer.clear();

            let max = if session.in_data_mode() {
                SmtpLimits::TEXT_LINE_MAX_LENGTH
            } else {
                SmtpLimits::COMMAND_LINE_MAX_LENGTH
            };

            match read_line(&mut reader, &mut line_buffer, max) {
                Ok(Line::Closed) => break,
                Ok(Line::TooLong) => {
                    let err = SmtpError::LineTooLong { max };
                    if session.in_data_mode() {
                        debug!(peer = ?peer, max, "oversized body line, draining");
                        session.fail_data(err);
                    } else {
                        self.send_response(&mut stream, &error_response(&err))?;
                    }
                }
                Ok(Line::Complete) => {
                    if session.in_data_mode() {
                        if let Some(response) = self.handle_data_line(&line_buffer, &mut session) {
                            self.send_response(&mut stream, &response)?;
                        }
                        continue;
                    }

                    // Handle potential UTF-8 issues gracefully
                    let line = String::from_utf8_lossy(&line_buffer);
                    let command = line.trim();
                    if command.is_empty() {
                        continue;
                    }

                    debug!(peer = ?peer, command, "received command");

                    let response = match command_handler.process_command(command, &mut session) {
                        Ok(response) => response,
                        Err(e) => error_response(&e),
                    };
                    self.send_response(&mut stream, &response)?;
                    if response.code == "221" {
                        break; // QUIT command
                    }
                }
                Err(e) => {
                    warn!(peer = ?peer, error = %e, "error reading from client");
                    break;
                }
            }
        }

        if session.in_data_mode() {
            info!(peer = ?peer, "connection closed during DATA, message discarded");
        }
        info!(peer = ?peer, "connection closed");
        Ok(())
    }

    /// Handle a raw line during DATA mode. Returns a response once the
    /// terminating dot has been seen.
    fn handle_data_line(&self, line: &[u8], session: &mut SmtpSession) -> Option<SmtpResponse> {
        if is_data_terminator(line) {
            let response = match session.finish_data_collection() {
                Ok(()) => SmtpResponse::queued(),
                Err(e) => error_response(&e),
            };
            return Some(response);
        }

        session.add_data_line(unstuff_line(line));
        None
    }

    /// Send a response to the client
    fn send_response(
        &self,
        stream: &mut TcpStream,
        response: &SmtpResponse,
    ) -> Result<(), SmtpError> {
        // Ensure response doesn't exceed maximum line length
        let formatted = response.format();
        if formatted.len() > SmtpLimits::REPLY_LINE_MAX_LENGTH {
            // Truncate message if too long
            let truncated_response =
                SmtpResponse::new(&response.code, "Response too long (truncated)");
            stream.write_all(truncated_response.format().as_bytes())?;
        } else {
            stream.write_all(formatted.as_bytes())?;
        }
        stream.flush()?;
        Ok(())
    }
}

impl fmt::Debug for SmtpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpServer")
            .field("hostname", &self.hostname)
            .finish_non_exhaustive()
    }
}

/// Result of reading one line from the client
#[derive(Debug, PartialEq)]
enum Line {
    /// The buffer holds a line; only the last line before EOF lacks its LF
    Complete,
    /// More than `max` bytes without a LF; the rest of the line was discarded
    TooLong,
    /// The client closed the connection
    Closed,
}

/// Read one LF-terminated line into `buf`, never buffering more than
/// `max + 1` bytes of it.
fn read_line(reader: &mut impl BufRead, buf: &mut Vec<u8>, max: usize) -> io::Result<Line> {
    let read = reader.by_ref().take(max as u64 + 1).read_until(b'\n', buf)?;
    if read == 0 {
        return Ok(Line::Closed);
    }
    if buf.len() <= max {
        return Ok(Line::Complete);
    }
    if !buf.ends_with(b"\n") {
        reader.skip_until(b'\n')?;
    }
    Ok(Line::TooLong)
}

fn error_response(e: &SmtpError) -> SmtpResponse {
    SmtpResponse::error(e.to_response_code(), &e.to_response_message())
}

/// A line holding a single dot ends the mail data. A dot without its line
/// ending is only a partial line from a client that went away.
fn is_data_terminator(line: &[u8]) -> bool {
    line == b".\r\n" || line == b".\n"
}

/// Undo transparency dot-stuffing (RFC 5321 section 4.5.2)
fn unstuff_line(line: &[u8]) -> &[u8] {
    line.strip_prefix(b".").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp::address::MailAddress;
    use crate::smtp::handler::{Connection, Envelope};
    use crate::smtp::session::tests::{Recorded, RecordingEnvelope};
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    struct TestHandler {
        seen: Arc<Mutex<Recorded>>,
    }

    impl MailHandler for TestHandler {
        fn on_new_mail(
            &self,
            _conn: &Connection,
            _from: MailAddress,
        ) -> Result<Box<dyn Envelope>, SmtpError> {
            Ok(Box::new(RecordingEnvelope {
                seen: Arc::clone(&self.seen),
                refuse_data: false,
            }))
        }
    }

    fn start_test_server() -> (String, Arc<Mutex<Recorded>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let seen = Arc::new(Mutex::new(Recorded::default()));
        let server = SmtpServer::new(
            "test.local",
            TestHandler {
                seen: Arc::clone(&seen),
            },
        );

        thread::spawn(move || server.start_with_listener(listener));

        (addr, seen)
    }

    fn send_command(stream: &mut TcpStream, command: &str) -> Result<String, std::io::Error> {
        write!(stream, "{command}\r\n")?;
        stream.flush()?;

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        reader.read_line(&mut response)?;
        Ok(response.trim().to_string())
    }

    fn wait_until_closed(seen: &Mutex<Recorded>) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !seen.lock().unwrap().closed && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_terminator_and_unstuffing() {
        assert!(is_data_terminator(b".\r\n"));
        assert!(is_data_terminator(b".\n"));
        assert!(!is_data_terminator(b"..\r\n"));
        assert!(!is_data_terminator(b" .\r\n"));
        assert!(!is_data_terminator(b"."));

        assert_eq!(unstuff_line(b"..leading dot\r\n"), b".leading dot\r\n");
        assert_eq!(unstuff_line(b"plain\r\n"), b"plain\r\n");
    }

    #[test]
    fn test_read_line_caps_buffer() {
        let mut reader = BufReader::new(&b"HELO a\r\nxxxxxxxxxxxx\r\nNOOP\r\ntail"[..]);
        let mut buf = Vec::new();

        assert_eq!(read_line(&mut reader, &mut buf, 8).unwrap(), Line::Complete);
        assert_eq!(buf, b"HELO a\r\n");

        buf.clear();
        assert_eq!(read_line(&mut reader, &mut buf, 8).unwrap(), Line::TooLong);
        assert_eq!(buf.len(), 9);

        buf.clear();
        assert_eq!(read_line(&mut reader, &mut buf, 8).unwrap(), Line::Complete);
        assert_eq!(buf, b"NOOP\r\n");

        buf.clear();
        assert_eq!(read_line(&mut reader, &mut buf, 8).unwrap(), Line::Complete);
        assert_eq!(buf, b"tail");

        buf.clear();
        assert_eq!(read_line(&mut reader, &mut buf, 8).unwrap(), Line::Closed);
    }

    #[test]
    fn test_complete_smtp_session() {
        let (addr, seen) = start_test_server();

        let mut stream = TcpStream::connect(&addr).unwrap();

        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut greeting = String::new();
        reader.read_line(&mut greeting).unwrap();
        assert!(greeting.starts_with("220 test.local"));

        assert!(send_command(&mut stream, "HELO client.local").unwrap().starts_with("250"));
        assert!(send_command(&mut stream, "MAIL FROM:<test@example.com>").unwrap().starts_with("250"));
        assert!(send_command(&mut stream, "RCPT TO:<recipient@example.com>").unwrap().starts_with("250"));
        assert!(send_command(&mut stream, "DATA").unwrap().starts_with("354"));

        stream
            .write_all(b"Subject: Test Email\r\n\r\n..dotted\r\n\r\nend\r\n.\r\n")
            .unwrap();
        stream.flush().unwrap();

        let mut final_response = String::new();
        reader.read_line(&mut final_response).unwrap();
        assert_eq!(final_response, "250 2.0.0 Ok: queued\r\n");

        assert!(send_command(&mut stream, "QUIT").unwrap().starts_with("221"));

        wait_until_closed(&seen);
        let seen = seen.lock().unwrap();
        assert!(seen.closed);
        assert_eq!(seen.recipients, vec!["recipient@example.com"]);
        assert_eq!(seen.body, b"Subject: Test Email\r\n\r\n.dotted\r\n\r\nend\r\n");
    }

    #[test]
    fn test_error_handling() {
        let (addr, _seen) = start_test_server();

        let mut stream = TcpStream::connect(&addr).unwrap();

        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut greeting = String::new();
        reader.read_line(&mut greeting).unwrap();
        assert!(greeting.starts_with("220"));

        let response = send_command(&mut stream, "INVALID").unwrap();
        assert!(response.starts_with("500"));

        let response = send_command(&mut stream, "MAIL FROM:<test@example.com>").unwrap();
        assert!(response.starts_with("503"));

        let response = send_command(&mut stream, "QUIT").unwrap();
        assert!(response.starts_with("221"));
    }
}
