use lettre::message::{Mailbox, Message};
use lettre::{SmtpTransport, Transport};
use mailsink::{SinkConfig, SinkServer, SmtpServer};
use std::error::Error;
use std::fs;
use std::net::TcpListener;
use std::thread;

#[test]
fn basic_lettre_send() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();

    let config = SinkConfig::new("accepted.org")?.with_dir(dir.path());
    let server = SmtpServer::new("localhost", SinkServer::new(config));

    thread::spawn(move || {
        server
            .start_with_listener(listener)
            .expect("server start failed")
    });

    let message = Message::builder()
        .from("Hanako <hanako@example.com>".parse::<Mailbox>()?)
        .to("Other <someone@other.org>".parse::<Mailbox>()?)
        .to("Tarou <tarou@accepted.org>".parse::<Mailbox>()?)
        .subject("Greetings")
        .body("Hello from lettre".to_owned())?;

    let mailer = SmtpTransport::builder_dangerous("127.0.0.1")
        .port(port)
        .build();

    mailer.send(&message)?;

    let stored: Vec<_> = fs::read_dir(dir.path().join("tarou@accepted.org"))?
        .collect::<Result<_, std::io::Error>>()?;
    assert_eq!(stored.len(), 1);

    let name = stored[0].file_name().to_string_lossy().into_owned();
    assert!(name.ends_with("_hanako@example.com.eml"), "{name}");

    let body = fs::read_to_string(stored[0].path())?;
    assert!(body.contains("Subject: Greetings\r\n"));
    assert!(body.contains("Hello from lettre"));
    assert!(!dir.path().join("someone@other.org").exists());

    Ok(())
}
