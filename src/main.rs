use mailsink::config::USAGE;
use mailsink::logging::setup_tracing;
use mailsink::{ConfigError, SinkConfig, SinkServer, SmtpServer};
use std::env;
use tracing::{error, info};

fn main() {
    setup_tracing();

    let config = match SinkConfig::from_args(env::args().skip(1)) {
        Ok(config) => config,
        Err(ConfigError::HelpRequested) => {
            println!("{USAGE}");
            return;
        }
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    let addr = config.listen_addr();
    info!(
        addr = %addr,
        accepted_host = %config.accepted_host,
        dir = ?config.dir,
        "starting mailsink"
    );

    let hostname = config.hostname.clone();
    let server = SmtpServer::new(&hostname, SinkServer::new(config));

    if let Err(e) = server.start(addr.as_str()) {
        error!(error = %e, "failed to start server");
        std::process::exit(1);
    }
}
