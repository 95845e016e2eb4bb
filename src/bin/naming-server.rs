//! this binary starts the naming server
//! to see the list of options, type: `naming-server --help`

use clap::{crate_version, App, Arg};
use dfs::naming::{NamingServer, REGISTRATION_PORT, SERVICE_PORT};
use dfs::{DfsError, Result};
use std::net::SocketAddr;
use std::process::exit;
use std::thread;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    service: SocketAddr,
    registration: SocketAddr,
}

impl Opt {
    /// validates the two listen addresses
    /// # Errors
    /// returns [`DfsError::InvalidArgument`] if an address does not parse
    fn build(service: &str, registration: &str) -> Result<Opt> {
        let service: SocketAddr = service.parse().map_err(|_| {
            DfsError::InvalidArgument(format!(
                "could not parse {} into an IP address and port",
                service
            ))
        })?;
        let registration: SocketAddr = registration.parse().map_err(|_| {
            DfsError::InvalidArgument(format!(
                "could not parse {} into an IP address and port",
                registration
            ))
        })?;
        Ok(Opt {
            service,
            registration,
        })
    }
}

fn main() {
    // set up a tracing subscriber to log to STDERR
    subscriber_config();

    let default_service = format!("127.0.0.1:{}", SERVICE_PORT);
    let default_registration = format!("127.0.0.1:{}", REGISTRATION_PORT);

    let matches = App::new("naming-server")
        .version(crate_version!())
        .about("the naming server of the distributed filesystem")
        .arg(
            Arg::with_name("service-addr")
                .long("service-addr")
                .value_name("IP_ADDR:PORT")
                .help("sets the address the client service interface listens on")
                .default_value(&default_service),
        )
        .arg(
            Arg::with_name("registration-addr")
                .long("registration-addr")
                .value_name("IP_ADDR:PORT")
                .help("sets the address the storage registration interface listens on")
                .default_value(&default_registration),
        )
        .get_matches();

    let opt = match Opt::build(
        matches.value_of("service-addr").unwrap(),
        matches.value_of("registration-addr").unwrap(),
    ) {
        Ok(opt) => opt,
        Err(e) => {
            eprintln!("{:?}", e);
            exit(1);
        }
    };

    if let Err(e) = run(opt) {
        eprintln!("{:?}", e);
        exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    info!("naming-server {}", env!("CARGO_PKG_VERSION"));

    let server = NamingServer::bound(opt.service, opt.registration)?;
    server.start()?;
    info!(
        "serving clients on {} and registrations on {}",
        opt.service, opt.registration
    );

    // serve until the process is killed
    loop {
        thread::park();
    }
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
