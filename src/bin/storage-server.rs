//! this binary starts a storage server and registers it with the naming
//! server
//! to see the list of options, type: `storage-server --help`

use clap::{crate_version, App, Arg};
use dfs::naming;
use dfs::storage::StorageServer;
use dfs::Result;
use std::path::PathBuf;
use std::process::exit;
use std::thread;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    root: PathBuf,
    hostname: String,
    naming: String,
}

fn main() {
    // set up a tracing subscriber to log to STDERR
    subscriber_config();

    let matches = App::new("storage-server")
        .version(crate_version!())
        .about("a storage server of the distributed filesystem")
        .arg(
            Arg::with_name("root")
                .long("root")
                .value_name("DIRECTORY")
                .help("sets the local directory whose contents this server exports")
                .required(true),
        )
        .arg(
            Arg::with_name("hostname")
                .long("hostname")
                .value_name("HOST")
                .help("sets the externally routable hostname advertised to the naming server")
                .default_value("127.0.0.1"),
        )
        .arg(
            Arg::with_name("naming")
                .long("naming")
                .value_name("HOST")
                .help("sets the hostname of the naming server to register with")
                .default_value("127.0.0.1"),
        )
        .get_matches();

    let opt = Opt {
        root: PathBuf::from(matches.value_of("root").unwrap()),
        hostname: matches.value_of("hostname").unwrap().to_string(),
        naming: matches.value_of("naming").unwrap().to_string(),
    };

    if let Err(e) = run(opt) {
        eprintln!("{:?}", e);
        exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    info!("storage-server {}", env!("CARGO_PKG_VERSION"));
    info!("exporting {}", opt.root.display());

    let server = StorageServer::new(opt.root)?;
    let registration = naming::registration_stub(&opt.naming)?;
    server.start(&opt.hostname, &registration)?;
    info!("registered with the naming server on {}", opt.naming);

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
