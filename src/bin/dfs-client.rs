//! The dfs-client executable drives the filesystem from the command line:
//!
//! `dfs-client ls <PATH> [--naming HOST]`
//!
//!     List the entries of a directory.
//!
//! `dfs-client mkdir <PATH> [--naming HOST]`
//!
//!     Create a directory. Prints "exists" if the path is already taken.
//!
//! `dfs-client touch <PATH> [--naming HOST]`
//!
//!     Create an empty file on some storage server.
//!
//! `dfs-client rm <PATH> [--naming HOST]`
//!
//!     Delete a file or directory tree.
//!
//! `dfs-client stat <PATH> [--naming HOST]`
//!
//!     Print the size of a file in bytes.
//!
//! Every command connects to the naming server given by --naming, or
//! 127.0.0.1 when the option is absent, and prints an error with a non-zero
//! exit code when the server reports one.

use clap::{crate_version, App, Arg, ArgMatches, SubCommand};
use dfs::naming::{self, Service};
use dfs::storage::Storage;
use dfs::{Path, Result};
use std::process::exit;

/// the filesystem operation requested on the command line
#[derive(Debug)]
enum Action {
    List,
    MakeDirectory,
    Touch,
    Remove,
    Stat,
}

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    naming: String,
    action: Action,
    path: Path,
}

fn main() {
    let matches = App::new("dfs-client")
        .version(crate_version!())
        .about("a command line client for the distributed filesystem")
        .subcommands(vec![
            SubCommand::with_name("ls")
                .about("List the entries of a directory")
                .arg(Arg::with_name("PATH").required(true).index(1)),
            SubCommand::with_name("mkdir")
                .about("Create a directory")
                .arg(Arg::with_name("PATH").required(true).index(1)),
            SubCommand::with_name("touch")
                .about("Create an empty file")
                .arg(Arg::with_name("PATH").required(true).index(1)),
            SubCommand::with_name("rm")
                .about("Delete a file or directory tree")
                .arg(Arg::with_name("PATH").required(true).index(1)),
            SubCommand::with_name("stat")
                .about("Print the size of a file in bytes")
                .arg(Arg::with_name("PATH").required(true).index(1)),
        ])
        .arg(
            Arg::with_name("naming")
                .long("naming")
                .value_name("HOST")
                .help("sets the hostname of the naming server")
                .default_value("127.0.0.1"),
        )
        .get_matches();

    match parse_options(matches).and_then(run) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    }
}

/// parses the matches from the command line into an [`Opt`] struct
fn parse_options(matches: ArgMatches) -> Result<Opt> {
    let naming = matches.value_of("naming").unwrap().to_string();
    let (action, args) = match matches.subcommand() {
        ("ls", Some(args)) => (Action::List, args),
        ("mkdir", Some(args)) => (Action::MakeDirectory, args),
        ("touch", Some(args)) => (Action::Touch, args),
        ("rm", Some(args)) => (Action::Remove, args),
        ("stat", Some(args)) => (Action::Stat, args),
        _ => panic!("unknown command received"),
    };
    let path: Path = args.value_of("PATH").unwrap().parse()?;

    Ok(Opt {
        naming,
        action,
        path,
    })
}

/// runs the requested action against the naming server
fn run(opt: Opt) -> Result<()> {
    let service = naming::service_stub(&opt.naming)?;

    match opt.action {
        Action::List => {
            let mut entries = service.list(&opt.path)?;
            entries.sort();
            for entry in entries {
                println!("{}", entry);
            }
        }
        Action::MakeDirectory => {
            if !service.create_directory(&opt.path)? {
                println!("exists");
            }
        }
        Action::Touch => {
            if !service.create_file(&opt.path)? {
                println!("exists");
            }
        }
        Action::Remove => {
            if !service.delete(&opt.path)? {
                println!("not fully removed");
            }
        }
        Action::Stat => {
            let storage = service.get_storage(&opt.path)?;
            println!("{}", storage.size(&opt.path)?);
        }
    }
    Ok(())
}
