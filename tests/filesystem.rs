//! End-to-end scenarios for the naming and storage servers, run against
//! real sockets and real directories.

use dfs::naming::{NamingServer, Registration, Service};
use dfs::storage::{Storage, StorageServer};
use dfs::{DfsError, Path};
use std::fs::{self, File};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn loopback() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
}

fn path(s: &str) -> Path {
    s.parse().unwrap()
}

/// a started naming server on OS-assigned ports
fn naming_server() -> NamingServer {
    let server = NamingServer::bound(loopback(), loopback()).unwrap();
    server.start().unwrap();
    server
}

/// a started storage server seeded with the given (empty) files
fn storage_server(naming: &NamingServer, files: &[&str]) -> (StorageServer, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    for name in files {
        let local = path(name).to_local(dir.path());
        fs::create_dir_all(local.parent().unwrap()).unwrap();
        File::create(local).unwrap();
    }

    let server = StorageServer::new(dir.path()).unwrap();
    server
        .start("127.0.0.1", &naming.registration_stub().unwrap())
        .unwrap();
    (server, dir)
}

#[test]
fn registration_partitions_the_namespace() {
    let naming = naming_server();
    let service = naming.service_stub().unwrap();

    let (s1, _dir1) = storage_server(&naming, &["/x", "/y"]);
    let mut listed = service.list(&path("/")).unwrap();
    listed.sort();
    assert_eq!(listed, vec!["x", "y"]);
    assert!(!service.is_directory(&path("/x")).unwrap());

    // the second server offers /x too; the naming server rejects the copy
    // and the server deletes it locally during startup
    let (s2, dir2) = storage_server(&naming, &["/x", "/z"]);
    assert!(!dir2.path().join("x").exists());
    assert!(dir2.path().join("z").exists());

    assert_eq!(
        service.get_storage(&path("/x")).unwrap(),
        s1.storage_stub().unwrap()
    );
    assert_eq!(
        service.get_storage(&path("/z")).unwrap(),
        s2.storage_stub().unwrap()
    );

    s1.stop();
    s2.stop();
    naming.stop();
}

#[test]
fn created_files_land_on_a_registered_server() {
    let naming = naming_server();
    let service = naming.service_stub().unwrap();
    let (server, dir) = storage_server(&naming, &[]);

    assert!(service.create_file(&path("/a/b")).unwrap());
    assert!(service.is_directory(&path("/a")).unwrap());
    assert_eq!(
        service.get_storage(&path("/a/b")).unwrap(),
        server.storage_stub().unwrap()
    );
    assert!(dir.path().join("a/b").is_file());

    // a second creation of the same path changes nothing
    assert!(!service.create_file(&path("/a/b")).unwrap());

    server.stop();
    naming.stop();
}

#[test]
fn file_creation_requires_an_existing_parent() {
    let naming = naming_server();
    let service = naming.service_stub().unwrap();
    let (server, _dir) = storage_server(&naming, &[]);

    assert!(matches!(
        service.create_file(&path("/a/b/c")),
        Err(DfsError::NotFound(_))
    ));
    assert_eq!(service.list(&path("/")).unwrap(), Vec::<String>::new());

    server.stop();
    naming.stop();
}

#[test]
fn file_creation_requires_a_storage_server() {
    let naming = naming_server();
    let service = naming.service_stub().unwrap();

    assert!(matches!(
        service.create_file(&path("/f")),
        Err(DfsError::IllegalState(_))
    ));

    naming.stop();
}

#[test]
fn file_content_flows_through_the_resolved_server() {
    let naming = naming_server();
    let service = naming.service_stub().unwrap();
    let (server, _dir) = storage_server(&naming, &[]);

    assert!(service.create_file(&path("/data")).unwrap());
    let storage = service.get_storage(&path("/data")).unwrap();

    storage.write(&path("/data"), 0, b"hello").unwrap();
    assert_eq!(storage.size(&path("/data")).unwrap(), 5);
    assert_eq!(storage.read(&path("/data"), 1, 3).unwrap(), b"ell");

    // the failure taxonomy crosses the wire intact
    assert!(matches!(
        storage.read(&path("/data"), 0, 6),
        Err(DfsError::OutOfBounds(_))
    ));
    assert!(matches!(
        storage.size(&path("/missing")),
        Err(DfsError::NotFound(_))
    ));

    server.stop();
    naming.stop();
}

#[test]
fn deleted_files_leave_the_namespace_and_the_disk() {
    let naming = naming_server();
    let service = naming.service_stub().unwrap();
    let (server, dir) = storage_server(&naming, &["/f"]);

    assert!(service.delete(&path("/f")).unwrap());
    assert!(!dir.path().join("f").exists());
    assert!(matches!(
        service.get_storage(&path("/f")),
        Err(DfsError::NotFound(_))
    ));
    assert!(matches!(
        service.delete(&path("/f")),
        Err(DfsError::NotFound(_))
    ));

    server.stop();
    naming.stop();
}

#[test]
fn directory_deletion_reaches_every_hosting_server() {
    let naming = naming_server();
    let service = naming.service_stub().unwrap();
    let (s1, dir1) = storage_server(&naming, &["/d/a"]);
    let (s2, dir2) = storage_server(&naming, &["/d/b"]);

    assert!(service.delete(&path("/d")).unwrap());
    assert_eq!(service.list(&path("/")).unwrap(), Vec::<String>::new());
    assert!(matches!(
        service.is_directory(&path("/d")),
        Err(DfsError::NotFound(_))
    ));
    assert!(!dir1.path().join("d").exists());
    assert!(!dir2.path().join("d").exists());

    s1.stop();
    s2.stop();
    naming.stop();
}

#[test]
fn the_root_cannot_be_deleted() {
    let naming = naming_server();
    let service = naming.service_stub().unwrap();

    assert!(!service.delete(&path("/")).unwrap());

    naming.stop();
}

#[test]
fn a_storage_server_cannot_register_twice() {
    let naming = naming_server();
    let (server, _dir) = storage_server(&naming, &[]);

    let outcome = naming.registration_stub().unwrap().register(
        server.storage_stub().unwrap(),
        server.command_stub().unwrap(),
        vec![],
    );
    assert!(matches!(outcome, Err(DfsError::IllegalState(_))));

    server.stop();
    naming.stop();
}

#[test]
fn directories_nest_through_the_service_interface() {
    let naming = naming_server();
    let service = naming.service_stub().unwrap();

    assert!(service.create_directory(&path("/outer")).unwrap());
    assert!(service.create_directory(&path("/outer/inner")).unwrap());
    assert!(!service.create_directory(&path("/outer")).unwrap());
    assert!(matches!(
        service.create_directory(&path("/absent/inner")),
        Err(DfsError::NotFound(_))
    ));

    let mut listed = service.list(&path("/outer")).unwrap();
    listed.sort();
    assert_eq!(listed, vec!["inner"]);

    naming.stop();
}

#[test]
fn the_naming_server_cannot_restart() {
    let naming = NamingServer::bound(loopback(), loopback()).unwrap();
    let stopped = Arc::new(AtomicBool::new(false));
    {
        let stopped = Arc::clone(&stopped);
        naming.on_stopped(move |cause| {
            assert!(cause.is_none());
            stopped.store(true, Ordering::SeqCst);
        });
    }

    naming.start().unwrap();
    let service_address = naming.service_address();
    naming.stop();

    assert!(stopped.load(Ordering::SeqCst));
    assert_eq!(naming.service_address(), service_address);
    assert!(matches!(naming.start(), Err(DfsError::IllegalState(_))));
}
