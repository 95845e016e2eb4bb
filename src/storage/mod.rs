//! Storage servers: the processes that hold file content.
//!
//! A storage server exports the files under one local directory through two
//! remote interfaces: [`Storage`] (client reads and writes) and [`Command`]
//! (creation and deletion, driven by the naming server). On start it
//! registers its file list with the naming server, removes the local copies
//! the naming server rejected, and prunes directories left without files.

pub mod access;
pub mod command;

pub use self::access::{Storage, StorageStub};
pub use self::command::{Command, CommandStub};

use self::access::StorageDispatch;
use self::command::CommandDispatch;
use crate::error::{DfsError, Result};
use crate::naming::registration::{Registration, RegistrationStub};
use crate::path::Path;
use crate::rmi::skeleton::Skeleton;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// lifecycle of a storage server; it starts at most once
enum Phase {
    Fresh,
    Started,
    Stopped,
}

type StoppedHook = Box<dyn FnMut(Option<&DfsError>) + Send>;

/// A storage server rooted at a local directory.
///
/// # Example
/// ```rust,no_run
/// use dfs::naming;
/// use dfs::storage::StorageServer;
/// # use dfs::Result;
/// # fn main() -> Result<()> {
/// let server = StorageServer::new("/srv/dfs")?;
/// server.start("127.0.0.1", &naming::registration_stub("127.0.0.1")?)?;
/// # Ok(())
/// # }
/// ```
pub struct StorageServer {
    store: Arc<FileStore>,
    storage: Skeleton<StorageDispatch<FileStore>>,
    command: Skeleton<CommandDispatch<FileStore>>,
    phase: Mutex<Phase>,
    stopped_hook: Mutex<Option<StoppedHook>>,
}

impl StorageServer {
    /// Creates a storage server exporting the contents of `root`. Both of
    /// its skeletons receive OS-assigned ports when the server is started.
    pub fn new(root: impl Into<PathBuf>) -> Result<StorageServer> {
        let store = Arc::new(FileStore {
            root: root.into(),
            gate: Mutex::new(()),
        });
        let storage = Skeleton::new(
            access::descriptor(),
            StorageDispatch::new(Arc::clone(&store)),
        )?;
        let command = Skeleton::new(
            command::descriptor(),
            CommandDispatch::new(Arc::clone(&store)),
        )?;

        Ok(StorageServer {
            store,
            storage,
            command,
            phase: Mutex::new(Phase::Fresh),
            stopped_hook: Mutex::new(None),
        })
    }

    /// Starts the server and registers it with the naming server.
    ///
    /// `hostname` is the externally routable name of this host; the stubs
    /// passed to the naming server carry it. Files the naming server rejects
    /// as duplicates are deleted locally, and directories left without files
    /// are pruned.
    ///
    /// # Errors
    /// returns [`DfsError::NotFound`] if the root directory does not exist
    /// or a rejected file cannot be removed, [`DfsError::InvalidArgument`]
    /// if the root is not a directory, [`DfsError::IllegalState`] on a
    /// second start, and any failure of skeleton startup or registration
    pub fn start(&self, hostname: &str, naming: &RegistrationStub) -> Result<()> {
        let mut phase = self.phase.lock().expect("phase lock poisoned");
        match *phase {
            Phase::Fresh => {}
            _ => {
                return Err(DfsError::IllegalState(
                    "storage server can only be started once".to_string(),
                ))
            }
        }

        let metadata = fs::metadata(&self.store.root).map_err(|_| {
            DfsError::NotFound(format!(
                "storage root {} does not exist",
                self.store.root.display()
            ))
        })?;
        if !metadata.is_dir() {
            return Err(DfsError::InvalidArgument(format!(
                "storage root {} is not a directory",
                self.store.root.display()
            )));
        }

        self.storage.start()?;
        self.command.start()?;

        let storage_stub = StorageStub::of_skeleton_with_host(&self.storage, hostname)?;
        let command_stub = CommandStub::of_skeleton_with_host(&self.command, hostname)?;
        let files = Path::list(&self.store.root)?;
        info!(
            "registering {} files from {}",
            files.len(),
            self.store.root.display()
        );

        let stale = naming.register(storage_stub, command_stub, files)?;
        for file in &stale {
            if !self.store.delete(file)? {
                return Err(DfsError::NotFound(format!(
                    "cannot remove duplicate file {}",
                    file
                )));
            }
        }
        prune(&self.store.root)?;

        *phase = Phase::Started;
        info!("storage server for {} started", self.store.root.display());
        Ok(())
    }

    /// Stops both skeletons and fires the stopped hook. The server cannot be
    /// restarted.
    pub fn stop(&self) {
        {
            let mut phase = self.phase.lock().expect("phase lock poisoned");
            if let Phase::Stopped = *phase {
                return;
            }
            *phase = Phase::Stopped;
        }
        self.storage.stop();
        self.command.stop();
        self.fire_stopped(None);
    }

    /// installs a hook observing shutdown; the cause is `None` when the stop
    /// was requested by the user
    pub fn on_stopped(&self, hook: impl FnMut(Option<&DfsError>) + Send + 'static) {
        *self.stopped_hook.lock().expect("hook lock poisoned") = Some(Box::new(hook));
    }

    /// a stub for this server's [`Storage`] interface
    pub fn storage_stub(&self) -> Result<StorageStub> {
        StorageStub::of_skeleton(&self.storage)
    }

    /// a stub for this server's [`Command`] interface
    pub fn command_stub(&self) -> Result<CommandStub> {
        CommandStub::of_skeleton(&self.command)
    }

    fn fire_stopped(&self, cause: Option<&DfsError>) {
        match cause {
            Some(e) => error!("storage server stopped abnormally: {}", e),
            None => info!("storage server stopped"),
        }
        if let Some(hook) = self.stopped_hook.lock().expect("hook lock poisoned").as_mut() {
            hook(cause);
        }
    }
}

/// The on-disk state of a storage server.
///
/// One mutex serializes all disk operations: reads, writes, creation and
/// deletion are each atomic with respect to one another, though nothing is
/// promised across distinct operations.
struct FileStore {
    root: PathBuf,
    gate: Mutex<()>,
}

impl Storage for FileStore {
    fn size(&self, file: &Path) -> Result<u64> {
        let _gate = self.gate.lock().expect("store lock poisoned");
        let local = file.to_local(&self.root);
        let metadata = fs::metadata(&local)
            .map_err(|_| DfsError::NotFound(format!("no file {}", file)))?;
        if !metadata.is_file() {
            return Err(DfsError::NotFound(format!(
                "{} is not a regular file",
                file
            )));
        }
        Ok(metadata.len())
    }

    fn read(&self, file: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
        let _gate = self.gate.lock().expect("store lock poisoned");
        let local = file.to_local(&self.root);
        let metadata = fs::metadata(&local)
            .map_err(|_| DfsError::NotFound(format!("no file {}", file)))?;
        if !metadata.is_file() {
            return Err(DfsError::NotFound(format!(
                "{} is not a regular file",
                file
            )));
        }

        let end = offset.checked_add(length).ok_or_else(|| {
            DfsError::OutOfBounds(format!("read range of {} overflows", file))
        })?;
        if end > metadata.len() {
            return Err(DfsError::OutOfBounds(format!(
                "read of {} bytes at {} past the end of {} ({} bytes)",
                length,
                offset,
                file,
                metadata.len()
            )));
        }

        let mut handle = fs::File::open(&local)?;
        handle.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0_u8; length as usize];
        handle.read_exact(&mut data)?;
        Ok(data)
    }

    fn write(&self, file: &Path, offset: u64, data: &[u8]) -> Result<()> {
        let _gate = self.gate.lock().expect("store lock poisoned");
        let local = file.to_local(&self.root);
        let metadata = fs::metadata(&local)
            .map_err(|_| DfsError::NotFound(format!("no file {}", file)))?;
        if !metadata.is_file() {
            return Err(DfsError::NotFound(format!(
                "{} is not a regular file",
                file
            )));
        }

        let mut handle = OpenOptions::new().write(true).open(&local)?;
        handle.seek(SeekFrom::Start(offset))?;
        handle.write_all(data)?;
        Ok(())
    }
}

impl Command for FileStore {
    fn create(&self, path: &Path) -> Result<bool> {
        let _gate = self.gate.lock().expect("store lock poisoned");
        info!("create {}", path);
        if path.is_root() {
            return Ok(false);
        }

        let local = path.to_local(&self.root);
        if local.exists() {
            return Ok(false);
        }
        if let Some(parent) = local.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("failed to create directories for {}: {}", path, e);
                return Ok(false);
            }
        }
        match OpenOptions::new().write(true).create_new(true).open(&local) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => {
                error!("failed to create {}: {}", path, e);
                Ok(false)
            }
        }
    }

    fn delete(&self, path: &Path) -> Result<bool> {
        let _gate = self.gate.lock().expect("store lock poisoned");
        info!("delete {}", path);
        if path.is_root() {
            return Ok(false);
        }

        let local = path.to_local(&self.root);
        let outcome = if local.is_dir() {
            fs::remove_dir_all(&local)
        } else if local.is_file() {
            fs::remove_file(&local)
        } else {
            return Ok(false);
        };
        match outcome {
            Ok(()) => Ok(true),
            Err(e) => {
                error!("failed to delete {}: {}", path, e);
                Ok(false)
            }
        }
    }
}

/// removes every directory under `dir` that no longer contains any files
fn prune(dir: &std::path::Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            let sub = entry.path();
            prune(&sub)?;
            if fs::read_dir(&sub)?.next().is_none() {
                fs::remove_dir(&sub)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn store(dir: &std::path::Path) -> FileStore {
        FileStore {
            root: dir.to_path_buf(),
            gate: Mutex::new(()),
        }
    }

    fn path(s: &str) -> Path {
        s.parse().unwrap()
    }

    #[test]
    fn create_write_read_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        assert!(store.create(&path("/a/b")).unwrap());
        assert!(!store.create(&path("/a/b")).unwrap());
        assert!(!store.create(&path("/")).unwrap());

        store.write(&path("/a/b"), 0, b"hello").unwrap();
        assert_eq!(store.size(&path("/a/b")).unwrap(), 5);
        assert_eq!(store.read(&path("/a/b"), 1, 3).unwrap(), b"ell");

        store.write(&path("/a/b"), 5, b"!").unwrap();
        assert_eq!(store.read(&path("/a/b"), 0, 6).unwrap(), b"hello!");
    }

    #[test]
    fn reads_are_bounds_checked() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create(&path("/f")).unwrap();
        store.write(&path("/f"), 0, b"abc").unwrap();

        assert!(matches!(
            store.read(&path("/f"), 2, 2),
            Err(DfsError::OutOfBounds(_))
        ));
        assert!(matches!(
            store.read(&path("/missing"), 0, 1),
            Err(DfsError::NotFound(_))
        ));
    }

    #[test]
    fn directories_are_not_readable_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create(&path("/d/leaf")).unwrap();

        assert!(matches!(store.size(&path("/d")), Err(DfsError::NotFound(_))));
        assert!(matches!(
            store.write(&path("/d"), 0, b"x"),
            Err(DfsError::NotFound(_))
        ));
    }

    #[test]
    fn delete_removes_files_and_trees() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create(&path("/d/one")).unwrap();
        store.create(&path("/d/sub/two")).unwrap();

        assert!(store.delete(&path("/d/one")).unwrap());
        assert!(!store.delete(&path("/d/one")).unwrap());
        assert!(store.delete(&path("/d")).unwrap());
        assert!(!dir.path().join("d").exists());
        assert!(!store.delete(&path("/")).unwrap());
    }

    #[test]
    fn prune_drops_directories_without_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("empty/nested")).unwrap();
        fs::create_dir_all(dir.path().join("kept")).unwrap();
        File::create(dir.path().join("kept/file")).unwrap();

        prune(dir.path()).unwrap();
        assert!(!dir.path().join("empty").exists());
        assert!(dir.path().join("kept/file").exists());
    }
}
