//! The naming server: the authoritative map of the filesystem.
//!
//! Each instance of the filesystem is centered on a single naming server. It
//! maintains the directory tree and maps every file path to the storage
//! server hosting that file's content; it stores no file data itself.
//!
//! The naming server provides two remote interfaces. Storage servers use
//! [`Registration`] to join the filesystem, offering their local files to
//! the namespace. Clients use [`Service`] for the filesystem operations
//! proper. Both are reachable on well-known ports, so stubs for them are
//! usually created directly from an address via [`service_stub`] and
//! [`registration_stub`].
//!
//! [`Registration`]: registration/trait.Registration.html
//! [`Service`]: service/trait.Service.html
//! [`service_stub`]: fn.service_stub.html
//! [`registration_stub`]: fn.registration_stub.html

pub mod registration;
pub mod service;

pub use self::registration::{Registration, RegistrationStub};
pub use self::service::{Service, ServiceStub};

use self::registration::RegistrationDispatch;
use self::service::ServiceDispatch;
use crate::error::{DfsError, Result};
use crate::path::Path;
use crate::rmi::skeleton::Skeleton;
use crate::rmi::stub::resolve;
use crate::storage::{Command, CommandStub, StorageStub};
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// the well-known port of the client service interface
pub const SERVICE_PORT: u16 = 6000;

/// the well-known port of the storage registration interface
pub const REGISTRATION_PORT: u16 = 6001;

/// creates a client stub for the naming server running on `hostname`
pub fn service_stub(hostname: &str) -> Result<ServiceStub> {
    ServiceStub::connected_to(resolve(hostname, SERVICE_PORT)?)
}

/// creates a registration stub for the naming server running on `hostname`
pub fn registration_stub(hostname: &str) -> Result<RegistrationStub> {
    RegistrationStub::connected_to(resolve(hostname, REGISTRATION_PORT)?)
}

/// One storage server's two remote handles, as held by the namespace.
///
/// Bindings are values: two are equal when both stubs are equal, so a
/// re-registration of the same server is detectable however the stubs were
/// obtained.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Binding {
    storage: StorageStub,
    command: CommandStub,
}

/// The in-memory namespace.
///
/// A path is in at most one of `directories` and `files`; the root is always
/// a directory. Every proper ancestor of a file is a directory, and every
/// file's binding appears in `servers` with the file in its path set.
struct Namespace {
    directories: BTreeSet<Path>,
    files: BTreeMap<Path, Binding>,
    servers: HashMap<Binding, BTreeSet<Path>>,
}

impl Namespace {
    fn new() -> Namespace {
        let mut directories = BTreeSet::new();
        directories.insert(Path::root());
        Namespace {
            directories,
            files: BTreeMap::new(),
            servers: HashMap::new(),
        }
    }

    /// whether the path is known, as a directory or as a file
    fn contains(&self, path: &Path) -> bool {
        self.directories.contains(path) || self.files.contains_key(path)
    }

    /// whether some proper ancestor of `path` is currently a file
    fn ancestor_is_file(&self, path: &Path) -> bool {
        let mut at = path.clone();
        while let Ok(parent) = at.parent() {
            if self.files.contains_key(&parent) {
                return true;
            }
            at = parent;
        }
        false
    }

    /// Maps `file` to `binding` and closes the namespace over its ancestor
    /// directories. The caller has already ruled out conflicts.
    fn add_file(&mut self, file: Path, binding: Binding) {
        let mut dir = file.parent();
        while let Ok(d) = dir {
            if d.is_root() {
                break;
            }
            dir = d.parent();
            self.directories.insert(d);
        }

        self.servers
            .entry(binding.clone())
            .or_default()
            .insert(file.clone());
        self.files.insert(file, binding);
    }

    /// unmaps a file from both the file table and its binding's path set
    fn remove_file(&mut self, file: &Path) {
        if let Some(binding) = self.files.remove(file) {
            if let Some(hosted) = self.servers.get_mut(&binding) {
                hosted.remove(file);
            }
        }
    }

    /// the names of the immediate children of `directory`
    fn children(&self, directory: &Path) -> Vec<String> {
        let mut names = Vec::new();
        for path in self.directories.iter().chain(self.files.keys()) {
            let is_child = path
                .parent()
                .map(|parent| parent == *directory)
                .unwrap_or(false);
            if is_child {
                if let Ok(name) = path.last() {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// a uniformly random registered binding, if any
    fn random_binding(&self) -> Option<Binding> {
        let bindings: Vec<&Binding> = self.servers.keys().collect();
        bindings
            .choose(&mut rand::thread_rng())
            .map(|binding| (*binding).clone())
    }
}

/// The implementation object behind both of the naming server's skeletons.
struct NamingCore {
    namespace: Mutex<Namespace>,
}

impl NamingCore {
    fn new() -> NamingCore {
        NamingCore {
            namespace: Mutex::new(Namespace::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Namespace> {
        self.namespace.lock().expect("namespace lock poisoned")
    }
}

impl Service for NamingCore {
    fn is_directory(&self, path: &Path) -> Result<bool> {
        let namespace = self.lock();
        if namespace.directories.contains(path) {
            Ok(true)
        } else if namespace.files.contains_key(path) {
            Ok(false)
        } else {
            Err(DfsError::NotFound(format!("no such path {}", path)))
        }
    }

    fn list(&self, directory: &Path) -> Result<Vec<String>> {
        info!("list {}", directory);
        let namespace = self.lock();
        if !namespace.directories.contains(directory) {
            return Err(DfsError::NotFound(format!(
                "{} is not a directory",
                directory
            )));
        }
        Ok(namespace.children(directory))
    }

    fn create_file(&self, file: &Path) -> Result<bool> {
        info!("create file {}", file);
        if file.is_root() {
            return Ok(false);
        }
        let parent = file.parent()?;

        let binding = {
            let namespace = self.lock();
            if !namespace.directories.contains(&parent) {
                return Err(DfsError::NotFound(format!(
                    "{} is not a directory",
                    parent
                )));
            }
            if namespace.contains(file) {
                return Ok(false);
            }
            namespace.random_binding().ok_or_else(|| {
                DfsError::IllegalState("no storage servers are registered".to_string())
            })?
        };

        // the remote creation happens with the namespace unlocked
        if !binding.command.create(file)? {
            return Ok(false);
        }

        let mut namespace = self.lock();
        if namespace.contains(file) {
            // lost a race; the concurrent creator owns the path now
            return Ok(false);
        }
        namespace.add_file(file.clone(), binding);
        Ok(true)
    }

    fn create_directory(&self, directory: &Path) -> Result<bool> {
        info!("create directory {}", directory);
        if directory.is_root() {
            return Ok(false);
        }
        let parent = directory.parent()?;

        let mut namespace = self.lock();
        if !namespace.directories.contains(&parent) {
            return Err(DfsError::NotFound(format!(
                "{} is not a directory",
                parent
            )));
        }
        if namespace.contains(directory) {
            return Ok(false);
        }
        namespace.directories.insert(directory.clone());
        Ok(true)
    }

    fn delete(&self, path: &Path) -> Result<bool> {
        info!("delete {}", path);
        if path.is_root() {
            return Ok(false);
        }

        // Plan the remote work under the lock, then release it for the
        // calls. Files are grouped by binding; each affected server purges
        // its own part of the subtree with a single delete of `path`.
        let (deleting_directory, targets): (bool, Vec<(Binding, Vec<Path>)>) = {
            let namespace = self.lock();
            if let Some(binding) = namespace.files.get(path) {
                (false, vec![(binding.clone(), vec![path.clone()])])
            } else if namespace.directories.contains(path) {
                let mut grouped: HashMap<Binding, Vec<Path>> = HashMap::new();
                for (file, binding) in &namespace.files {
                    if file.is_subpath(path) {
                        grouped.entry(binding.clone()).or_default().push(file.clone());
                    }
                }
                (true, grouped.into_iter().collect())
            } else {
                return Err(DfsError::NotFound(format!("no such path {}", path)));
            }
        };

        let mut all_removed = true;
        let mut first_failure = None;
        for (binding, owned) in targets {
            match binding.command.delete(path) {
                Ok(true) => {
                    let mut namespace = self.lock();
                    for file in &owned {
                        namespace.remove_file(file);
                    }
                }
                Ok(false) => all_removed = false,
                Err(e) => {
                    all_removed = false;
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_failure {
            return Err(e);
        }
        if all_removed && deleting_directory {
            let mut namespace = self.lock();
            let doomed: Vec<Path> = namespace
                .directories
                .iter()
                .filter(|d| d.is_subpath(path))
                .cloned()
                .collect();
            for directory in doomed {
                namespace.directories.remove(&directory);
            }
        }
        Ok(all_removed)
    }

    fn get_storage(&self, file: &Path) -> Result<StorageStub> {
        let namespace = self.lock();
        namespace
            .files
            .get(file)
            .map(|binding| binding.storage.clone())
            .ok_or_else(|| DfsError::NotFound(format!("{} is not a registered file", file)))
    }
}

impl Registration for NamingCore {
    fn register(
        &self,
        storage: StorageStub,
        command: CommandStub,
        files: Vec<Path>,
    ) -> Result<Vec<Path>> {
        info!("registering storage server at {}", storage.address());
        let binding = Binding { storage, command };

        let mut namespace = self.lock();
        if namespace.servers.contains_key(&binding) {
            return Err(DfsError::IllegalState(
                "storage server is already registered".to_string(),
            ));
        }
        namespace.servers.insert(binding.clone(), BTreeSet::new());

        let mut rejected = Vec::new();
        for file in files {
            if file.is_root() {
                continue;
            }
            if namespace.contains(&file) || namespace.ancestor_is_file(&file) {
                rejected.push(file);
            } else {
                namespace.add_file(file, binding.clone());
            }
        }
        Ok(rejected)
    }
}

/// lifecycle of the naming server; it starts at most once
enum Phase {
    Fresh,
    Started,
    Stopped,
}

type StoppedHook = Box<dyn FnMut(Option<&DfsError>) + Send>;

/// The naming server process: the namespace plus the two skeletons serving
/// it.
///
/// # Example
/// ```rust,no_run
/// use dfs::naming::NamingServer;
/// # use dfs::Result;
/// # fn main() -> Result<()> {
/// let server = NamingServer::new()?;
/// server.start()?;
/// // ... serve until told otherwise ...
/// server.stop();
/// # Ok(())
/// # }
/// ```
pub struct NamingServer {
    service: Skeleton<ServiceDispatch<NamingCore>>,
    registration: Skeleton<RegistrationDispatch<NamingCore>>,
    phase: Mutex<Phase>,
    stopped_hook: Mutex<Option<StoppedHook>>,
}

impl NamingServer {
    /// creates a naming server bound to the loopback address on the
    /// well-known ports; the server is not yet started
    pub fn new() -> Result<NamingServer> {
        NamingServer::bound(
            SocketAddr::from((Ipv4Addr::LOCALHOST, SERVICE_PORT)),
            SocketAddr::from((Ipv4Addr::LOCALHOST, REGISTRATION_PORT)),
        )
    }

    /// creates a naming server with explicit service and registration
    /// addresses; port zero requests OS-assigned ports
    pub fn bound(service: SocketAddr, registration: SocketAddr) -> Result<NamingServer> {
        let core = Arc::new(NamingCore::new());
        let service = Skeleton::bound(
            service::descriptor(),
            ServiceDispatch::new(Arc::clone(&core)),
            service,
        )?;
        let registration = Skeleton::bound(
            registration::descriptor(),
            RegistrationDispatch::new(Arc::clone(&core)),
            registration,
        )?;

        Ok(NamingServer {
            service,
            registration,
            phase: Mutex::new(Phase::Fresh),
            stopped_hook: Mutex::new(None),
        })
    }

    /// Starts both skeletons, making the namespace remotely accessible.
    ///
    /// # Errors
    /// returns [`DfsError::IllegalState`] if the server was ever started or
    /// stopped before; a skeleton startup failure is propagated after firing
    /// the stopped hook with it as the cause
    pub fn start(&self) -> Result<()> {
        let mut phase = self.phase.lock().expect("phase lock poisoned");
        match *phase {
            Phase::Fresh => {}
            _ => {
                return Err(DfsError::IllegalState(
                    "naming server can only be started once".to_string(),
                ))
            }
        }

        if let Err(e) = self
            .registration
            .start()
            .and_then(|_| self.service.start())
        {
            *phase = Phase::Stopped;
            drop(phase);
            self.registration.stop();
            self.fire_stopped(Some(&e));
            return Err(e);
        }

        *phase = Phase::Started;
        info!(
            "naming server started, service on {:?}, registration on {:?}",
            self.service.address(),
            self.registration.address()
        );
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
        self.registration.stop();
        self.service.stop();
        self.fire_stopped(None);
    }

    /// installs a hook observing shutdown; the cause is `None` when the stop
    /// was requested by the user
    pub fn on_stopped(&self, hook: impl FnMut(Option<&DfsError>) + Send + 'static) {
        *self.stopped_hook.lock().expect("hook lock poisoned") = Some(Box::new(hook));
    }

    /// the address of the client service skeleton
    pub fn service_address(&self) -> Option<SocketAddr> {
        self.service.address()
    }

    /// the address of the storage registration skeleton
    pub fn registration_address(&self) -> Option<SocketAddr> {
        self.registration.address()
    }

    /// a client stub for this server's [`Service`] interface
    pub fn service_stub(&self) -> Result<ServiceStub> {
        ServiceStub::of_skeleton(&self.service)
    }

    /// a stub storage servers can use to register with this server
    pub fn registration_stub(&self) -> Result<RegistrationStub> {
        RegistrationStub::of_skeleton(&self.registration)
    }

    fn fire_stopped(&self, cause: Option<&DfsError>) {
        match cause {
            Some(e) => error!("naming server stopped abnormally: {}", e),
            None => info!("naming server stopped"),
        }
        if let Some(hook) = self.stopped_hook.lock().expect("hook lock poisoned").as_mut() {
            hook(cause);
        }
    }
}
