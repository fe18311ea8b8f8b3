//! Bundle packaging: installation, storage layout, archives and locking.

pub mod archive;
pub mod bundle;
pub mod cache;
pub mod descriptor;
pub mod install;
pub mod lock;
pub mod manifest;
pub mod store;

pub use archive::{ArchiveInput, Archiver, Unarchiver};
pub use bundle::{Bundle, VerifyProblem, VerifyReport};
pub use cache::{Cache, CachedBundle};
pub use descriptor::{ContextPattern, Descriptor, FileSelector};
pub use install::Installer;
pub use lock::{FileLock, lock_file};
pub use manifest::{DependencyRef, Manifest};
pub use store::find_bundle_directory;
