#![forbid(unsafe_code)]

//! # qpub
//!
//! Opinionated configuration for Python projects. qpub scans a directory of
//! Python modules, notebooks and markup, infers packaging metadata and writes
//! the configuration files that packaging, documentation and lint tools read.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use qpub::{Artifact, Projector, Repository, Settings, SystemShell};
//!
//! fn main() -> qpub::Result<()> {
//!     let root = Path::new(".");
//!     let settings = Settings::resolve(root)?;
//!     let repo = Repository::open(root, &settings)?;
//!     let projector = Projector::new(&repo, &settings, &SystemShell);
//!
//!     for path in projector.write(Artifact::Requirements)? {
//!         println!("wrote {}", path.display());
//!     }
//!     Ok(())
//! }
//! ```

pub mod chapter;
pub mod commands;
pub mod config;
pub mod conventions;
pub mod error;
pub mod files;
pub mod git;
pub mod harvest;
pub mod ignore;
pub mod logging;
pub mod metadata;
pub mod names;
pub mod project;
pub mod session;
pub mod shell;
pub mod tasks;

// Re-exports
pub use chapter::{Chapter, Repository};
pub use config::{Backend, DocsBuilder, InstallBackend, Settings};
pub use conventions::Convention;
pub use error::{QpubError, Result};
pub use files::{Content, File, Format};
pub use git::{GitRepository, Vcs};
pub use harvest::{Harvester, Imports};
pub use ignore::IgnoreMatcher;
pub use metadata::{Metadata, MetadataExtractor};
pub use project::{Artifact, Projector, Rendered};
pub use session::{Session, Verb};
pub use shell::{CommandSpec, Output, RecordingShell, Shell, SystemShell};
pub use tasks::{Catalog, Report, Runner, Task, TaskDb, TaskParams, TaskState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
