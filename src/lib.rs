//! Problem archive engine
//!
//! Exports online-judge problem definitions (metadata, grading pipeline,
//! test data, checker and scoring code, trial assets) into a portable,
//! content-addressed zip container and imports them back, possibly into a
//! different course, with component selection, integrity verification and
//! rollback on failure.

pub mod batch;
pub mod component;
pub mod config;
pub mod error;
pub mod manifest;
pub mod meta;
pub mod mock;
pub mod reader;
pub mod store;
pub mod writer;

pub use batch::{ImportFailure, ImportOutcome, ImportRequest, ProblemArchiveService};
pub use component::{ComponentFilter, ComponentId, SettingsGroup};
pub use config::{ArchiveConfig, ArchiveLimits, EffectiveConfig};
pub use error::{ArchiveError, ErrorKind, Result, StorageError, ValidationError};
pub use manifest::{BatchManifest, Manifest};
pub use meta::ProblemMeta;
pub use reader::{verify_archive, ArchiveReader, Container, ImportedProblem, VerifyReport};
pub use store::{Caller, CourseDirectory, ObjectStore, ProblemStore};
pub use writer::{ArchiveWriter, ExportedArchive};
