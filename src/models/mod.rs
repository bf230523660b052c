//! Domain models for Blueprint.
//!
//! # Core Concepts
//!
//! ## Extraction-time tree
//!
//! - [`ParsedBrd`]: The full result of reading a business requirements document.
//!   Nodes are identified by position; ids only appear once a tree has been
//!   read back from the store.
//! - [`Module`] → [`UserStory`] → [`Feature`]: The hierarchy itself.
//! - [`BusinessRule`]: Project-wide rules, stored as one versioned blob.
//!
//! ## Persisted records
//!
//! - [`Project`]: Top-level container owning the hierarchy and config blobs.
//! - [`PersistenceReport`]: Per-item log of a cascading save.
//!
//! ## Enhancement
//!
//! - [`EnhancementResult`]: A single fragment returned by the reconciler, tagged
//!   with the hierarchy level it represents.

pub(crate) mod de;
mod enhancement;
mod hierarchy;
mod project;
mod report;
mod rules;

pub use enhancement::*;
pub use hierarchy::*;
pub use project::*;
pub use report::*;
pub use rules::*;
