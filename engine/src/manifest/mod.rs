//! Manifest Store
//!
//! Typed access to the dependency manifest (composer.json) and its resolved
//! lock snapshot (composer.lock). The manifest is kept as an ordered JSON
//! object so sections the engine never touches round-trip unchanged.

pub mod store;
pub mod types;

pub use store::{render_manifest, ManifestStore};
pub use types::{Classification, LockPackage, LockSnapshot, Manifest, PackageEntry};
