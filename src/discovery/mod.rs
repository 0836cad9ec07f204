//! Candidate module discovery
//!
//! - `manifest`: producer manifests and their entrypoints
//! - `prober`: capability check, adoption and entrypoint invocation
//! - `quarantine`: hash-verified, non-destructive pruning

mod manifest;
mod prober;
mod quarantine;

pub use manifest::{load_manifest, Entrypoint, ProducerManifest, WELL_KNOWN_ENTRYPOINTS};
pub use prober::{discover_modules, invoke_adopted, AdoptedModule, Discovery, ModuleOutput};
pub use quarantine::{file_sha256, quarantine_module};
