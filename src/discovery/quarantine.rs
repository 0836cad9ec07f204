//! Non-destructive pruning
//!
//! Unusable candidates are moved under the quarantine directory, keeping
//! their relative layout. The content hash is checked on both sides of the
//! move; a file is never deleted unless an identical copy already exists at
//! the destination.

use crate::context::RunContext;
use crate::errors::{GateError, GateResult};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Hex SHA-256 of a file's content
pub fn file_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// First free destination: `path`, then `path.1`, `path.2`, ...
fn free_destination(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (1u32..)
        .map(|i| path.with_file_name(format!("{}.{}", name, i)))
        .find(|p| !p.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Move `source` into quarantine and return its new location.
///
/// `ProtectedPath` is returned if either side of the move lies in a
/// protected directory. Every other failure is a `Quarantine` error and
/// leaves the source in place.
pub fn quarantine_module(ctx: &RunContext, source: &Path) -> GateResult<PathBuf> {
    let root = ctx.root();
    ctx.protected().guard(root, source)?;

    let rel = ctx.rel(source);
    let target = free_destination(&ctx.resolve(&ctx.config().paths.quarantine).join(&rel));
    ctx.protected().guard(root, &target)?;

    let fail = |detail: String| GateError::Quarantine {
        path: source.to_path_buf(),
        detail,
    };

    let before = file_sha256(source).map_err(|e| fail(format!("hash before move: {}", e)))?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| fail(format!("create {}: {}", parent.display(), e)))?;
    }

    match fs::rename(source, &target) {
        Ok(()) => {
            let after = file_sha256(&target).map_err(|e| fail(format!("hash after move: {}", e)))?;
            if after != before {
                // Put it back so the original stays where it was
                let _ = fs::rename(&target, source);
                return Err(fail("content hash changed during move".to_string()));
            }
        }
        Err(rename_err) => {
            debug!(
                "rename {} failed ({}), copying instead",
                source.display(),
                rename_err
            );
            copy_verify_remove(source, &target, &before).map_err(|e| {
                fail(format!("rename failed ({}), copy failed ({})", rename_err, e))
            })?;
        }
    }

    debug!("Quarantined {} -> {}", source.display(), target.display());
    Ok(target)
}

fn copy_verify_remove(source: &Path, target: &Path, expected: &str) -> Result<(), String> {
    fs::copy(source, target).map_err(|e| e.to_string())?;
    let copied = file_sha256(target).map_err(|e| e.to_string())?;
    if copied != expected {
        let _ = fs::remove_file(target);
        return Err("copied content hash differs".to_string());
    }
    fs::remove_file(source).map_err(|e| e.to_string())
}
