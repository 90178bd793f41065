//! Local install ledger
//!
//! Node-local record of which shims this installer placed, keyed by shim
//! name. Stored as JSON under the install root:
//!
//! ```json
//! {"shims": {"spin-v2": {"sha256": "<hex>", "path": "/opt/rcm/bin/containerd-shim-spin-v2"}}}
//! ```

use crate::error::{InstallerError, Result};
use crate::host::HostFs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const LEDGER_FILE_NAME: &str = "shim-ledger.json";

/// Installed shim: content digest and host path of the binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimEntry {
    #[serde(with = "hex_digest")]
    pub sha256: [u8; 32],
    pub path: PathBuf,
}

mod hex_digest {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(digest: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(digest))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut digest = [0u8; 32];
        hex::decode_to_slice(&s, &mut digest)
            .map_err(|e| serde::de::Error::custom(format!("error decoding sha256: {}", e)))?;
        Ok(digest)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    #[serde(default)]
    shims: BTreeMap<String, ShimEntry>,
}

pub struct Ledger<'a> {
    host: &'a HostFs,
    file_path: PathBuf,
    shims: BTreeMap<String, ShimEntry>,
}

impl<'a> Ledger<'a> {
    /// Host path of the ledger for an install root
    pub fn file_path(install_root: &Path) -> PathBuf {
        install_root.join(LEDGER_FILE_NAME)
    }

    /// Read the ledger; a missing file is an empty ledger.
    pub fn load(host: &'a HostFs, install_root: &Path) -> Result<Self> {
        let file_path = Self::file_path(install_root);

        let shims = match host.read(&file_path) {
            Ok(content) => {
                let doc: LedgerDocument = serde_json::from_slice(&content).map_err(|e| {
                    InstallerError::Ledger(format!(
                        "Failed to parse {}: {}",
                        file_path.display(),
                        e
                    ))
                })?;
                doc.shims
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("[Ledger] No ledger at {}, starting empty", file_path.display());
                BTreeMap::new()
            }
            Err(e) => {
                return Err(InstallerError::Ledger(format!(
                    "Failed to read {}: {}",
                    file_path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            host,
            file_path,
            shims,
        })
    }

    pub fn get(&self, name: &str) -> Option<&ShimEntry> {
        self.shims.get(name)
    }

    pub fn shims(&self) -> &BTreeMap<String, ShimEntry> {
        &self.shims
    }

    /// True when nothing is recorded for `name`, or the digest or path differ.
    pub fn changed(&self, name: &str, sha256: &[u8; 32], path: &Path) -> bool {
        match self.shims.get(name) {
            None => true,
            Some(entry) => entry.sha256 != *sha256 || entry.path != path,
        }
    }

    pub fn put(&mut self, name: &str, entry: ShimEntry) {
        self.shims.insert(name.to_string(), entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<ShimEntry> {
        self.shims.remove(name)
    }

    /// Persist the whole ledger in one replace.
    pub fn write(&self) -> Result<()> {
        let doc = LedgerDocument {
            shims: self.shims.clone(),
        };
        let out = serde_json::to_string_pretty(&doc)
            .map_err(|e| InstallerError::Ledger(format!("Failed to serialize ledger: {}", e)))?;

        tracing::info!("[Ledger] Writing {}: {}", self.file_path.display(), out);

        self.host
            .write_atomic(&self.file_path, out.as_bytes())
            .map_err(|e| {
                InstallerError::Ledger(format!(
                    "Failed to write {}: {}",
                    self.file_path.display(),
                    e
                ))
            })
    }
}
