//! Tests for the install ledger

mod common;

use common::*;
use node_installer::{InstallerError, Ledger, ShimEntry};
use std::path::{Path, PathBuf};

const INSTALL_ROOT: &str = "/opt/rcm";

fn entry(byte: u8, path: &str) -> ShimEntry {
    ShimEntry {
        sha256: [byte; 32],
        path: PathBuf::from(path),
    }
}

#[test]
fn test_missing_ledger_is_empty() {
    let fixture = FixtureHost::new();
    let host = fixture.host();
    let ledger = Ledger::load(&host, Path::new(INSTALL_ROOT)).unwrap();

    assert!(ledger.shims().is_empty());
    assert!(ledger.get("spin-v2").is_none());
}

#[test]
fn test_write_then_load() {
    let fixture = FixtureHost::new();
    let host = fixture.host();

    let mut ledger = Ledger::load(&host, Path::new(INSTALL_ROOT)).unwrap();
    ledger.put("spin-v2", entry(0xab, "/opt/rcm/bin/containerd-shim-spin-v2"));
    ledger.write().unwrap();

    let reloaded = Ledger::load(&host, Path::new(INSTALL_ROOT)).unwrap();
    assert_eq!(
        reloaded.get("spin-v2"),
        Some(&entry(0xab, "/opt/rcm/bin/containerd-shim-spin-v2"))
    );
}

#[test]
fn test_ledger_file_format() {
    let fixture = FixtureHost::new();
    let host = fixture.host();

    let mut ledger = Ledger::load(&host, Path::new(INSTALL_ROOT)).unwrap();
    ledger.put("spin-v2", entry(0x01, "/opt/rcm/bin/containerd-shim-spin-v2"));
    ledger.write().unwrap();

    let raw = fixture.read("/opt/rcm/shim-ledger.json");
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        json["shims"]["spin-v2"]["sha256"],
        serde_json::Value::String("01".repeat(32))
    );
    assert_eq!(
        json["shims"]["spin-v2"]["path"],
        "/opt/rcm/bin/containerd-shim-spin-v2"
    );
}

#[test]
fn test_changed_semantics() {
    let fixture = FixtureHost::new();
    let host = fixture.host();
    let path = Path::new("/opt/rcm/bin/containerd-shim-spin-v2");

    let mut ledger = Ledger::load(&host, Path::new(INSTALL_ROOT)).unwrap();
    assert!(ledger.changed("spin-v2", &[7; 32], path));

    ledger.put("spin-v2", entry(7, "/opt/rcm/bin/containerd-shim-spin-v2"));
    assert!(!ledger.changed("spin-v2", &[7; 32], path));
    assert!(ledger.changed("spin-v2", &[8; 32], path));
    assert!(ledger.changed("spin-v2", &[7; 32], Path::new("/usr/local/bin/spin")));
}

#[test]
fn test_remove_entry() {
    let fixture = FixtureHost::new();
    let host = fixture.host();

    let mut ledger = Ledger::load(&host, Path::new(INSTALL_ROOT)).unwrap();
    ledger.put("spin-v2", entry(1, "/opt/rcm/bin/containerd-shim-spin-v2"));
    ledger.put("slight-v1", entry(2, "/opt/rcm/bin/containerd-shim-slight-v1"));
    ledger.write().unwrap();

    let mut ledger = Ledger::load(&host, Path::new(INSTALL_ROOT)).unwrap();
    assert!(ledger.remove("spin-v2").is_some());
    ledger.write().unwrap();

    let reloaded = Ledger::load(&host, Path::new(INSTALL_ROOT)).unwrap();
    assert!(reloaded.get("spin-v2").is_none());
    assert!(reloaded.get("slight-v1").is_some());
}

#[test]
fn test_corrupt_ledger_is_an_error() {
    let fixture = FixtureHost::new();
    fixture.write("/opt/rcm/shim-ledger.json", "{not json");
    let host = fixture.host();

    let result = Ledger::load(&host, Path::new(INSTALL_ROOT));
    assert!(matches!(result, Err(InstallerError::Ledger(_))));
}
