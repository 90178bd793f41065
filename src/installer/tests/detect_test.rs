//! Tests for distribution detection

mod common;

use common::*;
use node_installer::detect::resolve;
use node_installer::preset::{K0S_CONFIG_PATH, K3S_CONFIG_PATH, MICROK8S_CONFIG_PATH};
use node_installer::{Distro, InstallerError, Preset};
use std::path::{Path, PathBuf};

#[test]
fn test_detects_each_known_distro() {
    for (signature, expected) in [
        (MICROK8S_CONFIG, Preset::microk8s()),
        (RKE2_BASE_CONFIG, Preset::rke2()),
        (K3S_BASE_CONFIG, Preset::k3s()),
        (K0S_SIGNATURE, Preset::k0s()),
        (DEFAULT_CONFIG, Preset::default_preset()),
    ] {
        let fixture = FixtureHost::with_files(&[signature]);
        let preset = resolve(&fixture.host(), None).unwrap();
        assert_eq!(preset, expected, "wrong preset for {}", signature);
    }
}

#[test]
fn test_k3s_preset_points_at_template() {
    let fixture = FixtureHost::with_files(&[K3S_BASE_CONFIG]);
    let preset = resolve(&fixture.host(), None).unwrap();

    assert_eq!(preset.distro, Distro::K3s);
    assert!(preset
        .config_path
        .ends_with("k3s/agent/etc/containerd/config.toml.tmpl"));
}

#[test]
fn test_distro_location_wins_over_default() {
    let fixture = FixtureHost::with_files(&[DEFAULT_CONFIG, K3S_BASE_CONFIG]);
    let preset = resolve(&fixture.host(), None).unwrap();
    assert_eq!(preset.distro, Distro::K3s);
}

#[test]
fn test_undetectable_names_every_probe() {
    let fixture = FixtureHost::with_files(&["/etc/unrelated.conf"]);
    let err = resolve(&fixture.host(), None).unwrap_err();

    match &err {
        InstallerError::DistroUndetectable { probes } => assert_eq!(probes.len(), 5),
        other => panic!("unexpected error: {other:?}"),
    }
    let message = err.to_string();
    for probed in [
        MICROK8S_CONFIG,
        RKE2_BASE_CONFIG,
        K3S_BASE_CONFIG,
        K0S_SIGNATURE,
        DEFAULT_CONFIG,
    ] {
        assert!(message.contains(probed), "{} missing from {}", probed, message);
    }
}

#[test]
fn test_override_with_known_signature() {
    // The override is honoured even though the host only has the default file.
    let fixture = FixtureHost::with_files(&[DEFAULT_CONFIG]);
    let preset = resolve(&fixture.host(), Some(Path::new(MICROK8S_CONFIG_PATH))).unwrap();
    assert_eq!(preset, Preset::microk8s());

    let preset = resolve(&fixture.host(), Some(Path::new(K0S_SIGNATURE))).unwrap();
    assert_eq!(preset.distro, Distro::K0s);
    assert_eq!(preset.config_path, PathBuf::from(K0S_CONFIG_PATH));
}

#[test]
fn test_override_unknown_path_falls_back_to_default() {
    let fixture = FixtureHost::with_files(&[DEFAULT_CONFIG]);
    let custom = Path::new("/etc/containerd/not_found.toml");
    let preset = resolve(&fixture.host(), Some(custom)).unwrap();

    assert_eq!(preset, Preset::default_preset().with_config_path(custom));
    assert_ne!(preset.config_path, PathBuf::from(K3S_CONFIG_PATH));
}
