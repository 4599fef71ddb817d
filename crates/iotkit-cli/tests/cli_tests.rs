//! Command workflow tests for fldtctl

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn fldtctl() -> Result<Command, Box<dyn std::error::Error>> {
    Ok(Command::cargo_bin("fldtctl")?)
}

fn json_output(output: &[u8]) -> Result<Value, Box<dyn std::error::Error>> {
    Ok(serde_json::from_slice(output)?)
}

fn keygen(dir: &Path, name: &str) -> TestResult {
    fldtctl()?
        .args(["keygen", "--json"])
        .arg(dir.join(name))
        .assert()
        .success();
    Ok(())
}

fn sign(dir: &Path, image_len: usize, version: &str, key: &str) -> TestResult {
    let image = dir.join("image.bin");
    std::fs::write(&image, vec![0x42u8; image_len])?;
    fldtctl()?
        .arg("sign")
        .arg(&image)
        .arg("--key")
        .arg(dir.join(format!("{}.key", key)))
        .args(["--version", version, "--out"])
        .arg(dir.join("image.fldt"))
        .assert()
        .success();
    Ok(())
}

#[test]
fn test_keygen_refuses_overwrite() -> TestResult {
    let dir = TempDir::new()?;
    keygen(dir.path(), "release")?;
    assert!(dir.path().join("release.key").exists());
    assert!(dir.path().join("release.pub").exists());

    fldtctl()?
        .arg("keygen")
        .arg(dir.path().join("release"))
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--force"));
    Ok(())
}

#[test]
fn test_sign_then_inspect() -> TestResult {
    let dir = TempDir::new()?;
    keygen(dir.path(), "release")?;
    sign(dir.path(), 2000, "1.2.0", "release")?;

    let output = fldtctl()?
        .args(["inspect", "--json"])
        .arg(dir.path().join("image.fldt"))
        .arg("--trust")
        .arg(dir.path().join("release.pub"))
        .output()?;
    assert!(output.status.success());

    let report = json_output(&output.stdout)?;
    assert_eq!(report["result"]["version"], "1.2.0");
    assert_eq!(report["result"]["firmware_length"], 2000);
    assert_eq!(report["result"]["manufacturer"], "ACME0000");
    assert_eq!(report["result"]["signatures"].as_array().map(Vec::len), Some(1));
    assert_eq!(report["result"]["content_matches"], true);
    Ok(())
}

#[test]
fn test_inspect_rejects_modified_image() -> TestResult {
    let dir = TempDir::new()?;
    keygen(dir.path(), "release")?;
    sign(dir.path(), 256, "1.0.0", "release")?;

    let package = dir.path().join("image.fldt");
    let mut bytes = std::fs::read(&package)?;
    if let Some(byte) = bytes.first_mut() {
        *byte ^= 0xff;
    }
    std::fs::write(&package, &bytes)?;

    fldtctl()?
        .arg("inspect")
        .arg(&package)
        .arg("--trust")
        .arg(dir.path().join("release.pub"))
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("signed digest"));
    Ok(())
}

#[test]
fn test_inspect_with_untrusted_key_fails() -> TestResult {
    let dir = TempDir::new()?;
    keygen(dir.path(), "release")?;
    keygen(dir.path(), "other")?;
    sign(dir.path(), 100, "1.0.0", "release")?;

    fldtctl()?
        .arg("inspect")
        .arg(dir.path().join("image.fldt"))
        .arg("--trust")
        .arg(dir.path().join("other.pub"))
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("not trusted"));
    Ok(())
}

#[test]
fn test_simulate_lossy_transfer_installs() -> TestResult {
    let dir = TempDir::new()?;
    keygen(dir.path(), "release")?;
    sign(dir.path(), 4000, "2.0.0", "release")?;

    let config = dir.path().join("fldt.json");
    std::fs::write(&config, r#"{ "client": { "retry_limit": 8 } }"#)?;

    let output = fldtctl()?
        .args(["simulate", "--json", "--loss", "0.2", "--seed", "7"])
        .arg(dir.path().join("image.fldt"))
        .arg("--trust")
        .arg(dir.path().join("release.pub"))
        .arg("--config")
        .arg(&config)
        .output()?;
    assert!(output.status.success());

    let report = json_output(&output.stdout)?;
    assert_eq!(report["result"]["outcome"], "installed v2.0.0");
    assert_eq!(report["result"]["bytes_received"], 4000);
    Ok(())
}

#[test]
fn test_simulate_rejects_untrusted_package() -> TestResult {
    let dir = TempDir::new()?;
    keygen(dir.path(), "release")?;
    keygen(dir.path(), "other")?;
    sign(dir.path(), 600, "1.0.0", "release")?;

    fldtctl()?
        .arg("simulate")
        .arg(dir.path().join("image.fldt"))
        .arg("--trust")
        .arg(dir.path().join("other.pub"))
        .assert()
        .failure()
        .code(4);
    Ok(())
}

#[test]
fn test_inspect_plain_file_fails() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("plain.bin");
    std::fs::write(&path, [0u8; 16])?;

    fldtctl()?
        .arg("inspect")
        .arg(&path)
        .assert()
        .failure()
        .code(3);
    Ok(())
}
