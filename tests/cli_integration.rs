//! CLI integration tests
//!
//! Tests the command-line interface end-to-end.

use image::{Rgba, RgbaImage};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

const SECRET: &str = "Tr0ub4dor&3";

/// Run fractured-key with passphrase from stdin
fn run_with_passphrase(
    args: &[&str],
    passphrase: &str,
) -> Result<std::process::Output, std::io::Error> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_fractured-key"))
        .arg("--passphrase-stdin")
        .args(args)
        .env("RUST_LOG", "fractured_key=warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    {
        let stdin = child.stdin.as_mut().expect("failed to open stdin");
        // Ignore BrokenPipe errors - the command may exit before reading stdin
        // if it encounters an error (e.g., bad arguments)
        let _ = stdin.write_all(passphrase.as_bytes());
    }

    child.wait_with_output()
}

fn write_carrier(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    RgbaImage::from_fn(64, 64, |x, y| {
        Rgba([(x * 3) as u8, (y * 5) as u8, (x * y) as u8, 255])
    })
    .save(&path)
    .unwrap();
    path
}

fn write_secret(dir: &Path) -> PathBuf {
    let path = dir.join("secret.txt");
    fs::write(&path, SECRET).unwrap();
    path
}

fn s(path: &Path) -> &str {
    path.to_str().unwrap()
}

/// Encrypt into three carriers in `dir`, returning the stego image paths.
fn encrypt_three(dir: &Path, passphrase: &str) -> Vec<PathBuf> {
    let secret = write_secret(dir);
    let carriers: Vec<PathBuf> = ["a.png", "b.png", "c.png"]
        .iter()
        .map(|name| write_carrier(dir, name))
        .collect();

    let result = run_with_passphrase(
        &[
            "encrypt",
            "--secret-file",
            s(&secret),
            "--carrier",
            s(&carriers[0]),
            "--carrier",
            s(&carriers[1]),
            "--carrier",
            s(&carriers[2]),
        ],
        passphrase,
    )
    .unwrap();

    assert!(
        result.status.success(),
        "encrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("Salt: "));
    assert!(stderr.contains("Auth Tag: "));

    vec![
        dir.join("a_stego_1.png"),
        dir.join("b_stego_2.png"),
        dir.join("c_stego_3.png"),
    ]
}

#[test]
fn test_encrypt_decrypt_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let stego = encrypt_three(temp_dir.path(), "test\n");
    for path in &stego {
        assert!(path.exists(), "missing {}", path.display());
    }

    for (a, b) in [(0, 1), (1, 2), (2, 0)] {
        let result = run_with_passphrase(
            &["decrypt", "--image", s(&stego[a]), "--image", s(&stego[b])],
            "test\n",
        )
        .unwrap();

        assert!(
            result.status.success(),
            "decrypt failed: {}",
            String::from_utf8_lossy(&result.stderr)
        );
        assert_eq!(String::from_utf8_lossy(&result.stdout), SECRET);
    }
}

#[test]
fn test_decrypt_to_output_file() {
    let temp_dir = TempDir::new().unwrap();
    let stego = encrypt_three(temp_dir.path(), "test");
    let output = temp_dir.path().join("recovered.txt");

    let result = run_with_passphrase(
        &[
            "d",
            "-i",
            s(&stego[0]),
            "-i",
            s(&stego[2]),
            "-o",
            s(&output),
        ],
        "test",
    )
    .unwrap();

    assert!(
        result.status.success(),
        "decrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    assert!(result.stdout.is_empty());
    assert_eq!(fs::read_to_string(&output).unwrap(), SECRET);
}

#[test]
fn test_decrypt_with_one_image_fails() {
    let temp_dir = TempDir::new().unwrap();
    let stego = encrypt_three(temp_dir.path(), "test");

    let result = run_with_passphrase(&["decrypt", "--image", s(&stego[1])], "test").unwrap();

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("need at least 2 fragments, got 1"), "stderr: {}", stderr);
    assert!(result.stdout.is_empty());
}

#[test]
fn test_decrypt_wrong_passphrase() {
    let temp_dir = TempDir::new().unwrap();
    let stego = encrypt_three(temp_dir.path(), "correct");

    let result = run_with_passphrase(
        &["decrypt", "--image", s(&stego[0]), "--image", s(&stego[1])],
        "wrong",
    )
    .unwrap();

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(
        stderr.contains("corrupt input, tampered-with data, or bad passphrase"),
        "stderr: {}",
        stderr
    );
}

#[test]
fn test_missing_carrier_warns() {
    let temp_dir = TempDir::new().unwrap();
    let secret = write_secret(temp_dir.path());
    let carrier = write_carrier(temp_dir.path(), "only.png");

    let result = run_with_passphrase(
        &["encrypt", "--secret-file", s(&secret), "--carrier", s(&carrier)],
        "test",
    )
    .unwrap();

    assert!(
        result.status.success(),
        "encrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("WARNING: only 1 of 3 fragments"), "stderr: {}", stderr);
    assert!(stderr.contains("cannot be recovered"), "stderr: {}", stderr);
    assert!(temp_dir.path().join("only_stego_1.png").exists());
}

#[test]
fn test_explicit_output_paths() {
    let temp_dir = TempDir::new().unwrap();
    let secret = write_secret(temp_dir.path());
    let a = write_carrier(temp_dir.path(), "a.png");
    let b = write_carrier(temp_dir.path(), "b.png");
    let out_a = temp_dir.path().join("first.png");

    let result = run_with_passphrase(
        &[
            "encrypt",
            "--secret-file",
            s(&secret),
            "--total",
            "2",
            "--carrier",
            s(&a),
            "--output",
            s(&out_a),
            "--carrier",
            s(&b),
        ],
        "test",
    )
    .unwrap();

    assert!(
        result.status.success(),
        "encrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    let out_b = temp_dir.path().join("b_stego_2.png");
    assert!(out_a.exists());
    assert!(out_b.exists());

    let result = run_with_passphrase(
        &["decrypt", "--image", s(&out_b), "--image", s(&out_a)],
        "test",
    )
    .unwrap();
    assert!(result.status.success());
    assert_eq!(String::from_utf8_lossy(&result.stdout), SECRET);
}

#[test]
fn test_single_file_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let secret = write_secret(temp_dir.path());
    let blob = temp_dir.path().join("encrypted_output.bin");
    let recovered = temp_dir.path().join("recovered.txt");

    let result = run_with_passphrase(
        &[
            "encrypt",
            "--secret-file",
            s(&secret),
            "--single-file",
            s(&blob),
        ],
        "test",
    )
    .unwrap();
    assert!(
        result.status.success(),
        "encrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    assert!(fs::metadata(&blob).unwrap().len() >= 28);

    let result = run_with_passphrase(
        &["decrypt-blob", "-i", s(&blob), "-o", s(&recovered)],
        "test",
    )
    .unwrap();
    assert!(
        result.status.success(),
        "decrypt-blob failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    assert_eq!(fs::read_to_string(&recovered).unwrap(), SECRET);
}

#[test]
fn test_decrypt_blob_too_small() {
    let temp_dir = TempDir::new().unwrap();
    let blob = temp_dir.path().join("tiny.bin");
    fs::write(&blob, [0u8; 20]).unwrap();

    let result = run_with_passphrase(&["decrypt-blob", "-i", s(&blob)], "test").unwrap();

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("too small"), "stderr: {}", stderr);
}

#[test]
fn test_threshold_above_total_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let secret = write_secret(temp_dir.path());
    let carrier = write_carrier(temp_dir.path(), "a.png");

    let result = run_with_passphrase(
        &[
            "encrypt",
            "--secret-file",
            s(&secret),
            "--carrier",
            s(&carrier),
            "--total",
            "2",
            "--threshold",
            "3",
        ],
        "test",
    )
    .unwrap();

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("threshold 3 exceeds"), "stderr: {}", stderr);
}

#[test]
fn test_empty_passphrase_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let secret = write_secret(temp_dir.path());
    let blob = temp_dir.path().join("out.bin");

    let result = run_with_passphrase(
        &[
            "encrypt",
            "--secret-file",
            s(&secret),
            "--single-file",
            s(&blob),
        ],
        "\n",
    )
    .unwrap();

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("please enter a master passphrase"), "stderr: {}", stderr);
    assert!(!blob.exists());
}

#[test]
fn test_missing_input_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nonexistent.bin");

    let result = run_with_passphrase(&["decrypt-blob", "-i", s(&missing)], "test").unwrap();

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("failed to read from"), "stderr: {}", stderr);
}

#[test]
fn test_single_fragment_total_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let secret = write_secret(temp_dir.path());
    let carrier = write_carrier(temp_dir.path(), "a.png");

    let result = run_with_passphrase(
        &[
            "encrypt",
            "--secret-file",
            s(&secret),
            "--carrier",
            s(&carrier),
            "--total",
            "1",
            "--threshold",
            "1",
        ],
        "test",
    )
    .unwrap();

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("total must be at least 2"), "stderr: {}", stderr);
    assert!(!temp_dir.path().join("a_stego_1.png").exists());
}

#[test]
fn test_same_image_twice_is_insufficient() {
    let temp_dir = TempDir::new().unwrap();
    let stego = encrypt_three(temp_dir.path(), "test");

    let result = run_with_passphrase(
        &["decrypt", "--image", s(&stego[0]), "--image", s(&stego[0])],
        "test",
    )
    .unwrap();

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(
        stderr.contains("need at least 2 distinct fragments, got 1"),
        "stderr: {}",
        stderr
    );
    assert!(result.stdout.is_empty());
}

#[test]
fn test_single_file_gets_default_extension() {
    let temp_dir = TempDir::new().unwrap();
    let secret = write_secret(temp_dir.path());
    let blob = temp_dir.path().join("vault");

    let result = run_with_passphrase(
        &[
            "encrypt",
            "--secret-file",
            s(&secret),
            "--single-file",
            s(&blob),
        ],
        "test",
    )
    .unwrap();

    assert!(
        result.status.success(),
        "encrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    assert!(!blob.exists());
    assert!(temp_dir.path().join("vault.bin").exists());
}
