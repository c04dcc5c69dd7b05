//! Golden test vector validation
//!
//! Each vector pins the full encrypt chain: the passphrase-sealed secret
//! blob, the packaged cipher produced under a fixed ephemeral key, and the
//! envelope carrying one fragment of that key.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use fractured_key::blob::SecretBlob;
use fractured_key::envelope;
use fractured_key::keywrap::{self, EphemeralKey};
use fractured_key::vault;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct GoldenVector {
    comment: String,
    plaintext: String,
    passphrase: String,
    salt: String,
    nonce: String,
    blob: String,
    ephemeral_key: String,
    wrap_nonce: String,
    packaged_cipher: String,
    fragment: String,
    index: u8,
    total: u8,
    threshold: u8,
    envelope: String,
}

fn load_golden_vectors() -> Result<Vec<GoldenVector>, serde_json::Error> {
    let json_data = include_str!("../testdata/golden-vectors.json");
    serde_json::from_str(json_data)
}

fn decode(field: &str) -> Vec<u8> {
    BASE64_STANDARD
        .decode(field)
        .unwrap_or_else(|e| panic!("failed to decode {:?}: {}", field, e))
}

/// Check one vector, returning a description of the first mismatch.
fn check_vector(vector: &GoldenVector) -> Result<(), String> {
    let plaintext = decode(&vector.plaintext);
    let passphrase = decode(&vector.passphrase);
    let salt: [u8; 16] = decode(&vector.salt)
        .try_into()
        .map_err(|v: Vec<u8>| format!("salt must be 16 bytes, got {}", v.len()))?;
    let nonce: [u8; 12] = decode(&vector.nonce)
        .try_into()
        .map_err(|v: Vec<u8>| format!("nonce must be 12 bytes, got {}", v.len()))?;
    let key: [u8; 16] = decode(&vector.ephemeral_key)
        .try_into()
        .map_err(|v: Vec<u8>| format!("ephemeral key must be 16 bytes, got {}", v.len()))?;
    let wrap_nonce: [u8; 12] = decode(&vector.wrap_nonce)
        .try_into()
        .map_err(|v: Vec<u8>| format!("wrap nonce must be 12 bytes, got {}", v.len()))?;

    // Deterministic encryption produces the exact blob
    let blob = vault::encrypt_deterministic(&passphrase, &plaintext, &salt, &nonce)
        .map_err(|e| format!("failed to encrypt: {}", e))?;
    if blob.to_bytes() != decode(&vector.blob) {
        return Err("blob mismatch".to_string());
    }

    let packaged = keywrap::wrap_with(&blob, &EphemeralKey::from_bytes(key), &wrap_nonce)
        .map_err(|e| format!("failed to wrap: {}", e))?;
    if packaged.as_bytes() != decode(&vector.packaged_cipher).as_slice() {
        return Err("packaged cipher mismatch".to_string());
    }

    let fragment = decode(&vector.fragment);
    let wrapped = envelope::wrap(
        &fragment,
        vector.index,
        vector.total,
        vector.threshold,
        &packaged,
    )
    .map_err(|e| format!("failed to build envelope: {}", e))?;
    if wrapped != decode(&vector.envelope) {
        return Err("envelope mismatch".to_string());
    }

    // And back down the chain from the recorded bytes
    let parsed = envelope::parse(&decode(&vector.envelope))
        .map_err(|e| format!("failed to parse envelope: {}", e))?;
    if parsed.fragment != fragment || parsed.index != vector.index {
        return Err("parsed envelope fields differ".to_string());
    }
    let unwrapped = keywrap::unwrap(&parsed.packaged_cipher, &EphemeralKey::from_bytes(key))
        .map_err(|e| format!("failed to unwrap: {}", e))?;
    let blob = SecretBlob::from_bytes(&decode(&vector.blob))
        .map_err(|e| format!("failed to parse blob: {}", e))?;
    if unwrapped != blob {
        return Err("unwrapped blob differs from recorded blob".to_string());
    }
    let decrypted =
        vault::decrypt(&passphrase, &blob).map_err(|e| format!("failed to decrypt: {}", e))?;
    if *decrypted != plaintext {
        return Err(format!(
            "plaintext mismatch: expected {} bytes, got {}",
            plaintext.len(),
            decrypted.len()
        ));
    }

    Ok(())
}

#[test]
fn test_golden_vectors() {
    let vectors = load_golden_vectors().expect("failed to load golden vectors");
    println!("Testing {} golden vectors", vectors.len());

    let mut failed = 0;
    for (i, vector) in vectors.iter().enumerate() {
        if let Err(reason) = check_vector(vector) {
            eprintln!("Vector {}: FAILED - {}", i, reason);
            eprintln!("  Comment: {}", vector.comment);
            failed += 1;
        }
    }

    println!(
        "Results: {} passed, {} failed out of {} total",
        vectors.len() - failed,
        failed,
        vectors.len()
    );
    assert_eq!(failed, 0, "Some golden vectors failed validation");
    assert!(!vectors.is_empty(), "No golden vectors were tested");
}
