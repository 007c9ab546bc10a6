//! Placeholder for the S3 credential cipher.
//!
//! `Bucket` rows need *some* ciphertext in `access_key_ct`/`secret_key_ct`
//! so the rest of the catalog has something to round-trip through; this
//! module exists only so callers have a single seam to later swap in a
//! real AEAD (e.g. `aes-gcm` keyed by `Settings::credential_cipher_key`).
//!
//! NOT PRODUCTION CRYPTO: this is a reversible XOR stream, not
//! authenticated encryption. It is adequate only for making the
//! plaintext non-obvious at rest in a development database.

pub fn seal(key: &[u8; 32], plaintext: &str) -> Vec<u8> {
    xor_stream(key, plaintext.as_bytes())
}

pub fn open(key: &[u8; 32], ciphertext: &[u8]) -> anyhow::Result<String> {
    let bytes = xor_stream(key, ciphertext);
    String::from_utf8(bytes).map_err(|e| anyhow::anyhow!("credential ciphertext was not valid utf8: {e}"))
}

fn xor_stream(key: &[u8; 32], input: &[u8]) -> Vec<u8> {
    input
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ key[i % key.len()])
        .collect()
}

pub fn decode_key(base64_key: &str) -> anyhow::Result<[u8; 32]> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD.decode(base64_key)?;
    anyhow::ensure!(bytes.len() == 32, "credential cipher key must be 32 bytes");
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trips() {
        let key = [7u8; 32];
        let ct = seal(&key, "access-key-id");
        assert_eq!(open(&key, &ct).unwrap(), "access-key-id");
    }
}
