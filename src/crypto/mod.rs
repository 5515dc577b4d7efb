pub mod encryption;

use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

pub const PDF_PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PDF_PASSWORD_PADDING;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded
}

pub fn md5(data: &[u8]) -> Vec<u8> {
    md5::compute(data).0.to_vec()
}

pub fn sha256(data: &[u8]) -> Vec<u8> {
    use sha2::Digest;
    let mut hasher = sha2::Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

pub fn sha384(data: &[u8]) -> Vec<u8> {
    use sha2::Digest;
    let mut hasher = sha2::Sha384::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

pub fn sha512(data: &[u8]) -> Vec<u8> {
    use sha2::Digest;
    let mut hasher = sha2::Sha512::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// RC4 stream cipher; encryption and decryption are the same operation.
pub fn rc4(data: &[u8], key: &[u8]) -> Vec<u8> {
    debug_assert!(!key.is_empty() && key.len() <= 256);
    let mut s: [u8; 256] = std::array::from_fn(|i| i as u8);

    let mut j = 0u8;
    for i in 0..256 {
        j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
        s.swap(i, j as usize);
    }

    let mut result = Vec::with_capacity(data.len());
    let mut i = 0u8;
    let mut j = 0u8;
    for byte in data {
        i = i.wrapping_add(1);
        j = j.wrapping_add(s[i as usize]);
        s.swap(i as usize, j as usize);
        let k = s[(s[i as usize].wrapping_add(s[j as usize])) as usize];
        result.push(byte ^ k);
    }
    result
}

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Encrypt for a PDF stream or string: a 16-byte IV followed by AES-CBC
/// ciphertext with PKCS#7 padding. Output length is
/// `16 + input + (16 - input % 16)`.
pub fn aes_pdf_encrypt(data: &[u8], key: &[u8], iv: &[u8; 16]) -> CryptoResult<Vec<u8>> {
    let padded_len = data.len() + (16 - data.len() % 16);
    let mut out = Vec::with_capacity(16 + padded_len);
    out.extend_from_slice(iv);
    let mut buf = vec![0u8; padded_len];
    let ct = match key.len() {
        16 => Aes128CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_b2b_mut::<Pkcs7>(data, &mut buf)
            .map_err(|e| CryptoError::InvalidData(e.to_string()))?,
        32 => Aes256CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_b2b_mut::<Pkcs7>(data, &mut buf)
            .map_err(|e| CryptoError::InvalidData(e.to_string()))?,
        other => {
            return Err(CryptoError::InvalidKey(format!(
                "AES key must be 16 or 32 bytes, got {}",
                other
            )))
        }
    };
    out.extend_from_slice(ct);
    Ok(out)
}

/// Inverse of [`aes_pdf_encrypt`]: strip the IV prefix, decrypt, remove
/// padding.
pub fn aes_pdf_decrypt(data: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
    if data.len() < 32 || (data.len() - 16) % 16 != 0 {
        return Err(CryptoError::InvalidData(
            "AES data too short or misaligned".to_string(),
        ));
    }
    let iv: [u8; 16] = data[..16]
        .try_into()
        .map_err(|_| CryptoError::InvalidData("AES data too short for IV".to_string()))?;
    let mut buf = data[16..].to_vec();
    let pt_len = match key.len() {
        16 => Aes128CbcDec::new(key.into(), (&iv).into())
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .map_err(|e| CryptoError::InvalidData(e.to_string()))?
            .len(),
        32 => Aes256CbcDec::new(key.into(), (&iv).into())
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .map_err(|e| CryptoError::InvalidData(e.to_string()))?
            .len(),
        other => {
            return Err(CryptoError::InvalidKey(format!(
                "AES key must be 16 or 32 bytes, got {}",
                other
            )))
        }
    };
    buf.truncate(pt_len);
    Ok(buf)
}

/// AES-CBC without padding, as used by the revision 6 password hash and the
/// `/OE`, `/UE` key wrapping. Data length must be a multiple of 16.
pub fn aes_cbc_nopad_encrypt(data: &[u8], key: &[u8], iv: &[u8; 16]) -> CryptoResult<Vec<u8>> {
    let mut buf = vec![0u8; data.len()];
    match key.len() {
        16 => {
            Aes128CbcEnc::new(key.into(), iv.into())
                .encrypt_padded_b2b_mut::<NoPadding>(data, &mut buf)
                .map_err(|e| CryptoError::InvalidData(e.to_string()))?;
        }
        32 => {
            Aes256CbcEnc::new(key.into(), iv.into())
                .encrypt_padded_b2b_mut::<NoPadding>(data, &mut buf)
                .map_err(|e| CryptoError::InvalidData(e.to_string()))?;
        }
        other => {
            return Err(CryptoError::InvalidKey(format!(
                "AES key must be 16 or 32 bytes, got {}",
                other
            )))
        }
    }
    Ok(buf)
}

/// Single-block AES-256 ECB, used for the `/Perms` entry.
pub fn aes256_ecb_encrypt_block(block: &[u8; 16], key: &[u8]) -> CryptoResult<[u8; 16]> {
    if key.len() != 32 {
        return Err(CryptoError::InvalidKey(
            "AES-256 key must be 32 bytes".to_string(),
        ));
    }
    let cipher = aes::Aes256::new(key.into());
    let mut out = aes::Block::clone_from_slice(block);
    cipher.encrypt_block(&mut out);
    Ok(out.into())
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

/// Derive the per-object data key: the file key, the low three bytes of the
/// object number, the low two bytes of the generation, and for AES the
/// bytes `sAlT`, all through MD5 and truncated to `min(len + 5, 16)`.
/// V5 uses the file key unchanged.
pub fn compute_data_key(
    file_key: &[u8],
    objid: u32,
    gen: u16,
    use_aes: bool,
    v: i32,
) -> Vec<u8> {
    if v >= 5 {
        return file_key.to_vec();
    }
    let mut input = file_key.to_vec();
    input.extend_from_slice(&objid.to_le_bytes()[..3]);
    input.extend_from_slice(&gen.to_le_bytes()[..2]);
    if use_aes {
        input.extend_from_slice(b"sAlT");
    }
    let digest = md5(&input);
    let keep = (file_key.len() + 5).min(16);
    digest[..keep].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_known_vector() {
        assert_eq!(hex::encode(md5(b"abc")), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_rc4_round_trip() {
        let key = b"Key";
        let data = b"Plaintext";
        let encrypted = rc4(data, key);
        assert_eq!(hex::encode(&encrypted), "bbf316e8d940af0ad3");
        assert_eq!(rc4(&encrypted, key), data);
    }

    #[test]
    fn test_aes_pdf_round_trip() {
        let key = [0x11u8; 16];
        let iv = [0x22u8; 16];
        let plaintext = b"pdf stream payload";
        let encrypted = aes_pdf_encrypt(plaintext, &key, &iv).unwrap();
        // IV + padded ciphertext
        assert_eq!(
            encrypted.len(),
            16 + plaintext.len() + (16 - plaintext.len() % 16)
        );
        assert_eq!(aes_pdf_decrypt(&encrypted, &key).unwrap(), plaintext);
    }

    #[test]
    fn test_aes_pdf_round_trip_256() {
        let key = [0x33u8; 32];
        let iv = [0u8; 16];
        let plaintext = vec![0xabu8; 32];
        let encrypted = aes_pdf_encrypt(&plaintext, &key, &iv).unwrap();
        assert_eq!(encrypted.len(), 16 + 48);
        assert_eq!(aes_pdf_decrypt(&encrypted, &key).unwrap(), plaintext);
    }

    #[test]
    fn test_data_key_lengths() {
        let key = vec![1u8; 5];
        assert_eq!(compute_data_key(&key, 7, 0, false, 1).len(), 10);
        let key16 = vec![1u8; 16];
        assert_eq!(compute_data_key(&key16, 7, 0, true, 4).len(), 16);
        let key32 = vec![1u8; 32];
        assert_eq!(compute_data_key(&key32, 7, 0, true, 5), key32);
    }
}
