use super::{
    aes256_ecb_encrypt_block, aes_cbc_nopad_encrypt, md5, pad_password, random_bytes, rc4, sha256,
    sha384, sha512, CryptoError, CryptoResult, PDF_PASSWORD_PADDING,
};

/// Print permission granularity for revision 3 and later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum R3Print {
    #[default]
    Full,
    Low,
    None,
}

/// Permission switches interpreted into `/P` bits for R3 and later.
#[derive(Debug, Clone, Copy)]
pub struct R3Permissions {
    pub accessibility: bool,
    pub extract: bool,
    pub assemble: bool,
    pub annotate_and_form: bool,
    pub form_filling: bool,
    pub modify_other: bool,
    pub print: R3Print,
}

impl Default for R3Permissions {
    fn default() -> Self {
        R3Permissions {
            accessibility: true,
            extract: true,
            assemble: true,
            annotate_and_form: true,
            form_filling: true,
            modify_other: true,
            print: R3Print::Full,
        }
    }
}

/// The standard security handler state written into the `/Encrypt`
/// dictionary, together with the key computations for every supported
/// revision.
#[derive(Debug, Clone)]
pub struct Encryption {
    v: i32,
    r: i32,
    length_bytes: usize,
    p: i32,
    o: Vec<u8>,
    u: Vec<u8>,
    oe: Vec<u8>,
    ue: Vec<u8>,
    perms: Vec<u8>,
    encrypt_metadata: bool,
    id1: Vec<u8>,
}

impl Encryption {
    /// Fresh parameters for newly requested encryption.
    pub fn new(v: i32, r: i32, length_bytes: usize, encrypt_metadata: bool) -> Self {
        Encryption {
            v,
            r,
            length_bytes,
            p: -1,
            o: Vec::new(),
            u: Vec::new(),
            oe: Vec::new(),
            ue: Vec::new(),
            perms: Vec::new(),
            encrypt_metadata,
            id1: Vec::new(),
        }
    }

    /// Parameters imported verbatim from an existing encrypted document.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parameters(
        v: i32,
        r: i32,
        length_bytes: usize,
        p: i32,
        o: Vec<u8>,
        u: Vec<u8>,
        oe: Vec<u8>,
        ue: Vec<u8>,
        perms: Vec<u8>,
        id1: Vec<u8>,
        encrypt_metadata: bool,
    ) -> Self {
        Encryption {
            v,
            r,
            length_bytes,
            p,
            o,
            u,
            oe,
            ue,
            perms,
            encrypt_metadata,
            id1,
        }
    }

    pub fn v(&self) -> i32 {
        self.v
    }

    pub fn r(&self) -> i32 {
        self.r
    }

    pub fn length_bytes(&self) -> usize {
        self.length_bytes
    }

    pub fn p(&self) -> i32 {
        self.p
    }

    pub fn o(&self) -> &[u8] {
        &self.o
    }

    pub fn u(&self) -> &[u8] {
        &self.u
    }

    pub fn oe(&self) -> &[u8] {
        &self.oe
    }

    pub fn ue(&self) -> &[u8] {
        &self.ue
    }

    pub fn perms(&self) -> &[u8] {
        &self.perms
    }

    pub fn encrypt_metadata(&self) -> bool {
        self.encrypt_metadata
    }

    pub fn set_id1(&mut self, id1: Vec<u8>) {
        self.id1 = id1;
    }

    /// Clear or set one 1-based bit of `/P`.
    pub fn set_p(&mut self, bit: u32, allowed: bool) {
        debug_assert!((1..=32).contains(&bit));
        if allowed {
            self.p |= 1 << (bit - 1);
        } else {
            self.p &= !(1 << (bit - 1));
        }
    }

    /// Translate the Acrobat 5 style permission switches into `/P` bits.
    pub fn apply_r3_permissions(&mut self, perms: R3Permissions) {
        if !perms.accessibility && self.r <= 3 {
            // Bit 10 is deprecated and should always be set for R > 3.
            self.set_p(10, false);
        }
        if !perms.extract {
            self.set_p(5, false);
        }
        match perms.print {
            R3Print::None => {
                self.set_p(3, false);
                self.set_p(12, false);
            }
            R3Print::Low => {
                self.set_p(12, false);
            }
            R3Print::Full => {}
        }
        if !perms.assemble {
            self.set_p(11, false);
        }
        if !perms.annotate_and_form {
            self.set_p(6, false);
        }
        if !perms.form_filling {
            self.set_p(9, false);
        }
        if !perms.modify_other {
            self.set_p(4, false);
        }
    }

    /// Compute `/O`, `/U` (and `/OE`, `/UE`, `/Perms` for V5) from the
    /// passwords, returning the file encryption key.
    pub fn compute_parameters(
        &mut self,
        user_password: &str,
        owner_password: &str,
    ) -> CryptoResult<Vec<u8>> {
        if self.v >= 5 {
            self.compute_parameters_v5(user_password, owner_password)
        } else {
            self.compute_parameters_classic(user_password, owner_password)
        }
    }

    /// Algorithm 2: the file key for revisions 2 through 4 given a padded
    /// user password.
    pub fn compute_encryption_key(&self, padded_user_password: &[u8]) -> Vec<u8> {
        let mut input = Vec::with_capacity(32 + 32 + 4 + self.id1.len() + 4);
        input.extend_from_slice(padded_user_password);
        input.extend_from_slice(&self.o);
        input.extend_from_slice(&(self.p as u32).to_le_bytes());
        input.extend_from_slice(&self.id1);
        if self.r >= 4 && !self.encrypt_metadata {
            input.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);
        }

        let mut digest = md5(&input);
        if self.r >= 3 {
            for _ in 0..50 {
                digest = md5(&digest[..self.length_bytes.min(16)]);
            }
        }
        digest.truncate(self.length_bytes.min(16));
        digest
    }

    fn compute_parameters_classic(
        &mut self,
        user_password: &str,
        owner_password: &str,
    ) -> CryptoResult<Vec<u8>> {
        let owner = if owner_password.is_empty() {
            user_password
        } else {
            owner_password
        };

        self.o = self.compute_o_value(user_password.as_bytes(), owner.as_bytes());
        let key = self.compute_encryption_key(&pad_password(user_password.as_bytes()));
        self.u = self.compute_u_value(&key)?;
        Ok(key)
    }

    /// Algorithm 3: the `/O` value.
    fn compute_o_value(&self, user_password: &[u8], owner_password: &[u8]) -> Vec<u8> {
        let mut digest = md5(&pad_password(owner_password));
        if self.r >= 3 {
            for _ in 0..50 {
                digest = md5(&digest);
            }
        }
        let rc4_key = &digest[..self.length_bytes.min(16)];

        let mut data = pad_password(user_password).to_vec();
        if self.r == 2 {
            data = rc4(&data, rc4_key);
        } else {
            for i in 0..20u8 {
                let xored: Vec<u8> = rc4_key.iter().map(|b| b ^ i).collect();
                data = rc4(&data, &xored);
            }
        }
        data
    }

    /// Algorithm 4 (R2) or 5 (R3+): the `/U` value.
    fn compute_u_value(&self, key: &[u8]) -> CryptoResult<Vec<u8>> {
        if key.is_empty() {
            return Err(CryptoError::InvalidKey("empty file key".to_string()));
        }
        if self.r == 2 {
            return Ok(rc4(&PDF_PASSWORD_PADDING, key));
        }

        let mut input = PDF_PASSWORD_PADDING.to_vec();
        input.extend_from_slice(&self.id1);
        let mut hash = md5(&input);
        hash = rc4(&hash, key);
        for i in 1..20u8 {
            let xored: Vec<u8> = key.iter().map(|b| b ^ i).collect();
            hash = rc4(&hash, &xored);
        }
        hash.resize(32, 0);
        Ok(hash)
    }

    fn compute_parameters_v5(
        &mut self,
        user_password: &str,
        owner_password: &str,
    ) -> CryptoResult<Vec<u8>> {
        let owner = if owner_password.is_empty() {
            user_password
        } else {
            owner_password
        };
        // Revision 6 truncates passwords to 127 bytes of UTF-8.
        let user = truncate_127(user_password);
        let owner = truncate_127(owner);

        let file_key = random_bytes(32);

        // /U and /UE
        let user_vsalt = random_bytes(8);
        let user_ksalt = random_bytes(8);
        let mut u = self.hash_password(user, &user_vsalt, &[])?;
        u.extend_from_slice(&user_vsalt);
        u.extend_from_slice(&user_ksalt);
        let intermediate = self.hash_password(user, &user_ksalt, &[])?;
        let ue = aes_cbc_nopad_encrypt(&file_key, &intermediate, &[0u8; 16])?;

        // /O and /OE, salted with the full 48-byte /U
        let owner_vsalt = random_bytes(8);
        let owner_ksalt = random_bytes(8);
        let mut o = self.hash_password(owner, &owner_vsalt, &u)?;
        o.extend_from_slice(&owner_vsalt);
        o.extend_from_slice(&owner_ksalt);
        let intermediate = self.hash_password(owner, &owner_ksalt, &u)?;
        let oe = aes_cbc_nopad_encrypt(&file_key, &intermediate, &[0u8; 16])?;

        // /Perms
        let mut block = [0u8; 16];
        block[..4].copy_from_slice(&(self.p as u32).to_le_bytes());
        block[4..8].copy_from_slice(&[0xff; 4]);
        block[8] = if self.encrypt_metadata { b'T' } else { b'F' };
        block[9..12].copy_from_slice(b"adb");
        block[12..16].copy_from_slice(&random_bytes(4));
        let perms = aes256_ecb_encrypt_block(&block, &file_key)?;

        self.u = u;
        self.ue = ue;
        self.o = o;
        self.oe = oe;
        self.perms = perms.to_vec();
        Ok(file_key)
    }

    /// R5 uses a single SHA-256; R6 uses the iterated SHA-2 ladder
    /// (algorithm 2.B).
    fn hash_password(&self, password: &[u8], salt: &[u8], udata: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut input = password.to_vec();
        input.extend_from_slice(salt);
        input.extend_from_slice(udata);
        if self.r == 5 {
            return Ok(sha256(&input));
        }
        hash_r6(password, salt, udata)
    }
}

fn truncate_127(password: &str) -> &[u8] {
    let bytes = password.as_bytes();
    &bytes[..bytes.len().min(127)]
}

/// Algorithm 2.B: the hardened hash for revision 6.
pub fn hash_r6(password: &[u8], salt: &[u8], udata: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut input = password.to_vec();
    input.extend_from_slice(salt);
    input.extend_from_slice(udata);
    let mut k = sha256(&input);

    let mut round = 0usize;
    loop {
        let unit_len = password.len() + k.len() + udata.len();
        let mut k1 = Vec::with_capacity(64 * unit_len);
        for _ in 0..64 {
            k1.extend_from_slice(password);
            k1.extend_from_slice(&k);
            k1.extend_from_slice(udata);
        }
        let iv: [u8; 16] = k[16..32]
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("short digest in password hash".to_string()))?;
        let e = aes_cbc_nopad_encrypt(&k1, &k[..16], &iv)?;

        let sum: u32 = e[..16].iter().map(|&b| b as u32).sum();
        k = match sum % 3 {
            0 => sha256(&e),
            1 => sha384(&e),
            _ => sha512(&e),
        };

        round += 1;
        let last = *e.last().ok_or_else(|| {
            CryptoError::InvalidData("empty AES output in password hash".to_string())
        })? as usize;
        if round >= 64 && last <= round - 32 {
            break;
        }
    }
    k.truncate(32);
    Ok(k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p_bits() {
        let mut enc = Encryption::new(2, 3, 16, true);
        assert_eq!(enc.p(), -1);
        enc.set_p(3, false);
        assert_eq!(enc.p() & 0b100, 0);
        enc.set_p(3, true);
        assert_ne!(enc.p() & 0b100, 0);
    }

    #[test]
    fn test_r3_permission_interpretation() {
        let mut enc = Encryption::new(2, 3, 16, true);
        enc.apply_r3_permissions(R3Permissions {
            extract: false,
            print: R3Print::Low,
            ..Default::default()
        });
        assert_eq!(enc.p() & (1 << 4), 0); // bit 5: extraction
        assert_eq!(enc.p() & (1 << 11), 0); // bit 12: high-res printing
        assert_ne!(enc.p() & (1 << 2), 0); // bit 3: printing still allowed
    }

    #[test]
    fn test_classic_parameters_shapes() {
        let mut enc = Encryption::new(2, 3, 16, true);
        enc.set_id1(vec![0xab; 16]);
        let key = enc.compute_parameters("user", "owner").unwrap();
        assert_eq!(key.len(), 16);
        assert_eq!(enc.o().len(), 32);
        assert_eq!(enc.u().len(), 32);
        // Key derivation is deterministic for fixed inputs.
        assert_eq!(key, enc.compute_encryption_key(&pad_password(b"user")));
    }

    #[test]
    fn test_r2_key_is_40_bit() {
        let mut enc = Encryption::new(1, 2, 5, true);
        enc.set_id1(vec![0x01; 16]);
        let key = enc.compute_parameters("", "").unwrap();
        assert_eq!(key.len(), 5);
    }

    #[test]
    fn test_v5_parameters_shapes() {
        let mut enc = Encryption::new(5, 6, 32, true);
        let key = enc.compute_parameters("user", "owner").unwrap();
        assert_eq!(key.len(), 32);
        assert_eq!(enc.u().len(), 48);
        assert_eq!(enc.o().len(), 48);
        assert_eq!(enc.ue().len(), 32);
        assert_eq!(enc.oe().len(), 32);
        assert_eq!(enc.perms().len(), 16);
    }

    #[test]
    fn test_hash_r6_deterministic() {
        let a = hash_r6(b"secret", &[1; 8], &[]).unwrap();
        let b = hash_r6(b"secret", &[1; 8], &[]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_ne!(a, hash_r6(b"secret", &[2; 8], &[]).unwrap());
    }

    #[test]
    fn test_v5_user_password_verifiable() {
        // The first 32 bytes of /U must equal the hash of the password with
        // the validation salt, which is how a reader authenticates.
        let mut enc = Encryption::new(5, 6, 32, true);
        let _ = enc.compute_parameters("secret", "").unwrap();
        let u = enc.u().to_vec();
        let vsalt = &u[32..40];
        let expected = hash_r6(b"secret", vsalt, &[]).unwrap();
        assert_eq!(&u[..32], expected.as_slice());
    }
}
