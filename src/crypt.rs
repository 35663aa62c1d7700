//! Standard security handler (revision 3, RC4-128) shared by the writer and
//! reader: the same key-derivation algorithms run forward at encryption time
//! and backward for password authentication.

use crate::error::CodecError;

/// Password padding constant from the PDF spec.
pub const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

const KEY_LEN: usize = 16; // 128-bit

/// RC4 stream cipher, variable-length key.
pub struct Arcfour {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Arcfour {
    pub fn new(key: &[u8]) -> Self {
        debug_assert!(!key.is_empty() && key.len() <= 256);
        let mut state: [u8; 256] = std::array::from_fn(|i| i as u8);
        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }
        Self { state, i: 0, j: 0 }
    }

    /// Encrypt or decrypt; RC4 is symmetric.
    pub fn process(&mut self, data: &[u8]) -> Vec<u8> {
        data.iter().map(|byte| byte ^ self.prga()).collect()
    }

    fn prga(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.state[self.i as usize]);
        self.state.swap(self.i as usize, self.j as usize);
        let idx = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
        self.state[idx as usize]
    }
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    if len < 32 {
        padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    }
    padded
}

/// A ready-to-use encryption context: the file key plus the public values
/// stored in the `/Encrypt` dictionary.
pub struct StandardSecurity {
    key: Vec<u8>,
    pub o: Vec<u8>,
    pub u: Vec<u8>,
    pub p: i64,
    pub doc_id: Vec<u8>,
}

impl StandardSecurity {
    /// Build the context for writing. An absent owner password falls back to
    /// the user password, matching the standard handler's convention.
    pub fn for_write(
        owner_password: Option<&str>,
        user_password: Option<&str>,
        p: i64,
        doc_id: Vec<u8>,
    ) -> Self {
        let user = user_password.unwrap_or("");
        let owner = owner_password.unwrap_or(user);
        let o = compute_o_value(owner.as_bytes(), user.as_bytes());
        let key = compute_file_key(user.as_bytes(), &o, p, &doc_id);
        let u = compute_u_value(&key, &doc_id);
        Self {
            key,
            o,
            u,
            p,
            doc_id,
        }
    }

    /// Authenticate a password against the stored `/O`, `/U`, `/P` values.
    /// Tries the user path first, then the owner path (Algorithm 3.7).
    pub fn authenticate(
        o: &[u8],
        u: &[u8],
        p: i64,
        doc_id: &[u8],
        password: &str,
    ) -> Result<Self, CodecError> {
        let attempt = |candidate: &[u8]| -> Option<Vec<u8>> {
            let key = compute_file_key(candidate, o, p, doc_id);
            let computed = compute_u_value(&key, doc_id);
            // Revision 3 compares the first 16 bytes only.
            if computed.len() >= 16 && u.len() >= 16 && computed[..16] == u[..16] {
                Some(key)
            } else {
                None
            }
        };

        if let Some(key) = attempt(password.as_bytes()) {
            return Ok(Self {
                key,
                o: o.to_vec(),
                u: u.to_vec(),
                p,
                doc_id: doc_id.to_vec(),
            });
        }

        // Owner path: decrypt /O back into the padded user password.
        let padded = pad_password(password.as_bytes());
        let mut hash = md5::compute(padded).0.to_vec();
        for _ in 0..50 {
            hash = md5::compute(&hash).0.to_vec();
        }
        let owner_key = &hash[..KEY_LEN];
        let mut recovered = o.to_vec();
        for i in (0..20u8).rev() {
            let xor_key: Vec<u8> = owner_key.iter().map(|b| b ^ i).collect();
            recovered = Arcfour::new(&xor_key).process(&recovered);
        }
        if let Some(key) = attempt(&recovered) {
            return Ok(Self {
                key,
                o: o.to_vec(),
                u: u.to_vec(),
                p,
                doc_id: doc_id.to_vec(),
            });
        }

        Err(CodecError::InvalidPassword)
    }

    /// Per-object RC4 with the object-specific key (Algorithm 3.1). Symmetric,
    /// so this both encrypts and decrypts.
    pub fn process_object(&self, id: u32, generation: u16, data: &[u8]) -> Vec<u8> {
        let mut key_data = self.key.clone();
        key_data.extend_from_slice(&id.to_le_bytes()[..3]);
        key_data.extend_from_slice(&(generation as u32).to_le_bytes()[..2]);
        let hash = md5::compute(&key_data);
        let key_len = (self.key.len() + 5).min(16);
        Arcfour::new(&hash.0[..key_len]).process(data)
    }
}

/// Algorithm 3.2: derive the file encryption key from the user password.
fn compute_file_key(user_password: &[u8], o: &[u8], p: i64, doc_id: &[u8]) -> Vec<u8> {
    let mut context = md5::Context::new();
    context.consume(pad_password(user_password));
    context.consume(o);
    context.consume((p as i32 as u32).to_le_bytes());
    context.consume(doc_id);
    let mut result = context.finalize().0.to_vec();
    for _ in 0..50 {
        result = md5::compute(&result[..KEY_LEN]).0.to_vec();
    }
    result.truncate(KEY_LEN);
    result
}

/// Algorithm 3.3: compute the `/O` value from the owner password.
fn compute_o_value(owner_password: &[u8], user_password: &[u8]) -> Vec<u8> {
    let mut hash = md5::compute(pad_password(owner_password)).0.to_vec();
    for _ in 0..50 {
        hash = md5::compute(&hash).0.to_vec();
    }
    let key = &hash[..KEY_LEN];
    let mut out = Arcfour::new(key).process(&pad_password(user_password));
    for i in 1..20u8 {
        let xor_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
        out = Arcfour::new(&xor_key).process(&out);
    }
    out
}

/// Algorithm 3.5: compute the `/U` value from the file key.
fn compute_u_value(key: &[u8], doc_id: &[u8]) -> Vec<u8> {
    let mut context = md5::Context::new();
    context.consume(PASSWORD_PADDING);
    context.consume(doc_id);
    let hash = context.finalize();
    let mut out = Arcfour::new(key).process(&hash.0);
    for i in 1..20u8 {
        let xor_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
        out = Arcfour::new(&xor_key).process(&out);
    }
    // Pad to 32 bytes by repetition; readers only compare the first 16.
    let tail = out.clone();
    out.extend_from_slice(&tail);
    out.truncate(32);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc4_is_symmetric() {
        let key = b"secret key";
        let plain = b"attack at dawn".to_vec();
        let cipher = Arcfour::new(key).process(&plain);
        assert_ne!(cipher, plain);
        assert_eq!(Arcfour::new(key).process(&cipher), plain);
    }

    #[test]
    fn user_password_authenticates() {
        let ctx = StandardSecurity::for_write(Some("owner"), Some("user"), -44, vec![1, 2, 3, 4]);
        let ok = StandardSecurity::authenticate(&ctx.o, &ctx.u, ctx.p, &ctx.doc_id, "user");
        assert!(ok.is_ok());
    }

    #[test]
    fn owner_password_authenticates() {
        let ctx = StandardSecurity::for_write(Some("owner"), Some("user"), -44, vec![9, 9]);
        let ok = StandardSecurity::authenticate(&ctx.o, &ctx.u, ctx.p, &ctx.doc_id, "owner");
        assert!(ok.is_ok());
    }

    #[test]
    fn wrong_password_is_rejected() {
        let ctx = StandardSecurity::for_write(Some("owner"), Some("user"), -44, vec![5]);
        let err = StandardSecurity::authenticate(&ctx.o, &ctx.u, ctx.p, &ctx.doc_id, "nope");
        assert!(matches!(err, Err(CodecError::InvalidPassword)));
    }

    #[test]
    fn object_encryption_round_trips() {
        let ctx = StandardSecurity::for_write(None, Some("pw"), -4, vec![7, 7, 7]);
        let plain = b"BT /F1 11 Tf (hello) Tj ET".to_vec();
        let cipher = ctx.process_object(12, 0, &plain);
        assert_ne!(cipher, plain);
        assert_eq!(ctx.process_object(12, 0, &cipher), plain);
    }

    #[test]
    fn empty_user_password_opens_without_password() {
        let ctx = StandardSecurity::for_write(Some("owner"), None, -44, vec![1]);
        let ok = StandardSecurity::authenticate(&ctx.o, &ctx.u, ctx.p, &ctx.doc_id, "");
        assert!(ok.is_ok());
    }
}
