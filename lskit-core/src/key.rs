//! The local storage key and its generator.

use std::fmt;

use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Number of random bytes drawn for a new key. Each byte becomes one character.
pub const KEY_ENTROPY_BYTES: usize = 16;

/// Secret used to key the encrypted local database.
///
/// The value is a sequence of [`KEY_ENTROPY_BYTES`] visible characters. It is
/// zeroized on drop and its `Debug` output only shows a fingerprint.
pub struct LocalStorageKey(SecretString);

impl LocalStorageKey {
    /// Wraps key material read back from the keystore.
    #[must_use]
    pub fn new(value: String) -> Self {
        Self(SecretString::from(value.into_boxed_str()))
    }

    /// Exposes the raw key. Only hand this to the database engine or the keystore.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Short hex identifier that is safe to log.
    ///
    /// First 4 bytes of `SHA-256` over the UTF-8 encoding of the key.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.expose().as_bytes());
        hex::encode(&digest[..4])
    }
}

impl Clone for LocalStorageKey {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_owned())
    }
}

impl PartialEq for LocalStorageKey {
    fn eq(&self, other: &Self) -> bool {
        self.expose()
            .as_bytes()
            .ct_eq(other.expose().as_bytes())
            .into()
    }
}

impl Eq for LocalStorageKey {}

impl fmt::Debug for LocalStorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LocalStorageKey")
            .field(&self.fingerprint())
            .finish()
    }
}

/// Maps a random byte onto a visible character.
///
/// Bytes `0..=94` land on ASCII `' '..='~'`. Everything from `95` upwards
/// would hit DEL or the C1 control block, so it is shifted a further 34
/// positions into `U+00A1..=U+0141`. Keys already persisted by earlier
/// releases depend on this exact table.
#[must_use]
pub const fn printable(byte: u8) -> char {
    let code = byte as u32 + 32;
    let code = if code < 127 { code } else { code + 34 };
    // The largest code is U+0141, always a valid scalar value.
    match char::from_u32(code) {
        Some(c) => c,
        None => char::REPLACEMENT_CHARACTER,
    }
}

/// Whether `c` belongs to the band produced by [`printable`].
#[must_use]
pub const fn is_key_char(c: char) -> bool {
    matches!(c, '\u{20}'..='\u{7E}' | '\u{A1}'..='\u{141}')
}

/// Produces fresh local storage keys from the operating system's CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecureRandomKeyGenerator;

impl SecureRandomKeyGenerator {
    /// Creates a generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Draws a new key.
    ///
    /// # Panics
    ///
    /// Panics if the operating system's random source is unavailable. There is
    /// no sensible recovery from that, so it is not reported as an error.
    #[must_use]
    pub fn generate(&self) -> LocalStorageKey {
        let mut bytes = Zeroizing::new([0u8; KEY_ENTROPY_BYTES]);
        OsRng.fill_bytes(&mut *bytes);
        LocalStorageKey::new(encode(&*bytes))
    }
}

fn encode(bytes: &[u8]) -> String {
    bytes.iter().copied().map(printable).collect()
}
