//! Referral code tokens.
//!
//! Codes are short, human-enterable, uppercase alphanumeric strings. They do
//! not need to be unguessable, only unique; uniqueness is enforced by the
//! store's primary key and a collision simply draws another token.

use std::sync::Arc;

use rand_core::{OsRng, RngCore};

/// Characters a code may contain.
pub const CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a freshly issued code.
pub const CODE_LENGTH: usize = 8;

/// Length used once the short space has produced repeated collisions.
pub const WIDE_CODE_LENGTH: usize = 12;

/// Attempts made at each length before widening or giving up.
pub const ATTEMPTS_PER_LENGTH: usize = 5;

// Largest multiple of the alphabet size that fits in a byte; bytes at or above
// it are discarded so every character is equally likely.
const REJECTION_BOUND: u8 = (256 / CODE_ALPHABET.len() * CODE_ALPHABET.len()) as u8;

/// Draw a random code of `len` characters from [`CODE_ALPHABET`].
pub fn generate_code<R: RngCore + ?Sized>(rng: &mut R, len: usize) -> String {
  let mut out = String::with_capacity(len);
  let mut buf = [0u8; 16];
  while out.len() < len {
    rng.fill_bytes(&mut buf);
    for b in buf.iter().copied().filter(|b| *b < REJECTION_BOUND) {
      if out.len() == len {
        break;
      }
      out.push(char::from(CODE_ALPHABET[usize::from(b) % CODE_ALPHABET.len()]));
    }
  }
  out
}

/// Produces a candidate code of the requested length.
pub type CodeSource = Arc<dyn Fn(usize) -> String + Send + Sync>;

/// Draws codes from the operating system's RNG.
pub fn os_code_source() -> CodeSource {
  Arc::new(|len| generate_code(&mut OsRng, len))
}

/// The token lengths an issuer tries, in order. Running off the end of this
/// schedule means the code space is exhausted for practical purposes.
pub fn attempt_lengths() -> impl Iterator<Item = usize> {
  std::iter::repeat_n(CODE_LENGTH, ATTEMPTS_PER_LENGTH)
    .chain(std::iter::repeat_n(WIDE_CODE_LENGTH, ATTEMPTS_PER_LENGTH))
}

/// Canonical form of user-entered code text.
pub fn normalize_code(input: &str) -> String {
  input.trim().to_ascii_uppercase()
}

/// Whether `code` could have been produced by [`generate_code`].
pub fn is_well_formed(code: &str) -> bool {
  !code.is_empty() && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}
