//! Object name generation
//!
//! Generated names follow the API server's `generateName` scheme: a prefix
//! plus a short random suffix drawn from an alphabet without vowels, so
//! suffixes never spell words.

use rand::Rng;

#[cfg(test)]
use mockall::automock;

/// Characters a generated suffix is drawn from
const SUFFIX_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

/// Length of the random suffix
const RANDOM_LENGTH: usize = 5;

/// Maximum length of a Kubernetes object name
const MAX_NAME_LENGTH: usize = 63;

/// Longest prefix kept before the suffix is appended
const MAX_GENERATED_NAME_LENGTH: usize = MAX_NAME_LENGTH - RANDOM_LENGTH;

/// Produces unique object names from a prefix
#[cfg_attr(test, automock)]
pub trait NameGenerator: Send + Sync {
    /// Generate a name starting with (a possibly truncated) `prefix`
    fn generate(&self, prefix: &str) -> String;
}

/// Random-suffix generator matching the API server's `generateName`
#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleNameGenerator;

impl NameGenerator for SimpleNameGenerator {
    fn generate(&self, prefix: &str) -> String {
        let mut rng = rand::thread_rng();
        let mut name: String = prefix.chars().take(MAX_GENERATED_NAME_LENGTH).collect();
        name.extend((0..RANDOM_LENGTH).map(|_| {
            let idx = rng.gen_range(0..SUFFIX_ALPHABET.len());
            SUFFIX_ALPHABET[idx] as char
        }));
        name
    }
}
