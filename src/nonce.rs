//! Protocol nonce generation.

use rand::{distributions::Alphanumeric, Rng};

/// Generates an alphanumeric nonce of the given length.
///
/// Payment requests use 32 characters (`nonce_str`), webhook reply
/// envelopes use 16.
#[must_use]
pub fn nonce_str(length: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(length).map(char::from).collect()
}
