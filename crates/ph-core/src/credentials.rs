use rand::Rng;
use rand::distr::{Alphanumeric, SampleString};

pub const VPS_ID_LEN: usize = 6;
pub const ACCESS_TOKEN_LEN: usize = 24;
pub const INITIAL_PASSWORD_LEN: usize = 10;
pub const ROTATED_PASSWORD_LEN: usize = 12;

const VPS_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Source of identifiers and secrets for new and rotated instances.
///
/// Collisions are checked by the orchestrator, so implementations only need
/// to be unpredictable, not unique.
pub trait CredentialSource: Send + Sync + 'static {
    /// Short, human-referenceable instance id.
    fn vps_id(&self) -> String;

    /// Long ownership-proof secret.
    fn access_token(&self) -> String;

    fn password(&self, len: usize) -> String;
}

/// Draws from the thread-local CSPRNG (`rand::rng()`, ChaCha-based).
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCredentials;

impl CredentialSource for RandomCredentials {
    fn vps_id(&self) -> String {
        let mut rng = rand::rng();
        (0..VPS_ID_LEN)
            .map(|_| VPS_ID_ALPHABET[rng.random_range(0..VPS_ID_ALPHABET.len())] as char)
            .collect()
    }

    fn access_token(&self) -> String {
        Alphanumeric.sample_string(&mut rand::rng(), ACCESS_TOKEN_LEN)
    }

    fn password(&self, len: usize) -> String {
        Alphanumeric.sample_string(&mut rand::rng(), len)
    }
}

/// Login name for a caller: their display name, lower-cased, alphanumerics only.
pub fn username_for(display_name: &str) -> String {
    let name: String = display_name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if name.is_empty() { "user".into() } else { name }
}
