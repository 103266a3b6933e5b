use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::error::CoreError;

/// Length of generated application IDs.
pub const DEFAULT_ID_LENGTH: usize = 5;

const MAX_ID_LENGTH: usize = 64;

/// Generates a random alphanumeric ID of the given length.
pub fn generate_id(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Validates a caller-supplied application or user ID.
pub fn validate_id(id: &str) -> Result<(), CoreError> {
    if id.is_empty() || id.len() > MAX_ID_LENGTH {
        return Err(CoreError::invalid_id(id));
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CoreError::invalid_id(id));
    }
    Ok(())
}
