//! Client token to user key mapping.
//!
//! The client token is a string of base-2 digits. The user key is its value
//! read from the rightmost digit, and the session cache stores the token under
//! the key's binary rendering.

use crate::error::{DomainError, Result};
use crate::value_objects::UserId;

/// Longest token that still fits in a positive `i64`.
pub const MAX_TOKEN_DIGITS: usize = 62;

/// Derives the numeric user key from a client token.
pub fn user_key_from_token(token: &str) -> Result<UserId> {
    let token = token.trim();
    if token.is_empty() {
        return Err(DomainError::InvalidToken("token is empty".to_string()));
    }
    if token.len() > MAX_TOKEN_DIGITS {
        return Err(DomainError::InvalidToken(format!(
            "token longer than {MAX_TOKEN_DIGITS} digits"
        )));
    }

    let mut key: i64 = 0;
    for (position, ch) in token.chars().rev().enumerate() {
        match ch {
            '0' => {}
            '1' => key += 1 << position,
            other => {
                return Err(DomainError::InvalidToken(format!(
                    "unexpected character {other:?}"
                )));
            }
        }
    }
    Ok(UserId::new(key))
}

/// Cache key under which the session token of `user_id` is stored.
pub fn session_cache_key(user_id: UserId) -> String {
    format!("{:b}", user_id.as_i64())
}
