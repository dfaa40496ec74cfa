//! Input validation constants and utilities for SQLite storage.
//!
//! These limits prevent unbounded user input from causing disk exhaustion.

use crate::error::Error;

/// Maximum length of a message text (64 KB, UTF-8 encoded)
pub const MAX_MESSAGE_TEXT_LENGTH: usize = 64 * 1024;

/// Validate that a string does not exceed the specified maximum length in bytes.
///
/// Note: This validates UTF-8 byte length, not Unicode character count.
#[inline]
pub fn validate_string_length(s: &str, max_length: usize, field_name: &str) -> Result<(), Error> {
    if s.len() > max_length {
        return Err(Error::Validation {
            field_name: field_name.to_string(),
            max_size: max_length,
            actual_size: s.len(),
        });
    }
    Ok(())
}
