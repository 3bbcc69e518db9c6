//! Boundary input checks. Each check returns a `ValidationError` on the first
//! violation so callers can `?` through a sequence of them.

use crate::core::error::TenderError;
use regex::Regex;
use std::sync::OnceLock;

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 500;
pub const MAX_USERNAME_CHARS: usize = 50;
pub const MAX_FEEDBACK_CHARS: usize = 1000;
pub const MAX_ID_CHARS: usize = 100;

fn username_re() -> Result<&'static Regex, TenderError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = RE.get() {
        return Ok(re);
    }
    let re = Regex::new(r"^[a-zA-Z0-9_-]+$")
        .map_err(|e| TenderError::StorageError(format!("username pattern: {}", e)))?;
    Ok(RE.get_or_init(|| re))
}

fn bounded_text(field: &str, value: &str, max: usize) -> Result<(), TenderError> {
    if value.trim().is_empty() {
        return Err(TenderError::ValidationError(format!(
            "{} must not be empty",
            field
        )));
    }
    let len = value.chars().count();
    if len > max {
        return Err(TenderError::ValidationError(format!(
            "{} is too long ({} chars, max {})",
            field, len, max
        )));
    }
    Ok(())
}

pub fn name(field: &str, value: &str) -> Result<(), TenderError> {
    bounded_text(field, value, MAX_NAME_CHARS)
}

pub fn description(field: &str, value: &str) -> Result<(), TenderError> {
    bounded_text(field, value, MAX_DESCRIPTION_CHARS)
}

pub fn feedback(value: &str) -> Result<(), TenderError> {
    bounded_text("feedback", value, MAX_FEEDBACK_CHARS)
}

pub fn id(field: &str, value: &str) -> Result<(), TenderError> {
    bounded_text(field, value, MAX_ID_CHARS)
}

pub fn username(value: &str) -> Result<(), TenderError> {
    bounded_text("username", value, MAX_USERNAME_CHARS)?;
    if !username_re()?.is_match(value) {
        return Err(TenderError::ValidationError(format!(
            "username '{}' may only contain letters, digits, '-' and '_'",
            value
        )));
    }
    Ok(())
}

/// Offset/limit window for list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub fn new(limit: u32, offset: u32) -> Result<Self, TenderError> {
        if limit == 0 {
            return Err(TenderError::ValidationError(
                "limit must be greater than 0".to_string(),
            ));
        }
        Ok(Self { limit, offset })
    }

    /// Fill an omitted limit/offset from the configured default.
    pub fn or_default(
        limit: Option<u32>,
        offset: Option<u32>,
        default_limit: u32,
    ) -> Result<Self, TenderError> {
        Self::new(limit.unwrap_or(default_limit), offset.unwrap_or(0))
    }
}
