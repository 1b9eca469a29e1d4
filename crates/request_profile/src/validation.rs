use thiserror::Error;

/// Prompts longer than this, in characters, are rejected before dispatch.
pub const MAX_PROMPT_CHARS: usize = 8_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptValidationError {
    #[error("prompt is empty")]
    Empty,

    #[error("prompt is {length} characters long; the limit is {max}")]
    TooLong { length: usize, max: usize },
}

/// Returns the trimmed prompt when it can be dispatched.
pub fn validate_prompt(prompt: &str) -> Result<&str, PromptValidationError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(PromptValidationError::Empty);
    }
    let length = trimmed.chars().count();
    if length > MAX_PROMPT_CHARS {
        return Err(PromptValidationError::TooLong {
            length,
            max: MAX_PROMPT_CHARS,
        });
    }
    Ok(trimmed)
}
