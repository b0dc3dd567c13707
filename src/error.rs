use serde::{Deserialize, Serialize};

/// A struct that represents an error with a context and possibly the propagated source error.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContextError {
    pub context: String,
    pub source_error: Option<String>,
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source_error {
            Some(source_error) => write!(
                formatter,
                "{}: {}",
                self.context,
                minimize_first_letter(source_error.to_string()),
            ),
            None => write!(formatter, "{}", self.context),
        }
    }
}

impl std::error::Error for ContextError {}

impl ContextError {
    /// Create a new `ContextError` with the given context.
    pub fn with_context<S: Into<String>>(context: S) -> ContextError {
        ContextError {
            context: context.into(),
            source_error: None,
        }
    }

    /// Create a new `ContextError` with the given context and source error.
    pub fn with_error<S: Into<String>>(context: S, error: &dyn std::error::Error) -> ContextError {
        ContextError {
            context: context.into(),
            source_error: Some(error.to_string()),
        }
    }
}

/// Minimizes the first letter of a string, it is used for standardizing the error message.
fn minimize_first_letter(string: String) -> String {
    let mut characters = string.chars();
    match characters.next() {
        None => String::new(),
        Some(character) => character.to_lowercase().chain(characters).collect(),
    }
}

/// The failures that abort a generation run. Everything recoverable (an unreachable
/// illustration, a line that cannot be measured, a padding or truncation decision) is
/// reported through the warnings of the result instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    /// Missing or invalid identifiers, a book that is not finalized, malformed pages or layouts.
    #[error("Validation error: {0}")]
    Validation(String),
    /// The book, the layout or the linked product could not be found.
    #[error("Not found: {0}")]
    NotFound(String),
    /// A document could not be produced at all.
    #[error("Render error: {0}")]
    Render(String),
    /// One of the artifacts could not be uploaded, nothing has been published.
    #[error("Publish error: {0}")]
    Publish(String),
    /// A collaborator failed in a way that is neither a missing entity nor a publish failure.
    #[error("Collaborator error: {0}")]
    Collaborator(String),
}

impl From<ContextError> for GenerationError {
    fn from(error: ContextError) -> Self {
        GenerationError::Render(error.to_string())
    }
}

/// The outcome of a piece of work which is allowed to fail without failing the run.
///
/// The caller is forced to decide what to do with a degradation, usually by folding its
/// reason into the warnings via `into_option`.
#[derive(Debug, Clone, PartialEq)]
pub enum BestEffort<T> {
    Done(T),
    Degraded(String),
}

impl<T> BestEffort<T> {
    /// Keeps the value if the work succeeded, otherwise logs the reason and appends it to the warnings.
    pub fn into_option(self, warnings: &mut Vec<String>) -> Option<T> {
        match self {
            BestEffort::Done(value) => Some(value),
            BestEffort::Degraded(reason) => {
                log::warn!("{}", reason);
                warnings.push(reason);
                None
            }
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, BestEffort::Done(_))
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for BestEffort<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => BestEffort::Done(value),
            Err(error) => BestEffort::Degraded(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_error_lowercases_the_propagated_source() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "No such file");
        let error = ContextError::with_error("Failed to read font", &source);
        assert_eq!(error.to_string(), "Failed to read font: no such file");
    }

    #[test]
    fn degraded_work_lands_in_the_warnings() {
        let mut warnings = Vec::new();
        let outcome: BestEffort<u8> = BestEffort::Degraded("Image timed out".into());
        assert_eq!(outcome.into_option(&mut warnings), None);
        assert_eq!(warnings, vec!["Image timed out".to_string()]);

        let outcome: BestEffort<u8> = Ok::<u8, ContextError>(3).into();
        assert_eq!(outcome.into_option(&mut warnings), Some(3));
        assert_eq!(warnings.len(), 1);
    }
}
