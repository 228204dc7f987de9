use std::fmt;

/// Why a translation was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The engine failed; carries its error message.
    EngineFailed(String),
    UnknownEngine(String),
    EmptyResult,
    SameAsSource,
    /// The result starts with a marker engines use for errors or status text.
    MarkerPrefix(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::EngineFailed(message) => write!(f, "engine failed: {message}"),
            FailureReason::UnknownEngine(id) => write!(f, "no engine registered as '{id}'"),
            FailureReason::EmptyResult => f.write_str("result is empty"),
            FailureReason::SameAsSource => f.write_str("result is identical to the source"),
            FailureReason::MarkerPrefix(prefix) => {
                write!(f, "result starts with status marker '{prefix}'")
            }
        }
    }
}

/// Rejects engine output that is not a real translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultValidator {
    reject_prefixes: Vec<String>,
}

impl Default for ResultValidator {
    fn default() -> Self {
        Self {
            reject_prefixes: vec!["[".to_string()],
        }
    }
}

impl ResultValidator {
    pub fn new(reject_prefixes: Vec<String>) -> Self {
        let reject_prefixes = reject_prefixes
            .into_iter()
            .filter(|prefix| !prefix.is_empty())
            .collect();
        Self { reject_prefixes }
    }

    pub fn reject_prefixes(&self) -> &[String] {
        &self.reject_prefixes
    }

    /// Returns the trimmed result when it passes, the reason otherwise.
    /// `source` must already be trimmed.
    pub fn validate(&self, source: &str, result: &str) -> Result<String, FailureReason> {
        let result = result.trim();
        if result.is_empty() {
            return Err(FailureReason::EmptyResult);
        }
        if result == source {
            return Err(FailureReason::SameAsSource);
        }
        if let Some(prefix) = self
            .reject_prefixes
            .iter()
            .find(|prefix| result.starts_with(prefix.as_str()))
        {
            return Err(FailureReason::MarkerPrefix(prefix.clone()));
        }
        Ok(result.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rejects_non_answers() {
        let validator = ResultValidator::default();
        assert_eq!(validator.validate("hola", "   "), Err(FailureReason::EmptyResult));
        assert_eq!(validator.validate("hola", " hola "), Err(FailureReason::SameAsSource));
        assert_eq!(
            validator.validate("hola", "[rate limited]"),
            Err(FailureReason::MarkerPrefix("[".into()))
        );
        assert_eq!(validator.validate("hola", " hello\n").as_deref(), Ok("hello"));
    }

    #[test]
    fn prefixes_are_configurable() {
        let validator = ResultValidator::new(vec!["ERROR:".into(), String::new()]);
        assert_eq!(validator.reject_prefixes(), &["ERROR:".to_string()]);
        assert!(validator.validate("a", "[note] b").is_ok());
        assert!(validator.validate("a", "ERROR: quota").is_err());
    }
}
