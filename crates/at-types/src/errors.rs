use thiserror::Error;

/// Main error type for the autotune system
#[derive(Error, Debug)]
pub enum AtError {
    #[error("Parameter error: {0}")]
    Param(ParamError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Optimization goal not found: {goal} (available: {available:?})")]
    GoalNotFound { goal: String, available: Vec<String> },

    #[error("Every evaluation failed in bracket {bracket}, round {round}: {source}")]
    RoundFailed {
        bracket: usize,
        round: usize,
        #[source]
        source: EvaluationError,
    },

    #[error("No evaluation completed successfully")]
    NoSuccessfulEvaluations,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Hyperparameter definition and lookup errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("Invalid bounds for {name}: min {min} is greater than max {max}")]
    InvalidBounds { name: String, min: f64, max: f64 },

    #[error("Non-finite bounds for {name}: [{min}, {max}]")]
    NonFiniteBounds { name: String, min: f64, max: f64 },

    #[error("Invalid quantization interval for {name}: {interval}")]
    InvalidInterval { name: String, interval: f64 },

    #[error("Invalid log base for {name}: {base}")]
    InvalidLogBase { name: String, base: f64 },

    #[error("Duplicate hyperparameter name: {name}")]
    DuplicateName { name: String },

    #[error("Hyperparameter not found: {name}")]
    NotFound { name: String },

    #[error("No default value for hyperparameter {name} was supplied")]
    MissingDefault { name: String },

    #[error("Cannot normalize {name}: min and max are both {value}")]
    DegenerateRange { name: String, value: f64 },
}

/// Errors raised by an evaluator while consuming resources
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Evaluation failed: {message}")]
    Failed { message: String },

    #[error("Training diverged at {resources} resources")]
    Diverged { resources: f64 },

    #[error("Resources exhausted: requested {requested}, available {available}")]
    ResourceExhausted { requested: f64, available: f64 },

    #[error("Resource level must not decrease: previous {previous}, requested {requested}")]
    NonMonotonicResources { previous: f64, requested: f64 },

    #[error("Optimization goal {goal} is not a number")]
    NotANumber { goal: String },
}

impl ParamError {
    /// True for errors in how a parameter or domain is defined, as opposed to
    /// lookups and draws against a valid one.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidBounds { .. }
                | Self::NonFiniteBounds { .. }
                | Self::InvalidInterval { .. }
                | Self::InvalidLogBase { .. }
                | Self::DuplicateName { .. }
        )
    }
}

/// Definition errors are configuration errors; the rest stay parameter errors.
impl From<ParamError> for AtError {
    fn from(error: ParamError) -> Self {
        if error.is_definition_error() {
            AtError::Config(error.to_string())
        } else {
            AtError::Param(error)
        }
    }
}

/// Result type alias for autotune operations
pub type AtResult<T> = Result<T, AtError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::errors::AtError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::errors::AtError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::errors::AtError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ParamError::InvalidBounds {
            name: "momentum".to_string(),
            min: 0.9,
            max: 0.3,
        };

        assert!(error.to_string().contains("Invalid bounds"));
        assert!(error.to_string().contains("momentum"));
        assert!(error.to_string().contains("0.9"));
    }

    #[test]
    fn test_error_conversion() {
        let param_error = ParamError::MissingDefault {
            name: "batch_size".to_string(),
        };
        let at_error: AtError = param_error.into();

        match at_error {
            AtError::Param(ParamError::MissingDefault { name }) => assert_eq!(name, "batch_size"),
            _ => panic!("Expected Param error"),
        }

        let bounds_error = ParamError::InvalidBounds {
            name: "momentum".to_string(),
            min: 0.9,
            max: 0.3,
        };
        let at_error: AtError = bounds_error.into();
        match at_error {
            AtError::Config(message) => assert!(message.contains("Invalid bounds for momentum")),
            other => panic!("Expected Config error, got {other:?}"),
        }

        let eval_error = EvaluationError::Diverged { resources: 9.0 };
        let at_error: AtError = eval_error.into();
        assert!(matches!(at_error, AtError::Evaluation(_)));
    }

    #[test]
    fn test_round_failed_keeps_source() {
        let error = AtError::RoundFailed {
            bracket: 2,
            round: 0,
            source: EvaluationError::Failed {
                message: "out of memory".to_string(),
            },
        };
        let source = std::error::Error::source(&error).map(|e| e.to_string());
        assert_eq!(source.as_deref(), Some("Evaluation failed: out of memory"));
    }

    #[test]
    fn test_macros() {
        let validation_err = validation_error!("Invalid value: {}", 42);
        assert!(matches!(validation_err, AtError::Validation(_)));
        let internal_err = internal_error!("Something went wrong");
        assert!(matches!(internal_err, AtError::Internal(_)));
        let config_err = config_error!("Missing required field: {}", "max_iter");
        assert_eq!(
            config_err.to_string(),
            "Configuration error: Missing required field: max_iter"
        );
    }
}
