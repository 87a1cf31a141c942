use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Limit,
    Offset,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitKind::Limit => write!(f, "limit"),
            LimitKind::Offset => write!(f, "offset"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtErrorCode {
    WrongCount,
    NegativeLimit,
    NegativeOffset,
    DivisionByZero,
    Overflow,
    TooManyParams,
    TypeMismatch,
    Backend,
    InvalidConfig,
    Internal,
}

impl AtErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            AtErrorCode::WrongCount => "at:wrong_count",
            AtErrorCode::NegativeLimit => "expr:at:limit:negative",
            AtErrorCode::NegativeOffset => "expr:at:offset:negative",
            AtErrorCode::DivisionByZero => "expr:div_by_zero",
            AtErrorCode::Overflow => "expr:overflow",
            AtErrorCode::TooManyParams => "sql:too_many_params",
            AtErrorCode::TypeMismatch => "expr:type_mismatch",
            AtErrorCode::Backend => "sql:backend",
            AtErrorCode::InvalidConfig => "invalid_config",
            AtErrorCode::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AtError {
    #[error("{}", cardinality_message(.count, .noun))]
    Cardinality { count: usize, noun: &'static str },
    #[error("negative {kind}: {value}")]
    NegativeLimit { kind: LimitKind, value: i64 },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in '{op}'")]
    Overflow { op: &'static str },
    #[error("too many SQL parameters: {count} (max {max})")]
    TooManyParams { count: usize, max: usize },
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
    #[error("backend error: {0}")]
    Backend(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("internal error: {0}")]
    Internal(String),
}

fn cardinality_message(count: &usize, noun: &str) -> String {
    if *count == 0 {
        format!("No {noun} found")
    } else {
        format!("Multiple {noun} found: {count}")
    }
}

impl AtError {
    pub fn internal(message: impl Into<String>) -> Self {
        AtError::Internal(message.into())
    }

    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        AtError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn code(&self) -> AtErrorCode {
        match self {
            AtError::Cardinality { .. } => AtErrorCode::WrongCount,
            AtError::NegativeLimit {
                kind: LimitKind::Limit,
                ..
            } => AtErrorCode::NegativeLimit,
            AtError::NegativeLimit {
                kind: LimitKind::Offset,
                ..
            } => AtErrorCode::NegativeOffset,
            AtError::DivisionByZero => AtErrorCode::DivisionByZero,
            AtError::Overflow { .. } => AtErrorCode::Overflow,
            AtError::TooManyParams { .. } => AtErrorCode::TooManyParams,
            AtError::TypeMismatch { .. } => AtErrorCode::TypeMismatch,
            AtError::Backend(_) => AtErrorCode::Backend,
            AtError::InvalidConfig { .. } => AtErrorCode::InvalidConfig,
            AtError::Internal(_) => AtErrorCode::Internal,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// Error code with the offending detail appended, e.g. `at:wrong_count:2`.
    pub fn detailed_code(&self) -> String {
        match self {
            AtError::Cardinality { count, .. } => format!("{}:{count}", self.code_str()),
            AtError::NegativeLimit { value, .. } => format!("{}:{value}", self.code_str()),
            AtError::TooManyParams { count, .. } => format!("{}:{count}", self.code_str()),
            _ => self.code_str().to_string(),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, AtError::Internal(_))
    }
}
