use crate::error::AtError;
use serde::{Deserialize, Serialize};

/// Upper bound on bind parameters in one statement accepted by the backend.
pub const DEFAULT_MAX_SQL_PARAMS: usize = 32767;
pub const DEFAULT_MUTATION_BATCH_SIZE: usize = 1000;
pub const DEFAULT_DECIMAL_FRAC_DIGITS: u32 = 20;

/// Compilation and execution settings shared by the relational and
/// collection paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub max_sql_params: usize,
    pub mutation_batch_size: usize,
    pub decimal_frac_digits: u32,
    pub log_sql: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_sql_params: DEFAULT_MAX_SQL_PARAMS,
            mutation_batch_size: DEFAULT_MUTATION_BATCH_SIZE,
            decimal_frac_digits: DEFAULT_DECIMAL_FRAC_DIGITS,
            log_sql: false,
        }
    }
}

impl CompilerConfig {
    pub fn production() -> Self {
        Self {
            log_sql: false,
            ..Self::default()
        }
    }

    pub fn development() -> Self {
        Self {
            log_sql: true,
            ..Self::default()
        }
    }

    pub fn with_max_sql_params(mut self, max: usize) -> Self {
        self.max_sql_params = max;
        self
    }

    pub fn with_mutation_batch_size(mut self, size: usize) -> Self {
        self.mutation_batch_size = size;
        self
    }

    pub fn with_decimal_frac_digits(mut self, digits: u32) -> Self {
        self.decimal_frac_digits = digits;
        self
    }

    pub fn with_log_sql(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), AtError> {
        if self.max_sql_params == 0 {
            return Err(AtError::InvalidConfig {
                message: "max_sql_params must be > 0".into(),
            });
        }
        if self.mutation_batch_size == 0 {
            return Err(AtError::InvalidConfig {
                message: "mutation_batch_size must be > 0".into(),
            });
        }
        if self.mutation_batch_size > self.max_sql_params {
            return Err(AtError::InvalidConfig {
                message: format!(
                    "mutation_batch_size {} exceeds max_sql_params {}",
                    self.mutation_batch_size, self.max_sql_params
                ),
            });
        }
        // rust_decimal carries at most 28 fractional digits
        if self.decimal_frac_digits > 28 {
            return Err(AtError::InvalidConfig {
                message: format!(
                    "decimal_frac_digits {} exceeds 28",
                    self.decimal_frac_digits
                ),
            });
        }
        Ok(())
    }
}
