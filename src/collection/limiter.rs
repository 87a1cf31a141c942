use crate::error::AtError;

/// Applies limit and offset to collection query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Limiter {
    None,
    /// Counts rows as they pass the filter, skipping `offset` and stopping after `limit`.
    Early {
        limit: u64,
        offset: u64,
        pos: u64,
        size: u64,
    },
    /// Slices the fully materialized result.
    Late { limit: u64, offset: u64 },
}

impl Limiter {
    pub fn new(limit: Option<u64>, offset: Option<u64>, early: bool) -> Self {
        if limit.is_none() && offset.is_none() {
            return Limiter::None;
        }
        let limit = limit.unwrap_or(u64::MAX);
        let offset = offset.unwrap_or(0);
        if early {
            Limiter::Early {
                limit,
                offset,
                pos: 0,
                size: 0,
            }
        } else {
            Limiter::Late { limit, offset }
        }
    }

    /// Whether another row may still be kept; iteration stops once this is false.
    pub fn process_limit(&self) -> bool {
        match self {
            Limiter::Early { limit, size, .. } => size < limit,
            Limiter::None | Limiter::Late { .. } => true,
        }
    }

    /// Called for each row that passed the filter; false skips the row.
    pub fn process_offset(&mut self) -> bool {
        match self {
            Limiter::Early {
                offset, pos, size, ..
            } => {
                let keep = *pos >= *offset;
                if keep {
                    *size += 1;
                }
                *pos += 1;
                keep
            }
            Limiter::None | Limiter::Late { .. } => true,
        }
    }

    pub fn finish<T>(&self, mut rows: Vec<T>) -> Result<Vec<T>, AtError> {
        match self {
            Limiter::None => Ok(rows),
            Limiter::Early { size, .. } => {
                if rows.len() as u64 != *size {
                    return Err(AtError::internal(format!(
                        "early limiter kept {size} rows, result has {}",
                        rows.len()
                    )));
                }
                Ok(rows)
            }
            Limiter::Late { limit, offset } => {
                let len = rows.len();
                let start = usize::try_from(*offset).unwrap_or(usize::MAX).min(len);
                let take = usize::try_from(*limit).unwrap_or(usize::MAX);
                let end = start.saturating_add(take).min(len);
                rows.truncate(end);
                rows.drain(..start);
                Ok(rows)
            }
        }
    }
}
