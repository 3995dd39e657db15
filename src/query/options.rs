//! Query options
//!
//! Mirrors the knobs of the client API: `get_units`, `get_status`,
//! `get_info`, plus an optional deadline for the whole query.

use std::time::Duration;

/// Per-query options for [`QueryEngine::get_data`](crate::query::QueryEngine::get_data)
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Attach the channel's unit label to each result
    pub include_units: bool,
    /// Attach the status/enum-state dictionary to each result
    pub include_status: bool,
    /// Attach source metadata (archive path, description, read counters)
    pub include_info: bool,
    /// Overall deadline; a query that exceeds it returns the partial
    /// results accumulated so far, tagged `DeadlineExceeded` per channel
    pub deadline: Option<Duration>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn units(mut self) -> Self {
        self.include_units = true;
        self
    }

    pub fn status(mut self) -> Self {
        self.include_status = true;
        self
    }

    pub fn info(mut self) -> Self {
        self.include_info = true;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = QueryOptions::new()
            .units()
            .info()
            .deadline(Duration::from_secs(5));
        assert!(options.include_units);
        assert!(!options.include_status);
        assert!(options.include_info);
        assert_eq!(options.deadline, Some(Duration::from_secs(5)));
    }
}
