//! Scatter/gather helper.

use crate::error::Error;

/// Collapse fan-out outcomes into the successes and the last observed
/// error. Every branch has already run to completion by the time this is
/// called; error multiplicity is intentionally lost.
pub(crate) fn collect<T>(results: Vec<Result<T, Error>>) -> (Vec<T>, Option<Error>) {
    let mut values = Vec::with_capacity(results.len());
    let mut last_err = None;
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(err) => last_err = Some(err),
        }
    }
    (values, last_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_successes_and_last_error() {
        let (values, err) = collect(vec![
            Ok(1),
            Err(Error::MissingMetricName),
            Ok(2),
            Err(Error::Stopped),
        ]);
        assert_eq!(values, vec![1, 2]);
        assert!(matches!(err, Some(Error::Stopped)));
    }

    #[test]
    fn no_error_when_all_succeed() {
        let (values, err) = collect::<i32>(vec![Ok(3)]);
        assert_eq!(values, vec![3]);
        assert!(err.is_none());
    }
}
