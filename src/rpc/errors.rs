//! Inspection helpers for batch responses carrying per-item results.

use std::fmt;

use crate::rpc::common::Error;

/// A result message that reports success plus optional error details.
pub trait ResultWithError {
    fn success(&self) -> bool;
    fn error(&self) -> Option<&Error>;
}

/// A response message holding a list of results.
pub trait ResponseWithResults<T: ResultWithError> {
    fn results(&self) -> &[T];
}

/// One failed entry of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResult<'a, T> {
    pub index: usize,
    pub result: &'a T,
    pub error: Option<&'a Error>,
}

impl<T> fmt::Display for ErrorResult<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.error.map(|e| e.message.as_str()).unwrap_or("unknown error");
        write!(f, "Error in response at index {}: {}", self.index, message)
    }
}

/// Every failed entry of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResultList<'a, T>(pub Vec<ErrorResult<'a, T>>);

impl<'a, T> ErrorResultList<'a, T> {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorResult<'a, T>> {
        self.0.iter()
    }
}

impl<T> fmt::Display for ErrorResultList<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl<T: fmt::Debug> std::error::Error for ErrorResultList<'_, T> {}

/// Collect the failed entries of `results`. `Ok(())` when all succeeded.
pub fn check_if_any_errors<T: ResultWithError>(results: &[T]) -> Result<(), ErrorResultList<'_, T>> {
    let failed: Vec<_> = results
        .iter()
        .enumerate()
        .filter(|(_, result)| !result.success())
        .map(|(index, result)| ErrorResult {
            index,
            result,
            error: result.error(),
        })
        .collect();

    if failed.is_empty() {
        Ok(())
    } else {
        Err(ErrorResultList(failed))
    }
}

/// [`check_if_any_errors`] over the results of a batch response.
pub fn check_if_response_has_errors<R, T>(response: &R) -> Result<(), ErrorResultList<'_, T>>
where
    R: ResponseWithResults<T>,
    T: ResultWithError,
{
    check_if_any_errors(response.results())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Item {
        ok: bool,
        error: Option<Error>,
    }

    impl ResultWithError for Item {
        fn success(&self) -> bool {
            self.ok
        }

        fn error(&self) -> Option<&Error> {
            self.error.as_ref()
        }
    }

    struct Batch(Vec<Item>);

    impl ResponseWithResults<Item> for Batch {
        fn results(&self) -> &[Item] {
            &self.0
        }
    }

    fn failed(message: &str) -> Item {
        Item {
            ok: false,
            error: Some(Error {
                code: 3,
                message: message.to_string(),
            }),
        }
    }

    fn passed() -> Item {
        Item { ok: true, error: None }
    }

    #[test]
    fn all_successful() {
        assert!(check_if_any_errors(&[passed(), passed()]).is_ok());
        assert!(check_if_any_errors::<Item>(&[]).is_ok());
    }

    #[test]
    fn collects_failures_with_index() {
        let batch = Batch(vec![passed(), failed("bad name"), passed(), failed("bad id")]);
        let errors = check_if_response_has_errors(&batch).unwrap_err();

        let indexes: Vec<_> = errors.iter().map(|e| e.index).collect();
        assert_eq!(indexes, vec![1, 3]);
        assert_eq!(
            errors.to_string(),
            "Error in response at index 1: bad name\nError in response at index 3: bad id"
        );
    }

    #[test]
    fn failure_without_details() {
        let items = [Item { ok: false, error: None }];
        let errors = check_if_any_errors(&items).unwrap_err();
        assert_eq!(errors.to_string(), "Error in response at index 0: unknown error");
    }
}
