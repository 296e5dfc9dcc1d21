//! Tri-state operation status.
//!
//! Every read primitive either finishes (`Done`), reports that the bytes it
//! needs have not arrived yet (`NeedMoreData`), or fails with an error. The
//! error arm is carried by the surrounding `Result`, so the full status of a
//! step is `Result<Progress<T>, E>`.
//!
//! [`try_progress!`](crate::try_progress) is the `?` of the `NeedMoreData`
//! arm: it unwraps a `Done` value or returns `NeedMoreData` from the caller.

/// Outcome of a step that may need more bytes than are buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Progress<T> {
    /// The step completed with a value.
    Done(T),
    /// The step could not complete with the bytes currently buffered.
    NeedMoreData,
}

impl<T> Progress<T> {
    /// Returns `true` if the step completed.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Returns `true` if the step is waiting for more bytes.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::NeedMoreData)
    }

    /// Map the completed value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Progress<U> {
        match self {
            Self::Done(v) => Progress::Done(f(v)),
            Self::NeedMoreData => Progress::NeedMoreData,
        }
    }

    /// Chain a step that runs only if this one completed.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Progress<U>) -> Progress<U> {
        match self {
            Self::Done(v) => f(v),
            Self::NeedMoreData => Progress::NeedMoreData,
        }
    }

    /// Convert into an `Option`, discarding the pending state.
    pub fn done(self) -> Option<T> {
        match self {
            Self::Done(v) => Some(v),
            Self::NeedMoreData => None,
        }
    }
}

impl<T> From<Option<T>> for Progress<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Done(v),
            None => Self::NeedMoreData,
        }
    }
}

/// Unwrap a `Result<Progress<T>, E>` or return early.
///
/// Errors propagate through `?` (so `From` conversions apply) and
/// `NeedMoreData` is returned as `Ok(Progress::NeedMoreData)`.
#[macro_export]
macro_rules! try_progress {
    ($e:expr) => {
        match $e? {
            $crate::Progress::Done(value) => value,
            $crate::Progress::NeedMoreData => return Ok($crate::Progress::NeedMoreData),
        }
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn halve(v: Progress<u32>) -> Result<Progress<u32>, ()> {
        let n = try_progress!(Ok::<_, ()>(v));
        Ok(Progress::Done(n / 2))
    }

    #[test]
    fn test_try_progress_passes_through() {
        assert_eq!(halve(Progress::Done(8)).unwrap(), Progress::Done(4));
        assert_eq!(halve(Progress::NeedMoreData).unwrap(), Progress::NeedMoreData);
    }

    #[test]
    fn test_option_conversion() {
        assert!(Progress::from(Some(1)).is_done());
        assert!(Progress::<u8>::from(None).is_pending());
        assert_eq!(Progress::Done(3).map(|v| v + 1).done(), Some(4));
        assert!(Progress::Done(1).and_then(|_| Progress::<u8>::NeedMoreData).is_pending());
    }
}
