//! Error code interface shared by every testhost crate.
//!
//! Each crate defines its own `thiserror` enum and implements
//! [`ErrorCode`] on it, so the application layer can log, classify and
//! map failures to exit codes without matching on concrete types.
//!
//! # Example
//!
//! ```
//! use testhost_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum GateError {
//!     Cancelled,
//!     Closed,
//! }
//!
//! impl ErrorCode for GateError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Cancelled => "GATE_CANCELLED",
//!             Self::Closed => "GATE_CLOSED",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         false
//!     }
//! }
//!
//! assert_eq!(GateError::Closed.code(), "GATE_CLOSED");
//! ```

/// Machine-readable error classification.
///
/// # Code Format
///
/// - `UPPER_SNAKE_CASE`
/// - prefixed with the owning layer (`BUS_`, `IPC_`, `SESSION_`, ...)
/// - stable once published: controllers and log pipelines match on it
///
/// # Recoverability
///
/// An error is recoverable when retrying the same operation may succeed
/// (a connect that raced the server's bind, a transient I/O failure).
/// Programming errors such as an unregistered serializer or a second
/// test framework are never recoverable.
pub trait ErrorCode {
    /// Returns the stable machine-readable code.
    fn code(&self) -> &'static str;

    /// Returns whether a retry may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Validates that an error code follows the naming convention.
///
/// # Panics
///
/// Panics if the code is empty, lacks `expected_prefix`, or is not
/// `UPPER_SNAKE_CASE`.
///
/// # Example
///
/// ```
/// use testhost_types::{assert_error_code, ErrorCode};
///
/// #[derive(Debug)]
/// struct Lost;
///
/// impl ErrorCode for Lost {
///     fn code(&self) -> &'static str { "IPC_LOST" }
///     fn is_recoverable(&self) -> bool { true }
/// }
///
/// assert_error_code(&Lost, "IPC_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );
    assert!(
        is_upper_snake_case(code),
        "Error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Validates every variant of an error enum at once.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }

    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum SampleError {
        Transient,
        Permanent,
    }

    impl ErrorCode for SampleError {
        fn code(&self) -> &'static str {
            match self {
                Self::Transient => "SAMPLE_TRANSIENT",
                Self::Permanent => "SAMPLE_PERMANENT",
            }
        }

        fn is_recoverable(&self) -> bool {
            matches!(self, Self::Transient)
        }
    }

    #[test]
    fn error_code_trait() {
        assert_eq!(SampleError::Transient.code(), "SAMPLE_TRANSIENT");
        assert!(SampleError::Transient.is_recoverable());
        assert!(!SampleError::Permanent.is_recoverable());
    }

    #[test]
    fn assert_error_codes_all_variants() {
        assert_error_codes(&[SampleError::Transient, SampleError::Permanent], "SAMPLE_");
    }

    #[test]
    #[should_panic(expected = "must start with prefix")]
    fn assert_error_code_wrong_prefix() {
        assert_error_code(&SampleError::Transient, "WRONG_");
    }

    #[test]
    fn upper_snake_case_rules() {
        assert!(is_upper_snake_case("BUS_CLOSED"));
        assert!(is_upper_snake_case("IPC_TIMEOUT_2"));
        assert!(!is_upper_snake_case(""));
        assert!(!is_upper_snake_case("bus_closed"));
        assert!(!is_upper_snake_case("_BUS"));
        assert!(!is_upper_snake_case("BUS_"));
        assert!(!is_upper_snake_case("BUS__CLOSED"));
    }
}
