#![forbid(unsafe_code)]

//! Error type shared by every binding kind.

/// Errors reported by bindings.
///
/// Bindings in this crate only fail when a lock has been poisoned by a
/// panicking thread. [`KeyTypeMismatch`](Self::KeyTypeMismatch) is produced
/// as a diagnostic by registry lookups and logged, never returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// A binding's internal lock was poisoned (another thread panicked while holding it).
    PoisonedLock,
    /// A preference key is already bound to a different value type.
    KeyTypeMismatch {
        /// The preference key that was looked up.
        key: String,
        /// The value type requested by the caller.
        expected: &'static str,
        /// The value type of the binding already registered for `key`.
        found: &'static str,
    },
}

impl std::fmt::Display for BindingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PoisonedLock => write!(f, "binding lock was poisoned"),
            Self::KeyTypeMismatch {
                key,
                expected,
                found,
            } => write!(
                f,
                "a different type is already bound to key '{key}' (expected {expected}, found {found})"
            ),
        }
    }
}

impl std::error::Error for BindingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = BindingError::PoisonedLock;
        assert_eq!(e.to_string(), "binding lock was poisoned");

        let e = BindingError::KeyTypeMismatch {
            key: "volume".into(),
            expected: "int",
            found: "string",
        };
        assert_eq!(
            e.to_string(),
            "a different type is already bound to key 'volume' (expected int, found string)"
        );
    }
}
