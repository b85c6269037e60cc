//! Whole-document persistence port.

use crate::domain::error::TraderError;

/// Loads and saves one snapshot document of type `T`.
pub trait StatePort<T>: Send + Sync {
    /// The stored document, or `None` when it is missing or unreadable.
    fn load(&self) -> Option<T>;

    /// Replace the stored document. Implementations must not leave a
    /// half-written document behind on failure.
    fn save(&self, value: &T) -> Result<(), TraderError>;

    /// Human-readable location for log messages.
    fn location(&self) -> String;
}
