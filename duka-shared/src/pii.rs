use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for values that must never reach the logs: phone numbers,
/// email addresses, gateway credentials.
///
/// `Debug` and `Display` print a fixed mask. `Serialize` writes the real
/// value because API responses and outbound gateway payloads need it.
#[derive(Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Masked<T> {
    fn from(value: T) -> Self {
        Masked(value)
    }
}

impl Masked<String> {
    /// True when the wrapped secret is missing or blank.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}
