use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A wrapper for sensitive click data (IP address, user agent, session id) that
/// masks its value in Debug/Display output.
#[derive(Clone, Deserialize, PartialEq)]
pub struct Masked<T>(pub T);

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Serialization passes the real value through; the wrapper exists to
        // prevent accidental leakage in log macros like tracing::info!("{:?}", click).
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_masked() {
        let ip = Masked("203.0.113.7".to_string());
        assert_eq!(format!("{:?}", ip), "********");
        assert_eq!(format!("{}", ip), "********");
    }

    #[test]
    fn serialization_keeps_real_value() {
        let ip = Masked("203.0.113.7".to_string());
        assert_eq!(serde_json::to_string(&ip).unwrap(), "\"203.0.113.7\"");
    }
}
