//! Serializer selection
//!
//! Pool backends choose between a generic structural serializer and this
//! engine through one environment variable, read once per process.

use once_cell::sync::Lazy;

/// Environment variable consulted by pool backends
pub const SERIALIZER_ENV: &str = "FERRY_SERIALIZER";

/// Which serializer a pool backend should use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializerChoice {
    /// Structural encoding only; dynamic definitions are not transmissible
    Generic,
    /// This engine
    Ferry,
}

static CHOICE: Lazy<SerializerChoice> = Lazy::new(|| {
    match std::env::var(SERIALIZER_ENV).as_deref() {
        Ok("generic") => SerializerChoice::Generic,
        Ok("ferry") | Err(_) => SerializerChoice::Ferry,
        Ok(other) => {
            log::warn!("unknown {SERIALIZER_ENV} value '{other}', defaulting to ferry");
            SerializerChoice::Ferry
        }
    }
});

/// The process's serializer choice (cached after the first call)
pub fn serializer_choice() -> SerializerChoice {
    *CHOICE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_is_stable() {
        // Whatever the environment says, repeated reads must agree.
        assert_eq!(serializer_choice(), serializer_choice());
    }
}
