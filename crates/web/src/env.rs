//! The runtime environment of the application.

use std::fmt;
use std::str::FromStr;

/// Environment variable selecting the runtime environment.
pub const ENV_VARIABLE: &str = "EMBER_ENV";

/// The runtime environment, selected through `EMBER_ENV`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnvType {
    #[default]
    Development,
    Production,
    Test,
}

impl EnvType {
    /// Reads the current environment from `EMBER_ENV`. Unset or unknown
    /// values mean development.
    pub fn current() -> Self {
        std::env::var(ENV_VARIABLE)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for EnvType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            _ => Err(()),
        }
    }
}

impl fmt::Display for EnvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        };
        f.write_str(name)
    }
}
