use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// How a write composes with an object already stored at the same path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// New content fully replaces any existing object.
    #[default]
    Rewrite,
    /// New content is concatenated after the existing content. A missing
    /// object is created. Backends without append support reject it.
    Append,
}

impl WriteMode {
    pub fn is_append(self) -> bool {
        matches!(self, Self::Append)
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rewrite => write!(f, "rewrite"),
            Self::Append => write!(f, "append"),
        }
    }
}

impl FromStr for WriteMode {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rewrite" => Ok(Self::Rewrite),
            "append" => Ok(Self::Append),
            _ => Err(TypeError::UnknownWriteMode(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_rewrite() {
        assert_eq!(WriteMode::default(), WriteMode::Rewrite);
        assert!(!WriteMode::default().is_append());
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("append".parse::<WriteMode>().unwrap(), WriteMode::Append);
        assert_eq!("Rewrite".parse::<WriteMode>().unwrap(), WriteMode::Rewrite);
        assert_eq!(WriteMode::Append.to_string(), "append");
    }

    #[test]
    fn parse_unknown() {
        let err = "truncate".parse::<WriteMode>().unwrap_err();
        assert_eq!(err, TypeError::UnknownWriteMode("truncate".into()));
    }

    #[test]
    fn serde_lowercase() {
        let json = serde_json::to_string(&WriteMode::Append).unwrap();
        assert_eq!(json, r#""append""#);
    }
}
