use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Feature flag data type.
///
/// Tokens carry it as a one-letter tag (`s`, `i`, `b`); resolved flags
/// expose the full name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagType {
    String,
    Integer,
    Boolean,
}

impl FlagType {
    /// Resolves a token type tag (`s`, `i`, `b`).
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "s" => Some(Self::String),
            "i" => Some(Self::Integer),
            "b" => Some(Self::Boolean),
            _ => None,
        }
    }

    /// `string`, `integer` or `boolean`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

impl std::fmt::Display for FlagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A feature flag value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Boolean(bool),
    Integer(i64),
    String(String),
}

impl FlagValue {
    /// Reads `value` as `kind`; `None` if it holds anything else.
    pub(crate) fn from_json(value: &JsonValue, kind: FlagType) -> Option<Self> {
        match (kind, value) {
            (FlagType::Boolean, JsonValue::Bool(b)) => Some(Self::Boolean(*b)),
            (FlagType::Integer, JsonValue::Number(n)) => n.as_i64().map(Self::Integer),
            (FlagType::String, JsonValue::String(s)) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    /// The type this value holds.
    #[must_use]
    pub fn kind(&self) -> FlagType {
        match self {
            Self::Boolean(_) => FlagType::Boolean,
            Self::Integer(_) => FlagType::Integer,
            Self::String(_) => FlagType::String,
        }
    }

    /// The boolean, if this is a boolean flag value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer, if this is an integer flag value.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// The string, if this is a string flag value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for FlagValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<String> for FlagValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for FlagValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

/// A resolved feature flag.
///
/// `is_default` is true exactly when the token carried no value for the flag
/// and `value` came from the caller's default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureFlag {
    pub code: String,
    #[serde(rename = "type")]
    pub kind: FlagType,
    pub value: Option<FlagValue>,
    pub is_default: bool,
    #[serde(rename = "defaultValue")]
    pub default_value: Option<FlagValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum FlagError {
    #[error("Flag {code} was not found, and no default value has been provided")]
    NotFound { code: String },
    #[error("Flag {code} is of type {declared} - requested type {requested}")]
    TypeMismatch {
        code: String,
        declared: String,
        requested: FlagType,
    },
    #[error("Flag {code} has a value that is not a valid {expected}")]
    InvalidValue { code: String, expected: FlagType },
}

/// Resolves flag `code` from the access token's `feature_flags` claim.
///
/// A record that is missing, not an object, or an empty object counts as
/// absent.
pub(crate) fn resolve_flag(
    feature_flags: Option<&JsonValue>,
    code: &str,
    default_value: Option<FlagValue>,
    requested: FlagType,
) -> Result<FeatureFlag, FlagError> {
    let record = feature_flags
        .and_then(|flags| flags.get(code))
        .and_then(JsonValue::as_object)
        .filter(|record| !record.is_empty());

    let Some(record) = record else {
        return match default_value {
            Some(default) => Ok(FeatureFlag {
                code: code.to_owned(),
                kind: requested,
                value: Some(default.clone()),
                is_default: true,
                default_value: Some(default),
            }),
            None => Err(FlagError::NotFound {
                code: code.to_owned(),
            }),
        };
    };

    let declared = match record.get("t") {
        None | Some(JsonValue::Null) => requested,
        Some(tag) => {
            match tag.as_str().and_then(FlagType::from_tag) {
                Some(kind) if kind == requested => kind,
                Some(kind) => {
                    return Err(FlagError::TypeMismatch {
                        code: code.to_owned(),
                        declared: kind.name().to_owned(),
                        requested,
                    });
                }
                None => {
                    return Err(FlagError::TypeMismatch {
                        code: code.to_owned(),
                        declared: tag.as_str().map_or_else(|| tag.to_string(), str::to_owned),
                        requested,
                    });
                }
            }
        }
    };

    let token_value = match record.get("v") {
        None | Some(JsonValue::Null) => None,
        Some(raw) => Some(FlagValue::from_json(raw, declared).ok_or_else(|| FlagError::InvalidValue {
            code: code.to_owned(),
            expected: declared,
        })?),
    };

    Ok(FeatureFlag {
        code: code.to_owned(),
        kind: declared,
        is_default: token_value.is_none(),
        value: token_value.or_else(|| default_value.clone()),
        default_value,
    })
}
