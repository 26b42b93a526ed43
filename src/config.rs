use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};

use crate::types::SysIdError;

/// A model configuration that can be checked and read from JSON.
///
/// Hyperparameter dictionaries map directly onto the config fields.
pub trait ModelConfig: Sized + DeserializeOwned {
    /// Reject out-of-range settings.
    fn validate(&self) -> Result<(), SysIdError>;

    /// Parse and validate a JSON object of hyperparameters.
    ///
    /// Missing keys take their defaults.
    fn from_json(json: &str) -> Result<Self, SysIdError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SysIdError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Deserialize a boolean given either as a JSON bool or as `"true"` / `"false"`.
pub(crate) fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(s) => match s.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(D::Error::custom(format!(
                "expected \"true\" or \"false\", got {other:?}"
            ))),
        },
    }
}

/// Check that a regularization strength is usable.
pub(crate) fn positive(value: f64, name: &str) -> Result<(), SysIdError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(SysIdError::Config(format!(
            "{name} must be positive and finite, got {value}"
        )));
    }
    Ok(())
}
