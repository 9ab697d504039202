//! Chip Options
//!
//! Combinators take typed options structs. The serializable ones can also be
//! read from a JSON value with [`fill_in_options`]: missing keys keep their
//! defaults and unknown keys are logged and ignored, so a stale configuration
//! never stops a running application.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{ChipError, Result};

/// Build options of type `T` from a JSON object, starting from `T::default()`.
///
/// ```rust
/// use trellis_core::options::fill_in_options;
/// use trellis_core::combinators::SequenceOptions;
/// use serde_json::json;
///
/// let options: SequenceOptions = fill_in_options(&json!({ "loop": true })).unwrap();
/// assert!(options.looping);
/// assert!(options.terminate_on_completion);
/// ```
pub fn fill_in_options<T>(value: &Value) -> Result<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    let mut merged = serde_json::to_value(T::default()).map_err(ChipError::Options)?;

    match (value, &mut merged) {
        (Value::Null, _) => {}
        (Value::Object(provided), Value::Object(defaults)) => {
            for (key, option) in provided {
                if defaults.contains_key(key) {
                    defaults.insert(key.clone(), option.clone());
                } else {
                    warn!(
                        option = %key,
                        options = std::any::type_name::<T>(),
                        "ignoring unknown option"
                    );
                }
            }
        }
        _ => {
            return serde_json::from_value(value.clone()).map_err(ChipError::Options);
        }
    }

    serde_json::from_value(merged).map_err(ChipError::Options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Volume {
        level: f64,
        muted: bool,
    }

    impl Default for Volume {
        fn default() -> Self {
            Self {
                level: 1.0,
                muted: false,
            }
        }
    }

    #[test]
    fn missing_keys_keep_defaults() {
        let volume: Volume = fill_in_options(&json!({ "muted": true })).unwrap();
        assert_eq!(
            volume,
            Volume {
                level: 1.0,
                muted: true
            }
        );
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let volume: Volume = fill_in_options(&json!({ "level": 0.5, "balance": 0.1 })).unwrap();
        assert_eq!(volume.level, 0.5);
    }

    #[test]
    fn null_means_defaults() {
        let volume: Volume = fill_in_options(&Value::Null).unwrap();
        assert_eq!(volume, Volume::default());
    }

    #[test]
    fn wrong_types_are_errors() {
        let err = fill_in_options::<Volume>(&json!({ "level": "loud" })).unwrap_err();
        assert_eq!(err.code(), "CHIP_OPTIONS");
        assert!(fill_in_options::<Volume>(&json!([1, 2])).is_err());
    }
}
