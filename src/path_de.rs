use serde::de::DeserializeOwned;
use serde_json::Value;

/// Deserialization failure with the JSON path it happened at.
#[derive(Debug, thiserror::Error)]
#[error("at JSON path {path} → {source}")]
pub struct PathError {
    pub path: String,
    #[source]
    pub source: serde_json::Error,
}

impl From<serde_path_to_error::Error<serde_json::Error>> for PathError {
    fn from(err: serde_path_to_error::Error<serde_json::Error>) -> Self {
        let path = err.path().to_string();
        Self { path, source: err.into_inner() }
    }
}

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, PathError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    Ok(serde_path_to_error::deserialize::<_, T>(de)?)
}

pub fn from_value_with_path<T: DeserializeOwned>(value: Value) -> Result<T, PathError> {
    Ok(serde_path_to_error::deserialize::<_, T>(value)?)
}
