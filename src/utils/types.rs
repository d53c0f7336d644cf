use serde::{Deserialize, Deserializer, Serialize};

/// Envelope for the non-UDF JSON routes.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data) }
    }
}

/// Exchange payloads mix `"0.001"` and `0.001`; accept both.
pub fn f64_from_any<'de, D>(de: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Num {
        F(f64),
        S(String),
    }

    match Num::deserialize(de)? {
        Num::F(v) => Ok(v),
        Num::S(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

/// Same as [`f64_from_any`] but tolerates `null` / missing values.
pub fn opt_f64_from_any<'de, D>(de: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Num {
        F(f64),
        S(String),
    }

    match Option::<Num>::deserialize(de)? {
        None => Ok(None),
        Some(Num::F(v)) => Ok(Some(v)),
        Some(Num::S(s)) if s.trim().is_empty() => Ok(None),
        Some(Num::S(s)) => s.trim().parse::<f64>().map(Some).map_err(serde::de::Error::custom),
    }
}
