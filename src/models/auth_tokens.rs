use serde::{Deserialize, Serialize};

/// Token pair returned by `/authenticate` and `/authenticate/refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
}
