use nifi_contracts::remote_error_text;

const TOKEN_PATH: &str = "/access/token";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bearer token issued by the remote server. Lives for one gateway request.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    pub code: &'static str,
    pub message: String,
    pub status: Option<u16>,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AuthError {}

impl From<reqwest::Error> for AuthError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            AuthError {
                code: "ERR_AUTH_TIMEOUT",
                message: "token request timed out".to_string(),
                status: None,
            }
        } else {
            AuthError {
                code: "ERR_AUTH_UNAVAILABLE",
                message: format!("token request failed: {}", value),
                status: None,
            }
        }
    }
}

/// Exchanges the configured credentials for a bearer token.
#[derive(Clone)]
pub struct TokenClient {
    base_url: String,
    credentials: Credentials,
    http: reqwest::Client,
}

impl TokenClient {
    pub fn new(base_url: impl Into<String>, credentials: Credentials, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            http,
        }
    }

    pub fn login(&self) -> &str {
        &self.credentials.login
    }

    pub async fn obtain_token(&self) -> Result<AccessToken, AuthError> {
        let resp = self
            .http
            .post(self.token_url())
            .form(&[
                ("username", self.credentials.login.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(AuthError {
                code: "ERR_AUTH_REJECTED",
                message: format!(
                    "token endpoint returned status {}: {}",
                    status.as_u16(),
                    remote_error_text(&body)
                ),
                status: Some(status.as_u16()),
            });
        }

        let token = body.trim();
        if token.is_empty() {
            return Err(AuthError {
                code: "ERR_AUTH_EMPTY_TOKEN",
                message: "token endpoint returned an empty token".to_string(),
                status: Some(status.as_u16()),
            });
        }

        Ok(AccessToken(token.to_string()))
    }

    fn token_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), TOKEN_PATH)
    }
}
