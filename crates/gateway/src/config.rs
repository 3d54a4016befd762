use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use nifi_auth::Credentials;

pub const DEFAULT_NIFI_API_URL: &str = "https://localhost:9443/nifi-api";
const DEFAULT_ENV_FILE: &str = ".env";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub nifi_api_url: String,
    pub credentials: Credentials,
    pub timeout_ms: u64,
    pub tls: TlsConfig,
}

/// Trust settings for calls to the remote server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    pub ca_cert_path: Option<PathBuf>,
    pub insecure_skip_verify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

impl GatewayConfig {
    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        match std::env::var("NIFI_GATEWAY_CONFIG_PATH") {
            Ok(config_path) if !config_path.trim().is_empty() => {
                merged.extend(parse_env_file(config_path.trim())?);
            }
            _ => {
                if std::path::Path::new(DEFAULT_ENV_FILE).is_file() {
                    merged.extend(parse_env_file(DEFAULT_ENV_FILE)?);
                }
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let bind_addr = parse_socket_addr(
            kv.get("NIFI_GATEWAY_BIND_ADDR"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            "NIFI_GATEWAY_BIND_ADDR",
        )?;

        let allow_nonlocal_bind =
            parse_bool(kv.get("NIFI_GATEWAY_ALLOW_NONLOCAL_BIND")).unwrap_or(false);
        if !bind_addr.ip().is_loopback() && !allow_nonlocal_bind {
            return Err(StartupError {
                code: "ERR_NONLOCAL_BIND_NOT_ALLOWED",
                message: "gateway callers are not authenticated; set NIFI_GATEWAY_ALLOW_NONLOCAL_BIND=true to bind a non-loopback address"
                    .to_string(),
            });
        }

        let nifi_api_url = kv
            .get("NIFI_API_URL")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_NIFI_API_URL)
            .trim_end_matches('/')
            .to_string();
        if !(nifi_api_url.starts_with("https://") || nifi_api_url.starts_with("http://")) {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "NIFI_API_URL must start with http:// or https://".to_string(),
            });
        }

        let login = require_nonempty(kv, "login")?;
        let password = require_nonempty(kv, "password")?;

        let timeout_ms = parse_u64(kv.get("NIFI_TIMEOUT_MS"), 30_000, "NIFI_TIMEOUT_MS")?;

        let ca_cert_path = kv
            .get("NIFI_TLS_CA_CERT_PATH")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let insecure_skip_verify = match kv.get("NIFI_TLS_INSECURE_SKIP_VERIFY") {
            None => false,
            Some(v) if v.trim().is_empty() => false,
            Some(v) => parse_bool(Some(v)).ok_or_else(|| StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "NIFI_TLS_INSECURE_SKIP_VERIFY must be a boolean".to_string(),
            })?,
        };

        Ok(Self {
            bind_addr,
            nifi_api_url,
            credentials: Credentials::new(login, password),
            timeout_ms,
            tls: TlsConfig {
                ca_cert_path,
                insecure_skip_verify,
            },
        })
    }
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    parse_env_contents(&contents)
}

fn parse_env_contents(contents: &str) -> Result<HashMap<String, String>, StartupError> {
    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let (key, value) = line.split_once('=').ok_or_else(|| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(StartupError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        kv.insert(key.to_string(), strip_quotes(value.trim()));
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..bytes.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn require_nonempty(
    kv: &HashMap<String, String>,
    key: &'static str,
) -> Result<String, StartupError> {
    let value = kv
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StartupError {
            code: "ERR_MISSING_CONFIG",
            message: format!("missing required config key {}", key),
        })?;

    Ok(value.to_string())
}

fn parse_socket_addr(
    value: Option<&String>,
    default: SocketAddr,
    key: &'static str,
) -> Result<SocketAddr, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<SocketAddr>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a valid host:port socket address", key),
        }),
    }
}

fn parse_u64(value: Option<&String>, default: u64, key: &'static str) -> Result<u64, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u64>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_bool(value: Option<&String>) -> Option<bool> {
    let value = value.map(|v| v.trim()).filter(|v| !v.is_empty())?;

    match value {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}
