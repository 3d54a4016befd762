use serde::{Deserialize, Serialize};

pub mod nifi;

pub const PROCESSOR_UPDATED_MESSAGE: &str = "Processor updated successfully";

const MAX_REMOTE_ERROR_TEXT_BYTES: usize = 2048;

/// Trims a remote error body for inclusion in a gateway error message.
pub fn remote_error_text(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_REMOTE_ERROR_TEXT_BYTES {
        return body.to_string();
    }

    let mut end = MAX_REMOTE_ERROR_TEXT_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Orchestration step that produced a gateway error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Auth,
    Resolution,
    Mutation,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Auth => "auth",
            Stage::Resolution => "resolution",
            Stage::Mutation => "mutation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub message: String,
}

impl UpdateResponse {
    pub fn updated() -> Self {
        Self {
            message: PROCESSOR_UPDATED_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Status returned by the remote server, when the failure came from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_status: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_omits_absent_stage_and_status() {
        let err = ErrorResponse {
            code: "ERR_INVALID_PARAMS".to_string(),
            message: "missing query parameter state".to_string(),
            stage: None,
            remote_status: None,
        };

        let value = serde_json::to_value(&err).expect("error response should serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "code": "ERR_INVALID_PARAMS",
                "message": "missing query parameter state",
            })
        );
    }

    #[test]
    fn error_response_names_stage_in_snake_case() {
        let err = ErrorResponse {
            code: "ERR_REMOTE_STATUS".to_string(),
            message: "conflict".to_string(),
            stage: Some(Stage::Mutation),
            remote_status: Some(409),
        };

        let value = serde_json::to_value(&err).expect("error response should serialize");
        assert_eq!(value["stage"], "mutation");
        assert_eq!(value["remote_status"], 409);
    }

    #[test]
    fn remote_error_text_trims_and_truncates_on_char_boundary() {
        assert_eq!(remote_error_text("  conflict \n"), "conflict");

        let long = "é".repeat(MAX_REMOTE_ERROR_TEXT_BYTES);
        let text = remote_error_text(&long);
        assert!(text.ends_with("..."));
        assert!(text.len() <= MAX_REMOTE_ERROR_TEXT_BYTES + 3);
    }

    #[test]
    fn update_response_carries_fixed_message() {
        let value = serde_json::to_value(UpdateResponse::updated())
            .expect("update response should serialize");
        assert_eq!(
            value,
            serde_json::json!({"message": "Processor updated successfully"})
        );
    }
}
