use thiserror::Error;

/// Failures surfaced to callers of the backend client.
///
/// `Authentication`, `AccessDenied` and `Network` are also broadcast as
/// session signals; the rest only reach the immediate caller.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request validation failed: {detail}")]
    Validation { detail: String },
    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("backend error: {0}")]
    Backend(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("processing task {task_id} failed: {message}")]
    TaskFailed { task_id: String, message: String },
    #[error("processing task {task_id} did not finish after {polls} polls")]
    TaskTimeout { task_id: String, polls: u32 },
}

impl ApiError {
    /// Message suitable for the task pane's error banner.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Authentication(_) => "Authentication failed. Please log in again.".into(),
            ApiError::AccessDenied(_) => {
                "Access denied. You do not have permission to access this resource.".into()
            }
            ApiError::Network(_) => {
                "Network connection failed. Please check your internet connection.".into()
            }
            ApiError::Validation { detail } => format!("Request validation failed. Details: {}", detail),
            ApiError::Status { detail, .. } if !detail.is_empty() => detail.clone(),
            ApiError::Status { .. } => "Please try again.".into(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let v = ApiError::Validation {
            detail: "compound_id missing".into(),
        };
        assert_eq!(v.user_message(), "Request validation failed. Details: compound_id missing");
        let s = ApiError::Status {
            status: 500,
            detail: String::new(),
        };
        assert_eq!(s.user_message(), "Please try again.");
    }
}
