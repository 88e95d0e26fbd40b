use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

use super::error::ApiError;
use super::transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
use crate::auth::{AuthService, Signal};
use crate::config::AppConfig;
use crate::logging::{log_request, log_response, log_retry, next_request_id};

const SESSION_EXPIRED: &str = "Session expired. Please log in again.";
const ACCESS_DENIED: &str = "Access denied. You do not have permission to access this resource.";
const NETWORK_DOWN: &str = "Network connection failed. Please check your internet connection.";

/// Application error codes that mean "unauthorized" even when the HTTP
/// status is 200.
const UNAUTHORIZED_CODES: &[&str] = &["401", "UNAUTHORIZED", "TOKEN_EXPIRED"];

/// Bearer-authenticated JSON client for the backend.
///
/// A 401 (or an unauthorized code inside a 200 body) triggers exactly one
/// silent refresh and one replay of the request. If the refresh yields no
/// token, or the replay is rejected again, the session is torn down and
/// [`Signal::AuthenticationFailed`] is raised.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    auth: Arc<AuthService>,
}

impl ApiClient {
    pub fn new(config: &AppConfig, auth: Arc<AuthService>) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(config.request_timeout)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        Self::with_transport(&config.api_base_url, Arc::new(transport), auth)
    }

    pub fn with_transport(
        base_url: &str,
        transport: Arc<dyn Transport>,
        auth: Arc<AuthService>,
    ) -> Result<Self, ApiError> {
        Url::parse(base_url)
            .map_err(|e| ApiError::InvalidRequest(format!("base url {}: {}", base_url, e)))?;
        Ok(Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn auth(&self) -> &Arc<AuthService> {
        &self.auth
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `path` is appended to the base URL verbatim; the base may carry its
    /// own path prefix.
    pub fn url_for(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ApiError::InvalidRequest(format!("{}: {}", path, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        Ok(url)
    }

    /// Send a request and return the decoded JSON body (`Null` for an empty
    /// body).
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let request_id = next_request_id();
        let mut request = HttpRequest {
            method,
            url: self.url_for(path, query)?,
            bearer: self.auth.refresh_if_needed().await,
            body,
        };

        let mut response = self.dispatch(&request_id, &request).await?;
        if is_unauthorized(&response) {
            log_retry(&request_id, method.as_str(), request.url.as_str(), "unauthorized");
            self.auth.invalidate_access_token();
            let Some(token) = self.auth.refresh_silently("unauthorized").await else {
                return Err(self.authentication_failed("silent token refresh failed"));
            };
            request.bearer = Some(token);
            response = self.dispatch(&request_id, &request).await?;
            if is_unauthorized(&response) {
                return Err(self.authentication_failed("request rejected after token refresh"));
            }
        }
        self.interpret(response)
    }

    /// Execute and unwrap the `{ success, data }` envelope into `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let value = self.execute(method, path, query, body).await?;
        envelope_data(value)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        self.call(Method::Get, path, query, None).await
    }

    async fn dispatch(
        &self,
        request_id: &str,
        request: &HttpRequest,
    ) -> Result<HttpResponse, ApiError> {
        let method = request.method.as_str();
        log_request(request_id, method, request.url.as_str(), request.bearer.is_some());
        let started = Instant::now();
        match self.transport.send(request).await {
            Ok(resp) => {
                log_response(
                    request_id,
                    method,
                    request.url.as_str(),
                    resp.status,
                    started.elapsed().as_millis() as u64,
                );
                Ok(resp)
            }
            Err(err) => {
                self.auth.signals().emit(Signal::NetworkError {
                    message: NETWORK_DOWN.to_string(),
                });
                let detail = if err.timed_out {
                    format!("request timed out: {}", err.message)
                } else {
                    err.message
                };
                Err(ApiError::Network(detail))
            }
        }
    }

    fn authentication_failed(&self, reason: &str) -> ApiError {
        self.auth.fail_authentication(SESSION_EXPIRED);
        ApiError::Authentication(reason.to_string())
    }

    fn interpret(&self, response: HttpResponse) -> Result<Value, ApiError> {
        match response.status {
            403 => {
                self.auth.signals().emit(Signal::AccessDenied {
                    message: ACCESS_DENIED.to_string(),
                });
                Err(ApiError::AccessDenied(error_detail(&response)))
            }
            422 => Err(ApiError::Validation {
                detail: error_detail(&response),
            }),
            status if !response.is_success() => Err(ApiError::Status {
                status,
                detail: error_detail(&response),
            }),
            _ if response.body.iter().all(u8::is_ascii_whitespace) => Ok(Value::Null),
            _ => serde_json::from_slice(&response.body).map_err(|e| ApiError::Decode(e.to_string())),
        }
    }
}

fn code_means_unauthorized(code: &Value) -> bool {
    match code {
        Value::Number(n) => n.as_u64() == Some(401),
        Value::String(s) => UNAUTHORIZED_CODES.contains(&s.as_str()),
        _ => false,
    }
}

fn is_unauthorized(response: &HttpResponse) -> bool {
    if response.status == 401 {
        return true;
    }
    if !response.is_success() {
        return false;
    }
    response.json().map_or(false, |body| {
        ["code", "error_code"]
            .iter()
            .any(|k| body.get(k).map_or(false, code_means_unauthorized))
    })
}

/// Server-provided explanation: `detail`, then `error`, then `message`,
/// then the raw body.
fn error_detail(response: &HttpResponse) -> String {
    match response.json() {
        Some(body) => match ["detail", "error", "message"]
            .iter()
            .find_map(|k| body.get(k).filter(|v| !v.is_null()))
        {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        },
        None => String::from_utf8_lossy(&response.body).trim().to_string(),
    }
}

/// Unwrap `{ success, data, error?, message? }`. Bodies without a `success`
/// flag are taken as the payload itself.
pub fn envelope_data<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    let payload = match value {
        Value::Object(mut map) if map.contains_key("success") => {
            if map.get("success").and_then(Value::as_bool) != Some(true) {
                let reason = ["error", "message"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_else(|| "request was not successful".to_string());
                return Err(ApiError::Backend(reason));
            }
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(payload).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resp(status: u16, body: Value) -> HttpResponse {
        HttpResponse {
            status,
            body: body.to_string().into_bytes(),
        }
    }

    #[test]
    fn test_unauthorized_detection() {
        assert!(is_unauthorized(&resp(401, json!({}))));
        assert!(is_unauthorized(&resp(200, json!({ "success": false, "code": 401 }))));
        assert!(is_unauthorized(&resp(200, json!({ "error_code": "TOKEN_EXPIRED" }))));
        assert!(!is_unauthorized(&resp(200, json!({ "success": true, "code": 200 }))));
        assert!(!is_unauthorized(&resp(500, json!({ "code": 401 }))));
    }

    #[test]
    fn test_error_detail_prefers_detail() {
        let r = resp(422, json!({ "detail": [{ "loc": ["body", "compound_id"] }], "error": "x" }));
        assert_eq!(error_detail(&r), r#"[{"loc":["body","compound_id"]}]"#);
        let r = resp(500, json!({ "error": "boom" }));
        assert_eq!(error_detail(&r), "boom");
        let r = HttpResponse {
            status: 502,
            body: b"Bad Gateway\n".to_vec(),
        };
        assert_eq!(error_detail(&r), "Bad Gateway");
    }

    #[test]
    fn test_envelope_unwrapping() {
        let v: Vec<String> = envelope_data(json!({ "success": true, "data": ["a"] })).unwrap();
        assert_eq!(v, vec!["a".to_string()]);

        let none: Option<Vec<String>> = envelope_data(json!({ "success": true })).unwrap();
        assert!(none.is_none());

        let err = envelope_data::<Value>(json!({ "success": false, "error": "no template" }));
        assert!(matches!(err, Err(ApiError::Backend(m)) if m == "no template"));

        let raw: Value = envelope_data(json!({ "status": "ok" })).unwrap();
        assert_eq!(raw["status"], "ok");
    }
}
