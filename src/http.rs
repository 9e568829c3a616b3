//! Thin blocking JSON client shared by the backend, hosting, comment and AI
//! clients.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::HttpError;

const USER_AGENT: &str = concat!("cortex-cli/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct JsonClient {
    agent: ureq::Agent,
    base_url: String,
    headers: Vec<(String, String)>,
}

impl std::fmt::Debug for JsonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Headers carry credentials.
        f.debug_struct("JsonClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl JsonClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().user_agent(USER_AGENT).build(),
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn request(&self, method: &str, path: &str, query: &[(&str, &str)]) -> ureq::Request {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.agent.request(method, &url);
        for (name, value) in &self.headers {
            req = req.set(name, value);
        }
        for (k, v) in query {
            req = req.query(k, v);
        }
        req
    }

    fn send(&self, method: &str, path: &str, query: &[(&str, &str)], body: Option<&Value>) -> Result<ureq::Response, HttpError> {
        tracing::debug!(method, url = %format!("{}{}", self.base_url, path), "http request");
        let req = self.request(method, path, query);
        let result = match body {
            Some(b) => req.send_json(b),
            None => req.call(),
        };
        match result {
            Ok(resp) => Ok(resp),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                tracing::debug!(method, path, code, "http error status");
                Err(HttpError::Status { code, body })
            }
            Err(ureq::Error::Transport(t)) => Err(HttpError::Transport(t.to_string())),
        }
    }

    fn decode<T: DeserializeOwned>(resp: ureq::Response) -> Result<T, HttpError> {
        resp.into_json::<T>()
            .map_err(|e| HttpError::Decode(e.to_string()))
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, HttpError> {
        self.get_with_query(path, &[])
    }

    pub fn get_with_query<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, HttpError> {
        Self::decode(self.send("GET", path, query, None)?)
    }

    pub fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, HttpError> {
        Self::decode(self.send("POST", path, &[], Some(body))?)
    }

    pub fn patch<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, HttpError> {
        Self::decode(self.send("PATCH", path, &[], Some(body))?)
    }

    pub fn put<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, HttpError> {
        Self::decode(self.send("PUT", path, &[], Some(body))?)
    }

    /// DELETE, ignoring any response body.
    pub fn delete(&self, path: &str) -> Result<(), HttpError> {
        self.send("DELETE", path, &[], None).map(|_| ())
    }
}

/// Pull a human-readable message out of a provider error body
/// (`{"message": ...}` or `{"error": ...}`), falling back to the raw text.
pub fn error_message(err: &HttpError) -> String {
    match err {
        HttpError::Status { code, body } => {
            let detail = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| {
                    ["message", "error", "detail"]
                        .iter()
                        .find_map(|k| v.get(*k).map(render_detail))
                })
                .unwrap_or_else(|| body.trim().to_string());
            format!("HTTP {}: {}", code, detail)
        }
        other => other.to_string(),
    }
}

fn render_detail(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_message_field() {
        let err = HttpError::Status {
            code: 422,
            body: r#"{"message":"A pull request already exists"}"#.to_string(),
        };
        assert_eq!(error_message(&err), "HTTP 422: A pull request already exists");
    }

    #[test]
    fn error_message_falls_back_to_body() {
        let err = HttpError::Status {
            code: 500,
            body: "boom".to_string(),
        };
        assert_eq!(error_message(&err), "HTTP 500: boom");
    }
}
