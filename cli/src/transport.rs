use std::time::Duration;

use reqimport_core::{ApiError, HttpMethod, HttpRequest, HttpResponse, Transport};

/// Blocking [`Transport`] over ureq. Non-2xx statuses are returned as
/// responses so the core decides what counts as failure.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl Transport for UreqTransport {
    fn execute(&self, req: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let agent = &self.agent;
        let body = req.body.as_deref().unwrap_or_default().as_bytes();
        macro_rules! with_headers {
            ($builder:expr) => {{
                let mut builder = $builder;
                for (name, value) in &req.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder
            }};
        }
        let result = match req.method {
            HttpMethod::Get => with_headers!(agent.get(&req.path)).call(),
            HttpMethod::Delete if req.body.is_none() => {
                with_headers!(agent.delete(&req.path)).call()
            }
            HttpMethod::Delete => {
                with_headers!(agent.delete(&req.path).force_send_body()).send(body)
            }
            HttpMethod::Post => with_headers!(agent.post(&req.path)).send(body),
            HttpMethod::Put => with_headers!(agent.put(&req.path)).send(body),
            HttpMethod::Patch => with_headers!(agent.patch(&req.path)).send(body),
        };
        let mut response = result.map_err(|e| ApiError::Transport(e.to_string()))?;
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(HttpResponse {
            status: response.status().as_u16(),
            headers,
            body,
        })
    }
}
