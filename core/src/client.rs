//! Stateless request builder and response parser for the Aras OData API.
//!
//! # Design
//! `OdataClient` holds only the server base URL. Each operation is split
//! into a `build_*` method that produces an `HttpRequest` and a `parse_*`
//! method that consumes an `HttpResponse`. Token handling and the actual
//! round-trip live in [`crate::session::Session`].

use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::session::PasswordGrant;

/// Server-side behavior selected through the `@aras.action` annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArasAction {
    #[default]
    Edit,
    Update,
    Lock,
    Unlock,
    Purge,
}

impl ArasAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArasAction::Edit => "edit",
            ArasAction::Update => "update",
            ArasAction::Lock => "lock",
            ArasAction::Unlock => "unlock",
            ArasAction::Purge => "purge",
        }
    }
}

/// `Delete` removes every version of an item, `Purge` only the addressed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteAction {
    #[default]
    Delete,
    Purge,
}

/// OData system query options for collection reads.
#[derive(Debug, Clone, Default)]
pub struct ItemQuery {
    pub expand: Option<String>,
    pub filter: Option<String>,
    pub select: Option<String>,
}

impl ItemQuery {
    pub fn filter(filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..Self::default()
        }
    }

    pub fn with_select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn with_expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct OdataClient {
    base_url: String,
    odata_url: String,
}

impl OdataClient {
    pub fn new(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let odata_url = format!("{base_url}/Server/Odata");
        Self { base_url, odata_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn odata_url(&self) -> &str {
        &self.odata_url
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauthserver/connect/token", self.base_url)
    }

    // -----------------------------------------------------------------------
    // Authentication
    // -----------------------------------------------------------------------

    pub fn build_token_request(&self, grant: &PasswordGrant) -> Result<HttpRequest, ApiError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "password")
            .append_pair("scope", "Innovator")
            .append_pair("client_id", &grant.client_id)
            .append_pair("username", &grant.username)
            .append_pair("password", &grant.password)
            .append_pair("database", &grant.database)
            .finish();
        Ok(HttpRequest {
            method: HttpMethod::Post,
            path: finish_url(&self.token_url(), &[])?,
            headers: vec![
                (
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                ),
                ("Accept".to_string(), "application/json".to_string()),
            ],
            body: Some(body),
        })
    }

    pub fn parse_token_response(&self, response: HttpResponse) -> Result<String, ApiError> {
        if !response.is_success() {
            return Err(ApiError::AuthenticationFailed(format!(
                "token endpoint returned HTTP {}: {}",
                response.status, response.body
            )));
        }
        let value: Value = serde_json::from_str(&response.body)
            .map_err(|e| {
                ApiError::AuthenticationFailed(format!("token response is not JSON: {e}"))
            })?;
        match value.get("access_token").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => Ok(token.to_string()),
            _ => Err(ApiError::AuthenticationFailed(
                "token response carries no access_token".to_string(),
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Build requests
    // -----------------------------------------------------------------------

    pub fn build_get_items(
        &self,
        token: &str,
        resource: &str,
        query: &ItemQuery,
    ) -> Result<HttpRequest, ApiError> {
        let mut params = Vec::new();
        if let Some(expand) = &query.expand {
            params.push(("$expand", expand.clone()));
        }
        if let Some(filter) = &query.filter {
            params.push(("$filter", filter.clone()));
        }
        if let Some(select) = &query.select {
            params.push(("$select", select.clone()));
        }
        Ok(HttpRequest {
            method: HttpMethod::Get,
            path: finish_url(&self.collection_url(resource), &params)?,
            headers: read_headers(token),
            body: None,
        })
    }

    pub fn build_create_item<T: Serialize + ?Sized>(
        &self,
        token: &str,
        resource: &str,
        data: &T,
    ) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest {
            method: HttpMethod::Post,
            path: finish_url(&self.collection_url(resource), &[])?,
            headers: write_headers(token),
            body: Some(to_body(data)?),
        })
    }

    /// PATCH an item. Any action other than `edit` is injected into the
    /// payload as `@aras.action`.
    pub fn build_update_item<T: Serialize + ?Sized>(
        &self,
        token: &str,
        resource: &str,
        id: &str,
        data: &T,
        action: ArasAction,
        return_minimal: bool,
    ) -> Result<HttpRequest, ApiError> {
        let mut payload = to_object(data)?;
        if action != ArasAction::Edit {
            payload.insert(
                "@aras.action".to_string(),
                Value::String(action.as_str().to_string()),
            );
        }
        let mut headers = write_headers(token);
        if return_minimal {
            headers.push(prefer_minimal());
        }
        Ok(HttpRequest {
            method: HttpMethod::Patch,
            path: finish_url(&self.item_url(resource, id), &[])?,
            headers,
            body: Some(to_body(&payload)?),
        })
    }

    pub fn build_update_property(
        &self,
        token: &str,
        resource: &str,
        id: &str,
        property: &str,
        value: &Value,
        return_minimal: bool,
    ) -> Result<HttpRequest, ApiError> {
        let mut headers = write_headers(token);
        if return_minimal {
            headers.push(prefer_minimal());
        }
        Ok(HttpRequest {
            method: HttpMethod::Put,
            path: finish_url(&format!("{}/{property}", self.item_url(resource, id)), &[])?,
            headers,
            body: Some(to_body(&serde_json::json!({ "value": value }))?),
        })
    }

    /// Create-or-merge: PATCH with a wildcard `If-Match`.
    pub fn build_upsert_item<T: Serialize + ?Sized>(
        &self,
        token: &str,
        resource: &str,
        id: &str,
        data: &T,
        return_minimal: bool,
    ) -> Result<HttpRequest, ApiError> {
        let mut headers = write_headers(token);
        headers.push(("If-Match".to_string(), "*".to_string()));
        if return_minimal {
            headers.push(prefer_minimal());
        }
        Ok(HttpRequest {
            method: HttpMethod::Patch,
            path: finish_url(&self.item_url(resource, id), &[])?,
            headers,
            body: Some(to_body(data)?),
        })
    }

    pub fn build_delete_item(
        &self,
        token: &str,
        resource: &str,
        id: &str,
        action: DeleteAction,
    ) -> Result<HttpRequest, ApiError> {
        let path = finish_url(&self.item_url(resource, id), &[])?;
        let mut headers = vec![auth_header(token)];
        let body = match action {
            DeleteAction::Delete => None,
            DeleteAction::Purge => {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                headers.push(prefer_minimal());
                Some(to_body(&serde_json::json!({ "@aras.action": "purge" }))?)
            }
        };
        Ok(HttpRequest {
            method: HttpMethod::Delete,
            path,
            headers,
            body,
        })
    }

    pub fn build_delete_relationship(
        &self,
        token: &str,
        resource: &str,
        id: &str,
        relationship: &str,
        relationship_id: &str,
    ) -> Result<HttpRequest, ApiError> {
        let raw = format!("{}/{relationship}/$ref", self.item_url(resource, id));
        let target = format!("{relationship}('{relationship_id}')");
        Ok(HttpRequest {
            method: HttpMethod::Delete,
            path: finish_url(&raw, &[("$id", target)])?,
            headers: vec![auth_header(token)],
            body: None,
        })
    }

    pub fn build_clear_item_property(
        &self,
        token: &str,
        resource: &str,
        id: &str,
        property: &str,
    ) -> Result<HttpRequest, ApiError> {
        let raw = format!("{}/{property}/$ref", self.item_url(resource, id));
        Ok(HttpRequest {
            method: HttpMethod::Delete,
            path: finish_url(&raw, &[])?,
            headers: vec![auth_header(token)],
            body: None,
        })
    }

    pub fn build_call_method<T: Serialize + ?Sized>(
        &self,
        token: &str,
        method: &str,
        data: &T,
    ) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest {
            method: HttpMethod::Post,
            path: finish_url(&format!("{}/method.{method}", self.odata_url), &[])?,
            headers: write_headers(token),
            body: Some(to_body(data)?),
        })
    }

    pub fn build_get_list(
        &self,
        token: &str,
        list_id: &str,
        expand: Option<&str>,
    ) -> Result<HttpRequest, ApiError> {
        let params: Vec<(&str, String)> = expand
            .map(|e| ("$expand", e.to_string()))
            .into_iter()
            .collect();
        Ok(HttpRequest {
            method: HttpMethod::Get,
            path: finish_url(&self.item_url("List", list_id), &params)?,
            headers: read_headers(token),
            body: None,
        })
    }

    // -----------------------------------------------------------------------
    // Parse responses
    // -----------------------------------------------------------------------

    /// Parse a 2xx response that must carry a JSON body.
    pub fn parse_json(&self, response: HttpResponse) -> Result<Value, ApiError> {
        check_success(&response)?;
        serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    /// Parse a 2xx response whose body may have been suppressed by
    /// `Prefer: return=minimal`.
    pub fn parse_optional_json(&self, response: HttpResponse) -> Result<Option<Value>, ApiError> {
        check_success(&response)?;
        if response.status == 204 || response.body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&response.body)
            .map(Some)
            .map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    /// Parse a 2xx response whose body, if any, is ignored.
    pub fn parse_empty(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_success(&response)
    }

    fn collection_url(&self, resource: &str) -> String {
        format!("{}/{resource}", self.odata_url)
    }

    fn item_url(&self, resource: &str, id: &str) -> String {
        format!("{}/{resource}('{id}')", self.odata_url)
    }
}

fn check_success(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::RequestFailed {
        status: response.status,
        body: response.body.clone(),
    })
}

/// Percent-encode one query option value. Spaces become `%20`, since
/// OData servers do not read `+` as a space.
fn encode_query_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Parse `raw` and attach the query options in the given order. Keys are
/// fixed `$` system options and go out as they are.
fn finish_url(raw: &str, params: &[(&str, String)]) -> Result<String, ApiError> {
    let mut url = Url::parse(raw).map_err(|e| ApiError::InvalidUrl(format!("{raw}: {e}")))?;
    if !params.is_empty() {
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", encode_query_value(v)))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }
    Ok(url.into())
}

fn to_body<T: Serialize + ?Sized>(data: &T) -> Result<String, ApiError> {
    serde_json::to_string(data).map_err(|e| ApiError::Serialization(e.to_string()))
}

fn to_object<T: Serialize + ?Sized>(data: &T) -> Result<Map<String, Value>, ApiError> {
    match serde_json::to_value(data).map_err(|e| ApiError::Serialization(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(ApiError::Serialization(format!(
            "update payload must be a JSON object, got {other}"
        ))),
    }
}

fn auth_header(token: &str) -> (String, String) {
    ("Authorization".to_string(), format!("Bearer {token}"))
}

fn prefer_minimal() -> (String, String) {
    ("Prefer".to_string(), "return=minimal".to_string())
}

fn read_headers(token: &str) -> Vec<(String, String)> {
    vec![
        ("Accept".to_string(), "application/json".to_string()),
        auth_header(token),
    ]
}

fn write_headers(token: &str) -> Vec<(String, String)> {
    vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Accept".to_string(), "application/json".to_string()),
        auth_header(token),
    ]
}
