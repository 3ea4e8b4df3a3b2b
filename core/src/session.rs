//! Authenticated request execution on top of [`OdataClient`].
//!
//! A `Session` owns a transport and a set of credentials. The bearer token
//! is obtained lazily on the first call and then reused; it is never
//! refreshed, so a token that expires mid-run surfaces as a 401
//! `RequestFailed` from whichever call hit it.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::client::{ArasAction, DeleteAction, ItemQuery, OdataClient};
use crate::error::ApiError;
use crate::http::{HttpRequest, Transport};

/// OAuth resource-owner password grant accepted by the Aras token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordGrant {
    pub username: String,
    pub password: String,
    pub database: String,
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A token issued out of band.
    Token(String),
    Password(PasswordGrant),
}

pub struct Session<T> {
    client: OdataClient,
    transport: T,
    credentials: Credentials,
    token: Option<String>,
}

impl<T: Transport> Session<T> {
    pub fn new(client: OdataClient, transport: T, credentials: Credentials) -> Self {
        Self {
            client,
            transport,
            credentials,
            token: None,
        }
    }

    pub fn client(&self) -> &OdataClient {
        &self.client
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Obtain a bearer token, replacing any cached one.
    pub fn authenticate(&mut self) -> Result<(), ApiError> {
        let token = match &self.credentials {
            Credentials::Token(token) if token.trim().is_empty() => {
                return Err(ApiError::AuthenticationFailed("empty bearer token".to_string()));
            }
            Credentials::Token(token) => token.clone(),
            Credentials::Password(grant) => {
                let request = self.client.build_token_request(grant)?;
                let response = self.transport.execute(&request).map_err(|e| {
                    ApiError::AuthenticationFailed(format!("token request failed: {e}"))
                })?;
                self.client.parse_token_response(response)?
            }
        };
        debug!("bearer token acquired");
        self.token = Some(token);
        Ok(())
    }

    fn ensure_token(&mut self) -> Result<String, ApiError> {
        if self.token.is_none() {
            self.authenticate()?;
        }
        self.token
            .clone()
            .ok_or_else(|| ApiError::AuthenticationFailed("no bearer token".to_string()))
    }

    /// Authenticate if needed, build, execute, parse; log any failure under
    /// `operation` before handing it back.
    fn call<R>(
        &mut self,
        operation: &'static str,
        build: impl FnOnce(&OdataClient, &str) -> Result<HttpRequest, ApiError>,
        parse: impl FnOnce(&OdataClient, crate::http::HttpResponse) -> Result<R, ApiError>,
    ) -> Result<R, ApiError> {
        let result = self.ensure_token().and_then(|token| {
            let request = build(&self.client, &token)?;
            debug!(method = request.method.as_str(), path = %request.path, "{operation}");
            let response = self.transport.execute(&request)?;
            parse(&self.client, response)
        });
        if let Err(e) = &result {
            error!(operation, error = %e, "request failed");
        }
        result
    }

    pub fn get_items(&mut self, resource: &str, query: &ItemQuery) -> Result<Value, ApiError> {
        self.call(
            "get_items",
            |c, t| c.build_get_items(t, resource, query),
            |c, r| c.parse_json(r),
        )
    }

    pub fn create_item<D: Serialize + ?Sized>(
        &mut self,
        resource: &str,
        data: &D,
    ) -> Result<Value, ApiError> {
        self.call(
            "create_item",
            |c, t| c.build_create_item(t, resource, data),
            |c, r| c.parse_json(r),
        )
    }

    /// Returns `None` when the server honours `return=minimal`.
    pub fn update_item<D: Serialize + ?Sized>(
        &mut self,
        resource: &str,
        id: &str,
        data: &D,
        action: ArasAction,
        return_minimal: bool,
    ) -> Result<Option<Value>, ApiError> {
        self.call(
            "update_item",
            |c, t| c.build_update_item(t, resource, id, data, action, return_minimal),
            |c, r| c.parse_optional_json(r),
        )
    }

    pub fn update_property(
        &mut self,
        resource: &str,
        id: &str,
        property: &str,
        value: &Value,
        return_minimal: bool,
    ) -> Result<Option<Value>, ApiError> {
        self.call(
            "update_property",
            |c, t| c.build_update_property(t, resource, id, property, value, return_minimal),
            |c, r| c.parse_optional_json(r),
        )
    }

    pub fn upsert_item<D: Serialize + ?Sized>(
        &mut self,
        resource: &str,
        id: &str,
        data: &D,
        return_minimal: bool,
    ) -> Result<Option<Value>, ApiError> {
        self.call(
            "upsert_item",
            |c, t| c.build_upsert_item(t, resource, id, data, return_minimal),
            |c, r| c.parse_optional_json(r),
        )
    }

    pub fn delete_item(
        &mut self,
        resource: &str,
        id: &str,
        action: DeleteAction,
    ) -> Result<(), ApiError> {
        self.call(
            "delete_item",
            |c, t| c.build_delete_item(t, resource, id, action),
            |c, r| c.parse_empty(r),
        )
    }

    pub fn delete_relationship(
        &mut self,
        resource: &str,
        id: &str,
        relationship: &str,
        relationship_id: &str,
    ) -> Result<(), ApiError> {
        self.call(
            "delete_relationship",
            |c, t| c.build_delete_relationship(t, resource, id, relationship, relationship_id),
            |c, r| c.parse_empty(r),
        )
    }

    pub fn clear_item_property(
        &mut self,
        resource: &str,
        id: &str,
        property: &str,
    ) -> Result<(), ApiError> {
        self.call(
            "clear_item_property",
            |c, t| c.build_clear_item_property(t, resource, id, property),
            |c, r| c.parse_empty(r),
        )
    }

    pub fn call_method<D: Serialize + ?Sized>(
        &mut self,
        method: &str,
        data: &D,
    ) -> Result<Value, ApiError> {
        self.call(
            "call_method",
            |c, t| c.build_call_method(t, method, data),
            |c, r| c.parse_json(r),
        )
    }

    pub fn get_list(&mut self, list_id: &str, expand: Option<&str>) -> Result<Value, ApiError> {
        self.call(
            "get_list",
            |c, t| c.build_get_list(t, list_id, expand),
            |c, r| c.parse_json(r),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, HttpResponse};
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned responses and records every request.
    #[derive(Default)]
    struct Replay {
        responses: RefCell<VecDeque<HttpResponse>>,
        seen: RefCell<Vec<HttpRequest>>,
    }

    impl Replay {
        fn with(responses: Vec<(u16, &str)>) -> Self {
            Self {
                responses: RefCell::new(
                    responses
                        .into_iter()
                        .map(|(status, body)| HttpResponse {
                            status,
                            headers: Vec::new(),
                            body: body.to_string(),
                        })
                        .collect(),
                ),
                seen: RefCell::default(),
            }
        }
    }

    impl Transport for Replay {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
            self.seen.borrow_mut().push(request.clone());
            self.responses
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| ApiError::Transport("no canned response".to_string()))
        }
    }

    fn grant() -> Credentials {
        Credentials::Password(PasswordGrant {
            username: "admin".to_string(),
            password: "secret".to_string(),
            database: "db".to_string(),
            client_id: "IOMApp".to_string(),
        })
    }

    #[test]
    fn first_call_authenticates_once_then_reuses_token() {
        let replay = Replay::with(vec![
            (200, r#"{"access_token":"T1"}"#),
            (200, r#"{"value":[]}"#),
            (200, r#"{"value":[]}"#),
        ]);
        let mut session = Session::new(OdataClient::new("http://h"), &replay, grant());
        session.get_items("Part", &ItemQuery::default()).unwrap();
        session.get_items("Part", &ItemQuery::default()).unwrap();

        let seen = replay.seen.borrow();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].method, HttpMethod::Post);
        assert!(seen[0].path.ends_with("/oauthserver/connect/token"));
        assert_eq!(seen[1].header("authorization"), Some("Bearer T1"));
        assert_eq!(seen[2].header("authorization"), Some("Bearer T1"));
    }

    #[test]
    fn failed_authentication_stops_before_the_request() {
        let replay = Replay::with(vec![(401, "bad credentials")]);
        let mut session = Session::new(OdataClient::new("http://h"), &replay, grant());
        let err = session.create_item("Part", &json!({})).unwrap_err();
        assert!(matches!(err, ApiError::AuthenticationFailed(_)));
        assert_eq!(replay.seen.borrow().len(), 1);
    }

    #[test]
    fn unauthorized_mid_run_is_not_refreshed() {
        let replay = Replay::with(vec![(401, "expired")]);
        let mut session = Session::new(
            OdataClient::new("http://h"),
            &replay,
            Credentials::Token("stale".to_string()),
        );
        let err = session.create_item("Part", &json!({})).unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(replay.seen.borrow().len(), 1);
    }

    #[test]
    fn empty_static_token_is_rejected() {
        let replay = Replay::default();
        let credentials = Credentials::Token(" ".into());
        let mut session = Session::new(OdataClient::new("http://h"), &replay, credentials);
        assert!(matches!(session.authenticate(), Err(ApiError::AuthenticationFailed(_))));
        assert!(!session.is_authenticated());
    }

    #[test]
    fn minimal_update_returns_none() {
        let replay = Replay::with(vec![(204, "")]);
        let credentials = Credentials::Token("t".into());
        let mut session = Session::new(OdataClient::new("http://h"), &replay, credentials);
        let out = session
            .update_item("Part", "P1", &json!({"content": "x"}), ArasAction::Edit, true)
            .unwrap();
        assert!(out.is_none());
    }
}
