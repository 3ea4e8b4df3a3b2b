//! In-memory stand-in for the Aras Innovator OData surface.
//!
//! Item sets are created on first write and keep insertion order. Every
//! `/Server/Odata` route requires `Authorization: Bearer <MOCK_TOKEN>`; the
//! token is issued by the password-grant endpoint for any non-empty
//! username and password.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Form, Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const MOCK_TOKEN: &str = "mock-access-token";

#[derive(Debug, Default)]
pub struct Store {
    sets: HashMap<String, Vec<Value>>,
}

impl Store {
    pub fn items(&self, set: &str) -> &[Value] {
        self.sets.get(set).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn get(&self, set: &str, id: &str) -> Option<&Value> {
        self.items(set).iter().find(|item| item["id"] == id)
    }

    fn get_mut(&mut self, set: &str, id: &str) -> Option<&mut Value> {
        self.sets.get_mut(set)?.iter_mut().find(|item| item["id"] == id)
    }

    /// Insert an item, assigning an id if it has none. Returns the id.
    pub fn insert(&mut self, set: &str, mut item: Map<String, Value>) -> String {
        let id = match item.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().simple().to_string().to_uppercase();
                item.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        self.sets.entry(set.to_string()).or_default().push(Value::Object(item));
        id
    }

    fn remove(&mut self, set: &str, id: &str) -> bool {
        let Some(items) = self.sets.get_mut(set) else {
            return false;
        };
        let before = items.len();
        items.retain(|item| item["id"] != id);
        items.len() != before
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    app_with_db(Db::default())
}

pub fn app_with_db(db: Db) -> Router {
    let odata = Router::new()
        .route(
            "/Server/Odata/{resource}",
            get(read_resource)
                .post(create_resource)
                .patch(patch_item)
                .delete(delete_item),
        )
        .route("/Server/Odata/{resource}/{property}", put(put_property))
        .route("/Server/Odata/{resource}/{property}/$ref", delete(delete_ref))
        .route_layer(middleware::from_fn(require_bearer));

    Router::new()
        .route("/oauthserver/connect/token", post(issue_token))
        .merge(odata)
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_db(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_db(db)).await
}

/// Split `Set('ID')` into its set name and id.
pub fn parse_resource(resource: &str) -> (&str, Option<&str>) {
    match resource.strip_suffix("')").and_then(|r| r.split_once("('")) {
        Some((set, id)) => (set, Some(id)),
        None => (resource, None),
    }
}

/// Supports the single-clause form `field eq 'value'`.
fn parse_filter(filter: &str) -> Option<(&str, &str)> {
    let (field, value) = filter.split_once(" eq ")?;
    let value = value.trim().strip_prefix('\'')?.strip_suffix('\'')?;
    Some((field.trim(), value))
}

fn prefers_minimal(headers: &HeaderMap) -> bool {
    headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("return=minimal"))
}

async fn require_bearer(request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {MOCK_TOKEN}"));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "missing or invalid bearer token").into_response();
    }
    next.run(request).await
}

async fn issue_token(Form(form): Form<HashMap<String, String>>) -> Response {
    let field = |name: &str| form.get(name).map(String::as_str).unwrap_or_default();
    if field("grant_type") != "password"
        || field("username").is_empty()
        || field("password").is_empty()
    {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_grant" }))).into_response();
    }
    Json(json!({
        "access_token": MOCK_TOKEN,
        "token_type": "Bearer",
        "expires_in": 3600,
    }))
    .into_response()
}

async fn read_resource(
    State(db): State<Db>,
    Path(resource): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    let store = db.read().await;
    let (set, id) = parse_resource(&resource);
    if let Some(id) = id {
        return store.get(set, id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND);
    }

    let filter = match params.get("$filter") {
        Some(raw) => Some(parse_filter(raw).ok_or(StatusCode::BAD_REQUEST)?),
        None => None,
    };
    let select: Option<Vec<&str>> = params
        .get("$select")
        .map(|s| s.split(',').map(str::trim).collect());

    let rows: Vec<Value> = store
        .items(set)
        .iter()
        .filter(|item| filter.map_or(true, |(field, value)| item[field] == value))
        .map(|item| match &select {
            Some(fields) => {
                let mut row = Map::new();
                row.insert("id".to_string(), item["id"].clone());
                for field in fields {
                    row.insert(field.to_string(), item[*field].clone());
                }
                Value::Object(row)
            }
            None => item.clone(),
        })
        .collect();
    Ok(Json(json!({ "value": rows })))
}

async fn create_resource(
    State(db): State<Db>,
    Path(resource): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, StatusCode> {
    if let Some(method) = resource.strip_prefix("method.") {
        return Ok(Json(json!({ "method": method, "echo": body })).into_response());
    }
    let (set, id) = parse_resource(&resource);
    if id.is_some() {
        return Err(StatusCode::METHOD_NOT_ALLOWED);
    }
    let Value::Object(item) = body else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let mut store = db.write().await;
    let id = store.insert(set, item);
    let created = store.get(set, &id).cloned().unwrap_or(Value::Null);
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

async fn patch_item(
    State(db): State<Db>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, StatusCode> {
    let (set, Some(id)) = parse_resource(&resource) else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let Value::Object(mut changes) = body else {
        return Err(StatusCode::BAD_REQUEST);
    };
    changes.remove("@aras.action");
    let upsert = headers.get(header::IF_MATCH).is_some_and(|v| v == "*");

    let mut store = db.write().await;
    match store.get_mut(set, id) {
        Some(Value::Object(item)) => item.extend(changes),
        Some(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
        None if upsert => {
            changes.insert("id".to_string(), Value::String(id.to_string()));
            store.insert(set, changes);
        }
        None => return Err(StatusCode::NOT_FOUND),
    }

    if prefers_minimal(&headers) {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    let item = store.get(set, id).cloned().unwrap_or(Value::Null);
    Ok(Json(item).into_response())
}

async fn delete_item(State(db): State<Db>, Path(resource): Path<String>) -> StatusCode {
    let (set, Some(id)) = parse_resource(&resource) else {
        return StatusCode::BAD_REQUEST;
    };
    if db.write().await.remove(set, id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn put_property(
    State(db): State<Db>,
    Path((resource, property)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, StatusCode> {
    let (set, Some(id)) = parse_resource(&resource) else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let value = body.get("value").cloned().ok_or(StatusCode::BAD_REQUEST)?;
    let mut store = db.write().await;
    let item = store.get_mut(set, id).ok_or(StatusCode::NOT_FOUND)?;
    item[property.as_str()] = value.clone();

    if prefers_minimal(&headers) {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(json!({ "value": value })).into_response())
}

/// `/$ref` with `$id=Rel('X')` deletes relationship `X` of the item;
/// without `$id` it clears the item property.
async fn delete_ref(
    State(db): State<Db>,
    Path((resource, property)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> StatusCode {
    let (set, Some(id)) = parse_resource(&resource) else {
        return StatusCode::BAD_REQUEST;
    };
    let mut store = db.write().await;

    if let Some(target) = params.get("$id") {
        let (rel_set, Some(rel_id)) = parse_resource(target) else {
            return StatusCode::BAD_REQUEST;
        };
        let belongs = store.get(rel_set, rel_id).is_some_and(|rel| rel["source_id"] == id);
        if rel_set != property || !belongs {
            return StatusCode::NOT_FOUND;
        }
        store.remove(rel_set, rel_id);
        return StatusCode::NO_CONTENT;
    }

    match store.get_mut(set, id) {
        Some(item) => {
            item[property.as_str()] = Value::Null;
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}
