use std::{collections::BTreeMap, collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

/// Value the `Authorization` header must carry on every `/v1/contacts` route.
pub const API_TOKEN: &str = "Token X";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub birthday: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContact {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub birthday: String,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub simple: Option<bool>,
}

#[derive(Deserialize)]
pub struct SlowParams {
    #[serde(default)]
    pub ms: u64,
}

pub type Db = Arc<RwLock<BTreeMap<u64, Contact>>>;

type Rejection = (StatusCode, Json<Value>);

pub fn app() -> Router {
    let mut seed = BTreeMap::new();
    seed.insert(
        1,
        Contact {
            id: 1,
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            birthday: "2000-01-01".to_string(),
        },
    );
    let db: Db = Arc::new(RwLock::new(seed));
    Router::new()
        .route("/v1/contacts", get(list_contacts).post(create_contact))
        .route("/v1/contacts/{id}", get(get_contact).delete(delete_contact))
        .route("/v1/echo", any(echo))
        .route("/v1/slow", get(slow))
        .route("/v1/bytes/{len}", get(sized_payload))
        .route("/v1/private", get(private_payload))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn authorize(headers: &HeaderMap) -> Result<(), Rejection> {
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(token) if token == API_TOKEN => Ok(()),
        _ => {
            tracing::debug!("rejecting request without a valid token");
            Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized" })),
            ))
        }
    }
}

async fn list_contacts(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, Rejection> {
    authorize(&headers)?;
    let contacts = db.read().await;
    let list: Vec<Value> = contacts
        .values()
        .map(|c| {
            let mut value = json!(c);
            if !params.simple.unwrap_or(false) {
                value["emails"] = json!([]);
            }
            value
        })
        .collect();
    Ok(Json(Value::Array(list)))
}

async fn create_contact(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateContact>,
) -> Result<(StatusCode, Json<Contact>), Rejection> {
    authorize(&headers)?;
    let mut contacts = db.write().await;
    let id = contacts.keys().next_back().copied().unwrap_or(0) + 1;
    let contact = Contact {
        id,
        first_name: input.first_name,
        last_name: input.last_name,
        birthday: input.birthday,
    };
    contacts.insert(id, contact.clone());
    Ok((StatusCode::CREATED, Json(contact)))
}

async fn get_contact(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<Contact>, Rejection> {
    authorize(&headers)?;
    let contacts = db.read().await;
    contacts.get(&id).cloned().map(Json).ok_or((
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "not found" })),
    ))
}

async fn delete_contact(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<StatusCode, Rejection> {
    authorize(&headers)?;
    let mut contacts = db.write().await;
    contacts.remove(&id).map(|_| StatusCode::NO_CONTENT).ok_or((
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "not found" })),
    ))
}

/// Reflects method, query, headers and body back as JSON.
async fn echo(
    method: Method,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> Json<Value> {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    Json(json!({
        "method": method.as_str(),
        "query": query,
        "headers": headers,
        "body": body,
    }))
}

async fn slow(Query(params): Query<SlowParams>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(params.ms)).await;
    "done"
}

async fn sized_payload(Path(len): Path<usize>) -> Vec<u8> {
    vec![b'x'; len]
}

/// A payload clients must not keep.
async fn private_payload() -> ([(header::HeaderName, &'static str); 1], &'static str) {
    ([(header::CACHE_CONTROL, "no-store")], "secret")
}
