//! In-process stand-in for the remote catalog service.
//!
//! An axum router serving `/health` and the `/autos` CRUD endpoints on a
//! loopback port, driven by its own tokio runtime on a background thread.
//! Understands the `q` and fuel-type list parameters but ignores sorting, so
//! callers can check that unsupported parameters degrade gracefully.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};

/// How list requests misbehave, when asked to.
#[derive(Debug, Clone, Copy)]
enum ListFailure {
    Status(u16),
    /// Headers arrive, then the connection drops mid-body.
    Interrupted,
    /// A complete 200 response that is not JSON.
    Garbage,
}

#[derive(Default)]
struct Catalog {
    records: Vec<Value>,
    next_id: u64,
    healthy: bool,
    list_failure: Option<ListFailure>,
    requests: Vec<String>,
}

type Shared = Arc<Mutex<Catalog>>;

pub struct StubCatalog {
    pub base_url: String,
    catalog: Shared,
}

impl StubCatalog {
    /// Start a service holding `records`; ids 1.. are assigned in order.
    pub fn start(records: Vec<Value>) -> Self {
        let mut catalog = Catalog {
            healthy: true,
            next_id: 1,
            ..Catalog::default()
        };
        for mut record in records {
            if record.get("id").is_none() {
                record["id"] = json!(catalog.next_id);
            }
            catalog.next_id += 1;
            catalog.records.push(record);
        }
        let catalog = Arc::new(Mutex::new(catalog));

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub service");
        listener.set_nonblocking(true).expect("non-blocking listener");
        let addr = listener.local_addr().expect("local addr");
        let app = router(Arc::clone(&catalog));

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("stub runtime");
            runtime.block_on(async move {
                let listener =
                    tokio::net::TcpListener::from_std(listener).expect("tokio listener");
                axum::serve(listener, app).await.expect("stub service");
            });
        });

        StubCatalog {
            base_url: format!("http://{}", addr),
            catalog,
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.catalog.lock().expect("catalog").healthy = healthy;
    }

    /// Force every list request to answer with `status`.
    pub fn fail_list_with(&self, status: u16) {
        self.catalog.lock().expect("catalog").list_failure = Some(ListFailure::Status(status));
    }

    /// Make list responses break off after the first few body bytes.
    pub fn interrupt_list(&self) {
        self.catalog.lock().expect("catalog").list_failure = Some(ListFailure::Interrupted);
    }

    /// Make list responses succeed with a body that is not JSON.
    pub fn garble_list(&self) {
        self.catalog.lock().expect("catalog").list_failure = Some(ListFailure::Garbage);
    }

    /// Request targets seen so far, e.g. `GET /autos?q=toyo`.
    pub fn requests(&self) -> Vec<String> {
        self.catalog.lock().expect("catalog").requests.clone()
    }

    pub fn records(&self) -> Vec<Value> {
        self.catalog.lock().expect("catalog").records.clone()
    }
}

/// A base URL nothing listens on.
pub fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}", addr)
}

pub fn auto(make: &str, model: &str, year: i64, fuel: &str, transmission: &str) -> Value {
    json!({
        "Make": make,
        "Model": model,
        "Year": year,
        "FuelType": fuel,
        "Transmission": transmission,
    })
}

fn router(catalog: Shared) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/autos", get(list).post(create))
        .route("/autos/:id", get(fetch).patch(update).delete(remove))
        .layer(middleware::from_fn_with_state(Arc::clone(&catalog), log_request))
        .with_state(catalog)
}

async fn log_request(State(catalog): State<Shared>, req: Request, next: Next) -> Response {
    let line = format!("{} {}", req.method(), req.uri());
    catalog.lock().expect("catalog").requests.push(line);
    next.run(req).await
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

async fn health(State(catalog): State<Shared>) -> Response {
    if catalog.lock().expect("catalog").healthy {
        (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "down" }))).into_response()
    }
}

async fn list(
    State(catalog): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let catalog = catalog.lock().expect("catalog");
    match catalog.list_failure {
        Some(ListFailure::Status(code)) => {
            let status = StatusCode::from_u16(code).expect("valid status");
            return detail(status, "forced failure");
        }
        Some(ListFailure::Interrupted) => return interrupted(),
        Some(ListFailure::Garbage) => return (StatusCode::OK, "not json").into_response(),
        None => {}
    }

    let q = params.get("q").map(|q| q.to_lowercase());
    let fuel = params
        .get("FuelType")
        .or_else(|| params.get("TipoCombustible"))
        .map(|f| f.to_lowercase());
    let items: Vec<Value> = catalog
        .records
        .iter()
        .filter(|r| {
            q.as_ref().map_or(true, |q| {
                text(r, &["Make", "Marca"]).contains(q.as_str())
                    || text(r, &["Model", "Modelo"]).contains(q.as_str())
            })
        })
        .filter(|r| {
            fuel.as_ref()
                .map_or(true, |f| text(r, &["FuelType", "TipoCombustible"]) == *f)
        })
        .cloned()
        .collect();
    Json(Value::Array(items)).into_response()
}

async fn fetch(State(catalog): State<Shared>, Path(id): Path<String>) -> Response {
    let catalog = catalog.lock().expect("catalog");
    match find(&catalog, &id) {
        Some(i) => Json(catalog.records[i].clone()).into_response(),
        None => detail(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn create(State(catalog): State<Shared>, Json(body): Json<Value>) -> Response {
    let Value::Object(mut fields) = body else {
        return detail(StatusCode::BAD_REQUEST, "bad body");
    };
    if let Some(rejection) = reject(&fields) {
        return rejection;
    }
    let mut catalog = catalog.lock().expect("catalog");
    fields.insert("id".into(), json!(catalog.next_id));
    catalog.next_id += 1;
    let record = Value::Object(fields);
    catalog.records.push(record.clone());
    (StatusCode::CREATED, Json(record)).into_response()
}

async fn update(
    State(catalog): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut catalog = catalog.lock().expect("catalog");
    let Some(i) = find(&catalog, &id) else {
        return detail(StatusCode::NOT_FOUND, "not found");
    };
    let Value::Object(changes) = body else {
        return detail(StatusCode::BAD_REQUEST, "bad body");
    };
    if let Some(rejection) = reject(&changes) {
        return rejection;
    }
    if let Value::Object(record) = &mut catalog.records[i] {
        record.extend(changes);
    }
    Json(catalog.records[i].clone()).into_response()
}

async fn remove(State(catalog): State<Shared>, Path(id): Path<String>) -> Response {
    let mut catalog = catalog.lock().expect("catalog");
    match find(&catalog, &id) {
        Some(i) => {
            catalog.records.remove(i);
            StatusCode::NO_CONTENT.into_response()
        }
        None => detail(StatusCode::NOT_FOUND, "not found"),
    }
}

// Chunked body that fails after its first chunk; hyper then drops the
// connection without finishing the response.
fn interrupted() -> Response {
    let chunks: Vec<Result<Bytes, io::Error>> = vec![
        Ok(Bytes::from_static(b"[{\"Make\":")),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "dropped")),
    ];
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(tokio_stream::iter(chunks)),
    )
        .into_response()
}

// The stub refuses one make so server-side validation can be observed.
fn reject(fields: &Map<String, Value>) -> Option<Response> {
    let forbidden = json!("Forbidden");
    [fields.get("Make"), fields.get("Marca")]
        .contains(&Some(&forbidden))
        .then(|| detail(StatusCode::UNPROCESSABLE_ENTITY, "make not allowed"))
}

// Ids are compared as text: `"a/b"` matches the string id, `7` the number.
fn find(catalog: &Catalog, id: &str) -> Option<usize> {
    catalog.records.iter().position(|r| match r.get("id") {
        Some(Value::String(s)) => s == id,
        Some(other) => other.to_string() == id,
        None => false,
    })
}

fn text(record: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| record.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_lowercase()
}
