// API client module: a small blocking HTTP client for the remote catalog
// service. Every call is a single request/response exchange; nothing is
// cached between calls apart from the connection configuration.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{CatalogError, Result};
use crate::local::Loaded;
use crate::query::Direction;
use crate::record::{fold, Field, RawRecord, RecordId, Vehicle, VehiclePatch, WireNames};

/// Client for the remote catalog. Holds a reqwest blocking client, the base
/// URL of the service and the timeouts to apply.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    probe_timeout: Duration,
    wire_names: WireNames,
}

/// Optional server-side narrowing for a listing. Parameters the service
/// does not understand are expected to be ignored, so callers still apply
/// the same query locally afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub text: Option<String>,
    pub fuel_type: Option<String>,
    pub sort: Option<(Field, Direction)>,
}

impl ListQuery {
    pub fn text(text: &str) -> Self {
        ListQuery {
            text: Some(text.to_string()),
            ..ListQuery::default()
        }
    }

    fn params(&self, names: WireNames) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(q) = self.text.as_deref().filter(|q| !q.trim().is_empty()) {
            params.push(("q", q.trim().to_string()));
        }
        if let Some(fuel) = self.fuel_type.as_deref().filter(|f| !f.trim().is_empty()) {
            params.push((names.name(Field::FuelType), fuel.trim().to_string()));
        }
        if let Some((field, direction)) = self.sort {
            params.push(("sort_by", names.name(field).to_string()));
            if direction.is_descending() {
                params.push(("desc", "true".to_string()));
            }
        }
        params
    }
}

impl ApiClient {
    /// Create a client for `base_url` (a trailing `/` is ignored).
    pub fn new(base_url: &str, probe_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CatalogError::Unavailable(format!("failed to build HTTP client: {}", e)))?;
        Ok(ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            probe_timeout,
            wire_names: WireNames::Canonical,
        })
    }

    /// Field names to use in request bodies and query parameters.
    pub fn with_wire_names(mut self, wire_names: WireNames) -> Self {
        self.wire_names = wire_names;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(&config.api_url, config.probe_timeout, config.request_timeout)?
            .with_wire_names(config.wire_names))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // `/autos/{id}` with the id as one escaped path segment.
    fn record_url(&self, id: &RecordId) -> Result<Url> {
        let mut url = Url::parse(&self.url("/autos")).map_err(|e| {
            CatalogError::Unavailable(format!("invalid catalog URL {}: {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                CatalogError::Unavailable(format!("{} cannot address records", self.base_url))
            })?
            .push(&id.to_string());
        Ok(url)
    }

    // Request body with field names in the configured spelling.
    fn body<T: Serialize>(&self, payload: &T) -> Result<Value> {
        let value = serde_json::to_value(payload)
            .map_err(|e| CatalogError::Validation(format!("cannot encode record: {}", e)))?;
        Ok(match value {
            Value::Object(fields) if self.wire_names != WireNames::Canonical => Value::Object(
                fields
                    .into_iter()
                    .map(|(key, v)| match key.parse::<Field>() {
                        Ok(field) => (self.wire_names.name(field).to_string(), v),
                        Err(_) => (key, v),
                    })
                    .collect::<Map<String, Value>>(),
            ),
            other => other,
        })
    }

    /// Liveness probe against `/health`; any 2xx means available. Uses the
    /// short probe timeout so an unreachable host fails fast.
    pub fn check_availability(&self) -> bool {
        let url = self.url("/health");
        match self.client.get(&url).timeout(self.probe_timeout).send() {
            Ok(res) if res.status().is_success() => true,
            Ok(res) => {
                warn!(%url, status = %res.status(), "catalog service is not healthy");
                false
            }
            Err(e) => {
                warn!(%url, error = %e, "catalog service is unreachable");
                false
            }
        }
    }

    /// GET /autos with optional filters. Items that do not form a valid
    /// record are counted as skipped.
    pub fn list(&self, query: &ListQuery) -> Result<Loaded> {
        let req = self
            .client
            .get(self.url("/autos"))
            .query(&query.params(self.wire_names));
        let res = self.send(req, "list")?;
        let items: Vec<Value> = decode(res, "list")?;

        let mut loaded = Loaded::default();
        for item in items {
            let normalized = serde_json::from_value::<RawRecord>(item)
                .map_err(|e| e.to_string())
                .and_then(|raw| raw.normalize().map_err(|r| r.to_string()));
            match normalized {
                Ok(vehicle) => loaded.records.push(vehicle),
                Err(reason) => {
                    warn!(%reason, "skipping remote record");
                    loaded.skipped += 1;
                }
            }
        }
        debug!(records = loaded.records.len(), skipped = loaded.skipped, "listed remote catalog");
        Ok(loaded)
    }

    /// GET /autos/{id}
    pub fn get(&self, id: &RecordId) -> Result<Vehicle> {
        let res = self.send(self.client.get(self.record_url(id)?), "get")?;
        record_from(res, "get")
    }

    /// POST /autos. Returns the record as stored, with its new id.
    pub fn create(&self, vehicle: &Vehicle) -> Result<Vehicle> {
        crate::record::validate_for_write(vehicle)?;
        let req = self
            .client
            .post(self.url("/autos"))
            .json(&self.body(&vehicle.without_id())?);
        let created = record_from(self.send(req, "create")?, "create")?;
        if created.id.is_none() {
            return Err(CatalogError::Server("created record carries no id".into()));
        }
        Ok(created)
    }

    /// PATCH /autos/{id} with only the changed fields.
    pub fn update_partial(&self, id: &RecordId, patch: &VehiclePatch) -> Result<Vehicle> {
        patch.validate()?;
        let req = self
            .client
            .patch(self.record_url(id)?)
            .json(&self.body(patch)?);
        record_from(self.send(req, "update")?, "update")
    }

    /// DELETE /autos/{id}
    pub fn delete(&self, id: &RecordId) -> Result<()> {
        let req = self.client.delete(self.record_url(id)?);
        self.send(req, "delete")?;
        Ok(())
    }

    /// Record whose model equals `model` (ignoring case and accents), else
    /// the first record matching it as a search, else `None`.
    pub fn find_by_model(&self, model: &str) -> Result<Option<Vehicle>> {
        if model.trim().is_empty() {
            return Ok(None);
        }
        let query = ListQuery {
            sort: Some((Field::Model, Direction::Ascending)),
            ..ListQuery::text(model)
        };
        let candidates = self.list(&query)?.records;
        let wanted = fold(model);
        let exact = candidates.iter().position(|v| fold(&v.model) == wanted);
        Ok(match exact {
            Some(i) => candidates.into_iter().nth(i),
            None => candidates.into_iter().next(),
        })
    }

    // Send a request and classify failures: transport problems become
    // `Unavailable`, 404 `NotFound`, other 4xx `Validation`, the rest `Server`.
    fn send(&self, req: RequestBuilder, what: &str) -> Result<Response> {
        let res = req.send().map_err(|e| {
            warn!(error = %e, "{} request failed", what);
            CatalogError::Unavailable(e.to_string())
        })?;
        let status = res.status();
        debug!(%status, "{} response", what);
        if status.is_success() {
            return Ok(res);
        }
        let body = res.text().unwrap_or_default();
        let detail = format!("{} failed: {} {}", what, status, body.trim());
        Err(match status {
            StatusCode::NOT_FOUND => CatalogError::NotFound(detail),
            s if s.is_client_error() => CatalogError::Validation(detail),
            _ => CatalogError::Server(detail),
        })
    }
}

// A body that stops arriving (timeout, reset) is a transport failure; one
// that arrives but is not the expected JSON is the server's fault.
fn decode<T: DeserializeOwned>(res: Response, what: &str) -> Result<T> {
    let bytes = res.bytes().map_err(|e| {
        warn!(error = %e, "{} response body could not be read", what);
        CatalogError::Unavailable(format!("{} response interrupted: {}", what, e))
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CatalogError::Server(format!("unreadable {} response: {}", what, e)))
}

fn record_from(res: Response, what: &str) -> Result<Vehicle> {
    let raw: RawRecord = decode(res, what)?;
    raw.normalize()
        .map_err(|reason| CatalogError::Server(format!("invalid record in {} response: {}", what, reason)))
}
