//! Request routing
//!
//! | Path                                   | Query                      |
//! |----------------------------------------|----------------------------|
//! | `/analysis-run`                        | `name`                     |
//! | `/assets/path`                         | `path`                     |
//! | `/asset-attributes/value`              | `path`                     |
//! | `/asset-attribute-historian`           | `path`, `start`, `end`, `bucket` |
//! | `/asset-attribute-historian/aggregate` | `path`, `start`, `end`, `agg` |
//!
//! Every response is JSON. Only GET is served.

use assay_core::{Error as CoreError, Value};
use assay_hub::{Aggregate, Error, Hub, RunOutput};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode, Uri};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, warn};

const ROUTES: [&str; 5] = [
    "/analysis-run",
    "/assets/path",
    "/asset-attributes/value",
    "/asset-attribute-historian",
    "/asset-attribute-historian/aggregate",
];

/// Decode a query string; the first occurrence of a key wins
pub fn query_params(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.entry(decode(key)).or_insert_with(|| decode(value));
    }
    params
}

fn decode(component: &str) -> String {
    percent_decode_str(&component.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn envelope_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, serde_json::Value) {
    (
        status,
        json!({ "message": "error", "result": { "error": message.into() } }),
    )
}

fn plain_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, serde_json::Value) {
    (status, json!({ "error": message.into() }))
}

/// Status for a failed lookup
fn lookup_status(err: &Error) -> StatusCode {
    match err.as_core() {
        Some(CoreError::PathNotFound(_))
        | Some(CoreError::NoTemplate(_))
        | Some(CoreError::AttributeNotFound(_)) => StatusCode::NOT_FOUND,
        Some(_) => StatusCode::BAD_REQUEST,
        None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn to_body<T: Serialize>(value: Result<T, Error>) -> (StatusCode, serde_json::Value) {
    match value {
        Ok(found) => match serde_json::to_value(&found) {
            Ok(body) => (StatusCode::OK, body),
            Err(err) => plain_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        },
        Err(err) => {
            let status = lookup_status(&err);
            debug!(%status, error = %err, "lookup failed");
            plain_error(status, err.to_string())
        }
    }
}

async fn analysis_run(hub: &Hub, params: &HashMap<String, String>) -> (StatusCode, serde_json::Value) {
    let Some(name) = param(params, "name") else {
        return envelope_error(StatusCode::BAD_REQUEST, "name is required");
    };
    match hub.run_analysis(name).await {
        Ok(RunOutput::Result(result)) => {
            let result = match result {
                Value::Null => json!({}),
                other => other.to_json(),
            };
            (StatusCode::OK, json!({ "message": "success", "result": result }))
        }
        Ok(RunOutput::Rows(rows)) => (StatusCode::OK, Value::List(rows).to_json()),
        Err(Error::ScriptNotFound(_)) => envelope_error(StatusCode::NOT_FOUND, "analysis not found"),
        Err(err) => {
            warn!(analysis = name, error = %err, "analysis run failed");
            envelope_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

async fn asset_by_path(hub: &Hub, params: &HashMap<String, String>) -> (StatusCode, serde_json::Value) {
    let Some(path) = param(params, "path") else {
        return plain_error(StatusCode::BAD_REQUEST, "path is required");
    };
    to_body(hub.lookup_asset_path(path).await)
}

async fn attribute_value(hub: &Hub, params: &HashMap<String, String>) -> (StatusCode, serde_json::Value) {
    let Some(path) = param(params, "path") else {
        return plain_error(StatusCode::BAD_REQUEST, "path is required");
    };
    to_body(hub.attribute_value(path).await)
}

async fn historian_range(
    hub: &Hub,
    params: &HashMap<String, String>,
) -> (StatusCode, serde_json::Value) {
    let (Some(path), Some(start), Some(end)) = (
        param(params, "path"),
        param(params, "start"),
        param(params, "end"),
    ) else {
        return plain_error(StatusCode::BAD_REQUEST, "path, start, and end are required");
    };
    to_body(
        hub.historian_range(
            path,
            &Value::from(start),
            &Value::from(end),
            param(params, "bucket"),
        )
        .await,
    )
}

async fn historian_aggregate(
    hub: &Hub,
    params: &HashMap<String, String>,
) -> (StatusCode, serde_json::Value) {
    let (Some(path), Some(start), Some(end)) = (
        param(params, "path"),
        param(params, "start"),
        param(params, "end"),
    ) else {
        return plain_error(StatusCode::BAD_REQUEST, "path, start, and end are required");
    };
    let agg = match param(params, "agg") {
        Some(text) => match text.parse::<Aggregate>() {
            Ok(agg) => agg,
            Err(_) => return plain_error(StatusCode::BAD_REQUEST, "Invalid agg"),
        },
        None => Aggregate::default(),
    };
    to_body(
        hub.aggregate(path, &Value::from(start), &Value::from(end), agg)
            .await,
    )
}

/// Route a request to its handler
pub async fn dispatch(hub: &Hub, method: &Method, uri: &Uri) -> (StatusCode, serde_json::Value) {
    let path = uri.path();
    if !ROUTES.contains(&path) {
        return plain_error(StatusCode::NOT_FOUND, "not found");
    }
    if method != Method::GET {
        return plain_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }

    let params = query_params(uri.query());
    match path {
        "/analysis-run" => analysis_run(hub, &params).await,
        "/assets/path" => asset_by_path(hub, &params).await,
        "/asset-attributes/value" => attribute_value(hub, &params).await,
        "/asset-attribute-historian" => historian_range(hub, &params).await,
        _ => historian_aggregate(hub, &params).await,
    }
}

/// Serialize a JSON body
pub fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// hyper service entry point
pub async fn handle_request(
    hub: Arc<Hub>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (status, body) = dispatch(&hub, req.method(), req.uri()).await;
    debug!(method = %req.method(), path = req.uri().path(), %status, "request served");
    Ok(json_response(status, &body))
}
