use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::engine::{Engine, EngineError};
use crate::model::Block;
use crate::validate::{self, FieldMap};

/// The three operations, selected by path suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Save,
    List,
    Delete,
}

impl Route {
    pub fn from_path(path: &str) -> Option<Self> {
        if path.ends_with("/blocks/list") {
            Some(Route::List)
        } else if path.ends_with("/blocks/delete") {
            Some(Route::Delete)
        } else if path.ends_with("/blocks") {
            Some(Route::Save)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Route::Save => "save",
            Route::List => "list",
            Route::Delete => "delete",
        }
    }
}

/// Failures detected before or around the engine.
#[derive(Debug)]
pub enum ApiError {
    MalformedRequest(String),
    MethodNotAllowed(String),
    RouteNotFound(String),
    Engine(EngineError),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::MalformedRequest(_) => 400,
            ApiError::MethodNotAllowed(_) => 405,
            ApiError::RouteNotFound(_) => 404,
            ApiError::Engine(EngineError::Validation(_) | EngineError::Overlap(_)) => 400,
            ApiError::Engine(EngineError::NotFound(_)) => 404,
            ApiError::Engine(EngineError::Storage(_)) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MalformedRequest(_) => "malformed_request",
            ApiError::MethodNotAllowed(_) => "method_not_allowed",
            ApiError::RouteNotFound(_) => "route_not_found",
            ApiError::Engine(e) => e.code(),
        }
    }

    /// Text shown to the caller. Storage details stay in the server log.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Engine(EngineError::Storage(_)) => "Server error: storage failure".into(),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::MalformedRequest(msg) => write!(f, "{msg}"),
            ApiError::MethodNotAllowed(_) => write!(f, "Method not allowed. Use POST."),
            ApiError::RouteNotFound(path) => write!(f, "Route not found: {path}"),
            ApiError::Engine(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl From<validate::ValidationError> for ApiError {
    fn from(e: validate::ValidationError) -> Self {
        ApiError::Engine(EngineError::Validation(e))
    }
}

/// JSON reply body shared by all routes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<Block>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl Envelope {
    pub fn success(blocks: Vec<Block>, message: Option<&str>) -> Self {
        Self {
            ok: true,
            message: message.map(str::to_string),
            blocks: Some(blocks),
            error: None,
            code: None,
        }
    }

    pub fn failure(err: &ApiError) -> Self {
        Self {
            ok: false,
            message: None,
            blocks: None,
            error: Some(err.public_message()),
            code: Some(err.code()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub status: u16,
    pub body: Envelope,
}

impl Response {
    pub fn from_error(err: &ApiError) -> Self {
        Self {
            status: err.status(),
            body: Envelope::failure(err),
        }
    }
}

/// Accepts an absent/null body, a JSON object, or a string holding a JSON
/// object. Blank strings read as an empty object.
pub fn parse_body(body: Option<&Value>) -> Result<FieldMap, ApiError> {
    let parsed;
    let value = match body {
        None | Some(Value::Null) => return Ok(FieldMap::new()),
        Some(Value::String(raw)) => {
            let raw = raw.trim();
            if raw.is_empty() {
                return Ok(FieldMap::new());
            }
            parsed = serde_json::from_str::<Value>(raw)
                .map_err(|_| ApiError::MalformedRequest("Invalid JSON body".into()))?;
            &parsed
        }
        Some(other) => other,
    };
    match value {
        Value::Object(map) => Ok(map.clone()),
        _ => Err(ApiError::MalformedRequest("request body must be a JSON object".into())),
    }
}

/// Maps (method, path, body) onto the engine and shapes the reply.
pub struct Api {
    engine: Arc<Engine>,
}

impl Api {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub async fn handle(&self, method: &str, path: &str, body: Option<&Value>) -> Response {
        let started = Instant::now();
        let route = Route::from_path(path);
        let result = self.dispatch(method, path, route, body).await;

        let route_label = route.map_or("unknown", Route::label);
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.code(),
        };
        metrics::counter!(crate::observability::OPERATIONS_TOTAL, "route" => route_label, "outcome" => outcome)
            .increment(1);
        metrics::histogram!(crate::observability::OPERATION_DURATION_SECONDS, "route" => route_label)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(body) => Response { status: 200, body },
            Err(err) => {
                if let ApiError::Engine(EngineError::Storage(e)) = &err {
                    error!("{method} {path}: {e}");
                } else {
                    debug!("{method} {path}: {} {err}", err.code());
                }
                Response::from_error(&err)
            }
        }
    }

    async fn dispatch(
        &self,
        method: &str,
        path: &str,
        route: Option<Route>,
        body: Option<&Value>,
    ) -> Result<Envelope, ApiError> {
        if !method.eq_ignore_ascii_case("POST") {
            return Err(ApiError::MethodNotAllowed(method.to_string()));
        }
        let data = parse_body(body)?;
        let route = route.ok_or_else(|| ApiError::RouteNotFound(path.to_string()))?;
        match route {
            Route::List => {
                let cmd = validate::parse_list(&data)?;
                Ok(Envelope::success(self.engine.list(&cmd).await?, None))
            }
            Route::Save => {
                let cmd = validate::parse_save(&data)?;
                Ok(Envelope::success(self.engine.save(cmd).await?, Some("Block saved")))
            }
            Route::Delete => {
                let cmd = validate::parse_delete(&data)?;
                Ok(Envelope::success(self.engine.delete(&cmd).await?, Some("Deleted")))
            }
        }
    }
}
