//! Request boundary for resource lineage and calculation use cases.
//!
//! # Responsibility
//! - Map `(method, path, JSON body)` requests onto core services.
//! - Run every request as its own unit of work against the [`Store`].
//! - Translate core errors into status codes and JSON error envelopes.
//!
//! # Invariants
//! - `handle` never panics and always returns a JSON body.
//! - Writes run inside `Store::write`; reads inside `Store::read`.
//! - `POST /expressions` commits the variable update before the
//!   recalculation pass starts.

use lineage_core::{
    CalculationDraft, CalculationId, CalculationResult, ExprError, RecalcService,
    RecalcServiceError, ResourceId, ResourceService, ResourceServiceError,
    SqliteCalculationRepository, SqliteResourceRepository, SqliteVariableRepository, Store,
    VariableId,
};
use log::{info, warn};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Instant;

const WELCOME_MESSAGE: &str = "Welcome to the ResourceLineage APIs!";
const REPARENT_MESSAGE: &str = "Resource parent updated successfully";

/// Request method accepted by the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        write!(f, "{label}")
    }
}

/// Method name outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMethod(pub String);

impl Display for UnknownMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown request method `{}`", self.0)
    }
}

impl Error for UnknownMethod {}

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}

/// One boundary request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            body,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, None)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path, Some(body))
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path, Some(body))
    }
}

/// Status code plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn failure(err: &ApiError) -> Self {
        Self {
            status: err.status(),
            body: json!({
                "error": {
                    "code": err.code(),
                    "message": err.to_string(),
                }
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Boundary-level failure.
#[derive(Debug)]
pub enum ApiError {
    /// No route matches the path.
    RouteNotFound(String),
    /// Path exists but not for this method.
    MethodNotAllowed { method: Method, path: String },
    /// Path segment is not an integer id.
    InvalidId(String),
    /// Body is missing or does not match the route's shape.
    InvalidBody(String),
    /// Response value could not be encoded.
    Serialization(String),
    Resource(ResourceServiceError),
    Recalc(RecalcServiceError),
}

impl ApiError {
    /// HTTP-style status for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::RouteNotFound(_) => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::InvalidId(_) | Self::InvalidBody(_) => 400,
            Self::Serialization(_) => 500,
            Self::Resource(err) => match err {
                ResourceServiceError::ResourceNotFound(_)
                | ResourceServiceError::ParentNotFound(_)
                | ResourceServiceError::DanglingParent(_) => 404,
                ResourceServiceError::InvalidName
                | ResourceServiceError::SelfParent(_)
                | ResourceServiceError::Cycle { .. } => 400,
                ResourceServiceError::Repo(_) => 500,
            },
            Self::Recalc(err) => match err {
                RecalcServiceError::CalculationNotFound(_)
                | RecalcServiceError::VariableNotFound(_) => 404,
                RecalcServiceError::InvalidName | RecalcServiceError::InvalidValue(_) => 400,
                RecalcServiceError::Expression(ExprError::ReferenceParse { .. })
                | RecalcServiceError::Expression(ExprError::VariableNotFound(_)) => 400,
                RecalcServiceError::Expression(ExprError::Evaluation(_)) => 500,
                RecalcServiceError::Repo(_) => 500,
            },
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RouteNotFound(_) => "route_not_found",
            Self::MethodNotAllowed { .. } => "method_not_allowed",
            Self::InvalidId(_) => "invalid_id",
            Self::InvalidBody(_) => "invalid_body",
            Self::Serialization(_) => "serialization_error",
            Self::Resource(err) => match err {
                ResourceServiceError::InvalidName => "invalid_name",
                ResourceServiceError::ResourceNotFound(_) => "resource_not_found",
                ResourceServiceError::ParentNotFound(_) => "parent_not_found",
                ResourceServiceError::DanglingParent(_) => "dangling_parent",
                ResourceServiceError::SelfParent(_) => "self_parent",
                ResourceServiceError::Cycle { .. } => "cycle",
                ResourceServiceError::Repo(_) => "storage_error",
            },
            Self::Recalc(err) => match err {
                RecalcServiceError::CalculationNotFound(_) => "calculation_not_found",
                RecalcServiceError::VariableNotFound(_) => "variable_not_found",
                RecalcServiceError::InvalidName => "invalid_name",
                RecalcServiceError::InvalidValue(_) => "invalid_value",
                RecalcServiceError::Expression(ExprError::ReferenceParse { .. }) => {
                    "reference_parse"
                }
                RecalcServiceError::Expression(ExprError::VariableNotFound(_)) => {
                    "unknown_variable_reference"
                }
                RecalcServiceError::Expression(ExprError::Evaluation(_)) => "evaluation_error",
                RecalcServiceError::Repo(_) => "storage_error",
            },
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RouteNotFound(path) => write!(f, "no route for `{path}`"),
            Self::MethodNotAllowed { method, path } => {
                write!(f, "method {method} is not allowed on `{path}`")
            }
            Self::InvalidId(raw) => write!(f, "`{raw}` is not a valid id"),
            Self::InvalidBody(message) => write!(f, "invalid request body: {message}"),
            Self::Serialization(message) => write!(f, "failed to encode response: {message}"),
            Self::Resource(err) => write!(f, "{err}"),
            Self::Recalc(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Resource(err) => Some(err),
            Self::Recalc(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceServiceError> for ApiError {
    fn from(value: ResourceServiceError) -> Self {
        Self::Resource(value)
    }
}

impl From<RecalcServiceError> for ApiError {
    fn from(value: RecalcServiceError) -> Self {
        Self::Recalc(value)
    }
}

/// Matched route with its path parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Welcome,
    CreateResource,
    Lineage(ResourceId),
    Children(ResourceId),
    Reparent(ResourceId),
    ProcessCalculation(CalculationId),
    RecalculateForVariable(VariableId),
    UpdateVariable,
    EvaluateTransient,
}

impl Route {
    fn label(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::CreateResource => "create_resource",
            Self::Lineage(_) => "lineage",
            Self::Children(_) => "children",
            Self::Reparent(_) => "reparent",
            Self::ProcessCalculation(_) => "process_calculation",
            Self::RecalculateForVariable(_) => "recalculate",
            Self::UpdateVariable => "update_variable",
            Self::EvaluateTransient => "evaluate",
        }
    }
}

fn match_route(method: Method, path: &str) -> Result<Route, ApiError> {
    let segments: Vec<&str> = path
        .trim()
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    let not_allowed = || ApiError::MethodNotAllowed {
        method,
        path: path.to_string(),
    };

    match (segments.as_slice(), method) {
        ([], Method::Get) => Ok(Route::Welcome),
        ([], Method::Post) => Ok(Route::CreateResource),
        ([], _) => Err(not_allowed()),
        (["expressions"], Method::Post) => Ok(Route::UpdateVariable),
        (["expressions"], _) => Err(not_allowed()),
        (["expressions", "evaluate"], Method::Post) => Ok(Route::EvaluateTransient),
        (["expressions", "evaluate"], _) => Err(not_allowed()),
        (["expressions", raw], Method::Get) => Ok(Route::ProcessCalculation(parse_id(raw)?)),
        (["expressions", raw], Method::Put) => {
            Ok(Route::RecalculateForVariable(parse_id(raw)?))
        }
        (["expressions", _], _) => Err(not_allowed()),
        ([raw], Method::Get) => Ok(Route::Lineage(parse_id(raw)?)),
        ([raw], Method::Put) => Ok(Route::Reparent(parse_id(raw)?)),
        ([_], _) => Err(not_allowed()),
        ([raw, "children"], Method::Get) => Ok(Route::Children(parse_id(raw)?)),
        ([_, "children"], _) => Err(not_allowed()),
        _ => Err(ApiError::RouteNotFound(path.to_string())),
    }
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::InvalidId(raw.to_string()))
}

#[derive(Debug, Deserialize)]
struct CreateResourceBody {
    name: String,
    #[serde(rename = "parentId", default)]
    parent_id: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
struct ReparentBody {
    #[serde(rename = "parentId")]
    parent_id: ResourceId,
}

#[derive(Debug, Deserialize)]
struct UpdateVariableBody {
    id: VariableId,
    value: f64,
}

/// Transient calculation, bare or wrapped as `{"calculation": {...}}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EvaluateBody {
    Wrapped { calculation: CalculationDraft },
    Bare(CalculationDraft),
}

impl EvaluateBody {
    fn into_draft(self) -> CalculationDraft {
        match self {
            Self::Wrapped { calculation } => calculation,
            Self::Bare(draft) => draft,
        }
    }
}

type SqliteRecalcService<'conn> =
    RecalcService<SqliteVariableRepository<'conn>, SqliteCalculationRepository<'conn>>;

/// Request router over one store.
pub struct Api<'store> {
    store: &'store Store,
}

impl<'store> Api<'store> {
    pub fn new(store: &'store Store) -> Self {
        Self { store }
    }

    /// Handles one request; failures become error envelopes.
    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let started_at = Instant::now();
        let outcome = match_route(request.method, &request.path)
            .and_then(|route| self.dispatch(route, request.body.as_ref()).map(|body| (route, body)));

        match outcome {
            Ok((route, body)) => {
                info!(
                    "event=api_request module=api status=ok method={} route={} status_code=200 duration_ms={}",
                    request.method,
                    route.label(),
                    started_at.elapsed().as_millis()
                );
                ApiResponse::ok(body)
            }
            Err(err) => {
                let response = ApiResponse::failure(&err);
                warn!(
                    "event=api_request module=api status=error method={} path={} status_code={} error_code={} duration_ms={}",
                    request.method,
                    request.path,
                    response.status,
                    err.code(),
                    started_at.elapsed().as_millis()
                );
                response
            }
        }
    }

    fn dispatch(&self, route: Route, body: Option<&Value>) -> Result<Value, ApiError> {
        match route {
            Route::Welcome => Ok(json!({ "message": WELCOME_MESSAGE })),
            Route::CreateResource => {
                let body: CreateResourceBody = parse_body(body)?;
                let id = self.store.write(|conn| {
                    with_resource_service(conn, |service| {
                        service.create_resource(body.name, body.parent_id)
                    })
                })?;
                Ok(json!({ "id": id }))
            }
            Route::Lineage(id) => {
                let lineage = self.store.read(|conn| {
                    with_resource_service(conn, |service| service.get_lineage(id))
                })?;
                Ok(json!({ "lineage": lineage }))
            }
            Route::Children(id) => {
                let children = self.store.read(|conn| {
                    with_resource_service(conn, |service| service.list_children(Some(id)))
                })?;
                Ok(json!({ "children": children }))
            }
            Route::Reparent(id) => {
                let body: ReparentBody = parse_body(body)?;
                self.store.write(|conn| {
                    with_resource_service(conn, |service| service.reparent(id, body.parent_id))
                })?;
                Ok(json!({ "message": REPARENT_MESSAGE }))
            }
            Route::ProcessCalculation(id) => {
                let result = self.store.write(|conn| {
                    with_recalc_service(conn, |service| service.process_calculation_by_id(id))
                })?;
                to_json(&result)
            }
            Route::RecalculateForVariable(variable_id) => {
                let results = self.store.write(|conn| {
                    with_recalc_service(conn, |service| {
                        service.recalculate_for_variable(variable_id)
                    })
                })?;
                to_json(&results)
            }
            Route::UpdateVariable => {
                let body: UpdateVariableBody = parse_body(body)?;
                let variable = self.store.write(|conn| {
                    with_recalc_service(conn, |service| {
                        service.update_variable_value(body.id, body.value)
                    })
                })?;
                let report = self.store.write(|conn| {
                    with_recalc_service(conn, |service| {
                        service.recalculate_for_variable_report(variable.id)
                    })
                })?;
                Ok(json!({
                    "variable": variable,
                    "recalculated": report.updated,
                    "failed": report.failed,
                }))
            }
            Route::EvaluateTransient => {
                let draft = parse_body::<EvaluateBody>(body)?.into_draft();
                let result: CalculationResult = self.store.write(|conn| {
                    with_recalc_service(conn, |service| service.process_calculation(&draft))
                })?;
                to_json(&result)
            }
        }
    }
}

fn with_resource_service<T>(
    conn: &Connection,
    f: impl FnOnce(&ResourceService<SqliteResourceRepository<'_>>) -> Result<T, ResourceServiceError>,
) -> Result<T, ResourceServiceError> {
    let repo = SqliteResourceRepository::try_new(conn)?;
    f(&ResourceService::new(repo))
}

fn with_recalc_service<T>(
    conn: &Connection,
    f: impl FnOnce(&SqliteRecalcService<'_>) -> Result<T, RecalcServiceError>,
) -> Result<T, RecalcServiceError> {
    let variables = SqliteVariableRepository::try_new(conn)?;
    let calculations = SqliteCalculationRepository::try_new(conn)?;
    f(&RecalcService::new(variables, calculations))
}

fn parse_body<T: DeserializeOwned>(body: Option<&Value>) -> Result<T, ApiError> {
    let body = body.ok_or_else(|| ApiError::InvalidBody("body is required".to_string()))?;
    T::deserialize(body).map_err(|err| ApiError::InvalidBody(err.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|err| ApiError::Serialization(err.to_string()))
}
