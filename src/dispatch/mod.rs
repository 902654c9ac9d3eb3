//! Table-driven operation dispatch.
//!
//! Each vendor operation is described by an [`OperationDescriptor`]
//! (endpoint template, HTTP method, auth placement, body encoding,
//! required fields) registered once at startup. Dispatch looks the
//! operation up by name, validates the payload against the descriptor,
//! and hands it to the executor. The per-vendor operation lists are
//! declarative tables in the adapter crates, not imperative code.

use crate::error::AdapterError;
use crate::executor::ApiRequestExecutor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;


/// HTTP method for an operation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

/// Where the access token is attached.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPlacement {
    /// `?access_token=...` query parameter (Facebook Graph).
    QueryAccessToken,
    /// `Authorization: Bearer <token>` header.
    BearerHeader,
    /// `Access-Token: <token>` header (TikTok Business).
    AccessTokenHeader,
}

/// How the request payload is encoded.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyEncoding {
    Json,
    Form,
    /// No body; remaining params become query parameters.
    None,
}

/// How the vendor wraps responses.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseEnvelope {
    /// Body is the resource itself; errors arrive as HTTP 4xx/5xx with
    /// `{"error": {"message", "code"}}` (Facebook).
    Plain,
    /// Every response is `{"code", "message", "data"}` and `code != 0`
    /// means failure even on HTTP 200 (TikTok).
    CodeMessageData,
}

/// Declarative description of one vendor operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationDescriptor {
    /// Operation name (e.g. "CREATE_CAMPAIGN"). Unique per dispatcher.
    pub name: String,
    /// Adapter whose profile (base URL, version) and credentials the
    /// executor uses for this operation.
    pub adapter_id: String,
    pub method: HttpMethod,
    /// Resource path template relative to `{base_url}/{api_version}/`,
    /// with `{param}` placeholders filled from the payload
    /// (e.g. "act_{ad_account_id}/campaigns").
    pub path: String,
    pub auth: AuthPlacement,
    pub body: BodyEncoding,
    pub envelope: ResponseEnvelope,
    /// Payload fields that must be present (path params included).
    pub required: Vec<String>,
    /// Payload-field renames applied before sending
    /// (internal name -> vendor wire name).
    #[serde(default)]
    pub renames: HashMap<String, String>,
    /// Rate limiter key for this operation's resource.
    pub rate_key: String,
    /// Points consumed from the rate window (bulk operations cost more).
    #[serde(default = "default_cost")]
    pub cost: u32,
}

fn default_cost() -> u32 {
    1
}

impl OperationDescriptor {
    /// Checks required fields, then renders the path template.
    ///
    /// Fields consumed by the path are removed from the returned params
    /// so they are not re-sent in the body or query string.
    pub fn prepare(&self, params: &Value) -> Result<(String, Value), AdapterError> {
        let obj = params.as_object().cloned().unwrap_or_default();

        for field in &self.required {
            let present = obj.get(field).map(|v| !v.is_null()).unwrap_or(false);
            if !present {
                return Err(AdapterError::InvalidParams {
                    operation: self.name.clone(),
                    detail: format!("missing required field '{}'", field),
                });
            }
        }

        let mut remaining = obj.clone();
        let mut path = self.path.clone();
        while let Some(start) = path.find('{') {
            let Some(len) = path[start..].find('}') else {
                return Err(AdapterError::Configuration(format!(
                    "unclosed placeholder in path template '{}'",
                    self.path
                )));
            };
            let field = path[start + 1..start + len].to_string();
            let value = match obj.get(&field) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    return Err(AdapterError::InvalidParams {
                        operation: self.name.clone(),
                        detail: format!("missing path parameter '{}'", field),
                    })
                }
            };
            path.replace_range(start..start + len + 1, &value);
            remaining.remove(&field);
        }

        // Apply wire-name renames to the remaining payload
        for (from, to) in &self.renames {
            if let Some(value) = remaining.remove(from) {
                remaining.insert(to.clone(), value);
            }
        }

        Ok((path, Value::Object(remaining)))
    }
}

/// Structured failure carried inside an [`OperationResult`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationFailure {
    /// Error taxonomy bucket (e.g. "vendor_api", "rate_limited").
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_code: Option<i64>,
    pub message: String,
    /// Wait hint for retryable failures, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl From<AdapterError> for OperationFailure {
    fn from(err: AdapterError) -> Self {
        let (kind, status, vendor_code, retry_after_ms) = match &err {
            AdapterError::Configuration(_) => ("configuration", None, None, None),
            AdapterError::RateLimited { retry_after, .. } => (
                "rate_limited",
                None,
                None,
                Some(retry_after.as_millis() as u64),
            ),
            AdapterError::Transient(_) => ("transient", None, None, None),
            AdapterError::VendorApi { status, code, .. } => {
                ("vendor_api", Some(*status), *code, None)
            }
            AdapterError::Credential(_) => ("credential", None, None, None),
            AdapterError::Refresh(_) => ("refresh", None, None, None),
            AdapterError::WebhookVerification(_) => ("webhook_verification", None, None, None),
            AdapterError::UnknownOperation(_) => ("unknown_operation", None, None, None),
            AdapterError::InvalidParams { .. } => ("invalid_params", None, None, None),
        };
        Self {
            kind: kind.to_string(),
            status,
            vendor_code,
            message: err.to_string(),
            retry_after_ms,
        }
    }
}

/// Uniform outcome of one outbound call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationFailure>,
}

impl OperationResult {
    pub fn ok(body: Value) -> Self {
        Self {
            success: true,
            body: Some(body),
            error: None,
        }
    }

    pub fn failed(err: AdapterError) -> Self {
        Self {
            success: false,
            body: None,
            error: Some(err.into()),
        }
    }
}

/// Operation-name → descriptor lookup, built once at startup from the
/// adapter tables.
pub struct OperationDispatcher {
    table: HashMap<String, OperationDescriptor>,
    executor: Arc<ApiRequestExecutor>,
}

impl OperationDispatcher {
    pub fn new(executor: Arc<ApiRequestExecutor>) -> Self {
        Self {
            table: HashMap::new(),
            executor,
        }
    }

    /// Registers a descriptor. Duplicate names are a wiring bug.
    pub fn register(&mut self, descriptor: OperationDescriptor) -> Result<(), AdapterError> {
        if self.table.contains_key(&descriptor.name) {
            return Err(AdapterError::Configuration(format!(
                "operation '{}' registered twice",
                descriptor.name
            )));
        }
        debug!(operation = %descriptor.name, "Registered operation");
        self.table.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Registers a whole adapter table.
    pub fn register_all(
        &mut self,
        descriptors: impl IntoIterator<Item = OperationDescriptor>,
    ) -> Result<(), AdapterError> {
        for descriptor in descriptors {
            self.register(descriptor)?;
        }
        Ok(())
    }

    /// Names of all registered operations, sorted.
    pub fn operation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.table.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn descriptor(&self, name: &str) -> Option<&OperationDescriptor> {
        self.table.get(name)
    }

    /// Looks up the operation, validates the payload, and executes the
    /// call. Unknown names and missing fields fail before any HTTP or
    /// rate-limit work.
    pub async fn dispatch(&self, operation: &str, params: Value) -> OperationResult {
        let Some(descriptor) = self.table.get(operation) else {
            return OperationResult::failed(AdapterError::UnknownOperation(
                operation.to_string(),
            ));
        };

        match self.executor.execute(descriptor, params).await {
            Ok(body) => OperationResult::ok(body),
            Err(err) => OperationResult::failed(err),
        }
    }
}
