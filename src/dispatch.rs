//! Request dispatch: path to resource, method to lifecycle operation.
//!
//! Transport independent. The HTTP layer turns a request into a
//! [`Request`] and writes the returned [`Reply`] back.

use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::error::{GatewayError, Result};
use crate::lock::KeyedLocks;
use crate::resource::{Host, IpSet, Lifecycle, Namespace, Resource};
use crate::tree::{resolve, Operation, Target};

/// An inbound request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            content_type: None,
            body: Bytes::new(),
        }
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: &Value) -> Self {
        self.content_type = Some("application/json".to_string());
        self.body = Bytes::from(body.to_string());
        self
    }

    /// The JSON body, if one was sent. `null` counts as no body.
    fn json_body(&self) -> Result<Option<Value>> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let is_json = self
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"));
        if !is_json {
            return Err(GatewayError::UnsupportedMediaType);
        }
        let value: Value = serde_json::from_slice(&self.body)
            .map_err(|e| GatewayError::Validation(format!("malformed JSON body: {e}")))?;
        Ok((!value.is_null()).then_some(value))
    }
}

/// The outcome of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Option<Value>,
    pub location: Option<String>,
    /// Permitted methods, set on 405 replies.
    pub allow: Option<String>,
}

impl Reply {
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            body: None,
            location: None,
            allow: None,
        }
    }

    fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn from_error(err: &GatewayError) -> Self {
        let mut reply = Self::status(err.status_code()).with_body(json!({ "error": err.to_string() }));
        if let GatewayError::NotAllowed { allowed, .. } = err.root() {
            reply.allow = Some(allowed.clone());
        }
        reply
    }
}

/// Serves requests against one host.
#[derive(Clone, Debug)]
pub struct Gateway {
    host: Host,
    locks: KeyedLocks,
}

impl Gateway {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            locks: KeyedLocks::new(),
        }
    }

    /// Handle a request, holding the lock of its namespace while the
    /// commands run on the blocking pool.
    pub async fn handle(&self, request: Request) -> Reply {
        let key = match resolve(&request.path) {
            Ok(target) => target.netns().unwrap_or_default().to_string(),
            Err(err) => return self.log(&request, Reply::from_error(&err)),
        };
        let _guard = self.locks.lock(&key).await;

        let gateway = self.clone();
        let req = request.clone();
        let reply = match tokio::task::spawn_blocking(move || gateway.handle_blocking(&req)).await
        {
            Ok(reply) => reply,
            Err(join) => Reply::status(StatusCode::INTERNAL_SERVER_ERROR)
                .with_body(json!({ "error": format!("request handler failed: {join}") })),
        };
        self.log(&request, reply)
    }

    /// Handle a request on the calling thread, without locking.
    pub fn handle_blocking(&self, request: &Request) -> Reply {
        match self.execute(request) {
            Ok(reply) => reply,
            Err(err) => Reply::from_error(&err),
        }
    }

    fn execute(&self, request: &Request) -> Result<Reply> {
        let target = resolve(&request.path)?;
        let operation = target.operation(&request.method)?;
        let body = request.json_body()?;
        if body.is_some() && !operation.takes_body() {
            return Err(GatewayError::Validation(format!(
                "{} does not take a request body",
                request.method
            )));
        }
        let body = target.kind().parse_body(body)?;
        let resource = target.build(&self.host, body)?;

        if let Some(ns) = target.enclosing_netns() {
            let namespace = Namespace::new(&self.host, ns);
            if !Lifecycle::new(&namespace).exists()? {
                return Err(GatewayError::NotFound(format!("namespace '{ns}'")));
            }
        }
        if let (Some(ns), Some(set)) = (target.enclosing_netns(), target.enclosing_set()) {
            let ipset = IpSet::new(&self.host, ns, set, None)?;
            if !Lifecycle::new(&ipset).exists()? {
                return Err(GatewayError::NotFound(format!("ipset '{set}'")));
            }
        }

        debug!(?operation, resource = %resource, "dispatching");
        self.apply(&target, request, operation, resource.as_ref())
    }

    fn apply(
        &self,
        target: &Target,
        request: &Request,
        operation: Operation,
        resource: &dyn Resource,
    ) -> Result<Reply> {
        let lifecycle = Lifecycle::new(resource);
        let reply = match operation {
            Operation::List => {
                let ids = resource
                    .list()
                    .map_err(|e| e.within(resource.to_string()))?;
                Reply::status(StatusCode::OK).with_body(json!(ids))
            }
            Operation::Get => {
                if !lifecycle.exists()? {
                    return Err(GatewayError::NotFound(request.path.clone()));
                }
                let reply = Reply::status(StatusCode::OK);
                match resource.describe()? {
                    Some(body) => reply.with_body(body),
                    None => reply.with_body(json!({ "id": resource.id() })),
                }
            }
            Operation::Upsert => created_or_ok(lifecycle.upsert()?),
            Operation::Delete => changed(lifecycle.ensure_deleted()?),
            Operation::Clear => changed(lifecycle.ensure_cleared()?),
            Operation::Append => {
                let id = resource.append()?;
                let mut reply = Reply::status(StatusCode::CREATED).with_body(json!({ "id": id }));
                reply.location = Some(format!("{}/{id}", request.path.trim_end_matches('/')));
                debug!(kind = %target.kind(), %id, "appended");
                reply
            }
        };
        Ok(reply)
    }

    fn log(&self, request: &Request, reply: Reply) -> Reply {
        let status = reply.status.as_u16();
        let detail = reply
            .body
            .as_ref()
            .and_then(|b| b.get("error"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if reply.status.is_server_error() {
            error!(method = %request.method, path = %request.path, status, detail, "request failed");
        } else if reply.status.is_client_error() {
            warn!(method = %request.method, path = %request.path, status, detail, "request rejected");
        } else {
            debug!(method = %request.method, path = %request.path, status, "request served");
        }
        reply
    }
}

fn created_or_ok(created: bool) -> Reply {
    Reply::status(if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    })
}

fn changed(changed: bool) -> Reply {
    Reply::status(if changed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::OK
    })
}
