use std::sync::Arc;
use std::time::Instant;

use haltree_base::{HaltreeError, HaltreeResult};
use percent_encoding::percent_decode_str;
use serde_json::{Value, json};
use tracing::{debug, error, info};

use crate::ops::{InputRole, Inputs, OperationName, RoleValue};
use crate::render::{FieldSelector, Resource, render_hal};
use crate::resolve::{LocateOptions, ResolvedNode};
use crate::schema::Schema;

/// What the core needs from a transport to serve one request.
pub trait RequestContext {
    fn path(&self) -> &str;
    fn method(&self) -> &str;
    fn query_param(&self, name: &str) -> Option<String>;
    /// The request body as JSON, `None` if there is no body.
    fn payload(&self) -> HaltreeResult<Option<Value>>;
}

/// A successfully executed request, before rendering.
#[derive(Debug)]
pub struct Executed {
    pub status: u16,
    pub resource: Resource,
}

/// A rendered outcome, success or failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub document: Value,
    /// Supported methods, set on 405 replies.
    pub allow: Option<String>,
}

/// Split a request path into percent-decoded segments.
///
/// `/` and a single trailing slash add no segment. Other empty segments, as in
/// `/pools//p1`, are kept so that resolution rejects them.
fn segments(path: &str) -> Vec<String> {
    let path = path.strip_prefix('/').unwrap_or(path);
    let mut segments: Vec<String> = path
        .split('/')
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .collect();
    if segments.last().is_some_and(String::is_empty) {
        segments.pop();
    }
    segments
}

fn page_number(request: &dyn RequestContext) -> HaltreeResult<Option<i64>> {
    match request.query_param("page") {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse::<i64>().map(Some).map_err(|_| {
            Box::new(HaltreeError::decode(format!(
                "Page number '{}' not recognised; expected integer",
                raw
            )))
        }),
    }
}

/// Resolve the request path and run the verb against the target node.
pub fn execute(schema: &Schema, request: &dyn RequestContext) -> HaltreeResult<Executed> {
    let segments = segments(request.path());
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
    let page = page_number(request)?;
    match request.method().to_ascii_uppercase().as_str() {
        "GET" => get(schema, &segments, page),
        "PUT" => put(schema, request, &segments, page),
        other => {
            let options = LocateOptions {
                page,
                allow_absent_target: false,
            };
            let target = ResolvedNode::root(schema)?.locate_with(&segments, &options)?;
            Err(method_not_allowed(&target, request.path(), other))
        }
    }
}

fn get(schema: &Schema, segments: &[&str], page: Option<i64>) -> HaltreeResult<Executed> {
    let options = LocateOptions {
        page,
        allow_absent_target: false,
    };
    let target = ResolvedNode::root(schema)?.locate_with(segments, &options)?;
    if !target.node().is_collection() && target.is_zero() {
        return Err(Box::new(HaltreeError::not_found("Not found.")));
    }
    Ok(Executed {
        status: 200,
        resource: Arc::new(target).resource()?,
    })
}

fn put(
    schema: &Schema,
    request: &dyn RequestContext,
    segments: &[&str],
    page: Option<i64>,
) -> HaltreeResult<Executed> {
    let options = LocateOptions {
        page,
        allow_absent_target: true,
    };
    let mut target = ResolvedNode::root(schema)?.locate_with(segments, &options)?;
    if !target.node().supports(OperationName::Write) {
        return Err(method_not_allowed(&target, request.path(), "PUT"));
    }
    let created = target.is_zero();
    {
        let parent = target.parent().map(|parent| Arc::clone(parent.entity()));
        let payload = request.payload()?;
        let page_number = page.unwrap_or(target.tag().page_number);
        let inputs = Inputs::new()
            .with(InputRole::Parent, || {
                Ok(parent
                    .clone()
                    .map(RoleValue::Entity)
                    .unwrap_or(RoleValue::Absent))
            })
            .with(InputRole::Id, || Ok(RoleValue::Str(target.id().to_string())))
            .with(InputRole::Payload, || {
                Ok(payload
                    .clone()
                    .map(RoleValue::Json)
                    .unwrap_or(RoleValue::Absent))
            })
            .with(InputRole::PageNumber, || Ok(RoleValue::Int(page_number)));
        target.node().invoke(OperationName::Write, &inputs)?;
    }
    target.remanifest(page)?;
    debug!(path = %target.path(), created, "wrote entity");
    Ok(Executed {
        status: if created { 201 } else { 200 },
        resource: Arc::new(target).resource()?,
    })
}

fn method_not_allowed(target: &ResolvedNode, path: &str, method: &str) -> Box<HaltreeError> {
    Box::new(HaltreeError::method_not_allowed(format!(
        "{} does not support method {}; it does support: {}",
        path,
        method,
        target.node().allowed_methods().join(", ")
    )))
}

/// Execute and render a request. Failures become `{"error": ...}` documents.
pub fn respond(schema: &Schema, request: &dyn RequestContext) -> Reply {
    let start = Instant::now();
    let selector = FieldSelector::parse(&request.query_param("fields").unwrap_or_default());
    let reply = match execute(schema, request) {
        Ok(executed) => Reply {
            status: executed.status,
            document: render_hal(&executed.resource, &selector).into(),
            allow: None,
        },
        Err(err) => {
            let status = err.status_code().unwrap_or(500);
            if status >= 500 {
                error!("{:?}", err);
            }
            let allow = (status == 405).then(|| {
                let segments = segments(request.path());
                let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
                schema
                    .node_at(&segments)
                    .map(|node| node.allowed_methods())
                    .unwrap_or_else(|| vec!["GET"])
                    .join(", ")
            });
            Reply {
                status,
                document: json!({"error": err.to_string()}),
                allow,
            }
        }
    };
    info!(
        method = request.method(),
        path = request.path(),
        status = reply.status,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "handled request"
    );
    reply
}
