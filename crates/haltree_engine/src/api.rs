/* 📖 # Why a separate HTTP adapter?

The core only needs a path, a method, a query accessor and a way to decode the body
(RequestContext). HalService maps the transport's HttpRequest onto that boundary and
the resulting Reply back onto an HttpResponse, so the resolver and renderer never see
headers, sockets or byte buffers.

Successful documents are served as `application/hal+json`; error documents are plain
`application/json` of the form `{"error": "..."}`.
*/

use std::sync::Arc;

use haltree_base::{
    HaltreeError, HaltreeResult, HttpRequest, HttpResponse, HttpService,
};
use serde_json::Value;

use crate::execute::{RequestContext, respond};
use crate::schema::Schema;

pub const HAL_CONTENT_TYPE: &str = "application/hal+json";

impl RequestContext for HttpRequest {
    fn path(&self) -> &str {
        HttpRequest::path(self)
    }

    fn method(&self) -> &str {
        HttpRequest::method(self).as_str()
    }

    fn query_param(&self, name: &str) -> Option<String> {
        HttpRequest::query_param(self, name)
    }

    fn payload(&self) -> HaltreeResult<Option<Value>> {
        let body = self.body().as_bytes();
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(body).map(Some).map_err(|e| {
            Box::new(HaltreeError::decode(format!(
                "request body is not valid JSON: {}",
                e
            )))
        })
    }
}

/// Serves a compiled schema over HTTP.
#[derive(Clone)]
pub struct HalService {
    schema: Arc<Schema>,
}

impl std::fmt::Debug for HalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HalService")
            .field("root", &self.schema.root().type_name())
            .finish()
    }
}

impl HalService {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

impl HttpService for HalService {
    fn handle_request(&self, request: HttpRequest) -> HaltreeResult<HttpResponse> {
        let reply = respond(&self.schema, &request);
        let body = serde_json::to_string(&reply.document).map_err(|e| {
            Box::new(HaltreeError::message(format!(
                "unable to serialize response: {}",
                e
            )))
        })?;
        let mut response = HttpResponse::with_status_code(reply.status).with_body(body);
        response = if reply.status < 400 {
            response.with_content_type(HAL_CONTENT_TYPE)
        } else {
            response.with_content_type("application/json")
        };
        if let Some(allow) = reply.allow {
            response = response.with_header("Allow", allow);
        }
        Ok(response)
    }
}
