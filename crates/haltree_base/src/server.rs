/* 📖 # Why a blocking tiny_http server with a thread per request?

Resolution and rendering are synchronous and CPU-bound, so an async runtime buys
nothing here. The accept loop polls with a timeout so that it can observe the
shutdown flag of the HttpServerHandle, and every request runs on its own thread so
that a slow host method does not stall unrelated requests.
*/

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crate::http::{
    HttpMethod, HttpRequest, HttpResponse, HttpServerConfig, HttpServerHandle, HttpService,
    HttpStatusCode,
};
use crate::tracing::{debug, error, info, warn};
use crate::{HaltreeError, HaltreeResult};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Start serving `service` on the configured address.
///
/// Returns once the socket is bound. Dropping every clone of the returned handle
/// stops the accept loop.
pub fn start_server(
    service: Arc<dyn HttpService>,
    config: HttpServerConfig,
) -> HaltreeResult<HttpServerHandle> {
    let address = config.address();
    let server = tiny_http::Server::http(&address).map_err(|e| {
        HaltreeError::message(format!("Failed to bind HTTP server to {address}: {e}"))
    })?;
    let port = server
        .server_addr()
        .to_ip()
        .map(|addr| addr.port())
        .ok_or_else(|| HaltreeError::message(format!("{address} is not an IP address")))?;
    let handle = HttpServerHandle::new(port);
    let shutdown = handle.shutdown_flag();
    info!("Listening on http://{}:{}", config.host, port);

    thread::Builder::new()
        .name("haltree-http".to_string())
        .spawn(move || {
            while !shutdown.load(Ordering::SeqCst) {
                match server.recv_timeout(POLL_INTERVAL) {
                    Ok(Some(request)) => {
                        let service = Arc::clone(&service);
                        let server_name = config.server_name.clone();
                        thread::spawn(move || serve_request(service.as_ref(), &server_name, request));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("HTTP server stopped accepting connections: {e}");
                        break;
                    }
                }
            }
            debug!("HTTP server on port {port} shut down");
        })
        .map_err(|e| HaltreeError::message(format!("Failed to spawn HTTP server thread: {e}")))?;

    Ok(handle)
}

fn serve_request(service: &dyn HttpService, server_name: &str, mut request: tiny_http::Request) {
    let response = match convert_request(&mut request) {
        Ok(converted) => dispatch(service, converted),
        Err(e) => error_response(e.status_code().unwrap_or(400), &e.to_string()),
    };
    if let Err(e) = request.respond(convert_response(response, server_name)) {
        warn!("Failed to send HTTP response: {e}");
    }
}

/// Run a request through the service, mapping service errors onto an error document.
pub fn dispatch(service: &dyn HttpService, request: HttpRequest) -> HttpResponse {
    match service.handle_request(request) {
        Ok(response) => response,
        Err(e) => {
            error!("Request handler failed: {e:?}");
            error_response(
                e.status_code()
                    .unwrap_or(HttpStatusCode::InternalServerError.as_u16()),
                &e.to_string(),
            )
        }
    }
}

fn error_response(status: u16, message: &str) -> HttpResponse {
    HttpResponse::json(status, serde_json::json!({ "error": message }).to_string())
}

fn convert_request(request: &mut tiny_http::Request) -> HaltreeResult<HttpRequest> {
    let method_name = request.method().to_string();
    let method = HttpMethod::parse(&method_name).ok_or_else(|| {
        HaltreeError::method_not_allowed(format!("Unsupported HTTP method: {method_name}"))
    })?;
    let mut converted = HttpRequest::new(method, request.url());
    for header in request.headers() {
        converted = converted.with_header(header.field.to_string(), header.value.to_string());
    }
    let mut body = Vec::new();
    request
        .as_reader()
        .read_to_end(&mut body)
        .map_err(|e| HaltreeError::decode(format!("Failed to read request body: {e}")))?;
    Ok(converted.with_body(body))
}

fn convert_response(
    response: HttpResponse,
    server_name: &str,
) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let status = response.status();
    let mut headers = vec![("Server".to_string(), server_name.to_string())];
    headers.extend(
        response
            .headers()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    let mut converted =
        tiny_http::Response::from_data(response.into_body().into_bytes()).with_status_code(status);
    for (key, value) in headers {
        match tiny_http::Header::from_bytes(key.as_bytes(), value.as_bytes()) {
            Ok(header) => converted.add_header(header),
            Err(()) => warn!("Dropping invalid response header '{key}'"),
        }
    }
    converted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpStream;

    #[derive(Debug)]
    struct EchoService;

    impl HttpService for EchoService {
        fn handle_request(&self, request: HttpRequest) -> HaltreeResult<HttpResponse> {
            if request.path() == "/fail" {
                return Err(Box::new(HaltreeError::message("handler \"exploded\"")));
            }
            if request.path() == "/conflict" {
                return Err(Box::new(HaltreeError::conflict("already there")));
            }
            let body = format!(
                "{} {} {}",
                request.method(),
                request.path(),
                request.body().as_string().unwrap_or_default()
            );
            Ok(HttpResponse::ok()
                .with_content_type("text/plain")
                .with_body(body))
        }
    }

    #[test]
    fn test_dispatch_maps_errors_to_documents() {
        let service = EchoService;

        let failed = dispatch(&service, HttpRequest::new(HttpMethod::Get, "/fail"));
        assert_eq!(failed.status(), 500);
        assert_eq!(
            failed.body().as_string().unwrap(),
            r#"{"error":"handler \"exploded\""}"#
        );

        let conflict = dispatch(&service, HttpRequest::new(HttpMethod::Put, "/conflict"));
        assert_eq!(conflict.status(), 409);
        assert_eq!(
            conflict.body().as_string().unwrap(),
            r#"{"error":"already there"}"#
        );

        let ok = dispatch(&service, HttpRequest::new(HttpMethod::Get, "/x"));
        assert_eq!(ok.status(), 200);
    }

    #[test]
    fn test_error_document_escapes_message() {
        let response = error_response(400, "bad \"body\"\n\u{1}");
        assert_eq!(response.status(), 400);
        let document: serde_json::Value =
            serde_json::from_slice(response.body().as_bytes()).unwrap();
        assert_eq!(
            document,
            serde_json::json!({"error": "bad \"body\"\n\u{1}"})
        );
    }

    #[test]
    fn test_server_round_trip_over_tcp() {
        let handle = start_server(Arc::new(EchoService), HttpServerConfig::default()).unwrap();
        assert_ne!(handle.port(), 0);

        let mut stream = TcpStream::connect(handle.address("127.0.0.1")).unwrap();
        stream
            .write_all(
                b"PUT /pools/p1?fields=name HTTP/1.1\r\nHost: localhost\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
            )
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).unwrap();

        assert!(raw.starts_with("HTTP/1.1 200"), "unexpected response: {raw}");
        assert!(raw.contains("Server: haltree"));
        assert!(raw.ends_with("PUT /pools/p1 {}"));

        handle.shutdown();
        assert!(handle.is_shutdown());
    }
}
