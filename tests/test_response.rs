use serde_json::json;
use sprint::http::request::Version;
use sprint::http::response::{Response, ResponseBuilder, StatusCode};
use sprint::http::writer::{ResponseWriter, serialize_response};

fn frame(response: &Response, keep_alive: bool, timeout: Option<u64>) -> String {
    let bytes = serialize_response(response, Version::Http11, keep_alive, timeout);
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::OK.as_u16(), 200);
    assert_eq!(StatusCode::CREATED.as_u16(), 201);
    assert_eq!(StatusCode::NO_CONTENT.as_u16(), 204);
    assert_eq!(StatusCode::BAD_REQUEST.as_u16(), 400);
    assert_eq!(StatusCode::NOT_FOUND.as_u16(), 404);
    assert_eq!(StatusCode::METHOD_NOT_ALLOWED.as_u16(), 405);
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR.as_u16(), 500);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::OK.reason_phrase(), "OK");
    assert_eq!(StatusCode::NO_CONTENT.reason_phrase(), "No Content");
    assert_eq!(StatusCode::REQUEST_TIMEOUT.reason_phrase(), "Request Timeout");
    assert_eq!(
        StatusCode::PAYLOAD_TOO_LARGE.reason_phrase(),
        "Request Entity Too Large"
    );
    assert_eq!(
        StatusCode::from_u16(418).map(|s| s.as_u16()),
        None,
        "codes without a reason phrase cannot be constructed"
    );
    assert_eq!(
        StatusCode::from_u16(429).map(|s| s.reason_phrase()),
        Some("Too Many Requests")
    );
}

#[test]
fn test_response_builder_basic() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .body(b"Hello, World!".to_vec())
        .build();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type, "text/plain");
    assert_eq!(response.body, b"Hello, World!".to_vec());
}

#[test]
fn test_response_builder_content_type_header() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Type", "application/xml")
        .header("X-Custom", "value")
        .build();

    assert_eq!(response.content_type, "application/xml");
    assert_eq!(response.headers.get("X-Custom"), Some("value"));
    assert!(!response.headers.contains("Content-Type"));
}

#[test]
fn test_response_helpers() {
    let text = Response::text("hi");
    assert_eq!(text.content_type, "text/plain; charset=utf-8");

    let html = Response::html("<p>hi</p>");
    assert_eq!(html.content_type, "text/html; charset=utf-8");

    let json = Response::json(&json!({"ok": true})).unwrap();
    assert_eq!(json.content_type, "application/json");
    assert_eq!(json.body, br#"{"ok":true}"#.to_vec());

    let raw = Response::bytes(vec![0u8, 1, 2], "application/octet-stream");
    assert_eq!(raw.body.len(), 3);

    let moved = Response::text("")
        .with_status(StatusCode::FOUND)
        .with_header("Location", "/elsewhere");
    assert_eq!(moved.status.as_u16(), 302);
    assert_eq!(moved.headers.get("location"), Some("/elsewhere"));
}

#[test]
fn test_serialized_hello_frame() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .content_type("text/plain")
        .body("hello")
        .build();

    let text = frame(&response, false, None);
    assert_eq!(
        text,
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: 5\r\n\
         Connection: close\r\n\
         \r\n\
         hello"
    );
}

#[test]
fn test_keep_alive_header_only_when_kept_alive() {
    let response = Response::ok("x");

    let kept = frame(&response, true, Some(60));
    assert!(kept.contains("Connection: keep-alive\r\n"));
    assert!(kept.contains("Keep-Alive: timeout=60\r\n"));

    let closed = frame(&response, false, Some(60));
    assert!(closed.contains("Connection: close\r\n"));
    assert!(!closed.contains("Keep-Alive"));

    let untimed = frame(&response, true, Some(0));
    assert!(!untimed.contains("Keep-Alive"));
}

#[test]
fn test_explicit_framing_headers_are_not_duplicated() {
    let response = Response::ok("abc")
        .with_header("Content-Length", "999")
        .with_header("Connection", "upgrade")
        .with_header("X-Trace", "1");

    let text = frame(&response, false, None);
    assert!(text.contains("Content-Length: 3\r\n"));
    assert!(!text.contains("999"));
    assert!(!text.contains("upgrade"));
    assert!(text.contains("X-Trace: 1\r\n"));
    assert!(text.ends_with("\r\n\r\nabc"));
}

#[test]
fn test_http10_status_line() {
    let bytes = serialize_response(&Response::text("gone").with_status(StatusCode::NOT_FOUND), Version::Http10, false, None);
    assert!(bytes.starts_with(b"HTTP/1.0 404 Not Found\r\n"));
}

#[tokio::test]
async fn test_writer_writes_whole_frame() {
    let mut writer = ResponseWriter::new(&b"HTTP/1.1 204 No Content\r\n\r\n"[..]);
    let mut out = Vec::new();

    writer.write_to_stream(&mut out).await.unwrap();

    assert_eq!(out, writer.as_bytes());
}
