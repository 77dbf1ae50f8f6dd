use sprint::error::HttpError;
use sprint::http::headers::Headers;
use sprint::http::request::{Method, Request, RequestBuilder, Version};

fn get(target: &str) -> Request {
    RequestBuilder::new()
        .method(Method::GET)
        .target(target)
        .build()
        .unwrap()
}

#[test]
fn test_request_header_retrieval() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .target("/")
        .header("Host", "example.com")
        .header("Content-Type", "application/json")
        .build()
        .unwrap();

    assert_eq!(req.header("Host"), Some("example.com"));
    assert_eq!(req.header("content-type"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_headers_are_multi_valued() {
    let mut headers = Headers::new();
    headers.append("Accept", "text/html");
    headers.append("accept", "application/json");

    let req = Request::new("/", headers, Version::Http11, Method::GET);
    let values: Vec<&str> = req.headers.get_all("ACCEPT").collect();
    assert_eq!(values, vec!["text/html", "application/json"]);
}

#[test]
fn test_target_is_split_into_path_and_query() {
    let req = get("/search?q=rust&page=2#results");
    assert_eq!(req.url, "/search");
    assert_eq!(req.query_string.as_deref(), Some("q=rust&page=2"));

    let req = get("/plain?");
    assert_eq!(req.url, "/plain");
    assert_eq!(req.query_string, None);
}

#[test]
fn test_absolute_form_target() {
    let req = get("http://example.com/a/b?x=1");
    assert_eq!(req.url, "/a/b");
    assert_eq!(req.query_string.as_deref(), Some("x=1"));
}

#[test]
fn test_args_keep_repeated_values() {
    let req = get("/?tag=a&tag=b&name=sprint&empty=");
    let args = req.args();

    assert_eq!(args.get("tag").map(String::as_str), Some("a"));
    assert_eq!(
        args.get_list("tag"),
        Some(&["a".to_string(), "b".to_string()][..])
    );
    assert_eq!(args.get("name").map(String::as_str), Some("sprint"));
    assert!(!args.contains_key("empty"));
}

#[test]
fn test_json_body() {
    let req = RequestBuilder::new()
        .method(Method::POST)
        .target("/echo")
        .body(br#"{"name":"sprint","fast":true}"#.to_vec())
        .build()
        .unwrap();

    let json = req.json().unwrap();
    assert_eq!(json["name"], "sprint");
    assert_eq!(json["fast"], true);
    // Cached: same allocation on the second access.
    assert!(std::ptr::eq(json, req.json().unwrap()));
}

#[test]
fn test_invalid_json_is_invalid_usage() {
    let req = RequestBuilder::new()
        .method(Method::POST)
        .target("/echo")
        .body(b"{not json".to_vec())
        .build()
        .unwrap();

    let err = req.json().unwrap_err();
    assert!(matches!(err, HttpError::InvalidUsage(_)));
    assert_eq!(err.status().as_u16(), 400);
}

#[test]
fn test_token_is_second_word_of_authorization() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .target("/")
        .header("Authorization", "Bearer abc.def")
        .build()
        .unwrap();
    assert_eq!(req.token(), Some("abc.def"));
    assert_eq!(get("/").token(), None);
}

#[test]
fn test_cookies() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .target("/")
        .header("Cookie", "session=xyz; theme=\"dark\"; ; bad")
        .build()
        .unwrap();

    let cookies = req.cookies();
    assert_eq!(cookies.get("session").map(String::as_str), Some("xyz"));
    assert_eq!(cookies.get("theme").map(String::as_str), Some("dark"));
    assert_eq!(cookies.len(), 2);
}

#[test]
fn test_urlencoded_form() {
    let req = RequestBuilder::new()
        .method(Method::POST)
        .target("/submit")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(b"name=Jane+Doe&lang=rust&lang=go".to_vec())
        .build()
        .unwrap();

    assert_eq!(req.form().get("name").map(String::as_str), Some("Jane Doe"));
    assert_eq!(req.form().get_list("lang").map(<[String]>::len), Some(2));
    assert!(req.files().is_empty());
}

#[test]
fn test_multipart_form_splits_fields_and_files() {
    let body = concat!(
        "--XyZ\r\n",
        "Content-Disposition: form-data; name=\"title\"\r\n",
        "\r\n",
        "Report\r\n",
        "--XyZ\r\n",
        "Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "file contents\r\n",
        "--XyZ\r\n",
        "Content-Disposition: form-data; name=\"upload\"; filename=\"b.bin\"\r\n",
        "\r\n",
        "\x01\x02\r\n",
        "--XyZ--\r\n",
    );
    let req = RequestBuilder::new()
        .method(Method::POST)
        .target("/upload")
        .header("Content-Type", "multipart/form-data; boundary=XyZ")
        .body(body.as_bytes().to_vec())
        .build()
        .unwrap();

    assert_eq!(req.form().get("title").map(String::as_str), Some("Report"));

    let uploads = req.files().get_list("upload").unwrap();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].name.as_deref(), Some("a.txt"));
    assert_eq!(uploads[0].content_type.as_deref(), Some("text/plain"));
    assert_eq!(uploads[0].body, b"file contents");
    assert_eq!(uploads[1].name.as_deref(), Some("b.bin"));
    assert_eq!(uploads[1].content_type, None);
    assert_eq!(uploads[1].body, b"\x01\x02");
}

#[test]
fn test_malformed_multipart_yields_empty_form() {
    let req = RequestBuilder::new()
        .method(Method::POST)
        .target("/upload")
        .header("Content-Type", "multipart/form-data; boundary=XyZ")
        .body(b"this is not multipart at all".to_vec())
        .build()
        .unwrap();

    assert!(req.form().is_empty());
    assert!(req.files().is_empty());
}

#[test]
fn test_builder_requires_method_and_target() {
    assert!(RequestBuilder::new().target("/").build().is_err());
    assert!(RequestBuilder::new().method(Method::GET).build().is_err());
}
