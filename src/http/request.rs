use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use crate::error::HttpError;
use crate::http::form::{self, File, RequestParameters};
use crate::http::headers::Headers;

/// Content type assumed when a request does not declare one.
pub const DEFAULT_HTTP_CONTENT_TYPE: &str = "application/octet-stream";

/// HTTP request methods.
///
/// Any other token on the request line is rejected by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Arguments
    ///
    /// * `s` - String representation of the method (case-sensitive, typically uppercase)
    ///
    /// # Returns
    ///
    /// `Some(Method)` if the string matches a known method, `None` otherwise.
    ///
    /// # Example
    ///
    /// ```
    /// # use sprint::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol version from the request line. Responses echo it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    /// The `<major>.<minor>` part written after `HTTP/`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "1.0",
            Version::Http11 => "1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
struct FormData {
    fields: RequestParameters<String>,
    files: RequestParameters<File>,
}

/// Represents a parsed HTTP request from a client.
///
/// Only the target is split eagerly (path and query string). The JSON body,
/// query arguments, form fields, uploaded files and cookies are parsed on
/// first access and cached for the lifetime of the request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Path component of the request target (e.g., "/index.html")
    pub url: String,
    /// Raw query string without the leading `?`
    pub query_string: Option<String>,
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    pub version: Version,
    /// Request headers (case-insensitive, multi-valued)
    pub headers: Headers,
    /// Request body accumulated from the wire
    pub body: Vec<u8>,
    parsed_json: OnceLock<serde_json::Value>,
    parsed_args: OnceLock<RequestParameters<String>>,
    parsed_form: OnceLock<FormData>,
    parsed_cookies: OnceLock<HashMap<String, String>>,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<Method>,
    target: Option<String>,
    version: Version,
    headers: Headers,
    body: Vec<u8>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            target: None,
            version: Version::Http11,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Request target as it appears on the request line, query included.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(key, value);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        let method = self.method.ok_or("method missing")?;
        let target = self.target.ok_or("target missing")?;
        let mut request = Request::new(&target, self.headers, self.version, method);
        request.body = self.body;
        Ok(request)
    }
}

impl Request {
    /// Creates a request from the raw target and the header block.
    pub fn new(target: &str, headers: Headers, version: Version, method: Method) -> Self {
        let (url, query_string) = split_target(target);
        Self {
            url,
            query_string,
            method,
            version,
            headers,
            body: Vec::new(),
            parsed_json: OnceLock::new(),
            parsed_args: OnceLock::new(),
            parsed_form: OnceLock::new(),
            parsed_cookies: OnceLock::new(),
        }
    }

    /// Retrieves the first value of a header, ignoring the case of its name.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Body parsed as JSON.
    pub fn json(&self) -> Result<&serde_json::Value, HttpError> {
        if let Some(value) = self.parsed_json.get() {
            return Ok(value);
        }
        let value = serde_json::from_slice(&self.body)
            .map_err(|_| HttpError::invalid_usage("Failed when parsing body as json"))?;
        Ok(self.parsed_json.get_or_init(|| value))
    }

    /// Bearer-style token: the second word of the `Authorization` header.
    pub fn token(&self) -> Option<&str> {
        self.header("Authorization")?.split_whitespace().nth(1)
    }

    /// Query string arguments.
    pub fn args(&self) -> &RequestParameters<String> {
        self.parsed_args.get_or_init(|| match &self.query_string {
            Some(query) => form::parse_urlencoded(query.as_bytes()),
            None => RequestParameters::new(),
        })
    }

    /// Form fields from a URL-encoded or multipart body.
    ///
    /// A malformed multipart body is logged and yields empty fields.
    pub fn form(&self) -> &RequestParameters<String> {
        &self.form_data().fields
    }

    /// Files uploaded in a multipart body.
    pub fn files(&self) -> &RequestParameters<File> {
        &self.form_data().files
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        self.parsed_cookies.get_or_init(|| {
            self.header("Cookie")
                .map(form::parse_cookies)
                .unwrap_or_default()
        })
    }

    fn form_data(&self) -> &FormData {
        self.parsed_form.get_or_init(|| self.parse_form())
    }

    fn parse_form(&self) -> FormData {
        let content_type = self
            .header("Content-Type")
            .unwrap_or(DEFAULT_HTTP_CONTENT_TYPE);
        let (mime, parameters) = form::parse_header(content_type);

        match mime.as_str() {
            "application/x-www-form-urlencoded" => FormData {
                fields: form::parse_urlencoded(&self.body),
                files: RequestParameters::new(),
            },
            "multipart/form-data" => {
                let Some(boundary) = parameters.get("boundary") else {
                    tracing::error!(path = %self.url, "Failed when parsing form: missing boundary");
                    return FormData::default();
                };
                match form::parse_multipart_form(&self.body, boundary.as_bytes()) {
                    Ok((fields, files)) => FormData { fields, files },
                    Err(e) => {
                        tracing::error!(path = %self.url, error = %e, "Failed when parsing form");
                        FormData::default()
                    }
                }
            }
            _ => FormData::default(),
        }
    }
}

/// Splits a request target into its path and non-empty query string.
///
/// Absolute-form targets (`http://host/path?q`) are reduced to their path.
fn split_target(target: &str) -> (String, Option<String>) {
    if target.starts_with("http://") || target.starts_with("https://") {
        if let Ok(parsed) = url::Url::parse(target) {
            let query = parsed.query().filter(|q| !q.is_empty()).map(str::to_owned);
            return (parsed.path().to_owned(), query);
        }
    }

    let target = target.split_once('#').map_or(target, |(before, _)| before);
    match target.split_once('?') {
        Some((path, query)) => (
            path.to_owned(),
            (!query.is_empty()).then(|| query.to_owned()),
        ),
        None => (target.to_owned(), None),
    }
}
