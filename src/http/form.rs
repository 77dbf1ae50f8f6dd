//! Decoders behind the lazy request views: query strings, URL-encoded and
//! multipart form bodies, and the `Cookie` header.

use std::collections::HashMap;

use thiserror::Error;

/// A file part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub content_type: Option<String>,
    pub name: Option<String>,
    pub body: Vec<u8>,
}

/// Named values where a name may repeat; insertion order is kept per name.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParameters<T> {
    values: HashMap<String, Vec<T>>,
}

impl<T> Default for RequestParameters<T> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
        }
    }
}

impl<T> RequestParameters<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: T) {
        self.values.entry(name.into()).or_default().push(value);
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.values.get(name).and_then(|v| v.first())
    }

    /// Every value stored under `name`, in arrival order.
    pub fn get_list(&self, name: &str) -> Option<&[T]> {
        self.values.get(name).map(Vec::as_slice)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[T])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

#[derive(Debug, Error)]
pub enum MultipartError {
    #[error("malformed multipart body: {0}")]
    Malformed(&'static str),
    #[error("multipart field is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Splits a header value such as `multipart/form-data; boundary=xyz` into the
/// lower-cased main value and its parameters. Parameter names are lower-cased
/// and quoted values are unquoted.
pub fn parse_header(value: &str) -> (String, HashMap<String, String>) {
    let mut parts = value.split(';');
    let main = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
    let params = parts
        .filter_map(|param| {
            let (name, value) = param.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((name.trim().to_ascii_lowercase(), value.to_owned()))
        })
        .collect();
    (main, params)
}

/// Decodes `a=1&b=2&a=3`. Blank values are dropped.
pub fn parse_urlencoded(input: &[u8]) -> RequestParameters<String> {
    let mut params = RequestParameters::new();
    for (name, value) in url::form_urlencoded::parse(input) {
        if !value.is_empty() {
            params.push(name.into_owned(), value.into_owned());
        }
    }
    params
}

/// Parses a `Cookie` header into name/value pairs, last one winning.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((name.to_owned(), value.to_owned()))
        })
        .collect()
}

/// Splits a multipart body on `--<boundary>` and classifies each part.
///
/// A part with a `filename` or an explicit `Content-Type` is a file;
/// everything else is a plain UTF-8 field.
pub fn parse_multipart_form(
    body: &[u8],
    boundary: &[u8],
) -> Result<(RequestParameters<String>, RequestParameters<File>), MultipartError> {
    let mut delimiter = Vec::with_capacity(boundary.len() + 2);
    delimiter.extend_from_slice(b"--");
    delimiter.extend_from_slice(boundary);

    let parts = split_on(body, &delimiter);
    if parts.len() < 3 {
        return Err(MultipartError::Malformed("no parts between boundaries"));
    }

    let mut fields = RequestParameters::new();
    let mut files = RequestParameters::new();

    for part in &parts[1..parts.len() - 1] {
        let part = part
            .strip_prefix(b"\r\n")
            .ok_or(MultipartError::Malformed("boundary not followed by CRLF"))?;

        let (head, data) = if let Some(data) = part.strip_prefix(b"\r\n") {
            (&[][..], data)
        } else {
            let end = find(part, b"\r\n\r\n")
                .ok_or(MultipartError::Malformed("unterminated part headers"))?;
            (&part[..end], &part[end + 4..])
        };
        let data = data
            .strip_suffix(b"\r\n")
            .ok_or(MultipartError::Malformed("part data not followed by CRLF"))?;

        let mut field_name = None;
        let mut file_name = None;
        let mut file_type = None;

        for line in split_on(head, b"\r\n").into_iter().filter(|l| !l.is_empty()) {
            let line = std::str::from_utf8(line)
                .map_err(|_| MultipartError::Malformed("part header is not UTF-8"))?;
            let (name, value) = line
                .split_once(':')
                .ok_or(MultipartError::Malformed("part header without colon"))?;
            let (value, mut params) = parse_header(value.trim());

            if name.trim().eq_ignore_ascii_case("Content-Disposition") {
                file_name = params.remove("filename");
                field_name = params.remove("name");
            } else if name.trim().eq_ignore_ascii_case("Content-Type") {
                file_type = Some(value);
            }
        }

        let field_name = field_name.ok_or(MultipartError::Malformed("part without a name"))?;
        if file_name.is_some() || file_type.is_some() {
            files.push(
                field_name,
                File {
                    content_type: file_type,
                    name: file_name,
                    body: data.to_vec(),
                },
            );
        } else {
            fields.push(field_name, String::from_utf8(data.to_vec())?);
        }
    }

    Ok((fields, files))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn split_on<'a>(mut input: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    while let Some(pos) = find(input, delimiter) {
        parts.push(&input[..pos]);
        input = &input[pos + delimiter.len()..];
    }
    parts.push(input);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_header_extracts_boundary() {
        let (mime, params) = parse_header("Multipart/Form-Data; boundary=\"abc\"");
        assert_eq!(mime, "multipart/form-data");
        assert_eq!(params.get("boundary").map(String::as_str), Some("abc"));
    }

    #[test]
    fn split_keeps_trailing_segment() {
        assert_eq!(split_on(b"a--b--", b"--"), vec![&b"a"[..], &b"b"[..], &b""[..]]);
    }
}
