//! Immutable snapshot of an inbound client request.

use http::{header, HeaderMap, Method, Uri};
use serde::{Serialize, Serializer};

use super::{
    error::{GatewayError, GatewayResult},
    multimap::{MultiMap, MultiMapBuilder},
};

pub const MALFORMED_QUERY_MESSAGE: &str = "Invalid characters in Query Parameter";

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRequestInfo {
    path: String,
    #[serde(serialize_with = "serialize_method")]
    method: Method,
    headers: MultiMap,
    params: MultiMap,
    form_attributes: MultiMap,
}

fn serialize_method<S: Serializer>(method: &Method, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(method.as_str())
}

impl Default for ClientRequestInfo {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            method: Method::GET,
            headers: MultiMap::new(),
            params: MultiMap::new(),
            form_attributes: MultiMap::new(),
        }
    }
}

impl ClientRequestInfo {
    pub fn builder() -> ClientRequestInfoBuilder {
        ClientRequestInfoBuilder::default()
    }

    /// Builds the snapshot from transport-level request parts.
    ///
    /// Query parameters come from the URI, form attributes from a
    /// form-urlencoded body. A query with broken percent escapes is rejected.
    pub fn from_raw(
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: &[u8],
    ) -> GatewayResult<Self> {
        Ok(Self::from_head(method, uri, headers)?.with_form_body(body))
    }

    /// Snapshot of the request line and headers, without form attributes.
    pub fn from_head(method: Method, uri: &Uri, headers: &HeaderMap) -> GatewayResult<Self> {
        let params = match uri.query() {
            Some(query) => parse_query(query)?,
            None => MultiMap::new(),
        };

        let headers: MultiMap = headers
            .iter()
            .map(|(name, value)| {
                let value = value
                    .to_str()
                    .map(str::to_string)
                    .unwrap_or_else(|_| String::from_utf8_lossy(value.as_bytes()).into_owned());
                (name.as_str().to_string(), value)
            })
            .collect();

        Ok(Self {
            path: uri.path().to_string(),
            method,
            headers,
            params,
            form_attributes: MultiMap::new(),
        })
    }

    /// Decodes `body` into form attributes when the request is form-urlencoded.
    pub fn with_form_body(mut self, body: &[u8]) -> Self {
        if is_form_urlencoded(&self.headers) {
            self.form_attributes = url::form_urlencoded::parse(body)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
        }
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &MultiMap {
        &self.headers
    }

    pub fn params(&self) -> &MultiMap {
        &self.params
    }

    pub fn form_attributes(&self) -> &MultiMap {
        &self.form_attributes
    }

    /// Path with the query string re-attached, as seen on the request line.
    pub fn request_uri(&self) -> String {
        if self.params.is_empty() {
            return self.path.clone();
        }
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, values) in self.params.iter() {
            for value in values {
                serializer.append_pair(name, value);
            }
        }
        format!("{}?{}", self.path, serializer.finish())
    }

    pub fn with_path(&self, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }

    pub fn with_method(&self, method: Method) -> Self {
        Self {
            method,
            ..self.clone()
        }
    }

    pub fn with_headers(&self, headers: MultiMap) -> Self {
        Self {
            headers,
            ..self.clone()
        }
    }

    pub fn with_params(&self, params: MultiMap) -> Self {
        Self {
            params,
            ..self.clone()
        }
    }

    pub fn with_form_attributes(&self, form_attributes: MultiMap) -> Self {
        Self {
            form_attributes,
            ..self.clone()
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn is_form_urlencoded(headers: &MultiMap) -> bool {
    headers
        .get(header::CONTENT_TYPE.as_str())
        .map(|ct| {
            ct.split(';')
                .next()
                .map(|mime| mime.trim().eq_ignore_ascii_case(FORM_URLENCODED))
                .unwrap_or(false)
        })
        .unwrap_or(false)
}

/// Decodes a query string, refusing `%` escapes that are not followed by two
/// hex digits.
pub fn parse_query(query: &str) -> GatewayResult<MultiMap> {
    let bytes = query.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' {
            let valid = bytes.len() > idx + 2
                && bytes[idx + 1].is_ascii_hexdigit()
                && bytes[idx + 2].is_ascii_hexdigit();
            if !valid {
                return Err(GatewayError::MalformedRequest(
                    MALFORMED_QUERY_MESSAGE.to_string(),
                ));
            }
            idx += 3;
        } else {
            idx += 1;
        }
    }

    Ok(url::form_urlencoded::parse(bytes)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect())
}

#[derive(Debug, Default)]
pub struct ClientRequestInfoBuilder {
    path: Option<String>,
    method: Option<Method>,
    headers: MultiMapBuilder,
    params: MultiMapBuilder,
    form_attributes: MultiMapBuilder,
}

impl ClientRequestInfoBuilder {
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn form_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_attributes.insert(name, value);
        self
    }

    pub fn build(self) -> ClientRequestInfo {
        ClientRequestInfo {
            path: self.path.unwrap_or_else(|| "/".to_string()),
            method: self.method.unwrap_or(Method::GET),
            headers: self.headers.build(),
            params: self.params.build(),
            form_attributes: self.form_attributes.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_from_raw_parses_query_and_headers() {
        let uri: Uri = "/content/page.html?q=core+%26+x&Q=second&flag"
            .parse()
            .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("X-User", HeaderValue::from_static("alice"));

        let req = ClientRequestInfo::from_raw(Method::GET, &uri, &headers, b"").unwrap();

        assert_eq!(req.path(), "/content/page.html");
        assert_eq!(req.params().get_all("q"), &["core & x", "second"]);
        assert_eq!(req.params().get("flag"), Some(""));
        assert_eq!(req.headers().get("x-user"), Some("alice"));
        assert!(req.form_attributes().is_empty());
    }

    #[test]
    fn test_from_raw_reads_form_body() {
        let uri: Uri = "/submit".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
        );

        let req =
            ClientRequestInfo::from_raw(Method::POST, &uri, &headers, b"name=J%C3%B6rg&age=7")
                .unwrap();

        assert_eq!(req.form_attributes().get("NAME"), Some("Jörg"));
        assert_eq!(req.form_attributes().get("age"), Some("7"));
    }

    #[test]
    fn test_form_body_ignored_without_form_content_type() {
        let uri: Uri = "/submit?x=1".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let req = ClientRequestInfo::from_head(Method::POST, &uri, &headers)
            .unwrap()
            .with_form_body(b"name=x");

        assert_eq!(req.params().get("x"), Some("1"));
        assert!(req.form_attributes().is_empty());
    }

    #[test]
    fn test_malformed_query_rejected() {
        let uri: Uri = "/search?q=%zz".parse().unwrap();
        let err = ClientRequestInfo::from_raw(Method::GET, &uri, &HeaderMap::new(), b"")
            .unwrap_err();
        assert!(matches!(err, GatewayError::MalformedRequest(ref m) if m == MALFORMED_QUERY_MESSAGE));

        assert!(parse_query("a=%4").is_err());
        assert!(parse_query("a=%41").is_ok());
    }

    #[test]
    fn test_modifiers_copy() {
        let req = ClientRequestInfo::builder()
            .path("/a")
            .param("x", "1")
            .build();
        let moved = req.with_path("/b");

        assert_eq!(req.path(), "/a");
        assert_eq!(moved.path(), "/b");
        assert_eq!(moved.params().get("x"), Some("1"));
    }

    #[test]
    fn test_json_shape() {
        let req = ClientRequestInfo::builder()
            .path("/a")
            .method(Method::POST)
            .header("Accept", "text/html")
            .build();
        let json = req.to_json();
        assert_eq!(json["path"], "/a");
        assert_eq!(json["method"], "POST");
        assert_eq!(json["headers"]["Accept"][0], "text/html");
        assert!(json["formAttributes"].is_object());
    }
}
