//! Built-in substitutors for request and JSON sources.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{
    sling_uri::{strip_query_and_fragment, SlingUri},
    source::Substitutor,
};
use crate::core::request::ClientRequestInfo;

pub const PARAM_PREFIX: &str = "param";
pub const HEADER_PREFIX: &str = "header";
pub const URI_PREFIX: &str = "uri";
pub const SLING_URI_PREFIX: &str = "slingUri";

/// `placeholder` without its `namespace.` prefix.
fn field<'a>(placeholder: &'a str, namespace: &str) -> Option<&'a str> {
    placeholder
        .strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix('.'))
}

/// Parses `name[idx]` for the given name.
fn indexed(field: &str, name: &str) -> Option<usize> {
    field
        .strip_prefix(name)?
        .strip_prefix('[')?
        .strip_suffix(']')?
        .parse()
        .ok()
}

pub fn request_param(request: &ClientRequestInfo, placeholder: &str) -> Option<String> {
    field(placeholder, PARAM_PREFIX)
        .and_then(|name| request.params().get(name))
        .map(str::to_string)
}

pub fn request_header(request: &ClientRequestInfo, placeholder: &str) -> Option<String> {
    field(placeholder, HEADER_PREFIX)
        .and_then(|name| request.headers().get(name))
        .map(str::to_string)
}

fn uri_path(request: &ClientRequestInfo, placeholder: &str) -> Option<String> {
    (field(placeholder, URI_PREFIX)? == "path")
        .then(|| strip_query_and_fragment(request.path()).to_string())
}

/// Path segments split on `/`, the leading empty segment included.
fn uri_path_part(request: &ClientRequestInfo, placeholder: &str) -> Option<String> {
    let idx = indexed(field(placeholder, URI_PREFIX)?, "pathpart")?;
    Some(
        strip_query_and_fragment(request.path())
            .split('/')
            .nth(idx)
            .unwrap_or_default()
            .to_string(),
    )
}

fn uri_extension(request: &ClientRequestInfo, placeholder: &str) -> Option<String> {
    if field(placeholder, URI_PREFIX)? != "extension" {
        return None;
    }
    let path = strip_query_and_fragment(request.path());
    let last_segment = path.rsplit('/').next().unwrap_or_default();
    Some(
        last_segment
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_string())
            .unwrap_or_default(),
    )
}

pub fn uri_substitutors() -> Vec<Arc<dyn Substitutor<ClientRequestInfo>>> {
    vec![
        Arc::new(uri_path) as Arc<dyn Substitutor<ClientRequestInfo>>,
        Arc::new(uri_path_part) as Arc<dyn Substitutor<ClientRequestInfo>>,
        Arc::new(uri_extension) as Arc<dyn Substitutor<ClientRequestInfo>>,
    ]
}

fn sling_field(request: &ClientRequestInfo, placeholder: &str) -> Option<String> {
    let field = field(placeholder, SLING_URI_PREFIX)?;
    let uri = SlingUri::parse(request.path());

    let value = match field {
        "path" => uri.path().to_string(),
        "selectorstring" => uri.selector_string(),
        "extension" => uri.extension().unwrap_or_default().to_string(),
        "suffix" => uri.suffix().unwrap_or_default().to_string(),
        other => {
            if let Some(idx) = indexed(other, "pathpart") {
                uri.path_part(idx).unwrap_or_default().to_string()
            } else if let Some(idx) = indexed(other, "selector") {
                uri.selector(idx).unwrap_or_default().to_string()
            } else {
                return None;
            }
        }
    };
    Some(value)
}

pub fn sling_uri_substitutors() -> Vec<Arc<dyn Substitutor<ClientRequestInfo>>> {
    vec![Arc::new(sling_field) as Arc<dyn Substitutor<ClientRequestInfo>>]
}

/// Walks a dotted path (`payload.user.name`, `payload.items.0`) into a JSON value.
pub fn json_path(json: &JsonValue, placeholder: &str) -> Option<String> {
    let (_, path) = placeholder.split_once('.')?;
    let mut current = json;
    for key in path.split('.') {
        current = match current {
            JsonValue::Object(map) => map.get(key)?,
            JsonValue::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    match current {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(path: &str) -> ClientRequestInfo {
        ClientRequestInfo::builder()
            .path(path)
            .param("q", "core & x")
            .header("authorizationId", "486434684345")
            .build()
    }

    #[test]
    fn test_param_and_header() {
        let req = request("/");
        assert_eq!(request_param(&req, "param.Q").as_deref(), Some("core & x"));
        assert_eq!(request_param(&req, "param.missing"), None);
        assert_eq!(
            request_header(&req, "header.authorizationid").as_deref(),
            Some("486434684345")
        );
    }

    #[test]
    fn test_uri_fields() {
        let req = request("/a/b/c/d/e.s1.s2.html/c/d.s.txt#f");
        assert_eq!(
            uri_path(&req, "uri.path").as_deref(),
            Some("/a/b/c/d/e.s1.s2.html/c/d.s.txt")
        );
        assert_eq!(uri_path_part(&req, "uri.pathpart[0]").as_deref(), Some(""));
        assert_eq!(uri_path_part(&req, "uri.pathpart[5]").as_deref(), Some("e.s1.s2.html"));
        assert_eq!(uri_path_part(&req, "uri.pathpart[99]").as_deref(), Some(""));
        assert_eq!(uri_path_part(&req, "uri.pathpart[x]"), None);
        assert_eq!(uri_extension(&req, "uri.extension").as_deref(), Some("txt"));
        assert_eq!(uri_extension(&request("/a/b"), "uri.extension").as_deref(), Some(""));
        assert_eq!(uri_path(&req, "uri.unknown"), None);
    }

    #[test]
    fn test_sling_fields() {
        let req = request("/a/b.s1.s2.html/c/d.s.txt#f");
        assert_eq!(sling_field(&req, "slingUri.selector[0]").as_deref(), Some("s1"));
        assert_eq!(sling_field(&req, "slingUri.selector[2]").as_deref(), Some(""));
        assert_eq!(sling_field(&req, "slingUri.suffix").as_deref(), Some("/c/d.s.txt"));
        assert_eq!(sling_field(&req, "slingUri.bogus"), None);
    }

    #[test]
    fn test_json_path() {
        let doc = json!({"user": {"name": "alice", "age": 7, "tags": ["a", "b"], "none": null}});
        assert_eq!(json_path(&doc, "payload.user.name").as_deref(), Some("alice"));
        assert_eq!(json_path(&doc, "payload.user.age").as_deref(), Some("7"));
        assert_eq!(json_path(&doc, "payload.user.tags.1").as_deref(), Some("b"));
        assert_eq!(json_path(&doc, "payload.user.none"), None);
        assert_eq!(json_path(&doc, "payload.user.missing"), None);
    }
}
