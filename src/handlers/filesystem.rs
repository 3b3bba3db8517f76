use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use http::{header, StatusCode};
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use validator::Validate;

use super::{event_sources, parse_config};
use crate::{
    core::{
        ClientResponseInfo, GatewayError, GatewayResult, HandlerOutcome, HandlerScope,
        RequestEvent, RequestEventHandler,
    },
    placeholders::PlaceholdersResolver,
};

pub const HANDLER_NAME: &str = "filesystem-repository";

pub const RESOURCE_NOT_FOUND: &str = "Resource not found";

pub fn create_filesystem_handler(cfg: YamlValue) -> GatewayResult<Arc<dyn RequestEventHandler>> {
    let config: HandlerFilesystemConfig = parse_config(HANDLER_NAME, cfg)?;
    Ok(Arc::new(HandlerFilesystem { config }))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
struct HandlerFilesystemConfig {
    /// Directory templates are served from.
    #[validate(length(min = 1))]
    root: String,
    /// Path template resolved against the request, relative to `root`.
    #[serde(default = "HandlerFilesystemConfig::default_path")]
    path: String,
    /// Overrides the content type guessed from the file extension.
    content_type: Option<String>,
}

impl HandlerFilesystemConfig {
    fn default_path() -> String {
        "{uri.path}".to_string()
    }
}

/// Loads a template from disk into the client response.
pub struct HandlerFilesystem {
    config: HandlerFilesystemConfig,
}

impl HandlerFilesystem {
    /// File below `root` for the resolved path, `None` if it tries to escape.
    fn resolve_file(&self, event: &RequestEvent) -> Option<PathBuf> {
        let resolved = PlaceholdersResolver::resolve(&self.config.path, &event_sources(event));
        let relative = Path::new(resolved.trim_start_matches('/'));

        let mut file = PathBuf::from(&self.config.root);
        for component in relative.components() {
            match component {
                Component::Normal(part) => file.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(file)
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

fn not_found(scope: &mut HandlerScope<'_>) -> HandlerOutcome {
    scope.set_response(ClientResponseInfo::new(StatusCode::NOT_FOUND.as_u16()));
    HandlerOutcome::failure(RESOURCE_NOT_FOUND)
}

#[async_trait]
impl RequestEventHandler for HandlerFilesystem {
    fn name(&self) -> &str {
        HANDLER_NAME
    }

    async fn handle(
        &self,
        event: RequestEvent,
        scope: &mut HandlerScope<'_>,
    ) -> GatewayResult<HandlerOutcome> {
        let Some(file) = self.resolve_file(&event) else {
            log::warn!(
                "Rejected resource path outside of repository root for {}",
                event.client_request().path()
            );
            return Ok(not_found(scope));
        };

        match tokio::fs::metadata(&file).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(not_found(scope)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("Template {} not found", file.display());
                return Ok(not_found(scope));
            }
            Err(e) => return Err(GatewayError::Io(e)),
        }

        let body = tokio::fs::read(&file).await?;
        let content_type = self
            .config
            .content_type
            .clone()
            .unwrap_or_else(|| content_type_for(&file).to_string());

        scope.set_response(
            ClientResponseInfo::new(StatusCode::OK.as_u16())
                .with_header(header::CONTENT_TYPE.as_str(), content_type)
                .with_body(body),
        );
        Ok(HandlerOutcome::Success(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{event, init_log, run};

    fn repo_with(files: &[(&str, &str)]) -> PathBuf {
        let root = std::env::temp_dir().join(format!("fragway-repo-{}", uuid::Uuid::new_v4()));
        for (name, content) in files {
            let path = root.join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        root
    }

    fn handler(root: &Path) -> Arc<dyn RequestEventHandler> {
        let yaml = format!("root: {}", root.display());
        create_filesystem_handler(serde_yaml::from_str(&yaml).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_serves_existing_file() {
        init_log();
        let root = repo_with(&[("content/page.html", "<html>hi</html>")]);
        let handler = handler(&root);

        let (outcome, resp) = run(handler.as_ref(), event("/content/page.html"), None).await;

        assert!(matches!(outcome, Ok(HandlerOutcome::Success(_))));
        let resp = resp.unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.body_str(), Some("<html>hi</html>"));
        assert_eq!(resp.headers.get("content-type"), Some("text/html; charset=utf-8"));

        std::fs::remove_dir_all(root).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_failure_with_404() {
        let root = repo_with(&[]);
        let handler = handler(&root);

        let (outcome, resp) = run(handler.as_ref(), event("/nope.html"), None).await;

        assert_eq!(outcome.unwrap(), HandlerOutcome::failure(RESOURCE_NOT_FOUND));
        assert_eq!(resp.unwrap().status_code, 404);
    }

    #[tokio::test]
    async fn test_parent_dir_rejected() {
        let root = repo_with(&[("inside.txt", "x")]);
        let handler = handler(&root.join("sub"));

        let (outcome, _) = run(handler.as_ref(), event("/../inside.txt"), None).await;
        assert!(matches!(outcome, Ok(HandlerOutcome::Failure(_))));

        std::fs::remove_dir_all(root).unwrap();
    }

    #[tokio::test]
    async fn test_path_template() {
        let root = repo_with(&[("templates/s1.html", "selected")]);
        let yaml = format!(
            "root: {}\npath: 'templates/{{slingUri.selector[0]}}.html'",
            root.display()
        );
        let handler = create_filesystem_handler(serde_yaml::from_str(&yaml).unwrap()).unwrap();

        let (_, resp) = run(handler.as_ref(), event("/page.s1.html"), None).await;
        assert_eq!(resp.unwrap().body_str(), Some("selected"));

        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a.JSON")), "application/json");
        assert_eq!(content_type_for(Path::new("a")), "application/octet-stream");
    }
}
