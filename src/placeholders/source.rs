use std::{fmt, sync::Arc};

use serde_json::Value as JsonValue;

use super::substitutors;
use crate::core::request::ClientRequestInfo;

/// Extracts the value of a placeholder (e.g. `param.q`) from a source value.
///
/// `None` means "not mine", an empty string is a real value.
pub trait Substitutor<T>: Send + Sync {
    fn value(&self, source: &T, placeholder: &str) -> Option<String>;
}

impl<T, F> Substitutor<T> for F
where
    F: Fn(&T, &str) -> Option<String> + Send + Sync,
{
    fn value(&self, source: &T, placeholder: &str) -> Option<String> {
        self(source, placeholder)
    }
}

/// A named source value plus the substitutors able to read from it.
pub struct SourceDefinition<T> {
    name: String,
    source: T,
    substitutors: Vec<Arc<dyn Substitutor<T>>>,
}

impl<T> SourceDefinition<T> {
    pub fn new(name: impl Into<String>, source: T, substitutors: Vec<Arc<dyn Substitutor<T>>>) -> Self {
        Self {
            name: name.into(),
            source,
            substitutors,
        }
    }
}

/// Type-erased view of a [`SourceDefinition`].
pub trait PlaceholderSource: Send + Sync {
    fn name(&self) -> &str;

    /// First non-`None` substitutor result for `placeholder`.
    fn value(&self, placeholder: &str) -> Option<String>;

    fn owns(&self, placeholder: &str) -> bool {
        placeholder
            .split_once('.')
            .map(|(namespace, _)| namespace == self.name())
            .unwrap_or(false)
    }
}

impl<T: Send + Sync> PlaceholderSource for SourceDefinition<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self, placeholder: &str) -> Option<String> {
        self.substitutors
            .iter()
            .find_map(|substitutor| substitutor.value(&self.source, placeholder))
    }
}

/// Ordered set of sources; order is resolution precedence.
#[derive(Clone, Default)]
pub struct SourceDefinitions {
    sources: Vec<Arc<dyn PlaceholderSource>>,
}

impl SourceDefinitions {
    pub fn builder() -> SourceDefinitionsBuilder {
        SourceDefinitionsBuilder::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PlaceholderSource>> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl fmt::Debug for SourceDefinitions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.sources.iter().map(|s| s.name()))
            .finish()
    }
}

#[derive(Default)]
pub struct SourceDefinitionsBuilder {
    sources: Vec<Arc<dyn PlaceholderSource>>,
}

impl SourceDefinitionsBuilder {
    pub fn add_source<T: Send + Sync + 'static>(mut self, definition: SourceDefinition<T>) -> Self {
        self.sources.push(Arc::new(definition));
        self
    }

    /// Registers `param`, `header`, `uri` and `slingUri`, in that order.
    pub fn add_client_request_source(self, request: &ClientRequestInfo) -> Self {
        let request = request.clone();
        self.add_source(SourceDefinition::new(
            substitutors::PARAM_PREFIX,
            request.clone(),
            vec![Arc::new(substitutors::request_param) as Arc<dyn Substitutor<ClientRequestInfo>>],
        ))
        .add_source(SourceDefinition::new(
            substitutors::HEADER_PREFIX,
            request.clone(),
            vec![Arc::new(substitutors::request_header) as Arc<dyn Substitutor<ClientRequestInfo>>],
        ))
        .add_source(SourceDefinition::new(
            substitutors::URI_PREFIX,
            request.clone(),
            substitutors::uri_substitutors(),
        ))
        .add_source(SourceDefinition::new(
            substitutors::SLING_URI_PREFIX,
            request,
            substitutors::sling_uri_substitutors(),
        ))
    }

    /// Registers a JSON document addressed with dotted paths under `name`.
    pub fn add_json_source(self, name: impl Into<String>, json: JsonValue) -> Self {
        self.add_source(SourceDefinition::new(
            name,
            json,
            vec![Arc::new(substitutors::json_path) as Arc<dyn Substitutor<JsonValue>>],
        ))
    }

    pub fn build(self) -> SourceDefinitions {
        SourceDefinitions {
            sources: self.sources,
        }
    }
}
