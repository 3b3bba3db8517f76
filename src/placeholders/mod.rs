//! `{source.field}` template resolution.
//!
//! Tokens are extracted once from the template. Each registered source, in
//! registration order, resolves the tokens of its namespace; tokens a source
//! cannot resolve stay in place for the following sources. When clearing,
//! the output is rescanned so no token of a registered namespace survives.
//! Resolution is a pure function of template, sources and options.

pub mod sling_uri;
pub mod source;
pub mod substitutors;

pub use sling_uri::SlingUri;
pub use source::{PlaceholderSource, SourceDefinition, SourceDefinitions, Substitutor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Percent-encode every resolved value for use inside a URI.
    pub encode: bool,
    /// Replace tokens nobody resolved with the empty string.
    pub clear_unmatched: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            encode: false,
            clear_unmatched: true,
        }
    }
}

impl ResolveOptions {
    pub fn encoding() -> Self {
        Self {
            encode: true,
            clear_unmatched: true,
        }
    }

    pub fn encoding_skip_unmatched() -> Self {
        Self {
            encode: true,
            clear_unmatched: false,
        }
    }
}

pub struct PlaceholdersResolver<'a> {
    sources: &'a SourceDefinitions,
    options: ResolveOptions,
}

impl<'a> PlaceholdersResolver<'a> {
    pub fn new(sources: &'a SourceDefinitions, options: ResolveOptions) -> Self {
        Self { sources, options }
    }

    /// Resolve without encoding, clearing unmatched tokens.
    pub fn resolve(template: &str, sources: &SourceDefinitions) -> String {
        PlaceholdersResolver::new(sources, ResolveOptions::default()).apply(template)
    }

    /// Resolve with URI encoding, clearing unmatched tokens.
    pub fn resolve_and_encode(template: &str, sources: &SourceDefinitions) -> String {
        PlaceholdersResolver::new(sources, ResolveOptions::encoding()).apply(template)
    }

    /// Resolve with URI encoding, leaving unmatched tokens verbatim.
    pub fn resolve_skip_unmatched(template: &str, sources: &SourceDefinitions) -> String {
        PlaceholdersResolver::new(sources, ResolveOptions::encoding_skip_unmatched())
            .apply(template)
    }

    pub fn resolve_with(template: &str, sources: &SourceDefinitions, options: ResolveOptions) -> String {
        PlaceholdersResolver::new(sources, options).apply(template)
    }

    pub fn apply(&self, template: &str) -> String {
        let tokens = placeholders(template);
        let mut unresolved = tokens.clone();
        let mut resolved = template.to_string();

        for source in self.sources.iter() {
            for token in tokens.iter().filter(|token| source.owns(token)) {
                if !unresolved.contains(token) {
                    continue;
                }
                if let Some(value) = source.value(token) {
                    let value = if self.options.encode {
                        encode_value(&value)
                    } else {
                        value
                    };
                    resolved = replace_token(&resolved, token, &value);
                    unresolved.retain(|t| t != token);
                }
            }
        }

        if self.options.clear_unmatched {
            for token in &unresolved {
                resolved = replace_token(&resolved, token, "");
            }
            resolved = self.clear_owned(resolved);
        }

        resolved
    }

    /// Clears tokens of a registered namespace that resolution or clearing
    /// brought into the output. Each pass shortens the string.
    fn clear_owned(&self, mut resolved: String) -> String {
        loop {
            let owned: Vec<String> = placeholders(&resolved)
                .into_iter()
                .filter(|token| self.sources.iter().any(|source| source.owns(token)))
                .collect();
            if owned.is_empty() {
                return resolved;
            }
            for token in &owned {
                resolved = replace_token(&resolved, token, "");
            }
        }
    }
}

fn replace_token(resolved: &str, token: &str, value: &str) -> String {
    resolved.replace(&format!("{{{token}}}"), value)
}

/// Token extraction: split on `{`, keep pieces holding a `}` and cut them
/// at the first `}`. Duplicates are dropped, first-seen order kept.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for piece in template.split('{') {
        if let Some(end) = piece.find('}') {
            let token = &piece[..end];
            if !tokens.iter().any(|t| t == token) {
                tokens.push(token.to_string());
            }
        }
    }
    tokens
}

/// Form-urlencodes `value`, then renders `+` as `%20` and restores `/`.
pub fn encode_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
        .replace("%2F", "/")
}
