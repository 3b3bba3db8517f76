//! Request routing
//!
//! Resolves a request path and method to the routing operation configured
//! for it.

use std::collections::HashMap;

use http::Method;
use matchit::Router as MatchRouter;

use crate::{
    config::Route,
    config_error,
    core::GatewayResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatch {
    Matched { operation_id: String },
    /// The path is routed, but not for this method.
    MethodNotAllowed,
    NotFound,
}

#[derive(Debug, Clone)]
struct MethodBinding {
    /// Empty means any method.
    methods: Vec<Method>,
    operation_id: String,
}

impl MethodBinding {
    fn accepts(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }
}

/// Path router built once from the configured routes.
pub struct OperationRouter {
    router: MatchRouter<Vec<MethodBinding>>,
    len: usize,
}

impl OperationRouter {
    pub fn new(routes: &[Route]) -> GatewayResult<Self> {
        // several routes may share a uri with different methods
        let mut grouped: Vec<(String, Vec<MethodBinding>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for route in routes {
            let methods = route
                .methods
                .iter()
                .map(|m| {
                    Method::from_bytes(m.to_string().as_bytes())
                        .map_err(|e| config_error!("Invalid method {} for {}: {}", m, route.uri, e))
                })
                .collect::<GatewayResult<Vec<_>>>()?;
            let binding = MethodBinding {
                methods,
                operation_id: route.operation_id.clone(),
            };

            match index.get(&route.uri) {
                Some(&i) => grouped[i].1.push(binding),
                None => {
                    index.insert(route.uri.clone(), grouped.len());
                    grouped.push((route.uri.clone(), vec![binding]));
                }
            }
        }

        let mut router = MatchRouter::new();
        let len = grouped.len();
        for (uri, bindings) in grouped {
            router
                .insert(uri.as_str(), bindings)
                .map_err(|e| config_error!("Invalid route {}: {}", uri, e))?;
            log::debug!("Added route: {uri}");
        }

        Ok(Self { router, len })
    }

    pub fn route(&self, method: &Method, path: &str) -> RouteMatch {
        let Ok(matched) = self.router.at(path) else {
            return RouteMatch::NotFound;
        };

        matched
            .value
            .iter()
            .find(|binding| binding.accepts(method))
            .map(|binding| RouteMatch::Matched {
                operation_id: binding.operation_id.clone(),
            })
            .unwrap_or(RouteMatch::MethodNotAllowed)
    }

    /// Number of distinct route paths.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes(yaml: &str) -> Vec<Route> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_route_by_path_and_method() {
        let router = OperationRouter::new(&routes(
            r#"
- uri: /content/{*rest}
  methods: [GET]
  operation_id: read
- uri: /content/{*rest}
  methods: [POST, PUT]
  operation_id: write
- uri: /health
  operation_id: health
"#,
        ))
        .unwrap();

        assert_eq!(router.len(), 2);
        assert_eq!(
            router.route(&Method::GET, "/content/a/b.html"),
            RouteMatch::Matched {
                operation_id: "read".to_string()
            }
        );
        assert_eq!(
            router.route(&Method::PUT, "/content/a"),
            RouteMatch::Matched {
                operation_id: "write".to_string()
            }
        );
        assert_eq!(
            router.route(&Method::DELETE, "/content/a"),
            RouteMatch::MethodNotAllowed
        );
        assert_eq!(
            router.route(&Method::DELETE, "/health"),
            RouteMatch::Matched {
                operation_id: "health".to_string()
            }
        );
        assert_eq!(router.route(&Method::GET, "/missing"), RouteMatch::NotFound);
    }

    #[test]
    fn test_conflicting_routes() {
        let result = OperationRouter::new(&routes(
            r#"
- uri: /a/{id}
  operation_id: one
- uri: /a/{name}
  operation_id: two
"#,
        ));
        assert!(result.is_err());
    }
}
