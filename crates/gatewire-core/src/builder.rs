//! Programmatic route builder (part of C8).
//!
//! Models the builder tree as an arena of nodes with parent back-references,
//! rather than recursive boxed closures. Each node owns one in-progress
//! `RouteConfig`; `finish()` pops to the parent; `build()` recurses from the
//! roots once, materializing the final `Vec<ProxyRoute>`.

use crate::error::GatewayError;
use crate::route::{ProxyRoute, RouteConfig};

struct Node {
    config: RouteConfig,
    parent: Option<usize>,
}

/// Programmatic alternative to decoding a JSON/YAML file: `add_route`
/// appends a sibling route at the current level, `add_sub_route` descends
/// into the most recently added route and appends children of it, `finish`
/// pops back to the parent level, and `build` validates the whole tree
/// into servable [`ProxyRoute`]s.
pub struct RouteBuilder {
    arena: Vec<Node>,
    roots: Vec<usize>,
    cursor: Option<usize>,
    /// Parent under which `add_route` attaches new nodes at the current
    /// level (`None` means root level).
    level_parent: Option<usize>,
    /// `(level_parent, parent)` saved by `add_sub_route`, restored by
    /// `finish` so repeated descend/finish pairs return to the right level.
    level_stack: Vec<(Option<usize>, usize)>,
}

impl RouteBuilder {
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            roots: Vec::new(),
            cursor: None,
            level_parent: None,
            level_stack: Vec::new(),
        }
    }

    /// Adds a route as a sibling of the others added at the current level
    /// (root, or the children of whatever `add_sub_route` last descended
    /// into), and moves the cursor to it.
    pub fn add_route(&mut self, name: &str, path: &str, url: &str) -> &mut Self {
        let config = RouteConfig {
            name: name.to_string(),
            path: path.to_string(),
            url: url.to_string(),
            ..Default::default()
        };
        let index = self.push_node(config, self.level_parent);
        self.cursor = Some(index);
        self
    }

    /// Descends into the most recently added route's children: adds `name`
    /// as its child and makes subsequent `add_route` calls attach further
    /// siblings at that new, nested level until a matching `finish`.
    pub fn add_sub_route(&mut self, name: &str, path: &str, url: &str) -> &mut Self {
        let parent = self.cursor.expect("add_sub_route called before add_route");
        let config = RouteConfig {
            name: name.to_string(),
            path: path.to_string(),
            url: url.to_string(),
            ..Default::default()
        };
        let index = self.push_node(config, Some(parent));
        self.level_stack.push((self.level_parent, parent));
        self.level_parent = Some(parent);
        self.cursor = Some(index);
        self
    }

    pub fn with_methods(&mut self, methods: &[&str]) -> &mut Self {
        self.current_mut().methods = methods.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_forwarded_header(&mut self, header: &str) -> &mut Self {
        self.current_mut().forwarded_header = header.to_string();
        self
    }

    pub fn with_no_buffer(&mut self) -> &mut Self {
        self.current_mut().no_buffer = true;
        self
    }

    pub fn without_no_buffer(&mut self) -> &mut Self {
        self.current_mut().no_buffer = false;
        self
    }

    pub fn with_show_error(&mut self) -> &mut Self {
        self.current_mut().show_error = true;
        self
    }

    pub fn with_sensitive_headers(&mut self, headers: &[&str]) -> &mut Self {
        self.current_mut().sensitive_headers = headers.iter().map(|h| h.to_string()).collect();
        self
    }

    pub fn with_middleware_params(&mut self, params: serde_json::Value) -> &mut Self {
        self.current_mut().middleware_params = params;
        self
    }

    /// Pops back to the level `add_sub_route` descended from, restoring
    /// the cursor to the route that was descended into (or to "no cursor"
    /// at the root level if there's no level to pop to).
    pub fn finish(&mut self) -> &mut Self {
        match self.level_stack.pop() {
            Some((level_parent, parent)) => {
                self.level_parent = level_parent;
                self.cursor = Some(parent);
            }
            None => {
                self.level_parent = None;
                self.cursor = None;
            }
        }
        self
    }

    /// Validates every node in the arena and materializes the final,
    /// nested `Vec<ProxyRoute>` by recursing from the roots.
    pub fn build(&self) -> Result<Vec<ProxyRoute>, GatewayError> {
        self.roots
            .iter()
            .map(|&root| ProxyRoute::check(self.config_tree(root)))
            .collect()
    }

    /// Clones the node at `index`'s config and recursively attaches its
    /// children's config trees, bottom-up, so a single top-level
    /// `ProxyRoute::check` validates the whole nested structure at once.
    fn config_tree(&self, index: usize) -> RouteConfig {
        let mut config = self.arena[index].config.clone();
        config.routes = self
            .children_of(index)
            .into_iter()
            .map(|child| self.config_tree(child))
            .collect();
        config
    }

    fn children_of(&self, parent: usize) -> Vec<usize> {
        self.arena
            .iter()
            .enumerate()
            .filter_map(|(i, node)| (node.parent == Some(parent)).then_some(i))
            .collect()
    }

    fn current_mut(&mut self) -> &mut RouteConfig {
        let index = self
            .cursor
            .expect("with_*/without_* called before add_route");
        &mut self.arena[index].config
    }

    fn push_node(&mut self, config: RouteConfig, parent: Option<usize>) -> usize {
        let index = self.arena.len();
        self.arena.push(Node { config, parent });
        if parent.is_none() {
            self.roots.push(index);
        }
        index
    }
}

impl Default for RouteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_flat_route_list() {
        let mut builder = RouteBuilder::new();
        builder.add_route("a", "/app/**", "http://up.example.com");
        let routes = builder.build().unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name, "a");
    }

    #[test]
    fn nested_sub_routes_attach_to_parent() {
        let mut builder = RouteBuilder::new();
        builder
            .add_route("parent", "/app/**", "http://up.example.com")
            .add_sub_route("child", "/app/sub/**", "http://sub.example.com")
            .finish();
        let routes = builder.build().unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].routes.len(), 1);
        assert_eq!(routes[0].routes[0].name, "child");
    }

    #[test]
    fn repeated_add_route_yields_siblings_not_nesting() {
        let mut builder = RouteBuilder::new();
        builder
            .add_route("a", "/a/**", "http://a.example.com")
            .add_route("b", "/b/**", "http://b.example.com");
        let routes = builder.build().unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].name, "a");
        assert!(routes[0].routes.is_empty());
        assert_eq!(routes[1].name, "b");
        assert!(routes[1].routes.is_empty());
    }

    #[test]
    fn sub_routes_added_after_finish_are_siblings_of_each_other() {
        let mut builder = RouteBuilder::new();
        builder
            .add_route("parent", "/app/**", "http://up.example.com")
            .add_sub_route("child1", "/app/one/**", "http://one.example.com")
            .finish()
            .add_sub_route("child2", "/app/two/**", "http://two.example.com")
            .finish();
        let routes = builder.build().unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].routes.len(), 2);
        assert_eq!(routes[0].routes[0].name, "child1");
        assert_eq!(routes[0].routes[1].name, "child2");
    }
}
