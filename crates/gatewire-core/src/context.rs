//! Request-scoped context (C3).
//!
//! A single `RequestContext` is attached to the request's extension map on
//! first write and lives for the lifetime of the request. Access is only
//! ever through the typed accessors below — no untyped key/value API is
//! exposed to callers, per the request-scoped-context design note.

use actix_web::HttpMessage;
use ahash::HashSet as AHashSet;
use std::collections::HashMap;

/// Per-request state threaded through the middleware chain.
///
/// Owned exclusively by the request it's attached to; created lazily the
/// first time a middleware calls one of the `set_*`/`dirty_header` helpers,
/// and dropped with the request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    username: Option<String>,
    groups: AHashSet<String>,
    dirty_headers: HashMap<String, String>,
    path: String,
    route_name: String,
}

impl RequestContext {
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = Some(username.into());
    }

    /// Order-insignificant, deduplicated view of the group set.
    pub fn groups(&self) -> Vec<String> {
        self.groups.iter().cloned().collect()
    }

    pub fn add_group(&mut self, group: impl Into<String>) {
        self.groups.insert(group.into());
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Rewrites the rest-of-path forwarded to upstream. Called by the
    /// router on a match, and may be further rewritten by middlewares.
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub fn route_name(&self) -> &str {
        &self.route_name
    }

    pub fn set_route_name(&mut self, name: impl Into<String>) {
        self.route_name = name.into();
    }

    /// Marks `name` for deletion before forwarding, unless `restore_value`
    /// is set, in which case the header is instead set to that value.
    /// Header names are canonicalized (lowercased, trimmed) before storage.
    pub fn dirty_header(&mut self, name: &str, restore_value: Option<&str>) {
        let key = canonicalize_header_name(name);
        self.dirty_headers
            .insert(key, restore_value.unwrap_or("").to_string());
    }

    pub fn is_dirty_header(&self, name: &str) -> bool {
        self.dirty_headers
            .contains_key(&canonicalize_header_name(name))
    }

    /// Clears a header's dirty marking; forwarding leaves it untouched.
    pub fn undirty_header(&mut self, name: &str) {
        self.dirty_headers.remove(&canonicalize_header_name(name));
    }

    /// Every recorded (canonical-name, restore-value) pair. An empty
    /// restore-value means "delete before forwarding".
    pub fn dirty_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dirty_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn canonicalize_header_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Ensures a `RequestContext` exists on the request's extensions and runs
/// `f` against a mutable reference to it. Returns `f`'s result.
pub fn with_context_mut<R>(
    req: &actix_web::HttpRequest,
    f: impl FnOnce(&mut RequestContext) -> R,
) -> R {
    let mut extensions = req.extensions_mut();
    if extensions.get_mut::<RequestContext>().is_none() {
        extensions.insert(RequestContext::default());
    }
    f(extensions.get_mut::<RequestContext>().expect("just inserted"))
}

/// Reads a cloned snapshot of the request's context, or the zero value if
/// none has been created yet. Never panics.
pub fn context_snapshot(req: &actix_web::HttpRequest) -> RequestContext {
    req.extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_header_round_trip() {
        let mut ctx = RequestContext::default();
        ctx.dirty_header("X-Foo", None);
        assert!(ctx.is_dirty_header("x-foo"));
        let (name, restore) = ctx.dirty_headers().next().unwrap();
        assert_eq!(name, "x-foo");
        assert_eq!(restore, "");

        ctx.undirty_header("x-foo");
        assert!(!ctx.is_dirty_header("X-Foo"));
    }

    #[test]
    fn groups_are_deduplicated() {
        let mut ctx = RequestContext::default();
        ctx.add_group("admin");
        ctx.add_group("admin");
        ctx.add_group("ops");
        let mut groups = ctx.groups();
        groups.sort();
        assert_eq!(groups, vec!["admin".to_string(), "ops".to_string()]);
    }
}
