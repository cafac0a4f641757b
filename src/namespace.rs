//! Namespace paths and the registry of already emitted declarations.
//!
//! A namespace such as `App.Views` is rendered as the assignment target
//! `this["App"]["Views"]`. Before anything can be assigned into it, every
//! prefix has to exist, so the resolver emits
//!
//! ```js
//! this["App"] = this["App"] || {};
//! this["App"]["Views"] = this["App"]["Views"] || {};
//! ```
//!
//! The [`Registry`] remembers which prefixes were already declared in the
//! current output file, so templates sharing a namespace only pay for the
//! declarations once.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use camino::Utf8Path;

use crate::error::NamespaceError;

/// Function computing the namespace path for a given template file.
pub type NamespaceFn = Arc<dyn Fn(&Utf8Path) -> String + Send + Sync>;

/// Where compiled templates are assigned to.
#[derive(Clone)]
pub enum Namespace {
    /// No namespace, templates are returned or emitted as bare expressions.
    Disabled,
    /// A fixed path shared by every template in the task.
    Path(NamespacePath),
    /// A path computed per template file.
    Dynamic(NamespaceFn),
}

impl Namespace {
    /// Parse a fixed namespace path.
    pub fn path(path: &str) -> Result<Self, NamespaceError> {
        NamespacePath::parse(path).map(Namespace::Path)
    }

    /// Compute the namespace per file.
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&Utf8Path) -> String + Send + Sync + 'static,
    {
        Namespace::Dynamic(Arc::new(f))
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Namespace::Disabled)
    }

    /// Resolve the namespace for `file`, recording any new declarations in
    /// `registry`. Returns `None` when namespacing is disabled.
    pub fn resolve(
        &self,
        file: &Utf8Path,
        registry: &mut Registry,
    ) -> Result<Option<Resolved>, (String, NamespaceError)> {
        match self {
            Namespace::Disabled => Ok(None),
            Namespace::Path(path) => Ok(Some(registry.declare(path))),
            Namespace::Dynamic(f) => {
                let raw = f(file);
                let path = NamespacePath::parse(&raw).map_err(|e| (raw, e))?;
                Ok(Some(registry.declare(&path)))
            }
        }
    }
}

impl Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Namespace::Disabled => write!(f, "Namespace::Disabled"),
            Namespace::Path(path) => write!(f, "Namespace::Path({})", path.expr()),
            Namespace::Dynamic(_) => write!(f, "Namespace::Dynamic(*)"),
        }
    }
}

/// A parsed, non-empty namespace path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePath {
    segments: Vec<String>,
}

impl NamespacePath {
    /// Parse a dotted path. Bracket segments (`App["my-views"]`) and a
    /// leading `this` are accepted.
    pub fn parse(path: &str) -> Result<Self, NamespaceError> {
        let path = path.trim();
        let rest = match path.strip_prefix("this") {
            Some(rest) if rest.is_empty() || rest.starts_with(['.', '[']) => {
                rest.strip_prefix('.').unwrap_or(rest)
            }
            _ => path,
        };

        if rest.is_empty() {
            return Err(NamespaceError::Empty);
        }

        let mut segments = Vec::new();
        let mut pos = 0;

        while pos < rest.len() {
            if rest[pos..].starts_with('[') {
                let close = rest[pos..]
                    .find(']')
                    .map(|i| i + pos)
                    .ok_or(NamespaceError::Unterminated(pos))?;
                let inner = unquote(&rest[pos + 1..close]);
                if inner.is_empty() {
                    return Err(NamespaceError::EmptySegment(segments.len()));
                }
                segments.push(inner.to_string());
                pos = close + 1;
            } else {
                let end = rest[pos..]
                    .find(['.', '['])
                    .map(|i| i + pos)
                    .unwrap_or(rest.len());
                if end == pos {
                    return Err(NamespaceError::EmptySegment(segments.len()));
                }
                segments.push(rest[pos..end].to_string());
                pos = end;
            }

            if rest[pos..].starts_with('.') {
                pos += 1;
                if pos == rest.len() {
                    return Err(NamespaceError::EmptySegment(segments.len()));
                }
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The assignment target, e.g. `this["App"]["Views"]`.
    pub fn expr(&self) -> String {
        render(&self.segments)
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

fn render(segments: &[String]) -> String {
    let mut expr = String::from("this");
    for segment in segments {
        expr.push('[');
        expr.push_str(&quote(segment));
        expr.push(']');
    }
    expr
}

/// Render `s` as a double quoted JavaScript string literal.
pub(crate) fn quote(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

/// Namespace path resolved for one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Full assignment target.
    pub expr: String,
    /// Declarations not yet present in the output, root to leaf.
    pub declarations: Vec<String>,
}

/// Ordered set of declared namespace expressions for one output file.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_declared(&self, expr: &str) -> bool {
        self.seen.contains(expr)
    }

    /// Declared expressions in emission order.
    pub fn declared(&self) -> &[String] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Mark every prefix of `path` as declared and return the statements for
    /// the ones that were not declared before.
    pub fn declare(&mut self, path: &NamespacePath) -> Resolved {
        let mut declarations = Vec::new();

        for len in 1..=path.segments.len() {
            let prefix = render(&path.segments[..len]);
            if self.seen.insert(prefix.clone()) {
                declarations.push(format!("{prefix} = {prefix} || {{}};"));
                self.order.push(prefix);
            }
        }

        Resolved {
            expr: path.expr(),
            declarations,
        }
    }

    /// The object a module wrapper should hand back to its caller.
    ///
    /// Prefixes are declared root first, so the first entry is always a
    /// top-level `this["..."]` root. When several roots exist the first one
    /// wins.
    pub fn global_root(&self) -> Option<&str> {
        self.order.first().map(String::as_str)
    }
}
