//! Registry entries and their read-only projection.

use kasane_core::BoxMiddleware;
use serde::Serialize;
use std::fmt;

/// How far an entry's effect travels when its composer is merged into another.
///
/// Ordered: `Local < Scoped < Global`. Promotion never lowers a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Stays inside its own composer; isolated when merged.
    #[default]
    Local,
    /// Visible to the direct parent, which receives it as local.
    Scoped,
    /// Visible at any depth.
    Global,
}

/// The registration operation that created an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// `step` / `steps` / `handle`.
    Use,
    /// `derive`.
    Derive,
    /// `decorate`.
    Decorate,
    /// `guard` / `guard_with`.
    Guard,
    /// `branch`.
    Branch,
    /// `route` / `route_or`.
    Route,
    /// `fork`.
    Fork,
    /// `tap`.
    Tap,
    /// `lazy`.
    Lazy,
    /// `group`.
    Group,
    /// Isolated local entries of an extended composer.
    Extend,
}

impl EntryKind {
    /// Lowercase operation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Use => "use",
            EntryKind::Derive => "derive",
            EntryKind::Decorate => "decorate",
            EntryKind::Guard => "guard",
            EntryKind::Branch => "branch",
            EntryKind::Route => "route",
            EntryKind::Fork => "fork",
            EntryKind::Tap => "tap",
            EntryKind::Lazy => "lazy",
            EntryKind::Group => "group",
            EntryKind::Extend => "extend",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registered step.
#[derive(Clone)]
pub struct MiddlewareEntry {
    pub(crate) handler: BoxMiddleware,
    pub(crate) scope: Scope,
    pub(crate) kind: EntryKind,
    pub(crate) name: Option<String>,
    pub(crate) plugin: Option<String>,
}

impl MiddlewareEntry {
    pub(crate) fn new(handler: BoxMiddleware, kind: EntryKind, scope: Scope) -> Self {
        let name = handler.name_dyn().map(str::to_owned);
        Self {
            handler,
            scope,
            kind,
            name,
            plugin: None,
        }
    }

    /// Raise the scope to at least `scope`.
    pub(crate) fn promote(&mut self, scope: Scope) {
        self.scope = self.scope.max(scope);
    }

    /// Copy of this entry re-homed at `scope`, used when merging into a parent.
    pub(crate) fn rescoped(&self, scope: Scope) -> Self {
        Self {
            scope,
            ..self.clone()
        }
    }

    pub(crate) fn info(&self, index: usize) -> EntryInfo {
        EntryInfo {
            index,
            kind: self.kind,
            name: self.name.clone(),
            scope: self.scope,
            plugin: self.plugin.clone(),
        }
    }

    /// The step itself.
    pub fn handler(&self) -> &BoxMiddleware {
        &self.handler
    }

    /// Current scope.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Operation that created this entry.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }
}

impl fmt::Debug for MiddlewareEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareEntry")
            .field("kind", &self.kind)
            .field("scope", &self.scope)
            .field("name", &self.name)
            .field("plugin", &self.plugin)
            .finish_non_exhaustive()
    }
}

/// Read-only projection of an entry, as returned by `inspect()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    /// Position in the registry.
    pub index: usize,
    /// Operation that created the entry.
    pub kind: EntryKind,
    /// Optional display name.
    pub name: Option<String>,
    /// Current scope.
    pub scope: Scope,
    /// Dedup key of the plugin the entry came from.
    pub plugin: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_ordering() {
        assert!(Scope::Local < Scope::Scoped);
        assert!(Scope::Scoped < Scope::Global);
        assert_eq!(Scope::default(), Scope::Local);
    }

    #[test]
    fn test_promote_never_demotes() {
        let handler = kasane_core::boxed(kasane_core::from_fn(|_ctx, next| async move {
            next.run().await
        }));
        let mut entry = MiddlewareEntry::new(handler, EntryKind::Use, Scope::Global);
        entry.promote(Scope::Scoped);
        assert_eq!(entry.scope(), Scope::Global);

        let mut local = entry.rescoped(Scope::Local);
        local.promote(Scope::Scoped);
        assert_eq!(local.scope(), Scope::Scoped);
    }

    #[test]
    fn test_entry_info_serializes_lowercase() {
        let info = EntryInfo {
            index: 0,
            kind: EntryKind::Derive,
            name: None,
            scope: Scope::Scoped,
            plugin: Some("authnull".into()),
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["kind"], "derive");
        assert_eq!(value["scope"], "scoped");
    }
}
