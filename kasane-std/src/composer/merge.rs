//! Scope promotion, plugin merging and conditional registration.

use super::{Composer, EntryKind, Isolated, MiddlewareEntry, Scope};
use kasane_core::{boxed, compose};

impl Composer {
    /// Raise every registered entry to at least `scope`.
    pub fn as_scope(mut self, scope: Scope) -> Self {
        for entry in &mut self.entries {
            entry.promote(scope);
        }
        self.invalidate();
        self
    }

    /// Merge `other` into this composer as a plugin.
    ///
    /// A named plugin is merged at most once per name and seed, including
    /// plugins merged transitively. Its local entries are run as one isolated
    /// step; scoped entries become local here and global entries stay global.
    /// Error kinds, error handlers, macros and methods are inherited.
    pub fn extend(mut self, other: &Composer) -> Self {
        let key = other.dedup_key();
        if let Some(key) = key.as_ref().filter(|key| self.dedup.contains(*key)) {
            tracing::debug!(plugin = %key, "plugin already extended, skipping");
            return self;
        }

        let prior = self.dedup.clone();
        self.dedup.extend(key.iter().cloned());
        self.dedup.extend(other.dedup.iter().cloned());

        for (kind, classifier) in &other.error_kinds {
            self.set_error_kind(kind.clone(), classifier.clone());
        }
        self.error_handlers
            .extend(other.error_handlers.iter().cloned());
        self.macros
            .extend(other.macros.iter().map(|(name, def)| (name.clone(), def.clone())));
        self.methods
            .extend(other.methods.iter().map(|(name, m)| (name.clone(), m.clone())));

        let visible = other.entries.iter().filter(|entry| {
            !entry
                .plugin
                .as_ref()
                .is_some_and(|plugin| prior.contains(plugin))
        });

        let mut local = Vec::new();
        let mut scoped = Vec::new();
        let mut global = Vec::new();
        for entry in visible {
            match entry.scope {
                Scope::Local => local.push(entry.handler.clone()),
                Scope::Scoped => scoped.push(entry.rescoped(Scope::Local)),
                Scope::Global => global.push(entry.rescoped(Scope::Global)),
            }
        }

        let isolated = local.len();
        let merged = scoped.len() + global.len();
        if !local.is_empty() {
            let step = Isolated::new(boxed(compose(local))).with_name(other.name.clone());
            let mut entry = MiddlewareEntry::new(boxed(step), EntryKind::Extend, Scope::Local);
            entry.plugin = key.clone();
            self.entries.push(entry);
        }
        self.entries.extend(scoped);
        self.entries.extend(global);

        tracing::debug!(
            plugin = key.as_deref().unwrap_or("<anonymous>"),
            isolated,
            merged,
            "extended composer"
        );
        self.invalidate();
        self
    }

    /// Configure a throwaway composer and, when `condition` is true, copy its
    /// entries, error handlers, error kinds and dedup keys into this one.
    pub fn when<F>(mut self, condition: bool, configure: F) -> Self
    where
        F: FnOnce(Composer) -> Composer,
    {
        let nested = configure(Composer::new());
        if !condition {
            return self;
        }

        let origin = self.dedup_key();
        for mut entry in nested.entries {
            if entry.plugin.is_none() {
                entry.plugin = origin.clone();
            }
            self.entries.push(entry);
        }
        for (kind, classifier) in nested.error_kinds {
            self.set_error_kind(kind, classifier);
        }
        self.error_handlers.extend(nested.error_handlers);
        self.dedup.extend(nested.dedup);
        self.invalidate();
        self
    }
}
