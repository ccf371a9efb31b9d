//! Custom registration methods.
//!
//! A method is registration sugar stored by name: it receives the composer and
//! an argument value and returns the composer with more registrations.
//! Methods travel with plugins through `extend`.

use super::Composer;
use kasane_core::RegistrationError;
use serde_json::Value;
use std::sync::Arc;

/// A custom registration method.
pub type Method = Arc<dyn Fn(Composer, Value) -> Composer + Send + Sync>;

/// Names of the built-in registration methods; custom methods may not reuse
/// them.
pub const RESERVED_METHODS: &[&str] = &[
    "step",
    "steps",
    "use",
    "derive",
    "derive_as",
    "decorate",
    "decorate_as",
    "guard",
    "guard_with",
    "branch",
    "branch_else",
    "route",
    "route_or",
    "fork",
    "tap",
    "lazy",
    "on_error",
    "error_kind",
    "error_class",
    "when",
    "group",
    "extend",
    "as_scope",
    "define_macro",
    "define_macros",
    "handle",
    "define_method",
    "call_method",
    "compose",
    "run",
    "run_with",
    "inspect",
    "trace",
    "untrace",
];

impl Composer {
    /// Register a custom method.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::MethodConflict`] if `name` is a built-in method.
    pub fn define_method<F>(mut self, name: impl Into<String>, method: F) -> Result<Self, RegistrationError>
    where
        F: Fn(Composer, Value) -> Composer + Send + Sync + 'static,
    {
        let name = name.into();
        if RESERVED_METHODS.contains(&name.as_str()) {
            return Err(RegistrationError::MethodConflict(name));
        }
        self.methods.insert(name, Arc::new(method));
        Ok(self)
    }

    /// Apply a custom method.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::UnknownMethod`] if no method named `name` exists.
    pub fn call_method(self, name: &str, args: impl Into<Value>) -> Result<Self, RegistrationError> {
        let method = self
            .methods
            .get(name)
            .cloned()
            .ok_or_else(|| RegistrationError::UnknownMethod(name.to_owned()))?;
        Ok(method(self, args.into()))
    }

    /// Whether a custom method named `name` exists.
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasane_core::Context;
    use serde_json::json;

    #[test]
    fn test_reserved_name_conflicts() {
        let err = Composer::new()
            .define_method("derive", |composer, _args| composer)
            .unwrap_err();
        assert_eq!(err, RegistrationError::MethodConflict("derive".into()));
    }

    #[test]
    fn test_unknown_method() {
        let err = Composer::new().call_method("missing", json!(null)).unwrap_err();
        assert_eq!(err, RegistrationError::UnknownMethod("missing".into()));
    }

    #[tokio::test]
    async fn test_method_registers_steps() {
        let mut app = Composer::new()
            .define_method("tag", |composer, args| {
                composer.decorate(json!({ "tag": args }))
            })
            .unwrap()
            .call_method("tag", "blue")
            .unwrap();

        let ctx = Context::new();
        app.run(ctx.clone()).await.unwrap();
        assert_eq!(ctx.get("tag"), Some(json!("blue")));
    }

    #[test]
    fn test_methods_travel_with_plugins() {
        let plugin = Composer::named("p")
            .define_method("tag", |composer, _args| composer)
            .unwrap();
        let app = Composer::new().extend(&plugin);
        assert!(app.has_method("tag"));
    }
}
