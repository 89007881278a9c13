//! The capability registry and dispatcher.

use crate::{Capability, Declaration, Directives, Outcome};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// The result of dispatching one call.
///
/// Dispatch never fails: an unknown name and a failing invocable both come
/// back as structured values so they can be fed into the transcript for the
/// model to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Completed { name: String, outcome: Outcome },
    NotFound { name: String },
    Failed { name: String, message: String },
}

impl Dispatch {
    pub fn name(&self) -> &str {
        match self {
            Self::Completed { name, .. } | Self::NotFound { name } | Self::Failed { name, .. } => {
                name
            }
        }
    }

    /// Normalize into the function-response value appended to the
    /// transcript, plus any directives for the loop. Error dispatches force
    /// a continuation so the model gets a chance to correct itself.
    pub fn into_reply(self) -> (String, Value, Directives) {
        match self {
            Self::Completed { name, outcome } => (name, outcome.payload, outcome.directives),
            Self::NotFound { name } => {
                let value = json!({
                    "status": "not_found",
                    "name": name,
                    "message": format!("no capability named `{name}` is registered"),
                });
                (
                    name,
                    value,
                    Directives {
                        force_continue: true,
                        ..Directives::default()
                    },
                )
            }
            Self::Failed { name, message } => {
                let value = json!({
                    "status": "error",
                    "name": name,
                    "message": message,
                });
                (
                    name,
                    value,
                    Directives {
                        force_continue: true,
                        ..Directives::default()
                    },
                )
            }
        }
    }
}

/// Holds every registered capability and dispatches calls by name.
///
/// Construct one explicitly and pass it by reference into the loop;
/// isolated instances keep concurrent sessions and tests independent.
#[derive(Default)]
pub struct Registry {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability. A later registration under the same name
    /// replaces the earlier one, which is how agent-specific units override
    /// the base set.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        if self.capabilities.insert(name.clone(), capability).is_some() {
            debug!(capability = %name, "overriding previously registered capability");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Declarations for every registered capability, the tool surface
    /// exposed to the model.
    pub fn declarations(&self) -> Vec<Declaration> {
        self.capabilities.values().map(|c| c.declaration()).collect()
    }

    /// Execute a capability by name.
    ///
    /// The invocable runs on its own task so that even a panic is contained
    /// and reported as a structured failure rather than tearing down the
    /// loop.
    pub async fn execute(&self, name: &str, args: Map<String, Value>) -> Dispatch {
        let Some(capability) = self.capabilities.get(name) else {
            warn!(capability = %name, "dispatch of unregistered capability");
            return Dispatch::NotFound {
                name: name.to_string(),
            };
        };

        let capability = Arc::clone(capability);
        let handle = tokio::spawn(async move { capability.invoke(args).await });

        match handle.await {
            Ok(Ok(outcome)) => Dispatch::Completed {
                name: name.to_string(),
                outcome,
            },
            Ok(Err(e)) => {
                warn!(capability = %name, error = %e, "capability failed");
                Dispatch::Failed {
                    name: name.to_string(),
                    message: e.to_string(),
                }
            }
            Err(e) => {
                warn!(capability = %name, "capability panicked");
                Dispatch::Failed {
                    name: name.to_string(),
                    message: format!("capability aborted: {e}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CapabilityError, ParamKind, ParamSpec};
    use async_trait::async_trait;

    struct Add {
        params: Vec<ParamSpec>,
    }

    impl Add {
        fn new() -> Self {
            Self {
                params: vec![
                    ParamSpec::required("a", ParamKind::Integer),
                    ParamSpec::required("b", ParamKind::Integer),
                ],
            }
        }
    }

    #[async_trait]
    impl Capability for Add {
        fn name(&self) -> &str {
            "add"
        }

        fn description(&self) -> &str {
            "Add two integers."
        }

        fn parameters(&self) -> &[ParamSpec] {
            &self.params
        }

        async fn invoke(&self, args: Map<String, Value>) -> Result<Outcome, CapabilityError> {
            let a = crate::int_arg(&args, "a")?;
            let b = crate::int_arg(&args, "b")?;
            Ok(Outcome::json(json!(a + b)))
        }
    }

    struct Boom;

    #[async_trait]
    impl Capability for Boom {
        fn name(&self) -> &str {
            "boom"
        }

        fn description(&self) -> &str {
            "Always fails."
        }

        fn parameters(&self) -> &[ParamSpec] {
            &[]
        }

        async fn invoke(&self, _args: Map<String, Value>) -> Result<Outcome, CapabilityError> {
            Err(CapabilityError::Execution("it broke".into()))
        }
    }

    fn int_args(pairs: &[(&str, i64)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[tokio::test]
    async fn execute_dispatches_by_name() {
        let mut registry = Registry::new();
        registry.register(Arc::new(Add::new()));

        let dispatch = registry.execute("add", int_args(&[("a", 2), ("b", 3)])).await;
        match dispatch {
            Dispatch::Completed { outcome, .. } => assert_eq!(outcome.payload, json!(5)),
            other => panic!("unexpected dispatch: {other:?}"),
        }
    }

    #[test]
    fn declaration_derived_from_parameter_list() {
        let declaration = Add::new().declaration();
        assert_eq!(declaration.name, "add");
        assert_eq!(declaration.parameters.len(), 2);
        for (spec, name) in declaration.parameters.iter().zip(["a", "b"]) {
            assert_eq!(spec.name, name);
            assert_eq!(spec.kind, ParamKind::Integer);
            assert!(spec.required);
        }
    }

    #[tokio::test]
    async fn unknown_name_is_structured_not_found() {
        let registry = Registry::new();
        let dispatch = registry.execute("nope", Map::new()).await;
        assert_eq!(
            dispatch,
            Dispatch::NotFound {
                name: "nope".into()
            }
        );

        let (name, value, directives) = dispatch.into_reply();
        assert_eq!(name, "nope");
        assert_eq!(value["status"], "not_found");
        assert!(directives.force_continue);
    }

    #[tokio::test]
    async fn failure_becomes_structured_error_result() {
        let mut registry = Registry::new();
        registry.register(Arc::new(Boom));

        let (name, value, _) = registry.execute("boom", Map::new()).await.into_reply();
        assert_eq!(name, "boom");
        assert_eq!(value["name"], "boom");
        assert_eq!(value["message"], "execution failed: it broke");
    }

    #[tokio::test]
    async fn later_registration_overrides_earlier() {
        struct Override;

        #[async_trait]
        impl Capability for Override {
            fn name(&self) -> &str {
                "add"
            }

            fn description(&self) -> &str {
                "Replacement."
            }

            fn parameters(&self) -> &[ParamSpec] {
                &[]
            }

            async fn invoke(&self, _args: Map<String, Value>) -> Result<Outcome, CapabilityError> {
                Ok(Outcome::text("overridden"))
            }
        }

        let mut registry = Registry::new();
        registry.register(Arc::new(Add::new()));
        registry.register(Arc::new(Override));
        assert_eq!(registry.len(), 1);

        let (_, value, _) = registry.execute("add", Map::new()).await.into_reply();
        assert_eq!(value, json!("overridden"));
    }
}
