use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use hyper::Method;
use serde::Deserialize;

use super::action::{
    HeaderAction, MutationOp, ParamAction, RespondAction, RewriteAction, RuleAction,
};
use super::config::{ActionConfig, ConditionConfig};
use super::matcher::{
    Condition, HeaderCondition, HostCondition, MethodCondition, ParamCondition, PathCondition,
    StringMatcherConfig,
};
use crate::error::{EmissaryError, EmissaryResult};

type ConditionCtor =
    Box<dyn Fn(&serde_json::Value) -> EmissaryResult<Arc<dyn Condition>> + Send + Sync>;
type ActionCtor =
    Box<dyn Fn(&serde_json::Value) -> EmissaryResult<Arc<dyn RuleAction>> + Send + Sync>;

/// Explicit factory registry mapping condition/action type keys to
/// constructors. Hosts register custom kinds at startup; nothing is
/// discovered implicitly.
#[derive(Default)]
pub struct RuleRegistry {
    conditions: HashMap<String, ConditionCtor>,
    actions: HashMap<String, ActionCtor>,
}

impl RuleRegistry {
    /// Empty registry without the built-in kinds
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in condition and action kinds
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_condition("header", |params| {
            let params: NamedMatcherParams = from_params(params)?;
            Ok(Arc::new(HeaderCondition::new(
                params.name,
                params.matcher.build()?,
            )))
        });
        registry.register_condition("param", |params| {
            let params: NamedMatcherParams = from_params(params)?;
            Ok(Arc::new(ParamCondition::new(
                params.name,
                params.matcher.build()?,
            )))
        });
        registry.register_condition("path", |params| {
            let params: MatcherParams = from_params(params)?;
            Ok(Arc::new(PathCondition::new(params.matcher.build()?)))
        });
        registry.register_condition("host", |params| {
            let params: MatcherParams = from_params(params)?;
            Ok(Arc::new(HostCondition::new(params.matcher.build()?)))
        });
        registry.register_condition("method", |params| {
            let params: MethodParams = from_params(params)?;
            let methods = params
                .methods
                .iter()
                .map(|m| {
                    Method::from_str(&m.to_uppercase()).map_err(|e| {
                        EmissaryError::config(format!("invalid method '{}': {}", m, e))
                    })
                })
                .collect::<EmissaryResult<Vec<_>>>()?;
            Ok(Arc::new(MethodCondition::new(methods)?))
        });

        registry.register_action("add_header", |params| {
            let params: NamedValueParams = from_params(params)?;
            Ok(Arc::new(HeaderAction::new(
                MutationOp::Add,
                params.name,
                params.value,
            )?))
        });
        registry.register_action("set_header", |params| {
            let params: NamedValueParams = from_params(params)?;
            Ok(Arc::new(HeaderAction::new(
                MutationOp::Set,
                params.name,
                params.value,
            )?))
        });
        registry.register_action("remove_header", |params| {
            let params: NamedValueParams = from_params(params)?;
            Ok(Arc::new(HeaderAction::new(
                MutationOp::Remove,
                params.name,
                None,
            )?))
        });
        registry.register_action("add_param", |params| {
            let params: NamedValueParams = from_params(params)?;
            Ok(Arc::new(ParamAction::new(
                MutationOp::Add,
                params.name,
                params.value,
            )?))
        });
        registry.register_action("set_param", |params| {
            let params: NamedValueParams = from_params(params)?;
            Ok(Arc::new(ParamAction::new(
                MutationOp::Set,
                params.name,
                params.value,
            )?))
        });
        registry.register_action("remove_param", |params| {
            let params: NamedValueParams = from_params(params)?;
            Ok(Arc::new(ParamAction::new(
                MutationOp::Remove,
                params.name,
                None,
            )?))
        });
        registry.register_action("rewrite", |params| {
            let params: RewriteParams = from_params(params)?;
            Ok(Arc::new(RewriteAction::new(
                params.authority.as_deref(),
                params.path.as_deref(),
            )?))
        });
        registry.register_action("respond", |params| {
            let params: RespondParams = from_params(params)?;
            let headers: Vec<(String, String)> = params.headers.into_iter().collect();
            Ok(Arc::new(RespondAction::new(
                params.status,
                &headers,
                params.content_type.as_deref(),
                params.body.as_deref(),
            )?))
        });

        registry
    }

    /// Register a condition constructor under a type key
    pub fn register_condition<F>(&mut self, kind: &str, ctor: F)
    where
        F: Fn(&serde_json::Value) -> EmissaryResult<Arc<dyn Condition>> + Send + Sync + 'static,
    {
        self.conditions.insert(kind.to_string(), Box::new(ctor));
    }

    /// Register an action constructor under a type key
    pub fn register_action<F>(&mut self, kind: &str, ctor: F)
    where
        F: Fn(&serde_json::Value) -> EmissaryResult<Arc<dyn RuleAction>> + Send + Sync + 'static,
    {
        self.actions.insert(kind.to_string(), Box::new(ctor));
    }

    pub fn build_condition(&self, config: &ConditionConfig) -> EmissaryResult<Arc<dyn Condition>> {
        let ctor = self.conditions.get(&config.kind).ok_or_else(|| {
            EmissaryError::config(format!("unknown condition type '{}'", config.kind))
        })?;
        ctor(&config.params)
    }

    pub fn build_action(&self, config: &ActionConfig) -> EmissaryResult<Arc<dyn RuleAction>> {
        let ctor = self.actions.get(&config.kind).ok_or_else(|| {
            EmissaryError::config(format!("unknown action type '{}'", config.kind))
        })?;
        ctor(&config.params)
    }
}

fn from_params<T: for<'de> Deserialize<'de>>(params: &serde_json::Value) -> EmissaryResult<T> {
    serde_json::from_value(params.clone())
        .map_err(|e| EmissaryError::config(format!("invalid parameters: {}", e)))
}

#[derive(Deserialize)]
struct NamedMatcherParams {
    name: String,
    #[serde(flatten)]
    matcher: StringMatcherConfig,
}

#[derive(Deserialize)]
struct MatcherParams {
    #[serde(flatten)]
    matcher: StringMatcherConfig,
}

#[derive(Deserialize)]
struct MethodParams {
    methods: Vec<String>,
}

#[derive(Deserialize)]
struct NamedValueParams {
    name: String,
    value: Option<String>,
}

#[derive(Deserialize)]
struct RewriteParams {
    authority: Option<String>,
    path: Option<String>,
}

#[derive(Deserialize)]
struct RespondParams {
    status: u16,
    #[serde(default)]
    headers: std::collections::HashMap<String, String>,
    content_type: Option<String>,
    body: Option<String>,
}
