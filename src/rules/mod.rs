//! Dynamic traffic-redefinition rule engine.
//!
//! A rule couples a match mechanism over ordered conditions with an ordered
//! action pipeline. Rules live in immutable snapshots swapped wholesale on
//! reload; evaluation is synchronous and lock-free on the read path.

pub mod action;
pub mod config;
pub mod matcher;
pub mod registry;
pub mod source;

pub use action::{
    ActionCursor, HeaderAction, MutationOp, ParamAction, RespondAction, RewriteAction, RuleAction,
};
pub use config::{ActionConfig, ConditionConfig, RuleConfig, RuleFileConfig};
pub use matcher::{
    Condition, HeaderCondition, HostCondition, MatchMechanism, MatchResult, MethodCondition,
    ParamCondition, PathCondition, StringMatcher, StringMatcherConfig,
};
pub use registry::RuleRegistry;
pub use source::{FileRuleSource, RuleChangeCallback, RuleSource, StaticRuleSource};

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::chain::{Interceptor, Next};
use crate::error::{EmissaryError, EmissaryResult};
use crate::message::{AttributeKey, Request, Response};
use crate::metrics::RuleMetrics;

/// Name of the rule that matched a request, for diagnostics
pub const MATCHED_RULE: AttributeKey<String> = AttributeKey::new("emissary.matched_rule");

/// A named (mechanism, conditions, actions) tuple. Immutable once built.
pub struct Rule {
    name: String,
    mechanism: MatchMechanism,
    conditions: Vec<Arc<dyn Condition>>,
    actions: Vec<Arc<dyn RuleAction>>,
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        mechanism: MatchMechanism,
        conditions: Vec<Arc<dyn Condition>>,
        actions: Vec<Arc<dyn RuleAction>>,
    ) -> EmissaryResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EmissaryError::config("rule has empty name"));
        }
        Ok(Self {
            name,
            mechanism,
            conditions,
            actions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, request: &Request) -> MatchResult {
        self.mechanism.evaluate(&self.conditions, request)
    }
}

/// Ordered, immutable collection of rules. List order is priority.
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Build from already-constructed rules, enforcing name uniqueness
    pub fn new(rules: Vec<Rule>) -> EmissaryResult<Self> {
        let mut names = HashSet::new();
        for rule in &rules {
            if !names.insert(rule.name.clone()) {
                return Err(EmissaryError::config(format!(
                    "duplicate rule name: '{}'",
                    rule.name
                )));
            }
        }
        Ok(Self { rules })
    }

    /// Build a snapshot from rule configurations.
    ///
    /// A malformed rule is skipped with a logged error and does not affect
    /// the rest of the batch, so a bad entry in a reload never takes down
    /// the previously valid rules around it.
    pub fn from_configs(configs: &[RuleConfig], registry: &RuleRegistry) -> Self {
        let mut rules = Vec::new();
        let mut names: HashSet<String> = HashSet::new();

        for config in configs {
            if !config.enabled {
                debug!(rule = %config.name, "Skipping disabled rule");
                continue;
            }
            match Self::build_rule(config, registry) {
                Ok(rule) => {
                    if !names.insert(rule.name.clone()) {
                        error!(rule = %config.name, "Skipping rule with duplicate name");
                        continue;
                    }
                    rules.push(rule);
                }
                Err(e) => {
                    error!(rule = %config.name, error = %e, "Skipping malformed rule");
                }
            }
        }

        Self { rules }
    }

    fn build_rule(config: &RuleConfig, registry: &RuleRegistry) -> EmissaryResult<Rule> {
        config.validate()?;

        let conditions = config
            .conditions
            .iter()
            .map(|c| registry.build_condition(c))
            .collect::<EmissaryResult<Vec<_>>>()?;
        let actions = config
            .actions
            .iter()
            .map(|a| registry.build_action(a))
            .collect::<EmissaryResult<Vec<_>>>()?;

        Rule::new(config.name.clone(), config.mechanism, conditions, actions)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// First-match-wins selection in list order
    pub fn select(&self, request: &Request) -> Option<&Rule> {
        for rule in &self.rules {
            let result = rule.evaluate(request);
            if result.matched {
                debug!(rule = %rule.name, reason = %result.reason, "Rule matched");
                return Some(rule);
            }
        }
        None
    }
}

/// What the rule engine decided for one request
pub enum RuleOutcome {
    /// No rule terminated the request; continue down the chain with any
    /// mutations applied
    Continue,
    /// A rule's action pipeline produced a synthetic response
    ShortCircuit(Response),
}

/// Holds the current rule snapshot behind an atomically swappable pointer.
///
/// Readers load one snapshot and evaluate against it end to end; `install`
/// is a single atomic store, so in-flight evaluations are never torn
/// between an old and a new rule list.
pub struct RuleEngine {
    snapshot: ArcSwap<RuleSet>,
    metrics: RuleMetrics,
}

impl RuleEngine {
    pub fn new(initial: RuleSet) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(initial),
            metrics: RuleMetrics::new(),
        }
    }

    /// Atomically replace the snapshot. The previous snapshot is dropped
    /// once its last in-flight reader finishes.
    pub fn install(&self, snapshot: RuleSet) {
        info!(rules = snapshot.len(), "Installing rule snapshot");
        self.snapshot.store(Arc::new(snapshot));
        self.metrics.record_reload();
    }

    /// Current snapshot, for introspection
    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.snapshot.load_full()
    }

    pub fn metrics(&self) -> crate::metrics::RuleMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Evaluate the request against exactly one snapshot and run the
    /// selected rule's actions, if any
    pub fn apply(&self, request: &mut Request) -> EmissaryResult<RuleOutcome> {
        self.metrics.record_evaluation();
        let snapshot = self.snapshot.load_full();

        let Some(rule) = snapshot.select(request) else {
            return Ok(RuleOutcome::Continue);
        };

        self.metrics.record_match();
        request
            .attributes_mut()
            .set(MATCHED_RULE, rule.name().to_string());

        match action::run_pipeline(rule.name(), &rule.actions, request)? {
            Some(response) => {
                self.metrics.record_short_circuit();
                debug!(rule = %rule.name, "Rule terminated the request with a synthetic response");
                Ok(RuleOutcome::ShortCircuit(response))
            }
            None => Ok(RuleOutcome::Continue),
        }
    }
}

/// Splices rule evaluation into the invocation chain as its mandatory first
/// link: rule short-circuiting preempts all user interceptors.
pub struct RuleInterceptor {
    engine: Arc<RuleEngine>,
}

impl RuleInterceptor {
    pub fn new(engine: Arc<RuleEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Interceptor for RuleInterceptor {
    fn name(&self) -> &str {
        "rule-engine"
    }

    fn order(&self) -> i32 {
        i32::MIN
    }

    async fn handle(&self, mut request: Request, next: Next) -> EmissaryResult<Response> {
        match self.engine.apply(&mut request)? {
            RuleOutcome::ShortCircuit(response) => Ok(response),
            RuleOutcome::Continue => next.proceed(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(uri: &str) -> Request {
        Request::get(uri.parse().unwrap())
    }

    fn rule_config(name: &str, toml_text: &str) -> RuleConfig {
        let full = format!("[[rules]]\nname = \"{}\"\n{}", name, toml_text);
        let file: RuleFileConfig = toml::from_str(&full).unwrap();
        file.rules.into_iter().next().unwrap()
    }

    fn never_rule(name: &str) -> Rule {
        Rule::new(
            name,
            MatchMechanism::All,
            vec![Arc::new(PathCondition::new(StringMatcher::exact("/nope")))],
            vec![Arc::new(
                HeaderAction::new(MutationOp::Set, "x-rule", Some(name.to_string())).unwrap(),
            )],
        )
        .unwrap()
    }

    fn always_rule(name: &str) -> Rule {
        Rule::new(
            name,
            MatchMechanism::All,
            vec![Arc::new(PathCondition::new(StringMatcher::prefix("/")))],
            vec![Arc::new(
                HeaderAction::new(MutationOp::Set, "x-rule", Some(name.to_string())).unwrap(),
            )],
        )
        .unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let engine = RuleEngine::new(
            RuleSet::new(vec![never_rule("r1"), always_rule("r2")]).unwrap(),
        );

        let mut req = request("http://example.com/a");
        engine.apply(&mut req).unwrap();
        assert_eq!(req.header("x-rule"), Some("r2"));

        // With two matching rules, only the first listed one runs
        let engine = RuleEngine::new(
            RuleSet::new(vec![always_rule("r2"), always_rule("r1")]).unwrap(),
        );
        let mut req = request("http://example.com/a");
        engine.apply(&mut req).unwrap();
        assert_eq!(req.header("x-rule"), Some("r2"));
        assert_eq!(
            req.attributes().get(MATCHED_RULE).unwrap().as_str(),
            "r2"
        );
    }

    #[test]
    fn test_no_match_continues_untouched() {
        let engine = RuleEngine::new(RuleSet::new(vec![never_rule("r1")]).unwrap());
        let mut req = request("http://example.com/a");

        assert!(matches!(
            engine.apply(&mut req).unwrap(),
            RuleOutcome::Continue
        ));
        assert_eq!(req.header("x-rule"), None);
        assert!(req.attributes().get(MATCHED_RULE).is_none());
    }

    #[test]
    fn test_from_configs_skips_malformed_rules() {
        let registry = RuleRegistry::with_builtins();
        let configs = vec![
            rule_config(
                "good",
                r#"
                [[rules.conditions]]
                type = "path"
                prefix = "/"
                "#,
            ),
            rule_config(
                "bad-regex",
                r#"
                [[rules.conditions]]
                type = "path"
                regex = "(unclosed"
                "#,
            ),
            rule_config(
                "unknown-kind",
                r#"
                [[rules.conditions]]
                type = "geoip"
                country = "AQ"
                "#,
            ),
        ];

        let set = RuleSet::from_configs(&configs, &registry);
        assert_eq!(set.rule_names(), vec!["good"]);
    }

    #[test]
    fn test_from_configs_skips_duplicates_and_disabled() {
        let registry = RuleRegistry::with_builtins();
        let mut disabled = rule_config("off", "");
        disabled.enabled = false;
        let configs = vec![
            rule_config("dup", ""),
            rule_config("dup", ""),
            disabled,
        ];

        let set = RuleSet::from_configs(&configs, &registry);
        assert_eq!(set.rule_names(), vec!["dup"]);
    }

    #[test]
    fn test_ruleset_rejects_duplicate_names() {
        assert!(RuleSet::new(vec![always_rule("a"), always_rule("a")]).is_err());
    }

    #[test]
    fn test_install_swaps_wholesale() {
        let engine = RuleEngine::new(RuleSet::new(vec![always_rule("old")]).unwrap());

        // A reader holding the previous snapshot keeps seeing it in full
        let held = engine.snapshot();

        engine.install(RuleSet::new(vec![always_rule("new")]).unwrap());

        assert_eq!(held.rule_names(), vec!["old"]);
        assert_eq!(engine.snapshot().rule_names(), vec!["new"]);
    }

    #[test]
    fn test_short_circuit_via_respond_action() {
        let rule = Rule::new(
            "maintenance",
            MatchMechanism::All,
            vec![Arc::new(PathCondition::new(StringMatcher::prefix("/")))],
            vec![
                Arc::new(
                    HeaderAction::new(MutationOp::Set, "x-seen", Some("1".into())).unwrap(),
                ),
                Arc::new(RespondAction::new(503, &[], Some("text/plain"), Some("down")).unwrap()),
            ],
        )
        .unwrap();
        let engine = RuleEngine::new(RuleSet::new(vec![rule]).unwrap());

        let mut req = request("http://example.com/a");
        match engine.apply(&mut req).unwrap() {
            RuleOutcome::ShortCircuit(resp) => {
                assert_eq!(resp.status().as_u16(), 503);
            }
            RuleOutcome::Continue => panic!("expected short circuit"),
        }
        // Mutations before the terminating action stick
        assert_eq!(req.header("x-seen"), Some("1"));

        let metrics = engine.metrics();
        assert_eq!(metrics.matches, 1);
        assert_eq!(metrics.short_circuits, 1);
    }

    #[test]
    fn test_registry_configs_end_to_end() {
        let registry = RuleRegistry::with_builtins();
        let config = RuleConfig {
            name: "api".to_string(),
            mechanism: MatchMechanism::All,
            enabled: true,
            conditions: vec![ConditionConfig {
                kind: "host".to_string(),
                params: json!({"exact": "api.example.com"}),
            }],
            actions: vec![ActionConfig {
                kind: "rewrite".to_string(),
                params: json!({"authority": "internal.example.com:8080"}),
            }],
        };

        let engine = RuleEngine::new(RuleSet::from_configs(&[config], &registry));
        let mut req = request("http://api.example.com/v1?x=1");
        engine.apply(&mut req).unwrap();

        assert_eq!(
            req.uri().authority().unwrap().as_str(),
            "internal.example.com:8080"
        );
        assert_eq!(req.uri().query(), Some("x=1"));
    }
}
