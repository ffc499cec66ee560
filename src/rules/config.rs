use serde::{Deserialize, Serialize};

use super::matcher::MatchMechanism;
use crate::error::{EmissaryError, EmissaryResult};

/// Top-level shape of a TOML rule file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuleFileConfig {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl RuleFileConfig {
    /// Validate the batch as a whole; individual rule problems are reported
    /// per rule so a reload can skip just the malformed entries
    pub fn validate(&self) -> EmissaryResult<()> {
        let mut names = std::collections::HashSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !names.insert(&rule.name) {
                return Err(EmissaryError::config(format!(
                    "duplicate rule name: '{}'",
                    rule.name
                )));
            }
        }
        Ok(())
    }
}

/// Declarative form of one traffic-redefinition rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Rule name, unique within a snapshot
    pub name: String,
    /// Combinator over the condition list
    #[serde(default)]
    pub mechanism: MatchMechanism,
    /// Whether the rule participates in matching
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Conditions evaluated in list order
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
    /// Actions executed in list order on match
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

impl RuleConfig {
    pub fn validate(&self) -> EmissaryResult<()> {
        if self.name.trim().is_empty() {
            return Err(EmissaryError::config("rule has empty name"));
        }
        for condition in &self.conditions {
            if condition.kind.trim().is_empty() {
                return Err(EmissaryError::config(format!(
                    "rule '{}' has a condition without a type",
                    self.name
                )));
            }
        }
        for action in &self.actions {
            if action.kind.trim().is_empty() {
                return Err(EmissaryError::config(format!(
                    "rule '{}' has an action without a type",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}

/// A condition entry: a registered type key plus its parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: serde_json::Value,
}

/// An action entry: a registered type key plus its parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: serde_json::Value,
}
