use hyper::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{EmissaryError, EmissaryResult};
use crate::message::Request;

/// Outcome of evaluating a condition or mechanism against a request.
///
/// The reason is diagnostic only and never drives control flow.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    pub reason: String,
}

impl MatchResult {
    pub fn success<S: Into<String>>(reason: S) -> Self {
        Self {
            matched: true,
            reason: reason.into(),
        }
    }

    pub fn failure<S: Into<String>>(reason: S) -> Self {
        Self {
            matched: false,
            reason: reason.into(),
        }
    }
}

/// String matching over optional exact / prefix / regex modes.
///
/// Modes are checked in that order and the first configured mode that
/// succeeds wins; unset modes are skipped. The absent actual value is
/// normalized to the empty string before comparison.
#[derive(Debug, Clone)]
pub struct StringMatcher {
    exact: Option<String>,
    prefix: Option<String>,
    regex: Option<Regex>,
}

impl StringMatcher {
    pub fn new(
        exact: Option<String>,
        prefix: Option<String>,
        regex_pattern: Option<&str>,
    ) -> EmissaryResult<Self> {
        if exact.is_none() && prefix.is_none() && regex_pattern.is_none() {
            return Err(EmissaryError::config(
                "string matcher needs at least one of exact/prefix/regex",
            ));
        }

        let regex = match regex_pattern {
            Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
                EmissaryError::config(format!("invalid regex '{}': {}", pattern, e))
            })?),
            None => None,
        };

        Ok(Self {
            exact,
            prefix,
            regex,
        })
    }

    pub fn exact<S: Into<String>>(value: S) -> Self {
        Self {
            exact: Some(value.into()),
            prefix: None,
            regex: None,
        }
    }

    pub fn prefix<S: Into<String>>(value: S) -> Self {
        Self {
            exact: None,
            prefix: Some(value.into()),
            regex: None,
        }
    }

    pub fn regex(pattern: &str) -> EmissaryResult<Self> {
        Self::new(None, None, Some(pattern))
    }

    pub fn matches(&self, actual: Option<&str>) -> MatchResult {
        let actual = actual.unwrap_or("");

        if let Some(expected) = &self.exact {
            if actual == expected {
                return MatchResult::success(format!("exact match '{}'", expected));
            }
        }

        if let Some(prefix) = &self.prefix {
            if actual.starts_with(prefix.as_str()) {
                return MatchResult::success(format!("prefix match '{}'", prefix));
            }
        }

        if let Some(regex) = &self.regex {
            if regex.is_match(actual) {
                return MatchResult::success(format!("regex match '{}'", regex.as_str()));
            }
        }

        MatchResult::failure(format!("'{}' matched no configured mode", actual))
    }
}

/// Serde shape shared by every condition that embeds a string matcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StringMatcherConfig {
    pub exact: Option<String>,
    pub prefix: Option<String>,
    pub regex: Option<String>,
}

impl StringMatcherConfig {
    pub fn build(&self) -> EmissaryResult<StringMatcher> {
        StringMatcher::new(self.exact.clone(), self.prefix.clone(), self.regex.as_deref())
    }
}

/// A boolean predicate over a request. Evaluation is pure and synchronous;
/// condition-local failures recover to a non-matching result instead of
/// escaping as errors.
pub trait Condition: Send + Sync {
    fn matches(&self, request: &Request) -> MatchResult;
}

/// Matches the first value of a request header
pub struct HeaderCondition {
    name: String,
    matcher: StringMatcher,
}

impl HeaderCondition {
    pub fn new<N: Into<String>>(name: N, matcher: StringMatcher) -> Self {
        Self {
            name: name.into(),
            matcher,
        }
    }
}

impl Condition for HeaderCondition {
    fn matches(&self, request: &Request) -> MatchResult {
        let result = self.matcher.matches(request.header(&self.name));
        MatchResult {
            matched: result.matched,
            reason: format!("header '{}': {}", self.name, result.reason),
        }
    }
}

/// Matches the first value of a query parameter (URI query or the request's
/// parameter multimap)
pub struct ParamCondition {
    name: String,
    matcher: StringMatcher,
}

impl ParamCondition {
    pub fn new<N: Into<String>>(name: N, matcher: StringMatcher) -> Self {
        Self {
            name: name.into(),
            matcher,
        }
    }
}

impl Condition for ParamCondition {
    fn matches(&self, request: &Request) -> MatchResult {
        let pairs = request.query_pairs();
        let actual = pairs
            .iter()
            .find(|(name, _)| name == &self.name)
            .map(|(_, value)| value.as_str());
        let result = self.matcher.matches(actual);
        MatchResult {
            matched: result.matched,
            reason: format!("param '{}': {}", self.name, result.reason),
        }
    }
}

/// Matches the URI path
pub struct PathCondition {
    matcher: StringMatcher,
}

impl PathCondition {
    pub fn new(matcher: StringMatcher) -> Self {
        Self { matcher }
    }
}

impl Condition for PathCondition {
    fn matches(&self, request: &Request) -> MatchResult {
        let result = self.matcher.matches(Some(request.uri().path()));
        MatchResult {
            matched: result.matched,
            reason: format!("path: {}", result.reason),
        }
    }
}

/// Matches the target host, from the URI or the Host header
pub struct HostCondition {
    matcher: StringMatcher,
}

impl HostCondition {
    pub fn new(matcher: StringMatcher) -> Self {
        Self { matcher }
    }
}

impl Condition for HostCondition {
    fn matches(&self, request: &Request) -> MatchResult {
        let host = request.host().or_else(|| request.header("host"));
        let result = self.matcher.matches(host);
        MatchResult {
            matched: result.matched,
            reason: format!("host: {}", result.reason),
        }
    }
}

/// Matches the request method against an allowed set
pub struct MethodCondition {
    methods: Vec<Method>,
}

impl MethodCondition {
    pub fn new(methods: Vec<Method>) -> EmissaryResult<Self> {
        if methods.is_empty() {
            return Err(EmissaryError::config(
                "method condition needs at least one method",
            ));
        }
        Ok(Self { methods })
    }
}

impl Condition for MethodCondition {
    fn matches(&self, request: &Request) -> MatchResult {
        if self.methods.contains(request.method()) {
            MatchResult::success(format!("method {} allowed", request.method()))
        } else {
            MatchResult::failure(format!("method {} not in allowed set", request.method()))
        }
    }
}

/// Combinator applied to a rule's ordered condition list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMechanism {
    /// At least one condition matches; an empty list matches nothing
    #[default]
    Any,
    /// Every condition matches; an empty list matches vacuously
    All,
    /// No condition matches; an empty list matches vacuously
    Not,
}

impl MatchMechanism {
    /// Evaluate the conditions in list order with short-circuiting
    pub fn evaluate(
        &self,
        conditions: &[std::sync::Arc<dyn Condition>],
        request: &Request,
    ) -> MatchResult {
        match self {
            MatchMechanism::Any => {
                for condition in conditions {
                    let result = condition.matches(request);
                    if result.matched {
                        return result;
                    }
                }
                MatchResult::failure("no condition matched")
            }
            MatchMechanism::All => {
                for condition in conditions {
                    let result = condition.matches(request);
                    if !result.matched {
                        return result;
                    }
                }
                MatchResult::success(format!("all {} conditions matched", conditions.len()))
            }
            MatchMechanism::Not => {
                for condition in conditions {
                    let result = condition.matches(request);
                    if result.matched {
                        return MatchResult::failure(format!(
                            "negated condition matched: {}",
                            result.reason
                        ));
                    }
                }
                MatchResult::success("no negated condition matched")
            }
        }
    }
}
