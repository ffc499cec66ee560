use std::str::FromStr;
use std::sync::Arc;

use hyper::http::uri::Authority;
use hyper::Uri;
use serde::{Deserialize, Serialize};

use crate::error::{EmissaryError, EmissaryResult};
use crate::message::{Request, Response};

/// One step of a matched rule's action pipeline.
///
/// An action either mutates the request and calls `next.proceed(request)` to
/// continue, or returns a synthetic response without proceeding, which
/// terminates the pipeline and short-circuits the invocation chain. An error
/// aborts the whole request; it does not fall back to "rule didn't match".
pub trait RuleAction: Send + Sync {
    fn name(&self) -> &str;

    fn execute(
        &self,
        request: &mut Request,
        next: &mut ActionCursor<'_>,
    ) -> EmissaryResult<Option<Response>>;
}

/// Cursor over the remaining actions of a pipeline.
///
/// Each invocation gets its own cursor; calling `proceed` a second time on
/// the same cursor is a contract violation and fails loudly instead of
/// double-executing downstream actions.
pub struct ActionCursor<'a> {
    rule: &'a str,
    actions: &'a [Arc<dyn RuleAction>],
    index: usize,
    proceeded: bool,
}

impl<'a> ActionCursor<'a> {
    /// Continue with the remaining actions. Returns `Ok(None)` once the last
    /// action has proceeded, handing control back to the invocation chain.
    pub fn proceed(&mut self, request: &mut Request) -> EmissaryResult<Option<Response>> {
        if self.proceeded {
            return Err(EmissaryError::rule(
                self.rule,
                "action called next() more than once",
            ));
        }
        self.proceeded = true;

        match self.actions.get(self.index) {
            None => Ok(None),
            Some(action) => {
                let mut next = ActionCursor {
                    rule: self.rule,
                    actions: self.actions,
                    index: self.index + 1,
                    proceeded: false,
                };
                action.execute(request, &mut next)
            }
        }
    }
}

/// Run a rule's actions in list order against the request
pub fn run_pipeline(
    rule: &str,
    actions: &[Arc<dyn RuleAction>],
    request: &mut Request,
) -> EmissaryResult<Option<Response>> {
    let mut head = ActionCursor {
        rule,
        actions,
        index: 0,
        proceeded: false,
    };
    head.proceed(request)
}

/// Mutation flavor shared by header and parameter actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    Add,
    Set,
    Remove,
}

/// Adds, sets, or removes a request header
pub struct HeaderAction {
    op: MutationOp,
    name: String,
    value: Option<String>,
}

impl HeaderAction {
    pub fn new<N: Into<String>>(
        op: MutationOp,
        name: N,
        value: Option<String>,
    ) -> EmissaryResult<Self> {
        let name = name.into();
        if matches!(op, MutationOp::Add | MutationOp::Set) && value.is_none() {
            return Err(EmissaryError::config(format!(
                "header action '{:?}' on '{}' needs a value",
                op, name
            )));
        }
        Ok(Self { op, name, value })
    }
}

impl RuleAction for HeaderAction {
    fn name(&self) -> &str {
        "header"
    }

    fn execute(
        &self,
        request: &mut Request,
        next: &mut ActionCursor<'_>,
    ) -> EmissaryResult<Option<Response>> {
        match self.op {
            MutationOp::Add => {
                request.add_header(&self.name, self.value.as_deref().unwrap_or(""))?
            }
            MutationOp::Set => {
                request.set_header(&self.name, self.value.as_deref().unwrap_or(""))?
            }
            MutationOp::Remove => {
                request.remove_header(&self.name);
            }
        }
        next.proceed(request)
    }
}

/// Adds, sets, or removes a query parameter
pub struct ParamAction {
    op: MutationOp,
    name: String,
    value: Option<String>,
}

impl ParamAction {
    pub fn new<N: Into<String>>(
        op: MutationOp,
        name: N,
        value: Option<String>,
    ) -> EmissaryResult<Self> {
        let name = name.into();
        if matches!(op, MutationOp::Add | MutationOp::Set) && value.is_none() {
            return Err(EmissaryError::config(format!(
                "param action '{:?}' on '{}' needs a value",
                op, name
            )));
        }
        Ok(Self { op, name, value })
    }
}

impl RuleAction for ParamAction {
    fn name(&self) -> &str {
        "param"
    }

    fn execute(
        &self,
        request: &mut Request,
        next: &mut ActionCursor<'_>,
    ) -> EmissaryResult<Option<Response>> {
        match self.op {
            MutationOp::Add => {
                request.add_param(self.name.clone(), self.value.clone().unwrap_or_default())
            }
            MutationOp::Set => {
                request.set_param(self.name.clone(), self.value.clone().unwrap_or_default())
            }
            MutationOp::Remove => {
                request.remove_param(&self.name);
            }
        }
        next.proceed(request)
    }
}

/// Rewrites the request authority and/or path, preserving the query string
/// unless the caller changes it elsewhere
pub struct RewriteAction {
    authority: Option<Authority>,
    path: Option<String>,
}

impl RewriteAction {
    pub fn new(authority: Option<&str>, path: Option<&str>) -> EmissaryResult<Self> {
        if authority.is_none() && path.is_none() {
            return Err(EmissaryError::config(
                "rewrite action needs an authority or a path",
            ));
        }

        let authority = match authority {
            Some(raw) => Some(Authority::from_str(raw).map_err(|e| {
                EmissaryError::config(format!("invalid rewrite authority '{}': {}", raw, e))
            })?),
            None => None,
        };

        let path = match path {
            Some(raw) if raw.starts_with('/') => Some(raw.to_string()),
            Some(raw) => {
                return Err(EmissaryError::config(format!(
                    "rewrite path '{}' must start with '/'",
                    raw
                )))
            }
            None => None,
        };

        Ok(Self { authority, path })
    }
}

impl RuleAction for RewriteAction {
    fn name(&self) -> &str {
        "rewrite"
    }

    fn execute(
        &self,
        request: &mut Request,
        next: &mut ActionCursor<'_>,
    ) -> EmissaryResult<Option<Response>> {
        let uri = request.uri();
        let mut parts = uri.clone().into_parts();

        if let Some(authority) = &self.authority {
            parts.authority = Some(authority.clone());
        }

        if let Some(path) = &self.path {
            let replaced = match uri.query() {
                Some(query) => format!("{}?{}", path, query),
                None => path.clone(),
            };
            parts.path_and_query = Some(replaced.parse().map_err(|e| {
                EmissaryError::rule("rewrite", format!("invalid rewritten path: {}", e))
            })?);
        }

        let rewritten = Uri::from_parts(parts)
            .map_err(|e| EmissaryError::rule("rewrite", format!("invalid rewritten URI: {}", e)))?;
        request.set_uri(rewritten);
        next.proceed(request)
    }
}

/// Terminates the pipeline with a synthetic response; never calls next.
/// The response template is validated at construction time.
pub struct RespondAction {
    template: Response,
}

impl RespondAction {
    pub fn new(
        status: u16,
        headers: &[(String, String)],
        content_type: Option<&str>,
        body: Option<&str>,
    ) -> EmissaryResult<Self> {
        let mut builder = Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        if let Some(body) = body {
            builder = builder.body(body.to_string());
        }
        Ok(Self {
            template: builder.build()?,
        })
    }
}

impl RuleAction for RespondAction {
    fn name(&self) -> &str {
        "respond"
    }

    fn execute(
        &self,
        _request: &mut Request,
        _next: &mut ActionCursor<'_>,
    ) -> EmissaryResult<Option<Response>> {
        Ok(Some(self.template.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::StatusCode;

    fn request(uri: &str) -> Request {
        Request::get(uri.parse().unwrap())
    }

    fn actions(list: Vec<Box<dyn RuleAction>>) -> Vec<Arc<dyn RuleAction>> {
        list.into_iter().map(Arc::from).collect()
    }

    #[test]
    fn test_pipeline_applies_in_order() {
        let acts = actions(vec![
            Box::new(HeaderAction::new(MutationOp::Set, "x-a", Some("1".into())).unwrap()),
            Box::new(HeaderAction::new(MutationOp::Set, "x-b", Some("2".into())).unwrap()),
        ]);

        let mut req = request("http://example.com/");
        let outcome = run_pipeline("r", &acts, &mut req).unwrap();

        assert!(outcome.is_none());
        assert_eq!(req.header("x-a"), Some("1"));
        assert_eq!(req.header("x-b"), Some("2"));
    }

    #[test]
    fn test_pipeline_short_circuit_preserves_earlier_mutations() {
        let acts = actions(vec![
            Box::new(HeaderAction::new(MutationOp::Set, "x-first", Some("1".into())).unwrap()),
            Box::new(RespondAction::new(404, &[], None, Some("gone")).unwrap()),
            Box::new(HeaderAction::new(MutationOp::Set, "x-never", Some("2".into())).unwrap()),
        ]);

        let mut req = request("http://example.com/");
        let outcome = run_pipeline("r", &acts, &mut req).unwrap();

        let resp = outcome.expect("pipeline should short-circuit");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(req.header("x-first"), Some("1"));
        assert_eq!(req.header("x-never"), None);
    }

    #[test]
    fn test_double_proceed_fails_loudly() {
        struct DoubleNext;

        impl RuleAction for DoubleNext {
            fn name(&self) -> &str {
                "double-next"
            }

            fn execute(
                &self,
                request: &mut Request,
                next: &mut ActionCursor<'_>,
            ) -> EmissaryResult<Option<Response>> {
                next.proceed(request)?;
                next.proceed(request)
            }
        }

        let acts = actions(vec![Box::new(DoubleNext)]);
        let mut req = request("http://example.com/");
        let err = run_pipeline("r", &acts, &mut req).unwrap_err();
        assert!(matches!(err, EmissaryError::Rule { .. }));
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_rewrite_preserves_query() {
        let action = RewriteAction::new(Some("internal:8080"), Some("/v2/users")).unwrap();
        let acts = actions(vec![Box::new(action)]);

        let mut req = request("http://example.com/v1/users?page=3");
        run_pipeline("r", &acts, &mut req).unwrap();

        assert_eq!(req.uri().authority().unwrap().as_str(), "internal:8080");
        assert_eq!(req.uri().path(), "/v2/users");
        assert_eq!(req.uri().query(), Some("page=3"));
        assert_eq!(req.uri().scheme_str(), Some("http"));
    }

    #[test]
    fn test_rewrite_requires_a_target() {
        assert!(RewriteAction::new(None, None).is_err());
        assert!(RewriteAction::new(None, Some("no-slash")).is_err());
        assert!(RewriteAction::new(Some("host:80"), None).is_ok());
    }

    #[test]
    fn test_mutating_actions_validate_value() {
        assert!(HeaderAction::new(MutationOp::Set, "x", None).is_err());
        assert!(HeaderAction::new(MutationOp::Remove, "x", None).is_ok());
        assert!(ParamAction::new(MutationOp::Add, "p", None).is_err());
    }

    #[test]
    fn test_param_actions() {
        let acts = actions(vec![
            Box::new(ParamAction::new(MutationOp::Add, "a", Some("1".into())).unwrap()),
            Box::new(ParamAction::new(MutationOp::Set, "a", Some("2".into())).unwrap()),
            Box::new(ParamAction::new(MutationOp::Remove, "b", None).unwrap()),
        ]);

        let mut req = request("http://example.com/?b=9");
        run_pipeline("r", &acts, &mut req).unwrap();

        assert_eq!(req.params(), &[("a".to_string(), "2".to_string())]);
        // URI query is untouched until materialization; remove only affects
        // the multimap layer
        assert_eq!(req.uri().query(), Some("b=9"));
    }
}
