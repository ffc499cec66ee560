//! Redirect derivation: building the follow-up request for a 3xx response.

use hyper::{Method, Uri};

use crate::error::{EmissaryError, EmissaryResult};
use crate::message::{Body, Request, Response};

/// Derive the next request for a redirect response, or `None` when the
/// response carries no usable Location.
///
/// Method and body follow standard redirect semantics: 303 turns everything
/// but HEAD into a bodyless GET, 301/302 downgrade POST to GET, 307/308
/// preserve the method and body.
pub fn derive_redirect(request: &Request, response: &Response) -> EmissaryResult<Option<Request>> {
    let Some(location) = response.location() else {
        return Ok(None);
    };

    let target = resolve_location(request.uri(), location)?;

    let mut next = request.clone();
    next.set_uri(target);

    match response.status().as_u16() {
        303 => {
            if next.method() != Method::HEAD {
                next.set_method(Method::GET);
            }
            drop_body(&mut next);
        }
        301 | 302 => {
            if next.method() == Method::POST {
                next.set_method(Method::GET);
                drop_body(&mut next);
            }
        }
        // 307/308 and the rest preserve method and body
        _ => {}
    }

    Ok(Some(next))
}

fn drop_body(request: &mut Request) {
    request.set_body(Body::Empty);
    request.remove_header("content-length");
    request.remove_header("content-type");
    request.remove_header("transfer-encoding");
    request.set_expect_continue(false);
}

/// Resolve a Location header against the current request URI; handles
/// absolute, scheme-relative, rooted, and relative-path forms
fn resolve_location(base: &Uri, location: &str) -> EmissaryResult<Uri> {
    let base_url = url::Url::parse(&base.to_string()).map_err(|e| {
        EmissaryError::internal(format!("request URI is not a resolvable base: {}", e))
    })?;
    let target = base_url.join(location).map_err(|e| {
        EmissaryError::transport(format!("unresolvable Location '{}': {}", location, e))
    })?;
    target
        .as_str()
        .parse()
        .map_err(|e| EmissaryError::transport(format!("invalid Location '{}': {}", location, e)))
}
