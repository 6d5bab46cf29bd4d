use crate::{types::Diagnostic, Error};
use http::{Method, Request};
use hyper::Body;
use std::borrow::Cow;

const USER_AGENT: &str = concat!("shim_runtime/", env!("CARGO_PKG_VERSION"));
const ERROR_TYPE_HEADER: &str = "lambda-runtime-function-error-type";

pub(crate) trait IntoRequest {
    fn into_req(self) -> Result<Request<Body>, Error>;
}

// /runtime/invocation/next
#[derive(Debug, Eq, PartialEq)]
pub(crate) struct NextEventRequest;

impl IntoRequest for NextEventRequest {
    fn into_req(self) -> Result<Request<Body>, Error> {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/2018-06-01/runtime/invocation/next")
            .header("user-agent", USER_AGENT)
            .body(Body::empty())?;
        Ok(req)
    }
}

// /runtime/invocation/{AwsRequestId}/response
pub(crate) struct EventCompletionRequest<'a> {
    pub(crate) request_id: &'a str,
    pub(crate) body: Vec<u8>,
}

impl<'a> IntoRequest for EventCompletionRequest<'a> {
    fn into_req(self) -> Result<Request<Body>, Error> {
        let uri = format!(
            "/2018-06-01/runtime/invocation/{}/response",
            path_segment(self.request_id)
        );
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .header("user-agent", USER_AGENT)
            .body(Body::from(self.body))?;
        Ok(req)
    }
}

// /runtime/invocation/{AwsRequestId}/error
pub(crate) struct EventErrorRequest<'a> {
    pub(crate) request_id: &'a str,
    pub(crate) diagnostic: Diagnostic,
}

impl<'a> IntoRequest for EventErrorRequest<'a> {
    fn into_req(self) -> Result<Request<Body>, Error> {
        let uri = format!("/2018-06-01/runtime/invocation/{}/error", path_segment(self.request_id));
        error_request(uri, self.diagnostic)
    }
}

// /runtime/init/error
pub(crate) struct InitErrorRequest {
    pub(crate) diagnostic: Diagnostic,
}

impl IntoRequest for InitErrorRequest {
    fn into_req(self) -> Result<Request<Body>, Error> {
        error_request("/2018-06-01/runtime/init/error".to_owned(), self.diagnostic)
    }
}

/// Request ids are opaque to the runtime; bytes outside the unreserved set are
/// percent-encoded so any id the platform hands out can be posted back.
fn path_segment(request_id: &str) -> Cow<'_, str> {
    fn unreserved(b: u8) -> bool {
        b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
    }

    if request_id.bytes().all(unreserved) {
        return Cow::Borrowed(request_id);
    }
    let mut encoded = String::with_capacity(request_id.len() * 3);
    for b in request_id.bytes() {
        if unreserved(b) {
            encoded.push(char::from(b));
        } else {
            encoded.push_str(&format!("%{:02X}", b));
        }
    }
    Cow::Owned(encoded)
}

fn error_request(uri: String, diagnostic: Diagnostic) -> Result<Request<Body>, Error> {
    let body = serde_json::to_vec(&diagnostic)?;
    let req = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header("user-agent", USER_AGENT)
        .header(ERROR_TYPE_HEADER, "Unhandled")
        .body(Body::from(body))?;
    Ok(req)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostic() -> Diagnostic {
        Diagnostic {
            error_type: "InvalidEventDataError".into(),
            error_message: "Error parsing event data".into(),
        }
    }

    async fn body_text(req: Request<Body>) -> String {
        let bytes = hyper::body::to_bytes(req.into_body()).await.expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf-8 body")
    }

    #[test]
    fn next_event_request() {
        let req = NextEventRequest.into_req().expect("request");
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.uri(), "/2018-06-01/runtime/invocation/next");
        assert!(req
            .headers()
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map_or(false, |v| v.starts_with("shim_runtime/")));
    }

    #[tokio::test]
    async fn event_completion_request() {
        let req = EventCompletionRequest {
            request_id: "id",
            body: b"{\"ok\":true}".to_vec(),
        }
        .into_req()
        .expect("request");
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri(), "/2018-06-01/runtime/invocation/id/response");
        assert_eq!(body_text(req).await, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn event_error_request() {
        let req = EventErrorRequest {
            request_id: "id",
            diagnostic: diagnostic(),
        }
        .into_req()
        .expect("request");
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri(), "/2018-06-01/runtime/invocation/id/error");
        assert_eq!(
            req.headers().get(ERROR_TYPE_HEADER).and_then(|v| v.to_str().ok()),
            Some("Unhandled")
        );
        assert_eq!(
            body_text(req).await,
            r#"{"errorType":"InvalidEventDataError","errorMessage":"Error parsing event data"}"#
        );
    }

    #[test]
    fn request_ids_are_escaped_in_the_path() {
        let req = EventCompletionRequest {
            request_id: "8f1c 0a/b?c",
            body: Vec::new(),
        }
        .into_req()
        .expect("request");
        assert_eq!(req.uri(), "/2018-06-01/runtime/invocation/8f1c%200a%2Fb%3Fc/response");

        let req = EventErrorRequest {
            request_id: "52fdfc07-2182-154f-163f-5f0f9a621d72",
            diagnostic: diagnostic(),
        }
        .into_req()
        .expect("request");
        assert_eq!(
            req.uri(),
            "/2018-06-01/runtime/invocation/52fdfc07-2182-154f-163f-5f0f9a621d72/error"
        );
    }

    #[test]
    fn init_error_request() {
        let req = InitErrorRequest {
            diagnostic: diagnostic(),
        }
        .into_req()
        .expect("request");
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri(), "/2018-06-01/runtime/init/error");
    }
}
