use crate::Error;
use http::{uri::Scheme, Request, Response, Uri};
use hyper::{client::HttpConnector, Body};
use tracing::trace;

/// HTTP client for the platform's Runtime API.
#[derive(Debug, Clone)]
pub(crate) struct Client {
    base: Uri,
    client: hyper::Client<HttpConnector>,
}

impl Client {
    pub(crate) fn new(base: Uri) -> Self {
        Client {
            base,
            client: hyper::Client::builder().build_http(),
        }
    }

    /// Parses the `host:port` form the platform advertises in `AWS_LAMBDA_RUNTIME_API`.
    pub(crate) fn endpoint_uri(endpoint: &str) -> Result<Uri, Error> {
        let uri = if endpoint.contains("://") {
            endpoint.parse::<Uri>()?
        } else {
            format!("http://{}", endpoint).parse::<Uri>()?
        };
        if uri.authority().is_none() {
            return Err(format!("runtime endpoint {:?} has no host", endpoint).into());
        }
        Ok(uri)
    }

    fn set_origin(&self, req: Request<Body>) -> Result<Request<Body>, Error> {
        let (mut parts, body) = req.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| "/".to_owned());
        let scheme = self.base.scheme().cloned().unwrap_or(Scheme::HTTP);
        let authority = self
            .base
            .authority()
            .cloned()
            .ok_or("runtime endpoint has no host")?;
        parts.uri = Uri::builder()
            .scheme(scheme)
            .authority(authority)
            .path_and_query(path_and_query.as_str())
            .build()?;
        Ok(Request::from_parts(parts, body))
    }

    pub(crate) async fn call(&self, req: Request<Body>) -> Result<Response<Body>, Error> {
        let req = self.set_origin(req)?;
        trace!(method = %req.method(), uri = %req.uri(), "calling runtime api");
        let res = self.client.request(req).await?;
        Ok(res)
    }
}

pub(crate) fn describe<T>(res: &Response<T>) -> String {
    let status = res.status();
    format!("{} {}", status.as_str(), status.canonical_reason().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_without_scheme_defaults_to_http() {
        let uri = Client::endpoint_uri("127.0.0.1:9001").expect("uri");
        assert_eq!(uri.scheme_str(), Some("http"));
        assert_eq!(uri.authority().map(|a| a.as_str()), Some("127.0.0.1:9001"));
    }

    #[test]
    fn endpoint_with_scheme_is_kept() {
        let uri = Client::endpoint_uri("http://localhost:8080").expect("uri");
        assert_eq!(uri.host(), Some("localhost"));
        assert_eq!(uri.port_u16(), Some(8080));
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        assert!(Client::endpoint_uri("").is_err());
    }

    #[test]
    fn origin_is_applied_to_relative_requests() {
        let client = Client::new(Client::endpoint_uri("127.0.0.1:9001").expect("uri"));
        let req = Request::builder()
            .uri("/2018-06-01/runtime/invocation/next")
            .body(Body::empty())
            .expect("request");
        let req = client.set_origin(req).expect("origin");
        assert_eq!(req.uri(), "http://127.0.0.1:9001/2018-06-01/runtime/invocation/next");
    }

    #[test]
    fn describe_status() {
        let res = Response::builder().status(202).body(()).expect("response");
        assert_eq!(describe(&res), "202 Accepted");
    }
}
