use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// HTTP status the public nodes answer with while overloaded. The only
/// condition that triggers failover to the next endpoint.
const SERVER_BUSY: u16 = 502;

#[derive(Debug, Error)]
#[error("request to {url} failed: {reason}")]
pub struct TransportError {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no endpoint returned a usable response for {method}")]
    NoResponse { method: String },
    #[error("empty result for {method}")]
    EmptyResult { method: String },
    #[error("malformed response from {url}")]
    MalformedResponse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode request for {method}")]
    Encode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u32,
}

impl<'a> RpcRequest<'a> {
    fn new(method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Vec<Value>>,
}

#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// Seam between the gateway and the actual HTTP stack, so the failover
/// logic can be exercised against scripted endpoints.
pub trait HttpTransport {
    fn post_json(&self, url: &str, body: &str) -> Result<HttpReply, TransportError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for &T {
    fn post_json(&self, url: &str, body: &str) -> Result<HttpReply, TransportError> {
        (**self).post_json(url, body)
    }
}

/// Production transport: one blocking reqwest client per run, reused for
/// every call. Redirects are not followed, mirroring the upstream nodes'
/// expectations.
pub struct BlockingTransport {
    client: reqwest::blocking::Client,
}

impl BlockingTransport {
    pub fn new(timeout_seconds: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("hive-pulse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for BlockingTransport {
    fn post_json(&self, url: &str, body: &str) -> Result<HttpReply, TransportError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .map_err(|e| TransportError {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|e| TransportError {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(HttpReply { status, body })
    }
}

/// JSON-RPC client over an ordered list of candidate endpoints.
pub struct ApiGateway<T: HttpTransport> {
    endpoints: Vec<String>,
    transport: T,
}

impl<T: HttpTransport> ApiGateway<T> {
    pub fn new(endpoints: Vec<String>, transport: T) -> Self {
        Self {
            endpoints,
            transport,
        }
    }

    /// Send `method` with `params` to the endpoints in priority order and
    /// return the decoded `result` array of the first endpoint that is not
    /// busy. There is no retry budget beyond the list itself and no backoff.
    pub fn call(&self, method: &str, params: Value) -> Result<Vec<Value>, ApiError> {
        let request = RpcRequest::new(method, params);
        let body = serde_json::to_string(&request).map_err(|source| ApiError::Encode {
            method: method.to_string(),
            source,
        })?;

        for url in &self.endpoints {
            let reply = self.transport.post_json(url, &body)?;
            if reply.status == SERVER_BUSY {
                log::debug!("{url} temporarily unavailable, trying next endpoint");
                continue;
            }
            let decoded: RpcResponse =
                serde_json::from_str(&reply.body).map_err(|source| ApiError::MalformedResponse {
                    url: url.clone(),
                    source,
                })?;
            let result = decoded.result.unwrap_or_default();
            if result.is_empty() {
                // Some calls legitimately return nothing; the caller decides
                // whether that is a problem.
                log::warn!("empty result for {method} via {url}");
                return Err(ApiError::EmptyResult {
                    method: method.to_string(),
                });
            }
            return Ok(result);
        }
        Err(ApiError::NoResponse {
            method: method.to_string(),
        })
    }

    /// Like `call`, but maps the non-fatal empty-result signal to an empty
    /// collection.
    pub fn call_or_empty(&self, method: &str, params: Value) -> Result<Vec<Value>, ApiError> {
        match self.call(method, params) {
            Err(ApiError::EmptyResult { .. }) => Ok(Vec::new()),
            other => other,
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};

    /// Replays a fixed sequence of replies, one per request, regardless of
    /// the endpoint hit. Records every URL contacted.
    pub struct SequenceTransport {
        replies: RefCell<VecDeque<HttpReply>>,
        pub calls: RefCell<Vec<String>>,
    }

    impl SequenceTransport {
        pub fn new(replies: Vec<HttpReply>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl HttpTransport for SequenceTransport {
        fn post_json(&self, url: &str, _body: &str) -> Result<HttpReply, TransportError> {
            self.calls.borrow_mut().push(url.to_string());
            self.replies
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| TransportError {
                    url: url.to_string(),
                    reason: "no scripted reply left".to_string(),
                })
        }
    }

    /// Routes requests by JSON-RPC method name, popping queued bodies.
    /// Methods without a queued body answer with an empty result.
    pub struct ScriptedTransport {
        responses: RefCell<HashMap<String, VecDeque<String>>>,
        pub methods_called: RefCell<Vec<String>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self {
                responses: RefCell::new(HashMap::new()),
                methods_called: RefCell::new(Vec::new()),
            }
        }

        pub fn push(&self, method: &str, body: &str) {
            self.responses
                .borrow_mut()
                .entry(method.to_string())
                .or_default()
                .push_back(body.to_string());
        }

        pub fn push_result(&self, method: &str, result: &Value) {
            let body = serde_json::json!({"jsonrpc": "2.0", "result": result, "id": 1});
            self.push(method, &body.to_string());
        }

        pub fn calls_for(&self, method: &str) -> usize {
            self.methods_called
                .borrow()
                .iter()
                .filter(|m| m.as_str() == method)
                .count()
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn post_json(&self, url: &str, body: &str) -> Result<HttpReply, TransportError> {
            let request: Value = serde_json::from_str(body).map_err(|e| TransportError {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            let method = request
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            self.methods_called.borrow_mut().push(method.clone());
            let scripted = self.responses.borrow_mut().get_mut(&method).and_then(VecDeque::pop_front);
            Ok(HttpReply {
                status: 200,
                body: scripted
                    .unwrap_or_else(|| r#"{"jsonrpc":"2.0","result":[],"id":1}"#.to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::SequenceTransport;
    use super::*;
    use serde_json::json;

    fn endpoints(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://node{i}.example")).collect()
    }

    fn ok_reply(body: &str) -> HttpReply {
        HttpReply {
            status: 200,
            body: body.to_string(),
        }
    }

    fn busy_reply() -> HttpReply {
        HttpReply {
            status: 502,
            body: String::new(),
        }
    }

    #[test]
    fn test_failover_skips_busy_endpoints() {
        let transport = SequenceTransport::new(vec![
            busy_reply(),
            busy_reply(),
            ok_reply(r#"{"jsonrpc":"2.0","result":[1,2,3],"id":1}"#),
        ]);
        let gateway = ApiGateway::new(endpoints(4), transport);
        let result = gateway.call("condenser_api.get_active_votes", json!([])).unwrap();
        assert_eq!(result, vec![json!(1), json!(2), json!(3)]);
        // The fourth endpoint is never contacted.
        assert_eq!(
            *gateway.transport.calls.borrow(),
            vec![
                "https://node0.example",
                "https://node1.example",
                "https://node2.example"
            ]
        );
    }

    #[test]
    fn test_all_endpoints_busy_is_no_response() {
        let transport = SequenceTransport::new(vec![busy_reply(), busy_reply(), busy_reply()]);
        let gateway = ApiGateway::new(endpoints(3), transport);
        let err = gateway.call("bridge.get_account_posts", json!({})).unwrap_err();
        assert!(matches!(err, ApiError::NoResponse { .. }));
    }

    #[test]
    fn test_empty_result_is_a_distinct_signal() {
        let transport =
            SequenceTransport::new(vec![ok_reply(r#"{"jsonrpc":"2.0","result":[],"id":1}"#)]);
        let gateway = ApiGateway::new(endpoints(2), transport);
        let err = gateway.call("bridge.get_account_posts", json!({})).unwrap_err();
        assert!(matches!(err, ApiError::EmptyResult { .. }));
        // Only the first endpoint was consulted; empty is not a failover case.
        assert_eq!(gateway.transport.calls.borrow().len(), 1);
    }

    #[test]
    fn test_missing_result_field_counts_as_empty() {
        let transport = SequenceTransport::new(vec![ok_reply(r#"{"jsonrpc":"2.0","id":1}"#)]);
        let gateway = ApiGateway::new(endpoints(1), transport);
        let err = gateway.call("bridge.get_account_posts", json!({})).unwrap_err();
        assert!(matches!(err, ApiError::EmptyResult { .. }));
    }

    #[test]
    fn test_call_or_empty_recovers_empty_results() {
        let transport =
            SequenceTransport::new(vec![ok_reply(r#"{"jsonrpc":"2.0","result":[],"id":1}"#)]);
        let gateway = ApiGateway::new(endpoints(1), transport);
        let result = gateway.call_or_empty("bridge.get_account_posts", json!({})).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_undecodable_body_is_malformed() {
        let transport = SequenceTransport::new(vec![ok_reply("<html>gateway error</html>")]);
        let gateway = ApiGateway::new(endpoints(2), transport);
        let err = gateway.call("bridge.get_account_posts", json!({})).unwrap_err();
        assert!(matches!(err, ApiError::MalformedResponse { .. }));
    }

    #[test]
    fn test_transport_failure_aborts() {
        // No scripted replies at all: the transport itself errors out.
        let transport = SequenceTransport::new(vec![]);
        let gateway = ApiGateway::new(endpoints(3), transport);
        let err = gateway.call("bridge.get_account_posts", json!({})).unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
