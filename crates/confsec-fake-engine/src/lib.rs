//! Fake confsec engine
//!
//! An in-memory [`Engine`] that serves scripted responses and records every
//! call it receives, so tests can assert on handle lifecycles and on the raw
//! bytes sent by the adapter.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use confsec::{
    ClientConfig, ClientHandle, Engine, EngineError, EngineResult, ResponseHandle, StreamHandle,
};
use serde_json::json;

/// Engine operation, used to inspect calls and inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `client_create`
    ClientCreate,
    /// `client_destroy`
    ClientDestroy,
    /// `client_default_credit_amount_per_request`
    ClientDefaultCreditAmountPerRequest,
    /// `client_max_candidate_nodes`
    ClientMaxCandidateNodes,
    /// `client_default_node_tags`
    ClientDefaultNodeTags,
    /// `client_set_default_node_tags`
    ClientSetDefaultNodeTags,
    /// `client_wallet_status`
    ClientWalletStatus,
    /// `client_do_request`
    ClientDoRequest,
    /// `response_destroy`
    ResponseDestroy,
    /// `response_metadata`
    ResponseMetadata,
    /// `response_is_streaming`
    ResponseIsStreaming,
    /// `response_body`
    ResponseBody,
    /// `response_stream`
    ResponseStream,
    /// `stream_next`
    StreamNext,
    /// `stream_destroy`
    StreamDestroy,
}

/// Recorded engine call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    /// Operation invoked
    pub operation: Operation,
    /// Handle it was invoked on, 0 for client creation
    pub handle: u64,
}

#[derive(Debug, Clone)]
enum FakeBody {
    Full(Vec<u8>),
    Chunks(Vec<Vec<u8>>),
}

/// Scripted response served by [`FakeEngine`]
#[derive(Debug, Clone)]
pub struct FakeResponse {
    status_code: u16,
    reason_phrase: String,
    headers: Vec<(String, String)>,
    body: FakeBody,
}

impl FakeResponse {
    /// `200 OK` with a complete body
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code: 200,
            reason_phrase: "OK".to_string(),
            headers: Vec::new(),
            body: FakeBody::Full(body.into()),
        }
    }

    /// `200 OK` streamed as the given chunks
    pub fn streaming<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            status_code: 200,
            reason_phrase: "OK".to_string(),
            headers: Vec::new(),
            body: FakeBody::Chunks(chunks.into_iter().map(Into::into).collect()),
        }
    }

    /// Override the status line
    pub fn status(mut self, code: u16, reason: impl Into<String>) -> Self {
        self.status_code = code;
        self.reason_phrase = reason.into();
        self
    }

    /// Add a response header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    fn metadata_json(&self) -> Vec<u8> {
        let headers: Vec<_> = self
            .headers
            .iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect();

        json!({
            "status_code": self.status_code,
            "reason_phrase": self.reason_phrase,
            "http_version": "HTTP/1.1",
            "url": "",
            "headers": headers,
        })
        .to_string()
        .into_bytes()
    }
}

#[derive(Debug)]
struct FakeClient {
    max_candidate_nodes: u32,
    default_node_tags: Vec<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    next_handle: u64,
    clients: HashMap<u64, FakeClient>,
    responses: HashMap<u64, FakeResponse>,
    streams: HashMap<u64, VecDeque<Vec<u8>>>,
    scripted: VecDeque<FakeResponse>,
    rejected_api_keys: HashSet<String>,
    failures: HashMap<Operation, String>,
    calls: Vec<Call>,
    requests: Vec<Vec<u8>>,
    wallet_status: Option<String>,
    credit_amount_per_request: i64,
}

impl FakeState {
    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn record(&mut self, operation: Operation, handle: u64) -> EngineResult<()> {
        self.calls.push(Call { operation, handle });
        match self.failures.remove(&operation) {
            Some(message) => Err(EngineError::new(message)),
            None => Ok(()),
        }
    }

    fn client(&mut self, handle: ClientHandle) -> EngineResult<&mut FakeClient> {
        self.clients
            .get_mut(&handle.raw())
            .ok_or_else(|| EngineError::new("client not found"))
    }

    fn response(&self, handle: ResponseHandle) -> EngineResult<&FakeResponse> {
        self.responses
            .get(&handle.raw())
            .ok_or_else(|| EngineError::new("response not found"))
    }
}

/// In-memory engine with scripted responses and call recording
///
/// Responses pushed with [`FakeEngine::push_response`] are served in order,
/// one per `client_do_request`. Handles are unique across clients, responses
/// and streams and never reused.
#[derive(Debug)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
    pull_delay: Mutex<Duration>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    /// Engine accepting any API key, with no scripted responses
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                credit_amount_per_request: 1,
                ..Default::default()
            }),
            pull_delay: Mutex::new(Duration::ZERO),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queue a response for the next request
    pub fn push_response(&self, response: FakeResponse) {
        self.state().scripted.push_back(response);
    }

    /// Reject client creation with this API key
    pub fn reject_api_key(&self, api_key: impl Into<String>) {
        self.state().rejected_api_keys.insert(api_key.into());
    }

    /// Fail the next call of `operation` with `message`
    pub fn fail_next(&self, operation: Operation, message: impl Into<String>) {
        self.state().failures.insert(operation, message.into());
    }

    /// Wallet status JSON returned by `client_wallet_status`
    pub fn set_wallet_status(&self, json: impl Into<String>) {
        self.state().wallet_status = Some(json.into());
    }

    /// Credits charged per request
    pub fn set_credit_amount_per_request(&self, amount: i64) {
        self.state().credit_amount_per_request = amount;
    }

    /// Block every `stream_next` for `delay` before answering
    pub fn set_pull_delay(&self, delay: Duration) {
        match self.pull_delay.lock() {
            Ok(mut slot) => *slot = delay,
            Err(poisoned) => *poisoned.into_inner() = delay,
        }
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Recorded operations, in order
    pub fn operations(&self) -> Vec<Operation> {
        self.state().calls.iter().map(|call| call.operation).collect()
    }

    /// Number of calls of `operation`
    pub fn count(&self, operation: Operation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    /// Raw requests received, in order
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.state().requests.clone()
    }

    /// Last raw request as text
    pub fn last_request(&self) -> Option<String> {
        self.state()
            .requests
            .last()
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
    }

    /// Number of clients, responses and streams not yet destroyed
    pub fn live_handles(&self) -> usize {
        let state = self.state();
        state.clients.len() + state.responses.len() + state.streams.len()
    }
}

impl Engine for FakeEngine {
    fn client_create(&self, config: &ClientConfig) -> EngineResult<ClientHandle> {
        let mut state = self.state();
        state.record(Operation::ClientCreate, 0)?;

        if state.rejected_api_keys.contains(&config.api_key) {
            return Err(EngineError::new("invalid API key"));
        }

        let handle = state.allocate();
        state.clients.insert(
            handle,
            FakeClient {
                max_candidate_nodes: config.max_candidate_nodes,
                default_node_tags: config.default_node_tags.clone(),
            },
        );
        tracing::trace!("Fake engine created client {}", handle);
        Ok(ClientHandle::new(handle))
    }

    fn client_destroy(&self, client: ClientHandle) -> EngineResult<()> {
        let mut state = self.state();
        state.record(Operation::ClientDestroy, client.raw())?;
        state
            .clients
            .remove(&client.raw())
            .map(|_| ())
            .ok_or_else(|| EngineError::new("client not found"))
    }

    fn client_default_credit_amount_per_request(
        &self,
        client: ClientHandle,
    ) -> EngineResult<i64> {
        let mut state = self.state();
        state.record(Operation::ClientDefaultCreditAmountPerRequest, client.raw())?;
        state.client(client)?;
        Ok(state.credit_amount_per_request)
    }

    fn client_max_candidate_nodes(&self, client: ClientHandle) -> EngineResult<u32> {
        let mut state = self.state();
        state.record(Operation::ClientMaxCandidateNodes, client.raw())?;
        Ok(state.client(client)?.max_candidate_nodes)
    }

    fn client_default_node_tags(&self, client: ClientHandle) -> EngineResult<Vec<String>> {
        let mut state = self.state();
        state.record(Operation::ClientDefaultNodeTags, client.raw())?;
        Ok(state.client(client)?.default_node_tags.clone())
    }

    fn client_set_default_node_tags(
        &self,
        client: ClientHandle,
        tags: &[String],
    ) -> EngineResult<()> {
        let mut state = self.state();
        state.record(Operation::ClientSetDefaultNodeTags, client.raw())?;
        state.client(client)?.default_node_tags = tags.to_vec();
        Ok(())
    }

    fn client_wallet_status(&self, client: ClientHandle) -> EngineResult<String> {
        let mut state = self.state();
        state.record(Operation::ClientWalletStatus, client.raw())?;
        state.client(client)?;
        Ok(state.wallet_status.clone().unwrap_or_else(|| {
            r#"{"credits_spent":0,"credits_held":0,"credits_available":0}"#.to_string()
        }))
    }

    fn client_do_request(
        &self,
        client: ClientHandle,
        request: &[u8],
    ) -> EngineResult<ResponseHandle> {
        let mut state = self.state();
        state.record(Operation::ClientDoRequest, client.raw())?;
        state.client(client)?;
        state.requests.push(request.to_vec());

        let response = state
            .scripted
            .pop_front()
            .ok_or_else(|| EngineError::new("no scripted response"))?;

        let handle = state.allocate();
        state.responses.insert(handle, response);
        Ok(ResponseHandle::new(handle))
    }

    fn response_destroy(&self, response: ResponseHandle) -> EngineResult<()> {
        let mut state = self.state();
        state.record(Operation::ResponseDestroy, response.raw())?;
        state
            .responses
            .remove(&response.raw())
            .map(|_| ())
            .ok_or_else(|| EngineError::new("response not found"))
    }

    fn response_metadata(&self, response: ResponseHandle) -> EngineResult<Vec<u8>> {
        let mut state = self.state();
        state.record(Operation::ResponseMetadata, response.raw())?;
        Ok(state.response(response)?.metadata_json())
    }

    fn response_is_streaming(&self, response: ResponseHandle) -> EngineResult<bool> {
        let mut state = self.state();
        state.record(Operation::ResponseIsStreaming, response.raw())?;
        Ok(matches!(state.response(response)?.body, FakeBody::Chunks(_)))
    }

    fn response_body(&self, response: ResponseHandle) -> EngineResult<Vec<u8>> {
        let mut state = self.state();
        state.record(Operation::ResponseBody, response.raw())?;
        Ok(match &state.response(response)?.body {
            FakeBody::Full(body) => body.clone(),
            FakeBody::Chunks(chunks) => chunks.concat(),
        })
    }

    fn response_stream(&self, response: ResponseHandle) -> EngineResult<StreamHandle> {
        let mut state = self.state();
        state.record(Operation::ResponseStream, response.raw())?;

        let chunks = match &state.response(response)?.body {
            FakeBody::Chunks(chunks) => chunks.iter().cloned().collect::<VecDeque<_>>(),
            FakeBody::Full(_) => return Err(EngineError::new("response is not streaming")),
        };

        let handle = state.allocate();
        state.streams.insert(handle, chunks);
        Ok(StreamHandle::new(handle))
    }

    fn stream_next(&self, stream: StreamHandle) -> EngineResult<Option<Vec<u8>>> {
        let delay = match self.pull_delay.lock() {
            Ok(delay) => *delay,
            Err(poisoned) => *poisoned.into_inner(),
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.state();
        state.record(Operation::StreamNext, stream.raw())?;
        let chunks = state
            .streams
            .get_mut(&stream.raw())
            .ok_or_else(|| EngineError::new("stream not found"))?;
        Ok(chunks.pop_front())
    }

    fn stream_destroy(&self, stream: StreamHandle) -> EngineResult<()> {
        let mut state = self.state();
        state.record(Operation::StreamDestroy, stream.raw())?;
        state
            .streams
            .remove(&stream.raw())
            .map(|_| ())
            .ok_or_else(|| EngineError::new("stream not found"))
    }
}
