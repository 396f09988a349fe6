//! Native libconfsec engine
//!
//! Binds the C ABI exported by `libconfsec`. Every string or buffer the
//! library returns is copied into Rust memory and released with
//! `Confsec_Free` before returning. Error messages are reported through an
//! out-parameter that is non-null on failure.
#![allow(unsafe_code)]

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_long, c_void};
use std::ptr;
use std::sync::Arc;

use crate::client::ConfsecClient;
use crate::config::ClientConfig;
use crate::engine::{
    ClientHandle, Engine, EngineError, EngineResult, ResponseHandle, StreamHandle,
};
use crate::error::{Error, Result};

#[link(name = "confsec")]
extern "C" {
    fn Confsec_ClientCreate(
        api_key: *mut c_char,
        concurrent_requests_target: c_int,
        max_candidate_nodes: c_int,
        default_node_tags: *mut *mut c_char,
        default_node_tags_count: usize,
        env: *mut c_char,
        err: *mut *mut c_char,
    ) -> usize;
    fn Confsec_ClientDestroy(handle: usize, err: *mut *mut c_char);
    fn Confsec_ClientGetDefaultCreditAmountPerRequest(handle: usize, err: *mut *mut c_char)
        -> c_long;
    fn Confsec_ClientGetMaxCandidateNodes(handle: usize, err: *mut *mut c_char) -> c_int;
    fn Confsec_ClientGetDefaultNodeTags(
        handle: usize,
        count: *mut usize,
        err: *mut *mut c_char,
    ) -> *mut *mut c_char;
    fn Confsec_ClientSetDefaultNodeTags(
        handle: usize,
        tags: *mut *mut c_char,
        count: usize,
        err: *mut *mut c_char,
    );
    fn Confsec_ClientGetWalletStatus(handle: usize, err: *mut *mut c_char) -> *mut c_char;
    fn Confsec_ClientDoRequest(
        handle: usize,
        request: *mut c_char,
        request_length: usize,
        err: *mut *mut c_char,
    ) -> usize;
    fn Confsec_ResponseDestroy(handle: usize, err: *mut *mut c_char);
    fn Confsec_ResponseGetMetadata(handle: usize, err: *mut *mut c_char) -> *mut c_char;
    fn Confsec_ResponseIsStreaming(handle: usize, err: *mut *mut c_char) -> bool;
    fn Confsec_ResponseGetBody(handle: usize, err: *mut *mut c_char) -> *mut c_char;
    fn Confsec_ResponseGetStream(handle: usize, err: *mut *mut c_char) -> usize;
    fn Confsec_ResponseStreamGetNext(handle: usize, err: *mut *mut c_char) -> *mut c_char;
    fn Confsec_ResponseStreamDestroy(handle: usize, err: *mut *mut c_char);
    fn Confsec_Free(ptr: *mut c_void);
}

/// Engine backed by the native `libconfsec` library
#[derive(Debug, Default, Clone, Copy)]
pub struct LibConfsec;

impl LibConfsec {
    /// Create a client on the native engine
    pub fn client(config: ClientConfig) -> Result<ConfsecClient<LibConfsec>> {
        if config
            .identity_policy
            .as_ref()
            .is_some_and(|policy| !policy.is_empty())
        {
            return Err(Error::Config(
                "identity policy is not supported by the linked libconfsec".to_string(),
            ));
        }
        ConfsecClient::new(Arc::new(LibConfsec), config)
    }
}

/// Run a libconfsec call and turn its error out-parameter into a result
fn call<T>(f: impl FnOnce(*mut *mut c_char) -> T) -> EngineResult<T> {
    let mut err: *mut c_char = ptr::null_mut();
    let value = f(&mut err as *mut *mut c_char);

    if err.is_null() {
        return Ok(value);
    }

    // SAFETY: a non-null error is a NUL-terminated string owned by libconfsec
    let message = unsafe { CStr::from_ptr(err) }
        .to_string_lossy()
        .into_owned();
    // SAFETY: the error string is released exactly once, after being copied
    unsafe { Confsec_Free(err.cast()) };

    Err(EngineError::new(message))
}

/// Copy and release a string returned by libconfsec
fn take_bytes(ptr: *mut c_char) -> Vec<u8> {
    // SAFETY: callers only pass non-null, NUL-terminated strings from libconfsec
    let bytes = unsafe { CStr::from_ptr(ptr) }.to_bytes().to_vec();
    // SAFETY: released exactly once, after being copied
    unsafe { Confsec_Free(ptr.cast()) };
    bytes
}

fn take_required(ptr: *mut c_char, what: &str) -> EngineResult<Vec<u8>> {
    if ptr.is_null() {
        return Err(EngineError::new(format!("Unexpected error getting {what}")));
    }
    Ok(take_bytes(ptr))
}

fn c_string(value: &str) -> EngineResult<CString> {
    CString::new(value).map_err(|err| EngineError::new(err.to_string()))
}

fn c_int_of(value: u32, what: &str) -> EngineResult<c_int> {
    c_int::try_from(value).map_err(|_| EngineError::new(format!("{what} is out of range")))
}

fn raw_handle(raw: u64) -> usize {
    raw as usize
}

fn nonzero(handle: usize, what: &str) -> EngineResult<u64> {
    if handle == 0 {
        return Err(EngineError::new(format!("Unexpected error {what}")));
    }
    Ok(handle as u64)
}

impl Engine for LibConfsec {
    fn client_create(&self, config: &ClientConfig) -> EngineResult<ClientHandle> {
        let api_key = c_string(&config.api_key)?;
        let env = c_string(&config.env)?;
        let tags = config
            .default_node_tags
            .iter()
            .map(|tag| c_string(tag))
            .collect::<EngineResult<Vec<_>>>()?;
        let mut tag_ptrs: Vec<*mut c_char> =
            tags.iter().map(|tag| tag.as_ptr() as *mut c_char).collect();
        let concurrent = c_int_of(config.concurrent_requests_target, "concurrent requests target")?;
        let max_nodes = c_int_of(config.max_candidate_nodes, "max candidate nodes")?;

        let handle = call(|err| {
            // SAFETY: every pointer stays valid for the duration of the call and
            // libconfsec copies what it keeps
            unsafe {
                Confsec_ClientCreate(
                    api_key.as_ptr() as *mut c_char,
                    concurrent,
                    max_nodes,
                    tag_ptrs.as_mut_ptr(),
                    tag_ptrs.len(),
                    env.as_ptr() as *mut c_char,
                    err,
                )
            }
        })?;

        nonzero(handle, "creating client").map(ClientHandle::new)
    }

    fn client_destroy(&self, client: ClientHandle) -> EngineResult<()> {
        // SAFETY: plain handle call
        call(|err| unsafe { Confsec_ClientDestroy(raw_handle(client.raw()), err) })
    }

    fn client_default_credit_amount_per_request(
        &self,
        client: ClientHandle,
    ) -> EngineResult<i64> {
        // SAFETY: plain handle call
        call(|err| unsafe {
            Confsec_ClientGetDefaultCreditAmountPerRequest(raw_handle(client.raw()), err)
        })
        .map(i64::from)
    }

    fn client_max_candidate_nodes(&self, client: ClientHandle) -> EngineResult<u32> {
        // SAFETY: plain handle call
        let max = call(|err| unsafe {
            Confsec_ClientGetMaxCandidateNodes(raw_handle(client.raw()), err)
        })?;
        u32::try_from(max).map_err(|_| EngineError::new("negative max candidate nodes"))
    }

    fn client_default_node_tags(&self, client: ClientHandle) -> EngineResult<Vec<String>> {
        let mut count: usize = 0;
        // SAFETY: `count` outlives the call
        let tags = call(|err| unsafe {
            Confsec_ClientGetDefaultNodeTags(raw_handle(client.raw()), &mut count as *mut usize, err)
        })?;

        if tags.is_null() || count == 0 {
            return Ok(Vec::new());
        }

        // SAFETY: libconfsec returned an array of `count` string pointers
        let entries = unsafe { std::slice::from_raw_parts(tags, count) };
        let result = entries
            .iter()
            .filter(|entry| !entry.is_null())
            .map(|entry| String::from_utf8_lossy(&take_bytes(*entry)).into_owned())
            .collect();
        // SAFETY: the array itself is released once its entries are copied
        unsafe { Confsec_Free(tags.cast()) };

        Ok(result)
    }

    fn client_set_default_node_tags(
        &self,
        client: ClientHandle,
        tags: &[String],
    ) -> EngineResult<()> {
        let tags = tags
            .iter()
            .map(|tag| c_string(tag))
            .collect::<EngineResult<Vec<_>>>()?;
        let mut tag_ptrs: Vec<*mut c_char> =
            tags.iter().map(|tag| tag.as_ptr() as *mut c_char).collect();

        // SAFETY: the tag strings outlive the call
        call(|err| unsafe {
            Confsec_ClientSetDefaultNodeTags(
                raw_handle(client.raw()),
                tag_ptrs.as_mut_ptr(),
                tag_ptrs.len(),
                err,
            )
        })
    }

    fn client_wallet_status(&self, client: ClientHandle) -> EngineResult<String> {
        // SAFETY: plain handle call
        let status = call(|err| unsafe {
            Confsec_ClientGetWalletStatus(raw_handle(client.raw()), err)
        })?;
        let bytes = take_required(status, "wallet status")?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn client_do_request(
        &self,
        client: ClientHandle,
        request: &[u8],
    ) -> EngineResult<ResponseHandle> {
        // SAFETY: libconfsec reads exactly `request.len()` bytes and does not
        // write through the pointer
        let handle = call(|err| unsafe {
            Confsec_ClientDoRequest(
                raw_handle(client.raw()),
                request.as_ptr() as *mut c_char,
                request.len(),
                err,
            )
        })?;

        nonzero(handle, "issuing request").map(ResponseHandle::new)
    }

    fn response_destroy(&self, response: ResponseHandle) -> EngineResult<()> {
        // SAFETY: plain handle call
        call(|err| unsafe { Confsec_ResponseDestroy(raw_handle(response.raw()), err) })
    }

    fn response_metadata(&self, response: ResponseHandle) -> EngineResult<Vec<u8>> {
        // SAFETY: plain handle call
        let metadata = call(|err| unsafe {
            Confsec_ResponseGetMetadata(raw_handle(response.raw()), err)
        })?;
        take_required(metadata, "response metadata")
    }

    fn response_is_streaming(&self, response: ResponseHandle) -> EngineResult<bool> {
        // SAFETY: plain handle call
        call(|err| unsafe { Confsec_ResponseIsStreaming(raw_handle(response.raw()), err) })
    }

    fn response_body(&self, response: ResponseHandle) -> EngineResult<Vec<u8>> {
        // SAFETY: plain handle call
        let body =
            call(|err| unsafe { Confsec_ResponseGetBody(raw_handle(response.raw()), err) })?;
        take_required(body, "response body")
    }

    fn response_stream(&self, response: ResponseHandle) -> EngineResult<StreamHandle> {
        // SAFETY: plain handle call
        let handle =
            call(|err| unsafe { Confsec_ResponseGetStream(raw_handle(response.raw()), err) })?;
        nonzero(handle, "getting response stream").map(StreamHandle::new)
    }

    fn stream_next(&self, stream: StreamHandle) -> EngineResult<Option<Vec<u8>>> {
        // SAFETY: plain handle call
        let chunk =
            call(|err| unsafe { Confsec_ResponseStreamGetNext(raw_handle(stream.raw()), err) })?;

        if chunk.is_null() {
            return Ok(None);
        }
        Ok(Some(take_bytes(chunk)))
    }

    fn stream_destroy(&self, stream: StreamHandle) -> EngineResult<()> {
        // SAFETY: plain handle call
        call(|err| unsafe { Confsec_ResponseStreamDestroy(raw_handle(stream.raw()), err) })
    }
}
