//! Recording transport used by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::transport::{
    HttpTransport, OutboundRequest, TransportError, TransportErrorKind, TransportResponse,
};

/// Replays queued responses and records every request it receives.
///
/// Once the queue is drained every further call gets an empty `200`.
#[derive(Default)]
pub struct RecordingTransport {
    responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl RecordingTransport {
    pub fn new(responses: Vec<TransportResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// The first call fails with a connect error; later calls get the default empty `200`.
    pub fn failing() -> Self {
        let transport = Self::default();
        transport.push_error(TransportErrorKind::Connect, "connection refused");
        transport
    }

    pub fn push_error(&self, kind: TransportErrorKind, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(TransportError::new(kind, "mock", message)));
    }

    pub fn response(status: u16, headers: &[(&str, &str)], body: &[u8]) -> TransportResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        TransportResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers: map,
            body: Bytes::copy_from_slice(body),
        }
    }

    pub fn json(status: u16, body: &str) -> TransportResponse {
        Self::response(status, &[("content-type", "application/json")], body.as_bytes())
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn execute(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let url = request.url.to_string();
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(mut error)) => {
                error.url = url;
                Err(error)
            }
            None => Ok(Self::response(200, &[], b"")),
        }
    }
}
