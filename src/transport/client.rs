//! reqwest-backed transport.

use async_trait::async_trait;
use http::header::{AUTHORIZATION, CONTENT_TYPE};

use crate::transport::{
    HttpTransport, OutboundBody, OutboundRequest, PartContents, TransportError, TransportErrorKind,
    TransportResponse,
};

/// Basic-auth credentials attached by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Transport backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    credentials: Option<Credentials>,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            credentials: None,
        }
    }

    /// Apply basic auth to requests that carry no `authorization` header.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let OutboundRequest {
            method,
            url,
            mut headers,
            body,
            version,
        } = request;
        let url_str = url.to_string();

        let credentials = if headers.contains_key(AUTHORIZATION) {
            None
        } else {
            self.credentials.as_ref()
        };

        let mut builder = self.client.request(method, url);

        builder = match body {
            OutboundBody::Empty => builder,
            OutboundBody::Bytes(bytes) => builder.body(bytes),
            OutboundBody::Multipart(parts) => {
                // reqwest sets its own boundary-bearing content type.
                headers.remove(CONTENT_TYPE);
                let mut form = reqwest::multipart::Form::new();
                for part in parts {
                    form = match part.contents {
                        PartContents::Text(text) => form.text(part.name, text),
                        PartContents::File {
                            file_name,
                            content_type,
                            bytes,
                        } => {
                            let mut file_part = reqwest::multipart::Part::bytes(bytes.to_vec());
                            if let Some(file_name) = file_name {
                                file_part = file_part.file_name(file_name);
                            }
                            if let Some(content_type) = content_type {
                                file_part = file_part
                                    .mime_str(&content_type)
                                    .map_err(|e| to_error(&url_str, e))?;
                            }
                            form.part(part.name, file_part)
                        }
                    };
                }
                builder.multipart(form)
            }
        };

        builder = builder.headers(headers);
        if let Some(credentials) = credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }
        if let Some(version) = version {
            builder = builder.version(version.to_http());
        }

        let response = builder.send().await.map_err(|e| to_error(&url_str, e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| to_error(&url_str, e))?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

fn to_error(url: &str, error: reqwest::Error) -> TransportError {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Request
    };
    TransportError::new(kind, url, error.to_string())
}
