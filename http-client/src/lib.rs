//! Minimal HTTP transport for FDO protocol messages.
//!
//! Every FDO exchange is a POST of a CBOR body to
//! `{base}/fdo/101/msg/{type}`, with the response's message type in
//! the `message-type` header and session continuity carried through
//! the `authorization` header. This crate moves those bytes; message
//! encoding and interpretation stay with the caller.

use serde_tuple::Deserialize_tuple;
use thiserror::Error;

/// Message type the server uses for protocol-level errors.
const ERROR_MESSAGE_TYPE: u8 = 255;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid base URL")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Error performing request")]
    Request(#[from] reqwest::Error),
    #[error("Missing message type in response")]
    MissingMessageType,
    #[error("Invalid message type {0} encountered")]
    InvalidMessageType(String),
    #[error("Invalid message type {0} encountered, expected {1}")]
    InvalidMessage(u8, u8),
    #[error("Undecodable error message from server")]
    ParseErrorMessage(#[from] serde_cbor::Error),
    #[error("Error returned by server: {0}")]
    Error(ErrorMessage),
}

pub type RequestResult<T> = Result<T, Error>;

/// FDO ErrorMessage body (FDO 1.1 section 5.2.11), decoded from the
/// CBOR array the server sends with message type 255.
#[derive(Debug, Deserialize_tuple)]
pub struct ErrorMessage {
    pub error_code: u16,
    pub previous_message_type: u8,
    pub error_string: String,
    pub error_timestamp: serde_cbor::Value,
    pub error_uuid: u64,
}

impl std::fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "error code {} in response to message {}: {}",
            self.error_code, self.previous_message_type, self.error_string
        )
    }
}

#[derive(Debug)]
pub struct ServiceClient {
    base_url: String,
    client: reqwest::Client,
    authorization_token: Option<String>,
}

impl ServiceClient {
    /// Creates a client for one server. With `insecure_tls` set the
    /// server certificate is not verified; only for test setups with
    /// self-signed owner or rendezvous certificates.
    pub fn new(base_url: &str, insecure_tls: bool) -> RequestResult<Self> {
        url::Url::parse(base_url)?;
        if insecure_tls {
            log::warn!("TLS certificate verification disabled for {}", base_url);
        }
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure_tls)
            .build()?;
        Ok(ServiceClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            authorization_token: None,
        })
    }

    fn message_url(&self, message_type: u8) -> String {
        format!("{}/fdo/101/msg/{}", &self.base_url, message_type)
    }

    /// Sends one encoded message and returns the raw response body.
    /// The response must carry `expected_type`; a server error (type
    /// 255) is decoded and surfaced as [`Error::Error`].
    pub async fn send_request(
        &mut self,
        message_type: u8,
        body: Vec<u8>,
        expected_type: u8,
    ) -> RequestResult<Vec<u8>> {
        let url = self.message_url(message_type);
        log::trace!("Sending message type {} to {}", message_type, url);

        let mut req = self
            .client
            .post(url)
            .header("Content-Type", "application/cbor")
            .body(body);

        if let Some(authorization_token) = &self.authorization_token {
            req = req.header("Authorization", authorization_token);
        }

        let resp = req.send().await?;

        let msgtype = resp
            .headers()
            .get("message-type")
            .ok_or(Error::MissingMessageType)?
            .to_str()
            .map_err(|_| Error::MissingMessageType)?;
        let msgtype = msgtype
            .parse::<u8>()
            .map_err(|_| Error::InvalidMessageType(msgtype.to_string()))?;

        // The token issued on the first response of a session must be
        // replayed on every later request of that session.
        if let Some(val) = resp.headers().get("authorization") {
            if let Ok(val) = val.to_str() {
                self.authorization_token = Some(val.to_string());
            }
        }

        let is_success = if resp.status().is_success() {
            if msgtype != expected_type {
                return Err(Error::InvalidMessage(msgtype, expected_type));
            }
            true
        } else {
            if msgtype != ERROR_MESSAGE_TYPE {
                return Err(Error::InvalidMessage(msgtype, ERROR_MESSAGE_TYPE));
            }
            false
        };

        let resp = resp.bytes().await?;

        if is_success {
            Ok(resp.to_vec())
        } else {
            Err(Error::Error(serde_cbor::from_slice(&resp)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_url_format() {
        let client = ServiceClient::new("http://owner.example.com:8042/", false).unwrap();
        assert_eq!(
            client.message_url(60),
            "http://owner.example.com:8042/fdo/101/msg/60"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(matches!(
            ServiceClient::new("not a url", false),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_error_message_decoding() {
        // [code, prev_msg, str, timestamp, uuid] as the server encodes it.
        let encoded = serde_cbor::to_vec(&(
            100u16,
            30u8,
            "message body structurally unparseable",
            serde_cbor::Value::Null,
            0u64,
        ))
        .unwrap();
        let decoded: ErrorMessage = serde_cbor::from_slice(&encoded).unwrap();
        assert_eq!(decoded.error_code, 100);
        assert_eq!(decoded.previous_message_type, 30);
        assert!(decoded.to_string().contains("structurally unparseable"));
    }
}
