use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::config::BlobClientConfig;
use crate::error::TransportError;

/// Request body for an upload: payload bytes, base64 encoded.
#[derive(Debug, Serialize)]
struct UploadRequest {
    data: String,
}

/// HTTP client for the remote blob API.
///
/// `upload` posts `{data}` to the collection and reads back an `id`
/// (or `cid`) field; `download` reads `{collection}/{address}` and
/// decodes its `data` field. Payloads are opaque bytes at this layer.
#[derive(Debug, Clone)]
pub struct BlobClient {
    http: reqwest::Client,
    collection: Url,
    token: String,
    request_timeout: std::time::Duration,
}

impl BlobClient {
    /// Build a client from config. Fails on an unparseable endpoint.
    pub fn new(config: BlobClientConfig) -> Result<Self, TransportError> {
        let mut collection = Url::parse(&config.endpoint)
            .map_err(|e| TransportError::Config(format!("endpoint {:?}: {e}", config.endpoint)))?;
        if collection.cannot_be_a_base() {
            return Err(TransportError::Config(format!(
                "endpoint {:?} cannot carry a path",
                config.endpoint
            )));
        }
        if let Ok(mut segments) = collection.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(config.data_path.split('/').filter(|s| !s.is_empty()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            collection,
            token: config.token,
            request_timeout: config.request_timeout,
        })
    }

    /// URL of the blob collection (uploads are posted here).
    pub fn collection_url(&self) -> &Url {
        &self.collection
    }

    /// Upload opaque bytes, returning the identifier assigned by the remote.
    pub async fn upload(&self, payload: &[u8]) -> Result<String, TransportError> {
        let url = self.collection.clone();
        let body = UploadRequest {
            data: BASE64.encode(payload),
        };

        let response = self
            .authorized(self.http.post(url.clone()).json(&body))
            .send()
            .await
            .map_err(|e| self.send_error(&url, e))?;
        let value = self.read_json(&url, response).await?;
        let id = parse_upload_response(&value)?;

        tracing::debug!(address = %id, bytes = payload.len(), "blob uploaded");
        Ok(id)
    }

    /// Download the payload stored under `address`.
    pub async fn download(&self, address: &str) -> Result<Vec<u8>, TransportError> {
        let url = self.blob_url(address);

        let response = self
            .authorized(self.http.get(url.clone()))
            .send()
            .await
            .map_err(|e| self.send_error(&url, e))?;
        let value = self.read_json(&url, response).await?;
        let data = parse_download_response(&value)?;

        tracing::debug!(address, bytes = data.len(), "blob downloaded");
        Ok(data)
    }

    fn blob_url(&self, address: &str) -> Url {
        let mut url = self.collection.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(address);
        }
        url
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }

    fn send_error(&self, url: &Url, source: reqwest::Error) -> TransportError {
        if source.is_timeout() {
            TransportError::Timeout {
                endpoint: url.to_string(),
                after: self.request_timeout,
            }
        } else {
            TransportError::Unavailable {
                endpoint: url.to_string(),
                source,
            }
        }
    }

    async fn read_json(&self, url: &Url, response: reqwest::Response) -> Result<Value, TransportError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.json::<Value>().await.map_err(|e| {
            if e.is_decode() {
                TransportError::protocol(format!("response body is not JSON: {e}"))
            } else {
                self.send_error(url, e)
            }
        })
    }
}

/// Extract the content address from an upload response.
///
/// `id` wins over `cid`; empty strings count as absent.
pub fn parse_upload_response(value: &Value) -> Result<String, TransportError> {
    ["id", "cid"]
        .iter()
        .filter_map(|field| value.get(*field).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TransportError::protocol("upload response has no id or cid field"))
}

/// Extract the payload bytes from a download response.
///
/// Accepts `data` as a base64 string, a JSON array of bytes, or a
/// serialized Node buffer (`{"type": "Buffer", "data": [..]}`).
pub fn parse_download_response(value: &Value) -> Result<Vec<u8>, TransportError> {
    let data = value
        .get("data")
        .filter(|v| !v.is_null())
        .ok_or_else(|| TransportError::protocol("download response has no data field"))?;
    decode_data(data, true)
}

fn decode_data(data: &Value, allow_nested: bool) -> Result<Vec<u8>, TransportError> {
    match data {
        Value::String(encoded) => BASE64
            .decode(encoded)
            .map_err(|e| TransportError::protocol(format!("data field is not base64: {e}"))),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| TransportError::protocol("data array holds a non-byte value"))
            })
            .collect(),
        Value::Object(_) if allow_nested => match data.get("data") {
            Some(inner) => decode_data(inner, false),
            None => Err(TransportError::protocol("data object has no inner data field")),
        },
        _ => Err(TransportError::protocol("data field has an unsupported shape")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upload_prefers_id_over_cid() {
        let value = json!({"id": "abc", "cid": "bafy"});
        assert_eq!(parse_upload_response(&value).unwrap(), "abc");
    }

    #[test]
    fn upload_falls_back_to_cid() {
        let value = json!({"cid": "bafy"});
        assert_eq!(parse_upload_response(&value).unwrap(), "bafy");

        let value = json!({"id": "", "cid": "bafy"});
        assert_eq!(parse_upload_response(&value).unwrap(), "bafy");
    }

    #[test]
    fn upload_without_identifier_is_protocol_error() {
        let err = parse_upload_response(&json!({"ok": true})).unwrap_err();
        assert!(matches!(err, TransportError::Protocol { .. }));
    }

    #[test]
    fn download_base64() {
        let value = json!({"data": BASE64.encode(b"hello")});
        assert_eq!(parse_download_response(&value).unwrap(), b"hello");
    }

    #[test]
    fn download_byte_array_and_node_buffer() {
        let value = json!({"data": [104, 105]});
        assert_eq!(parse_download_response(&value).unwrap(), b"hi");

        let value = json!({"data": {"type": "Buffer", "data": [1, 2, 3]}});
        assert_eq!(parse_download_response(&value).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn download_missing_or_bad_data() {
        for value in [
            json!({}),
            json!({"data": null}),
            json!({"data": "***not base64***"}),
            json!({"data": [1, 300]}),
            json!({"data": 42}),
            json!({"data": {"data": {"data": [1]}}}),
        ] {
            let err = parse_download_response(&value).unwrap_err();
            assert!(matches!(err, TransportError::Protocol { .. }), "{value}");
        }
    }

    #[test]
    fn blob_url_appends_address() {
        let client = BlobClient::new(
            BlobClientConfig::new()
                .endpoint("https://store.example/api/")
                .data_path("/data"),
        )
        .unwrap();
        assert_eq!(client.collection_url().as_str(), "https://store.example/api/data");
        assert_eq!(
            client.blob_url("bafy123").as_str(),
            "https://store.example/api/data/bafy123"
        );
    }

    #[test]
    fn bad_endpoint_is_config_error() {
        let err = BlobClient::new(BlobClientConfig::new().endpoint("not a url")).unwrap_err();
        assert!(matches!(err, TransportError::Config(_)));

        let err = BlobClient::new(BlobClientConfig::new().endpoint("mailto:x@y")).unwrap_err();
        assert!(matches!(err, TransportError::Config(_)));
    }
}
