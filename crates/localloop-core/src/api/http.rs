//! Low-level JSON request helpers shared by the session manager and the
//! REST client.

use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{Error, Result};

pub(crate) fn build_http_client(config: &ClientConfig) -> Result<Client> {
    Ok(Client::builder().timeout(config.request_timeout()).build()?)
}

/// POST a JSON body and decode the JSON answer.
pub(crate) async fn post_json<B, R>(
    client: &Client,
    url: &str,
    body: &B,
    bearer: Option<&str>,
) -> Result<R>
where
    B: Serialize + ?Sized + Sync,
    R: DeserializeOwned,
{
    let mut request = client.post(url).json(body);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    let text = send_request(request).await?;
    decode_body(&text)
}

/// Send a request and return the raw body of a successful answer.
pub(crate) async fn send_request(request: RequestBuilder) -> Result<String> {
    let response = request.header(ACCEPT, "application/json").send().await?;
    let status = response.status();
    let text = response.text().await?;
    if status.is_success() {
        Ok(text)
    } else {
        Err(Error::from_status(status, &text))
    }
}

/// Decode a successful body.
///
/// Concept actions report domain failures as a 2xx `{ "error": "..." }`
/// object; those are surfaced as validation errors.
pub(crate) fn decode_body<R: DeserializeOwned>(text: &str) -> Result<R> {
    let value: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(text)?
    };
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Err(Error::Api {
            status: 400,
            message: message.trim().to_string(),
        });
    }
    Ok(serde_json::from_value(value)?)
}
