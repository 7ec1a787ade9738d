//! Acquisition strategies: one way each of reaching the menu source.
//!
//! Every strategy has the same shape, `(client, target) -> Result<Fetched>`.
//! Envelope unwrapping and payload decoding happen here so that a strategy
//! whose response cannot be decoded fails like any other network error and the
//! client moves on to the next one.

use campusmenu_shared::{ContentFormat, MenuError, Result, SourceBody, StrategyConfig};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::AcquisitionTarget;

/// Maximum response size we consider valid (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// Sections of the menu API's `Menu` object that must be lists when present.
const MENU_LISTS: [&str; 3] = ["MenuPeriods", "MenuStations", "MenuProducts"];

/// A decoded payload plus the exact text it was decoded from (for hashing).
#[derive(Debug)]
pub(crate) struct Fetched {
    pub body: SourceBody,
    pub payload: String,
}

/// One way of reaching the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// GET the target URL itself.
    Direct,
    /// GET `<endpoint><encoded target>`; the payload is a string under `field`.
    EnvelopeRelay { endpoint: String, field: String },
    /// GET `<endpoint><encoded target>`; the payload is the body.
    RawRelay { endpoint: String },
    /// POST the target to a rendering service and take back Markdown.
    ScrapeService {
        endpoint: String,
        api_key: Option<String>,
        wait_for_ms: u64,
    },
}

impl Strategy {
    /// Build a strategy from config, resolving API keys from the environment.
    pub fn from_config(config: &StrategyConfig) -> Self {
        match config {
            StrategyConfig::Direct => Self::Direct,
            StrategyConfig::EnvelopeRelay { endpoint, field } => Self::EnvelopeRelay {
                endpoint: endpoint.clone(),
                field: field.clone(),
            },
            StrategyConfig::RawRelay { endpoint } => Self::RawRelay {
                endpoint: endpoint.clone(),
            },
            StrategyConfig::ScrapeService {
                endpoint,
                api_key_env,
                wait_for_ms,
            } => Self::ScrapeService {
                endpoint: endpoint.clone(),
                api_key: std::env::var(api_key_env).ok().filter(|k| !k.is_empty()),
                wait_for_ms: *wait_for_ms,
            },
        }
    }

    /// Label used in logs, attempt records, and result provenance.
    pub fn label(&self) -> String {
        match self {
            Self::Direct => "direct".to_string(),
            Self::EnvelopeRelay { endpoint, .. } => format!("envelope-relay({})", host_of(endpoint)),
            Self::RawRelay { endpoint } => format!("raw-relay({})", host_of(endpoint)),
            Self::ScrapeService { endpoint, .. } => format!("scrape-service({})", host_of(endpoint)),
        }
    }

    /// Whether this strategy can serve a target of the given format.
    ///
    /// The scrape service only renders pages, so it never serves the JSON API.
    pub fn applies_to(&self, format: ContentFormat) -> bool {
        !matches!(
            (self, format),
            (Self::ScrapeService { .. }, ContentFormat::Json)
        )
    }

    /// Run one attempt against `target`.
    pub(crate) async fn fetch(&self, client: &Client, target: &AcquisitionTarget) -> Result<Fetched> {
        let url = target.resolved_url();
        let label = self.label();

        match self {
            Self::Direct => {
                let text = get_text(client, url.as_str()).await?;
                decode(&label, target.format, text)
            }
            Self::RawRelay { endpoint } => {
                let text = get_text(client, &relay_url(endpoint, &url)).await?;
                decode(&label, target.format, text)
            }
            Self::EnvelopeRelay { endpoint, field } => {
                let text = get_text(client, &relay_url(endpoint, &url)).await?;
                let payload = unwrap_envelope(&label, &text, field)?;
                decode(&label, target.format, payload)
            }
            Self::ScrapeService {
                endpoint,
                api_key,
                wait_for_ms,
            } => {
                let api_key = api_key.as_deref().ok_or_else(|| {
                    MenuError::config(format!("{label}: no API key configured"))
                })?;
                let markdown = scrape_markdown(client, endpoint, api_key, &url, *wait_for_ms).await?;
                decode(&label, ContentFormat::Markdown, markdown)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Host part of a relay endpoint, or the endpoint itself if it does not parse.
fn host_of(endpoint: &str) -> String {
    Url::parse(endpoint)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| endpoint.to_string())
}

/// Append the percent-encoded target URL to a relay endpoint prefix.
fn relay_url(endpoint: &str, target: &Url) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_str().as_bytes()).collect();
    format!("{endpoint}{encoded}")
}

/// GET a URL and return the body of a successful, size-bounded response.
async fn get_text(client: &Client, url: &str) -> Result<String> {
    debug!(url, "GET");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| MenuError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(MenuError::Network(format!("{url}: HTTP {status}")));
    }

    read_bounded(url, response, MAX_RESPONSE_SIZE).await
}

/// Read a response body, failing once more than `limit` bytes have arrived.
///
/// `Content-Length` rejects oversized bodies up front; chunked bodies are
/// counted as they stream in.
async fn read_bounded(url: &str, mut response: Response, limit: u64) -> Result<String> {
    let too_large = |len: u64| {
        MenuError::validation(format!("{url}: response too large ({len} bytes, max {limit})"))
    };

    if let Some(len) = response.content_length() {
        if len > limit {
            return Err(too_large(len));
        }
    }

    let mut body: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| MenuError::Network(format!("{url}: failed to read body: {e}")))?
    {
        let len = (body.len() + chunk.len()) as u64;
        if len > limit {
            return Err(too_large(len));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Pull the string payload out of a `{ "<field>": "..." }` relay envelope.
fn unwrap_envelope(label: &str, body: &str, field: &str) -> Result<String> {
    let envelope: Value = serde_json::from_str(body)
        .map_err(|e| MenuError::malformed(label, format!("envelope is not JSON: {e}")))?;

    // Some relays report the upstream status alongside the payload.
    if let Some(code) = envelope.pointer("/status/http_code").and_then(Value::as_u64) {
        if code >= 400 {
            return Err(MenuError::Network(format!("{label}: upstream HTTP {code}")));
        }
    }

    envelope
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| MenuError::malformed(label, format!("missing string field `{field}`")))
}

/// Decode a payload into the body shape the target expects.
fn decode(label: &str, format: ContentFormat, payload: String) -> Result<Fetched> {
    if payload.trim().is_empty() {
        return Err(MenuError::malformed(label, "empty payload"));
    }

    let body = match format {
        ContentFormat::Html => SourceBody::Html(payload.clone()),
        ContentFormat::Markdown => SourceBody::Markdown(payload.clone()),
        ContentFormat::Json => {
            let value: Value = serde_json::from_str(&payload)
                .map_err(|e| MenuError::malformed(label, format!("payload is not JSON: {e}")))?;
            check_menu_shape(label, &value)?;
            SourceBody::Json(value)
        }
    };

    Ok(Fetched { body, payload })
}

/// Reject JSON that parsed but is not a menu API response (an error string
/// from a relay, a rate-limit object, a `Menu` of the wrong type).
fn check_menu_shape(label: &str, value: &Value) -> Result<()> {
    let menu = value
        .get("Menu")
        .and_then(Value::as_object)
        .ok_or_else(|| MenuError::malformed(label, "payload is not a menu API response"))?;

    for key in MENU_LISTS {
        match menu.get(key) {
            None | Some(Value::Null) | Some(Value::Array(_)) => {}
            Some(_) => {
                return Err(MenuError::malformed(label, format!("`Menu.{key}` is not a list")));
            }
        }
    }
    Ok(())
}

/// Ask a Firecrawl-style service to render `target` and return its Markdown.
async fn scrape_markdown(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    target: &Url,
    wait_for_ms: u64,
) -> Result<String> {
    let request = serde_json::json!({
        "url": target.as_str(),
        "formats": ["markdown"],
        "waitFor": wait_for_ms,
    });

    debug!(endpoint, %target, "POST scrape request");
    let response = client
        .post(endpoint)
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .await
        .map_err(|e| MenuError::Network(format!("{endpoint}: {e}")))?;

    let status = response.status();
    let text = read_bounded(endpoint, response, MAX_RESPONSE_SIZE).await?;

    let label = format!("scrape-service({})", host_of(endpoint));
    let body: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(_) if !status.is_success() => {
            return Err(MenuError::Network(format!("{endpoint}: HTTP {status}")));
        }
        Err(e) => {
            return Err(MenuError::malformed(label, format!("response is not JSON: {e}")));
        }
    };

    let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
    if !status.is_success() || !success {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}"));
        return Err(MenuError::ScrapeFailed { message });
    }

    body.pointer("/data/markdown")
        .or_else(|| body.get("markdown"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| MenuError::malformed(label, "no markdown in scrape response"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_name_the_relay_host() {
        assert_eq!(Strategy::Direct.label(), "direct");
        let relay = Strategy::RawRelay {
            endpoint: "https://api.allorigins.win/raw?url=".into(),
        };
        assert_eq!(relay.label(), "raw-relay(api.allorigins.win)");
    }

    #[test]
    fn relay_url_encodes_target() {
        let target = Url::parse("https://dining.example.edu/menu?date=02/14/2026").unwrap();
        let url = relay_url("https://relay.example.com/get?url=", &target);
        assert_eq!(
            url,
            "https://relay.example.com/get?url=https%3A%2F%2Fdining.example.edu%2Fmenu%3Fdate%3D02%2F14%2F2026"
        );
    }

    #[test]
    fn envelope_unwraps_contents() {
        let payload = unwrap_envelope("relay", r#"{"contents": "<html></html>"}"#, "contents")
            .expect("unwrap");
        assert_eq!(payload, "<html></html>");
    }

    #[test]
    fn envelope_without_field_is_malformed() {
        let err = unwrap_envelope("relay", r#"{"data": "x"}"#, "contents").unwrap_err();
        assert!(matches!(err, MenuError::MalformedEnvelope { .. }));

        let err = unwrap_envelope("relay", "<html>blocked</html>", "contents").unwrap_err();
        assert!(matches!(err, MenuError::MalformedEnvelope { .. }));
    }

    #[test]
    fn envelope_reports_upstream_status() {
        let body = r#"{"contents": "Not Found", "status": {"http_code": 404}}"#;
        let err = unwrap_envelope("relay", body, "contents").unwrap_err();
        assert!(err.to_string().contains("upstream HTTP 404"));
    }

    #[test]
    fn json_target_requires_json_payload() {
        let err = decode("direct", ContentFormat::Json, "<html></html>".into()).unwrap_err();
        assert!(matches!(err, MenuError::MalformedEnvelope { .. }));

        let ok = decode("direct", ContentFormat::Json, r#"{"Menu": {}}"#.into()).expect("decode");
        assert_eq!(ok.body.format(), ContentFormat::Json);
    }

    #[test]
    fn json_that_is_not_a_menu_is_malformed() {
        for payload in [
            r#""rate limited""#,
            r#"{"error": "too many requests"}"#,
            r#"{"Menu": 5}"#,
            r#"{"Menu": {"MenuProducts": {"0": {}}}}"#,
        ] {
            let err = decode("direct", ContentFormat::Json, payload.into()).unwrap_err();
            assert!(matches!(err, MenuError::MalformedEnvelope { .. }), "payload {payload}");
        }

        let ok = decode(
            "direct",
            ContentFormat::Json,
            r#"{"Menu": {"MenuProducts": [], "MenuStations": null}}"#.into(),
        );
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn chunked_body_over_the_limit_is_rejected() {
        use wiremock::matchers::path;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64)))
            .mount(&server)
            .await;

        let url = format!("{}/big", server.uri());
        let response = Client::new().get(&url).send().await.unwrap();
        let err = read_bounded(&url, response, 16).await.unwrap_err();
        assert!(err.to_string().contains("response too large"));

        let response = Client::new().get(&url).send().await.unwrap();
        let body = read_bounded(&url, response, 64).await.unwrap();
        assert_eq!(body.len(), 64);
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(decode("direct", ContentFormat::Html, "   \n".into()).is_err());
    }

    #[test]
    fn scrape_service_never_serves_json() {
        let scrape = Strategy::ScrapeService {
            endpoint: "https://scrape.example.com/v1/scrape".into(),
            api_key: None,
            wait_for_ms: 0,
        };
        assert!(scrape.applies_to(ContentFormat::Html));
        assert!(!scrape.applies_to(ContentFormat::Json));
        assert!(Strategy::Direct.applies_to(ContentFormat::Json));
    }
}
