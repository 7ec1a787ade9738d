//! Menu source acquisition through an ordered list of fallback strategies.
//!
//! The dining-hall page (or its JSON API) is often unreachable directly, so the
//! [`SourceClient`] walks a fixed list of [`Strategy`] values (direct fetch,
//! relays, a rendering service) and returns the first well-formed payload.
//! Only exhaustion of the whole list is surfaced as an error.

mod strategy;

use std::future::Future;
use std::time::Duration;

use campusmenu_shared::{
    ContentFormat, MenuError, RawSourceContent, Result, SourceConfig, StrategyFailure,
};
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use strategy::Strategy;

/// Maximum number of redirects to follow on any strategy.
const MAX_REDIRECTS: usize = 5;

/// User-Agent string for acquisition requests.
const USER_AGENT: &str = concat!("campusmenu/", env!("CARGO_PKG_VERSION"));

/// Date format the menu API expects.
const API_DATE_FORMAT: &str = "%m/%d/%Y";

// ---------------------------------------------------------------------------
// AcquisitionTarget
// ---------------------------------------------------------------------------

/// What to fetch: a URL, the content shape expected back, and query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionTarget {
    /// Base URL of the page or API endpoint.
    pub url: Url,
    /// Shape the direct/relay strategies should decode the payload into.
    pub format: ContentFormat,
    /// Extra query parameters, appended in order.
    pub params: Vec<(String, String)>,
    /// Menu date; sent as `MM/DD/YYYY` on JSON API targets.
    pub date: Option<NaiveDate>,
    /// Query parameter name for the date.
    pub date_param: String,
}

impl AcquisitionTarget {
    /// A target of the given format with no parameters.
    pub fn new(url: Url, format: ContentFormat) -> Self {
        Self {
            url,
            format,
            params: Vec::new(),
            date: None,
            date_param: "date".to_string(),
        }
    }

    /// The HTML menu page.
    pub fn page(url: Url) -> Self {
        Self::new(url, ContentFormat::Html)
    }

    /// The JSON menu API.
    pub fn api(url: Url) -> Self {
        Self::new(url, ContentFormat::Json)
    }

    /// Request the menu for a specific date.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Append a query parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Build the page target (or the API target when `api` is set) from config.
    pub fn from_config(config: &SourceConfig, api: bool) -> Result<Self> {
        let mut target = if api {
            let raw = config
                .api_url
                .as_deref()
                .ok_or_else(|| MenuError::config("[source] api_url is not set"))?;
            let url = Url::parse(raw)
                .map_err(|e| MenuError::config(format!("invalid api_url '{raw}': {e}")))?;
            let mut target = Self::api(url);
            for (k, v) in &config.api_params {
                target = target.with_param(k, v);
            }
            target
        } else {
            let raw = &config.page_url;
            let url = Url::parse(raw)
                .map_err(|e| MenuError::config(format!("invalid page_url '{raw}': {e}")))?;
            Self::page(url)
        };
        target.date_param = config.date_param.clone();
        Ok(target)
    }

    /// The URL actually requested, with parameters and (API only) the date.
    pub fn resolved_url(&self) -> Url {
        let date = match (self.format, self.date) {
            (ContentFormat::Json, Some(d)) => Some(d.format(API_DATE_FORMAT).to_string()),
            _ => None,
        };

        if self.params.is_empty() && date.is_none() {
            return self.url.clone();
        }

        let mut url = self.url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.params {
                pairs.append_pair(k, v);
            }
            if let Some(d) = &date {
                pairs.append_pair(&self.date_param, d);
            }
        }
        url
    }
}

/// Parse a user-supplied date as `YYYY-MM-DD` or `MM/DD/YYYY`.
pub fn parse_menu_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(input, API_DATE_FORMAT))
        .map_err(|_| {
            MenuError::validation(format!(
                "'{input}' is not a date (expected YYYY-MM-DD or MM/DD/YYYY)"
            ))
        })
}

// ---------------------------------------------------------------------------
// SourceClient
// ---------------------------------------------------------------------------

/// Ordered-fallback acquisition client. Holds no mutable state, so one client
/// can serve concurrent runs.
#[derive(Debug, Clone)]
pub struct SourceClient {
    client: Client,
    strategies: Vec<Strategy>,
    attempt_timeout: Duration,
}

impl SourceClient {
    /// Create a client that tries `strategies` in order, bounding each attempt.
    pub fn new(strategies: Vec<Strategy>, attempt_timeout: Duration) -> Result<Self> {
        if strategies.is_empty() {
            return Err(MenuError::config("at least one acquisition strategy is required"));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| MenuError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            strategies,
            attempt_timeout,
        })
    }

    /// Create a client from the `[source]` config section.
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let strategies = config.strategies.iter().map(Strategy::from_config).collect();
        Self::new(strategies, Duration::from_secs(config.timeout_secs))
    }

    /// The configured strategies, in trial order.
    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Acquire the target, falling back through the strategy list.
    pub async fn acquire(&self, target: &AcquisitionTarget) -> Result<RawSourceContent> {
        self.acquire_until(target, std::future::pending()).await
    }

    /// Like [`acquire`](Self::acquire), but gives up with [`MenuError::Cancelled`]
    /// as soon as `cancel` resolves. The strategy in flight is abandoned and no
    /// later strategy is started.
    #[instrument(skip_all, fields(url = %target.url, format = %target.format))]
    pub async fn acquire_until<C>(
        &self,
        target: &AcquisitionTarget,
        cancel: C,
    ) -> Result<RawSourceContent>
    where
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let mut attempts: Vec<StrategyFailure> = Vec::new();
        let mut skipped: Vec<StrategyFailure> = Vec::new();

        for strategy in &self.strategies {
            let label = strategy.label();

            if !strategy.applies_to(target.format) {
                debug!(strategy = %label, "strategy does not serve this format, skipping");
                skipped.push(StrategyFailure {
                    strategy: label,
                    reason: format!("does not serve {} targets", target.format),
                });
                continue;
            }

            debug!(strategy = %label, "trying strategy");
            let attempt = tokio::time::timeout(
                self.attempt_timeout,
                strategy.fetch(&self.client, target),
            );

            let outcome = tokio::select! {
                biased;
                () = &mut cancel => {
                    info!(strategy = %label, "acquisition cancelled");
                    return Err(MenuError::Cancelled);
                }
                outcome = attempt => outcome,
            };

            let reason = match outcome {
                Ok(Ok(fetched)) => {
                    info!(
                        strategy = %label,
                        failed_before = attempts.len(),
                        bytes = fetched.payload.len(),
                        "source acquired"
                    );
                    return Ok(RawSourceContent {
                        body: fetched.body,
                        retrieved_at: Utc::now(),
                        strategy: label,
                        content_hash: compute_hash(&fetched.payload),
                        prior_failures: attempts,
                    });
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {}ms", self.attempt_timeout.as_millis()),
            };

            warn!(strategy = %label, %reason, "strategy failed");
            attempts.push(StrategyFailure {
                strategy: label,
                reason,
            });
        }

        // Skips only explain an exhausted run; a success lists real attempts.
        warn!(
            attempts = attempts.len(),
            skipped = skipped.len(),
            "all acquisition strategies failed"
        );
        attempts.extend(skipped);
        Err(MenuError::SourceUnavailable { attempts })
    }
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use campusmenu_shared::{FailureKind, SourceBody};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = "<html><body><h2>Grill</h2></body></html>";

    fn page_target(server: &MockServer) -> AcquisitionTarget {
        AcquisitionTarget::page(Url::parse(&format!("{}/menu", server.uri())).unwrap())
    }

    fn relay(server: &MockServer, route: &str) -> String {
        format!("{}{route}?url=", server.uri())
    }

    fn client(strategies: Vec<Strategy>) -> SourceClient {
        SourceClient::new(strategies, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn api_target_sends_date_in_us_format() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        let target = AcquisitionTarget::api(Url::parse("https://dining.example.edu/api/menu").unwrap())
            .with_param("locationId", "42")
            .with_date(date);
        let url = target.resolved_url();
        assert_eq!(
            url.as_str(),
            "https://dining.example.edu/api/menu?locationId=42&date=02%2F14%2F2026"
        );
    }

    #[test]
    fn page_target_ignores_date() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        let target = AcquisitionTarget::page(Url::parse("https://dining.example.edu/menu").unwrap())
            .with_date(date);
        assert_eq!(target.resolved_url().as_str(), "https://dining.example.edu/menu");
    }

    #[test]
    fn menu_dates_parse_in_both_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        assert_eq!(parse_menu_date("2026-02-14").unwrap(), expected);
        assert_eq!(parse_menu_date("02/14/2026").unwrap(), expected);
        assert!(parse_menu_date("14.02.2026").is_err());
    }

    #[test]
    fn target_from_config_requires_api_url() {
        let config = SourceConfig::default();
        assert!(AcquisitionTarget::from_config(&config, true).is_err());

        let page = AcquisitionTarget::from_config(&config, false).unwrap();
        assert_eq!(page.format, ContentFormat::Html);
    }

    #[test]
    fn empty_strategy_list_is_rejected() {
        assert!(SourceClient::new(Vec::new(), Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn direct_fetch_wins_when_available() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/menu"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let content = client(vec![Strategy::Direct])
            .acquire(&page_target(&server))
            .await
            .unwrap();

        assert_eq!(content.body, SourceBody::Html(PAGE.into()));
        assert_eq!(content.strategy, "direct");
        assert!(content.prior_failures.is_empty());
        assert_eq!(content.content_hash, compute_hash(PAGE));
    }

    #[tokio::test]
    async fn falls_back_after_server_error() {
        let server = MockServer::start().await;
        let target = page_target(&server);

        Mock::given(method("GET"))
            .and(path("/menu"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/raw"))
            .and(query_param("url", target.url.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let relay_only = Strategy::RawRelay {
            endpoint: relay(&server, "/raw"),
        };
        let alone = client(vec![relay_only.clone()]).acquire(&target).await.unwrap();
        let content = client(vec![Strategy::Direct, relay_only.clone()])
            .acquire(&target)
            .await
            .unwrap();

        assert_eq!(content.body, alone.body);
        assert_eq!(content.strategy, alone.strategy);
        assert_eq!(content.content_hash, alone.content_hash);
        assert_eq!(content.prior_failures.len(), 1);
        assert_eq!(content.prior_failures[0].strategy, "direct");
        assert!(content.prior_failures[0].reason.contains("500"));
    }

    #[tokio::test]
    async fn envelope_relay_decodes_contents() {
        let server = MockServer::start().await;
        let target = page_target(&server);

        Mock::given(method("GET"))
            .and(path("/get"))
            .and(query_param("url", target.url.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "contents": PAGE, "status": { "http_code": 200 } })),
            )
            .mount(&server)
            .await;

        let content = client(vec![Strategy::EnvelopeRelay {
            endpoint: relay(&server, "/get"),
            field: "contents".into(),
        }])
        .acquire(&target)
        .await
        .unwrap();

        assert_eq!(content.body, SourceBody::Html(PAGE.into()));
    }

    #[tokio::test]
    async fn envelope_relay_double_decodes_json_payload() {
        let server = MockServer::start().await;
        let target = AcquisitionTarget::api(Url::parse(&format!("{}/api", server.uri())).unwrap());
        let payload = r#"{"SelectedPeriodId": 7, "Menu": {"MenuProducts": []}}"#;

        Mock::given(method("GET"))
            .and(path("/get"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "contents": payload })),
            )
            .mount(&server)
            .await;

        let content = client(vec![Strategy::EnvelopeRelay {
            endpoint: relay(&server, "/get"),
            field: "contents".into(),
        }])
        .acquire(&target)
        .await
        .unwrap();

        match content.body {
            SourceBody::Json(v) => assert_eq!(v["SelectedPeriodId"], 7),
            other => panic!("expected JSON body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhaustion_reports_every_attempt() {
        let server = MockServer::start().await;
        let target = page_target(&server);

        Mock::given(path("/menu"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(path("/get"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>captcha</html>"))
            .mount(&server)
            .await;
        Mock::given(path("/raw"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(vec![
            Strategy::Direct,
            Strategy::EnvelopeRelay {
                endpoint: relay(&server, "/get"),
                field: "contents".into(),
            },
            Strategy::RawRelay {
                endpoint: relay(&server, "/raw"),
            },
        ])
        .acquire(&target)
        .await
        .unwrap_err();

        assert_eq!(err.kind(), FailureKind::SourceUnavailable);
        let attempts = err.attempts();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].strategy, "direct");
        assert!(attempts[1].reason.contains("envelope is not JSON"));
        assert!(attempts[2].reason.contains("404"));
    }

    #[tokio::test]
    async fn hung_strategy_times_out_and_next_is_tried() {
        let server = MockServer::start().await;
        let target = page_target(&server);

        Mock::given(path("/menu"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(PAGE)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;
        Mock::given(path("/raw"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let client = SourceClient::new(
            vec![
                Strategy::Direct,
                Strategy::RawRelay {
                    endpoint: relay(&server, "/raw"),
                },
            ],
            Duration::from_millis(300),
        )
        .unwrap();

        let content = client.acquire(&target).await.unwrap();
        assert!(content.strategy.starts_with("raw-relay"));
        assert!(content.prior_failures[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn cancellation_does_not_fall_through() {
        let server = MockServer::start().await;
        let target = page_target(&server);

        Mock::given(path("/menu"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(PAGE)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;
        Mock::given(path("/raw"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(0)
            .mount(&server)
            .await;

        let client = client(vec![
            Strategy::Direct,
            Strategy::RawRelay {
                endpoint: relay(&server, "/raw"),
            },
        ]);

        let cancel = tokio::time::sleep(Duration::from_millis(200));
        let err = client.acquire_until(&target, cancel).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Cancelled);
    }

    #[tokio::test]
    async fn scrape_service_returns_markdown() {
        let server = MockServer::start().await;
        let target = page_target(&server);

        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({ "formats": ["markdown"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "markdown": "## Grill\n### Salmon\n320 Calories\n" }
            })))
            .mount(&server)
            .await;

        let content = client(vec![Strategy::ScrapeService {
            endpoint: format!("{}/v1/scrape", server.uri()),
            api_key: Some("test-key".into()),
            wait_for_ms: 0,
        }])
        .acquire(&target)
        .await
        .unwrap();

        assert_eq!(content.format(), ContentFormat::Markdown);
    }

    #[tokio::test]
    async fn scrape_service_failure_is_recorded() {
        let server = MockServer::start().await;
        let target = page_target(&server);

        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .respond_with(ResponseTemplate::new(402).set_body_json(serde_json::json!({
                "success": false,
                "error": "Payment required"
            })))
            .mount(&server)
            .await;

        let err = client(vec![
            Strategy::ScrapeService {
                endpoint: format!("{}/v1/scrape", server.uri()),
                api_key: Some("test-key".into()),
                wait_for_ms: 0,
            },
            Strategy::ScrapeService {
                endpoint: format!("{}/v1/scrape", server.uri()),
                api_key: None,
                wait_for_ms: 0,
            },
        ])
        .acquire(&target)
        .await
        .unwrap_err();

        let attempts = err.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[0].reason.contains("Payment required"));
        assert!(attempts[1].reason.contains("no API key"));
    }

    #[tokio::test]
    async fn non_menu_json_falls_through_to_next_strategy() {
        let server = MockServer::start().await;
        let target = AcquisitionTarget::api(Url::parse(&format!("{}/api", server.uri())).unwrap());

        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!("rate limited")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/raw"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Menu": { "MenuProducts": [{ "Product": { "MarketingName": "Oatmeal" } }] }
            })))
            .mount(&server)
            .await;

        let content = client(vec![
            Strategy::Direct,
            Strategy::RawRelay {
                endpoint: relay(&server, "/raw"),
            },
        ])
        .acquire(&target)
        .await
        .unwrap();

        assert!(content.strategy.starts_with("raw-relay"));
        assert_eq!(content.prior_failures.len(), 1);
        assert_eq!(content.prior_failures[0].strategy, "direct");
        assert!(content.prior_failures[0].reason.contains("not a menu API response"));
    }

    #[tokio::test]
    async fn skipped_strategies_explain_exhaustion() {
        let server = MockServer::start().await;
        let target = AcquisitionTarget::api(Url::parse(&format!("{}/api", server.uri())).unwrap());

        let err = client(vec![Strategy::ScrapeService {
            endpoint: format!("{}/v1/scrape", server.uri()),
            api_key: Some("k".into()),
            wait_for_ms: 0,
        }])
        .acquire(&target)
        .await
        .unwrap_err();

        assert_eq!(err.kind(), FailureKind::SourceUnavailable);
        let attempts = err.attempts();
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].strategy.starts_with("scrape-service"));
        assert_eq!(attempts[0].reason, "does not serve json targets");
    }

    #[tokio::test]
    async fn skipped_strategies_stay_out_of_a_successful_log() {
        let server = MockServer::start().await;
        let target = AcquisitionTarget::api(Url::parse(&format!("{}/api", server.uri())).unwrap());

        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "Menu": {} })))
            .mount(&server)
            .await;

        let content = client(vec![
            Strategy::ScrapeService {
                endpoint: format!("{}/v1/scrape", server.uri()),
                api_key: Some("k".into()),
                wait_for_ms: 0,
            },
            Strategy::Direct,
        ])
        .acquire(&target)
        .await
        .unwrap();

        assert_eq!(content.strategy, "direct");
        assert!(content.prior_failures.is_empty());
    }
}
