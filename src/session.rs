use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::time::Instant;
use log::{debug, info, warn};
use url::Url;

use crate::config::{AmbiguityPolicy, ClientConfig};
use crate::delay_manager;
use crate::error::{FetchError, FetchErrorKind, SetupError, TransportError};
use crate::form::{self, FormTokens, Landing};

/// A response as seen after redirects.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub status: u16,
    pub body: String,
}

impl Page {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The HTTP operations the search flow needs.
pub trait Transport {
    fn get(&self, url: &Url) -> Result<Page, TransportError>;
    fn post_form(&self, url: &Url, form: &[(String, String)]) -> Result<Page, TransportError>;
}

/// Blocking reqwest client with a cookie jar and pooled connections.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, SetupError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        let agent = HeaderValue::from_str(&config.user_agent).map_err(|e| SetupError::Client(e.to_string()))?;
        headers.insert(USER_AGENT, agent);

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .cookie_store(true)
            .pool_max_idle_per_host(20)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| SetupError::Client(e.to_string()))?;

        Ok(HttpTransport { client })
    }

    fn read(resp: Response) -> Result<Page, TransportError> {
        let url = resp.url().clone();
        let status = resp.status().as_u16();
        let body = resp.text().map_err(classify)?;
        Ok(Page { url, status, body })
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &Url) -> Result<Page, TransportError> {
        let resp = self.client.get(url.clone()).send().map_err(classify)?;
        Self::read(resp)
    }

    fn post_form(&self, url: &Url, form: &[(String, String)]) -> Result<Page, TransportError> {
        let resp = self.client.post(url.clone()).form(form).send().map_err(classify)?;
        Self::read(resp)
    }
}

/// A parcel detail page ready for extraction.
#[derive(Debug, Clone)]
pub struct DetailPage {
    pub url: Url,
    pub html: String,
}

/// Runs the search form flow for one APN at a time over a shared transport.
pub struct SessionClient<T = HttpTransport> {
    transport: T,
    config: ClientConfig,
    search_url: Url,
}

impl SessionClient<HttpTransport> {
    pub fn connect(config: ClientConfig) -> Result<Self, SetupError> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(transport, config)
    }
}

impl<T: Transport> SessionClient<T> {
    pub fn with_transport(transport: T, config: ClientConfig) -> Result<Self, SetupError> {
        let search_url = Url::parse(&config.search_url())
            .map_err(|e| SetupError::Client(format!("invalid search URL '{}': {}", config.search_url(), e)))?;
        Ok(SessionClient {
            transport,
            config,
            search_url,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Search page → tokens → POST → detail page. Tokens never outlive this call.
    pub fn fetch(&self, apn: &str) -> Result<DetailPage, FetchError> {
        let start = Instant::now();
        let tokens = self.load_search_page()?;
        let landing = self.submit(apn, tokens)?;
        let detail = self.resolve(apn, landing)?;
        info!("Fetched APN {} in {:.2} seconds", apn, start.elapsed().as_secs_f64());
        Ok(detail)
    }

    pub fn load_search_page(&self) -> Result<FormTokens, FetchError> {
        let page = self
            .send_with_retry("search page", || self.transport.get(&self.search_url))
            .map_err(|e| FetchError::new(FetchErrorKind::PageLoadFailed, format!("GET {}: {}", self.search_url, e)))?;
        form::extract_tokens(&page.body, &page.url, &self.config)
    }

    pub fn submit(&self, apn: &str, tokens: FormTokens) -> Result<Page, FetchError> {
        let (action, body) = tokens.into_submission(apn, &self.config);
        debug!("Submitting APN {} to {} with {} fields", apn, action, body.len());
        self.send_with_retry("search submit", || self.transport.post_form(&action, &body))
            .map_err(|e| FetchError::new(FetchErrorKind::RequestFailed, format!("POST {}: {}", action, e)))
    }

    fn resolve(&self, apn: &str, page: Page) -> Result<DetailPage, FetchError> {
        let target = match form::classify_landing(&page.body, &page.url, &self.config.detail_marker) {
            Landing::Detail => {
                return Ok(DetailPage {
                    url: page.url,
                    html: page.body,
                })
            }
            Landing::Redirect(url) => {
                debug!("Search for {} redirects to {}", apn, url);
                url
            }
            Landing::Choices(choices) => self.choose(apn, choices)?,
        };

        let detail = self
            .send_with_retry("detail page", || self.transport.get(&target))
            .map_err(|e| FetchError::new(FetchErrorKind::RequestFailed, format!("GET {}: {}", target, e)))?;
        Ok(DetailPage {
            url: detail.url,
            html: detail.body,
        })
    }

    fn choose(&self, apn: &str, mut choices: Vec<Url>) -> Result<Url, FetchError> {
        match (choices.len(), self.config.ambiguity) {
            (0, _) => Err(FetchError::new(
                FetchErrorKind::NotFound,
                format!("no parcel matched '{}'", apn),
            )),
            (1, _) => Ok(choices.remove(0)),
            (n, AmbiguityPolicy::FirstMatch) => {
                warn!("APN {} matched {} parcels, taking the first", apn, n);
                Ok(choices.remove(0))
            }
            (n, AmbiguityPolicy::Fail) => Err(FetchError::new(
                FetchErrorKind::Ambiguous,
                format!("'{}' matched {} parcels", apn, n),
            )),
        }
    }

    /// Retries timeouts, connection errors and non-2xx responses with backoff.
    fn send_with_retry<F>(&self, what: &str, send: F) -> Result<Page, TransportError>
    where
        F: Fn() -> Result<Page, TransportError>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut last_err = TransportError::Other("no attempt made".to_string());

        for attempt in 1..=attempts {
            if attempt > 1 {
                delay_manager::retry_backoff(self.config.backoff_base, attempt - 1);
            }
            let result = send().and_then(|page| {
                if page.is_success() {
                    Ok(page)
                } else {
                    Err(TransportError::Status(page.status))
                }
            });
            match result {
                Ok(page) => return Ok(page),
                Err(e) => {
                    warn!("{} attempt {}/{} failed: {}", what, attempt, attempts, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}
