use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://maps.clarkcountynv.gov/assessor/AssessorParcelDetail/";
pub const DEFAULT_OUTPUT: &str = "data/output/scraped_properties.csv";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// What to do when a search lands on a page listing several parcels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguityPolicy {
    #[default]
    Fail,
    FirstMatch,
}

/// Settings for the session client and the site's form flow.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub search_path: String,
    /// Substring identifying the parcel detail page in URLs and links.
    pub detail_marker: String,
    pub apn_field: String,
    pub extra_fields: Vec<(String, String)>,
    pub required_tokens: Vec<String>,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub user_agent: String,
    pub verify_tls: bool,
    pub ambiguity: AmbiguityPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            search_path: "pcl.aspx".to_string(),
            detail_marker: "ParcelDetail.aspx".to_string(),
            apn_field: "tbParcel".to_string(),
            extra_fields: vec![
                ("btnSubmit".to_string(), "Submit".to_string()),
                ("r1".to_string(), "pcl7".to_string()),
            ],
            required_tokens: vec!["__VIEWSTATE".to_string()],
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_base: Duration::from_millis(300),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            verify_tls: false,
            ambiguity: AmbiguityPolicy::Fail,
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        self.base_url = base_url;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn with_ambiguity(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity = policy;
        self
    }

    pub fn search_url(&self) -> String {
        format!("{}{}", self.base_url, self.search_path)
    }
}

/// Per-run settings handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub column: String,
    pub batch_size: usize,
    pub streaming: bool,
    pub append: bool,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("input.csv"),
            output: PathBuf::from(DEFAULT_OUTPUT),
            column: "APN".to_string(),
            batch_size: 50,
            streaming: true,
            append: false,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

impl RunConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn with_delay(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max.max(min);
        self
    }
}
