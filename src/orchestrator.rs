use std::time::{Duration, Instant};
use log::{error, info, warn};

use crate::config::RunConfig;
use crate::delay_manager;
use crate::error::{FetchError, RunError};
use crate::extractor::Extractor;
use crate::input_loader;
use crate::output::{OutputWriter, WriteMode};
use crate::property::{PropertyRecord, Status};
use crate::session::{SessionClient, Transport};

/// Why an APN ended up without data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    InvalidApn,
    Fetch(FetchError),
    Extraction,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::InvalidApn => f.write_str("InvalidApn"),
            Failure::Fetch(e) => write!(f, "{}", e),
            Failure::Extraction => f.write_str("NoDataFound"),
        }
    }
}

/// Outcome of a single APN, handed to the writer.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub record: PropertyRecord,
    pub failure: Option<Failure>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64 * 100.0
        }
    }
}

/// Sequential APN loop: fetch, parse, record, repeat.
pub struct Orchestrator<'a, T: Transport> {
    session: &'a SessionClient<T>,
    extractor: Extractor,
    config: RunConfig,
}

impl<'a, T: Transport> Orchestrator<'a, T> {
    pub fn new(session: &'a SessionClient<T>, config: RunConfig) -> Self {
        Orchestrator {
            session,
            extractor: Extractor::new(),
            config,
        }
    }

    /// Loads the input, then processes every APN in order. Only setup and
    /// output failures end the run early.
    pub fn run(&self) -> Result<RunSummary, RunError> {
        let apns = input_loader::load_apns(&self.config.input, &self.config.column)?;

        let mode = if self.config.streaming {
            WriteMode::Streaming
        } else {
            WriteMode::Batched {
                batch_size: self.config.batch_size,
            }
        };
        let mut writer = OutputWriter::open(&self.config.output, mode, self.config.append)?;

        info!("Starting to scrape {} properties", apns.len());
        let start = Instant::now();
        let mut summary = RunSummary {
            total: apns.len(),
            ..Default::default()
        };

        for (i, raw) in apns.iter().enumerate() {
            if i > 0 {
                delay_manager::random_request_delay(self.config.min_delay, self.config.max_delay);
            }
            info!("Processing {} / {} : {}", i + 1, apns.len(), raw);

            let outcome = self.process(raw);
            match &outcome.failure {
                None => summary.succeeded += 1,
                Some(failure) => {
                    summary.failed += 1;
                    error!("APN {} failed: {}", outcome.record.apn, failure);
                }
            }
            writer.write(outcome.record)?;

            let done = i + 1;
            let elapsed = start.elapsed();
            info!(
                "Progress: {}/{} - elapsed {:.1}s - avg {:.2}s/APN - success rate {:.1}%",
                done,
                apns.len(),
                elapsed.as_secs_f64(),
                elapsed.as_secs_f64() / done as f64,
                summary.succeeded as f64 / done as f64 * 100.0
            );
        }

        writer.finish()?;
        summary.elapsed = start.elapsed();
        log_summary(&summary);
        Ok(summary)
    }

    /// Pending -> Fetching -> Parsing -> Recorded. Never fails: errors become records.
    pub fn process(&self, raw: &str) -> Outcome {
        let apn = input_loader::format_apn(raw);

        if !input_loader::is_valid_apn(&apn) {
            warn!("APN '{}' is not an 11-digit parcel number, skipping lookup", raw);
            return Outcome {
                record: PropertyRecord::failed(apn, Status::NotFound),
                failure: Some(Failure::InvalidApn),
            };
        }

        let page = match self.session.fetch(&apn) {
            Ok(page) => page,
            Err(e) => {
                return Outcome {
                    record: PropertyRecord::failed(apn, Status::Error),
                    failure: Some(Failure::Fetch(e)),
                }
            }
        };

        match self.extractor.parse(&page.html) {
            Ok(data) => {
                if let Some(parcel) = data.parcel.as_deref() {
                    if digits(parcel) != digits(&apn) {
                        warn!("Page for APN {} reports parcel {}", apn, parcel);
                    }
                }
                info!("Successfully scraped {}", apn);
                Outcome {
                    record: PropertyRecord::from_extracted(apn, data),
                    failure: None,
                }
            }
            Err(_) => Outcome {
                record: PropertyRecord::failed(apn, Status::Error),
                failure: Some(Failure::Extraction),
            },
        }
    }
}

fn digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn log_summary(summary: &RunSummary) {
    let total_secs = summary.elapsed.as_secs_f64();
    info!("Scraping completed!");
    info!("Total time: {:.2} minutes", total_secs / 60.0);
    if summary.total > 0 {
        info!("Average time per APN: {:.2} seconds", total_secs / summary.total as f64);
    }
    info!("Successful: {}", summary.succeeded);
    info!("Failed: {}", summary.failed);
    info!("Success rate: {:.1}%", summary.success_rate());
}
