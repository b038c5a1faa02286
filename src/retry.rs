use std::time::Duration;

use rand::Rng;

use crate::config::{EngineConfig, RequiredFields};
use crate::events::ItemLog;
use crate::fetcher::{FetchOutcome, Fetcher};
use crate::models::ExtractionResult;
use crate::parser::{self, PageFields};

/// How a single fetch+parse attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Complete,
    MissingImage,
    MissingTitle,
    MissingPrice,
    Http(u16),
    Transport(String),
}

/// Base delay plus uniform jitter in `[jitter_min_ms, jitter_max_ms]`.
pub fn backoff_delay(config: &EngineConfig) -> Duration {
    let jitter = if config.jitter_max_ms > config.jitter_min_ms {
        rand::rng().random_range(config.jitter_min_ms..=config.jitter_max_ms)
    } else {
        config.jitter_min_ms
    };
    Duration::from_millis(config.backoff_base_ms.saturating_add(jitter))
}

/// Drives up to `max_attempts` fetches for one identifier.
pub struct RetryController<'a, F: Fetcher + ?Sized> {
    fetcher: &'a F,
    config: &'a EngineConfig,
    sleep: Box<dyn Fn(Duration) + 'a>,
}

impl<'a, F: Fetcher + ?Sized> RetryController<'a, F> {
    pub fn new(fetcher: &'a F, config: &'a EngineConfig) -> Self {
        Self {
            fetcher,
            config,
            sleep: Box::new(std::thread::sleep),
        }
    }

    pub fn with_sleep(mut self, sleep: impl Fn(Duration) + 'a) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn run(&self, identifier: &str, log: &mut ItemLog) -> ExtractionResult {
        let max = self.config.max_attempts;
        let url = self.config.product_url(identifier);
        let mut result = ExtractionResult::new(identifier);

        for attempt in 1..=max {
            result.attempt_count = attempt;
            log.info(format!("{identifier}: Attempt {attempt}/{max} started"));

            if attempt > 1 {
                let delay = backoff_delay(self.config);
                log.info(format!(
                    "{identifier}: Waiting {:.2} seconds before retry",
                    delay.as_secs_f64()
                ));
                (self.sleep)(delay);
            }

            let outcome = match self.fetcher.fetch(&url) {
                FetchOutcome::Ok(body) => {
                    log.success(format!("{identifier}: Retrieved page on attempt {attempt}"));
                    let page = parser::parse_product(&body);
                    if page.robot_check {
                        log.warning(format!(
                            "{identifier}: Robot check page served on attempt {attempt}"
                        ));
                    }
                    self.apply(identifier, page, &mut result, log)
                }
                FetchOutcome::HttpError(code) => AttemptOutcome::Http(code),
                FetchOutcome::TransportError(message) => AttemptOutcome::Transport(message),
            };

            match outcome {
                AttemptOutcome::Complete => {
                    result.success = true;
                    log.success(format!("{identifier}: Successfully found required fields"));
                    return result;
                }
                AttemptOutcome::MissingImage => log.warning(format!(
                    "{identifier}: No image found on attempt {attempt}. Will retry."
                )),
                AttemptOutcome::MissingTitle => {
                    log.warning(format!("{identifier}: No title found on attempt {attempt}"))
                }
                AttemptOutcome::MissingPrice => {
                    log.warning(format!("{identifier}: No price found on attempt {attempt}"))
                }
                AttemptOutcome::Http(code) => log.error(format!(
                    "{identifier}: Bad status code {code} on attempt {attempt}"
                )),
                AttemptOutcome::Transport(message) => log.error(format!(
                    "{identifier}: Error on attempt {attempt}: {message}"
                )),
            }
        }

        log.error(format!("{identifier}: Failed after {max} attempts"));
        result.error = Some(format!(
            "Failed to retrieve product data after {max} attempts"
        ));
        result
    }

    /// Merges what the page yielded into `result`. Fields found by earlier
    /// attempts are kept, but the required ones must all come from this page.
    fn apply(
        &self,
        identifier: &str,
        page: PageFields,
        result: &mut ExtractionResult,
        log: &mut ItemLog,
    ) -> AttemptOutcome {
        let fields = &mut result.fields;
        let has_title = page.title.is_some();
        let has_price = page.price.is_some();
        let has_image = page.image_url.is_some();

        if let Some(title) = page.title {
            let preview: String = title.chars().take(30).collect();
            log.info(format!("{identifier}: Found title: {preview}..."));
            fields.title = title;
        }
        if let Some(price) = page.price {
            log.info(format!("{identifier}: Found price: {price}"));
            fields.price = price;
        }
        if let Some(image_url) = page.image_url {
            log.success(format!("{identifier}: Found image"));
            fields.image_url = image_url;
        }
        if let Some(description) = page.description {
            log.info(format!("{identifier}: Found product description"));
            fields.description = description;
        }
        if let Some(rating) = page.rating {
            log.info(format!("{identifier}: Found rating: {rating}"));
            fields.rating = rating;
        }

        if !has_image {
            AttemptOutcome::MissingImage
        } else if !has_title {
            AttemptOutcome::MissingTitle
        } else if self.config.required_fields == RequiredFields::TitlePriceImage && !has_price {
            AttemptOutcome::MissingPrice
        } else {
            AttemptOutcome::Complete
        }
    }
}
