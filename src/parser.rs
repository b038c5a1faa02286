//! Field extraction from product pages.
//!
//! Each field walks an ordered list of selectors and keeps the first
//! non-empty value. Listing types (books, variants, plain goods) use
//! different markup, so the lists are long and order is the priority.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

const TITLE_SELECTORS: &[&str] = &["#productTitle"];

const PRICE_SELECTORS: &[&str] = &[
    ".a-price .a-offscreen",
    "#priceblock_ourprice",
    "#priceblock_dealprice",
    ".a-color-price",
    "#price_inside_buybox",
    ".priceToPay span.a-offscreen",
];

const IMAGE_SELECTORS: &[&str] = &[
    "#landingImage",
    "#imgBlkFront",
    "#ebooksImgBlkFront",
    "#img-wrapper img",
    ".a-dynamic-image",
    "#main-image",
    "img[data-old-hires]",
    "img[data-a-dynamic-image]",
    ".imageThumb img",
    "#imageBlock img",
    "#imgTagWrapperId img",
    ".image-wrapper img",
    "img.a-dynamic-image",
];

/// Checked in order on every matched image element.
const IMAGE_ATTRS: &[&str] = &["src", "data-old-hires", "data-a-dynamic-image"];

const DESCRIPTION_SELECTORS: &[&str] = &["#productDescription p"];
const BULLET_SELECTORS: &[&str] = &["#feature-bullets li"];
const MAX_BULLETS: usize = 3;

const RATING_SELECTORS: &[&str] = &[
    ".a-icon-star .a-icon-alt",
    "#acrPopover .a-icon-alt",
    "span[data-hook=\"rating-out-of-text\"]",
    "i.a-icon-star",
];

const ROBOT_CHECK_SELECTORS: &[&str] = &["form[action*='validateCaptcha']"];

const RESOLUTION_DELIMITER: &str = "._";
const HIGH_RES_SUFFIX: &str = "._AC_SL1500_.jpg";

fn compile(selectors: &[&str]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
}

static TITLE: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(TITLE_SELECTORS));
static PRICE: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(PRICE_SELECTORS));
static IMAGE: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(IMAGE_SELECTORS));
static DESCRIPTION: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(DESCRIPTION_SELECTORS));
static BULLETS: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(BULLET_SELECTORS));
static RATING: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(RATING_SELECTORS));
static ROBOT_CHECK: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(ROBOT_CHECK_SELECTORS));

/// Fields found on one fetched page. `None` means the field was not found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFields {
    pub title: Option<String>,
    pub price: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub rating: Option<String>,
    pub robot_check: bool,
}

pub fn parse_product(html: &str) -> PageFields {
    let doc = Html::parse_document(html);

    PageFields {
        title: extract_title(&doc),
        price: extract_price(&doc),
        image_url: extract_image(&doc),
        description: extract_description(&doc),
        rating: extract_rating(&doc),
        robot_check: is_robot_check(&doc),
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

/// First non-empty text across all matches of all selectors, in order.
fn first_text(doc: &Html, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .find_map(|selector| doc.select(selector).find_map(|e| non_empty(element_text(e))))
}

pub fn extract_title(doc: &Html) -> Option<String> {
    first_text(doc, &TITLE)
}

/// Only the first match of each selector is read; an empty one falls
/// through to the next selector.
pub fn extract_price(doc: &Html) -> Option<String> {
    PRICE.iter().find_map(|selector| {
        doc.select(selector)
            .next()
            .and_then(|element| non_empty(element_text(element)))
    })
}

pub fn extract_image(doc: &Html) -> Option<String> {
    IMAGE.iter().find_map(|selector| {
        doc.select(selector)
            .find_map(|element| IMAGE_ATTRS.iter().find_map(|attr| image_from_attr(element, attr)))
    })
}

fn image_from_attr(element: ElementRef<'_>, attr: &str) -> Option<String> {
    let raw = element.value().attr(attr).filter(|v| !v.is_empty())?;

    let url = if raw.trim_start().starts_with('{') {
        match largest_variant(raw) {
            Some(url) => url,
            None => element.value().attr("src").unwrap_or_default().to_string(),
        }
    } else {
        raw.to_string()
    };

    non_empty(url).map(|url| normalize_image_url(&url))
}

/// Picks the URL with the largest `[width, height]` area from a
/// `data-a-dynamic-image` map. Ties go to the earliest entry. `None` when
/// the JSON is malformed, empty, or any value is not a numeric pair.
pub fn largest_variant(raw: &str) -> Option<String> {
    let variants: Map<String, Value> = serde_json::from_str(raw).ok()?;

    let mut best: Option<(&String, f64)> = None;
    for (url, dims) in &variants {
        let area = match dims.as_array().map(Vec::as_slice) {
            Some([w, h]) => w.as_f64()? * h.as_f64()?,
            _ => return None,
        };
        if best.is_none_or(|(_, top)| area > top) {
            best = Some((url, area));
        }
    }
    best.map(|(url, _)| url.clone())
}

/// Rewrites a sized rendition URL to the large one:
/// `.../I/abc._SX300_SY300_.jpg` becomes `.../I/abc._AC_SL1500_.jpg`.
pub fn normalize_image_url(url: &str) -> String {
    match url.split_once(RESOLUTION_DELIMITER) {
        Some((base, _)) => format!("{base}{HIGH_RES_SUFFIX}"),
        None => url.to_string(),
    }
}

pub fn extract_description(doc: &Html) -> Option<String> {
    first_text(doc, &DESCRIPTION).or_else(|| {
        let bullets: Vec<String> = BULLETS
            .iter()
            .flat_map(|selector| doc.select(selector))
            .map(element_text)
            .filter(|text| !text.is_empty())
            .take(MAX_BULLETS)
            .collect();
        non_empty(bullets.join(" "))
    })
}

pub fn extract_rating(doc: &Html) -> Option<String> {
    RATING.iter().find_map(|selector| {
        doc.select(selector).find_map(|element| {
            non_empty(element_text(element)).or_else(|| {
                ["title", "alt"]
                    .iter()
                    .find_map(|attr| element.value().attr(attr))
                    .map(|v| v.trim().to_string())
                    .and_then(non_empty)
            })
        })
    })
}

pub fn is_robot_check(doc: &Html) -> bool {
    ROBOT_CHECK.iter().any(|selector| doc.select(selector).next().is_some())
}
