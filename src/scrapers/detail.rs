//! Detail page parser. Pure and total: missing markup yields `None` fields.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::models::DetailFields;
use crate::scrapers::selectors::{resolve_image, DetailSelectors};

/// First digit-led numeric token, spaces and separators allowed inside
pub fn price_pattern() -> &'static Regex {
    static PRICE: OnceLock<Regex> = OnceLock::new();
    PRICE.get_or_init(|| Regex::new(r"(\d[\d\s.,]*)").expect("valid price regex"))
}

/// Parse a detail page for the category with the given label.
pub fn parse_detail(html: &str, category: &str) -> DetailFields {
    parse_with(html, &DetailSelectors::for_label(category))
}

pub fn parse_with(html: &str, selectors: &DetailSelectors) -> DetailFields {
    if selectors.is_empty() {
        return DetailFields::default();
    }

    let document = Html::parse_document(html);
    let text = |css: Option<&str>| -> Option<String> {
        let selector = Selector::parse(css?).ok()?;
        let element = document.select(&selector).next()?;
        let text = element.text().collect::<String>().trim().to_string();
        (!text.is_empty()).then_some(text)
    };

    let title = text(selectors.title);
    let address_raw = text(selectors.address);
    let price_raw = text(selectors.price).or_else(|| {
        price_pattern()
            .captures(html)
            .map(|caps| caps[1].trim_end().to_string())
    });

    let image_url = selectors
        .image
        .and_then(|css| Selector::parse(css).ok())
        .and_then(|selector| {
            let img = document.select(&selector).next()?;
            resolve_image(|name| img.value().attr(name))
        });

    DetailFields {
        title,
        price_raw,
        address_raw,
        image_url,
    }
}
