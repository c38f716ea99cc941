//! Site constants: host, pagination schemes, CSS selectors and the image blocklist.

use crate::models::Category;

pub const SITE_BASE: &str = "https://sn.coinafrique.com";
pub const SITE_HOST: &str = "sn.coinafrique.com";

/// Present once the listing grid has rendered
pub const LISTING_READY: &str = ".ad__card-description a[href]";

/// Substring identifying listing-detail permalinks
pub const DETAIL_LINK_MARKER: &str = "/annonce/";

/// Placeholder, flag and inline images that never count as a listing photo
pub const BAD_IMAGE_TOKENS: [&str; 4] = [
    "/static/images/countries/",
    "/static/flags/",
    "/svg",
    "data:image",
];

/// Attributes consulted for an image URL, highest priority first
pub const IMAGE_ATTRS: [&str; 5] = ["data-src", "data-lazy", "data-original", "srcset", "src"];

/// Pagination URL layouts the site has used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageScheme {
    /// `{base}{path}?page=N`
    Query,
    /// `{base}{path}/N`
    PathSegment,
    /// `{base}{path}`, only meaningful for the first page
    Bare,
}

impl PageScheme {
    pub fn url(&self, category: Category, page: u32) -> String {
        match self {
            PageScheme::Query => format!("{}{}?page={}", SITE_BASE, category.path(), page),
            PageScheme::PathSegment => format!("{}{}/{}", SITE_BASE, category.path(), page),
            PageScheme::Bare => format!("{}{}", SITE_BASE, category.path()),
        }
    }

    /// Schemes to probe for a page, `preferred` first when known
    pub fn probe_order(page: u32, preferred: Option<PageScheme>) -> Vec<PageScheme> {
        let mut order = Vec::with_capacity(3);
        if let Some(scheme) = preferred.filter(|s| *s != PageScheme::Bare) {
            order.push(scheme);
        }
        for scheme in [PageScheme::Query, PageScheme::PathSegment] {
            if !order.contains(&scheme) {
                order.push(scheme);
            }
        }
        if page == 1 {
            order.push(PageScheme::Bare);
        }
        order
    }
}

/// CSS selectors for one category's detail page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetailSelectors {
    pub title: Option<&'static str>,
    pub price: Option<&'static str>,
    pub address: Option<&'static str>,
    pub image: Option<&'static str>,
}

impl DetailSelectors {
    pub fn for_category(category: Category) -> Self {
        let image = match category {
            Category::AutresAnimaux => "div.col:nth-of-type(2) img.ad__card-img",
            _ => "div.col:nth-of-type(1) img.ad__card-img",
        };
        Self {
            title: Some(".hide-on-med-and-down h1"),
            price: Some(".hide-on-med-and-down p.price"),
            address: Some(".hide-on-med-and-down [data-address] span"),
            image: Some(image),
        }
    }

    /// Unknown labels get the empty selector set
    pub fn for_label(label: &str) -> Self {
        Category::from_label(label)
            .map(Self::for_category)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Make a scraped URL absolute against the site host.
pub fn normalize_url(url: Option<&str>) -> Option<String> {
    let url = url.map(str::trim).filter(|u| !u.is_empty())?;
    if let Some(rest) = url.strip_prefix("//") {
        Some(format!("https://{}", rest))
    } else if url.starts_with('/') {
        Some(format!("{}{}", SITE_BASE, url))
    } else {
        Some(url.to_string())
    }
}

pub fn is_blocked_image(url: &str) -> bool {
    BAD_IMAGE_TOKENS.iter().any(|token| url.contains(token))
}

/// Pick the first non-empty image attribute in priority order, normalize it
/// and drop it if it matches the blocklist.
///
/// `attr` returns the raw attribute value for a name.
pub fn resolve_image<'a, F>(attr: F) -> Option<String>
where
    F: Fn(&str) -> Option<&'a str>,
{
    let raw = IMAGE_ATTRS.iter().find_map(|name| {
        let value = attr(name).map(str::trim).filter(|v| !v.is_empty())?;
        if *name == "srcset" {
            value.split_whitespace().next()
        } else {
            Some(value)
        }
    });
    clean_image_url(raw)
}

/// Normalize an already-picked image URL and apply the blocklist.
pub fn clean_image_url(raw: Option<&str>) -> Option<String> {
    normalize_url(raw).filter(|url| !is_blocked_image(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn pagination_urls() {
        assert_eq!(
            PageScheme::Query.url(Category::Moutons, 3),
            "https://sn.coinafrique.com/categorie/moutons?page=3"
        );
        assert_eq!(
            PageScheme::PathSegment.url(Category::Moutons, 3),
            "https://sn.coinafrique.com/categorie/moutons/3"
        );
        assert_eq!(
            PageScheme::Bare.url(Category::PoulesLapinsPigeons, 1),
            "https://sn.coinafrique.com/categorie/poules-lapins-et-pigeons"
        );
    }

    #[test]
    fn bare_scheme_only_probed_on_first_page() {
        assert_eq!(
            PageScheme::probe_order(1, None),
            vec![PageScheme::Query, PageScheme::PathSegment, PageScheme::Bare]
        );
        assert_eq!(
            PageScheme::probe_order(2, None),
            vec![PageScheme::Query, PageScheme::PathSegment]
        );
    }

    #[test]
    fn learned_scheme_goes_first() {
        assert_eq!(
            PageScheme::probe_order(4, Some(PageScheme::PathSegment)),
            vec![PageScheme::PathSegment, PageScheme::Query]
        );
        assert_eq!(
            PageScheme::probe_order(2, Some(PageScheme::Bare)),
            vec![PageScheme::Query, PageScheme::PathSegment]
        );
    }

    #[test]
    fn unknown_label_has_no_selectors() {
        assert!(DetailSelectors::for_label("Chats").is_empty());
        assert!(!DetailSelectors::for_label("Chiens").is_empty());
        assert_eq!(
            DetailSelectors::for_category(Category::AutresAnimaux).image,
            Some("div.col:nth-of-type(2) img.ad__card-img")
        );
    }

    #[test]
    fn normalizes_relative_urls() {
        assert_eq!(
            normalize_url(Some("//images.coinafrique.com/a.jpg")).as_deref(),
            Some("https://images.coinafrique.com/a.jpg")
        );
        assert_eq!(
            normalize_url(Some("/annonce/chiens/berger-123")).as_deref(),
            Some("https://sn.coinafrique.com/annonce/chiens/berger-123")
        );
        assert_eq!(normalize_url(Some("  ")), None);
        assert_eq!(normalize_url(None), None);
    }

    #[test]
    fn image_priority_prefers_lazy_attributes() {
        let attrs: HashMap<&str, &str> = [
            ("src", "https://cdn/x.jpg"),
            ("srcset", "https://cdn/small.jpg 320w, https://cdn/big.jpg 640w"),
            ("data-original", "https://cdn/orig.jpg"),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            resolve_image(|name| attrs.get(name).copied()).as_deref(),
            Some("https://cdn/orig.jpg")
        );

        let srcset_only: HashMap<&str, &str> =
            [("srcset", "https://cdn/small.jpg 320w"), ("src", "https://cdn/x.jpg")]
                .into_iter()
                .collect();
        assert_eq!(
            resolve_image(|name| srcset_only.get(name).copied()).as_deref(),
            Some("https://cdn/small.jpg")
        );
    }

    #[test]
    fn blocklisted_images_are_dropped() {
        for url in [
            "https://sn.coinafrique.com/static/images/countries/sn.png",
            "/static/flags/sn.png",
            "https://cdn/logo/svg/placeholder",
            "data:image/gif;base64,R0lGOD",
        ] {
            assert_eq!(clean_image_url(Some(url)), None, "{url}");
        }
        assert!(clean_image_url(Some("https://images.coinafrique.com/1.jpg")).is_some());
    }
}
