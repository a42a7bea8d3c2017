//! Catalog listing parser
//!
//! This module turns one category listing page into item records:
//! - Product cards under `#ty_thmb_view > ul`
//! - The pagination block's "next" control, as a hint for the walker
//!
//! Records carry only the fields of the job kind being harvested.

use crate::state::JobKind;
use crate::url::{absolutize, extract_item_id};
use crate::FetchError;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use url::Url;

/// One harvested product, as an ordered JSON object
pub type ItemRecord = Map<String, Value>;

/// Product listing container; its presence means the page is a listing
const LISTING_ROOT: &str = "#ty_thmb_view";

/// Markers the catalog renders instead of the listing when a category is exhausted
const NO_RESULT_MARKERS: &str = ".mnemitem_noresult, .cmem_nodata, .csrch_nodata, .nodata";

const PAGINATION: &str = ".cm_paginate, .paginate, .com_paginate, .srg_pagination";

/// Anchor texts used for the "next page" control
const NEXT_LABELS: &[&str] = &["다음", ">", "›", "Next"];

/// Extracted information from a listing page
#[derive(Debug, Clone, Default)]
pub struct ParsedListing {
    /// Items in page order
    pub items: Vec<ItemRecord>,

    /// `Some(false)` when the pagination block says this is the last page,
    /// `None` when it cannot tell
    pub has_next: Option<bool>,
}

struct Selectors {
    listing_root: Selector,
    cards: Selector,
    no_result: Selector,
    brand: Selector,
    title: Selector,
    link: Selector,
    link_alt: Selector,
    selling_price: Selector,
    selling_price_alt: Selector,
    original_price: Selector,
    original_price_alt: Selector,
    image: Selector,
    unit_price: Selector,
    sold_out: Selector,
    pagination: Selector,
    anchor: Selector,
}

impl Selectors {
    fn build() -> Result<Self, FetchError> {
        Ok(Self {
            listing_root: selector(LISTING_ROOT)?,
            cards: selector("#ty_thmb_view > ul > li")?,
            no_result: selector(NO_RESULT_MARKERS)?,
            brand: selector("div.mnemitem_tit > span.mnemitem_goods_brand")?,
            title: selector("div.mnemitem_tit > span.mnemitem_goods_tit")?,
            link: selector("div > a")?,
            link_alt: selector("div.mnemitem_thmb_v2 > a")?,
            selling_price: selector("div.mnemitem_pricewrap_v2 div.new_price em")?,
            selling_price_alt: selector(
                "div.mnemitem_pricewrap_v2 > div:nth-child(2) > div > em",
            )?,
            original_price: selector("div.mnemitem_pricewrap_v2 div.ty_oldpr del em")?,
            original_price_alt: selector(
                "div.mnemitem_pricewrap_v2 > div:nth-child(1) > div > em",
            )?,
            image: selector("div.mnemitem_thmb_v2 img")?,
            unit_price: selector("div.mnemitem_pricewrap_v2 > div.unit_price")?,
            sold_out: selector("div.mnemitem_thmb_v2 > div.mnemitem_soldout")?,
            pagination: selector(PAGINATION)?,
            anchor: selector("a")?,
        })
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::parse(format!("bad selector '{}': {:?}", css, e)))
}

/// Parses catalog listing pages for one catalog origin
pub struct CatalogParser {
    base: Url,
    selectors: Selectors,
}

impl std::fmt::Debug for CatalogParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogParser")
            .field("base", &self.base.as_str())
            .finish()
    }
}

impl CatalogParser {
    pub fn new(base: Url) -> Result<Self, FetchError> {
        Ok(Self {
            base,
            selectors: Selectors::build()?,
        })
    }

    /// Parses one listing page
    ///
    /// # Structure Rules
    ///
    /// | Page shape | Result |
    /// |------------|--------|
    /// | Listing container with cards | items in page order |
    /// | Listing container without cards | empty page |
    /// | No listing, but a no-result marker | empty page |
    /// | Neither | `ParseFailure` |
    /// | Cards present, none carrying an item id | `ParseFailure` |
    ///
    /// # Arguments
    ///
    /// * `html` - Response body
    /// * `category` - Category name stamped into each record
    /// * `kind` - Job kind selecting the projected fields
    /// * `last_updated` - Timestamp stamped into each record
    pub fn parse(
        &self,
        html: &str,
        category: &str,
        kind: JobKind,
        last_updated: &str,
    ) -> Result<ParsedListing, FetchError> {
        let document = Html::parse_document(html);
        let s = &self.selectors;

        let has_listing = document.select(&s.listing_root).next().is_some();
        if !has_listing && document.select(&s.no_result).next().is_none() {
            return Err(FetchError::parse(format!(
                "listing container '{}' not found",
                LISTING_ROOT
            )));
        }

        let mut items = Vec::new();
        let mut with_id = 0usize;
        for card in document.select(&s.cards) {
            let full = self.parse_card(card, category, last_updated);
            if full.get("id").and_then(Value::as_str).is_some_and(|id| !id.is_empty()) {
                with_id += 1;
            }
            items.push(project(full, kind));
        }

        if !items.is_empty() && with_id == 0 {
            return Err(FetchError::parse(format!(
                "{} product cards found but none carries an item id",
                items.len()
            )));
        }

        Ok(ParsedListing {
            items,
            has_next: self.has_next(&document),
        })
    }

    fn parse_card(&self, card: ElementRef<'_>, category: &str, last_updated: &str) -> ItemRecord {
        let s = &self.selectors;

        let mut name_parts = Vec::new();
        if let Some(brand) = first_text(card, &s.brand).filter(|b| !b.is_empty()) {
            name_parts.push(format!("[{}]", brand));
        }
        if let Some(title) = first_text(card, &s.title).filter(|t| !t.is_empty()) {
            name_parts.push(title);
        }
        let product_name = name_parts.join(" ");

        let product_address = [&s.link, &s.link_alt]
            .iter()
            .filter_map(|sel| card.select(sel).next())
            .filter_map(|a| a.value().attr("href"))
            .map(|href| absolutize(&self.base, href))
            .find(|addr| !addr.is_empty())
            .unwrap_or_default();

        let id = extract_item_id(&product_address).unwrap_or_default();

        let selling_price = first_text(card, &s.selling_price)
            .or_else(|| first_text(card, &s.selling_price_alt))
            .map(|t| digits_only(&t))
            .unwrap_or_default();

        let original_price = first_text(card, &s.original_price)
            .or_else(|| first_text(card, &s.original_price_alt))
            .map(|t| digits_only(&t))
            .unwrap_or_default();

        let image_url = card
            .select(&s.image)
            .next()
            .and_then(|img| {
                let attrs = img.value();
                ["data-src", "data-original", "src"]
                    .iter()
                    .filter_map(|name| attrs.attr(name))
                    .find(|v| !v.trim().is_empty())
            })
            .map(|raw| absolutize(&self.base, raw))
            .unwrap_or_default();

        let quantity = first_text(card, &s.unit_price).unwrap_or_default();

        let out_of_stock = if card.select(&s.sold_out).next().is_some() {
            "Y"
        } else {
            ""
        };

        let mut record = Map::new();
        record.insert("id".into(), Value::String(id));
        record.insert("category".into(), Value::String(category.to_string()));
        record.insert("product_name".into(), Value::String(product_name));
        record.insert("product_address".into(), Value::String(product_address));
        record.insert("original_price".into(), Value::String(original_price));
        record.insert("selling_price".into(), Value::String(selling_price));
        record.insert("image_url".into(), Value::String(image_url));
        record.insert("quantity".into(), Value::String(quantity));
        record.insert("out_of_stock".into(), Value::String(out_of_stock.to_string()));
        record.insert("last_updated".into(), Value::String(last_updated.to_string()));
        record
    }

    /// Reads the pagination block's "next" control
    fn has_next(&self, document: &Html) -> Option<bool> {
        let nav = document.select(&self.selectors.pagination).next()?;
        for anchor in nav.select(&self.selectors.anchor) {
            let text = anchor.text().collect::<String>();
            if !NEXT_LABELS.contains(&text.trim()) {
                continue;
            }
            if anchor.value().classes().any(|c| c == "disabled") {
                return Some(false);
            }
            let href = anchor.value().attr("href").unwrap_or("").trim();
            return Some(!href.is_empty() && href != "#");
        }
        None
    }
}

/// Keeps only the fields harvested by `kind`, in that kind's field order
fn project(mut full: ItemRecord, kind: JobKind) -> ItemRecord {
    let mut out = Map::new();
    for field in kind.fields() {
        if let Some(value) = full.remove(*field) {
            out.insert((*field).to_string(), value);
        }
    }
    out
}

/// Whitespace-normalized text of the first match, if any
fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope.select(selector).next().map(|el| {
        el.text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ")
    })
}

/// `"12,340원"` becomes `"12340"`
fn digits_only(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}
