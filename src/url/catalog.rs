use crate::UrlError;
use url::Url;

/// Path of the category listing page, relative to the catalog origin
const CATEGORY_PATH: &str = "/disp/category.ssg";

/// Builds the listing URL for one page of a category
///
/// # Arguments
///
/// * `base_url` - Catalog origin, e.g. `https://emart.ssg.com`
/// * `category_id` - The `dispCtgId` of the category
/// * `page` - 1-based page number
/// * `page_size` - Items per page, appended only when configured
///
/// # Examples
///
/// ```
/// use catalog_harvester::url::catalog_page_url;
///
/// let url = catalog_page_url("https://emart.ssg.com", "6000213114", 3, None).unwrap();
/// assert_eq!(
///     url.as_str(),
///     "https://emart.ssg.com/disp/category.ssg?dispCtgId=6000213114&page=3"
/// );
/// ```
pub fn catalog_page_url(
    base_url: &str,
    category_id: &str,
    page: u32,
    page_size: Option<u32>,
) -> Result<Url, UrlError> {
    let base = Url::parse(base_url).map_err(|e| UrlError::Parse(e.to_string()))?;
    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(UrlError::InvalidScheme(base.scheme().to_string()));
    }

    let mut url = base
        .join(CATEGORY_PATH)
        .map_err(|e| UrlError::Parse(e.to_string()))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("dispCtgId", category_id);
        query.append_pair("page", &page.to_string());
        if let Some(size) = page_size {
            query.append_pair("pageSize", &size.to_string());
        }
    }
    Ok(url)
}

/// Resolves a possibly relative link found in catalog markup
///
/// Protocol-relative links (`//cdn...`) become `https:`; root-relative and
/// relative links resolve against `base`. Empty input yields an empty string.
pub fn absolutize(base: &Url, raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    if let Some(rest) = raw.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return raw.to_string();
    }
    base.join(raw)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Extracts the `itemId` query parameter from a product detail link
pub fn extract_item_id(product_url: &str) -> Option<String> {
    let url = Url::parse(product_url).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "itemId")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}
