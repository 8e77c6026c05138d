use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

const SITE_BASE: &str = "https://www.olx.com.pk";

/// One field-lookup rule. Rules are tried in priority order; the first one
/// yielding non-empty text wins.
#[derive(Debug, Clone, Copy)]
pub enum Lookup {
    /// Text of the first element matching a CSS selector.
    Selector(&'static str),
    /// A canonical field read from the page's embedded JSON-LD data.
    Embedded(&'static str),
}

/// A parsed detail page: the DOM plus whatever JSON-LD blocks it embeds.
/// Extraction is a pure function of this document.
pub struct PageDocument {
    html: Html,
    embedded: BTreeMap<String, String>,
    embedded_images: Vec<String>,
}

impl PageDocument {
    pub fn parse(raw: &str) -> Self {
        let html = Html::parse_document(raw);
        let (embedded, embedded_images) = parse_json_ld(&html);
        Self {
            html,
            embedded,
            embedded_images,
        }
    }

    /// Try each rule in order; return the first non-empty text after
    /// whitespace normalization. Never fails — a missing field is `None`.
    pub fn extract(&self, rules: &[Lookup]) -> Option<String> {
        for rule in rules {
            let found = match rule {
                Lookup::Embedded(key) => self.embedded.get(*key).cloned(),
                Lookup::Selector(sel) => Selector::parse(sel)
                    .ok()
                    .and_then(|sel| self.html.select(&sel).next())
                    .map(|el| element_text(&el)),
            };
            if let Some(text) = found {
                let text = normalize_ws(&text);
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
        None
    }

    /// Discover arbitrary key/value pairs from the page's specification
    /// markup: list items holding a label/value pair, and definition lists.
    pub fn specs(&self) -> BTreeMap<String, String> {
        let mut specs = BTreeMap::new();

        if let (Ok(li_sel), Ok(cell_sel)) =
            (Selector::parse("ul li"), Selector::parse("span, div"))
        {
            for li in self.html.select(&li_sel) {
                let texts: Vec<String> = li
                    .select(&cell_sel)
                    .map(|el| normalize_ws(&element_text(&el)))
                    .filter(|t| !t.is_empty())
                    .collect();
                if texts.len() >= 2 {
                    let key = normalize_spec_key(&texts[0]);
                    let value = texts[1..].join(" ");
                    if !key.is_empty() && !value.is_empty() {
                        specs.entry(key).or_insert(value);
                    }
                }
            }
        }

        if let (Ok(dl_sel), Ok(dt_sel), Ok(dd_sel)) = (
            Selector::parse("dl"),
            Selector::parse("dt"),
            Selector::parse("dd"),
        ) {
            for dl in self.html.select(&dl_sel) {
                let keys: Vec<_> = dl.select(&dt_sel).collect();
                let values: Vec<_> = dl.select(&dd_sel).collect();
                for (dt, dd) in keys.iter().zip(values.iter()) {
                    let key = normalize_spec_key(&normalize_ws(&element_text(dt)));
                    let value = normalize_ws(&element_text(dd));
                    if !key.is_empty() && !value.is_empty() {
                        specs.insert(key, value);
                    }
                }
            }
        }

        specs
    }

    /// Every image URL on the page: `src`, `data-src`, and `srcset`
    /// candidates, plus whatever the JSON-LD blocks declared. Deduplicated
    /// and sorted for stable output.
    pub fn images(&self) -> Vec<String> {
        let mut urls: BTreeSet<String> = BTreeSet::new();

        if let Ok(img_sel) = Selector::parse("img") {
            for img in self.html.select(&img_sel) {
                for attr in ["src", "data-src"] {
                    if let Some(src) = img.value().attr(attr) {
                        let src = src.trim();
                        if src.starts_with("http") {
                            urls.insert(src.to_string());
                        }
                    }
                }
                if let Some(srcset) = img.value().attr("srcset") {
                    collect_srcset(srcset, &mut urls);
                }
            }
        }

        if let Ok(source_sel) = Selector::parse("source") {
            for source in self.html.select(&source_sel) {
                if let Some(srcset) = source.value().attr("srcset") {
                    collect_srcset(srcset, &mut urls);
                }
            }
        }

        for url in &self.embedded_images {
            if url.starts_with("http") {
                urls.insert(url.clone());
            }
        }

        urls.into_iter().collect()
    }

    /// The listing's ad id, from the dedicated node or a text fallback.
    pub fn ad_id(&self) -> Option<String> {
        if let Some(node) = Selector::parse(r#"[data-aut-id="adId"]"#)
            .ok()
            .and_then(|sel| self.html.select(&sel).next())
        {
            let id = element_text(&node)
                .replace("Ad ID", "")
                .replace(':', "")
                .trim()
                .to_string();
            if !id.is_empty() {
                return Some(id);
            }
        }

        let page_text = normalize_ws(&self.html.root_element().text().collect::<String>());
        Regex::new(r"(?i)Ad\s*ID\s*:\s*(\w+)")
            .ok()
            .and_then(|re| re.captures(&page_text))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Link to the seller's profile page, absolutized.
    pub fn seller_profile(&self) -> Option<String> {
        Selector::parse(r#"a[href*="/profile/"]"#)
            .ok()
            .and_then(|sel| self.html.select(&sel).next())
            .and_then(|el| el.value().attr("href"))
            .filter(|href| !href.is_empty())
            .map(absolutize)
    }
}

/// Pull canonical fields out of JSON-LD blocks: title, description, price
/// (currency-joined), and seller name, plus declared images.
fn parse_json_ld(html: &Html) -> (BTreeMap<String, String>, Vec<String>) {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    let mut images: Vec<String> = Vec::new();

    let script_sel = match Selector::parse(r#"script[type="application/ld+json"]"#) {
        Ok(sel) => sel,
        Err(_) => return (out, images),
    };

    for script in html.select(&script_sel) {
        let raw: String = script.text().collect();
        if raw.trim().is_empty() {
            continue;
        }
        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let objects: Vec<&Value> = match &parsed {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        for obj in objects {
            let Some(map) = obj.as_object() else { continue };
            if !has_relevant_type(map.get("@type")) {
                continue;
            }

            if let Some(name) = string_of(map.get("name")).or_else(|| string_of(map.get("headline")))
            {
                out.entry("title".to_string()).or_insert(name);
            }

            if let Some(desc) = string_of(map.get("description")) {
                out.entry("description".to_string()).or_insert(desc);
            }

            match map.get("image") {
                Some(Value::String(url)) => images.push(url.clone()),
                Some(Value::Array(items)) => {
                    images.extend(items.iter().filter_map(|v| string_of(Some(v))));
                }
                _ => {}
            }

            if let Some(offers) = map.get("offers").and_then(Value::as_object) {
                if let Some(price) = string_of(offers.get("price")) {
                    let currency = string_of(offers.get("priceCurrency")).unwrap_or_default();
                    let rendered = format!("{} {}", currency, price).trim().to_string();
                    out.entry("price".to_string()).or_insert(rendered);
                }
            }

            if let Some(seller) = map.get("seller").and_then(Value::as_object) {
                if let Some(name) = string_of(seller.get("name")) {
                    out.entry("seller_name".to_string()).or_insert(name);
                }
            }
        }
    }

    (out, images)
}

fn has_relevant_type(type_field: Option<&Value>) -> bool {
    const RELEVANT: [&str; 6] = ["Product", "Offer", "Vehicle", "Car", "WebPage", "Organization"];
    match type_field {
        Some(Value::String(t)) => RELEVANT.contains(&t.as_str()),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|t| RELEVANT.contains(&t)),
        _ => false,
    }
}

fn string_of(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn collect_srcset(srcset: &str, urls: &mut BTreeSet<String>) {
    for token in srcset.split(',') {
        if let Some(url) = token.trim().split(' ').next() {
            if url.starts_with("http") {
                urls.insert(url.to_string());
            }
        }
    }
}

pub fn absolutize(href: impl AsRef<str>) -> String {
    let href = href.as_ref();
    if href.starts_with("http") || href.is_empty() {
        href.to_string()
    } else {
        format!("{}{}", SITE_BASE, href)
    }
}

/// Concatenated text of an element's subtree.
pub fn element_text(el: &ElementRef) -> String {
    el.text().collect::<String>()
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Turn a label like "Fuel Type:" into a stable field name like "fuel_type".
pub fn normalize_spec_key(label: &str) -> String {
    let lowered = label.trim().to_lowercase();
    let replaced = Regex::new(r"[\s\-:/]+")
        .map(|re| re.replace_all(&lowered, "_").into_owned())
        .unwrap_or(lowered);
    replaced.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ws_collapses_runs() {
        assert_eq!(normalize_ws("  Honda\n\tCivic   2019 "), "Honda Civic 2019");
        assert_eq!(normalize_ws("   "), "");
    }

    #[test]
    fn test_normalize_spec_key() {
        assert_eq!(normalize_spec_key("Fuel Type:"), "fuel_type");
        assert_eq!(normalize_spec_key("KM's Driven"), "km's_driven");
        assert_eq!(normalize_spec_key("Make/Model"), "make_model");
        assert_eq!(normalize_spec_key(" Registered - In "), "registered_in");
    }

    #[test]
    fn test_extract_prefers_earlier_rules() {
        let doc = PageDocument::parse(
            r#"<html><body>
                <h1>Primary Title</h1>
                <div data-testid="ad-title">Secondary Title</div>
            </body></html>"#,
        );
        let title = doc.extract(&[
            Lookup::Selector("h1"),
            Lookup::Selector(r#"[data-testid="ad-title"]"#),
        ]);
        assert_eq!(title.as_deref(), Some("Primary Title"));
    }

    #[test]
    fn test_extract_falls_through_empty_matches() {
        let doc = PageDocument::parse(
            r#"<html><body>
                <h1>   </h1>
                <div data-testid="ad-title">Suzuki Alto VXL 2021</div>
            </body></html>"#,
        );
        let title = doc.extract(&[
            Lookup::Selector("h1"),
            Lookup::Selector(r#"[data-testid="ad-title"]"#),
        ]);
        assert_eq!(title.as_deref(), Some("Suzuki Alto VXL 2021"));
    }

    #[test]
    fn test_extract_returns_none_when_all_rules_miss() {
        let doc = PageDocument::parse("<html><body><p>nothing here</p></body></html>");
        let result = doc.extract(&[
            Lookup::Embedded("title"),
            Lookup::Selector("h1"),
            Lookup::Selector(".title"),
        ]);
        assert_eq!(result, None);
    }

    #[test]
    fn test_json_ld_fields_extracted() {
        let doc = PageDocument::parse(
            r#"<html><head>
                <script type="application/ld+json">
                {
                    "@type": "Product",
                    "name": "Toyota Corolla GLi 2018",
                    "description": "Family used car, first owner.",
                    "image": ["https://images.olx.com.pk/1.webp", "https://images.olx.com.pk/2.webp"],
                    "offers": {"price": 4250000, "priceCurrency": "PKR"},
                    "seller": {"name": "Ahmed Motors"}
                }
                </script>
            </head><body></body></html>"#,
        );
        assert_eq!(
            doc.extract(&[Lookup::Embedded("title")]).as_deref(),
            Some("Toyota Corolla GLi 2018")
        );
        assert_eq!(
            doc.extract(&[Lookup::Embedded("price")]).as_deref(),
            Some("PKR 4250000")
        );
        assert_eq!(
            doc.extract(&[Lookup::Embedded("seller_name")]).as_deref(),
            Some("Ahmed Motors")
        );
        assert_eq!(doc.images().len(), 2);
    }

    #[test]
    fn test_json_ld_irrelevant_types_ignored() {
        let doc = PageDocument::parse(
            r#"<html><head>
                <script type="application/ld+json">
                {"@type": "BreadcrumbList", "name": "Home"}
                </script>
            </head><body></body></html>"#,
        );
        assert_eq!(doc.extract(&[Lookup::Embedded("title")]), None);
    }

    #[test]
    fn test_json_ld_array_of_objects() {
        let doc = PageDocument::parse(
            r#"<html><head>
                <script type="application/ld+json">
                [{"@type": "BreadcrumbList"}, {"@type": ["Car", "Product"], "name": "Honda City Aspire"}]
                </script>
            </head><body></body></html>"#,
        );
        assert_eq!(
            doc.extract(&[Lookup::Embedded("title")]).as_deref(),
            Some("Honda City Aspire")
        );
    }

    #[test]
    fn test_json_ld_malformed_block_skipped() {
        let doc = PageDocument::parse(
            r#"<html><head>
                <script type="application/ld+json">{not json at all</script>
                <script type="application/ld+json">{"@type": "Product", "name": "Kia Sportage"}</script>
            </head><body></body></html>"#,
        );
        assert_eq!(
            doc.extract(&[Lookup::Embedded("title")]).as_deref(),
            Some("Kia Sportage")
        );
    }

    #[test]
    fn test_specs_from_list_items() {
        let doc = PageDocument::parse(
            r#"<html><body><ul>
                <li><span>Fuel Type</span><span>Petrol</span></li>
                <li><span>KM Driven</span><span>45,000</span></li>
                <li><span>OnlyOneCell</span></li>
            </ul></body></html>"#,
        );
        let specs = doc.specs();
        assert_eq!(specs.get("fuel_type").map(String::as_str), Some("Petrol"));
        assert_eq!(specs.get("km_driven").map(String::as_str), Some("45,000"));
        assert!(!specs.contains_key("onlyonecell"));
    }

    #[test]
    fn test_specs_from_definition_list() {
        let doc = PageDocument::parse(
            r#"<html><body><dl>
                <dt>Year</dt><dd>2018</dd>
                <dt>Transmission</dt><dd>Automatic</dd>
            </dl></body></html>"#,
        );
        let specs = doc.specs();
        assert_eq!(specs.get("year").map(String::as_str), Some("2018"));
        assert_eq!(
            specs.get("transmission").map(String::as_str),
            Some("Automatic")
        );
    }

    #[test]
    fn test_images_collects_src_variants() {
        let doc = PageDocument::parse(
            r#"<html><body>
                <img src="https://images.olx.com.pk/a.webp">
                <img data-src="https://images.olx.com.pk/b.webp" src="/placeholder.png">
                <img srcset="https://images.olx.com.pk/c.webp 1x, https://images.olx.com.pk/d.webp 2x">
                <source srcset="https://images.olx.com.pk/e.webp 800w">
            </body></html>"#,
        );
        let images = doc.images();
        assert_eq!(images.len(), 5);
        assert!(images.iter().all(|u| u.starts_with("http")));
    }

    #[test]
    fn test_ad_id_from_dedicated_node() {
        let doc = PageDocument::parse(
            r#"<html><body><span data-aut-id="adId">Ad ID: 1089034552</span></body></html>"#,
        );
        assert_eq!(doc.ad_id().as_deref(), Some("1089034552"));
    }

    #[test]
    fn test_ad_id_from_text_fallback() {
        let doc = PageDocument::parse(
            "<html><body><footer>Posted 3 days ago. Ad ID: 1077001234</footer></body></html>",
        );
        assert_eq!(doc.ad_id().as_deref(), Some("1077001234"));
    }

    #[test]
    fn test_ad_id_absent() {
        let doc = PageDocument::parse("<html><body><p>no identifiers</p></body></html>");
        assert_eq!(doc.ad_id(), None);
    }

    #[test]
    fn test_seller_profile_absolutized() {
        let doc = PageDocument::parse(
            r#"<html><body><a href="/profile/ahmed-motors-23419">Seller</a></body></html>"#,
        );
        assert_eq!(
            doc.seller_profile().as_deref(),
            Some("https://www.olx.com.pk/profile/ahmed-motors-23419")
        );
    }
}
