use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named geographic scraping target, mapped to one source URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    /// Stable key used in run requests and provenance fields.
    pub key: String,
    /// Human-readable area name.
    pub name: String,
    /// Results-page URL for this area.
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Location {
    /// URL for a given results page, 1-based. Page 1 is the bare URL.
    pub fn page_url(&self, page: u32) -> String {
        if page <= 1 {
            self.url.clone()
        } else {
            format!("{}?page={}", self.url, page)
        }
    }
}

/// The lightweight subset of a listing obtainable from a results page.
/// Consumed exactly once by the detail collector.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingStub {
    pub ad_id: String,
    pub title: String,
    /// Raw price text as shown on the results page, e.g. "Rs 2,450,000".
    pub price: String,
    /// Coarse location string from the results card.
    pub location: String,
    /// Absolute detail-page URL.
    pub link: String,
}

/// Seller contact data merged in by the enricher.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactInfo {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub other_phones: Vec<String>,
}

impl ContactInfo {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.whatsapp.is_none()
            && self.other_phones.is_empty()
    }
}

/// A fully extracted listing. Fixed fields are `Option<String>` so that
/// "field not present on the page" (`None`) stays distinct from "present but
/// blank" (`Some("")`); the specification table is an open mapping because
/// its keys are only known once the page is inspected.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub ad_id: String,
    pub title: Option<String>,
    pub price: Option<String>,
    pub location: Option<String>,
    pub link: String,
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub seller_name: Option<String>,
    pub seller_since: Option<String>,
    pub seller_profile: Option<String>,
    /// Key/value pairs discovered in the page's specification table,
    /// keys normalized to snake_case.
    #[serde(default)]
    pub specs: BTreeMap<String, String>,
    pub contact: Option<ContactInfo>,
    /// Display name of the area this record was scraped from.
    pub scraped_location: String,
    /// Key of the configured location that produced this record.
    pub location_key: String,
    /// Set when the detail page never loaded and only stub data is present.
    #[serde(default)]
    pub incomplete: bool,
}

impl Record {
    /// A record carrying only what the results page knew. Used directly when
    /// the detail page cannot be loaded.
    pub fn from_stub(stub: &ListingStub, location: &Location) -> Self {
        Self {
            ad_id: stub.ad_id.clone(),
            title: non_empty(&stub.title),
            price: non_empty(&stub.price),
            location: non_empty(&stub.location),
            link: stub.link.clone(),
            scraped_location: location.name.clone(),
            location_key: location.key.clone(),
            ..Self::default()
        }
    }

    /// Fill gaps with stub data. Detail-page values win; the stub only
    /// supplies fields the detail extraction left absent or blank.
    pub fn fill_from_stub(&mut self, stub: &ListingStub) {
        if self.ad_id.is_empty() {
            self.ad_id = stub.ad_id.clone();
        }
        if self.link.is_empty() {
            self.link = stub.link.clone();
        }
        fill(&mut self.title, &stub.title);
        fill(&mut self.price, &stub.price);
        fill(&mut self.location, &stub.location);
    }

    /// Flatten into export pairs, in this record's canonical field order.
    /// The exporter unions these across records to build the column set.
    pub fn to_row(&self) -> Vec<(String, String)> {
        let mut row: Vec<(String, String)> = Vec::new();
        let mut push = |key: &str, value: String| {
            if !row.iter().any(|(k, _)| k == key) {
                row.push((key.to_string(), value));
            }
        };

        push("ad_id", self.ad_id.clone());
        push("title", opt(&self.title));
        push("price", opt(&self.price));
        push("location", opt(&self.location));
        push("description", opt(&self.description));
        push("link", self.link.clone());
        push("images", self.images.join(", "));
        push("seller_name", opt(&self.seller_name));
        push("seller_since", opt(&self.seller_since));
        push("seller_profile", opt(&self.seller_profile));

        if let Some(contact) = &self.contact {
            push("contact_name", opt(&contact.name));
            push("contact_phone", opt(&contact.phone));
            push("contact_whatsapp", opt(&contact.whatsapp));
            push("contact_other_phones", contact.other_phones.join(", "));
        }

        for (k, v) in &self.specs {
            push(k, v.clone());
        }

        push("scraped_location", self.scraped_location.clone());
        push("location_key", self.location_key.clone());

        if self.incomplete {
            push("incomplete", "true".to_string());
        }

        row
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

fn fill(slot: &mut Option<String>, value: &str) {
    let empty = slot.as_deref().map(str::trim).unwrap_or("").is_empty();
    if empty {
        if let Some(v) = non_empty(value) {
            *slot = Some(v);
        }
    }
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub() -> ListingStub {
        ListingStub {
            ad_id: "1089034552".to_string(),
            title: "Honda Civic Oriel 2019".to_string(),
            price: "Rs 5,850,000".to_string(),
            location: "Johar Town, Lahore".to_string(),
            link: "https://www.olx.com.pk/item/honda-civic-iid-1089034552".to_string(),
        }
    }

    fn location() -> Location {
        Location {
            key: "johar_town".to_string(),
            name: "Johar Town".to_string(),
            url: "https://www.olx.com.pk/johar-town_g4060704/cars_c84".to_string(),
            enabled: true,
        }
    }

    #[test]
    fn test_page_url_first_page_is_bare() {
        let loc = location();
        assert_eq!(loc.page_url(1), loc.url);
        assert_eq!(loc.page_url(0), loc.url);
    }

    #[test]
    fn test_page_url_later_pages_get_query() {
        let loc = location();
        assert_eq!(loc.page_url(3), format!("{}?page=3", loc.url));
    }

    #[test]
    fn test_from_stub_carries_provenance() {
        let record = Record::from_stub(&stub(), &location());
        assert_eq!(record.ad_id, "1089034552");
        assert_eq!(record.scraped_location, "Johar Town");
        assert_eq!(record.location_key, "johar_town");
        assert_eq!(record.title.as_deref(), Some("Honda Civic Oriel 2019"));
        assert!(!record.incomplete);
    }

    #[test]
    fn test_from_stub_blank_fields_become_absent() {
        let mut s = stub();
        s.price = "  ".to_string();
        let record = Record::from_stub(&s, &location());
        assert_eq!(record.price, None);
    }

    #[test]
    fn test_fill_from_stub_does_not_overwrite_detail_values() {
        let mut record = Record::from_stub(&stub(), &location());
        record.price = Some("Rs 5,900,000".to_string());
        record.fill_from_stub(&stub());
        assert_eq!(record.price.as_deref(), Some("Rs 5,900,000"));
    }

    #[test]
    fn test_fill_from_stub_fills_blank_slots() {
        let mut record = Record::from_stub(&stub(), &location());
        record.title = Some(String::new());
        record.fill_from_stub(&stub());
        assert_eq!(record.title.as_deref(), Some("Honda Civic Oriel 2019"));
    }

    #[test]
    fn test_to_row_renders_absent_as_empty() {
        let mut record = Record::from_stub(&stub(), &location());
        record.description = None;
        let row = record.to_row();
        let desc = row.iter().find(|(k, _)| k == "description").unwrap();
        assert_eq!(desc.1, "");
    }

    #[test]
    fn test_to_row_includes_incomplete_marker_only_when_set() {
        let mut record = Record::from_stub(&stub(), &location());
        assert!(!record.to_row().iter().any(|(k, _)| k == "incomplete"));
        record.incomplete = true;
        let row = record.to_row();
        assert_eq!(
            row.iter().find(|(k, _)| k == "incomplete").unwrap().1,
            "true"
        );
    }

    #[test]
    fn test_to_row_spec_keys_never_shadow_fixed_fields() {
        let mut record = Record::from_stub(&stub(), &location());
        record
            .specs
            .insert("title".to_string(), "spoofed".to_string());
        record
            .specs
            .insert("fuel".to_string(), "Petrol".to_string());
        let row = record.to_row();
        let titles: Vec<_> = row.iter().filter(|(k, _)| k == "title").collect();
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].1, "Honda Civic Oriel 2019");
        assert!(row.iter().any(|(k, v)| k == "fuel" && v == "Petrol"));
    }

    #[test]
    fn test_contact_info_is_empty() {
        assert!(ContactInfo::default().is_empty());
        let c = ContactInfo {
            phone: Some("03001234567".to_string()),
            ..ContactInfo::default()
        };
        assert!(!c.is_empty());
    }
}
