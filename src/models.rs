use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::WatchError;

/// Number of consecutive polls a disappeared figure is tolerated before it is
/// finally reported deleted.
pub const INITIAL_TTL: u32 = 3;

/// Closed set of supported sale sites. Configured service names are mapped to
/// a variant at config-load time so an unsupported site fails fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Jungle,
    Amiami,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Jungle => "jungle",
            Service::Amiami => "amiami",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One product entry scraped from a sale page. Identity is the display name;
/// these sites expose no stable numeric ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Figure {
    pub name: String,
    /// Full name from the detail page when the index name was truncated.
    /// Defaults to `name` until enrichment runs.
    pub extended_name: String,
    /// Site-native currency text, never normalized to a number.
    pub price: String,
    pub link: String,
    pub pic_link: String,
    condition: Option<String>,
    pub service: Service,
    pub ttl: u32,
}

impl Figure {
    pub fn new(service: Service, name: &str, price: String, link: String, pic_link: String) -> Self {
        let name = name.trim().to_string();
        Self {
            extended_name: name.clone(),
            name,
            price,
            link,
            pic_link,
            condition: None,
            service,
            ttl: INITIAL_TTL,
        }
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    /// The condition is write-once. A second assignment is an error even when
    /// the two values are equal.
    pub fn set_condition(&mut self, value: String) -> Result<(), WatchError> {
        if self.condition.is_some() {
            return Err(WatchError::DataCorruption {
                context: self.name.clone(),
                detail: "condition already set".to_string(),
            });
        }
        self.condition = Some(value);
        Ok(())
    }

    /// Index pages on some sites truncate long names with an ellipsis, or omit
    /// them entirely. Those figures get their full name from the detail page.
    pub fn needs_enrichment(&self) -> bool {
        let name = self.name.trim_end();
        name.is_empty() || name.ends_with("...") || name.ends_with('…')
    }

    pub fn format_push_message(&self) -> String {
        let mut message = format!("<a href=\"{}\">{}</a> in stock.", self.link, self.extended_name);
        if !self.price.trim().is_empty() {
            message.push_str(&format!(" Price: {}", self.price));
        }
        if let Some(condition) = self.condition() {
            message.push_str(&format!(" Condition: {}", condition));
        }
        message
    }
}
