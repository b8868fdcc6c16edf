use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::time::Duration;

use crate::models::Service;

const CONFIG_PATH: &str = "data/config.yaml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub pushover_token: String,
    pub pushover_user: String,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
    #[serde(default = "default_fetch_backoff_ms")]
    pub fetch_backoff_ms: u64,
    #[serde(default = "default_page_concurrency")]
    pub page_concurrency: usize,
    #[serde(default = "default_detail_concurrency")]
    pub detail_concurrency: usize,
    pub sites: Vec<SiteConfig>,
}

/// One base site with its monitored sub-sites. Immutable after load.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SiteConfig {
    /// Deserializing straight into the closed `Service` set makes an unknown
    /// service name a load-time failure instead of a first-use surprise.
    pub service: Service,
    pub base_url: String,
    pub sub_sites: Vec<SubSiteConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubSiteConfig {
    /// Suffix appended to the site's base URL.
    pub url: String,
    /// Read a saved page instead of fetching, for replay and testing.
    #[serde(default)]
    pub local_file: Option<String>,
    /// URL template with a `{page}` placeholder. Presence switches the
    /// sub-site to parallel pagination.
    #[serde(default)]
    pub prototype_url: Option<String>,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: u32,
    #[serde(default)]
    pub searches: Vec<SearchConfig>,
}

/// A named target figure and its ordered search terms.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SearchConfig {
    pub name: String,
    pub terms: Vec<TermConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TermConfig {
    pub text: String,
    #[serde(default)]
    pub dependence: Dependence,
    /// Mandatory matching on a whole-token boundary instead of a plain
    /// substring.
    #[serde(default)]
    pub exactly: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dependence {
    Mandatory,
    #[default]
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    Individually,
    Group,
    #[default]
    None,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct ReportConfig {
    #[serde(default = "default_matched_mode")]
    pub matched: ReportMode,
    #[serde(default)]
    pub unmatched: ReportMode,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            matched: default_matched_mode(),
            unmatched: ReportMode::None,
        }
    }
}

fn default_matched_mode() -> ReportMode {
    ReportMode::Individually
}

/// Either a fixed recurring delta or a specific daily time of day. When both
/// are given the daily time wins.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Schedule {
    #[serde(default)]
    pub every: Option<Recurrence>,
    /// "HH:MM", local to UTC.
    #[serde(default)]
    pub daily: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct Recurrence {
    #[serde(default)]
    pub days: u64,
    #[serde(default)]
    pub hours: u64,
    #[serde(default)]
    pub minutes: u64,
    #[serde(default)]
    pub seconds: u64,
}

impl Recurrence {
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(
            self.days * 86_400 + self.hours * 3_600 + self.minutes * 60 + self.seconds,
        )
    }
}

impl Schedule {
    /// Time to wait from `now` until the next poll. Falls back to one minute
    /// when no schedule is configured.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        if let Some(daily) = &self.daily {
            if let Ok(time) = NaiveTime::parse_from_str(daily, "%H:%M") {
                let today = now.date_naive().and_time(time).and_utc();
                let next = if today > now {
                    today
                } else {
                    today + ChronoDuration::days(1)
                };
                return (next - now).to_std().unwrap_or(Duration::from_secs(60));
            }
            tracing::warn!("Invalid daily schedule '{}', falling back to 60s", daily);
        }

        if let Some(every) = &self.every {
            let delta = every.as_duration();
            if delta > Duration::ZERO {
                return delta;
            }
        }

        Duration::from_secs(60)
    }
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_fetch_retries() -> u32 {
    10
}

fn default_fetch_backoff_ms() -> u64 {
    500
}

fn default_page_concurrency() -> usize {
    8
}

fn default_detail_concurrency() -> usize {
    30
}

fn default_min_confidence() -> u32 {
    60
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_str = fs::read_to_string(CONFIG_PATH)
            .with_context(|| format!("Failed to read {}", CONFIG_PATH))?;
        let mut config: Config = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", CONFIG_PATH))?;

        // Override with environment variables if present
        if let Ok(token) = env::var("PUSHOVER_TOKEN") {
            config.pushover_token = token;
        }

        if let Ok(user) = env::var("PUSHOVER_USER") {
            config.pushover_user = user;
        }

        if let Ok(tracing_level) = env::var("TRACING_LEVEL") {
            config.tracing_level = tracing_level;
        }

        if let Ok(user_agent) = env::var("USER_AGENT") {
            config.user_agent = user_agent;
        }

        if let Ok(retries) = env::var("FETCH_RETRIES") {
            config.fetch_retries = retries
                .parse()
                .context("Failed to parse FETCH_RETRIES environment variable")?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sites.is_empty() {
            anyhow::bail!("At least one site is required in {}", CONFIG_PATH);
        }

        for site in &self.sites {
            if site.sub_sites.is_empty() {
                anyhow::bail!("Site '{}' has no sub_sites", site.service);
            }
            for sub_site in &site.sub_sites {
                if let Some(prototype) = &sub_site.prototype_url {
                    if !prototype.contains("{page}") {
                        anyhow::bail!(
                            "prototype_url for '{}{}' is missing the {{page}} placeholder",
                            site.base_url,
                            sub_site.url
                        );
                    }
                }
                for search in &sub_site.searches {
                    if search.terms.is_empty() {
                        anyhow::bail!("Search '{}' has no terms", search.name);
                    }
                }
            }
        }

        Ok(())
    }

    pub fn create_default() -> Result<()> {
        std::fs::create_dir_all("data")?;

        let default_config = Config {
            pushover_token: "YOUR_PUSHOVER_APP_TOKEN".to_string(),
            pushover_user: "YOUR_PUSHOVER_USER_KEY".to_string(),
            tracing_level: default_tracing_level(),
            user_agent: default_user_agent(),
            fetch_retries: default_fetch_retries(),
            fetch_backoff_ms: default_fetch_backoff_ms(),
            page_concurrency: default_page_concurrency(),
            detail_concurrency: default_detail_concurrency(),
            sites: vec![SiteConfig {
                service: Service::Jungle,
                base_url: "http://jungle-scs.co.jp/sale_en/".to_string(),
                sub_sites: vec![SubSiteConfig {
                    url: "?page_id=116&cat=313&vw=nk".to_string(),
                    local_file: None,
                    prototype_url: None,
                    schedule: Schedule {
                        every: Some(Recurrence {
                            minutes: 1,
                            ..Recurrence::default()
                        }),
                        daily: None,
                    },
                    report: ReportConfig::default(),
                    min_confidence: default_min_confidence(),
                    searches: vec![SearchConfig {
                        name: "Racing Miku".to_string(),
                        terms: vec![
                            TermConfig {
                                text: "Nendoroid".to_string(),
                                dependence: Dependence::Mandatory,
                                exactly: true,
                            },
                            TermConfig {
                                text: "Racing Miku".to_string(),
                                dependence: Dependence::Optional,
                                exactly: false,
                            },
                        ],
                    }],
                }],
            }],
        };

        let config_str = serde_yaml::to_string(&default_config)?;
        fs::write(CONFIG_PATH, config_str)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
pushover_token: token
pushover_user: user
sites:
  - service: jungle
    base_url: "http://jungle-scs.co.jp/sale_en/"
    sub_sites:
      - url: "?page_id=116&cat=313"
        schedule:
          every:
            minutes: 5
        searches:
          - name: "Racing Miku"
            terms:
              - text: "Nendoroid"
                dependence: mandatory
                exactly: true
              - text: "Racing Miku"
  - service: amiami
    base_url: "https://www.amiami.com/eng/"
    sub_sites:
      - url: "search/list/?s_st_condition_flg=1"
        prototype_url: "https://www.amiami.com/eng/search/list/?s_st_condition_flg=1&pagecnt={page}"
        min_confidence: 70
        report:
          matched: group
"#;

    #[test]
    fn test_parse_sample_config() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.sites[0].service, Service::Jungle);
        assert_eq!(config.sites[1].service, Service::Amiami);
        assert_eq!(config.fetch_retries, 10);
        assert_eq!(config.page_concurrency, 8);
        assert_eq!(config.detail_concurrency, 30);

        let jungle_sub = &config.sites[0].sub_sites[0];
        assert_eq!(jungle_sub.min_confidence, 60);
        assert_eq!(jungle_sub.report.matched, ReportMode::Individually);
        assert_eq!(jungle_sub.report.unmatched, ReportMode::None);
        let terms = &jungle_sub.searches[0].terms;
        assert_eq!(terms[0].dependence, Dependence::Mandatory);
        assert!(terms[0].exactly);
        assert_eq!(terms[1].dependence, Dependence::Optional);
        assert!(!terms[1].exactly);

        let amiami_sub = &config.sites[1].sub_sites[0];
        assert!(amiami_sub.prototype_url.is_some());
        assert_eq!(amiami_sub.min_confidence, 70);
        assert_eq!(amiami_sub.report.matched, ReportMode::Group);
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_service_fails_at_load() {
        let yaml = SAMPLE.replace("service: jungle", "service: mandarake");
        let parsed: Result<Config, _> = serde_yaml::from_str(&yaml);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_prototype_without_placeholder_fails_validation() {
        let yaml = SAMPLE.replace("&pagecnt={page}", "");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_recurrence_as_duration() {
        let recurrence = Recurrence {
            days: 1,
            hours: 2,
            minutes: 3,
            seconds: 4,
        };
        assert_eq!(
            recurrence.as_duration(),
            Duration::from_secs(86_400 + 7_200 + 180 + 4)
        );
    }

    #[test]
    fn test_schedule_daily_next_delay() {
        let schedule = Schedule {
            every: None,
            daily: Some("12:30".to_string()),
        };
        let now = "2026-08-24T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(schedule.next_delay(now), Duration::from_secs(2 * 3_600 + 30 * 60));

        // Already past today: schedule for tomorrow
        let late = "2026-08-24T13:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(schedule.next_delay(late), Duration::from_secs(23 * 3_600 + 30 * 60));
    }

    #[test]
    fn test_schedule_default_is_one_minute() {
        assert_eq!(
            Schedule::default().next_delay(Utc::now()),
            Duration::from_secs(60)
        );
    }
}
