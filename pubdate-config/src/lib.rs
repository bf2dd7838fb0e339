//! Loader for service configuration with YAML + environment overlays.
//!
//! Sources are merged in this order, later ones winning: files and inline
//! YAML in the order they were added, then `PUBDATE_`-prefixed environment
//! variables (`PUBDATE_SERVICE__WORKERS=8`). After merging, every string value
//! has `${VAR}` placeholders expanded, and missing sections fall back to
//! their defaults, so an empty document is a valid configuration.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod site;

pub use site::{
    DateOrder, KeySet, OverrideError, OverrideMethod, OverrideRule, SiteData, SiteOverride,
    SiteOverrideFields, SiteOverrideSpec, normalize_host,
};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

pub const ENV_PREFIX: &str = "PUBDATE";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PubdateConfig {
    pub service: ServiceConfig,
    pub acquire: AcquireConfig,
    pub browser: BrowserConfig,
    pub logging: LoggingConfig,
    pub thresholds: Thresholds,
    pub data: SiteData,
}

/// Job queue, worker pool and result cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub workers: usize,
    /// Total attempts per job, including the first.
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub job_timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
            retry_backoff_ms: 500,
            job_timeout_ms: 15_000,
            cache_ttl_secs: 600,
            cache_max_entries: 1000,
        }
    }
}

impl ServiceConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcquireConfig {
    pub render_enabled: bool,
    /// Head start given to the plain fetch before a render is launched.
    pub render_delay_ms: u64,
    pub fetch_timeout_ms: u64,
    pub render_timeout_ms: u64,
    /// `None` leaves the HTTP client's own default in place.
    pub user_agent: Option<String>,
    pub fallback_user_agent: String,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            render_enabled: true,
            render_delay_ms: 200,
            fetch_timeout_ms: 15_000,
            render_timeout_ms: 15_000,
            user_agent: None,
            fallback_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/106.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub max_concurrency: usize,
    pub idle_close_ms: u64,
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            max_concurrency: 2,
            idle_close_ms: 10_000,
            headless: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `text` or `json`.
    pub format: String,
    pub emit_stderr: bool,
    pub filter: String,
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            emit_stderr: false,
            filter: "info".to_string(),
            dir: None,
        }
    }
}

/// Plausibility limits applied to every parsed date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Longer inputs are not treated as dates unless a caller opts out.
    pub max_input_len: usize,
    pub max_age_years: u32,
    pub min_fragment_len: usize,
    pub min_fragment_digits: usize,
    /// A URL date newer than this is trusted immediately.
    pub recent_url_days: i64,
    /// Slack added to "today" to absorb timezone skew.
    pub future_buffer_days: i64,
    /// A date older than this whose text has no four digit year is moved
    /// into the current year.
    pub missing_year_age_years: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_input_len: 100,
            max_age_years: 19,
            min_fragment_len: 5,
            min_fragment_digits: 3,
            recent_url_days: 3,
            future_buffer_days: 1,
            missing_year_age_years: 10,
        }
    }
}

/// `$XDG_CONFIG_HOME/pubdate/pubdate.yaml` or the platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pubdate").join("pubdate.yaml"))
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let next = shellexpand::env(&cur)
                        .map(|cow| cow.into_owned())
                        .unwrap_or_else(|_| cur.clone());
                    if next == cur {
                        break;
                    }
                    cur = next;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder over the `config` crate wiring.
pub struct PubdateConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    env: bool,
}

impl Default for PubdateConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PubdateConfigLoader {
    /// ```
    /// use pubdate_config::PubdateConfigLoader;
    ///
    /// let cfg = PubdateConfigLoader::new()
    ///     .with_yaml_str("service:\n  workers: 2")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(cfg.service.workers, 2);
    /// assert_eq!(cfg.service.max_attempts, 3);
    /// assert_eq!(cfg.thresholds.max_age_years, 19);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            env: true,
        }
    }

    /// Skip the `PUBDATE_` environment overlay.
    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    /// Required YAML/TOML/JSON file; format is inferred from the suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Merged only when the file exists.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Merge all sources, expand `${VAR}` placeholders and validate the site
    /// overrides.
    ///
    /// ```
    /// use pubdate_config::{OverrideRule, PubdateConfigLoader};
    ///
    /// let cfg = PubdateConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// data:
    ///   sites:
    ///     example.com: ".story-meta time"
    ///     news.test:
    ///       method: linkedData
    ///       key: "@graph.0.datePublished"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// let sites = cfg.data.compile_sites().unwrap();
    /// assert!(matches!(
    ///     sites["news.test"].rule,
    ///     Some(OverrideRule::LinkedData { .. })
    /// ));
    /// ```
    pub fn load(self) -> Result<PubdateConfig, ConfigError> {
        let mut builder = self.builder;
        if self.env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }
        let cfg = builder.build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: PubdateConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;

        typed
            .data
            .compile_sites()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_in_nested_values() {
        temp_env::with_vars([("WD_HOST", Some("chrome")), ("WD_PORT", Some("4444"))], || {
            let mut v = json!({ "browser": { "webdriver_url": "http://${WD_HOST}:${WD_PORT}" }, "n": 1 });
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!({ "browser": { "webdriver_url": "http://chrome:4444" }, "n": 1 })
            );
        });
    }

    #[test]
    fn expands_recursively_and_terminates_on_cycles() {
        temp_env::with_vars(
            [
                ("INNER", Some("deep")),
                ("OUTER", Some("x-${INNER}")),
                ("CYC_A", Some("${CYC_B}")),
                ("CYC_B", Some("${CYC_A}")),
            ],
            || {
                let mut v = json!(["${OUTER}", "${CYC_A}"]);
                expand_env_in_value(&mut v);
                assert_eq!(v[0], json!("x-deep"));
                assert!(v[1].as_str().unwrap().contains("${"));
            },
        );
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("ua-${PUBDATE_DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("ua-${PUBDATE_DOES_NOT_EXIST}"));
    }

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = PubdateConfigLoader::new()
            .without_env()
            .with_yaml_str("{}")
            .load()
            .unwrap();
        assert_eq!(cfg.service.workers, 4);
        assert_eq!(cfg.acquire.render_delay_ms, 200);
        assert_eq!(cfg.browser.max_concurrency, 2);
        assert_eq!(cfg.thresholds, Thresholds::default());
        assert!(!cfg.data.json_keys.publish.is_empty());
    }

    #[test]
    fn yaml_replaces_whole_lists() {
        let cfg = PubdateConfigLoader::new()
            .without_env()
            .with_yaml_str("data:\n  generic_selectors: ['.when']\n")
            .load()
            .unwrap();
        assert_eq!(cfg.data.generic_selectors, vec![".when".to_string()]);
        assert!(!cfg.data.months.is_empty());
    }

    #[test]
    fn invalid_override_fails_load() {
        let err = PubdateConfigLoader::new()
            .without_env()
            .with_yaml_str("data:\n  sites:\n    a.test:\n      method: html\n")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("a.test"));
    }
}
