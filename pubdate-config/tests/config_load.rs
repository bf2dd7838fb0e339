use pubdate_common::FetchMethod;
use pubdate_config::{DateOrder, OverrideRule, PubdateConfigLoader};
use serial_test::serial;
use std::{fs, path::PathBuf};
use tempfile::TempDir;

fn write_yaml(tmp: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, yaml).expect("write yaml");
    p
}

const FILE_YAML: &str = r#"
service:
  workers: 2
  max_attempts: 5
acquire:
  fallback_user_agent: "${PUBDATE_TEST_UA}"
browser:
  webdriver_url: "http://${PUBDATE_TEST_WD_HOST}:9515"
thresholds:
  max_age_years: 25
data:
  tlds:
    ca: dmy
  sites:
    example.com: ".article-meta time"
    video.test:
      method: html
      key: uploadedAt
      path: "^/watch"
      fetch: render
      stop_if_not_found: true
"#;

#[test]
#[serial]
fn file_values_env_expansion_and_overrides() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "pubdate.yaml", FILE_YAML);

    temp_env::with_vars(
        [
            ("PUBDATE_TEST_UA", Some("TestAgent/1.0")),
            ("PUBDATE_TEST_WD_HOST", Some("chromedriver")),
            ("PUBDATE_SERVICE__WORKERS", Some("7")),
        ],
        || {
            let cfg = PubdateConfigLoader::new()
                .with_file(&p)
                .load()
                .expect("load config");

            assert_eq!(cfg.service.workers, 7, "env overlay wins over file");
            assert_eq!(cfg.service.max_attempts, 5);
            assert_eq!(cfg.service.job_timeout_ms, 15_000);
            assert_eq!(cfg.acquire.fallback_user_agent, "TestAgent/1.0");
            assert_eq!(cfg.browser.webdriver_url, "http://chromedriver:9515");
            assert_eq!(cfg.thresholds.max_age_years, 25);
            assert_eq!(cfg.thresholds.max_input_len, 100);
            assert_eq!(cfg.data.date_order_for_host("globe.ca"), DateOrder::Dmy);

            let sites = cfg.data.compile_sites().unwrap();
            let video = &sites["video.test"];
            assert_eq!(
                video.rule,
                Some(OverrideRule::RawHtml {
                    key: "uploadedAt".into()
                })
            );
            assert_eq!(video.fetch, Some(FetchMethod::Render));
            assert!(video.applies("/watch/123", false));
            assert!(!video.applies("/news/123", false));
            assert!(sites["example.com"].stop_if_not_found);
        },
    );
}

#[test]
#[serial]
fn missing_optional_file_is_fine() {
    let tmp = TempDir::new().unwrap();
    let cfg = PubdateConfigLoader::new()
        .without_env()
        .with_optional_file(tmp.path().join("absent.yaml"))
        .load()
        .expect("optional file");
    assert_eq!(cfg.service.cache_max_entries, 1000);
}

#[test]
#[serial]
fn missing_required_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let res = PubdateConfigLoader::new()
        .without_env()
        .with_file(tmp.path().join("absent.yaml"))
        .load();
    assert!(res.is_err());
}
