use super::fingerprint::UserAgentProfile;
use serde_json::{json, Value};
use webdriver::capabilities::Capabilities;

/// Chrome content-setting value that blocks a resource class.
const BLOCK: u8 = 2;

/// Construct Chrome command-line arguments for a session.
pub fn chrome_arguments(headless: bool, profile: &UserAgentProfile) -> Vec<String> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-infobars".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-extensions".to_string(),
        "--disable-plugins-discovery".to_string(),
        "--blink-settings=imagesEnabled=false".to_string(),
        "--mute-audio".to_string(),
        format!("--user-agent={}", profile.user_agent),
        format!("--window-size={},{}", profile.viewport.0, profile.viewport.1),
        format!("--lang={}", profile.languages.join(",")),
    ];
    if headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    args
}

/// Profile preferences: no JavaScript, images, media or plugins.
pub fn chrome_prefs() -> Value {
    json!({
        "profile.managed_default_content_settings.javascript": BLOCK,
        "profile.managed_default_content_settings.images": BLOCK,
        "profile.managed_default_content_settings.media_stream": BLOCK,
        "profile.managed_default_content_settings.plugins": BLOCK,
        "profile.default_content_setting_values.notifications": BLOCK,
    })
}

/// `goog:chromeOptions` capabilities for a new session.
pub fn capabilities(headless: bool, profile: &UserAgentProfile) -> Capabilities {
    let mut caps = Capabilities::new();
    caps.insert(
        "goog:chromeOptions".to_string(),
        json!({
            "args": chrome_arguments(headless, profile),
            "prefs": chrome_prefs(),
        }),
    );
    // Return once the document is parsed; sub-resources do not matter.
    caps.insert("pageLoadStrategy".to_string(), json!("eager"));
    caps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fingerprint::UserAgentManager;

    #[test]
    fn javascript_and_images_are_blocked() {
        let profile = UserAgentManager::fixed("ua/1").pick();
        let caps = capabilities(true, &profile);
        let opts = &caps["goog:chromeOptions"];
        assert_eq!(
            opts["prefs"]["profile.managed_default_content_settings.javascript"],
            json!(2)
        );
        let args: Vec<&str> = opts["args"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(args.contains(&"--headless=new"));
        assert!(args.contains(&"--user-agent=ua/1"));
    }

    #[test]
    fn headed_sessions_skip_headless_flags() {
        let profile = UserAgentManager::fixed("ua/1").pick();
        let args = chrome_arguments(false, &profile);
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }
}
