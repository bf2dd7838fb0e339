use rand::prelude::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Snapshot of user agent, viewport, and locale characteristics.
pub struct UserAgentProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub languages: Vec<String>,
}

impl UserAgentProfile {
    fn desktop(user_agent: &str, viewport: (u32, u32)) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            viewport,
            languages: vec!["en-US".to_string(), "en".to_string()],
        }
    }
}

#[derive(Debug, Clone)]
/// Maintains a small pool of plausible desktop profiles; each browser
/// session picks one at launch.
pub struct UserAgentManager {
    desktop_profiles: Vec<UserAgentProfile>,
}

impl Default for UserAgentManager {
    fn default() -> Self {
        Self::new()
    }
}

impl UserAgentManager {
    /// Create a new manager with built-in desktop profiles.
    pub fn new() -> Self {
        Self {
            desktop_profiles: vec![
                UserAgentProfile::desktop(
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
                    (1920, 1080),
                ),
                UserAgentProfile::desktop(
                    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
                    (1440, 900),
                ),
                UserAgentProfile::desktop(
                    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
                    (1366, 768),
                ),
            ],
        }
    }

    /// Pin every session to a single user agent.
    pub fn fixed(user_agent: &str) -> Self {
        Self {
            desktop_profiles: vec![UserAgentProfile::desktop(user_agent, (1920, 1080))],
        }
    }

    /// Random profile from the pool.
    pub fn pick(&self) -> UserAgentProfile {
        let mut rng = rand::thread_rng();
        self.desktop_profiles
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| UserAgentManager::new().desktop_profiles[0].clone())
    }
}
