//! Capability sets describing the session to open.
//!
//! [`Capabilities::for_config`] picks the Android or iOS template, points it at
//! the app under test (a local build for local runs, a pre-uploaded artifact in
//! remote storage otherwise) and, for remote runs, names and tags the session
//! after the CI branch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{Platform, TestConfig};

/// Prefix of app references that point into the hosted grid's storage.
pub const REMOTE_STORAGE_PREFIX: &str = "sauce-storage:";

/// Pre-uploaded Android package in remote storage.
pub const REMOTE_ANDROID_APP: &str = "sauce-storage:Gutenberg.apk";

/// Pre-uploaded iOS bundle in remote storage.
pub const REMOTE_IOS_APP: &str = "sauce-storage:Gutenberg.app.zip";

/// Product name used for remote session names and tags.
pub const PRODUCT_NAME: &str = "Gutenberg";

/// Capability keys defined by W3C WebDriver; everything else is vendor-prefixed.
const W3C_STANDARD_KEYS: &[&str] = &[
    "platformName",
    "browserName",
    "browserVersion",
    "acceptInsecureCerts",
    "pageLoadStrategy",
    "proxy",
    "setWindowRect",
    "timeouts",
    "unhandledPromptBehavior",
];

/// Keys that the hosted grid expects inside `sauce:options`.
const GRID_OPTION_KEYS: &[&str] = &["name", "tags"];

/// A capability set for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub platform_name: String,
    pub platform_version: String,
    pub device_name: String,
    pub automation_name: String,

    /// Local path or remote-storage reference of the app under test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,

    /// Human-readable session name (remote runs only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Session tags (remote runs only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    /// Template-specific extras such as `deviceOrientation`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Capabilities {
    /// Android 8 emulator template.
    pub fn android8() -> Self {
        let mut extra = Map::new();
        extra.insert("deviceOrientation".into(), Value::from("portrait"));
        Self {
            platform_name: "Android".to_string(),
            platform_version: "8.0".to_string(),
            device_name: "Android Emulator".to_string(),
            automation_name: "UiAutomator2".to_string(),
            app: None,
            name: None,
            tags: None,
            extra,
        }
    }

    /// iOS 12 simulator template.
    pub fn ios12() -> Self {
        let mut extra = Map::new();
        extra.insert("deviceOrientation".into(), Value::from("portrait"));
        Self {
            platform_name: "iOS".to_string(),
            platform_version: "12.1".to_string(),
            device_name: "iPhone Simulator".to_string(),
            automation_name: "XCUITest".to_string(),
            app: None,
            name: None,
            tags: None,
            extra,
        }
    }

    /// Build the capability set for a run.
    pub fn for_config(config: &TestConfig) -> Self {
        let local = config.is_local_environment();

        let mut caps = match config.platform() {
            Platform::Android => {
                let mut caps = Self::android8();
                caps.app = Some(if local {
                    config.android_app_path.to_string_lossy().into_owned()
                } else {
                    REMOTE_ANDROID_APP.to_string()
                });
                caps
            }
            Platform::Ios => {
                let mut caps = Self::ios12();
                caps.app = Some(if local {
                    config.ios_app_path.to_string_lossy().into_owned()
                } else {
                    REMOTE_IOS_APP.to_string()
                });
                caps
            }
        };

        if !local {
            // A missing branch leaves an empty segment; the grid decides whether it cares.
            let branch = config.branch_or_empty();
            caps.name = Some(format!(
                "{PRODUCT_NAME} Editor Tests[{}]-{branch}",
                config.platform
            ));
            caps.tags = Some(vec![PRODUCT_NAME.to_string(), branch.to_string()]);
        }

        caps
    }

    /// True if the app source points into remote storage rather than the local disk.
    pub fn app_is_remote(&self) -> bool {
        self.app
            .as_deref()
            .is_some_and(|app| app.starts_with(REMOTE_STORAGE_PREFIX))
    }

    /// The capability set as a flat JSON object (legacy `desiredCapabilities` form).
    pub fn to_json(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// The body of a `POST /session` request.
    ///
    /// Carries both the W3C `capabilities` form, with non-standard keys
    /// prefixed by `appium:` and grid metadata moved into `sauce:options`, and
    /// the legacy `desiredCapabilities` form for older servers.
    pub fn new_session_payload(&self) -> Value {
        let desired = self.to_json();
        let mut always_match = Map::new();
        let mut grid_options = Map::new();

        for (key, value) in &desired {
            if W3C_STANDARD_KEYS.contains(&key.as_str()) || key.contains(':') {
                always_match.insert(key.clone(), value.clone());
            } else if GRID_OPTION_KEYS.contains(&key.as_str()) {
                grid_options.insert(key.clone(), value.clone());
            } else {
                always_match.insert(format!("appium:{key}"), value.clone());
            }
        }
        if !grid_options.is_empty() {
            always_match.insert("sauce:options".into(), Value::Object(grid_options));
        }

        serde_json::json!({
            "capabilities": {
                "alwaysMatch": always_match,
                "firstMatch": [{}],
            },
            "desiredCapabilities": desired,
        })
    }
}
