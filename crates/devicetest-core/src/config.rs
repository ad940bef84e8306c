//! Test run configuration resolved from the environment.
//!
//! A [`TestConfig`] is built once when the test program starts and passed by
//! reference to everything that needs to know the target platform or where the
//! automation server lives. Resolution never fails: unset or empty variables
//! fall back to fixed defaults, and odd values are carried through as-is.
//!
//! # Example
//!
//! ```no_run
//! use devicetest_core::config::TestConfig;
//!
//! let config = TestConfig::from_env();
//! if config.is_android() && config.is_local_environment() {
//!     println!("local android run against {}", config.android_app_path.display());
//! }
//! ```

use std::fmt;
use std::path::PathBuf;

use crate::driver::ServerEndpoint;

/// Target platform name variable.
pub const PLATFORM_VAR: &str = "TEST_RN_PLATFORM";
/// Test environment name variable (`local` or anything else for the hosted grid).
pub const ENVIRONMENT_VAR: &str = "TEST_ENV";
pub const ANDROID_APP_PATH_VAR: &str = "ANDROID_APP_PATH";
pub const IOS_APP_PATH_VAR: &str = "IOS_APP_PATH";
/// CI branch identifier, embedded in remote session names and tags.
pub const BRANCH_VAR: &str = "CIRCLE_BRANCH";
pub const APPIUM_PORT_VAR: &str = "APPIUM_PORT";
pub const REMOTE_USER_VAR: &str = "SAUCE_USERNAME";
pub const REMOTE_KEY_VAR: &str = "SAUCE_ACCESS_KEY";

pub const DEFAULT_PLATFORM: &str = "android";
pub const DEFAULT_ENVIRONMENT: &str = "local";
pub const DEFAULT_ANDROID_APP_PATH: &str = "./android/app/build/outputs/apk/debug/app-debug.apk";
pub const DEFAULT_IOS_APP_PATH: &str =
    "./ios/build/gutenberg/Build/Products/Debug-iphonesimulator/gutenberg.app";
/// Port the local Appium server is spawned on.
pub const DEFAULT_APPIUM_PORT: u16 = 4723;
/// WebDriver hub of the hosted device grid.
pub const DEFAULT_REMOTE_URL: &str = "https://ondemand.saucelabs.com:443/wd/hub";

/// The two platforms the suite runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Android,
    Ios,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Android => f.write_str("android"),
            Platform::Ios => f.write_str("ios"),
        }
    }
}

/// Resolved configuration for one test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConfig {
    /// Platform name as configured (not normalized).
    pub platform: String,
    /// Environment name as configured (not normalized).
    pub environment: String,
    pub android_app_path: PathBuf,
    pub ios_app_path: PathBuf,
    /// CI branch, if known.
    pub branch: Option<String>,
    pub local_port: u16,
    pub remote_url: String,
    pub remote_user: Option<String>,
    pub remote_key: Option<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            platform: DEFAULT_PLATFORM.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            android_app_path: PathBuf::from(DEFAULT_ANDROID_APP_PATH),
            ios_app_path: PathBuf::from(DEFAULT_IOS_APP_PATH),
            branch: None,
            local_port: DEFAULT_APPIUM_PORT,
            remote_url: DEFAULT_REMOTE_URL.to_string(),
            remote_user: None,
            remote_key: None,
        }
    }
}

impl TestConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration from an arbitrary variable lookup.
    ///
    /// Empty values count as unset. An unparsable port falls back to the
    /// default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Self {
            platform: get(PLATFORM_VAR).unwrap_or(defaults.platform),
            environment: get(ENVIRONMENT_VAR).unwrap_or(defaults.environment),
            android_app_path: get(ANDROID_APP_PATH_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.android_app_path),
            ios_app_path: get(IOS_APP_PATH_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.ios_app_path),
            branch: get(BRANCH_VAR),
            local_port: get(APPIUM_PORT_VAR)
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.local_port),
            remote_url: defaults.remote_url,
            remote_user: get(REMOTE_USER_VAR),
            remote_key: get(REMOTE_KEY_VAR),
        }
    }

    /// True iff the configured platform is `android`, ignoring case.
    pub fn is_android(&self) -> bool {
        self.platform.eq_ignore_ascii_case("android")
    }

    /// True iff the configured environment is `local`, ignoring case.
    pub fn is_local_environment(&self) -> bool {
        self.environment.eq_ignore_ascii_case("local")
    }

    /// Typed platform. Anything that is not android is treated as iOS.
    pub fn platform(&self) -> Platform {
        if self.is_android() {
            Platform::Android
        } else {
            Platform::Ios
        }
    }

    /// The branch identifier, or an empty string when unknown.
    pub fn branch_or_empty(&self) -> &str {
        self.branch.as_deref().unwrap_or("")
    }

    /// The automation server to open sessions against.
    ///
    /// Local runs use the Appium server on localhost; everything else goes to
    /// the hosted grid, authenticated when both user and key are set.
    pub fn server_endpoint(&self) -> ServerEndpoint {
        if self.is_local_environment() {
            return ServerEndpoint::local(self.local_port);
        }
        let endpoint = ServerEndpoint::new(self.remote_url.clone());
        match (&self.remote_user, &self.remote_key) {
            (Some(user), Some(key)) => endpoint.with_credentials(user.clone(), key.clone()),
            _ => endpoint,
        }
    }
}
