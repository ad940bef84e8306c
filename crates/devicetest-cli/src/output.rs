//! Stdout formatting for command results.

use serde_json::{json, Value};

use devicetest_core::config::TestConfig;

pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!("{}", value),
    }
}

/// What the environment resolved to. Credentials are never printed.
pub fn env_summary(config: &TestConfig) -> Value {
    let endpoint = config.server_endpoint();
    json!({
        "platform": config.platform().to_string(),
        "environment": config.environment,
        "isAndroid": config.is_android(),
        "isLocal": config.is_local_environment(),
        "branch": config.branch,
        "server": endpoint.base_url,
        "authenticated": endpoint.credentials.is_some(),
    })
}
