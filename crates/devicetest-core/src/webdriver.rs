//! [`AutomationDriver`] implementation backed by a WebDriver HTTP server.
//!
//! [`WebDriverClient`] speaks the W3C WebDriver JSON protocol with the Appium
//! extensions a mobile test needs. It accepts both W3C and legacy JSON Wire
//! response shapes. Command paths are joined onto the endpoint's base URL,
//! which is `/wd/hub` for Appium 1 and hosted grids; Appium 2 serves the same
//! paths when started with `--base-path /wd/hub`.
//!
//! # Example
//!
//! ```no_run
//! use devicetest_core::capabilities::Capabilities;
//! use devicetest_core::driver::{AutomationDriver, ServerEndpoint};
//! use devicetest_core::webdriver::WebDriverClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = WebDriverClient::new(ServerEndpoint::local(4723))?;
//! let id = client.init_session(Capabilities::android8()).await?;
//! println!("session {id}");
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, trace};

use crate::capabilities::Capabilities;
use crate::driver::{AutomationDriver, DriverError, ServerEndpoint};
use crate::element::{
    ElementRect, ElementRef, Locator, Point, Size, LEGACY_ELEMENT_KEY, W3C_ELEMENT_KEY,
};
use crate::gesture::TouchAction;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Timeout for establishing the HTTP connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

/// Extracts the `value` of a response body, turning WebDriver error payloads
/// into [`DriverError::Remote`].
fn unwrap_value(status: reqwest::StatusCode, text: &str) -> Result<Value, DriverError> {
    let body: Value = match serde_json::from_str(text) {
        Ok(body) => body,
        Err(e) if status.is_success() => return Err(DriverError::JsonParse(e.to_string())),
        Err(_) => return Err(DriverError::Http(format!("{status}: {text}"))),
    };

    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if let Some(error) = value.get("error").and_then(Value::as_str) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(DriverError::Remote {
            error: error.to_string(),
            message: message.to_string(),
        });
    }

    // JSON Wire reports failures through a non-zero numeric status.
    if let Some(code) = body.get("status").and_then(Value::as_i64) {
        if code != 0 {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Err(DriverError::Remote {
                error: legacy_error_name(code).to_string(),
                message: message.to_string(),
            });
        }
    }

    if !status.is_success() {
        return Err(DriverError::Http(format!("{status}: {text}")));
    }

    // Legacy new-session responses carry the id beside the value.
    if let (Some(session_id), Value::Object(mut map)) = (body.get("sessionId"), value.clone()) {
        if !map.contains_key("sessionId") && !session_id.is_null() {
            map.insert("sessionId".into(), session_id.clone());
            return Ok(Value::Object(map));
        }
    }

    Ok(value)
}

fn legacy_error_name(code: i64) -> &'static str {
    match code {
        7 => "no such element",
        10 => "stale element reference",
        6 => "invalid session id",
        11 => "element not interactable",
        21 => "timeout",
        33 => "session not created",
        _ => "unknown error",
    }
}

fn parse_session_id(value: &Value) -> Result<String, DriverError> {
    value
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DriverError::JsonParse(format!("no sessionId in response: {value}")))
}

fn parse_element(value: &Value) -> Result<ElementRef, DriverError> {
    value
        .get(W3C_ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(ElementRef::new)
        .ok_or_else(|| DriverError::JsonParse(format!("no element reference in response: {value}")))
}

// ---------------------------------------------------------------------------
// WebDriverClient
// ---------------------------------------------------------------------------

/// An [`AutomationDriver`] talking to a WebDriver server over HTTP.
///
/// Holds at most one session. Session-scoped commands issued before
/// [`init_session`](AutomationDriver::init_session) (or
/// [`attach`](Self::attach)) fail with [`DriverError::NoSession`].
pub struct WebDriverClient {
    endpoint: ServerEndpoint,
    http: reqwest::Client,
    session_id: Option<String>,
}

impl WebDriverClient {
    /// Creates a client for the given server. No request is made yet.
    pub fn new(endpoint: ServerEndpoint) -> Result<Self, DriverError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            endpoint,
            http,
            session_id: None,
        })
    }

    /// Creates a client bound to a session opened elsewhere.
    pub fn attach(endpoint: ServerEndpoint, session_id: impl Into<String>) -> Result<Self, DriverError> {
        let mut client = Self::new(endpoint)?;
        client.session_id = Some(session_id.into());
        Ok(client)
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    /// Builds `session/{id}/{suffix}`, failing when no session is open.
    fn session_path(&self, suffix: &str) -> Result<String, DriverError> {
        let id = self.session_id.as_deref().ok_or(DriverError::NoSession)?;
        if suffix.is_empty() {
            Ok(format!("session/{id}"))
        } else {
            Ok(format!("session/{id}/{suffix}"))
        }
    }

    /// Sends one command and returns the `value` of the response.
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        let url = self.endpoint.url(path);
        debug!(%method, %url, "webdriver command");

        let mut request = self.http.request(method, &url);
        if let Some((user, key)) = &self.endpoint.credentials {
            request = request.basic_auth(user, Some(key));
        }
        if let Some(body) = body {
            trace!(%body, "request body");
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        trace!(%status, body = %text, "response");

        unwrap_value(status, &text)
    }

    /// Reads the element's rect in one round trip.
    pub async fn element_rect(&self, element: &ElementRef) -> Result<ElementRect, DriverError> {
        let path = self.session_path(&format!("element/{}/rect", element.id))?;
        let value = self.command(Method::GET, &path, None).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl AutomationDriver for WebDriverClient {
    #[instrument(skip(self, capabilities), fields(platform = %capabilities.platform_name))]
    async fn init_session(&mut self, capabilities: Capabilities) -> Result<String, DriverError> {
        let payload = capabilities.new_session_payload();
        let value = self.command(Method::POST, "session", Some(payload)).await?;
        let id = parse_session_id(&value)?;
        info!(session_id = %id, "session opened");
        self.session_id = Some(id.clone());
        Ok(id)
    }

    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    async fn status(&self) -> Result<Value, DriverError> {
        self.command(Method::GET, "status", None).await
    }

    async fn set_implicit_wait(&self, timeout: Duration) -> Result<(), DriverError> {
        let path = self.session_path("timeouts")?;
        let body = json!({ "implicit": timeout.as_millis() as u64 });
        self.command(Method::POST, &path, Some(body)).await?;
        Ok(())
    }

    async fn find_element(&self, locator: &Locator) -> Result<ElementRef, DriverError> {
        let path = self.session_path("element")?;
        let body = json!({ "using": locator.strategy(), "value": locator.value() });
        let value = self.command(Method::POST, &path, Some(body)).await?;
        parse_element(&value)
    }

    async fn element_location(&self, element: &ElementRef) -> Result<Point, DriverError> {
        Ok(self.element_rect(element).await?.location())
    }

    async fn element_size(&self, element: &ElementRef) -> Result<Size, DriverError> {
        Ok(self.element_rect(element).await?.size())
    }

    async fn clear(&self, element: &ElementRef) -> Result<(), DriverError> {
        let path = self.session_path(&format!("element/{}/clear", element.id))?;
        self.command(Method::POST, &path, Some(json!({}))).await?;
        Ok(())
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), DriverError> {
        let path = self.session_path(&format!("element/{}/value", element.id))?;
        let chars: Vec<String> = text.chars().map(String::from).collect();
        let body = json!({ "text": text, "value": chars });
        self.command(Method::POST, &path, Some(body)).await?;
        Ok(())
    }

    async fn perform_touch(&self, action: &TouchAction) -> Result<(), DriverError> {
        let path = self.session_path("actions")?;
        self.command(Method::POST, &path, Some(action.to_w3c_actions()))
            .await?;
        self.command(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        let path = self.session_path("")?;
        self.command(Method::DELETE, &path, None).await?;
        if let Some(id) = self.session_id.take() {
            info!(session_id = %id, "session closed");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
