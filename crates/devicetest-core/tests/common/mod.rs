//! Shared test helpers for devicetest-core integration tests.
//!
//! Provides a recording in-memory [`FakeDriver`] for exercising the session
//! factory and interaction helpers, and a scripted mock WebDriver HTTP server
//! for exercising [`WebDriverClient`](devicetest_core::webdriver::WebDriverClient)
//! and the server launcher.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use devicetest_core::capabilities::Capabilities;
use devicetest_core::driver::{AutomationDriver, DriverError};
use devicetest_core::element::{ElementRef, Locator, Point, Size};
use devicetest_core::gesture::TouchAction;

// ---------------------------------------------------------------------------
// FakeDriver
// ---------------------------------------------------------------------------

/// One call made against a [`FakeDriver`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    InitSession(Capabilities),
    Status,
    SetImplicitWait(Duration),
    FindElement(Locator),
    Location(ElementRef),
    Size(ElementRef),
    Clear(ElementRef),
    SendKeys(ElementRef, String),
    Touch(TouchAction),
    Quit,
}

/// An in-memory driver that records every call.
///
/// Geometry is fixed per driver; status responses and element lookups can be
/// scripted to exercise readiness polling.
pub struct FakeDriver {
    calls: Arc<Mutex<Vec<Call>>>,
    session_id: Option<String>,
    location: Point,
    size: Size,
    statuses: Mutex<VecDeque<Value>>,
    missing_lookups: Mutex<u32>,
    fail_init: bool,
    fail_clear: bool,
    stall_lookups: bool,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            session_id: None,
            location: Point::new(0.0, 0.0),
            size: Size::new(0.0, 0.0),
            statuses: Mutex::new(VecDeque::new()),
            missing_lookups: Mutex::new(0),
            fail_init: false,
            fail_clear: false,
            stall_lookups: false,
        }
    }

    /// Every element sits at `location` with `size`.
    pub fn with_geometry(mut self, location: Point, size: Size) -> Self {
        self.location = location;
        self.size = size;
        self
    }

    /// Status payloads returned in order; `{"ready": true}` once exhausted.
    pub fn with_statuses(self, statuses: Vec<Value>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    /// The first `n` element lookups report `no such element`.
    pub fn with_missing_lookups(self, n: u32) -> Self {
        *self.missing_lookups.lock().unwrap() = n;
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_clear(mut self) -> Self {
        self.fail_clear = true;
        self
    }

    /// Element lookups never complete.
    pub fn stalling_lookups(mut self) -> Self {
        self.stall_lookups = true;
        self
    }

    /// A handle to the call log that survives moving the driver.
    pub fn call_log(&self) -> Arc<Mutex<Vec<Call>>> {
        self.calls.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AutomationDriver for FakeDriver {
    async fn init_session(&mut self, capabilities: Capabilities) -> Result<String, DriverError> {
        self.record(Call::InitSession(capabilities));
        if self.fail_init {
            return Err(DriverError::Remote {
                error: "session not created".into(),
                message: "no device".into(),
            });
        }
        self.session_id = Some("fake-session".to_string());
        Ok("fake-session".to_string())
    }

    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    async fn status(&self) -> Result<Value, DriverError> {
        self.record(Call::Status);
        let next = self.statuses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| json!({ "ready": true })))
    }

    async fn set_implicit_wait(&self, timeout: Duration) -> Result<(), DriverError> {
        self.record(Call::SetImplicitWait(timeout));
        Ok(())
    }

    async fn find_element(&self, locator: &Locator) -> Result<ElementRef, DriverError> {
        self.record(Call::FindElement(locator.clone()));
        if self.stall_lookups {
            std::future::pending::<()>().await;
        }
        let mut missing = self.missing_lookups.lock().unwrap();
        if *missing > 0 {
            *missing -= 1;
            return Err(DriverError::Remote {
                error: "no such element".into(),
                message: locator.to_string(),
            });
        }
        Ok(ElementRef::new(format!("el-{}", locator.value())))
    }

    async fn element_location(&self, element: &ElementRef) -> Result<Point, DriverError> {
        self.record(Call::Location(element.clone()));
        Ok(self.location)
    }

    async fn element_size(&self, element: &ElementRef) -> Result<Size, DriverError> {
        self.record(Call::Size(element.clone()));
        Ok(self.size)
    }

    async fn clear(&self, element: &ElementRef) -> Result<(), DriverError> {
        self.record(Call::Clear(element.clone()));
        if self.fail_clear {
            return Err(DriverError::Remote {
                error: "element not interactable".into(),
                message: element.to_string(),
            });
        }
        Ok(())
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), DriverError> {
        self.record(Call::SendKeys(element.clone(), text.to_string()));
        Ok(())
    }

    async fn perform_touch(&self, action: &TouchAction) -> Result<(), DriverError> {
        self.record(Call::Touch(action.clone()));
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        self.record(Call::Quit);
        self.session_id = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mock WebDriver HTTP server
// ---------------------------------------------------------------------------

/// A request received by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Value,
    pub authorization: Option<String>,
}

/// Handle to a running mock server.
pub struct MockServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    /// WebDriver base URL served by the mock.
    pub fn base_url(&self) -> String {
        format!("http://{}/wd/hub", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// `METHOD path` of every request, in order.
    pub fn request_lines(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }
}

/// Reads one HTTP/1.1 request (headers and `Content-Length` body).
async fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let mut content_length = 0usize;
    let mut authorization = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_lowercase();
            if name == "content-length" {
                content_length = value.trim().parse().unwrap_or(0);
            } else if name == "authorization" {
                authorization = Some(value.trim().to_string());
            }
        }
    }

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body_bytes = &buf[header_end..(header_end + content_length).min(buf.len())];
    let body = serde_json::from_slice(body_bytes).unwrap_or(Value::Null);

    Some(RecordedRequest {
        method,
        path,
        body,
        authorization,
    })
}

async fn write_response(stream: &mut TcpStream, status: u16, body: &Value) {
    let body = body.to_string();
    let reason = if status < 400 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: application/json; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;
}

/// Start a mock WebDriver server that answers requests in order with the
/// given `(status, body)` pairs, one connection per request.
///
/// Once the script is exhausted further requests get a 500.
pub async fn mock_webdriver(responses: Vec<(u16, Value)>) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    tokio::spawn(async move {
        let mut responses: VecDeque<(u16, Value)> = responses.into();
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let Some(request) = read_request(&mut stream).await else {
                continue;
            };
            recorded.lock().unwrap().push(request);

            let (status, body) = responses.pop_front().unwrap_or_else(|| {
                (
                    500,
                    json!({ "value": { "error": "unknown error", "message": "script exhausted" } }),
                )
            });
            write_response(&mut stream, status, &body).await;
        }
    });

    MockServer { addr, requests }
}

/// Start a mock server that answers every request with a ready status.
pub async fn always_ready_server() -> MockServer {
    let responses = (0..64)
        .map(|_| (200, json!({ "value": { "ready": true, "message": "ok" } })))
        .collect();
    mock_webdriver(responses).await
}

/// Start a mock server whose every answer is a 404 `unknown command`, like
/// Appium 2 asked for a path outside its base path.
pub async fn unknown_command_server() -> MockServer {
    let responses = (0..64)
        .map(|_| {
            webdriver_error(
                404,
                "unknown command",
                "The requested resource could not be found",
            )
        })
        .collect();
    mock_webdriver(responses).await
}

/// Start a listener that accepts connections and never answers them.
pub async fn stalled_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

/// A W3C success body.
pub fn ok(value: Value) -> (u16, Value) {
    (200, json!({ "value": value }))
}

/// A W3C error body.
pub fn webdriver_error(status: u16, error: &str, message: &str) -> (u16, Value) {
    (
        status,
        json!({ "value": { "error": error, "message": message, "stacktrace": "" } }),
    )
}
