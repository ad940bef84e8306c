//! Element handles, locators and screen geometry.
//!
//! These types are shared between the [`AutomationDriver`](crate::driver::AutomationDriver)
//! trait, the WebDriver backend and the interaction helpers. They are independent
//! of any specific backend implementation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The W3C key under which a server returns an element reference.
pub const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// The legacy JSON Wire key for element references.
pub const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

/// An opaque reference to an element inside an open session.
///
/// The id is assigned by the automation server and is only meaningful for
/// the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef {
    /// Server-assigned element id.
    pub id: String,
}

impl ElementRef {
    /// Wraps a server-assigned element id.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// How to locate an element on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Accessibility identifier (content-desc on Android, accessibilityIdentifier on iOS).
    AccessibilityId(String),
    /// Native resource id.
    Id(String),
    /// XPath expression over the page source.
    XPath(String),
    /// Native widget class name.
    ClassName(String),
}

impl Locator {
    /// The WebDriver `using` strategy name.
    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::AccessibilityId(_) => "accessibility id",
            Locator::Id(_) => "id",
            Locator::XPath(_) => "xpath",
            Locator::ClassName(_) => "class name",
        }
    }

    /// The selector value passed alongside the strategy.
    pub fn value(&self) -> &str {
        match self {
            Locator::AccessibilityId(v)
            | Locator::Id(v)
            | Locator::XPath(v)
            | Locator::ClassName(v) => v,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::AccessibilityId(v) => write!(f, "~{v}"),
            Locator::Id(v) => write!(f, "id={v}"),
            Locator::XPath(v) => f.write_str(v),
            Locator::ClassName(v) => write!(f, "class={v}"),
        }
    }
}

/// Error returned when a locator string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid locator: {0:?}")]
pub struct ParseLocatorError(String);

impl FromStr for Locator {
    type Err = ParseLocatorError;

    /// Parses `~name`, `id=name`, `class=name`, or an XPath starting with `/` or `(`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix('~') {
            if !rest.is_empty() {
                return Ok(Locator::AccessibilityId(rest.to_string()));
            }
        } else if let Some(rest) = s.strip_prefix("id=") {
            if !rest.is_empty() {
                return Ok(Locator::Id(rest.to_string()));
            }
        } else if let Some(rest) = s.strip_prefix("class=") {
            if !rest.is_empty() {
                return Ok(Locator::ClassName(rest.to_string()));
            }
        } else if s.starts_with('/') || s.starts_with('(') {
            return Ok(Locator::XPath(s.to_string()));
        }
        Err(ParseLocatorError(s.to_string()))
    }
}

/// A point in screen coordinates, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The on-screen dimensions of an element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Position and size of an element as reported by `GET .../rect`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementRect {
    /// The x-coordinate of the element's top-left corner.
    pub x: f64,
    /// The y-coordinate of the element's top-left corner.
    pub y: f64,
    /// The width of the element in points.
    pub width: f64,
    /// The height of the element in points.
    pub height: f64,
}

impl ElementRect {
    pub fn location(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}
