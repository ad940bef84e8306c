//! Input and tap helpers used by test specs.
//!
//! Each helper is a short sequence of driver calls with no retries and no
//! re-reads: the tap helpers read the element's geometry and then tap, so a
//! layout change in between is not detected.

use tracing::debug;

use crate::driver::{AutomationDriver, DriverError};
use crate::element::{ElementRef, Point};
use crate::gesture::TouchAction;

/// Types `text` into `element`, clearing it first when `clear_first` is set.
///
/// Keys are sent to the element itself, not to whatever has focus.
pub async fn enter_text<D>(
    driver: &D,
    element: &ElementRef,
    text: &str,
    clear_first: bool,
) -> Result<(), DriverError>
where
    D: AutomationDriver + ?Sized,
{
    if clear_first {
        driver.clear(element).await?;
    }
    driver.send_keys(element, text).await
}

/// Taps the horizontal middle of the element's top edge.
pub async fn tap_center<D>(driver: &D, element: &ElementRef) -> Result<Point, DriverError>
where
    D: AutomationDriver + ?Sized,
{
    let location = driver.element_location(element).await?;
    let size = driver.element_size(element).await?;
    let at = Point::new(location.x + size.width / 2.0, location.y);
    tap_at(driver, at).await?;
    Ok(at)
}

/// Taps the element's top-left corner.
pub async fn tap_start<D>(driver: &D, element: &ElementRef) -> Result<Point, DriverError>
where
    D: AutomationDriver + ?Sized,
{
    let at = driver.element_location(element).await?;
    tap_at(driver, at).await?;
    Ok(at)
}

async fn tap_at<D>(driver: &D, at: Point) -> Result<(), DriverError>
where
    D: AutomationDriver + ?Sized,
{
    debug!(x = at.x, y = at.y, "tap");
    driver
        .perform_touch(&TouchAction::new().press(at).release())
        .await
}
