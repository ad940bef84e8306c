//! Press/release touch gestures.
//!
//! A [`TouchAction`] is an ordered list of [`TouchStep`]s built up with
//! [`press`](TouchAction::press), [`wait`](TouchAction::wait) and
//! [`release`](TouchAction::release), then handed to
//! [`AutomationDriver::perform_touch`](crate::driver::AutomationDriver::perform_touch).
//!
//! ```
//! use devicetest_core::element::Point;
//! use devicetest_core::gesture::TouchAction;
//!
//! let tap = TouchAction::new().press(Point::new(60.0, 20.0)).release();
//! assert_eq!(tap.steps().len(), 2);
//! ```

use std::time::Duration;

use serde_json::{json, Value};

use crate::element::Point;

/// A single step of a touch gesture.
#[derive(Debug, Clone, PartialEq)]
pub enum TouchStep {
    /// Put a finger down at the given point.
    Press(Point),
    /// Hold the current state for a while.
    Wait(Duration),
    /// Lift the finger.
    Release,
}

/// An ordered touch gesture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TouchAction {
    steps: Vec<TouchStep>,
}

impl TouchAction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(mut self, at: Point) -> Self {
        self.steps.push(TouchStep::Press(at));
        self
    }

    pub fn wait(mut self, duration: Duration) -> Self {
        self.steps.push(TouchStep::Wait(duration));
        self
    }

    pub fn release(mut self) -> Self {
        self.steps.push(TouchStep::Release);
        self
    }

    pub fn steps(&self) -> &[TouchStep] {
        &self.steps
    }

    /// The point of the first press, if any.
    pub fn press_point(&self) -> Option<Point> {
        self.steps.iter().find_map(|step| match step {
            TouchStep::Press(p) => Some(*p),
            _ => None,
        })
    }

    /// Encodes the gesture as a W3C `pointer` action source of type `touch`.
    ///
    /// A press becomes `pointerMove` + `pointerDown`, a wait becomes `pause`
    /// and a release becomes `pointerUp`.
    pub fn to_w3c_actions(&self) -> Value {
        let mut actions = Vec::with_capacity(self.steps.len() * 2);
        for step in &self.steps {
            match step {
                TouchStep::Press(p) => {
                    actions.push(json!({
                        "type": "pointerMove",
                        "duration": 0,
                        "origin": "viewport",
                        "x": p.x,
                        "y": p.y,
                    }));
                    actions.push(json!({ "type": "pointerDown", "button": 0 }));
                }
                TouchStep::Wait(d) => {
                    actions.push(json!({ "type": "pause", "duration": d.as_millis() as u64 }));
                }
                TouchStep::Release => {
                    actions.push(json!({ "type": "pointerUp", "button": 0 }));
                }
            }
        }

        json!({
            "actions": [{
                "type": "pointer",
                "id": "finger1",
                "parameters": { "pointerType": "touch" },
                "actions": actions,
            }]
        })
    }
}
