use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

use crate::config::ResponseKeys;
use crate::output::{SessionClock, Timestamp};

const HUB_CAPACITY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputKind {
    MouseMove { x: i32, y: i32 },
    MouseClick { button: String, pressed: bool, x: i32, y: i32 },
    MouseScroll { x: i32, y: i32, dx: i32, dy: i32 },
    KeyPress(String),
    KeyRelease(String),
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::MouseMove { x, y } => write!(f, "mouse,move,{x},{y}"),
            InputKind::MouseClick { button, pressed, x, y } => {
                write!(f, "mouse,click,{button},{},{x},{y}", u8::from(*pressed))
            }
            InputKind::MouseScroll { x, y, dx, dy } => {
                write!(f, "mouse,scroll,{x},{y},{dx},{dy}")
            }
            InputKind::KeyPress(key) => write!(f, "key,press,{key}"),
            InputKind::KeyRelease(key) => write!(f, "key,release,{key}"),
        }
    }
}

/// One global input event, stamped when the hub published it.
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    pub at: Timestamp,
    pub kind: InputKind,
}

/// Self-reported attentional state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeCode {
    Focused,
    Unfocused,
    Skip,
}

impl ProbeCode {
    pub fn name(self) -> &'static str {
        match self {
            ProbeCode::Focused => "focused",
            ProbeCode::Unfocused => "unfocused",
            ProbeCode::Skip => "skip",
        }
    }

    pub fn from_key(keys: &ResponseKeys, key: &str) -> Option<Self> {
        if key.eq_ignore_ascii_case(&keys.focused) {
            Some(ProbeCode::Focused)
        } else if key.eq_ignore_ascii_case(&keys.unfocused) {
            Some(ProbeCode::Unfocused)
        } else if key.eq_ignore_ascii_case(&keys.skip) {
            Some(ProbeCode::Skip)
        } else {
            None
        }
    }
}

/// A response key press forwarded from the activity logger to the probe scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeEvent {
    pub at: Timestamp,
    pub code: ProbeCode,
}

/// Fan-out point for the global keyboard/mouse hook.
///
/// The platform hook (or a front end) publishes raw events here. Every activity
/// logger subscribes when it is created.
#[derive(Clone)]
pub struct InputHub {
    tx: broadcast::Sender<InputEvent>,
    clock: SessionClock,
}

impl InputHub {
    pub fn new(clock: SessionClock) -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx, clock }
    }

    pub fn publish(&self, kind: InputKind) -> Timestamp {
        let at = self.clock.now();
        // No subscribers between videos; those events are dropped.
        let _ = self.tx.send(InputEvent { at, kind });
        at
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InputEvent> {
        self.tx.subscribe()
    }

    pub fn clock(&self) -> SessionClock {
        self.clock
    }
}
