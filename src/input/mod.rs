use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Logical keys the rig can bind a mode toggle to. `None` disables the binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeyCode {
    #[default]
    None,
    Tap,
    Space,
    Return,
    Tab,
    C,
    V,
    TriggerLeft,
    TriggerRight,
}

pub trait InputSource: Send {
    fn label(&self) -> &'static str;

    /// Called once at the end of every frame, after every system has polled.
    fn advance_frame(&mut self);

    /// True when the key went down at any point since the last
    /// `advance_frame`, even if it has been released again since.
    fn key_down(&self, key: KeyCode) -> bool;
}

#[derive(Debug, Default)]
struct KeyState {
    held: HashSet<KeyCode>,
    pressed_this_frame: HashSet<KeyCode>,
}

/// Keyboard-style input with latched key-down edges.
///
/// Clones share state, so a platform event handler (or a test) can keep one
/// handle to drive presses while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct KeyboardInput {
    state: Arc<Mutex<KeyState>>,
}

impl KeyboardInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, key: KeyCode) {
        if key == KeyCode::None {
            return;
        }
        let mut state = self.lock();
        if state.held.insert(key) {
            state.pressed_this_frame.insert(key);
        }
    }

    pub fn release(&self, key: KeyCode) {
        self.lock().held.remove(&key);
    }

    pub fn is_held(&self, key: KeyCode) -> bool {
        self.lock().held.contains(&key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, KeyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InputSource for KeyboardInput {
    fn label(&self) -> &'static str {
        "Keyboard"
    }

    fn advance_frame(&mut self) {
        self.lock().pressed_this_frame.clear();
    }

    fn key_down(&self, key: KeyCode) -> bool {
        if key == KeyCode::None {
            return false;
        }
        self.lock().pressed_this_frame.contains(&key)
    }
}

/// Input source that never reports a press.
#[derive(Debug, Default)]
pub struct NullInput;

impl InputSource for NullInput {
    fn label(&self) -> &'static str {
        "Null Input"
    }

    fn advance_frame(&mut self) {}

    fn key_down(&self, _key: KeyCode) -> bool {
        false
    }
}
