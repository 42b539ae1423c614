//! Keyboard input.
//!
//! Two views of the same device: immediate key state (`is_down`) for held
//! controls such as thrust, and a buffered queue of discrete press/release
//! events for toggles such as pause. The queue is bounded; when it is full the
//! oldest event is dropped, and it must be drained every tick.

use std::collections::{HashSet, VecDeque};

pub use winit::keyboard::KeyCode;
use winit::{
    event::{ElementState, WindowEvent},
    keyboard::PhysicalKey,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    KeyPressed(KeyCode),
    KeyReleased(KeyCode),
}

pub trait InputProvider {
    fn is_down(&self, key: KeyCode) -> bool;

    fn pop_event(&mut self) -> Option<InputEvent>;

    /// Feed a raw window event. Providers that poll devices themselves ignore it.
    fn handle_window_event(&mut self, _event: &WindowEvent) {}
}

/// Context slot for the input device.
pub struct Input(pub Box<dyn InputProvider>);

impl Input {
    pub fn is_down(&self, key: KeyCode) -> bool {
        self.0.is_down(key)
    }

    /// Empties the buffered queue.
    pub fn drain(&mut self) -> Vec<InputEvent> {
        std::iter::from_fn(|| self.0.pop_event()).collect()
    }
}

/// Input provider fed from winit window events.
#[derive(Debug)]
pub struct WinitInput {
    down: HashSet<KeyCode>,
    events: VecDeque<InputEvent>,
    capacity: usize,
}

impl WinitInput {
    pub const DEFAULT_CAPACITY: usize = 32;

    pub fn new(capacity: usize) -> Self {
        Self {
            down: HashSet::new(),
            events: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record a key transition. Repeated presses of a held key only update state.
    pub fn record(&mut self, key: KeyCode, pressed: bool) {
        let changed = if pressed {
            self.down.insert(key)
        } else {
            self.down.remove(&key)
        };
        if !changed {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(if pressed {
            InputEvent::KeyPressed(key)
        } else {
            InputEvent::KeyReleased(key)
        });
    }

    pub fn pending(&self) -> usize {
        self.events.len()
    }
}

impl Default for WinitInput {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl InputProvider for WinitInput {
    fn is_down(&self, key: KeyCode) -> bool {
        self.down.contains(&key)
    }

    fn pop_event(&mut self) -> Option<InputEvent> {
        self.events.pop_front()
    }

    fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.record(code, event.state == ElementState::Pressed);
                }
            }
            // Keys released while unfocused never report, forget them.
            WindowEvent::Focused(false) => self.down.clear(),
            _ => (),
        }
    }
}
