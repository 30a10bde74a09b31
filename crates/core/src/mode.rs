//! Drawing mode state machine
//!
//! [`transition`] is the whole table. The engine calls it for every mode
//! event and executes the returned effects in order.

use smallvec::SmallVec;
use std::fmt;

/// Active pointer handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Selection and mouse pan
    #[default]
    None,
    Ink,
    Highlight,
    FreeText,
    Eraser,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::None => "none",
            Mode::Ink => "ink",
            Mode::Highlight => "highlight",
            Mode::FreeText => "freetext",
            Mode::Eraser => "eraser",
        }
    }

    /// Keyboard shortcut for a mode
    pub fn from_shortcut(key: char) -> Option<Mode> {
        match key.to_ascii_lowercase() {
            'p' => Some(Mode::Ink),
            'h' => Some(Mode::Highlight),
            't' => Some(Mode::FreeText),
            'e' => Some(Mode::Eraser),
            _ => None,
        }
    }

    /// Whether pointer presses in this mode create annotations
    pub fn is_drawing(&self) -> bool {
        matches!(self, Mode::Ink | Mode::Highlight | Mode::FreeText)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the mode table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeEvent {
    /// Explicit `set_mode` call
    Select(Mode),
    /// Keyboard shortcut character
    Shortcut(char),
    /// Pending free-text box was committed
    FreeTextCommitted,
    Escape,
}

/// Side effects the engine runs after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeEffect {
    /// Abandon an in-progress stroke
    CancelStroke,
    /// Close a pending text editor without committing
    CancelTextEdit,
    ClearSelection,
    /// Emit `ModeChanged`
    NotifyModeChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: Mode,
    pub effects: SmallVec<[ModeEffect; 4]>,
}

impl Transition {
    fn stay(mode: Mode) -> Self {
        Self { next: mode, effects: SmallVec::new() }
    }

    pub fn changed(&self, from: Mode) -> bool {
        self.next != from
    }
}

/// `{mode, event} -> {next mode, effects}`
pub fn transition(current: Mode, event: ModeEvent) -> Transition {
    let target = match event {
        ModeEvent::Select(mode) => mode,
        ModeEvent::Shortcut(key) => match Mode::from_shortcut(key) {
            Some(mode) => mode,
            None => return Transition::stay(current),
        },
        ModeEvent::FreeTextCommitted if current == Mode::FreeText => Mode::None,
        ModeEvent::FreeTextCommitted => return Transition::stay(current),
        ModeEvent::Escape => Mode::None,
    };

    let mut effects = SmallVec::new();
    if target == current {
        // Escape in mode none still closes a re-edit and drops the selection.
        if event == ModeEvent::Escape {
            effects.push(ModeEffect::CancelTextEdit);
            effects.push(ModeEffect::ClearSelection);
        }
        return Transition { next: current, effects };
    }

    match current {
        Mode::Ink | Mode::Highlight => effects.push(ModeEffect::CancelStroke),
        // A commit already consumed the editor.
        Mode::FreeText if event != ModeEvent::FreeTextCommitted => {
            effects.push(ModeEffect::CancelTextEdit)
        }
        // A re-edit opened on the selection belongs to mode none.
        Mode::None => {
            effects.push(ModeEffect::CancelTextEdit);
            effects.push(ModeEffect::ClearSelection);
        }
        _ => {}
    }
    effects.push(ModeEffect::NotifyModeChanged);
    Transition { next: target, effects }
}
