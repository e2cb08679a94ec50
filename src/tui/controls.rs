//! Keyboard bindings for the dashboard.
//!
//! Keys are first decoded into an [`Action`] so the binding table can be
//! tested without building an [`App`].

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::runtime::App;

/// Something the operator asked the dashboard to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    TogglePause,
    /// Process one reading while paused.
    Step,
    Faster,
    Slower,
    Preset(&'static str),
    Restart,
    /// Refit the classifier on bootstrap samples plus buffered observations.
    Retrain,
    /// Hide or show devices that are currently OFF.
    ToggleOnOnly,
}

/// Presets reachable from the number keys, in key order.
pub const PRESET_KEYS: [(char, &str); 3] = [('1', "default"), ('2', "essentials"), ('3', "sensitive")];

/// Decodes a key press. Repeats and releases map to nothing.
pub fn action_for(key: KeyEvent) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let action = match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        KeyCode::Char(' ') => Action::TogglePause,
        KeyCode::Char('n') => Action::Step,
        KeyCode::Char('+' | '=') | KeyCode::Right => Action::Faster,
        KeyCode::Char('-') | KeyCode::Left => Action::Slower,
        KeyCode::Char('r') => Action::Restart,
        KeyCode::Char('t') => Action::Retrain,
        KeyCode::Char('o') => Action::ToggleOnOnly,
        KeyCode::Char(c) => {
            let &(_, preset) = PRESET_KEYS.iter().find(|(k, _)| *k == c)?;
            Action::Preset(preset)
        }
        _ => return None,
    };
    Some(action)
}

pub fn apply(app: &mut App, action: Action) {
    match action {
        Action::Quit => app.quit = true,
        Action::TogglePause => app.toggle_pause(),
        Action::Step => {
            if app.paused {
                app.tick();
            }
        }
        Action::Faster => app.speed_up(),
        Action::Slower => app.speed_down(),
        Action::Preset(name) => app.switch_preset(name),
        Action::Restart => app.restart(),
        Action::Retrain => app.retrain(),
        Action::ToggleOnOnly => app.show_on_only = !app.show_on_only,
    }
}

pub fn handle_key(app: &mut App, key: KeyEvent) {
    if let Some(action) = action_for(key) {
        apply(app, action);
    }
}
