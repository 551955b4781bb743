use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashMap;

use crate::app::{Action, InputField};

/// A key combination
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyBinding {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyBinding {
    pub fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::NONE,
        }
    }

    pub fn ctrl(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::CONTROL,
        }
    }

    pub fn shift(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::SHIFT,
        }
    }

    pub fn from_event(event: &KeyEvent) -> Self {
        Self {
            code: event.code,
            modifiers: event.modifiers,
        }
    }
}

/// Context for keybindings
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyContext {
    Global,
    LogViewer,
    Input,
}

/// Keybinding configuration
pub struct KeyBindings {
    bindings: HashMap<KeyContext, HashMap<KeyBinding, Action>>,
}

impl KeyBindings {
    pub fn new() -> Self {
        let mut bindings = HashMap::new();

        // Global bindings
        let mut global = HashMap::new();
        global.insert(KeyBinding::new(KeyCode::Char('?')), Action::ToggleHelp);
        global.insert(KeyBinding::new(KeyCode::Esc), Action::DismissNotice);
        global.insert(KeyBinding::ctrl(KeyCode::Char('c')), Action::Quit);
        global.insert(KeyBinding::new(KeyCode::Char('q')), Action::Quit);
        bindings.insert(KeyContext::Global, global);

        // Log viewer bindings - less-like navigation
        let mut log_viewer = HashMap::new();
        log_viewer.insert(KeyBinding::new(KeyCode::Char('j')), Action::ScrollDown(1));
        log_viewer.insert(KeyBinding::new(KeyCode::Down), Action::ScrollDown(1));
        log_viewer.insert(KeyBinding::new(KeyCode::Char('k')), Action::ScrollUp(1));
        log_viewer.insert(KeyBinding::new(KeyCode::Up), Action::ScrollUp(1));
        log_viewer.insert(KeyBinding::ctrl(KeyCode::Char('f')), Action::PageDown);
        log_viewer.insert(KeyBinding::ctrl(KeyCode::Char('b')), Action::PageUp);
        log_viewer.insert(KeyBinding::ctrl(KeyCode::Char('d')), Action::PageDown);
        log_viewer.insert(KeyBinding::ctrl(KeyCode::Char('u')), Action::PageUp);
        log_viewer.insert(KeyBinding::new(KeyCode::PageDown), Action::PageDown);
        log_viewer.insert(KeyBinding::new(KeyCode::PageUp), Action::PageUp);
        log_viewer.insert(KeyBinding::new(KeyCode::Char('g')), Action::ScrollToTop);
        log_viewer.insert(KeyBinding::shift(KeyCode::Char('G')), Action::ScrollToBottom);
        log_viewer.insert(KeyBinding::new(KeyCode::Home), Action::ScrollToTop);
        log_viewer.insert(KeyBinding::new(KeyCode::End), Action::ScrollToBottom);
        // Fetching
        log_viewer.insert(KeyBinding::new(KeyCode::Char('l')), Action::Load);
        log_viewer.insert(KeyBinding::new(KeyCode::Char('r')), Action::Load);
        log_viewer.insert(KeyBinding::new(KeyCode::Char('f')), Action::ToggleFollow);
        // Filter form
        log_viewer.insert(
            KeyBinding::new(KeyCode::Char('/')),
            Action::EditField(InputField::Search),
        );
        log_viewer.insert(
            KeyBinding::new(KeyCode::Char('u')),
            Action::EditField(InputField::Unit),
        );
        log_viewer.insert(
            KeyBinding::new(KeyCode::Char('s')),
            Action::EditField(InputField::Since),
        );
        log_viewer.insert(KeyBinding::new(KeyCode::Char('p')), Action::CyclePriority);
        log_viewer.insert(KeyBinding::shift(KeyCode::Char('P')), Action::ClearPriority);
        log_viewer.insert(KeyBinding::new(KeyCode::Char('n')), Action::ClearSearch);
        // Display
        log_viewer.insert(KeyBinding::new(KeyCode::Char('a')), Action::ToggleAutoScroll);
        log_viewer.insert(KeyBinding::new(KeyCode::Char('t')), Action::ToggleTimestamps);
        log_viewer.insert(KeyBinding::shift(KeyCode::Char('S')), Action::ToggleStats);
        log_viewer.insert(KeyBinding::new(KeyCode::Char('c')), Action::ClearLogs);
        log_viewer.insert(KeyBinding::new(KeyCode::Char('e')), Action::ExportLogs);
        bindings.insert(KeyContext::LogViewer, log_viewer);

        // Input bindings (when a filter field is being edited)
        let mut input = HashMap::new();
        input.insert(KeyBinding::new(KeyCode::Enter), Action::InputCommit);
        input.insert(KeyBinding::new(KeyCode::Esc), Action::InputCancel);
        input.insert(KeyBinding::new(KeyCode::Backspace), Action::InputBackspace);
        input.insert(KeyBinding::ctrl(KeyCode::Char('u')), Action::InputClear);
        input.insert(KeyBinding::ctrl(KeyCode::Char('c')), Action::InputCancel);
        bindings.insert(KeyContext::Input, input);

        Self { bindings }
    }

    /// Look up action for key event in given context
    pub fn get_action(&self, context: KeyContext, key: &KeyEvent) -> Option<Action> {
        let binding = KeyBinding::from_event(key);

        // First check context-specific bindings
        if let Some(context_bindings) = self.bindings.get(&context) {
            if let Some(action) = context_bindings.get(&binding) {
                return Some(action.clone());
            }
        }

        // Some terminals report uppercase letters without SHIFT
        if let KeyCode::Char(c) = key.code {
            if c.is_ascii_uppercase() && key.modifiers.is_empty() {
                if let Some(action) = self
                    .bindings
                    .get(&context)
                    .and_then(|b| b.get(&KeyBinding::shift(key.code)))
                {
                    return Some(action.clone());
                }
            }
        }

        // Fall back to global bindings
        self.bindings
            .get(&KeyContext::Global)?
            .get(&binding)
            .cloned()
    }

    /// Handle key event in input mode
    /// Returns Some(Action) for special keys, None for unbound keys
    pub fn get_input_action(&self, key: &KeyEvent) -> Option<Action> {
        let binding = KeyBinding::from_event(key);

        if let Some(input_bindings) = self.bindings.get(&KeyContext::Input) {
            if let Some(action) = input_bindings.get(&binding) {
                return Some(action.clone());
            }
        }

        // For regular characters, return InputChar action
        if let KeyCode::Char(c) = key.code {
            if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                return Some(Action::InputChar(c));
            }
        }

        None
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_log_viewer_bindings() {
        let kb = KeyBindings::new();
        let get = |c| kb.get_action(KeyContext::LogViewer, &key(KeyCode::Char(c), KeyModifiers::NONE));

        assert_eq!(get('f'), Some(Action::ToggleFollow));
        assert_eq!(get('l'), Some(Action::Load));
        assert_eq!(get('/'), Some(Action::EditField(InputField::Search)));
        assert_eq!(get('u'), Some(Action::EditField(InputField::Unit)));
        assert_eq!(get('p'), Some(Action::CyclePriority));
        assert_eq!(get('q'), Some(Action::Quit));
        assert_eq!(get('x'), None);
    }

    #[test]
    fn test_uppercase_with_or_without_shift() {
        let kb = KeyBindings::new();
        let with_shift = key(KeyCode::Char('P'), KeyModifiers::SHIFT);
        let without = key(KeyCode::Char('P'), KeyModifiers::NONE);
        assert_eq!(
            kb.get_action(KeyContext::LogViewer, &with_shift),
            Some(Action::ClearPriority)
        );
        assert_eq!(
            kb.get_action(KeyContext::LogViewer, &without),
            Some(Action::ClearPriority)
        );
    }

    #[test]
    fn test_input_mode_captures_letters() {
        let kb = KeyBindings::new();
        assert_eq!(
            kb.get_input_action(&key(KeyCode::Char('q'), KeyModifiers::NONE)),
            Some(Action::InputChar('q'))
        );
        assert_eq!(
            kb.get_input_action(&key(KeyCode::Enter, KeyModifiers::NONE)),
            Some(Action::InputCommit)
        );
        assert_eq!(
            kb.get_input_action(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Action::InputCancel)
        );
        assert_eq!(kb.get_input_action(&key(KeyCode::F(1), KeyModifiers::NONE)), None);
    }
}
