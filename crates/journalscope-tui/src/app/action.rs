use crate::app::InputField;

/// All possible actions in the application (command pattern)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Quit,
    ToggleHelp,

    // Fetching
    Load,
    ToggleFollow,

    // Filter form
    EditField(InputField),
    InputChar(char),
    InputPaste(String),
    InputBackspace,
    InputClear,
    InputCommit,
    InputCancel,
    CyclePriority,
    ClearPriority,
    ClearSearch,

    // Log viewer
    ScrollUp(usize),
    ScrollDown(usize),
    ScrollToTop,
    ScrollToBottom,
    PageUp,
    PageDown,
    ToggleAutoScroll,
    ToggleTimestamps,
    ToggleStats,
    ClearLogs,
    ExportLogs,

    // Notices
    DismissNotice,

    // Render request
    Render,
}
