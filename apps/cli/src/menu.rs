//! Interactive menu input parsing.
//!
//! Free-form terminal input maps to an enumerated action so the menu logic
//! is testable without a terminal. Profiles can be picked by their 1-based
//! list number or by name.

/// One parsed menu request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    /// Create a new profile interactively.
    AddProfile,
    /// Connect the named profile.
    Connect(String),
    /// Delete the named profile.
    Delete(String),
    /// Reprint the profile list.
    ListProfiles,
    /// Leave the menu.
    Quit,
}

/// Parses one input line against the current profile list. Returns None for
/// input that maps to nothing (empty line, unknown name, out-of-range
/// number).
pub fn parse_action(input: &str, profiles: &[String]) -> Option<MenuAction> {
    let input = input.trim();
    match input {
        "" => None,
        "a" | "add" | "n" | "new" => Some(MenuAction::AddProfile),
        "l" | "list" => Some(MenuAction::ListProfiles),
        "q" | "quit" | "exit" => Some(MenuAction::Quit),
        _ => {
            if let Some(rest) = input
                .strip_prefix("d ")
                .or_else(|| input.strip_prefix("delete "))
            {
                return resolve(rest.trim(), profiles).map(MenuAction::Delete);
            }
            resolve(input, profiles).map(MenuAction::Connect)
        }
    }
}

/// Resolves a token to a profile name: 1-based index or exact name.
fn resolve(token: &str, profiles: &[String]) -> Option<String> {
    if let Ok(index) = token.parse::<usize>() {
        if index >= 1 && index <= profiles.len() {
            return Some(profiles[index - 1].clone());
        }
        return None;
    }
    profiles.iter().find(|name| name.as_str() == token).cloned()
}
