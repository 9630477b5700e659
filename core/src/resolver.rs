//! Maps a changed save file to the game that owns it.
//!
//! Save paths conventionally embed the store app id somewhere
//! (`.../480/achievements.ini`). The first run of digits in the path is
//! the candidate; the host's game index decides whether an installed
//! game matches. No match is not an error; the file may belong to an
//! uninstalled or unrelated game.

use std::path::Path;

use vigil_types::GameRef;

/// Host-supplied lookup from store app id to installed game.
pub trait GameIndex: Send + Sync {
    fn find_installed(&self, app_id: &str) -> Option<GameRef>;
}

/// Extract the first run of ASCII digits from the path.
pub fn extract_app_id(path: &Path) -> Option<String> {
    let text = path.to_string_lossy();
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    Some(digits)
}
