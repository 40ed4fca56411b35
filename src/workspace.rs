//! Workspace fixture for the demo binaries.

use crate::error::Result;
use std::path::{Path, PathBuf};

/// The broken script both demos start from: `hello` is defined but never
/// called, so running the file prints nothing.
pub const BROKEN_SCRIPT: &str = "function hello() {\n  console.log(\"Hello\");\n}";

/// (Re)write `hello.js` inside `dir` with the broken script content so each
/// run starts from the same state, even after the agent fixed it last time.
pub fn reset(dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let path = dir.join("hello.js");
    std::fs::write(&path, BROKEN_SCRIPT)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_overwrites_previous_content() {
        let dir = std::env::temp_dir().join(format!("mini-agent-ws-{}", std::process::id()));
        let path = reset(&dir).expect("reset should succeed");
        std::fs::write(&path, "console.log(\"fixed\");").unwrap();
        let path = reset(&dir).expect("reset should succeed");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), BROKEN_SCRIPT);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
