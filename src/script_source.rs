//! Loading the natural-language request from a script file.

use crate::error::{LlmexecError, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The request text of one script, with its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRequest {
    path: PathBuf,
    directory: PathBuf,
    text: String,
}

impl ScriptRequest {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the script; generated programs run here.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Read `path` and strip a leading `#!` line.
///
/// The remaining text is kept byte-for-byte. A script with no request text
/// besides whitespace is rejected.
pub fn read_script(path: &Path) -> Result<ScriptRequest> {
    if path.is_dir() {
        return Err(LlmexecError::ScriptNotFound(path.to_path_buf()));
    }

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(LlmexecError::ScriptNotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(LlmexecError::ScriptRead {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    let content = String::from_utf8(bytes).map_err(|e| LlmexecError::ScriptRead {
        path: path.to_path_buf(),
        reason: format!("not valid UTF-8 ({})", e.utf8_error()),
    })?;

    let text = strip_shebang(&content).to_string();
    if text.trim().is_empty() {
        return Err(LlmexecError::ScriptRead {
            path: path.to_path_buf(),
            reason: "script contains no request text".to_string(),
        });
    }

    let absolute = std::path::absolute(path).map_err(|e| LlmexecError::ScriptRead {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let directory = absolute
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));

    debug!(
        "Read script {} ({} bytes of request text, directory {})",
        path.display(),
        text.len(),
        directory.display()
    );

    Ok(ScriptRequest {
        path: path.to_path_buf(),
        directory,
        text,
    })
}

/// Everything after the first line when the content starts with `#!`.
pub fn strip_shebang(content: &str) -> &str {
    if !content.starts_with("#!") {
        return content;
    }
    match content.find('\n') {
        Some(newline) => &content[newline + 1..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_script(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_shebang_line_removed_rest_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let body = "  list the files here\n\n  and count them  \n";
        let path = write_script(
            dir.path(),
            "s.llm",
            format!("#!/usr/bin/env -S llmexec -x\n{}", body).as_bytes(),
        );

        let request = read_script(&path).unwrap();
        assert_eq!(request.text(), body);
    }

    #[test]
    fn test_without_shebang_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let body = "print the text HELLO";
        let path = write_script(dir.path(), "s.llm", body.as_bytes());

        assert_eq!(read_script(&path).unwrap().text(), body);
    }

    #[test]
    fn test_crlf_body_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "s.llm", b"#!llmexec\r\nsay hi\r\n");
        assert_eq!(read_script(&path).unwrap().text(), "say hi\r\n");
    }

    #[test]
    fn test_directory_is_absolute_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "s.llm", b"say hi");

        let request = read_script(&path).unwrap();
        assert_eq!(
            request.directory().canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
        assert_eq!(request.path(), path.as_path());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_script(&dir.path().join("nope.llm"));
        assert!(matches!(result, Err(LlmexecError::ScriptNotFound(_))));
    }

    #[test]
    fn test_directory_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_script(dir.path());
        assert!(matches!(result, Err(LlmexecError::ScriptNotFound(_))));
    }

    #[test]
    fn test_invalid_utf8_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "s.llm", &[0x66, 0x6f, 0xff, 0xfe]);
        let result = read_script(&path);
        assert!(matches!(result, Err(LlmexecError::ScriptRead { .. })));
    }

    #[test]
    fn test_shebang_only_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "s.llm", b"#!/usr/bin/env llmexec\n   \n");
        match read_script(&path) {
            Err(LlmexecError::ScriptRead { reason, .. }) => {
                assert!(reason.contains("no request text"))
            }
            other => panic!("Expected ScriptRead, got {:?}", other),
        }
    }

    #[test]
    fn test_strip_shebang() {
        assert_eq!(strip_shebang("#!x\nbody"), "body");
        assert_eq!(strip_shebang("#!x"), "");
        assert_eq!(strip_shebang("body\n#!x"), "body\n#!x");
        assert_eq!(strip_shebang(" #!x\nbody"), " #!x\nbody");
    }
}
