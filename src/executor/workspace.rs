//! Workspace file naming and containment.
//!
//! Pure helpers used by the executor before anything touches the container:
//! the language table, `filename:` directive parsing, content-hash naming,
//! path containment and pip output silencing.

use crate::env;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

/// How a language is run inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageSpec {
    /// Interpreter invoked with the code file as its argument
    pub interpreter: &'static str,
    /// Extension of generated code files, without the dot
    pub extension: &'static str,
}

const PYTHON: LanguageSpec = LanguageSpec {
    interpreter: "python",
    extension: "py",
};
const SHELL: LanguageSpec = LanguageSpec {
    interpreter: "sh",
    extension: "sh",
};
const POWERSHELL: LanguageSpec = LanguageSpec {
    interpreter: "pwsh",
    extension: "ps1",
};
const JAVASCRIPT: LanguageSpec = LanguageSpec {
    interpreter: "node",
    extension: "js",
};

/// Look up the interpreter and extension for a language tag.
///
/// Tags are matched case-insensitively. Returns `None` for unsupported languages.
pub fn language_spec(language: &str) -> Option<LanguageSpec> {
    match language.trim().to_lowercase().as_str() {
        "python" | "py" | "python3" => Some(PYTHON),
        "bash" | "shell" | "sh" => Some(SHELL),
        "pwsh" | "powershell" | "ps1" => Some(POWERSHELL),
        "javascript" | "js" | "node" => Some(JAVASCRIPT),
        _ => None,
    }
}

static FILENAME_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:<!--\s*filename:\s*(?P<html>.+?)\s*-->|//\s*filename:\s*(?P<slash>.+?)|#\s*filename:\s*(?P<hash>.+?))\s*$",
    )
    .expect("filename directive regex is valid")
});

/// Extract the file name from a leading `filename:` directive.
///
/// Recognized on the first line only, in `# filename: x`, `// filename: x`
/// and `<!-- filename: x -->` forms.
pub fn filename_directive(code: &str) -> Option<String> {
    let first_line = code.lines().next()?.trim();
    let captures = FILENAME_DIRECTIVE.captures(first_line)?;
    ["html", "slash", "hash"]
        .iter()
        .find_map(|group| captures.name(group))
        .map(|m| m.as_str().to_string())
        .filter(|name| !name.is_empty())
}

/// Deterministic file name derived from the code's content hash.
pub fn content_file_name(code: &str, extension: &str) -> String {
    let digest = Sha256::digest(code.as_bytes());
    format!("{}{:x}.{}", env::executor::TMP_CODE_PREFIX, digest, extension)
}

/// Pick the file name for a block: its directive if present, else a content hash.
pub fn code_file_name(code: &str, spec: LanguageSpec) -> String {
    filename_directive(code).unwrap_or_else(|| content_file_name(code, spec.extension))
}

/// Join `filename` onto `root` and return the result only if it stays inside `root`.
///
/// Resolution is lexical: `.` and `..` are folded without touching the
/// filesystem, so files that do not exist yet can be checked. Absolute
/// filenames replace the root and are therefore rejected unless they point
/// inside it.
pub fn resolve_in_workspace(root: &Path, filename: &str) -> Option<PathBuf> {
    let root = normalize(root);
    let candidate = normalize(&root.join(filename));
    if candidate != root && candidate.starts_with(&root) {
        Some(candidate)
    } else {
        None
    }
}

/// [`resolve_in_workspace`] plus a check against symlinks already on disk.
///
/// The deepest existing ancestor of the candidate is canonicalized and must
/// stay under the canonical root. A candidate that is itself a symlink is
/// rejected, dangling or not.
pub fn resolve_on_disk(root: &Path, filename: &str) -> Option<PathBuf> {
    let candidate = resolve_in_workspace(root, filename)?;
    let real_root = root.canonicalize().ok()?;

    let (existing, metadata) = candidate
        .ancestors()
        .find_map(|path| path.symlink_metadata().ok().map(|meta| (path, meta)))?;
    if existing == candidate && metadata.file_type().is_symlink() {
        return None;
    }

    let real = existing.canonicalize().ok()?;
    real.starts_with(&real_root).then_some(candidate)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

static PYTHON_PIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^! ?pip install").expect("pip regex is valid"));
static SHELL_PIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^pip install").expect("pip regex is valid"));

/// Add `-qqq` to `pip install` lines so installs don't flood the output.
pub fn silence_pip(code: &str, language: &str) -> String {
    let regex: &Regex = match language_spec(language) {
        Some(PYTHON) => &PYTHON_PIP,
        Some(SHELL) | Some(POWERSHELL) => &SHELL_PIP,
        _ => return code.to_string(),
    };

    code.split('\n')
        .map(|line| match regex.find(line) {
            Some(m) if !line.contains("-qqq") => {
                format!("{} -qqq{}", m.as_str(), &line[m.end()..])
            }
            _ => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
