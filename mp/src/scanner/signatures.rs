//! Signature extraction
//!
//! Line-oriented heuristics that pull declaration headers (functions, types)
//! out of a source file without parsing it. Bodies are elided. Unknown
//! extensions and binary content produce nothing; extraction never fails.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace};

/// Longest signature kept, in characters
pub const MAX_SIGNATURE_CHARS: usize = 200;

/// How many physical lines a single declaration header may span
const MAX_CONTINUATION_LINES: usize = 6;

/// Source language families with a signature table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Rust,
    JavaScript,
    TypeScript,
    Go,
    Java,
    Kotlin,
    CSharp,
    Ruby,
    C,
    Cpp,
    Php,
    Swift,
}

impl Language {
    /// Infer the language from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let lang = match ext.as_str() {
            "py" | "pyi" => Self::Python,
            "rs" => Self::Rust,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "go" => Self::Go,
            "java" => Self::Java,
            "kt" | "kts" => Self::Kotlin,
            "cs" => Self::CSharp,
            "rb" => Self::Ruby,
            "c" | "h" => Self::C,
            "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => Self::Cpp,
            "php" => Self::Php,
            "swift" => Self::Swift,
            _ => return None,
        };
        Some(lang)
    }

    /// Python-style languages open bodies with ':' and have no braces
    fn uses_colon_blocks(&self) -> bool {
        matches!(self, Self::Python)
    }

    fn patterns(&self) -> &'static [&'static str] {
        match self {
            Self::Python => &[r"^(?:async\s+)?def\s+\w+", r"^class\s+\w+"],
            Self::Rust => &[
                r#"^(?:pub(?:\([^)]*\))?\s+)?(?:(?:async|unsafe|const|extern(?:\s+"[^"]*")?)\s+)*fn\s+\w+"#,
                r"^(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|union|type)\s+\w+",
                r"^(?:unsafe\s+)?impl\b",
            ],
            Self::JavaScript => &[
                r"^(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*\w+",
                r"^(?:export\s+)?(?:default\s+)?class\s+\w+",
                r"^(?:export\s+)?(?:const|let|var)\s+\w+\s*=\s*(?:async\s+)?(?:\([^)]*\)|\w+)\s*=>",
            ],
            Self::TypeScript => &[
                r"^(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*\w+",
                r"^(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+\w+",
                r"^(?:export\s+)?(?:const|let|var)\s+\w+(?:\s*:\s*[^=]+)?\s*=\s*(?:async\s+)?(?:\([^)]*\)|\w+)\s*(?::\s*[^=]+)?=>",
                r"^(?:export\s+)?(?:declare\s+)?(?:interface|type|enum)\s+\w+",
            ],
            Self::Go => &[r"^func\s+", r"^type\s+\w+\s+(?:struct|interface)\b"],
            Self::Java | Self::CSharp => &[
                r"^(?:(?:public|private|protected|internal|static|abstract|final|sealed|partial)\s+)*(?:class|interface|enum|record|struct)\s+\w+",
            ],
            Self::Kotlin => &[
                r"^(?:(?:public|private|protected|internal|abstract|final|sealed|open|data|inline|suspend)\s+)*fun\s+",
                r"^(?:(?:public|private|protected|internal|abstract|final|sealed|open|data|enum)\s+)*(?:class|interface|object)\s+\w+",
            ],
            Self::Ruby => &[r"^(?:def|class|module)\s+\S+"],
            Self::C | Self::Cpp => &[
                r"^(?:typedef\s+)?(?:struct|class|enum|union)\s+\w+\s*(?:[:{].*)?$",
                r"^(?:(?:static|inline|extern|const|unsigned|signed|virtual)\s+)*[A-Za-z_][\w:<>]*[\s\*&]+\**[A-Za-z_][\w:~]*\s*\([^;]*$",
            ],
            Self::Php => &[
                r"^(?:(?:abstract|final)\s+)?(?:class|interface|trait)\s+\w+",
                r"^(?:(?:public|private|protected|static)\s+)*function\s+\w+",
            ],
            Self::Swift => &[
                r"^(?:(?:public|private|internal|open|fileprivate|final)\s+)*(?:func|class|struct|enum|protocol|extension)\s+\w+",
            ],
        }
    }
}

/// Compiled per-language pattern table, built once
static TABLE: LazyLock<HashMap<Language, Vec<Regex>>> = LazyLock::new(|| {
    use Language::*;
    [
        Python, Rust, JavaScript, TypeScript, Go, Java, Kotlin, CSharp, Ruby, C, Cpp, Php, Swift,
    ]
    .into_iter()
    .map(|lang| {
        let compiled = lang.patterns().iter().filter_map(|p| Regex::new(p).ok()).collect();
        (lang, compiled)
    })
    .collect()
});

/// Extract up to `max_per_file` declaration signatures from a file's text
///
/// The path only selects the language table. Content containing NUL bytes is
/// treated as binary and yields nothing.
pub fn extract_signatures(path: &Path, content: &str, max_per_file: usize) -> Vec<String> {
    trace!(?path, content_len = content.len(), "extract_signatures: called");
    let Some(lang) = Language::from_path(path) else {
        trace!(?path, "extract_signatures: unrecognized extension");
        return Vec::new();
    };
    if content.contains('\0') {
        debug!(?path, "extract_signatures: binary content, skipping");
        return Vec::new();
    }
    let Some(patterns) = TABLE.get(&lang) else {
        return Vec::new();
    };

    let lines: Vec<&str> = content.lines().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() && out.len() < max_per_file {
        let line = lines[i];
        if !patterns.iter().any(|re| re.is_match(line)) {
            i += 1;
            continue;
        }

        // Join continuation lines until the parameter list closes
        let mut header = line.trim_end().to_string();
        let mut consumed = 1;
        while paren_depth(&header) > 0 && consumed < MAX_CONTINUATION_LINES && i + consumed < lines.len() {
            header.push(' ');
            header.push_str(lines[i + consumed].trim());
            consumed += 1;
        }
        i += consumed;

        let sig = clean_signature(&header, lang);
        if !sig.is_empty() {
            out.push(sig);
        }
    }

    trace!(?lang, count = out.len(), "extract_signatures: done");
    out
}

fn paren_depth(text: &str) -> i32 {
    text.chars().fold(0, |depth, c| match c {
        '(' => depth + 1,
        ')' => depth - 1,
        _ => depth,
    })
}

/// Drop the body opener, collapse whitespace and bound the length
fn clean_signature(header: &str, lang: Language) -> String {
    let mut text = header.trim();
    if lang.uses_colon_blocks() {
        if let Some(idx) = header_colon(text) {
            text = &text[..idx];
        }
    } else if let Some(idx) = body_brace(text) {
        text = &text[..idx];
    }
    let text = text.trim_end();
    let text = text.strip_suffix("=>").unwrap_or(text).trim_end();

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_SIGNATURE_CHARS {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(MAX_SIGNATURE_CHARS - 3).collect();
    format!("{}...", cut)
}

/// Position of the ':' that ends a header, skipping any inside brackets
fn header_colon(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (idx, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ':' if depth <= 0 => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Position of the first '{' outside of any parentheses
fn body_brace(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (idx, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            '{' if depth <= 0 => return Some(idx),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(name: &str, content: &str) -> Vec<String> {
        extract_signatures(Path::new(name), content, 50)
    }

    #[test]
    fn test_all_patterns_compile() {
        for (lang, compiled) in TABLE.iter() {
            assert_eq!(compiled.len(), lang.patterns().len(), "pattern failed to compile for {:?}", lang);
        }
    }

    #[test]
    fn test_python_top_level() {
        let src = "import os\n\ndef load(path, *, strict=False):\n    return 1\n\nclass Loader(Base):\n    def inner(self):\n        pass\n\nasync def fetch(url):\n    pass\n";
        let sigs = extract("mod.py", src);
        assert_eq!(sigs, vec!["def load(path, *, strict=False)", "class Loader(Base)", "async def fetch(url)"]);
    }

    #[test]
    fn test_python_one_line_bodies_dropped() {
        let src = "def f(x): return x\n\nclass Point(NamedTuple): pass\n\ndef pick(items: list[int], key: Callable[[int], int] = None) -> dict[str, int]:\n    pass\n";
        assert_eq!(
            extract("one.py", src),
            vec![
                "def f(x)",
                "class Point(NamedTuple)",
                "def pick(items: list[int], key: Callable[[int], int] = None) -> dict[str, int]",
            ]
        );
    }

    #[test]
    fn test_rust_items_elide_bodies() {
        let src = "use std::io;\n\npub struct Config {\n    a: u32,\n}\n\npub(crate) async fn run(cfg: &Config) -> io::Result<()> {\n    Ok(())\n}\n\nimpl Config {\n    fn hidden(&self) {}\n}\n";
        let sigs = extract("lib.rs", src);
        assert_eq!(
            sigs,
            vec![
                "pub struct Config",
                "pub(crate) async fn run(cfg: &Config) -> io::Result<()>",
                "impl Config",
            ]
        );
    }

    #[test]
    fn test_multiline_parameters_joined() {
        let src = "def build(\n    name,\n    version,\n):\n    pass\n";
        let sigs = extract("setup.py", src);
        assert_eq!(sigs, vec!["def build( name, version, )"]);
    }

    #[test]
    fn test_typescript_declarations() {
        let src = "export interface User {\n  id: string;\n}\nexport const handler = async (req) => {\n};\nexport function render(props: Props): JSX.Element {\n}\n";
        let sigs = extract("app.tsx", src);
        assert_eq!(
            sigs,
            vec![
                "export interface User",
                "export const handler = async (req)",
                "export function render(props: Props): JSX.Element",
            ]
        );
    }

    #[test]
    fn test_go_functions_and_types() {
        let src = "package main\n\ntype Server struct {\n}\n\nfunc (s *Server) Start(port int) error {\n}\n";
        let sigs = extract("main.go", src);
        assert_eq!(sigs, vec!["type Server struct", "func (s *Server) Start(port int) error"]);
    }

    #[test]
    fn test_unknown_extension_yields_nothing() {
        assert!(extract("notes.txt", "def looks_like_python():\n").is_empty());
        assert!(extract("Makefile", "all:\n\tcc main.c\n").is_empty());
    }

    #[test]
    fn test_binary_content_yields_nothing() {
        assert!(extract("blob.py", "def a():\0\0\n").is_empty());
    }

    #[test]
    fn test_per_file_cap() {
        let src: String = (0..10).map(|i| format!("def f{}():\n    pass\n", i)).collect();
        let sigs = extract_signatures(Path::new("many.py"), &src, 3);
        assert_eq!(sigs.len(), 3);
        assert_eq!(sigs[2], "def f2()");
    }

    #[test]
    fn test_long_signature_truncated() {
        let params: Vec<String> = (0..80).map(|i| format!("arg{}", i)).collect();
        let src = format!("def wide({}):\n    pass\n", params.join(", "));
        let sigs = extract("wide.py", &src);
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].chars().count(), MAX_SIGNATURE_CHARS);
        assert!(sigs[0].ends_with("..."));
    }

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path(Path::new("a/b.RS")), Some(Language::Rust));
        assert_eq!(Language::from_path(Path::new("x.hpp")), Some(Language::Cpp));
        assert_eq!(Language::from_path(Path::new("README")), None);
    }
}
