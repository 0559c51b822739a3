//! Artifact extraction from generated code text
//!
//! Stage 2 output is kept verbatim in the run. For writing the component to
//! disk the first fenced code block is pulled out along with its language
//! tag; text without a fence is used whole.

use once_cell::sync::Lazy;
use regex::Regex;

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)(?:^|\n)[ \t]*(```+|~~~+)[ \t]*([A-Za-z0-9_+#.-]*)[^\n]*\n(.*?)\n[ \t]*(?:```+|~~~+)")
        .unwrap()
});

/// Code pulled out of a stage response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArtifact {
    /// Lowercased fence tag, if the block had one.
    pub language: Option<String>,
    pub code: String,
    /// Whether `code` came from a fenced block.
    pub fenced: bool,
}

impl ExtractedArtifact {
    /// File extension for the artifact, without the dot.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self.language.as_deref() {
            Some(lang) => extension_for(lang),
            None if looks_like_html(&self.code) => "html",
            None => "txt",
        }
    }

    /// Suggested file name, e.g. `component.html`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("component.{}", self.extension())
    }
}

/// Extract the first fenced code block from `text`.
///
/// Falls back to the whole (trimmed) text when no fence is present. Returns
/// `None` only for blank input.
///
/// ```rust
/// use compforge_stages::extract_artifact;
///
/// let artifact = extract_artifact("Here you go:\n```html\n<div></div>\n```\n").unwrap();
/// assert_eq!(artifact.code, "<div></div>");
/// assert_eq!(artifact.file_name(), "component.html");
/// ```
#[must_use]
pub fn extract_artifact(text: &str) -> Option<ExtractedArtifact> {
    if let Some(caps) = FENCED_BLOCK.captures(text) {
        let language = caps
            .get(2)
            .map(|m| m.as_str().trim().to_ascii_lowercase())
            .filter(|l| !l.is_empty());
        let code = caps.get(3).map_or("", |m| m.as_str()).to_string();
        return Some(ExtractedArtifact {
            language,
            code,
            fenced: true,
        });
    }

    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| ExtractedArtifact {
        language: None,
        code: trimmed.to_string(),
        fenced: false,
    })
}

fn extension_for(language: &str) -> &'static str {
    match language {
        "html" | "htm" | "xhtml" => "html",
        "js" | "javascript" | "mjs" => "js",
        "jsx" => "jsx",
        "ts" | "typescript" => "ts",
        "tsx" => "tsx",
        "css" => "css",
        "json" => "json",
        "vue" => "vue",
        "svelte" => "svelte",
        "xml" | "svg" => "xml",
        "py" | "python" => "py",
        "yaml" | "yml" => "yaml",
        "sql" => "sql",
        _ => "txt",
    }
}

fn looks_like_html(code: &str) -> bool {
    let head = code.trim_start().to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.starts_with("<div")
}
