//! File-extension based language detection.
//!
//! The language histogram of an event counts touched files per language. It is
//! a coarse signal by intent: no line or byte weighting, and files with an
//! unmapped extension are ignored.

use crate::types::LanguageCount;

/// Maps a file extension (including the leading dot) to a language name.
///
/// Matching is case-sensitive; `.R` and `.r` are both listed explicitly.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    let language = match ext {
        ".ts" | ".tsx" => "TypeScript",
        ".js" | ".jsx" | ".mjs" | ".cjs" => "JavaScript",
        ".py" => "Python",
        ".rb" => "Ruby",
        ".go" => "Go",
        ".rs" => "Rust",
        ".java" => "Java",
        ".kt" | ".kts" => "Kotlin",
        ".swift" => "Swift",
        ".c" | ".h" => "C",
        ".cpp" | ".cc" | ".cxx" | ".hpp" => "C++",
        ".cs" => "C#",
        ".php" => "PHP",
        ".scala" => "Scala",
        ".clj" => "Clojure",
        ".ex" | ".exs" => "Elixir",
        ".erl" => "Erlang",
        ".hs" => "Haskell",
        ".lua" => "Lua",
        ".r" | ".R" => "R",
        ".dart" => "Dart",
        ".vue" => "Vue",
        ".svelte" => "Svelte",
        ".html" => "HTML",
        ".css" => "CSS",
        ".scss" => "SCSS",
        ".sass" => "Sass",
        ".less" => "Less",
        ".json" => "JSON",
        ".yaml" | ".yml" => "YAML",
        ".xml" => "XML",
        ".sql" => "SQL",
        ".sh" | ".bash" | ".zsh" => "Shell",
        ".md" | ".mdx" => "Markdown",
        ".toml" => "TOML",
        ".graphql" | ".gql" => "GraphQL",
        ".proto" => "Protocol Buffers",
        ".tf" => "HCL",
        ".zig" => "Zig",
        ".nim" => "Nim",
        ".v" => "V",
        ".pl" | ".pm" => "Perl",
        _ => return None,
    };
    Some(language)
}

/// The extension of the last path segment, from its last dot.
///
/// `None` when the file name has no dot.
pub fn file_extension(path: &str) -> Option<&str> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name.rfind('.').map(|idx| &file_name[idx..])
}

/// Builds a per-language file count, in order of first appearance.
pub fn detect_languages<'a, I>(paths: I) -> Vec<LanguageCount>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: Vec<LanguageCount> = Vec::new();

    for language in paths
        .into_iter()
        .filter_map(file_extension)
        .filter_map(language_for_extension)
    {
        match counts.iter_mut().find(|c| c.language == language) {
            Some(entry) => entry.count += 1,
            None => counts.push(LanguageCount::new(language, 1)),
        }
    }

    counts
}
