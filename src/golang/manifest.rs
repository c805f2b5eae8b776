use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Marker prefixed to replace directives that were commented out.
pub const REPLACE_MARKER: &str = "// gomodup-replace ";

static INLINE_RELATIVE_REPLACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\r?\n)(replace[ \t]+[^\s]+(?:[ \t]+[^\s]+)?[ \t]+=>[ \t]+\.\.?/.*)")
        .expect("valid inline replace regex")
});

static REPLACE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\r?\n)replace\s*\([^)]+\s*\)").expect("valid replace block regex")
});

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\r?\n)").expect("valid line break regex"));

/// Comment out relative replace directives and replace blocks so the
/// toolchain does not try to resolve local paths missing from the sandbox.
pub fn comment_out_replace_directives(content: &str) -> String {
    let inline = INLINE_RELATIVE_REPLACE.replace_all(content, |caps: &Captures| {
        format!("{}{}{}", &caps[1], REPLACE_MARKER, &caps[2])
    });

    REPLACE_BLOCK
        .replace_all(&inline, |caps: &Captures| {
            LINE_BREAK
                .replace_all(&caps[0], |line: &Captures| format!("{}{}", &line[1], REPLACE_MARKER))
                .into_owned()
        })
        .into_owned()
}

pub fn restore_replace_directives(content: &str) -> String {
    content.replace(REPLACE_MARKER, "")
}
