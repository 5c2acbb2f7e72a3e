//! Argument placeholders in task patterns.
//!
//! After `--`, remaining arguments can be spliced into patterns:
//! `{1}` is the first passthrough argument, `{@}` all of them as separate
//! words, `{*}` all of them as one word. `{%}` and unknown forms are kept.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([1-9][0-9]*|@|\*)\}").expect("placeholder pattern is valid")
});

/// Expand placeholders in `pattern` using the passthrough `args`.
pub fn expand(pattern: &str, args: &[String]) -> String {
    if !pattern.contains('{') {
        return pattern.to_string();
    }

    PLACEHOLDER
        .replace_all(pattern, |caps: &Captures<'_>| match &caps[1] {
            "@" => args.iter().map(|a| quote(a)).collect::<Vec<_>>().join(" "),
            "*" => quote(&args.join(" ")),
            n => n
                .parse::<usize>()
                .ok()
                .and_then(|i| args.get(i - 1))
                .map(|a| quote(a))
                .unwrap_or_default(),
        })
        .into_owned()
}

/// Split a task pattern into words, honouring the quotes `expand` adds.
pub fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

fn quote(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        return arg.to_string();
    }
    let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn positional() {
        let a = args(&["--watch", "src"]);
        assert_eq!(expand("build {1}", &a), "build --watch");
        assert_eq!(expand("build {2} {1}", &a), "build src --watch");
        assert_eq!(expand("build {3}", &a), "build ");
    }

    #[test]
    fn all_args() {
        let a = args(&["one", "two words"]);
        assert_eq!(expand("t {@}", &a), "t one \"two words\"");
        assert_eq!(expand("t {*}", &a), "t \"one two words\"");
        assert_eq!(split_words(&expand("t {@}", &a)), args(&["t", "one", "two words"]));
        assert_eq!(split_words(&expand("t {*}", &a)), args(&["t", "one two words"]));
    }

    #[test]
    fn unknown_forms_are_literal() {
        assert_eq!(expand("t {%} {0} {x}", &args(&["a"])), "t {%} {0} {x}");
        assert_eq!(expand("lint:{js,css}", &args(&["a"])), "lint:{js,css}");
    }

    #[test]
    fn split_handles_quotes() {
        assert_eq!(split_words("  a  'b c'  \"d\\\"e\" "), args(&["a", "b c", "d\"e"]));
        assert_eq!(split_words("t \"\""), args(&["t", ""]));
    }
}
