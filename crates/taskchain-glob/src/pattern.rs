//! Compiled script-name patterns.
//!
//! Script names are colon-separated paths (`build:js:min`), so the wildcards
//! are segment-aware:
//! - `*` matches zero or more characters within one segment
//! - `?` matches exactly one character other than `:`
//! - `**` matches any run of characters, including `:`
//! - `[abc]`, `[a-z]`, `[!abc]` / `[^abc]` character classes (never match `:`)
//! - `{a,b,c}` alternatives, nested braces allowed
//! - `\x` matches `x` literally

use crate::PatternError;

/// Separator between script-name segments.
pub const SEGMENT_SEPARATOR: char = ':';

/// Upper bound on matcher steps per candidate, so patterns like `*a*a*a*b`
/// cannot backtrack without limit against long names.
const MAX_MATCH_STEPS: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(char),
    AnyOne,
    SegmentRun,
    Globstar,
    Class { negate: bool, ranges: Vec<(char, char)> },
}

/// A script-name pattern compiled into one piece list per brace alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPattern {
    source: String,
    alternatives: Vec<Vec<Piece>>,
}

impl ScriptPattern {
    /// Compile a pattern, expanding braces up front.
    pub fn new(source: &str) -> Result<Self, PatternError> {
        let alternatives = expand_braces(source)?
            .iter()
            .map(|alt| compile(alt))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            source: source.to_string(),
            alternatives,
        })
    }

    /// The pattern text as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True if the whole `name` matches any alternative.
    pub fn matches(&self, name: &str) -> bool {
        let input: Vec<char> = name.chars().collect();
        self.alternatives.iter().any(|pieces| {
            let mut steps = 0usize;
            match_pieces(pieces, &input, &mut steps)
        })
    }

    /// Select the candidates this pattern matches, preserving candidate order.
    pub fn filter<'a, I>(&self, candidates: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates.into_iter().filter(|c| self.matches(c)).collect()
    }
}

/// True if `s` contains any pattern metacharacter.
pub fn is_pattern(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

/// Expand `{a,b}` groups into the full list of alternatives.
pub fn expand_braces(pattern: &str) -> Result<Vec<String>, PatternError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut depth = 0usize;
    let mut open = None;
    let mut close = None;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => {
                if depth == 0 {
                    open = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    let (start, end) = match (open, close) {
        (Some(s), Some(e)) => (s, e),
        (Some(_), None) => return Err(PatternError::UnclosedBrace(pattern.to_string())),
        _ => return Ok(vec![pattern.to_string()]),
    };

    let prefix: String = chars[..start].iter().collect();
    let suffix: String = chars[end + 1..].iter().collect();
    let body: String = chars[start + 1..end].iter().collect();

    let mut out = Vec::new();
    for alt in split_alternatives(&body) {
        out.extend(expand_braces(&format!("{prefix}{alt}{suffix}"))?);
    }
    Ok(out)
}

fn split_alternatives(body: &str) -> Vec<String> {
    let mut parts = vec![String::new()];
    let mut depth = 0usize;
    for c in body.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(String::new());
                continue;
            }
            _ => {}
        }
        if let Some(last) = parts.last_mut() {
            last.push(c);
        }
    }
    parts
}

fn compile(pattern: &str) -> Result<Vec<Piece>, PatternError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut pieces = Vec::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                let mut run = 0;
                while i < chars.len() && chars[i] == '*' {
                    run += 1;
                    i += 1;
                }
                pieces.push(if run > 1 { Piece::Globstar } else { Piece::SegmentRun });
                continue;
            }
            '?' => pieces.push(Piece::AnyOne),
            '[' => {
                let (piece, consumed) = compile_class(&chars[i..])
                    .ok_or_else(|| PatternError::UnclosedClass(pattern.to_string()))?;
                pieces.push(piece);
                i += consumed;
                continue;
            }
            '\\' if i + 1 < chars.len() => {
                pieces.push(Piece::Literal(chars[i + 1]));
                i += 2;
                continue;
            }
            c => pieces.push(Piece::Literal(c)),
        }
        i += 1;
    }

    Ok(pieces)
}

/// Parse `[...]` starting at `chars[0]`. Returns the piece and how many chars
/// it spans, or `None` when the class never closes.
fn compile_class(chars: &[char]) -> Option<(Piece, usize)> {
    let mut i = 1;
    let mut negate = false;
    if matches!(chars.get(i), Some('!' | '^')) {
        negate = true;
        i += 1;
    }

    let first = i;
    let mut ranges = Vec::new();
    while i < chars.len() {
        let c = chars[i];
        // `]` right after the opening bracket is a literal member
        if c == ']' && i > first {
            return Some((Piece::Class { negate, ranges }, i + 1));
        }
        if i + 2 < chars.len() && chars[i + 1] == '-' && chars[i + 2] != ']' {
            ranges.push((c, chars[i + 2]));
            i += 3;
        } else {
            ranges.push((c, c));
            i += 1;
        }
    }
    None
}

fn match_pieces(pieces: &[Piece], input: &[char], steps: &mut usize) -> bool {
    *steps += 1;
    if *steps > MAX_MATCH_STEPS {
        return false;
    }

    let Some((head, rest)) = pieces.split_first() else {
        return input.is_empty();
    };

    match head {
        Piece::Literal(c) => input.first() == Some(c) && match_pieces(rest, &input[1..], steps),
        Piece::AnyOne => match input.first() {
            Some(&c) if c != SEGMENT_SEPARATOR => match_pieces(rest, &input[1..], steps),
            _ => false,
        },
        Piece::Class { negate, ranges } => match input.first() {
            Some(&c) if c != SEGMENT_SEPARATOR => {
                let hit = ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi);
                hit != *negate && match_pieces(rest, &input[1..], steps)
            }
            _ => false,
        },
        Piece::SegmentRun => {
            let limit = input
                .iter()
                .position(|&c| c == SEGMENT_SEPARATOR)
                .unwrap_or(input.len());
            (0..=limit).any(|skip| match_pieces(rest, &input[skip..], steps))
        }
        Piece::Globstar => {
            if rest.is_empty() {
                return true;
            }
            (0..=input.len()).any(|skip| match_pieces(rest, &input[skip..], steps))
        }
    }
}
