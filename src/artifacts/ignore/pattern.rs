//! One gitignore rule
//!
//! ## Translation
//!
//! - `*` and `?` never match `/`
//! - leading `**/` matches in any directory, `/**/` matches zero or more directories,
//!   trailing `/**` matches everything inside
//! - a `/` at the start or in the middle anchors the rule to the upload root,
//!   otherwise it matches at any depth
//! - a trailing `/` restricts the rule to directories
//! - bracket classes accept ranges and POSIX names (`[[:digit:]]`); a class that
//!   can match nothing, such as `[z-a]`, makes the whole rule match nothing

use anyhow::Context;
use regex::Regex;

const POSIX_CLASSES: [&str; 12] = [
    "alnum", "alpha", "blank", "cntrl", "digit", "graph", "lower", "print", "punct", "space",
    "upper", "xdigit",
];

#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    negated: bool,
    directory_only: bool,
    /// `None` when no path can ever match
    regex: Option<Regex>,
}

impl Pattern {
    /// Compile one line of a pattern file; `None` for blanks and comments
    pub fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let line = trim_trailing_spaces(line);
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let (negated, body) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        // `\#` and `\!` keep their literal meaning at the start of a rule
        let body = body
            .strip_prefix("\\#")
            .map(|rest| format!("#{rest}"))
            .or_else(|| body.strip_prefix("\\!").map(|rest| format!("!{rest}")))
            .unwrap_or_else(|| body.to_string());

        let (directory_only, body) = match body.strip_suffix('/') {
            Some(rest) => (true, rest.to_string()),
            None => (false, body),
        };
        if body.is_empty() {
            return Ok(None);
        }

        let anchored = body.contains('/');
        let body = body.trim_start_matches('/');
        let prefix = if anchored { "^" } else { "^(?:.*/)?" };
        let regex = glob_to_regex(body)
            .map(|expression| Regex::new(&format!("{prefix}{expression}$")))
            .transpose()
            .with_context(|| format!("invalid ignore pattern: {line}"))?;

        Ok(Some(Pattern {
            source: line.to_string(),
            negated,
            directory_only,
            regex,
        }))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Whether this rule applies to `path` (ignoring negation)
    pub fn applies_to(&self, path: &str, is_dir: bool) -> bool {
        if self.directory_only && !is_dir {
            return false;
        }

        self.regex.as_ref().is_some_and(|regex| regex.is_match(path))
    }
}

fn trim_trailing_spaces(line: &str) -> &str {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let without_spaces = trimmed.trim_end_matches(' ');

    // an escaped final space survives
    if without_spaces.ends_with('\\') && without_spaces.len() < trimmed.len() {
        &trimmed[..without_spaces.len() + 1]
    } else {
        without_spaces.trim_end_matches('\t')
    }
}

/// `None` when the glob can match nothing
fn glob_to_regex(glob: &str) -> Option<String> {
    let chars = glob.chars().collect::<Vec<_>>();
    let mut expression = String::with_capacity(glob.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                let at_segment_start = i == 0 || chars[i - 1] == '/';
                match chars.get(i + 2) {
                    Some('/') if at_segment_start => {
                        expression.push_str("(?:.*/)?");
                        i += 3;
                    }
                    None if at_segment_start => {
                        expression.push_str(".*");
                        i += 2;
                    }
                    _ => {
                        expression.push_str("[^/]*");
                        i += 2;
                    }
                }
                continue;
            }
            '*' => expression.push_str("[^/]*"),
            '?' => expression.push_str("[^/]"),
            '[' => match bracket_to_regex(&chars[i..]) {
                Some((class, consumed)) => {
                    expression.push_str(&class?);
                    i += consumed;
                    continue;
                }
                None => expression.push_str(r"\["),
            },
            '\\' => {
                if let Some(next) = chars.get(i + 1) {
                    expression.push_str(&regex::escape(&next.to_string()));
                    i += 2;
                    continue;
                }
            }
            c => expression.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    Some(expression)
}

fn escape_char(c: char) -> String {
    regex::escape(&c.to_string())
}

/// Translate the bracket expression opening at `chars[0]`.
///
/// Yields the regex class (`None` when it can match nothing) and the number of
/// chars consumed, or `None` when the bracket is never closed.
fn bracket_to_regex(chars: &[char]) -> Option<(Option<String>, usize)> {
    let mut i = 1;
    let negated = matches!(chars.get(i), Some('!' | '^'));
    if negated {
        i += 1;
    }

    let mut items = String::new();
    let mut satisfiable = true;
    let mut first = true;

    loop {
        let c = *chars.get(i)?;
        if c == ']' && !first {
            break;
        }
        first = false;

        if c == '[' && chars.get(i + 1) == Some(&':') {
            let rest = &chars[i + 2..];
            let end = rest.windows(2).position(|w| w[0] == ':' && w[1] == ']')?;
            let name = rest[..end].iter().collect::<String>();
            if POSIX_CLASSES.contains(&name.as_str()) {
                items.push_str(&format!("[:{name}:]"));
            } else {
                satisfiable = false;
            }
            i += end + 4;
            continue;
        }

        let low = if c == '\\' {
            i += 1;
            *chars.get(i)?
        } else {
            c
        };
        i += 1;

        if chars.get(i) == Some(&'-') && chars.get(i + 1).is_some_and(|&n| n != ']') {
            let mut high = chars[i + 1];
            i += 2;
            if high == '\\' {
                high = *chars.get(i)?;
                i += 1;
            }
            // reversed ranges contain nothing
            if low <= high {
                items.push_str(&format!("{}-{}", escape_char(low), escape_char(high)));
            }
            continue;
        }

        items.push_str(&escape_char(low));
    }

    let class = match (satisfiable, negated, items.is_empty()) {
        (false, _, _) | (true, false, true) => None,
        (true, true, _) => Some(format!("[^/{items}]")),
        (true, false, false) => Some(format!("[{items}]")),
    };
    Some((class, i + 1))
}
