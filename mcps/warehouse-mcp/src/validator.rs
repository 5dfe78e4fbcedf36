//! Read-only query validation
//!
//! Classifies query text before anything reaches the store. Comments are
//! stripped and the whole body is scanned, so an allowed leading keyword
//! cannot hide a mutating clause in a subquery, a CTE body or a comment.
//! The original text is what gets executed; normalization only produces a
//! working copy for inspection.

use std::sync::LazyLock;

use regex::Regex;

/// Statements a query may start with, in display order
pub const ALLOWED_STATEMENTS: &[&str] = &["DESC", "DESCRIBE", "EXPLAIN", "SELECT", "SHOW", "WITH"];

/// Mutating or administrative keywords rejected anywhere in the body
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "REPLACE", "MERGE",
    "COPY", "PUT", "GET", "REMOVE", "GRANT", "REVOKE",
];

/// Objects that may not follow `USE`
const FORBIDDEN_USE_TARGETS: &[&str] = &["ROLE", "WAREHOUSE", "DATABASE", "SCHEMA"];

/// Keywords that can open the statement following a CTE list
const CTE_TAIL_STATEMENTS: &[&str] = &[
    "SELECT", "VALUES", "TABLE", "INSERT", "UPDATE", "DELETE", "MERGE", "REPLACE", "CREATE",
    "DROP", "ALTER", "TRUNCATE", "COPY", "SHOW", "DESC", "DESCRIBE", "EXPLAIN",
];

/// Outcome of classifying one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(String),
}

/// Classify query text as permitted or rejected
///
/// Checks run in order and the first failure wins:
/// 1. non-empty after comment stripping
/// 2. starts with an allowed statement
/// 3. no forbidden keyword (or `USE <object>` phrase) anywhere
/// 4. a `WITH` query ends in a `SELECT`
pub fn classify(query: &str) -> Verdict {
    let normalized = normalize(query);
    if normalized.is_empty() {
        return Verdict::Rejected("query cannot be empty".to_string());
    }

    let leading = leading_word(&normalized);
    if !ALLOWED_STATEMENTS.contains(&leading) {
        let found = if leading.is_empty() {
            normalized.split(' ').next().unwrap_or_default()
        } else {
            leading
        };
        return Verdict::Rejected(format!(
            "query must start with one of: {} (found {})",
            ALLOWED_STATEMENTS.join(", "),
            found
        ));
    }

    if let Some(keyword) = find_forbidden(&normalized) {
        return Verdict::Rejected(format!("query contains forbidden operation: {keyword}"));
    }

    if leading == "WITH" && !cte_ends_in_select(&normalized) {
        return Verdict::Rejected("CTE query must end with a SELECT statement".to_string());
    }

    Verdict::Accepted
}

/// Whether anything besides comments and whitespace follows the first
/// statement terminator outside quoted text
pub fn has_trailing_statement(query: &str) -> bool {
    let stripped = strip_comments(query);
    let Some(end) = TOKEN
        .find_iter(&stripped)
        .find(|m| m.as_str() == ";")
        .map(|m| m.end())
    else {
        return false;
    };
    stripped[end..].chars().any(|c| !c.is_whitespace() && c != ';')
}

/// Whether `name` is a plain identifier safe to splice into catalog queries
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

static LEADING_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+").expect("Invalid leading word regex"));

/// Forbidden keywords and `USE <object>` phrases as whole words
static FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"\b(?:{})\b|\bUSE\s+(?:{})\b",
        FORBIDDEN_KEYWORDS.join("|"),
        FORBIDDEN_USE_TARGETS.join("|")
    );
    Regex::new(&pattern).expect("Invalid forbidden keyword regex")
});

/// Quoted spans (possibly unterminated), parentheses, semicolons and words
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"'(?:[^']|'')*'?|"(?:[^"]|"")*"?|`(?:[^`]|``)*`?|\[[^\]]*\]?|[();]|\w+"#)
        .expect("Invalid token regex")
});

/// Working copy for inspection: comments removed, whitespace collapsed,
/// uppercased
fn normalize(query: &str) -> String {
    let stripped = strip_comments(query);
    WHITESPACE.replace_all(stripped.trim(), " ").to_uppercase()
}

/// Remove `--` line comments and `/* */` block comments outside string
/// literals and quoted identifiers (`"x"`, `` `x` ``, `[x]`). An unterminated
/// block comment runs to the end of the input.
fn strip_comments(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut chars = query.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                out.push(c);
                while let Some(inner) = chars.next() {
                    out.push(inner);
                    if inner == close {
                        // doubled quote is an escaped quote; brackets have no escape
                        if close != ']' && chars.peek() == Some(&close) {
                            out.extend(chars.next());
                        } else {
                            break;
                        }
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
                out.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

fn leading_word(normalized: &str) -> &str {
    LEADING_WORD.find(normalized).map_or("", |m| m.as_str())
}

/// First forbidden keyword or phrase in text order. Quoted text is scanned
/// too, which errs on the side of rejecting.
fn find_forbidden(normalized: &str) -> Option<&str> {
    FORBIDDEN.find(normalized).map(|m| m.as_str())
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Word(&'a str),
    Open,
    Close,
}

/// Words and parentheses, skipping quoted text
fn tokenize(normalized: &str) -> Vec<Token<'_>> {
    TOKEN
        .find_iter(normalized)
        .filter_map(|m| match m.as_str() {
            "(" => Some(Token::Open),
            ")" => Some(Token::Close),
            ";" => None,
            text if text.starts_with(['\'', '"', '`', '[']) => None,
            text => Some(Token::Word(text)),
        })
        .collect()
}

/// The first statement keyword outside every parenthesised CTE body must be
/// `SELECT`
fn cte_ends_in_select(normalized: &str) -> bool {
    let mut depth = 0usize;

    for token in tokenize(normalized) {
        match token {
            Token::Open => depth += 1,
            Token::Close => depth = depth.saturating_sub(1),
            Token::Word(word) if depth == 0 && CTE_TAIL_STATEMENTS.contains(&word) => {
                return word == "SELECT";
            }
            Token::Word(_) => {}
        }
    }

    false
}
