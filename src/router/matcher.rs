//! Route pattern compilation.
//!
//! A pattern such as `/users/:id(\d+)` is lexed, parsed into literal text and
//! parameter keys, and compiled once into an anchored, case-insensitive
//! [`Regex`]. Matching a concrete path yields the percent-decoded parameters.
//!
//! Supported syntax:
//!
//! | Syntax          | Meaning                                              |
//! |-----------------|------------------------------------------------------|
//! | `:name`         | named parameter, one segment                         |
//! | `:name(\d+)`    | named parameter with a custom sub-pattern            |
//! | `(\d+)`         | unnamed parameter, keyed `0`, `1`, ...               |
//! | `?` `*` `+`     | optional, zero-or-more, one-or-more                  |
//! | `{...}`         | group, e.g. `/book{s}?` or `{-:version}?`            |
//! | `\:`            | escaped literal character                            |
//!
//! A `/` or `.` directly before a parameter belongs to the parameter, so
//! `/post/:slug?` matches both `/post` and `/post/hello`.

use percent_encoding::percent_decode_str;
use regex::{Regex, RegexBuilder};

use crate::context::Parameters;
use crate::error::{Error, Result};

// Characters that fold into a following parameter.
const PREFIXES: &str = "./";
const DEFAULT_PATTERN: &str = "[^/#?]+?";
const DELIMITER_CLASS: &str = "[/#?]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    Optional,
    ZeroOrMore,
    OneOrMore,
}

impl Modifier {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "?" => Some(Modifier::Optional),
            "*" => Some(Modifier::ZeroOrMore),
            "+" => Some(Modifier::OneOrMore),
            _ => None,
        }
    }

    fn as_str(modifier: Option<Self>) -> &'static str {
        match modifier {
            Some(Modifier::Optional) => "?",
            Some(Modifier::ZeroOrMore) => "*",
            Some(Modifier::OneOrMore) => "+",
            None => "",
        }
    }

    fn repeats(modifier: Option<Self>) -> bool {
        matches!(modifier, Some(Modifier::ZeroOrMore | Modifier::OneOrMore))
    }
}

// A parameter (or a pattern-less optional group) in a parsed route.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Key {
    name: String,
    prefix: String,
    suffix: String,
    pattern: String,
    modifier: Option<Modifier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    Key(Key),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Open,
    Close,
    Pattern,
    Name,
    Char,
    EscapedChar,
    Modifier,
    End,
}

#[derive(Debug)]
struct Token {
    kind: TokenKind,
    index: usize,
    value: String,
}

impl Token {
    fn new(kind: TokenKind, index: usize, value: impl Into<String>) -> Self {
        Self {
            kind,
            index,
            value: value.into(),
        }
    }
}

fn lex(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' | '+' | '?' => {
                tokens.push(Token::new(TokenKind::Modifier, i, c));
                i += 1;
            }
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| format!("dangling escape at {i}"))?;
                tokens.push(Token::new(TokenKind::EscapedChar, i, *escaped));
                i += 2;
            }
            '{' => {
                tokens.push(Token::new(TokenKind::Open, i, c));
                i += 1;
            }
            '}' => {
                tokens.push(Token::new(TokenKind::Close, i, c));
                i += 1;
            }
            ':' => {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                if j == start {
                    return Err(format!("missing parameter name at {i}"));
                }
                let name: String = chars[start..j].iter().collect();
                tokens.push(Token::new(TokenKind::Name, i, name));
                i = j;
            }
            '(' => {
                let mut depth = 1;
                let mut pattern = String::new();
                let mut j = i + 1;

                if chars.get(j) == Some(&'?') {
                    return Err(format!("pattern cannot start with \"?\" at {j}"));
                }

                while j < chars.len() {
                    match chars[j] {
                        '\\' => {
                            pattern.push('\\');
                            if let Some(next) = chars.get(j + 1) {
                                pattern.push(*next);
                            }
                            j += 2;
                            continue;
                        }
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                j += 1;
                                break;
                            }
                        }
                        '(' => {
                            depth += 1;
                            if chars.get(j + 1) != Some(&'?') {
                                return Err(format!("capturing groups are not allowed at {j}"));
                            }
                        }
                        _ => {}
                    }
                    pattern.push(chars[j]);
                    j += 1;
                }

                if depth > 0 {
                    return Err(format!("unbalanced pattern at {i}"));
                }
                if pattern.is_empty() {
                    return Err(format!("missing pattern at {i}"));
                }
                tokens.push(Token::new(TokenKind::Pattern, i, pattern));
                i = j;
            }
            _ => {
                tokens.push(Token::new(TokenKind::Char, i, c));
                i += 1;
            }
        }
    }

    tokens.push(Token::new(TokenKind::End, i, ""));
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_key: usize,
}

impl Parser {
    fn try_consume(&mut self, kind: TokenKind) -> Option<String> {
        let token = self.tokens.get(self.pos).filter(|t| t.kind == kind)?;
        let value = token.value.clone();
        self.pos += 1;
        Some(value)
    }

    fn must_consume(&mut self, kind: TokenKind) -> Result<String, String> {
        if let Some(value) = self.try_consume(kind) {
            return Ok(value);
        }
        Err(match self.tokens.get(self.pos) {
            Some(token) => format!("unexpected {:?} at {}, expected {kind:?}", token.kind, token.index),
            None => format!("unexpected end of pattern, expected {kind:?}"),
        })
    }

    fn consume_text(&mut self) -> String {
        let mut text = String::new();
        while let Some(value) = self
            .try_consume(TokenKind::Char)
            .or_else(|| self.try_consume(TokenKind::EscapedChar))
        {
            text.push_str(&value);
        }
        text
    }

    fn modifier(&mut self) -> Option<Modifier> {
        self.try_consume(TokenKind::Modifier)
            .and_then(|m| Modifier::parse(&m))
    }

    fn key_name(&mut self) -> String {
        let name = self.next_key.to_string();
        self.next_key += 1;
        name
    }

    fn parse(mut self) -> Result<Vec<Part>, String> {
        let mut parts = Vec::new();
        let mut path = String::new();

        while self.pos < self.tokens.len() {
            let ch = self.try_consume(TokenKind::Char);
            let name = self.try_consume(TokenKind::Name);
            let pattern = self.try_consume(TokenKind::Pattern);

            if name.is_some() || pattern.is_some() {
                let mut prefix = ch.unwrap_or_default();
                if !PREFIXES.contains(prefix.as_str()) {
                    path.push_str(&prefix);
                    prefix.clear();
                }
                if !path.is_empty() {
                    parts.push(Part::Text(std::mem::take(&mut path)));
                }
                let name = match name {
                    Some(name) => name,
                    None => self.key_name(),
                };
                parts.push(Part::Key(Key {
                    name,
                    prefix,
                    suffix: String::new(),
                    pattern: pattern.unwrap_or_else(|| DEFAULT_PATTERN.to_owned()),
                    modifier: self.modifier(),
                }));
                continue;
            }

            if let Some(value) = ch.or_else(|| self.try_consume(TokenKind::EscapedChar)) {
                path.push_str(&value);
                continue;
            }

            if !path.is_empty() {
                parts.push(Part::Text(std::mem::take(&mut path)));
            }

            if self.try_consume(TokenKind::Open).is_some() {
                let prefix = self.consume_text();
                let name = self.try_consume(TokenKind::Name);
                let pattern = self.try_consume(TokenKind::Pattern);
                let suffix = self.consume_text();
                self.must_consume(TokenKind::Close)?;

                let (name, pattern) = match (name, pattern) {
                    (Some(name), Some(pattern)) => (name, pattern),
                    (Some(name), None) => (name, DEFAULT_PATTERN.to_owned()),
                    (None, Some(pattern)) => (self.key_name(), pattern),
                    (None, None) => (String::new(), String::new()),
                };
                parts.push(Part::Key(Key {
                    name,
                    prefix,
                    suffix,
                    pattern,
                    modifier: self.modifier(),
                }));
                continue;
            }

            self.must_consume(TokenKind::End)?;
        }

        Ok(parts)
    }
}

fn to_regex_source(parts: &[Part]) -> String {
    let mut route = String::from("^");

    for part in parts {
        let key = match part {
            Part::Text(text) => {
                route.push_str(&regex::escape(text));
                continue;
            }
            Part::Key(key) => key,
        };

        let prefix = regex::escape(&key.prefix);
        let suffix = regex::escape(&key.suffix);
        let modifier = Modifier::as_str(key.modifier);
        let repeats = Modifier::repeats(key.modifier);
        let pattern = &key.pattern;

        if pattern.is_empty() {
            route.push_str(&format!("(?:{prefix}{suffix}){modifier}"));
        } else if prefix.is_empty() && suffix.is_empty() {
            if repeats {
                route.push_str(&format!("((?:{pattern}){modifier})"));
            } else {
                route.push_str(&format!("({pattern}){modifier}"));
            }
        } else if repeats {
            let optional = if key.modifier == Some(Modifier::ZeroOrMore) {
                "?"
            } else {
                ""
            };
            route.push_str(&format!(
                "(?:{prefix}((?:{pattern})(?:{suffix}{prefix}(?:{pattern}))*){suffix}){optional}"
            ));
        } else {
            route.push_str(&format!("(?:{prefix}({pattern}){suffix}){modifier}"));
        }
    }

    route.push_str(DELIMITER_CLASS);
    route.push_str("?$");
    route
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// A compiled route pattern.
///
/// # Examples
///
/// ```
/// use canopy::router::PathMatcher;
///
/// let matcher = PathMatcher::compile("/user/:id").unwrap();
/// let params = matcher.matches("/user/42").unwrap();
/// assert_eq!(params.get("id"), Some("42"));
/// assert!(matcher.matches("/team/42").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pattern: String,
    regex: Regex,
    keys: Vec<Key>,
}

impl PathMatcher {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] when the pattern is malformed or its
    /// sub-patterns are not valid regular expressions.
    pub fn compile(pattern: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidPattern {
            pattern: pattern.to_owned(),
            reason,
        };

        let tokens = lex(pattern).map_err(invalid)?;
        let parts = Parser {
            tokens,
            pos: 0,
            next_key: 0,
        }
        .parse()
        .map_err(invalid)?;

        let regex = RegexBuilder::new(&to_regex_source(&parts))
            .case_insensitive(true)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        let keys = parts
            .into_iter()
            .filter_map(|part| match part {
                Part::Key(key) if !key.pattern.is_empty() => Some(key),
                _ => None,
            })
            .collect();

        Ok(Self {
            pattern: pattern.to_owned(),
            regex,
            keys,
        })
    }

    /// The source pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Parameter names in capture order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|key| key.name.as_str())
    }

    /// Tests `path`, returning its parameters on a match.
    ///
    /// Parameters that did not participate in the match are absent. Repeated
    /// parameters are decoded per segment and joined back with their prefix.
    pub fn matches(&self, path: &str) -> Option<Parameters> {
        let captures = self.regex.captures(path)?;
        let mut params = Parameters::new();

        for (key, group) in self.keys.iter().zip(captures.iter().skip(1)) {
            let Some(group) = group else {
                continue;
            };
            let separator = format!("{}{}", key.prefix, key.suffix);
            let value = if Modifier::repeats(key.modifier) && !separator.is_empty() {
                group
                    .as_str()
                    .split(separator.as_str())
                    .map(decode)
                    .collect::<Vec<_>>()
                    .join(&key.prefix)
            } else {
                decode(group.as_str())
            };
            params.insert(key.name.clone(), value);
        }

        Some(params)
    }
}

/// Normalizes a route or mount path.
///
/// Resolves `.` and `..`, collapses repeated slashes, drops the trailing slash
/// and forces a leading one. `*` is returned untouched.
///
/// ```
/// use canopy::router::normalize_path;
///
/// assert_eq!(normalize_path("api/v1/"), "/api/v1");
/// assert_eq!(normalize_path("/a//b/../c/."), "/a/c");
/// assert_eq!(normalize_path("/"), "/");
/// assert_eq!(normalize_path("*"), "*");
/// ```
pub fn normalize_path(path: &str) -> String {
    if path == "*" {
        return path.to_owned();
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    format!("/{}", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(pattern: &str) -> PathMatcher {
        PathMatcher::compile(pattern).unwrap()
    }

    // ── literals ──────────────────────────────────────────────────────────────

    #[test]
    fn literal_path() {
        let m = compile("/users");
        assert!(m.matches("/users").is_some());
        assert!(m.matches("/users/").is_some());
        assert!(m.matches("/USERS").is_some());
        assert!(m.matches("/users/7").is_none());
        assert!(m.matches("/user").is_none());
    }

    #[test]
    fn literal_root() {
        let m = compile("/");
        assert!(m.matches("/").is_some());
        assert!(m.matches("/a").is_none());
    }

    #[test]
    fn escaped_characters_are_literal() {
        let m = compile(r"/a\:b");
        assert!(m.matches("/a:b").is_some());
        assert_eq!(m.param_names().count(), 0);
    }

    // ── parameters ────────────────────────────────────────────────────────────

    #[test]
    fn named_parameter_round_trip() {
        let m = compile("/user/:id");
        let params = m.matches("/user/42").unwrap();
        assert_eq!(params.get("id"), Some("42"));
    }

    #[test]
    fn multiple_parameters_round_trip() {
        let m = compile("/users/:user_id/posts/:post_id");
        let params = m.matches("/users/ada/posts/99").unwrap();
        assert_eq!(params.get("user_id"), Some("ada"));
        assert_eq!(params.get("post_id"), Some("99"));
    }

    #[test]
    fn parameter_values_are_percent_decoded() {
        let params = compile("/user/:name").matches("/user/J%C3%BCrgen%20M").unwrap();
        assert_eq!(params.get("name"), Some("Jürgen M"));
    }

    #[test]
    fn inline_sub_pattern() {
        let m = compile(r"/:id(\d+)");
        assert_eq!(m.matches("/123").unwrap().get("id"), Some("123"));
        assert!(m.matches("/abc").is_none());
    }

    #[test]
    fn unnamed_groups_are_numbered() {
        let m = compile(r"/files/(\d+)/(\w+)");
        let params = m.matches("/files/12/report").unwrap();
        assert_eq!(params.get("0"), Some("12"));
        assert_eq!(params.get("1"), Some("report"));
    }

    #[test]
    fn optional_parameter() {
        let m = compile("/post/:slug?");
        assert!(m.matches("/post").unwrap().get("slug").is_none());
        assert_eq!(m.matches("/post/hello").unwrap().get("slug"), Some("hello"));
    }

    #[test]
    fn one_or_more_parameter() {
        let m = compile("/docs/:path+");
        assert_eq!(m.matches("/docs/a/b/c").unwrap().get("path"), Some("a/b/c"));
        assert!(m.matches("/docs").is_none());
    }

    #[test]
    fn zero_or_more_parameter() {
        let m = compile("/docs/:path*");
        assert!(m.matches("/docs").unwrap().get("path").is_none());
        assert_eq!(m.matches("/docs/a%20b/c").unwrap().get("path"), Some("a b/c"));
    }

    #[test]
    fn dot_prefix_folds_into_parameter() {
        let m = compile("/file.:ext?");
        assert!(m.matches("/file").is_some());
        assert_eq!(m.matches("/file.txt").unwrap().get("ext"), Some("txt"));
    }

    // ── groups ────────────────────────────────────────────────────────────────

    #[test]
    fn optional_literal_group() {
        let m = compile("/book{s}?");
        assert!(m.matches("/book").is_some());
        assert!(m.matches("/books").is_some());
        assert!(m.matches("/bookss").is_none());
    }

    #[test]
    fn group_with_parameter() {
        let m = compile("/api{-:version}?");
        assert_eq!(m.matches("/api-v2").unwrap().get("version"), Some("v2"));
        assert!(m.matches("/api").unwrap().get("version").is_none());
    }

    // ── errors ────────────────────────────────────────────────────────────────

    #[test]
    fn invalid_patterns_are_rejected() {
        for pattern in ["/:", "/(", r"/a/((b))", "/files/*", "/(?x)", "/{a"] {
            let err = PathMatcher::compile(pattern).unwrap_err();
            assert!(
                matches!(err, Error::InvalidPattern { pattern: ref p, .. } if p == pattern),
                "{pattern} -> {err}"
            );
        }
    }

    // ── normalize_path ────────────────────────────────────────────────────────

    #[test]
    fn normalize_variants() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("api"), "/api");
        assert_eq!(normalize_path("/api/"), "/api");
        assert_eq!(normalize_path("//api///v1"), "/api/v1");
        assert_eq!(normalize_path("/api/../v2/./x"), "/v2/x");
        assert_eq!(normalize_path("*"), "*");
    }
}
