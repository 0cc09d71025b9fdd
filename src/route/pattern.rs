//! Pattern compiler: turns `/users/{id}/{slug?}` into a regex source plus the
//! segment metadata used by matching and URL generation.
//!
//! ## Syntax
//!
//! - `{name}` is a required segment, captured with `[^/]+?` unless a
//!   requirement supplies another fragment.
//! - `{name?}` is an optional segment. It must sit directly after a `/` and
//!   may only be followed by further optional segments. The `/` in front of
//!   it is part of the optional group, so `/files/{id}/{ext?}` matches both
//!   `/files/5` and `/files/5/pdf`.
//! - Everything else is literal and matched case-sensitively.
//!
//! The regex produced here is policy free: it carries no anchors and no
//! trailing slash handling. [`crate::router::DispatchCompiler`] adds both
//! according to [`crate::config::TrailingSlash`].

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::RouterError;

/// Default capture fragment of a segment without requirement.
pub const DEFAULT_SEGMENT_REGEX: &str = "[^/]+?";

/// Alternative accepted next to a requirement fragment in the matching
/// regex: a segment carrying a percent escape. The decoded value is then
/// checked against the requirement.
pub const ESCAPED_SEGMENT_REGEX: &str = "[^/]*%[^/]*";

#[allow(clippy::expect_used)]
static SEGMENT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)(\?)?\}").expect("segment token regex is valid")
});

/// One piece of a parsed pattern, in source order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternToken {
    /// Literal text
    Static(String),
    /// `{name}`
    Required(String),
    /// `{name?}`; the leading `/` belongs to the token
    Optional(String),
}

/// Result of compiling one route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPattern {
    /// Normalised pattern (an empty pattern becomes `/`)
    pub pattern: String,
    /// Tokens in source order; generation walks these
    pub tokens: Vec<PatternToken>,
    /// Unanchored regex source with one named group per segment
    pub regex: String,
    /// Like `regex`, but constrained segments also accept percent-escaped
    /// values so they can be checked after decoding
    pub match_regex: String,
    /// All segment names in source order
    pub segment_names: Vec<String>,
    /// Required segment names in source order
    pub required: Vec<String>,
    /// Optional segment names in source order
    pub optional: Vec<String>,
    /// First literal path segment (`/users` for `/users/{id}`), used to
    /// group routes in the compiled dispatch
    pub static_prefix: String,
}

impl CompiledPattern {
    /// `true` when the pattern contains no segments at all
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.segment_names.is_empty()
    }

    /// `true` when the pattern explicitly ends in `/` (the root pattern
    /// does not count)
    #[must_use]
    pub fn has_trailing_slash(&self) -> bool {
        self.pattern.len() > 1 && self.pattern.ends_with('/')
    }
}

/// Normalise and validate the textual shape of a pattern.
pub fn normalize_pattern(pattern: &str) -> Result<String, RouterError> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return Ok("/".to_string());
    }
    if !trimmed.starts_with('/') {
        return Err(RouterError::invalid_pattern(
            pattern,
            "a route pattern must start with '/'",
        ));
    }
    if trimmed.contains("//") {
        return Err(RouterError::invalid_pattern(
            pattern,
            "a route pattern must not contain empty path segments ('//')",
        ));
    }
    Ok(trimmed.to_string())
}

/// Split a pattern into tokens, validating segment rules.
pub fn tokenize(pattern: &str) -> Result<Vec<PatternToken>, RouterError> {
    let mut tokens = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut last_end = 0;
    let mut in_optional_tail = false;

    for caps in SEGMENT_TOKEN.captures_iter(pattern) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let mut literal = &pattern[last_end..whole.start()];
        check_literal(pattern, literal)?;

        let name = name.as_str();
        if !seen.insert(name) {
            return Err(RouterError::invalid_pattern(
                pattern,
                format!("segment name '{}' is used more than once", name),
            ));
        }

        let optional = caps.get(2).is_some();
        if optional {
            // The slash in front of an optional segment moves into the token.
            literal = match literal.strip_suffix('/') {
                Some(rest) => rest,
                None => {
                    return Err(RouterError::invalid_pattern(
                        pattern,
                        format!("optional segment '{}' must follow a '/'", name),
                    ))
                }
            };
            if in_optional_tail && !literal.is_empty() {
                return Err(RouterError::invalid_pattern(
                    pattern,
                    format!(
                        "optional segment '{}' may only be preceded by other optional segments",
                        name
                    ),
                ));
            }
            in_optional_tail = true;
        } else if in_optional_tail {
            return Err(RouterError::invalid_pattern(
                pattern,
                format!(
                    "required segment '{}' cannot follow an optional segment",
                    name
                ),
            ));
        }

        if !literal.is_empty() {
            tokens.push(PatternToken::Static(literal.to_string()));
        }
        tokens.push(if optional {
            PatternToken::Optional(name.to_string())
        } else {
            PatternToken::Required(name.to_string())
        });
        last_end = whole.end();
    }

    let tail = &pattern[last_end..];
    check_literal(pattern, tail)?;
    if !tail.is_empty() {
        if in_optional_tail {
            return Err(RouterError::invalid_pattern(
                pattern,
                "optional segments must be the last part of a pattern",
            ));
        }
        tokens.push(PatternToken::Static(tail.to_string()));
    }

    Ok(tokens)
}

fn check_literal(pattern: &str, literal: &str) -> Result<(), RouterError> {
    if literal.contains('{') || literal.contains('}') {
        return Err(RouterError::invalid_pattern(
            pattern,
            "malformed segment; expected '{name}' or '{name?}' with a name made of letters, digits and '_'",
        ));
    }
    Ok(())
}

/// Validate a requirement fragment for `segment`.
///
/// Fragments are wrapped in a named group, so they may not declare named
/// groups themselves.
pub fn check_requirement(pattern: &str, segment: &str, fragment: &str) -> Result<(), RouterError> {
    if fragment.is_empty() {
        return Err(RouterError::invalid_pattern(
            pattern,
            format!("requirement for segment '{}' is empty", segment),
        ));
    }
    if fragment.contains("(?P<") || fragment.contains("(?<") {
        return Err(RouterError::invalid_pattern(
            pattern,
            format!(
                "requirement for segment '{}' must not contain named groups",
                segment
            ),
        ));
    }
    Regex::new(&format!("^(?:{})$", fragment)).map_err(|e| {
        RouterError::invalid_pattern(
            pattern,
            format!("requirement for segment '{}' is not a valid regex: {}", segment, e),
        )
    })?;
    Ok(())
}

/// Compiles route patterns into regex sources and segment metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternCompiler;

impl PatternCompiler {
    /// Compile `pattern`, substituting requirement fragments for the named
    /// segments they constrain.
    pub fn compile(
        pattern: &str,
        requirements: &BTreeMap<String, String>,
    ) -> Result<CompiledPattern, RouterError> {
        let pattern = normalize_pattern(pattern)?;
        let tokens = tokenize(&pattern)?;

        let mut regex = String::with_capacity(pattern.len() * 2);
        let mut match_regex = String::with_capacity(pattern.len() * 2);
        let mut segment_names = Vec::new();
        let mut required = Vec::new();
        let mut optional = Vec::new();
        let mut open_optionals = 0usize;

        for token in &tokens {
            match token {
                PatternToken::Static(text) => {
                    regex.push_str(&regex::escape(text));
                    match_regex.push_str(&regex::escape(text));
                }
                PatternToken::Required(name) => {
                    push_capture(&mut regex, name, requirements, false);
                    push_capture(&mut match_regex, name, requirements, true);
                    segment_names.push(name.clone());
                    required.push(name.clone());
                }
                PatternToken::Optional(name) => {
                    regex.push_str("(?:/");
                    match_regex.push_str("(?:/");
                    push_capture(&mut regex, name, requirements, false);
                    push_capture(&mut match_regex, name, requirements, true);
                    open_optionals += 1;
                    segment_names.push(name.clone());
                    optional.push(name.clone());
                }
            }
        }
        for _ in 0..open_optionals {
            regex.push_str(")?");
            match_regex.push_str(")?");
        }

        for (segment, fragment) in requirements {
            if !segment_names.iter().any(|s| s == segment) {
                return Err(RouterError::invalid_pattern(
                    &pattern,
                    format!(
                        "requirement declared for segment '{}' which is not part of the pattern",
                        segment
                    ),
                ));
            }
            check_requirement(&pattern, segment, fragment)?;
        }

        let static_prefix = static_prefix(&tokens);

        Ok(CompiledPattern {
            pattern,
            tokens,
            regex,
            match_regex,
            segment_names,
            required,
            optional,
            static_prefix,
        })
    }
}

fn push_capture(
    regex: &mut String,
    name: &str,
    requirements: &BTreeMap<String, String>,
    accept_escaped: bool,
) {
    regex.push_str("(?P<");
    regex.push_str(name);
    regex.push('>');
    match requirements.get(name) {
        Some(fragment) if accept_escaped => {
            regex.push_str("(?:");
            regex.push_str(fragment);
            regex.push('|');
            regex.push_str(ESCAPED_SEGMENT_REGEX);
            regex.push(')');
        }
        Some(fragment) => regex.push_str(fragment),
        None => regex.push_str(DEFAULT_SEGMENT_REGEX),
    }
    regex.push(')');
}

/// First complete literal path segment, e.g. `/users` for `/users/{id}` and
/// `""` for `/{slug}` or `/file-{name}`.
fn static_prefix(tokens: &[PatternToken]) -> String {
    let literal = match tokens.first() {
        Some(PatternToken::Static(text)) => text.as_str(),
        _ => return String::new(),
    };
    // The literal is a complete segment when nothing follows it, or when an
    // optional segment (which carries its own slash) does.
    let is_whole = matches!(tokens.get(1), None | Some(PatternToken::Optional(_)));
    let rest = literal.get(1..).unwrap_or_default();
    match rest.find('/') {
        Some(pos) => literal[..pos + 1].to_string(),
        None if is_whole => literal.to_string(),
        None => String::new(),
    }
}
