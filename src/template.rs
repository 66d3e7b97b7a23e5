//! # URL Templates
//!
//! A template describes one host or one path segment. It is an ordered list of
//! parts: static literals, named regex patterns, and at most one named
//! wildcard. Templates are parsed once at registration time; matching a
//! request segment against a template yields the captured values in
//! declaration order.
//!
//! ## Template Syntax
//!
//! - `users` — static literal.
//! - `{id:[0-9]+}` — regex part capturing `id`.
//! - `{rest}` — wildcard part capturing `rest`.
//! - `$version:v{major:[0-9]+}.{minor:[0-9]+}` — explicit template name
//!   (`$name:` prefix) with two regex parts.
//! - `\$`, `\{`, `\}`, `\:` escape the metacharacters.
//!
//! A template with exactly one dynamic part adopts that part's value name as
//! its own; a template with several distinct value names must be named
//! explicitly.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::error::{Result, RouterError};

/// Ordered collection of captured `(name, value)` pairs.
///
/// Values are kept in the order the template declares them so that
/// [`Template::apply`] can reproduce duplicates faithfully. Lookups return the
/// first pair with the given name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateValues {
    pairs: Vec<(String, String)>,
}

impl TemplateValues {
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    /// Returns the first value captured under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.pairs.truncate(len);
    }

    pub(crate) fn extend_from(&mut self, other: TemplateValues) {
        self.pairs.extend(other.pairs);
    }
}

/// How close two templates are to each other.
///
/// Drives collision resolution during registration: `TheSame` templates refer
/// to one node, the two `Different*Names` results are configuration conflicts,
/// and `Different` templates coexist as siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Similarity {
    /// Structurally unrelated templates.
    Different,
    /// Same structure and patterns, but at least one value name differs.
    DifferentValueNames,
    /// Same structure, patterns and value names, but the template names differ.
    DifferentNames,
    /// Fully equivalent.
    TheSame,
}

/// A regex part of a template.
///
/// `raw` is the pattern text as written; similarity compares it verbatim.
/// `matcher` is compiled with the anchoring its position requires (prefix,
/// suffix, or whole-remainder), `validator` is always fully anchored and backs
/// [`Template::apply`].
#[derive(Debug, Clone)]
pub struct RegexSegment {
    name: String,
    raw: String,
    matcher: Regex,
    validator: Regex,
}

impl RegexSegment {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        &self.raw
    }
}

/// One part of a template.
#[derive(Debug, Clone)]
pub enum Segment {
    /// Literal text that must match exactly.
    Static(String),
    /// A named, anchored regex capture.
    Regex(RegexSegment),
    /// A named catch-all for the text between the prefix and suffix parts.
    Wildcard { name: String },
}

impl Segment {
    fn value_name(&self) -> Option<&str> {
        match self {
            Segment::Static(_) => None,
            Segment::Regex(rs) => Some(&rs.name),
            Segment::Wildcard { name } => Some(name),
        }
    }
}

/// A parsed host or path-segment template.
#[derive(Debug, Clone)]
pub struct Template {
    name: Option<String>,
    explicit_name: bool,
    segments: Vec<Segment>,
    wildcard: Option<usize>,
}

// Intermediate parse product, before patterns are resolved and compiled.
enum RawPiece {
    Static(String),
    Dynamic { name: String, pattern: Option<String> },
}

impl Template {
    /// Parses a template string.
    ///
    /// # Examples
    ///
    /// ```
    /// use treelight::Template;
    ///
    /// let t = Template::parse("{id:[0-9]+}").unwrap();
    /// assert_eq!(t.name(), Some("id"));
    ///
    /// let values = t.match_str("42").unwrap();
    /// assert_eq!(values.get("id"), Some("42"));
    /// ```
    pub fn parse(s: &str) -> Result<Template> {
        let (explicit, pieces) = parse_raw(s)?;
        let (segments, wildcard) = resolve_pieces(pieces)?;

        let mut value_names: Vec<&str> = Vec::new();
        for seg in &segments {
            if let Some(n) = seg.value_name() {
                if !value_names.contains(&n) {
                    value_names.push(n);
                }
            }
        }

        let name = match &explicit {
            Some(n) => Some(n.clone()),
            None if value_names.len() == 1 => Some(value_names[0].to_string()),
            None if value_names.len() > 1 => {
                return Err(RouterError::InvalidTemplate {
                    template: s.to_string(),
                    reason: "a template with multiple value names must be named".to_string(),
                });
            }
            None => None,
        };

        let segments = compile_segments(s, segments, wildcard)?;

        Ok(Template {
            name,
            explicit_name: explicit.is_some(),
            segments,
            wildcard,
        })
    }

    /// The template's name: explicit (`$name:`), or adopted from its single
    /// dynamic part.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// True when the template is a single static literal.
    pub fn is_static(&self) -> bool {
        self.segments.len() == 1 && matches!(self.segments[0], Segment::Static(_))
    }

    /// True when the template is a single wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.segments.len() == 1 && matches!(self.segments[0], Segment::Wildcard { .. })
    }

    /// True when the template contains any dynamic part.
    pub fn has_pattern(&self) -> bool {
        !self.is_static()
    }

    /// The literal of a static template.
    pub fn literal(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [Segment::Static(lit)] => Some(lit),
            _ => None,
        }
    }

    /// The template of the root resource.
    pub(crate) fn root() -> Template {
        Template {
            name: None,
            explicit_name: false,
            segments: vec![Segment::Static("/".to_string())],
            wildcard: None,
        }
    }

    /// The template's parts, in order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub(crate) fn wildcard_name(&self) -> Option<&str> {
        self.wildcard.and_then(|i| self.segments[i].value_name())
    }

    /// Distinct value names, in declaration order.
    pub(crate) fn value_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for seg in &self.segments {
            if let Some(name) = seg.value_name() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Compares two templates. See [`Similarity`].
    pub fn similarity(&self, other: &Template) -> Similarity {
        use Similarity::*;

        if self.is_static() || other.is_static() {
            if !(self.is_static() && other.is_static()) {
                return Different;
            }
            if self.literal() != other.literal() {
                return Different;
            }
            return if self.name == other.name { TheSame } else { DifferentNames };
        }

        if self.is_wildcard() || other.is_wildcard() {
            if !(self.is_wildcard() && other.is_wildcard()) {
                return Different;
            }
            if self.wildcard_name() != other.wildcard_name() {
                return DifferentValueNames;
            }
            return if self.name == other.name { TheSame } else { DifferentNames };
        }

        if self.wildcard != other.wildcard || self.segments.len() != other.segments.len() {
            return Different;
        }

        let mut value_names_differ = false;
        for (a, b) in self.segments.iter().zip(other.segments.iter()) {
            match (a, b) {
                (Segment::Static(x), Segment::Static(y)) => {
                    if x != y {
                        return Different;
                    }
                }
                (Segment::Regex(x), Segment::Regex(y)) => {
                    if x.raw != y.raw {
                        return Different;
                    }
                    if x.name != y.name {
                        value_names_differ = true;
                    }
                }
                (Segment::Wildcard { name: x }, Segment::Wildcard { name: y }) => {
                    if x != y {
                        value_names_differ = true;
                    }
                }
                _ => return Different,
            }
        }

        if value_names_differ {
            return DifferentValueNames;
        }
        if self.name != other.name {
            return DifferentNames;
        }
        TheSame
    }

    /// Requires full equivalence with `other`, reporting how the two
    /// templates diverge otherwise.
    pub fn check_same(&self, other: &Template) -> Result<()> {
        match self.similarity(other) {
            Similarity::TheSame => Ok(()),
            Similarity::DifferentNames => Err(RouterError::DifferentNames {
                a: self.to_string(),
                b: other.to_string(),
            }),
            Similarity::DifferentValueNames => Err(RouterError::DifferentValueNames {
                a: self.to_string(),
                b: other.to_string(),
            }),
            Similarity::Different => Err(RouterError::DifferentTemplates {
                a: self.to_string(),
                b: other.to_string(),
            }),
        }
    }

    /// Matches `s` against the template, returning the captured values.
    ///
    /// Prefix parts consume the string from the left, suffix parts (those
    /// after the wildcard) from the right; the wildcard absorbs whatever
    /// non-empty middle remains. A repeated value name must capture the same
    /// text at every occurrence.
    pub fn match_str(&self, s: &str) -> Option<TemplateValues> {
        if let Some(lit) = self.literal() {
            return (lit == s).then(TemplateValues::new);
        }

        let n = self.segments.len();
        let mut caps: Vec<Option<String>> = vec![None; n];
        let mut rem = s;

        let left_end = self.wildcard.unwrap_or(n);
        for idx in 0..left_end {
            match &self.segments[idx] {
                Segment::Static(lit) => rem = rem.strip_prefix(lit.as_str())?,
                Segment::Regex(rs) => {
                    let m = rs.matcher.find(rem)?;
                    caps[idx] = Some(m.as_str().to_string());
                    rem = &rem[m.end()..];
                }
                Segment::Wildcard { .. } => unreachable!("wildcard left of its own index"),
            }
        }

        match self.wildcard {
            None => {
                if !rem.is_empty() {
                    return None;
                }
            }
            Some(w) => {
                for idx in (w + 1..n).rev() {
                    match &self.segments[idx] {
                        Segment::Static(lit) => rem = rem.strip_suffix(lit.as_str())?,
                        Segment::Regex(rs) => {
                            let m = rs.matcher.find(rem)?;
                            caps[idx] = Some(m.as_str().to_string());
                            rem = &rem[..m.start()];
                        }
                        Segment::Wildcard { .. } => {
                            unreachable!("second wildcard rejected at parse time")
                        }
                    }
                }
                if rem.is_empty() {
                    return None;
                }
                caps[w] = Some(rem.to_string());
            }
        }

        let mut values = TemplateValues::new();
        for idx in 0..n {
            if let Some(v) = caps[idx].take() {
                let name = self.segments[idx]
                    .value_name()
                    .expect("captured segment has a name");
                if let Some(prev) = values.get(name) {
                    if prev != v {
                        return None;
                    }
                } else {
                    values.push(name, v);
                }
            }
        }
        Some(values)
    }

    /// Renders the template with the given values.
    ///
    /// Each value is validated against its part's pattern. A missing value is
    /// an error unless `ignore_missing` is set, in which case the part is
    /// skipped.
    pub fn apply(&self, values: &TemplateValues, ignore_missing: bool) -> Result<String> {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Static(lit) => out.push_str(lit),
                Segment::Regex(rs) => match values.get(&rs.name) {
                    Some(v) => {
                        if !rs.validator.is_match(v) {
                            return Err(RouterError::InvalidValue {
                                name: rs.name.clone(),
                                value: v.to_string(),
                            });
                        }
                        out.push_str(v);
                    }
                    None if ignore_missing => {}
                    None => {
                        return Err(RouterError::MissingValue {
                            name: rs.name.clone(),
                        })
                    }
                },
                Segment::Wildcard { name } => match values.get(name) {
                    Some(v) => out.push_str(v),
                    None if ignore_missing => {}
                    None => {
                        return Err(RouterError::MissingValue { name: name.clone() })
                    }
                },
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.explicit_name {
            if let Some(name) = &self.name {
                write!(f, "${}:", name.replace(':', "\\:"))?;
            }
        }
        for (idx, seg) in self.segments.iter().enumerate() {
            match seg {
                Segment::Static(lit) => {
                    let mut escaped = lit.replace('{', "\\{").replace('}', "\\}");
                    if idx == 0 && !self.explicit_name && escaped.starts_with('$') {
                        escaped.insert(0, '\\');
                    }
                    f.write_str(&escaped)?;
                }
                Segment::Regex(rs) => write!(f, "{{{}:{}}}", rs.name, rs.raw)?,
                Segment::Wildcard { name } => write!(f, "{{{}}}", name)?,
            }
        }
        Ok(())
    }
}

fn invalid(template: &str, reason: &str) -> RouterError {
    RouterError::InvalidTemplate {
        template: template.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_raw(s: &str) -> Result<(Option<String>, Vec<RawPiece>)> {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let mut i = 0;

    let mut explicit_name: Option<String> = None;
    if chars.first() == Some(&'$') {
        i = 1;
        let mut name = String::new();
        loop {
            if i >= len {
                return Err(invalid(s, "unterminated template name"));
            }
            match chars[i] {
                '\\' if chars.get(i + 1) == Some(&':') => {
                    name.push(':');
                    i += 2;
                }
                ':' => {
                    i += 1;
                    break;
                }
                c => {
                    name.push(c);
                    i += 1;
                }
            }
        }
        if name.is_empty() {
            return Err(invalid(s, "empty template name"));
        }
        explicit_name = Some(name);
    }

    let mut pieces = Vec::new();
    let mut stat = String::new();
    while i < len {
        match chars[i] {
            '\\' => {
                let Some(&next) = chars.get(i + 1) else {
                    return Err(invalid(s, "dangling escape"));
                };
                stat.push(next);
                i += 2;
            }
            '{' => {
                if !stat.is_empty() {
                    pieces.push(RawPiece::Static(std::mem::take(&mut stat)));
                }
                i += 1;
                let (name, pattern) = parse_dynamic(s, &chars, &mut i)?;
                pieces.push(RawPiece::Dynamic { name, pattern });
            }
            '}' => return Err(invalid(s, "unbalanced closing brace")),
            c => {
                stat.push(c);
                i += 1;
            }
        }
    }
    if !stat.is_empty() {
        pieces.push(RawPiece::Static(stat));
    }
    if pieces.is_empty() {
        return Err(invalid(s, "empty template"));
    }
    Ok((explicit_name, pieces))
}

// Parses the inside of `{ ... }`; `i` points right after the opening brace.
fn parse_dynamic(s: &str, chars: &[char], i: &mut usize) -> Result<(String, Option<String>)> {
    let len = chars.len();
    let mut name = String::new();
    let mut pattern = None;
    loop {
        if *i >= len {
            return Err(invalid(s, "unclosed brace"));
        }
        match chars[*i] {
            '\\' => {
                let Some(&next) = chars.get(*i + 1) else {
                    return Err(invalid(s, "dangling escape"));
                };
                name.push(next);
                *i += 2;
            }
            ':' => {
                *i += 1;
                pattern = Some(parse_pattern(s, chars, i)?);
                break;
            }
            '}' => {
                *i += 1;
                break;
            }
            c => {
                name.push(c);
                *i += 1;
            }
        }
    }
    if name.is_empty() {
        return Err(invalid(s, "empty value name"));
    }
    if let Some(p) = &pattern {
        if p.is_empty() {
            return Err(invalid(s, "empty pattern"));
        }
    }
    Ok((name, pattern))
}

// Reads a regex body up to the closing brace of the dynamic part. Braces open
// quantifiers inside the body and are tracked by depth; `[...]` classes make
// braces (and everything else) literal; backslash escapes pass through intact.
fn parse_pattern(s: &str, chars: &[char], i: &mut usize) -> Result<String> {
    let len = chars.len();
    let mut out = String::new();
    let mut depth = 0usize;
    let mut in_class = false;
    loop {
        if *i >= len {
            return Err(invalid(s, "unclosed brace"));
        }
        let c = chars[*i];
        match c {
            '\\' => {
                let Some(&next) = chars.get(*i + 1) else {
                    return Err(invalid(s, "dangling escape"));
                };
                out.push('\\');
                out.push(next);
                *i += 2;
            }
            '[' if !in_class => {
                in_class = true;
                out.push(c);
                *i += 1;
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
                *i += 1;
            }
            '{' if !in_class => {
                depth += 1;
                out.push(c);
                *i += 1;
            }
            '}' if !in_class => {
                if depth == 0 {
                    *i += 1;
                    return Ok(out);
                }
                depth -= 1;
                out.push(c);
                *i += 1;
            }
            _ => {
                out.push(c);
                *i += 1;
            }
        }
    }
}

// Uncompiled stand-in for a regex segment.
enum ProtoSegment {
    Static(String),
    Regex { name: String, raw: String },
    Wildcard { name: String },
}

impl ProtoSegment {
    fn value_name(&self) -> Option<&str> {
        match self {
            ProtoSegment::Static(_) => None,
            ProtoSegment::Regex { name, .. } => Some(name),
            ProtoSegment::Wildcard { name } => Some(name),
        }
    }
}

fn resolve_pieces(pieces: Vec<RawPiece>) -> Result<(Vec<ProtoSegment>, Option<usize>)> {
    let mut segments: Vec<ProtoSegment> = Vec::new();
    let mut wildcard: Option<usize> = None;
    let mut patterns: HashMap<String, String> = HashMap::new();

    for piece in pieces {
        match piece {
            RawPiece::Static(lit) => segments.push(ProtoSegment::Static(lit)),
            RawPiece::Dynamic {
                name,
                pattern: Some(p),
            } => {
                let is_wildcard_name = wildcard
                    .and_then(|w| segments[w].value_name())
                    .is_some_and(|w| w == name);
                if is_wildcard_name {
                    return Err(RouterError::DifferentPattern { name });
                }
                if let Some(existing) = patterns.get(&name) {
                    if *existing != p {
                        return Err(RouterError::DifferentPattern { name });
                    }
                }
                patterns.insert(name.clone(), p.clone());
                segments.push(ProtoSegment::Regex { name, raw: p });
            }
            RawPiece::Dynamic {
                name,
                pattern: None,
            } => {
                if let Some(p) = patterns.get(&name) {
                    // Pattern-free re-use of a declared value name.
                    let raw = p.clone();
                    segments.push(ProtoSegment::Regex { name, raw });
                } else if let Some(w) = wildcard {
                    let wname = segments[w].value_name().unwrap_or_default();
                    if wname == name {
                        return Err(RouterError::RepeatedWildcardName { name });
                    }
                    return Err(RouterError::AnotherWildcardName { name });
                } else {
                    wildcard = Some(segments.len());
                    segments.push(ProtoSegment::Wildcard { name });
                }
            }
        }
    }

    Ok((segments, wildcard))
}

fn compile_segments(
    s: &str,
    protos: Vec<ProtoSegment>,
    wildcard: Option<usize>,
) -> Result<Vec<Segment>> {
    let last = protos.len() - 1;
    let mut segments = Vec::with_capacity(protos.len());
    for (idx, proto) in protos.into_iter().enumerate() {
        let seg = match proto {
            ProtoSegment::Static(lit) => Segment::Static(lit),
            ProtoSegment::Wildcard { name } => Segment::Wildcard { name },
            ProtoSegment::Regex { name, raw } => {
                let anchored = match wildcard {
                    None if idx == last => format!("^(?:{})$", raw),
                    Some(w) if idx > w => format!("(?:{})$", raw),
                    _ => format!("^(?:{})", raw),
                };
                let matcher = Regex::new(&anchored)
                    .map_err(|e| invalid(s, &format!("bad pattern for {:?}: {}", name, e)))?;
                let validator = Regex::new(&format!("^(?:{})$", raw))
                    .map_err(|e| invalid(s, &format!("bad pattern for {:?}: {}", name, e)))?;
                Segment::Regex(RegexSegment {
                    name,
                    raw,
                    matcher,
                    validator,
                })
            }
        };
        segments.push(seg);
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmpl(s: &str) -> Template {
        Template::parse(s).unwrap()
    }

    #[test]
    fn parses_static() {
        let t = tmpl("users");
        assert!(t.is_static());
        assert_eq!(t.literal(), Some("users"));
        assert_eq!(t.name(), None);
    }

    #[test]
    fn parses_regex_and_adopts_name() {
        let t = tmpl("{id:[0-9]+}");
        assert!(!t.is_static());
        assert!(!t.is_wildcard());
        assert_eq!(t.name(), Some("id"));
    }

    #[test]
    fn parses_wildcard() {
        let t = tmpl("{rest}");
        assert!(t.is_wildcard());
        assert_eq!(t.name(), Some("rest"));
    }

    #[test]
    fn parses_explicit_name() {
        let t = tmpl("$version:v{major:[0-9]+}.{minor:[0-9]+}");
        assert_eq!(t.name(), Some("version"));
    }

    #[test]
    fn escaped_colon_in_template_name() {
        let t = tmpl("$a\\:b:static");
        assert_eq!(t.name(), Some("a:b"));
        assert!(t.is_static());
    }

    #[test]
    fn escaped_dollar_is_literal() {
        let t = tmpl("\\$price");
        assert!(t.is_static());
        assert_eq!(t.literal(), Some("$price"));
    }

    #[test]
    fn escaped_braces_in_static() {
        let t = tmpl("a\\{b\\}c");
        assert_eq!(t.literal(), Some("a{b}c"));
    }

    #[test]
    fn quantifier_braces_do_not_close_the_part() {
        let t = tmpl("{hex:[0-9a-f]{8}}");
        assert_eq!(t.name(), Some("hex"));
        assert!(t.match_str("deadbeef").is_some());
        assert!(t.match_str("dead").is_none());
    }

    #[test]
    fn class_braces_do_not_close_the_part() {
        let t = tmpl("{odd:[{}x]+}");
        assert!(t.match_str("x{}").is_some());
    }

    #[test]
    fn rejects_malformed_templates() {
        for bad in ["", "{", "{}", "{name:}", "a}b", "$:x", "{a:b}{c", "x\\"] {
            assert!(
                matches!(
                    Template::parse(bad),
                    Err(RouterError::InvalidTemplate { .. })
                ),
                "expected InvalidTemplate for {:?}",
                bad
            );
        }
    }

    #[test]
    fn rejects_unnamed_multi_value_template() {
        assert!(matches!(
            Template::parse("{a:x+}{b:y+}"),
            Err(RouterError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn rejects_repeated_name_with_different_pattern() {
        assert!(matches!(
            Template::parse("$t:{id:[0-9]+}-{id:[a-z]+}"),
            Err(RouterError::DifferentPattern { .. })
        ));
    }

    #[test]
    fn rejects_second_wildcard() {
        assert!(matches!(
            Template::parse("$t:{a}x{b}"),
            Err(RouterError::AnotherWildcardName { .. })
        ));
        assert!(matches!(
            Template::parse("{a}x{a}"),
            Err(RouterError::RepeatedWildcardName { .. })
        ));
    }

    #[test]
    fn similarity_of_statics() {
        assert_eq!(tmpl("users").similarity(&tmpl("users")), Similarity::TheSame);
        assert_eq!(tmpl("users").similarity(&tmpl("items")), Similarity::Different);
        assert_eq!(
            tmpl("$u:users").similarity(&tmpl("users")),
            Similarity::DifferentNames
        );
    }

    #[test]
    fn similarity_of_wildcards() {
        assert_eq!(tmpl("{rest}").similarity(&tmpl("{rest}")), Similarity::TheSame);
        assert_eq!(
            tmpl("{rest}").similarity(&tmpl("{tail}")),
            Similarity::DifferentValueNames
        );
        assert_eq!(
            tmpl("$a:{rest}").similarity(&tmpl("{rest}")),
            Similarity::DifferentNames
        );
    }

    #[test]
    fn similarity_of_segmented_templates() {
        assert_eq!(
            tmpl("v{n:[0-9]+}").similarity(&tmpl("v{n:[0-9]+}")),
            Similarity::TheSame
        );
        assert_eq!(
            tmpl("v{n:[0-9]+}").similarity(&tmpl("v{num:[0-9]+}")),
            Similarity::DifferentValueNames
        );
        assert_eq!(
            tmpl("v{n:[0-9]+}").similarity(&tmpl("v{n:[0-9]*}")),
            Similarity::Different
        );
        assert_eq!(
            tmpl("v{n:[0-9]+}").similarity(&tmpl("x{n:[0-9]+}")),
            Similarity::Different
        );
        assert_eq!(
            tmpl("v{n:[0-9]+}").similarity(&tmpl("users")),
            Similarity::Different
        );
    }

    #[test]
    fn similarity_is_symmetric() {
        let pairs = [
            ("users", "users"),
            ("users", "{id:[0-9]+}"),
            ("{id:[0-9]+}", "{num:[0-9]+}"),
            ("{rest}", "{tail}"),
            ("$a:x{v:[0-9]+}", "x{v:[0-9]+}"),
        ];
        for (a, b) in pairs {
            let (ta, tb) = (tmpl(a), tmpl(b));
            assert_eq!(ta.similarity(&tb), tb.similarity(&ta), "{} vs {}", a, b);
        }
    }

    #[test]
    fn check_same_reports_the_divergence() {
        assert!(tmpl("users").check_same(&tmpl("users")).is_ok());
        assert!(matches!(
            tmpl("$u:users").check_same(&tmpl("users")),
            Err(RouterError::DifferentNames { .. })
        ));
        assert!(matches!(
            tmpl("{id:[0-9]+}").check_same(&tmpl("{num:[0-9]+}")),
            Err(RouterError::DifferentValueNames { .. })
        ));
        assert!(matches!(
            tmpl("users").check_same(&tmpl("{id:[0-9]+}")),
            Err(RouterError::DifferentTemplates { .. })
        ));
    }

    #[test]
    fn matches_prefix_and_suffix_parts() {
        let t = tmpl("$file:{name:[a-z]+}.{ext:[a-z0-9]+}");
        let values = t.match_str("report.pdf").unwrap();
        assert_eq!(values.get("name"), Some("report"));
        assert_eq!(values.get("ext"), Some("pdf"));
        assert!(t.match_str("report").is_none());
        assert!(t.match_str("REPORT.pdf").is_none());
    }

    #[test]
    fn wildcard_absorbs_the_middle() {
        let t = tmpl("$archive:v{major:[0-9]+}-{rest}.tar.gz");
        let values = t.match_str("v2-backup.old.tar.gz").unwrap();
        assert_eq!(values.get("major"), Some("2"));
        assert_eq!(values.get("rest"), Some("backup.old"));
    }

    #[test]
    fn wildcard_must_capture_something() {
        let t = tmpl("$archive:pre{rest}post");
        assert!(t.match_str("prepost").is_none());
        assert_eq!(
            t.match_str("preXpost").unwrap().get("rest"),
            Some("X")
        );
    }

    #[test]
    fn repeated_value_must_agree() {
        let t = tmpl("{id:[0-9]+}-{id}");
        let values = t.match_str("7-7").unwrap();
        assert_eq!(values.get("id"), Some("7"));
        assert!(t.match_str("7-8").is_none());
    }

    #[test]
    fn final_regex_consumes_the_remainder() {
        let t = tmpl("v{n:[0-9]+}");
        assert!(t.match_str("v12x").is_none());
        assert!(t.match_str("v12").is_some());
    }

    #[test]
    fn apply_round_trips() {
        let t = tmpl("$file:{name:[a-z]+}.{ext:[a-z0-9]+}");
        let mut values = TemplateValues::new();
        values.push("name", "report");
        values.push("ext", "pdf");
        let rendered = t.apply(&values, false).unwrap();
        assert_eq!(rendered, "report.pdf");
        assert_eq!(t.match_str(&rendered).unwrap(), values);
    }

    #[test]
    fn apply_validates_values() {
        let t = tmpl("{id:[0-9]+}");
        let mut values = TemplateValues::new();
        values.push("id", "abc");
        assert!(matches!(
            t.apply(&values, false),
            Err(RouterError::InvalidValue { .. })
        ));
    }

    #[test]
    fn apply_reports_missing_values() {
        let t = tmpl("{id:[0-9]+}");
        let values = TemplateValues::new();
        assert!(matches!(
            t.apply(&values, false),
            Err(RouterError::MissingValue { .. })
        ));
        assert_eq!(t.apply(&values, true).unwrap(), "");
    }

    #[test]
    fn display_round_trips_through_parse() {
        for s in [
            "users",
            "{id:[0-9]+}",
            "{rest}",
            "$version:v{major:[0-9]+}.{minor:[0-9]+}",
            "a\\{b\\}c",
        ] {
            let t = tmpl(s);
            let reparsed = tmpl(&t.to_string());
            assert_eq!(t.similarity(&reparsed), Similarity::TheSame, "{}", s);
        }
    }

    #[test]
    fn host_template_matches_subdomains() {
        let t = tmpl("{sub:[a-z]+}.example.com");
        let values = t.match_str("shop.example.com").unwrap();
        assert_eq!(values.get("sub"), Some("shop"));
        assert!(t.match_str("example.com").is_none());
    }
}
