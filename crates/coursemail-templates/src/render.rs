//! Template renderer.
//!
//! Placeholders are `{name}` where `name` is letters, digits, `_`, `-`, `.`
//! or inner spaces (so raw column headers like `{Email address}` work).
//! There is no escape syntax: a lone `{` or `}` is an error. Both subject
//! and body are parsed and every variable resolved before any output is
//! built, so a failure never exposes partially substituted text.

use std::collections::{BTreeMap, BTreeSet};

use coursemail_core::{RenderError, RenderedMessage, Template};

/// Variable mapping supplied at render time.
pub type Variables = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'t> {
    Text(&'t str),
    Var(&'t str),
}

fn parse(text: &str) -> Result<Vec<Segment<'_>>, RenderError> {
    let mut segments = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        let rest = &text[pos..];
        let Some(offset) = rest.find(['{', '}']) else {
            segments.push(Segment::Text(rest));
            break;
        };
        if offset > 0 {
            segments.push(Segment::Text(&rest[..offset]));
        }
        let open = pos + offset;
        if text.as_bytes()[open] == b'}' {
            return Err(RenderError::UnmatchedBrace { brace: '}', position: open });
        }
        let after = &text[open + 1..];
        let close = match after.find(['{', '}']) {
            Some(i) if after.as_bytes()[i] == b'}' => i,
            _ => return Err(RenderError::UnmatchedBrace { brace: '{', position: open }),
        };
        let name = &after[..close];
        if !is_valid_name(name) {
            return Err(RenderError::InvalidPlaceholder(name.to_string()));
        }
        segments.push(Segment::Var(name));
        pos = open + 1 + close + 1;
    }
    Ok(segments)
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.trim() == name
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ' '))
}

fn resolve<'v>(segments: &[Segment<'_>], vars: &'v Variables) -> Result<Vec<&'v str>, RenderError> {
    segments
        .iter()
        .filter_map(|s| match s {
            Segment::Var(name) => Some(*name),
            Segment::Text(_) => None,
        })
        .map(|name| {
            vars.get(name)
                .map(String::as_str)
                .ok_or_else(|| RenderError::MissingVariable(name.to_string()))
        })
        .collect()
}

fn assemble(segments: &[Segment<'_>], values: &[&str]) -> String {
    let mut out = String::new();
    let mut values = values.iter();
    for segment in segments {
        match segment {
            Segment::Text(t) => out.push_str(t),
            Segment::Var(_) => out.push_str(values.next().copied().unwrap_or_default()),
        }
    }
    out
}

/// Placeholder names referenced by `text`, in first-appearance order,
/// without duplicates.
pub fn placeholders(text: &str) -> Result<Vec<&str>, RenderError> {
    let mut seen = BTreeSet::new();
    Ok(parse(text)?
        .into_iter()
        .filter_map(|s| match s {
            Segment::Var(name) => seen.insert(name).then_some(name),
            Segment::Text(_) => None,
        })
        .collect())
}

/// Every variable a template needs, subject and body combined.
pub fn required_variables(template: &Template) -> Result<BTreeSet<String>, RenderError> {
    let mut names: BTreeSet<String> = placeholders(&template.subject)?
        .into_iter()
        .map(String::from)
        .collect();
    names.extend(placeholders(&template.body)?.into_iter().map(String::from));
    Ok(names)
}

/// Render a template's subject and body. Fails without output if any
/// placeholder in either part lacks a value.
pub fn render(template: &Template, vars: &Variables) -> Result<RenderedMessage, RenderError> {
    let subject_segments = parse(&template.subject)?;
    let body_segments = parse(&template.body)?;
    let subject_values = resolve(&subject_segments, vars)?;
    let body_values = resolve(&body_segments, vars)?;
    Ok(RenderedMessage {
        subject: assemble(&subject_segments, &subject_values),
        body: assemble(&body_segments, &body_values),
    })
}
