//! Reference resolution for merged variable maps.
//!
//! Values may embed `${NAME}` placeholders referencing other variables in
//! the same map. Resolution runs in passes: in each pass a placeholder is
//! substituted only when its referenced value is settled (contains no
//! substitutable placeholders itself), so chains resolve from the leaves up.
//! The loop stops at a fixed point or after [`MAX_PASSES`] passes.
//!
//! Resolution is best-effort and never fails:
//! - a placeholder referencing a name absent from the map stays literal;
//! - members of a reference cycle keep their original value byte-for-byte;
//! - `$` and `$NAME` without braces pass through untouched;
//! - `$${NAME}` escapes substitution and renders as the literal `${NAME}`.

use tracing::warn;

use crate::vars::VarMap;

/// Upper bound on substitution passes. Reference chains deeper than this
/// are left partially resolved.
pub const MAX_PASSES: usize = 10;

/// A piece of a parsed value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Literal text, emitted unchanged.
    Literal(String),
    /// A `${NAME}` reference; holds the name between the braces.
    Placeholder(String),
    /// An escaped `$${NAME}`; never substituted, renders as `${NAME}`.
    Escaped(String),
}

impl Segment {
    /// The source text of this segment, as written. Passes re-emit this so
    /// escapes survive until the final render.
    fn raw(&self) -> String {
        match self {
            Segment::Literal(s) => s.clone(),
            Segment::Placeholder(name) => format!("${{{name}}}"),
            Segment::Escaped(name) => format!("$${{{name}}}"),
        }
    }
}

/// Split a value into segments.
///
/// Malformed references (unclosed brace, empty name) are kept as literal
/// text; parsing never fails.
fn parse(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            literal.push(ch);
            continue;
        }

        match chars.peek() {
            Some('$') => {
                // "$$" - escape when a braced name follows, otherwise literal
                chars.next();
                if chars.peek() == Some(&'{') {
                    chars.next();
                    match read_name(&mut chars) {
                        (name, true) if !name.is_empty() => {
                            if !literal.is_empty() {
                                segments.push(Segment::Literal(std::mem::take(&mut literal)));
                            }
                            segments.push(Segment::Escaped(name));
                        }
                        (name, closed) => {
                            literal.push_str("$${");
                            literal.push_str(&name);
                            if closed {
                                literal.push('}');
                            }
                        }
                    }
                } else {
                    literal.push_str("$$");
                }
            }
            Some('{') => {
                chars.next();
                match read_name(&mut chars) {
                    (name, true) if !name.is_empty() => {
                        if !literal.is_empty() {
                            segments.push(Segment::Literal(std::mem::take(&mut literal)));
                        }
                        segments.push(Segment::Placeholder(name));
                    }
                    (name, closed) => {
                        literal.push_str("${");
                        literal.push_str(&name);
                        if closed {
                            literal.push('}');
                        }
                    }
                }
            }
            _ => {
                // Lone '$' - shell variables like $HOME pass through
                literal.push('$');
            }
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    segments
}

/// Read up to the closing brace. Returns the consumed characters and
/// whether the brace actually closed.
fn read_name(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> (String, bool) {
    let mut name = String::new();
    for c in chars.by_ref() {
        if c == '}' {
            return (name, true);
        }
        name.push(c);
    }
    (name, false)
}

/// A value is settled when none of its placeholders can still be
/// substituted (each one is either dangling or escaped).
fn is_settled(segments: &[Segment], map: &VarMap) -> bool {
    segments.iter().all(|seg| match seg {
        Segment::Literal(_) | Segment::Escaped(_) => true,
        Segment::Placeholder(name) => !map.contains_key(name),
    })
}

/// Emit the final form of a value: escapes collapse (`$${NAME}` becomes
/// `${NAME}`), everything else as written.
fn render(value: &str) -> String {
    parse(value)
        .iter()
        .map(|seg| match seg {
            Segment::Escaped(name) => format!("${{{name}}}"),
            other => other.raw(),
        })
        .collect()
}

/// Resolve `${NAME}` references between values of `map`.
///
/// Pure with respect to its input; returns the resolved map. Given the same
/// input the output is identical regardless of internal iteration order,
/// because substitution only ever copies settled values.
///
/// Resolution runs once per map. Escapes collapse in the output
/// (`$${NAME}` becomes the literal `${NAME}`), so feeding the output back
/// in substitutes formerly escaped references; idempotence holds for
/// escape-free maps only.
pub fn resolve(map: &VarMap) -> VarMap {
    let mut current = map.clone();

    for _ in 0..MAX_PASSES {
        let mut next = VarMap::with_capacity(current.len());
        let mut changed = false;

        for (key, value) in &current {
            let mut out = String::new();

            for segment in parse(value) {
                match &segment {
                    Segment::Placeholder(name) => match current.get(name) {
                        Some(target) if is_settled(&parse(target), &current) => {
                            out.push_str(target);
                            changed = true;
                        }
                        // Dangling or not yet settled: keep as written
                        _ => out.push_str(&segment.raw()),
                    },
                    _ => out.push_str(&segment.raw()),
                }
            }

            next.insert(key.clone(), out);
        }

        current = next;
        if !changed {
            break;
        }
    }

    let unresolved: Vec<&String> = current
        .iter()
        .filter(|(_, v)| !is_settled(&parse(v), &current))
        .map(|(k, _)| k)
        .collect();
    if !unresolved.is_empty() {
        warn!(
            variables = ?unresolved,
            "unresolved variable references left literal (cycle or chain too deep)"
        );
    }

    current.iter().map(|(k, v)| (k.clone(), render(v))).collect()
}

/// One-shot substitution of `${NAME}` references from `ctx`.
///
/// Used where a single configured string (a script path, a property file
/// path) may reference variables collected earlier in the pipeline. Dangling
/// references stay literal; escapes collapse as in [`resolve`].
pub fn expand(input: &str, ctx: &VarMap) -> String {
    parse(input)
        .iter()
        .map(|seg| match seg {
            Segment::Placeholder(name) => ctx.get(name).cloned().unwrap_or_else(|| seg.raw()),
            Segment::Escaped(name) => format!("${{{name}}}"),
            Segment::Literal(text) => text.clone(),
        })
        .collect()
}
