//! Placeholder token parsing.
//!
//! A placeholder is `<inner>` where `inner` holds no angle bracket and no
//! line break:
//!
//! - `<path:P#K>` / `<path:P#K#V>`: explicit backend path, key and version
//! - `<name>`: bare name, resolved against the resource's local values
//!
//! Parsing is pure. Resolution lives in [`super::resolver`].

/// What a placeholder refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder<'a> {
    Bare {
        name: &'a str,
    },
    Explicit {
        path: &'a str,
        key: &'a str,
        version: Option<&'a str>,
    },
}

/// A piece of a parsed string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Placeholder {
        /// The full token including brackets, e.g. `<path:kv/app#user>`.
        raw: &'a str,
        /// The text between the brackets.
        inner: &'a str,
        reference: Placeholder<'a>,
    },
}

const PATH_PREFIX: &str = "path:";

/// Split `input` into literal text and placeholder tokens, in order.
pub fn parse(input: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut search_from = 0;

    while let Some(offset) = input[search_from..].find('<') {
        let open = search_from + offset;
        let body_start = open + 1;
        let Some(len) = input[body_start..].find(|c: char| matches!(c, '<' | '>' | '\n')) else {
            break;
        };
        let close = body_start + len;

        // `<` restarts the token, `\n` and `<>` are plain text.
        if len == 0 || input.as_bytes()[close] != b'>' {
            search_from = if input.as_bytes()[close] == b'<' {
                close
            } else {
                close + 1
            };
            continue;
        }

        if literal_start < open {
            segments.push(Segment::Literal(&input[literal_start..open]));
        }
        let inner = &input[body_start..close];
        segments.push(Segment::Placeholder {
            raw: &input[open..=close],
            inner,
            reference: parse_reference(inner),
        });
        literal_start = close + 1;
        search_from = literal_start;
    }

    if literal_start < input.len() {
        segments.push(Segment::Literal(&input[literal_start..]));
    }
    segments
}

/// Whether `input` holds at least one placeholder token.
pub fn contains_placeholder(input: &str) -> bool {
    parse(input)
        .iter()
        .any(|segment| matches!(segment, Segment::Placeholder { .. }))
}

/// Interpret the text between the brackets.
pub fn parse_reference(inner: &str) -> Placeholder<'_> {
    parse_explicit(inner).unwrap_or(Placeholder::Bare { name: inner.trim() })
}

/// `path:P#K` or `path:P#K#V`, each part non-empty.
fn parse_explicit(inner: &str) -> Option<Placeholder<'_>> {
    let spec = inner.strip_prefix(PATH_PREFIX)?;
    let mut parts = spec.splitn(3, '#');

    let path = parts.next()?.trim();
    let key = parts.next()?.trim();
    let version = match parts.next() {
        Some(v) if v.trim().is_empty() => return None,
        Some(v) => Some(v.trim()),
        None => None,
    };

    if path.is_empty() || key.is_empty() {
        return None;
    }

    Some(Placeholder::Explicit { path, key, version })
}
