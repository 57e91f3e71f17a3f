//! Selector grammar, matching, and expansion.
//!
//! A selector is a dash-separated sequence of part patterns:
//!
//! - a literal part (`door`, `$global` as the sole part),
//! - `?` matching exactly one part,
//! - `*` matching zero or more whole parts (so `foo-*` also matches `foo`),
//! - `{a,b,c}` alternation over listed variants,
//! - `{N..M}` inclusive integer range, zero-padded to the wider endpoint
//!   width when *either* endpoint carries leading zeros (`{01..03}` and
//!   `{1..03}` both produce `01 02 03`; `{1..3}` produces `1 2 3`).
//!
//! Two evaluation modes with different cost models:
//!
//! - **Matching** (modify/destroy positions): the selector filters the
//!   current population, so cost is linear in the population and no cap
//!   applies. A bare `*` is the degenerate fast path that selects the whole
//!   population.
//! - **Expansion** (create positions): wildcards are forbidden and the
//!   Cartesian product of `{…}` forms is materialized, subject to a soft
//!   cap. Exceeding the cap drops the whole command; there is no partial
//!   application.

use std::fmt;

use crate::{
    error::CommandError,
    ident::{Ident, RESERVED},
};

/// Default cap on materialized create-expansion size.
pub const DEFAULT_CREATE_EXPANSION_CAP: usize = 1000;

/// One dash-separated pattern element.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    /// Exact part text.
    Literal(String),
    /// `?`: exactly one part.
    One,
    /// `*`: zero or more parts.
    Many,
    /// `{a,b,c}`.
    Alt(Vec<String>),
    /// `{N..M}`, rendered with `width` digits when nonzero.
    Range { lo: u64, hi: u64, width: usize },
}

impl Part {
    fn matches(&self, part: &str) -> bool {
        match self {
            Self::Literal(lit) => lit == part,
            Self::One => true,
            Self::Many => unreachable!("Many is handled by the sequence matcher"),
            Self::Alt(variants) => variants.iter().any(|v| v == part),
            Self::Range { lo, hi, width } => {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return false;
                }
                let Ok(n) = part.parse::<u64>() else { return false };
                n >= *lo && n <= *hi && render_range_value(n, *width) == part
            }
        }
    }
}

fn render_range_value(n: u64, width: usize) -> String {
    format!("{n:0width$}")
}

/// A parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    raw: String,
    parts: Vec<Part>,
}

impl Selector {
    /// Parse a selector token.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        // Reserved identifiers are single-token: `$camera` is a valid
        // selector, `$camera-x` is not.
        if let Some(reserved) = s.strip_prefix('$') {
            return RESERVED
                .contains(&reserved)
                .then(|| Self { raw: s.to_owned(), parts: vec![Part::Literal(s.to_owned())] });
        }
        let parts = s.split('-').map(parse_part).collect::<Option<Vec<_>>>()?;
        Some(Self { raw: s.to_owned(), parts })
    }

    /// The selector as written on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the selector is exactly `*`: the whole-population fast path.
    #[must_use]
    pub fn is_bare_star(&self) -> bool {
        self.parts == [Part::Many]
    }

    /// Whether any part is `*` or `?`.
    #[must_use]
    pub fn has_wildcards(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Many | Part::One))
    }

    /// If the selector is a single concrete identifier, return it.
    #[must_use]
    pub fn as_concrete(&self) -> Option<&str> {
        let all_literal = self.parts.iter().all(|p| matches!(p, Part::Literal(_)));
        all_literal.then_some(self.raw.as_str())
    }

    /// Whether the selector matches a concrete identifier or tag.
    #[must_use]
    pub fn matches(&self, id: &str) -> bool {
        if id.starts_with('$') {
            // Reserved ids have no dash structure; only a literal `$name`
            // part or a bare `*` reaches them.
            return self.is_bare_star() || self.parts == [Part::Literal(id.to_owned())];
        }
        let parts: Vec<&str> = id.split('-').collect();
        match_sequence(&self.parts, &parts)
    }

    /// Filter a population. Linear in the population; never capped.
    pub fn filter<I, S>(&self, population: I) -> Vec<S>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        population.into_iter().filter(|id| self.matches(id.as_ref())).collect()
    }

    /// Materialize the expansion for a create-family position.
    ///
    /// # Errors
    ///
    /// - [`CommandError::WildcardInCreate`] if the selector contains `*`/`?`.
    /// - [`CommandError::OverExpansion`] if the product exceeds `cap`.
    pub fn expand_create(&self, cap: usize) -> Result<Vec<Ident>, CommandError> {
        if self.has_wildcards() {
            return Err(CommandError::WildcardInCreate);
        }

        let mut count: usize = 1;
        for part in &self.parts {
            let n = match part {
                Part::Literal(_) => 1,
                Part::Alt(variants) => variants.len(),
                Part::Range { lo, hi, .. } => usize::try_from(hi - lo + 1).unwrap_or(usize::MAX),
                Part::One | Part::Many => unreachable!("wildcards rejected above"),
            };
            count = count.saturating_mul(n);
            if count > cap {
                return Err(CommandError::OverExpansion { got: count, cap });
            }
        }

        let mut out = vec![String::new()];
        for (i, part) in self.parts.iter().enumerate() {
            let variants: Vec<String> = match part {
                Part::Literal(lit) => vec![lit.clone()],
                Part::Alt(variants) => variants.clone(),
                Part::Range { lo, hi, width } =>
                    (*lo..=*hi).map(|n| render_range_value(n, *width)).collect(),
                Part::One | Part::Many => unreachable!("wildcards rejected above"),
            };
            let mut next = Vec::with_capacity(out.len() * variants.len());
            for prefix in &out {
                for variant in &variants {
                    let mut id = prefix.clone();
                    if i > 0 {
                        id.push('-');
                    }
                    id.push_str(variant);
                    next.push(id);
                }
            }
            out = next;
        }

        // Redundant expansions like `{a,a}` collapse to one application.
        out.sort_unstable();
        out.dedup();

        Ok(out
            .into_iter()
            .filter_map(|id| Ident::parse(&id).ok())
            .collect())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_part(s: &str) -> Option<Part> {
    match s {
        "?" => return Some(Part::One),
        "*" => return Some(Part::Many),
        _ => {}
    }
    if let Some(inner) = s.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) {
        if let Some((lo_str, hi_str)) = inner.split_once("..") {
            if lo_str.is_empty()
                || hi_str.is_empty()
                || !lo_str.bytes().all(|b| b.is_ascii_digit())
                || !hi_str.bytes().all(|b| b.is_ascii_digit())
            {
                return None;
            }
            let lo: u64 = lo_str.parse().ok()?;
            let hi: u64 = hi_str.parse().ok()?;
            if lo > hi {
                return None;
            }
            // Padding engages when either endpoint spells a leading zero,
            // to the wider endpoint width: `{1..03}` renders 01 02 03.
            let padded = (lo_str.len() > 1 && lo_str.starts_with('0'))
                || (hi_str.len() > 1 && hi_str.starts_with('0'));
            let width = if padded { lo_str.len().max(hi_str.len()) } else { 0 };
            return Some(Part::Range { lo, hi, width });
        }
        let variants: Vec<String> = inner.split(',').map(str::to_owned).collect();
        if variants.is_empty()
            || variants.iter().any(|v| v.is_empty() || !v.chars().all(is_part_char))
        {
            return None;
        }
        return Some(Part::Alt(variants));
    }
    is_plain_part(s).then(|| Part::Literal(s.to_owned()))
}

fn is_part_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_plain_part(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_part_char)
}

/// Sequence matching with `*` as a zero-or-more-parts wildcard.
fn match_sequence(pattern: &[Part], parts: &[&str]) -> bool {
    match pattern.split_first() {
        None => parts.is_empty(),
        Some((Part::Many, rest)) => {
            (0..=parts.len()).any(|skip| match_sequence(rest, &parts[skip..]))
        }
        Some((head, rest)) => match parts.split_first() {
            None => false,
            Some((first, tail)) => head.matches(first) && match_sequence(rest, tail),
        },
    }
}
