//! # Topic patterns and request/reply topic names.
//!
//! Topics are dot-segmented (`didChangeAreaVisibility.page.content.true`).
//! A [`TopicPattern`] is compiled once at subscribe time and matched per event:
//!
//! | pattern segment | matches                                   |
//! |-----------------|-------------------------------------------|
//! | `+`             | exactly one topic segment                 |
//! | `*` (last)      | zero or more remaining segments           |
//! | anything else   | the same segment, case-sensitive          |
//!
//! A `*` that is not the last segment is an ordinary literal.
//!
//! ```text
//! didChangeAreaVisibility.+.true  ✓ didChangeAreaVisibility.page.true
//!                                 ✗ didChangeAreaVisibility.page.nested.true
//! changeAreaVisibilityRequest.w1.* ✓ changeAreaVisibilityRequest.w1.content.true
//! ```

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    One,
    Rest,
}

/// Compiled subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    source: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    /// Compiles `pattern`.
    pub fn new(pattern: &str) -> Self {
        let parts: Vec<&str> = pattern.split('.').collect();
        let last = parts.len() - 1;
        let segments = parts
            .iter()
            .enumerate()
            .map(|(i, part)| match *part {
                "+" => Segment::One,
                "*" if i == last => Segment::Rest,
                literal => Segment::Literal(literal.to_string()),
            })
            .collect();
        Self {
            source: pattern.to_string(),
            segments,
        }
    }

    /// The pattern as it was subscribed.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Checks whether `topic` is matched by this pattern.
    ///
    /// # Example
    /// ```
    /// use widgetry::TopicPattern;
    ///
    /// let p = TopicPattern::new("didChangeAreaVisibility.+.true");
    /// assert!(p.matches("didChangeAreaVisibility.page.true"));
    /// assert!(!p.matches("didChangeAreaVisibility.page.nested.true"));
    /// ```
    pub fn matches(&self, topic: &str) -> bool {
        let mut parts = topic.split('.');
        for segment in &self.segments {
            match segment {
                Segment::Rest => return true,
                Segment::One => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(literal) => match parts.next() {
                    Some(part) if part == literal => {}
                    _ => return false,
                },
            }
        }
        parts.next().is_none()
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Derives the `will…`/`did…` reply topics for a gathering request.
///
/// `fooRequest.a.b` becomes `willFoo.a.b` / `didFoo.a.b`; a first segment without
/// the `Request` suffix is used as is, so `x` becomes `willX` / `didX`.
///
/// # Example
/// ```
/// use widgetry::events::reply_topics;
///
/// let (will, did) = reply_topics("changeAreaVisibilityRequest.w1.content.true");
/// assert_eq!(will, "willChangeAreaVisibility.w1.content.true");
/// assert_eq!(did, "didChangeAreaVisibility.w1.content.true");
/// ```
pub fn reply_topics(request: &str) -> (String, String) {
    let (head, rest) = match request.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (request, None),
    };
    let verb = match head.strip_suffix("Request") {
        Some(verb) if !verb.is_empty() => verb,
        _ => head,
    };
    let mut chars = verb.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    let suffix = rest.map(|r| format!(".{r}")).unwrap_or_default();
    (
        format!("will{capitalized}{suffix}"),
        format!("did{capitalized}{suffix}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern_requires_same_length() {
        let p = TopicPattern::new("a.b");
        assert!(p.matches("a.b"));
        assert!(!p.matches("a"));
        assert!(!p.matches("a.b.c"));
        assert!(!p.matches("a.B"));
    }

    #[test]
    fn test_plus_matches_one_segment() {
        let p = TopicPattern::new("didChangeAreaVisibility.+.true");
        assert!(p.matches("didChangeAreaVisibility.page.true"));
        assert!(!p.matches("didChangeAreaVisibility.page.nested.true"));
        assert!(!p.matches("didChangeAreaVisibility.true"));
        assert!(!p.matches("didChangeAreaVisibility.page.false"));
    }

    #[test]
    fn test_trailing_star_matches_zero_or_more() {
        let p = TopicPattern::new("changeAreaVisibilityRequest.w1.*");
        assert!(p.matches("changeAreaVisibilityRequest.w1"));
        assert!(p.matches("changeAreaVisibilityRequest.w1.content.true"));
        assert!(!p.matches("changeAreaVisibilityRequest.w2.content.true"));
        assert!(TopicPattern::new("*").matches("any.thing.here"));
    }

    #[test]
    fn test_inner_star_is_literal() {
        let p = TopicPattern::new("a.*.c");
        assert!(p.matches("a.*.c"));
        assert!(!p.matches("a.b.c"));
    }

    #[test]
    fn test_reply_topics_without_request_suffix() {
        assert_eq!(
            reply_topics("x"),
            ("willX".to_string(), "didX".to_string())
        );
        assert_eq!(
            reply_topics("Request.a"),
            ("willRequest.a".to_string(), "didRequest.a".to_string())
        );
    }

    #[test]
    fn test_reply_topics_keep_suffix() {
        let (will, did) = reply_topics("changeWidgetVisibilityRequest.popup.false");
        assert_eq!(will, "willChangeWidgetVisibility.popup.false");
        assert_eq!(did, "didChangeWidgetVisibility.popup.false");
    }
}
