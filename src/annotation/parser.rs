//! Annotation string parser.
//!
//! Annotations are whitespace separated token sequences read left to right:
//!
//! ```text
//! [target:NAME] [no_float | force_no_float] (range | INT INT [signed | unsigned]) [MIN MAX [ERROR]]
//! ```
//!
//! Only the head token is mandatory. A numeric field that fails to parse
//! ends the optional tail without failing the annotation.

use super::metadata::{AnnotationMetadata, FixedPointType, Range};
use crate::core::ParseFailure;
use std::iter::Peekable;
use std::str::SplitWhitespace;

const TARGET_PREFIX: &str = "target:";

/// One-pass parser over a single annotation string.
pub struct AnnotationParser<'a> {
    tokens: Peekable<SplitWhitespace<'a>>,
}

impl<'a> AnnotationParser<'a> {
    pub fn new(text: &'a str) -> Self {
        // Annotation globals carry the C string terminator.
        let text = text.trim_end_matches('\0');
        Self {
            tokens: text.split_whitespace().peekable(),
        }
    }

    /// Parses `text` into a metadata record.
    pub fn parse(text: &str) -> Result<AnnotationMetadata, ParseFailure> {
        AnnotationParser::new(text).parse_annotation()
    }

    fn parse_annotation(mut self) -> Result<AnnotationMetadata, ParseFailure> {
        let mut md = AnnotationMetadata::default();

        if self.tokens.peek().is_none() {
            return Err(ParseFailure::Empty);
        }

        if let Some(name) = self.tokens.peek().and_then(|tok| tok.strip_prefix(TARGET_PREFIX)) {
            md.target = Some(name.to_string());
            self.tokens.next();
        }

        match self.tokens.peek().copied() {
            Some("no_float") => {
                md.backtracking_enabled = true;
                self.tokens.next();
            }
            Some("force_no_float") => {
                md.backtracking_enabled = true;
                md.backtracking_forced = true;
                self.tokens.next();
            }
            _ => {}
        }

        self.parse_head(&mut md)?;

        if let Some(range) = self.parse_range() {
            log::debug!("Range found: [{}, {}]", range.min, range.max);
            md.range = Some(range);
            if let Some(error) = self.parse_f64() {
                log::debug!("Initial error found {}", error);
                md.initial_error = Some(error);
            }
        }

        Ok(md)
    }

    fn parse_head(&mut self, md: &mut AnnotationMetadata) -> Result<(), ParseFailure> {
        let head = self.tokens.next().unwrap_or_default();
        if head == "range" {
            md.is_range_only = true;
            return Ok(());
        }

        let unrecognized = || ParseFailure::UnrecognizedHead {
            found: head.to_string(),
        };
        let int_bits: u32 = head.parse().map_err(|_| unrecognized())?;
        let frac_bits: u32 = self
            .tokens
            .next()
            .and_then(|tok| tok.parse().ok())
            .ok_or_else(unrecognized)?;

        let signed = match self.tokens.peek().copied() {
            Some("unsigned") => {
                self.tokens.next();
                false
            }
            Some("signed") => {
                self.tokens.next();
                true
            }
            _ => true,
        };

        let layout = FixedPointType::new(int_bits, frac_bits, signed).ok_or(
            ParseFailure::LayoutTooWide {
                int_bits,
                frac_bits,
            },
        )?;
        md.numeric_type = Some(layout);
        md.is_range_only = false;
        Ok(())
    }

    fn parse_range(&mut self) -> Option<Range> {
        let min = self.parse_f64()?;
        let max = self.parse_f64()?;
        Some(Range::new(min, max))
    }

    fn parse_f64(&mut self) -> Option<f64> {
        let value = self.tokens.peek()?.parse().ok()?;
        self.tokens.next();
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_only() {
        let md = AnnotationParser::parse("range -4000 4000").unwrap();
        assert!(md.is_range_only);
        assert_eq!(md.numeric_type, None);
        assert_eq!(md.range, Some(Range::new(-4000.0, 4000.0)));
        assert_eq!(md.initial_error, None);
    }

    #[test]
    fn test_parse_full_annotation() {
        let md = AnnotationParser::parse("target:kmeans force_no_float 3 5 unsigned 0 1 0.001")
            .unwrap();
        assert_eq!(md.target.as_deref(), Some("kmeans"));
        assert!(md.backtracking_enabled);
        assert!(md.backtracking_forced);
        assert_eq!(md.numeric_type, FixedPointType::new(3, 5, false));
        assert_eq!(md.range, Some(Range::new(0.0, 1.0)));
        assert_eq!(md.initial_error, Some(0.001));
        assert!(!md.is_range_only);
    }

    #[test]
    fn test_no_float_is_not_forced() {
        let md = AnnotationParser::parse("no_float 16 16").unwrap();
        assert!(md.backtracking_enabled);
        assert!(!md.backtracking_forced);
        assert_eq!(md.numeric_type, FixedPointType::new(16, 16, true));
        assert_eq!(md.range, None);
    }

    #[test]
    fn test_unrecognized_head() {
        let err = AnnotationParser::parse("scalar(disabled range(-3000, 3000))").unwrap_err();
        assert_eq!(
            err,
            ParseFailure::UnrecognizedHead {
                found: "scalar(disabled".to_string()
            }
        );
        assert!(matches!(
            AnnotationParser::parse("16 bits"),
            Err(ParseFailure::UnrecognizedHead { .. })
        ));
        assert_eq!(AnnotationParser::parse("  \0"), Err(ParseFailure::Empty));
    }

    #[test]
    fn test_bad_tail_stops_without_failing() {
        // Half a range is dropped, and the error needs a complete range.
        let md = AnnotationParser::parse("range 1 oops 3").unwrap();
        assert_eq!(md.range, None);
        assert_eq!(md.initial_error, None);

        let md = AnnotationParser::parse("8 8 -1 1 nope").unwrap();
        assert_eq!(md.range, Some(Range::new(-1.0, 1.0)));
        assert_eq!(md.initial_error, None);
    }

    #[test]
    fn test_layout_wider_than_u32_fails() {
        assert_eq!(
            AnnotationParser::parse("4294967295 1 range 0 1"),
            Err(ParseFailure::LayoutTooWide {
                int_bits: u32::MAX,
                frac_bits: 1,
            })
        );
        let md = AnnotationParser::parse("4294967294 1 unsigned").unwrap();
        assert_eq!(md.numeric_type.map(|ty| ty.bit_width), Some(u32::MAX));
    }

    #[test]
    fn test_trailing_nul_is_ignored() {
        let md = AnnotationParser::parse("range 0 2 0.5\0").unwrap();
        assert_eq!(md.initial_error, Some(0.5));
    }

    #[test]
    fn test_display_reparses_to_same_record() {
        let md = AnnotationParser::parse("range -4000 4000").unwrap();
        assert_eq!(md.to_string(), "range -4000 4000");
        assert_eq!(AnnotationParser::parse(&md.to_string()).unwrap(), md);

        let md = AnnotationParser::parse("target:t no_float 2 30 1e-3 2.5 0.125").unwrap();
        assert_eq!(AnnotationParser::parse(&md.to_string()).unwrap(), md);
    }
}
