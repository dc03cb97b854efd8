//! Constrained query language for the local buffer.
//!
//! Deliberately tiny: equality/inequality on the producer name, relational
//! comparisons on the timestamp, clauses joined with `AND`. That is all the
//! buffer's callers (transmitter, retention, local analyzers) need, and it
//! keeps evaluation a plain scan with no secondary index.
//!
//! Two surfaces over the same [`Predicate`]:
//! - the builder API (`Predicate::all().producer_eq("light").timestamp_gt(t)`),
//! - the string grammar `sensor_name='light' AND timestamp>1000`, parsed via
//!   `FromStr` for callers that carry selections as text.
//!
//! Malformed text is a [`PipelineError::Predicate`] and is rejected before
//! any buffer state is touched.

use crate::error::{PipelineError, Result};
use std::str::FromStr;

/// Selection column for the producer name.
pub const FIELD_SENSOR_NAME: &str = "sensor_name";
/// Selection column for the timestamp.
pub const FIELD_TIMESTAMP: &str = "timestamp";

/// A compiled predicate over buffer entries.
///
/// Timestamp comparisons compile into an inclusive `[min, max]` window plus
/// an optional excluded value (`timestamp!=t`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Predicate {
    name_eq: Option<String>,
    name_ne: Option<String>,
    ts_min: Option<i64>,
    ts_max: Option<i64>,
    ts_ne: Option<i64>,
}

impl Predicate {
    /// Predicate matching every entry.
    pub fn all() -> Self {
        Self::default()
    }

    /// Keep entries whose producer name equals `name`.
    pub fn producer_eq(mut self, name: impl Into<String>) -> Self {
        self.name_eq = Some(name.into());
        self
    }

    /// Keep entries whose producer name differs from `name`.
    pub fn producer_ne(mut self, name: impl Into<String>) -> Self {
        self.name_ne = Some(name.into());
        self
    }

    pub fn timestamp_eq(mut self, t: i64) -> Self {
        self.ts_min = Some(self.ts_min.map_or(t, |m| m.max(t)));
        self.ts_max = Some(self.ts_max.map_or(t, |m| m.min(t)));
        self
    }

    pub fn timestamp_ne(mut self, t: i64) -> Self {
        self.ts_ne = Some(t);
        self
    }

    pub fn timestamp_gt(self, t: i64) -> Self {
        self.timestamp_ge(t.saturating_add(1))
    }

    pub fn timestamp_ge(mut self, t: i64) -> Self {
        self.ts_min = Some(self.ts_min.map_or(t, |m| m.max(t)));
        self
    }

    pub fn timestamp_lt(self, t: i64) -> Self {
        self.timestamp_le(t.saturating_sub(1))
    }

    pub fn timestamp_le(mut self, t: i64) -> Self {
        self.ts_max = Some(self.ts_max.map_or(t, |m| m.min(t)));
        self
    }

    /// The producer name this predicate is pinned to, if any.
    ///
    /// Lets the buffer scan a single bucket instead of all of them.
    pub fn pinned_producer(&self) -> Option<&str> {
        self.name_eq.as_deref()
    }

    /// Evaluate against one entry's key fields.
    pub fn matches(&self, producer_name: &str, timestamp: i64) -> bool {
        if let Some(eq) = &self.name_eq {
            if producer_name != eq {
                return false;
            }
        }
        if let Some(ne) = &self.name_ne {
            if producer_name == ne {
                return false;
            }
        }
        if let Some(min) = self.ts_min {
            if timestamp < min {
                return false;
            }
        }
        if let Some(max) = self.ts_max {
            if timestamp > max {
                return false;
            }
        }
        if let Some(ne) = self.ts_ne {
            if timestamp == ne {
                return false;
            }
        }
        true
    }
}

/// Strip optional whitespace around comparison operators so clause
/// splitting only has to deal with one shape.
fn normalize_operators(clause: &str) -> String {
    let mut out = String::with_capacity(clause.len());
    let chars: Vec<char> = clause.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if matches!(c, '=' | '<' | '>' | '!') {
            while out.ends_with(' ') {
                out.pop();
            }
            out.push(c);
            // swallow whitespace after the operator, but only between the
            // two-character operators' halves and before the operand
            if c != '=' && i + 1 < chars.len() {
                let mut j = i + 1;
                while j < chars.len() && chars[j] == ' ' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == '=' {
                    out.push('=');
                    i = j;
                }
            }
            let mut j = i + 1;
            while j < chars.len() && chars[j] == ' ' {
                j += 1;
            }
            i = j;
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

fn parse_name_clause(predicate: Predicate, rest: &str) -> Result<Predicate> {
    let (negated, value) = if let Some(v) = rest.strip_prefix("!=") {
        (true, v)
    } else if let Some(v) = rest.strip_prefix('=') {
        (false, v)
    } else {
        return Err(PipelineError::Predicate(format!(
            "'{FIELD_SENSOR_NAME}' supports only = and != (got '{rest}')"
        )));
    };
    let value = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value);
    if value.is_empty() {
        return Err(PipelineError::Predicate(format!(
            "empty value for '{FIELD_SENSOR_NAME}'"
        )));
    }
    Ok(if negated {
        predicate.producer_ne(value)
    } else {
        predicate.producer_eq(value)
    })
}

fn parse_timestamp_clause(predicate: Predicate, rest: &str) -> Result<Predicate> {
    let (op, value) = ["!=", ">=", "<=", "=", ">", "<"]
        .iter()
        .find_map(|op| rest.strip_prefix(op).map(|v| (*op, v)))
        .ok_or_else(|| {
            PipelineError::Predicate(format!(
                "missing comparison operator on '{FIELD_TIMESTAMP}' (got '{rest}')"
            ))
        })?;
    let t: i64 = value.trim_matches('\'').parse().map_err(|_| {
        PipelineError::Predicate(format!("invalid timestamp literal '{value}'"))
    })?;
    Ok(match op {
        "=" => predicate.timestamp_eq(t),
        "!=" => predicate.timestamp_ne(t),
        ">" => predicate.timestamp_gt(t),
        ">=" => predicate.timestamp_ge(t),
        "<" => predicate.timestamp_lt(t),
        "<=" => predicate.timestamp_le(t),
        _ => unreachable!(),
    })
}

impl FromStr for Predicate {
    type Err = PipelineError;

    fn from_str(selection: &str) -> Result<Self> {
        let selection = selection.trim();
        if selection.is_empty() {
            return Ok(Predicate::all());
        }

        let mut predicate = Predicate::all();
        for raw_clause in selection.split(" AND ") {
            let clause = normalize_operators(raw_clause.trim());
            if clause.is_empty() {
                return Err(PipelineError::Predicate(
                    "dangling AND in selection".to_string(),
                ));
            }
            if let Some(rest) = clause.strip_prefix(FIELD_SENSOR_NAME) {
                predicate = parse_name_clause(predicate, rest)?;
            } else if let Some(rest) = clause.strip_prefix(FIELD_TIMESTAMP) {
                predicate = parse_timestamp_clause(predicate, rest)?;
            } else {
                return Err(PipelineError::Predicate(format!(
                    "unsupported selection clause '{raw_clause}' \
                     (only {FIELD_SENSOR_NAME} and {FIELD_TIMESTAMP} are queryable)"
                )));
            }
        }
        Ok(predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_name_and_range() {
        let p = Predicate::all().producer_eq("light").timestamp_gt(1_000);
        assert!(p.matches("light", 1_001));
        assert!(!p.matches("light", 1_000));
        assert!(!p.matches("noise", 1_001));
        assert_eq!(p.pinned_producer(), Some("light"));
    }

    #[test]
    fn test_parse_name_and_timestamp() {
        let p: Predicate = "sensor_name='light' AND timestamp>1000".parse().unwrap();
        assert_eq!(
            p,
            Predicate::all().producer_eq("light").timestamp_gt(1_000)
        );
    }

    #[test]
    fn test_parse_tolerates_operator_whitespace() {
        let p: Predicate = "sensor_name = 'light' AND timestamp >= 50".parse().unwrap();
        assert!(p.matches("light", 50));
        assert!(!p.matches("light", 49));
    }

    #[test]
    fn test_parse_all_timestamp_operators() {
        let le: Predicate = "timestamp<=10".parse().unwrap();
        assert!(le.matches("x", 10) && !le.matches("x", 11));

        let lt: Predicate = "timestamp<10".parse().unwrap();
        assert!(lt.matches("x", 9) && !lt.matches("x", 10));

        let eq: Predicate = "timestamp=10".parse().unwrap();
        assert!(eq.matches("x", 10) && !eq.matches("x", 9) && !eq.matches("x", 11));

        let ne: Predicate = "timestamp!=10".parse().unwrap();
        assert!(ne.matches("x", 9) && !ne.matches("x", 10));
    }

    #[test]
    fn test_parse_name_inequality() {
        let p: Predicate = "sensor_name!='light'".parse().unwrap();
        assert!(!p.matches("light", 0));
        assert!(p.matches("noise", 0));
        assert_eq!(p.pinned_producer(), None);
    }

    #[test]
    fn test_combined_window() {
        let p: Predicate = "sensor_name='gps' AND timestamp>100 AND timestamp<=200"
            .parse()
            .unwrap();
        assert!(!p.matches("gps", 100));
        assert!(p.matches("gps", 101));
        assert!(p.matches("gps", 200));
        assert!(!p.matches("gps", 201));
    }

    #[test]
    fn test_empty_selection_matches_everything() {
        let p: Predicate = "".parse().unwrap();
        assert!(p.matches("anything", i64::MIN));
        assert!(p.matches("anything", i64::MAX));
    }

    #[test]
    fn test_malformed_selections_rejected() {
        for bad in [
            "value=3",
            "sensor_name>'light'",
            "timestamp~5",
            "timestamp=abc",
            "sensor_name='' ",
            "sensor_name='a' AND ",
        ] {
            let err = bad.parse::<Predicate>();
            assert!(err.is_err(), "expected rejection for {:?}", bad);
        }
    }

    // Property-based tests using proptest
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_parsed_window_matches_builder(t in -1_000_000i64..1_000_000) {
            let text = format!("timestamp>{t}");
            let parsed: Predicate = text.parse().unwrap();
            let built = Predicate::all().timestamp_gt(t);
            prop_assert_eq!(parsed, built);
        }

        #[test]
        fn test_gt_boundary_is_exclusive(
            t in -1_000i64..1_000,
            probe in -2_000i64..2_000,
        ) {
            let p: Predicate = format!("timestamp>{t}").parse().unwrap();
            prop_assert_eq!(p.matches("x", probe), probe > t);
        }

        #[test]
        fn test_parser_never_panics(s in "[ -~]{0,40}") {
            // arbitrary printable garbage either parses or errors cleanly
            let _ = s.parse::<Predicate>();
        }
    }
}
