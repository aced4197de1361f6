use std::fmt;
use std::str::FromStr;

/// A JSON number kept in its lexical form.
///
/// Keeping the lexical form instead of eagerly converting to a binary
/// representation makes re-serialization emit the exact bytes that were
/// parsed, including distinctions the binary forms erase (`1` vs `1.0`,
/// `1e2` vs `100`).
///
/// ```
/// use oxjsongraph::JsonNumber;
///
/// let number: JsonNumber = "1.5e3".parse()?;
/// assert_eq!(number.as_str(), "1.5e3");
/// assert_eq!(number.as_f64(), 1500.);
/// assert_eq!(JsonNumber::from(42).as_i64(), Some(42));
/// # Result::<_, oxjsongraph::JsonNumberParseError>::Ok(())
/// ```
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct JsonNumber(String);

impl JsonNumber {
    /// Builds from a lexical form that is assumed to follow the JSON number grammar.
    ///
    /// It is the caller's responsibility to ensure that `value` is a valid JSON number.
    /// [`FromStr`] is a safe version of this constructor and should be used for untrusted data.
    #[inline]
    pub fn new_unchecked(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Builds a number from a finite [`f64`], returning `None` on NaN and infinities
    /// that JSON cannot represent.
    ///
    /// ```
    /// use oxjsongraph::JsonNumber;
    ///
    /// assert_eq!(JsonNumber::from_f64(1.5).unwrap().as_str(), "1.5");
    /// assert!(JsonNumber::from_f64(f64::NAN).is_none());
    /// ```
    #[inline]
    pub fn from_f64(value: f64) -> Option<Self> {
        value.is_finite().then(|| Self(value.to_string()))
    }

    /// The lexical form of this number.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The closest [`f64`] to this number.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        self.0.parse().unwrap_or(f64::NAN)
    }

    /// This number as an [`i64`] if its lexical form is a representable integer.
    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }

    /// This number as a [`u64`] if its lexical form is a representable positive integer.
    #[inline]
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for JsonNumber {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for JsonNumber {
    #[inline]
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<i32> for JsonNumber {
    #[inline]
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for JsonNumber {
    #[inline]
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<u32> for JsonNumber {
    #[inline]
    fn from(value: u32) -> Self {
        Self(value.to_string())
    }
}

impl FromStr for JsonNumber {
    type Err = JsonNumberParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if is_valid_json_number(value.as_bytes()) {
            Ok(Self(value.into()))
        } else {
            Err(JsonNumberParseError {
                value: value.into(),
            })
        }
    }
}

/// Validates the RFC 8259 number production: `-?(0|[1-9][0-9]*)(.[0-9]+)?([eE][+-]?[0-9]+)?`.
fn is_valid_json_number(value: &[u8]) -> bool {
    let value = value.strip_prefix(b"-").unwrap_or(value);
    let value = match value {
        [b'0', rest @ ..] => rest,
        [b'1'..=b'9', ..] => {
            let digits = value.iter().take_while(|b| b.is_ascii_digit()).count();
            &value[digits..]
        }
        _ => return false,
    };
    let value = if let Some(rest) = value.strip_prefix(b".") {
        let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return false;
        }
        &rest[digits..]
    } else {
        value
    };
    let value = match value {
        [] => return true,
        [b'e' | b'E', rest @ ..] => rest.strip_prefix(b"+").or_else(|| rest.strip_prefix(b"-")).unwrap_or(rest),
        _ => return false,
    };
    !value.is_empty() && value.iter().all(u8::is_ascii_digit)
}

/// Error returned when parsing an invalid JSON number lexical form.
#[derive(Debug, thiserror::Error)]
#[error("'{value}' is not a valid JSON number")]
pub struct JsonNumberParseError {
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_lexical_forms() {
        for value in ["0", "-0", "1", "-123", "0.5", "12.25", "1e3", "1E+3", "2.5e-10"] {
            assert!(JsonNumber::from_str(value).is_ok(), "{value} should parse");
        }
    }

    #[test]
    fn test_invalid_lexical_forms() {
        for value in ["", "-", "01", "+1", ".5", "1.", "1e", "1e+", "0x1", "1 ", "NaN"] {
            assert!(JsonNumber::from_str(value).is_err(), "{value} should not parse");
        }
    }

    #[test]
    fn test_accessors() {
        assert_eq!(JsonNumber::from(-42).as_i64(), Some(-42));
        assert_eq!(JsonNumber::from(42_u32).as_u64(), Some(42));
        assert_eq!(JsonNumber::new_unchecked("2.5").as_f64(), 2.5);
        assert_eq!(JsonNumber::new_unchecked("2.5").as_i64(), None);
    }
}
