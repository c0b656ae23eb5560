//! Runtime values
//!
//! Integers and floats compare and hash as one numeric domain so that
//! `Int(1)` and `Float(1.0)` meet in joins, grouping and duplicate removal.
//! Values of unrelated types order by a fixed type rank, NULL first.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::sql::Literal;

#[derive(Debug, Clone, Default)]
pub enum Datum {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Unix milliseconds
    Timestamp(i64),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Truth value for criteria; integers follow the C convention
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            Datum::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Datum::Int(i) => Some(*i),
            Datum::Float(f) => Some(*f as i64),
            Datum::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Datum::Float(f) => Some(*f),
            Datum::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::String(s) => Some(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Datum::Null => 0,
            Datum::Bool(_) => 1,
            Datum::Int(_) | Datum::Float(_) => 2,
            Datum::String(_) => 3,
            Datum::Bytes(_) => 4,
            Datum::Timestamp(_) => 5,
        }
    }

    /// Numeric view used for cross-type comparison
    fn numeric(&self) -> Option<f64> {
        match self {
            Datum::Int(i) => Some(*i as f64),
            Datum::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<&Literal> for Datum {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Null => Datum::Null,
            Literal::Boolean(b) => Datum::Bool(*b),
            Literal::Integer(i) => Datum::Int(*i),
            Literal::Float(f) => Datum::Float(*f),
            Literal::String(s) => Datum::String(s.clone()),
            Literal::Blob(b) => Datum::Bytes(b.clone()),
            Literal::Timestamp(t) => Datum::Timestamp(*t),
        }
    }
}

impl From<Datum> for Literal {
    fn from(datum: Datum) -> Self {
        match datum {
            Datum::Null => Literal::Null,
            Datum::Bool(b) => Literal::Boolean(b),
            Datum::Int(i) => Literal::Integer(i),
            Datum::Float(f) => Literal::Float(f),
            Datum::String(s) => Literal::String(s),
            Datum::Bytes(b) => Literal::Blob(b),
            Datum::Timestamp(t) => Literal::Timestamp(t),
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::String(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::String(v)
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Datum::Bool(v)
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("NULL"),
            Datum::Bool(b) => write!(f, "{}", b),
            Datum::Int(i) => write!(f, "{}", i),
            Datum::Float(v) => write!(f, "{}", v),
            Datum::String(s) => f.write_str(s),
            Datum::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Datum::Timestamp(t) => write!(f, "{}", t),
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Datum {}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Datum {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Datum::Bool(a), Datum::Bool(b)) => a.cmp(b),
            (Datum::Int(a), Datum::Int(b)) => a.cmp(b),
            (Datum::String(a), Datum::String(b)) => a.cmp(b),
            (Datum::Bytes(a), Datum::Bytes(b)) => a.cmp(b),
            (Datum::Timestamp(a), Datum::Timestamp(b)) => a.cmp(b),
            _ => match (self.numeric(), other.numeric()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }
}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Datum::Null => {}
            Datum::Bool(b) => b.hash(state),
            // Equal numerics share one bit pattern regardless of variant
            Datum::Int(_) | Datum::Float(_) => {
                self.numeric().map(f64::to_bits).hash(state)
            }
            Datum::String(s) => s.hash(state),
            Datum::Bytes(b) => b.hash(state),
            Datum::Timestamp(t) => t.hash(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_null_sorts_first() {
        let mut values = vec![Datum::from("a"), Datum::Int(3), Datum::Null, Datum::Bool(true)];
        values.sort();
        assert_eq!(
            values,
            vec![Datum::Null, Datum::Bool(true), Datum::Int(3), Datum::from("a")]
        );
    }

    #[test]
    fn test_int_and_float_share_a_domain() {
        assert_eq!(Datum::Int(2), Datum::Float(2.0));
        assert!(Datum::Int(2) < Datum::Float(2.5));

        let mut seen = HashSet::new();
        seen.insert(Datum::Int(2));
        assert!(seen.contains(&Datum::Float(2.0)));
    }

    #[test]
    fn test_literal_conversion() {
        let lit = Literal::String("abc".into());
        let datum = Datum::from(&lit);
        assert_eq!(datum, Datum::from("abc"));
        assert_eq!(Literal::from(datum), lit);
    }

    #[test]
    fn test_display_strings_unquoted() {
        assert_eq!(Datum::from("abc").to_string(), "abc");
        assert_eq!(Datum::Null.to_string(), "NULL");
        assert_eq!(Datum::Int(-7).to_string(), "-7");
    }

    #[test]
    fn test_truth_values() {
        assert_eq!(Datum::Int(0).as_bool(), Some(false));
        assert_eq!(Datum::Null.as_bool(), None);
        assert_eq!(Datum::Bool(true).as_int(), Some(1));
    }
}
