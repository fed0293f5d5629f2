//! Predicate queries
//!
//! A [`Predicate`] is a caller-written `WHERE` fragment plus its positional
//! arguments. The fragment is opaque to the engine; only its placeholders are
//! counted, so a wrong argument count is reported before the store sees the
//! statement.

use crate::value::{FieldValue, Value, ValueError};
use crate::{Error, Result};

/// A `WHERE` fragment with ordered positional arguments.
///
/// An empty fragment matches every row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    fragment: String,
    args: Vec<Value>,
    /// First argument that failed conversion, by position
    rejected: Option<(usize, ValueError)>,
}

impl Predicate {
    pub fn new(fragment: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
            args: Vec::new(),
            rejected: None,
        }
    }

    pub fn with_args(fragment: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            fragment: fragment.into(),
            args,
            rejected: None,
        }
    }

    /// Matches every row
    pub fn all() -> Self {
        Self::default()
    }

    /// Bind the next positional argument.
    ///
    /// A value with no store representation is reported by [`Predicate::validate`].
    pub fn arg<T: FieldValue>(mut self, value: T) -> Self {
        match value.to_value() {
            Ok(v) => self.args.push(v),
            Err(e) => {
                if self.rejected.is_none() {
                    self.rejected = Some((self.args.len(), e));
                }
                self.args.push(Value::Null);
            }
        }
        self
    }

    pub fn arg_value(mut self, value: Value) -> Self {
        self.args.push(value);
        self
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Whether the fragment has no condition and so matches every row
    pub fn is_blank(&self) -> bool {
        self.fragment.trim().is_empty()
    }

    /// Check the bound arguments against the fragment's placeholders.
    ///
    /// `entity` is the table the predicate runs against, used in errors.
    pub fn validate(&self, entity: &'static str) -> Result<()> {
        if let Some((position, err)) = &self.rejected {
            return Err(Error::UnsupportedFieldType {
                entity,
                field: format!("argument {}", position + 1),
                reason: err.to_string(),
            });
        }
        let expected = count_placeholders(&self.fragment).map_err(|_| self.mismatch(0))?;
        if expected != self.args.len() {
            return Err(self.mismatch(expected));
        }
        Ok(())
    }

    fn mismatch(&self, expected: usize) -> Error {
        Error::ArgumentCountMismatch {
            fragment: self.fragment.clone(),
            expected,
            actual: self.args.len(),
        }
    }
}

impl From<&str> for Predicate {
    fn from(fragment: &str) -> Self {
        Predicate::new(fragment)
    }
}

/// A placeholder style the engine cannot count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedParameter(pub char);

/// Number of positional parameters SQLite would assign to `fragment`.
///
/// `?` takes the next index after the largest seen so far and `?NNN` names
/// one explicitly, so the count is the largest index. Quoted strings,
/// quoted identifiers and comments are skipped.
pub fn count_placeholders(fragment: &str) -> std::result::Result<usize, NamedParameter> {
    let chars: Vec<char> = fragment.chars().collect();
    let mut max_index = 0usize;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            quote @ ('\'' | '"' | '`') => {
                i += 1;
                while i < chars.len() {
                    if chars[i] == quote {
                        // doubled quote is an escaped quote
                        if chars.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            '[' => {
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                i += 1;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            '?' => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if start == i {
                    max_index += 1;
                } else {
                    let digits: String = chars[start..i].iter().collect();
                    let index = digits.parse::<usize>().unwrap_or(usize::MAX);
                    max_index = max_index.max(index);
                }
            }
            c @ (':' | '@' | '$') => {
                let named = chars
                    .get(i + 1)
                    .is_some_and(|n| n.is_ascii_alphanumeric() || *n == '_');
                if named {
                    return Err(NamedParameter(c));
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    Ok(max_index)
}
