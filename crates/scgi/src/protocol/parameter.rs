use std::slice;

/// An application parameter, usually decoded from the query string or a form body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameter {
    Single(String),
    List(Vec<String>),
}

impl Parameter {
    /// The first value, the only one for a [`Parameter::Single`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::List(values) => values.first().map(String::as_str),
        }
    }

    pub fn values(&self) -> &[String] {
        match self {
            Self::Single(value) => slice::from_ref(value),
            Self::List(values) => values,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Appends a value, turning a single value into a list.
    pub fn push(&mut self, value: String) {
        match self {
            Self::List(values) => values.push(value),
            Self::Single(first) => {
                let first = std::mem::take(first);
                *self = Self::List(vec![first, value]);
            }
        }
    }
}
