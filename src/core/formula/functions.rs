//! Built-in function table

use std::fmt;

/// How many arguments a function accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Sum,
    Average,
    Max,
    Min,
    Len,
    Concatenate,
}

impl Function {
    pub const ALL: [Function; 6] = [
        Function::Sum,
        Function::Average,
        Function::Max,
        Function::Min,
        Function::Len,
        Function::Concatenate,
    ];

    /// Look up a function by name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Sum => "SUM",
            Function::Average => "AVERAGE",
            Function::Max => "MAX",
            Function::Min => "MIN",
            Function::Len => "LEN",
            Function::Concatenate => "CONCATENATE",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            Function::Len => Arity::Exactly(1),
            _ => Arity::AtLeast(1),
        }
    }

    /// Functions that fold their arguments into one number
    pub fn is_numeric_aggregate(self) -> bool {
        matches!(
            self,
            Function::Sum | Function::Average | Function::Max | Function::Min
        )
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
