//! Dense literal types understood by the CDCL engine.
//!
//! Variables are numbered `1..=var_count`, a literal is a signed variable.

pub type Lit = i32;

pub type Var = usize;

pub type Clause = Vec<Lit>;

pub fn to_var(lit: Lit) -> Var {
    debug_assert_ne!(lit, 0);
    lit.unsigned_abs() as Var
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Problem {
    pub var_count: usize,
    pub clauses: Vec<Clause>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Solution {
    Sat { model: Vec<Lit> },
    Unsat,
    /// The search was stopped before reaching a verdict.
    Unknown,
}
