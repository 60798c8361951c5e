//! Sparse CNF formulas over `u64` variables and their dense renumbering.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use crate::{
    error::{PackingError, Result},
    types::{to_var, Lit, Problem},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Literal {
    pub variable: u64,
    pub sign: bool,
}

impl Literal {
    pub fn positive(variable: u64) -> Self {
        Self {
            variable,
            sign: true,
        }
    }

    pub fn negative(variable: u64) -> Self {
        Self {
            variable,
            sign: false,
        }
    }
}

impl std::ops::Neg for Literal {
    type Output = Literal;

    fn neg(self) -> Self::Output {
        Self {
            sign: !self.sign,
            ..self
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sign {
            write!(f, "{}", self.variable)
        } else {
            write!(f, "-{}", self.variable)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cnf {
    clauses: Vec<Vec<Literal>>,
}

impl Cnf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a clause with duplicate literals removed.
    pub fn add(&mut self, clause: impl IntoIterator<Item = Literal>) {
        let mut clause: Vec<Literal> = clause.into_iter().collect();
        clause.sort();
        clause.dedup();
        self.clauses.push(clause);
    }

    pub fn clauses(&self) -> &[Vec<Literal>] {
        &self.clauses
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn variables(&self) -> BTreeSet<u64> {
        self.clauses.iter().flatten().map(|l| l.variable).collect()
    }
}

/// Sparse <-> dense variable map produced by [`compress`].
#[derive(Clone, Debug, Default)]
pub struct Compression {
    sparse: Vec<u64>,
    dense: HashMap<u64, Lit>,
}

impl Compression {
    pub fn var_count(&self) -> usize {
        self.sparse.len()
    }

    pub fn to_dense(&self, literal: Literal) -> Option<Lit> {
        self.dense
            .get(&literal.variable)
            .map(|&var| if literal.sign { var } else { -var })
    }

    pub fn to_sparse(&self, lit: Lit) -> Result<Literal> {
        let var = to_var(lit);
        let variable = *self
            .sparse
            .get(var.wrapping_sub(1))
            .ok_or_else(|| PackingError::Encoding(format!("unknown engine variable {var}")))?;
        Ok(Literal {
            variable,
            sign: lit.is_positive(),
        })
    }

    pub fn decompress(&self, model: &[Lit]) -> Result<Vec<Literal>> {
        model.iter().map(|&lit| self.to_sparse(lit)).collect()
    }

    /// Dense versions of `hints`; literals over variables not in the formula are skipped.
    pub fn compress_hints(&self, hints: &[Literal]) -> Vec<Lit> {
        hints.iter().filter_map(|&l| self.to_dense(l)).collect()
    }
}

/// Renumbers the variables of `cnf` to `1..=n` in ascending sparse order.
pub fn compress(cnf: &Cnf) -> Result<(Problem, Compression)> {
    let sparse: Vec<u64> = cnf.variables().into_iter().collect();
    if sparse.len() > Lit::MAX as usize {
        return Err(PackingError::Encoding(format!(
            "{} variables do not fit the engine",
            sparse.len()
        )));
    }
    let dense = sparse
        .iter()
        .enumerate()
        .map(|(i, &v)| (v, i as Lit + 1))
        .collect();
    let compression = Compression { sparse, dense };

    let clauses = cnf
        .clauses()
        .iter()
        .map(|clause| {
            clause
                .iter()
                .map(|&l| {
                    compression
                        .to_dense(l)
                        .ok_or_else(|| PackingError::Encoding(format!("unmapped literal {l}")))
                })
                .collect::<Result<Vec<Lit>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let problem = Problem {
        var_count: compression.var_count(),
        clauses,
    };
    Ok((problem, compression))
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::{compress, Cnf, Literal};
    use crate::types::Lit;

    #[test]
    fn clauses_are_deduplicated() {
        let mut cnf = Cnf::new();
        cnf.add([Literal::positive(9), Literal::negative(4), Literal::positive(9)]);
        assert_eq!(cnf.clauses()[0].len(), 2);
        assert_eq!(-Literal::positive(3), Literal::negative(3));
    }

    #[test]
    fn compression_is_dense_and_reversible() {
        let mut cnf = Cnf::new();
        cnf.add([Literal::positive(1_000_000_007), Literal::negative(42)]);
        cnf.add([Literal::negative(1_000_000_007)]);

        let (problem, compression) = compress(&cnf).unwrap();
        assert_eq!(problem.var_count, 2);
        assert_eq!(problem.clauses, vec![vec![-1, 2], vec![-2]]);

        let back = compression.decompress(&[2, -1]).unwrap();
        assert_eq!(
            back,
            vec![Literal::positive(1_000_000_007), Literal::negative(42)]
        );
        assert!(compression.to_sparse(3).is_err());
        assert_eq!(compression.compress_hints(&[Literal::positive(5)]), Vec::<Lit>::new());
    }
}
