//! DIMACS CNF input/output and the competition result format.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};

use crate::{
    error::{PackingError, Result},
    types::{Lit, Problem, Solution},
};

pub fn read_problem(reader: &mut impl Read) -> Result<Problem> {
    let mut lines = BufReader::new(reader).lines().enumerate();

    let (var_count, clause_count) = loop {
        let Some((i, line)) = lines.next() else {
            return Err(PackingError::parse(0, "missing problem line"));
        };
        let line = line?;

        if line.starts_with('c') || line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts[..] {
            ["p", "cnf", vars, clauses] => {
                let vars = vars
                    .parse::<usize>()
                    .map_err(|e| PackingError::parse(i + 1, e.to_string()))?;
                let clauses = clauses
                    .parse::<usize>()
                    .map_err(|e| PackingError::parse(i + 1, e.to_string()))?;
                break (vars, clauses);
            }
            _ => return Err(PackingError::parse(i + 1, format!("bad problem line {line:?}"))),
        }
    };

    let mut clauses = vec![];
    let mut clause = vec![];

    for (i, line) in lines {
        let line = line?;
        // some benchmark sets end with a '%' trailer
        if line.starts_with('%') {
            break;
        }
        if line.starts_with('c') {
            continue;
        }

        for word in line.split_whitespace() {
            let lit = word
                .parse::<Lit>()
                .map_err(|e| PackingError::parse(i + 1, format!("{word:?}: {e}")))?;
            match lit {
                0 => {
                    clauses.push(std::mem::take(&mut clause));
                }
                _ => {
                    if lit.unsigned_abs() as usize > var_count {
                        return Err(PackingError::parse(
                            i + 1,
                            format!("literal {lit} exceeds {var_count} variables"),
                        ));
                    }
                    clause.push(lit);
                }
            }
        }
    }

    if clause_count != clauses.len() {
        return Err(PackingError::parse(
            0,
            format!("expected {clause_count} clauses, read {}", clauses.len()),
        ));
    }

    Ok(Problem { var_count, clauses })
}

pub fn write_problem(writer: &mut impl Write, problem: &Problem) -> Result<()> {
    let mut writer = BufWriter::new(writer);
    writeln!(writer, "p cnf {} {}", problem.var_count, problem.clauses.len())?;
    for clause in &problem.clauses {
        for lit in clause {
            write!(writer, "{lit} ")?;
        }
        writeln!(writer, "0")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_solution(writer: &mut impl Write, solution: &Solution) -> Result<()> {
    let mut writer = BufWriter::new(writer);
    writeln!(writer, "c Solved by station-packing.")?;

    let solution_str = match solution {
        Solution::Sat { .. } => "SATISFIABLE",
        Solution::Unsat => "UNSATISFIABLE",
        Solution::Unknown => "UNKNOWN",
    };
    writeln!(writer, "s {solution_str}")?;

    if let Solution::Sat { model } = solution {
        const PER_LINE: usize = 10;
        for chunk in model.chunks(PER_LINE) {
            let chunk_str = chunk
                .iter()
                .fold(String::new(), |str, lit| str + &lit.to_string() + " ");
            writeln!(writer, "v {chunk_str}")?;
        }
        writeln!(writer, "v 0")?;
    }
    writer.flush()?;
    Ok(())
}

/// Parses solver output in the competition format (`s` and `v` lines).
/// Output without a status line yields `None`.
pub fn read_solution(reader: &mut impl Read) -> Result<Option<Solution>> {
    let mut status = None;
    let mut model = vec![];

    for (i, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        if let Some(rest) = line.strip_prefix("s ") {
            status = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("v ") {
            for word in rest.split_whitespace() {
                let lit = word
                    .parse::<Lit>()
                    .map_err(|e| PackingError::parse(i + 1, format!("{word:?}: {e}")))?;
                if lit != 0 {
                    model.push(lit);
                }
            }
        }
    }

    Ok(match status.as_deref() {
        Some("SATISFIABLE") => Some(Solution::Sat { model }),
        Some("UNSATISFIABLE") => Some(Solution::Unsat),
        Some(_) => Some(Solution::Unknown),
        None => None,
    })
}
