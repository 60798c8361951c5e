//! Station packing to CNF.
//!
//! Each (station, channel) pair gets the variable `szudzik(station, channel)`.
//! Every station takes at least one and at most one channel of its domain and
//! each relevant interference constraint forbids one pair of variables.

use std::sync::Arc;

use log::trace;

use crate::{
    cnf::{Cnf, Literal},
    constraint::ConstraintManager,
    error::{PackingError, Result},
    model::{Assignment, Channel, Domains, Instance, Station},
};

/// Szudzik's elegant pairing. Total and collision-free on `u32 x u32`.
pub fn szudzik(a: u32, b: u32) -> u64 {
    let (a, b) = (a as u64, b as u64);
    if a < b {
        b * b + a
    } else {
        a * a + a + b
    }
}

/// Inverse of [`szudzik`]. `None` when the components would not fit `u32`.
pub fn unszudzik(z: u64) -> Option<(u32, u32)> {
    let s = isqrt(z);
    let rest = z - s * s;
    let (a, b) = if rest < s { (rest, s) } else { (s, rest - s) };
    Some((u32::try_from(a).ok()?, u32::try_from(b).ok()?))
}

fn isqrt(z: u64) -> u64 {
    let mut s = (z as f64).sqrt() as u64;
    while (s as u128) * (s as u128) > z as u128 {
        s -= 1;
    }
    while ((s + 1) as u128) * ((s + 1) as u128) <= z as u128 {
        s += 1;
    }
    s
}

pub fn variable(station: Station, channel: Channel) -> u64 {
    szudzik(station.id(), channel)
}

/// Maps variables of an [`Encoding`] back to (station, channel) pairs.
#[derive(Clone, Debug)]
pub struct Decoder {
    domains: Domains,
}

impl Decoder {
    pub fn decode(&self, variable: u64) -> Result<(Station, Channel)> {
        let (id, channel) = unszudzik(variable)
            .ok_or_else(|| PackingError::Encoding(format!("variable {variable} out of range")))?;
        let station = Station(id);
        match self.domains.get(&station) {
            Some(domain) if domain.contains(&channel) => Ok((station, channel)),
            Some(_) => Err(PackingError::Encoding(format!(
                "channel {channel} is not in the domain of station {station}"
            ))),
            None => Err(PackingError::Encoding(format!(
                "station {station} is not part of the instance"
            ))),
        }
    }

    /// Witness from the true literals of an engine model.
    pub fn decode_model(&self, model: &[Literal]) -> Result<Assignment> {
        let mut seen = std::collections::HashMap::new();
        let mut assignment = Assignment::new();
        for literal in model {
            if let Some(sign) = seen.insert(literal.variable, literal.sign) {
                if sign != literal.sign {
                    return Err(PackingError::Encoding(format!(
                        "variable {} is both true and false",
                        literal.variable
                    )));
                }
            }
            if literal.sign {
                let (station, channel) = self.decode(literal.variable)?;
                assignment.entry(channel).or_default().insert(station);
            }
        }
        Ok(assignment)
    }
}

pub struct Encoding {
    pub cnf: Cnf,
    pub decoder: Decoder,
    /// Preferred polarities derived from the previous assignment.
    pub hints: Vec<Literal>,
}

#[derive(Clone)]
pub struct SatEncoder {
    constraints: Arc<ConstraintManager>,
}

impl SatEncoder {
    pub fn new(constraints: Arc<ConstraintManager>) -> Self {
        Self { constraints }
    }

    pub fn constraints(&self) -> &Arc<ConstraintManager> {
        &self.constraints
    }

    pub fn encode(&self, instance: &Instance) -> Encoding {
        let mut cnf = Cnf::new();

        for (&station, domain) in instance.domains() {
            cnf.add(domain.iter().map(|&c| Literal::positive(variable(station, c))));

            let channels: Vec<Channel> = domain.iter().copied().collect();
            for (i, &c1) in channels.iter().enumerate() {
                for &c2 in &channels[i + 1..] {
                    cnf.add([
                        Literal::negative(variable(station, c1)),
                        Literal::negative(variable(station, c2)),
                    ]);
                }
            }
        }
        let base = cnf.len();

        for constraint in self.constraints.relevant_constraints(instance.domains()) {
            // relevant constraints only name target channels inside a domain
            let Some(target_channel) = constraint.target_channel() else {
                continue;
            };
            cnf.add([
                Literal::negative(variable(constraint.source, constraint.channel)),
                Literal::negative(variable(constraint.target, target_channel)),
            ]);
        }
        trace!(
            "encoded {} stations into {} base and {} interference clauses",
            instance.len(),
            base,
            cnf.len() - base
        );

        let mut hints = vec![];
        for (&station, &previous) in instance.previous() {
            for &channel in &instance.domains()[&station] {
                let var = variable(station, channel);
                hints.push(if channel == previous {
                    Literal::positive(var)
                } else {
                    Literal::negative(var)
                });
            }
        }

        Encoding {
            cnf,
            decoder: Decoder {
                domains: instance.domains().clone(),
            },
            hints,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;
    use test_log::test;

    use super::*;
    use crate::{
        cnf::compress,
        constraint::Constraint,
        model::{domains, StationChannels},
        solver::Solver,
        types::Solution,
    };

    #[test]
    fn pairing_small_values() {
        assert_eq!(szudzik(0, 0), 0);
        assert_eq!(szudzik(0, 1), 1);
        assert_eq!(szudzik(1, 0), 2);
        assert_eq!(szudzik(1, 1), 3);
        assert_eq!(szudzik(0, 2), 4);
        assert_eq!(unszudzik(szudzik(u32::MAX, u32::MAX)), Some((u32::MAX, u32::MAX)));
        assert_eq!(szudzik(u32::MAX, u32::MAX), u64::MAX);
    }

    proptest! {
        #[test]
        fn pairing_round_trips(a in any::<u32>(), b in any::<u32>()) {
            prop_assert_eq!(unszudzik(szudzik(a, b)), Some((a, b)));
        }

        #[test]
        fn pairing_is_injective(a in any::<u32>(), b in any::<u32>(), c in any::<u32>(), d in any::<u32>()) {
            prop_assume!((a, b) != (c, d));
            prop_assert_ne!(szudzik(a, b), szudzik(c, d));
        }
    }

    fn encoder(constraints: impl IntoIterator<Item = Constraint>) -> SatEncoder {
        SatEncoder::new(Arc::new(ConstraintManager::new(constraints)))
    }

    #[test]
    fn clause_counts() {
        let enc = encoder([
            Constraint::co(Station(1), Station(2), 14),
            Constraint::adj(Station(1), Station(2), 14),
        ]);
        let instance = Instance::new(
            domains(&[(1, &[14, 15, 16]), (2, &[14, 15])]),
            StationChannels::new(),
        )
        .unwrap();
        let encoding = enc.encode(&instance);
        // 2 at-least-one, 3 + 1 at-most-one, co and adj
        assert_eq!(encoding.cnf.len(), 2 + 4 + 2);
        assert!(encoding.hints.is_empty());
    }

    #[test]
    fn decoding_rejects_foreign_variables() {
        let enc = encoder([]);
        let instance =
            Instance::new(domains(&[(1, &[14, 15])]), StationChannels::new()).unwrap();
        let decoder = enc.encode(&instance).decoder;
        assert_eq!(decoder.decode(variable(Station(1), 15)).unwrap(), (Station(1), 15));
        assert!(decoder.decode(variable(Station(1), 16)).is_err());
        assert!(decoder.decode(variable(Station(2), 14)).is_err());
        assert!(decoder
            .decode_model(&[
                Literal::positive(variable(Station(1), 14)),
                Literal::negative(variable(Station(1), 14)),
            ])
            .is_err());
    }

    #[test]
    fn hints_follow_previous_assignment() {
        let enc = encoder([]);
        let instance = Instance::new(
            domains(&[(1, &[14, 15])]),
            [(Station(1), 15)].into_iter().collect(),
        )
        .unwrap();
        let hints = enc.encode(&instance).hints;
        assert!(hints.contains(&Literal::positive(variable(Station(1), 15))));
        assert!(hints.contains(&Literal::negative(variable(Station(1), 14))));
    }

    #[test]
    fn engine_model_decodes_to_valid_packing() {
        let constraints = ConstraintManager::new([
            Constraint::co(Station(1), Station(2), 14),
            Constraint::co(Station(2), Station(3), 15),
            Constraint::adj(Station(1), Station(3), 14),
        ]);
        let enc = SatEncoder::new(Arc::new(constraints.clone()));
        let instance = Instance::new(
            domains(&[(1, &[14, 15]), (2, &[14, 15]), (3, &[14, 15])]),
            StationChannels::new(),
        )
        .unwrap();
        let encoding = enc.encode(&instance);
        let (problem, compression) = compress(&encoding.cnf).unwrap();

        let Solution::Sat { model } = Solver::new(problem).solve() else {
            panic!("instance is satisfiable");
        };
        let literals = compression.decompress(&model).unwrap();
        let assignment = encoding.decoder.decode_model(&literals).unwrap();
        assert!(constraints.is_satisfying_assignment(&assignment));
        assert_eq!(assignment.values().map(|s| s.len()).sum::<usize>(), 3);
    }

    #[test]
    fn infeasible_packing_is_unsat() {
        let enc = encoder([
            Constraint::co(Station(1), Station(2), 14),
            Constraint::co(Station(1), Station(2), 15),
            Constraint::adj(Station(1), Station(2), 14),
        ]);
        let instance = Instance::new(
            domains(&[(1, &[14, 15]), (2, &[14, 15])]),
            StationChannels::new(),
        )
        .unwrap();
        // 1@15 & 2@14 is the only non-co option and is allowed; forbid it too
        let enc = SatEncoder::new(Arc::new(ConstraintManager::new(
            enc.constraints()
                .all()
                .chain([Constraint::adj(Station(2), Station(1), 14)]),
        )));
        let (problem, _) = compress(&enc.encode(&instance).cnf).unwrap();
        assert_eq!(Solver::new(problem).solve(), Solution::Unsat);
    }
}
