//! Content-addressed cache of conclusive packing results.

mod store;

use std::{fmt, sync::Arc, time::Duration};

use log::{debug, info};
use serde::{Deserialize, Serialize};

pub use self::store::{CacheStore, MemoryStore};
use crate::{
    error::{PackingError, Result},
    model::{station_channels, to_assignment, Domains, Instance, StationChannels},
    result::{Outcome, SatResult, SolvedBy, SolverResult},
};

/// Identifies the station and interference data a result was computed against.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheCoordinate {
    pub domain_hash: String,
    pub interference_hash: String,
}

impl CacheCoordinate {
    pub fn new(domain_hash: impl Into<String>, interference_hash: impl Into<String>) -> Self {
        Self {
            domain_hash: domain_hash.into(),
            interference_hash: interference_hash.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub coordinate: CacheCoordinate,
    pub instance_hash: String,
}

impl CacheKey {
    pub fn new(coordinate: &CacheCoordinate, instance: &Instance) -> Self {
        Self {
            coordinate: coordinate.clone(),
            instance_hash: instance.hash_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.coordinate.domain_hash, self.coordinate.interference_hash, self.instance_hash
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheEntry {
    Sat {
        assignment: StationChannels,
        name: String,
    },
    Unsat {
        domains: Domains,
        name: String,
    },
}

impl CacheEntry {
    pub fn kind(&self) -> SatResult {
        match self {
            CacheEntry::Sat { .. } => SatResult::Sat,
            CacheEntry::Unsat { .. } => SatResult::Unsat,
        }
    }
}

/// SAT and UNSAT results keyed by data coordinate and instance content.
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn has_entry(&self, coordinate: &CacheCoordinate, instance: &Instance) -> bool {
        self.store.get(&CacheKey::new(coordinate, instance)).is_some()
    }

    /// The stored result for `instance`. Fails when the stored entry belongs
    /// to a different problem with the same hash.
    pub fn get(
        &self,
        coordinate: &CacheCoordinate,
        instance: &Instance,
    ) -> Result<Option<SolverResult>> {
        let key = CacheKey::new(coordinate, instance);
        let Some(entry) = self.store.get(&key) else {
            info!("cache miss for {}", instance.name());
            return Ok(None);
        };
        info!("cache hit for {}: {:?}", instance.name(), entry.kind());

        match entry {
            CacheEntry::Sat { assignment, .. } => {
                let covers = assignment.len() == instance.len()
                    && assignment.iter().all(|(&station, channel)| {
                        instance.domain(station).is_some_and(|d| d.contains(channel))
                    });
                if !covers {
                    return Err(PackingError::HashCollision(key.to_string()));
                }
                Ok(Some(SolverResult::sat(
                    to_assignment(&assignment),
                    Duration::ZERO,
                    SolvedBy::Cache,
                )))
            }
            CacheEntry::Unsat { domains, .. } => {
                if &domains != instance.domains() {
                    return Err(PackingError::HashCollision(key.to_string()));
                }
                Ok(Some(SolverResult::unsat(Duration::ZERO, SolvedBy::Cache)))
            }
        }
    }

    /// Stores a conclusive result. Returns whether an entry was already there.
    pub fn put(
        &self,
        coordinate: &CacheCoordinate,
        instance: &Instance,
        result: &SolverResult,
    ) -> Result<bool> {
        let name = instance.name().to_string();
        let entry = match &result.outcome {
            Outcome::Sat(assignment) => CacheEntry::Sat {
                assignment: station_channels(assignment)?,
                name,
            },
            Outcome::Unsat => CacheEntry::Unsat {
                domains: instance.domains().clone(),
                name,
            },
            _ => return Err(PackingError::NotCacheable(result.kind())),
        };

        let key = CacheKey::new(coordinate, instance);
        match self.store.insert_if_absent(key.clone(), entry) {
            None => {
                debug!("cached {:?} under {key}", result.kind());
                Ok(false)
            }
            Some(existing) if existing.kind() != result.kind() => Err(PackingError::CacheConflict {
                key: key.to_string(),
                stored: existing.kind(),
                new: result.kind(),
            }),
            Some(_) => Ok(true),
        }
    }

    /// A stored SAT witness over a superset of the instance, cut down to it.
    pub fn find_superset_sat(
        &self,
        coordinate: &CacheCoordinate,
        instance: &Instance,
    ) -> Option<SolverResult> {
        self.store
            .entries(coordinate)
            .into_iter()
            .find_map(|(_, entry)| {
                let CacheEntry::Sat { assignment, .. } = entry else {
                    return None;
                };
                let restricted: StationChannels = instance
                    .domains()
                    .iter()
                    .map(|(station, domain)| {
                        assignment
                            .get(station)
                            .filter(|&&c| domain.contains(&c))
                            .map(|&c| (*station, c))
                    })
                    .collect::<Option<_>>()?;
                Some(restricted)
            })
            .map(|restricted| {
                SolverResult::sat(
                    to_assignment(&restricted),
                    Duration::ZERO,
                    SolvedBy::ContainmentCache,
                )
            })
    }

    /// Whether a stored UNSAT problem is contained in the instance: fewer
    /// stations, each with at least the instance's channels.
    pub fn find_subset_unsat(
        &self,
        coordinate: &CacheCoordinate,
        instance: &Instance,
    ) -> Option<SolverResult> {
        let found = self.store.entries(coordinate).into_iter().any(|(_, entry)| {
            let CacheEntry::Unsat { domains, .. } = entry else {
                return false;
            };
            domains.iter().all(|(station, stored)| {
                instance
                    .domain(*station)
                    .is_some_and(|domain| domain.is_subset(stored))
            })
        });
        found.then(|| SolverResult::unsat(Duration::ZERO, SolvedBy::ContainmentCache))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use test_log::test;

    use super::*;
    use crate::model::{domains, Station};

    fn coordinate() -> CacheCoordinate {
        CacheCoordinate::new("domains", "interference")
    }

    fn instance(entries: &[(u32, &[u32])]) -> Instance {
        Instance::new(domains(entries), StationChannels::new()).unwrap()
    }

    fn sat(channels: &[(u32, u32)]) -> SolverResult {
        let channels: StationChannels = channels.iter().map(|&(s, c)| (Station(s), c)).collect();
        SolverResult::sat(to_assignment(&channels), Duration::ZERO, SolvedBy::SatEngine)
    }

    fn cache() -> ResultCache {
        ResultCache::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn put_is_idempotent() {
        let cache = cache();
        let problem = instance(&[(1, &[14, 15]), (2, &[15])]);
        let result = sat(&[(1, 14), (2, 15)]);

        assert!(!cache.has_entry(&coordinate(), &problem));
        assert!(!cache.put(&coordinate(), &problem, &result).unwrap());
        assert!(cache.put(&coordinate(), &problem, &result).unwrap());
        assert!(cache.has_entry(&coordinate(), &problem));

        let hit = cache.get(&coordinate(), &problem).unwrap().unwrap();
        assert_eq!(hit.kind(), SatResult::Sat);
        assert_eq!(hit.solved_by, SolvedBy::Cache);
        assert_eq!(hit.assignment(), result.assignment());
    }

    #[test]
    fn conflicting_verdicts_are_an_error() {
        let cache = cache();
        let problem = instance(&[(1, &[14, 15]), (2, &[15])]);
        cache.put(&coordinate(), &problem, &sat(&[(1, 14), (2, 15)])).unwrap();
        let err = cache.put(
            &coordinate(),
            &problem,
            &SolverResult::unsat(Duration::ZERO, SolvedBy::SatEngine),
        );
        assert!(matches!(
            err,
            Err(PackingError::CacheConflict {
                stored: SatResult::Sat,
                new: SatResult::Unsat,
                ..
            })
        ));
    }

    #[test]
    fn inconclusive_results_are_not_cacheable() {
        let cache = cache();
        let problem = instance(&[(1, &[14])]);
        let err = cache.put(&coordinate(), &problem, &SolverResult::timeout(Duration::ZERO));
        assert!(matches!(err, Err(PackingError::NotCacheable(SatResult::Timeout))));
    }

    #[test]
    fn keys_ignore_insertion_order() {
        let mut forward = Domains::new();
        let mut backward = Domains::new();
        for s in 1..=5 {
            forward.insert(Station(s), (14..14 + s).collect());
        }
        for s in (1..=5).rev() {
            backward.insert(Station(s), (14..14 + s).rev().collect());
        }
        let a = Instance::new(forward, StationChannels::new()).unwrap();
        let b = Instance::new(backward, StationChannels::new())
            .unwrap()
            .with_name("other");
        assert_eq!(CacheKey::new(&coordinate(), &a), CacheKey::new(&coordinate(), &b));

        let cache = cache();
        cache
            .put(&coordinate(), &a, &SolverResult::unsat(Duration::ZERO, SolvedBy::SatEngine))
            .unwrap();
        assert!(cache.has_entry(&coordinate(), &b));
    }

    #[test]
    fn coordinates_separate_entries() {
        let cache = cache();
        let problem = instance(&[(1, &[14])]);
        cache.put(&coordinate(), &problem, &sat(&[(1, 14)])).unwrap();
        let other = CacheCoordinate::new("domains", "other interference");
        assert!(!cache.has_entry(&other, &problem));
        assert!(cache.get(&other, &problem).unwrap().is_none());
    }

    #[test]
    fn mismatching_entry_is_a_collision() {
        let store = Arc::new(MemoryStore::new());
        let problem = instance(&[(1, &[14, 15])]);
        store.insert_if_absent(
            CacheKey::new(&coordinate(), &problem),
            CacheEntry::Unsat {
                domains: domains(&[(1, &[14])]),
                name: "forged".to_string(),
            },
        );
        let cache = ResultCache::new(store);
        assert!(matches!(
            cache.get(&coordinate(), &problem),
            Err(PackingError::HashCollision(_))
        ));
    }

    #[test]
    fn concurrent_first_writes_store_once() {
        let cache = cache();
        let problem = instance(&[(1, &[14, 15]), (2, &[15])]);
        let result = sat(&[(1, 14), (2, 15)]);
        let already: Vec<bool> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| cache.put(&coordinate(), &problem, &result).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(already.iter().filter(|&&present| !present).count(), 1);
    }

    #[test]
    fn containment_lookups() {
        let cache = cache();
        let big = instance(&[(1, &[14, 15]), (2, &[15]), (3, &[16])]);
        cache
            .put(&coordinate(), &big, &sat(&[(1, 14), (2, 15), (3, 16)]))
            .unwrap();

        let subset = instance(&[(1, &[14]), (3, &[16, 17])]);
        let hit = cache.find_superset_sat(&coordinate(), &subset).unwrap();
        assert_eq!(hit.solved_by, SolvedBy::ContainmentCache);
        assert_eq!(hit.assignment().unwrap().len(), 2);
        // witness channel outside the narrower domain
        assert!(cache
            .find_superset_sat(&coordinate(), &instance(&[(1, &[15])]))
            .is_none());

        let core = instance(&[(4, &[20, 21]), (5, &[20, 21]), (6, &[20, 21])]);
        cache
            .put(&coordinate(), &core, &SolverResult::unsat(Duration::ZERO, SolvedBy::SatEngine))
            .unwrap();
        let wider = instance(&[(4, &[20]), (5, &[20, 21]), (6, &[21]), (7, &[30])]);
        assert!(cache.find_subset_unsat(&coordinate(), &wider).is_some());
        let escaped = instance(&[(4, &[20, 22]), (5, &[20]), (6, &[21])]);
        assert!(cache.find_subset_unsat(&coordinate(), &escaped).is_none());
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = Arc::new(MemoryStore::new());
        let cache = ResultCache::new(store.clone());
        let problem = instance(&[(1, &[14, 15]), (2, &[15])]);
        cache.put(&coordinate(), &problem, &sat(&[(1, 14), (2, 15)])).unwrap();
        let unsat = instance(&[(3, &[20]), (4, &[20])]);
        cache
            .put(&coordinate(), &unsat, &SolverResult::unsat(Duration::ZERO, SolvedBy::SatEngine))
            .unwrap();
        store.save(&path).unwrap();

        let restored = ResultCache::new(Arc::new(MemoryStore::load(&path).unwrap()));
        assert_eq!(
            restored.get(&coordinate(), &problem).unwrap().unwrap().kind(),
            SatResult::Sat
        );
        assert_eq!(
            restored.get(&coordinate(), &unsat).unwrap().unwrap().kind(),
            SatResult::Unsat
        );
    }
}
