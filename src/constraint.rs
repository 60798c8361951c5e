//! Pairwise interference constraints and assignment checking.

use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};

use crate::model::{station_channels, Assignment, Channel, Domains, Station};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstraintKind {
    /// Source and target cannot share the channel.
    Co,
    /// Source on `c` interferes with target on `c + 1`.
    Adj,
    /// Source on `c` interferes with target on `c + 2`.
    Adj2,
}

impl ConstraintKind {
    pub const ALL: [ConstraintKind; 3] = [ConstraintKind::Co, ConstraintKind::Adj, ConstraintKind::Adj2];

    /// Target channel minus source channel.
    pub fn offset(self) -> Channel {
        match self {
            ConstraintKind::Co => 0,
            ConstraintKind::Adj => 1,
            ConstraintKind::Adj2 => 2,
        }
    }

    fn key(self) -> &'static str {
        match self {
            ConstraintKind::Co => "CO",
            ConstraintKind::Adj => "ADJ+1",
            ConstraintKind::Adj2 => "ADJ+2",
        }
    }
}

/// "`source` on `channel` interferes with `target` on [`Constraint::target_channel`]".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub source: Station,
    pub channel: Channel,
    pub target: Station,
}

impl Constraint {
    pub fn co(source: Station, target: Station, channel: Channel) -> Self {
        Self {
            kind: ConstraintKind::Co,
            source,
            channel,
            target,
        }
    }

    pub fn adj(source: Station, target: Station, channel: Channel) -> Self {
        Self {
            kind: ConstraintKind::Adj,
            source,
            channel,
            target,
        }
    }

    pub fn adj2(source: Station, target: Station, channel: Channel) -> Self {
        Self {
            kind: ConstraintKind::Adj2,
            source,
            channel,
            target,
        }
    }

    /// `None` when the target channel would not fit a [`Channel`]; such a
    /// constraint can never be violated.
    pub fn target_channel(&self) -> Option<Channel> {
        self.channel.checked_add(self.kind.offset())
    }

    /// Co-channel constraints are symmetric; orient them from the lower station.
    fn normalized(self) -> Self {
        match self.kind {
            ConstraintKind::Co if self.target < self.source => Self {
                source: self.target,
                target: self.source,
                ..self
            },
            _ => self,
        }
    }
}

type Lookup = BTreeMap<Station, BTreeMap<Channel, BTreeSet<Station>>>;

/// Interference data: co-channel, +1 and +2 lookups per (station, channel).
#[derive(Clone, Debug, Default)]
pub struct ConstraintManager {
    co: Lookup,
    adj: Lookup,
    adj2: Lookup,
    hash: String,
}

static EMPTY: BTreeSet<Station> = BTreeSet::new();

impl ConstraintManager {
    pub fn new(constraints: impl IntoIterator<Item = Constraint>) -> Self {
        let mut manager = Self::default();
        for constraint in constraints {
            let Constraint {
                kind,
                source,
                channel,
                target,
            } = constraint.normalized();
            let lookup = match kind {
                ConstraintKind::Co => &mut manager.co,
                ConstraintKind::Adj => &mut manager.adj,
                ConstraintKind::Adj2 => &mut manager.adj2,
            };
            lookup
                .entry(source)
                .or_default()
                .entry(channel)
                .or_default()
                .insert(target);
        }
        manager.hash = manager.compute_hash();
        manager
    }

    fn table(&self, kind: ConstraintKind) -> &Lookup {
        match kind {
            ConstraintKind::Co => &self.co,
            ConstraintKind::Adj => &self.adj,
            ConstraintKind::Adj2 => &self.adj2,
        }
    }

    /// Stations that cannot be on `channel + kind.offset()` while `station` is on
    /// `channel`.
    pub fn interfering(
        &self,
        kind: ConstraintKind,
        station: Station,
        channel: Channel,
    ) -> &BTreeSet<Station> {
        self.table(kind)
            .get(&station)
            .and_then(|by_channel| by_channel.get(&channel))
            .unwrap_or(&EMPTY)
    }

    /// Stations that cannot share `channel` with `station`. Co-channel pairs are stored
    /// once, under the lower station.
    pub fn co_interfering(&self, station: Station, channel: Channel) -> &BTreeSet<Station> {
        self.interfering(ConstraintKind::Co, station, channel)
    }

    /// Stations that cannot be on `channel + 1` while `station` is on `channel`.
    pub fn adj_interfering(&self, station: Station, channel: Channel) -> &BTreeSet<Station> {
        self.interfering(ConstraintKind::Adj, station, channel)
    }

    /// Stations that cannot be on `channel + 2` while `station` is on `channel`.
    pub fn adj2_interfering(&self, station: Station, channel: Channel) -> &BTreeSet<Station> {
        self.interfering(ConstraintKind::Adj2, station, channel)
    }

    pub fn all(&self) -> impl Iterator<Item = Constraint> + '_ {
        ConstraintKind::ALL.into_iter().flat_map(move |kind| {
            self.table(kind).iter().flat_map(move |(&source, by_channel)| {
                by_channel.iter().flat_map(move |(&channel, targets)| {
                    targets.iter().map(move |&target| Constraint {
                        kind,
                        source,
                        channel,
                        target,
                    })
                })
            })
        })
    }

    pub fn len(&self) -> usize {
        self.all().count()
    }

    pub fn is_empty(&self) -> bool {
        self.co.is_empty() && self.adj.is_empty() && self.adj2.is_empty()
    }

    /// Constraints whose both endpoints are in `domains` and whose channels lie in the
    /// respective domains, normalized and deduplicated.
    pub fn relevant_constraints(&self, domains: &Domains) -> BTreeSet<Constraint> {
        let mut relevant = BTreeSet::new();
        for (&source, domain) in domains {
            for &channel in domain {
                for &target in self.co_interfering(source, channel) {
                    if domains.get(&target).is_some_and(|d| d.contains(&channel)) {
                        relevant.insert(Constraint::co(source, target, channel).normalized());
                    }
                }
                for kind in [ConstraintKind::Adj, ConstraintKind::Adj2] {
                    let Some(target_channel) = channel.checked_add(kind.offset()) else {
                        continue;
                    };
                    for &target in self.interfering(kind, source, channel) {
                        if domains.get(&target).is_some_and(|d| d.contains(&target_channel)) {
                            relevant.insert(Constraint {
                                kind,
                                source,
                                channel,
                                target,
                            });
                        }
                    }
                }
            }
        }
        relevant
    }

    /// Whether `a` on `ca` and `b` on `cb` can coexist.
    pub fn compatible(&self, a: Station, ca: Channel, b: Station, cb: Channel) -> bool {
        if a == b {
            return ca == cb;
        }
        if ca == cb
            && (self.co_interfering(a, ca).contains(&b) || self.co_interfering(b, cb).contains(&a))
        {
            return false;
        }
        for kind in [ConstraintKind::Adj, ConstraintKind::Adj2] {
            let offset = kind.offset();
            if ca.checked_add(offset) == Some(cb) && self.interfering(kind, a, ca).contains(&b) {
                return false;
            }
            if cb.checked_add(offset) == Some(ca) && self.interfering(kind, b, cb).contains(&a) {
                return false;
            }
        }
        true
    }

    /// Describes the first problem with `assignment`, if any: a station on two channels
    /// or a pair of stations violating an interference constraint.
    pub fn violation(&self, assignment: &Assignment) -> Option<String> {
        let channels = match station_channels(assignment) {
            Ok(channels) => channels,
            Err(e) => return Some(e.to_string()),
        };
        for (&channel, stations) in assignment {
            for &station in stations {
                for &other in self.co_interfering(station, channel) {
                    if stations.contains(&other) {
                        return Some(format!(
                            "stations {station} and {other} share channel {channel}"
                        ));
                    }
                }
                for kind in [ConstraintKind::Adj, ConstraintKind::Adj2] {
                    let Some(target_channel) = channel.checked_add(kind.offset()) else {
                        continue;
                    };
                    for &other in self.interfering(kind, station, channel) {
                        if channels.get(&other) == Some(&target_channel) {
                            return Some(format!(
                                "station {station} on {channel} interferes with {other} on {target_channel}"
                            ));
                        }
                    }
                }
            }
        }
        None
    }

    pub fn is_satisfying_assignment(&self, assignment: &Assignment) -> bool {
        self.violation(assignment).is_none()
    }

    /// Content hash over the canonical constraint listing.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for constraint in self.all() {
            let target_channel = constraint
                .target_channel()
                .map_or_else(|| "-".to_string(), |c| c.to_string());
            hasher.update(
                format!(
                    "{},{},{target_channel},{},{}\n",
                    constraint.kind.key(),
                    constraint.channel,
                    constraint.source,
                    constraint.target
                )
                .as_bytes(),
            );
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::model::{domains, to_assignment};

    fn manager() -> ConstraintManager {
        ConstraintManager::new([
            Constraint::co(Station(2), Station(1), 14),
            Constraint::adj(Station(1), Station(3), 14),
            Constraint::co(Station(3), Station(4), 20),
        ])
    }

    #[test]
    fn co_is_normalized() {
        let m = manager();
        assert!(m.co_interfering(Station(1), 14).contains(&Station(2)));
        assert!(m.co_interfering(Station(2), 14).is_empty());
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn relevant_constraints_respect_domains() {
        let m = manager();
        let d = domains(&[(1, &[14]), (2, &[14, 15]), (3, &[16]), (4, &[20])]);
        let relevant = m.relevant_constraints(&d);
        // adj needs 3 on 15, co 3/4 needs 3 on 20
        assert_eq!(
            relevant.into_iter().collect::<Vec<_>>(),
            vec![Constraint::co(Station(1), Station(2), 14)]
        );

        let d = domains(&[(1, &[14]), (3, &[15, 20]), (4, &[20])]);
        let relevant = m.relevant_constraints(&d);
        assert!(relevant.contains(&Constraint::adj(Station(1), Station(3), 14)));
        assert!(relevant.contains(&Constraint::co(Station(3), Station(4), 20)));
        assert_eq!(relevant.len(), 2);
    }

    #[test]
    fn compatibility() {
        let m = manager();
        assert!(!m.compatible(Station(1), 14, Station(2), 14));
        assert!(!m.compatible(Station(2), 14, Station(1), 14));
        assert!(m.compatible(Station(1), 15, Station(2), 15));
        assert!(!m.compatible(Station(1), 14, Station(3), 15));
        assert!(!m.compatible(Station(3), 15, Station(1), 14));
        assert!(m.compatible(Station(3), 14, Station(1), 15));
    }

    #[test]
    fn violations_are_reported() {
        let m = manager();
        let ok = to_assignment(&[(Station(1), 14), (Station(2), 15), (Station(3), 16)].into());
        assert!(m.is_satisfying_assignment(&ok));

        let co = to_assignment(&[(Station(1), 14), (Station(2), 14)].into());
        assert!(m.violation(&co).unwrap().contains("share channel 14"));

        let adj = to_assignment(&[(Station(1), 14), (Station(3), 15)].into());
        assert!(!m.is_satisfying_assignment(&adj));

        let mut doubled = ok.clone();
        doubled.entry(20).or_default().insert(Station(1));
        assert!(!m.is_satisfying_assignment(&doubled));
    }

    #[test]
    fn hash_depends_on_content_only() {
        let a = manager();
        let b = ConstraintManager::new([
            Constraint::co(Station(3), Station(4), 20),
            Constraint::co(Station(1), Station(2), 14),
            Constraint::adj(Station(1), Station(3), 14),
        ]);
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), ConstraintManager::default().compute_hash());
    }

    #[test]
    fn two_channel_interference() {
        let m = ConstraintManager::new([Constraint::adj2(Station(1), Station(2), 14)]);
        assert!(m.adj2_interfering(Station(1), 14).contains(&Station(2)));
        assert!(!m.compatible(Station(1), 14, Station(2), 16));
        assert!(!m.compatible(Station(2), 16, Station(1), 14));
        assert!(m.compatible(Station(1), 14, Station(2), 15));
        assert!(m.compatible(Station(2), 14, Station(1), 16));

        let d = domains(&[(1, &[14]), (2, &[15, 16])]);
        assert_eq!(
            m.relevant_constraints(&d).into_iter().collect::<Vec<_>>(),
            vec![Constraint::adj2(Station(1), Station(2), 14)]
        );
        assert!(m.relevant_constraints(&domains(&[(1, &[14]), (2, &[15])])).is_empty());

        let bad = to_assignment(&[(Station(1), 14), (Station(2), 16)].into());
        assert!(m.violation(&bad).unwrap().contains("on 16"));
        assert_ne!(m.hash(), ConstraintManager::new([Constraint::adj(Station(1), Station(2), 14)]).hash());
    }

    #[test]
    fn top_channel_has_no_neighbours_above() {
        let top = Channel::MAX;
        let m = ConstraintManager::new([
            Constraint::adj(Station(1), Station(2), top),
            Constraint::adj2(Station(1), Station(2), top - 1),
            Constraint::adj(Station(1), Station(2), top - 1),
        ]);
        assert!(m.compatible(Station(1), top, Station(2), 0));
        assert!(m.compatible(Station(2), top, Station(1), top - 1));
        assert!(!m.compatible(Station(1), top - 1, Station(2), top));
        assert_eq!(Constraint::adj(Station(1), Station(2), top).target_channel(), None);

        let d = domains(&[(1, &[top - 1, top]), (2, &[0, 1, top])]);
        assert_eq!(m.relevant_constraints(&d).len(), 1);
        let ok = to_assignment(&[(Station(1), top), (Station(2), 0)].into());
        assert!(m.is_satisfying_assignment(&ok));
    }
}
