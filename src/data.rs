//! Loading station domains and interference constraints from the FCC data files.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
    sync::Arc,
};

use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::{
    cache::CacheCoordinate,
    constraint::{Constraint, ConstraintKind, ConstraintManager},
    error::{PackingError, Result},
    model::{Channel, Domains, Station},
};

pub const DOMAIN_FILE: &str = "Domain.csv";
pub const INTERFERENCE_FILE: &str = "Interference_Paired.csv";

/// Splits a CSV line into trimmed, non-empty fields.
fn fields(line: &str) -> Vec<&str> {
    line.split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect()
}

fn number(field: &str, line: usize) -> Result<u32> {
    field
        .parse()
        .map_err(|_| PackingError::parse(line, format!("expected a number, got {field:?}")))
}

/// Every station with its full channel domain.
#[derive(Clone, Debug)]
pub struct StationManager {
    domains: Domains,
    hash: String,
}

impl StationManager {
    /// Parses `DOMAIN,<station>,<channel>,...` lines.
    pub fn parse(text: &str) -> Result<Self> {
        let mut domains = Domains::new();
        for (i, line) in text.lines().enumerate() {
            let line_number = i + 1;
            let fields = fields(line);
            let [key, id, channels @ ..] = fields.as_slice() else {
                if !fields.is_empty() {
                    return Err(PackingError::parse(line_number, "truncated domain line"));
                }
                continue;
            };
            if !key.eq_ignore_ascii_case("DOMAIN") {
                return Err(PackingError::parse(
                    line_number,
                    format!("unknown domain key {key:?}"),
                ));
            }
            let station = Station(number(id, line_number)?);
            let domain = channels
                .iter()
                .map(|c| number(c, line_number))
                .collect::<Result<BTreeSet<Channel>>>()?;
            if domain.is_empty() {
                return Err(PackingError::parse(
                    line_number,
                    format!("station {station} has an empty domain"),
                ));
            }
            if domains.insert(station, domain).is_some() {
                return Err(PackingError::parse(
                    line_number,
                    format!("station {station} is listed twice"),
                ));
            }
        }

        let mut hasher = Sha256::new();
        for (station, domain) in &domains {
            let channels: Vec<String> = domain.iter().map(|c| c.to_string()).collect();
            hasher.update(format!("{station}:{}\n", channels.join(",")).as_bytes());
        }
        Ok(Self {
            domains,
            hash: format!("{:x}", hasher.finalize()),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn stations(&self) -> impl Iterator<Item = Station> + '_ {
        self.domains.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn get_station(&self, id: u32) -> Result<Station> {
        let station = Station(id);
        if self.domains.contains_key(&station) {
            Ok(station)
        } else {
            Err(PackingError::UnknownStation(id))
        }
    }

    pub fn domain(&self, station: Station) -> Option<&BTreeSet<Channel>> {
        self.domains.get(&station)
    }

    /// Domains of `ids` cut down to `channels`. Stations left without a
    /// channel keep an empty domain, which instance construction rejects.
    pub fn restricted_domains(&self, ids: &[u32], channels: &BTreeSet<Channel>) -> Result<Domains> {
        ids.iter()
            .map(|&id| {
                let station = self.get_station(id)?;
                let domain = self.domains[&station]
                    .intersection(channels)
                    .copied()
                    .collect();
                Ok((station, domain))
            })
            .collect()
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Key {
    Co,
    AdjPlus,
    AdjMinus,
    AdjPlus2,
    AdjMinus2,
}

impl Key {
    fn parse(field: &str, line: usize) -> Result<Self> {
        match field {
            "CO" => Ok(Key::Co),
            "ADJ+1" => Ok(Key::AdjPlus),
            "ADJ-1" => Ok(Key::AdjMinus),
            "ADJ+2" => Ok(Key::AdjPlus2),
            "ADJ-2" => Ok(Key::AdjMinus2),
            _ => Err(PackingError::parse(line, format!("unknown constraint key {field:?}"))),
        }
    }
}

/// One interference line: key, two channels, subject and targets.
struct Row {
    key: Key,
    first: Channel,
    second: Channel,
    subject: Station,
    targets: Vec<Station>,
}

fn rows(text: &str, stations: &StationManager) -> Result<Vec<(usize, Row)>> {
    let mut rows = vec![];
    for (i, line) in text.lines().enumerate() {
        let line_number = i + 1;
        let fields = fields(line);
        let [key, first, second, subject, targets @ ..] = fields.as_slice() else {
            if !fields.is_empty() {
                return Err(PackingError::parse(line_number, "truncated interference line"));
            }
            continue;
        };
        let targets = targets
            .iter()
            .map(|t| stations.get_station(number(t, line_number)?))
            .collect::<Result<Vec<_>>>()?;
        rows.push((
            line_number,
            Row {
                key: Key::parse(key, line_number)?,
                first: number(first, line_number)?,
                second: number(second, line_number)?,
                subject: stations.get_station(number(subject, line_number)?)?,
                targets,
            },
        ));
    }
    Ok(rows)
}

/// `<KEY>,<subject channel>,<target channel>,<subject>,<targets>...`
fn unabridged(rows: &[(usize, Row)]) -> Result<Vec<Constraint>> {
    let mut constraints = vec![];
    for (line, row) in rows {
        let c = row.first;
        let valid = match row.key {
            Key::Co => row.second == c,
            Key::AdjPlus => row.second.checked_sub(1) == Some(c),
            Key::AdjMinus => c.checked_sub(1) == Some(row.second),
            Key::AdjPlus2 => row.second.checked_sub(2) == Some(c),
            Key::AdjMinus2 => c.checked_sub(2) == Some(row.second),
        };
        if !valid {
            return Err(PackingError::parse(
                *line,
                format!("{:?} does not relate channels {c} and {}", row.key, row.second),
            ));
        }
        for &target in &row.targets {
            constraints.push(match row.key {
                Key::Co => Constraint::co(row.subject, target, c),
                Key::AdjPlus => Constraint::adj(row.subject, target, c),
                // subject on c next to target on c - 1 is target's ADJ+1 at c - 1
                Key::AdjMinus => Constraint::adj(target, row.subject, row.second),
                Key::AdjPlus2 => Constraint::adj2(row.subject, target, c),
                Key::AdjMinus2 => Constraint::adj2(target, row.subject, row.second),
            });
        }
    }
    Ok(constraints)
}

/// `<KEY>,<low channel>,<high channel>,<subject>,<targets>...`, applying to
/// every subject channel in the range. ADJ+1 also implies co-channel
/// interference on both channels involved; ADJ+2 implies co-channel
/// interference on all three and ADJ+1 on the lower two.
fn channel_specific(rows: &[(usize, Row)]) -> Result<Vec<Constraint>> {
    use ConstraintKind::{Adj, Adj2, Co};

    let mut constraints = vec![];
    for (line, row) in rows {
        if matches!(row.key, Key::AdjMinus | Key::AdjMinus2) {
            return Err(PackingError::parse(
                *line,
                format!("{:?} has no channel-specific form", row.key),
            ));
        }
        if row.first > row.second {
            return Err(PackingError::parse(
                *line,
                format!("low channel {} above high channel {}", row.first, row.second),
            ));
        }
        // (kind, channel shift) of every constraint one row implies
        let implied: &[(ConstraintKind, Channel)] = match row.key {
            Key::Co => &[(Co, 0)],
            Key::AdjPlus => &[(Co, 0), (Co, 1), (Adj, 0)],
            Key::AdjPlus2 => &[(Co, 0), (Co, 1), (Co, 2), (Adj, 0), (Adj, 1), (Adj2, 0)],
            Key::AdjMinus | Key::AdjMinus2 => &[],
        };
        for c in row.first..=row.second {
            for &target in &row.targets {
                for &(kind, shift) in implied {
                    if let Some(channel) = c.checked_add(shift) {
                        constraints.push(Constraint {
                            kind,
                            source: row.subject,
                            channel,
                            target,
                        });
                    }
                }
            }
        }
    }
    Ok(constraints)
}

/// Parses interference data in whichever of the two known formats fits.
/// Data that fits both or neither is rejected.
pub fn parse_interference(text: &str, stations: &StationManager) -> Result<ConstraintManager> {
    let rows = rows(text, stations)?;
    match (unabridged(&rows), channel_specific(&rows)) {
        (Ok(constraints), Err(e)) => {
            info!("unabridged interference format ({e})");
            Ok(ConstraintManager::new(constraints))
        }
        (Err(e), Ok(constraints)) => {
            info!("channel-specific interference format ({e})");
            Ok(ConstraintManager::new(constraints))
        }
        (Ok(_), Ok(_)) => Err(PackingError::InterferenceFormat(
            "data fits both the unabridged and the channel-specific format".to_string(),
        )),
        (Err(unabridged), Err(channel_specific)) => {
            warn!("not unabridged: {unabridged}");
            warn!("not channel-specific: {channel_specific}");
            Err(PackingError::InterferenceFormat(format!(
                "{unabridged}; {channel_specific}"
            )))
        }
    }
}

/// Stations and interference constraints of one data directory.
pub struct DataBundle {
    pub stations: StationManager,
    pub constraints: Arc<ConstraintManager>,
    pub coordinate: CacheCoordinate,
}

impl DataBundle {
    pub fn new(stations: StationManager, constraints: ConstraintManager) -> Self {
        let coordinate = CacheCoordinate::new(stations.hash(), constraints.hash());
        Self {
            stations,
            constraints: Arc::new(constraints),
            coordinate,
        }
    }

    /// Reads [`DOMAIN_FILE`] and [`INTERFERENCE_FILE`] from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let stations = StationManager::load(&dir.join(DOMAIN_FILE))?;
        let text = fs::read_to_string(dir.join(INTERFERENCE_FILE))?;
        let constraints = parse_interference(&text, &stations)?;
        info!(
            "loaded {} stations and {} constraints from {}",
            stations.len(),
            constraints.len(),
            dir.display()
        );
        debug!("data coordinate {:?}", CacheCoordinate::new(stations.hash(), constraints.hash()));
        Ok(Self::new(stations, constraints))
    }

    /// Station ids grouped by how many channels they may use, for logging.
    pub fn domain_sizes(&self) -> BTreeMap<usize, usize> {
        let mut sizes = BTreeMap::new();
        for station in self.stations.stations() {
            let size = self.stations.domain(station).map_or(0, BTreeSet::len);
            *sizes.entry(size).or_default() += 1;
        }
        sizes
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use test_log::test;

    use super::*;
    use crate::error::PackingError;

    const DOMAINS: &str = "DOMAIN,1,14,15,16\nDOMAIN,2,14,15,16\n\nDOMAIN, 3, 15, 16\n";

    fn stations() -> StationManager {
        StationManager::parse(DOMAINS).unwrap()
    }

    #[test]
    fn domain_file() {
        let stations = stations();
        assert_eq!(stations.len(), 3);
        assert_eq!(stations.domain(Station(3)), Some(&BTreeSet::from([15, 16])));
        assert!(matches!(stations.get_station(9), Err(PackingError::UnknownStation(9))));

        let restricted = stations.restricted_domains(&[1, 3], &[14, 15].into()).unwrap();
        assert_eq!(restricted[&Station(1)], BTreeSet::from([14, 15]));
        assert_eq!(restricted[&Station(3)], BTreeSet::from([15]));
    }

    #[test]
    fn domain_hash_ignores_layout() {
        let shuffled =
            StationManager::parse("DOMAIN,3,16,15\nDOMAIN,2,16,15,14\nDOMAIN,1,14,16,15").unwrap();
        assert_eq!(shuffled.hash(), stations().hash());
        let other = StationManager::parse("DOMAIN,1,14").unwrap();
        assert_ne!(other.hash(), stations().hash());
    }

    #[test]
    fn bad_domain_lines() {
        assert!(matches!(
            StationManager::parse("DOMAIN,1,14\nDOMAIN,x,14"),
            Err(PackingError::Parse { line: 2, .. })
        ));
        assert!(StationManager::parse("DOMAIN,1").is_err());
        assert!(StationManager::parse("DOMAIN,1,14\nDOMAIN,1,15").is_err());
        assert!(StationManager::parse("STATION,1,14").is_err());
    }

    #[test]
    fn unabridged_format() {
        let text = "CO,14,14,1,2,3\nADJ+1,14,15,1,2\nADJ-1,16,15,3,1\n";
        let constraints = parse_interference(text, &stations()).unwrap();
        assert!(constraints.co_interfering(Station(1), 14).contains(&Station(2)));
        assert!(constraints.co_interfering(Station(1), 14).contains(&Station(3)));
        assert!(constraints.adj_interfering(Station(1), 14).contains(&Station(2)));
        // 3 on 16 next to 1 on 15
        assert!(constraints.adj_interfering(Station(1), 15).contains(&Station(3)));
        assert!(!constraints.compatible(Station(3), 16, Station(1), 15));
        assert_eq!(constraints.len(), 4);
    }

    #[test]
    fn channel_specific_format() {
        let text = "CO,14,16,1,2\nADJ+1,14,14,2,3\n";
        let constraints = parse_interference(text, &stations()).unwrap();
        for c in 14..=16 {
            assert!(!constraints.compatible(Station(1), c, Station(2), c));
        }
        assert!(!constraints.compatible(Station(2), 14, Station(3), 15));
        assert!(!constraints.compatible(Station(2), 15, Station(3), 15));
        assert!(constraints.compatible(Station(2), 15, Station(3), 16));
    }

    #[test]
    fn two_channel_rows_in_unabridged_format() {
        let text = "ADJ+2,14,16,1,2\nADJ-2,16,14,3,1\n";
        let constraints = parse_interference(text, &stations()).unwrap();
        assert_eq!(
            constraints.adj2_interfering(Station(1), 14),
            &BTreeSet::from([Station(2), Station(3)])
        );
        assert!(!constraints.compatible(Station(3), 16, Station(1), 14));
        assert!(constraints.compatible(Station(1), 14, Station(2), 15));
        assert_eq!(constraints.len(), 2);

        assert!(matches!(
            parse_interference("ADJ+2,14,15,1,2\nADJ-2,16,14,3,1\n", &stations()),
            Err(PackingError::InterferenceFormat(_))
        ));
    }

    #[test]
    fn two_channel_rows_in_channel_specific_format() {
        let constraints = parse_interference("ADJ+2,14,14,1,2\n", &stations()).unwrap();
        assert_eq!(constraints.len(), 6);
        for c in 14..=16 {
            assert!(!constraints.compatible(Station(1), c, Station(2), 16));
        }
        assert!(constraints.compatible(Station(1), 16, Station(2), 14));
        assert!(constraints.compatible(Station(1), 14, Station(2), 17));
    }

    #[test]
    fn rows_at_the_top_channel() {
        let top = Channel::MAX;
        let text = format!("ADJ+2,{top},{top},1,2\n");
        let constraints = parse_interference(&text, &stations()).unwrap();
        // only the constraints anchored on the top channel itself survive
        assert_eq!(constraints.len(), 3);
        assert!(!constraints.compatible(Station(1), top, Station(2), top));
        assert!(constraints.compatible(Station(1), top, Station(2), 0));
    }

    #[test]
    fn ambiguous_or_unknown_formats() {
        assert!(matches!(
            parse_interference("CO,14,14,1,2\n", &stations()),
            Err(PackingError::InterferenceFormat(_))
        ));
        assert!(matches!(
            parse_interference("CO,15,14,1,2\n", &stations()),
            Err(PackingError::InterferenceFormat(_))
        ));
        assert!(matches!(
            parse_interference("CO,14,16,1,9\n", &stations()),
            Err(PackingError::UnknownStation(9))
        ));
    }

    #[test]
    fn bundle_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DOMAIN_FILE), DOMAINS).unwrap();
        fs::write(dir.path().join(INTERFERENCE_FILE), "CO,14,16,1,2\n").unwrap();

        let bundle = DataBundle::load(dir.path()).unwrap();
        assert_eq!(bundle.coordinate.domain_hash, stations().hash());
        assert_eq!(bundle.constraints.len(), 3);
        assert_eq!(bundle.domain_sizes(), BTreeMap::from([(2, 1), (3, 2)]));

        let again = DataBundle::load(dir.path()).unwrap();
        assert_eq!(again.coordinate, bundle.coordinate);
    }
}
