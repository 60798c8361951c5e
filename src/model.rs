//! Stations, channel domains, witness assignments and packing instances.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PackingError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Station(pub u32);

impl Station {
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type Channel = u32;

/// Station -> permissible channels.
pub type Domains = BTreeMap<Station, BTreeSet<Channel>>;

/// Witness of a packing: channel -> stations placed on it.
pub type Assignment = BTreeMap<Channel, BTreeSet<Station>>;

/// Station -> the single channel it is placed on.
pub type StationChannels = BTreeMap<Station, Channel>;

pub fn to_assignment(channels: &StationChannels) -> Assignment {
    let mut assignment = Assignment::new();
    for (&station, &channel) in channels {
        assignment.entry(channel).or_default().insert(station);
    }
    assignment
}

/// Inverts a witness; a station placed on two channels is an error.
pub fn station_channels(assignment: &Assignment) -> Result<StationChannels> {
    let mut channels = StationChannels::new();
    for (&channel, stations) in assignment {
        for &station in stations {
            if let Some(other) = channels.insert(station, channel) {
                return Err(PackingError::UnverifiedAssignment(format!(
                    "station {station} is assigned to both {other} and {channel}"
                )));
            }
        }
    }
    Ok(channels)
}

pub const LVHF_CHANNELS: std::ops::RangeInclusive<Channel> = 2..=6;
pub const HVHF_CHANNELS: std::ops::RangeInclusive<Channel> = 7..=13;
pub const UHF_CHANNELS: std::ops::RangeInclusive<Channel> = 14..=51;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Lvhf,
    Hvhf,
    Uhf,
}

impl Band {
    pub fn of(channel: Channel) -> Option<Band> {
        if LVHF_CHANNELS.contains(&channel) {
            Some(Band::Lvhf)
        } else if HVHF_CHANNELS.contains(&channel) {
            Some(Band::Hvhf)
        } else if UHF_CHANNELS.contains(&channel) {
            Some(Band::Uhf)
        } else {
            None
        }
    }

    /// A channel set is VHF when it lies entirely in the low or the high VHF band.
    pub fn is_vhf(channels: &BTreeSet<Channel>) -> bool {
        !channels.is_empty()
            && (channels.iter().all(|c| LVHF_CHANNELS.contains(c))
                || channels.iter().all(|c| HVHF_CHANNELS.contains(c)))
    }
}

/// An immutable packing problem. Equality and hashing only look at the domains.
#[derive(Clone, Debug)]
pub struct Instance {
    domains: Domains,
    previous: StationChannels,
    name: String,
}

pub const UNTITLED: &str = "UNTITLED";

impl Instance {
    pub fn new(domains: Domains, previous: StationChannels) -> Result<Self> {
        for (station, domain) in &domains {
            if domain.is_empty() {
                return Err(PackingError::InvalidInstance(format!(
                    "domain of station {station} is empty"
                )));
            }
        }

        let mut kept = StationChannels::new();
        for (station, channel) in previous {
            let Some(domain) = domains.get(&station) else {
                continue;
            };
            if !domain.contains(&channel) {
                return Err(PackingError::InvalidInstance(format!(
                    "previous channel {channel} of station {station} is outside its domain"
                )));
            }
            kept.insert(station, channel);
        }

        Ok(Self {
            domains,
            previous: kept,
            name: UNTITLED.to_string(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domains(&self) -> &Domains {
        &self.domains
    }

    pub fn domain(&self, station: Station) -> Option<&BTreeSet<Channel>> {
        self.domains.get(&station)
    }

    pub fn previous(&self) -> &StationChannels {
        &self.previous
    }

    pub fn stations(&self) -> impl Iterator<Item = Station> + '_ {
        self.domains.keys().copied()
    }

    pub fn contains(&self, station: Station) -> bool {
        self.domains.contains_key(&station)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// The sub-instance over `stations`, keeping their slice of the previous assignment.
    pub fn restrict(&self, stations: &BTreeSet<Station>) -> Instance {
        let domains = self
            .domains
            .iter()
            .filter(|(s, _)| stations.contains(s))
            .map(|(&s, d)| (s, d.clone()))
            .collect();
        let previous = self
            .previous
            .iter()
            .filter(|(s, _)| stations.contains(s))
            .map(|(&s, &c)| (s, c))
            .collect();
        Instance {
            domains,
            previous,
            name: self.name.clone(),
        }
    }

    /// `id:ch,ch;id:ch` over sorted stations and channels.
    pub fn canonical_string(&self) -> String {
        self.domains
            .iter()
            .map(|(station, domain)| {
                let channels: Vec<String> = domain.iter().map(|c| c.to_string()).collect();
                format!("{station}:{}", channels.join(","))
            })
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Content hash of the domains, stable across runs.
    pub fn hash_string(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.domains == other.domains
    }
}

impl Eq for Instance {}

impl Hash for Instance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.domains.hash(state);
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_string())
    }
}

#[cfg(test)]
pub(crate) fn domains(entries: &[(u32, &[Channel])]) -> Domains {
    entries
        .iter()
        .map(|&(s, chans)| (Station(s), chans.iter().copied().collect()))
        .collect()
}
