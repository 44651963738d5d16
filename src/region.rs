//! Region catalogue and dataset URL construction
//!
//! Dumps are published per planet, per continent and per sub-region:
//!
//! ```text
//! <base>/photon-db-planet-<ver>-latest.tar.bz2
//! <base>/<continent>/photon-db-<continent>-<ver>-latest.tar.bz2
//! <base>/<continent>/<region>/photon-db-<region>-<ver>-latest.tar.bz2
//! ```
//!
//! Each archive has a companion `.md5` file at the same URL plus `.md5`.

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Granularity of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegionKind {
    /// The whole world
    Planet,
    /// One continent
    Continent,
    /// A country or area inside a continent
    SubRegion,
}

/// A resolved region selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    /// Granularity
    pub kind: RegionKind,
    /// Catalogue name, as used in URLs
    pub name: String,
    /// Parent continent for sub-regions
    pub continent: Option<String>,
}

impl RegionInfo {
    /// The full planet dump
    pub fn planet() -> Self {
        Self {
            kind: RegionKind::Planet,
            name: "planet".to_string(),
            continent: None,
        }
    }
}

/// Maps user-supplied region selectors to catalogue entries
pub trait RegionResolver: Send + Sync {
    /// Resolve `selector`; unknown regions are configuration errors
    fn resolve(&self, selector: &str) -> Result<RegionInfo>;
}

const CONTINENTS: &[&str] = &[
    "africa",
    "asia",
    "australia-oceania",
    "europe",
    "north-america",
    "south-america",
];

const SUB_REGIONS: &[(&str, &str)] = &[
    ("algeria", "africa"),
    ("egypt", "africa"),
    ("kenya", "africa"),
    ("morocco", "africa"),
    ("nigeria", "africa"),
    ("south-africa", "africa"),
    ("china", "asia"),
    ("india", "asia"),
    ("indonesia", "asia"),
    ("israel", "asia"),
    ("japan", "asia"),
    ("south-korea", "asia"),
    ("taiwan", "asia"),
    ("thailand", "asia"),
    ("vietnam", "asia"),
    ("australia", "australia-oceania"),
    ("new-zealand", "australia-oceania"),
    ("austria", "europe"),
    ("belgium", "europe"),
    ("czech-republic", "europe"),
    ("denmark", "europe"),
    ("finland", "europe"),
    ("france", "europe"),
    ("germany", "europe"),
    ("greece", "europe"),
    ("ireland", "europe"),
    ("italy", "europe"),
    ("netherlands", "europe"),
    ("norway", "europe"),
    ("poland", "europe"),
    ("portugal", "europe"),
    ("spain", "europe"),
    ("sweden", "europe"),
    ("switzerland", "europe"),
    ("ukraine", "europe"),
    ("united-kingdom", "europe"),
    ("canada", "north-america"),
    ("mexico", "north-america"),
    ("usa", "north-america"),
    ("argentina", "south-america"),
    ("brazil", "south-america"),
    ("chile", "south-america"),
    ("colombia", "south-america"),
    ("peru", "south-america"),
];

const ALIASES: &[(&str, &str)] = &[
    ("world", "planet"),
    ("earth", "planet"),
    ("us", "usa"),
    ("united-states", "usa"),
    ("united-states-of-america", "usa"),
    ("uk", "united-kingdom"),
    ("great-britain", "united-kingdom"),
    ("oceania", "australia-oceania"),
];

/// Canonical form of a region selector: trimmed, lowercase, `-` separated
pub fn normalize_region(selector: &str) -> String {
    selector
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Catalogue compiled into the binary
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinRegions;

impl BuiltinRegions {
    /// Every selectable catalogue name
    pub fn names() -> impl Iterator<Item = &'static str> {
        std::iter::once("planet")
            .chain(CONTINENTS.iter().copied())
            .chain(SUB_REGIONS.iter().map(|(name, _)| *name))
    }
}

impl RegionResolver for BuiltinRegions {
    fn resolve(&self, selector: &str) -> Result<RegionInfo> {
        let normalized = normalize_region(selector);
        let name = ALIASES
            .iter()
            .find(|(alias, _)| *alias == normalized)
            .map(|(_, target)| (*target).to_string())
            .unwrap_or(normalized);

        if name == "planet" {
            return Ok(RegionInfo::planet());
        }

        if CONTINENTS.contains(&name.as_str()) {
            return Ok(RegionInfo {
                kind: RegionKind::Continent,
                name,
                continent: None,
            });
        }

        if let Some((_, continent)) = SUB_REGIONS.iter().find(|(sub, _)| *sub == name) {
            return Ok(RegionInfo {
                kind: RegionKind::SubRegion,
                name,
                continent: Some((*continent).to_string()),
            });
        }

        Err(Error::config("REGION", format!("Unknown region: {selector}")))
    }
}

/// Archive and checksum locations for one update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetUrls {
    /// Compressed index archive
    pub archive: String,
    /// Companion MD5 file
    pub checksum: String,
}

impl DatasetUrls {
    /// Resolve URLs from configuration; `FILE_URL` takes precedence over the region
    pub fn resolve(config: &DownloadConfig, regions: &dyn RegionResolver) -> Result<Self> {
        if let Some(file_url) = &config.file_url {
            return Ok(Self::from_archive(file_url.clone()));
        }

        let region = match &config.region {
            Some(selector) => regions.resolve(selector)?,
            None => RegionInfo::planet(),
        };

        let base = config.base_url.trim_end_matches('/');
        Ok(Self::from_archive(format!(
            "{}{}",
            base,
            archive_path(&region, &config.dataset_version)
        )))
    }

    fn from_archive(archive: String) -> Self {
        let checksum = format!("{archive}.md5");
        Self { archive, checksum }
    }
}

/// Path of a region's archive below the base URL
pub fn archive_path(region: &RegionInfo, version: &str) -> String {
    let file = format!("photon-db-{}-{}-latest.tar.bz2", region.name, version);
    match (region.kind, &region.continent) {
        (RegionKind::Planet, _) => format!("/{file}"),
        (RegionKind::Continent, _) | (RegionKind::SubRegion, None) => {
            format!("/{}/{}", region.name, file)
        }
        (RegionKind::SubRegion, Some(continent)) => {
            format!("/{}/{}/{}", continent, region.name, file)
        }
    }
}
