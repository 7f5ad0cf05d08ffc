//! Trip-data run configuration

use std::path::PathBuf;

use crate::work_item::{self, LookupTable, Service, WorkItem};

pub const DEFAULT_ARCHIVE_BASE_URL: &str =
    "https://github.com/DataTalksClub/nyc-tlc-data/releases/download";
pub const DEFAULT_LOOKUP_URL: &str =
    "https://d37ci6vzurychx.cloudfront.net/misc/taxi_zone_lookup.csv";

/// Which monthly files a run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every service of every year
    Grid {
        years: Vec<String>,
        services: Vec<Service>,
    },
    /// Explicit (year, service) pairs
    Pairs(Vec<(String, Service)>),
}

impl Selection {
    pub fn work_items(&self) -> Vec<WorkItem> {
        match self {
            Self::Grid { years, services } => work_item::enumerate(years, services),
            Self::Pairs(pairs) => work_item::enumerate_pairs(pairs),
        }
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::Grid {
            years: vec!["2019".to_string(), "2020".to_string()],
            services: vec![Service::Green],
        }
    }
}

/// Runtime configuration for one batch run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Destination bucket
    pub bucket: String,
    /// Base URL of the monthly trip archive
    pub archive_base_url: String,
    /// Zone lookup CSV
    pub lookup_url: String,
    /// Where downloads and conversions live while in flight
    pub scratch_dir: PathBuf,
    pub selection: Selection,
}

impl RunConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            archive_base_url: DEFAULT_ARCHIVE_BASE_URL.to_string(),
            lookup_url: DEFAULT_LOOKUP_URL.to_string(),
            scratch_dir: std::env::temp_dir().join("tripline"),
            selection: Selection::default(),
        }
    }

    pub fn lookup_table(&self) -> LookupTable {
        LookupTable::from_url(&self.lookup_url)
    }
}
