//! Units of ingestion work and their deterministic names

use serde::Deserialize;
use tripline_core::{RemoteObjectRef, SourceCompression};

/// Taxi service whose trip records are archived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Green,
    Yellow,
}

impl Service {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (service, year, month) file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub service: Service,
    pub year: String,
    /// 1..=12
    pub month: u8,
}

impl WorkItem {
    pub fn new(service: Service, year: impl Into<String>, month: u8) -> Self {
        debug_assert!((1..=12).contains(&month), "month out of range: {month}");
        Self {
            service,
            year: year.into(),
            month,
        }
    }

    /// `green/2019-02`
    pub fn label(&self) -> String {
        format!("{}/{}-{:02}", self.service, self.year, self.month)
    }

    /// `green_tripdata_2019-02`
    fn stem(&self) -> String {
        format!("{}_tripdata_{}-{:02}", self.service, self.year, self.month)
    }

    pub fn source_file_name(&self) -> String {
        format!("{}.csv.gz", self.stem())
    }

    pub fn output_file_name(&self) -> String {
        format!("{}.parquet", self.stem())
    }

    /// `{archive_base}/{service}/{service}_tripdata_{year}-{month:02}.csv.gz`
    pub fn source_url(&self, archive_base: &str) -> String {
        format!(
            "{}/{}/{}",
            archive_base.trim_end_matches('/'),
            self.service,
            self.source_file_name()
        )
    }

    /// `{service}/{year}/{service}_tripdata_{year}-{month:02}.parquet`
    pub fn destination_path(&self) -> String {
        format!("{}/{}/{}", self.service, self.year, self.output_file_name())
    }

    pub fn job(&self, archive_base: &str, bucket: &str) -> Job {
        Job {
            label: self.label(),
            url: self.source_url(archive_base),
            compression: SourceCompression::Gzip,
            raw_name: self.source_file_name(),
            output_name: self.output_file_name(),
            destination: RemoteObjectRef::new(bucket, self.destination_path()),
        }
    }
}

/// All months of the given years × services.
///
/// Years outer, services inner, months 1..=12 innermost.
pub fn enumerate(years: &[String], services: &[Service]) -> Vec<WorkItem> {
    years
        .iter()
        .flat_map(|year| {
            services.iter().flat_map(move |&service| {
                (1..=12).map(move |month| WorkItem::new(service, year.clone(), month))
            })
        })
        .collect()
}

/// All months of explicit (year, service) pairs, in the given order.
pub fn enumerate_pairs(pairs: &[(String, Service)]) -> Vec<WorkItem> {
    pairs
        .iter()
        .flat_map(|(year, service)| {
            (1..=12).map(move |month| WorkItem::new(*service, year.clone(), month))
        })
        .collect()
}

/// Static zone lookup table, stored at the bucket root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTable {
    pub url: String,
    /// e.g. `taxi_zone_lookup.csv`
    pub file_name: String,
}

impl LookupTable {
    pub const DEFAULT_FILE_NAME: &'static str = "taxi_zone_lookup.csv";

    /// File name is the last URL path segment, query string stripped.
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file_name = path
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty() && !s.contains(':'))
            .unwrap_or(Self::DEFAULT_FILE_NAME);
        Self {
            url: url.to_string(),
            file_name: file_name.to_string(),
        }
    }

    /// Name without extensions: `taxi_zone_lookup`
    pub fn basename(&self) -> &str {
        self.file_name
            .split_once('.')
            .map_or(self.file_name.as_str(), |(stem, _)| stem)
    }

    pub fn output_file_name(&self) -> String {
        format!("{}.parquet", self.basename())
    }

    pub fn job(&self, bucket: &str) -> Job {
        Job {
            label: format!("lookup/{}", self.basename()),
            url: self.url.clone(),
            compression: SourceCompression::from_file_name(&self.file_name),
            raw_name: self.file_name.clone(),
            output_name: self.output_file_name(),
            destination: RemoteObjectRef::new(bucket, self.output_file_name()),
        }
    }
}

/// Everything the pipeline needs to move one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// For logs: `green/2019-02`, `lookup/taxi_zone_lookup`
    pub label: String,
    pub url: String,
    pub compression: SourceCompression,
    /// Scratch file name of the download
    pub raw_name: String,
    /// Scratch file name of the columnar output
    pub output_name: String,
    pub destination: RemoteObjectRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://github.com/DataTalksClub/nyc-tlc-data/releases/download";

    #[test]
    fn destination_path_is_deterministic() {
        let item = WorkItem::new(Service::Green, "2020", 3);
        assert_eq!(
            item.destination_path(),
            "green/2020/green_tripdata_2020-03.parquet"
        );
    }

    #[test]
    fn source_url_pads_month() {
        let item = WorkItem::new(Service::Yellow, "2019", 11);
        assert_eq!(
            item.source_url(BASE),
            format!("{BASE}/yellow/yellow_tripdata_2019-11.csv.gz")
        );
        let item = WorkItem::new(Service::Green, "2019", 2);
        assert_eq!(
            item.source_url(&format!("{BASE}/")),
            format!("{BASE}/green/green_tripdata_2019-02.csv.gz")
        );
    }

    #[test]
    fn job_carries_names_and_destination() {
        let job = WorkItem::new(Service::Green, "2019", 2).job(BASE, "trips");
        assert_eq!(job.label, "green/2019-02");
        assert_eq!(job.raw_name, "green_tripdata_2019-02.csv.gz");
        assert_eq!(job.output_name, "green_tripdata_2019-02.parquet");
        assert_eq!(job.compression, SourceCompression::Gzip);
        assert_eq!(
            job.destination,
            RemoteObjectRef::new("trips", "green/2019/green_tripdata_2019-02.parquet")
        );
    }

    #[test]
    fn enumerate_order_years_services_months() {
        let items = enumerate(
            &["2019".to_string(), "2020".to_string()],
            &[Service::Green, Service::Yellow],
        );
        assert_eq!(items.len(), 48);
        assert_eq!(items[0], WorkItem::new(Service::Green, "2019", 1));
        assert_eq!(items[11], WorkItem::new(Service::Green, "2019", 12));
        assert_eq!(items[12], WorkItem::new(Service::Yellow, "2019", 1));
        assert_eq!(items[24], WorkItem::new(Service::Green, "2020", 1));
        assert_eq!(items[47], WorkItem::new(Service::Yellow, "2020", 12));
    }

    #[test]
    fn enumerate_pairs_keeps_pair_order() {
        let items = enumerate_pairs(&[
            ("2020".to_string(), Service::Yellow),
            ("2020".to_string(), Service::Green),
        ]);
        assert_eq!(items.len(), 24);
        assert_eq!(items[0].service, Service::Yellow);
        assert_eq!(items[12], WorkItem::new(Service::Green, "2020", 1));
    }

    #[test]
    fn lookup_job_at_bucket_root() {
        let lookup =
            LookupTable::from_url("https://d37ci6vzurychx.cloudfront.net/misc/taxi_zone_lookup.csv");
        assert_eq!(lookup.file_name, "taxi_zone_lookup.csv");
        let job = lookup.job("trips");
        assert_eq!(job.label, "lookup/taxi_zone_lookup");
        assert_eq!(job.compression, SourceCompression::None);
        assert_eq!(job.output_name, "taxi_zone_lookup.parquet");
        assert_eq!(job.destination.path, "taxi_zone_lookup.parquet");
    }

    #[test]
    fn lookup_file_name_fallbacks() {
        assert_eq!(
            LookupTable::from_url("https://host/zones.csv.gz?sig=abc").file_name,
            "zones.csv.gz"
        );
        assert_eq!(
            LookupTable::from_url("https://host/").file_name,
            LookupTable::DEFAULT_FILE_NAME
        );
        assert_eq!(
            LookupTable::from_url("https://host/zones.csv.gz").job("b").compression,
            SourceCompression::Gzip
        );
    }
}
