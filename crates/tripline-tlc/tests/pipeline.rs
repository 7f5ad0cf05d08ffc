//! Batch behavior with an in-process archive and object store.
//!
//! The fetcher and (failing) uploader are fakes; conversion is real.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use parquet::file::reader::{FileReader, SerializedFileReader};
use tempfile::TempDir;
use tripline_core::{
    CsvToParquet, FetchError, Fetcher, ObjectStoreUploader, RemoteObjectRef, ScratchSpace,
    StoreBackend, Uploader,
};
use tripline_tlc::{
    ItemError, ItemState, Outcome, Pipeline, RunConfig, Selection, Service, Summary, run,
};

const ARCHIVE: &str = "http://archive.test/releases/download";
const LOOKUP_URL: &str = "http://archive.test/misc/taxi_zone_lookup.csv";

const TRIPS: &str = "\
VendorID,lpep_pickup_datetime,lpep_dropoff_datetime,passenger_count,trip_distance,fare_amount
2,2019-01-01 00:10:16,2019-01-01 00:16:32,1,0.86,6.0
1,2019-01-01 00:27:11,2019-01-01 00:31:38,1,0.66,4.5
2,2019-01-01 00:46:20,2019-01-01 01:04:54,,2.68,13.5
";

const ZONES: &str = "\
LocationID,Borough,Zone,service_zone
1,EWR,Newark Airport,EWR
2,Queens,Jamaica Bay,Boro Zone
";

/// How the fake archive answers one URL
#[derive(Clone)]
enum Reply {
    NotFound,
    /// Writes some bytes, then the connection drops
    Drop,
    Body(Vec<u8>),
    Panic,
}

fn gzip(text: &str) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(text.as_bytes()).unwrap();
    enc.finish().unwrap()
}

/// Serves every trip URL with a small gzipped month unless overridden
#[derive(Default)]
struct FakeArchive {
    overrides: HashMap<String, Reply>,
    requests: RefCell<Vec<String>>,
}

impl FakeArchive {
    fn with(mut self, url: String, reply: Reply) -> Self {
        self.overrides.insert(url, reply);
        self
    }
}

impl Fetcher for FakeArchive {
    fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf, FetchError> {
        self.requests.borrow_mut().push(url.to_string());
        let reply = self.overrides.get(url).cloned().unwrap_or_else(|| {
            if url.ends_with(".csv.gz") {
                Reply::Body(gzip(TRIPS))
            } else {
                Reply::Body(ZONES.as_bytes().to_vec())
            }
        });
        match reply {
            Reply::NotFound => Err(FetchError::from_status(url, 404)),
            Reply::Drop => {
                fs::write(dest, b"\x1f\x8b partial")?;
                Err(FetchError::Transport {
                    status: None,
                    message: "connection reset".to_string(),
                })
            }
            Reply::Body(bytes) => {
                fs::write(dest, bytes)?;
                Ok(dest.to_path_buf())
            }
            Reply::Panic => panic!("fetcher blew up on {url}"),
        }
    }
}

/// Store that never acknowledges a write; records what it saw on disk
struct RejectingStore {
    scratch_dir: PathBuf,
    seen: RefCell<Vec<Vec<PathBuf>>>,
}

impl Uploader for RejectingStore {
    fn upload(&self, local_path: &Path, _destination: &RemoteObjectRef) -> bool {
        assert!(local_path.exists());
        self.seen
            .borrow_mut()
            .push(ScratchSpace::new(&self.scratch_dir).list().unwrap());
        false
    }
}

struct Env {
    _tmp: TempDir,
    store_root: PathBuf,
    config: RunConfig,
}

impl Env {
    fn new(selection: Selection) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = RunConfig::new("trips");
        config.archive_base_url = ARCHIVE.to_string();
        config.lookup_url = LOOKUP_URL.to_string();
        config.scratch_dir = tmp.path().join("scratch");
        config.selection = selection;
        Self {
            store_root: tmp.path().join("store"),
            _tmp: tmp,
            config,
        }
    }

    fn scratch(&self) -> ScratchSpace {
        ScratchSpace::new(&self.config.scratch_dir)
    }

    fn store(&self) -> ObjectStoreUploader {
        ObjectStoreUploader::new(StoreBackend::Fs {
            root: self.store_root.clone(),
        })
    }

    fn object(&self, path: &str) -> PathBuf {
        self.store_root.join("trips").join(path)
    }

    fn run_with<U: Uploader>(&self, archive: &FakeArchive, uploader: U) -> Summary {
        let pipeline = Pipeline::new(archive, CsvToParquet::new(1), uploader, self.scratch());
        run(&self.config, &pipeline).unwrap()
    }
}

fn green(years: &[&str]) -> Selection {
    Selection::Grid {
        years: years.iter().map(|y| y.to_string()).collect(),
        services: vec![Service::Green],
    }
}

fn trip_url(service: &str, year: &str, month: u8) -> String {
    format!("{ARCHIVE}/{service}/{service}_tripdata_{year}-{month:02}.csv.gz")
}

fn parquet_rows(path: &Path) -> i64 {
    let reader = SerializedFileReader::new(File::open(path).unwrap()).unwrap();
    reader.metadata().file_metadata().num_rows()
}

#[test]
fn missing_month_is_skipped_and_batch_continues() {
    let env = Env::new(green(&["2019", "2020"]));
    let archive = FakeArchive::default().with(trip_url("green", "2019", 2), Reply::NotFound);

    let summary = env.run_with(&archive, env.store());

    assert_eq!(summary.total_items, 25);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.done, 24);
    assert_eq!(summary.labels_in(ItemState::Skipped), vec!["green/2019-02"]);
    assert_eq!(summary.rows_written, 23 * 3 + 2);

    // Every month of both years was still attempted, in order, lookup last
    let requests = archive.requests.borrow();
    assert_eq!(requests.len(), 25);
    assert_eq!(requests[0], trip_url("green", "2019", 1));
    assert_eq!(requests[2], trip_url("green", "2019", 3));
    assert_eq!(requests[23], trip_url("green", "2020", 12));
    assert_eq!(requests[24], LOOKUP_URL);

    assert!(env.scratch().list().unwrap().is_empty());
    assert!(!env.object("green/2019/green_tripdata_2019-02.parquet").exists());
    assert_eq!(
        parquet_rows(&env.object("green/2020/green_tripdata_2020-03.parquet")),
        3
    );
    assert_eq!(parquet_rows(&env.object("taxi_zone_lookup.parquet")), 2);
}

#[test]
fn skipped_item_trace() {
    let env = Env::new(green(&["2019"]));
    let archive = FakeArchive::default().with(trip_url("green", "2019", 1), Reply::NotFound);

    let summary = env.run_with(&archive, env.store());

    let report = &summary.reports[0];
    assert!(matches!(report.outcome, Outcome::Skipped { .. }));
    assert_eq!(
        report.trace,
        vec![
            ItemState::Pending,
            ItemState::Downloading,
            ItemState::CleaningUp,
            ItemState::Skipped
        ]
    );
    assert_eq!(
        summary.reports[1].trace,
        vec![
            ItemState::Pending,
            ItemState::Downloading,
            ItemState::Converting,
            ItemState::Uploading,
            ItemState::CleaningUp,
            ItemState::Done
        ]
    );
}

#[test]
fn failed_item_does_not_affect_neighbours() {
    let env = Env::new(green(&["2019"]));
    let archive = FakeArchive::default()
        .with(trip_url("green", "2019", 4), Reply::Drop)
        .with(trip_url("green", "2019", 7), Reply::Panic)
        .with(
            trip_url("green", "2019", 10),
            Reply::Body(gzip("a,b,c\n1,2,3\n4,5\n")),
        );

    let summary = env.run_with(&archive, env.store());

    assert_eq!(
        summary.labels_in(ItemState::Failed),
        vec!["green/2019-04", "green/2019-07", "green/2019-10"]
    );
    for i in [2, 4, 5, 7, 8, 10] {
        assert_eq!(summary.reports[i].state(), ItemState::Done, "item {i}");
    }
    assert!(matches!(
        summary.reports[3].outcome,
        Outcome::Failed(ItemError::Fetch(FetchError::Transport { .. }))
    ));
    assert!(matches!(
        summary.reports[6].outcome,
        Outcome::Failed(ItemError::Panic(_))
    ));
    assert!(matches!(
        summary.reports[9].outcome,
        Outcome::Failed(ItemError::Convert(_))
    ));
    assert_eq!(summary.done, 10);

    // Partial downloads, half-converted files and the panicking item leave nothing behind
    assert!(env.scratch().list().unwrap().is_empty());
}

#[test]
fn failed_upload_keeps_converted_file_only() {
    let env = Env::new(green(&["2019", "2020"]));
    let store = RejectingStore {
        scratch_dir: env.config.scratch_dir.clone(),
        seen: RefCell::new(Vec::new()),
    };

    let summary = env.run_with(&FakeArchive::default(), &store);

    assert_eq!(summary.failed, 25);
    assert_eq!(summary.done, 0);
    assert_eq!(summary.retained.len(), 25);
    for report in &summary.reports {
        assert!(matches!(
            report.outcome,
            Outcome::Failed(ItemError::Upload { .. })
        ));
    }

    let mut expected: Vec<PathBuf> = (1..=12)
        .flat_map(|m| {
            ["2019", "2020"].map(|y| {
                env.config
                    .scratch_dir
                    .join(format!("green_tripdata_{y}-{m:02}.parquet"))
            })
        })
        .chain([env.config.scratch_dir.join("taxi_zone_lookup.parquet")])
        .collect();
    expected.sort();
    assert_eq!(env.scratch().list().unwrap(), expected);

    // The raw download was already gone when the upload started
    let seen = store.seen.borrow();
    let first = &seen[0];
    assert_eq!(
        first,
        &vec![
            env.config
                .scratch_dir
                .join("green_tripdata_2019-01.parquet")
        ]
    );
}

#[test]
fn rerun_after_failed_upload_replaces_retained_file() {
    let env = Env::new(green(&["2019"]));
    let stale = env.config.scratch_dir.join("green_tripdata_2019-01.parquet");
    fs::create_dir_all(&env.config.scratch_dir).unwrap();
    fs::write(&stale, b"from an earlier run").unwrap();
    fs::write(
        env.config.scratch_dir.join("green_tripdata_2019-05.parquet.tmp"),
        b"killed mid-write",
    )
    .unwrap();

    let summary = env.run_with(&FakeArchive::default(), env.store());

    assert_eq!(summary.done, 13);
    assert!(env.scratch().list().unwrap().is_empty());
    assert_eq!(
        parquet_rows(&env.object("green/2019/green_tripdata_2019-01.parquet")),
        3
    );
}

#[test]
fn explicit_pairs_run_in_given_order() {
    let env = Env::new(Selection::Pairs(vec![
        ("2020".to_string(), Service::Yellow),
        ("2020".to_string(), Service::Green),
    ]));

    let archive = FakeArchive::default();
    let summary = env.run_with(&archive, env.store());

    assert_eq!(summary.done, 25);
    let requests = archive.requests.borrow();
    assert_eq!(requests[0], trip_url("yellow", "2020", 1));
    assert_eq!(requests[12], trip_url("green", "2020", 1));
    assert!(env.object("yellow/2020/yellow_tripdata_2020-12.parquet").exists());
}
