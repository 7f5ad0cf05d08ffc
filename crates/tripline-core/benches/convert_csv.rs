use std::fmt::Write as _;
use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use tripline_core::{Converter, CsvToParquet, SourceCompression};

fn synthetic_month(rows: usize) -> String {
    let mut csv = String::from(
        "VendorID,lpep_pickup_datetime,lpep_dropoff_datetime,passenger_count,trip_distance,PULocationID,DOLocationID,fare_amount\n",
    );
    for i in 0..rows {
        let _ = writeln!(
            csv,
            "{},2019-01-01 00:{:02}:{:02},2019-01-01 01:{:02}:{:02},{},{:.2},{},{},{:.2}",
            1 + i % 2,
            i % 60,
            i % 59,
            i % 60,
            i % 58,
            1 + i % 6,
            (i % 170) as f64 / 10.0,
            1 + i % 265,
            1 + (i * 7) % 265,
            (i % 900) as f64 / 10.0,
        );
    }
    csv
}

#[divan::bench(args = [1, 3, 9])]
fn convert_gzip_csv(bencher: divan::Bencher, zstd_level: i32) {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("green_tripdata_2019-01.csv.gz");
    let mut enc = GzEncoder::new(std::fs::File::create(&src).unwrap(), Compression::default());
    enc.write_all(synthetic_month(50_000).as_bytes()).unwrap();
    enc.finish().unwrap();

    let out = dir.path().join("green_tripdata_2019-01.parquet");
    let converter = CsvToParquet::new(zstd_level);
    bencher.bench(|| {
        converter
            .convert(&src, SourceCompression::Gzip, &out)
            .unwrap();
    });
}

fn main() {
    divan::main();
}
