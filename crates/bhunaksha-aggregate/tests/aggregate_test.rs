//! Aggregation over tables written by the crawler's output store.

use bhunaksha_aggregate::{aggregate_district, categorize, write_csv, AggregateError, Category};
use bhunaksha_core::{ItemResult, ParcelRecord};
use bhunaksha_crawler::OutputStore;
use proptest::prelude::*;
use std::fs;
use tempfile::TempDir;

const DISTRICT: &str = "07 अमरावती";

fn parcel(survey_no: &str, area: &str) -> ParcelRecord {
    ParcelRecord {
        survey_no: survey_no.to_string(),
        total_area: area.to_string(),
        pot_kharaba: "0.00".to_string(),
        owner_name: "Patil".to_string(),
        khata_no: "1".to_string(),
    }
}

fn table(parcels: &[(&str, &str)]) -> ItemResult {
    parcels.iter().map(|(s, a)| parcel(s, a)).collect()
}

#[test]
fn test_district_rows_and_combined_table() {
    let tmp = TempDir::new().expect("temp dir");
    let store = OutputStore::new(tmp.path());
    store
        .write(
            DISTRICT,
            "03 Achalpur",
            "27070100 Wadgaon",
            &table(&[("1", "0.99"), ("2", "1.0"), ("3", "9.999"), ("4", "10.0"), ("5", "n/a")]),
        )
        .expect("write Wadgaon");
    store
        .write(DISTRICT, "03 Achalpur", "27070200 Kandli", &table(&[("7", "0.25"), ("8", "0.50")]))
        .expect("write Kandli");
    store
        .write(DISTRICT, "05 Daryapur", "27090300 Yeoda", &ItemResult::new())
        .expect("write Yeoda");
    store
        .write(DISTRICT, "05 Daryapur", "unnamed", &ItemResult::new())
        .expect("write unnamed");

    let rows = aggregate_district(&store.district_dir(DISTRICT)).expect("aggregate");
    assert_eq!(rows.len(), 3);

    let kandli = &rows[1];
    assert_eq!(kandli.village_code, "270702");
    assert_eq!(kandli.village_name, "Kandli");
    assert_eq!(kandli.taluka_name, "Achalpur");
    assert_eq!(kandli.totals.count(Category::Marginal), 2);
    assert!((kandli.totals.sum(Category::Marginal) - 0.75).abs() < 1e-9);

    let wadgaon = &rows[0];
    assert_eq!(wadgaon.village_code, "270701");
    assert_eq!(wadgaon.totals.count(Category::Marginal), 1);
    assert_eq!(wadgaon.totals.count(Category::Small), 1);
    assert_eq!(wadgaon.totals.count(Category::SemiMedium), 0);
    assert_eq!(wadgaon.totals.count(Category::Medium), 1);
    assert_eq!(wadgaon.totals.count(Category::Large), 1);

    let yeoda = &rows[2];
    assert_eq!(yeoda.taluka_name, "Daryapur");
    assert!(Category::ALL.iter().all(|c| yeoda.totals.count(*c) == 0));

    let output = tmp.path().join("out").join("district_data.csv");
    write_csv(&rows, &output).expect("write combined table");

    let contents = fs::read_to_string(&output).expect("combined table");
    let contents = contents.trim_start_matches('\u{feff}');
    let mut reader = csv::Reader::from_reader(contents.as_bytes());
    let headers = reader.headers().expect("headers").clone();
    assert_eq!(&headers[0], "village_code");
    assert_eq!(&headers[5], "Semi-medium");
    assert_eq!(&headers[12], "Large_count");

    let records: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>().expect("rows");
    assert_eq!(records.len(), 3);
    assert_eq!(&records[0][0], "270701");
    assert_eq!(&records[0][12], "1");
    assert_eq!(&records[1][1], "Kandli");
}

#[test]
fn test_escaped_folder_and_file_names_read_back_as_labels() {
    let tmp = TempDir::new().expect("temp dir");
    let store = OutputStore::new(tmp.path());
    store
        .write(DISTRICT, "04 Chandur/Bazar", "27080100 Shirala/Kh", &table(&[("1", "5.0")]))
        .expect("write Shirala/Kh");
    store
        .write(DISTRICT, "04 Chandur/Bazar", "27080200 Shirala_Kh", &table(&[("2", "0.5")]))
        .expect("write Shirala_Kh");

    let rows = aggregate_district(&store.district_dir(DISTRICT)).expect("aggregate");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].village_name, "Shirala/Kh");
    assert_eq!(rows[0].village_code, "270801");
    assert_eq!(rows[0].taluka_name, "Chandur/Bazar");
    assert_eq!(rows[0].totals.count(Category::Medium), 1);
    assert_eq!(rows[1].village_name, "Shirala_Kh");
    assert_eq!(rows[1].totals.count(Category::Marginal), 1);
}

#[test]
fn test_missing_root_is_an_error() {
    let tmp = TempDir::new().expect("temp dir");
    let result = aggregate_district(&tmp.path().join("absent"));
    assert!(matches!(result, Err(AggregateError::NotADirectory(_))));
}

proptest! {
    #[test]
    fn every_non_negative_area_lands_in_its_range(area in 0.0f64..1.0e6) {
        let category = categorize(area).expect("ranges cover [0, inf)");
        let (low, high) = category.bounds();
        prop_assert!(low <= area && area < high);
    }
}
