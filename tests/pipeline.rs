use incident_report::data::schema::BORO;
use incident_report::data::{is_normalized_column, DataSource, Incident};
use incident_report::report::{JSON_FILE, MARKDOWN_FILE};
use incident_report::{pipeline, ModelOutcome, ReportConfig};
use std::collections::HashMap;
use std::io::Write;

const CSV: &str = "\
INCIDENT_KEY,OCCUR_DATE,OCCUR_TIME,BORO,PRECINCT,JURISDICTION_CODE,LOCATION_DESC,STATISTICAL_MURDER_FLAG,PERP_AGE_GROUP,PERP_SEX,PERP_RACE,VIC_AGE_GROUP,VIC_SEX,VIC_RACE,X_COORD_CD,Y_COORD_CD,Latitude,Longitude
1,08/27/2006,05:35:00,BRONX,52,0,,true,,,,25-44,M,BLACK,1015120,257303,40.8679,-73.8851
2,03/11/2006,12:10:00,QUEENS,106,0,,false,18-24,M,WHITE HISPANIC,18-24,M,WHITE HISPANIC,1037451,187145,40.6759,-73.8065
3,10/06/2019,01:09:00,BRONX,42,0,PVT HOUSE,false,(null),(null),(null),<18,M,BLACK,1010924,243265,40.8294,-73.9003
4,01/27/2021,21:38:00,BROOKLYN,77,2,MULTI DWELL - PUBLIC HOUS,true,1020,M,BLACK,45-64,F,BLACK,1003016,182950,40.6739,-73.9291
";

fn write_csv(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn config_for(csv: &tempfile::NamedTempFile, out: &std::path::Path) -> ReportConfig {
    ReportConfig {
        source: DataSource::File(csv.path().to_path_buf()),
        output_dir: out.to_path_buf(),
        render_charts: false,
        ..ReportConfig::default()
    }
}

#[test]
fn test_end_to_end_counts() {
    let csv = write_csv(CSV);
    let out = tempfile::tempdir().unwrap();
    let config = config_for(&csv, out.path());

    let report = pipeline::run(&config).unwrap();

    assert_eq!(report.rows_loaded, 4);
    assert_eq!(report.rows_kept, 4);
    assert_eq!(report.rows_rejected, 0);

    assert_eq!(report.by_borough.column, BORO);
    assert_eq!(report.by_borough.get("BRONX"), Some(2));
    assert_eq!(report.by_borough.get("QUEENS"), Some(1));
    assert_eq!(report.by_borough.get("BROOKLYN"), Some(1));
    assert_eq!(report.by_borough.get("MANHATTAN"), None);
    assert_eq!(report.by_borough.total(), 4);

    let years: Vec<(&str, usize)> = report
        .by_year
        .iter()
        .map(|g| (g.key.as_str(), g.count))
        .collect();
    assert_eq!(years, vec![("2006", 2), ("2019", 1), ("2021", 1)]);

    let bronx = report
        .murder_share_by_borough
        .iter()
        .find(|r| r.key == "BRONX")
        .unwrap();
    assert_eq!((bronx.total, bronx.flagged), (2, 1));

    for model in &report.models {
        assert!(matches!(model.outcome, ModelOutcome::Failed { .. }));
    }

    assert!(out.path().join(MARKDOWN_FILE).exists());
    assert!(out.path().join(JSON_FILE).exists());
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.path().join(JSON_FILE)).unwrap())
            .unwrap();
    assert_eq!(json["rows_kept"], 4);
    assert_eq!(json["by_year"].as_array().unwrap().len(), 3);
    assert!(json["charts"].as_array().unwrap().is_empty());
}

#[test]
fn test_rejected_rows_are_reported() {
    let broken = CSV.replace("03/11/2006", "2006-03-11");
    let csv = write_csv(&broken);
    let out = tempfile::tempdir().unwrap();

    let report = pipeline::run(&config_for(&csv, out.path())).unwrap();
    assert_eq!(report.rows_loaded, 4);
    assert_eq!(report.rows_kept, 3);
    assert_eq!(report.rows_rejected, 1);
    assert_eq!(report.by_borough.get("QUEENS"), None);

    let strict = ReportConfig {
        strict: true,
        ..config_for(&csv, out.path())
    };
    let err = pipeline::run(&strict).unwrap_err();
    assert!(format!("{:#}", err).contains("OCCUR_DATE"));
}

#[test]
fn test_missing_header_fails() {
    let without_boro = CSV.replace(",BORO,", ",BOROUGH,");
    let csv = write_csv(&without_boro);
    let out = tempfile::tempdir().unwrap();

    let err = pipeline::run(&config_for(&csv, out.path())).unwrap_err();
    assert!(format!("{:#}", err).contains(BORO));
    assert!(!out.path().join(MARKDOWN_FILE).exists());
}

#[test]
fn test_year_column_matches_dates() {
    let csv = write_csv(CSV);
    let out = tempfile::tempdir().unwrap();
    let report = pipeline::run(&config_for(&csv, out.path())).unwrap();
    let total: usize = report.by_year.iter().map(|g| g.count).sum();
    assert_eq!(total, report.rows_kept);
    assert!(report.by_year.iter().all(|g| g.key.parse::<i32>().is_ok()));
    assert!(report
        .by_hour
        .iter()
        .all(|g| (0..24).contains(&g.key.parse::<i32>().unwrap())));
}

#[test]
fn test_round_trip_of_canonical_rows() {
    let mut lines = CSV.lines();
    let headers: Vec<&str> = lines.next().unwrap().split(',').collect();

    for line in lines {
        let values: Vec<&str> = line.split(',').collect();
        let row: HashMap<&str, &str> = headers.iter().copied().zip(values).collect();
        let incident = Incident::from_fields(|c| row.get(c).copied()).unwrap();

        for (column, text) in incident.to_fields() {
            let original = row[column];
            let missing = original.is_empty() || original == "(null)";
            if is_normalized_column(column) || missing {
                continue;
            }
            assert_eq!(text, original, "column {column} changed");
        }
    }
}
