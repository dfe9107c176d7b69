use httpmock::prelude::*;
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::PolygonRing;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;
use wnv_outbreak::app::inputs::{ConfiguredInputs, PromptInputs};
use wnv_outbreak::domain::model::LinearUnit;
use wnv_outbreak::{OutbreakWorkflow, WnvConfig, WorkflowOptions};

// Clockwise ring, as shapefiles store outer rings.
fn write_square_shapefile(path: &Path, min_x: f64, min_y: f64, max_x: f64, max_y: f64) {
    let table = TableWriterBuilder::new()
        .add_character_field(FieldName::try_from("NAME").unwrap(), 20);
    let mut writer = shapefile::Writer::from_path(path, table).unwrap();

    let ring = PolygonRing::Outer(vec![
        shapefile::Point::new(min_x, min_y),
        shapefile::Point::new(min_x, max_y),
        shapefile::Point::new(max_x, max_y),
        shapefile::Point::new(max_x, min_y),
        shapefile::Point::new(min_x, min_y),
    ]);
    let polygon = shapefile::Polygon::new(ring);

    let mut record = Record::default();
    record.insert(
        "NAME".to_string(),
        FieldValue::Character(Some("site".to_string())),
    );
    writer
        .write_shape_and_record(&polygon, &record)
        .unwrap();
}

fn write_addresses_geojson(path: &Path) {
    let points = [
        ("100 Wetland Ct", -105.295, 40.005),
        ("200 Overlap Ave", -105.285, 40.005),
        ("300 Lakeside Dr", -105.275, 40.005),
        ("900 Far Away Rd", -105.200, 40.100),
    ];
    let features: Vec<serde_json::Value> = points
        .iter()
        .map(|(address, x, y)| {
            serde_json::json!({
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [x, y]},
                "properties": {"ADDRESS": address}
            })
        })
        .collect();
    let collection = serde_json::json!({"type": "FeatureCollection", "features": features});
    std::fs::write(path, collection.to_string()).unwrap();
}

fn setup(temp_dir: &TempDir, server: &MockServer) -> WnvConfig {
    let data_dir = temp_dir.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    write_square_shapefile(&data_dir.join("Wetlands.shp"), -105.30, 40.00, -105.28, 40.01);
    write_square_shapefile(&data_dir.join("Lakes.shp"), -105.29, 40.00, -105.27, 40.01);
    write_addresses_geojson(&data_dir.join("Addresses.geojson"));

    let root = temp_dir.path().display();
    let toml = format!(
        r#"
[project]
name = "integration"
data_dir = "{root}/data"
workspace = "{root}/workspace"
output_dir = "{root}/output"

[layers]
concern = ["Wetlands", "Lakes"]
addresses = "Addresses"
avoid_points = "avoid_points"

[buffer]
default_distance = 100.0
default_unit = "Meters"

[etl]
remote_url = "{sheet}"
geocoder_prefix_url = "{geocoder}"
geocoder_suffix_url = "&format=json"
address_suffix = " Boulder CO"
timeout_seconds = 5

[map]
title = "WNV Integration Map"
filename = "spray_map.pdf"
"#,
        sheet = server.url("/sheet.csv"),
        geocoder = server.url("/geocoder?address="),
    );

    let config_path = temp_dir.path().join("wnv.toml");
    std::fs::write(&config_path, toml).unwrap();
    let config = WnvConfig::from_file(&config_path).unwrap();
    config.validate_config().unwrap();
    config
}

#[tokio::test]
async fn test_end_to_end_workflow_with_opt_out_etl() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start();

    let sheet_mock = server.mock(|when, then| {
        when.method(GET).path("/sheet.csv");
        then.status(200)
            .header("Content-Type", "text/csv")
            .body("Timestamp,Street Address\n5/1/2024 10:00:00,1 Opt Out Way\n5/1/2024 10:05:00,404 Missing Rd\n");
    });
    let hit_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/geocoder")
            .query_param("address", "1 Opt Out Way Boulder CO");
        then.status(200).json_body(serde_json::json!({
            "result": {"addressMatches": [{"coordinates": {"x": -105.2951, "y": 40.0051}}]}
        }));
    });
    let miss_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/geocoder")
            .query_param("address", "404 Missing Rd Boulder CO");
        then.status(200)
            .json_body(serde_json::json!({"result": {"addressMatches": []}}));
    });

    let config = setup(&temp_dir, &server);
    let report = OutbreakWorkflow::new(config, ConfiguredInputs, WorkflowOptions::default())
        .run()
        .await?;

    sheet_mock.assert();
    hit_mock.assert();
    miss_mock.assert();

    assert_eq!(report.addresses_in_concern, 3);
    assert_eq!(report.opt_out_points, 1);
    assert_eq!(report.addresses_to_notify, 2);
    assert!(report.concern_area_sq_meters > 0.0);
    assert!(report.steps.iter().any(|s| s.name == "etl" && s.feature_count == 1));

    let output = temp_dir.path().join("output");
    assert!(output.join("addresses.csv").exists());
    let geocoded = std::fs::read_to_string(output.join("new_addresses.csv"))?;
    assert_eq!(geocoded, "X,Y,Type\n-105.2951,40.0051,Residential\n");

    let pdf = std::fs::read(output.join("spray_map.pdf"))?;
    assert!(pdf.starts_with(b"%PDF-"));
    assert!(contains(&pdf, b"address_in_concern_areas"));
    assert_eq!(report.map_path, output.join("spray_map.pdf"));

    let workspace = temp_dir.path().join("workspace");
    for layer in [
        "buff_Wetlands",
        "buff_Lakes",
        "concern_zone",
        "address_in_concern_areas",
        "avoid_points",
        "buff_avoid_points",
        "addresses_to_spray",
        "spray_zone",
    ] {
        assert!(
            workspace.join(format!("{}.geojson", layer)).exists(),
            "missing workspace layer {}",
            layer
        );
    }

    Ok(())
}

#[tokio::test]
async fn test_interactive_run_keeps_join_layer_off_map() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start();
    let sheet_mock = server.mock(|when, then| {
        when.method(GET).path("/sheet.csv");
        then.status(200).body("Street Address\n1 Opt Out Way\n");
    });
    let hit_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/geocoder")
            .query_param("address", "1 Opt Out Way Boulder CO");
        then.status(200).json_body(serde_json::json!({
            "result": {"addressMatches": [{"coordinates": {"x": -105.2951, "y": 40.0051}}]}
        }));
    });

    let config = setup(&temp_dir, &server);

    // Two buffers at their defaults, default concern and join names, keep the
    // join layer off the map, default opt-out buffer, custom spray layer name,
    // then a subtitle.
    let script = "\n\n\n\n\n\n2\n\n\nspray_final\nWard 4 treatment\n";
    let inputs = PromptInputs::new(
        Cursor::new(script.as_bytes().to_vec()),
        Vec::new(),
        LinearUnit::ALL.to_vec(),
    );

    let report = OutbreakWorkflow::new(config, inputs, WorkflowOptions::default())
        .run()
        .await?;

    sheet_mock.assert();
    hit_mock.assert();
    assert_eq!(report.addresses_in_concern, 3);
    assert_eq!(report.opt_out_points, 1);
    assert_eq!(report.addresses_to_notify, 2);
    assert!(temp_dir
        .path()
        .join("workspace/spray_final.geojson")
        .exists());

    let pdf = std::fs::read(&report.map_path)?;
    assert!(contains(&pdf, b"Ward 4 treatment"));
    assert!(!contains(&pdf, b"address_in_concern_areas"));

    Ok(())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
