use anyhow::Result;
use ironstage::options::{COMPRESS_FLOW_BLOCK_GROUP, CompressionSetting};
use ironstage::*;

#[test]
fn defaults_segregate_and_compress() {
    let options = PlannerOptions::default();
    assert_eq!(options.flow_parts, FlowPartMode::Segregate);
    assert_eq!(
        options.compression(),
        CompressionSetting {
            enabled: true,
            rejected: None
        }
    );
}

#[test]
fn empty_json_gives_defaults() -> Result<()> {
    assert_eq!(PlannerOptions::from_json("{}")?, PlannerOptions::default());
    Ok(())
}

#[test]
fn json_round_trips_through_serde() -> Result<()> {
    let options = PlannerOptions::new()
        .flow_parts(FlowPartMode::Aggregate)
        .attribute(COMPRESS_FLOW_BLOCK_GROUP, "enabled");
    let json = serde_json::to_string(&options)?;
    assert_eq!(PlannerOptions::from_json(&json)?, options);
    Ok(())
}

#[test]
fn malformed_json_is_an_error() {
    let err = PlannerOptions::from_json(r#"{ "flow_parts": "Sideways" }"#)
        .err()
        .map(|e| e.to_string());
    assert_eq!(err.as_deref(), Some("invalid planner options"));
}

#[test]
fn explicit_toggle_is_read_from_json() -> Result<()> {
    let options = PlannerOptions::from_json(r#"{ "compress_flow_block_group": false }"#)?;
    assert!(!options.compression().enabled);
    Ok(())
}
