use anyhow::Result;
use ironstage::testing::*;
use ironstage::*;

#[test]
fn explanation_lists_stages_in_order() -> Result<()> {
    let plan = build_plan(&two_shuffles()?)?;
    let explanation = plan.explain();
    let numbers: Vec<_> = explanation.stages.iter().map(|s| s.number).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(explanation.links, plan.wiring().links().count());

    let first = &explanation.stages[0];
    assert!(first.map_blocks[0].nodes.contains(&"split".to_string()));
    assert_eq!(first.reduce_blocks[0].nodes, vec!["count".to_string()]);
    Ok(())
}

#[test]
fn explanation_renders_box_report() -> Result<()> {
    let plan = build_plan(&word_count()?)?;
    let text = plan.explain().to_string();
    assert!(text.contains("STAGE PLAN EXPLANATION"));
    assert!(text.contains("Stage 1 [SHUFFLE]"));
    assert!(text.contains("Reduce"));
    assert!(text.contains("count"));
    Ok(())
}

#[test]
fn explanation_saves_as_json() -> Result<()> {
    let plan = build_plan(&join()?)?;
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("plan.json");
    plan.explain().save_to_file(&path)?;

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(json["stages"].as_array().map(Vec::len), Some(1));
    assert_eq!(json["input"]["outputs"], 2);
    assert_eq!(json["stages"][0]["number"], 1);
    Ok(())
}

#[test]
fn diagnostics_export_as_json() -> Result<()> {
    let Err(diagnostics) = build_plan(&cycle()?) else {
        panic!("planning should fail");
    };
    let json: serde_json::Value = serde_json::from_str(&diagnostics.to_json()?)?;
    let items = json.as_array().map(Vec::len);
    assert_eq!(items, Some(1));
    assert!(
        json[0]["message"]
            .as_str()
            .is_some_and(|m| m.starts_with("circuit detected"))
    );
    Ok(())
}
