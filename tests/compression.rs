use anyhow::Result;
use ironstage::options::COMPRESS_FLOW_BLOCK_GROUP;
use ironstage::testing::*;
use ironstage::*;
use std::collections::BTreeSet;

fn planner(compress: bool) -> StagePlanner {
    StagePlanner::new(PlannerOptions::new().compress_flow_block_group(compress))
}

#[test]
fn independent_shuffles_stay_apart_without_compression() -> Result<()> {
    let source = diamond_with_shared_branch()?;
    let plan = planner(false).plan(&source)?;
    assert_eq!(plan.stages().len(), 2);
    for stage in plan.stages() {
        assert_eq!(stage.map_blocks().len(), 1);
        assert_eq!(stage.reduce_blocks().len(), 1);
    }
    assert_blocks_disjoint(&plan);
    Ok(())
}

#[test]
fn equal_distance_stages_merge() -> Result<()> {
    let source = diamond_with_shared_branch()?;
    let (plan, events) = plan_with_trace(planner(true), &source)?;
    assert_eq!(plan.stages().len(), 1);
    let stage = &plan.stages()[0];
    assert_eq!(stage.map_blocks().len(), 1);
    assert_eq!(stage.reduce_blocks().len(), 1);
    assert!(events.contains(&PlanEvent::StageGroupsMerged {
        before: 2,
        after: 1
    }));
    Ok(())
}

#[test]
fn merged_map_block_runs_shared_step_once() -> Result<()> {
    let plan = planner(true).plan(&diamond_with_shared_branch()?)?;
    let map = &plan.stages()[0].map_blocks()[0];
    let names: Vec<_> = map
        .nodes()
        .iter()
        .map(|n| plan.graph().node(*n).name())
        .collect();
    assert_eq!(names, vec!["normalize"]);
    assert_eq!(map.outputs().len(), 1);
    assert_eq!(map.successors(plan.wiring()).len(), 1);
    assert_reduce_purity(&plan);
    assert_operators_planned(&diamond_with_shared_branch()?, &plan);
    Ok(())
}

#[test]
fn merging_keeps_every_output_reachable() -> Result<()> {
    let plan = planner(true).plan(&diamond_with_shared_branch()?)?;
    let reduce = &plan.stages()[0].reduce_blocks()[0];
    assert_eq!(reduce.inputs().len(), 2);
    assert_eq!(plan.output().inputs().len(), 2);
    assert_eq!(
        plan.output().predecessors(plan.wiring()),
        BTreeSet::from([reduce.id()])
    );
    Ok(())
}

#[test]
fn chained_stages_never_merge() -> Result<()> {
    let plan = planner(true).plan(&two_shuffles()?)?;
    assert_eq!(plan.stages().len(), 2);
    assert_topological_stage_order(&plan);
    Ok(())
}

#[test]
fn compression_attribute_is_honoured() -> Result<()> {
    let options = PlannerOptions::new().attribute(COMPRESS_FLOW_BLOCK_GROUP, "DISABLED");
    let plan = StagePlanner::new(options).plan(&diamond_with_shared_branch()?)?;
    assert_eq!(plan.stages().len(), 2);
    Ok(())
}

#[test]
fn unknown_compression_value_warns_and_compresses() -> Result<()> {
    let options = PlannerOptions::new().attribute(COMPRESS_FLOW_BLOCK_GROUP, "maybe");
    let (plan, events) =
        plan_with_trace(StagePlanner::new(options), &diamond_with_shared_branch()?)?;
    assert_eq!(plan.stages().len(), 1);
    assert!(events.contains(&PlanEvent::InvalidOption {
        key: COMPRESS_FLOW_BLOCK_GROUP.to_string(),
        value: "maybe".to_string(),
    }));
    Ok(())
}
