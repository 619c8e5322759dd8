use anyhow::Result;
use ironstage::testing::*;
use ironstage::*;

#[test_log::test]
fn trivial_graph_has_no_stages() -> Result<()> {
    let plan = build_plan(&trivial()?)?;
    assert!(plan.stages().is_empty());
    assert!(
        plan.input()
            .successors(plan.wiring())
            .contains(&plan.output().id())
    );
    Ok(())
}

#[test_log::test]
fn linear_maps_fuse_into_one_stage() -> Result<()> {
    let source = linear_map()?;
    let plan = build_plan(&source)?;
    assert_eq!(plan.stages().len(), 1);
    let stage = &plan.stages()[0];
    assert_eq!(stage.number(), 1);
    assert!(!stage.has_reduce());
    assert_eq!(stage.map_blocks().len(), 1);
    assert_operators_planned(&source, &plan);
    Ok(())
}

#[test_log::test]
fn word_count_is_one_shuffle_stage() -> Result<()> {
    let source = word_count()?;
    let plan = build_plan(&source)?;
    assert_eq!(plan.stages().len(), 1);
    let stage = &plan.stages()[0];
    assert!(stage.has_reduce());
    assert_eq!(stage.reduce_blocks().len(), 1);
    assert_reduce_purity(&plan);
    assert_blocks_disjoint(&plan);
    assert_operators_planned(&source, &plan);
    Ok(())
}

#[test]
fn two_shuffles_need_two_ordered_stages() -> Result<()> {
    let plan = build_plan(&two_shuffles()?)?;
    assert_eq!(plan.stages().len(), 2);
    assert!(plan.stages().iter().all(Stage::has_reduce));
    let numbers: Vec<_> = plan.stages().iter().map(Stage::number).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert_topological_stage_order(&plan);
    Ok(())
}

#[test]
fn join_reduces_both_sides_in_one_block() -> Result<()> {
    let source = join()?;
    let plan = build_plan(&source)?;
    assert_eq!(plan.stages().len(), 1);
    let stage = &plan.stages()[0];
    assert_eq!(stage.reduce_blocks().len(), 1);
    assert_eq!(stage.reduce_blocks()[0].inputs().len(), 2);
    assert_reduce_purity(&plan);
    assert_operators_planned(&source, &plan);
    Ok(())
}

#[test]
fn cycle_is_reported_not_planned() -> Result<()> {
    let diagnostics = match build_plan(&cycle()?) {
        Ok(_) => panic!("a cyclic graph must not plan"),
        Err(d) => d,
    };
    assert_eq!(diagnostics.len(), 1);
    let circuit = &diagnostics.as_slice()[0];
    assert!(circuit.message.contains("circuit"));
    assert_eq!(circuit.nodes.len(), 2);
    Ok(())
}

#[test]
fn every_problem_is_reported_at_once() -> Result<()> {
    let mut graph = FlowGraph::new();
    let t = DataType::new("T");
    let input = graph.add_input("in", t.clone());
    let lonely = graph.add_node(
        NodeSpec::operator("lonely", OperatorKind::Map)
            .input("in", t.clone())
            .output("out", t.clone()),
    )?;
    let strict = graph.add_node(
        NodeSpec::operator("strict", OperatorKind::Branch)
            .input("in", t.clone())
            .mandatory_output("yes", t.clone())
            .output("no", t.clone()),
    )?;
    let output = graph.add_output("out", t);
    graph.connect_nodes(input, 0, strict, 0)?;
    graph.connect_nodes(strict, 1, output, 0)?;
    graph.connect_nodes(lonely, 0, output, 0)?;

    let Err(diagnostics) = build_plan(&graph) else {
        panic!("planning should fail");
    };
    assert_eq!(diagnostics.len(), 2);
    let text = diagnostics.to_string();
    assert!(text.contains("unconnected input `in` of `lonely`"));
    assert!(text.contains("mandatory output `yes` of `strict`"));
    Ok(())
}

#[test]
fn planning_leaves_source_untouched() -> Result<()> {
    let source = two_shuffles()?;
    let before = source.clone();
    let _plan = build_plan(&source)?;
    assert_eq!(source.node_count(), before.node_count());
    for node in before.all_nodes() {
        assert_eq!(source.node(node.id()).name(), node.name());
    }
    Ok(())
}

#[test]
fn planning_is_deterministic() -> Result<()> {
    let source = diamond_with_shared_branch()?;
    let first = build_plan(&source)?.explain().to_json()?;
    let second = build_plan(&source)?.explain().to_json()?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn global_blocks_wrap_declared_interface() -> Result<()> {
    let source = join()?;
    let plan = build_plan(&source)?;
    assert_eq!(plan.input().outputs().len(), 2);
    assert_eq!(plan.output().inputs().len(), 1);
    assert!(plan.stage_of(plan.input().id()).is_none());
    assert!(plan.block(plan.output().id()).is_some());
    Ok(())
}

#[test]
fn planner_reports_progress_events() -> Result<()> {
    let (_, events) = plan_with_trace(StagePlanner::default(), &word_count()?)?;
    assert!(matches!(events.first(), Some(PlanEvent::Validated { diagnostics: 0 })));
    assert!(matches!(events.last(), Some(PlanEvent::StagesOrdered { stages: 1 })));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, PlanEvent::BlocksExtracted { reduce: 1, .. }))
    );
    Ok(())
}

#[test]
fn blocks_never_reuse_source_nodes() -> Result<()> {
    let source = join()?;
    let plan = build_plan(&source)?;
    for block in plan.blocks() {
        for node in block.nodes() {
            assert!(!source.contains(*node), "{node} leaked from the source graph");
            assert!(block.origins().contains_key(node));
        }
    }
    assert_blocks_disjoint(&plan);
    Ok(())
}
