use anyhow::Result;
use ironstage::testing::*;
use ironstage::*;

/// `in -> pre -> part{ enrich } -> post -> out`
fn wrapped() -> Result<FlowGraph> {
    let mut graph = FlowGraph::new();
    let t = DataType::new("Record");
    let map = |name: &str| {
        NodeSpec::operator(name, OperatorKind::Map)
            .input("in", t.clone())
            .output("out", t.clone())
    };
    let input = graph.add_input("in", t.clone());
    let pre = graph.add_node(map("pre"))?;
    let part = graph.add_flow_part(
        NodeSpec::new("part", NodeKind::FlowPart(Scope::default()))
            .input("x", t.clone())
            .output("y", t.clone()),
    )?;
    let NodeKind::FlowPart(scope) = graph.node(part).kind().clone() else {
        panic!("not a flow part");
    };
    let enrich = graph.add_node(map("enrich"))?;
    graph.connect_nodes(scope.inputs[0], 0, enrich, 0)?;
    graph.connect_nodes(enrich, 0, scope.outputs[0], 0)?;
    let post = graph.add_node(map("post"))?;
    let output = graph.add_output("out", t.clone());
    graph.connect_nodes(input, 0, pre, 0)?;
    graph.connect_nodes(pre, 0, part, 0)?;
    graph.connect_nodes(part, 0, post, 0)?;
    graph.connect_nodes(post, 0, output, 0)?;
    Ok(graph)
}

fn plan(graph: &FlowGraph, mode: FlowPartMode) -> Result<StageGraph> {
    let options = PlannerOptions::new().flow_parts(mode);
    Ok(StagePlanner::new(options).plan(graph)?)
}

#[test]
fn aggregated_part_fuses_with_surroundings() -> Result<()> {
    let source = wrapped()?;
    let plan = plan(&source, FlowPartMode::Aggregate)?;
    assert_eq!(plan.stages().len(), 1);
    assert_operators_planned(&source, &plan);
    Ok(())
}

#[test]
fn segregated_part_gets_its_own_stage() -> Result<()> {
    let source = wrapped()?;
    let plan = plan(&source, FlowPartMode::Segregate)?;
    assert_eq!(plan.stages().len(), 3);
    assert_topological_stage_order(&plan);
    let middle: Vec<_> = plan.stages()[1]
        .blocks()
        .flat_map(|b| b.nodes().iter())
        .map(|n| plan.graph().node(*n).name().to_string())
        .collect();
    assert_eq!(middle, vec!["enrich".to_string()]);
    Ok(())
}

#[test]
fn part_that_only_passes_through_disappears() -> Result<()> {
    let source = nested_flow_part()?;
    for mode in [FlowPartMode::Aggregate, FlowPartMode::Segregate] {
        let plan = plan(&source, mode)?;
        assert_eq!(plan.stages().len(), 1);
        assert_operators_planned(&source, &plan);
        assert!(
            plan.blocks()
                .flat_map(|b| b.nodes().iter())
                .all(|n| !matches!(plan.graph().node(*n).kind(), NodeKind::FlowPart(_)))
        );
    }
    Ok(())
}
