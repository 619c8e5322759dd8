use anyhow::Result;
use ironstage::normalize::normalize;
use ironstage::testing::*;
use ironstage::*;

fn fold(name: &str, t: &DataType) -> NodeSpec {
    NodeSpec::operator(name, OperatorKind::Fold)
        .boundary(Boundary::Shuffle)
        .shuffled_input("in", t.clone(), ShuffleKey::group_by(["k"]))
        .output("out", t.clone())
}

#[test]
fn adjacent_shuffles_are_separated() -> Result<()> {
    let mut graph = FlowGraph::new();
    let t = DataType::new("T");
    let input = graph.add_input("in", t.clone());
    let first = graph.add_node(fold("first", &t))?;
    let second = graph.add_node(fold("second", &t))?;
    let output = graph.add_output("out", t);
    graph.connect_nodes(input, 0, first, 0)?;
    graph.connect_nodes(first, 0, second, 0)?;
    graph.connect_nodes(second, 0, output, 0)?;

    let summary = normalize(&mut graph, FlowPartMode::default());
    assert_eq!(summary.checkpoints_inserted, 1);
    assert_no_shuffle_to_shuffle(&graph);
    Ok(())
}

#[test]
fn checkpoint_is_pushed_below_logging() -> Result<()> {
    let mut graph = FlowGraph::new();
    let t = DataType::new("T");
    let input = graph.add_input("in", t.clone());
    let first = graph.add_node(fold("first", &t))?;
    let log = graph.add_node(
        NodeSpec::operator("log", OperatorKind::Logging)
            .input("in", t.clone())
            .output("out", t.clone()),
    )?;
    let second = graph.add_node(fold("second", &t))?;
    let output = graph.add_output("out", t);
    graph.connect_nodes(input, 0, first, 0)?;
    graph.connect_nodes(first, 0, log, 0)?;
    graph.connect_nodes(log, 0, second, 0)?;
    graph.connect_nodes(second, 0, output, 0)?;

    normalize(&mut graph, FlowPartMode::default());
    assert!(ops::successors(&graph, first).contains(&log));
    let after_log: Vec<_> = ops::successors(&graph, log).into_iter().collect();
    assert_eq!(after_log.len(), 1);
    assert!(matches!(
        graph.node(after_log[0]).kind(),
        NodeKind::Pseudo(PseudoKind::Checkpoint)
    ));
    Ok(())
}

#[test]
fn global_side_effects_are_checkpointed() -> Result<()> {
    let mut graph = FlowGraph::new();
    let t = DataType::new("T");
    let input = graph.add_input("in", t.clone());
    let audit = graph.add_node(
        NodeSpec::operator("audit", OperatorKind::Custom)
            .observation(Observation::ExactlyOnce)
            .input("in", t.clone())
            .output("out", t.clone()),
    )?;
    let output = graph.add_output("out", t);
    graph.connect_nodes(input, 0, audit, 0)?;
    graph.connect_nodes(audit, 0, output, 0)?;

    let summary = normalize(&mut graph, FlowPartMode::default());
    assert_eq!(summary.checkpoints_inserted, 1);
    let next: Vec<_> = ops::successors(&graph, audit).into_iter().collect();
    assert!(ops::is_stage_boundary(&graph, next[0]));
    Ok(())
}

#[test]
fn identities_end_up_one_to_one() -> Result<()> {
    let mut graph = FlowGraph::new();
    let t = DataType::new("T");
    let input = graph.add_input("in", t.clone());
    let fan = graph.add_node(
        NodeSpec::pseudo("fan", PseudoKind::Identity)
            .input("in", t.clone())
            .output("out", t.clone()),
    )?;
    let left = graph.add_output("left", t.clone());
    let right = graph.add_output("right", t);
    graph.connect_nodes(input, 0, fan, 0)?;
    graph.connect_nodes(fan, 0, left, 0)?;
    graph.connect_nodes(fan, 0, right, 0)?;

    let summary = normalize(&mut graph, FlowPartMode::default());
    assert_eq!(summary.identities_split, 1);
    assert_identity_fan_is_one_to_one(&graph);
    assert_eq!(ops::successors(&graph, input).len(), 2);
    Ok(())
}

#[test]
fn interior_identities_are_removed() -> Result<()> {
    let mut graph = linear_map()?;
    let parse = graph
        .all_nodes()
        .find(|n| n.name() == "parse")
        .map(|n| n.id())
        .ok_or_else(|| anyhow::anyhow!("missing parse"))?;
    let port = graph.first_output(parse);
    rewrite::insert_identity(&mut graph, port);

    let summary = normalize(&mut graph, FlowPartMode::default());
    assert_eq!(summary.identities_removed, 1);
    assert!(graph.all_nodes().all(|n| !ops::is_identity(&graph, n.id())));
    Ok(())
}
