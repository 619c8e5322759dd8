use anyhow::Result;
use ironstage::testing::*;
use ironstage::*;

#[test_log::test]
fn log_observer_accepts_every_event() -> Result<()> {
    let mut planner = StagePlanner::default().with_observer(LogObserver);
    let plan = planner.plan(&two_shuffles()?)?;
    assert_eq!(plan.stages().len(), 2);
    Ok(())
}

#[test]
fn recorder_clones_share_one_buffer() {
    let recorder = RecordingObserver::new();
    let mut clone = recorder.clone();
    clone.on_event(&PlanEvent::StageGroupsBuilt { groups: 3 });
    assert_eq!(
        recorder.events(),
        vec![PlanEvent::StageGroupsBuilt { groups: 3 }]
    );
    recorder.clear();
    assert!(clone.events().is_empty());
}

#[test]
fn normalization_counts_are_reported() -> Result<()> {
    let (_, events) = plan_with_trace(StagePlanner::default(), &two_shuffles()?)?;
    let summary = events.iter().find_map(|e| match e {
        PlanEvent::Normalized(summary) => Some(*summary),
        _ => None,
    });
    assert_eq!(summary.map(|s| s.checkpoints_inserted), Some(1));
    Ok(())
}

#[test]
fn events_render_for_humans() {
    let event = PlanEvent::StageGroupsMerged {
        before: 4,
        after: 2,
    };
    assert_eq!(event.to_string(), "merged stage groups: 4 -> 2");
    let warning = PlanEvent::InvalidOption {
        key: "compressFlowBlockGroup".into(),
        value: "maybe".into(),
    };
    assert!(warning.to_string().contains("using default"));
}
