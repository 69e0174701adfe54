mod common;
use common::{corner_mask, ready_session, scan_with_signal, table};
use fmri_response::{
    AnalysisConfig, CacheState, Entity, Inherited, Mask, PlotSettings, ReadyPolicy, ResponseError,
    Scan,
};
use ndarray::Array4;

const ROWS: [[f64; 2]; 3] = [[2.0, 1.0], [6.0, 2.0], [10.0, 1.0]];

/// Project → group → individual with one ready session.
fn one_session_project() -> Entity {
    let mut project = Entity::project("p");
    project
        .add_child(Entity::group("g"))
        .unwrap()
        .add_child(Entity::individual("i"))
        .unwrap()
        .add_child(ready_session("s", 20, &ROWS))
        .unwrap();
    project
}

#[test]
fn group_ready_iff_some_session_ready() {
    let cfg = AnalysisConfig::default();
    let ctx = Inherited::root(&cfg);

    let mut group = Entity::group("g");
    let person = group.add_child(Entity::individual("i")).unwrap();
    person.add_child(Entity::session("empty")).unwrap();
    assert!(!group.ready_for_calculation(&ctx));

    let person = group.child_mut(0).unwrap();
    person.add_child(ready_session("s", 20, &ROWS)).unwrap();
    assert!(group.ready_for_calculation(&ctx));

    let all = AnalysisConfig { ready_policy: ReadyPolicy::All, ..AnalysisConfig::default() };
    assert!(!group.ready_for_calculation(&Inherited::root(&all)));
    assert!(group.aggregate(&Inherited::root(&all)).unwrap().is_none());
}

#[test]
fn empty_inner_node_is_not_ready() {
    let cfg = AnalysisConfig::default();
    let ctx = Inherited::root(&cfg);
    assert!(!Entity::project("p").ready_for_calculation(&ctx));
    let all = AnalysisConfig { ready_policy: ReadyPolicy::All, ..AnalysisConfig::default() };
    assert!(!Entity::group("g").ready_for_calculation(&Inherited::root(&all)));
}

#[test]
fn session_inherits_mask_and_stimuli_from_ancestors() {
    let cfg = AnalysisConfig::default();
    let ctx = Inherited::root(&cfg);
    let mask = corner_mask();
    let scan = scan_with_signal(&mask, 20, 0.0, |t| t as f64);

    let mut project = Entity::project("p");
    project.load_mask(mask, None).unwrap();
    let group = project.add_child(Entity::group("g")).unwrap();
    group.load_stimuli(table(&ROWS), None).unwrap();
    let person = group.add_child(Entity::individual("i")).unwrap();
    let session = person.add_child(Entity::session("s")).unwrap();
    session.load_scan(scan, None).unwrap();

    assert!(project.ready_for_calculation(&ctx));
    let r = project.aggregate(&ctx).unwrap().unwrap();
    assert_eq!(r.get("1").unwrap().nrows(), 1);
    // Window [5, 9) of the series t, minus its first frame.
    assert_eq!(r.get("2").unwrap().row(0).to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
}

#[test]
fn own_mask_can_be_switched_off() {
    let cfg = AnalysisConfig::default();
    let ctx = Inherited::root(&cfg);
    let mut project = one_session_project();
    let session = project.descendant_mut(&[0, 0, 0]).unwrap();
    session.set_plot_settings(PlotSettings { use_mask: false, ..PlotSettings::default() });
    // Nothing above the session provides a mask.
    assert!(!project.ready_for_calculation(&ctx));
}

#[test]
fn aggregation_truncates_to_narrowest_child() {
    let cfg = AnalysisConfig::default();
    let ctx = Inherited::root(&cfg);
    let mut person = Entity::individual("i");
    person.add_child(ready_session("wide", 30, &[[2.0, 1.0], [9.0, 2.0], [16.0, 1.0]])).unwrap();
    person.add_child(ready_session("narrow", 30, &[[2.0, 1.0], [5.0, 1.0], [8.0, 2.0]])).unwrap();

    let r = person.aggregate(&ctx).unwrap().unwrap();
    assert_eq!(r.get("1").unwrap().dim(), (3, 3));
    assert_eq!(r.get("2").unwrap().dim(), (1, 3));
    assert_eq!(r.n_events(), 4);
    // Every matrix shares one width.
    let widths: Vec<usize> = r.iter().map(|(_, b)| b.ncols()).collect();
    assert!(widths.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn unready_children_are_skipped() {
    let cfg = AnalysisConfig::default();
    let ctx = Inherited::root(&cfg);
    let mut person = Entity::individual("i");
    person.add_child(ready_session("s", 20, &ROWS)).unwrap();
    person.add_child(Entity::session("pending")).unwrap();
    let r = person.aggregate(&ctx).unwrap().unwrap();
    assert_eq!(r.n_events(), 2);
}

#[test]
fn cache_is_reused_until_inputs_change() {
    let cfg = AnalysisConfig::default();
    let ctx = Inherited::root(&cfg);
    let mut project = one_session_project();

    assert_eq!(project.cache_state(&ctx), CacheState::Uncomputed);
    project.aggregate(&ctx).unwrap();
    project.aggregate(&ctx).unwrap();
    assert_eq!(project.compute_count(), 1);
    assert_eq!(project.descendant(&[0, 0, 0]).unwrap().compute_count(), 1);
    assert_eq!(project.cache_state(&ctx), CacheState::Cached);
    assert!(!project.settings_changed(&ctx));
}

#[test]
fn normalisation_change_recomputes() {
    let cfg = AnalysisConfig::default();
    let ctx = Inherited::root(&cfg);
    let mut project = one_session_project();
    project.aggregate(&ctx).unwrap();

    for plot in [
        PlotSettings { percent: true, ..PlotSettings::default() },
        PlotSettings { percent: true, global: true, ..PlotSettings::default() },
    ] {
        project.set_plot_settings(plot);
        assert_eq!(project.cache_state(&ctx), CacheState::Stale);
        project.aggregate(&ctx).unwrap();
    }
    assert_eq!(project.compute_count(), 3);

    // Same settings through the root context instead of a node override.
    let pct = AnalysisConfig {
        normalization: fmri_response::Normalization::new(true, true),
        ..AnalysisConfig::default()
    };
    project.clear_plot_settings();
    project.aggregate(&Inherited::root(&pct)).unwrap();
    assert_eq!(project.descendant(&[0, 0, 0]).unwrap().compute_count(), 3);
}

#[test]
fn mask_change_below_invalidates_ancestors() {
    let cfg = AnalysisConfig::default();
    let ctx = Inherited::root(&cfg);
    let mut project = one_session_project();
    project.aggregate(&ctx).unwrap();

    let session = project.descendant_mut(&[0, 0, 0]).unwrap();
    session.load_mask(Mask::cube([4, 4, 3], [3.0, 3.0, 2.0], 0.0), None).unwrap();

    assert!(project.settings_changed(&ctx));
    project.aggregate(&ctx).unwrap();
    assert_eq!(project.compute_count(), 2);
}

#[test]
fn stimuli_and_tr_changes_recompute() {
    let cfg = AnalysisConfig::default();
    let ctx = Inherited::root(&cfg);
    let mut project = one_session_project();
    project.aggregate(&ctx).unwrap();

    let session = project.descendant_mut(&[0, 0, 0]).unwrap();
    session.load_stimuli(table(&[[2.0, 1.0], [7.0, 1.0], [12.0, 1.0]]), None).unwrap();
    let r = project.aggregate(&ctx).unwrap().unwrap();
    assert_eq!(r.get("1").unwrap().ncols(), 5);

    let session = project.descendant_mut(&[0, 0, 0]).unwrap();
    session.set_tr(2.0).unwrap();
    let r = project.aggregate(&ctx).unwrap().unwrap();
    // Onsets 2, 7, 12 s at 2 s per frame → frames 1, 3, 6.
    assert_eq!(r.get("1").unwrap().dim(), (2, 2));
    assert_eq!(project.compute_count(), 3);
}

#[test]
fn tr_change_that_overruns_scan_is_rejected() {
    let mut project = one_session_project();
    let session = project.descendant_mut(&[0, 0, 0]).unwrap();
    let err = session.set_tr(0.25).unwrap_err();
    assert!(matches!(err, ResponseError::TimelineTooShort { .. }));
}

#[test]
fn reloading_the_same_scan_content_recomputes() {
    let cfg = AnalysisConfig::default();
    let ctx = Inherited::root(&cfg);
    let mut project = one_session_project();
    project.aggregate(&ctx).unwrap();

    let session = project.descendant_mut(&[0, 0, 0]).unwrap();
    let same = Scan::new(session.scan().unwrap().data().clone());
    session.load_scan(same, None).unwrap();
    project.aggregate(&ctx).unwrap();
    assert_eq!(project.compute_count(), 2);
}

#[test]
fn aggregate_at_resolves_inherited_context() {
    let cfg = AnalysisConfig::default();
    let ctx = Inherited::root(&cfg);
    let mut project = Entity::project("p");
    project.load_stimuli(table(&ROWS), None).unwrap();
    let session = project
        .add_child(Entity::group("g"))
        .unwrap()
        .add_child(Entity::individual("i"))
        .unwrap()
        .add_child(Entity::session("s"))
        .unwrap();
    let mask = corner_mask();
    session.load_scan(scan_with_signal(&mask, 20, 0.0, |t| t as f64), None).unwrap();
    session.load_mask(mask, None).unwrap();

    let r = project.aggregate_at(&[0, 0, 0], &ctx).unwrap().unwrap();
    assert_eq!(r.n_events(), 2);
    assert!(project.aggregate_at(&[1], &ctx).is_err());
}

#[test]
fn children_must_sit_one_level_below() {
    let mut project = Entity::project("p");
    let err = project.add_child(Entity::session("s")).unwrap_err();
    assert!(matches!(err, ResponseError::InvalidChild { parent: "project", child: "session" }));
    let mut session = Entity::session("s");
    assert!(session.add_child(Entity::session("t")).is_err());
}

#[test]
fn scans_only_attach_to_sessions_with_matching_mask() {
    let mut group = Entity::group("g");
    let scan = Scan::new(Array4::zeros((4, 4, 3, 10)));
    assert!(matches!(group.load_scan(scan.clone(), None), Err(ResponseError::Config(_))));

    let mut session = Entity::session("s");
    session.load_mask(Mask::cube([3, 3, 3], [1.0, 1.0, 1.0], 1.0), None).unwrap();
    let err = session.load_scan(scan, None).unwrap_err();
    assert!(matches!(err, ResponseError::ShapeMismatch { .. }));
    assert!(session.scan().is_none());
}

#[test]
fn failing_session_aborts_parent_aggregation() {
    let cfg = AnalysisConfig {
        normalization: fmri_response::Normalization::new(true, false),
        ..AnalysisConfig::default()
    };
    let ctx = Inherited::root(&cfg);
    let mask = corner_mask();
    // Baseline frame 1 is zero → percentage normalisation fails.
    let scan = scan_with_signal(&mask, 20, 0.0, |t| if t == 1 { 0.0 } else { 10.0 });
    let mut s = Entity::session("s");
    s.load_mask(mask, None).unwrap();
    s.load_stimuli(table(&ROWS), None).unwrap();
    s.load_scan(scan, None).unwrap();

    let mut person = Entity::individual("i");
    person.add_child(s).unwrap();
    let err = person.aggregate(&ctx).unwrap_err();
    assert!(matches!(err, ResponseError::ZeroReference { .. }));
    assert_eq!(person.cache_state(&ctx), CacheState::Uncomputed);
    assert!(person.responses().is_none());
}

#[test]
fn removing_sessions_recomputes_and_can_empty_a_parent() {
    let cfg = AnalysisConfig::default();
    let ctx = Inherited::root(&cfg);
    let mut project = one_session_project();
    let person = project.descendant_mut(&[0, 0]).unwrap();
    person.add_child(ready_session("s2", 20, &ROWS)).unwrap();

    assert_eq!(project.aggregate(&ctx).unwrap().unwrap().n_events(), 4);
    assert_eq!(project.compute_count(), 1);

    let person = project.descendant_mut(&[0, 0]).unwrap();
    assert!(person.remove_child(7).is_none());
    let removed = person.remove_child(0).unwrap();
    assert_eq!(removed.name, "s");
    assert_eq!(person.cache_state(&ctx), CacheState::Uncomputed);

    assert_eq!(project.aggregate(&ctx).unwrap().unwrap().n_events(), 2);
    assert_eq!(project.compute_count(), 2);
    assert_eq!(project.descendant(&[0, 0]).unwrap().compute_count(), 2);

    project.descendant_mut(&[0, 0]).unwrap().remove_child(0).unwrap();
    assert!(!project.ready_for_calculation(&ctx));
    assert!(project.aggregate(&ctx).unwrap().is_none());
    assert!(project.descendant(&[0, 0]).unwrap().children().is_empty());
}

#[test]
fn clearing_mask_or_stimuli_falls_back_to_ancestors() {
    let cfg = AnalysisConfig::default();
    let ctx = Inherited::root(&cfg);
    let mut project = one_session_project();
    project.aggregate(&ctx).unwrap();

    let session = project.descendant_mut(&[0, 0, 0]).unwrap();
    session.clear_mask();
    assert!(session.defaults().mask.is_none());
    assert!(!project.ready_for_calculation(&ctx));

    // A project-wide mask takes over.
    project.load_mask(corner_mask(), None).unwrap();
    assert_eq!(project.cache_state(&ctx), CacheState::Uncomputed);
    assert_eq!(project.aggregate(&ctx).unwrap().unwrap().n_events(), 2);
    // Clearing dropped the session's own cache as well.
    assert_eq!(project.descendant(&[0, 0, 0]).unwrap().compute_count(), 2);

    let session = project.descendant_mut(&[0, 0, 0]).unwrap();
    session.clear_stimuli();
    assert!(session.defaults().stimuli_tr.is_none());
    assert!(!project.ready_for_calculation(&ctx));

    project.load_stimuli(table(&[[2.0, 1.0], [7.0, 1.0], [12.0, 1.0]]), None).unwrap();
    let r = project.aggregate(&ctx).unwrap().unwrap();
    assert_eq!(r.get("1").unwrap().dim(), (2, 5));
    assert_eq!(project.descendant(&[0, 0, 0]).unwrap().compute_count(), 3);
}

#[test]
fn scan_is_checked_against_inherited_mask() {
    let cfg = AnalysisConfig::default();
    let mut project = Entity::project("p");
    project.load_mask(Mask::cube([3, 3, 3], [1.0, 1.0, 1.0], 1.0), None).unwrap();
    let ctx = project.defaults().inherit(&Inherited::root(&cfg));

    let mut session = Entity::session("s");
    let scan = Scan::new(Array4::zeros((4, 4, 3, 10)));
    let err = session.load_scan_within(scan.clone(), None, &ctx).unwrap_err();
    assert!(matches!(err, ResponseError::ShapeMismatch { mask: [3, 3, 3], scan: [4, 4, 3] }));
    assert!(session.scan().is_none());

    // Its own mask shadows the inherited one.
    session.load_mask(corner_mask(), None).unwrap();
    session.load_scan_within(scan, None, &ctx).unwrap();
}
