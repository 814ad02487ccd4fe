#![cfg(feature = "test-support")]
#[path = "link_support.rs"]
mod support;

use std::fs;

use robolink::fake_host::{ItemFixture, StationFixture, PICK_SELECTION};
use robolink::{ItemType, LinkError, Matrix, ParamValue, Pose, ProjectionType, RunMode, WindowState};
use support::TOLERANCE;
use tempfile::TempDir;

#[test]
fn parameters_parse_integers() {
    let host = support::start_host();
    let session = support::open(&host);

    assert_eq!(session.get_param("IO_3").expect("param"), Some(ParamValue::Int(1)));
    assert_eq!(session.get_param("NOPE").expect("param"), None);

    session.set_param("MODE", 3).expect("set param");
    assert_eq!(session.get_param("MODE").expect("param"), Some(ParamValue::Int(3)));
    session.set_param("MODE", "fast").expect("set param");
    assert_eq!(
        session.get_param("MODE").expect("param"),
        Some(ParamValue::Text("fast".to_string()))
    );
    let stored = host.with_station(|station| station.param("MODE").map(str::to_string));
    assert_eq!(stored.as_deref(), Some("fast"));
}

#[test]
fn values_that_look_like_the_unset_marker_read_back() {
    let host = support::start_host();
    let session = support::open(&host);

    session.set_param("STATE", "UNKNOWN_MODE").expect("set param");
    assert_eq!(
        session.get_param("STATE").expect("param"),
        Some(ParamValue::Text("UNKNOWN_MODE".to_string()))
    );
    session.set_param("STATE", "UNKNOWN").expect("set param");
    assert_eq!(
        session.get_param("STATE").expect("param"),
        Some(ParamValue::Text("UNKNOWN".to_string()))
    );
    assert_eq!(session.get_param("NEVER_SET").expect("param"), None);
}

#[test]
fn lists_the_only_robot_of_a_station() {
    let host = support::start_host_with(
        StationFixture::new("Lab").with_item(ItemFixture::robot("UR5e")),
    );
    let session = support::open(&host);
    let robots = session.item_list(ItemType::Robot, false).expect("list");
    assert_eq!(robots.len(), 1);
    assert_eq!(robots[0].name().expect("name"), "UR5e");
}

#[test]
fn parameters_round_trip_and_paths_are_reserved() {
    let host = support::start_host();
    let session = support::open(&host);
    session.set_param("IO_3", 1).expect("set param");
    assert_eq!(session.get_param("IO_3").expect("param"), Some(ParamValue::Int(1)));

    let station_path = session
        .get_param("PATH_OPENSTATION")
        .expect("param")
        .expect("station path is reserved");
    assert!(station_path.as_text().is_some_and(|path| path.ends_with("Cell.rdk")));
}

#[test]
fn path_parameters_are_cached_until_the_station_changes() {
    let host = support::start_host();
    let session = support::open(&host);

    let library = session
        .get_param("PATH_LIBRARY")
        .expect("param")
        .expect("library path is reserved");
    assert!(library.as_text().is_some_and(|path| path.ends_with("Library")));

    host.with_station(|station| station.set_param("PATH_LIBRARY", "/srv/library"));
    assert_eq!(
        session.get_param("PATH_LIBRARY").expect("param"),
        Some(library),
        "cached value survives host-side changes"
    );

    session.add_station("Fresh").expect("new station");
    assert_eq!(
        session.get_param("PATH_LIBRARY").expect("param"),
        Some(ParamValue::Text("/srv/library".to_string()))
    );
}

#[test]
fn run_mode_and_simulation_speed() {
    let host = support::start_host();
    let session = support::open(&host);

    assert_eq!(session.run_mode().expect("run mode"), RunMode::Simulate);
    session.set_run_mode(RunMode::MakeProgram).expect("run mode");
    assert_eq!(session.run_mode().expect("run mode"), RunMode::MakeProgram);
    assert_eq!(session.cached_run_mode(), Some(RunMode::MakeProgram));

    session.set_simulation_speed(2.5).expect("speed");
    assert!((session.simulation_speed().expect("speed") - 2.5).abs() < TOLERANCE);
    assert_eq!(session.cached_simulation_speed(), Some(2.5));
}

#[test]
fn host_chrome_commands_are_accepted() {
    let host = support::start_host();
    let session = support::open(&host);
    session.render(false).expect("render");
    session.update().expect("update");
    session.show_message("Welding", false).expect("message");
    session.set_window_state(WindowState::Hidden).expect("window state");
    assert_eq!(session.command("Trace", "On").expect("station command"), "OK");
}

#[test]
fn stations_open_switch_and_close() {
    let host = support::start_host();
    let session = support::open(&host);
    let cell = session.active_station().expect("active station");
    assert_eq!(cell.name().expect("name"), "Cell");

    let second = session.add_station("Second").expect("new station");
    assert_eq!(session.active_station().expect("active station"), second);
    assert_eq!(session.cached_active_station(), Some(second.clone()));
    assert!(!session.item_by_name("R1", None).expect("lookup").is_some());

    session.set_active_station(&cell).expect("switch back");
    assert!(session.item_by_name("R1", None).expect("lookup").is_some());

    session.set_active_station(&second).expect("switch");
    session.close_station().expect("close");
    assert!(!second.valid().expect("validity"));
    assert_eq!(session.active_station().expect("active station"), cell);
}

#[test]
fn saves_and_reloads_a_station() {
    let host = support::start_host();
    let session = support::open(&host);
    let original = session.item_by_name("R1", None).expect("lookup");
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("cell.rdk");

    session.save(&path, None).expect("save");
    assert!(path.is_file());

    let loaded = session.add_file(&path, None).expect("load");
    assert_eq!(loaded.item_type().expect("type"), ItemType::Station);
    assert_eq!(loaded.name().expect("name"), "Cell");
    assert_eq!(session.active_station().expect("active station"), loaded);

    let copy = session.item_by_name("R1", None).expect("lookup");
    assert!(copy.is_some());
    assert_ne!(copy, original);
    let approach = session.item_by_name("Approach", None).expect("lookup");
    assert!(approach
        .pose_abs()
        .expect("pose")
        .approx_eq(&Pose::transl(800.0, 0.0, 300.0), TOLERANCE));
}

#[test]
fn loads_tools_onto_robots() {
    let host = support::start_host();
    let session = support::open(&host);
    let robot = session.item_by_name("R1", None).expect("lookup");
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("Gripper.tool");
    fs::write(&path, "tool").expect("tool file");

    let gripper = session.add_file(&path, Some(&robot)).expect("load tool");
    assert_eq!(gripper.item_type().expect("type"), ItemType::Tool);
    assert_eq!(gripper.name().expect("name"), "Gripper");
    assert!(robot.tool().expect("tool").approx_eq(&Pose::IDENTITY, TOLERANCE));

    let err = session
        .add_file(dir.path().join("missing.robot"), None)
        .expect_err("missing file");
    assert!(matches!(err, LinkError::Host { .. }), "unexpected error {err:?}");
}

#[test]
fn picks_answer_from_the_selection() {
    let host = support::start_host();
    let session = support::open(&host);

    let cancelled = session
        .item_pick("Pick a robot", ItemType::Robot)
        .expect("cancelled pick is not an error");
    assert!(!cancelled.is_some());
    assert!(!cancelled.valid().expect("validity"));
    let err = cancelled.name().expect_err("cancelled pick has no name");
    assert!(err.is_invalid_item(), "unexpected error {err:?}");
    assert!(session.is_open());

    session.set_param(PICK_SELECTION, "R1").expect("selection");
    let picked = session
        .item_pick("Pick a robot", ItemType::Robot)
        .expect("pick");
    assert_eq!(picked.kind(), Some(ItemType::Robot));
    assert_eq!(picked.name().expect("name"), "R1");
}

#[test]
fn lists_items_by_type() {
    let host = support::start_host();
    let session = support::open(&host);

    let robots = session.item_list(ItemType::Robot, true).expect("list");
    assert_eq!(robots.len(), 1);
    assert_eq!(robots[0].kind(), Some(ItemType::Robot));

    let top: Vec<String> = session
        .item_list(ItemType::Any, false)
        .expect("list")
        .iter()
        .map(|item| item.name().expect("name"))
        .collect();
    assert_eq!(top, vec!["Base", "Table"]);

    let everything = session.item_list(ItemType::Any, true).expect("list");
    assert_eq!(everything.len(), 6);
}

#[test]
fn shapes_keep_their_triangles() {
    let host = support::start_host();
    let session = support::open(&host);
    let triangle = Matrix::from_columns(&[
        [0.0, 0.0, 0.0],
        [100.0, 0.0, 0.0],
        [0.0, 100.0, 50.0],
    ])
    .expect("triangle");

    let shape = session.add_shape(&triangle, None, false).expect("shape");
    assert_eq!(shape.item_type().expect("type"), ItemType::Object);
    assert_eq!(shape.mesh().expect("mesh"), triangle);
    let bbox = shape.bounding_box().expect("bounding box");
    assert_eq!(bbox.column(1), Some(&[100.0, 100.0, 50.0][..]));

    session.add_shape(&triangle, Some(&shape), false).expect("merge");
    assert_eq!(shape.mesh().expect("mesh").cols(), 6);
    session.add_shape(&triangle, Some(&shape), true).expect("replace");
    assert_eq!(shape.mesh().expect("mesh").cols(), 3);

    let bad = Matrix::zeros(3, 2);
    let err = session
        .add_shape(&bad, None, false)
        .expect_err("two vertices are not a triangle");
    assert!(matches!(err, LinkError::Host { .. }), "unexpected error {err:?}");
}

#[test]
fn curves_and_points_project_onto_the_reference() {
    let host = support::start_host();
    let session = support::open(&host);
    let part = session.item_by_name("Part", None).expect("lookup");
    let path = Matrix::from_columns(&[[0.0, 0.0, 25.0], [20.0, 0.0, 25.0]]).expect("path");

    let curve = session
        .add_curve(&path, Some(&part), false, ProjectionType::Closest)
        .expect("curve");
    assert_ne!(curve, part);
    assert_eq!(curve.name().expect("name"), "Curve");
    assert!(curve
        .pose_abs()
        .expect("pose")
        .approx_eq(&part.pose_abs().expect("pose"), TOLERANCE));
    let points = curve.points().expect("points");
    assert_eq!(points.row(2), Some(vec![0.0, 0.0]));

    let merged = session
        .add_points(&path, Some(&part), true, ProjectionType::None)
        .expect("points");
    assert_eq!(merged, part);
    assert_eq!(part.points().expect("points").cols(), 5);

    let with_normals = Matrix::from_columns(&[[5.0, 5.0, 9.0, 1.0, 0.0, 0.0]]).expect("point");
    let projected = session
        .project_points(&with_normals, &part, ProjectionType::AlongNormalRecalc)
        .expect("projection");
    assert_eq!(projected.column(0), Some(&[5.0, 5.0, 0.0, 0.0, 0.0, 1.0][..]));
}
