#![cfg(feature = "test-support")]
#[path = "link_support.rs"]
mod support;

use std::fs;

use pretty_assertions::assert_eq;
use robolink::{
    CodeKind, InstructionType, Item, ItemType, JointListOptions, Joints, MoveType, Pose, Session,
    Speed,
};
use support::TOLERANCE;
use tempfile::TempDir;

/// Program "Weld" on R1: approach, slow down, a 100 mm linear move, an
/// output and a pause.
fn weld_program(session: &Session) -> (Item, Item) {
    let robot = session.item_by_name("R1", Some(ItemType::Robot)).expect("lookup");
    let approach = session.item_by_name("Approach", None).expect("lookup");
    let program = session
        .add_program("Weld", Some(&robot))
        .expect("program should be created");
    program.move_j(&approach, false).expect("move should be recorded");
    program
        .set_speed(Speed::linear(250.0))
        .expect("speed should be recorded");
    program
        .move_l(Joints::from([800.0, 100.0, -300.0, 0.0, 0.0, 0.0]), false)
        .expect("move should be recorded");
    program.set_do("IO_1", "1").expect("output should be recorded");
    program.pause(500.0).expect("pause should be recorded");
    (program, robot)
}

fn names(program: &Item) -> Vec<String> {
    program
        .instructions()
        .expect("instruction listing")
        .into_iter()
        .map(|step| step.name)
        .collect()
}

#[test]
fn records_instructions() {
    let host = support::start_host();
    let session = support::open(&host);
    let (program, _) = weld_program(&session);

    assert_eq!(program.kind(), Some(ItemType::Program));
    assert_eq!(program.instruction_count().expect("count"), 5);

    let first = program.instruction(0).expect("instruction query");
    assert_eq!(first.name, "MoveJ (Approach)");
    assert_eq!(first.kind, InstructionType::Move);
    assert_eq!(first.move_type, Some(MoveType::Joint));
    assert!(!first.is_joint_target);
    // Target pose in the robot's frame, tool included.
    assert!(first.pose.approx_eq(&Pose::transl(800.0, 0.0, -200.0), TOLERANCE));

    let linear = program.instruction(2).expect("instruction query");
    assert_eq!(linear.name, "MoveL (joints)");
    assert!(linear.is_joint_target);
    assert!(linear.pose.approx_eq(&Pose::transl(800.0, 100.0, -200.0), TOLERANCE));

    let kinds: Vec<InstructionType> = program
        .instructions()
        .expect("instruction listing")
        .iter()
        .map(|step| step.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            InstructionType::Move,
            InstructionType::ChangeSpeed,
            InstructionType::Move,
            InstructionType::Event,
            InstructionType::Pause,
        ]
    );
    assert_eq!(names(&program)[4], "Pause (500 ms)");
}

#[test]
fn joint_moves_read_back_as_joint_targets() {
    let host = support::start_host();
    let session = support::open(&host);
    let robot = session.item_by_name("R1", None).expect("lookup");
    let program = session.add_program("P", Some(&robot)).expect("program");
    program
        .move_j(Joints::zeros(6), false)
        .expect("move should be recorded");

    let step = program.instruction(0).expect("instruction query");
    assert!(step.name.starts_with("MoveJ"));
    assert_eq!(step.kind, InstructionType::Move);
    assert_eq!(step.move_type, Some(MoveType::Joint));
    assert!(step.is_joint_target);
    assert_eq!(step.joints, Joints::zeros(6));
    // Forward kinematics of the home position with the torch mounted.
    assert!(step.pose.approx_eq(&Pose::transl(0.0, 0.0, 100.0), TOLERANCE));
}

#[test]
fn edits_instructions_in_place() {
    let host = support::start_host();
    let session = support::open(&host);
    let (program, _) = weld_program(&session);

    let mut pause = program.instruction(4).expect("instruction query");
    pause.name = "Pause (1000 ms)".to_string();
    program.set_instruction(4, &pause).expect("instruction should update");
    assert_eq!(program.instruction(4).expect("instruction query"), pause);

    assert_eq!(program.select_instruction(Some(0)).expect("select"), Some(0));
    program
        .run_code("Hello", CodeKind::Comment)
        .expect("comment should be recorded");
    program
        .wait_di("IO_2", "1", 250.0)
        .expect("wait should be recorded");
    assert_eq!(&names(&program)[1..3], &["Comment: Hello", "waitDI(IO_2=1, 250 ms)"]);

    assert_eq!(program.select_instruction(None).expect("select"), None);
    assert!(program.delete_instruction(1).expect("delete"));
    assert!(program.delete_instruction(1).expect("delete"));
    assert!(!program.delete_instruction(99).expect("delete"));
    assert_eq!(program.instruction_count().expect("count"), 5);

    program
        .move_instruction(0, &program, 3, true)
        .expect("reorder should succeed");
    assert_eq!(
        names(&program),
        vec![
            "Set Speed ([250.000, -1.000, -1.000, -1.000])",
            "MoveL (joints)",
            "setDO(IO_1=1)",
            "MoveJ (Approach)",
            "Pause (1000 ms)",
        ]
    );

    let other = session.add_program("Other", None).expect("program");
    program
        .move_instruction(4, &other, 0, false)
        .expect("move into an empty program");
    assert_eq!(names(&other), vec!["Pause (1000 ms)"]);
    assert_eq!(program.instruction_count().expect("count"), 4);

    let err = program
        .select_instruction(Some(10))
        .expect_err("index beyond the program");
    assert!(!err.is_fatal());
}

#[test]
fn frame_and_tool_changes_are_instructions() {
    let host = support::start_host();
    let session = support::open(&host);
    let table = session.item_by_name("Table", None).expect("lookup");
    let torch = session.item_by_name("Torch", None).expect("lookup");
    let program = session.add_program("Setup", None).expect("program");

    program.set_frame(&table).expect("frame change");
    program.set_tool(&torch).expect("tool change");
    program.set_rounding(5.0).expect("rounding change");
    program
        .run_code("Spindle", CodeKind::Call)
        .expect("call should be recorded");
    program
        .run_code("Ready", CodeKind::ShowMessage)
        .expect("message should be recorded");

    let steps = program.instructions().expect("instruction listing");
    assert_eq!(steps[0].kind, InstructionType::ChangeFrame);
    assert_eq!(steps[0].name, "Set Frame (Table)");
    assert!(steps[0].pose.approx_eq(&Pose::transl(800.0, 0.0, 0.0), TOLERANCE));
    assert_eq!(steps[1].name, "Set Tool (Torch)");
    assert_eq!(steps[2].name, "Set Rounding (5 mm)");
    assert_eq!(steps[3].kind, InstructionType::Code);
    assert_eq!(steps[4].kind, InstructionType::Print);
}

#[test]
fn samples_the_joint_path() {
    let host = support::start_host();
    let session = support::open(&host);
    let (program, _) = weld_program(&session);

    let list = program
        .instruction_list_joints(&JointListOptions::default())
        .expect("joint list");
    assert_eq!(list.status, 0, "{}", list.message);
    assert_eq!(list.matrix.rows(), 6 + 4);

    let samples = list.samples();
    // One sample for the first move, then one per millimetre of the 100 mm line.
    assert_eq!(samples.len(), 101);
    assert_eq!(samples[0].move_id, 0);
    assert!(samples[0]
        .joints
        .approx_eq(&Joints::from([800.0, 0.0, -300.0, 0.0, 0.0, 0.0]), TOLERANCE));
    let last = samples.last().expect("samples");
    assert_eq!(last.move_id, 2);
    assert_eq!(last.error, 0.0);
    assert!(last
        .joints
        .approx_eq(&Joints::from([800.0, 100.0, -300.0, 0.0, 0.0, 0.0]), TOLERANCE));

    let coarse = program
        .instruction_list_joints(&JointListOptions {
            mm_step: 10.0,
            ..JointListOptions::default()
        })
        .expect("joint list");
    assert_eq!(coarse.samples().len(), 11);
}

#[test]
fn writes_the_joint_path_as_csv() {
    let host = support::start_host();
    let session = support::open(&host);
    let (program, _) = weld_program(&session);
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("weld.csv");

    let list = program
        .instruction_list_joints_to_file(&JointListOptions::default(), &path)
        .expect("joint list");
    assert_eq!(list.status, 0);
    assert!(list.matrix.is_empty());

    let csv = fs::read_to_string(&path).expect("csv should be written");
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("J1,J2,J3,J4,J5,J6,Error,MmStep,DegStep,MoveId")
    );
    assert_eq!(lines.count(), 101);
}

#[test]
fn flags_samples_outside_the_limits() {
    let host = support::start_host();
    let session = support::open(&host);
    let robot = session.item_by_name("R1", None).expect("lookup");
    let program = session.add_program("Wild", Some(&robot)).expect("program");
    program
        .move_j(Joints::from([0.0, 0.0, 0.0, 0.0, 0.0, 250.0]), false)
        .expect("programs record moves without checking them");

    let list = program
        .instruction_list_joints(&JointListOptions::default())
        .expect("joint list");
    assert_eq!(list.status, -1);
    assert_eq!(list.samples()[0].error, 1.0);

    let check = program.update_program(false, 60.0, 1.0, 1.0).expect("update");
    assert!(!check.is_valid());
    assert_eq!(check.message, "1 instructions cannot be reached");
}

#[test]
fn updates_and_runs_the_program() {
    let host = support::start_host();
    let session = support::open(&host);
    let (program, robot) = weld_program(&session);

    let check = program.update_program(false, 60.0, 1.0, 1.0).expect("update");
    assert!(check.is_valid(), "{}", check.message);
    assert_eq!(check.valid_instructions, 5);
    assert_eq!(check.message, "Program OK");
    assert!((check.distance_mm - 100.0).abs() < TOLERANCE);

    assert_eq!(program.run_program(None).expect("run"), 2);
    assert!(robot
        .joints()
        .expect("joints query")
        .approx_eq(&Joints::from([800.0, 100.0, -300.0, 0.0, 0.0, 0.0]), TOLERANCE));
}

#[test]
fn generates_and_filters_program_files() {
    let host = support::start_host();
    let session = support::open(&host);
    let (program, robot) = weld_program(&session);
    let dir = TempDir::new().expect("temp dir");

    let generated = program.make_program(dir.path()).expect("make program");
    assert!(generated.success, "{}", generated.log);
    let file = dir.path().join("Weld.prg");
    let text = fs::read_to_string(&file).expect("program file should exist");
    assert!(text.starts_with("PROGRAM Weld\n"));
    assert!(text.contains("MoveJ (Approach)"));

    let summary = robot
        .filter_program(dir.path().join("missing.prg"))
        .expect("filter");
    assert_eq!(summary.status, -1);
    assert_eq!(summary.summary, "File not found");

    let summary = robot.filter_program(&file).expect("filter");
    assert_eq!(summary.status, 0);
    assert_eq!(summary.summary, format!("Filtered {} lines for R1", text.lines().count()));
}

#[test]
fn machining_builds_a_program_from_points() {
    let host = support::start_host();
    let session = support::open(&host);
    let robot = session.item_by_name("R1", None).expect("lookup");
    let part = session.item_by_name("Part", None).expect("lookup");
    let project = session
        .add_machining("Mill", Some(&robot))
        .expect("machining project");
    assert_eq!(project.kind(), Some(ItemType::Machining));

    let (generated, status) = project
        .set_machining_parameters(None, Some(&part), "")
        .expect("machining from part points");
    assert_eq!(status, 0);
    assert_eq!(generated.name().expect("name"), "Mill Program");
    let steps = generated.instructions().expect("instruction listing");
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0].name, "MoveL (point 1)");
    assert!(steps[0]
        .joints
        .approx_eq(&Joints::from([800.0, 0.0, -590.0, 0.0, 0.0, 0.0]), TOLERANCE));

    let dir = TempDir::new().expect("temp dir");
    let nc = dir.path().join("path.nc");
    fs::write(&nc, "0 0 0\n10 0 0\n; end\n").expect("nc file");
    let (generated, status) = project
        .set_machining_parameters(Some(nc.as_path()), None, "")
        .expect("machining from an NC file");
    assert_eq!(status, 0);
    assert_eq!(generated.instruction_count().expect("count"), 2);

    let (generated, status) = project
        .set_machining_parameters(Some(dir.path().join("missing.nc").as_path()), None, "")
        .expect("missing NC file is a status, not an error");
    assert_eq!(status, -1);
    assert!(!generated.is_some());
}
