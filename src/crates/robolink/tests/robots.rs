#![cfg(feature = "test-support")]
#[path = "link_support.rs"]
mod support;

use robolink::{ItemType, Joints, LinkError, Pose};
use support::TOLERANCE;

#[test]
fn moves_to_a_target_item() {
    let host = support::start_host();
    let session = support::open(&host);
    let robot = session.item_by_name("R1", Some(ItemType::Robot)).expect("lookup");
    let approach = session.item_by_name("Approach", None).expect("lookup");

    robot.move_j(&approach, true).expect("target is reachable");
    assert!(robot
        .joints()
        .expect("joints query")
        .approx_eq(&Joints::from([800.0, 0.0, -300.0, 0.0, 0.0, 0.0]), TOLERANCE));

    // TCP in the robot's reference frame, which is still its base.
    assert!(robot
        .pose()
        .expect("pose query")
        .approx_eq(&Pose::transl(800.0, 0.0, -200.0), TOLERANCE));
    let base = robot.pose_abs().expect("pose query");
    let tcp = base * robot.pose().expect("pose query");
    assert!(tcp.approx_eq(&approach.pose_abs().expect("pose query"), TOLERANCE));
    assert!(!robot.busy().expect("busy query"));
}

#[test]
fn inverse_kinematics_round_trips() {
    let host = support::start_host();
    let session = support::open(&host);
    let robot = session.item_by_name("R1", None).expect("lookup");

    let joints = Joints::from([100.0, -250.0, 400.0, 30.0, -20.0, 45.0]);
    let flange = robot.solve_fk(&joints).expect("forward kinematics");
    let nearest = robot
        .solve_ik(&flange, Some(&joints))
        .expect("inverse kinematics")
        .expect("pose is reachable");
    assert!(nearest.approx_eq(&joints, TOLERANCE));

    let all = robot.solve_ik_all(&flange).expect("inverse kinematics");
    assert_eq!(all.cols(), 2);
    assert_eq!(all.rows(), 8, "six joints plus two configuration rows");
    for solution in all.columns_as_joints(6) {
        let reached = robot.solve_fk(&solution).expect("forward kinematics");
        assert!(reached.approx_eq(&flange, TOLERANCE), "solution {solution} misses the pose");
    }
}

#[test]
fn unreachable_poses_have_no_solution() {
    let host = support::start_host();
    let session = support::open(&host);
    let robot = session.item_by_name("R1", None).expect("lookup");

    let far = Pose::transl(5000.0, 0.0, 0.0);
    assert_eq!(robot.solve_ik(&far, None).expect("inverse kinematics"), None);
    let all = robot.solve_ik_all(&far).expect("inverse kinematics");
    assert_eq!(all.cols(), 0);

    let err = robot
        .move_l(far, true)
        .expect_err("move to an unreachable pose");
    assert!(matches!(err, LinkError::Host { .. }), "unexpected error {err:?}");
    assert!(session.is_open());
}

#[test]
fn joint_limits_are_enforced() {
    let host = support::start_host();
    let session = support::open(&host);
    let robot = session.item_by_name("R1", None).expect("lookup");

    let (lower, upper) = robot.limits().expect("limits query");
    assert_eq!(lower.len(), 6);
    assert_eq!(upper[0], 2000.0);
    assert_eq!(lower[5], -180.0);

    let tight_lower = Joints::from([-2000.0, -2000.0, -2000.0, -180.0, -180.0, -90.0]);
    let tight_upper = Joints::from([2000.0, 2000.0, 2000.0, 180.0, 180.0, 90.0]);
    robot
        .set_limits(&tight_lower, &tight_upper)
        .expect("limits should apply");

    let err = robot
        .move_j(Joints::from([0.0, 0.0, 0.0, 0.0, 0.0, 120.0]), true)
        .expect_err("joint 6 is outside the limits");
    assert!(matches!(err, LinkError::Host { .. }), "unexpected error {err:?}");
    assert!(robot
        .joints()
        .expect("joints query")
        .approx_eq(&Joints::zeros(6), TOLERANCE));

    let err = robot
        .set_limits(&Joints::zeros(6), &Joints::zeros(5))
        .expect_err("mismatched limit vectors");
    assert!(matches!(err, LinkError::Type(_)));
}

#[test]
fn configuration_flags_follow_the_joints() {
    let host = support::start_host();
    let session = support::open(&host);
    let robot = session.item_by_name("R1", None).expect("lookup");

    let config = robot
        .joints_config(&Joints::from([-10.0, 0.0, -5.0, 0.0, 120.0, 0.0]))
        .expect("configuration query");
    assert!(config.rear && config.lower_arm && config.flip);
    assert_eq!(config.turns, 0);

    let config = robot
        .joints_config(&Joints::zeros(6))
        .expect("configuration query");
    assert!(!config.rear && !config.lower_arm && !config.flip);
}

#[test]
fn frames_and_tools_shape_cartesian_moves() {
    let host = support::start_host();
    let session = support::open(&host);
    let robot = session.item_by_name("R1", None).expect("lookup");
    let table = session.item_by_name("Table", None).expect("lookup");
    let torch = session.item_by_name("Torch", Some(ItemType::Tool)).expect("lookup");

    assert!(robot
        .tool()
        .expect("tool query")
        .approx_eq(&Pose::transl(0.0, 0.0, 100.0), TOLERANCE));

    robot.set_frame(&table).expect("frame should apply");
    assert!(robot
        .frame()
        .expect("frame query")
        .approx_eq(&Pose::transl(800.0, 0.0, -500.0), TOLERANCE));

    robot
        .move_l(Pose::transl(0.0, 0.0, 300.0), true)
        .expect("pose is reachable");
    assert!(robot
        .joints()
        .expect("joints query")
        .approx_eq(&Joints::from([800.0, 0.0, -300.0, 0.0, 0.0, 0.0]), TOLERANCE));
    assert!(robot
        .pose()
        .expect("pose query")
        .approx_eq(&Pose::transl(0.0, 0.0, 300.0), TOLERANCE));

    let long = robot
        .add_tool(&Pose::transl(0.0, 0.0, 250.0), "Long")
        .expect("tool should be added");
    assert_eq!(long.parent().expect("parent query"), robot);
    assert!(robot
        .tool()
        .expect("tool query")
        .approx_eq(&Pose::transl(0.0, 0.0, 250.0), TOLERANCE));

    robot.set_tool(&torch).expect("tool should apply");
    assert!(robot
        .tool()
        .expect("tool query")
        .approx_eq(&Pose::transl(0.0, 0.0, 100.0), TOLERANCE));
}

#[test]
fn targets_record_the_robot_position() {
    let host = support::start_host();
    let session = support::open(&host);
    let robot = session.item_by_name("R1", None).expect("lookup");
    let table = session.item_by_name("Table", None).expect("lookup");

    let joints = Joints::from([700.0, 50.0, -250.0, 10.0, 0.0, 0.0]);
    robot.move_j(&joints, true).expect("joints are within limits");
    let target = session
        .add_target("Taught", Some(&table), Some(&robot))
        .expect("target should be created");
    assert_eq!(target.kind(), Some(ItemType::Target));
    assert!(target.joints().expect("joints query").approx_eq(&joints, TOLERANCE));

    let base = robot.pose_abs().expect("pose query");
    let tcp = base * robot.pose().expect("pose query");
    assert!(target
        .pose_abs()
        .expect("pose query")
        .approx_eq(&tcp, TOLERANCE));

    assert!(!target.is_joint_target().expect("target query"));
    target.set_as_joint_target().expect("conversion should succeed");
    assert!(target.is_joint_target().expect("target query"));

    robot.move_j(Joints::zeros(6), true).expect("home is reachable");
    robot.move_l(&target, true).expect("joint target is reachable");
    assert!(robot.joints().expect("joints query").approx_eq(&joints, TOLERANCE));

    target.set_as_cartesian_target().expect("conversion should succeed");
    assert!(!target.is_joint_target().expect("target query"));
}

#[test]
fn circular_moves_end_at_the_second_point() {
    let host = support::start_host();
    let session = support::open(&host);
    let robot = session.item_by_name("R1", None).expect("lookup");

    robot
        .move_c(
            Pose::transl(100.0, 100.0, 0.0),
            Pose::transl(200.0, 0.0, 0.0),
            true,
        )
        .expect("both points are reachable");
    assert!(robot
        .pose()
        .expect("pose query")
        .approx_eq(&Pose::transl(200.0, 0.0, 0.0), TOLERANCE));
    robot.wait_move().expect("wait should return at once");
    robot.stop().expect("stop should succeed");
}

#[test]
fn home_joints_round_trip() {
    let host = support::start_host();
    let session = support::open(&host);
    let robot = session.item_by_name("R1", None).expect("lookup");
    assert_eq!(robot.home().expect("home query"), Joints::zeros(6));

    let home = Joints::from([0.0, 0.0, 100.0, 0.0, 45.0, 0.0]);
    robot.set_home(&home).expect("home should apply");
    assert_eq!(robot.home().expect("home query"), home);
    let err = robot
        .set_home(&Joints::zeros(3))
        .expect_err("home needs every joint");
    assert!(matches!(err, LinkError::Host { .. }));
}
