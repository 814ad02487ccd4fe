//! What the fake host does for each command.
//!
//! Every handler consumes its arguments in schema order and returns the
//! reply payload, or a [`Fault`] the server turns into a status word.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::camera::CameraOptions;
use crate::command::{self, Command};
use crate::joints::Joints;
use crate::matrix::Matrix;
use crate::pose::Pose;
use crate::program::{Instruction, JointList};
use crate::spray::SprayOptions;
use crate::types::{InstructionType, ItemType, MoveType, ProjectionType, RunMode, SprayState};
use crate::wire::Value;

use super::fixture::StationFixture;
use super::kinematics;
use super::station::{Args, Fault, Handled, NodeData, ProgramData, Robot, Spray, Station};

type Handler = fn(&mut Station, &mut Args) -> Handled;

/// Parameter a test sets to answer the next `PickItem` with a named item.
pub const PICK_SELECTION: &str = "PICK_SELECTION";

const HANDLERS: &[(&Command, Handler)] = &[
    (&command::COMMAND, station_command),
    (&command::GET_PARAM, get_param),
    (&command::SET_PARAM, set_param),
    (&command::RENDER, no_reply),
    (&command::UPDATE, no_reply),
    (&command::SHOW_MESSAGE, no_reply),
    (&command::SET_WINDOW_STATE, no_reply),
    (&command::QUIT, no_reply),
    (&command::SET_RUN_MODE, set_run_mode),
    (&command::GET_RUN_MODE, get_run_mode),
    (&command::SET_SIMULATION_SPEED, set_simulation_speed),
    (&command::GET_SIMULATION_SPEED, get_simulation_speed),
    (&command::GET_ACTIVE_STATION, get_active_station),
    (&command::SET_ACTIVE_STATION, set_active_station),
    (&command::ADD_STATION, add_station),
    (&command::CLOSE_STATION, close_station),
    (&command::ADD_FILE, add_file),
    (&command::SAVE, save),
    (&command::ITEM_BY_NAME, item_by_name),
    (&command::ITEM_BY_NAME_TYPE, item_by_name_type),
    (&command::ITEM_LIST, item_list),
    (&command::ITEM_PICK, item_pick),
    (&command::VALID, valid),
    (&command::ADD_FRAME, add_frame),
    (&command::ADD_TARGET, add_target),
    (&command::ADD_PROGRAM, add_program),
    (&command::ADD_MACHINING, add_machining),
    (&command::ADD_SHAPE, add_shape),
    (&command::ADD_CURVE, add_curve),
    (&command::ADD_POINTS, add_points),
    (&command::PROJECT_POINTS, project_points),
    (&command::FILTER_PROGRAM, filter_program),
    (&command::CAMERA_ADD, camera_add),
    (&command::CAMERA_SNAPSHOT, camera_snapshot),
    (&command::CAMERA_CLOSE, camera_close),
    (&command::CAMERA_SET_PARAMS, camera_set_params),
    (&command::SPRAY_ADD, spray_add),
    (&command::SPRAY_SET_STATE, spray_set_state),
    (&command::SPRAY_STATS, spray_stats),
    (&command::SPRAY_CLEAR, spray_clear),
    (&command::GET_NAME, get_name),
    (&command::SET_NAME, set_name),
    (&command::GET_TYPE, get_type),
    (&command::GET_PARENT, get_parent),
    (&command::GET_CHILDREN, get_children),
    (&command::GET_VISIBLE, get_visible),
    (&command::SET_VISIBLE, set_visible),
    (&command::GET_POSE, get_pose),
    (&command::SET_POSE, set_pose),
    (&command::GET_POSE_ABS, get_pose_abs),
    (&command::SET_POSE_ABS, set_pose_abs),
    (&command::SET_PARENT, set_parent),
    (&command::SET_PARENT_STATIC, set_parent_static),
    (&command::DELETE, delete),
    (&command::SET_COLOR, set_color),
    (&command::GET_POINTS, get_points),
    (&command::GET_BOUNDING_BOX, get_bounding_box),
    (&command::GET_MESH, get_mesh),
    (&command::GET_JOINTS, get_joints),
    (&command::SET_JOINTS, set_joints),
    (&command::GET_HOME, get_home),
    (&command::SET_HOME, set_home),
    (&command::GET_LIMITS, get_limits),
    (&command::SET_LIMITS, set_limits),
    (&command::SOLVE_FK, solve_fk),
    (&command::SOLVE_IK, solve_ik),
    (&command::SOLVE_IK_ALL, solve_ik_all),
    (&command::JOINTS_CONFIG, joints_config),
    (&command::SET_FRAME_ITEM, set_frame_item),
    (&command::SET_FRAME_POSE, set_frame_pose),
    (&command::GET_FRAME, get_frame),
    (&command::SET_TOOL_ITEM, set_tool_item),
    (&command::SET_TOOL_POSE, set_tool_pose),
    (&command::GET_TOOL, get_tool),
    (&command::ADD_TOOL, add_tool),
    (&command::SET_AS_JOINT_TARGET, set_as_joint_target),
    (&command::SET_AS_CARTESIAN_TARGET, set_as_cartesian_target),
    (&command::IS_JOINT_TARGET, is_joint_target),
    (&command::MOVE, move_x),
    (&command::MOVE_BLOCKING, move_x),
    (&command::MOVE_C, move_c),
    (&command::MOVE_C_BLOCKING, move_c),
    (&command::BUSY, busy),
    (&command::WAIT_MOVE, robot_only),
    (&command::STOP, robot_only),
    (&command::INSTRUCTION_COUNT, instruction_count),
    (&command::INSTRUCTION_GET, instruction_get),
    (&command::INSTRUCTION_SET, instruction_set),
    (&command::INSTRUCTION_SELECT, instruction_select),
    (&command::INSTRUCTION_DELETE, instruction_delete),
    (&command::INSTRUCTION_MOVE, instruction_move),
    (&command::INSTRUCTION_LIST_JOINTS, instruction_list_joints),
    (&command::SET_SPEED, set_speed),
    (&command::SET_ROUNDING, set_rounding),
    (&command::SET_DO, set_do),
    (&command::WAIT_DI, wait_di),
    (&command::PAUSE, pause),
    (&command::RUN_INSTRUCTION, run_instruction),
    (&command::RUN_PROGRAM, run_program),
    (&command::PROGRAM_UPDATE, program_update),
    (&command::MAKE_PROGRAM, make_program),
    (&command::SET_MACHINING_PARAMS, set_machining_params),
];

impl Station {
    /// Execute one decoded request against the model.
    pub(crate) fn handle(&mut self, command: &Command, args: Vec<Value>) -> Handled {
        let handler = HANDLERS
            .iter()
            .find(|(known, _)| known.name == command.name)
            .map(|(_, handler)| *handler)
            .ok_or_else(|| Fault::host(format!("unsupported command {}", command.name)))?;
        handler(self, &mut Args::new(args))
    }

    fn robot_goal(&self, robot_id: i32, goal: &Goal) -> Result<Joints, Fault> {
        let robot = self.robot(robot_id)?;
        let flange = match goal {
            Goal::Joints(joints) => {
                if !robot.accepts(joints) {
                    return Err(Fault::host(format!("joints {joints} are outside the limits")));
                }
                return Ok(joints.clone());
            }
            Goal::Absolute(pose) => self.abs_pose(robot_id).invert() * *pose * robot.tool.invert(),
            Goal::InFrame(pose) => robot.frame * *pose * robot.tool.invert(),
        };
        self.reachable(robot_id, &flange, &robot.joints)?
            .ok_or_else(|| Fault::host("target is out of reach"))
    }

    /// Closest solution within the robot's limits.
    fn reachable(&self, robot_id: i32, flange: &Pose, approx: &Joints) -> Result<Option<Joints>, Fault> {
        let robot = self.robot(robot_id)?;
        Ok(kinematics::inverse_all(flange)
            .into_iter()
            .filter(|solution| robot.accepts(solution))
            .min_by(|a, b| {
                let da = a.max_abs_diff(approx).unwrap_or(f64::MAX);
                let db = b.max_abs_diff(approx).unwrap_or(f64::MAX);
                da.total_cmp(&db)
            }))
    }

    /// Drive a robot and let its sprays deposit particles.
    fn move_robot(&mut self, robot_id: i32, goal: &Goal) -> Result<(), Fault> {
        let joints = self.robot_goal(robot_id, goal)?;
        self.robot_mut(robot_id)?.joints = joints;
        let tools: Vec<i32> = self.node(robot_id)?.children.clone();
        for spray in self.sprays.values_mut() {
            if spray.on && (spray.tool == 0 || tools.contains(&spray.tool)) {
                spray.particles += spray.burst();
            }
        }
        Ok(())
    }

    fn program_robot(&self, program: i32) -> Option<i32> {
        match &self.nodes.get(&program)?.data {
            NodeData::Program(data) => Some(data.robot).filter(|robot| self.robot(*robot).is_ok()),
            _ => None,
        }
    }

    /// Instruction-only commands: append to programs, ignore on robots.
    fn add_instruction(&mut self, id: i32, instruction: Instruction) -> Handled {
        if self.is_program(id) {
            self.program_mut(id)?.insert(instruction);
            return Ok(Vec::new());
        }
        self.robot(id)?;
        Ok(Vec::new())
    }

    fn program_pose(&self, program: i32, joints: &Joints) -> Pose {
        match self.program_robot(program).and_then(|robot| self.robot(robot).ok()) {
            Some(robot) => robot.frame.invert() * kinematics::forward(joints) * robot.tool,
            None => Pose::IDENTITY,
        }
    }

    /// An absolute TCP pose in the program robot's active frame.
    fn frame_pose(&self, program: i32, absolute: &Pose) -> Pose {
        let Some(robot_id) = self.program_robot(program) else {
            return *absolute;
        };
        match self.robot(robot_id) {
            Ok(robot) => robot.frame.invert() * self.abs_pose(robot_id).invert() * *absolute,
            Err(_) => *absolute,
        }
    }
}

/// Where a move should end up.
enum Goal {
    Joints(Joints),
    /// Absolute pose of the TCP.
    Absolute(Pose),
    /// TCP relative to the robot's active reference frame.
    InFrame(Pose),
}

struct Resolved {
    label: String,
    goal: Goal,
    joints: Joints,
    joint_target: bool,
}

fn resolve(station: &Station, args: &mut Args) -> Result<Resolved, Fault> {
    let kind = args.int()?;
    let joints = args.joints()?;
    let pose = args.pose()?;
    let target = args.item()?;
    match kind {
        1 => {
            let node = station.node(target)?;
            let (stored, joint_target) = match &node.data {
                NodeData::Target {
                    joints,
                    joint_target,
                    ..
                } => (joints.clone(), *joint_target),
                _ => (Joints::default(), false),
            };
            let goal = if joint_target && !stored.is_empty() {
                Goal::Joints(stored.clone())
            } else {
                Goal::Absolute(station.abs_pose(target))
            };
            Ok(Resolved {
                label: node.name.clone(),
                goal,
                joints: stored,
                joint_target,
            })
        }
        2 => Ok(Resolved {
            label: "joints".to_string(),
            goal: Goal::Joints(joints.clone()),
            joints,
            joint_target: true,
        }),
        3 => Ok(Resolved {
            label: "pose".to_string(),
            goal: Goal::InFrame(pose),
            joints: Joints::default(),
            joint_target: false,
        }),
        other => Err(Fault::host(format!("unknown target kind {other}"))),
    }
}

fn instruction(name: impl Into<String>, kind: InstructionType) -> Instruction {
    Instruction {
        name: name.into(),
        kind,
        move_type: None,
        is_joint_target: false,
        pose: Pose::IDENTITY,
        joints: Joints::default(),
    }
}

fn move_instruction(station: &Station, program: i32, move_type: MoveType, target: Resolved) -> Instruction {
    let prefix = match move_type {
        MoveType::Joint => "MoveJ",
        MoveType::Linear => "MoveL",
        MoveType::Circular => "MoveC",
    };
    let pose = match &target.goal {
        Goal::Joints(joints) => station.program_pose(program, joints),
        Goal::InFrame(pose) => *pose,
        Goal::Absolute(absolute) => station.frame_pose(program, absolute),
    };
    Instruction {
        name: format!("{prefix} ({})", target.label),
        kind: InstructionType::Move,
        move_type: Some(move_type),
        is_joint_target: target.joint_target,
        pose,
        joints: target.joints,
    }
}

fn item_kind(code: i32) -> Result<Option<ItemType>, Fault> {
    match ItemType::from_code(code) {
        Some(ItemType::Any) => Ok(None),
        Some(kind) => Ok(Some(kind)),
        None => Err(Fault::host(format!("unknown item type {code}"))),
    }
}

fn host_io(path: &Path, err: impl std::fmt::Display) -> Fault {
    Fault::host(format!("{}: {err}", path.display()))
}

fn no_reply(_: &mut Station, _: &mut Args) -> Handled {
    Ok(Vec::new())
}

// Session and station level.

fn station_command(_: &mut Station, args: &mut Args) -> Handled {
    let name = args.string()?;
    let value = args.string()?;
    debug!(%name, %value, "station command");
    Ok(vec![Value::Str("OK".to_string())])
}

fn reserved_path(station: &Station, key: &str) -> Option<PathBuf> {
    let base = std::env::temp_dir().join("robolink-fake-host");
    match key {
        "PATH_OPENSTATION" => {
            let name = station.nodes.get(&station.active).map(|node| node.name.as_str())?;
            Some(base.join(format!("{name}.rdk")))
        }
        "PATH_LIBRARY" => Some(base.join("Library")),
        "PATH_PROGRAMS" => Some(base.join("Programs")),
        "PATH_DESKTOP" => Some(dirs::desktop_dir().unwrap_or_else(|| base.join("Desktop"))),
        _ => None,
    }
}

fn get_param(station: &mut Station, args: &mut Args) -> Handled {
    let key = args.string()?;
    let value = match station.param(&key) {
        Some(value) => value.to_string(),
        None => match reserved_path(station, &key) {
            Some(path) => path.display().to_string(),
            None => format!("UNKNOWN {key}"),
        },
    };
    Ok(vec![Value::Str(value)])
}

fn set_param(station: &mut Station, args: &mut Args) -> Handled {
    let key = args.string()?;
    let value = args.string()?;
    station.set_param(key, value);
    Ok(Vec::new())
}

fn set_run_mode(station: &mut Station, args: &mut Args) -> Handled {
    let code = args.int()?;
    station.run_mode =
        RunMode::from_code(code).ok_or_else(|| Fault::host(format!("unknown run mode {code}")))?;
    Ok(Vec::new())
}

fn get_run_mode(station: &mut Station, _: &mut Args) -> Handled {
    Ok(vec![Value::Int(station.run_mode.code())])
}

fn set_simulation_speed(station: &mut Station, args: &mut Args) -> Handled {
    let speed = args.int()?;
    if speed <= 0 {
        return Err(Fault::host(format!("simulation speed must be positive, got {speed}")));
    }
    station.simulation_speed = speed;
    Ok(Vec::new())
}

fn get_simulation_speed(station: &mut Station, _: &mut Args) -> Handled {
    Ok(vec![Value::Int(station.simulation_speed)])
}

fn get_active_station(station: &mut Station, _: &mut Args) -> Handled {
    Ok(vec![Value::Item(station.active)])
}

fn set_active_station(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    if station.node(id)?.kind != ItemType::Station {
        return Err(Fault::host(format!("item {id} is not a station")));
    }
    station.active = id;
    Ok(Vec::new())
}

fn add_station(station: &mut Station, args: &mut Args) -> Handled {
    let name = args.string()?;
    Ok(vec![Value::Item(station.load(&StationFixture::new(name)))])
}

fn close_station(station: &mut Station, _: &mut Args) -> Handled {
    station.remove(station.active)?;
    Ok(Vec::new())
}

fn add_file(station: &mut Station, args: &mut Args) -> Handled {
    let path = PathBuf::from(args.string()?);
    let parent = args.item()?;
    if !path.is_file() {
        return Err(Fault::host(format!("file not found: {}", path.display())));
    }
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if extension == "rdk" {
        let fixture = StationFixture::from_file(&path).map_err(|err| host_io(&path, err))?;
        return Ok(vec![Value::Item(station.load(&fixture))]);
    }
    let parent = station.parent_or_station(parent)?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Item".to_string());
    let id = match extension.as_str() {
        "robot" => {
            let data = NodeData::Robot(Robot::new(Joints::zeros(kinematics::AXES)));
            station.insert(parent, &name, ItemType::Robot, Pose::IDENTITY, data)
        }
        "tool" => {
            let id = station.insert(parent, &name, ItemType::Tool, Pose::IDENTITY, NodeData::Plain);
            station.attach_tool(id);
            id
        }
        _ => station.insert(
            parent,
            &name,
            ItemType::Object,
            Pose::IDENTITY,
            NodeData::Object {
                points: Matrix::empty(),
                triangles: Matrix::empty(),
            },
        ),
    };
    Ok(vec![Value::Item(id)])
}

fn save(station: &mut Station, args: &mut Args) -> Handled {
    let path = PathBuf::from(args.string()?);
    let item = args.item()?;
    let root = if item == 0 {
        station.active
    } else {
        station.node(item)?;
        station.station_of(item)
    };
    let json = station
        .to_fixture(root)
        .to_json()
        .map_err(|err| host_io(&path, err))?;
    fs::write(&path, json).map_err(|err| host_io(&path, err))?;
    Ok(Vec::new())
}

// Lookup.

fn item_by_name(station: &mut Station, args: &mut Args) -> Handled {
    let name = args.string()?;
    Ok(vec![Value::Item(station.find(&name, None))])
}

fn item_by_name_type(station: &mut Station, args: &mut Args) -> Handled {
    let name = args.string()?;
    let kind = item_kind(args.int()?)?;
    Ok(vec![Value::Item(station.find(&name, kind))])
}

fn item_list(station: &mut Station, args: &mut Args) -> Handled {
    let kind = item_kind(args.int()?)?;
    let recursive = args.int()? != 0;
    let ids = station
        .station_items(recursive)
        .into_iter()
        .filter(|id| {
            kind.map_or(true, |kind| {
                station.nodes.get(id).is_some_and(|node| node.kind == kind)
            })
        })
        .collect();
    Ok(vec![Value::ItemList(ids)])
}

/// Answers with the item named by [`PICK_SELECTION`]; a cancelled pick
/// when it is unset.
fn item_pick(station: &mut Station, args: &mut Args) -> Handled {
    let _prompt = args.string()?;
    let kind = item_kind(args.int()?)?;
    let picked = station
        .param(PICK_SELECTION)
        .map(|name| station.find(name, kind))
        .unwrap_or(0);
    Ok(vec![Value::Item(picked)])
}

fn valid(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let valid = station.nodes.contains_key(&id) || station.sprays.contains_key(&id);
    Ok(vec![Value::Int(valid.into())])
}

// Creation.

fn add_frame(station: &mut Station, args: &mut Args) -> Handled {
    let name = args.string()?;
    let parent = station.parent_or_station(args.item()?)?;
    let id = station.insert(parent, &name, ItemType::Frame, Pose::IDENTITY, NodeData::Plain);
    Ok(vec![Value::Item(id)])
}

/// A target linked to a robot records the robot's current position.
fn add_target(station: &mut Station, args: &mut Args) -> Handled {
    let name = args.string()?;
    let parent = station.parent_or_station(args.item()?)?;
    let robot = args.item()?;
    let (joints, pose) = if robot == 0 {
        (Joints::default(), Pose::IDENTITY)
    } else {
        let data = station.robot(robot)?;
        let absolute = station.abs_pose(robot) * kinematics::forward(&data.joints) * data.tool;
        (data.joints.clone(), station.abs_pose(parent).invert() * absolute)
    };
    let id = station.insert(
        parent,
        &name,
        ItemType::Target,
        pose,
        NodeData::Target {
            joints,
            joint_target: false,
            robot,
        },
    );
    Ok(vec![Value::Item(id)])
}

fn add_program(station: &mut Station, args: &mut Args) -> Handled {
    let name = args.string()?;
    let robot = args.item()?;
    if robot != 0 {
        station.robot(robot)?;
    }
    let data = NodeData::Program(ProgramData {
        robot,
        ..ProgramData::default()
    });
    let id = station.insert(station.active, &name, ItemType::Program, Pose::IDENTITY, data);
    Ok(vec![Value::Item(id)])
}

fn add_machining(station: &mut Station, args: &mut Args) -> Handled {
    let name = args.string()?;
    let robot = args.item()?;
    if robot != 0 {
        station.robot(robot)?;
    }
    let id = station.insert(
        station.active,
        &name,
        ItemType::Machining,
        Pose::IDENTITY,
        NodeData::Machining { robot },
    );
    Ok(vec![Value::Item(id)])
}

fn add_shape(station: &mut Station, args: &mut Args) -> Handled {
    let triangles = args.matrix()?;
    let add_to = args.item()?;
    let replace = args.int()? != 0;
    if !matches!(triangles.rows(), 3 | 6) || triangles.cols() % 3 != 0 {
        return Err(Fault::host(format!(
            "triangles must be 3xN or 6xN with N a multiple of 3, got {}x{}",
            triangles.rows(),
            triangles.cols()
        )));
    }
    if add_to == 0 {
        let name = format!("Shape {}", station.nodes.len());
        let data = NodeData::Object {
            points: Matrix::empty(),
            triangles,
        };
        let id = station.insert(station.active, &name, ItemType::Object, Pose::IDENTITY, data);
        return Ok(vec![Value::Item(id)]);
    }
    match &mut station.node_mut(add_to)?.data {
        NodeData::Object {
            triangles: existing,
            ..
        } => {
            *existing = if replace || existing.is_empty() {
                triangles
            } else {
                existing
                    .hcat(&triangles)
                    .map_err(|err| Fault::host(err.to_string()))?
            };
            Ok(vec![Value::Item(add_to)])
        }
        _ => Err(Fault::host(format!("item {add_to} is not an object"))),
    }
}

/// The fake surfaces are the reference frame's XY plane.
fn project(points: &Matrix, projection: ProjectionType) -> Matrix {
    if projection == ProjectionType::None || points.cols() == 0 {
        return points.clone();
    }
    let moves = !matches!(projection, ProjectionType::Recalc);
    let renormal = matches!(
        projection,
        ProjectionType::AlongNormalRecalc | ProjectionType::ClosestRecalc | ProjectionType::Recalc
    );
    let columns: Vec<Vec<f64>> = points
        .columns()
        .map(|column| {
            let mut column = column.to_vec();
            if moves && column.len() >= 3 {
                column[2] = 0.0;
            }
            if renormal && column.len() >= 6 {
                column[3..6].copy_from_slice(&[0.0, 0.0, 1.0]);
            }
            column
        })
        .collect();
    Matrix::from_columns(&columns).unwrap_or_else(|_| points.clone())
}

fn projection_arg(args: &mut Args) -> Result<ProjectionType, Fault> {
    let code = args.int()?;
    ProjectionType::from_code(code).ok_or_else(|| Fault::host(format!("unknown projection {code}")))
}

fn add_geometry(station: &mut Station, args: &mut Args, label: &str) -> Handled {
    let points = args.matrix()?;
    let reference = args.item()?;
    let add_to_reference = args.int()? != 0;
    let projection = projection_arg(args)?;
    if points.cols() > 0 && points.rows() < 3 {
        return Err(Fault::host(format!("points need at least 3 rows, got {}", points.rows())));
    }
    let points = if reference == 0 {
        points
    } else {
        station.node(reference)?;
        project(&points, projection)
    };
    if add_to_reference && reference != 0 {
        if let NodeData::Object {
            points: existing, ..
        } = &mut station.node_mut(reference)?.data
        {
            *existing = if existing.is_empty() {
                points
            } else {
                existing
                    .hcat(&points)
                    .map_err(|err| Fault::host(err.to_string()))?
            };
            return Ok(vec![Value::Item(reference)]);
        }
        return Err(Fault::host(format!("item {reference} is not an object")));
    }
    let pose = station.abs_pose(reference);
    let data = NodeData::Object {
        points,
        triangles: Matrix::empty(),
    };
    let id = station.insert(station.active, label, ItemType::Object, pose, data);
    Ok(vec![Value::Item(id)])
}

fn add_curve(station: &mut Station, args: &mut Args) -> Handled {
    add_geometry(station, args, "Curve")
}

fn add_points(station: &mut Station, args: &mut Args) -> Handled {
    add_geometry(station, args, "Points")
}

fn project_points(station: &mut Station, args: &mut Args) -> Handled {
    let points = args.matrix()?;
    station.node(args.item()?)?;
    let projection = projection_arg(args)?;
    Ok(vec![Value::Matrix(project(&points, projection))])
}

fn filter_program(station: &mut Station, args: &mut Args) -> Handled {
    let robot = args.item()?;
    let path = PathBuf::from(args.string()?);
    let name = station.node(robot)?.name.clone();
    station.robot(robot)?;
    match fs::read_to_string(&path) {
        Ok(text) => {
            let lines = text.lines().filter(|line| !line.trim().is_empty()).count();
            Ok(vec![
                Value::Int(0),
                Value::Str(format!("Filtered {lines} lines for {name}")),
            ])
        }
        Err(_) => Ok(vec![Value::Int(-1), Value::Str("File not found".to_string())]),
    }
}

// Cameras.

fn camera_options(text: &str) -> Result<CameraOptions, Fault> {
    CameraOptions::parse(text).map_err(|err| Fault::host(err.to_string()))
}

fn camera_add(station: &mut Station, args: &mut Args) -> Handled {
    let frame = station.parent_or_station(args.item()?)?;
    let options = camera_options(&args.string()?)?;
    let name = format!("Camera {}", station.nodes.len());
    let id = station.insert(
        frame,
        &name,
        ItemType::Camera,
        Pose::IDENTITY,
        NodeData::Camera { options },
    );
    Ok(vec![Value::Item(id)])
}

/// Depth maps get a synthetic ramp with a hole at the origin pixel; color
/// snapshots are a flat PPM in the background color.
fn write_snapshot(path: &Path, options: &CameraOptions) -> std::io::Result<()> {
    let (width, height) = options.snapshot.or(options.size).unwrap_or((32, 24));
    let mut bytes = Vec::new();
    if options.depth {
        for value in [width, height] {
            bytes.extend_from_slice(&(value as i32).to_be_bytes());
        }
        for y in 0..height {
            for x in 0..width {
                let depth: i32 = if x == 0 && y == 0 { 0 } else { (1000 + x + y) as i32 };
                bytes.extend_from_slice(&depth.to_be_bytes());
            }
        }
    } else {
        bytes.extend_from_slice(format!("P6\n{width} {height}\n255\n").as_bytes());
        bytes.resize(bytes.len() + (width * height * 3) as usize, 0);
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)
}

fn camera_snapshot(station: &mut Station, args: &mut Args) -> Handled {
    let path = PathBuf::from(args.string()?);
    let camera = args.item()?;
    let overrides = args.string()?;
    let mut options = if camera == 0 {
        CameraOptions::default()
    } else {
        match &station.node(camera)?.data {
            NodeData::Camera { options } => options.clone(),
            _ => return Err(Fault::host(format!("item {camera} is not a camera"))),
        }
    };
    if !overrides.trim().is_empty() {
        options = camera_options(&overrides)?;
    }
    if path.as_os_str().is_empty() {
        return Ok(vec![Value::Int(0)]);
    }
    let written = match write_snapshot(&path, &options) {
        Ok(()) => 1,
        Err(err) => {
            debug!(path = %path.display(), %err, "snapshot failed");
            0
        }
    };
    Ok(vec![Value::Int(written)])
}

fn camera_close(station: &mut Station, args: &mut Args) -> Handled {
    let camera = args.item()?;
    let cameras: Vec<i32> = station
        .nodes
        .iter()
        .filter(|(id, node)| {
            matches!(node.data, NodeData::Camera { .. }) && (camera == 0 || **id == camera)
        })
        .map(|(id, _)| *id)
        .collect();
    for id in &cameras {
        station.remove(*id)?;
    }
    Ok(vec![Value::Int((!cameras.is_empty()).into())])
}

fn camera_set_params(station: &mut Station, args: &mut Args) -> Handled {
    let camera = args.item()?;
    let parsed = camera_options(&args.string()?)?;
    match &mut station.node_mut(camera)?.data {
        NodeData::Camera { options } => {
            *options = parsed;
            Ok(vec![Value::Int(1)])
        }
        _ => Ok(vec![Value::Int(0)]),
    }
}

// Spray guns.

fn spray_add(station: &mut Station, args: &mut Args) -> Handled {
    let tool = args.item()?;
    let object = args.item()?;
    let options = SprayOptions::parse(&args.string()?).map_err(|err| Fault::host(err.to_string()))?;
    let _volume = args.matrix()?;
    for id in [tool, object].into_iter().filter(|id| *id != 0) {
        station.node(id)?;
    }
    let id = station.allocate_id();
    station.sprays.insert(
        id,
        Spray {
            tool,
            object,
            options,
            on: false,
            particles: 0,
        },
    );
    Ok(vec![Value::Item(id)])
}

fn selected_sprays(station: &Station, spray: i32) -> Result<Vec<i32>, Fault> {
    if spray == 0 {
        return Ok(station.sprays.keys().copied().collect());
    }
    if !station.sprays.contains_key(&spray) {
        return Err(Fault::InvalidItem(format!("spray {spray} does not exist")));
    }
    Ok(vec![spray])
}

fn spray_set_state(station: &mut Station, args: &mut Args) -> Handled {
    let spray = args.item()?;
    let code = args.int()?;
    let state =
        SprayState::from_code(code).ok_or_else(|| Fault::host(format!("unknown spray state {code}")))?;
    let ids = selected_sprays(station, spray)?;
    for id in &ids {
        if let Some(spray) = station.sprays.get_mut(id) {
            spray.on = state == SprayState::On;
        }
    }
    Ok(vec![Value::Int(ids.len() as i32)])
}

/// Data rows: spray id, deposited particles, target object, on flag.
fn spray_stats(station: &mut Station, args: &mut Args) -> Handled {
    let ids = selected_sprays(station, args.item()?)?;
    let columns: Vec<[f64; 4]> = ids
        .iter()
        .filter_map(|id| station.sprays.get(id).map(|spray| (id, spray)))
        .map(|(id, spray)| {
            [
                f64::from(*id),
                spray.particles as f64,
                f64::from(spray.object),
                if spray.on { 1.0 } else { 0.0 },
            ]
        })
        .collect();
    let total: f64 = columns.iter().map(|column| column[1]).sum();
    let data = if columns.is_empty() {
        Matrix::zeros(4, 0)
    } else {
        Matrix::from_columns(&columns).map_err(|err| Fault::host(err.to_string()))?
    };
    Ok(vec![
        Value::Str(format!("{} particles from {} spray guns", total, ids.len())),
        Value::Matrix(data),
    ])
}

fn spray_clear(station: &mut Station, args: &mut Args) -> Handled {
    let ids = selected_sprays(station, args.item()?)?;
    for id in &ids {
        if let Some(spray) = station.sprays.get_mut(id) {
            spray.particles = 0;
        }
    }
    Ok(vec![Value::Int(ids.len() as i32)])
}

// Generic item operations.

fn get_name(station: &mut Station, args: &mut Args) -> Handled {
    Ok(vec![Value::Str(station.node(args.item()?)?.name.clone())])
}

fn set_name(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    station.node_mut(id)?.name = args.string()?;
    Ok(Vec::new())
}

fn get_type(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    if station.sprays.contains_key(&id) {
        return Ok(vec![Value::Int(ItemType::Any.code())]);
    }
    Ok(vec![Value::Int(station.node(id)?.kind.code())])
}

fn get_parent(station: &mut Station, args: &mut Args) -> Handled {
    Ok(vec![Value::Item(station.node(args.item()?)?.parent)])
}

fn get_children(station: &mut Station, args: &mut Args) -> Handled {
    Ok(vec![Value::ItemList(station.node(args.item()?)?.children.clone())])
}

fn get_visible(station: &mut Station, args: &mut Args) -> Handled {
    Ok(vec![Value::Int(station.node(args.item()?)?.visible.into())])
}

fn set_visible(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let visible = args.int()? != 0;
    let _frame = args.int()?;
    station.node_mut(id)?.visible = visible;
    Ok(Vec::new())
}

/// Robots report their TCP in the active frame.
fn get_pose(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let pose = match station.robot_tcp(id) {
        Ok(tcp) => tcp,
        Err(_) => station.node(id)?.pose,
    };
    Ok(vec![Value::Pose(pose)])
}

/// Setting a robot's pose moves it there.
fn set_pose(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let pose = args.pose()?;
    if station.robot(id).is_ok() {
        station.move_robot(id, &Goal::InFrame(pose))?;
    } else {
        station.node_mut(id)?.pose = pose;
    }
    Ok(Vec::new())
}

fn get_pose_abs(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    station.node(id)?;
    Ok(vec![Value::Pose(station.abs_pose(id))])
}

fn set_pose_abs(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let pose = args.pose()?;
    let parent = station.node(id)?.parent;
    let local = station.abs_pose(parent).invert() * pose;
    station.node_mut(id)?.pose = local;
    Ok(Vec::new())
}

fn set_parent(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let parent = args.item()?;
    station.reparent(id, parent, false)?;
    Ok(Vec::new())
}

fn set_parent_static(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let parent = args.item()?;
    station.reparent(id, parent, true)?;
    Ok(Vec::new())
}

fn delete(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    if station.sprays.remove(&id).is_none() {
        station.remove(id)?;
    }
    Ok(Vec::new())
}

fn set_color(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let color = args.joints()?;
    station.node(id)?;
    if color.len() != 4 || color.iter().any(|c| !(0.0..=1.0).contains(c)) {
        return Err(Fault::host(format!("color must be 4 values in [0, 1], got {color}")));
    }
    Ok(Vec::new())
}

fn object_data(station: &Station, id: i32) -> Result<(Matrix, Matrix), Fault> {
    match &station.node(id)?.data {
        NodeData::Object { points, triangles } => Ok((points.clone(), triangles.clone())),
        _ => Ok((Matrix::empty(), Matrix::empty())),
    }
}

fn get_points(station: &mut Station, args: &mut Args) -> Handled {
    let (points, _) = object_data(station, args.item()?)?;
    Ok(vec![Value::Matrix(points)])
}

/// Two columns, minimum and maximum corner, over points and mesh vertices.
fn get_bounding_box(station: &mut Station, args: &mut Args) -> Handled {
    let (points, triangles) = object_data(station, args.item()?)?;
    let mut low = [f64::MAX; 3];
    let mut high = [f64::MIN; 3];
    let mut any = false;
    for column in points.columns().chain(triangles.columns()) {
        if column.len() < 3 {
            continue;
        }
        any = true;
        for axis in 0..3 {
            low[axis] = low[axis].min(column[axis]);
            high[axis] = high[axis].max(column[axis]);
        }
    }
    if !any {
        return Ok(vec![Value::Matrix(Matrix::empty())]);
    }
    let bbox = Matrix::from_columns(&[low, high]).map_err(|err| Fault::host(err.to_string()))?;
    Ok(vec![Value::Matrix(bbox)])
}

fn get_mesh(station: &mut Station, args: &mut Args) -> Handled {
    let (_, triangles) = object_data(station, args.item()?)?;
    Ok(vec![Value::Matrix(triangles)])
}

// Robots and mechanisms.

fn get_joints(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let joints = match &station.node(id)?.data {
        NodeData::Robot(robot) => robot.joints.clone(),
        NodeData::Target { joints, .. } => joints.clone(),
        _ => return Err(Fault::host(format!("item {id} has no joints"))),
    };
    Ok(vec![Value::Joints(joints)])
}

fn set_joints(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let joints = args.joints()?;
    if station.robot(id).is_ok() {
        station.move_robot(id, &Goal::Joints(joints))?;
        return Ok(Vec::new());
    }
    let linked = match &station.node(id)?.data {
        NodeData::Target { robot, .. } => *robot,
        _ => return Err(Fault::host(format!("item {id} has no joints"))),
    };
    let pose = station.robot(linked).ok().map(|robot| {
        let absolute = station.abs_pose(linked) * kinematics::forward(&joints) * robot.tool;
        let parent = station.nodes.get(&id).map_or(0, |node| node.parent);
        station.abs_pose(parent).invert() * absolute
    });
    let node = station.node_mut(id)?;
    if let Some(pose) = pose {
        node.pose = pose;
    }
    if let NodeData::Target { joints: stored, .. } = &mut node.data {
        *stored = joints;
    }
    Ok(Vec::new())
}

fn get_home(station: &mut Station, args: &mut Args) -> Handled {
    Ok(vec![Value::Joints(station.robot(args.item()?)?.home.clone())])
}

fn set_home(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let joints = args.joints()?;
    let robot = station.robot_mut(id)?;
    if joints.len() != robot.joints.len() {
        return Err(Fault::host(format!("home needs {} joints", robot.joints.len())));
    }
    robot.home = joints;
    Ok(Vec::new())
}

fn get_limits(station: &mut Station, args: &mut Args) -> Handled {
    let robot = station.robot(args.item()?)?;
    Ok(vec![
        Value::Joints(robot.lower.clone()),
        Value::Joints(robot.upper.clone()),
        Value::Int(0),
    ])
}

fn set_limits(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let lower = args.joints()?;
    let upper = args.joints()?;
    let robot = station.robot_mut(id)?;
    let n = robot.joints.len();
    if lower.len() != n || upper.len() != n {
        return Err(Fault::host(format!("limits need {n} joints each")));
    }
    if lower.iter().zip(upper.iter()).any(|(lo, hi)| lo > hi) {
        return Err(Fault::host("lower limit above upper limit"));
    }
    robot.lower = lower;
    robot.upper = upper;
    Ok(Vec::new())
}

fn solve_fk(station: &mut Station, args: &mut Args) -> Handled {
    station.robot(args.item()?)?;
    let joints = args.joints()?;
    Ok(vec![Value::Pose(kinematics::forward(&joints))])
}

/// Unreachable poses answer with empty joints, not a fault.
fn solve_ik(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let pose = args.pose()?;
    let approx = args.joints()?;
    let approx = if approx.is_empty() {
        station.robot(id)?.joints.clone()
    } else {
        approx
    };
    let joints = station.reachable(id, &pose, &approx)?.unwrap_or_default();
    Ok(vec![Value::Joints(joints)])
}

/// One column per solution: the joints, then the flip flag and index.
fn solve_ik_all(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let pose = args.pose()?;
    let robot = station.robot(id)?;
    let columns: Vec<Vec<f64>> = kinematics::inverse_all(&pose)
        .into_iter()
        .enumerate()
        .filter(|(_, solution)| robot.accepts(solution))
        .map(|(index, solution)| {
            let flip = kinematics::configuration(&solution)[2];
            let mut column = solution.into_vec();
            column.extend([flip, index as f64]);
            column
        })
        .collect();
    let matrix = if columns.is_empty() {
        Matrix::zeros(robot.joints.len() + 2, 0)
    } else {
        Matrix::from_columns(&columns).map_err(|err| Fault::host(err.to_string()))?
    };
    Ok(vec![Value::Matrix(matrix)])
}

fn joints_config(station: &mut Station, args: &mut Args) -> Handled {
    station.robot(args.item()?)?;
    let joints = args.joints()?;
    Ok(vec![Value::Joints(kinematics::configuration(&joints))])
}

fn set_frame(station: &mut Station, subject: i32, frame: Pose, label: &str) -> Handled {
    if station.is_program(subject) {
        let mut change = instruction(format!("Set Frame ({label})"), InstructionType::ChangeFrame);
        change.pose = frame;
        return station.add_instruction(subject, change);
    }
    station.robot_mut(subject)?.frame = frame;
    Ok(Vec::new())
}

fn set_tool(station: &mut Station, subject: i32, tool: Pose, label: &str) -> Handled {
    if station.is_program(subject) {
        let mut change = instruction(format!("Set Tool ({label})"), InstructionType::ChangeTool);
        change.pose = tool;
        return station.add_instruction(subject, change);
    }
    station.robot_mut(subject)?.tool = tool;
    Ok(Vec::new())
}

/// The frame item's pose as seen from the robot base.
fn set_frame_item(station: &mut Station, args: &mut Args) -> Handled {
    let subject = args.item()?;
    let frame = args.item()?;
    let label = station.node(frame)?.name.clone();
    let base = match station.program_robot(subject) {
        Some(robot) => robot,
        None => subject,
    };
    let pose = station.abs_pose(base).invert() * station.abs_pose(frame);
    set_frame(station, subject, pose, &label)
}

fn set_frame_pose(station: &mut Station, args: &mut Args) -> Handled {
    let subject = args.item()?;
    let pose = args.pose()?;
    set_frame(station, subject, pose, "pose")
}

fn get_frame(station: &mut Station, args: &mut Args) -> Handled {
    Ok(vec![Value::Pose(station.robot(args.item()?)?.frame)])
}

fn set_tool_item(station: &mut Station, args: &mut Args) -> Handled {
    let subject = args.item()?;
    let tool = args.item()?;
    let node = station.node(tool)?;
    let (label, tcp) = (node.name.clone(), node.pose);
    set_tool(station, subject, tcp, &label)
}

fn set_tool_pose(station: &mut Station, args: &mut Args) -> Handled {
    let subject = args.item()?;
    let pose = args.pose()?;
    set_tool(station, subject, pose, "pose")
}

fn get_tool(station: &mut Station, args: &mut Args) -> Handled {
    Ok(vec![Value::Pose(station.robot(args.item()?)?.tool)])
}

fn add_tool(station: &mut Station, args: &mut Args) -> Handled {
    let robot = args.item()?;
    let tcp = args.pose()?;
    let name = args.string()?;
    station.robot(robot)?;
    let id = station.insert(robot, &name, ItemType::Tool, tcp, NodeData::Plain);
    station.attach_tool(id);
    Ok(vec![Value::Item(id)])
}

/// Converting a target without joints solves them from its pose.
fn set_as_joint_target(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let (missing, robot) = match &station.node(id)?.data {
        NodeData::Target { joints, robot, .. } => (joints.is_empty(), *robot),
        _ => return Err(Fault::host(format!("item {id} is not a target"))),
    };
    let solved = if missing && station.robot(robot).is_ok() {
        let data = station.robot(robot)?;
        let flange = station.abs_pose(robot).invert() * station.abs_pose(id) * data.tool.invert();
        station.reachable(robot, &flange, &data.joints)?
    } else {
        None
    };
    if let NodeData::Target {
        joints,
        joint_target,
        ..
    } = &mut station.node_mut(id)?.data
    {
        *joint_target = true;
        if let Some(solved) = solved {
            *joints = solved;
        }
    }
    Ok(Vec::new())
}

fn set_as_cartesian_target(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    match &mut station.node_mut(id)?.data {
        NodeData::Target { joint_target, .. } => {
            *joint_target = false;
            Ok(Vec::new())
        }
        _ => Err(Fault::host(format!("item {id} is not a target"))),
    }
}

fn is_joint_target(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    match &station.node(id)?.data {
        NodeData::Target { joint_target, .. } => Ok(vec![Value::Int((*joint_target).into())]),
        _ => Ok(vec![Value::Int(0)]),
    }
}

/// Robots move; programs record the move as an instruction.
fn move_x(station: &mut Station, args: &mut Args) -> Handled {
    let code = args.int()?;
    let move_type = MoveType::from_code(code)
        .filter(|kind| *kind != MoveType::Circular)
        .ok_or_else(|| Fault::host(format!("unknown move type {code}")))?;
    let target = resolve(station, args)?;
    let subject = args.item()?;
    if station.is_program(subject) {
        let step = move_instruction(station, subject, move_type, target);
        return station.add_instruction(subject, step);
    }
    station.move_robot(subject, &target.goal)?;
    Ok(Vec::new())
}

fn move_c(station: &mut Station, args: &mut Args) -> Handled {
    let via = resolve(station, args)?;
    let to = resolve(station, args)?;
    let subject = args.item()?;
    if station.is_program(subject) {
        let label = format!("{}, {}", via.label, to.label);
        let mut step = move_instruction(station, subject, MoveType::Circular, to);
        step.name = format!("MoveC ({label})");
        step.kind = InstructionType::MoveC;
        return station.add_instruction(subject, step);
    }
    station.robot_goal(subject, &via.goal)?;
    station.move_robot(subject, &to.goal)?;
    Ok(Vec::new())
}

fn busy(station: &mut Station, args: &mut Args) -> Handled {
    station.robot(args.item()?)?;
    Ok(vec![Value::Int(0)])
}

fn robot_only(station: &mut Station, args: &mut Args) -> Handled {
    station.robot(args.item()?)?;
    Ok(Vec::new())
}

// Programs.

fn index(args: &mut Args, len: usize) -> Result<usize, Fault> {
    let raw = args.int()?;
    usize::try_from(raw)
        .ok()
        .filter(|index| *index < len)
        .ok_or_else(|| Fault::host(format!("instruction {raw} out of range 0..{len}")))
}

fn instruction_count(station: &mut Station, args: &mut Args) -> Handled {
    let program = station.program(args.item()?)?;
    Ok(vec![Value::Int(program.instructions.len() as i32)])
}

fn instruction_get(station: &mut Station, args: &mut Args) -> Handled {
    let program = station.program(args.item()?)?;
    let index = index(args, program.instructions.len())?;
    let step = &program.instructions[index];
    Ok(vec![
        Value::Str(step.name.clone()),
        Value::Int(step.kind.code()),
        Value::Int(step.move_type.map_or(0, MoveType::code)),
        Value::Int(step.is_joint_target.into()),
        Value::Pose(step.pose),
        Value::Joints(step.joints.clone()),
    ])
}

fn instruction_set(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let len = station.program(id)?.instructions.len();
    let index = index(args, len)?;
    let name = args.string()?;
    let code = args.int()?;
    let kind = InstructionType::from_code(code)
        .ok_or_else(|| Fault::host(format!("unknown instruction type {code}")))?;
    let move_type = MoveType::from_code(args.int()?);
    let is_joint_target = args.int()? != 0;
    let pose = args.pose()?;
    let joints = args.joints()?;
    station.program_mut(id)?.instructions[index] = Instruction {
        name,
        kind,
        move_type: move_type.filter(|_| matches!(kind, InstructionType::Move | InstructionType::MoveC)),
        is_joint_target,
        pose,
        joints,
    };
    Ok(Vec::new())
}

fn instruction_select(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let raw = args.int()?;
    let program = station.program_mut(id)?;
    let len = program.instructions.len();
    program.selected = match raw {
        -1 => None,
        raw => Some(
            usize::try_from(raw)
                .ok()
                .filter(|index| *index < len)
                .ok_or_else(|| Fault::host(format!("instruction {raw} out of range 0..{len}")))?,
        ),
    };
    let selected = program.selected.map_or(-1, |index| index as i32);
    Ok(vec![Value::Int(selected)])
}

fn instruction_delete(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let raw = args.int()?;
    let program = station.program_mut(id)?;
    let Some(index) = usize::try_from(raw)
        .ok()
        .filter(|index| *index < program.instructions.len())
    else {
        return Ok(vec![Value::Int(0)]);
    };
    program.instructions.remove(index);
    program.selected = match program.selected {
        Some(selected) if selected > index => Some(selected - 1),
        Some(selected) if selected == index => selected.checked_sub(1),
        other => other,
    };
    Ok(vec![Value::Int(1)])
}

fn instruction_move(station: &mut Station, args: &mut Args) -> Handled {
    let from_id = args.item()?;
    let from_len = station.program(from_id)?.instructions.len();
    let from = index(args, from_len)?;
    let to_id = args.item()?;
    // One past the end appends.
    let to_len = station.program(to_id)?.instructions.len() + 1;
    let to = index(args, to_len)?;
    let after = args.int()? != 0;
    let step = station.program_mut(from_id)?.instructions.remove(from);
    let mut to = to;
    if from_id == to_id && from < to {
        to -= 1;
    }
    let position = if after { to + 1 } else { to };
    let target = station.program_mut(to_id)?;
    let position = position.min(target.instructions.len());
    target.instructions.insert(position, step);
    Ok(Vec::new())
}

/// Joints of every move, solving cartesian moves along the way.
fn move_joints(station: &Station, program: i32) -> Result<Vec<(usize, MoveType, Joints)>, Fault> {
    let data = station.program(program)?;
    let robot = station.program_robot(program);
    let mut current = robot
        .and_then(|robot| station.robot(robot).ok())
        .map(|robot| robot.joints.clone())
        .unwrap_or_default();
    let mut moves = Vec::new();
    for (index, step) in data.instructions.iter().enumerate() {
        if !step.is_move() {
            continue;
        }
        let joints = if !step.joints.is_empty() {
            step.joints.clone()
        } else if let Some(robot) = robot {
            let data = station.robot(robot)?;
            let flange = data.frame * step.pose * data.tool.invert();
            match station.reachable(robot, &flange, &current)? {
                Some(joints) => joints,
                None => continue,
            }
        } else {
            continue;
        };
        current = joints.clone();
        moves.push((index, step.move_type.unwrap_or(MoveType::Joint), joints));
    }
    Ok(moves)
}

struct Sampled {
    columns: Vec<Vec<f64>>,
    invalid: usize,
}

fn sample_program(
    station: &Station,
    program: i32,
    mm_step: f64,
    deg_step: f64,
) -> Result<Sampled, Fault> {
    let mm_step = if mm_step > 0.0 { mm_step } else { 1.0 };
    let deg_step = if deg_step > 0.0 { deg_step } else { 1.0 };
    let robot = station.program_robot(program).and_then(|id| station.robot(id).ok());
    let mut sampled = Sampled {
        columns: Vec::new(),
        invalid: 0,
    };
    let push = |joints: &[f64], move_id: usize, sampled: &mut Sampled| {
        let valid = robot.map_or(true, |robot| robot.accepts(&Joints::from(joints)));
        if !valid {
            sampled.invalid += 1;
        }
        let mut column = joints.to_vec();
        column.extend([
            if valid { 0.0 } else { 1.0 },
            mm_step,
            deg_step,
            move_id as f64,
        ]);
        sampled.columns.push(column);
    };
    let moves = move_joints(station, program)?;
    let mut previous: Option<&Joints> = None;
    for (move_id, move_type, joints) in &moves {
        match previous {
            None => push(joints, *move_id, &mut sampled),
            Some(from) => {
                let span = match move_type {
                    MoveType::Joint => from.max_abs_diff(joints).unwrap_or(0.0) / deg_step,
                    _ => {
                        let [ax, ay, az] = kinematics::forward(from).position();
                        let [bx, by, bz] = kinematics::forward(joints).position();
                        ((bx - ax).powi(2) + (by - ay).powi(2) + (bz - az).powi(2)).sqrt() / mm_step
                    }
                };
                let steps = (span.ceil() as usize).max(1);
                for step in 1..=steps {
                    let t = step as f64 / steps as f64;
                    let point: Vec<f64> = from
                        .iter()
                        .zip(joints.iter())
                        .map(|(a, b)| a + (b - a) * t)
                        .collect();
                    push(&point, *move_id, &mut sampled);
                }
            }
        }
        previous = Some(joints);
    }
    Ok(sampled)
}

fn write_joint_csv(path: &Path, columns: &[Vec<f64>]) -> std::io::Result<()> {
    let njoints = columns
        .first()
        .map_or(0, |column| column.len().saturating_sub(JointList::EXTRA_ROWS));
    let mut text = String::new();
    let header: Vec<String> = (1..=njoints).map(|i| format!("J{i}")).collect();
    let _ = writeln!(text, "{},Error,MmStep,DegStep,MoveId", header.join(","));
    for column in columns {
        let row: Vec<String> = column.iter().map(f64::to_string).collect();
        let _ = writeln!(text, "{}", row.join(","));
    }
    fs::write(path, text)
}

fn instruction_list_joints(station: &mut Station, args: &mut Args) -> Handled {
    let program = args.item()?;
    let mm_step = args.float()?;
    let deg_step = args.float()?;
    let path = args.string()?;
    let _collisions = args.int()?;
    let _flags = args.int()?;
    let _time_step = args.float()?;
    let sampled = sample_program(station, program, mm_step, deg_step)?;
    let status = if sampled.invalid == 0 { 0 } else { -1 };
    let count = sampled.columns.len();
    let mut message = if sampled.invalid == 0 {
        format!("{count} samples")
    } else {
        format!("{} of {count} samples are outside the joint limits", sampled.invalid)
    };
    let matrix = if !path.is_empty() {
        let path = PathBuf::from(path);
        write_joint_csv(&path, &sampled.columns).map_err(|err| host_io(&path, err))?;
        message = format!("{message} saved to {}", path.display());
        Matrix::empty()
    } else if sampled.columns.is_empty() {
        Matrix::empty()
    } else {
        Matrix::from_columns(&sampled.columns).map_err(|err| Fault::host(err.to_string()))?
    };
    Ok(vec![Value::Str(message), Value::Matrix(matrix), Value::Int(status)])
}

fn set_speed(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let speeds = args.joints()?;
    let mut step = instruction(format!("Set Speed ({speeds})"), InstructionType::ChangeSpeed);
    step.joints = speeds;
    station.add_instruction(id, step)
}

fn set_rounding(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let mm = args.float()?;
    let mut step = instruction(format!("Set Rounding ({mm} mm)"), InstructionType::ChangeSpeed);
    step.joints = Joints::from([mm]);
    station.add_instruction(id, step)
}

fn set_do(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let output = args.string()?;
    let value = args.string()?;
    station.add_instruction(id, instruction(format!("setDO({output}={value})"), InstructionType::Event))
}

fn wait_di(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let input = args.string()?;
    let value = args.string()?;
    let timeout = args.float()?;
    let name = if timeout > 0.0 {
        format!("waitDI({input}={value}, {timeout} ms)")
    } else {
        format!("waitDI({input}={value})")
    };
    station.add_instruction(id, instruction(name, InstructionType::Event))
}

fn pause(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let ms = args.float()?;
    let name = if ms < 0.0 {
        "Pause".to_string()
    } else {
        format!("Pause ({ms} ms)")
    };
    station.add_instruction(id, instruction(name, InstructionType::Pause))
}

fn run_instruction(station: &mut Station, args: &mut Args) -> Handled {
    let id = args.item()?;
    let code = args.string()?;
    let kind = args.int()?;
    let step = match kind {
        3 => instruction(format!("Comment: {code}"), InstructionType::Code),
        4 => instruction(format!("Show message: {code}"), InstructionType::Print),
        0..=2 => instruction(code, InstructionType::Code),
        other => return Err(Fault::host(format!("unknown code kind {other}"))),
    };
    station.add_instruction(id, step)
}

/// Runs every move on the program's robot; returns the moves executed.
fn run_program(station: &mut Station, args: &mut Args) -> Handled {
    let program = args.item()?;
    let _parameters = args.joints()?;
    let moves = move_joints(station, program)?;
    let Some(robot) = station.program_robot(program) else {
        return Err(Fault::host(format!("program {program} has no robot")));
    };
    for (_, _, joints) in &moves {
        station.move_robot(robot, &Goal::Joints(joints.clone()))?;
    }
    Ok(vec![Value::Int(moves.len() as i32)])
}

/// One second per move at the fake speed, distance along the TCP path.
fn program_update(station: &mut Station, args: &mut Args) -> Handled {
    let program = args.item()?;
    let _collisions = args.int()?;
    let _timeout = args.float()?;
    let _mm_step = args.float()?;
    let _deg_step = args.float()?;
    let total = station.program(program)?.instructions.len();
    let robot = station.program_robot(program).and_then(|id| station.robot(id).ok());
    let moves = move_joints(station, program)?;
    let solved_moves = moves.len();
    let total_moves = station
        .program(program)?
        .instructions
        .iter()
        .filter(|step| step.is_move())
        .count();
    let bad = moves
        .iter()
        .filter(|(_, _, joints)| robot.is_some_and(|robot| !robot.accepts(joints)))
        .count()
        + (total_moves - solved_moves);
    let valid = total - bad;
    let distance: f64 = moves
        .windows(2)
        .map(|pair| {
            let [ax, ay, az] = kinematics::forward(&pair[0].2).position();
            let [bx, by, bz] = kinematics::forward(&pair[1].2).position();
            ((bx - ax).powi(2) + (by - ay).powi(2) + (bz - az).powi(2)).sqrt()
        })
        .sum();
    let ratio = if total == 0 { 1.0 } else { valid as f64 / total as f64 };
    let message = if bad == 0 {
        "Program OK".to_string()
    } else {
        format!("{bad} instructions cannot be reached")
    };
    Ok(vec![
        Value::Joints(Joints::from([valid as f64, solved_moves as f64, distance, ratio])),
        Value::Str(message),
    ])
}

fn make_program(station: &mut Station, args: &mut Args) -> Handled {
    let program = args.item()?;
    let path = args.string()?;
    let name = station.node(program)?.name.clone();
    let data = station.program(program)?;
    let path = if path.is_empty() {
        reserved_path(station, "PATH_PROGRAMS").unwrap_or_default()
    } else {
        PathBuf::from(path)
    };
    let file = if path.is_dir() || path.extension().is_none() {
        path.join(format!("{name}.prg"))
    } else {
        path
    };
    let mut text = format!("PROGRAM {name}\n");
    for step in &data.instructions {
        let _ = write!(text, "  {}", step.name);
        if !step.joints.is_empty() {
            let _ = write!(text, " [{}]", step.joints);
        }
        text.push('\n');
    }
    text.push_str("END\n");
    let written = file
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| fs::write(&file, text));
    let reply = match written {
        Ok(()) => vec![
            Value::Int(1),
            Value::Str(format!("Program {name} saved to {}", file.display())),
        ],
        Err(err) => vec![Value::Int(0), Value::Str(format!("{}: {err}", file.display()))],
    };
    Ok(reply)
}

fn nc_points(path: &Path) -> Option<Vec<[f64; 3]>> {
    let text = fs::read_to_string(path).ok()?;
    Some(
        text.lines()
            .filter_map(|line| {
                let values: Vec<f64> = line
                    .split_whitespace()
                    .filter_map(|token| token.parse().ok())
                    .collect();
                match values.as_slice() {
                    [x, y, z, ..] => Some([*x, *y, *z]),
                    _ => None,
                }
            })
            .collect(),
    )
}

/// Turn a point path into a program of linear moves for the project's robot.
fn set_machining_params(station: &mut Station, args: &mut Args) -> Handled {
    let machining = args.item()?;
    let nc_file = args.string()?;
    let part = args.item()?;
    let _options = args.string()?;
    let node = station.node(machining)?;
    let NodeData::Machining { robot } = node.data else {
        return Err(Fault::host(format!("item {machining} is not a machining project")));
    };
    let name = format!("{} Program", node.name);
    let (points, frame) = if !nc_file.is_empty() {
        match nc_points(Path::new(&nc_file)) {
            Some(points) => (points, Pose::IDENTITY),
            None => return Ok(vec![Value::Item(0), Value::Int(-1)]),
        }
    } else if part != 0 {
        let (points, _) = object_data(station, part)?;
        let points = points
            .columns()
            .filter(|column| column.len() >= 3)
            .map(|column| [column[0], column[1], column[2]])
            .collect();
        (points, station.abs_pose(part))
    } else {
        return Err(Fault::host("machining needs an NC file or a part"));
    };
    let robot = Some(robot).filter(|robot| station.robot(*robot).is_ok());
    let mut data = ProgramData {
        robot: robot.unwrap_or(0),
        ..ProgramData::default()
    };
    let mut current = robot
        .and_then(|robot| station.robot(robot).ok())
        .map(|robot| robot.joints.clone())
        .unwrap_or_default();
    for (index, [x, y, z]) in points.iter().enumerate() {
        let absolute = frame * Pose::transl(*x, *y, *z);
        let (pose, joints) = match robot {
            Some(robot) => {
                let data = station.robot(robot)?;
                let base = station.abs_pose(robot);
                let flange = base.invert() * absolute * data.tool.invert();
                let joints = station.reachable(robot, &flange, &current)?.unwrap_or_default();
                (data.frame.invert() * base.invert() * absolute, joints)
            }
            None => (absolute, Joints::default()),
        };
        if !joints.is_empty() {
            current = joints.clone();
        }
        data.instructions.push(Instruction {
            name: format!("MoveL (point {})", index + 1),
            kind: InstructionType::Move,
            move_type: Some(MoveType::Linear),
            is_joint_target: false,
            pose,
            joints,
        });
    }
    let program = station.insert(
        station.active,
        &name,
        ItemType::Program,
        Pose::IDENTITY,
        NodeData::Program(data),
    );
    Ok(vec![Value::Item(program), Value::Int(0)])
}
