//! Every host command the façade issues, described as data.
//!
//! A [`Command`] fixes the argument and reply layout of one request. The
//! client validates arguments against it before anything is written, and
//! the fake host decodes requests with the same table, so the two sides
//! cannot drift apart.

use crate::error::{LinkError, LinkResult};
use crate::wire::{Kind, Value};

use Kind::{Float, Int, Item, ItemList, Joints, Matrix, Pose, Str};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command {
    pub name: &'static str,
    pub args: &'static [Kind],
    pub reply: &'static [Kind],
    /// Runs without a read deadline: motion, dialogs, program runs.
    pub blocking: bool,
}

impl Command {
    pub const fn new(name: &'static str, args: &'static [Kind], reply: &'static [Kind]) -> Self {
        Self {
            name,
            args,
            reply,
            blocking: false,
        }
    }

    pub const fn blocking(self) -> Self {
        Self {
            blocking: true,
            ..self
        }
    }

    /// Reject an argument list that does not match the schema.
    pub fn check_args(&self, args: &[Value]) -> LinkResult<()> {
        if args.len() != self.args.len() {
            return Err(LinkError::type_error(format!(
                "{} takes {} arguments, got {}",
                self.name,
                self.args.len(),
                args.len()
            )));
        }
        for (position, (value, kind)) in args.iter().zip(self.args).enumerate() {
            if value.kind() != *kind {
                return Err(LinkError::type_error(format!(
                    "{} argument {position} must be {kind:?}, got {:?}",
                    self.name,
                    value.kind()
                )));
            }
        }
        Ok(())
    }

    /// Bytes on the wire for this request: the name line plus every argument.
    pub fn request_len(&self, args: &[Value]) -> usize {
        self.name.len() + 1 + args.iter().map(Value::encoded_len).sum::<usize>()
    }
}

/// Find a command by its wire name.
pub fn lookup(name: &str) -> Option<&'static Command> {
    ALL.iter().find(|command| command.name == name)
}

// Session and station level.
pub const COMMAND: Command = Command::new("SCMD", &[Str, Str], &[Str]);
pub const GET_PARAM: Command = Command::new("G_Param", &[Str], &[Str]);
pub const SET_PARAM: Command = Command::new("S_Param", &[Str, Str], &[]);
pub const RENDER: Command = Command::new("Render", &[Int], &[]);
pub const UPDATE: Command = Command::new("Refresh", &[], &[]);
pub const SHOW_MESSAGE: Command = Command::new("ShowMessage", &[Str, Int], &[]).blocking();
pub const SET_WINDOW_STATE: Command = Command::new("S_WindowState", &[Int], &[]);
pub const QUIT: Command = Command::new("QUIT", &[], &[]);
pub const SET_RUN_MODE: Command = Command::new("S_RunMode", &[Int], &[]);
pub const GET_RUN_MODE: Command = Command::new("G_RunMode", &[], &[Int]);
pub const SET_SIMULATION_SPEED: Command = Command::new("SimulateSpeed", &[Int], &[]);
pub const GET_SIMULATION_SPEED: Command = Command::new("GetSimulateSpeed", &[], &[Int]);
pub const GET_ACTIVE_STATION: Command = Command::new("G_ActiveStn", &[], &[Item]);
pub const SET_ACTIVE_STATION: Command = Command::new("S_ActiveStn", &[Item], &[]);
pub const ADD_STATION: Command = Command::new("NewStation", &[Str], &[Item]);
pub const CLOSE_STATION: Command = Command::new("RemoveStn", &[], &[]);
pub const ADD_FILE: Command = Command::new("Add", &[Str, Item], &[Item]).blocking();
pub const SAVE: Command = Command::new("Save", &[Str, Item], &[]).blocking();

// Lookup and enumeration.
pub const ITEM_BY_NAME: Command = Command::new("G_Item", &[Str], &[Item]);
pub const ITEM_BY_NAME_TYPE: Command = Command::new("G_Item2", &[Str, Int], &[Item]);
pub const ITEM_LIST: Command = Command::new("G_List_Items_Type", &[Int, Int], &[ItemList]);
pub const ITEM_PICK: Command = Command::new("PickItem", &[Str, Int], &[Item]).blocking();
pub const VALID: Command = Command::new("Valid", &[Item], &[Int]);

// Creation.
pub const ADD_FRAME: Command = Command::new("Add_FRAME", &[Str, Item], &[Item]);
pub const ADD_TARGET: Command = Command::new("Add_TARGET", &[Str, Item, Item], &[Item]);
pub const ADD_PROGRAM: Command = Command::new("Add_PROG", &[Str, Item], &[Item]);
pub const ADD_MACHINING: Command = Command::new("Add_MACHINING", &[Str, Item], &[Item]);
pub const ADD_SHAPE: Command = Command::new("AddShape2", &[Matrix, Item, Int], &[Item]);
pub const ADD_CURVE: Command = Command::new("AddWire", &[Matrix, Item, Int, Int], &[Item]);
pub const ADD_POINTS: Command = Command::new("AddPoints", &[Matrix, Item, Int, Int], &[Item]);
pub const PROJECT_POINTS: Command = Command::new("ProjectPoints", &[Matrix, Item, Int], &[Matrix]);
pub const FILTER_PROGRAM: Command =
    Command::new("FilterProg2", &[Item, Str], &[Int, Str]).blocking();

// Simulation helpers.
pub const CAMERA_ADD: Command = Command::new("Cam2D_Add", &[Item, Str], &[Item]);
pub const CAMERA_SNAPSHOT: Command =
    Command::new("Cam2D_Snapshot", &[Str, Item, Str], &[Int]).blocking();
pub const CAMERA_CLOSE: Command = Command::new("Cam2D_Close", &[Item], &[Int]);
pub const CAMERA_SET_PARAMS: Command = Command::new("Cam2D_SetParams", &[Item, Str], &[Int]);
pub const SPRAY_ADD: Command = Command::new("Gun_Add", &[Item, Item, Str, Matrix], &[Item]);
pub const SPRAY_SET_STATE: Command = Command::new("Gun_SetState", &[Item, Int], &[Int]);
pub const SPRAY_STATS: Command = Command::new("Gun_Stats", &[Item], &[Str, Matrix]);
pub const SPRAY_CLEAR: Command = Command::new("Gun_Clear", &[Item], &[Int]);

// Generic item operations.
pub const GET_NAME: Command = Command::new("G_Name", &[Item], &[Str]);
pub const SET_NAME: Command = Command::new("S_Name", &[Item, Str], &[]);
pub const GET_TYPE: Command = Command::new("G_Item_Type", &[Item], &[Int]);
pub const GET_PARENT: Command = Command::new("G_Parent", &[Item], &[Item]);
pub const GET_CHILDREN: Command = Command::new("G_Childs", &[Item], &[ItemList]);
pub const GET_VISIBLE: Command = Command::new("G_Visible", &[Item], &[Int]);
pub const SET_VISIBLE: Command = Command::new("S_Visible", &[Item, Int, Int], &[]);
pub const GET_POSE: Command = Command::new("G_Hlocal", &[Item], &[Pose]);
pub const SET_POSE: Command = Command::new("S_Hlocal", &[Item, Pose], &[]);
pub const GET_POSE_ABS: Command = Command::new("G_Hlocal_Abs", &[Item], &[Pose]);
pub const SET_POSE_ABS: Command = Command::new("S_Hlocal_Abs", &[Item, Pose], &[]);
pub const SET_PARENT: Command = Command::new("S_Parent", &[Item, Item], &[]);
pub const SET_PARENT_STATIC: Command = Command::new("S_Parent_Static", &[Item, Item], &[]);
pub const DELETE: Command = Command::new("Remove", &[Item], &[]);
pub const SET_COLOR: Command = Command::new("S_Color", &[Item, Joints], &[]);
pub const GET_POINTS: Command = Command::new("G_Points", &[Item], &[Matrix]);
pub const GET_BOUNDING_BOX: Command = Command::new("G_BoundingBox", &[Item], &[Matrix]);
pub const GET_MESH: Command = Command::new("G_Mesh", &[Item], &[Matrix]);

// Robots and mechanisms.
pub const GET_JOINTS: Command = Command::new("G_Thetas", &[Item], &[Joints]);
pub const SET_JOINTS: Command = Command::new("S_Thetas", &[Item, Joints], &[]);
pub const GET_HOME: Command = Command::new("G_Home", &[Item], &[Joints]);
pub const SET_HOME: Command = Command::new("S_Home", &[Item, Joints], &[]);
pub const GET_LIMITS: Command = Command::new("G_RobLimits", &[Item], &[Joints, Joints, Int]);
pub const SET_LIMITS: Command = Command::new("S_RobLimits", &[Item, Joints, Joints], &[]);
pub const SOLVE_FK: Command = Command::new("G_FK", &[Item, Joints], &[Pose]);
pub const SOLVE_IK: Command = Command::new("G_IK", &[Item, Pose, Joints], &[Joints]);
pub const SOLVE_IK_ALL: Command = Command::new("G_IK_cmpl", &[Item, Pose], &[Matrix]);
pub const JOINTS_CONFIG: Command = Command::new("G_Thetas_Config", &[Item, Joints], &[Joints]);
pub const SET_FRAME_ITEM: Command = Command::new("S_Frame_ptr", &[Item, Item], &[]);
pub const SET_FRAME_POSE: Command = Command::new("S_Frame", &[Item, Pose], &[]);
pub const GET_FRAME: Command = Command::new("G_Frame", &[Item], &[Pose]);
pub const SET_TOOL_ITEM: Command = Command::new("S_Tool_ptr", &[Item, Item], &[]);
pub const SET_TOOL_POSE: Command = Command::new("S_Tool", &[Item, Pose], &[]);
pub const GET_TOOL: Command = Command::new("G_Tool", &[Item], &[Pose]);
pub const ADD_TOOL: Command = Command::new("AddToolEmpty", &[Item, Pose, Str], &[Item]);
pub const SET_AS_JOINT_TARGET: Command = Command::new("S_Target_As_JT", &[Item], &[]);
pub const SET_AS_CARTESIAN_TARGET: Command = Command::new("S_Target_As_RT", &[Item], &[]);
pub const IS_JOINT_TARGET: Command = Command::new("Target_Is_JT", &[Item], &[Int]);
pub const MOVE: Command = Command::new("MoveX", &[Int, Int, Joints, Pose, Item, Item], &[]);
pub const MOVE_BLOCKING: Command =
    Command::new("MoveX_Wait", &[Int, Int, Joints, Pose, Item, Item], &[]).blocking();
pub const MOVE_C: Command = Command::new(
    "MoveC",
    &[Int, Joints, Pose, Item, Int, Joints, Pose, Item, Item],
    &[],
);
pub const MOVE_C_BLOCKING: Command = Command::new(
    "MoveC_Wait",
    &[Int, Joints, Pose, Item, Int, Joints, Pose, Item, Item],
    &[],
)
.blocking();
pub const BUSY: Command = Command::new("IsBusy", &[Item], &[Int]);
pub const WAIT_MOVE: Command = Command::new("WaitMove", &[Item], &[]).blocking();
pub const STOP: Command = Command::new("Stop", &[Item], &[]);

// Programs.
pub const INSTRUCTION_COUNT: Command = Command::new("Prog_Nins", &[Item], &[Int]);
pub const INSTRUCTION_GET: Command =
    Command::new("Prog_GIns", &[Item, Int], &[Str, Int, Int, Int, Pose, Joints]);
pub const INSTRUCTION_SET: Command =
    Command::new("Prog_SIns", &[Item, Int, Str, Int, Int, Int, Pose, Joints], &[]);
pub const INSTRUCTION_SELECT: Command = Command::new("Prog_Slct", &[Item, Int], &[Int]);
pub const INSTRUCTION_DELETE: Command = Command::new("Prog_DelIns", &[Item, Int], &[Int]);
pub const INSTRUCTION_MOVE: Command =
    Command::new("Prog_MoveIns", &[Item, Int, Item, Int, Int], &[]);
pub const INSTRUCTION_LIST_JOINTS: Command = Command::new(
    "G_ProgJointList",
    &[Item, Float, Float, Str, Int, Int, Float],
    &[Str, Matrix, Int],
)
.blocking();
pub const SET_SPEED: Command = Command::new("S_Speed4", &[Item, Joints], &[]);
pub const SET_ROUNDING: Command = Command::new("S_ZoneData", &[Item, Float], &[]);
pub const SET_DO: Command = Command::new("setDO", &[Item, Str, Str], &[]);
pub const WAIT_DI: Command = Command::new("waitDI", &[Item, Str, Str, Float], &[]);
pub const PAUSE: Command = Command::new("RunPause", &[Item, Float], &[]);
pub const RUN_INSTRUCTION: Command = Command::new("RunCode2", &[Item, Str, Int], &[]);
pub const RUN_PROGRAM: Command = Command::new("RunProg", &[Item, Joints], &[Int]).blocking();
pub const PROGRAM_UPDATE: Command = Command::new(
    "Update2",
    &[Item, Int, Float, Float, Float],
    &[Joints, Str],
)
.blocking();
pub const MAKE_PROGRAM: Command = Command::new("MakeProg", &[Item, Str], &[Int, Str]).blocking();
pub const SET_MACHINING_PARAMS: Command =
    Command::new("S_MachiningParams", &[Item, Str, Item, Str], &[Item, Int]).blocking();

/// Every command the client knows, in no particular order.
pub static ALL: &[Command] = &[
    COMMAND,
    GET_PARAM,
    SET_PARAM,
    RENDER,
    UPDATE,
    SHOW_MESSAGE,
    SET_WINDOW_STATE,
    QUIT,
    SET_RUN_MODE,
    GET_RUN_MODE,
    SET_SIMULATION_SPEED,
    GET_SIMULATION_SPEED,
    GET_ACTIVE_STATION,
    SET_ACTIVE_STATION,
    ADD_STATION,
    CLOSE_STATION,
    ADD_FILE,
    SAVE,
    ITEM_BY_NAME,
    ITEM_BY_NAME_TYPE,
    ITEM_LIST,
    ITEM_PICK,
    VALID,
    ADD_FRAME,
    ADD_TARGET,
    ADD_PROGRAM,
    ADD_MACHINING,
    ADD_SHAPE,
    ADD_CURVE,
    ADD_POINTS,
    PROJECT_POINTS,
    FILTER_PROGRAM,
    CAMERA_ADD,
    CAMERA_SNAPSHOT,
    CAMERA_CLOSE,
    CAMERA_SET_PARAMS,
    SPRAY_ADD,
    SPRAY_SET_STATE,
    SPRAY_STATS,
    SPRAY_CLEAR,
    GET_NAME,
    SET_NAME,
    GET_TYPE,
    GET_PARENT,
    GET_CHILDREN,
    GET_VISIBLE,
    SET_VISIBLE,
    GET_POSE,
    SET_POSE,
    GET_POSE_ABS,
    SET_POSE_ABS,
    SET_PARENT,
    SET_PARENT_STATIC,
    DELETE,
    SET_COLOR,
    GET_POINTS,
    GET_BOUNDING_BOX,
    GET_MESH,
    GET_JOINTS,
    SET_JOINTS,
    GET_HOME,
    SET_HOME,
    GET_LIMITS,
    SET_LIMITS,
    SOLVE_FK,
    SOLVE_IK,
    SOLVE_IK_ALL,
    JOINTS_CONFIG,
    SET_FRAME_ITEM,
    SET_FRAME_POSE,
    GET_FRAME,
    SET_TOOL_ITEM,
    SET_TOOL_POSE,
    GET_TOOL,
    ADD_TOOL,
    SET_AS_JOINT_TARGET,
    SET_AS_CARTESIAN_TARGET,
    IS_JOINT_TARGET,
    MOVE,
    MOVE_BLOCKING,
    MOVE_C,
    MOVE_C_BLOCKING,
    BUSY,
    WAIT_MOVE,
    STOP,
    INSTRUCTION_COUNT,
    INSTRUCTION_GET,
    INSTRUCTION_SET,
    INSTRUCTION_SELECT,
    INSTRUCTION_DELETE,
    INSTRUCTION_MOVE,
    INSTRUCTION_LIST_JOINTS,
    SET_SPEED,
    SET_ROUNDING,
    SET_DO,
    WAIT_DI,
    PAUSE,
    RUN_INSTRUCTION,
    RUN_PROGRAM,
    PROGRAM_UPDATE,
    MAKE_PROGRAM,
    SET_MACHINING_PARAMS,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique_and_resolvable() {
        let mut seen = HashSet::new();
        for command in ALL {
            assert!(seen.insert(command.name), "duplicate {}", command.name);
            assert_eq!(lookup(command.name), Some(command));
        }
        assert!(lookup("NoSuchCommand").is_none());
    }

    #[test]
    fn argument_schema_is_checked_locally() {
        let ok = [Value::Item(3)];
        assert!(GET_NAME.check_args(&ok).is_ok());

        let wrong_kind = [Value::Int(3)];
        assert!(matches!(
            GET_NAME.check_args(&wrong_kind),
            Err(LinkError::Type(_))
        ));

        let wrong_count = [Value::Item(3), Value::Item(4)];
        assert!(GET_NAME.check_args(&wrong_count).is_err());
    }

    #[test]
    fn request_length_counts_name_line_and_args() {
        let args = [Value::Item(7), Value::Str("Tool".into())];
        assert_eq!(SET_NAME.request_len(&args), "S_Name\n".len() + 4 + 4 + 4);
    }

    #[test]
    fn long_running_commands_are_blocking() {
        for command in [ITEM_PICK, RUN_PROGRAM, CAMERA_SNAPSHOT, WAIT_MOVE, MOVE_BLOCKING] {
            assert!(command.blocking, "{} should be blocking", command.name);
        }
        assert!(!GET_NAME.blocking);
    }
}
