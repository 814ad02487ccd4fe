use std::fmt;
use std::hash::{Hash, Hasher};

use crate::command::{self, Command};
use crate::error::{LinkError, LinkResult};
use crate::joints::Joints;
use crate::matrix::Matrix;
use crate::pose::Pose;
use crate::session::{Reply, Session};
use crate::types::{ItemType, MoveType};
use crate::wire::Value;

/// Handle to an entity in the host's station tree.
///
/// Two handles are equal when they carry the same id and come from the same
/// session; the cached type tag does not take part. Id `0` is the invalid
/// handle: lookups that find nothing and cancelled pickers return it, and
/// every operation on it fails locally with [`LinkError::InvalidItem`].
#[derive(Clone)]
pub struct Item {
    id: i32,
    kind: Option<ItemType>,
    session: Session,
}

impl Item {
    pub(crate) fn new(session: Session, id: i32, kind: Option<ItemType>) -> Self {
        Self { id, kind, session }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// Type tag cached when the handle was produced, if known.
    pub fn kind(&self) -> Option<ItemType> {
        self.kind
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// False for the invalid handle. Says nothing about the host side; see
    /// [`Item::valid`].
    pub fn is_some(&self) -> bool {
        self.id != 0
    }

    pub(crate) fn ensure_id(&self) -> LinkResult<()> {
        if self.id == 0 {
            return Err(LinkError::InvalidItem("operation on the invalid item".into()));
        }
        Ok(())
    }

    /// Issue `command` with this item as the first argument.
    pub(crate) fn call(&self, command: &Command, rest: Vec<Value>) -> LinkResult<Reply> {
        self.ensure_id()?;
        let mut args = Vec::with_capacity(rest.len() + 1);
        args.push(Value::Item(self.id));
        args.extend(rest);
        self.session.call(command, &args)
    }

    fn handle(&self, id: i32, kind: Option<ItemType>) -> Item {
        self.session.item(id, kind)
    }

    /// Ask the host whether the id still names an entity. Never cached.
    pub fn valid(&self) -> LinkResult<bool> {
        if self.id == 0 {
            return Ok(false);
        }
        Ok(self.session.call(&command::VALID, &[Value::Item(self.id)])?.int()? != 0)
    }

    pub fn name(&self) -> LinkResult<String> {
        self.call(&command::GET_NAME, vec![])?.string()
    }

    pub fn set_name(&self, name: &str) -> LinkResult<()> {
        self.call(&command::SET_NAME, vec![Value::Str(name.to_string())])?;
        Ok(())
    }

    /// Type reported by the host right now.
    pub fn item_type(&self) -> LinkResult<ItemType> {
        let code = self.call(&command::GET_TYPE, vec![])?.int()?;
        Ok(ItemType::from_code(code).unwrap_or(ItemType::Any))
    }

    pub fn parent(&self) -> LinkResult<Item> {
        let id = self.call(&command::GET_PARENT, vec![])?.item_id()?;
        Ok(self.handle(id, None))
    }

    pub fn children(&self) -> LinkResult<Vec<Item>> {
        let ids = self.call(&command::GET_CHILDREN, vec![])?.item_ids()?;
        Ok(ids.into_iter().map(|id| self.handle(id, None)).collect())
    }

    pub fn visible(&self) -> LinkResult<bool> {
        Ok(self.call(&command::GET_VISIBLE, vec![])?.int()? != 0)
    }

    /// Show or hide the item. `frame` controls its reference frame
    /// separately; `None` leaves the frame as it is.
    pub fn set_visible(&self, visible: bool, frame: Option<bool>) -> LinkResult<()> {
        let frame = frame.map_or(-1, i32::from);
        self.call(
            &command::SET_VISIBLE,
            vec![Value::Int(visible.into()), Value::Int(frame)],
        )?;
        Ok(())
    }

    /// Pose relative to the parent.
    pub fn pose(&self) -> LinkResult<Pose> {
        self.call(&command::GET_POSE, vec![])?.pose()
    }

    pub fn set_pose(&self, pose: &Pose) -> LinkResult<()> {
        self.call(&command::SET_POSE, vec![Value::Pose(*pose)])?;
        Ok(())
    }

    /// Pose relative to the station root.
    pub fn pose_abs(&self) -> LinkResult<Pose> {
        self.call(&command::GET_POSE_ABS, vec![])?.pose()
    }

    pub fn set_pose_abs(&self, pose: &Pose) -> LinkResult<()> {
        self.call(&command::SET_POSE_ABS, vec![Value::Pose(*pose)])?;
        Ok(())
    }

    /// Move under `parent`, keeping the local pose (the item moves in space).
    pub fn set_parent(&self, parent: &Item) -> LinkResult<()> {
        let parent = self.session.item_arg(parent)?;
        self.call(&command::SET_PARENT, vec![parent])?;
        Ok(())
    }

    /// Move under `parent`, keeping the absolute pose (the item stays put).
    pub fn set_parent_static(&self, parent: &Item) -> LinkResult<()> {
        let parent = self.session.item_arg(parent)?;
        self.call(&command::SET_PARENT_STATIC, vec![parent])?;
        Ok(())
    }

    /// Remove the item and its children from the station.
    pub fn delete(self) -> LinkResult<()> {
        self.call(&command::DELETE, vec![])?;
        Ok(())
    }

    /// Color as RGBA in `0.0..=1.0`.
    pub fn set_color(&self, rgba: [f64; 4]) -> LinkResult<()> {
        self.call(&command::SET_COLOR, vec![Value::Joints(Joints::from(rgba))])?;
        Ok(())
    }

    /// Points of a curve or point-cloud object, one per column.
    pub fn points(&self) -> LinkResult<Matrix> {
        self.call(&command::GET_POINTS, vec![])?.matrix()
    }

    /// Axis-aligned box in the item's frame: columns are min and max corners.
    pub fn bounding_box(&self) -> LinkResult<Matrix> {
        self.call(&command::GET_BOUNDING_BOX, vec![])?.matrix()
    }

    /// Triangle vertices, three consecutive columns per triangle.
    pub fn mesh(&self) -> LinkResult<Matrix> {
        self.call(&command::GET_MESH, vec![])?.matrix()
    }
}

/// Robot configuration flags of a joint vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub rear: bool,
    pub lower_arm: bool,
    pub flip: bool,
    pub turns: i32,
}

impl Item {
    pub fn joints(&self) -> LinkResult<Joints> {
        self.call(&command::GET_JOINTS, vec![])?.joints()
    }

    pub fn set_joints(&self, joints: &Joints) -> LinkResult<()> {
        self.call(&command::SET_JOINTS, vec![Value::Joints(joints.clone())])?;
        Ok(())
    }

    pub fn home(&self) -> LinkResult<Joints> {
        self.call(&command::GET_HOME, vec![])?.joints()
    }

    pub fn set_home(&self, joints: &Joints) -> LinkResult<()> {
        self.call(&command::SET_HOME, vec![Value::Joints(joints.clone())])?;
        Ok(())
    }

    /// Lower and upper joint limits.
    pub fn limits(&self) -> LinkResult<(Joints, Joints)> {
        let mut reply = self.call(&command::GET_LIMITS, vec![])?;
        let lower = reply.joints()?;
        let upper = reply.joints()?;
        Ok((lower, upper))
    }

    pub fn set_limits(&self, lower: &Joints, upper: &Joints) -> LinkResult<()> {
        if lower.len() != upper.len() {
            return Err(LinkError::type_error(format!(
                "limit vectors differ in length: {} vs {}",
                lower.len(),
                upper.len()
            )));
        }
        self.call(
            &command::SET_LIMITS,
            vec![Value::Joints(lower.clone()), Value::Joints(upper.clone())],
        )?;
        Ok(())
    }

    /// Flange pose for `joints`, relative to the robot base.
    pub fn solve_fk(&self, joints: &Joints) -> LinkResult<Pose> {
        self.call(&command::SOLVE_FK, vec![Value::Joints(joints.clone())])?
            .pose()
    }

    /// Solution nearest to `approx` (current joints when `None`), or `None`
    /// when the pose is unreachable.
    pub fn solve_ik(&self, pose: &Pose, approx: Option<&Joints>) -> LinkResult<Option<Joints>> {
        let approx = approx.cloned().unwrap_or_default();
        let joints = self
            .call(&command::SOLVE_IK, vec![Value::Pose(*pose), Value::Joints(approx)])?
            .joints()?;
        Ok((!joints.is_empty()).then_some(joints))
    }

    /// Every solution as a matrix column. The first rows are joints, the
    /// host appends configuration rows; zero columns when unreachable.
    pub fn solve_ik_all(&self, pose: &Pose) -> LinkResult<Matrix> {
        self.call(&command::SOLVE_IK_ALL, vec![Value::Pose(*pose)])?
            .matrix()
    }

    pub fn joints_config(&self, joints: &Joints) -> LinkResult<Configuration> {
        let flags = self
            .call(&command::JOINTS_CONFIG, vec![Value::Joints(joints.clone())])?
            .joints()?;
        let flag = |index: usize| flags.get(index).copied().unwrap_or(0.0);
        Ok(Configuration {
            rear: flag(0) != 0.0,
            lower_arm: flag(1) != 0.0,
            flip: flag(2) != 0.0,
            turns: flag(3).round() as i32,
        })
    }

    /// Make `frame` the robot's active reference frame.
    pub fn set_frame(&self, frame: &Item) -> LinkResult<()> {
        let frame = self.session.item_arg(frame)?;
        self.call(&command::SET_FRAME_ITEM, vec![frame])?;
        Ok(())
    }

    pub fn set_frame_pose(&self, pose: &Pose) -> LinkResult<()> {
        self.call(&command::SET_FRAME_POSE, vec![Value::Pose(*pose)])?;
        Ok(())
    }

    pub fn frame(&self) -> LinkResult<Pose> {
        self.call(&command::GET_FRAME, vec![])?.pose()
    }

    /// Make `tool` the robot's active tool.
    pub fn set_tool(&self, tool: &Item) -> LinkResult<()> {
        let tool = self.session.item_arg(tool)?;
        self.call(&command::SET_TOOL_ITEM, vec![tool])?;
        Ok(())
    }

    pub fn set_tool_pose(&self, pose: &Pose) -> LinkResult<()> {
        self.call(&command::SET_TOOL_POSE, vec![Value::Pose(*pose)])?;
        Ok(())
    }

    pub fn tool(&self) -> LinkResult<Pose> {
        self.call(&command::GET_TOOL, vec![])?.pose()
    }

    /// Attach an empty tool with the given TCP to this robot.
    pub fn add_tool(&self, tcp: &Pose, name: &str) -> LinkResult<Item> {
        let id = self
            .call(&command::ADD_TOOL, vec![Value::Pose(*tcp), Value::Str(name.to_string())])?
            .item_id()?;
        Ok(self.handle(id, Some(ItemType::Tool)))
    }

    pub fn set_as_joint_target(&self) -> LinkResult<()> {
        self.call(&command::SET_AS_JOINT_TARGET, vec![])?;
        Ok(())
    }

    pub fn set_as_cartesian_target(&self) -> LinkResult<()> {
        self.call(&command::SET_AS_CARTESIAN_TARGET, vec![])?;
        Ok(())
    }

    pub fn is_joint_target(&self) -> LinkResult<bool> {
        Ok(self.call(&command::IS_JOINT_TARGET, vec![])?.int()? != 0)
    }
}

/// Destination of a motion: a target item, a joint vector or a pose.
#[derive(Debug, Clone)]
pub enum MoveTarget {
    Item(Item),
    Joints(Joints),
    Pose(Pose),
}

impl MoveTarget {
    /// Kind code, joints, pose and item slots as `MoveX` expects them.
    fn encode(&self, session: &Session) -> LinkResult<[Value; 4]> {
        Ok(match self {
            MoveTarget::Item(item) => [
                Value::Int(1),
                Value::Joints(Joints::default()),
                Value::Pose(Pose::IDENTITY),
                session.item_arg(item)?,
            ],
            MoveTarget::Joints(joints) => [
                Value::Int(2),
                Value::Joints(joints.clone()),
                Value::Pose(Pose::IDENTITY),
                Value::Item(0),
            ],
            MoveTarget::Pose(pose) => [
                Value::Int(3),
                Value::Joints(Joints::default()),
                Value::Pose(*pose),
                Value::Item(0),
            ],
        })
    }
}

impl From<&Item> for MoveTarget {
    fn from(item: &Item) -> Self {
        MoveTarget::Item(item.clone())
    }
}

impl From<Item> for MoveTarget {
    fn from(item: Item) -> Self {
        MoveTarget::Item(item)
    }
}

impl From<Joints> for MoveTarget {
    fn from(joints: Joints) -> Self {
        MoveTarget::Joints(joints)
    }
}

impl From<&Joints> for MoveTarget {
    fn from(joints: &Joints) -> Self {
        MoveTarget::Joints(joints.clone())
    }
}

impl From<Pose> for MoveTarget {
    fn from(pose: Pose) -> Self {
        MoveTarget::Pose(pose)
    }
}

impl From<&Pose> for MoveTarget {
    fn from(pose: &Pose) -> Self {
        MoveTarget::Pose(*pose)
    }
}

impl Item {
    /// Joint move. On a robot this moves it (waiting for the motion to end
    /// when `blocking`); on a program it appends a MoveJ instruction.
    pub fn move_j(&self, target: impl Into<MoveTarget>, blocking: bool) -> LinkResult<()> {
        self.move_x(MoveType::Joint, target.into(), blocking)
    }

    /// Linear move; see [`Item::move_j`].
    pub fn move_l(&self, target: impl Into<MoveTarget>, blocking: bool) -> LinkResult<()> {
        self.move_x(MoveType::Linear, target.into(), blocking)
    }

    /// Circular move through `via` to `to`.
    pub fn move_c(
        &self,
        via: impl Into<MoveTarget>,
        to: impl Into<MoveTarget>,
        blocking: bool,
    ) -> LinkResult<()> {
        self.ensure_id()?;
        let command = if blocking {
            &command::MOVE_C_BLOCKING
        } else {
            &command::MOVE_C
        };
        let mut args = Vec::with_capacity(9);
        args.extend(via.into().encode(&self.session)?);
        args.extend(to.into().encode(&self.session)?);
        args.push(Value::Item(self.id));
        self.session.call(command, &args)?;
        Ok(())
    }

    fn move_x(&self, move_type: MoveType, target: MoveTarget, blocking: bool) -> LinkResult<()> {
        self.ensure_id()?;
        let command = if blocking {
            &command::MOVE_BLOCKING
        } else {
            &command::MOVE
        };
        let mut args = Vec::with_capacity(6);
        args.push(Value::Int(move_type.code()));
        args.extend(target.encode(&self.session)?);
        args.push(Value::Item(self.id));
        self.session.call(command, &args)?;
        Ok(())
    }

    /// True while the robot is executing a motion.
    pub fn busy(&self) -> LinkResult<bool> {
        Ok(self.call(&command::BUSY, vec![])?.int()? != 0)
    }

    /// Block until the current motion finishes.
    pub fn wait_move(&self) -> LinkResult<()> {
        self.call(&command::WAIT_MOVE, vec![])?;
        Ok(())
    }

    pub fn stop(&self) -> LinkResult<()> {
        self.call(&command::STOP, vec![])?;
        Ok(())
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.session.id() == other.session.id()
    }
}

impl Eq for Item {}

impl Hash for Item {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.session.id().hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("session", &self.session.id())
            .finish()
    }
}
