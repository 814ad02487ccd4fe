use std::collections::BTreeMap;

use crate::camera::CameraOptions;
use crate::joints::Joints;
use crate::matrix::Matrix;
use crate::pose::Pose;
use crate::program::Instruction;
use crate::spray::SprayOptions;
use crate::types::{ItemType, RunMode};
use crate::wire::Value;

use super::fixture::{FixtureKind, ItemFixture, StationFixture};
use super::kinematics;

/// Why a request failed, mapped to a status word by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Fault {
    InvalidItem(String),
    Host(String),
}

impl Fault {
    pub(crate) fn host(message: impl Into<String>) -> Self {
        Fault::Host(message.into())
    }

    pub(crate) fn status(&self) -> (i32, &str) {
        match self {
            Fault::InvalidItem(message) => (1, message),
            Fault::Host(message) => (10, message),
        }
    }
}

pub(crate) type Handled = Result<Vec<Value>, Fault>;

/// Decoded request arguments, consumed in schema order.
pub(crate) struct Args(std::vec::IntoIter<Value>);

impl Args {
    pub(crate) fn new(values: Vec<Value>) -> Self {
        Self(values.into_iter())
    }

    fn next(&mut self) -> Result<Value, Fault> {
        self.0
            .next()
            .ok_or_else(|| Fault::host("request is missing an argument"))
    }

    pub(crate) fn int(&mut self) -> Result<i32, Fault> {
        match self.next()? {
            Value::Int(v) => Ok(v),
            other => Err(mismatch("int", &other)),
        }
    }

    pub(crate) fn float(&mut self) -> Result<f64, Fault> {
        match self.next()? {
            Value::Float(v) => Ok(v),
            other => Err(mismatch("float", &other)),
        }
    }

    pub(crate) fn string(&mut self) -> Result<String, Fault> {
        match self.next()? {
            Value::Str(v) => Ok(v),
            other => Err(mismatch("string", &other)),
        }
    }

    pub(crate) fn item(&mut self) -> Result<i32, Fault> {
        match self.next()? {
            Value::Item(v) => Ok(v),
            other => Err(mismatch("item", &other)),
        }
    }

    pub(crate) fn matrix(&mut self) -> Result<Matrix, Fault> {
        match self.next()? {
            Value::Matrix(v) => Ok(v),
            other => Err(mismatch("matrix", &other)),
        }
    }

    pub(crate) fn joints(&mut self) -> Result<Joints, Fault> {
        match self.next()? {
            Value::Joints(v) => Ok(v),
            other => Err(mismatch("joints", &other)),
        }
    }

    pub(crate) fn pose(&mut self) -> Result<Pose, Fault> {
        match self.next()? {
            Value::Pose(v) => Ok(v),
            other => Err(mismatch("pose", &other)),
        }
    }
}

fn mismatch(expected: &str, got: &Value) -> Fault {
    Fault::host(format!("expected {expected}, got {:?}", got.kind()))
}

#[derive(Debug, Clone)]
pub(crate) struct Robot {
    pub(crate) joints: Joints,
    pub(crate) home: Joints,
    pub(crate) lower: Joints,
    pub(crate) upper: Joints,
    /// Active reference frame relative to the robot base.
    pub(crate) frame: Pose,
    /// Active TCP relative to the flange.
    pub(crate) tool: Pose,
}

impl Robot {
    pub(crate) fn new(joints: Joints) -> Self {
        let (lower, upper) = kinematics::limits(joints.len());
        Self {
            home: joints.clone(),
            joints,
            lower,
            upper,
            frame: Pose::IDENTITY,
            tool: Pose::IDENTITY,
        }
    }

    pub(crate) fn accepts(&self, joints: &Joints) -> bool {
        joints.len() == self.joints.len() && kinematics::within(joints, &self.lower, &self.upper)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ProgramData {
    pub(crate) robot: i32,
    pub(crate) instructions: Vec<Instruction>,
    /// New instructions go after this one; `None` appends.
    pub(crate) selected: Option<usize>,
}

impl ProgramData {
    pub(crate) fn insert(&mut self, instruction: Instruction) {
        match self.selected {
            Some(index) if index < self.instructions.len() => {
                self.instructions.insert(index + 1, instruction);
                self.selected = Some(index + 1);
            }
            _ => self.instructions.push(instruction),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum NodeData {
    Plain,
    Robot(Robot),
    Target {
        joints: Joints,
        joint_target: bool,
        robot: i32,
    },
    Program(ProgramData),
    Machining {
        robot: i32,
    },
    Object {
        points: Matrix,
        triangles: Matrix,
    },
    Camera {
        options: CameraOptions,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) kind: ItemType,
    /// Zero for stations.
    pub(crate) parent: i32,
    pub(crate) children: Vec<i32>,
    pub(crate) pose: Pose,
    pub(crate) visible: bool,
    pub(crate) data: NodeData,
}

#[derive(Debug, Clone)]
pub(crate) struct Spray {
    pub(crate) tool: i32,
    pub(crate) object: i32,
    pub(crate) options: SprayOptions,
    pub(crate) on: bool,
    pub(crate) particles: u64,
}

impl Spray {
    /// Particles deposited per motion while on.
    pub(crate) fn burst(&self) -> u64 {
        let (a, b) = self.options.step.unwrap_or((10, 10));
        u64::from(a) * u64::from(b)
    }
}

/// Everything the fake host knows: the item tree, parameters and settings.
#[derive(Debug)]
pub struct Station {
    pub(crate) nodes: BTreeMap<i32, Node>,
    pub(crate) stations: Vec<i32>,
    pub(crate) active: i32,
    next_id: i32,
    pub(crate) params: BTreeMap<String, String>,
    pub(crate) run_mode: RunMode,
    pub(crate) simulation_speed: i32,
    pub(crate) sprays: BTreeMap<i32, Spray>,
    pub(crate) quit: bool,
}

impl Station {
    pub fn new(fixture: &StationFixture) -> Self {
        let mut station = Self {
            nodes: BTreeMap::new(),
            stations: Vec::new(),
            active: 0,
            next_id: 1,
            params: BTreeMap::new(),
            run_mode: RunMode::Simulate,
            simulation_speed: 1000,
            sprays: BTreeMap::new(),
            quit: false,
        };
        station.load(fixture);
        station
    }

    /// True once a client asked the host to exit.
    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    pub(crate) fn allocate_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Add `fixture` as a new station and make it active.
    pub(crate) fn load(&mut self, fixture: &StationFixture) -> i32 {
        let station = self.insert(
            0,
            &fixture.name,
            ItemType::Station,
            Pose::IDENTITY,
            NodeData::Plain,
        );
        self.stations.push(station);
        self.active = station;
        self.params
            .extend(fixture.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        for item in &fixture.items {
            self.load_item(station, item);
        }
        station
    }

    fn load_item(&mut self, parent: i32, item: &ItemFixture) {
        let pose = item
            .pose
            .map(Pose::from_xyzrpw_deg)
            .unwrap_or(Pose::IDENTITY);
        let joints = item.joints.clone().map(Joints::new);
        let (kind, data) = match item.kind {
            FixtureKind::Frame => (ItemType::Frame, NodeData::Plain),
            FixtureKind::Tool => (ItemType::Tool, NodeData::Plain),
            FixtureKind::Robot | FixtureKind::Mechanism => {
                let kind = if item.kind == FixtureKind::Robot {
                    ItemType::Robot
                } else {
                    ItemType::Mechanism
                };
                let joints = joints.unwrap_or_else(|| Joints::zeros(kinematics::AXES));
                (kind, NodeData::Robot(Robot::new(joints)))
            }
            FixtureKind::Object => {
                let points = Matrix::from_columns(&item.points).unwrap_or_default();
                (
                    ItemType::Object,
                    NodeData::Object {
                        points,
                        triangles: Matrix::empty(),
                    },
                )
            }
            FixtureKind::Target => (
                ItemType::Target,
                NodeData::Target {
                    joint_target: joints.is_some(),
                    joints: joints.unwrap_or_default(),
                    robot: self.robot_ancestor(parent),
                },
            ),
            FixtureKind::Program => (
                ItemType::Program,
                NodeData::Program(ProgramData {
                    robot: self.robot_ancestor(parent),
                    ..ProgramData::default()
                }),
            ),
        };
        let id = self.insert(parent, &item.name, kind, pose, data);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.visible = item.visible;
        }
        if kind == ItemType::Tool {
            self.attach_tool(id);
        }
        for child in &item.children {
            self.load_item(id, child);
        }
    }

    /// A tool placed under a robot becomes its active tool.
    pub(crate) fn attach_tool(&mut self, tool: i32) {
        let Some(node) = self.nodes.get(&tool) else {
            return;
        };
        let (parent, tcp) = (node.parent, node.pose);
        if let Some(Node {
            data: NodeData::Robot(robot),
            ..
        }) = self.nodes.get_mut(&parent)
        {
            robot.tool = tcp;
        }
    }

    fn robot_ancestor(&self, mut id: i32) -> i32 {
        while let Some(node) = self.nodes.get(&id) {
            if matches!(node.data, NodeData::Robot(_)) {
                return id;
            }
            id = node.parent;
        }
        0
    }

    pub(crate) fn insert(
        &mut self,
        parent: i32,
        name: &str,
        kind: ItemType,
        pose: Pose,
        data: NodeData,
    ) -> i32 {
        let id = self.allocate_id();
        self.nodes.insert(
            id,
            Node {
                name: name.to_string(),
                kind,
                parent,
                children: Vec::new(),
                pose,
                visible: true,
                data,
            },
        );
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.push(id);
        }
        id
    }

    pub(crate) fn node(&self, id: i32) -> Result<&Node, Fault> {
        self.nodes
            .get(&id)
            .ok_or_else(|| Fault::InvalidItem(format!("item {id} does not exist")))
    }

    pub(crate) fn node_mut(&mut self, id: i32) -> Result<&mut Node, Fault> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| Fault::InvalidItem(format!("item {id} does not exist")))
    }

    /// Parent for new items: `id` when given, else the active station.
    pub(crate) fn parent_or_station(&self, id: i32) -> Result<i32, Fault> {
        if id == 0 {
            return Ok(self.active);
        }
        self.node(id).map(|_| id)
    }

    pub(crate) fn robot(&self, id: i32) -> Result<&Robot, Fault> {
        match &self.node(id)?.data {
            NodeData::Robot(robot) => Ok(robot),
            _ => Err(Fault::host(format!("item {id} is not a robot"))),
        }
    }

    pub(crate) fn robot_mut(&mut self, id: i32) -> Result<&mut Robot, Fault> {
        match &mut self.node_mut(id)?.data {
            NodeData::Robot(robot) => Ok(robot),
            _ => Err(Fault::host(format!("item {id} is not a robot"))),
        }
    }

    pub(crate) fn program_mut(&mut self, id: i32) -> Result<&mut ProgramData, Fault> {
        match &mut self.node_mut(id)?.data {
            NodeData::Program(program) => Ok(program),
            _ => Err(Fault::host(format!("item {id} is not a program"))),
        }
    }

    pub(crate) fn program(&self, id: i32) -> Result<&ProgramData, Fault> {
        match &self.node(id)?.data {
            NodeData::Program(program) => Ok(program),
            _ => Err(Fault::host(format!("item {id} is not a program"))),
        }
    }

    pub(crate) fn is_program(&self, id: i32) -> bool {
        matches!(
            self.nodes.get(&id).map(|node| &node.data),
            Some(NodeData::Program(_))
        )
    }

    /// Pose relative to the station root.
    pub(crate) fn abs_pose(&self, id: i32) -> Pose {
        let mut pose = Pose::IDENTITY;
        let mut current = id;
        while let Some(node) = self.nodes.get(&current) {
            if node.kind == ItemType::Station {
                break;
            }
            pose = node.pose * pose;
            current = node.parent;
        }
        pose
    }

    /// TCP relative to the robot's active reference frame.
    pub(crate) fn robot_tcp(&self, id: i32) -> Result<Pose, Fault> {
        let robot = self.robot(id)?;
        Ok(robot.frame.invert() * kinematics::forward(&robot.joints) * robot.tool)
    }

    pub(crate) fn station_of(&self, mut id: i32) -> i32 {
        while let Some(node) = self.nodes.get(&id) {
            if node.kind == ItemType::Station {
                return id;
            }
            id = node.parent;
        }
        0
    }

    /// `root` and everything below it, depth first in child order.
    pub(crate) fn subtree(&self, root: i32) -> Vec<i32> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                order.push(id);
                stack.extend(node.children.iter().rev());
            }
        }
        order
    }

    /// Items of the active station in tree order, the station itself excluded.
    pub(crate) fn station_items(&self, recursive: bool) -> Vec<i32> {
        if recursive {
            self.subtree(self.active).into_iter().skip(1).collect()
        } else {
            self.nodes
                .get(&self.active)
                .map(|node| node.children.clone())
                .unwrap_or_default()
        }
    }

    pub(crate) fn find(&self, name: &str, kind: Option<ItemType>) -> i32 {
        self.station_items(true)
            .into_iter()
            .find(|id| {
                self.nodes.get(id).is_some_and(|node| {
                    node.name == name && kind.map_or(true, |kind| node.kind == kind)
                })
            })
            .unwrap_or(0)
    }

    /// Re-parent `id`, keeping either its local or its absolute pose.
    pub(crate) fn reparent(&mut self, id: i32, parent: i32, keep_absolute: bool) -> Result<(), Fault> {
        let node = self.node(id)?;
        if node.kind == ItemType::Station {
            return Err(Fault::host("stations cannot be re-parented"));
        }
        self.node(parent)?;
        if self.subtree(id).contains(&parent) {
            return Err(Fault::host("cannot move an item below itself"));
        }
        let absolute = self.abs_pose(id);
        let old_parent = node.parent;
        if let Some(old) = self.nodes.get_mut(&old_parent) {
            old.children.retain(|child| *child != id);
        }
        if let Some(new) = self.nodes.get_mut(&parent) {
            new.children.push(id);
        }
        let local = if keep_absolute {
            self.abs_pose(parent).invert() * absolute
        } else {
            self.node(id)?.pose
        };
        let node = self.node_mut(id)?;
        node.parent = parent;
        node.pose = local;
        Ok(())
    }

    /// Delete `id` and its subtree.
    pub(crate) fn remove(&mut self, id: i32) -> Result<(), Fault> {
        let parent = self.node(id)?.parent;
        for doomed in self.subtree(id) {
            self.nodes.remove(&doomed);
        }
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.retain(|child| *child != id);
        }
        if self.stations.contains(&id) {
            self.stations.retain(|station| *station != id);
            if self.active == id {
                let fallback = self.stations.last().copied();
                self.active = match fallback {
                    Some(station) => station,
                    None => self.load(&StationFixture::new("New Station")),
                };
            }
        }
        Ok(())
    }

    /// Snapshot a station as a fixture, for saving.
    pub(crate) fn to_fixture(&self, station: i32) -> StationFixture {
        let name = self
            .nodes
            .get(&station)
            .map(|node| node.name.clone())
            .unwrap_or_default();
        let items = self
            .nodes
            .get(&station)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|child| self.item_fixture(*child))
                    .collect()
            })
            .unwrap_or_default();
        StationFixture {
            name,
            params: self.params.clone(),
            items,
        }
    }

    fn item_fixture(&self, id: i32) -> Option<ItemFixture> {
        let node = self.nodes.get(&id)?;
        let kind = match node.kind {
            ItemType::Frame => FixtureKind::Frame,
            ItemType::Robot => FixtureKind::Robot,
            ItemType::Mechanism => FixtureKind::Mechanism,
            ItemType::Tool => FixtureKind::Tool,
            ItemType::Object => FixtureKind::Object,
            ItemType::Target => FixtureKind::Target,
            ItemType::Program => FixtureKind::Program,
            _ => return None,
        };
        let mut fixture = ItemFixture::new(node.name.clone(), kind);
        fixture.visible = node.visible;
        if !node.pose.approx_eq(&Pose::IDENTITY, 1e-12) {
            fixture.pose = Some(node.pose.to_xyzrpw_deg());
        }
        match &node.data {
            NodeData::Robot(robot) => fixture.joints = Some(robot.joints.to_vec()),
            NodeData::Target {
                joints,
                joint_target: true,
                ..
            } => fixture.joints = Some(joints.to_vec()),
            NodeData::Object { points, .. } => fixture.points = points.to_columns(),
            _ => {}
        }
        fixture.children = node
            .children
            .iter()
            .filter_map(|child| self.item_fixture(*child))
            .collect();
        Some(fixture)
    }
}
