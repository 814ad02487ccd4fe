use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, LinkResult};

/// Kind of a fixture item, spelled in lower case in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixtureKind {
    Frame,
    Robot,
    Mechanism,
    Tool,
    Object,
    Target,
    Program,
}

/// One item of a seeded station, with its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFixture {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FixtureKind,
    /// Pose relative to the parent as `[x, y, z, r, p, w]` (mm, degrees).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<[f64; 6]>,
    /// Robot or target joints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joints: Option<Vec<f64>>,
    /// Object points, one `[x, y, z]` (or `[x, y, z, i, j, k]`) per entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<Vec<f64>>,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ItemFixture>,
}

fn visible_by_default() -> bool {
    true
}

impl ItemFixture {
    pub fn new(name: impl Into<String>, kind: FixtureKind) -> Self {
        Self {
            name: name.into(),
            kind,
            pose: None,
            joints: None,
            points: Vec::new(),
            visible: true,
            children: Vec::new(),
        }
    }

    pub fn frame(name: impl Into<String>) -> Self {
        Self::new(name, FixtureKind::Frame)
    }

    /// A six-axis robot at zero joints.
    pub fn robot(name: impl Into<String>) -> Self {
        Self::new(name, FixtureKind::Robot).with_joints(vec![0.0; 6])
    }

    pub fn tool(name: impl Into<String>) -> Self {
        Self::new(name, FixtureKind::Tool)
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::new(name, FixtureKind::Object)
    }

    pub fn target(name: impl Into<String>) -> Self {
        Self::new(name, FixtureKind::Target)
    }

    pub fn with_pose(mut self, xyzrpw: [f64; 6]) -> Self {
        self.pose = Some(xyzrpw);
        self
    }

    pub fn with_joints(mut self, joints: Vec<f64>) -> Self {
        self.joints = Some(joints);
        self
    }

    pub fn with_points(mut self, points: Vec<Vec<f64>>) -> Self {
        self.points = points;
        self
    }

    pub fn with_child(mut self, child: ItemFixture) -> Self {
        self.children.push(child);
        self
    }
}

/// JSON description of a station to seed the fake host with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationFixture {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub items: Vec<ItemFixture>,
}

impl Default for StationFixture {
    fn default() -> Self {
        Self::new("Station")
    }
}

impl StationFixture {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, item: ItemFixture) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn from_json(text: &str) -> LinkResult<Self> {
        serde_json::from_str(text).map_err(|err| LinkError::config(format!("station fixture: {err}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> LinkResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|err| LinkError::config(format!("{}: {err}", path.display())))
    }

    pub fn to_json(&self) -> LinkResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| LinkError::config(format!("station fixture: {err}")))
    }
}
