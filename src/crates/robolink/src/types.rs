//! Enumerations shared by the façade and the fake host, with their wire codes.

use std::fmt;

use crate::error::{LinkError, LinkResult};

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($(#[$vmeta:meta])* $variant:ident = $code:expr),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn code(self) -> i32 {
                match self {
                    $($name::$variant => $code),+
                }
            }

            pub fn from_code(code: i32) -> Option<Self> {
                match code {
                    $(c if c == $code => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl TryFrom<i32> for $name {
            type Error = LinkError;

            fn try_from(code: i32) -> LinkResult<Self> {
                Self::from_code(code).ok_or_else(|| {
                    LinkError::type_error(format!(
                        concat!("unknown ", stringify!($name), " code {}"),
                        code
                    ))
                })
            }
        }
    };
}

wire_enum! {
    /// Entity type tag of a station item.
    pub enum ItemType {
        Any = -1,
        Station = 1,
        Robot = 2,
        Frame = 3,
        Tool = 4,
        Object = 5,
        Target = 6,
        Program = 8,
        Machining = 11,
        Camera = 19,
        Mechanism = 21,
    }
}

wire_enum! {
    /// What motion and program commands do on the host.
    pub enum RunMode {
        /// Move the simulated robot.
        Simulate = 1,
        /// Record instructions for offline program generation.
        MakeProgram = 3,
        MakeProgramAndRun = 5,
        /// Drive the real robot through its driver.
        RunRobot = 6,
    }
}

wire_enum! {
    /// Kind of a program instruction.
    pub enum InstructionType {
        Invalid = -1,
        Move = 0,
        MoveC = 1,
        ChangeSpeed = 2,
        ChangeFrame = 3,
        ChangeTool = 4,
        ChangeRobot = 5,
        Pause = 6,
        Event = 7,
        Code = 8,
        Print = 9,
    }
}

wire_enum! {
    pub enum MoveType {
        Joint = 1,
        Linear = 2,
        Circular = 3,
    }
}

wire_enum! {
    /// Main window state of the host.
    pub enum WindowState {
        Hidden = -1,
        Show = 0,
        Minimized = 1,
        Normal = 2,
        Maximized = 3,
        Fullscreen = 4,
        Cinema = 5,
        FullscreenCinema = 6,
    }
}

wire_enum! {
    /// How [`crate::Item::run_code`] treats its text.
    pub enum CodeKind {
        /// Call a subprogram by name.
        Call = 0,
        /// Insert raw controller code.
        Insert = 1,
        /// Start a thread running the named subprogram.
        StartThread = 2,
        /// A comment line.
        Comment = 3,
        /// Show a message on the teach pendant.
        ShowMessage = 4,
    }
}

wire_enum! {
    /// How points are placed on an object's surface.
    pub enum ProjectionType {
        None = 0,
        Closest = 1,
        AlongNormal = 2,
        /// Project along the normal and recompute the normals.
        AlongNormalRecalc = 3,
        ClosestRecalc = 4,
        /// Keep positions, recompute normals.
        Recalc = 5,
    }
}

wire_enum! {
    pub enum SprayState {
        Off = 0,
        On = 1,
    }
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Simulate
    }
}

/// Station parameter value: the host stores strings, integers are parsed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Int(i64),
    Text(String),
}

impl ParamValue {
    /// `Int` when the text is exactly the decimal form of an integer.
    pub fn parse(text: &str) -> Self {
        match text.parse::<i64>() {
            Ok(value) if value.to_string() == text => ParamValue::Int(value),
            _ => ParamValue::Text(text.to_string()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(value) => Some(*value),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(text) => Some(text),
            ParamValue::Int(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(value) => write!(f, "{value}"),
            ParamValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<&str> for ParamValue {
    fn from(text: &str) -> Self {
        ParamValue::Text(text.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(text: String) -> Self {
        ParamValue::Text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for kind in ItemType::ALL {
            assert_eq!(ItemType::from_code(kind.code()), Some(*kind));
        }
        assert_eq!(RunMode::try_from(6).unwrap(), RunMode::RunRobot);
        assert!(RunMode::try_from(2).is_err());
        assert_eq!(InstructionType::from_code(-1), Some(InstructionType::Invalid));
        // Variants carrying doc comments keep their codes.
        assert_eq!(CodeKind::ShowMessage.code(), 4);
        assert_eq!(ProjectionType::from_code(3), Some(ProjectionType::AlongNormalRecalc));
        assert_eq!(RunMode::try_from(5).unwrap(), RunMode::MakeProgramAndRun);
    }

    #[test]
    fn params_parse_integers_only_when_exact() {
        assert_eq!(ParamValue::parse("42"), ParamValue::Int(42));
        assert_eq!(ParamValue::parse("-7"), ParamValue::Int(-7));
        assert_eq!(ParamValue::parse("007"), ParamValue::Text("007".into()));
        assert_eq!(ParamValue::parse("1.5"), ParamValue::Text("1.5".into()));
        assert_eq!(ParamValue::from(3).to_string(), "3");
    }
}
