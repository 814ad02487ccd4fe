//! Client binding for driving a robotics-simulation host over TCP.
//!
//! A [`Session`] owns one connection. Station lookups hand out [`Item`]
//! handles bound to that session, and every host command is a thin method
//! over a [`Command`] schema that is checked locally before anything is sent.
//!
//! Typical usage:
//! ```no_run
//! use robolink::{ItemType, Joints, Pose, Session, SessionConfig};
//!
//! let session = Session::open(SessionConfig::default().with_auto_start(true))
//!     .expect("host should be reachable");
//! let robot = session
//!     .item_by_name("UR10", Some(ItemType::Robot))
//!     .expect("lookup should succeed");
//! robot.move_j(Joints::from([0.0, -90.0, 90.0, 0.0, 90.0, 0.0]), true).unwrap();
//!
//! let approach = robot.pose().unwrap() * Pose::transl(0.0, 0.0, -100.0);
//! if let Some(joints) = robot.solve_ik(&approach, None).unwrap() {
//!     robot.move_l(joints, true).unwrap();
//! }
//! session.close();
//! ```
//!
//! With the `test-support` feature, `fake_host` implements the host side of
//! the protocol for tests.

mod camera;
pub mod command;
mod config;
mod error;
#[cfg(feature = "test-support")]
pub mod fake_host;
mod item;
mod joints;
mod launcher;
mod matrix;
mod pose;
mod program;
mod session;
mod spray;
mod station;
mod transport;
mod types;
pub mod wire;

pub use camera::{CameraOptions, Color, DepthMap};
pub use command::Command;
pub use config::{default_executable, SessionConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use error::{LinkError, LinkResult};
pub use item::{Configuration, Item, MoveTarget};
pub use joints::Joints;
pub use matrix::Matrix;
pub use pose::{EulerConvention, Pose, POSE_TOLERANCE};
pub use program::{
    FilterSummary, GeneratedProgram, Instruction, JointList, JointListOptions, JointSample,
    ProgramCheck, Speed,
};
pub use session::{
    default_session, CloseHandle, Reply, Session, SessionState, PROTOCOL_VERSION,
    SUPPORTED_PROTOCOL_VERSIONS,
};
pub use spray::{Particle, SprayArea, SprayOptions, SprayStats};
pub use station::PATH_PARAMS;
pub use transport::HANDSHAKE_TOKEN;
pub use types::{
    CodeKind, InstructionType, ItemType, MoveType, ParamValue, ProjectionType, RunMode,
    SprayState, WindowState,
};
pub use wire::{Kind, Value};
