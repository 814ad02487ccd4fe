//! Program editing and execution on program and machining items.

use std::path::Path;

use crate::command;
use crate::error::{LinkError, LinkResult};
use crate::item::Item;
use crate::joints::Joints;
use crate::matrix::Matrix;
use crate::pose::Pose;
use crate::types::{CodeKind, InstructionType, ItemType, MoveType};
use crate::wire::Value;

/// One program instruction as the host describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub name: String,
    pub kind: InstructionType,
    /// Set for move instructions.
    pub move_type: Option<MoveType>,
    pub is_joint_target: bool,
    pub pose: Pose,
    pub joints: Joints,
}

impl Instruction {
    pub fn is_move(&self) -> bool {
        matches!(self.kind, InstructionType::Move | InstructionType::MoveC)
    }
}

/// Program speeds; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Speed {
    pub linear_mm_s: Option<f64>,
    pub joints_deg_s: Option<f64>,
    pub linear_accel_mm_s2: Option<f64>,
    pub joints_accel_deg_s2: Option<f64>,
}

impl Speed {
    pub fn linear(mm_s: f64) -> Self {
        Self {
            linear_mm_s: Some(mm_s),
            ..Self::default()
        }
    }

    pub fn with_joints(mut self, deg_s: f64) -> Self {
        self.joints_deg_s = Some(deg_s);
        self
    }

    pub fn with_accelerations(mut self, linear_mm_s2: f64, joints_deg_s2: f64) -> Self {
        self.linear_accel_mm_s2 = Some(linear_mm_s2);
        self.joints_accel_deg_s2 = Some(joints_deg_s2);
        self
    }

    fn to_joints(self) -> Joints {
        let slot = |value: Option<f64>| value.unwrap_or(-1.0);
        Joints::from([
            slot(self.linear_mm_s),
            slot(self.joints_deg_s),
            slot(self.linear_accel_mm_s2),
            slot(self.joints_accel_deg_s2),
        ])
    }
}

/// Sampling and checking options for [`Item::instruction_list_joints`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointListOptions {
    /// Step between samples along linear moves.
    pub mm_step: f64,
    /// Step between samples along joint moves.
    pub deg_step: f64,
    pub check_collisions: bool,
    /// Host-defined layout flags, passed through.
    pub flags: i32,
    /// Time step for timed output; not used when zero or negative.
    pub time_step_s: f64,
}

impl Default for JointListOptions {
    fn default() -> Self {
        Self {
            mm_step: 1.0,
            deg_step: 1.0,
            check_collisions: false,
            flags: 0,
            time_step_s: -1.0,
        }
    }
}

/// One column of a joint list.
#[derive(Debug, Clone, PartialEq)]
pub struct JointSample {
    pub joints: Joints,
    /// Non-zero when the sample hits a singularity, limit or collision.
    pub error: f64,
    pub mm_step: f64,
    pub deg_step: f64,
    /// Instruction the sample belongs to.
    pub move_id: i32,
}

/// Result of [`Item::instruction_list_joints`].
#[derive(Debug, Clone, PartialEq)]
pub struct JointList {
    pub message: String,
    /// Zero when every sample is valid, negative on failure.
    pub status: i32,
    /// Samples as columns: joints, then error, mm step, deg step, move id.
    pub matrix: Matrix,
}

impl JointList {
    /// Rows after the joints in every column.
    pub const EXTRA_ROWS: usize = 4;

    pub fn samples(&self) -> Vec<JointSample> {
        let rows = self.matrix.rows();
        if rows < Self::EXTRA_ROWS {
            return Vec::new();
        }
        let njoints = rows - Self::EXTRA_ROWS;
        self.matrix
            .columns()
            .map(|column| JointSample {
                joints: Joints::from(&column[..njoints]),
                error: column[njoints],
                mm_step: column[njoints + 1],
                deg_step: column[njoints + 2],
                move_id: column[njoints + 3].round() as i32,
            })
            .collect()
    }
}

/// Validation summary from [`Item::update_program`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramCheck {
    pub valid_instructions: usize,
    pub time_s: f64,
    pub distance_mm: f64,
    /// 1.0 when the whole program can run.
    pub valid_ratio: f64,
    pub message: String,
}

impl ProgramCheck {
    pub fn is_valid(&self) -> bool {
        self.valid_ratio >= 1.0
    }
}

/// Outcome of generating controller code with [`Item::make_program`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedProgram {
    pub success: bool,
    pub log: String,
}

/// Outcome of [`Item::filter_program`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSummary {
    /// Zero or more on success, negative when the file could not be filtered.
    pub status: i32,
    pub summary: String,
}

impl Item {
    pub fn instruction_count(&self) -> LinkResult<usize> {
        let count = self.call(&command::INSTRUCTION_COUNT, vec![])?.int()?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn instruction(&self, index: usize) -> LinkResult<Instruction> {
        let mut reply = self.call(&command::INSTRUCTION_GET, vec![index_arg(index)?])?;
        let name = reply.string()?;
        let kind = InstructionType::from_code(reply.int()?).unwrap_or(InstructionType::Invalid);
        let move_type = MoveType::from_code(reply.int()?);
        let is_joint_target = reply.int()? != 0;
        let pose = reply.pose()?;
        let joints = reply.joints()?;
        Ok(Instruction {
            name,
            kind,
            move_type,
            is_joint_target,
            pose,
            joints,
        })
    }

    pub fn instructions(&self) -> LinkResult<Vec<Instruction>> {
        (0..self.instruction_count()?)
            .map(|index| self.instruction(index))
            .collect()
    }

    /// Overwrite the instruction at `index`.
    pub fn set_instruction(&self, index: usize, instruction: &Instruction) -> LinkResult<()> {
        self.call(
            &command::INSTRUCTION_SET,
            vec![
                index_arg(index)?,
                Value::Str(instruction.name.clone()),
                Value::Int(instruction.kind.code()),
                Value::Int(instruction.move_type.map_or(0, MoveType::code)),
                Value::Int(instruction.is_joint_target.into()),
                Value::Pose(instruction.pose),
                Value::Joints(instruction.joints.clone()),
            ],
        )?;
        Ok(())
    }

    /// Select the instruction new ones are inserted after. `None` selects
    /// the end of the program. Returns the selected index.
    pub fn select_instruction(&self, index: Option<usize>) -> LinkResult<Option<usize>> {
        let index = match index {
            Some(index) => index_arg(index)?,
            None => Value::Int(-1),
        };
        let selected = self.call(&command::INSTRUCTION_SELECT, vec![index])?.int()?;
        Ok(usize::try_from(selected).ok())
    }

    /// Delete the instruction at `index`; false if there was none.
    pub fn delete_instruction(&self, index: usize) -> LinkResult<bool> {
        Ok(self.call(&command::INSTRUCTION_DELETE, vec![index_arg(index)?])?.int()? != 0)
    }

    /// Move instruction `index` next to instruction `to_index` of `program`
    /// (which may be this program).
    pub fn move_instruction(
        &self,
        index: usize,
        program: &Item,
        to_index: usize,
        after: bool,
    ) -> LinkResult<()> {
        let program = self.session().item_arg(program)?;
        self.call(
            &command::INSTRUCTION_MOVE,
            vec![index_arg(index)?, program, index_arg(to_index)?, Value::Int(after.into())],
        )?;
        Ok(())
    }

    /// Sample the program's joint path.
    pub fn instruction_list_joints(&self, options: &JointListOptions) -> LinkResult<JointList> {
        self.joint_list(options, String::new())
    }

    /// Like [`Item::instruction_list_joints`], but the host writes the
    /// samples to `path` as CSV; the returned matrix is empty.
    pub fn instruction_list_joints_to_file(
        &self,
        options: &JointListOptions,
        path: impl AsRef<Path>,
    ) -> LinkResult<JointList> {
        self.joint_list(options, path_arg(path.as_ref())?)
    }

    fn joint_list(&self, options: &JointListOptions, path: String) -> LinkResult<JointList> {
        let mut reply = self.call(
            &command::INSTRUCTION_LIST_JOINTS,
            vec![
                Value::Float(options.mm_step),
                Value::Float(options.deg_step),
                Value::Str(path),
                Value::Int(options.check_collisions.into()),
                Value::Int(options.flags),
                Value::Float(options.time_step_s),
            ],
        )?;
        let message = reply.string()?;
        let matrix = reply.matrix()?;
        let status = reply.int()?;
        Ok(JointList {
            message,
            status,
            matrix,
        })
    }

    pub fn set_speed(&self, speed: Speed) -> LinkResult<()> {
        self.call(&command::SET_SPEED, vec![Value::Joints(speed.to_joints())])?;
        Ok(())
    }

    /// Blending radius in mm; negative for fine positioning.
    pub fn set_rounding(&self, mm: f64) -> LinkResult<()> {
        self.call(&command::SET_ROUNDING, vec![Value::Float(mm)])?;
        Ok(())
    }

    pub fn set_do(&self, output: &str, value: &str) -> LinkResult<()> {
        self.call(
            &command::SET_DO,
            vec![Value::Str(output.to_string()), Value::Str(value.to_string())],
        )?;
        Ok(())
    }

    /// Wait for `input` to reach `value`; `timeout_ms` of zero or less waits forever.
    pub fn wait_di(&self, input: &str, value: &str, timeout_ms: f64) -> LinkResult<()> {
        self.call(
            &command::WAIT_DI,
            vec![
                Value::Str(input.to_string()),
                Value::Str(value.to_string()),
                Value::Float(timeout_ms),
            ],
        )?;
        Ok(())
    }

    /// Pause for `ms`, or until resumed when negative.
    pub fn pause(&self, ms: f64) -> LinkResult<()> {
        self.call(&command::PAUSE, vec![Value::Float(ms)])?;
        Ok(())
    }

    /// Add a call, raw code, thread start, comment or pendant message.
    pub fn run_code(&self, code: &str, kind: CodeKind) -> LinkResult<()> {
        self.call(
            &command::RUN_INSTRUCTION,
            vec![Value::Str(code.to_string()), Value::Int(kind.code())],
        )?;
        Ok(())
    }

    /// Run the program and wait for it to finish. Returns the host's status.
    pub fn run_program(&self, parameters: Option<&Joints>) -> LinkResult<i32> {
        let parameters = parameters.cloned().unwrap_or_default();
        self.call(&command::RUN_PROGRAM, vec![Value::Joints(parameters)])?
            .int()
    }

    /// Recompute the program and report what can run.
    pub fn update_program(
        &self,
        check_collisions: bool,
        timeout_s: f64,
        mm_step: f64,
        deg_step: f64,
    ) -> LinkResult<ProgramCheck> {
        let mut reply = self.call(
            &command::PROGRAM_UPDATE,
            vec![
                Value::Int(check_collisions.into()),
                Value::Float(timeout_s),
                Value::Float(mm_step),
                Value::Float(deg_step),
            ],
        )?;
        let values = reply.joints()?;
        let message = reply.string()?;
        if values.len() < 4 {
            return Err(LinkError::framing(format!(
                "program check carries {} values, expected 4",
                values.len()
            )));
        }
        Ok(ProgramCheck {
            valid_instructions: values[0].max(0.0) as usize,
            time_s: values[1],
            distance_mm: values[2],
            valid_ratio: values[3],
            message,
        })
    }

    /// Generate controller code into `path`.
    pub fn make_program(&self, path: impl AsRef<Path>) -> LinkResult<GeneratedProgram> {
        let mut reply = self.call(
            &command::MAKE_PROGRAM,
            vec![Value::Str(path_arg(path.as_ref())?)],
        )?;
        let success = reply.int()? != 0;
        let log = reply.string()?;
        Ok(GeneratedProgram { success, log })
    }

    /// Send a controller program file through this robot's filter.
    pub fn filter_program(&self, path: impl AsRef<Path>) -> LinkResult<FilterSummary> {
        let mut reply = self.call(
            &command::FILTER_PROGRAM,
            vec![Value::Str(path_arg(path.as_ref())?)],
        )?;
        let status = reply.int()?;
        let summary = reply.string()?;
        Ok(FilterSummary { status, summary })
    }

    /// Configure a machining project from an NC file or a part's curves.
    /// Returns the generated program and the host's status.
    pub fn set_machining_parameters(
        &self,
        nc_file: Option<&Path>,
        part: Option<&Item>,
        options: &str,
    ) -> LinkResult<(Item, i32)> {
        let nc_file = nc_file.map_or(Ok(String::new()), path_arg)?;
        let part = self.session().optional_item_arg(part)?;
        let mut reply = self.call(
            &command::SET_MACHINING_PARAMS,
            vec![Value::Str(nc_file), part, Value::Str(options.to_string())],
        )?;
        let program = reply.item_id()?;
        let status = reply.int()?;
        Ok((self.session().item(program, Some(ItemType::Program)), status))
    }
}

fn index_arg(index: usize) -> LinkResult<Value> {
    i32::try_from(index)
        .map(Value::Int)
        .map_err(|_| LinkError::type_error(format!("instruction index {index} out of range")))
}

pub(crate) fn path_arg(path: &Path) -> LinkResult<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| LinkError::type_error(format!("path is not UTF-8: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_speeds_are_sent_as_minus_one() {
        let speed = Speed::linear(250.0).with_joints(45.0);
        assert_eq!(speed.to_joints().as_slice(), &[250.0, 45.0, -1.0, -1.0]);
    }

    #[test]
    fn joint_list_samples_split_extra_rows() {
        let matrix = Matrix::from_columns(&[
            [10.0, 20.0, 0.0, 1.0, 0.0, 3.0],
            [11.0, 21.0, 1.0, 1.0, 0.5, 4.0],
        ])
        .unwrap();
        let list = JointList {
            message: String::new(),
            status: 0,
            matrix,
        };
        let samples = list.samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].joints.as_slice(), &[11.0, 21.0]);
        assert_eq!(samples[1].error, 1.0);
        assert_eq!(samples[1].move_id, 4);
    }
}
