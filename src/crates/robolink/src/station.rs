//! Station-level operations: lookup, creation, parameters and settings.

use std::path::Path;

use tracing::debug;

use crate::command;
use crate::error::LinkResult;
use crate::item::Item;
use crate::matrix::Matrix;
use crate::program::path_arg;
use crate::session::Session;
use crate::types::{ItemType, ParamValue, ProjectionType, RunMode, WindowState};
use crate::wire::Value;

/// Station parameters the session caches until the station changes.
pub const PATH_PARAMS: &[&str] = &[
    "PATH_OPENSTATION",
    "PATH_LIBRARY",
    "PATH_PROGRAMS",
    "PATH_DESKTOP",
];

/// The host answers `UNKNOWN <key>` for parameters it does not know.
fn is_unknown_marker(value: &str, key: &str) -> bool {
    value.strip_prefix("UNKNOWN ") == Some(key)
}

impl Session {
    /// Free-form command passthrough.
    pub fn command(&self, name: &str, value: &str) -> LinkResult<String> {
        self.call(
            &command::COMMAND,
            &[Value::Str(name.to_string()), Value::Str(value.to_string())],
        )?
        .string()
    }

    /// Read a station parameter; `None` when the host does not know it.
    pub fn get_param(&self, key: &str) -> LinkResult<Option<ParamValue>> {
        let cacheable = PATH_PARAMS.contains(&key);
        if cacheable {
            if let Some(value) = self.with_settings(|s| s.path_cache.get(key).cloned()) {
                return Ok(Some(ParamValue::Text(value)));
            }
        }
        let value = self
            .call(&command::GET_PARAM, &[Value::Str(key.to_string())])?
            .string()?;
        if is_unknown_marker(&value, key) {
            return Ok(None);
        }
        if cacheable && !value.is_empty() {
            self.with_settings(|s| {
                s.path_cache.insert(key.to_string(), value.clone());
            });
        }
        Ok(Some(ParamValue::parse(&value)))
    }

    pub fn set_param(&self, key: &str, value: impl Into<ParamValue>) -> LinkResult<()> {
        let value = value.into().to_string();
        self.with_settings(|s| {
            s.path_cache.remove(key);
        });
        self.call(
            &command::SET_PARAM,
            &[Value::Str(key.to_string()), Value::Str(value)],
        )?;
        Ok(())
    }

    /// Redraw now and keep redrawing after every change (`true`), or defer
    /// redraws until the next `render(true)` (`false`).
    pub fn render(&self, always: bool) -> LinkResult<()> {
        self.call(&command::RENDER, &[Value::Int(always.into())])?;
        Ok(())
    }

    /// Let the host process pending events.
    pub fn update(&self) -> LinkResult<()> {
        self.call(&command::UPDATE, &[])?;
        Ok(())
    }

    /// Show a message in the host, as a blocking popup or in the status bar.
    pub fn show_message(&self, message: &str, popup: bool) -> LinkResult<()> {
        self.call(
            &command::SHOW_MESSAGE,
            &[Value::Str(message.to_string()), Value::Int(popup.into())],
        )?;
        Ok(())
    }

    pub fn set_window_state(&self, state: WindowState) -> LinkResult<()> {
        self.call(&command::SET_WINDOW_STATE, &[Value::Int(state.code())])?;
        Ok(())
    }

    /// Ask the host process to exit, then close the session.
    pub fn quit_host(&self) -> LinkResult<()> {
        let result = self.call(&command::QUIT, &[]).map(drop);
        self.close();
        result
    }

    pub fn set_run_mode(&self, mode: RunMode) -> LinkResult<()> {
        self.call(&command::SET_RUN_MODE, &[Value::Int(mode.code())])?;
        self.with_settings(|s| s.run_mode = Some(mode));
        Ok(())
    }

    pub fn run_mode(&self) -> LinkResult<RunMode> {
        let code = self.call(&command::GET_RUN_MODE, &[])?.int()?;
        let mode = RunMode::try_from(code)?;
        self.with_settings(|s| s.run_mode = Some(mode));
        Ok(mode)
    }

    /// Simulation speed as a multiple of real time.
    pub fn set_simulation_speed(&self, ratio: f64) -> LinkResult<()> {
        let scaled = (ratio * 1000.0).round() as i32;
        self.call(&command::SET_SIMULATION_SPEED, &[Value::Int(scaled)])?;
        self.with_settings(|s| s.simulation_speed = Some(ratio));
        Ok(())
    }

    pub fn simulation_speed(&self) -> LinkResult<f64> {
        let scaled = self.call(&command::GET_SIMULATION_SPEED, &[])?.int()?;
        let ratio = f64::from(scaled) / 1000.0;
        self.with_settings(|s| s.simulation_speed = Some(ratio));
        Ok(ratio)
    }

    pub fn active_station(&self) -> LinkResult<Item> {
        let id = self.call(&command::GET_ACTIVE_STATION, &[])?.item_id()?;
        self.with_settings(|s| s.active_station = Some(id));
        Ok(self.item(id, Some(ItemType::Station)))
    }

    pub fn set_active_station(&self, station: &Item) -> LinkResult<()> {
        let arg = self.item_arg(station)?;
        self.call(&command::SET_ACTIVE_STATION, &[arg])?;
        self.station_changed(Some(station.id()));
        Ok(())
    }

    /// Create an empty station and make it active.
    pub fn add_station(&self, name: &str) -> LinkResult<Item> {
        let id = self
            .call(&command::ADD_STATION, &[Value::Str(name.to_string())])?
            .item_id()?;
        self.station_changed(Some(id));
        Ok(self.item(id, Some(ItemType::Station)))
    }

    /// Close the active station without saving.
    pub fn close_station(&self) -> LinkResult<()> {
        self.call(&command::CLOSE_STATION, &[])?;
        self.station_changed(None);
        Ok(())
    }

    fn station_changed(&self, active: Option<i32>) {
        debug!(session = self.id(), ?active, "station changed, dropping cached paths");
        self.with_settings(|s| {
            s.active_station = active;
            s.path_cache.clear();
        });
    }

    /// Load a station, robot, tool, object or program file under `parent`
    /// (the station root when `None`).
    pub fn add_file(&self, path: impl AsRef<Path>, parent: Option<&Item>) -> LinkResult<Item> {
        let path = path_arg(path.as_ref())?;
        let parent = self.optional_item_arg(parent)?;
        let opens_station = path.to_ascii_lowercase().ends_with(".rdk");
        let id = self
            .call(&command::ADD_FILE, &[Value::Str(path), parent])?
            .item_id()?;
        if opens_station {
            self.station_changed(Some(id));
        }
        Ok(self.item(id, None))
    }

    /// Save the station (or `item` alone) to `path`.
    pub fn save(&self, path: impl AsRef<Path>, item: Option<&Item>) -> LinkResult<()> {
        let path = path_arg(path.as_ref())?;
        let item = self.optional_item_arg(item)?;
        self.call(&command::SAVE, &[Value::Str(path), item])?;
        Ok(())
    }

    /// First item named `name`, optionally restricted to one type. Returns
    /// the invalid item when nothing matches.
    pub fn item_by_name(&self, name: &str, kind: Option<ItemType>) -> LinkResult<Item> {
        let id = match kind {
            None | Some(ItemType::Any) => self
                .call(&command::ITEM_BY_NAME, &[Value::Str(name.to_string())])?
                .item_id()?,
            Some(kind) => self
                .call(
                    &command::ITEM_BY_NAME_TYPE,
                    &[Value::Str(name.to_string()), Value::Int(kind.code())],
                )?
                .item_id()?,
        };
        let kind = kind.filter(|k| *k != ItemType::Any && id != 0);
        Ok(self.item(id, kind))
    }

    /// Items of `kind` in station-tree order.
    pub fn item_list(&self, kind: ItemType, recursive: bool) -> LinkResult<Vec<Item>> {
        let ids = self
            .call(
                &command::ITEM_LIST,
                &[Value::Int(kind.code()), Value::Int(recursive.into())],
            )?
            .item_ids()?;
        let tag = (kind != ItemType::Any).then_some(kind);
        Ok(ids.into_iter().map(|id| self.item(id, tag)).collect())
    }

    /// Let the user pick an item in the host. Blocks without a deadline;
    /// a cancelled pick returns the invalid item.
    pub fn item_pick(&self, prompt: &str, kind: ItemType) -> LinkResult<Item> {
        let id = self
            .call(
                &command::ITEM_PICK,
                &[Value::Str(prompt.to_string()), Value::Int(kind.code())],
            )?
            .item_id()?;
        let tag = (kind != ItemType::Any && id != 0).then_some(kind);
        Ok(self.item(id, tag))
    }

    /// New reference frame under `parent` (the station root when `None`).
    pub fn add_frame(&self, name: &str, parent: Option<&Item>) -> LinkResult<Item> {
        let parent = self.optional_item_arg(parent)?;
        let id = self
            .call(&command::ADD_FRAME, &[Value::Str(name.to_string()), parent])?
            .item_id()?;
        Ok(self.item(id, Some(ItemType::Frame)))
    }

    /// New target under `parent`, linked to `robot` when given.
    pub fn add_target(
        &self,
        name: &str,
        parent: Option<&Item>,
        robot: Option<&Item>,
    ) -> LinkResult<Item> {
        let parent = self.optional_item_arg(parent)?;
        let robot = self.optional_item_arg(robot)?;
        let id = self
            .call(
                &command::ADD_TARGET,
                &[Value::Str(name.to_string()), parent, robot],
            )?
            .item_id()?;
        Ok(self.item(id, Some(ItemType::Target)))
    }

    pub fn add_program(&self, name: &str, robot: Option<&Item>) -> LinkResult<Item> {
        let robot = self.optional_item_arg(robot)?;
        let id = self
            .call(&command::ADD_PROGRAM, &[Value::Str(name.to_string()), robot])?
            .item_id()?;
        Ok(self.item(id, Some(ItemType::Program)))
    }

    pub fn add_machining(&self, name: &str, robot: Option<&Item>) -> LinkResult<Item> {
        let robot = self.optional_item_arg(robot)?;
        let id = self
            .call(&command::ADD_MACHINING, &[Value::Str(name.to_string()), robot])?
            .item_id()?;
        Ok(self.item(id, Some(ItemType::Machining)))
    }

    /// Add triangles (three consecutive columns each, xyz rows) as a shape,
    /// as a new object or merged into `add_to`.
    pub fn add_shape(
        &self,
        triangles: &Matrix,
        add_to: Option<&Item>,
        replace_shapes: bool,
    ) -> LinkResult<Item> {
        let add_to = self.optional_item_arg(add_to)?;
        let id = self
            .call(
                &command::ADD_SHAPE,
                &[
                    Value::Matrix(triangles.clone()),
                    add_to,
                    Value::Int(replace_shapes.into()),
                ],
            )?
            .item_id()?;
        Ok(self.item(id, Some(ItemType::Object)))
    }

    /// Add a curve (points as columns, xyz or xyzijk rows), projected onto
    /// `reference` when given.
    pub fn add_curve(
        &self,
        points: &Matrix,
        reference: Option<&Item>,
        add_to_reference: bool,
        projection: ProjectionType,
    ) -> LinkResult<Item> {
        self.add_geometry(&command::ADD_CURVE, points, reference, add_to_reference, projection)
    }

    /// Add a point cloud; arguments as for [`Session::add_curve`].
    pub fn add_points(
        &self,
        points: &Matrix,
        reference: Option<&Item>,
        add_to_reference: bool,
        projection: ProjectionType,
    ) -> LinkResult<Item> {
        self.add_geometry(&command::ADD_POINTS, points, reference, add_to_reference, projection)
    }

    fn add_geometry(
        &self,
        command: &command::Command,
        points: &Matrix,
        reference: Option<&Item>,
        add_to_reference: bool,
        projection: ProjectionType,
    ) -> LinkResult<Item> {
        let reference = self.optional_item_arg(reference)?;
        let id = self
            .call(
                command,
                &[
                    Value::Matrix(points.clone()),
                    reference,
                    Value::Int(add_to_reference.into()),
                    Value::Int(projection.code()),
                ],
            )?
            .item_id()?;
        Ok(self.item(id, Some(ItemType::Object)))
    }

    /// Project points (columns) onto `object` and return them.
    pub fn project_points(
        &self,
        points: &Matrix,
        object: &Item,
        projection: ProjectionType,
    ) -> LinkResult<Matrix> {
        let object = self.item_arg(object)?;
        self.call(
            &command::PROJECT_POINTS,
            &[
                Value::Matrix(points.clone()),
                object,
                Value::Int(projection.code()),
            ],
        )?
        .matrix()
    }
}

impl Session {
    /// Run mode last selected or read through this session.
    pub fn cached_run_mode(&self) -> Option<RunMode> {
        self.with_settings(|s| s.run_mode)
    }

    /// Simulation speed last selected or read through this session.
    pub fn cached_simulation_speed(&self) -> Option<f64> {
        self.with_settings(|s| s.simulation_speed)
    }

    /// Station last made active or read through this session.
    pub fn cached_active_station(&self) -> Option<Item> {
        self.with_settings(|s| s.active_station)
            .map(|id| self.item(id, Some(ItemType::Station)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_exact_marker_means_unset() {
        assert!(is_unknown_marker("UNKNOWN MODE", "MODE"));
        assert!(!is_unknown_marker("UNKNOWN MODE", "STATE"));
        assert!(!is_unknown_marker("UNKNOWN_MODE", "STATE"));
        assert!(!is_unknown_marker("UNKNOWN", "STATE"));
    }
}
