//! Simulated 2D cameras: option strings, snapshots and depth maps.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use crate::command;
use crate::error::{LinkError, LinkResult};
use crate::item::Item;
use crate::program::path_arg;
use crate::session::Session;
use crate::types::ItemType;
use crate::wire::{self, Value};

/// A color by name (`black`, `white`, ...) or as `#AARRGGBB`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Color {
    Named(String),
    Argb(u32),
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Named(name) => f.write_str(name),
            Color::Argb(argb) => write!(f, "#{argb:08X}"),
        }
    }
}

impl FromStr for Color {
    type Err = LinkError;

    fn from_str(text: &str) -> LinkResult<Self> {
        match text.strip_prefix('#') {
            Some(hex) if hex.len() == 8 => u32::from_str_radix(hex, 16)
                .map(Color::Argb)
                .map_err(|_| LinkError::type_error(format!("bad color {text}"))),
            Some(_) => Err(LinkError::type_error(format!(
                "color {text} must be #AARRGGBB"
            ))),
            None if !text.is_empty() => Ok(Color::Named(text.to_string())),
            None => Err(LinkError::type_error("empty color")),
        }
    }
}

/// Camera settings, formatted to the host's `KEY=VALUE` option string.
///
/// The parser accepts both the host's historical spellings
/// (`FOCAL_LENGHT`, `FAR_LENGHT`) and the corrected ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraOptions {
    pub focal_length_mm: Option<f64>,
    pub fov_deg: Option<f64>,
    pub far_length_mm: Option<f64>,
    pub near_length_mm: Option<f64>,
    /// Window size in pixels.
    pub size: Option<(u32, u32)>,
    /// Snapshot resolution, when different from the window size.
    pub snapshot: Option<(u32, u32)>,
    /// Produce depth maps instead of color images.
    pub depth: bool,
    pub bg_color: Option<Color>,
    pub light_ambient: Option<Color>,
    pub light_diffuse: Option<Color>,
    pub light_specular: Option<Color>,
    /// Show the camera view in a popup window.
    pub popup: bool,
    pub no_taskbar: bool,
    /// Tokens passed through untouched.
    pub extra: Vec<String>,
}

impl CameraOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_focal_length(mut self, mm: f64) -> Self {
        self.focal_length_mm = Some(mm);
        self
    }

    pub fn with_fov(mut self, deg: f64) -> Self {
        self.fov_deg = Some(deg);
        self
    }

    pub fn with_clipping(mut self, near_mm: f64, far_mm: f64) -> Self {
        self.near_length_mm = Some(near_mm);
        self.far_length_mm = Some(far_mm);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    pub fn with_snapshot_size(mut self, width: u32, height: u32) -> Self {
        self.snapshot = Some((width, height));
        self
    }

    pub fn with_depth(mut self, depth: bool) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_background(mut self, color: Color) -> Self {
        self.bg_color = Some(color);
        self
    }

    pub fn with_popup(mut self, popup: bool) -> Self {
        self.popup = popup;
        self
    }

    pub fn parse(text: &str) -> LinkResult<Self> {
        let mut options = Self::default();
        for token in text.split_whitespace() {
            let (key, value) = match token.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (token, None),
            };
            let key_upper = key.to_ascii_uppercase();
            match (key_upper.as_str(), value) {
                ("FOCAL_LENGHT" | "FOCAL_LENGTH", Some(v)) => {
                    options.focal_length_mm = Some(number(key, v)?)
                }
                ("FOV", Some(v)) => options.fov_deg = Some(number(key, v)?),
                ("FAR_LENGHT" | "FAR_LENGTH", Some(v)) => {
                    options.far_length_mm = Some(number(key, v)?)
                }
                ("NEAR_LENGTH" | "NEAR_LENGHT", Some(v)) => {
                    options.near_length_mm = Some(number(key, v)?)
                }
                ("SIZE", Some(v)) => options.size = Some(dimensions(key, v)?),
                ("SNAPSHOT", Some(v)) => options.snapshot = Some(dimensions(key, v)?),
                ("DEPTH", None) => options.depth = true,
                ("BG_COLOR", Some(v)) => options.bg_color = Some(v.parse()?),
                ("LIGHT_AMBIENT", Some(v)) => options.light_ambient = Some(v.parse()?),
                ("LIGHT_DIFFUSE", Some(v)) => options.light_diffuse = Some(v.parse()?),
                ("LIGHT_SPECULAR", Some(v)) => options.light_specular = Some(v.parse()?),
                ("POPUP", None) => options.popup = true,
                ("NO_TASKBAR", None) => options.no_taskbar = true,
                _ => options.extra.push(token.to_string()),
            }
        }
        Ok(options)
    }
}

impl fmt::Display for CameraOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens = Vec::new();
        if let Some(v) = self.focal_length_mm {
            tokens.push(format!("FOCAL_LENGHT={v}"));
        }
        if let Some(v) = self.fov_deg {
            tokens.push(format!("FOV={v}"));
        }
        if let Some(v) = self.far_length_mm {
            tokens.push(format!("FAR_LENGHT={v}"));
        }
        if let Some(v) = self.near_length_mm {
            tokens.push(format!("NEAR_LENGTH={v}"));
        }
        if let Some((w, h)) = self.size {
            tokens.push(format!("SIZE={w}x{h}"));
        }
        if let Some((w, h)) = self.snapshot {
            tokens.push(format!("SNAPSHOT={w}x{h}"));
        }
        if self.depth {
            tokens.push("DEPTH".to_string());
        }
        for (key, color) in [
            ("BG_COLOR", &self.bg_color),
            ("LIGHT_AMBIENT", &self.light_ambient),
            ("LIGHT_DIFFUSE", &self.light_diffuse),
            ("LIGHT_SPECULAR", &self.light_specular),
        ] {
            if let Some(color) = color {
                tokens.push(format!("{key}={color}"));
            }
        }
        if self.popup {
            tokens.push("POPUP".to_string());
        }
        if self.no_taskbar {
            tokens.push("NO_TASKBAR".to_string());
        }
        tokens.extend(self.extra.iter().cloned());
        f.write_str(&tokens.join(" "))
    }
}

impl FromStr for CameraOptions {
    type Err = LinkError;

    fn from_str(text: &str) -> LinkResult<Self> {
        Self::parse(text)
    }
}

fn number(key: &str, value: &str) -> LinkResult<f64> {
    value
        .parse()
        .map_err(|_| LinkError::type_error(format!("{key} expects a number, got {value}")))
}

/// `WxH`, as used by `SIZE=`, `SNAPSHOT=` and the spray `STEP=`.
pub(crate) fn dimensions<T: FromStr>(key: &str, value: &str) -> LinkResult<(T, T)> {
    let bad = || LinkError::type_error(format!("{key} expects WxH, got {value}"));
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(bad)?;
    Ok((w.parse().map_err(|_| bad())?, h.parse().map_err(|_| bad())?))
}

/// Depth image: distances in mm, row-major, `0` where nothing was hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthMap {
    width: usize,
    height: usize,
    depths: Vec<u32>,
}

impl DepthMap {
    pub fn new(width: usize, height: usize, depths: Vec<u32>) -> LinkResult<Self> {
        if width.checked_mul(height) != Some(depths.len()) {
            return Err(LinkError::type_error(format!(
                "{} depths do not fill {width}x{height}",
                depths.len()
            )));
        }
        Ok(Self {
            width,
            height,
            depths,
        })
    }

    /// Decode the snapshot format: int32 width, int32 height, then the
    /// depths, all big-endian.
    pub fn read<R: Read>(reader: &mut R) -> LinkResult<Self> {
        let width = dimension(wire::read_int(reader)?, "width")?;
        let height = dimension(wire::read_int(reader)?, "height")?;
        let count = width
            .checked_mul(height)
            .filter(|count| *count <= wire::MAX_MATRIX_ELEMENTS)
            .ok_or_else(|| LinkError::framing(format!("depth map {width}x{height} too large")))?;
        let mut depths = Vec::with_capacity(count);
        for _ in 0..count {
            let depth = wire::read_int(reader)?;
            depths.push(u32::try_from(depth).map_err(|_| {
                LinkError::framing(format!("negative depth {depth}"))
            })?);
        }
        Self::new(width, height, depths)
    }

    pub fn from_file(path: impl AsRef<Path>) -> LinkResult<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read(&mut reader)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Depth at column `x`, row `y`; `None` outside the image or where
    /// nothing was measured.
    pub fn get(&self, x: usize, y: usize) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.depths
            .get(y * self.width + x)
            .copied()
            .filter(|depth| *depth != 0)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.depths
    }
}

fn dimension(value: i32, what: &str) -> LinkResult<usize> {
    usize::try_from(value).map_err(|_| LinkError::framing(format!("negative depth map {what}")))
}

impl Session {
    /// Attach a camera to `frame`.
    pub fn add_camera(&self, frame: &Item, options: &CameraOptions) -> LinkResult<Item> {
        let frame = self.item_arg(frame)?;
        let id = self
            .call(&command::CAMERA_ADD, &[frame, Value::Str(options.to_string())])?
            .item_id()?;
        Ok(self.item(id, Some(ItemType::Camera)))
    }

    /// Save what `camera` sees (the main view when `None`) to `path`.
    /// Returns whether the host wrote the file.
    pub fn camera_snapshot(
        &self,
        camera: Option<&Item>,
        path: impl AsRef<Path>,
        options: Option<&CameraOptions>,
    ) -> LinkResult<bool> {
        let path = path_arg(path.as_ref())?;
        let camera = self.optional_item_arg(camera)?;
        let options = options.map(CameraOptions::to_string).unwrap_or_default();
        let written = self
            .call(
                &command::CAMERA_SNAPSHOT,
                &[Value::Str(path), camera, Value::Str(options)],
            )?
            .int()?;
        Ok(written != 0)
    }

    pub fn set_camera_options(&self, camera: &Item, options: &CameraOptions) -> LinkResult<bool> {
        camera.ensure_id()?;
        let camera = self.item_arg(camera)?;
        let applied = self
            .call(
                &command::CAMERA_SET_PARAMS,
                &[camera, Value::Str(options.to_string())],
            )?
            .int()?;
        Ok(applied != 0)
    }

    /// Close one camera, or every camera when `None`.
    pub fn close_camera(&self, camera: Option<&Item>) -> LinkResult<bool> {
        let camera = self.optional_item_arg(camera)?;
        Ok(self.call(&command::CAMERA_CLOSE, &[camera])?.int()? != 0)
    }
}
