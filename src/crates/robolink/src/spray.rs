//! Spray guns: particle simulation attached to a tool.

use std::fmt;
use std::str::FromStr;

use crate::camera::dimensions;
use crate::command;
use crate::error::{LinkError, LinkResult};
use crate::item::Item;
use crate::matrix::Matrix;
use crate::session::Session;
use crate::types::SprayState;
use crate::wire::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SprayArea {
    Ellipse,
    Rectangle,
}

/// Shape deposited for every particle that hits the object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Particle {
    Sphere { diameter_mm: f64, facets: u32 },
    Cube { x_mm: f64, y_mm: f64, z_mm: f64 },
}

impl fmt::Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Particle::Sphere {
                diameter_mm,
                facets,
            } => write!(f, "SPHERE({diameter_mm},{facets})"),
            Particle::Cube { x_mm, y_mm, z_mm } => write!(f, "CUBE({x_mm},{y_mm},{z_mm})"),
        }
    }
}

impl FromStr for Particle {
    type Err = LinkError;

    fn from_str(text: &str) -> LinkResult<Self> {
        let bad = || LinkError::type_error(format!("bad particle {text}"));
        let (shape, rest) = text.split_once('(').ok_or_else(bad)?;
        let body = rest.strip_suffix(')').ok_or_else(bad)?;
        let values = body
            .split(',')
            .map(|v| v.trim().parse::<f64>().map_err(|_| bad()))
            .collect::<LinkResult<Vec<_>>>()?;
        match (shape.to_ascii_uppercase().as_str(), values.as_slice()) {
            ("SPHERE", [diameter_mm, facets]) if *facets >= 0.0 => Ok(Particle::Sphere {
                diameter_mm: *diameter_mm,
                facets: facets.round() as u32,
            }),
            ("CUBE", [x_mm, y_mm, z_mm]) => Ok(Particle::Cube {
                x_mm: *x_mm,
                y_mm: *y_mm,
                z_mm: *z_mm,
            }),
            _ => Err(bad()),
        }
    }
}

/// Spray gun settings, formatted to the host's option string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SprayOptions {
    pub area: Option<SprayArea>,
    /// Deposit particles on the surface instead of stopping at first hit.
    pub project: bool,
    pub particle: Option<Particle>,
    /// Grid of rays across the spray area.
    pub step: Option<(u32, u32)>,
    /// Random jitter factor applied to the rays.
    pub rand: Option<f64>,
    pub extra: Vec<String>,
}

impl SprayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_area(mut self, area: SprayArea) -> Self {
        self.area = Some(area);
        self
    }

    pub fn with_projection(mut self, project: bool) -> Self {
        self.project = project;
        self
    }

    pub fn with_particle(mut self, particle: Particle) -> Self {
        self.particle = Some(particle);
        self
    }

    pub fn with_step(mut self, a: u32, b: u32) -> Self {
        self.step = Some((a, b));
        self
    }

    pub fn with_rand(mut self, factor: f64) -> Self {
        self.rand = Some(factor);
        self
    }

    pub fn parse(text: &str) -> LinkResult<Self> {
        let mut options = Self::default();
        for token in tokens(text) {
            let upper = token.to_ascii_uppercase();
            match upper.split_once('=') {
                None if upper == "ELLYPSE" || upper == "ELLIPSE" => {
                    options.area = Some(SprayArea::Ellipse)
                }
                None if upper == "RECTANGLE" => options.area = Some(SprayArea::Rectangle),
                None if upper == "PROJECT" => options.project = true,
                Some(("PARTICLE", value)) => options.particle = Some(value.parse()?),
                Some(("STEP", value)) => options.step = Some(dimensions("STEP", value)?),
                Some(("RAND", value)) => {
                    options.rand = Some(value.parse().map_err(|_| {
                        LinkError::type_error(format!("RAND expects a number, got {value}"))
                    })?)
                }
                _ => options.extra.push(token),
            }
        }
        Ok(options)
    }
}

/// Whitespace-separated tokens, ignoring whitespace inside parentheses.
fn tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in text.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() => {}
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

impl fmt::Display for SprayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens = Vec::new();
        match self.area {
            Some(SprayArea::Ellipse) => tokens.push("ELLYPSE".to_string()),
            Some(SprayArea::Rectangle) => tokens.push("RECTANGLE".to_string()),
            None => {}
        }
        if self.project {
            tokens.push("PROJECT".to_string());
        }
        if let Some(particle) = &self.particle {
            tokens.push(format!("PARTICLE={particle}"));
        }
        if let Some((a, b)) = self.step {
            tokens.push(format!("STEP={a}x{b}"));
        }
        if let Some(rand) = self.rand {
            tokens.push(format!("RAND={rand}"));
        }
        tokens.extend(self.extra.iter().cloned());
        f.write_str(&tokens.join(" "))
    }
}

impl FromStr for SprayOptions {
    type Err = LinkError;

    fn from_str(text: &str) -> LinkResult<Self> {
        Self::parse(text)
    }
}

/// Accumulated spray statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct SprayStats {
    /// Human-readable summary.
    pub info: String,
    pub data: Matrix,
}

impl Session {
    /// Add a spray gun on `tool` aimed at `object`; `None` lets the host pick
    /// the active tool or every object. `volume` shapes the spray cone.
    pub fn add_spray(
        &self,
        tool: Option<&Item>,
        object: Option<&Item>,
        options: &SprayOptions,
        volume: Option<&Matrix>,
    ) -> LinkResult<Item> {
        let tool = self.optional_item_arg(tool)?;
        let object = self.optional_item_arg(object)?;
        let volume = volume.cloned().unwrap_or_else(Matrix::empty);
        let id = self
            .call(
                &command::SPRAY_ADD,
                &[tool, object, Value::Str(options.to_string()), Value::Matrix(volume)],
            )?
            .item_id()?;
        Ok(self.item(id, None))
    }

    /// Turn one spray gun (every gun when `None`) on or off. Returns the
    /// number of guns affected.
    pub fn set_spray_state(&self, spray: Option<&Item>, state: SprayState) -> LinkResult<i32> {
        let spray = self.optional_item_arg(spray)?;
        self.call(&command::SPRAY_SET_STATE, &[spray, Value::Int(state.code())])?
            .int()
    }

    pub fn spray_stats(&self, spray: Option<&Item>) -> LinkResult<SprayStats> {
        let spray = self.optional_item_arg(spray)?;
        let mut reply = self.call(&command::SPRAY_STATS, &[spray])?;
        let info = reply.string()?;
        let data = reply.matrix()?;
        Ok(SprayStats { info, data })
    }

    /// Remove deposited particles. Returns the number of guns cleared.
    pub fn spray_clear(&self, spray: Option<&Item>) -> LinkResult<i32> {
        let spray = self.optional_item_arg(spray)?;
        self.call(&command::SPRAY_CLEAR, &[spray])?.int()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn options_format_to_host_grammar() {
        let options = SprayOptions::new()
            .with_area(SprayArea::Ellipse)
            .with_projection(true)
            .with_particle(Particle::Sphere {
                diameter_mm: 4.0,
                facets: 8,
            })
            .with_step(8, 8)
            .with_rand(2.0);
        assert_eq!(
            options.to_string(),
            "ELLYPSE PROJECT PARTICLE=SPHERE(4,8) STEP=8x8 RAND=2"
        );
    }

    #[test]
    fn parser_accepts_either_ellipse_spelling_and_spaced_particles() {
        let a = SprayOptions::parse("ELLIPSE PARTICLE=CUBE(1, 2, 3)").unwrap();
        let b = SprayOptions::parse("ellypse particle=cube(1,2,3)").unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.particle,
            Some(Particle::Cube {
                x_mm: 1.0,
                y_mm: 2.0,
                z_mm: 3.0
            })
        );
    }

    #[test]
    fn unknown_tokens_pass_through() {
        let options = SprayOptions::parse("RECTANGLE STEP=4x6 NO_PROJECT").unwrap();
        assert_eq!(options.area, Some(SprayArea::Rectangle));
        assert_eq!(options.step, Some((4, 6)));
        assert_eq!(options.extra, vec!["NO_PROJECT".to_string()]);
        assert!(SprayOptions::parse("PARTICLE=SPHERE(4)").is_err());
    }
}
