// SPDX-License-Identifier: CEPL-1.0
//! `shiny.toml`. Every key is optional; a missing or malformed file means
//! defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use shiny_math::glam::Vec3;
use shiny_math::Camera;
use shiny_render::{PointLight, PresentPolicy, RenderSettings, ShaderPaths};
use tracing::{info, warn};

pub const DEFAULT_PATH: &str = "shiny.toml";

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    #[default]
    LowLatency,
    Fifo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub present_mode: PresentModeCfg,
    pub debug_display: bool,
    pub validation: bool,
}

impl Default for RenderCfg {
    fn default() -> Self {
        let base = RenderSettings::default();
        Self {
            clear_color: base.clear_color,
            present_mode: PresentModeCfg::LowLatency,
            debug_display: false,
            validation: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShadersCfg {
    pub offscreen_vert: PathBuf,
    pub offscreen_frag: PathBuf,
    pub composition_vert: PathBuf,
    pub composition_frag: PathBuf,
    pub debug_vert: PathBuf,
    pub debug_frag: PathBuf,
}

impl Default for ShadersCfg {
    fn default() -> Self {
        let p = ShaderPaths::default();
        Self {
            offscreen_vert: p.offscreen_vert,
            offscreen_frag: p.offscreen_frag,
            composition_vert: p.composition_vert,
            composition_frag: p.composition_frag,
            debug_vert: p.debug_vert,
            debug_frag: p.debug_frag,
        }
    }
}

/// One `[[models]]` entry. Texture overrides win over the OBJ material.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelCfg {
    pub obj: PathBuf,
    #[serde(default)]
    pub diffuse: Option<PathBuf>,
    #[serde(default)]
    pub normal: Option<PathBuf>,
    #[serde(default)]
    pub position: [f32; 3],
    /// Degrees.
    #[serde(default)]
    pub rotation_y: f32,
    #[serde(default = "one")]
    pub scale: f32,
}

fn one() -> f32 {
    1.0
}

impl ModelCfg {
    pub fn model_matrix(&self) -> [[f32; 4]; 4] {
        shiny_math::model_matrix(
            Vec3::from(self.position),
            self.rotation_y.to_radians(),
            self.scale,
        )
        .to_cols_array_2d()
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct LightCfg {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub radius: f32,
}

impl From<LightCfg> for PointLight {
    fn from(l: LightCfg) -> Self {
        PointLight {
            position: l.position,
            color: l.color,
            radius: l.radius,
        }
    }
}

fn default_lights() -> Vec<LightCfg> {
    let light = |position, color, radius| LightCfg {
        position,
        color,
        radius,
    };
    vec![
        light([0.0, 0.0, 1.0], [1.5, 1.5, 1.5], 15.0),
        light([-2.0, 0.0, 0.0], [1.0, 0.0, 0.0], 15.0),
        light([2.0, -1.0, 0.0], [0.0, 0.0, 2.5], 5.0),
        light([0.0, -0.9, 0.5], [1.0, 1.0, 0.0], 2.0),
        light([0.0, -0.5, 0.0], [0.0, 1.0, 0.2], 5.0),
        light([0.0, -1.0, 0.0], [1.0, 0.7, 0.3], 25.0),
    ]
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CameraCfg {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraCfg {
    fn default() -> Self {
        let cam = Camera::default();
        Self {
            position: cam.position.to_array(),
            target: cam.target.to_array(),
            fov_y_degrees: cam.fov_y.to_degrees(),
            near: cam.near,
            far: cam.far,
        }
    }
}

impl CameraCfg {
    pub fn camera(&self) -> Camera {
        Camera {
            position: Vec3::from(self.position),
            target: Vec3::from(self.target),
            fov_y: self.fov_y_degrees.to_radians(),
            near: self.near,
            far: self.far,
            ..Camera::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppCfg {
    pub render: RenderCfg,
    pub shaders: ShadersCfg,
    pub models: Vec<ModelCfg>,
    pub lights: Vec<LightCfg>,
    pub camera: CameraCfg,
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            render: RenderCfg::default(),
            shaders: ShadersCfg::default(),
            models: Vec::new(),
            lights: default_lights(),
            camera: CameraCfg::default(),
        }
    }
}

impl AppCfg {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => match Self::parse(&text) {
                Ok(cfg) => {
                    info!("config loaded from {}", path.display());
                    cfg
                }
                Err(e) => {
                    warn!("{} is malformed, using defaults: {e}", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                info!("no config at {} ({e}), using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn settings(&self) -> RenderSettings {
        let s = &self.shaders;
        RenderSettings {
            clear_color: self.render.clear_color,
            present: match self.render.present_mode {
                PresentModeCfg::LowLatency => PresentPolicy::LowLatency,
                PresentModeCfg::Fifo => PresentPolicy::Fifo,
            },
            debug_display: self.render.debug_display,
            validation: self.render.validation,
            shaders: ShaderPaths {
                offscreen_vert: s.offscreen_vert.clone(),
                offscreen_frag: s.offscreen_frag.clone(),
                composition_vert: s.composition_vert.clone(),
                composition_frag: s.composition_frag.clone(),
                debug_vert: s.debug_vert.clone(),
                debug_frag: s.debug_frag.clone(),
            },
        }
    }

    pub fn point_lights(&self) -> Vec<PointLight> {
        self.lights.iter().copied().map(PointLight::from).collect()
    }
}
