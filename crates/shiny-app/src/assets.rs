// SPDX-License-Identifier: CEPL-1.0
//! Asset decoding: PNG to RGBA8, Wavefront OBJ to interleaved vertices with
//! generated tangents.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use shiny_math::glam::{Vec2, Vec3};
use shiny_render::{ImageData, MeshData, Vertex};
use shiny_render_vk::error::TransferError;
use tracing::{debug, warn};

pub const WHITE: [u8; 4] = [255, 255, 255, 255];
/// Tangent-space +Z.
pub const FLAT_NORMAL: [u8; 4] = [128, 128, 255, 255];

/// One OBJ object with the texture paths its material names.
#[derive(Debug)]
pub struct LoadedMesh {
    pub name: String,
    pub data: MeshData,
    pub diffuse: Option<PathBuf>,
    pub normal: Option<PathBuf>,
}

fn require(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(TransferError::MissingAsset {
            path: path.to_path_buf(),
        }
        .into())
    }
}

/// Widens 8-bit PNG sample layouts to RGBA8.
fn to_rgba(color: png::ColorType, bytes: &[u8]) -> Option<Vec<u8>> {
    let out = match color {
        png::ColorType::Rgba => bytes.to_vec(),
        png::ColorType::Rgb => bytes
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        png::ColorType::GrayscaleAlpha => bytes
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        png::ColorType::Grayscale => bytes.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        png::ColorType::Indexed => return None,
    };
    Some(out)
}

pub fn load_png(path: &Path) -> Result<ImageData> {
    require(path)?;
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut decoder = png::Decoder::new(BufReader::new(file));
    // palette and sub-byte depths become 8-bit samples
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .with_context(|| format!("reading PNG header of {}", path.display()))?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader
        .next_frame(&mut buf)
        .with_context(|| format!("decoding {}", path.display()))?;
    let rgba = to_rgba(frame.color_type, &buf[..frame.buffer_size()])
        .with_context(|| format!("{}: unsupported color type {:?}", path.display(), frame.color_type))?;
    debug!("{}: {}x{}", path.display(), frame.width, frame.height);
    Ok(ImageData {
        width: frame.width,
        height: frame.height,
        rgba,
    })
}

/// Loads `path` if given, else a 1x1 texture of `fallback`.
pub fn texture_or(path: Option<&Path>, fallback: [u8; 4]) -> Result<ImageData> {
    match path {
        Some(p) => load_png(p),
        None => Ok(ImageData::solid(fallback)),
    }
}

/// Per-vertex tangents from UV gradients, orthogonalised against the
/// normal. Degenerate UVs get an arbitrary perpendicular.
pub fn generate_tangents(vertices: &mut [Vertex], indices: &[u32]) {
    let mut acc = vec![Vec3::ZERO; vertices.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if a >= vertices.len() || b >= vertices.len() || c >= vertices.len() {
            continue;
        }
        let p = |i: usize| Vec3::from(vertices[i].pos);
        let t = |i: usize| Vec2::from(vertices[i].uv);
        let (e1, e2) = (p(b) - p(a), p(c) - p(a));
        let (d1, d2) = (t(b) - t(a), t(c) - t(a));
        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() < f32::EPSILON {
            continue;
        }
        let tangent = (e1 * d2.y - e2 * d1.y) / det;
        for i in [a, b, c] {
            acc[i] += tangent;
        }
    }

    for (v, t) in vertices.iter_mut().zip(acc) {
        let n = Vec3::from(v.normal).normalize_or_zero();
        let ortho = (t - n * n.dot(t)).normalize_or_zero();
        let tangent = if ortho == Vec3::ZERO {
            n.any_orthonormal_vector()
        } else {
            ortho
        };
        v.tangent = tangent.to_array();
    }
}

fn to_mesh_data(mesh: &tobj::Mesh) -> MeshData {
    let count = mesh.positions.len() / 3;
    let mut vertices: Vec<Vertex> = (0..count)
        .map(|i| {
            let uv = if mesh.texcoords.len() >= 2 * (i + 1) {
                // OBJ has v up, images are stored top row first
                [mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1]]
            } else {
                [0.0; 2]
            };
            let normal = if mesh.normals.len() >= 3 * (i + 1) {
                [mesh.normals[3 * i], mesh.normals[3 * i + 1], mesh.normals[3 * i + 2]]
            } else {
                [0.0, 1.0, 0.0]
            };
            let color = if mesh.vertex_color.len() >= 3 * (i + 1) {
                [
                    mesh.vertex_color[3 * i],
                    mesh.vertex_color[3 * i + 1],
                    mesh.vertex_color[3 * i + 2],
                ]
            } else {
                [1.0; 3]
            };
            Vertex {
                pos: [
                    mesh.positions[3 * i],
                    mesh.positions[3 * i + 1],
                    mesh.positions[3 * i + 2],
                ],
                uv,
                color,
                normal,
                tangent: [0.0; 3],
            }
        })
        .collect();
    // OBJ faces are counter-clockwise; the pipelines treat clockwise as front
    let mut indices = mesh.indices.clone();
    for tri in indices.chunks_exact_mut(3) {
        tri.swap(1, 2);
    }
    generate_tangents(&mut vertices, &indices);
    MeshData { vertices, indices }
}

fn texture_path(dir: &Path, name: &str) -> Option<PathBuf> {
    (!name.is_empty()).then(|| dir.join(name))
}

pub fn load_obj(path: &Path) -> Result<Vec<LoadedMesh>> {
    require(path)?;
    let options = tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ..Default::default()
    };
    let (models, materials) =
        tobj::load_obj(path, &options).with_context(|| format!("parsing {}", path.display()))?;
    let materials = materials.unwrap_or_else(|e| {
        warn!("{}: materials unavailable ({e}), using flat textures", path.display());
        Vec::new()
    });
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let meshes: Vec<LoadedMesh> = models
        .iter()
        .filter(|m| !m.mesh.indices.is_empty())
        .map(|m| {
            let material = m.mesh.material_id.and_then(|id| materials.get(id));
            LoadedMesh {
                name: m.name.clone(),
                data: to_mesh_data(&m.mesh),
                diffuse: material.and_then(|mat| texture_path(dir, &mat.diffuse_texture)),
                normal: material.and_then(|mat| texture_path(dir, &mat.normal_texture)),
            }
        })
        .collect();
    debug!("{}: {} meshes", path.display(), meshes.len());
    Ok(meshes)
}

/// Ground plane used when no model is configured.
pub fn plane(half_extent: f32) -> MeshData {
    let h = half_extent;
    let corners = [
        ([-h, 0.0, -h], [0.0, 0.0]),
        ([h, 0.0, -h], [1.0, 0.0]),
        ([h, 0.0, h], [1.0, 1.0]),
        ([-h, 0.0, h], [0.0, 1.0]),
    ];
    let mut vertices: Vec<Vertex> = corners
        .into_iter()
        .map(|(pos, uv)| Vertex {
            pos,
            uv,
            color: [1.0; 3],
            normal: [0.0, 1.0, 0.0],
            tangent: [0.0; 3],
        })
        .collect();
    let indices = vec![0, 1, 2, 2, 3, 0];
    generate_tangents(&mut vertices, &indices);
    MeshData { vertices, indices }
}
