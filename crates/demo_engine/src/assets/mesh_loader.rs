//! Wavefront OBJ loading into interleaved vertex streams
//!
//! Parsing is delegated to `tobj`; this module only lays the parsed attributes
//! out in the order a [`VertexLayout`] asks for. Every vertex component is a
//! run of `f32`s, so the vertex buffer is a flat `Vec<f32>`.

use std::path::Path;
use nalgebra::Vector3;
use super::AssetError;

/// One attribute of an interleaved vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexComponent {
    /// Scaled position with Y flipped into Vulkan's clip orientation
    Position,
    /// Vertex normal as stored in the file
    Normal,
    /// First texture coordinate set
    Uv,
    /// Diffuse colour of the vertex's material
    Color,
    /// Tangent (zero when the source has none)
    Tangent,
    /// Bitangent (zero when the source has none)
    Bitangent,
    /// Single zero float of padding
    DummyFloat,
    /// Four zero floats of padding
    DummyVec4,
}

impl VertexComponent {
    /// Number of `f32`s this component occupies
    pub fn float_count(self) -> usize {
        match self {
            VertexComponent::Uv => 2,
            VertexComponent::DummyFloat => 1,
            VertexComponent::DummyVec4 => 4,
            _ => 3,
        }
    }
}

/// Ordered list of components making up one vertex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    components: Vec<VertexComponent>,
}

impl VertexLayout {
    /// Create a layout from components in shader location order
    pub fn new(components: impl Into<Vec<VertexComponent>>) -> Self {
        Self {
            components: components.into(),
        }
    }

    /// Components in location order
    pub fn components(&self) -> &[VertexComponent] {
        &self.components
    }

    /// Floats per vertex
    pub fn floats_per_vertex(&self) -> usize {
        self.components.iter().map(|c| c.float_count()).sum()
    }

    /// Bytes per vertex
    pub fn stride(&self) -> u32 {
        (self.floats_per_vertex() * std::mem::size_of::<f32>()) as u32
    }

    /// Byte offset of each component, paired with the component
    pub fn offsets(&self) -> impl Iterator<Item = (VertexComponent, u32)> + '_ {
        self.components.iter().scan(0u32, |offset, &component| {
            let current = *offset;
            *offset += (component.float_count() * std::mem::size_of::<f32>()) as u32;
            Some((component, current))
        })
    }
}

/// Index range of one model inside a loaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshPart {
    /// First index of this part in the shared index buffer
    pub index_base: u32,
    /// Number of indices in this part
    pub index_count: u32,
    /// Number of vertices this part contributed
    pub vertex_count: u32,
}

/// Axis-aligned bounds of the source positions, scaled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshDimensions {
    /// Minimum corner
    pub min: Vector3<f32>,
    /// Maximum corner
    pub max: Vector3<f32>,
    /// `max - min`
    pub size: Vector3<f32>,
}

impl Default for MeshDimensions {
    fn default() -> Self {
        Self {
            min: Vector3::zeros(),
            max: Vector3::zeros(),
            size: Vector3::zeros(),
        }
    }
}

/// CPU-side mesh ready for upload
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    /// Interleaved vertices
    pub vertices: Vec<f32>,
    /// Indices into `vertices`, already rebased per part
    pub indices: Vec<u32>,
    /// One entry per model in the source file
    pub parts: Vec<MeshPart>,
    /// Bounds of the loaded geometry
    pub dimensions: MeshDimensions,
}

impl MeshData {
    /// Number of vertices for `layout`
    pub fn vertex_count(&self, layout: &VertexLayout) -> usize {
        match layout.floats_per_vertex() {
            0 => 0,
            n => self.vertices.len() / n,
        }
    }
}

/// OBJ mesh loader
pub struct MeshLoader;

impl MeshLoader {
    /// Load `path`, triangulated, with positions multiplied by `scale`
    pub fn load<P: AsRef<Path>>(path: P, layout: &VertexLayout, scale: f32) -> Result<MeshData, AssetError> {
        let path = path.as_ref();
        let options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };

        let (models, materials) = tobj::load_obj(path, &options).map_err(|e| {
            let err = AssetError::Model {
                path: path.display().to_string(),
                reason: e.to_string(),
            };
            log::error!("{}", err);
            err
        })?;

        let materials = materials.unwrap_or_else(|e| {
            log::warn!("No materials for {}: {}", path.display(), e);
            Vec::new()
        });

        let mesh = Self::assemble(&models, &materials, layout, scale);
        log::info!(
            "Loaded {}: {} part(s), {} vertices, {} indices",
            path.display(),
            mesh.parts.len(),
            mesh.vertex_count(layout),
            mesh.indices.len()
        );
        Ok(mesh)
    }

    /// Interleave parsed models according to `layout`
    pub fn assemble(
        models: &[tobj::Model],
        materials: &[tobj::Material],
        layout: &VertexLayout,
        scale: f32,
    ) -> MeshData {
        let mut data = MeshData::default();
        let mut min = Vector3::repeat(f32::MAX);
        let mut max = Vector3::repeat(f32::MIN);
        let mut vertex_base = 0u32;

        for model in models {
            let mesh = &model.mesh;
            let vertex_count = (mesh.positions.len() / 3) as u32;
            let color = mesh
                .material_id
                .and_then(|id| materials.get(id))
                .and_then(|material| material.diffuse)
                .unwrap_or([0.0; 3]);

            for v in 0..vertex_count as usize {
                let position = Vector3::new(
                    mesh.positions[3 * v],
                    mesh.positions[3 * v + 1],
                    mesh.positions[3 * v + 2],
                );
                min = min.inf(&position);
                max = max.sup(&position);

                for &component in layout.components() {
                    match component {
                        VertexComponent::Position => data.vertices.extend_from_slice(&[
                            position.x * scale,
                            -position.y * scale,
                            position.z * scale,
                        ]),
                        VertexComponent::Normal => data.vertices.extend_from_slice(&triple(&mesh.normals, v)),
                        VertexComponent::Uv => {
                            let uv = mesh.texcoords.get(2 * v..2 * v + 2).unwrap_or(&[0.0, 0.0]);
                            data.vertices.extend_from_slice(uv);
                        }
                        VertexComponent::Color => data.vertices.extend_from_slice(&color),
                        // OBJ carries no tangent frame
                        VertexComponent::Tangent | VertexComponent::Bitangent => {
                            data.vertices.extend_from_slice(&[0.0; 3]);
                        }
                        VertexComponent::DummyFloat => data.vertices.push(0.0),
                        VertexComponent::DummyVec4 => data.vertices.extend_from_slice(&[0.0; 4]),
                    }
                }
            }

            let index_base = data.indices.len() as u32;
            data.indices.extend(mesh.indices.iter().map(|&i| i + vertex_base));
            data.parts.push(MeshPart {
                index_base,
                index_count: mesh.indices.len() as u32,
                vertex_count,
            });
            vertex_base += vertex_count;
        }

        if vertex_base > 0 {
            data.dimensions = MeshDimensions {
                min: min * scale,
                max: max * scale,
                size: (max - min) * scale,
            };
        }
        data
    }
}

fn triple(values: &[f32], vertex: usize) -> [f32; 3] {
    match values.get(3 * vertex..3 * vertex + 3) {
        Some(v) => [v[0], v[1], v[2]],
        None => [0.0; 3],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn triangle(offset: f32) -> tobj::Model {
        let mesh = tobj::Mesh {
            positions: vec![offset, 1.0, 0.0, offset + 1.0, 2.0, 0.0, offset, 3.0, 1.0],
            normals: vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            indices: vec![0, 1, 2],
            material_id: Some(0),
            ..Default::default()
        };
        tobj::Model::new(mesh, "triangle".to_string())
    }

    fn red() -> tobj::Material {
        tobj::Material {
            diffuse: Some([1.0, 0.0, 0.0]),
            ..Default::default()
        }
    }

    #[test]
    fn test_layout_stride_counts_each_component() {
        let layout = VertexLayout::new([
            VertexComponent::Position,
            VertexComponent::Normal,
            VertexComponent::Uv,
            VertexComponent::Color,
        ]);
        assert_eq!(layout.floats_per_vertex(), 11);
        assert_eq!(layout.stride(), 44);

        let padded = VertexLayout::new([VertexComponent::DummyFloat, VertexComponent::DummyVec4]);
        assert_eq!(padded.stride(), 20);
    }

    #[test]
    fn test_layout_offsets_accumulate() {
        let layout = VertexLayout::new([VertexComponent::Position, VertexComponent::Uv, VertexComponent::Color]);
        let offsets: Vec<u32> = layout.offsets().map(|(_, offset)| offset).collect();
        assert_eq!(offsets, vec![0, 12, 20]);
    }

    #[test]
    fn test_assemble_flips_position_y_and_scales() {
        let layout = VertexLayout::new([VertexComponent::Position, VertexComponent::Normal]);
        let mesh = MeshLoader::assemble(&[triangle(0.0)], &[], &layout, 2.0);

        assert_eq!(mesh.vertex_count(&layout), 3);
        assert_relative_eq!(mesh.vertices[0], 0.0);
        assert_relative_eq!(mesh.vertices[1], -2.0);
        // Normals are not flipped or scaled
        assert_relative_eq!(mesh.vertices[4], 1.0);
        assert_relative_eq!(mesh.dimensions.size.y, 4.0);
        assert_relative_eq!(mesh.dimensions.max.x, 2.0);
    }

    #[test]
    fn test_assemble_uses_material_colour_and_zero_fill() {
        let layout = VertexLayout::new([
            VertexComponent::Color,
            VertexComponent::Uv,
            VertexComponent::Tangent,
            VertexComponent::DummyFloat,
        ]);
        let mesh = MeshLoader::assemble(&[triangle(0.0)], &[red()], &layout, 1.0);

        assert_eq!(&mesh.vertices[0..3], &[1.0, 0.0, 0.0]);
        assert!(mesh.vertices[3..9].iter().all(|&v| v == 0.0));
        assert_eq!(mesh.vertices.len(), 3 * 9);
    }

    #[test]
    fn test_assemble_rebases_parts() {
        let layout = VertexLayout::new([VertexComponent::Position]);
        let mesh = MeshLoader::assemble(&[triangle(0.0), triangle(5.0)], &[], &layout, 1.0);

        assert_eq!(
            mesh.parts,
            vec![
                MeshPart { index_base: 0, index_count: 3, vertex_count: 3 },
                MeshPart { index_base: 3, index_count: 3, vertex_count: 3 },
            ]
        );
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_assemble_empty_input() {
        let layout = VertexLayout::new([VertexComponent::Position]);
        let mesh = MeshLoader::assemble(&[], &[], &layout, 1.0);
        assert!(mesh.vertices.is_empty());
        assert_eq!(mesh.dimensions, MeshDimensions::default());
    }
}
