use crate::color::{BlendMode, Color};
use crate::error::{RenderError, Result};
use crate::filters::{BlurStyle, ColorFilter};
use crate::formats::{PixelFormat, PrimitiveType, SamplerDescriptor, TileMode};
use crate::geometry::{ISize, Matrix, Point};

use super::{RenderTarget, TextureRef};

/// Stencil programs used by the clip machinery. The reference value of a
/// draw is its clip depth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StencilMode {
    /// Stencil test and writes disabled.
    Ignore,
    /// Draw only where the stencil equals the reference.
    #[default]
    ClipCompare,
    /// Increment where the stencil equals the reference.
    ClipIncrement,
    /// Decrement where the stencil equals the reference.
    ClipDecrement,
    /// Reset to the reference wherever the stencil is above it.
    ClipRestore,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    SolidFill,
    LinearGradient,
    Texture,
    Clip,
    ColorFilter,
    GaussianBlur,
    Morphology,
    Checkerboard,
    FramebufferBlend,
}

impl PipelineKind {
    pub fn samples_texture(self) -> bool {
        matches!(
            self,
            PipelineKind::Texture
                | PipelineKind::ColorFilter
                | PipelineKind::GaussianBlur
                | PipelineKind::Morphology
                | PipelineKind::FramebufferBlend
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineDescriptor {
    pub kind: PipelineKind,
    pub blend_mode: BlendMode,
    pub stencil_mode: StencilMode,
    pub primitive_type: PrimitiveType,
    pub color_format: PixelFormat,
    pub has_stencil_attachment: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInfo {
    /// Local coordinates to pass pixel coordinates.
    pub mvp: Matrix,
    pub depth: f32,
}

impl Default for FrameInfo {
    fn default() -> Self {
        Self { mvp: Matrix::identity(), depth: 0.0 }
    }
}

/// Per-draw fragment stage inputs. Colors are premultiplied.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum FragmentInfo {
    #[default]
    None,
    Solid {
        color: Color,
    },
    Texture {
        alpha: f32,
        /// Local coordinates to texel coordinates of the bound texture.
        texture_transform: Matrix,
        sampler: SamplerDescriptor,
    },
    LinearGradient {
        start: Point,
        end: Point,
        colors: Vec<Color>,
        stops: Vec<f32>,
        tile_mode: TileMode,
        alpha: f32,
    },
    ColorFilter {
        filter: ColorFilter,
        alpha: f32,
        texture_transform: Matrix,
    },
    Blur {
        sigma: Point,
        style: BlurStyle,
        tile_mode: TileMode,
        texture_transform: Matrix,
    },
    Morphology {
        radius: Point,
        dilate: bool,
        texture_transform: Matrix,
    },
    Checkerboard {
        color: Color,
        square_size: f32,
    },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexBuffer {
    pub vertices: Vec<Point>,
    /// Empty for non-indexed draws.
    pub indices: Vec<u32>,
}

impl VertexBuffer {
    pub fn from_rect_strip(points: [Point; 4]) -> Self {
        Self { vertices: points.to_vec(), indices: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.len() < 3 || (!self.indices.is_empty() && self.indices.len() < 3)
    }

    /// Triangles as vertex triples, honoring indices and strips.
    pub fn triangles(&self, primitive: PrimitiveType) -> Vec<[Point; 3]> {
        let fetch = |i: usize| -> Option<Point> {
            if self.indices.is_empty() {
                self.vertices.get(i).copied()
            } else {
                self.indices.get(i).and_then(|&idx| self.vertices.get(idx as usize)).copied()
            }
        };
        let count = if self.indices.is_empty() { self.vertices.len() } else { self.indices.len() };
        let mut out = Vec::new();
        match primitive {
            PrimitiveType::Triangle => {
                for i in (0..count.saturating_sub(2)).step_by(3) {
                    if let (Some(a), Some(b), Some(c)) = (fetch(i), fetch(i + 1), fetch(i + 2)) {
                        out.push([a, b, c]);
                    }
                }
            }
            PrimitiveType::TriangleStrip => {
                for i in 0..count.saturating_sub(2) {
                    if let (Some(a), Some(b), Some(c)) = (fetch(i), fetch(i + 1), fetch(i + 2)) {
                        out.push([a, b, c]);
                    }
                }
            }
        }
        out
    }
}

#[derive(Clone, Debug)]
pub struct Command {
    pub label: String,
    pub pipeline: PipelineDescriptor,
    pub stencil_reference: u32,
    pub vertex_buffer: VertexBuffer,
    pub frame_info: FrameInfo,
    pub fragment_info: FragmentInfo,
    pub texture: Option<TextureRef>,
}

#[derive(Default)]
struct PendingCommand {
    label: String,
    pipeline: Option<PipelineDescriptor>,
    stencil_reference: u32,
    vertex_buffer: VertexBuffer,
    frame_info: FrameInfo,
    fragment_info: FragmentInfo,
    texture: Option<TextureRef>,
}

/// Records draw commands against one render target. Nothing touches the
/// device until the owning command buffer encodes the pass.
pub struct RenderPass {
    target: RenderTarget,
    label: String,
    pending: PendingCommand,
    commands: Vec<Command>,
}

impl RenderPass {
    pub fn new(target: RenderTarget) -> Self {
        Self {
            target,
            label: String::new(),
            pending: PendingCommand::default(),
            commands: Vec::new(),
        }
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn render_target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn render_target_size(&self) -> ISize {
        self.target.size()
    }

    pub fn render_target_pixel_format(&self) -> PixelFormat {
        self.target.color_attachment().texture.descriptor().format
    }

    pub fn has_stencil_attachment(&self) -> bool {
        self.target.stencil_attachment().is_some()
    }

    pub fn set_command_label(&mut self, label: impl Into<String>) {
        self.pending.label = label.into();
    }

    pub fn set_pipeline(&mut self, pipeline: PipelineDescriptor) {
        self.pending.pipeline = Some(pipeline);
    }

    pub fn set_stencil_reference(&mut self, value: u32) {
        self.pending.stencil_reference = value;
    }

    pub fn set_vertex_buffer(&mut self, buffer: VertexBuffer) {
        self.pending.vertex_buffer = buffer;
    }

    pub fn bind_frame_info(&mut self, info: FrameInfo) {
        self.pending.frame_info = info;
    }

    pub fn bind_fragment_info(&mut self, info: FragmentInfo) {
        self.pending.fragment_info = info;
    }

    pub fn bind_texture(&mut self, texture: TextureRef) {
        self.pending.texture = Some(texture);
    }

    /// Validates the pending command and appends it. State is reset afterwards.
    pub fn draw(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        let Some(pipeline) = pending.pipeline else {
            return Err(RenderError::InvalidCommand {
                label: pending.label,
                reason: "no pipeline bound",
            });
        };
        if pending.vertex_buffer.is_empty() {
            return Err(RenderError::InvalidCommand {
                label: pending.label,
                reason: "vertex buffer holds no triangles",
            });
        }
        if pipeline.kind.samples_texture() && pending.texture.is_none() {
            return Err(RenderError::InvalidCommand {
                label: pending.label,
                reason: "pipeline samples a texture but none is bound",
            });
        }
        self.commands.push(Command {
            label: pending.label,
            pipeline,
            stencil_reference: pending.stencil_reference,
            vertex_buffer: pending.vertex_buffer,
            frame_info: pending.frame_info,
            fragment_info: pending.fragment_info,
            texture: pending.texture,
        });
        Ok(())
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_parts(self) -> (RenderTarget, String, Vec<Command>) {
        (self.target, self.label, self.commands)
    }
}
