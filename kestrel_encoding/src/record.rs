// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command records and their wire format.
//!
//! Each record is stored as a `u32` tag followed by a fixed-size payload. Payloads
//! are `#[repr(C)]` structs built only from 4-byte fields, so the stream never
//! contains padding and can be read back with unaligned loads.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};
use kestrel_arena::Span;

use crate::math::{Origin, Transform};
use crate::mesh::{VertexAttributes, VertexLayout};
use crate::{Error, Result};

/// The most glyphs a single [`TextDraw`] may carry.
pub const MAX_GLYPHS: usize = 100;

/// Handle of an uploaded mesh. Zero means "not uploaded yet".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

impl MeshId {
    pub const NONE: Self = Self(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// Handle of an uploaded texture. Zero means "no texture".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

impl TextureId {
    pub const NONE: Self = Self(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// Identifies the kind of a record in the stream.
///
/// The numbering is part of the wire format. Zero is never a valid tag, so a
/// zeroed buffer cannot be mistaken for a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RecordTag {
    InitVertexData = 1,
    DrawRectOverlay = 2,
    Line = 3,
    DrawRect = 4,
    DrawText = 5,
    DrawCube = 6,
    DrawMesh = 7,
    LoadTexture = 8,
}

impl RecordTag {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::InitVertexData,
            2 => Self::DrawRectOverlay,
            3 => Self::Line,
            4 => Self::DrawRect,
            5 => Self::DrawText,
            6 => Self::DrawCube,
            7 => Self::DrawMesh,
            8 => Self::LoadTexture,
            _ => return None,
        })
    }

    /// Size of the fixed payload which follows the tag.
    pub fn payload_size(self) -> usize {
        match self {
            Self::InitVertexData => size_of::<VertexDataWire>(),
            Self::DrawRectOverlay | Self::DrawRect => size_of::<RectWire>(),
            Self::Line => size_of::<LineWire>(),
            Self::DrawText => size_of::<TextWire>(),
            Self::DrawCube => size_of::<CubeWire>(),
            Self::DrawMesh => size_of::<MeshWire>(),
            Self::LoadTexture => size_of::<TextureWire>(),
        }
    }

    /// Size of the whole record, tag included.
    pub fn record_size(self) -> usize {
        size_of::<u32>() + self.payload_size()
    }
}

/// One positioned glyph of a text run.
///
/// All positions are in screen pixels with a bottom-left origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Glyph {
    pub uv_min: [f32; 2],
    pub uv_max: [f32; 2],
    /// Bottom left corner of the glyph quad.
    pub min: [f32; 2],
    pub size: [f32; 2],
    /// Height of the line's baseline.
    pub baseline: f32,
}

/// Interleaved vertex and index data of a mesh.
///
/// The spans point into the payload partition chosen by the encoder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexData {
    pub mesh: MeshId,
    /// `f32` vertex attributes.
    pub vertices: Span,
    /// `u16` triangle list indices.
    pub indices: Span,
    pub layout: VertexLayout,
}

/// A quad, either in world space or (for overlays) in screen pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RectDraw {
    /// Extent of the quad relative to `transform.translation`, before rotation and scale.
    pub local_min: Vec2,
    pub local_max: Vec2,
    /// The anchor `local_min` and `local_max` were derived from.
    pub origin: Origin,
    pub transform: Transform,
    /// Linear RGBA in `0.0..=1.0`, straight alpha.
    pub tint: Vec4,
    pub texture: TextureId,
    /// Sub-rectangle of the texture to map onto the quad.
    pub uv_min: Vec2,
    pub uv_max: Vec2,
}

/// A debug line between two world-space points on the `z = 0` plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineDraw {
    pub start: Vec2,
    pub end: Vec2,
    pub tint: Vec4,
    pub thickness: f32,
}

/// A run of pre-positioned glyphs sampling one atlas texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextDraw {
    /// [`Glyph`] array.
    pub glyphs: Span,
    pub glyph_count: u32,
    pub texture: TextureId,
    pub tint: Vec4,
}

/// The unit cube placed by `transform`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubeDraw {
    /// The scale holds the cube's full extent along each axis.
    pub transform: Transform,
    pub tint: Vec4,
    pub texture: TextureId,
}

/// A previously uploaded mesh, drawn with an explicit world matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshDraw {
    pub mesh: MeshId,
    pub texture: TextureId,
    pub world: Mat4,
    pub index_count: u32,
}

/// A bitmap to upload once.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureLoad {
    pub texture: TextureId,
    /// `u32` pixels, premultiplied `0xAARRGGBB`, bottom row first.
    pub pixels: Span,
    pub width: u32,
    pub height: u32,
}

/// A decoded command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Record {
    InitVertexData(VertexData),
    DrawRectOverlay(RectDraw),
    Line(LineDraw),
    DrawRect(RectDraw),
    DrawText(TextDraw),
    DrawCube(CubeDraw),
    DrawMesh(MeshDraw),
    LoadTexture(TextureLoad),
}

impl Record {
    pub fn tag(&self) -> RecordTag {
        match self {
            Self::InitVertexData(_) => RecordTag::InitVertexData,
            Self::DrawRectOverlay(_) => RecordTag::DrawRectOverlay,
            Self::Line(_) => RecordTag::Line,
            Self::DrawRect(_) => RecordTag::DrawRect,
            Self::DrawText(_) => RecordTag::DrawText,
            Self::DrawCube(_) => RecordTag::DrawCube,
            Self::DrawMesh(_) => RecordTag::DrawMesh,
            Self::LoadTexture(_) => RecordTag::LoadTexture,
        }
    }

    /// Number of bytes [`Record::write`] produces.
    pub fn encoded_size(&self) -> usize {
        self.tag().record_size()
    }

    /// Serializes the record into the start of `out`.
    ///
    /// # Panics
    ///
    /// If `out` is shorter than [`Record::encoded_size`].
    pub fn write(&self, out: &mut [u8]) {
        let tag = self.tag();
        out[..4].copy_from_slice(&(tag as u32).to_ne_bytes());
        let payload = &mut out[4..tag.record_size()];
        match self {
            Self::InitVertexData(data) => write_pod(payload, &VertexDataWire::from(data)),
            Self::DrawRectOverlay(rect) | Self::DrawRect(rect) => {
                write_pod(payload, &RectWire::from(rect));
            }
            Self::Line(line) => write_pod(payload, &LineWire::from(line)),
            Self::DrawText(text) => write_pod(payload, &TextWire::from(text)),
            Self::DrawCube(cube) => write_pod(payload, &CubeWire::from(cube)),
            Self::DrawMesh(mesh) => write_pod(payload, &MeshWire::from(mesh)),
            Self::LoadTexture(texture) => write_pod(payload, &TextureWire::from(texture)),
        }
    }

    /// Deserializes the record at the start of `bytes`, returning it together with
    /// the number of bytes it occupied.
    pub fn read(bytes: &[u8]) -> Result<(Self, usize)> {
        let raw_tag = read_pod::<u32>(bytes, 0)?;
        let tag = RecordTag::from_u32(raw_tag).ok_or(Error::UnknownTag(raw_tag))?;
        let size = tag.record_size();
        if bytes.len() < size {
            return Err(Error::Truncated {
                tag: raw_tag,
                needed: size,
                available: bytes.len(),
            });
        }
        let payload = &bytes[4..size];
        let record = match tag {
            RecordTag::InitVertexData => {
                Self::InitVertexData(read_pod::<VertexDataWire>(payload, raw_tag)?.decode()?)
            }
            RecordTag::DrawRectOverlay => {
                Self::DrawRectOverlay(read_pod::<RectWire>(payload, raw_tag)?.decode()?)
            }
            RecordTag::Line => Self::Line(read_pod::<LineWire>(payload, raw_tag)?.decode()),
            RecordTag::DrawRect => {
                Self::DrawRect(read_pod::<RectWire>(payload, raw_tag)?.decode()?)
            }
            RecordTag::DrawText => {
                Self::DrawText(read_pod::<TextWire>(payload, raw_tag)?.decode()?)
            }
            RecordTag::DrawCube => Self::DrawCube(read_pod::<CubeWire>(payload, raw_tag)?.decode()),
            RecordTag::DrawMesh => Self::DrawMesh(read_pod::<MeshWire>(payload, raw_tag)?.decode()),
            RecordTag::LoadTexture => {
                Self::LoadTexture(read_pod::<TextureWire>(payload, raw_tag)?.decode()?)
            }
        };
        Ok((record, size))
    }
}

fn write_pod<T: Pod>(out: &mut [u8], value: &T) {
    out.copy_from_slice(bytemuck::bytes_of(value));
}

fn read_pod<T: Pod>(bytes: &[u8], tag: u32) -> Result<T> {
    let needed = size_of::<T>();
    if bytes.len() < needed {
        return Err(Error::Truncated {
            tag,
            needed,
            available: bytes.len(),
        });
    }
    Ok(bytemuck::pod_read_unaligned(&bytes[..needed]))
}

fn read_span(words: [u32; 4], field: &'static str) -> Result<Span> {
    Span::from_words(words).ok_or(Error::InvalidField {
        field,
        value: words[0],
    })
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct TransformWire {
    translation: [f32; 3],
    rotation: [f32; 3],
    scale: [f32; 3],
}

impl From<&Transform> for TransformWire {
    fn from(transform: &Transform) -> Self {
        Self {
            translation: transform.translation.to_array(),
            rotation: transform.rotation.to_array(),
            scale: transform.scale.to_array(),
        }
    }
}

impl From<TransformWire> for Transform {
    fn from(wire: TransformWire) -> Self {
        Self {
            translation: Vec3::from_array(wire.translation),
            rotation: Vec3::from_array(wire.rotation),
            scale: Vec3::from_array(wire.scale),
        }
    }
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct VertexDataWire {
    mesh: u32,
    vertices: [u32; 4],
    indices: [u32; 4],
    attributes: u32,
    stride: u32,
}

impl From<&VertexData> for VertexDataWire {
    fn from(data: &VertexData) -> Self {
        Self {
            mesh: data.mesh.0,
            vertices: data.vertices.to_words(),
            indices: data.indices.to_words(),
            attributes: data.layout.attributes.0,
            stride: data.layout.stride,
        }
    }
}

impl VertexDataWire {
    fn decode(self) -> Result<VertexData> {
        let attributes = VertexAttributes(self.attributes);
        if !attributes.is_valid() {
            return Err(Error::InvalidField {
                field: "vertex attributes",
                value: self.attributes,
            });
        }
        let layout = VertexLayout {
            attributes,
            stride: self.stride,
        };
        if !layout.fits_stride() {
            return Err(Error::InvalidField {
                field: "vertex stride",
                value: self.stride,
            });
        }
        Ok(VertexData {
            mesh: MeshId(self.mesh),
            vertices: read_span(self.vertices, "vertex span")?,
            indices: read_span(self.indices, "index span")?,
            layout,
        })
    }
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct RectWire {
    local_min: [f32; 2],
    local_max: [f32; 2],
    origin: u32,
    transform: TransformWire,
    tint: [f32; 4],
    texture: u32,
    uv_min: [f32; 2],
    uv_max: [f32; 2],
}

impl From<&RectDraw> for RectWire {
    fn from(rect: &RectDraw) -> Self {
        Self {
            local_min: rect.local_min.to_array(),
            local_max: rect.local_max.to_array(),
            origin: rect.origin as u32,
            transform: TransformWire::from(&rect.transform),
            tint: rect.tint.to_array(),
            texture: rect.texture.0,
            uv_min: rect.uv_min.to_array(),
            uv_max: rect.uv_max.to_array(),
        }
    }
}

impl RectWire {
    fn decode(self) -> Result<RectDraw> {
        let origin = Origin::from_u32(self.origin).ok_or(Error::InvalidField {
            field: "origin",
            value: self.origin,
        })?;
        Ok(RectDraw {
            local_min: Vec2::from_array(self.local_min),
            local_max: Vec2::from_array(self.local_max),
            origin,
            transform: self.transform.into(),
            tint: Vec4::from_array(self.tint),
            texture: TextureId(self.texture),
            uv_min: Vec2::from_array(self.uv_min),
            uv_max: Vec2::from_array(self.uv_max),
        })
    }
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct LineWire {
    start: [f32; 2],
    end: [f32; 2],
    tint: [f32; 4],
    thickness: f32,
}

impl From<&LineDraw> for LineWire {
    fn from(line: &LineDraw) -> Self {
        Self {
            start: line.start.to_array(),
            end: line.end.to_array(),
            tint: line.tint.to_array(),
            thickness: line.thickness,
        }
    }
}

impl LineWire {
    fn decode(self) -> LineDraw {
        LineDraw {
            start: Vec2::from_array(self.start),
            end: Vec2::from_array(self.end),
            tint: Vec4::from_array(self.tint),
            thickness: self.thickness,
        }
    }
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct TextWire {
    glyphs: [u32; 4],
    glyph_count: u32,
    texture: u32,
    tint: [f32; 4],
}

impl From<&TextDraw> for TextWire {
    fn from(text: &TextDraw) -> Self {
        Self {
            glyphs: text.glyphs.to_words(),
            glyph_count: text.glyph_count,
            texture: text.texture.0,
            tint: text.tint.to_array(),
        }
    }
}

impl TextWire {
    fn decode(self) -> Result<TextDraw> {
        if self.glyph_count as usize > MAX_GLYPHS {
            return Err(Error::InvalidField {
                field: "glyph count",
                value: self.glyph_count,
            });
        }
        Ok(TextDraw {
            glyphs: read_span(self.glyphs, "glyph span")?,
            glyph_count: self.glyph_count,
            texture: TextureId(self.texture),
            tint: Vec4::from_array(self.tint),
        })
    }
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct CubeWire {
    transform: TransformWire,
    tint: [f32; 4],
    texture: u32,
}

impl From<&CubeDraw> for CubeWire {
    fn from(cube: &CubeDraw) -> Self {
        Self {
            transform: TransformWire::from(&cube.transform),
            tint: cube.tint.to_array(),
            texture: cube.texture.0,
        }
    }
}

impl CubeWire {
    fn decode(self) -> CubeDraw {
        CubeDraw {
            transform: self.transform.into(),
            tint: Vec4::from_array(self.tint),
            texture: TextureId(self.texture),
        }
    }
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct MeshWire {
    mesh: u32,
    texture: u32,
    world: [f32; 16],
    index_count: u32,
}

impl From<&MeshDraw> for MeshWire {
    fn from(mesh: &MeshDraw) -> Self {
        Self {
            mesh: mesh.mesh.0,
            texture: mesh.texture.0,
            world: mesh.world.to_cols_array(),
            index_count: mesh.index_count,
        }
    }
}

impl MeshWire {
    fn decode(self) -> MeshDraw {
        MeshDraw {
            mesh: MeshId(self.mesh),
            texture: TextureId(self.texture),
            world: Mat4::from_cols_array(&self.world),
            index_count: self.index_count,
        }
    }
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct TextureWire {
    texture: u32,
    pixels: [u32; 4],
    width: u32,
    height: u32,
}

impl From<&TextureLoad> for TextureWire {
    fn from(texture: &TextureLoad) -> Self {
        Self {
            texture: texture.texture.0,
            pixels: texture.pixels.to_words(),
            width: texture.width,
            height: texture.height,
        }
    }
}

impl TextureWire {
    fn decode(self) -> Result<TextureLoad> {
        Ok(TextureLoad {
            texture: TextureId(self.texture),
            pixels: read_span(self.pixels, "pixel span")?,
            width: self.width,
            height: self.height,
        })
    }
}
