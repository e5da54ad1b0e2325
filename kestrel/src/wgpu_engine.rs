// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;

use kestrel_encoding::{MeshId, TextureId};
use wgpu::util::DeviceExt;
use wgpu::{
    BindGroup, BindGroupLayout, Buffer, BufferUsages, CommandEncoderDescriptor, Device,
    PipelineCompilationOptions, Queue, RenderPipeline, Sampler, Texture, TextureAspect,
    TextureFormat, TextureUsages, TextureView,
};

use crate::recording::{Command, DrawParams, Pipeline, Recording, Vertex};
use crate::shaders::{DRAW_SHADER, VERTEX_ENTRY, fragment_entry};
use crate::{Error, RendererOptions, Result};

const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Executes [`Recording`]s with `wgpu`, holding every mesh and texture uploaded so far.
pub(crate) struct WgpuEngine {
    bind_group_layout: BindGroupLayout,
    pipelines: HashMap<Pipeline, RenderPipeline>,
    sampler: Sampler,
    meshes: HashMap<MeshId, GpuMesh>,
    textures: HashMap<TextureId, GpuTexture>,
    /// Bound when a draw has no texture.
    white: Option<GpuTexture>,
    depth: Option<DepthTarget>,
    use_depth: bool,
}

struct GpuMesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

struct GpuTexture {
    #[expect(dead_code, reason = "Kept alive for the view")]
    texture: Texture,
    view: TextureView,
}

struct DepthTarget {
    view: TextureView,
    width: u32,
    height: u32,
}

/// A draw whose resources have been resolved.
struct PreparedDraw {
    pipeline: Pipeline,
    mesh: MeshId,
    index_count: u32,
    bind_group: BindGroup,
}

impl WgpuEngine {
    pub(crate) fn new(device: &Device, options: &RendererOptions) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("kestrel.draw"),
            source: wgpu::ShaderSource::Wgsl(DRAW_SHADER.into()),
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kestrel.draw"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kestrel.draw"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipelines = Pipeline::ALL
            .into_iter()
            .map(|pipeline| {
                let render_pipeline =
                    add_render_pipeline(device, &module, &pipeline_layout, pipeline, options);
                (pipeline, render_pipeline)
            })
            .collect();
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("kestrel.bilinear"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            bind_group_layout,
            pipelines,
            sampler,
            meshes: HashMap::new(),
            textures: HashMap::new(),
            white: None,
            depth: None,
            use_depth: options.use_depth,
        }
    }

    pub(crate) fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub(crate) fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Runs the uploads of `recording`, then draws it into `target` in one pass.
    ///
    /// Nothing is drawn if a draw references a mesh or texture which was never
    /// uploaded; the uploads before it are kept.
    pub(crate) fn run_recording(
        &mut self,
        device: &Device,
        queue: &Queue,
        recording: &Recording,
        target: &TextureView,
        width: u32,
        height: u32,
    ) -> Result<()> {
        if self.white.is_none() {
            self.white = Some(upload_texture(device, queue, 1, 1, &[0xff; 4]));
        }
        let mut draws = Vec::new();
        for command in &recording.commands {
            match command {
                Command::UploadMesh {
                    mesh,
                    vertices,
                    indices,
                } => {
                    let uploaded = upload_mesh(device, *mesh, vertices, indices);
                    self.meshes.insert(*mesh, uploaded);
                }
                Command::UploadTexture {
                    texture,
                    width: texture_width,
                    height: texture_height,
                    pixels,
                } => {
                    let uploaded =
                        upload_texture(device, queue, *texture_width, *texture_height, pixels);
                    self.textures.insert(*texture, uploaded);
                }
                Command::Draw(params) => draws.push(self.prepare_draw(device, params)?),
            }
        }

        if self.use_depth {
            self.ensure_depth(device, width, height);
        }
        let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("kestrel.frame"),
        });
        {
            let clear = recording.clear;
            let depth_stencil_attachment = self.depth.as_ref().filter(|_| self.use_depth).map(
                |depth| wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: if clear.clear_depth {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                },
            );
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kestrel.frame"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(clear.color.x),
                            g: f64::from(clear.color.y),
                            b: f64::from(clear.color.z),
                            a: f64::from(clear.color.w),
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            for draw in &draws {
                let Some(mesh) = self.meshes.get(&draw.mesh) else {
                    continue;
                };
                rpass.set_pipeline(&self.pipelines[&draw.pipeline]);
                rpass.set_bind_group(0, &draw.bind_group, &[]);
                rpass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                rpass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                rpass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }
        queue.submit(Some(encoder.finish()));
        log::debug!(
            "hardware frame: {} draws, {} meshes, {} textures resident",
            draws.len(),
            self.meshes.len(),
            self.textures.len()
        );
        Ok(())
    }

    fn prepare_draw(&self, device: &Device, params: &DrawParams) -> Result<PreparedDraw> {
        let Some(mesh) = self.meshes.get(&params.mesh) else {
            log::warn!("draw references mesh {} before its upload", params.mesh.0);
            return Err(Error::UnknownMesh(params.mesh));
        };
        check_index_count(params, mesh.index_count);
        let texture = if params.texture.is_none() {
            self.white.as_ref()
        } else {
            self.textures.get(&params.texture)
        };
        let Some(texture) = texture else {
            log::warn!("draw references texture {} before its upload", params.texture.0);
            return Err(Error::UnknownTexture(params.texture));
        };
        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("kestrel.uniforms"),
            contents: bytemuck::bytes_of(&params.uniforms),
            usage: BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kestrel.draw"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        Ok(PreparedDraw {
            pipeline: params.pipeline,
            mesh: params.mesh,
            index_count: params.index_count,
            bind_group,
        })
    }

    fn ensure_depth(&mut self, device: &Device, width: u32, height: u32) {
        let fits = self
            .depth
            .as_ref()
            .is_some_and(|depth| depth.width == width && depth.height == height);
        if fits {
            return;
        }
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("kestrel.depth"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.depth = Some(DepthTarget {
            view,
            width,
            height,
        });
    }
}

fn add_render_pipeline(
    device: &Device,
    module: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    pipeline: Pipeline,
    options: &RendererOptions,
) -> RenderPipeline {
    let depth_stencil = options.use_depth.then(|| {
        let (depth_write_enabled, depth_compare) = match pipeline {
            Pipeline::Basic => (true, wgpu::CompareFunction::Less),
            Pipeline::Overlay | Pipeline::Text => (false, wgpu::CompareFunction::Always),
        };
        wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled,
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(match pipeline {
            Pipeline::Basic => "kestrel.basic",
            Pipeline::Overlay => "kestrel.overlay",
            Pipeline::Text => "kestrel.text",
        }),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some(VERTEX_ENTRY),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: size_of::<Vertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![
                    0 => Float32x3,
                    1 => Float32x3,
                    2 => Float32x2
                ],
            }],
            compilation_options: PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(fragment_entry(pipeline)),
            targets: &[Some(wgpu::ColorTargetState {
                format: options.surface_format,
                blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // Quads are wound either way depending on their transform.
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn upload_mesh(device: &Device, mesh: MeshId, vertices: &[Vertex], indices: &[u16]) -> GpuMesh {
    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("kestrel.vertices"),
        contents: bytemuck::cast_slice(vertices),
        usage: BufferUsages::VERTEX,
    });
    let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("kestrel.indices"),
        contents: bytemuck::cast_slice(indices),
        usage: BufferUsages::INDEX,
    });
    log::trace!(
        "uploaded mesh {}: {} vertices, {} indices",
        mesh.0,
        vertices.len(),
        indices.len()
    );
    GpuMesh {
        vertex_buffer,
        index_buffer,
        index_count: indices.len() as u32,
    }
}

/// Creates a `Bgra8Unorm` texture from premultiplied BGRA bytes, bottom row first.
///
/// The first row lands at `v = 0`, which is where the quads' texture coordinates
/// put the bottom edge.
fn upload_texture(
    device: &Device,
    queue: &Queue,
    width: u32,
    height: u32,
    bytes: &[u8],
) -> GpuTexture {
    let format = TextureFormat::Bgra8Unorm;
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("kestrel.texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        format,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x: 0, y: 0, z: 0 },
            aspect: TextureAspect::All,
        },
        bytes,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: None,
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture { texture, view }
}

impl core::fmt::Debug for WgpuEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WgpuEngine")
            .field("meshes", &self.meshes.len())
            .field("textures", &self.textures.len())
            .field("use_depth", &self.use_depth)
            .finish_non_exhaustive()
    }
}

/// # Panics
///
/// If the draw reads past the indices of its mesh.
fn check_index_count(params: &DrawParams, available: u32) {
    assert!(
        params.index_count <= available,
        "draw of mesh {} reads {} indices, but the mesh only has {available}",
        params.mesh.0,
        params.index_count
    );
}
