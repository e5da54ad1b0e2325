// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Device setup, offscreen targets and readback for running [`Renderer`](crate::Renderer)
//! without a window.

use std::future::Future;

use wgpu::{Adapter, Device, Instance, Limits, Queue, Texture, TextureFormat, TextureView};

use crate::{Error, Result};

/// A `wgpu` instance and the devices opened on it.
pub struct RenderContext {
    pub instance: Instance,
    pub devices: Vec<DeviceHandle>,
}

/// An opened device with its queue.
pub struct DeviceHandle {
    adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
}

impl RenderContext {
    #[expect(
        clippy::new_without_default,
        reason = "Opening an instance reads the environment and loads backends"
    )]
    pub fn new() -> Self {
        let backends = wgpu::Backends::from_env().unwrap_or_default();
        let flags = wgpu::InstanceFlags::from_build_config().with_env();
        let memory_budget_thresholds = wgpu::MemoryBudgetThresholds::default();
        let backend_options = wgpu::BackendOptions::from_env_or_default();
        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends,
            flags,
            memory_budget_thresholds,
            backend_options,
        });
        Self {
            instance,
            devices: Vec::new(),
        }
    }

    /// Index into [`devices`](Self::devices) of a usable device, opening one on first use.
    pub async fn device(&mut self) -> Result<usize> {
        if self.devices.is_empty() {
            return self.new_device().await.ok_or(Error::NoCompatibleDevice);
        }
        Ok(0)
    }

    /// Opens the adapter chosen by `WGPU_ADAPTER_NAME` (or the default one).
    async fn new_device(&mut self) -> Option<usize> {
        let adapter = wgpu::util::initialize_adapter_from_env_or_default(&self.instance, None)
            .await
            .ok()?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("kestrel"),
                required_features: wgpu::Features::empty(),
                required_limits: Limits::default(),
                ..Default::default()
            })
            .await
            .ok()?;
        log::info!("using adapter {:?}", adapter.get_info().name);
        self.devices.push(DeviceHandle {
            adapter,
            device,
            queue,
        });
        Some(self.devices.len() - 1)
    }
}

impl DeviceHandle {
    /// The adapter the device was opened on.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }
}

/// Creates a texture the renderer can draw into and [`read_texture`] can copy out of.
pub fn create_target(
    device: &Device,
    width: u32,
    height: u32,
    format: TextureFormat,
) -> (Texture, TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("kestrel.target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        format,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Copies a 4-byte-per-pixel texture back to memory, rows in texture order.
///
/// Blocks until the GPU has finished the copy.
pub fn read_texture(
    device: &Device,
    queue: &Queue,
    texture: &Texture,
    width: u32,
    height: u32,
) -> Result<Vec<u8>> {
    let padded_byte_width = (width * 4).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("kestrel.readback"),
        size: u64::from(padded_byte_width) * u64::from(height),
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("kestrel.readback"),
    });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_byte_width),
                rows_per_image: None,
            },
        },
        size,
    );
    queue.submit([encoder.finish()]);

    let slice = buffer.slice(..);
    let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        if sender.send(result).is_err() {
            log::warn!("readback finished after its receiver was dropped");
        }
    });
    block_on_wgpu(device, receiver.receive()).ok_or(Error::ReadbackCancelled)??;

    let data = slice.get_mapped_range();
    let row_bytes = (width * 4) as usize;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks_exact(padded_byte_width as usize) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }
    drop(data);
    buffer.unmap();
    Ok(pixels)
}

struct NullWake;

impl std::task::Wake for NullWake {
    fn wake(self: std::sync::Arc<Self>) {}
}

/// Drives `fut` to completion by waiting on `device` between polls.
///
/// Only futures resolved by device progress (map callbacks, error scopes) may be
/// passed; anything else never wakes.
#[cfg_attr(docsrs, doc(hidden))]
pub fn block_on_wgpu<F: Future>(device: &Device, fut: F) -> F::Output {
    if cfg!(target_arch = "wasm32") {
        panic!("block_on_wgpu is unavailable on wasm32");
    }
    let waker = std::task::Waker::from(std::sync::Arc::new(NullWake));
    let mut context = std::task::Context::from_waker(&waker);
    let mut fut = std::pin::pin!(fut);
    loop {
        match fut.as_mut().poll(&mut context) {
            std::task::Poll::Pending => {
                if let Err(err) = device.poll(wgpu::PollType::wait_indefinitely()) {
                    panic!("polling the device failed: {err}");
                }
            }
            std::task::Poll::Ready(item) => break item,
        }
    }
}
