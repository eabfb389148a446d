//! wgpu compute device for template matching
//!
//! One shader invocation scores one placement of the template inside the
//! search area, using the same masked score as [`CpuMatcher`]. The scores
//! are read back and the best placement is picked on the CPU.
//!
//! [`CpuMatcher`]: super::matcher::CpuMatcher

use std::fmt::Display;
use std::sync::{OnceLock, mpsc};

use bytemuck::{Pod, Zeroable};
use pollster::block_on;
use tracing::debug;
use wgpu::util::DeviceExt;

use super::accelerator::Accelerator;
use super::error::AcceleratorError;
use super::frame::Frame;
use super::geometry::{Point, Rect};
use super::matcher::MatchScore;
use super::template::PreparedTemplate;

const WORKGROUP_SIZE: u32 = 8;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, Default)]
struct MatchParams {
    area_width: u32,
    area_height: u32,
    template_width: u32,
    template_height: u32,
    cols: u32,
    rows: u32,
    _pad0: u32,
    _pad1: u32,
}

struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

impl GpuContext {
    fn new() -> Result<Self, AcceleratorError> {
        let instance = wgpu::Instance::default();
        let adapter = block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
            .map_err(|e| AcceleratorError::Unavailable(e.to_string()))?;
        let (device, queue) = block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("rotascope-matcher"),
            ..Default::default()
        }))
        .map_err(|e| AcceleratorError::Unavailable(e.to_string()))?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("rotascope-template-match"),
            source: wgpu::ShaderSource::Wgsl(include_str!("template_match.wgsl").into()),
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("rotascope-template-match-pipeline"),
            layout: None,
            module: &shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        let layout = pipeline.get_bind_group_layout(0);

        debug!(adapter = %adapter.get_info().name, "GPU matcher ready");
        Ok(Self {
            device,
            queue,
            pipeline,
            layout,
        })
    }
}

/// Template resident on the device.
pub struct GpuTemplate {
    pixels: wgpu::Buffer,
    width: u32,
    height: u32,
}

/// GPU matching through wgpu (Vulkan, DX12 or GL). The adapter is opened
/// by [`Accelerator::connect`].
#[derive(Default)]
pub struct WgpuDevice {
    context: OnceLock<GpuContext>,
}

impl WgpuDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn context(&self) -> Result<&GpuContext, AcceleratorError> {
        self.context
            .get()
            .ok_or_else(|| AcceleratorError::Unavailable("device not connected".to_string()))
    }
}

impl Accelerator for WgpuDevice {
    type Buffer = GpuTemplate;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn connect(&self) -> Result<(), AcceleratorError> {
        if self.context.get().is_none() {
            // A racing connect may win; either context is fine
            let _ = self.context.set(GpuContext::new()?);
        }
        Ok(())
    }

    fn upload(&self, template: &PreparedTemplate) -> Result<GpuTemplate, AcceleratorError> {
        let ctx = self.context()?;
        let pixels = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(template.key.as_str()),
                contents: bytemuck::cast_slice(&pack_template(template)),
                usage: wgpu::BufferUsages::STORAGE,
            });
        Ok(GpuTemplate {
            pixels,
            width: template.width(),
            height: template.height(),
        })
    }

    fn match_template(
        &self,
        frame: &Frame,
        buffer: &GpuTemplate,
        search: Rect,
    ) -> Result<MatchScore, AcceleratorError> {
        let ctx = self.context()?;
        let cols = search.width - buffer.width + 1;
        let rows = search.height - buffer.height + 1;
        let params = MatchParams {
            area_width: search.width,
            area_height: search.height,
            template_width: buffer.width,
            template_height: buffer.height,
            cols,
            rows,
            ..MatchParams::default()
        };
        let scores_size = u64::from(cols) * u64::from(rows) * std::mem::size_of::<f32>() as u64;

        let params_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("rotascope-match-params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let area_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("rotascope-match-area"),
                contents: bytemuck::cast_slice(&pack_area(frame, search)),
                usage: wgpu::BufferUsages::STORAGE,
            });
        let scores_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("rotascope-match-scores"),
            size: scores_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("rotascope-match-readback"),
            size: scores_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("rotascope-match-bind-group"),
            layout: &ctx.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: area_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffer.pixels.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: scores_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("rotascope-match-encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("rotascope-match-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&ctx.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(cols.div_ceil(WORKGROUP_SIZE), rows.div_ceil(WORKGROUP_SIZE), 1);
        }
        encoder.copy_buffer_to_buffer(&scores_buffer, 0, &readback, 0, scores_size);
        let submission = ctx.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.device
            .poll(wgpu::PollType::wait_for_submission_index(submission))
            .map_err(call_failed)?;
        rx.recv().map_err(call_failed)?.map_err(call_failed)?;

        let view = slice.get_mapped_range();
        let scores: Vec<f32> = bytemuck::cast_slice(&view[..]).to_vec();
        drop(view);
        readback.unmap();

        let (dx, dy, score) = best_placement(&scores, cols)
            .ok_or_else(|| AcceleratorError::CallFailed("no placement scored".to_string()))?;
        Ok(MatchScore {
            location: Point::new(search.x + dx as i32, search.y + dy as i32),
            confidence: (1.0 - score).clamp(0.0, 1.0),
        })
    }
}

fn call_failed(error: impl Display) -> AcceleratorError {
    AcceleratorError::CallFailed(error.to_string())
}

/// Search area as packed `0x00BBGGRR` pixels, row-major.
fn pack_area(frame: &Frame, search: Rect) -> Vec<u32> {
    let image = frame.image();
    let (x0, y0) = (search.x as u32, search.y as u32);
    let mut packed = Vec::with_capacity((search.width * search.height) as usize);
    for y in y0..y0 + search.height {
        for x in x0..x0 + search.width {
            let p = image.get_pixel(x, y);
            packed.push(u32::from(p[0]) | u32::from(p[1]) << 8 | u32::from(p[2]) << 16);
        }
    }
    packed
}

/// Template pixels in 0..=1, pre-multiplied by their weight, weight last.
fn pack_template(template: &PreparedTemplate) -> Vec<[f32; 4]> {
    let pixels = template.pixels();
    let mut packed = Vec::with_capacity((template.width() * template.height()) as usize);
    for y in 0..template.height() {
        for x in 0..template.width() {
            let w = template.weight(x, y);
            let p = pixels.get_pixel(x, y);
            packed.push([
                w * f32::from(p[0]) / 255.0,
                w * f32::from(p[1]) / 255.0,
                w * f32::from(p[2]) / 255.0,
                w,
            ]);
        }
    }
    packed
}

/// Lowest score in row-major order, so ties go to the top-left placement.
fn best_placement(scores: &[f32], cols: u32) -> Option<(u32, u32, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_finite() && best.is_none_or(|(_, b)| score < b) {
            best = Some((index, score));
        }
    }
    let cols = cols.max(1) as usize;
    best.map(|(index, score)| ((index % cols) as u32, (index / cols) as u32, score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::matcher::{CpuMatcher, MatchBackend};
    use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};

    fn background(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                ((x * 7 + y * 13) % 251) as u8,
                ((x * 3 + y * 5) % 241) as u8,
                ((x * 11 + y * 2) % 239) as u8,
            ])
        })
    }

    #[test]
    fn test_best_placement_prefers_top_left_on_ties() {
        let scores = [0.5, 0.1, 0.3, 0.1, f32::NAN, 0.9];
        assert_eq!(best_placement(&scores, 3), Some((1, 0, 0.1)));
        assert_eq!(best_placement(&[f32::NAN], 1), None);
        assert_eq!(best_placement(&[], 4), None);
    }

    #[test]
    fn test_area_packing_is_row_major_rgb() {
        let mut img = RgbImage::new(4, 3);
        img.put_pixel(2, 1, Rgb([1, 2, 3]));
        let frame = Frame::from_capture(DynamicImage::ImageRgb8(img), Rect::sized(4, 3));

        let packed = pack_area(&frame, Rect::new(1, 1, 2, 2));
        assert_eq!(packed.len(), 4);
        assert_eq!(packed[1], 0x0003_0201);
    }

    #[test]
    fn test_template_packing_premultiplies_weight() {
        let mut rgba = RgbaImage::from_pixel(2, 1, Rgba([255, 0, 0, 255]));
        rgba.put_pixel(1, 0, Rgba([255, 255, 255, 51]));
        let template = PreparedTemplate::prepare("t", &DynamicImage::ImageRgba8(rgba), None).unwrap();

        let packed = pack_template(&template);
        assert_eq!(packed[0], [1.0, 0.0, 0.0, 1.0]);
        assert!((packed[1][3] - 0.2).abs() < 1e-6);
        assert!((packed[1][0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_device_agrees_with_cpu() {
        let device = WgpuDevice::new();
        if let Err(e) = device.connect() {
            eprintln!("no usable GPU adapter, skipping: {e}");
            return;
        }
        let img = background(40, 30);
        let crop = image::imageops::crop_imm(&img, 17, 9, 6, 5).to_image();
        let template = PreparedTemplate::prepare("t", &DynamicImage::ImageRgb8(crop), None).unwrap();
        let frame = Frame::from_capture(DynamicImage::ImageRgb8(img), Rect::sized(40, 30));

        let buffer = device.upload(&template).unwrap();
        let gpu = device.match_template(&frame, &buffer, frame.bounds()).unwrap();
        let cpu = CpuMatcher.best_match(&frame, &template, frame.bounds()).unwrap();
        assert_eq!(gpu.location, cpu.location);
        assert!((gpu.confidence - cpu.confidence).abs() < 1e-3, "{gpu:?} vs {cpu:?}");
    }
}
