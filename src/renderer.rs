//! GPU renderer for CdeAtlas.
use std::sync::Arc;

use iced::widget::shader::Viewport;
use iced::{Rectangle, wgpu::*};

use crate::camera::{Camera, CameraUniform};
use crate::overlay::HighlightRing;
use crate::point_field::{FieldVersions, PointField, PointStyle};

pub(crate) struct RenderParams<'a> {
    pub encoder: &'a mut CommandEncoder,
    pub target: &'a TextureView,
    pub bounds: Rectangle<u32>,
}

/// Everything the renderer reads for one frame. Buffers are shared with the
/// point field, so taking a snapshot never copies point data.
#[derive(Debug, Clone)]
pub(crate) struct FrameSnapshot {
    pub camera: Camera,
    pub versions: FieldVersions,
    pub style: PointStyle,
    pub positions: Arc<[[f32; 2]]>,
    pub colors: Arc<[[f32; 3]]>,
    pub alphas: Arc<Vec<f32>>,
    pub sizes: Arc<Vec<f32>>,
    pub state_rows: Vec<Arc<Vec<u8>>>,
    pub state_row_versions: Vec<u64>,
    pub state_size: (u32, u32),
    pub ring: Option<HighlightRing>,
}

impl FrameSnapshot {
    pub(crate) fn new(field: &PointField, camera: Camera) -> Self {
        let state = field.state_texture();
        Self {
            camera,
            versions: field.versions(),
            style: field.style(),
            positions: Arc::clone(field.positions()),
            colors: Arc::clone(field.colors()),
            alphas: Arc::clone(field.alphas()),
            sizes: Arc::clone(field.sizes()),
            state_rows: state.shared_rows().to_vec(),
            state_row_versions: state.row_versions().to_vec(),
            state_size: (state.width(), state.height()),
            ring: field.highlight().copied(),
        }
    }

    fn count(&self) -> usize {
        self.positions.len()
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct StyleUniform {
    pinned_size: f32,
    pinned_opacity: f32,
    state_width: u32,
    _pad: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct RingUniform {
    center: [f32; 2],
    inner_radius: f32,
    outer_radius: f32,
    color: [f32; 4],
}

impl RingUniform {
    /// The center is stored relative to the camera target, like point positions
    /// after the shader subtracts the target.
    fn new(ring: &HighlightRing, camera: &Camera) -> Self {
        let center = (ring.center - camera.target).as_vec2();
        Self {
            center: [center.x, center.y],
            inner_radius: ring.inner_radius,
            outer_radius: ring.outer_radius,
            color: ring.color,
        }
    }
}

/// Cache for render pipelines
struct PipelineCache {
    points: Option<RenderPipeline>,
    ring: Option<RenderPipeline>,
}

/// GPU copy of one point field generation.
struct PointBuffers {
    positions: Buffer,
    colors: Buffer,
    alphas: Buffer,
    sizes: Buffer,
    count: u32,
    state_texture: Texture,
    state_size: (u32, u32),
    bind_group: BindGroup,
}

impl PointBuffers {
    fn destroy(&self) {
        self.positions.destroy();
        self.colors.destroy();
        self.alphas.destroy();
        self.sizes.destroy();
        self.state_texture.destroy();
    }
}

/// Tracks version numbers to detect changes
#[derive(Default)]
struct VersionTracker {
    generation: Option<u64>,
    attributes: u64,
    state: u64,
    /// Row versions of the state texture as last uploaded.
    state_rows: Vec<u64>,
}

pub(crate) struct AtlasRenderer {
    format: TextureFormat,
    camera_buffer: Buffer,
    camera_bind_group: BindGroup,
    camera_bgl: BindGroupLayout,
    style_buffer: Buffer,
    points_bgl: BindGroupLayout,
    ring_buffer: Buffer,
    ring_bind_group: BindGroup,
    ring_bgl: BindGroupLayout,
    pipelines: PipelineCache,
    points: Option<PointBuffers>,
    versions: VersionTracker,
    ring_visible: bool,
    destroyed: bool,
}

fn uniform_entry(binding: u32, visibility: ShaderStages) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_buffer(device: &Device, label: &str, size: usize) -> Buffer {
    device.create_buffer(&BufferDescriptor {
        label: Some(label),
        size: size as u64,
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn vertex_buffer(device: &Device, queue: &Queue, label: &str, contents: &[u8]) -> Buffer {
    let buffer = device.create_buffer(&BufferDescriptor {
        label: Some(label),
        size: contents.len() as u64,
        usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    queue.write_buffer(&buffer, 0, contents);
    buffer
}

fn color_target(format: TextureFormat) -> [Option<ColorTargetState>; 1] {
    [Some(ColorTargetState {
        format,
        blend: Some(BlendState::ALPHA_BLENDING),
        write_mask: ColorWrites::ALL,
    })]
}

const STRIP: PrimitiveState = PrimitiveState {
    topology: PrimitiveTopology::TriangleStrip,
    strip_index_format: None,
    front_face: FrontFace::Ccw,
    cull_mode: None,
    polygon_mode: PolygonMode::Fill,
    unclipped_depth: false,
    conservative: false,
};

impl AtlasRenderer {
    pub fn new(device: &Device, _queue: &Queue, format: TextureFormat) -> Self {
        let camera_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("atlas camera_bgl"),
            entries: &[uniform_entry(0, ShaderStages::VERTEX_FRAGMENT)],
        });
        let camera_buffer = uniform_buffer(
            device,
            "atlas camera_buffer",
            std::mem::size_of::<CameraUniform>(),
        );
        let camera_bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("atlas camera_bg"),
            layout: &camera_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let points_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("atlas points_bgl"),
            entries: &[
                uniform_entry(0, ShaderStages::VERTEX),
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::VERTEX,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Uint,
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });
        let style_buffer = uniform_buffer(
            device,
            "atlas point_style",
            std::mem::size_of::<StyleUniform>(),
        );

        let ring_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("atlas ring_bgl"),
            entries: &[uniform_entry(0, ShaderStages::VERTEX_FRAGMENT)],
        });
        let ring_buffer = uniform_buffer(
            device,
            "atlas ring_buffer",
            std::mem::size_of::<RingUniform>(),
        );
        let ring_bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("atlas ring_bg"),
            layout: &ring_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: ring_buffer.as_entire_binding(),
            }],
        });

        Self {
            format,
            camera_buffer,
            camera_bind_group,
            camera_bgl,
            style_buffer,
            points_bgl,
            ring_buffer,
            ring_bind_group,
            ring_bgl,
            pipelines: PipelineCache {
                points: None,
                ring: None,
            },
            points: None,
            versions: VersionTracker::default(),
            ring_visible: false,
            destroyed: false,
        }
    }

    /// Prepare the renderer for a new frame: camera uniform, point buffers
    /// and the ring overlay.
    pub(crate) fn prepare_frame(
        &mut self,
        device: &Device,
        queue: &Queue,
        viewport: &Viewport,
        bounds: &Rectangle,
        frame: &FrameSnapshot,
    ) {
        if self.destroyed {
            return;
        }
        let scale_factor = viewport.scale_factor();
        let bounds_width = (bounds.width * scale_factor) as u32;
        let bounds_height = (bounds.height * scale_factor) as u32;

        self.ensure_points_pipeline(device);
        self.ensure_ring_pipeline(device);

        let mut cam_u = CameraUniform::default();
        cam_u.update(&frame.camera, bounds_width, bounds_height, scale_factor);
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&cam_u));

        self.sync_points(device, queue, frame);

        let style = StyleUniform {
            pinned_size: frame.style.size_pinned,
            pinned_opacity: frame.style.pinned_opacity,
            state_width: frame.state_size.0.max(1),
            _pad: 0,
        };
        queue.write_buffer(&self.style_buffer, 0, bytemuck::bytes_of(&style));

        self.ring_visible = match &frame.ring {
            Some(ring) => {
                let ring_u = RingUniform::new(ring, &frame.camera);
                queue.write_buffer(&self.ring_buffer, 0, bytemuck::bytes_of(&ring_u));
                true
            }
            None => false,
        };
    }

    fn sync_points(&mut self, device: &Device, queue: &Queue, frame: &FrameSnapshot) {
        let stale_generation = self.versions.generation != Some(frame.versions.generation);
        let count_changed = self
            .points
            .as_ref()
            .is_some_and(|points| points.count as usize != frame.count());

        if stale_generation || count_changed {
            self.rebuild_points(device, queue, frame);
            return;
        }
        let Some(points) = &self.points else {
            return;
        };

        if frame.versions.attributes != self.versions.attributes {
            queue.write_buffer(&points.alphas, 0, bytemuck::cast_slice(&frame.alphas));
            queue.write_buffer(&points.sizes, 0, bytemuck::cast_slice(&frame.sizes));
            self.versions.attributes = frame.versions.attributes;
        }
        if frame.versions.state != self.versions.state {
            let stale = stale_rows(&self.versions.state_rows, &frame.state_row_versions);
            write_state_rows(queue, &points.state_texture, points.state_size, frame, stale);
            self.versions.state = frame.versions.state;
            self.versions.state_rows.clone_from(&frame.state_row_versions);
        }
    }

    fn rebuild_points(&mut self, device: &Device, queue: &Queue, frame: &FrameSnapshot) {
        if let Some(old) = self.points.take() {
            old.destroy();
        }
        self.versions = VersionTracker {
            generation: Some(frame.versions.generation),
            attributes: frame.versions.attributes,
            state: frame.versions.state,
            state_rows: frame.state_row_versions.clone(),
        };

        let count = frame.count();
        if count == 0
            || frame.colors.len() != count
            || frame.alphas.len() != count
            || frame.sizes.len() != count
        {
            return;
        }

        let (width, height) = frame.state_size;
        let state_texture = device.create_texture(&TextureDescriptor {
            label: Some("atlas point_state"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Uint,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        write_state_rows(
            queue,
            &state_texture,
            frame.state_size,
            frame,
            0..frame.state_rows.len(),
        );
        let state_view = state_texture.create_view(&TextureViewDescriptor::default());

        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("atlas points_bg"),
            layout: &self.points_bgl,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: self.style_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::TextureView(&state_view),
                },
            ],
        });

        self.points = Some(PointBuffers {
            positions: vertex_buffer(
                device,
                queue,
                "atlas positions",
                bytemuck::cast_slice(&frame.positions),
            ),
            colors: vertex_buffer(
                device,
                queue,
                "atlas colors",
                bytemuck::cast_slice(&frame.colors),
            ),
            alphas: vertex_buffer(
                device,
                queue,
                "atlas alphas",
                bytemuck::cast_slice(&frame.alphas),
            ),
            sizes: vertex_buffer(
                device,
                queue,
                "atlas sizes",
                bytemuck::cast_slice(&frame.sizes),
            ),
            count: count as u32,
            state_texture,
            state_size: frame.state_size,
            bind_group,
        });
        log::debug!(
            "uploaded point field generation {} ({count} points)",
            frame.versions.generation
        );
    }

    fn ensure_points_pipeline(&mut self, device: &Device) {
        if self.pipelines.points.is_some() {
            return;
        }
        let shader = device.create_shader_module(include_wgsl!("shaders/points.wgsl"));
        let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("atlas points layout"),
            bind_group_layouts: &[&self.camera_bgl, &self.points_bgl],
            push_constant_ranges: &[],
        });
        let per_instance = |stride: u64, location: u32, format: VertexFormat| {
            (
                stride,
                [VertexAttribute {
                    offset: 0,
                    shader_location: location,
                    format,
                }],
            )
        };
        let position = per_instance(8, 0, VertexFormat::Float32x2);
        let color = per_instance(12, 1, VertexFormat::Float32x3);
        let alpha = per_instance(4, 2, VertexFormat::Float32);
        let size = per_instance(4, 3, VertexFormat::Float32);
        let buffers = [&position, &color, &alpha, &size].map(|(stride, attributes)| {
            VertexBufferLayout {
                array_stride: *stride,
                step_mode: VertexStepMode::Instance,
                attributes,
            }
        });

        let targets = color_target(self.format);
        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("atlas points pipeline"),
            layout: Some(&layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: PipelineCompilationOptions::default(),
                buffers: &buffers,
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: PipelineCompilationOptions::default(),
                targets: &targets,
            }),
            primitive: STRIP,
            depth_stencil: None,
            multisample: MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        self.pipelines.points = Some(pipeline);
    }

    fn ensure_ring_pipeline(&mut self, device: &Device) {
        if self.pipelines.ring.is_some() {
            return;
        }
        let shader = device.create_shader_module(include_wgsl!("shaders/ring.wgsl"));
        let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("atlas ring layout"),
            bind_group_layouts: &[&self.camera_bgl, &self.ring_bgl],
            push_constant_ranges: &[],
        });
        let targets = color_target(self.format);
        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("atlas ring pipeline"),
            layout: Some(&layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: PipelineCompilationOptions::default(),
                buffers: &[],
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: PipelineCompilationOptions::default(),
                targets: &targets,
            }),
            primitive: STRIP,
            depth_stencil: None,
            multisample: MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        self.pipelines.ring = Some(pipeline);
    }

    pub(crate) fn encode(&self, params: RenderParams) {
        if self.destroyed {
            return;
        }
        let x = params.bounds.x as f32;
        let y = params.bounds.y as f32;
        let width = params.bounds.width as f32;
        let height = params.bounds.height as f32;

        let mut pass = params.encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("cde_atlas main"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: params.target,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Load,
                    store: StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        pass.set_viewport(x, y, width, height, 0.0, 1.0);
        pass.set_scissor_rect(
            params.bounds.x,
            params.bounds.y,
            params.bounds.width,
            params.bounds.height,
        );

        // points
        if let (Some(pipeline), Some(points)) = (self.pipelines.points.as_ref(), &self.points) {
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.camera_bind_group, &[]);
            pass.set_bind_group(1, &points.bind_group, &[]);
            pass.set_vertex_buffer(0, points.positions.slice(..));
            pass.set_vertex_buffer(1, points.colors.slice(..));
            pass.set_vertex_buffer(2, points.alphas.slice(..));
            pass.set_vertex_buffer(3, points.sizes.slice(..));
            pass.draw(0..4, 0..points.count);
        }

        // hover ring
        if self.ring_visible
            && let Some(pipeline) = self.pipelines.ring.as_ref()
        {
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.camera_bind_group, &[]);
            pass.set_bind_group(1, &self.ring_bind_group, &[]);
            pass.draw(0..4, 0..1);
        }
    }

    /// Release every GPU resource. Safe to call more than once.
    pub(crate) fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        if let Some(points) = self.points.take() {
            points.destroy();
        }
        self.camera_buffer.destroy();
        self.style_buffer.destroy();
        self.ring_buffer.destroy();
        self.pipelines.points = None;
        self.pipelines.ring = None;
        self.ring_visible = false;
        self.destroyed = true;
        log::debug!("atlas renderer destroyed");
    }
}

/// Rows whose version differs from the uploaded one. Rows without an
/// uploaded version are stale.
fn stale_rows<'a>(uploaded: &'a [u64], current: &'a [u64]) -> impl Iterator<Item = usize> + 'a {
    current
        .iter()
        .enumerate()
        .filter(move |(row, version)| uploaded.get(*row) != Some(*version))
        .map(|(row, _)| row)
}

fn write_state_rows(
    queue: &Queue,
    texture: &Texture,
    (width, height): (u32, u32),
    frame: &FrameSnapshot,
    rows: impl IntoIterator<Item = usize>,
) {
    if frame.state_size != (width, height) {
        return;
    }
    let row_len = width as usize * 4;
    let mut written = 0;
    for row in rows {
        let Some(bytes) = frame.state_rows.get(row) else {
            continue;
        };
        if row as u32 >= height || bytes.len() < row_len {
            continue;
        }
        queue.write_texture(
            TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: Origin3d {
                    x: 0,
                    y: row as u32,
                    z: 0,
                },
                aspect: TextureAspect::All,
            },
            &bytes[..row_len],
            TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(1),
            },
            Extent3d {
                width,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        written += 1;
    }
    log::trace!("uploaded {written} of {height} state texture rows");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Entity;
    use crate::point_field::STATE_FLAG_PINNED;

    #[test]
    fn only_toggled_rows_are_stale() {
        let mut field = PointField::default();
        let entities: Vec<Entity> = (0..10_000u32)
            .map(|i| Entity::new(i, format!("element {i}"), "NLM", 2020, i as f64, 0.0))
            .collect();
        field.build(entities);
        let uploaded = FrameSnapshot::new(&field, Camera::default());
        assert_eq!(
            stale_rows(&[], &uploaded.state_row_versions).collect::<Vec<_>>(),
            [0, 1, 2]
        );

        assert!(field.set_pinned(crate::EntityId(9_000), true));
        let frame = FrameSnapshot::new(&field, Camera::default());
        let stale: Vec<_> =
            stale_rows(&uploaded.state_row_versions, &frame.state_row_versions).collect();
        assert_eq!(stale, [2]);
        assert_eq!(frame.state_rows[2][(9_000 - 8_192) * 4], STATE_FLAG_PINNED);
        // The earlier frame keeps its own copy of the row.
        assert_eq!(uploaded.state_rows[2][(9_000 - 8_192) * 4], 0);
    }
}
