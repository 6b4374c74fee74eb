//! Animated showcase for the tiamat renderer.
//!
//! A checkerboard panel sits under a rounded-corner mask whose radius
//! breathes over time, with atlas-packed sprites orbiting inside it.
//!
//! Controls: Escape quits, Space toggles vsync, M toggles masking.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use tiamat_render::prelude::*;
use tiamat_render::shader::ShaderProgram;
use tiamat_render::texture::AtlasConfig;

const SPRITE_SIZE: u32 = 24;
const SPRITE_COUNT: usize = 12;

const PALETTE: [ColorRgba; 6] = [
    ColorRgba::new(0.98, 0.45, 0.35, 1.0),
    ColorRgba::new(0.99, 0.76, 0.28, 1.0),
    ColorRgba::new(0.55, 0.85, 0.40, 1.0),
    ColorRgba::new(0.33, 0.76, 0.93, 1.0),
    ColorRgba::new(0.56, 0.50, 0.96, 1.0),
    ColorRgba::new(0.93, 0.48, 0.78, 1.0),
];

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());
    log::info!("tiamat demo (Escape quits, Space toggles vsync, M toggles masking)");

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut app = DemoApp::default();

    event_loop
        .run_app(&mut app)
        .context("winit event loop terminated with error")?;

    Ok(())
}

#[derive(Default)]
struct DemoApp {
    window: Option<Arc<Window>>,
    scene: Option<Scene>,
}

impl ApplicationHandler for DemoApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title("tiamat demo")
            .with_inner_size(LogicalSize::new(960.0, 640.0));

        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("failed to create window: {err}");
                event_loop.exit();
                return;
            }
        };

        match Scene::new(Arc::clone(&window)) {
            Ok(scene) => {
                self.scene = Some(scene);
                window.request_redraw();
                self.window = Some(window);
            }
            Err(err) => {
                log::error!("failed to initialize rendering: {err:#}");
                event_loop.exit();
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        // The scene animates, so keep frames coming.
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.clone() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::Resized(size) => {
                if let Some(scene) = &self.scene {
                    scene.device.resize(size.width, size.height);
                }
                window.request_redraw();
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                let size = window.inner_size();
                if let Some(scene) = &self.scene {
                    scene.device.resize(size.width, size.height);
                }
                window.request_redraw();
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                let Some(scene) = &mut self.scene else {
                    return;
                };
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Escape) => event_loop.exit(),
                    PhysicalKey::Code(KeyCode::Space) => scene.toggle_vsync(),
                    PhysicalKey::Code(KeyCode::KeyM) => scene.toggle_masking(),
                    _ => {}
                }
            }

            WindowEvent::RedrawRequested => {
                if let Some(scene) = &mut self.scene
                    && let Err(err) = scene.draw(&window)
                {
                    log::error!("frame failed: {err}");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }
}

struct Scene {
    device: Rc<WgpuDevice>,
    renderer: Renderer,
    shader: Rc<ShaderProgram>,
    checkerboard: Texture,
    ring: Texture,
    diamond: Texture,
    started: Instant,
    frames: u32,
    vsync: bool,
    masking: bool,
}

impl Scene {
    fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        let device = pollster::block_on(WgpuDevice::new(
            window,
            size.width.max(1),
            size.height.max(1),
            WgpuDeviceConfig::default(),
        ))
        .context("failed to initialize the GPU device")?;
        let device = Rc::new(device);

        let ctx = RenderContext::new(Rc::clone(&device) as Rc<dyn GpuDevice>);
        let renderer = Renderer::new(Rc::clone(&ctx));

        let shaders = ShaderStore::new(Rc::clone(&ctx));
        let shader = shaders
            .load_texture_shader()
            .context("failed to load the texture shader")?;

        let checkerboard = Texture::new(&ctx, "checkerboard", 64, 64, FilterMode::Nearest);
        checkerboard.set_data(TextureUpload::full(64, 64, checker_texels(64, 8)))?;

        // Both sprites share one atlas surface; their handles carry the
        // sub-region UVs.
        let mut atlas = TextureAtlas::new(
            Rc::clone(&ctx),
            AtlasConfig { surface_size: 256, ..AtlasConfig::default() },
        );
        let ring = atlas.add(SPRITE_SIZE, SPRITE_SIZE)?;
        ring.set_data(TextureUpload::full(SPRITE_SIZE, SPRITE_SIZE, ring_texels(SPRITE_SIZE)))?;
        let diamond = atlas.add(SPRITE_SIZE, SPRITE_SIZE)?;
        diamond.set_data(TextureUpload::full(
            SPRITE_SIZE,
            SPRITE_SIZE,
            diamond_texels(SPRITE_SIZE),
        ))?;

        Ok(Self {
            device,
            renderer,
            shader,
            checkerboard,
            ring,
            diamond,
            started: Instant::now(),
            frames: 0,
            vsync: true,
            masking: true,
        })
    }

    fn toggle_vsync(&mut self) {
        self.vsync = !self.vsync;
        self.device.set_vsync(self.vsync);
        log::info!("vsync {}", if self.vsync { "on" } else { "off" });
    }

    fn toggle_masking(&mut self) {
        self.masking = !self.masking;
        log::info!("masking {}", if self.masking { "on" } else { "off" });
    }

    fn draw(&mut self, window: &Window) -> Result<(), RenderError> {
        let (width, height) = self.device.surface_size();
        if width == 0 || height == 0 {
            return Ok(());
        }

        let t = self.started.elapsed().as_secs_f32();
        let frame = Vec2::new(width as f32, height as f32);

        self.renderer.reset_state(frame);
        self.renderer
            .clear(ClearInfo::new(ColorRgba::new(0.08, 0.09, 0.12, 1.0)));
        self.shader.bind()?;

        // Centered panel with breathing rounded corners.
        let panel = Rect::new(frame.x * 0.2, frame.y * 0.2, frame.x * 0.6, frame.y * 0.6);
        let radius = 36.0 + 20.0 * (t * 1.3).sin();

        if self.masking {
            self.renderer.push_masking(
                MaskingInfo {
                    screen_space_aabb: panel,
                    masking_rect: panel,
                    corner_radius: radius,
                    corner_exponent: 2.0,
                    border_thickness: 5.0,
                    blend_range: 1.0,
                },
                true,
            );
        }

        // Depth testing defaults to less-than, so later draws stamp smaller
        // depths to sit on top of earlier ones.
        let mut draw_depth = 0.9;
        self.renderer.set_draw_depth(draw_depth);
        self.checkerboard
            .draw_quad(&mut self.renderer, panel, ColorRgba::white());

        // Sprites orbit the panel center; the mask clips whatever drifts out.
        let center = Vec2::new(frame.x * 0.5, frame.y * 0.5);
        let orbit = panel.size.x.min(panel.size.y) * 0.48;
        for i in 0..SPRITE_COUNT {
            let phase = t * 0.8 + i as f32 * (std::f32::consts::TAU / SPRITE_COUNT as f32);
            let wobble = (t * 2.1 + i as f32 * 1.7).sin();
            let pos = center + Vec2::new(phase.cos(), phase.sin()) * (orbit * (0.75 + 0.25 * wobble));
            let side = 34.0 + 10.0 * wobble;
            let quad = Rect::from_origin_size(pos - Vec2::splat(side * 0.5), Vec2::splat(side));
            let sprite = if i % 2 == 0 { &self.ring } else { &self.diamond };
            draw_depth -= 0.05;
            self.renderer.set_draw_depth(draw_depth);
            sprite.draw_quad(&mut self.renderer, quad, PALETTE[i % PALETTE.len()]);
        }

        if self.masking {
            self.renderer.pop_masking();
        }

        window.pre_present_notify();
        self.renderer.finish_frame();

        self.frames += 1;
        if self.frames % 300 == 0 {
            let stats = self.renderer.context().stats().snapshot();
            log::info!(
                "frame {}: {} draw calls, {} vertices, {} state changes",
                self.frames,
                stats.draw_calls,
                stats.vertices_uploaded,
                stats.state_changes,
            );
        }

        Ok(())
    }
}

fn checker_texels(size: u32, cell: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let light = ((x / cell) + (y / cell)) % 2 == 0;
            let v = if light { 214 } else { 70 };
            data.extend_from_slice(&[v, v, v, 255]);
        }
    }
    data
}

/// White ring with a transparent center, feathered one texel on each edge.
fn ring_texels(size: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((size * size * 4) as usize);
    let center = (size as f32 - 1.0) * 0.5;
    let outer = size as f32 * 0.46;
    let inner = size as f32 * 0.26;
    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 - center;
            let dy = y as f32 - center;
            let d = (dx * dx + dy * dy).sqrt();
            let coverage = (outer - d).clamp(0.0, 1.0) * (d - inner).clamp(0.0, 1.0);
            data.extend_from_slice(&[255, 255, 255, (coverage * 255.0) as u8]);
        }
    }
    data
}

/// White diamond, feathered one texel along the edges.
fn diamond_texels(size: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((size * size * 4) as usize);
    let center = (size as f32 - 1.0) * 0.5;
    let half = size as f32 * 0.46;
    for y in 0..size {
        for x in 0..size {
            let reach = (x as f32 - center).abs() + (y as f32 - center).abs();
            let coverage = (half - reach + 1.0).clamp(0.0, 1.0);
            data.extend_from_slice(&[255, 255, 255, (coverage * 255.0) as u8]);
        }
    }
    data
}
