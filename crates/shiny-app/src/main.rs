// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod assets;
mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use shiny_core::{init_tracing, FpsCounter};
use shiny_math::Camera;
use shiny_platform::drawable_size;
use shiny_render::{FrameView, RenderSize, Renderer};
use shiny_render_vk::VkRenderer;
use tracing::{error, info, warn};

use shiny_platform::winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    raw_window_handle::{HasDisplayHandle, HasWindowHandle},
    window::{Window, WindowId},
};

use crate::assets::{FLAT_NORMAL, WHITE};
use crate::config::{AppCfg, PresentModeCfg};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file
    #[arg(long, default_value = config::DEFAULT_PATH)]
    config: PathBuf,

    /// Start with the G-buffer debug view (toggle with F1)
    #[arg(long)]
    debug_display: bool,

    /// Force FIFO presentation
    #[arg(long)]
    fifo: bool,
}

struct App {
    cfg: AppCfg,
    // the surface must go before the window it was made from
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    camera: Camera,
    render_size: RenderSize,
    debug_display: bool,
    fps: FpsCounter,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppCfg) -> Self {
        Self {
            camera: cfg.camera.camera(),
            debug_display: cfg.render.debug_display,
            cfg,
            renderer: None,
            window: None,
            render_size: RenderSize {
                width: 0,
                height: 0,
            },
            fps: FpsCounter::default(),
            failure: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = event_loop
            .create_window(Window::default_attributes().with_title("shiny"))
            .context("create_window")?;
        self.render_size = drawable_size(window.inner_size());
        self.camera
            .set_viewport(self.render_size.width, self.render_size.height);

        let wh = window.window_handle().context("window_handle")?;
        let dh = window.display_handle().context("display_handle")?;
        let mut renderer = VkRenderer::new(&wh, &dh, self.render_size, &self.cfg.settings())?;
        self.load_scene(&mut renderer)?;

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn load_scene(&self, renderer: &mut VkRenderer) -> Result<()> {
        renderer.set_lights(&self.cfg.point_lights());
        if self.cfg.models.is_empty() {
            warn!("no [[models]] configured, drawing a ground plane");
            let white = assets::texture_or(None, WHITE)?;
            let flat = assets::texture_or(None, FLAT_NORMAL)?;
            let identity = shiny_math::glam::Mat4::IDENTITY.to_cols_array_2d();
            renderer.upload_mesh(&assets::plane(4.0), &white, &flat, identity)?;
            return Ok(());
        }

        for model in &self.cfg.models {
            let meshes = assets::load_obj(&model.obj)?;
            for mesh in &meshes {
                let diffuse_path = model.diffuse.as_deref().or(mesh.diffuse.as_deref());
                let normal_path = model.normal.as_deref().or(mesh.normal.as_deref());
                let diffuse = assets::texture_or(diffuse_path, WHITE)?;
                let normal = assets::texture_or(normal_path, FLAT_NORMAL)?;
                renderer
                    .upload_mesh(&mesh.data, &diffuse, &normal, model.model_matrix())
                    .with_context(|| format!("{}: {}", model.obj.display(), mesh.name))?;
            }
            info!("{}: {} meshes uploaded", model.obj.display(), meshes.len());
        }
        Ok(())
    }

    fn frame_view(&self) -> FrameView {
        FrameView {
            view: self.camera.view().to_cols_array_2d(),
            projection: self.camera.projection().to_cols_array_2d(),
            eye: self.camera.position.to_array(),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.failure = Some(err);
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.renderer = None;
                self.window = None;
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                self.render_size = drawable_size(new_size);
                self.camera.set_viewport(new_size.width, new_size.height);
                info!(
                    "Resized → {}x{} (paused={})",
                    self.render_size.width,
                    self.render_size.height,
                    self.render_size.is_zero()
                );
                if let Some(r) = &mut self.renderer {
                    if let Err(e) = r.resize(self.render_size) {
                        self.fail(event_loop, e.context("resize"));
                        return;
                    }
                }
                if self.render_size.is_zero() {
                    self.fps.reset();
                }
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::F1),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                self.debug_display = !self.debug_display;
                if let Some(r) = &mut self.renderer {
                    r.set_debug_display(self.debug_display);
                }
            }

            WindowEvent::RedrawRequested => {
                if self.render_size.is_zero() {
                    return;
                }
                let view = self.frame_view();
                let Some(renderer) = &mut self.renderer else {
                    return;
                };
                // a stale chain is rebuilt inside the renderer, anything
                // that gets out here ends the run
                match renderer.render(&view) {
                    Ok(()) => self.fps.frame(),
                    Err(e) => self.fail(event_loop, e.context("rendering frame")),
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.render_size.is_zero() {
            // minimised: sleep until the next resize
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }
        self.fps.tick(std::time::Instant::now());
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut cfg = AppCfg::load(&args.config);
    if args.debug_display {
        cfg.render.debug_display = true;
    }
    if args.fifo {
        cfg.render.present_mode = PresentModeCfg::Fifo;
    }

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
