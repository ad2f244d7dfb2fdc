use crate::keys::{click_response, key_response};
use anyhow::{Context, Result, anyhow};
use cogtask_core::Response;
use cogtask_experiment::{RunPlan, Session, SessionEvent, SessionStatus};
use cogtask_export::{BackgroundSink, Uploader};
use cogtask_render::{SkiaRenderer, load_font};
use cogtask_timing::{HighPrecisionTimer, Timer};
use pixels::{Pixels, SurfaceTexture};
use rand::rngs::StdRng;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowId},
};

type RunSession = Session<HighPrecisionTimer, StdRng, SkiaRenderer, BackgroundSink<Uploader>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    Fullscreen,
    Windowed,
}

/// Parts needed to start the session once the window size is known.
struct Pending {
    plan: RunPlan,
    rng: StdRng,
    sink: BackgroundSink<Uploader>,
}

pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    pending: Option<Pending>,
    session: Option<RunSession>,
    font: Option<ab_glyph::FontVec>,
    mode: WindowMode,
    current_size: Option<PhysicalSize<u32>>,
    scale_factor: f64,
    refresh_rate: Option<f64>,

    should_exit: bool,
    exited: bool,
}

impl App {
    pub fn new(plan: RunPlan, rng: StdRng, font: Option<&Path>, mode: WindowMode) -> Result<Self> {
        let uploader =
            Uploader::from_output(&plan.config.output).context("building the uploader")?;
        let sink = BackgroundSink::spawn(uploader).context("starting the save worker")?;
        let font = match font {
            Some(path) => Some(load_font(path)?),
            None => {
                warn!("no --font given, text screens will stay blank");
                None
            }
        };

        Ok(Self {
            window: None,
            pixels: None,
            pending: Some(Pending { plan, rng, sink }),
            session: None,
            font,
            mode,
            current_size: None,
            scale_factor: 1.0,
            refresh_rate: None,
            should_exit: false,
            exited: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        println!("=== COGNITIVE EXPERIMENT ===");
        println!("Platform: {}", std::env::consts::OS);
        println!("Architecture: {}", std::env::consts::ARCH);
        if let Some(p) = &self.pending {
            let keys: Vec<String> = p.plan.mapping.keys.iter().map(|k| k.to_string()).collect();
            println!("Experiment: {}", p.plan.config.experiment_name);
            println!("Participant: {}", p.plan.participant.id);
            println!("Response keys: {}", keys.join(", "));
            println!("Press {} to abort.\n", p.plan.config.responses.abort);
        }

        let result = event_loop.run_app(&mut self);
        // Dropping the session waits for uploads still in flight.
        if let Some(session) = self.session.take() {
            println!("Finishing data upload...");
            drop(session);
        }
        result.map_err(Into::into)
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("No monitor available"))?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let mut window_attributes = Window::default_attributes().with_title("Cogtask");
        window_attributes = match self.mode {
            WindowMode::Fullscreen => window_attributes
                .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor.clone()))))
                .with_resizable(false),
            WindowMode::Windowed => {
                window_attributes.with_inner_size(PhysicalSize::new(1280u32, 720u32))
            }
        };

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let physical_size = window.inner_size();
        let scale_factor = window.scale_factor();

        self.current_size = Some(physical_size);
        self.scale_factor = scale_factor;

        println!("Display Configuration:");
        println!(
            "  Physical size: {}×{}",
            physical_size.width, physical_size.height
        );
        println!("  Scale factor: {:.2}", scale_factor);
        if let Some(refresh_rate) = self.refresh_rate {
            println!("  Refresh rate: {:.1} Hz", refresh_rate);
        }

        let surface_texture =
            SurfaceTexture::new(physical_size.width, physical_size.height, window.clone());
        self.pixels = Some(Pixels::new(
            physical_size.width,
            physical_size.height,
            surface_texture,
        )?);

        let mut renderer = SkiaRenderer::new(physical_size.width, physical_size.height)?;
        if let Some(font) = self.font.take() {
            renderer = renderer.with_font(font);
        }

        let Pending { plan, rng, sink } = self
            .pending
            .take()
            .ok_or_else(|| anyhow!("session already started"))?;
        let mut session = Session::new(plan, HighPrecisionTimer::new(), rng, renderer, sink);
        let events = session.start();
        self.session = Some(session);
        self.report(&events);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);

        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let (Some(pix), Some(session)) = (self.pixels.as_mut(), self.session.as_mut()) else {
            return Ok(());
        };
        let events = session.update();

        let renderer = session.display_mut();
        if renderer.needs_present() {
            let stats = renderer.present(pix.frame_mut());
            let timer = HighPrecisionTimer::new();
            let now = timer.now();
            pix.render()?;
            debug!(
                draw_ms = stats.draw.as_secs_f64() * 1e3,
                copy_ms = stats.copy.as_secs_f64() * 1e3,
                render_ms = timer.elapsed(now).as_secs_f64() * 1e3,
                dirty = stats.dirty_count,
                "frame"
            );
        }

        self.report(&events);
        Ok(())
    }

    fn handle_input(&mut self, response: Response) {
        if let Some(session) = self.session.as_mut() {
            let events = session.handle_input(response);
            self.report(&events);
        }
    }

    fn report(&mut self, events: &[SessionEvent]) {
        for event in events {
            match event {
                SessionEvent::BlockCompleted(summary) => {
                    println!(
                        "Block {} done: mean RT {}, error rate {}",
                        summary.block,
                        summary.mean_rt_text(),
                        summary.error_rate_text()
                    );
                }
                SessionEvent::Finished | SessionEvent::Aborted => self.should_exit = true,
                _ => {}
            }
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.current_size = Some(new_size);
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                error!(error = %e, "failed to resize surface");
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                error!(error = %e, "failed to resize buffer");
            }
        }
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.display_mut().resize(new_size.width, new_size.height) {
                error!(error = %e, "failed to resize renderer");
            }
        }
        info!(width = new_size.width, height = new_size.height, "display resized");
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        if self.exited {
            return;
        }
        self.exited = true;
        if let Some(session) = self.session.as_mut() {
            if !session.is_over() {
                session.abort();
            }
        }
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }

        match self.session.as_ref().map(|s| s.status()) {
            Some(SessionStatus::Finished) => {
                println!("\nExperiment completed.");
                println!("Results saved. Thank you!");
            }
            Some(_) => println!("\nExperiment aborted. Partial results saved."),
            None => {}
        }

        self.should_exit = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                error!(error = %e, "failed to create window and surface");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.cleanup_and_exit(event_loop),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    error!(error = %e, "render failed");
                    self.cleanup_and_exit(event_loop);
                    return;
                }
                if let Some(win) = &self.window {
                    win.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state.is_pressed() && !event.repeat =>
            {
                if let Some(response) = key_response(event.physical_key) {
                    self.handle_input(response);
                }
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button,
                ..
            } => {
                if let Some(response) = click_response(button) {
                    self.handle_input(response);
                }
            }
            WindowEvent::Resized(sz) => self.handle_resize(sz),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = scale_factor;
                if let Some(size) = self.window.as_ref().map(|w| w.inner_size()) {
                    self.handle_resize(size);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            self.cleanup_and_exit(event_loop);
        }
    }
}
