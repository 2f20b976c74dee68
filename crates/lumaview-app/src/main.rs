//! Lumaview - YUV video renderer demo
//!
//! Opens a window and plays scrolling NV12 color bars produced on a
//! background thread through the GPU renderer.
//!
//! Keys: Up/Down luma threshold, Left/Right chroma threshold, R rotate,
//! M toggle BT.601/BT.709 tagging, Esc quit.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender};
use lumaview_core::{
    ChannelFrameSource, FrameId, PixelSize, PlaybackStatus, SharedRenderState, Size, VideoFrame,
    YuvMatrix,
};
use lumaview_gpu::{
    Drawable, NewDataSignal, RendererConfig, TickOutcome, VideoRenderer, WgpuBackend,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

const STREAM_WIDTH: u32 = 1920;
const STREAM_HEIGHT: u32 = 1080;
const FRAME_INTERVAL: Duration = Duration::from_millis(30);
const THRESHOLD_STEP: f32 = 0.05;

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Lumaview starting...");

    // Optional config path on the command line
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => RendererConfig::load_from_file(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RendererConfig::default(),
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = LumaviewApp::new(config);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// The window as a renderer drawable.
struct WindowDrawable<'a>(&'a Window);

impl Drawable for WindowDrawable<'_> {
    fn backing_size(&self) -> PixelSize {
        let size = self.0.inner_size();
        PixelSize::new(size.width, size.height)
    }

    fn bounds(&self) -> Size {
        let size = self.0.inner_size().to_logical::<f32>(self.0.scale_factor());
        Size::new(size.width, size.height)
    }
}

/// Background thread standing in for a decoder.
struct Producer {
    stop: Arc<AtomicBool>,
    tag_601: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Producer {
    fn spawn(tx: Sender<VideoFrame>, signal: NewDataSignal, clock: Instant) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let tag_601 = Arc::new(AtomicBool::new(false));

        let handle = {
            let stop = stop.clone();
            let tag_601 = tag_601.clone();
            std::thread::spawn(move || {
                let mut id = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    id += 1;
                    let matrix = if tag_601.load(Ordering::Relaxed) {
                        YuvMatrix::Bt601
                    } else {
                        YuvMatrix::Bt709
                    };
                    let shift = (id as u32 * 8) % STREAM_WIDTH;
                    let frame = VideoFrame::test_pattern_shifted(
                        FrameId(id),
                        STREAM_WIDTH,
                        STREAM_HEIGHT,
                        shift,
                    )
                    .with_matrix(matrix)
                    .with_pts(clock.elapsed().as_secs_f64());

                    // Bounded wait keeps the stop flag responsive.
                    match tx.send_timeout(frame, FRAME_INTERVAL) {
                        Ok(()) => signal.raise(),
                        Err(SendTimeoutError::Timeout(_)) => continue,
                        Err(SendTimeoutError::Disconnected(_)) => break,
                    }
                    std::thread::sleep(FRAME_INTERVAL);
                }
                debug!("Producer stopped after {} frames", id);
            })
        };

        Self {
            stop,
            tag_601,
            handle: Some(handle),
        }
    }

    fn toggle_matrix(&self) -> bool {
        !self.tag_601.fetch_xor(true, Ordering::Relaxed)
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct LumaviewApp {
    config: RendererConfig,
    clock: Instant,
    window: Option<Arc<Window>>,
    renderer: Option<VideoRenderer<WgpuBackend>>,
    controls: Option<SharedRenderState>,
    source: ChannelFrameSource,
    sender: Option<Sender<VideoFrame>>,
    producer: Option<Producer>,
    error: Option<anyhow::Error>,
}

impl LumaviewApp {
    fn new(config: RendererConfig) -> Self {
        // A few frames of slack; the producer drops frames when the renderer lags.
        let (tx, rx): (Sender<VideoFrame>, Receiver<VideoFrame>) =
            crossbeam_channel::bounded(4);
        Self {
            config,
            clock: Instant::now(),
            window: None,
            renderer: None,
            controls: None,
            source: ChannelFrameSource::new(rx),
            sender: Some(tx),
            producer: None,
            error: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Arc::new(
            event_loop.create_window(
                Window::default_attributes()
                    .with_title("Lumaview")
                    .with_inner_size(LogicalSize::new(1280.0, 720.0)),
            )?,
        );

        let backend = WgpuBackend::new(window.clone(), self.config.vsync)?;
        let mut renderer = VideoRenderer::new(backend, self.config.clone());
        renderer.setup(&WindowDrawable(&window))?;
        renderer.handle_status(PlaybackStatus::ReadyToPlay {
            presentation_size: Size::new(STREAM_WIDTH as f32, STREAM_HEIGHT as f32),
        });

        if let Some(tx) = self.sender.take() {
            self.producer = Some(Producer::spawn(tx, renderer.new_data_signal(), self.clock));
        }
        self.controls = Some(renderer.shared_state());
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{:#}", e);
        self.error = Some(e);
        event_loop.exit();
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: &Key) {
        let Some(controls) = &self.controls else {
            return;
        };
        let state = controls.snapshot();
        let step = |value: f32, delta: f32| (value + delta).clamp(0.0, 1.0);

        match key {
            Key::Named(NamedKey::Escape) => event_loop.exit(),
            Key::Named(NamedKey::ArrowUp) => {
                controls.set_luma_threshold(step(state.luma_threshold, THRESHOLD_STEP))
            }
            Key::Named(NamedKey::ArrowDown) => {
                controls.set_luma_threshold(step(state.luma_threshold, -THRESHOLD_STEP))
            }
            Key::Named(NamedKey::ArrowRight) => {
                controls.set_chroma_threshold(step(state.chroma_threshold, THRESHOLD_STEP))
            }
            Key::Named(NamedKey::ArrowLeft) => {
                controls.set_chroma_threshold(step(state.chroma_threshold, -THRESHOLD_STEP))
            }
            Key::Character(c) if c.eq_ignore_ascii_case("r") => {
                let angle = (state.rotation_angle + std::f32::consts::FRAC_PI_2)
                    % std::f32::consts::TAU;
                controls.set_rotation_angle(angle);
            }
            Key::Character(c) if c.eq_ignore_ascii_case("m") => {
                if let Some(producer) = &self.producer {
                    let sd = producer.toggle_matrix();
                    info!("Tagging frames as {}", if sd { "BT.601" } else { "BT.709" });
                }
                return;
            }
            _ => return,
        }

        let state = controls.snapshot();
        info!(
            "luma {:.2}, chroma {:.2}, rotation {:.2} rad",
            state.luma_threshold, state.chroma_threshold, state.rotation_angle
        );
    }

    fn redraw(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let now = self.clock.elapsed().as_secs_f64();
        match renderer.tick(&mut self.source, now) {
            TickOutcome::Presented(report) => {
                debug!("Frame {:?} via {:?}", report.frame, report.conversion)
            }
            TickOutcome::Skipped(e) if !e.is_frame_skip() => warn!("Render error: {}", e),
            _ => {}
        }
    }
}

impl ApplicationHandler for LumaviewApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(_) => {
                if let (Some(window), Some(renderer)) = (&self.window, self.renderer.as_mut()) {
                    if let Err(e) = renderer.resize(&WindowDrawable(window)) {
                        // Minimized windows report a zero size; wait for the next resize.
                        warn!("Resize failed: {}", e);
                    }
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => self.handle_key(event_loop, &logical_key),
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.as_ref() {
            let stats = renderer.stats();
            info!(
                "Presented {}, skipped {}, dropped {}",
                stats.presented,
                stats.skipped,
                self.source.dropped_frames()
            );
        }
        // Stop the producer before the renderer releases the surface.
        self.producer = None;
        self.renderer = None;
    }
}
