//! The renderer facade and its display-tick driver.

use crate::backend::{Drawable, RenderBackend};
use crate::config::RendererConfig;
use crate::error::{RenderError, Result};
use crate::presenter::{FramePresenter, PresentReport, PresentResult};
use crate::program::ShaderProgram;
use crate::shader::ShaderAssets;
use crate::surface::SurfaceManager;
use crate::uniforms::UniformValues;
use lumaview_core::{ConversionStandard, FrameSource, PlaybackStatus, SharedRenderState, VideoFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Counters over the renderer's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frames that reached the display
    pub presented: u64,
    /// Frames that failed to upload or draw
    pub skipped: u64,
    /// Ticks that found no frame and paused the driver
    pub idle_ticks: u64,
}

/// What one display tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// The driver is paused and did not look for a frame.
    Paused,
    /// No frame was due; the driver paused itself.
    NoFrame,
    Presented(PresentReport),
    /// The frame was dropped; the previous image stays on screen.
    Skipped(RenderError),
    /// Setup has not completed, or playback failed.
    Stopped,
}

/// Cross-thread "new media data is coming" signal.
///
/// Clone it into the producer; raising it un-pauses the tick driver.
#[derive(Debug, Clone, Default)]
pub struct NewDataSignal {
    flag: Arc<AtomicBool>,
}

impl NewDataSignal {
    pub fn raise(&self) {
        self.flag.store(true, Ordering::Release);
    }

    fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }
}

/// Surface, program and presenter behind one setup/tick/teardown API.
pub struct VideoRenderer<B: RenderBackend> {
    backend: B,
    config: RendererConfig,
    surface: SurfaceManager,
    program: Option<ShaderProgram>,
    presenter: FramePresenter,
    state: SharedRenderState,
    new_data: NewDataSignal,
    paused: bool,
    failed: Option<String>,
    stats: RenderStats,
}

impl<B: RenderBackend> VideoRenderer<B> {
    pub fn new(backend: B, config: RendererConfig) -> Self {
        let state = SharedRenderState::new(config.initial_state());
        Self {
            backend,
            config,
            surface: SurfaceManager::new(),
            program: None,
            presenter: FramePresenter::new(),
            state,
            new_data: NewDataSignal::default(),
            paused: true,
            failed: None,
            stats: RenderStats::default(),
        }
    }

    /// Configure the surface, build the program, create the texture cache
    /// and push the initial uniforms.
    ///
    /// Any failure tears down what was already created.
    pub fn setup(&mut self, drawable: &dyn Drawable) -> Result<()> {
        self.teardown();

        let result = self.try_setup(drawable);
        if let Err(e) = &result {
            error!("Renderer setup failed: {}", e);
            self.teardown();
        }
        result
    }

    fn try_setup(&mut self, drawable: &dyn Drawable) -> Result<()> {
        self.surface.configure(&mut self.backend, drawable)?;

        let assets =
            ShaderAssets::resolve(self.config.shader_dir.as_deref(), &self.config.shader_name)?;
        let program = ShaderProgram::build(&mut self.backend, &assets, self.config.capture_logs())?;

        // Nothing has been presented yet: start from the HD matrix.
        self.state.set_conversion(ConversionStandard::Hd);
        program.push(
            &mut self.backend,
            &UniformValues::from_state(&self.state.snapshot()),
        );
        self.program = Some(program);

        self.presenter
            .create_texture_cache(&mut self.backend, self.config.texture_cache_budget)?;

        info!("Renderer ready");
        Ok(())
    }

    /// Reallocate the render target after the drawable changed size.
    pub fn resize(&mut self, drawable: &dyn Drawable) -> Result<()> {
        self.surface.configure(&mut self.backend, drawable)?;
        self.presenter.invalidate_letterbox();
        Ok(())
    }

    /// React to a playback status change.
    pub fn handle_status(&mut self, status: PlaybackStatus) {
        match status {
            PlaybackStatus::Unknown => {}
            PlaybackStatus::ReadyToPlay { presentation_size } => {
                info!(
                    "Playback ready at {}x{}",
                    presentation_size.width, presentation_size.height
                );
                self.state.set_presentation_size(presentation_size);
                self.failed = None;
            }
            PlaybackStatus::Failed(reason) => {
                warn!("Playback failed: {}", reason);
                self.failed = Some(reason);
                self.paused = true;
            }
        }
    }

    /// Un-pause the tick driver on the next tick.
    pub fn notify_new_data(&self) {
        self.new_data.raise();
    }

    /// Handle for raising [`notify_new_data`](Self::notify_new_data) from
    /// another thread.
    pub fn new_data_signal(&self) -> NewDataSignal {
        self.new_data.clone()
    }

    /// Drive one display tick.
    ///
    /// A paused driver only checks for new-data signals; an active one
    /// asks `source` for the frame due at `target_time` and presents it.
    /// Per-frame failures become [`TickOutcome::Skipped`].
    pub fn tick(&mut self, source: &mut dyn FrameSource, target_time: f64) -> TickOutcome {
        if self.failed.is_some() || !self.is_ready() {
            return TickOutcome::Stopped;
        }

        if self.paused {
            if self.new_data.take() || source.has_new_data() {
                debug!("Resuming display ticks");
                self.paused = false;
            } else {
                return TickOutcome::Paused;
            }
        }

        let Some(frame) = source.try_get_frame(target_time) else {
            self.stats.idle_ticks += 1;
            self.paused = true;
            debug!("No frame for {:.3}s, pausing", target_time);
            return TickOutcome::NoFrame;
        };

        match self.present_frame(&frame) {
            Ok(report) => TickOutcome::Presented(report),
            Err(e) => TickOutcome::Skipped(e),
        }
    }

    /// Present a frame now, outside the tick driver.
    pub fn present_frame(&mut self, frame: &VideoFrame) -> PresentResult {
        let program = self.program.as_ref().ok_or(RenderError::NotConfigured)?;
        let mut state = self.state.snapshot();

        let result = self.presenter.present(
            &mut self.backend,
            &self.surface,
            program,
            frame,
            &mut state,
        );
        // Matrix choice is recorded even when the upload fails.
        self.state.set_conversion(state.conversion);

        match &result {
            Ok(_) => self.stats.presented += 1,
            Err(e) if e.is_frame_skip() => {
                warn!("Skipping frame {:?}: {}", frame.id, e);
                self.stats.skipped += 1;
            }
            Err(e) => {
                error!("Failed to present frame {:?}: {}", frame.id, e);
                self.stats.skipped += 1;
            }
        }
        result
    }

    /// Release every GPU object. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        self.presenter.destroy_texture_cache(&mut self.backend);
        if let Some(program) = self.program.take() {
            program.release(&mut self.backend);
        }
        self.surface.teardown(&mut self.backend);
        self.paused = true;
    }

    /// Setup completed and nothing has been torn down since.
    pub fn is_ready(&self) -> bool {
        self.program.is_some() && self.surface.is_configured() && self.presenter.has_texture_cache()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Reason playback failed, until the next ready signal.
    pub fn failure(&self) -> Option<&str> {
        self.failed.as_deref()
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Controller handle to thresholds, rotation and presentation size.
    pub fn shared_state(&self) -> SharedRenderState {
        self.state.clone()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn surface(&self) -> &SurfaceManager {
        &self.surface
    }

    pub fn program(&self) -> Option<&ShaderProgram> {
        self.program.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: RenderBackend> Drop for VideoRenderer<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}
