//! End-to-end presentation through the renderer facade.

use lumaview_core::{
    ColorConversionMatrix, ConversionStandard, FrameId, FramePlane, PixelSize, Plane,
    PlaybackStatus, Size, VideoFrame, YuvMatrix, FLIPPED_TEX_COORDS,
};
use lumaview_gpu::{
    BackendCommand, HeadlessBackend, RenderError, RendererConfig, Uniform, UniformLocation,
    VideoRenderer,
};

fn portrait_renderer() -> VideoRenderer<HeadlessBackend> {
    let mut renderer = VideoRenderer::new(HeadlessBackend::new(), RendererConfig::default());
    renderer.setup(&PixelSize::new(750, 1334)).unwrap();
    renderer.handle_status(PlaybackStatus::ReadyToPlay {
        presentation_size: Size::new(1920.0, 1080.0),
    });
    renderer
}

fn last_draw(backend: &HeadlessBackend) -> Option<&BackendCommand> {
    backend
        .commands()
        .iter()
        .rev()
        .find(|c| matches!(c, BackendCommand::DrawQuad { .. }))
}

#[test]
fn portrait_surface_is_complete_at_requested_size() {
    let renderer = portrait_renderer();
    let target = renderer.surface().target().unwrap();
    assert!(target.complete);
    assert_eq!(target.size, PixelSize::new(750, 1334));
    assert_eq!(renderer.surface().backing_size(), Some(PixelSize::new(750, 1334)));
}

#[test]
fn built_program_resolves_every_uniform() {
    let renderer = portrait_renderer();
    let program = renderer.program().unwrap();
    let table = program.uniforms();

    let mut bindings = Vec::new();
    for uniform in Uniform::ALL {
        match table.location(uniform) {
            UniformLocation::Texture { binding } => bindings.push(binding),
            UniformLocation::Value { binding, offset } => {
                assert!(table.blocks().iter().any(|b| b.binding == binding));
                assert_eq!(offset % 4, 0);
            }
        }
    }
    bindings.push(table.sampler_binding());
    bindings.sort_unstable();
    bindings.dedup();
    assert_eq!(bindings.len(), 3, "samplers and plane textures need distinct bindings");
}

#[test]
fn sd_frame_is_letterboxed_into_portrait_surface() {
    let mut renderer = portrait_renderer();
    let frame = VideoFrame::test_pattern(FrameId(1), 1920, 1080).with_matrix(YuvMatrix::from_tag("601"));

    let report = renderer.present_frame(&frame).unwrap();

    let expected_height = 0.5625 * 750.0 / 1334.0;
    assert_eq!(report.conversion, ConversionStandard::Sd);
    assert_eq!(report.quad.width, 1.0);
    assert!((report.quad.height - expected_height).abs() < 1e-5);

    let backend = renderer.backend();
    match last_draw(backend) {
        Some(BackendCommand::DrawQuad { geometry, .. }) => {
            let h = report.quad.height;
            assert_eq!(
                geometry.positions,
                [[-1.0, -h], [1.0, -h], [-1.0, h], [1.0, h]]
            );
            assert_eq!(geometry.tex_coords, FLIPPED_TEX_COORDS);
        }
        other => panic!("expected a draw, got {:?}", other),
    }

    let values = backend
        .uniform_values(renderer.program().unwrap().id())
        .unwrap();
    assert_eq!(values.color_conversion, ColorConversionMatrix::BT601);
    assert_eq!(backend.presented_frame(), Some(FrameId(1)));
    assert_eq!(
        renderer.shared_state().snapshot().conversion,
        ConversionStandard::Sd
    );
}

#[test]
fn texture_failure_keeps_previous_frame_on_screen() {
    let mut renderer = portrait_renderer();
    renderer
        .present_frame(&VideoFrame::test_pattern(FrameId(1), 1920, 1080))
        .unwrap();
    let draws_before = renderer.backend().draw_count();
    let target_before = *renderer.surface().target().unwrap();
    let program_before = renderer.program().unwrap().id();

    renderer.backend_mut().faults_mut().texture = Some(Plane::Luma);
    let err = renderer
        .present_frame(&VideoFrame::test_pattern(FrameId(2), 1920, 1080))
        .unwrap_err();

    assert!(matches!(
        err,
        RenderError::TextureUpload {
            plane: Plane::Luma,
            ..
        }
    ));
    assert_eq!(renderer.backend().draw_count(), draws_before);
    assert_eq!(renderer.backend().presented_frame(), Some(FrameId(1)));
    assert_eq!(*renderer.surface().target().unwrap(), target_before);
    assert_eq!(renderer.program().unwrap().id(), program_before);
    assert_eq!(renderer.stats().skipped, 1);

    // Recovers on the next good frame
    renderer.backend_mut().faults_mut().texture = None;
    renderer
        .present_frame(&VideoFrame::test_pattern(FrameId(3), 1920, 1080))
        .unwrap();
    assert_eq!(renderer.backend().presented_frame(), Some(FrameId(3)));
}

#[test]
fn lost_texture_cache_skips_frame() {
    let mut renderer = portrait_renderer();
    renderer.backend_mut().faults_mut().missing_cache = true;
    let err = renderer
        .present_frame(&VideoFrame::test_pattern(FrameId(1), 64, 64))
        .unwrap_err();
    assert!(matches!(err, RenderError::MissingCache));
    assert!(err.is_frame_skip());
    assert_eq!(renderer.backend().draw_count(), 0);
}

#[test]
fn uniform_locations_stable_across_presents() {
    let mut renderer = portrait_renderer();
    let before = renderer.program().unwrap().uniforms().clone();
    for id in 1..=5 {
        renderer
            .present_frame(&VideoFrame::test_pattern(FrameId(id), 320, 180))
            .unwrap();
    }
    assert_eq!(renderer.program().unwrap().uniforms(), &before);
}

#[test]
fn controller_writes_reach_next_draw() {
    let mut renderer = portrait_renderer();
    let controls = renderer.shared_state();
    controls.set_luma_threshold(0.3);
    controls.set_chroma_threshold(0.6);
    controls.set_rotation_angle(std::f32::consts::FRAC_PI_2);

    renderer
        .present_frame(&VideoFrame::test_pattern(FrameId(1), 320, 180))
        .unwrap();

    let values = renderer
        .backend()
        .uniform_values(renderer.program().unwrap().id())
        .unwrap();
    assert_eq!(values.luma_threshold, 0.3);
    assert_eq!(values.chroma_threshold, 0.6);
    assert_eq!(values.rotation_angle, std::f32::consts::FRAC_PI_2);
}

#[test]
fn zero_chroma_threshold_renders_grayscale() {
    let mut renderer = portrait_renderer();
    renderer.shared_state().set_chroma_threshold(0.0);
    renderer
        .present_frame(&VideoFrame::test_pattern(FrameId(1), 320, 180))
        .unwrap();

    // One sample per color bar
    for bar in 0..8 {
        let x = bar * 40 + 20;
        let [r, g, b] = renderer.backend().shade_presented(x, 90).unwrap();
        assert!((r - g).abs() < 1e-6 && (g - b).abs() < 1e-6, "bar {} not gray", bar);
    }
}

#[test]
fn hd_white_bar_renders_white() {
    let mut renderer = portrait_renderer();
    renderer
        .present_frame(&VideoFrame::test_pattern(FrameId(1), 320, 180))
        .unwrap();
    let rgb = renderer.backend().shade_presented(10, 10).unwrap();
    for channel in rgb {
        assert!(channel > 0.98, "white bar came out {:?}", rgb);
    }

    // Black bar on the right edge
    let rgb = renderer.backend().shade_presented(315, 10).unwrap();
    for channel in rgb {
        assert!(channel < 0.02, "black bar came out {:?}", rgb);
    }
}

#[test]
fn resize_reallocates_target_and_refits_quad() {
    let mut renderer = portrait_renderer();
    renderer.resize(&PixelSize::new(1334, 750)).unwrap();
    assert_eq!(renderer.backend().live_targets(), 1);
    assert_eq!(renderer.surface().backing_size(), Some(PixelSize::new(1334, 750)));

    let report = renderer
        .present_frame(&VideoFrame::test_pattern(FrameId(1), 1920, 1080))
        .unwrap();
    assert_eq!(report.quad.height, 1.0);
    assert!((report.quad.width - 1.0).abs() < 1e-3);
}

#[test]
fn odd_sized_frame_uploads_rounded_chroma() {
    let mut renderer = portrait_renderer();
    renderer
        .present_frame(&VideoFrame::test_pattern(FrameId(1), 641, 361))
        .unwrap();
    let chroma = renderer.backend().commands().iter().find_map(|c| match c {
        BackendCommand::CreatePlaneTexture {
            plane: Plane::Chroma,
            width,
            height,
            ..
        } => Some((*width, *height)),
        _ => None,
    });
    assert_eq!(chroma, Some((320, 180)));
}

fn chroma_upload_size(backend: &HeadlessBackend, frame: FrameId) -> Option<(u32, u32)> {
    backend.commands().iter().find_map(|c| match c {
        BackendCommand::CreatePlaneTexture {
            plane: Plane::Chroma,
            frame: id,
            width,
            height,
            ..
        } if *id == frame => Some((*width, *height)),
        _ => None,
    })
}

#[test]
fn decoder_frame_with_rounded_up_chroma_presents() {
    let mut renderer = portrait_renderer();
    let frame = VideoFrame::from_planes(
        FrameId(1),
        5,
        3,
        FramePlane::new(5, 3, 1),
        FramePlane::new(3, 2, 2),
    )
    .unwrap();

    renderer.present_frame(&frame).unwrap();
    assert_eq!(renderer.backend().presented_frame(), Some(FrameId(1)));
    assert_eq!(chroma_upload_size(renderer.backend(), FrameId(1)), Some((2, 1)));
}

#[test]
fn padded_decoder_planes_upload_only_visible_samples() {
    let mut renderer = portrait_renderer();

    let mut luma = FramePlane::new(72, 32, 1);
    luma.data.fill(235);
    // Neutral chroma for the visible 32 samples, saturated padding after
    let mut chroma = FramePlane::new(40, 16, 2);
    for y in 0..16 {
        let row = chroma.row_mut(y);
        row[..64].fill(128);
        for pair in row[64..].chunks_mut(2) {
            pair.copy_from_slice(&[255, 0]);
        }
    }
    let frame = VideoFrame::from_planes(FrameId(7), 64, 32, luma, chroma).unwrap();

    renderer.present_frame(&frame).unwrap();
    assert_eq!(chroma_upload_size(renderer.backend(), FrameId(7)), Some((32, 16)));

    for (x, y) in [(0, 0), (20, 10), (63, 31)] {
        let rgb = renderer.backend().shade_presented(x, y).unwrap();
        for channel in rgb {
            assert!(channel > 0.98, "pixel ({}, {}) came out {:?}", x, y, rgb);
        }
    }
}
