//! The tick driver fed by a producer thread.

use lumaview_core::{
    ChannelFrameSource, FrameId, FrameSource, PixelSize, PlaybackStatus, Size, VideoFrame,
};
use lumaview_gpu::{HeadlessBackend, RendererConfig, TickOutcome, VideoRenderer};
use std::time::Duration;

fn ready_renderer() -> VideoRenderer<HeadlessBackend> {
    let mut renderer = VideoRenderer::new(HeadlessBackend::new(), RendererConfig::default());
    renderer.setup(&PixelSize::new(640, 360)).unwrap();
    renderer.handle_status(PlaybackStatus::ReadyToPlay {
        presentation_size: Size::new(160.0, 90.0),
    });
    renderer
}

#[test]
fn producer_thread_frames_are_all_accounted_for() {
    let mut renderer = ready_renderer();
    let signal = renderer.new_data_signal();
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut source = ChannelFrameSource::new(rx);

    let producer = std::thread::spawn(move || {
        for id in 0..10u64 {
            let frame = VideoFrame::test_pattern(FrameId(id), 160, 90).with_pts(id as f64 * 0.03);
            tx.send(frame).unwrap();
            signal.raise();
            std::thread::sleep(Duration::from_millis(1));
        }
    });

    let mut time = 0.0;
    let mut presented = Vec::new();
    loop {
        if let TickOutcome::Presented(report) = renderer.tick(&mut source, time) {
            presented.push(report.frame);
        }
        if producer.is_finished() && !source.has_new_data() {
            break;
        }
        time += 1.0 / 60.0;
        std::thread::sleep(Duration::from_micros(200));
    }
    producer.join().unwrap();

    assert!(!presented.is_empty());
    assert!(presented.windows(2).all(|w| w[0] < w[1]), "frames out of order");
    assert_eq!(
        presented.len() as u64 + source.dropped_frames(),
        10,
        "every frame is either presented or dropped as late"
    );
    assert_eq!(renderer.stats().presented, presented.len() as u64);
}

#[test]
fn paused_driver_does_not_pull_frames() {
    let mut renderer = ready_renderer();
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut source = ChannelFrameSource::new(rx);

    renderer.notify_new_data();
    assert!(matches!(renderer.tick(&mut source, 0.0), TickOutcome::NoFrame));
    assert!(renderer.is_paused());

    // A future frame alone wakes the driver, which then finds nothing due.
    tx.send(VideoFrame::test_pattern(FrameId(1), 16, 16).with_pts(5.0))
        .unwrap();
    assert!(matches!(renderer.tick(&mut source, 1.0), TickOutcome::NoFrame));
    assert!(matches!(renderer.tick(&mut source, 5.0), TickOutcome::Presented(_)));
}

#[test]
fn ticks_before_setup_are_stopped() {
    let mut renderer = VideoRenderer::new(HeadlessBackend::new(), RendererConfig::default());
    let (_tx, rx) = crossbeam_channel::unbounded::<VideoFrame>();
    let mut source = ChannelFrameSource::new(rx);
    renderer.notify_new_data();
    assert!(matches!(renderer.tick(&mut source, 0.0), TickOutcome::Stopped));
}
