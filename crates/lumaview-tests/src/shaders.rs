//! Shader assets loaded from disk at setup.

use lumaview_core::PixelSize;
use lumaview_gpu::{
    HeadlessBackend, RenderError, RendererConfig, ShaderAssets, ShaderStage, VideoRenderer,
};
use std::path::PathBuf;

/// Scratch directory unique to one test.
struct AssetDir(PathBuf);

impl AssetDir {
    fn new(test: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("lumaview-{}-{}", test, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    fn write(&self, name: &str, vertex: &str, fragment: &str) {
        std::fs::write(self.0.join(format!("{}.vert.wgsl", name)), vertex).unwrap();
        std::fs::write(self.0.join(format!("{}.frag.wgsl", name)), fragment).unwrap();
    }

    fn config(&self, name: &str) -> RendererConfig {
        RendererConfig {
            shader_dir: Some(self.0.clone()),
            shader_name: name.to_string(),
            capture_shader_logs: Some(true),
            ..RendererConfig::default()
        }
    }
}

impl Drop for AssetDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

#[test]
fn assets_load_by_name() {
    let dir = AssetDir::new("load");
    let builtin = ShaderAssets::builtin();
    dir.write("studio", &builtin.vertex, &builtin.fragment);

    let mut renderer = VideoRenderer::new(HeadlessBackend::new(), dir.config("studio"));
    renderer.setup(&PixelSize::new(320, 240)).unwrap();
    assert!(renderer.is_ready());
}

#[test]
fn missing_asset_fails_setup() {
    let dir = AssetDir::new("missing");
    let mut renderer = VideoRenderer::new(HeadlessBackend::new(), dir.config("absent"));
    let err = renderer.setup(&PixelSize::new(320, 240)).unwrap_err();
    assert!(matches!(err, RenderError::Asset(_)));
    assert_eq!(renderer.backend().live_targets(), 0);
}

#[test]
fn broken_vertex_stage_reports_compile_log() {
    let dir = AssetDir::new("broken");
    let builtin = ShaderAssets::builtin();
    let vertex = builtin.vertex.replace("vec2<f32>", "vec2<f33>");
    dir.write("broken", &vertex, &builtin.fragment);

    let mut renderer = VideoRenderer::new(HeadlessBackend::new(), dir.config("broken"));
    let err = renderer.setup(&PixelSize::new(320, 240)).unwrap_err();
    match err {
        RenderError::ShaderCompile { stage, log } => {
            assert_eq!(stage, ShaderStage::Vertex);
            assert!(!log.is_empty());
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let backend = renderer.backend();
    assert_eq!(backend.live_programs(), 0);
    assert_eq!(backend.live_targets(), 0);
    assert_eq!(backend.live_caches(), 0);
}

#[test]
fn stage_contract_mismatch_fails_link() {
    let dir = AssetDir::new("mismatch");
    let builtin = ShaderAssets::builtin();
    let fragment = builtin.fragment.replace("chromaThreshold", "chromaGain");
    let vertex = builtin.vertex.replace("chromaThreshold", "chromaGain");
    dir.write("mismatch", &vertex, &fragment);

    let mut renderer = VideoRenderer::new(HeadlessBackend::new(), dir.config("mismatch"));
    let err = renderer.setup(&PixelSize::new(320, 240)).unwrap_err();
    assert!(matches!(err, RenderError::ShaderLink { .. }));
    assert!(!renderer.is_ready());
}
