//! The installed video shader program.

use crate::backend::{ProgramId, RenderBackend, SamplerUnit};
use crate::error::{Result, ShaderStage};
use crate::shader::{self, ShaderAssets};
use crate::uniforms::{UniformTable, UniformValues};
use lumaview_core::Plane;
use tracing::info;

/// A linked program and the uniform locations resolved for it.
///
/// Locations are resolved once at build time and owned by the instance.
#[derive(Debug)]
pub struct ShaderProgram {
    id: ProgramId,
    uniforms: UniformTable,
}

impl ShaderProgram {
    /// Compile, link and install both stages, then bind the plane samplers
    /// to their texture units.
    ///
    /// Compile and link run before anything reaches the backend, so a
    /// failure leaves no program behind.
    pub fn build<B: RenderBackend + ?Sized>(
        backend: &mut B,
        assets: &ShaderAssets,
        capture_log: bool,
    ) -> Result<Self> {
        let vertex = shader::compile(ShaderStage::Vertex, &assets.vertex, capture_log)?;
        let fragment = shader::compile(ShaderStage::Fragment, &assets.fragment, capture_log)?;
        let linked = shader::link(vertex, fragment)?;

        let id = backend.create_program(&linked)?;
        let uniforms = linked.uniforms;

        let units = Plane::ALL.map(|plane| SamplerUnit {
            plane,
            unit: plane.texture_unit(),
            binding: uniforms.texture_binding(plane),
        });
        backend.set_sampler_units(id, &units);

        info!("Built shader program '{}' as {:?}", assets.name, id);
        Ok(Self { id, uniforms })
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn uniforms(&self) -> &UniformTable {
        &self.uniforms
    }

    /// Pack and upload uniform values.
    pub fn push<B: RenderBackend + ?Sized>(&self, backend: &mut B, values: &UniformValues) {
        let blocks = self.uniforms.pack(values);
        backend.set_uniforms(self.id, &blocks);
    }

    /// Delete the program from the backend.
    pub fn release<B: RenderBackend + ?Sized>(self, backend: &mut B) {
        backend.delete_program(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::headless::{BackendCommand, HeadlessBackend};
    use crate::uniforms::Uniform;
    use lumaview_core::RenderState;

    #[test]
    fn test_build_binds_sampler_units_once() {
        let mut backend = HeadlessBackend::new();
        let program = ShaderProgram::build(&mut backend, &ShaderAssets::builtin(), true).unwrap();

        let units = backend.sampler_units(program.id()).unwrap();
        assert_eq!(units[0].plane, Plane::Luma);
        assert_eq!(units[0].unit, 0);
        assert_eq!(units[0].binding, program.uniforms().texture_binding(Plane::Luma));
        assert_eq!(units[1].unit, 1);

        let set_units = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, BackendCommand::SetSamplerUnits { .. }))
            .count();
        assert_eq!(set_units, 1);
    }

    #[test]
    fn test_compile_failure_creates_nothing() {
        let mut backend = HeadlessBackend::new();
        let mut assets = ShaderAssets::builtin();
        assets.fragment.push_str("\nthis is not wgsl");

        let err = ShaderProgram::build(&mut backend, &assets, false).unwrap_err();
        assert!(matches!(
            err,
            RenderError::ShaderCompile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
        assert_eq!(backend.live_programs(), 0);
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn test_backend_rejection_is_a_link_error() {
        let mut backend = HeadlessBackend::new();
        backend.faults_mut().program = Some("pipeline rejected".to_string());
        let err = ShaderProgram::build(&mut backend, &ShaderAssets::builtin(), true).unwrap_err();
        assert!(matches!(err, RenderError::ShaderLink { .. }));
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn test_push_and_release() {
        let mut backend = HeadlessBackend::new();
        let program = ShaderProgram::build(&mut backend, &ShaderAssets::builtin(), true).unwrap();
        let before = program.uniforms().location(Uniform::ColorConversionMatrix);

        let state = RenderState {
            luma_threshold: 0.5,
            ..RenderState::default()
        };
        program.push(&mut backend, &UniformValues::from_state(&state));
        assert_eq!(
            backend.uniform_values(program.id()).unwrap().luma_threshold,
            0.5
        );
        assert_eq!(program.uniforms().location(Uniform::ColorConversionMatrix), before);

        program.release(&mut backend);
        assert_eq!(backend.live_programs(), 0);
    }
}
