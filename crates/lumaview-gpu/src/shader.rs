//! Shader compilation, linking and uniform reflection.
//!
//! Both stages are WGSL. Compiling parses and validates one stage with naga;
//! linking checks the two stages against each other and against the video
//! shader contract, then resolves the uniform table. No GPU objects exist
//! until the linked program is handed to a backend, so a failed build has
//! nothing to clean up.

use crate::error::{RenderError, Result, ShaderStage};
use crate::uniforms::{
    Attribute, Uniform, UniformBlock, UniformLocation, UniformTable, BIND_GROUP,
    MAT3_COLUMN_STRIDE,
};
use naga::{
    AddressSpace, Binding, Handle, ImageClass, ImageDimension, Module, ScalarKind, Type,
    TypeInner,
};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

const BUILTIN_NAME: &str = "video";
const BUILTIN_VERTEX: &str = include_str!("../shaders/video.vert.wgsl");
const BUILTIN_FRAGMENT: &str = include_str!("../shaders/video.frag.wgsl");

/// Source text for both stages of a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderAssets {
    pub name: String,
    pub vertex: String,
    pub fragment: String,
}

impl ShaderAssets {
    /// The video shader shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            name: BUILTIN_NAME.to_string(),
            vertex: BUILTIN_VERTEX.to_string(),
            fragment: BUILTIN_FRAGMENT.to_string(),
        }
    }

    /// Load `<name>.vert.wgsl` and `<name>.frag.wgsl` from `dir`.
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let read = |suffix: &str| {
            let path = dir.join(format!("{}.{}.wgsl", name, suffix));
            std::fs::read_to_string(&path)
                .map_err(|e| RenderError::Asset(format!("{}: {}", path.display(), e)))
        };
        let assets = Self {
            name: name.to_string(),
            vertex: read("vert")?,
            fragment: read("frag")?,
        };
        info!("Loaded shader assets '{}' from {}", name, dir.display());
        Ok(assets)
    }

    /// Resolve assets by name, from `dir` when given or the built-in set otherwise.
    pub fn resolve(dir: Option<&Path>, name: &str) -> Result<Self> {
        match dir {
            Some(dir) => Self::load(dir, name),
            None if name == BUILTIN_NAME => Ok(Self::builtin()),
            None => Err(RenderError::Asset(format!(
                "no built-in shader named '{}'",
                name
            ))),
        }
    }
}

/// A parsed and validated shader stage.
#[derive(Debug)]
pub struct CompiledShader {
    stage: ShaderStage,
    module: Module,
    entry_point: String,
    source: String,
}

impl CompiledShader {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

/// Source and entry point of one stage of a linked program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSource {
    pub source: String,
    pub entry_point: String,
}

/// Two stages that passed the link checks, with their uniform table.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub vertex: StageSource,
    pub fragment: StageSource,
    pub uniforms: UniformTable,
}

/// Parse and validate one stage.
///
/// With `capture_log` the error carries the full annotated diagnostic;
/// otherwise only the one-line message is kept.
pub fn compile(stage: ShaderStage, source: &str, capture_log: bool) -> Result<CompiledShader> {
    let compile_error = |log: String| RenderError::ShaderCompile { stage, log };

    let module = naga::front::wgsl::parse_str(source).map_err(|e| {
        compile_error(if capture_log {
            e.emit_to_string(source)
        } else {
            e.message().to_string()
        })
    })?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|e| {
        compile_error(if capture_log {
            e.emit_to_string(source)
        } else {
            e.as_inner().to_string()
        })
    })?;

    let wanted = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let entry_point = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == wanted)
        .map(|ep| ep.name.clone())
        .ok_or_else(|| compile_error(format!("no @{} entry point", stage)))?;

    debug!("Compiled {} shader, entry point '{}'", stage, entry_point);

    Ok(CompiledShader {
        stage,
        module,
        entry_point,
        source: source.to_string(),
    })
}

/// A location-bound value crossing a stage boundary.
struct InterfaceVar {
    name: String,
    location: u32,
    inner: TypeInner,
}

fn collect_locations(
    module: &Module,
    name: Option<&String>,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    out: &mut Vec<InterfaceVar>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push(InterfaceVar {
            name: name.cloned().unwrap_or_default(),
            location: *location,
            inner: module.types[ty].inner.clone(),
        }),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(
                        module,
                        member.name.as_ref(),
                        member.ty,
                        member.binding.as_ref(),
                        out,
                    );
                }
            }
        }
    }
}

fn entry_inputs(shader: &CompiledShader) -> Vec<InterfaceVar> {
    let mut vars = Vec::new();
    if let Some(ep) = shader
        .module
        .entry_points
        .iter()
        .find(|ep| ep.name == shader.entry_point)
    {
        for arg in &ep.function.arguments {
            collect_locations(
                &shader.module,
                arg.name.as_ref(),
                arg.ty,
                arg.binding.as_ref(),
                &mut vars,
            );
        }
    }
    vars
}

fn entry_outputs(shader: &CompiledShader) -> Vec<InterfaceVar> {
    let mut vars = Vec::new();
    if let Some(result) = shader
        .module
        .entry_points
        .iter()
        .find(|ep| ep.name == shader.entry_point)
        .and_then(|ep| ep.function.result.as_ref())
    {
        collect_locations(
            &shader.module,
            None,
            result.ty,
            result.binding.as_ref(),
            &mut vars,
        );
    }
    vars
}

/// Kind of a bound resource, comparable across the two modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    UniformBuffer { size: u32 },
    Texture2d,
    Sampler,
    Other,
}

struct Resource<'a> {
    name: &'a str,
    binding: u32,
    kind: ResourceKind,
    module: &'a Module,
    ty: Handle<Type>,
}

fn resources(module: &Module) -> Vec<Resource<'_>> {
    module
        .global_variables
        .iter()
        .filter_map(|(_, global)| {
            let binding = global.binding.as_ref()?;
            let inner = &module.types[global.ty].inner;
            let kind = match (global.space, inner) {
                (AddressSpace::Uniform, _) => ResourceKind::UniformBuffer {
                    size: inner.size(module.to_ctx()),
                },
                (
                    AddressSpace::Handle,
                    TypeInner::Image {
                        dim: ImageDimension::D2,
                        arrayed: false,
                        class:
                            ImageClass::Sampled {
                                kind: ScalarKind::Float,
                                multi: false,
                            },
                    },
                ) => ResourceKind::Texture2d,
                (AddressSpace::Handle, TypeInner::Sampler { comparison: false }) => {
                    ResourceKind::Sampler
                }
                _ => ResourceKind::Other,
            };
            Some(Resource {
                name: global.name.as_deref().unwrap_or(""),
                binding: if binding.group == BIND_GROUP {
                    binding.binding
                } else {
                    u32::MAX
                },
                kind,
                module,
                ty: global.ty,
            })
        })
        .collect()
}

fn link_error(log: impl Into<String>) -> RenderError {
    RenderError::ShaderLink { log: log.into() }
}

fn is_f32(inner: &TypeInner) -> bool {
    *inner == TypeInner::Scalar(naga::Scalar::F32)
}

fn is_mat3(inner: &TypeInner) -> bool {
    *inner
        == TypeInner::Matrix {
            columns: naga::VectorSize::Tri,
            rows: naga::VectorSize::Tri,
            scalar: naga::Scalar::F32,
        }
}

/// Find a value uniform either as a member of a uniform struct or as a
/// standalone uniform global.
fn resolve_value(resources: &[Resource<'_>], uniform: Uniform) -> Result<(UniformLocation, u32)> {
    let name = uniform.shader_name();
    let type_ok = |inner: &TypeInner| match uniform {
        Uniform::ColorConversionMatrix => is_mat3(inner),
        _ => is_f32(inner),
    };

    for res in resources {
        let ResourceKind::UniformBuffer { size } = res.kind else {
            continue;
        };
        let inner = &res.module.types[res.ty].inner;

        if res.name == name {
            if !type_ok(inner) {
                return Err(link_error(format!("uniform '{}' has the wrong type", name)));
            }
            return Ok((
                UniformLocation::Value {
                    binding: res.binding,
                    offset: 0,
                },
                size,
            ));
        }

        if let TypeInner::Struct { members, .. } = inner {
            if let Some(member) = members.iter().find(|m| m.name.as_deref() == Some(name)) {
                if !type_ok(&res.module.types[member.ty].inner) {
                    return Err(link_error(format!("uniform '{}' has the wrong type", name)));
                }
                return Ok((
                    UniformLocation::Value {
                        binding: res.binding,
                        offset: member.offset,
                    },
                    size,
                ));
            }
        }
    }

    Err(link_error(format!("active uniform '{}' not found", name)))
}

/// Check the two stages against each other and resolve the uniform table.
///
/// The compiled stages are consumed; only the linked program survives.
pub fn link(vertex: CompiledShader, fragment: CompiledShader) -> Result<LinkedProgram> {
    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err(link_error("expected one vertex and one fragment stage"));
    }

    // Attribute slots are fixed; the vertex stage must declare exactly them.
    let inputs = entry_inputs(&vertex);
    for attribute in Attribute::ALL {
        let found = inputs
            .iter()
            .find(|var| var.name == attribute.shader_name())
            .ok_or_else(|| {
                link_error(format!(
                    "vertex attribute '{}' not declared",
                    attribute.shader_name()
                ))
            })?;
        if found.location != attribute.location() {
            return Err(link_error(format!(
                "vertex attribute '{}' must use location {}, found {}",
                attribute.shader_name(),
                attribute.location(),
                found.location
            )));
        }
    }
    if let Some(extra) = inputs
        .iter()
        .find(|var| !Attribute::ALL.iter().any(|a| a.shader_name() == var.name))
    {
        return Err(link_error(format!(
            "unexpected vertex attribute '{}' at location {}",
            extra.name, extra.location
        )));
    }

    // Every fragment input must be written by the vertex stage.
    let varyings = entry_outputs(&vertex);
    for input in entry_inputs(&fragment) {
        match varyings.iter().find(|v| v.location == input.location) {
            Some(out) if out.inner == input.inner => {}
            Some(out) => {
                return Err(link_error(format!(
                    "varying at location {} ('{}' / '{}') differs in type between stages",
                    input.location, out.name, input.name
                )))
            }
            None => {
                return Err(link_error(format!(
                    "fragment input '{}' at location {} is not written by the vertex stage",
                    input.name, input.location
                )))
            }
        }
    }

    let mut all = resources(&vertex.module);
    all.extend(resources(&fragment.module));

    let mut by_binding: HashMap<u32, (&str, ResourceKind)> = HashMap::new();
    for res in &all {
        if res.binding == u32::MAX {
            return Err(link_error(format!(
                "resource '{}' must live in bind group {}",
                res.name, BIND_GROUP
            )));
        }
        if res.kind == ResourceKind::Other {
            return Err(link_error(format!(
                "resource '{}' has an unsupported type",
                res.name
            )));
        }
        match by_binding.get(&res.binding) {
            Some(&(name, kind)) if name != res.name || kind != res.kind => {
                return Err(link_error(format!(
                    "binding {} is '{}' in one stage and '{}' in the other",
                    res.binding, name, res.name
                )));
            }
            Some(_) => {}
            None => {
                by_binding.insert(res.binding, (res.name, res.kind));
            }
        }
    }

    let texture = |uniform: Uniform| {
        all.iter()
            .find(|r| r.name == uniform.shader_name())
            .filter(|r| r.kind == ResourceKind::Texture2d)
            .map(|r| UniformLocation::Texture { binding: r.binding })
            .ok_or_else(|| {
                link_error(format!(
                    "active sampler '{}' not found or not a 2D float texture",
                    uniform.shader_name()
                ))
            })
    };

    let sampler_binding = all
        .iter()
        .find(|r| r.kind == ResourceKind::Sampler)
        .map(|r| r.binding)
        .ok_or_else(|| link_error("no filtering sampler declared"))?;

    let mut blocks: SmallVec<[UniformBlock; 2]> = SmallVec::new();
    let mut locations = [UniformLocation::Texture { binding: 0 }; 6];
    for (slot, uniform) in locations.iter_mut().zip(Uniform::ALL) {
        *slot = match uniform {
            Uniform::SamplerY | Uniform::SamplerUV => texture(uniform)?,
            _ => {
                let (location, size) = resolve_value(&all, uniform)?;
                let binding = location.binding();
                if !blocks.iter().any(|b| b.binding == binding) {
                    blocks.push(UniformBlock {
                        binding,
                        size: size.div_ceil(16) * 16,
                    });
                }
                location
            }
        };
    }

    // The matrix is written as three padded columns; make sure they fit.
    if let UniformLocation::Value { binding, offset } =
        locations[Uniform::ALL.len() - 1]
    {
        let end = offset as usize + 3 * MAT3_COLUMN_STRIDE;
        if blocks
            .iter()
            .any(|b| b.binding == binding && (b.size as usize) < end)
        {
            return Err(link_error("colorConversionMatrix overruns its uniform block"));
        }
    }

    let uniforms = UniformTable::new(locations, blocks, sampler_binding);
    debug!("Linked program, uniforms: {:?}", uniforms);

    Ok(LinkedProgram {
        vertex: StageSource {
            source: vertex.source,
            entry_point: vertex.entry_point,
        },
        fragment: StageSource {
            source: fragment.source,
            entry_point: fragment.entry_point,
        },
        uniforms,
    })
}
