//! Shader property getter generation
//!
//! Every generator is a pure function of a property description and its
//! [`PropertyLocation`], so the addresses in the emitted code are exactly the
//! ones the CPU side computes with [`PropertyLocation::vec4_index`] and
//! [`PropertyLocation::scalar_index`].
//!
//! Generated getters share one signature per language:
//!
//! ```text
//! GLSL  <type> get_<semantic>(float _instanceId, int idxOfArray)
//! WGSL  fn get_<semantic>(instanceId: u32, idxOfArray: u32) -> <type>
//! ```

use std::fmt::Write;

use crate::global_data::ShaderSemanticsInfo;
use crate::memory::{ComponentType, CompositionType, PropertyLocation};

use super::data_texture::DataTextureLayout;

/// Name of the uniform carrying a property in the uniform strategy
pub fn uniform_name(info: &ShaderSemanticsInfo) -> String {
    format!("u_{}", info.semantic)
}

fn is_integer_scalar(info: &ShaderSemanticsInfo) -> bool {
    info.composition_type.element_type() == CompositionType::Scalar
        && matches!(info.component_type, ComponentType::Int | ComponentType::UnsignedInt)
}

fn glsl_return_type(info: &ShaderSemanticsInfo) -> &'static str {
    if is_integer_scalar(info) {
        "int"
    } else {
        info.composition_type.glsl_type()
    }
}

fn wgsl_return_type(info: &ShaderSemanticsInfo) -> &'static str {
    if is_integer_scalar(info) {
        "i32"
    } else {
        info.composition_type.wgsl_type()
    }
}

/// Fetch call for one entry given the index variable in scope
fn fetch_expression(composition: CompositionType) -> &'static str {
    match composition {
        CompositionType::ScalarArray => "fetchScalarNo16BytesAligned(scalar_idx)",
        CompositionType::Vec2Array => "fetchVec2No16BytesAligned(scalar_idx)",
        CompositionType::Vec3Array => "fetchVec3No16BytesAligned(scalar_idx)",
        other => match other.element_type() {
            CompositionType::Scalar => "fetchElement(vec4_idx).x",
            CompositionType::Vec2 => "fetchElement(vec4_idx).xy",
            CompositionType::Vec3 => "fetchElement(vec4_idx).xyz",
            CompositionType::Mat2 => "fetchMat2(vec4_idx)",
            CompositionType::Mat3 => "fetchMat3(vec4_idx)",
            CompositionType::Mat4 => "fetchMat4(vec4_idx)",
            _ => "fetchElement(vec4_idx)",
        },
    }
}

/// Right-hand side of the index computation for one chunk
///
/// `suffix` is the integer literal suffix (`""` for GLSL, `"u"` for WGSL).
fn index_expression(
    location: &PropertyLocation,
    vec4_offset: usize,
    local: &str,
    suffix: &str,
) -> String {
    let layout = &location.layout;
    let vpi = layout.vec4_per_instance();
    if layout.is_packed() {
        format!(
            "{}{suffix} + {}{suffix} * {local} + {}{suffix} * idxOfArray",
            vec4_offset * 4,
            4 * vpi,
            layout.number_of_components()
        )
    } else if layout.composition_type.is_array() {
        format!(
            "{vec4_offset}{suffix} + {vpi}{suffix} * {local} + {}{suffix} * idxOfArray",
            layout.vec4_size()
        )
    } else {
        format!("{vec4_offset}{suffix} + {vpi}{suffix} * {local}")
    }
}

fn index_variable(location: &PropertyLocation) -> &'static str {
    if location.layout.is_packed() {
        "scalar_idx"
    } else {
        "vec4_idx"
    }
}

/// GLSL getter reading a property from the data texture
///
/// A location with several chunks becomes an if/else chain over the
/// instance id ranges.
pub fn glsl_data_texture_property(
    info: &ShaderSemanticsInfo,
    location: &PropertyLocation,
    is_webgl2: bool,
) -> String {
    let return_type = glsl_return_type(info);
    let variable = index_variable(location);
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{return_type} get_{}(float _instanceId, int idxOfArray) {{",
        info.semantic
    );
    if is_webgl2 {
        out.push_str("  int instanceId = int(_instanceId);\n");
    } else {
        out.push_str("  int instanceId = int(_instanceId + 0.5);\n");
    }

    match location.chunks.as_slice() {
        [chunk] => {
            let _ = writeln!(
                out,
                "  int {variable} = {};",
                index_expression(location, chunk.vec4_offset, "instanceId", "")
            );
        }
        chunks => {
            let _ = writeln!(out, "  int {variable} = 0;");
            let mut first_id = 0;
            for (i, chunk) in chunks.iter().enumerate() {
                let keyword = if i == 0 { "if" } else { "} else if" };
                let end_id = first_id + chunk.instance_count;
                let local = format!("(instanceId - {first_id})");
                let _ = writeln!(out, "  {keyword} (instanceId < {end_id}) {{");
                let _ = writeln!(
                    out,
                    "    {variable} = {};",
                    index_expression(location, chunk.vec4_offset, &local, "")
                );
                first_id = end_id;
            }
            if !chunks.is_empty() {
                out.push_str("  }\n");
            }
        }
    }

    let fetch = fetch_expression(location.layout.composition_type);
    if is_integer_scalar(info) {
        let _ = writeln!(out, "  return int({fetch});");
    } else {
        let _ = writeln!(out, "  return {fetch};");
    }
    out.push_str("}\n");
    out
}

/// GLSL `uniform` declaration and getter for the uniform strategy
///
/// Also used by the other GLSL dialects for per-draw properties.
pub fn glsl_uniform_property(info: &ShaderSemanticsInfo, array_length: usize) -> String {
    let return_type = glsl_return_type(info);
    let name = uniform_name(info);
    let (declaration, read) = if info.composition_type.is_array() {
        (format!("{name}[{array_length}]"), format!("{name}[idxOfArray]"))
    } else {
        (name.clone(), name)
    };
    format!(
        "uniform {return_type} {declaration};\n\
         {return_type} get_{}(float instanceId, int idxOfArray) {{\n  return {read};\n}}\n",
        info.semantic
    )
}

/// WGSL uniform binding and getter for a per-draw property
///
/// Scalars are packed four to a `vec4` to satisfy the 16 byte array stride
/// of the uniform address space.
pub fn wgsl_uniform_property(info: &ShaderSemanticsInfo, array_length: usize) -> String {
    let return_type = wgsl_return_type(info);
    let name = uniform_name(info);
    let semantic = &info.semantic;
    let getter = format!("fn get_{semantic}(instanceId: u32, idxOfArray: u32) -> {return_type}");
    if !info.composition_type.is_array() {
        return format!(
            "@group(1) @binding(0) var<uniform> {name}: {return_type};\n\
             {getter} {{\n  return {name};\n}}\n"
        );
    }
    if info.composition_type.element_type() == CompositionType::Scalar {
        let packed = array_length.div_ceil(4).max(1);
        format!(
            "@group(1) @binding(0) var<uniform> {name}: array<vec4<{return_type}>, {packed}>;\n\
             {getter} {{\n  return {name}[idxOfArray / 4u][idxOfArray % 4u];\n}}\n"
        )
    } else {
        format!(
            "@group(1) @binding(0) var<uniform> {name}: array<{return_type}, {array_length}>;\n\
             {getter} {{\n  return {name}[idxOfArray];\n}}\n"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataTextureConfig;
    use crate::global_data::ShaderSemantic;
    use crate::memory::{LocationChunk, PropertyLayout};

    fn info(semantic: ShaderSemantic, composition: CompositionType) -> ShaderSemanticsInfo {
        ShaderSemanticsInfo::new(semantic, composition)
    }

    #[test]
    fn test_mat4_getter_bakes_offset_and_stride() {
        let layout = PropertyLayout::new(CompositionType::Mat4, 1);
        let location = PropertyLocation::single(layout, 10, 8);
        let code = glsl_data_texture_property(
            &info(ShaderSemantic::WORLD_MATRIX, CompositionType::Mat4),
            &location,
            true,
        );
        assert!(code.starts_with("mat4 get_worldMatrix(float _instanceId, int idxOfArray) {"));
        assert!(code.contains("int vec4_idx = 10 + 4 * instanceId;"));
        assert!(code.contains("return fetchMat4(vec4_idx);"));
    }

    #[test]
    fn test_packed_array_getter_uses_scalar_index() {
        let layout = PropertyLayout::new(CompositionType::Vec3Array, 4);
        let location = PropertyLocation::single(layout, 5, 1);
        let code = glsl_data_texture_property(
            &info(ShaderSemantic::LIGHT_POSITION, CompositionType::Vec3Array),
            &location,
            true,
        );
        assert!(code.contains("int scalar_idx = 20 + 12 * instanceId + 3 * idxOfArray;"));
        assert!(code.contains("fetchVec3No16BytesAligned(scalar_idx)"));
    }

    #[test]
    fn test_multi_chunk_getter_branches() {
        let layout = PropertyLayout::new(CompositionType::Vec4, 1);
        let location = PropertyLocation::from_chunks(
            layout,
            vec![
                LocationChunk {
                    vec4_offset: 0,
                    instance_count: 2,
                },
                LocationChunk {
                    vec4_offset: 100,
                    instance_count: 2,
                },
            ],
        );
        let code = glsl_data_texture_property(
            &info(ShaderSemantic::BASE_COLOR_FACTOR, CompositionType::Vec4),
            &location,
            false,
        );
        assert!(code.contains("if (instanceId < 2) {"));
        assert!(code.contains("} else if (instanceId < 4) {"));
        assert!(code.contains("vec4_idx = 100 + 1 * (instanceId - 2);"));
        assert!(code.contains("int(_instanceId + 0.5)"));
    }

    #[test]
    fn test_integer_scalar_is_cast() {
        let layout = PropertyLayout::new(CompositionType::Scalar, 1);
        let location = PropertyLocation::single(layout, 3, 1);
        let light_number = info(ShaderSemantic::LIGHT_NUMBER, CompositionType::Scalar)
            .with_component_type(ComponentType::Int);
        let code = glsl_data_texture_property(&light_number, &location, true);
        assert!(code.starts_with("int get_lightNumber"));
        assert!(code.contains("return int(fetchElement(vec4_idx).x);"));

        let wgsl = wgsl_storage_property(&light_number, &location);
        assert!(wgsl.contains("-> i32"));
        assert!(wgsl.contains("let vec4_idx = 3u + 1u * instanceId;"));
    }

    #[test]
    fn test_uniform_property_declares_uniform() {
        let code = glsl_uniform_property(
            &info(ShaderSemantic::LIGHT_POSITION, CompositionType::Vec3Array),
            4,
        );
        assert!(code.contains("uniform vec3 u_lightPosition[4];"));
        assert!(code.contains("return u_lightPosition[idxOfArray];"));

        let single = glsl_uniform_property(&info(ShaderSemantic::TIME, CompositionType::Scalar), 1);
        assert!(single.contains("uniform float u_time;"));
    }

    #[test]
    fn test_per_draw_int_array_getters() {
        let sids = info(ShaderSemantic::CURRENT_COMPONENT_SIDS, CompositionType::ScalarArray)
            .with_component_type(ComponentType::Int)
            .per_draw();
        let glsl = glsl_uniform_property(&sids, 7);
        assert!(glsl.contains("uniform int u_currentComponentSIDs[7];"));
        assert!(glsl.contains("int get_currentComponentSIDs(float instanceId, int idxOfArray)"));
        assert!(!glsl.contains("fetch"));

        let wgsl = wgsl_uniform_property(&sids, 7);
        assert!(wgsl.contains("u_currentComponentSIDs: array<vec4<i32>, 2>;"));
        assert!(wgsl.contains("u_currentComponentSIDs[idxOfArray / 4u][idxOfArray % 4u];"));
        assert!(!wgsl.contains("storageData"));
    }

    #[test]
    fn test_prelude_variants() {
        let layout = DataTextureLayout::compute(
            &DataTextureConfig::default().with_size(64, 64).with_uniform_block(8),
            256,
            0,
        )
        .unwrap();
        let webgl2 = glsl_data_texture_prelude(&layout, true);
        assert!(webgl2.contains("texelFetch"));
        assert!(webgl2.contains("const int dataUBOVec4Size = 8;"));
        assert!(webgl2.contains("if (vec4_idx < dataUBOVec4Size)"));

        let webgl1 = glsl_data_texture_prelude(&layout, false);
        assert!(webgl1.contains("texture2D"));
        assert!(!webgl1.contains("vec4Block"));
    }
}
