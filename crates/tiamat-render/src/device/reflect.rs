//! Uniform declaration scanning over composed GLSL.
//!
//! Both device backends reflect shaders from the same source text: the
//! null device uses the scan as its reflection result, and the wgpu
//! backend uses it to rewrite loose uniforms into a uniform block before
//! translation.

use crate::shader::UniformKind;

/// Scans composed GLSL for top-level `uniform <type> <name>;` declarations,
/// in declaration order.
///
/// The store composes sources with one declaration per line, so a
/// line-based scan is sufficient. Commented-out declarations (`//`) are
/// skipped.
pub(crate) fn scan_uniform_decls(source: &str) -> Vec<(String, UniformKind)> {
    let mut decls = Vec::new();

    for line in source.lines() {
        let line = line.trim();
        if line.starts_with("//") {
            continue;
        }
        let Some(rest) = line.strip_prefix("uniform ") else {
            continue;
        };
        let Some(rest) = rest.strip_suffix(';') else {
            continue;
        };

        let mut words = rest.split_whitespace();
        let (Some(ty), Some(name), None) = (words.next(), words.next(), words.next()) else {
            continue;
        };
        let Some(kind) = kind_from_glsl(ty) else {
            continue;
        };

        decls.push((name.to_owned(), kind));
    }

    decls
}

fn kind_from_glsl(ty: &str) -> Option<UniformKind> {
    Some(match ty {
        "bool" => UniformKind::Bool,
        "int" => UniformKind::Int,
        "float" => UniformKind::Float,
        "vec2" => UniformKind::Vec2,
        "vec3" => UniformKind::Vec3,
        "vec4" => UniformKind::Vec4,
        "mat3" => UniformKind::Mat3,
        "mat4" => UniformKind::Mat4,
        "sampler2D" => UniformKind::Sampler,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_declarations_in_order() {
        let src = "\
#version 450

uniform mat4 g_ProjMatrix;
uniform float u_Alpha;

void main() {}
";
        let decls = scan_uniform_decls(src);
        assert_eq!(
            decls,
            vec![
                ("g_ProjMatrix".to_owned(), UniformKind::Mat4),
                ("u_Alpha".to_owned(), UniformKind::Float),
            ]
        );
    }

    #[test]
    fn recognizes_samplers() {
        let decls = scan_uniform_decls("uniform sampler2D m_Texture;");
        assert_eq!(decls, vec![("m_Texture".to_owned(), UniformKind::Sampler)]);
    }

    #[test]
    fn skips_comments_and_non_uniform_lines() {
        let src = "\
// uniform float u_Commented;
in vec2 m_Position;
uniform vec2 u_Size;
";
        let decls = scan_uniform_decls(src);
        assert_eq!(decls, vec![("u_Size".to_owned(), UniformKind::Vec2)]);
    }

    #[test]
    fn ignores_unknown_types() {
        assert!(scan_uniform_decls("uniform image2D u_Image;").is_empty());
    }
}
