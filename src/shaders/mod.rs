//! WGSL sources. Every program is the shared prelude, one vertex stage for
//! the drawing style and one fragment stage (built-in or user supplied).

pub mod loader;

use crate::render::Style;

pub const PRELUDE: &str = include_str!("../../shaders/common.wgsl");
pub const DEFAULT_FRAGMENT: &str = include_str!("../../shaders/fragment.wgsl");

fn vertex_stage(style: Style) -> &'static str {
    match style {
        Style::Bars => include_str!("../../shaders/bars.wgsl"),
        Style::Line => include_str!("../../shaders/lines.wgsl"),
    }
}

/// A fragment stage without the prelude.
#[derive(Clone, Debug, PartialEq)]
pub struct FragmentSource {
    pub name: String,
    pub body: String,
}

impl FragmentSource {
    pub fn builtin() -> Self {
        Self {
            name: "builtin".to_string(),
            body: DEFAULT_FRAGMENT.to_string(),
        }
    }
}

impl Default for FragmentSource {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Full shader module for `style` with `fragment` as its fragment stage.
pub fn compose(style: Style, fragment: &FragmentSource) -> String {
    let vertex = vertex_stage(style);
    let mut source = String::with_capacity(PRELUDE.len() + vertex.len() + fragment.body.len() + 64);
    source.push_str(PRELUDE);
    source.push_str("\n// ---- vertex ----\n");
    source.push_str(vertex);
    source.push_str("\n// ---- fragment: ");
    source.push_str(&fragment.name);
    source.push_str(" ----\n");
    source.push_str(&fragment.body);
    source
}
