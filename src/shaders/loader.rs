use std::path::{Path, PathBuf};

use super::FragmentSource;

/// Names the prelude already declares.
const PRELUDE_DECLARATIONS: &[(&str, &str)] = &[("struct", "Uniforms"), ("struct", "VertexOutput")];

#[derive(Debug, thiserror::Error)]
pub enum ShaderLoadError {
    #[error("failed to read shader {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("shader {0} does not define `fn fs_main`")]
    MissingEntryPoint(PathBuf),
    #[error("shader {path} redeclares `{name}`; the prelude already provides it")]
    RedeclaresPrelude { path: PathBuf, name: &'static str },
}

/// Strip `//` comments so commented-out declarations are not matched.
fn without_comments(source: &str) -> String {
    source
        .lines()
        .map(|line| line.split("//").next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether `keyword name` appears as a declaration, whatever the spacing.
fn declares(source: &str, keyword: &str, name: &str) -> bool {
    let tokens: Vec<&str> = source
        .split(|c: char| c.is_whitespace() || "(){}<>:;,".contains(c))
        .filter(|t| !t.is_empty())
        .collect();
    tokens.windows(2).any(|w| w[0] == keyword && w[1] == name)
}

/// Read a user fragment stage. The prelude (uniform block `u`, `VertexOutput`,
/// the color helpers) is prepended at compile time, so the file holds only
/// `fs_main` and its own helpers.
pub fn load(path: &Path) -> Result<FragmentSource, ShaderLoadError> {
    let body = std::fs::read_to_string(path).map_err(|source| ShaderLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let code = without_comments(&body);
    if !declares(&code, "fn", "fs_main") {
        return Err(ShaderLoadError::MissingEntryPoint(path.to_path_buf()));
    }
    if let Some(&(_, name)) = PRELUDE_DECLARATIONS
        .iter()
        .find(|(keyword, name)| declares(&code, keyword, name))
    {
        return Err(ShaderLoadError::RedeclaresPrelude {
            path: path.to_path_buf(),
            name,
        });
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "custom".to_string());
    Ok(FragmentSource { name, body })
}

/// The custom fragment stage when one is configured and loads, otherwise the
/// built-in one.
pub fn load_or_default(path: Option<&Path>) -> FragmentSource {
    let Some(path) = path else {
        return FragmentSource::builtin();
    };
    match load(path) {
        Ok(fragment) => {
            log::info!("Using custom fragment shader '{}'", path.display());
            fragment
        }
        Err(err) => {
            log::warn!("{}. Falling back to the default shader", err);
            FragmentSource::builtin()
        }
    }
}
