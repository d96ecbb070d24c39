use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Where a run keeps its segments and where the merged file goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub segment_dir: PathBuf,
    pub output_file: PathBuf,
}

/// `<output_dir>/<name>/` for segments and `<output_dir>/<name>.mp4` for the result.
pub fn output_paths(output_dir: &Path, name: &str) -> Result<OutputPaths, AppError> {
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(AppError::InvalidInput(format!("invalid output name `{name}`")));
    }

    Ok(OutputPaths {
        segment_dir: output_dir.join(name),
        output_file: output_dir.join(format!("{name}.mp4")),
    })
}
