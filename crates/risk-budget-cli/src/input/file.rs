use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputFormat {
    Json,
    Yaml,
}

impl InputFormat {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => InputFormat::Yaml,
            _ => InputFormat::Json,
        }
    }
}

/// Read a portfolio or price-history file into a typed input struct.
/// `.yaml`/`.yml` files are parsed as YAML, everything else as JSON.
pub fn read_input<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let file = locate(path)?;
    let contents = fs::read_to_string(&file)
        .map_err(|e| format!("Failed to read '{}': {}", file.display(), e))?;

    let parsed = match InputFormat::of(&file) {
        InputFormat::Yaml => serde_yaml::from_str(&contents).map_err(|e| e.to_string()),
        InputFormat::Json => serde_json::from_str(&contents).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| format!("Failed to parse '{}': {}", file.display(), e).into())
}

/// Absolute path of an existing regular file.
fn locate(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let requested = Path::new(path);
    let file = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        std::env::current_dir()?.join(requested)
    };

    match fs::metadata(&file) {
        Ok(meta) if meta.is_file() => Ok(file),
        Ok(_) => Err(format!("Not a file: {}", file.display()).into()),
        Err(_) => Err(format!("File not found: {}", file.display()).into()),
    }
}
