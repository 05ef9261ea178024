use std::path::{Path, PathBuf};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{Parameters, ToolKind};

/// Concrete subprocess invocation for one tool family.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub extra_env: Vec<(String, String)>,
    /// Files the tool writes into the working dir that must be removed on
    /// every exit path.
    pub cleanup_files: Vec<PathBuf>,
}

/// Parameter keys each tool family accepts as execution inputs. Anything
/// outside this set is a configuration error, rejected before spawn.
const K6_KEYS: &[&str] = &["BASE_URL", "VUS", "DURATION", "ITERATIONS", "K6_BROWSER_ENABLED"];
const PLAYWRIGHT_KEYS: &[&str] = &["BASE_URL", "BROWSER", "HEADED"];
const SELENIUM_KEYS: &[&str] = &["BASE_URL", "BROWSER", "HEADLESS"];

/// Validate a raw tool kind string from a job descriptor. Fails fast with
/// `UnsupportedToolKind` so no subprocess is ever spawned for an unknown
/// tool.
pub fn parse_tool_kind(raw: &str) -> Result<ToolKind, EngineError> {
    raw.parse()
        .map_err(|_| EngineError::UnsupportedToolKind(raw.to_string()))
}

/// Resolve a job's script path to a concrete script file.
///
/// Relative paths are joined onto the configured scripts root. A path that
/// names a directory resolves to the lexicographically first file carrying
/// the tool's expected extension, so repeated runs pick the same script.
pub fn resolve_script(
    scripts_dir: &Path,
    script_path: &str,
    kind: ToolKind,
) -> Result<PathBuf, EngineError> {
    let path = {
        let p = Path::new(script_path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            scripts_dir.join(p)
        }
    };

    if !path.exists() {
        return Err(EngineError::ScriptNotFound(path.display().to_string()));
    }

    if path.is_dir() {
        let pattern = path.join(format!("*.{}", kind.script_extension()));
        let mut matches: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| EngineError::ScriptNotFound(e.to_string()))?
            .filter_map(Result::ok)
            .collect();
        matches.sort();
        return matches
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::ScriptNotFound(pattern.display().to_string()));
    }

    Ok(path)
}

/// Build the subprocess invocation for a resolved script.
pub fn build_command(
    config: &EngineConfig,
    kind: ToolKind,
    script: &Path,
    parameters: &Parameters,
) -> Result<CommandSpec, EngineError> {
    validate_parameters(kind, parameters)?;

    // Run from the script's directory so relative resource loads succeed.
    let working_dir = script
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let spec = match kind {
        ToolKind::K6 => {
            let mut args = vec![
                "run".to_string(),
                script.display().to_string(),
                "--out".to_string(),
                "json=result.json".to_string(),
            ];
            let mut extra_env = Vec::new();
            for (key, value) in parameters {
                // Browser mode is a runtime flag, not a script input.
                if key == "K6_BROWSER_ENABLED" {
                    extra_env.push((key.clone(), value.clone()));
                } else {
                    args.push("-e".to_string());
                    args.push(format!("{}={}", key, value));
                }
            }
            CommandSpec {
                program: config.k6_bin.clone(),
                args,
                cleanup_files: vec![working_dir.join("result.json")],
                working_dir,
                extra_env,
            }
        }
        ToolKind::Playwright => CommandSpec {
            program: config.playwright_bin.clone(),
            args: vec![
                "playwright".to_string(),
                "test".to_string(),
                script.display().to_string(),
                "--reporter=json".to_string(),
            ],
            extra_env: parameters
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            cleanup_files: Vec::new(),
            working_dir,
        },
        ToolKind::Selenium => CommandSpec {
            program: config.python_bin.clone(),
            args: vec![script.display().to_string()],
            extra_env: parameters
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            cleanup_files: Vec::new(),
            working_dir,
        },
    };

    Ok(spec)
}

fn validate_parameters(kind: ToolKind, parameters: &Parameters) -> Result<(), EngineError> {
    let recognized = match kind {
        ToolKind::K6 => K6_KEYS,
        ToolKind::Playwright => PLAYWRIGHT_KEYS,
        ToolKind::Selenium => SELENIUM_KEYS,
    };
    for key in parameters.keys() {
        if !recognized.contains(&key.as_str()) {
            return Err(EngineError::UnrecognizedParameter {
                tool: kind.as_str(),
                key: key.clone(),
            });
        }
    }
    Ok(())
}
