//! Post-install processor execution.
//!
//! A processor step is a jar run with substituted arguments. Steps declare
//! their outputs with expected sha1 values, which lets an interrupted or
//! repeated installation skip work that is already done.

use crate::error::{InstallError, Result};
use crate::installer::config::PROCESSOR_TIMEOUT_SECS;
use crate::installer::core::archive::ZipArchiveReader;
use crate::installer::core::integrity::{verify, HashAlgorithm};
use crate::installer::core::library::to_storage_path;
use crate::installer::profile::{InstallManifest, ProcessorStep};
use crate::installer::types::{InstallEvent, ProgressReporter};
use crate::utils::process::{classpath_separator, LoaderCommandExt};
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

/// A fully resolved processor launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    pub java: PathBuf,
    pub classpath: Vec<PathBuf>,
    pub main_class: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs processor jars. The default is [`JavaProcessRunner`].
pub trait ProcessRunner: Send + Sync {
    fn run<'a>(&'a self, invocation: &'a ProcessInvocation) -> BoxFuture<'a, Result<ProcessOutput>>;
}

/// Spawns `java -cp <classpath> <main> <args...>`.
#[derive(Debug, Clone, Default)]
pub struct JavaProcessRunner;

impl ProcessRunner for JavaProcessRunner {
    fn run<'a>(&'a self, invocation: &'a ProcessInvocation) -> BoxFuture<'a, Result<ProcessOutput>> {
        Box::pin(async move {
            let classpath = invocation
                .classpath
                .iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join(classpath_separator());

            let mut command = Command::new(&invocation.java);
            command
                .arg("-cp")
                .arg(&classpath)
                .arg(&invocation.main_class)
                .args(&invocation.args)
                .suppress_console()
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());

            log::debug!("Executing: {:?}", command);

            let timeout = std::time::Duration::from_secs(PROCESSOR_TIMEOUT_SECS);
            let output = tokio::time::timeout(timeout, command.output())
                .await
                .map_err(|_| InstallError::Patch {
                    step: invocation.main_class.clone(),
                    message: format!("timed out after {}s", PROCESSOR_TIMEOUT_SECS),
                })?
                .map_err(|e| InstallError::io(&invocation.java, e))?;

            Ok(ProcessOutput {
                success: output.status.success(),
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        })
    }
}

/// Values processors are run against.
#[derive(Debug, Clone, Default)]
pub struct PatchConfig {
    pub root: PathBuf,
    pub libraries_dir: PathBuf,
    pub java: Option<PathBuf>,
    pub minecraft_jar: PathBuf,
    /// Game version id substituted for `{MINECRAFT_VERSION}`.
    pub minecraft_version: String,
    pub installer: PathBuf,
    /// Extracted `data/client.lzma`, substituted for `{BINPATCH}`.
    pub binpatch: Option<PathBuf>,
    /// Archive entry (as written in the data map) -> extracted file.
    pub extracted: HashMap<String, PathBuf>,
}

fn strip_wrapped(value: &str, open: char, close: char) -> Option<&str> {
    value
        .strip_prefix(open)
        .and_then(|v| v.strip_suffix(close))
        .filter(|_| value.len() >= 2)
}

/// Applies the processor steps of one install manifest.
pub struct Patcher {
    runner: Arc<dyn ProcessRunner>,
}

impl Patcher {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    fn library_path(config: &PatchConfig, coords: &str) -> Result<PathBuf> {
        let storage = to_storage_path(coords, "", None)?;
        Ok(config.libraries_dir.join(storage.relative()))
    }

    /// Resolved value of every `{TOKEN}` usable in processor arguments.
    pub fn variables(
        &self,
        install: &InstallManifest,
        config: &PatchConfig,
    ) -> Result<HashMap<String, String>> {
        let mut vars = HashMap::new();
        let path_string = |p: &Path| p.to_string_lossy().to_string();

        vars.insert("SIDE".to_string(), "client".to_string());
        vars.insert("ROOT".to_string(), path_string(&config.root));
        vars.insert("MINECRAFT_JAR".to_string(), path_string(&config.minecraft_jar));
        vars.insert("MINECRAFT_VERSION".to_string(), config.minecraft_version.clone());
        vars.insert("INSTALLER".to_string(), path_string(&config.installer));
        vars.insert("LIBRARY_DIR".to_string(), path_string(&config.libraries_dir));

        for (key, entry) in &install.data {
            let value = &entry.client;
            let resolved = if key == "BINPATCH" && config.binpatch.is_some() {
                config.binpatch.as_deref().map(path_string).unwrap_or_default()
            } else if let Some(coords) = strip_wrapped(value, '[', ']') {
                path_string(&Self::library_path(config, coords)?)
            } else if let Some(literal) = strip_wrapped(value, '\'', '\'') {
                literal.to_string()
            } else if value.starts_with('/') {
                match config.extracted.get(value) {
                    Some(path) => path_string(path),
                    None => {
                        log::warn!("Data entry {} ({}) was not extracted", key, value);
                        value.clone()
                    }
                }
            } else {
                value.clone()
            };
            vars.insert(key.clone(), resolved);
        }

        Ok(vars)
    }

    /// Replace known `{KEY}` tokens in one left-to-right pass. Substituted
    /// values are not scanned again; unknown tokens are kept as written.
    fn substitute(text: &str, vars: &HashMap<String, String>) -> String {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(open) = rest.find('{') {
            result.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                rest = &rest[open..];
                break;
            };
            let key = &after[..close];
            match vars.get(key) {
                Some(value) => result.push_str(value),
                None => result.push_str(&rest[open..open + close + 2]),
            }
            rest = &after[close + 1..];
        }
        result.push_str(rest);
        result
    }

    fn resolve_arg(config: &PatchConfig, arg: &str, vars: &HashMap<String, String>) -> Result<String> {
        if let Some(coords) = strip_wrapped(arg, '[', ']') {
            return Ok(Self::library_path(config, coords)?.to_string_lossy().to_string());
        }
        if let Some(literal) = strip_wrapped(arg, '\'', '\'') {
            return Ok(literal.to_string());
        }
        Ok(Self::substitute(arg, vars))
    }

    /// Whether every declared output exists with its expected sha1.
    async fn outputs_match(
        config: &PatchConfig,
        step: &ProcessorStep,
        vars: &HashMap<String, String>,
    ) -> Result<bool> {
        let Some(outputs) = step.outputs.as_ref().filter(|o| !o.is_empty()) else {
            return Ok(false);
        };

        for (key, value) in outputs {
            let path = PathBuf::from(Self::resolve_arg(config, key, vars)?);
            let expected = Self::resolve_arg(config, value, vars)?;
            if !path.exists() {
                log::debug!("Processor output missing: {} -> {:?}", key, path);
                return Ok(false);
            }
            if !verify(&path, &expected, HashAlgorithm::Sha1).await? {
                log::debug!("Processor output {:?} does not match {}", path, expected);
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Library files a step consumes through data keys (BINPATCH excluded).
    fn data_artifacts(
        install: &InstallManifest,
        step: &ProcessorStep,
        vars: &HashMap<String, String>,
    ) -> BTreeSet<PathBuf> {
        step.args
            .iter()
            .filter_map(|arg| strip_wrapped(arg, '{', '}'))
            .filter(|key| *key != "BINPATCH")
            .filter(|key| {
                install
                    .data
                    .get(*key)
                    .map(|entry| entry.client.starts_with('['))
                    .unwrap_or(false)
            })
            .filter_map(|key| vars.get(key).map(PathBuf::from))
            .collect()
    }

    fn client_steps(install: &InstallManifest) -> Vec<&ProcessorStep> {
        install
            .processors
            .iter()
            .filter(|step| step.runs_on_client())
            .collect()
    }

    /// True when no client step needs to run.
    ///
    /// A step with declared outputs is satisfied when they all match; a step
    /// without outputs is satisfied when the data artifacts it references exist.
    pub async fn check(&self, install: &InstallManifest, config: &PatchConfig) -> Result<bool> {
        let vars = self.variables(install, config)?;
        for step in Self::client_steps(install) {
            let has_outputs = step.outputs.as_ref().map(|o| !o.is_empty()).unwrap_or(false);
            let satisfied = if has_outputs {
                Self::outputs_match(config, step, &vars).await?
            } else {
                Self::data_artifacts(install, step, &vars)
                    .iter()
                    .all(|path| path.exists())
            };
            if !satisfied {
                log::debug!("Processor {} still needs to run", step.jar);
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn java(config: &PatchConfig) -> Result<PathBuf> {
        if let Some(java) = &config.java {
            return Ok(java.clone());
        }
        which::which("java").map_err(|e| InstallError::Patch {
            step: "java".to_string(),
            message: format!("Java executable not found: {}", e),
        })
    }

    /// Run every client step in order, skipping steps whose outputs already match.
    pub async fn run(
        &self,
        install: &InstallManifest,
        config: &PatchConfig,
        reporter: &dyn ProgressReporter,
    ) -> Result<()> {
        let steps = Self::client_steps(install);
        if steps.is_empty() {
            log::info!("No processors to execute");
            return Ok(());
        }

        let vars = self.variables(install, config)?;
        let total = steps.len();
        let java = OnceCell::new();
        let mut skipped = 0;

        for (idx, step) in steps.into_iter().enumerate() {
            reporter.report(InstallEvent::Patch {
                label: step.jar.clone(),
            });

            if Self::outputs_match(config, step, &vars).await? {
                log::info!(
                    "Skipping processor {}/{}: {} (outputs already valid)",
                    idx + 1,
                    total,
                    step.jar
                );
                skipped += 1;
                continue;
            }

            log::info!("Executing processor {}/{}: {}", idx + 1, total, step.jar);

            let java = java.get_or_try_init(|| Self::java(config))?;
            let invocation = self.invocation(config, step, &vars, java).await?;
            let output = self.runner.run(&invocation).await?;
            if !output.success {
                log::error!("Processor {} failed", step.jar);
                log::error!("  Main class: {}", invocation.main_class);
                log::error!("  Args: {:?}", invocation.args);
                log::error!("  stdout: {}", output.stdout);
                log::error!("  stderr: {}", output.stderr);
                return Err(InstallError::Patch {
                    step: step.jar.clone(),
                    message: format!("exited with code {:?}", output.code),
                });
            }

            self.verify_outputs(config, step, &vars).await?;
        }

        if skipped > 0 {
            log::info!("Skipped {}/{} processors with valid outputs", skipped, total);
        }
        Ok(())
    }

    async fn invocation(
        &self,
        config: &PatchConfig,
        step: &ProcessorStep,
        vars: &HashMap<String, String>,
        java: &Path,
    ) -> Result<ProcessInvocation> {
        let jar = Self::library_path(config, &step.jar)?;
        let main_class = ZipArchiveReader::new(&jar)
            .main_class()
            .await
            .map_err(|e| InstallError::Patch {
                step: step.jar.clone(),
                message: e.to_string(),
            })?;

        let mut classpath = vec![jar];
        for coords in &step.classpath {
            classpath.push(Self::library_path(config, coords)?);
        }

        let args = step
            .args
            .iter()
            .map(|arg| Self::resolve_arg(config, arg, vars))
            .collect::<Result<Vec<_>>>()?;

        Ok(ProcessInvocation {
            java: java.to_path_buf(),
            classpath,
            main_class,
            args,
        })
    }

    async fn verify_outputs(
        &self,
        config: &PatchConfig,
        step: &ProcessorStep,
        vars: &HashMap<String, String>,
    ) -> Result<()> {
        let Some(outputs) = &step.outputs else {
            return Ok(());
        };

        for (key, value) in outputs {
            let path = PathBuf::from(Self::resolve_arg(config, key, vars)?);
            let expected = Self::resolve_arg(config, value, vars)?;
            if !path.exists() {
                return Err(InstallError::Patch {
                    step: step.jar.clone(),
                    message: format!("expected output {:?} was not created", path),
                });
            }
            if !verify(&path, &expected, HashAlgorithm::Sha1).await? {
                return Err(InstallError::Patch {
                    step: step.jar.clone(),
                    message: format!("output {:?} does not match sha1 {}", path, expected),
                });
            }
        }
        Ok(())
    }
}
