use crate::error::{InstallError, Result};
use crate::installer::core::downloader::{self, DownloadTask};
use crate::installer::profile::{LibraryDescriptor, OsRule, RuleAction};
use crate::installer::types::{Arch, InstallContext, InstallEvent, OsType, ProgressReporter};
use std::collections::HashSet;

/// Location of an artifact relative to the libraries directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePath {
    /// Directory part, `/`-separated, no trailing slash.
    pub dir: String,
    pub file: String,
}

impl StoragePath {
    /// Split a `/`-separated relative path.
    pub fn from_relative(path: &str) -> Self {
        match path.rsplit_once('/') {
            Some((dir, file)) => Self {
                dir: dir.to_string(),
                file: file.to_string(),
            },
            None => Self {
                dir: String::new(),
                file: path.to_string(),
            },
        }
    }

    pub fn relative(&self) -> String {
        if self.dir.is_empty() {
            self.file.clone()
        } else {
            format!("{}/{}", self.dir, self.file)
        }
    }
}

/// Maven coordinate to storage path.
///
/// `group:artifact:version[:classifier][@ext]` becomes
/// `group/artifact/version/artifact-version[-classifier][suffix].ext`.
/// An `@ext` in the coordinate wins over `extra_ext`, which wins over `jar`.
pub fn to_storage_path(name: &str, extra_suffix: &str, extra_ext: Option<&str>) -> Result<StoragePath> {
    let (coords, at_ext) = match name.split_once('@') {
        Some((coords, ext)) => (coords, Some(ext)),
        None => (name, None),
    };

    let parts: Vec<&str> = coords.split(':').collect();
    if parts.len() < 3 || parts[..3].iter().any(|p| p.is_empty()) {
        return Err(InstallError::Configuration(format!(
            "Invalid library name: {}",
            name
        )));
    }

    let group = parts[0].replace('.', "/");
    let artifact = parts[1];
    let version = parts[2];
    let classifier = parts
        .get(3)
        .map(|c| format!("-{}", c))
        .unwrap_or_default();
    let extension = at_ext.or(extra_ext).unwrap_or("jar");

    Ok(StoragePath {
        dir: format!("{}/{}/{}", group, artifact, version),
        file: format!(
            "{}-{}{}{}.{}",
            artifact, version, classifier, extra_suffix, extension
        ),
    })
}

/// Native classifier of `lib` for the current platform, with `${arch}` filled in.
pub fn select_native(lib: &LibraryDescriptor, os: OsType, arch: Arch) -> Option<String> {
    lib.natives
        .as_ref()?
        .get(os.as_str())
        .map(|classifier| classifier.replace("${arch}", arch.bits()))
}

fn arch_matches(rule_arch: &str, arch: Arch) -> bool {
    let normalized = match rule_arch {
        "x64" | "amd64" | "x86_64" => "x86_64",
        "arm64" | "aarch64" => "arm64",
        "arm" | "arm32" => "arm32",
        other => other,
    };
    normalized == arch.rule_name()
}

fn os_rule_matches(rule: Option<&OsRule>, os: OsType, arch: Arch) -> bool {
    let Some(rule) = rule else {
        return true;
    };
    if let Some(name) = &rule.name {
        if name != os.as_str() {
            return false;
        }
    }
    if let Some(rule_arch) = &rule.arch {
        if !arch_matches(rule_arch, arch) {
            return false;
        }
    }
    true
}

/// Whether the rule list excludes `lib` on this platform.
///
/// The last matching rule wins; a non-empty list starts out disallowed and
/// rules gated on launcher features are ignored.
pub fn should_skip(lib: &LibraryDescriptor, os: OsType, arch: Arch) -> bool {
    let Some(rules) = &lib.rules else {
        return false;
    };

    let mut skip = !rules.is_empty();
    for rule in rules {
        if rule.features.is_some() {
            continue;
        }
        if os_rule_matches(rule.os.as_ref(), os, arch) {
            skip = rule.action == RuleAction::Disallow;
        }
    }
    skip
}

/// Keep the first descriptor per name, preserving order.
pub fn dedupe(libraries: Vec<LibraryDescriptor>) -> Vec<LibraryDescriptor> {
    let mut seen = HashSet::new();
    libraries
        .into_iter()
        .filter(|lib| seen.insert(lib.name.clone()))
        .collect()
}

/// Library with its storage location and declared download data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLibrary {
    pub name: String,
    pub storage: StoragePath,
    /// Direct URL candidate, still to be probed.
    pub url: Option<String>,
    pub size: Option<u64>,
    pub sha1: Option<String>,
}

fn join_url(base: &str, relative: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, relative)
    } else {
        format!("{}/{}", base, relative)
    }
}

/// Storage path and direct download data of `lib` (or of its native variant).
pub fn resolve_library(lib: &LibraryDescriptor, native: Option<&str>) -> Result<ResolvedLibrary> {
    let declared = match native {
        Some(classifier) => lib
            .downloads
            .as_ref()
            .and_then(|d| d.classifiers.as_ref())
            .and_then(|c| c.get(classifier)),
        None => lib.artifact(),
    };

    let storage = match declared.and_then(|a| a.path.as_deref()) {
        Some(path) => StoragePath::from_relative(path),
        None => {
            let suffix = native.map(|n| format!("-{}", n)).unwrap_or_default();
            to_storage_path(&lib.name, &suffix, None)?
        }
    };

    let url = declared
        .and_then(|a| a.url.clone())
        .filter(|u| !u.is_empty())
        .or_else(|| lib.url.as_deref().map(|base| join_url(base, &storage.relative())));

    // Maven-style entries may carry their checksum and size at the top level.
    let size = declared
        .and_then(|a| a.size)
        .or_else(|| lib.extra.get("size").and_then(|v| v.as_u64()))
        .filter(|s| *s > 0);
    let sha1 = declared
        .and_then(|a| a.sha1.clone())
        .or_else(|| match native {
            Some(_) => None,
            None => lib.extra.get("sha1").and_then(|v| v.as_str()).map(str::to_string),
        })
        .filter(|s| !s.is_empty());

    Ok(ResolvedLibrary {
        name: lib.name.clone(),
        storage,
        url,
        size,
        sha1,
    })
}

/// A library whose artifact was not downloaded because another stage provides it.
fn is_provided_elsewhere(lib: &LibraryDescriptor, provided_prefixes: &[&str]) -> bool {
    let url = lib.artifact().and_then(|a| a.url.as_deref());
    // An explicitly empty URL marks a processor output.
    if url == Some("") {
        return true;
    }
    url.is_none() && provided_prefixes.iter().any(|p| lib.name.contains(p))
}

async fn local_size(path: &std::path::Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}

/// Walk the library list in order and build the download queue.
///
/// One `check` event is emitted per library. A library is queued only when
/// its local file is missing or smaller than expected. `provided_prefixes`
/// names the loader's own artifacts that were already extracted from the
/// installer.
pub async fn collect_downloads(
    ctx: &InstallContext,
    libraries: &[LibraryDescriptor],
    provided_prefixes: &[&str],
    reporter: &dyn ProgressReporter,
) -> Result<(Vec<DownloadTask>, u64)> {
    let total = libraries.len();
    let libraries_dir = ctx.libraries_dir();
    let mut tasks = Vec::new();
    let mut total_size = 0u64;

    let check = |index: usize, lib: &LibraryDescriptor| {
        reporter.report(InstallEvent::Check {
            index: index + 1,
            total,
            label: format!("libraries/{}", lib.name),
        });
    };

    for (index, lib) in libraries.iter().enumerate() {
        if is_provided_elsewhere(lib, provided_prefixes) {
            log::debug!("Library {} is provided by the installer", lib.name);
            check(index, lib);
            continue;
        }

        if should_skip(lib, ctx.os, ctx.arch) {
            log::debug!("Library {} excluded by rules on {}", lib.name, ctx.os.as_str());
            check(index, lib);
            continue;
        }

        let native = select_native(lib, ctx.os, ctx.arch);
        let resolved = resolve_library(lib, native.as_deref())?;
        let destination = libraries_dir.join(resolved.storage.relative());
        let existing = local_size(&destination).await;

        if let (Some(expected), Some(actual)) = (resolved.size, existing) {
            if actual >= expected {
                log::debug!("Library {} already present", lib.name);
                check(index, lib);
                continue;
            }
        }

        let remote = downloader::resolve(
            &ctx.client,
            resolved.url.as_deref(),
            &resolved.storage.relative(),
            &ctx.endpoints.mirrors,
        )
        .await;

        // A declared size describes the direct URL only; mirrors report their own.
        let size = match &remote {
            Some(r) if resolved.url.as_deref() == Some(r.url.as_str()) => {
                resolved.size.unwrap_or(r.size)
            }
            Some(r) => r.size,
            None => resolved.size.unwrap_or(0),
        };

        if existing.map(|actual| actual >= size).unwrap_or(false) {
            log::debug!("Library {} already present", lib.name);
            check(index, lib);
            continue;
        }

        let Some(remote) = remote else {
            return Err(InstallError::LibraryUnavailable {
                name: lib.name.clone(),
                file: resolved.storage.file,
            });
        };

        total_size += size;
        tasks.push(DownloadTask {
            url: remote.url,
            folder: libraries_dir.join(&resolved.storage.dir),
            file_name: resolved.storage.file.clone(),
            size,
            sha1: resolved.sha1,
            label: format!("libraries/{}", resolved.storage.relative()),
        });
        check(index, lib);
    }

    log::info!(
        "{} of {} libraries need downloading ({} bytes)",
        tasks.len(),
        total,
        total_size
    );
    Ok((tasks, total_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::profile::{Artifact, LibraryDownloads, Rule};
    use crate::installer::types::{InstallOptions, LoaderType, SilentReporter};
    use serde_json::Map;
    use std::collections::BTreeMap;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn artifact(path: Option<&str>, url: Option<&str>, size: Option<u64>) -> Artifact {
        Artifact {
            path: path.map(str::to_string),
            url: url.map(str::to_string),
            sha1: None,
            size,
            extra: Map::new(),
        }
    }

    fn with_artifact(name: &str, artifact: Artifact) -> LibraryDescriptor {
        let mut lib = LibraryDescriptor::named(name);
        lib.downloads = Some(LibraryDownloads {
            artifact: Some(artifact),
            classifiers: None,
            extra: Map::new(),
        });
        lib
    }

    fn lib_with_rules(rules: Vec<Rule>) -> LibraryDescriptor {
        let mut lib = LibraryDescriptor::named("org.lwjgl:lwjgl:3.3.1");
        lib.rules = Some(rules);
        lib
    }

    fn rule(action: RuleAction, os: Option<&str>) -> Rule {
        Rule {
            action,
            os: os.map(|name| OsRule {
                name: Some(name.to_string()),
                version: None,
                arch: None,
            }),
            features: None,
        }
    }

    #[test]
    fn storage_path_plain_and_classified() {
        let p = to_storage_path("net.minecraftforge:forge:1.20.1-47.2.0", "", None).unwrap();
        assert_eq!(
            p.relative(),
            "net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0.jar"
        );

        let p = to_storage_path("org.lwjgl:lwjgl:3.3.1:natives-linux", "", None).unwrap();
        assert_eq!(p.file, "lwjgl-3.3.1-natives-linux.jar");
        assert_eq!(p.dir, "org/lwjgl/lwjgl/3.3.1");
    }

    #[test]
    fn storage_path_at_extension_and_suffix() {
        let p = to_storage_path("de.oceanlabs.mcp:mcp_config:1.20.1-20230612.114412@zip", "", None).unwrap();
        assert_eq!(p.file, "mcp_config-1.20.1-20230612.114412.zip");

        let p = to_storage_path("net.minecraft:client:1.20.1:mappings@txt", "", None).unwrap();
        assert_eq!(p.file, "client-1.20.1-mappings.txt");

        let p = to_storage_path(
            "net.minecraftforge:forge:1.12.2-14.23.5.2859",
            "-clientdata",
            Some("lzma"),
        )
        .unwrap();
        assert_eq!(p.file, "forge-1.12.2-14.23.5.2859-clientdata.lzma");
    }

    #[test]
    fn storage_path_rejects_short_coordinates() {
        assert!(to_storage_path("org.ow2.asm:asm", "", None).is_err());
    }

    #[test]
    fn native_selection_substitutes_arch() {
        let mut lib = LibraryDescriptor::named("tv.twitch:twitch-platform:5.16");
        let mut natives = BTreeMap::new();
        natives.insert("windows".to_string(), "natives-windows-${arch}".to_string());
        natives.insert("linux".to_string(), "natives-linux".to_string());
        lib.natives = Some(natives);

        assert_eq!(
            select_native(&lib, OsType::Windows, Arch::X64).as_deref(),
            Some("natives-windows-64")
        );
        assert_eq!(
            select_native(&lib, OsType::Windows, Arch::X86).as_deref(),
            Some("natives-windows-32")
        );
        assert_eq!(select_native(&lib, OsType::MacOS, Arch::X64), None);
    }

    #[test]
    fn rules_last_match_wins() {
        let lib = lib_with_rules(vec![
            rule(RuleAction::Allow, None),
            rule(RuleAction::Disallow, Some("osx")),
        ]);
        assert!(!should_skip(&lib, OsType::Linux, Arch::X64));
        assert!(should_skip(&lib, OsType::MacOS, Arch::Arm64));
    }

    #[test]
    fn rules_start_disallowed() {
        let lib = lib_with_rules(vec![rule(RuleAction::Allow, Some("osx"))]);
        assert!(should_skip(&lib, OsType::Windows, Arch::X64));
        assert!(!should_skip(&lib, OsType::MacOS, Arch::X64));

        assert!(!should_skip(&LibraryDescriptor::named("a:b:1"), OsType::Linux, Arch::X64));
    }

    #[test]
    fn feature_rules_are_ignored() {
        let mut features = Map::new();
        features.insert("is_demo_user".to_string(), serde_json::Value::Bool(true));
        let lib = lib_with_rules(vec![
            rule(RuleAction::Allow, None),
            Rule {
                action: RuleAction::Disallow,
                os: None,
                features: Some(features),
            },
        ]);
        assert!(!should_skip(&lib, OsType::Linux, Arch::X64));
    }

    #[test]
    fn arch_rule_restricts_match() {
        let lib = lib_with_rules(vec![
            rule(RuleAction::Allow, None),
            Rule {
                action: RuleAction::Disallow,
                os: Some(OsRule {
                    name: Some("windows".to_string()),
                    version: None,
                    arch: Some("x86".to_string()),
                }),
                features: None,
            },
        ]);
        assert!(should_skip(&lib, OsType::Windows, Arch::X86));
        assert!(!should_skip(&lib, OsType::Windows, Arch::X64));
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let mut first = LibraryDescriptor::named("org.ow2.asm:asm:9.5");
        first.url = Some("https://first.example/".to_string());
        let mut second = LibraryDescriptor::named("org.ow2.asm:asm:9.5");
        second.url = Some("https://second.example/".to_string());
        let other = LibraryDescriptor::named("com.google.guava:guava:31.1-jre");

        let result = dedupe(vec![first.clone(), other.clone(), second]);
        assert_eq!(result, vec![first, other]);
    }

    #[test]
    fn resolve_prefers_declared_artifact() {
        let mut lib = LibraryDescriptor::named("cpw.mods:securejarhandler:2.1.10");
        lib.downloads = Some(LibraryDownloads {
            artifact: Some(Artifact {
                path: Some("cpw/mods/securejarhandler/2.1.10/securejarhandler-2.1.10.jar".to_string()),
                url: Some("https://maven.example/cpw/securejarhandler-2.1.10.jar".to_string()),
                sha1: Some("abc".to_string()),
                size: Some(88749),
                extra: Map::new(),
            }),
            classifiers: None,
            extra: Map::new(),
        });

        let resolved = resolve_library(&lib, None).unwrap();
        assert_eq!(resolved.storage.file, "securejarhandler-2.1.10.jar");
        assert_eq!(resolved.url.as_deref(), Some("https://maven.example/cpw/securejarhandler-2.1.10.jar"));
        assert_eq!(resolved.size, Some(88749));
        assert_eq!(resolved.sha1.as_deref(), Some("abc"));
    }

    #[test]
    fn resolve_joins_maven_base_url() {
        let mut lib = LibraryDescriptor::named("net.fabricmc:intermediary:1.20.1");
        lib.url = Some("https://maven.fabricmc.net".to_string());
        let resolved = resolve_library(&lib, None).unwrap();
        assert_eq!(
            resolved.url.as_deref(),
            Some("https://maven.fabricmc.net/net/fabricmc/intermediary/1.20.1/intermediary-1.20.1.jar")
        );
        assert_eq!(resolved.size, None);
    }

    #[test]
    fn resolve_reads_top_level_checksum() {
        let mut lib = LibraryDescriptor::named("net.fabricmc:fabric-loader:0.15.11");
        lib.url = Some("https://maven.fabricmc.net/".to_string());
        lib.extra.insert("sha1".into(), "0123abcd".into());
        lib.extra.insert("size".into(), 1342.into());
        let resolved = resolve_library(&lib, None).unwrap();
        assert_eq!(resolved.sha1.as_deref(), Some("0123abcd"));
        assert_eq!(resolved.size, Some(1342));
    }

    #[test]
    fn empty_url_marks_processor_output() {
        let mut lib = LibraryDescriptor::named("net.minecraft:client:1.20.1-20230612.114412:srg");
        lib.downloads = Some(LibraryDownloads {
            artifact: Some(Artifact {
                path: None,
                url: Some(String::new()),
                sha1: None,
                size: None,
                extra: Map::new(),
            }),
            classifiers: None,
            extra: Map::new(),
        });
        assert!(is_provided_elsewhere(&lib, &[]));

        let own = LibraryDescriptor::named("net.minecraftforge:forge:1.20.1-47.2.0:universal");
        assert!(is_provided_elsewhere(&own, &["net.minecraftforge:forge:"]));
        assert!(!is_provided_elsewhere(&own, &[]));
    }

    #[test]
    fn native_uses_declared_classifier_artifact() {
        let mut lib = LibraryDescriptor::named("org.lwjgl:lwjgl-glfw:3.3.1");
        let mut classifiers = BTreeMap::new();
        classifiers.insert(
            "natives-linux".to_string(),
            Artifact {
                sha1: Some("feed".to_string()),
                ..artifact(
                    Some("org/lwjgl/lwjgl-glfw/3.3.1/lwjgl-glfw-3.3.1-natives-linux.jar"),
                    Some("https://libraries.example/lwjgl-glfw-3.3.1-natives-linux.jar"),
                    Some(118_000),
                )
            },
        );
        lib.downloads = Some(LibraryDownloads {
            artifact: Some(artifact(Some("org/lwjgl/lwjgl-glfw/3.3.1/lwjgl-glfw-3.3.1.jar"), None, Some(10))),
            classifiers: Some(classifiers),
            extra: Map::new(),
        });

        let resolved = resolve_library(&lib, Some("natives-linux")).unwrap();
        assert_eq!(resolved.storage.file, "lwjgl-glfw-3.3.1-natives-linux.jar");
        assert_eq!(
            resolved.url.as_deref(),
            Some("https://libraries.example/lwjgl-glfw-3.3.1-natives-linux.jar")
        );
        assert_eq!(resolved.size, Some(118_000));
        assert_eq!(resolved.sha1.as_deref(), Some("feed"));
    }

    #[test]
    fn undeclared_native_gets_classifier_suffix() {
        let mut lib = LibraryDescriptor::named("org.lwjgl.lwjgl:lwjgl-platform:2.9.4");
        lib.url = Some("https://maven.example/".to_string());
        lib.extra.insert("sha1".into(), "not-for-natives".into());

        let resolved = resolve_library(&lib, Some("natives-linux")).unwrap();
        assert_eq!(
            resolved.storage.relative(),
            "org/lwjgl/lwjgl/lwjgl-platform/2.9.4/lwjgl-platform-2.9.4-natives-linux.jar"
        );
        assert_eq!(
            resolved.url.as_deref(),
            Some("https://maven.example/org/lwjgl/lwjgl/lwjgl-platform/2.9.4/lwjgl-platform-2.9.4-natives-linux.jar")
        );
        assert_eq!(resolved.sha1, None);
    }

    async fn mount_head(server: &MockServer, route: &str, len: usize) {
        Mock::given(method("HEAD"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; len]))
            .mount(server)
            .await;
    }

    fn context(server: &MockServer, root: &std::path::Path) -> InstallContext {
        let mut options = InstallOptions::new(root, LoaderType::Forge, "1.20.1");
        options.endpoints.mirrors = vec![format!("{}/m", server.uri())];
        InstallContext::from_options(&options).unwrap()
    }

    #[tokio::test]
    async fn mirror_task_carries_mirror_size() {
        let server = MockServer::start().await;
        mount_head(&server, "/m/a/b/1/b-1.jar", 10).await;

        let dir = tempdir().unwrap();
        let ctx = context(&server, dir.path());
        let lib = with_artifact("a:b:1", artifact(Some("a/b/1/b-1.jar"), None, Some(3)));

        let (tasks, total) = collect_downloads(&ctx, &[lib], &[], &SilentReporter).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].url, format!("{}/m/a/b/1/b-1.jar", server.uri()));
        assert_eq!(tasks[0].size, 10);
        assert_eq!(total, 10);
    }

    #[tokio::test]
    async fn direct_task_keeps_declared_size() {
        let server = MockServer::start().await;
        mount_head(&server, "/direct/c-2.jar", 10).await;

        let dir = tempdir().unwrap();
        let ctx = context(&server, dir.path());
        let url = format!("{}/direct/c-2.jar", server.uri());
        let lib = with_artifact("a:c:2", artifact(Some("a/c/2/c-2.jar"), Some(&url), Some(12)));

        let (tasks, total) = collect_downloads(&ctx, &[lib], &[], &SilentReporter).await.unwrap();
        assert_eq!(tasks[0].url, url);
        assert_eq!(tasks[0].size, 12);
        assert_eq!(total, 12);
    }
}
