use std::sync::Arc;

use anyhow::Result;

use piston_loader::{install, InstallEvent, InstallOptions, LoaderType, ProgressReporter};

struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn report(&self, event: InstallEvent) {
        match event {
            InstallEvent::Check { index, total, label } => {
                println!("[CHECK] {}/{} {}", index, total, label)
            }
            InstallEvent::Progress {
                downloaded,
                total,
                label,
            } => println!("[BYTES] {}/{} {}", downloaded, total, label),
            InstallEvent::Extract { label } => println!("[EXTRACT] {}", label),
            InstallEvent::Patch { label } => println!("[PATCH] {}", label),
        }
    }
}

/// Usage: install_loader <loader> <minecraft version> [build]
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let loader: LoaderType = args.next().as_deref().unwrap_or("fabric").parse()?;
    let version = args.next().unwrap_or_else(|| "1.20.1".to_string());
    let build = args.next().unwrap_or_else(|| "latest".to_string());

    // Installs into a temp directory. Profile loaders need nothing else;
    // Forge processors also need a vanilla client jar and java on PATH.
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().to_path_buf();
    let options = InstallOptions::new(&root, loader, &version)
        .with_build(&build)
        .with_game(
            root.join("versions").join(&version).join(format!("{}.jar", version)),
            root.join("versions").join(&version).join(format!("{}.json", version)),
        );

    println!("Installing {} {} ({}) into {}", loader, version, build, root.display());

    match install(&options, Arc::new(ConsoleReporter)).await {
        Ok(profile) => println!("Installed version profile {}", profile.id),
        Err(e) => {
            println!("Install failed: {}", serde_json::to_string(&e.to_tagged())?);
            std::process::exit(1);
        }
    }

    Ok(())
}
