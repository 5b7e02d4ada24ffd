use std::path::PathBuf;

use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use filechooser_cloud::{Chooser, ChooserConfig, SessionCache};
use filechooser_common::CredentialStatus;

const DEFAULT_CONFIG_PATH: &str = "filechooser.toml";
const USAGE: &str = "usage: filechooser [config.toml] [/bucket/path] [--json]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let mut json_output = false;
    let mut positional = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--json" => json_output = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            flag if flag.starts_with("--") => anyhow::bail!("unknown flag {flag}\n{USAGE}"),
            _ => positional.push(arg),
        }
    }

    let config_path = positional
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = ChooserConfig::load(&PathBuf::from(&config_path))?;
    let path = positional
        .get(1)
        .cloned()
        .or_else(|| config.start_path.clone())
        .unwrap_or_else(|| "/".to_string());

    let mut chooser = Chooser::new(SessionCache::new())
        .with_icons(if json_output { None } else { config.icon_set() })
        .with_only_dirs(config.show_only_dirs)
        .with_filter(config.name_filter()?);

    let kind = config.source.kind();
    info!(source = %kind, identity = %config.source.identity(), "filechooser starting");
    let reason = |chooser: &Chooser| chooser.last_error().unwrap_or_else(|| "unknown error".to_string());
    match chooser.open(&config.source).await {
        CredentialStatus::Valid => {}
        CredentialStatus::Invalid => {
            anyhow::bail!("{} credentials rejected: {}", kind, reason(&chooser))
        }
        CredentialStatus::Undetermined => {
            anyhow::bail!("could not verify {} credentials: {}", kind, reason(&chooser))
        }
    }

    let node = match chooser.navigate(&path).await {
        Some(node) => node,
        None => anyhow::bail!("{} not found: {}", path, reason(&chooser)),
    };

    if node.is_file() && !config.show_only_dirs {
        let data = match chooser.read_selected().await {
            Some(data) => data,
            None => anyhow::bail!("failed to read {}: {}", path, reason(&chooser)),
        };
        let selected = chooser.selected_path().unwrap_or(path);
        if json_output {
            println!("{}", json!({ "path": selected, "size": data.len() }));
        } else {
            println!("{}\t{} bytes", selected, data.len());
        }
        return Ok(());
    }

    let listing = match chooser.listing().await {
        Some(listing) => listing,
        None => anyhow::bail!("failed to list {}: {}", path, reason(&chooser)),
    };
    let current = chooser.selected_path().unwrap_or(path);

    if json_output {
        let entries: Vec<_> = listing
            .iter()
            .filter(|(_, node)| !node.is_root_marker())
            .map(|(_, node)| {
                json!({
                    "name": node.short_name(),
                    "kind": if node.is_dir() { "dir" } else { "file" },
                })
            })
            .collect();
        println!("{}", json!({ "path": current, "entries": entries }));
    } else {
        println!("{current}");
        for (display, _) in &listing {
            println!("  {display}");
        }
    }
    Ok(())
}
