// ABOUTME: Project scaffolding for `deckhand --init`
// ABOUTME: Writes a starter config.json, assets folder, README and sample deck without prompting

use crate::errors::Result;
use crate::utils::{ensure_parent_directory_exists, to_title_case};
use chrono::Local;
use log::{info, warn};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

/// Write the starter project into `dir`. Existing files are left alone.
/// Returns the files that were created.
pub fn init(dir: &Path) -> Result<Vec<PathBuf>> {
    let name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "presentations".to_string());
    let project = to_title_case(&name);

    let config = json!({
        "project": project,
        "baseUrl": "slides",
        "outDir": "dist",
        "rootDir": "src",
        "assetsDir": "assets",
        "presentation": { "theme": "white" },
    });
    let today = Local::now().format("%Y-%m-%d");
    let deck = format!(
        "---\ntitle: Welcome\ndate: {today}\n---\n\n# {project}\n\nYour first presentation.\n\n---\n\n## Next steps\n\n- Edit `src/intro.md`\n- Run `deckhand . --watch`\n\nnote: Speaker notes go here.\n"
    );

    let files = [
        (dir.join("config.json"), serde_json::to_string_pretty(&config)? + "\n"),
        (dir.join("README.md"), format!("# {}\n", project)),
        (dir.join("src").join("intro.md"), deck),
        (dir.join("assets").join("styles").join("custom.css"), String::new()),
    ];

    let mut created = Vec::new();
    for (path, content) in files {
        if path.exists() {
            warn!("Keeping existing {:?}", path);
            continue;
        }
        ensure_parent_directory_exists(&path)?;
        fs::write(&path, content)?;
        created.push(path);
    }
    info!("Project initialized successfully.");
    Ok(created)
}
