//! Every member manifest inherits the workspace version, and the internal
//! dependency pin follows it.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap()
        .to_path_buf()
}

fn manifest(path: &Path) -> toml::Value {
    let raw = std::fs::read_to_string(path.join("Cargo.toml")).unwrap();
    raw.parse().unwrap()
}

fn workspace_version(root: &toml::Value) -> &str {
    root["workspace"]["package"]["version"].as_str().unwrap()
}

#[test]
fn members_inherit_workspace_version() {
    let root_dir = workspace_root();
    let root = manifest(&root_dir);
    let members = root["workspace"]["members"].as_array().unwrap();
    assert_eq!(members.len(), 2);

    for member in members {
        let member = member.as_str().unwrap();
        let doc = manifest(&root_dir.join(member));
        let inherited = doc["package"]["version"]
            .get("workspace")
            .and_then(|v| v.as_bool());
        assert_eq!(inherited, Some(true), "{member} must use version.workspace = true");
    }
}

#[test]
fn internal_dependency_pin_matches_workspace_version() {
    let root = manifest(&workspace_root());
    let pinned = root["workspace"]["dependencies"]["agentfleet-core"]["version"]
        .as_str()
        .unwrap();
    assert_eq!(pinned, workspace_version(&root));
    assert_eq!(pinned, env!("CARGO_PKG_VERSION"));
    assert_eq!(agentfleet_core::VERSION, env!("CARGO_PKG_VERSION"));
}
