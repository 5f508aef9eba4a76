use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::asset::BootstrapScript;
use crate::models::ResourceGraph;
use crate::template;
use crate::{Error, Result};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StackArtifact {
    pub template_file: String,
    /// `aws://unknown-account/{region}`: the account is left to the deployer
    pub environment: String,
    pub asset: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AssetEntry {
    pub path: String,
    /// Object keys per region bucket
    pub destinations: BTreeMap<String, AssetDestination>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AssetDestination {
    pub bucket_name: String,
    pub object_key: String,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct Manifest {
    pub stacks: BTreeMap<String, StackArtifact>,
    pub assets: BTreeMap<String, AssetEntry>,
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).map_err(|source| Error::Io { path: path.to_path_buf(), source })
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let mut text = serde_json::to_string_pretty(value).map_err(Error::Json)?;
    text.push('\n');
    write_file(path, text.as_bytes())
}

/// Write templates for `graphs`, the staged bootstrap script and the manifest.
pub fn write_assembly(out: &Path, script: &BootstrapScript, graphs: &[ResourceGraph]) -> Result<Manifest> {
    fs::create_dir_all(out).map_err(|source| Error::Io { path: out.to_path_buf(), source })?;

    let mut manifest = Manifest::default();
    for graph in graphs {
        let template_file = format!("{}.template.json", graph.stack_name);
        write_json(&out.join(&template_file), &template::render(graph))?;
        info!("Wrote {}", out.join(&template_file).display());

        let asset = manifest.assets.entry(graph.asset.source_hash.clone()).or_insert_with(|| AssetEntry {
            path: script.staged_file_name(),
            destinations: BTreeMap::new(),
        });
        asset.destinations.insert(graph.region.code().to_string(), AssetDestination {
            bucket_name: graph.asset.bucket_name.replace("${AWS::Region}", graph.region.code()),
            object_key: graph.asset.object_key.clone(),
        });

        manifest.stacks.insert(graph.stack_name.clone(), StackArtifact {
            template_file,
            environment: format!("aws://unknown-account/{}", graph.region),
            asset: graph.asset.source_hash.clone(),
        });
    }

    if !manifest.assets.is_empty() {
        let staged: PathBuf = out.join(script.staged_file_name());
        write_file(&staged, script.bytes())?;
        info!("Staged bootstrap script as {}", staged.display());
    }
    write_json(&out.join(MANIFEST_FILE), &manifest)?;
    Ok(manifest)
}

/// `aws s3 cp` commands that stage the bootstrap script in each region's bucket.
/// The account id is left as `${ACCOUNT_ID}` for the shell to fill in.
pub fn upload_commands(out: &Path, manifest: &Manifest, profile: &str) -> Vec<String> {
    let mut commands = vec![];
    for asset in manifest.assets.values() {
        for (region, dest) in &asset.destinations {
            commands.push(format!(
                "aws s3 cp {} s3://{}/{} --region {} --profile {}",
                out.join(&asset.path).display(),
                dest.bucket_name.replace("${AWS::AccountId}", "${ACCOUNT_ID}"),
                dest.object_key,
                region,
                profile,
            ));
        }
    }
    commands
}
