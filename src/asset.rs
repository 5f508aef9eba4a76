use sha2::{Digest, Sha256};

use crate::expr::Expr;

/// Arguments the bootstrap script runs with at first boot
pub const BOOTSTRAP_ARGUMENTS: &str = "--verbose -y";

/// Qualifier of the default CDK bootstrap resources
pub const DEFAULT_QUALIFIER: &str = "hnb659fds";

const SCRIPT_EXTENSION: &str = ".sh";

/// Script bytes as read from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapScript {
    bytes: Vec<u8>,
    digest: String,
}

impl BootstrapScript {
    pub fn from_bytes(bytes: Vec<u8>) -> BootstrapScript {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = format!("{:x}", hasher.finalize());
        BootstrapScript { bytes, digest }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Name of the staged copy inside a cloud assembly
    pub fn staged_file_name(&self) -> String {
        format!("asset.{}{}", self.digest, SCRIPT_EXTENSION)
    }

    /// Where the script lives once published for stacks using `qualifier`
    pub fn asset(&self, qualifier: &str) -> BootstrapAsset {
        BootstrapAsset {
            source_hash: self.digest.clone(),
            bucket_name: format!("cdk-{}-assets-${{AWS::AccountId}}-${{AWS::Region}}", qualifier),
            object_key: format!("{}{}", self.digest, SCRIPT_EXTENSION),
            arguments: BOOTSTRAP_ARGUMENTS.to_string(),
        }
    }
}

/// A published bootstrap script, as referenced from a stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAsset {
    pub source_hash: String,
    /// Bucket name with `${AWS::...}` placeholders left for the engine
    pub bucket_name: String,
    pub object_key: String,
    pub arguments: String,
}

impl BootstrapAsset {
    pub fn bucket(&self) -> Expr {
        Expr::sub(self.bucket_name.clone())
    }

    /// ARNs an identity needs read access to: the bucket and the object
    pub fn read_resources(&self) -> Vec<Expr> {
        vec![
            Expr::sub(format!("arn:${{AWS::Partition}}:s3:::{}", self.bucket_name)),
            Expr::sub(format!("arn:${{AWS::Partition}}:s3:::{}/*", self.bucket_name)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_sha256() {
        let script = BootstrapScript::from_bytes(b"abc".to_vec());
        assert_eq!(script.digest(), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert_eq!(script.staged_file_name(), format!("asset.{}.sh", script.digest()));
    }

    #[test]
    fn test_asset_location() {
        let script = BootstrapScript::from_bytes(b"#!/bin/sh\n".to_vec());
        let asset = script.asset(DEFAULT_QUALIFIER);
        assert_eq!(asset.object_key, format!("{}.sh", script.digest()));
        assert_eq!(asset.bucket_name, "cdk-hnb659fds-assets-${AWS::AccountId}-${AWS::Region}");
        assert_eq!(asset.arguments, "--verbose -y");
        assert_eq!(asset.read_resources().len(), 2);
    }

    #[test]
    fn test_changed_script_changes_key() {
        let a = BootstrapScript::from_bytes(b"echo one\n".to_vec()).asset(DEFAULT_QUALIFIER);
        let b = BootstrapScript::from_bytes(b"echo two\n".to_vec()).asset(DEFAULT_QUALIFIER);
        assert_ne!(a.object_key, b.object_key);
    }
}
