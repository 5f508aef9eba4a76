use itertools::Itertools;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::asset::DEFAULT_QUALIFIER;
use crate::models::Environment;
use crate::{Error, Result};

pub const DEFAULT_PROFILE: &str = "personal";
pub const DEFAULT_BOOTSTRAP: &str = "bootstrap/config.sh";

pub const ENVIRONMENTS_VAR: &str = "IPSEC_VPN_ENVIRONMENTS";
pub const PROFILE_VAR: &str = "IPSEC_VPN_PROFILE";
pub const BOOTSTRAP_VAR: &str = "IPSEC_VPN_BOOTSTRAP";
pub const QUALIFIER_VAR: &str = "IPSEC_VPN_QUALIFIER";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnvironmentsFile {
    profile: Option<String>,
    #[serde(default, rename = "environment")]
    environments: Vec<Environment>,
}

/// Values given on the command line; they win over everything else
#[derive(Debug, Default)]
pub struct Overrides {
    pub environments: Option<PathBuf>,
    pub profile: Option<String>,
    pub bootstrap: Option<PathBuf>,
}

#[derive(Debug)]
pub struct Settings {
    pub environments: Vec<Environment>,
    pub profile: String,
    pub qualifier: String,
    pub bootstrap: PathBuf,
}

/// The stacks deployed when no environments file is given.
/// Hyderabad has no image yet and fails until one is filled in.
pub fn default_environments() -> Vec<Environment> {
    vec![
        Environment::new("India-PersonalIpsecVpnStack", "ap-south-2", "unknown"),
        Environment::new("US-PersonalIpsecVpnStack", "us-west-2", "ami-0836fd4a4a0b4f6ec"),
        Environment::new("Oceania-PersonalIpsecVpnStack", "ap-southeast-2", "ami-09b56d1f2bd9893f7"),
        Environment::new("Japan-PersonalIpsecVpnStack", "ap-northeast-3", "ami-0f9c25ede29180ec2"),
    ]
}

fn parse_environments(text: &str, path: &Path) -> Result<EnvironmentsFile> {
    toml::from_str(text).map_err(|source| Error::ParseConfiguration { path: path.to_path_buf(), source })
}

/// Stack names identify stacks in the engine and must not repeat
pub fn check_unique(environments: &[Environment]) -> Result<()> {
    match environments.iter().map(|env| &env.stack_name).duplicates().next() {
        Some(stack) => Err(Error::DuplicateStack { stack: stack.clone() }),
        None => Ok(()),
    }
}

impl Settings {
    /// Combine command-line overrides, variables from `lookup`, and the
    /// environments file, in that order of precedence.
    pub fn resolve(overrides: Overrides, lookup: impl Fn(&str) -> Option<String>) -> Result<Settings> {
        let file = match overrides.environments.or_else(|| lookup(ENVIRONMENTS_VAR).map(PathBuf::from)) {
            Some(path) => {
                let text = fs::read_to_string(&path)
                    .map_err(|source| Error::ReadConfiguration { path: path.clone(), source })?;
                parse_environments(&text, &path)?
            },
            None => EnvironmentsFile { profile: None, environments: default_environments() },
        };
        check_unique(&file.environments)?;

        let profile = overrides.profile
            .or_else(|| lookup(PROFILE_VAR))
            .or(file.profile)
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        let bootstrap = overrides.bootstrap
            .or_else(|| lookup(BOOTSTRAP_VAR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BOOTSTRAP));
        let qualifier = lookup(QUALIFIER_VAR).unwrap_or_else(|| DEFAULT_QUALIFIER.to_string());

        Ok(Settings { environments: file.environments, profile, qualifier, bootstrap })
    }

    /// Environments whose stack name is in `names`, or all when it is empty
    pub fn select(&self, names: &[String]) -> Result<Vec<&Environment>> {
        if names.is_empty() {
            return Ok(self.environments.iter().collect());
        }
        names.iter().map(|name| self.find(name)).collect()
    }

    pub fn find(&self, name: &str) -> Result<&Environment> {
        self.environments
            .iter()
            .find(|env| env.stack_name == name)
            .ok_or_else(|| Error::UnknownStack { stack: name.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_vars(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(Overrides::default(), no_vars).unwrap();
        assert_eq!(settings.environments, default_environments());
        assert_eq!(settings.profile, "personal");
        assert_eq!(settings.qualifier, "hnb659fds");
        assert_eq!(settings.bootstrap, PathBuf::from("bootstrap/config.sh"));
    }

    #[test]
    fn test_parse_environments() {
        let text = indoc!(r#"
            profile = "work"

            [[environment]]
            stack_name = "US-PersonalIpsecVpnStack"
            region = "us-west-2"
            image_id = "ami-0836fd4a4a0b4f6ec"

            [[environment]]
            stack_name = "EU-PersonalIpsecVpnStack"
            region = "eu-west-1"
            image_id = "ami-0123"
        "#);
        let file = parse_environments(text, Path::new("environments.toml")).unwrap();
        assert_eq!(file.profile.as_deref(), Some("work"));
        assert_eq!(file.environments, vec![
            Environment::new("US-PersonalIpsecVpnStack", "us-west-2", "ami-0836fd4a4a0b4f6ec"),
            // An unsupported region is only rejected when that stack is built
            Environment::new("EU-PersonalIpsecVpnStack", "eu-west-1", "ami-0123"),
        ]);
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        let text = indoc!(r#"
            [[environment]]
            stack_name = "US-PersonalIpsecVpnStack"
            region = "us-west-2"
        "#);
        let err = parse_environments(text, Path::new("environments.toml")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_duplicate_stack_names() {
        let envs = vec![
            Environment::new("VpnStack", "us-west-2", "ami-1"),
            Environment::new("VpnStack", "ap-northeast-3", "ami-2"),
        ];
        match check_unique(&envs) {
            Err(Error::DuplicateStack { stack }) => assert_eq!(stack, "VpnStack"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", indoc!(r#"
            profile = "from-file"

            [[environment]]
            stack_name = "US-PersonalIpsecVpnStack"
            region = "us-west-2"
            image_id = "ami-0836fd4a4a0b4f6ec"
        "#)).unwrap();

        let mut vars = HashMap::new();
        vars.insert(ENVIRONMENTS_VAR, file.path().to_string_lossy().into_owned());
        vars.insert(QUALIFIER_VAR, "custom".to_string());
        let lookup = |name: &str| vars.get(name).cloned();

        let settings = Settings::resolve(Overrides::default(), &lookup).unwrap();
        assert_eq!(settings.environments.len(), 1);
        assert_eq!(settings.profile, "from-file");
        assert_eq!(settings.qualifier, "custom");

        vars.insert(PROFILE_VAR, "from-var".to_string());
        let lookup = |name: &str| vars.get(name).cloned();
        let settings = Settings::resolve(Overrides::default(), &lookup).unwrap();
        assert_eq!(settings.profile, "from-var");

        let overrides = Overrides { profile: Some("from-flag".into()), ..Overrides::default() };
        let settings = Settings::resolve(overrides, &lookup).unwrap();
        assert_eq!(settings.profile, "from-flag");
    }

    #[test]
    fn test_select() {
        let settings = Settings::resolve(Overrides::default(), no_vars).unwrap();
        assert_eq!(settings.select(&[]).unwrap().len(), 4);
        let picked = settings.select(&["Japan-PersonalIpsecVpnStack".to_string()]).unwrap();
        assert_eq!(picked[0].region, "ap-northeast-3");
        assert!(settings.select(&["Nope".to_string()]).is_err());
    }
}
