/*
 * Copyright 2025 Oxide Computer Company
 */

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use vlab_common::read_toml;

#[derive(Deserialize, Clone)]
pub struct Config {
    pub default_profile: Option<String>,
    pub profile: HashMap<String, Profile>,
}

#[derive(Deserialize, Clone)]
pub struct Profile {
    pub url: String,
    pub username: String,
    pub password: String,
    /**
     * Lab controllers commonly run with a self-signed certificate; a
     * profile for such a controller sets this to false, and the tools pass
     * the relaxation on to the client explicitly.
     */
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,
    /** Default lab title substring for the tools to search for. */
    pub lab: Option<String>,
}

fn default_tls_verify() -> bool {
    true
}

fn env(n: &str) -> Option<String> {
    std::env::var(n).map(Some).unwrap_or(None)
}

impl Profile {
    fn from_env() -> Option<Profile> {
        let url = env("VLAB_URL");
        let username = env("VLAB_USERNAME");
        let password = env("VLAB_PASSWORD");

        match (url, username, password) {
            (Some(url), Some(username), Some(password)) => Some(Profile {
                url,
                username,
                password,
                tls_verify: true,
                lab: env("VLAB_LAB"),
            }),
            _ => None,
        }
    }

    fn apply_env(&mut self) {
        if let Some(url) = env("VLAB_URL") {
            self.url = url;
        }
        if let Some(username) = env("VLAB_USERNAME") {
            self.username = username;
        }
        if let Some(password) = env("VLAB_PASSWORD") {
            self.password = password;
        }
    }
}

pub fn load(profile: Option<&str>, file: Option<&Path>) -> Result<Profile> {
    /*
     * First, try to use the environment.  If we have a complete profile in
     * the environment we don't need to look at the file system at all.
     */
    if file.is_none() {
        if let Some(p) = Profile::from_env() {
            return Ok(p);
        }
    }

    /*
     * Next, locate our configuration file.
     */
    let path = if let Some(f) = file {
        f.to_path_buf()
    } else {
        let mut path: PathBuf = dirs_next::config_dir()
            .ok_or_else(|| anyhow!("could not find config directory"))?;
        path.push("vlab");
        path.push("config.toml");
        path
    };

    let c: Config = read_toml(&path)
        .with_context(|| anyhow!("reading file {:?}", path))?;

    let profile = if let Some(profile) = profile {
        profile
    } else if let Some(profile) = c.default_profile.as_deref() {
        profile
    } else {
        "default"
    };

    if let Some(profile) = c.profile.get(profile) {
        let mut profile = profile.clone();
        profile.apply_env();
        Ok(profile)
    } else {
        bail!(
            "profile \"{}\" not found in configuration file {:?}",
            profile,
            path
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
        default_profile = "rack"

        [profile.rack]
        url = "https://cml.lab.example"
        username = "admin"
        password = "hunter2"
        tls_verify = false
        lab = "clus"

        [profile.other]
        url = "https://other.lab.example"
        username = "student"
        password = "s"
    "#;

    #[test]
    fn parse_profiles() {
        let c: Config = toml::from_str(CONFIG).unwrap();
        assert_eq!(c.default_profile.as_deref(), Some("rack"));

        let rack = &c.profile["rack"];
        assert_eq!(rack.url, "https://cml.lab.example");
        assert!(!rack.tls_verify);
        assert_eq!(rack.lab.as_deref(), Some("clus"));

        /*
         * TLS verification defaults on when the profile does not mention it.
         */
        assert!(c.profile["other"].tls_verify);
        assert!(c.profile["other"].lab.is_none());
    }

    #[test]
    fn load_named_profile_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{}", CONFIG).unwrap();

        let p = load(Some("other"), Some(f.path())).unwrap();
        assert_eq!(p.username, "student");

        let p = load(None, Some(f.path())).unwrap();
        assert_eq!(p.username, "admin");

        assert!(load(Some("nope"), Some(f.path())).is_err());
    }
}
