/*
 * Copyright 2025 Oxide Computer Company
 */

/*
 * Locate a lab whose title contains a target substring and ask the
 * controller to start it, then report the state the lab settles into.
 */

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use getopts::Options;
use slog::{error, info};
use vlab_client::{authenticate, ClientBuilder, LabMatch, AUTH_ATTEMPTS};
use vlab_common::make_log;

#[tokio::main]
async fn main() -> Result<()> {
    let mut opts = Options::new();

    opts.optopt("p", "", "configuration profile", "PROFILE");
    opts.optopt("f", "", "configuration file", "CONFIG");
    opts.optopt("l", "", "lab title substring to search for", "TITLE");

    let p = match opts.parse(std::env::args().skip(1)) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("ERROR: usage: {}", e);
            eprintln!("       {}", opts.usage("usage"));
            std::process::exit(1);
        }
    };

    let log = make_log("vlab-launch");

    let profile = vlab_client::config::load(
        p.opt_str("p").as_deref(),
        p.opt_str("f").map(PathBuf::from).as_deref(),
    )?;

    let title = match p.opt_str("l").or_else(|| profile.lab.clone()) {
        Some(t) => t,
        None => bail!(
            "no lab title to search for; use -l or set \"lab\" in the profile"
        ),
    };

    let token = authenticate(&log, &profile, AUTH_ATTEMPTS)
        .await
        .context("unable to authenticate to the lab controller")?;

    let client = ClientBuilder::new(&profile.url)
        .bearer_token(&token)
        .accept_invalid_certs(!profile.tls_verify)
        .logger(log.clone())
        .build()?;

    let lab = match client.find_lab_by_title(&title).await? {
        LabMatch::Found(lab) => lab,
        LabMatch::NoLabs => {
            error!(log, "no labs on the controller; check settings and retry");
            std::process::exit(1);
        }
        LabMatch::NoMatch => {
            error!(log, "no lab title contains {:?}", title);
            std::process::exit(1);
        }
    };

    client.lab_start(&lab.id).await?;

    /*
     * Fetch the lab again so the operator can see what the start request
     * did.
     */
    let after = client.lab_get(&lab.id).await?;
    info!(log, "lab start requested";
        "lab" => after.id.to_string(),
        "state" => after.state.as_deref().unwrap_or("unknown").to_string());

    client.close();
    Ok(())
}
