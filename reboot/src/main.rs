/*
 * Copyright 2025 Oxide Computer Company
 */

/*
 * Locate a node by label in a lab whose title contains a target substring,
 * and restart it: stop, wait for STOPPED, start, wait for STARTED.
 */

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use getopts::Options;
use slog::{error, info, warn};
use vlab_client::{
    authenticate, ClientBuilder, LabMatch, PollPolicy, AUTH_ATTEMPTS,
};
use vlab_common::make_log;

#[tokio::main]
async fn main() -> Result<()> {
    let mut opts = Options::new();

    opts.reqopt("n", "", "label of the node to restart", "NODE");
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

    let log = make_log("vlab-reboot");

    let profile = vlab_client::config::load(
        p.opt_str("p").as_deref(),
        p.opt_str("f").map(PathBuf::from).as_deref(),
    )?;

    let node_label = p.opt_str("n").context("node label is required")?;

    let title = match p.opt_str("l").or_else(|| profile.lab.clone()) {
        Some(t) => t,
        None => bail!(
            "no lab title to search for; use -l or set \"lab\" in the profile"
        ),
    };

    /*
     * Without a token there is nothing further we can do; the operator
     * should check settings and controller reachability.
     */
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

    let node = match client.find_node_by_label(&lab.id, &node_label).await? {
        Some(node) => node,
        None => {
            error!(log, "no node in lab {} has label {:?}",
                lab.id, node_label);
            std::process::exit(1);
        }
    };

    info!(log, "node located, restarting device";
        "node" => node.id.to_string(), "label" => node.label.to_string());

    let ok = client
        .restart_node(&lab.id, &node.id, &PollPolicy::default())
        .await?;

    if ok {
        info!(log, "node restarted; allow a few minutes for bootup");
        client.close();
        Ok(())
    } else {
        warn!(log, "problem restarting the node; \
            ask your proctor for assistance");
        client.close();
        std::process::exit(1);
    }
}
