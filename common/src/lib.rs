/*
 * Copyright 2025 Oxide Computer Company
 */

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use serde::Deserialize;
use slog::{o, Drain, Logger};

pub fn read_toml<P: AsRef<Path>, T>(n: P) -> Result<T>
where
    for<'de> T: Deserialize<'de>,
{
    let s = std::fs::read_to_string(n.as_ref())?;
    Ok(toml::from_str(&s)?)
}

pub fn make_log(name: &'static str) -> Logger {
    let filter_level = match std::env::var("VLAB_DEBUG")
        .map(|v| v.to_ascii_lowercase())
        .as_deref()
    {
        Ok("yes") | Ok("1") | Ok("true") => slog::Level::Debug,
        _ => slog::Level::Info,
    };

    if std::io::stdout().is_terminal() {
        /*
         * Use a terminal-formatted logger for interactive processes.
         */
        let dec = slog_term::TermDecorator::new().stdout().build();
        let dr = Mutex::new(
            slog_term::FullFormat::new(dec).use_original_order().build(),
        )
        .filter_level(filter_level)
        .fuse();
        Logger::root(dr, o!("name" => name))
    } else {
        /*
         * Otherwise, emit bunyan-formatted records:
         */
        let dr = Mutex::new(
            slog_bunyan::with_name(name, std::io::stdout())
                .set_flush(true)
                .build(),
        )
        .filter_level(filter_level)
        .fuse();
        Logger::root(dr, o!())
    }
}

#[cfg(test)]
mod test {
    use super::read_toml;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn read_toml_basic() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "name = \"gzunda\"\ncount = 5\n").unwrap();

        let s: Sample = read_toml(f.path()).unwrap();
        assert_eq!(s.name, "gzunda");
        assert_eq!(s.count, 5);
    }

    #[test]
    fn read_toml_missing_file() {
        let r: anyhow::Result<Sample> = read_toml("/nonexistent/vlab.toml");
        assert!(r.is_err());
    }
}
