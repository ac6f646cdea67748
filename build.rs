//! Build script generating manual pages from the CLI definition.

use std::{fs, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
#[expect(dead_code, reason = "only the command definition is used here")]
mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = PathBuf::from("target/generated-man");
    fs::create_dir_all(&out_dir)?;

    let cmd = cli::Cli::command();
    let mut buf: Vec<u8> = Vec::new();
    Man::new(cmd.clone()).render(&mut buf)?;
    fs::write(out_dir.join("framelink.1"), buf)?;

    for sub in cmd.get_subcommands() {
        let name = format!("framelink-{}", sub.get_name());
        let mut buf: Vec<u8> = Vec::new();
        Man::new(sub.clone()).title(name.clone()).render(&mut buf)?;
        fs::write(out_dir.join(format!("{name}.1")), buf)?;
    }

    Ok(())
}
