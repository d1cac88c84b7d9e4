// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: stream version label
fn stream_version_arg() -> Arg {
    Arg::new("stream_version")
        .long("stream-version")
        .default_value("v1")
        .help("Stream version label under streams/")
}

/// Common argument: image directory
fn image_dir_arg() -> Arg {
    Arg::new("image_dirs")
        .short('d')
        .long("image-dir")
        .default_value("images")
        .action(ArgAction::Append)
        .help("Image directory, relative to the root (repeatable)")
}

fn build_cli() -> Command {
    Command::new("streamkeeper")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Maintain a Simplestreams image repository on a local filesystem")
        .arg(
            Arg::new("logformat")
                .long("logformat")
                .value_parser(["text", "json"])
                .default_value("text")
                .global(true)
                .help("Log output format"),
        )
        .arg(
            Arg::new("loglevel")
                .long("loglevel")
                .value_parser(["debug", "info", "warn", "error"])
                .default_value("info")
                .global(true)
                .help("Minimum level of logged messages"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .default_value("0")
                .global(true)
                .help("Abort the invocation after this many seconds (0 = no timeout)"),
        )
        .subcommand(
            Command::new("build")
                .about("Build the simplestream catalogs and index on the given path")
                .arg(Arg::new("root").required(true).help("Repository root directory"))
                .arg(stream_version_arg())
                .arg(image_dir_arg())
                .arg(
                    Arg::new("workers")
                        .long("workers")
                        .help("Maximum number of concurrent operations"),
                ),
        )
        .subcommand(
            Command::new("prune")
                .about("Prune obsolete or dangling product versions")
                .arg(Arg::new("root").required(true).help("Repository root directory"))
                .arg(stream_version_arg())
                .arg(image_dir_arg())
                .arg(
                    Arg::new("retain_builds")
                        .long("retain-builds")
                        .help("Number of newest complete versions to retain per product"),
                )
                .arg(
                    Arg::new("retain_days")
                        .long("retain-days")
                        .default_value("0")
                        .help("Age-based retention in days (0 disables the policy)"),
                )
                .arg(
                    Arg::new("dangling")
                        .long("dangling")
                        .action(ArgAction::SetTrue)
                        .help("Also remove aged versions the catalog does not reference"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    if let Err(e) = fs::write(man_dir.join("streamkeeper.1"), buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
