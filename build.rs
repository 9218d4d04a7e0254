// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .default_value("/etc/cptmatch/distributions.toml")
        .help("Distribution registry")
}

fn build_cli() -> Command {
    Command::new("cptmatch")
        .version(env!("CARGO_PKG_VERSION"))
        .author("cptmatch Contributors")
        .about("Track AppStream component versions across Linux distributions")
        .subcommand_required(false)
        .arg(config_arg())
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .subcommand(
            Command::new("update")
                .about("Refresh repository caches of all distributions")
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Refresh even if caches haven't expired"),
                ),
        )
        .subcommand(
            Command::new("ingest")
                .about("Match AppStream components against cached packages")
                .arg(
                    Arg::new("refresh")
                        .short('r')
                        .long("refresh")
                        .action(ArgAction::SetTrue)
                        .help("Refresh caches first"),
                )
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Refresh even if caches haven't expired (implies --refresh)"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("PATH")
                        .help("Write JSON lines here instead of stdout"),
                ),
        )
        .subcommand(Command::new("releases").about("List configured releases"))
        .subcommand(
            Command::new("probe")
                .about("Detect the metadata format of a repository")
                .arg(
                    Arg::new("resource")
                        .required(true)
                        .help("Local path or HTTP(S) URL of the repository root"),
                ),
        )
        .subcommand(
            Command::new("packages")
                .about("Show a package's version in every release")
                .arg(Arg::new("name").required(true).help("Package name"))
                .arg(
                    Arg::new("distro")
                        .short('d')
                        .long("distro")
                        .help("Only this distribution"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("cptmatch.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
