// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn install_subcommands(about: &'static str) -> Command {
    Command::new("x")
        .about(about)
        .subcommand_required(true)
        .subcommand(Command::new("list").about("List available items"))
        .subcommand(
            Command::new("install")
                .about("Install items by name")
                .arg(Arg::new("items").num_args(0..).help("Item names"))
                .arg(
                    Arg::new("all")
                        .short('a')
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .help("Install every item"),
                ),
        )
}

fn build_cli() -> Command {
    Command::new("stbpanel")
        .version(env!("CARGO_PKG_VERSION"))
        .author("stbpanel Contributors")
        .about("Add-on installer for Enigma2 set-top-boxes")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .default_value("/etc/stbpanel/config.json")
                .help("JSON file overriding the built-in directories and URLs"),
        )
        .arg(
            Arg::new("db_path")
                .short('d')
                .long("db-path")
                .value_name("PATH")
                .default_value("/etc/stbpanel/stbpanel.db")
                .help("Settings database path"),
        )
        .arg(
            Arg::new("reload_url")
                .long("reload-url")
                .value_name("URL")
                .help("Receiver web interface used to reload channel lists"),
        )
        .subcommand(
            install_subcommands("Channel logo packs").name("picons").arg(
                Arg::new("target")
                    .short('t')
                    .long("target")
                    .help("Picon target directory (remembered for next time)"),
            ),
        )
        .subcommand(
            install_subcommands("Bouquets from the repository archives")
                .name("bouquets")
                .arg(
                    Arg::new("fast")
                        .long("fast")
                        .action(ArgAction::SetTrue)
                        .help("Use the FAST channels repository"),
                ),
        )
        .subcommand(Command::new("iptv-org").about("Convert the iptv-org playlist into a bouquet"))
        .subcommand(
            Command::new("channels")
                .about("Convert a JSON channel map into a bouquet")
                .arg(Arg::new("url").required(true).help("Channel map URL"))
                .arg(
                    Arg::new("name")
                        .long("name")
                        .default_value("YouTube channels")
                        .help("Bouquet name shown on the receiver"),
                )
                .arg(
                    Arg::new("file")
                        .long("file")
                        .default_value("userbouquet.channels.tv")
                        .help("Bouquet file inside the channel-list directory"),
                ),
        )
        .subcommand(Command::new("epg").about("Install the EPG importer source descriptor"))
        .subcommand(Command::new("feed").about("Install the package feed and run opkg update"))
        .subcommand(
            Command::new("packages").about("List feed packages").arg(
                Arg::new("filter")
                    .short('f')
                    .long("filter")
                    .action(ArgAction::Append)
                    .help("Only show packages whose name contains this keyword"),
            ),
        )
        .subcommand(
            Command::new("package")
                .about("Install or remove a feed package")
                .subcommand(
                    Command::new("install")
                        .arg(Arg::new("name").required(true).help("Package name")),
                )
                .subcommand(
                    Command::new("remove")
                        .arg(Arg::new("name").required(true).help("Package name")),
                ),
        )
        .subcommand(install_subcommands("E2Kodi skins").name("skins"))
        .subcommand(install_subcommands("E2Kodi plugins").name("plugins"))
        .subcommand(
            Command::new("settings")
                .about("Show or change persisted settings")
                .arg(
                    Arg::new("picon_dir")
                        .long("picon-dir")
                        .value_name("PATH")
                        .help("Remember this picon directory"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("stbpanel.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
