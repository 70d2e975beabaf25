use pack200::*;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use env_logger::Env;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process;

fn pack_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("no-gzip")
                .long("no-gzip")
                .action(ArgAction::SetTrue)
                .help("Do not wrap the archive in gzip"),
        )
        .arg(
            Arg::new("segment-limit")
                .long("segment-limit")
                .value_name("BYTES")
                .value_parser(value_parser!(i64))
                .allow_negative_numbers(true)
                .help("Input bytes per segment (-1 for a single segment)"),
        )
        .arg(
            Arg::new("unknown-attribute")
                .long("unknown-attribute")
                .value_name("ACTION")
                .value_parser(UnknownAttributeAction::CHOICES.to_vec())
                .help("What to do with classes carrying unknown attributes"),
        )
        .arg(
            Arg::new("strip-debug")
                .long("strip-debug")
                .action(ArgAction::SetTrue)
                .help("Drop source file, line number, and local variable attributes"),
        )
        .arg(
            Arg::new("deflate-hint")
                .long("deflate-hint")
                .value_name("HINT")
                .value_parser(DeflateHint::CHOICES.to_vec())
                .help("Whether files should be stored deflated"),
        )
        .arg(
            Arg::new("modification-time")
                .long("modification-time")
                .value_name("TIME")
                .value_parser(ModificationTime::CHOICES.to_vec())
                .help("Keep file modification times, or use the latest one of each segment"),
        )
}

fn pack_settings(matches: &ArgMatches) -> Result<PackSettings, Error> {
    let mut settings = PackSettings {
        gzip: !matches.get_flag("no-gzip"),
        strip_debug: matches.get_flag("strip-debug"),
        ..PackSettings::default()
    };
    if let Some(limit) = matches.get_one::<i64>("segment-limit") {
        settings.segment_limit = usize::try_from(*limit).ok();
    }
    if let Some(action) = matches.get_one::<String>("unknown-attribute") {
        settings.unknown_attribute = action.parse()?;
    }
    if let Some(hint) = matches.get_one::<String>("deflate-hint") {
        settings.deflate_hint = hint.parse()?;
    }
    if let Some(time) = matches.get_one::<String>("modification-time") {
        settings.modification_time = time.parse()?;
    }
    Ok(settings)
}

fn unpack_settings(matches: &ArgMatches) -> Result<UnpackSettings, Error> {
    let mut settings = UnpackSettings::default();
    if let Some(hint) = matches.get_one::<String>("deflate-hint") {
        settings.deflate_hint = hint.parse()?;
    }
    Ok(settings)
}

fn path_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help(help)
}

fn path<'a>(matches: &'a ArgMatches, name: &str) -> &'a PathBuf {
    matches
        .get_one::<PathBuf>(name)
        .expect("required argument")
}

fn run(matches: &ArgMatches) -> Result<(), Error> {
    match matches.subcommand() {
        Some(("pack", matches)) => {
            let settings = pack_settings(matches)?;
            let jar = path(matches, "JAR");
            let output = path(matches, "OUTPUT");
            log::info!("Packing '{}' into '{}'", jar.display(), output.display());
            let jar = BufReader::new(File::open(jar)?);
            let output = BufWriter::new(File::create(output)?);
            archive::pack(jar, output, &settings)
        }
        Some(("unpack", matches)) => {
            let settings = unpack_settings(matches)?;
            let input = path(matches, "INPUT");
            let jar = path(matches, "JAR");
            log::info!("Unpacking '{}' into '{}'", input.display(), jar.display());
            let input = File::open(input)?;
            let jar = BufWriter::new(File::create(jar)?);
            archive::unpack(input, jar, &settings)
        }
        Some(("repack", matches)) => {
            let settings = pack_settings(matches)?;
            let jar = path(matches, "JAR");
            let output = path(matches, "OUTPUT_JAR");
            log::info!("Repacking '{}' into '{}'", jar.display(), output.display());
            let jar = BufReader::new(File::open(jar)?);
            let output = BufWriter::new(File::create(output)?);
            archive::repack(jar, output, &settings, &unpack_settings(matches)?)
        }
        _ => unreachable!("subcommand is required"),
    }
}

fn main() {
    let matches = Command::new("pack200")
        .version(clap::crate_version!())
        .about("Pack JARs into pack200 archives and unpack them back")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Log more (repeat for even more)"),
        )
        .subcommand(
            pack_args(Command::new("pack").about("Pack a JAR into a pack200 archive"))
                .arg(path_arg("OUTPUT", "Pack200 archive to write"))
                .arg(path_arg("JAR", "JAR to pack")),
        )
        .subcommand(
            Command::new("unpack")
                .about("Unpack a pack200 archive (gzipped or not) into a JAR")
                .arg(
                    Arg::new("deflate-hint")
                        .long("deflate-hint")
                        .value_name("HINT")
                        .value_parser(DeflateHint::CHOICES.to_vec())
                        .help("Override whether files are stored deflated"),
                )
                .arg(path_arg("INPUT", "Pack200 archive to read"))
                .arg(path_arg("JAR", "JAR to write")),
        )
        .subcommand(
            pack_args(Command::new("repack").about("Pack then unpack a JAR"))
                .arg(path_arg("JAR", "JAR to repack"))
                .arg(path_arg("OUTPUT_JAR", "JAR to write")),
        )
        .get_matches();

    let level = match matches.get_count("verbose") {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    if let Err(err) = run(&matches) {
        log::error!("{}", err);
        eprintln!("pack200: {}", err);
        process::exit(1);
    }
}
