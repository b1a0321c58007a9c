// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{Arg, ArgMatches, Command},
    click_package::{
        archive::ArchiveReader,
        audit::Auditor,
        click_control::ClickControl,
        config::InstallerConfig,
        deb::{builder::ClickBuilder, reader::DebArchiveReader},
        error::ClickError,
        install::Installer,
        signature::{AllowUnauthenticated, DebsigVerify, SignatureGate},
        status::StatusStore,
    },
    log::{info, LevelFilter},
    std::{
        io::Write,
        path::{Path, PathBuf},
    },
    thiserror::Error,
};

const INSTALL_ABOUT: &str = "\
Install a click package.

The package signature is verified with debsig-verify first. The package control
metadata is then audited: packages must have a valid name, supported
Click-Version and Click-Base-System fields, no Depends field and no maintainer
scripts.

The package is installed to <root>/<package>. A previously installed version of
the same package is replaced atomically.
";

const BUILD_ABOUT: &str = "\
Build a click package from a directory.

The directory must contain a .click/control (or DEBIAN/control) file holding the
package control paragraph. All other files in the directory become the package
data. The package is audited before it is written, so a package that builds
will pass the install audit.
";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("argument parsing error: {0}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    Click(#[from] ClickError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no install root specified (use --root, CLICK_ROOT or the root config setting)")]
    NoInstallRoot,

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

fn load_config(args: &ArgMatches) -> Result<InstallerConfig> {
    Ok(match args.value_of_os("config") {
        Some(path) => InstallerConfig::from_path(path)?,
        None => InstallerConfig::default(),
    })
}

/// Resolve the install root from arguments, falling back to the config.
fn resolve_root(args: &ArgMatches, config: &InstallerConfig) -> Result<PathBuf> {
    args.value_of_os("root")
        .map(PathBuf::from)
        .or_else(|| config.root.clone())
        .ok_or(CliError::NoInstallRoot)
}

fn signature_gate(args: &ArgMatches) -> Box<dyn SignatureGate> {
    if args.is_present("allow-unauthenticated") {
        Box::new(AllowUnauthenticated)
    } else {
        Box::new(DebsigVerify::default())
    }
}

fn archive_path(args: &ArgMatches) -> &Path {
    Path::new(
        args.value_of_os("archive")
            .expect("archive argument is required"),
    )
}

fn command_install(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let root = resolve_root(args, &config)?;
    let path = archive_path(args);

    signature_gate(args)
        .verify(path)
        .map_err(ClickError::from)?;

    let record = Installer::new(config)?.install(path, &root)?;
    info!(
        "installed {} {}",
        record.package,
        record.version.as_deref().unwrap_or("-")
    );

    Ok(())
}

fn command_verify(args: &ArgMatches) -> Result<()> {
    let path = archive_path(args);

    DebsigVerify::default()
        .verify(path)
        .map_err(ClickError::from)?;
    info!("{}: signature ok", path.display());

    Ok(())
}

fn command_info(args: &ArgMatches) -> Result<()> {
    let metadata = DebArchiveReader::open(archive_path(args))?.read_control()?;

    let mut stdout = std::io::stdout();
    stdout.write_all(&metadata.control_data)?;
    for name in metadata.scripts.names() {
        writeln!(stdout, "# maintainer script: {}", name)?;
    }

    Ok(())
}

fn command_list(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let root = resolve_root(args, &config)?;

    for record in StatusStore::new(&root).list_installed()? {
        println!(
            "{}\t{}",
            record.package,
            record.version.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

fn command_build(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let source_dir = Path::new(
        args.value_of_os("directory")
            .expect("directory argument is required"),
    );

    let builder = ClickBuilder::from_directory(source_dir)?;

    let control = ClickControl::from(builder.control().clone());
    let package = Auditor::new(config.audit_policy()?)
        .audit(&control, &builder.maintainer_scripts()?)?
        .to_string();

    let output = match args.value_of_os("output") {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(format!(
            "{}_{}_{}.click",
            package,
            control.version().unwrap_or("0"),
            control.architecture().unwrap_or("all")
        )),
    };

    let mut fh = std::fs::File::create(&output)?;
    builder.write(&mut fh)?;
    info!("wrote {}", output.display());

    Ok(())
}

fn archive_arg() -> Arg<'static> {
    Arg::new("archive")
        .required(true)
        .allow_invalid_utf8(true)
        .help("Path to a .click file")
}

fn app() -> Command<'static> {
    Command::new("click")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Build, verify and install click packages")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .takes_value(true)
                .global(true)
                .allow_invalid_utf8(true)
                .help("Path to a TOML installer configuration file"),
        )
        .arg(
            Arg::new("root")
                .long("root")
                .takes_value(true)
                .global(true)
                .env("CLICK_ROOT")
                .allow_invalid_utf8(true)
                .help("Install root directory"),
        )
        .subcommand(
            Command::new("install")
                .about("Install a click package")
                .long_about(INSTALL_ABOUT)
                .arg(archive_arg())
                .arg(
                    Arg::new("allow-unauthenticated")
                        .long("allow-unauthenticated")
                        .help("Do not verify the package signature"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Verify the signature of a click package")
                .arg(archive_arg()),
        )
        .subcommand(
            Command::new("info")
                .about("Print the control metadata of a click package")
                .arg(archive_arg()),
        )
        .subcommand(Command::new("list").about("List packages installed in the install root"))
        .subcommand(
            Command::new("build")
                .about("Build a click package from a directory")
                .long_about(BUILD_ABOUT)
                .arg(
                    Arg::new("directory")
                        .required(true)
                        .allow_invalid_utf8(true)
                        .help("Directory holding the package content"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .takes_value(true)
                        .allow_invalid_utf8(true)
                        .help("Path of the .click file to write"),
                ),
        )
}

pub fn run_cli() -> Result<()> {
    let matches = app().get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    match matches.subcommand() {
        Some(("build", args)) => command_build(args),
        Some(("info", args)) => command_info(args),
        Some(("install", args)) => command_install(args),
        Some(("list", args)) => command_list(args),
        Some(("verify", args)) => command_verify(args),
        Some((command, _)) => Err(CliError::InvalidSubCommand(command.to_string())),
        None => {
            app().print_help()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::ffi::OsString};

    #[test]
    fn app_is_well_formed() {
        app().debug_assert();
    }

    #[test]
    fn root_resolution() -> Result<()> {
        let config = InstallerConfig {
            root: Some(PathBuf::from("/from/config")),
            ..Default::default()
        };

        let matches = app().try_get_matches_from(["click", "--root", "/from/flag", "list"])?;
        let (_, args) = matches.subcommand().expect("subcommand present");
        assert_eq!(resolve_root(args, &config)?, PathBuf::from("/from/flag"));

        let matches = app().try_get_matches_from(["click", "list"])?;
        let (_, args) = matches.subcommand().expect("subcommand present");
        if std::env::var_os("CLICK_ROOT").is_none() {
            assert_eq!(resolve_root(args, &config)?, PathBuf::from("/from/config"));
            assert!(matches!(
                resolve_root(args, &InstallerConfig::default()),
                Err(CliError::NoInstallRoot)
            ));
        }

        Ok(())
    }

    #[test]
    fn install_requires_archive() {
        assert!(app().try_get_matches_from(["click", "install"]).is_err());
        assert!(app()
            .try_get_matches_from(["click", "install", "foo.click", "--allow-unauthenticated"])
            .is_ok());
    }

    #[test]
    fn build_and_list() -> Result<()> {
        let td = tempfile::tempdir()?;
        let source = td.path().join("source");
        std::fs::create_dir_all(source.join(".click"))?;
        std::fs::write(
            source.join(".click/control"),
            "Package: cli-package\nVersion: 2.0\nArchitecture: all\n\
             Click-Version: 0.1\nClick-Base-System: 13.04\n",
        )?;
        std::fs::write(source.join("hello.txt"), "hello")?;

        let output = td.path().join("cli-package.click");
        let matches = app().try_get_matches_from(vec![
            OsString::from("click"),
            OsString::from("build"),
            source.clone().into_os_string(),
            OsString::from("--output"),
            output.clone().into_os_string(),
        ])?;
        let (_, args) = matches.subcommand().expect("subcommand present");
        command_build(args)?;

        let root = td.path().join("root");
        Installer::new(InstallerConfig::default())?.install(&output, &root)?;

        let records = StatusStore::new(&root).list_installed()?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].package, "cli-package");
        assert_eq!(std::fs::read_to_string(root.join("cli-package/hello.txt"))?, "hello");

        Ok(())
    }
}
