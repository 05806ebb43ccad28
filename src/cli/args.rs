use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};

use crate::config::CliOverrides;

#[derive(Debug, Clone)]
pub struct OutputFlags {
    pub json: bool,
    pub markdown: bool,
    pub pretty: bool,
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub environment: Option<String>,
    pub server: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: Option<u64>,
    pub encrypt: Option<bool>,
    pub trust_cert: Option<bool>,
    pub source_path: Option<PathBuf>,
    pub output: OutputFlags,
    pub verbose: u8,
    pub quiet: bool,
    pub command: CommandKind,
}

impl CliArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            config_path: self.config_path.clone(),
            env_file: self.env_file.clone(),
            environment: self.environment.clone(),
            server: self.server.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            timeout_ms: self.timeout_ms,
            encrypt: self.encrypt,
            trust_cert: self.trust_cert,
            source_path: self.source_path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Deploy(DeployArgs),
    Plan(PlanArgs),
    Translate(TranslateArgs),
    Init(InitArgs),
    Config(ConfigArgs),
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeployArgs {
    pub audit_only: bool,
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlanArgs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateArgs {
    pub platform: String,
    pub sql: Option<String>,
    pub file: Option<PathBuf>,
    pub diff: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitArgs {
    pub path: Option<PathBuf>,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigArgs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionsArgs {
    pub shell: Option<String>,
}

pub fn build_cli() -> Command {
    let mut cmd = Command::new("dbdeploy")
        .about("Schema change deployment with audit history and rollback detection")
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(true)
        .subcommand_required(true)
        .subcommand_value_name("COMMAND");

    cmd = add_global_args(cmd);

    cmd = cmd.subcommand(command_deploy());
    cmd = cmd.subcommand(command_plan());
    cmd = cmd.subcommand(command_translate());
    cmd = cmd.subcommand(command_init());
    cmd = cmd.subcommand(command_config());
    cmd = cmd.subcommand(command_completions());

    cmd
}

pub fn parse_args() -> CliArgs {
    let matches = build_cli().get_matches();
    parse_matches(&matches)
}

pub fn try_parse_from<I, T>(args: I) -> Result<CliArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = build_cli().try_get_matches_from(args)?;
    Ok(parse_matches(&matches))
}

fn add_global_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("config")
            .long("config")
            .value_name("PATH")
            .value_hint(ValueHint::FilePath)
            .global(true)
            .help("Override config file location"),
    )
    .arg(
        Arg::new("env-file")
            .long("env-file")
            .value_name("PATH")
            .value_hint(ValueHint::FilePath)
            .global(true)
            .help("Load environment variables from file (default: .env)"),
    )
    .arg(
        Arg::new("env")
            .long("env")
            .value_name("NAME")
            .global(true)
            .help("Select deployment environment"),
    )
    .arg(
        Arg::new("server")
            .long("server")
            .value_name("HOST")
            .global(true)
            .help("SQL Server hostname"),
    )
    .arg(
        Arg::new("port")
            .long("port")
            .value_name("PORT")
            .value_parser(clap::value_parser!(u16))
            .global(true)
            .help("SQL Server port (default: 1433)"),
    )
    .arg(
        Arg::new("database")
            .long("database")
            .value_name("NAME")
            .global(true)
            .help("Database used for the initial login (default: master)"),
    )
    .arg(
        Arg::new("user")
            .long("user")
            .value_name("USER")
            .global(true)
            .help("SQL Server username"),
    )
    .arg(
        Arg::new("password")
            .long("password")
            .value_name("PASS")
            .global(true)
            .help("SQL Server password"),
    )
    .arg(
        Arg::new("timeout")
            .long("timeout")
            .value_name("MS")
            .value_parser(clap::value_parser!(u64))
            .global(true)
            .help("Connection timeout in milliseconds"),
    )
    .arg(
        Arg::new("encrypt")
            .long("encrypt")
            .value_parser(clap::value_parser!(bool))
            .global(true)
            .help("Enable connection encryption"),
    )
    .arg(
        Arg::new("trust-cert")
            .long("trust-cert")
            .value_parser(clap::value_parser!(bool))
            .global(true)
            .help("Trust server certificate"),
    )
    .arg(
        Arg::new("source")
            .long("source")
            .value_name("DIR")
            .value_hint(ValueHint::DirPath)
            .global(true)
            .help("Directory holding <SCHEMA>/<type>/<OBJECT>.sql change files"),
    )
    .arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Output as JSON"),
    )
    .arg(
        Arg::new("markdown")
            .long("markdown")
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Force markdown table output"),
    )
    .arg(
        Arg::new("pretty")
            .long("pretty")
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Force pretty-printed table output"),
    )
    .arg(
        Arg::new("verbose")
            .short('v')
            .long("verbose")
            .action(ArgAction::Count)
            .global(true)
            .help("Increase log verbosity (-v info, -vv debug, -vvv trace)"),
    )
    .arg(
        Arg::new("quiet")
            .short('q')
            .long("quiet")
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Suppress non-error output"),
    )
}

fn command_core(
    name: &'static str,
    about: &'static str,
    aliases: &'static [&'static str],
) -> Command {
    let mut cmd = Command::new(name).about(about);
    for alias in aliases {
        cmd = cmd.visible_alias(*alias);
    }
    cmd
}

fn command_deploy() -> Command {
    command_core("deploy", "Deploy pending changes to the environment", &[])
        .arg(
            Arg::new("audit-only")
                .long("audit-only")
                .action(ArgAction::SetTrue)
                .help("Record changes as deployed without executing them"),
        )
        .arg(
            Arg::new("max-concurrency")
                .long("max-concurrency")
                .value_name("n")
                .value_parser(clap::value_parser!(usize))
                .help("Schemas deployed at the same time"),
        )
}

fn command_plan() -> Command {
    command_core("plan", "Show what a deploy would run, without running it", &["status"])
}

fn command_translate() -> Command {
    command_core("translate", "Run a platform's SQL translation offline", &[])
        .arg(
            Arg::new("platform")
                .long("platform")
                .value_name("id")
                .required(true)
                .help("Platform whose dialect to apply"),
        )
        .arg(
            Arg::new("sql")
                .index(1)
                .value_name("SQL")
                .help("SQL to translate"),
        )
        .arg(
            Arg::new("file")
                .long("file")
                .value_name("path")
                .value_hint(ValueHint::FilePath)
                .conflicts_with("sql"),
        )
        .arg(
            Arg::new("diff")
                .long("diff")
                .action(ArgAction::SetTrue)
                .help("Show a unified diff against the input"),
        )
}

fn command_init() -> Command {
    command_core("init", "Create config file", &[])
        .arg(
            Arg::new("path")
                .long("path")
                .value_name("path")
                .value_hint(ValueHint::FilePath),
        )
        .arg(Arg::new("force").long("force").action(ArgAction::SetTrue))
}

fn command_config() -> Command {
    command_core("config", "Display resolved config", &[])
}

fn command_completions() -> Command {
    command_core("completions", "Generate shell completions", &[]).arg(
        Arg::new("shell")
            .long("shell")
            .value_name("name")
            .value_parser(["bash", "zsh", "fish", "powershell", "elvish"]),
    )
}

fn parse_matches(matches: &ArgMatches) -> CliArgs {
    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let env_file = matches.get_one::<String>("env-file").map(PathBuf::from);
    let environment = matches.get_one::<String>("env").cloned();
    let server = matches.get_one::<String>("server").cloned();
    let port = matches.get_one::<u16>("port").copied();
    let database = matches.get_one::<String>("database").cloned();
    let user = matches.get_one::<String>("user").cloned();
    let password = matches.get_one::<String>("password").cloned();
    let timeout_ms = matches.get_one::<u64>("timeout").copied();
    let encrypt = matches.get_one::<bool>("encrypt").copied();
    let trust_cert = matches.get_one::<bool>("trust-cert").copied();
    let source_path = matches.get_one::<String>("source").map(PathBuf::from);
    let output = OutputFlags {
        json: matches.get_flag("json"),
        markdown: matches.get_flag("markdown"),
        pretty: matches.get_flag("pretty"),
    };
    let verbose = matches.get_count("verbose");
    let quiet = matches.get_flag("quiet");

    let command = match matches.subcommand() {
        Some(("deploy", sub_m)) => CommandKind::Deploy(DeployArgs {
            audit_only: sub_m.get_flag("audit-only"),
            max_concurrency: sub_m.get_one::<usize>("max-concurrency").copied(),
        }),
        Some(("plan", _)) => CommandKind::Plan(PlanArgs),
        Some(("translate", sub_m)) => CommandKind::Translate(TranslateArgs {
            platform: sub_m
                .get_one::<String>("platform")
                .cloned()
                .unwrap_or_default(),
            sql: sub_m.get_one::<String>("sql").cloned(),
            file: sub_m.get_one::<String>("file").map(PathBuf::from),
            diff: sub_m.get_flag("diff"),
        }),
        Some(("init", sub_m)) => CommandKind::Init(InitArgs {
            path: sub_m.get_one::<String>("path").map(PathBuf::from),
            force: sub_m.get_flag("force"),
        }),
        Some(("config", _)) => CommandKind::Config(ConfigArgs),
        Some(("completions", sub_m)) => CommandKind::Completions(CompletionsArgs {
            shell: sub_m.get_one::<String>("shell").cloned(),
        }),
        _ => CommandKind::Plan(PlanArgs),
    };

    CliArgs {
        config_path,
        env_file,
        environment,
        server,
        port,
        database,
        user,
        password,
        timeout_ms,
        encrypt,
        trust_cert,
        source_path,
        output,
        verbose,
        quiet,
        command,
    }
}
