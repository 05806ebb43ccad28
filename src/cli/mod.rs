mod args;

pub use args::{
    CliArgs, CommandKind, CompletionsArgs, ConfigArgs, DeployArgs, InitArgs, OutputFlags, PlanArgs,
    TranslateArgs, build_cli, try_parse_from,
};

pub fn parse() -> CliArgs {
    args::parse_args()
}
