mod common;
mod completions;
mod config;
mod deploy;
mod init;
mod plan;
mod translate;

use anyhow::Result;

use crate::cli::{CliArgs, CommandKind};

pub fn dispatch(args: &CliArgs) -> Result<()> {
    match &args.command {
        CommandKind::Deploy(cmd) => deploy::run(args, cmd),
        CommandKind::Plan(cmd) => plan::run(args, cmd),
        CommandKind::Translate(cmd) => translate::run(args, cmd),
        CommandKind::Init(cmd) => init::run(args, cmd),
        CommandKind::Config(_) => config::run(args),
        CommandKind::Completions(cmd) => completions::run(args, cmd),
    }
}
