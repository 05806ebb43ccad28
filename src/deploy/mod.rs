//! Delta computation, ordering and execution of change sets.

mod command;
mod engine;
mod plan;
mod report;
mod session;
mod strategy;

pub use command::{ExecuteChangeCommand, LedgerAction, order_commands};
pub use engine::{DeployOptions, Deployer};
pub use plan::{RollbackCandidate, SchemaPlan, plan_schema};
pub use report::{CommandSummary, DeployReport, ErrorSummary, SchemaReport, SchemaStatus};
pub use session::{Session, SessionProvider};
pub use strategy::DeployStrategy;
