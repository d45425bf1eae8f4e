//! CLI argument parsing for the pipeline workflow.
//!
//! The CLI is intentionally thin: each subcommand maps to one workflow
//! function, and every path or name the run needs arrives here or through
//! the env file. No hidden defaults live in the workflow layer.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint for the pipeline workflow.
#[derive(Parser, Debug)]
#[command(
    name = "salesflow",
    version,
    about = "Provision cloud resources and deploy the sales data pipeline",
    after_help = "Commands:\n  run             Full sequence: download, provision, upload, init warehouse, deploy\n  upload          Download the dataset and upload it to blob storage\n  init-warehouse  Create the database/schema scope and apply the raw schema script\n  deploy          Register linked services, datasets, and the pipeline, then trigger a run\n  transform       Run the external SQL transformation tool\n\nExamples:\n  salesflow run --env-file .env\n  salesflow upload --data-dir data\n  salesflow init-warehouse --schema-script db_schema/raw_schema.sql\n  salesflow deploy\n  salesflow run --transform --project-dir transform",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level workflow commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Upload(UploadArgs),
    #[command(name = "init-warehouse")]
    InitWarehouse(InitWarehouseArgs),
    Deploy(DeployArgs),
    Transform(TransformArgs),
}

/// Full-sequence inputs.
#[derive(Parser, Debug)]
#[command(about = "Run the full pipeline initialization sequence")]
pub struct RunArgs {
    /// Env file holding configuration and the persisted SAS token
    #[arg(long, value_name = "PATH", default_value = ".env")]
    pub env_file: PathBuf,

    /// Directory for the downloaded dataset
    #[arg(long, value_name = "DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Raw schema script applied to the warehouse
    #[arg(long, value_name = "PATH", default_value = "db_schema/raw_schema.sql")]
    pub schema_script: PathBuf,

    /// Run the external transformation tool after the pipeline is triggered
    #[arg(long)]
    pub transform: bool,

    /// Transformation project directory
    #[arg(long, value_name = "DIR", default_value = "transform")]
    pub project_dir: PathBuf,

    /// Profiles directory passed to the transformation tool
    #[arg(long, value_name = "DIR")]
    pub profiles_dir: Option<PathBuf>,
}

/// Upload-only inputs.
#[derive(Parser, Debug)]
#[command(about = "Download the dataset and upload it to blob storage")]
pub struct UploadArgs {
    /// Env file holding configuration and the persisted SAS token
    #[arg(long, value_name = "PATH", default_value = ".env")]
    pub env_file: PathBuf,

    /// Directory for the downloaded dataset
    #[arg(long, value_name = "DIR", default_value = "data")]
    pub data_dir: PathBuf,
}

/// Warehouse initialization inputs.
#[derive(Parser, Debug)]
#[command(about = "Create the warehouse scope and apply the raw schema script")]
pub struct InitWarehouseArgs {
    /// Env file holding configuration
    #[arg(long, value_name = "PATH", default_value = ".env")]
    pub env_file: PathBuf,

    /// Raw schema script applied to the warehouse
    #[arg(long, value_name = "PATH", default_value = "db_schema/raw_schema.sql")]
    pub schema_script: PathBuf,
}

/// Deployment inputs.
#[derive(Parser, Debug)]
#[command(about = "Register the pipeline against the factory and trigger a run")]
pub struct DeployArgs {
    /// Env file holding configuration
    #[arg(long, value_name = "PATH", default_value = ".env")]
    pub env_file: PathBuf,
}

/// Transformation-only inputs.
#[derive(Parser, Debug)]
#[command(about = "Run the external SQL transformation tool")]
pub struct TransformArgs {
    /// Transformation project directory
    #[arg(long, value_name = "DIR", default_value = "transform")]
    pub project_dir: PathBuf,

    /// Profiles directory passed to the transformation tool
    #[arg(long, value_name = "DIR")]
    pub profiles_dir: Option<PathBuf>,
}
