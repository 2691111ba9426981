//! armdeploy CLI entrypoint.
//!
//! This is the main entrypoint for the armdeploy command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use armdeploy::arm::{ArmClient, ContainerSpec, DeploymentObserver, RoleAssignmentSpec};
use armdeploy::cli::{Cli, Commands, LogFormat, OutputFormatter, PrincipalKind, TerminalPresenter};
use armdeploy::config::{
    find_config_file, ConfigParser, ConfigValidator, DeployConfig, LoadedTemplate,
};
use armdeploy::error::{ArmDeployError, OrchestrationError, Result};
use armdeploy::orchestrator::{DeploymentOrchestrator, DeploymentRequest, PollSettings};
use armdeploy::outputs::{create_output_sink, OutputSink};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::Deploy { yes } => cmd_deploy(cli.config.as_ref(), yes, &formatter).await,
        Commands::Status => cmd_status(cli.config.as_ref(), &formatter).await,
        Commands::AssignRole {
            scope,
            principal_id,
            role,
            principal_type,
        } => {
            cmd_assign_role(
                cli.config.as_ref(),
                &scope,
                &principal_id,
                &role,
                principal_type,
                &formatter,
            )
            .await
        }
        Commands::Outputs => cmd_outputs(cli.config.as_ref(), &formatter).await,
    }
}

/// Validate configuration and template.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let loaded = load_config(config_path)?;
    info!("Validated configuration: {}", loaded.path.display());

    let result = ConfigValidator::new().validate(&loaded.config)?;
    let template = loaded.parser.load_template(&loaded.config)?;

    println!("{}", formatter.format_validation(&result, show_warnings));

    // Show summary
    let deployment = &loaded.config.deployment;
    eprintln!("Configuration summary:");
    eprintln!("  Deployment: {}", deployment.name);
    eprintln!("  Resource group: {}", deployment.resource_group_name());
    eprintln!("  Location: {}", deployment.location);
    eprintln!("  Mode: {}", deployment.mode);
    eprintln!("  Template resources: {}", template.resource_count());
    eprintln!("  Role assignments: {}", loaded.config.role_assignments.len());

    Ok(())
}

/// Run the deployment.
async fn cmd_deploy(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let loaded = load_config(config_path)?;
    ConfigValidator::new().validate(&loaded.config)?;
    let template = loaded.parser.load_template(&loaded.config)?;
    let request = DeploymentRequest::from_config(&loaded.config, &template);

    describe_request(&request, &template);

    // Confirm
    if !auto_approve {
        eprint!("Do you want to run this deployment? [y/N]: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Deployment cancelled.");
            return Ok(());
        }
    }

    let sink = create_output_sink(&loaded.config.outputs, &loaded.base_dir).await?;
    let orchestrator = DeploymentOrchestrator::new(create_arm_client()?, sink)
        .with_retry_policy(loaded.config.retry.policy())
        .with_poll_settings(PollSettings::from(&loaded.config.polling));

    // First Ctrl-C cancels the run, a second one exits
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling deployment");
            cancel.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let mut presenter = TerminalPresenter::new();
    match orchestrator.submit(&request, &mut presenter).await {
        Ok(outcome) => {
            println!("{}", formatter.format_outcome(&outcome));
            Ok(())
        }
        Err(ArmDeployError::Orchestration(OrchestrationError::DeploymentFailed {
            deployment,
            reason,
            errors,
        })) => {
            println!("{}", formatter.format_failure(&deployment, &reason, &errors));
            Err(OrchestrationError::DeploymentFailed {
                deployment,
                reason,
                errors,
            }
            .into())
        }
        Err(e) => Err(e),
    }
}

/// Show the sub-operations of the configured deployment.
async fn cmd_status(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let loaded = load_config(config_path)?;
    let deployment = &loaded.config.deployment;

    let container = ContainerSpec {
        subscription: deployment.subscription.clone(),
        name: deployment.resource_group_name().to_string(),
        location: deployment.location.clone(),
        tags: deployment.tags.clone(),
    };

    let observer = DeploymentObserver::new(create_arm_client()?);
    let status = observer
        .status(&container.resource_id(), &deployment.name)
        .await?;

    println!("{}", formatter.format_status(&status));

    Ok(())
}

/// Create a single role assignment.
async fn cmd_assign_role(
    config_path: Option<&PathBuf>,
    scope: &str,
    principal_id: &str,
    role: &str,
    principal_type: PrincipalKind,
    formatter: &OutputFormatter,
) -> Result<()> {
    let loaded = load_config(config_path)?;
    let spec = RoleAssignmentSpec::new(
        &loaded.config.deployment.subscription,
        role,
        principal_id,
        principal_type.into(),
    );

    let sink = create_output_sink(&loaded.config.outputs, &loaded.base_dir).await?;
    let orchestrator = DeploymentOrchestrator::new(create_arm_client()?, sink)
        .with_retry_policy(loaded.config.retry.policy());

    let assignment = orchestrator.assign_role(scope, &spec).await?;
    println!("{}", formatter.format_role_assignment(&assignment));

    Ok(())
}

/// Print the outputs of the last successful deployment.
async fn cmd_outputs(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let loaded = load_config(config_path)?;
    let sink = create_output_sink(&loaded.config.outputs, &loaded.base_dir).await?;

    match sink.read_outputs(&loaded.config.deployment.name).await? {
        Some(outputs) => println!("{}", formatter.format_outputs(&outputs)),
        None => eprintln!(
            "{}",
            formatter.warning(&format!(
                "No outputs recorded for {} in {} backend",
                loaded.config.deployment.name,
                sink.backend_type()
            ))
        ),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// A configuration file with its parser.
struct LoadedConfig {
    path: PathBuf,
    base_dir: PathBuf,
    parser: ConfigParser,
    config: DeployConfig,
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads `.env` and the configuration with environment overrides.
fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let path = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", path.display());

    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let parser = ConfigParser::new().with_base_path(base_dir.clone());
    parser.load_dotenv()?;
    let config = parser.load_with_env(&path)?;

    Ok(LoadedConfig {
        path,
        base_dir,
        parser,
        config,
    })
}

/// Prints what is about to be deployed.
fn describe_request(request: &DeploymentRequest, template: &LoadedTemplate) {
    eprintln!("\nDeployment {}", request.deployment_name);
    eprintln!("  Subscription: {}", request.subscription);
    eprintln!("  Resource group: {} ({})", request.container_name, request.location);
    eprintln!("  Template: {}", template.path.display());
    eprintln!("  Mode: {}", request.mode);
    eprintln!("  Resources: {}", request.total_expected_resources);
    for assignment in &request.role_assignments {
        eprintln!(
            "  Role {} for {}",
            assignment.role_definition_id, assignment.principal_id
        );
    }
    eprintln!();
}

/// Creates an ARM client from the environment.
fn create_arm_client() -> Result<ArmClient> {
    let token = ConfigParser::get_access_token()?;
    let client = ArmClient::new(token)?;
    Ok(match ConfigParser::get_endpoint() {
        Some(endpoint) => client.with_endpoint(endpoint),
        None => client,
    })
}
