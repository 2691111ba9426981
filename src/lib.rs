// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # armdeploy
//!
//! Submits Azure Resource Manager deployments and tracks their sub-operations
//! to completion.
//!
//! ## Overview
//!
//! A deployment run goes through these steps:
//!
//! 1. Create or update the target resource group
//! 2. Grant prerequisite role assignments, retrying while a freshly created
//!    principal propagates through the directory
//! 3. Submit the ARM template deployment
//! 4. List the deployment's sub-operations on every tick and render the
//!    per-resource progress
//! 5. Persist outputs on success, or report the first error of every failed
//!    resource
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`retry`]: Fixed-interval retry with settle delay
//! - [`tracker`]: Monotonic per-resource status tracking
//! - [`arm`]: Resource Manager client and control plane trait
//! - [`orchestrator`]: Deployment state machine and presenter boundary
//! - [`outputs`]: Output persistence backends (local, S3)
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! deployment:
//!   name: web-stack
//!   subscription: 00000000-0000-0000-0000-000000000000
//!   location: westeurope
//!   template: ./main.json
//!
//! role_assignments:
//!   - principal_id: 11111111-1111-1111-1111-111111111111
//!     role_definition_id: b24988ac-6180-42a0-ab88-20f7382dd24c
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod arm;
pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod outputs;
pub mod retry;
pub mod tracker;

// ============================================================================
// Re-exports
// ============================================================================

pub use arm::{ArmClient, ControlPlane, DeploymentObserver, DeploymentStatus};
pub use cli::{Cli, Commands, OutputFormatter, TerminalPresenter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, DeployConfig};
pub use error::{ArmDeployError, Result};
pub use orchestrator::{
    DeploymentOrchestrator, DeploymentOutcome, DeploymentRequest, NullPresenter, PollSettings,
    RunPhase, StatusPresenter,
};
pub use outputs::{create_output_sink, LocalOutputSink, OutputSink, S3OutputSink};
pub use retry::{RetryInvoker, RetryPolicy};
pub use tracker::{OperationState, OperationStatusTracker, OrderedStatusView, SubOperation};
